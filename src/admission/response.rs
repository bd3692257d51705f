//! # 准入拒绝的线上格式
//!
//! 拒绝是数据而不是异常：HTTP 状态码加 OpenAI 风格的错误体，
//! 限额类拒绝附带配额快照。字段名对外一律 camelCase。

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use crate::store::ApiKey;

/// 拒绝类别
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectionKind {
    /// 请求没带密钥
    MissingApiKey,
    /// 密钥不存在
    InvalidApiKey,
    /// 密钥被禁用
    ApiKeyDisabled,
    /// 模型不在白名单
    ModelNotAllowed,
    /// 限额耗尽
    QuotaExceeded,
}

impl RejectionKind {
    /// 线上 `code` 字段
    pub const fn code(self) -> &'static str {
        match self {
            Self::MissingApiKey => "missing_api_key",
            Self::InvalidApiKey => "invalid_api_key",
            Self::ApiKeyDisabled => "api_key_disabled",
            Self::ModelNotAllowed => "model_not_allowed",
            Self::QuotaExceeded => "quota_exceeded",
        }
    }

    /// 线上 `type` 字段
    pub const fn error_type(self) -> &'static str {
        match self {
            Self::MissingApiKey | Self::InvalidApiKey | Self::ApiKeyDisabled => {
                "invalid_request_error"
            }
            Self::ModelNotAllowed => "insufficient_permissions",
            Self::QuotaExceeded => "insufficient_quota",
        }
    }

    /// HTTP 状态码
    pub const fn status(self) -> StatusCode {
        match self {
            Self::MissingApiKey | Self::InvalidApiKey | Self::ApiKeyDisabled => {
                StatusCode::UNAUTHORIZED
            }
            Self::ModelNotAllowed => StatusCode::FORBIDDEN,
            Self::QuotaExceeded => StatusCode::TOO_MANY_REQUESTS,
        }
    }
}

/// 配额快照，剩余量饱和到 0
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaSnapshot {
    pub request_limit: i64,
    pub request_used: i64,
    pub request_remaining: i64,
    pub token_limit: i64,
    pub token_used: i64,
    pub token_remaining: i64,
}

impl QuotaSnapshot {
    /// 从密钥记录生成快照
    pub fn from_key(key: &ApiKey) -> Self {
        Self {
            request_limit: key.request_limit,
            request_used: key.request_used,
            request_remaining: (key.request_limit - key.request_used).max(0),
            token_limit: key.token_limit,
            token_used: key.token_used,
            token_remaining: (key.token_limit - key.token_used).max(0),
        }
    }
}

/// 错误体内层
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub message: String,
    #[serde(rename = "type")]
    pub error_type: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quota: Option<QuotaSnapshot>,
}

/// 错误体外层 `{"error": {...}}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

/// 一次准入拒绝
#[derive(Debug, Clone)]
pub struct AdmissionRejection {
    pub kind: RejectionKind,
    pub status: StatusCode,
    pub body: ErrorBody,
}

impl AdmissionRejection {
    /// 按类别构造
    pub fn new(kind: RejectionKind, message: impl Into<String>) -> Self {
        Self::build(kind, message.into(), None)
    }

    /// 带配额快照构造
    pub fn with_quota(
        kind: RejectionKind,
        message: impl Into<String>,
        quota: QuotaSnapshot,
    ) -> Self {
        Self::build(kind, message.into(), Some(quota))
    }

    fn build(kind: RejectionKind, message: String, quota: Option<QuotaSnapshot>) -> Self {
        Self {
            kind,
            status: kind.status(),
            body: ErrorBody {
                error: ErrorDetail {
                    message,
                    error_type: kind.error_type().to_string(),
                    code: kind.code().to_string(),
                    quota,
                },
            },
        }
    }

    pub fn missing_api_key() -> Self {
        Self::new(
            RejectionKind::MissingApiKey,
            "Missing API key in authorization header",
        )
    }

    pub fn invalid_api_key() -> Self {
        Self::new(RejectionKind::InvalidApiKey, "Invalid API key")
    }

    pub fn api_key_disabled() -> Self {
        Self::new(RejectionKind::ApiKeyDisabled, "API key is disabled")
    }

    /// 模型被拒，消息里回显白名单
    pub fn model_not_allowed(model: &str, allowed_models: &[String]) -> Self {
        Self::new(
            RejectionKind::ModelNotAllowed,
            format!(
                "Model \"{}\" is not allowed for this API key. Allowed models: {}",
                model,
                allowed_models.join(", ")
            ),
        )
    }

    /// 请求数限额耗尽
    pub fn request_quota_exceeded(key: &ApiKey) -> Self {
        Self::with_quota(
            RejectionKind::QuotaExceeded,
            format!(
                "Request quota exceeded: {} of {} requests used",
                key.request_used, key.request_limit
            ),
            QuotaSnapshot::from_key(key),
        )
    }

    /// 令牌限额耗尽
    pub fn token_quota_exceeded(key: &ApiKey) -> Self {
        Self::with_quota(
            RejectionKind::QuotaExceeded,
            format!(
                "Token quota exceeded: {} of {} tokens used",
                key.token_used, key.token_limit
            ),
            QuotaSnapshot::from_key(key),
        )
    }

    /// 序列化错误体
    pub fn body_json(&self) -> serde_json::Value {
        serde_json::json!(&self.body)
    }
}
