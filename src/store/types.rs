//! # 凭证存储数据类型
//!
//! API 密钥与服务商连接的内存表示。持久化由外部存储负责，
//! 本核心只读取快照并通过补丁提议变更。

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// 调用方 API 密钥记录
///
/// 限额字段取 0 表示不限制；用量计数只增不减。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiKey {
    /// 记录 ID
    pub id: String,
    /// 不透明密钥值（Bearer 凭证）
    pub value: String,
    /// 是否启用
    pub is_active: bool,
    /// 请求次数限额（0 = 不限）
    pub request_limit: i64,
    /// 令牌用量限额（0 = 不限）
    pub token_limit: i64,
    /// 已消耗请求次数
    pub request_used: i64,
    /// 已消耗令牌数
    pub token_used: i64,
    /// 模型白名单（空 = 允许全部模型）
    pub allowed_models: Vec<String>,
    /// 创建时间
    pub created_at: DateTime<Utc>,
}

impl ApiKey {
    /// 构造一个启用状态、无限额的密钥
    pub fn new(id: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            value: value.into(),
            is_active: true,
            request_limit: 0,
            token_limit: 0,
            request_used: 0,
            token_used: 0,
            allowed_models: Vec::new(),
            created_at: Utc::now(),
        }
    }
}

/// 服务商连接的凭证袋
///
/// 通用字段之外，两级凭证服务商附带派生令牌及其独立过期时间；
/// 其余服务商自定义字段透传保存在 `extra` 中。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderCredentials {
    /// OAuth 访问令牌或静态密钥
    pub access_token: String,
    /// OAuth 刷新令牌
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// 访问令牌过期时间点
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    /// 颁发时声明的有效期（秒）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<i64>,
    /// 二级派生令牌
    #[serde(skip_serializing_if = "Option::is_none")]
    pub derived_token: Option<String>,
    /// 派生令牌过期时间点
    #[serde(skip_serializing_if = "Option::is_none")]
    pub derived_expires_at: Option<DateTime<Utc>>,
    /// 服务商自定义附加字段
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ProviderCredentials {
    /// 构造只含访问令牌的凭证袋
    pub fn bearer_only(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            ..Self::default()
        }
    }

    /// 访问令牌是否在 `buffer` 时间窗内过期
    ///
    /// 没有过期信息的凭证视为长期有效。
    pub fn expires_within(&self, buffer: Duration) -> bool {
        self.expires_at
            .is_some_and(|at| at - buffer <= Utc::now())
    }

    /// 派生令牌是否缺失或在 `buffer` 时间窗内过期
    pub fn derived_expires_within(&self, buffer: Duration) -> bool {
        match (&self.derived_token, self.derived_expires_at) {
            (None, _) => true,
            (Some(_), None) => false,
            (Some(_), Some(at)) => at - buffer <= Utc::now(),
        }
    }
}

/// 服务商连接记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConnection {
    /// 连接 ID
    pub id: String,
    /// 服务商 ID（Executor 注册表的分发键）
    pub provider_id: String,
    /// 连接归属账号（会话亲和的身份键）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_email: Option<String>,
    /// 当前凭证
    pub credentials: ProviderCredentials,
    /// 最近一次更新时间
    pub updated_at: DateTime<Utc>,
}

impl ProviderConnection {
    /// 构造新的连接记录
    pub fn new(
        id: impl Into<String>,
        provider_id: impl Into<String>,
        credentials: ProviderCredentials,
    ) -> Self {
        Self {
            id: id.into(),
            provider_id: provider_id.into(),
            account_email: None,
            credentials,
            updated_at: Utc::now(),
        }
    }
}

/// 连接更新补丁
///
/// `None` 字段保持不变；`updated_at` 由存储方写入。
#[derive(Debug, Clone, Default)]
pub struct ConnectionPatch {
    /// 替换整个凭证袋
    pub credentials: Option<ProviderCredentials>,
    /// 更新归属账号
    pub account_email: Option<String>,
}

impl ConnectionPatch {
    /// 仅替换凭证的补丁
    pub fn credentials(credentials: ProviderCredentials) -> Self {
        Self {
            credentials: Some(credentials),
            account_email: None,
        }
    }
}

/// 上游返回的用量统计
///
/// 字段名兼容 OpenAI 风格的 `usage` 对象。
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenUsage {
    /// 提示词令牌数
    pub prompt_tokens: i64,
    /// 补全令牌数
    pub completion_tokens: i64,
}

impl TokenUsage {
    /// 新建用量统计
    pub const fn new(prompt_tokens: i64, completion_tokens: i64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
        }
    }

    /// 记账总量 = 提示词 + 补全
    pub const fn total(&self) -> i64 {
        self.prompt_tokens + self.completion_tokens
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expires_within_without_expiry_is_false() {
        let creds = ProviderCredentials::bearer_only("sk-static");
        assert!(!creds.expires_within(Duration::minutes(5)));
    }

    #[test]
    fn test_expires_within_inside_buffer() {
        let creds = ProviderCredentials {
            access_token: "at".to_string(),
            expires_at: Some(Utc::now() + Duration::seconds(30)),
            ..Default::default()
        };
        assert!(creds.expires_within(Duration::minutes(1)));
        assert!(!creds.expires_within(Duration::seconds(5)));
    }

    #[test]
    fn test_derived_expires_missing_token_counts_as_expired() {
        let creds = ProviderCredentials::bearer_only("at");
        assert!(creds.derived_expires_within(Duration::minutes(5)));
    }

    #[test]
    fn test_derived_expires_with_valid_token() {
        let creds = ProviderCredentials {
            access_token: "at".to_string(),
            derived_token: Some("dt".to_string()),
            derived_expires_at: Some(Utc::now() + Duration::hours(1)),
            ..Default::default()
        };
        assert!(!creds.derived_expires_within(Duration::minutes(5)));
    }

    #[test]
    fn test_credentials_roundtrip_keeps_extra_fields() {
        let raw = serde_json::json!({
            "access_token": "at",
            "refresh_token": "rt",
            "project_id": "proj-1"
        });
        let creds: ProviderCredentials = serde_json::from_value(raw).unwrap();
        assert_eq!(creds.extra.get("project_id").unwrap(), "proj-1");

        let back = serde_json::to_value(&creds).unwrap();
        assert_eq!(back["project_id"], "proj-1");
    }

    #[test]
    fn test_token_usage_total() {
        assert_eq!(TokenUsage::new(10, 5).total(), 15);
        assert_eq!(TokenUsage::default().total(), 0);
    }
}
