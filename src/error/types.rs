//! # 错误类型定义
//!
//! 变体按网关的故障面划分：配置、存储、网络、认证、服务商。
//! 业务性拒绝（401/429 等）不在此列，见准入模块的 `AdmissionRejection`。

use reqwest::StatusCode;
use thiserror::Error;

use super::ErrorCategory;

/// 网关主要错误类型
#[derive(Debug, Error)]
pub enum GatewayError {
    /// 配置加载或校验失败
    #[error("配置错误: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    /// 凭证存储后端故障
    #[error("凭证存储错误: {message}")]
    Store {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    /// 出站网络故障
    #[error("网络错误: {message}")]
    Network {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    /// 凭证或令牌层面的认证失败
    #[error("认证错误: {message}")]
    Auth {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    /// 上游服务商返回的错误，`provider` 记录服务商标识
    #[error("服务商错误: {message}")]
    Provider {
        message: String,
        provider: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    /// 网关自身的不变量被破坏
    #[error("内部错误: {message}")]
    Internal {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    /// 文件系统操作失败
    #[error("IO错误: {message}")]
    Io {
        message: String,
        #[source]
        source: std::io::Error,
    },

    /// 结构化数据的编解码失败
    #[error("序列化错误: {message}")]
    Serialization {
        message: String,
        #[source]
        source: anyhow::Error,
    },

    /// 带上下文的包装错误，HTTP 映射沿用内层错误
    #[error("{context}")]
    Context {
        context: String,
        #[source]
        source: Box<GatewayError>,
    },
}

impl GatewayError {
    /// 配置错误
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            source: None,
        }
    }

    /// 配置错误，附带来源
    pub fn config_with_source(
        message: impl Into<String>,
        source: impl Into<anyhow::Error>,
    ) -> Self {
        Self::Config {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// 凭证存储错误
    pub fn store(message: impl Into<String>) -> Self {
        Self::Store {
            message: message.into(),
            source: None,
        }
    }

    /// 凭证存储错误，附带来源
    pub fn store_with_source(
        message: impl Into<String>,
        source: impl Into<anyhow::Error>,
    ) -> Self {
        Self::Store {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// 网络错误
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
            source: None,
        }
    }

    /// 网络错误，附带来源
    pub fn network_with_source(
        message: impl Into<String>,
        source: impl Into<anyhow::Error>,
    ) -> Self {
        Self::Network {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// 认证错误
    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth {
            message: message.into(),
            source: None,
        }
    }

    /// 认证错误，附带来源
    pub fn auth_with_source(message: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        Self::Auth {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// 服务商错误
    pub fn provider(message: impl Into<String>, provider: impl Into<String>) -> Self {
        Self::Provider {
            message: message.into(),
            provider: provider.into(),
            source: None,
        }
    }

    /// 服务商错误，附带来源
    pub fn provider_with_source(
        message: impl Into<String>,
        provider: impl Into<String>,
        source: impl Into<anyhow::Error>,
    ) -> Self {
        Self::Provider {
            message: message.into(),
            provider: provider.into(),
            source: Some(source.into()),
        }
    }

    /// 内部错误
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
            source: None,
        }
    }

    /// 内部错误，附带来源
    pub fn internal_with_source(
        message: impl Into<String>,
        source: impl Into<anyhow::Error>,
    ) -> Self {
        Self::Internal {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// 序列化错误
    pub fn serialization(message: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        Self::Serialization {
            message: message.into(),
            source: source.into(),
        }
    }

    /// 映射为 HTTP 状态码与错误代码，供嵌入方渲染响应
    ///
    /// 配置与存储故障都是运维侧问题，对客户端一律报 500；
    /// `Context` 透传内层错误的映射。
    pub fn to_http_response_parts(&self) -> (StatusCode, &'static str) {
        match self {
            Self::Config { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "CONFIG_ERROR"),
            Self::Store { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "STORE_ERROR"),
            Self::Network { .. } => (StatusCode::BAD_GATEWAY, "NETWORK_ERROR"),
            Self::Auth { .. } => (StatusCode::UNAUTHORIZED, "AUTH_ERROR"),
            Self::Provider { .. } => (StatusCode::BAD_GATEWAY, "PROVIDER_ERROR"),
            Self::Internal { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
            Self::Io { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "IO_ERROR"),
            Self::Serialization { .. } => (StatusCode::BAD_REQUEST, "SERIALIZATION_ERROR"),
            Self::Context { source, .. } => source.to_http_response_parts(),
        }
    }

    /// 按 HTTP 映射归入客户端/服务端两类，供日志分级
    pub fn category(&self) -> ErrorCategory {
        if self.to_http_response_parts().0.is_client_error() {
            ErrorCategory::Client
        } else {
            ErrorCategory::Server
        }
    }
}

impl From<std::io::Error> for GatewayError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: "文件操作失败".to_string(),
            source: err,
        }
    }
}

impl From<toml::de::Error> for GatewayError {
    fn from(err: toml::de::Error) -> Self {
        Self::config_with_source("TOML 解析失败", err)
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization("JSON 编解码失败", err)
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        Self::network_with_source("HTTP 请求失败", err)
    }
}

impl From<reqwest::header::InvalidHeaderValue> for GatewayError {
    fn from(err: reqwest::header::InvalidHeaderValue) -> Self {
        Self::internal_with_source("请求头取值非法", err)
    }
}

impl From<url::ParseError> for GatewayError {
    fn from(err: url::ParseError) -> Self {
        Self::network_with_source("URL 解析失败", err)
    }
}
