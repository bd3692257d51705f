//! # antigravity 特化策略
//!
//! 两级凭证服务商：长效的 Google OAuth 对加短效派生令牌，上行
//! 认证优先用派生令牌。上游有生产和沙箱两个基座，按下标选择，
//! 越界收敛到最后一个。

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Duration;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE, USER_AGENT};

use super::{Executor, PROVIDER_ANTIGRAVITY, base_needs_refresh};
use crate::error::Result;
use crate::ldebug;
use crate::logging::{LogComponent, LogStage};
use crate::refresh::CredentialRefresher;
use crate::store::ProviderCredentials;

/// 派生令牌的预刷新提前量（毫秒），比基础提前量收得更紧
pub const DERIVED_TOKEN_EXPIRY_BUFFER_MS: i64 = 5 * 60 * 1000;

/// 上游基座，下标 0 为生产默认
const UPSTREAM_BASES: [&str; 2] = [
    "https://cloudcode-pa.googleapis.com/v1internal",
    "https://daily-cloudcode-pa.sandbox.googleapis.com/v1internal",
];

/// 上行客户端标识
const CLIENT_USER_AGENT: &str = "antigravity/1.11.9 cli";

/// antigravity 策略
pub struct AntigravityExecutor {
    refresher: Arc<CredentialRefresher>,
}

impl AntigravityExecutor {
    /// 创建策略
    pub fn new(refresher: Arc<CredentialRefresher>) -> Self {
        Self { refresher }
    }
}

#[async_trait]
impl Executor for AntigravityExecutor {
    fn provider_id(&self) -> &str {
        PROVIDER_ANTIGRAVITY
    }

    fn build_url(&self, _model: &str, stream: bool, url_index: usize) -> Result<String> {
        let base = UPSTREAM_BASES[url_index.min(UPSTREAM_BASES.len() - 1)];
        let method = if stream {
            ":streamGenerateContent?alt=sse"
        } else {
            ":generateContent"
        };
        Ok(format!("{base}{method}"))
    }

    fn build_headers(&self, credentials: &ProviderCredentials, stream: bool) -> Result<HeaderMap> {
        // 派生令牌是主要的上行凭证，没有时退回访问令牌
        let bearer = credentials
            .derived_token
            .as_deref()
            .unwrap_or(&credentials.access_token);

        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {bearer}"))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(USER_AGENT, HeaderValue::from_static(CLIENT_USER_AGENT));
        if stream {
            headers.insert(ACCEPT, HeaderValue::from_static("text/event-stream"));
        } else {
            headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        }
        Ok(headers)
    }

    fn needs_refresh(&self, credentials: &ProviderCredentials) -> bool {
        // 先看派生令牌：缺失或临近过期都要刷新
        if credentials.derived_expires_within(Duration::milliseconds(
            DERIVED_TOKEN_EXPIRY_BUFFER_MS,
        )) {
            ldebug!(
                PROVIDER_ANTIGRAVITY,
                LogStage::Authentication,
                LogComponent::AntigravityExecutor,
                "derived_token_stale",
                "派生令牌缺失或临近过期，触发两级刷新"
            );
            return true;
        }
        base_needs_refresh(credentials)
    }

    async fn refresh_credentials(
        &self,
        credentials: &ProviderCredentials,
    ) -> Option<ProviderCredentials> {
        self.refresher
            .refresh_token_by_provider(PROVIDER_ANTIGRAVITY, credentials)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RefreshConfig;
    use crate::transport::{OutboundTransport, PlainTransport};
    use chrono::Utc;

    fn executor() -> AntigravityExecutor {
        let transport: Arc<dyn OutboundTransport> =
            Arc::new(PlainTransport::new().expect("plain transport"));
        let refresher =
            CredentialRefresher::new(transport, &RefreshConfig::default()).expect("refresher");
        AntigravityExecutor::new(Arc::new(refresher))
    }

    #[test]
    fn test_url_selects_base_by_index_and_clamps() {
        let executor = executor();
        assert_eq!(
            executor.build_url("m", false, 0).unwrap(),
            "https://cloudcode-pa.googleapis.com/v1internal:generateContent"
        );
        assert_eq!(
            executor.build_url("m", true, 1).unwrap(),
            "https://daily-cloudcode-pa.sandbox.googleapis.com/v1internal:streamGenerateContent?alt=sse"
        );
        // 越界收敛到最后一个基座
        assert_eq!(
            executor.build_url("m", false, 9).unwrap(),
            "https://daily-cloudcode-pa.sandbox.googleapis.com/v1internal:generateContent"
        );
    }

    #[test]
    fn test_headers_prefer_derived_token() {
        let executor = executor();
        let with_derived = ProviderCredentials {
            access_token: "oauth-at".to_string(),
            derived_token: Some("derived-dt".to_string()),
            ..Default::default()
        };
        let headers = executor.build_headers(&with_derived, false).unwrap();
        assert_eq!(headers.get(AUTHORIZATION).unwrap(), "Bearer derived-dt");

        let without_derived = ProviderCredentials::bearer_only("oauth-at");
        let headers = executor.build_headers(&without_derived, false).unwrap();
        assert_eq!(headers.get(AUTHORIZATION).unwrap(), "Bearer oauth-at");
    }

    #[test]
    fn test_needs_refresh_checks_derived_token_first() {
        let executor = executor();

        // 访问令牌还很新鲜，但派生令牌缺失
        let missing_derived = ProviderCredentials {
            access_token: "at".to_string(),
            expires_at: Some(Utc::now() + Duration::hours(1)),
            ..Default::default()
        };
        assert!(executor.needs_refresh(&missing_derived));

        // 派生令牌落入 5 分钟窗口
        let expiring_derived = ProviderCredentials {
            access_token: "at".to_string(),
            expires_at: Some(Utc::now() + Duration::hours(1)),
            derived_token: Some("dt".to_string()),
            derived_expires_at: Some(Utc::now() + Duration::minutes(2)),
            ..Default::default()
        };
        assert!(executor.needs_refresh(&expiring_derived));

        // 两级都新鲜
        let fresh = ProviderCredentials {
            access_token: "at".to_string(),
            expires_at: Some(Utc::now() + Duration::hours(1)),
            derived_token: Some("dt".to_string()),
            derived_expires_at: Some(Utc::now() + Duration::hours(1)),
            ..Default::default()
        };
        assert!(!executor.needs_refresh(&fresh));

        // 派生令牌新鲜但访问令牌临期，基础判定兜底
        let expiring_access = ProviderCredentials {
            access_token: "at".to_string(),
            expires_at: Some(Utc::now() + Duration::seconds(30)),
            derived_token: Some("dt".to_string()),
            derived_expires_at: Some(Utc::now() + Duration::hours(1)),
            ..Default::default()
        };
        assert!(executor.needs_refresh(&expiring_access));
    }
}
