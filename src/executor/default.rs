//! # 通用 Executor
//!
//! 未注册特化策略的服务商走这里：常见服务商按内置主机表拼 URL，
//! 其余把服务商 ID 当自定义主机用；请求头只带 Bearer 认证和内容
//! 协商；请求体原样透传；刷新委托给统一分发入口。

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};

use super::Executor;
use crate::error::Result;
use crate::refresh::CredentialRefresher;
use crate::store::ProviderCredentials;

/// 通用策略
pub struct DefaultExecutor {
    provider_id: String,
    refresher: Arc<CredentialRefresher>,
}

impl DefaultExecutor {
    /// 为指定服务商 ID 创建通用策略
    pub fn new(provider_id: impl Into<String>, refresher: Arc<CredentialRefresher>) -> Self {
        Self {
            provider_id: provider_id.into(),
            refresher,
        }
    }
}

#[async_trait]
impl Executor for DefaultExecutor {
    fn provider_id(&self) -> &str {
        &self.provider_id
    }

    fn build_url(&self, model: &str, stream: bool, _url_index: usize) -> Result<String> {
        let url = match self.provider_id.as_str() {
            "openai" => "https://api.openai.com/v1/chat/completions".to_string(),
            "claude" | "anthropic" => "https://api.anthropic.com/v1/messages".to_string(),
            "gemini" | "google" => {
                let method = if stream {
                    "streamGenerateContent?alt=sse"
                } else {
                    "generateContent"
                };
                format!(
                    "https://generativelanguage.googleapis.com/v1beta/models/{model}:{method}"
                )
            }
            // 其余 ID 当自定义主机处理
            custom_host => format!("https://{custom_host}/v1/chat/completions"),
        };
        Ok(url)
    }

    fn build_headers(&self, credentials: &ProviderCredentials, stream: bool) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", credentials.access_token))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if stream {
            headers.insert(ACCEPT, HeaderValue::from_static("text/event-stream"));
        } else {
            headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        }
        Ok(headers)
    }

    async fn refresh_credentials(
        &self,
        credentials: &ProviderCredentials,
    ) -> Option<ProviderCredentials> {
        self.refresher
            .refresh_token_by_provider(&self.provider_id, credentials)
            .await
    }
}
