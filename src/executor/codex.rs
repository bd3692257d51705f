//! # codex 特化策略
//!
//! 单上游的 responses 接口。上游要求请求体必须带非空 instructions
//! 且 store 固定为 false，改写在发出前做一次，幂等。

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use serde_json::Value;
use uuid::Uuid;

use super::{Executor, PROVIDER_CODEX};
use crate::error::Result;
use crate::ldebug;
use crate::logging::{LogComponent, LogStage};
use crate::provider_error;
use crate::refresh::CredentialRefresher;
use crate::store::ProviderCredentials;

/// 唯一上游端点，model/stream/url_index 都不影响
const UPSTREAM_URL: &str = "https://chatgpt.com/backend-api/codex/responses";

/// instructions 缺失或为空白时注入的兜底值
const DEFAULT_INSTRUCTIONS: &str = "You are Codex, a coding agent running in the Codex CLI.";

/// codex 策略
pub struct CodexExecutor {
    refresher: Arc<CredentialRefresher>,
}

impl CodexExecutor {
    /// 创建策略
    pub fn new(refresher: Arc<CredentialRefresher>) -> Self {
        Self { refresher }
    }
}

#[async_trait]
impl Executor for CodexExecutor {
    fn provider_id(&self) -> &str {
        PROVIDER_CODEX
    }

    fn build_url(&self, _model: &str, _stream: bool, _url_index: usize) -> Result<String> {
        Ok(UPSTREAM_URL.to_string())
    }

    fn build_headers(&self, credentials: &ProviderCredentials, stream: bool) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", credentials.access_token))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            "OpenAI-Beta",
            HeaderValue::from_static("responses=experimental"),
        );
        // 每次调用一个新的会话头，需要亲和时由会话缓存层覆盖
        headers.insert(
            "session_id",
            HeaderValue::from_str(&Uuid::new_v4().to_string())?,
        );
        if let Some(account_id) = credentials
            .extra
            .get("account_id")
            .and_then(Value::as_str)
        {
            headers.insert("chatgpt-account-id", HeaderValue::from_str(account_id)?);
        }
        if stream {
            headers.insert(ACCEPT, HeaderValue::from_static("text/event-stream"));
        } else {
            headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        }
        Ok(headers)
    }

    fn transform_request(
        &self,
        model: &str,
        body: &mut Value,
        stream: bool,
        _credentials: &ProviderCredentials,
    ) -> Result<bool> {
        let Some(obj) = body.as_object_mut() else {
            return Err(provider_error!(PROVIDER_CODEX, "请求体不是JSON对象"));
        };
        let mut changed = false;

        // instructions 必须非空
        let has_instructions = obj
            .get("instructions")
            .and_then(Value::as_str)
            .is_some_and(|text| !text.trim().is_empty());
        if !has_instructions {
            ldebug!(
                PROVIDER_CODEX,
                LogStage::RequestModify,
                LogComponent::CodexExecutor,
                "instructions_injected",
                "请求缺失有效 instructions，注入默认值"
            );
            obj.insert(
                "instructions".to_string(),
                Value::String(DEFAULT_INSTRUCTIONS.to_string()),
            );
            changed = true;
        }

        // store 固定为 false
        if obj.get("store").and_then(Value::as_bool) != Some(false) {
            obj.insert("store".to_string(), Value::Bool(false));
            changed = true;
        }

        // 请求的模型与流式开关回写进请求体
        if obj.get("model").and_then(Value::as_str) != Some(model) {
            obj.insert("model".to_string(), Value::String(model.to_string()));
            changed = true;
        }
        if obj.get("stream").and_then(Value::as_bool) != Some(stream) {
            obj.insert("stream".to_string(), Value::Bool(stream));
            changed = true;
        }

        Ok(changed)
    }

    async fn refresh_credentials(
        &self,
        credentials: &ProviderCredentials,
    ) -> Option<ProviderCredentials> {
        self.refresher
            .refresh_token_by_provider(PROVIDER_CODEX, credentials)
            .await
    }
}
