//! # OAuth 刷新授权客户端
//!
//! 标准 OAuth 2.0 refresh_token 授权：form 编码请求、JSON 响应、
//! 错误体里的 error/error_description 透传。刷新授权不做重试，
//! 失败通常意味着刷新令牌已被吊销，重试没有意义。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::logging::{LogComponent, LogStage};
use crate::transport::OutboundTransport;
use crate::{auth_error, ldebug, network_error};

/// 令牌端点等待上限
const TOKEN_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// 每个服务商一份的刷新授权配置
#[derive(Debug, Clone)]
pub struct OAuthFlowConfig {
    /// 令牌端点
    pub token_url: String,
    /// 客户端 ID
    pub client_id: String,
    /// 客户端密钥，公共客户端为 None
    pub client_secret: Option<String>,
    /// 密钥走 Basic 认证头而不是表单字段
    pub use_basic_auth: bool,
    /// 服务商要求的额外表单参数
    pub extra_params: Vec<(String, String)>,
}

impl OAuthFlowConfig {
    /// 公共客户端配置（无密钥）
    pub fn public_client(token_url: impl Into<String>, client_id: impl Into<String>) -> Self {
        Self {
            token_url: token_url.into(),
            client_id: client_id.into(),
            client_secret: None,
            use_basic_auth: false,
            extra_params: Vec::new(),
        }
    }

    /// 机密客户端配置（密钥随表单提交）
    pub fn confidential_client(
        token_url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            token_url: token_url.into(),
            client_id: client_id.into(),
            client_secret: Some(client_secret.into()),
            use_basic_auth: false,
            extra_params: Vec::new(),
        }
    }
}

/// 令牌端点原始响应
///
/// 成功与失败字段合在一张表上，先整体解析再判错。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenResponse {
    pub access_token: Option<String>,
    pub token_type: Option<String>,
    pub expires_in: Option<i64>,
    pub refresh_token: Option<String>,
    pub id_token: Option<String>,
    pub scope: Option<String>,
    // 错误响应字段
    pub error: Option<String>,
    pub error_description: Option<String>,
}

/// 解析后的刷新授权结果
#[derive(Debug, Clone, PartialEq)]
pub struct TokenGrant {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub id_token: Option<String>,
    pub expires_in: Option<i64>,
    pub expires_at: Option<DateTime<Utc>>,
    pub scope: Option<String>,
}

/// Token交换客户端
///
/// 只负责构造请求和解析响应，网络收发交给注入的传输层。
pub struct TokenExchangeClient {
    builder: reqwest::Client,
    transport: Arc<dyn OutboundTransport>,
}

impl TokenExchangeClient {
    /// 创建新的Token交换客户端
    pub fn new(transport: Arc<dyn OutboundTransport>) -> Result<Self> {
        let builder = reqwest::Client::builder().build()?;
        Ok(Self { builder, transport })
    }

    /// 用刷新令牌换新的访问令牌
    pub async fn refresh_access_token(
        &self,
        flow: &OAuthFlowConfig,
        refresh_token: &str,
    ) -> Result<TokenGrant> {
        let mut form_params = HashMap::new();
        form_params.insert("grant_type".to_string(), "refresh_token".to_string());
        form_params.insert("client_id".to_string(), flow.client_id.clone());
        form_params.insert("refresh_token".to_string(), refresh_token.to_string());

        if let Some(client_secret) = &flow.client_secret {
            if !flow.use_basic_auth {
                form_params.insert("client_secret".to_string(), client_secret.clone());
            }
        }
        for (key, value) in &flow.extra_params {
            form_params.insert(key.clone(), value.clone());
        }

        let mut request = self
            .builder
            .post(&flow.token_url)
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .header(ACCEPT, "application/json")
            .timeout(TOKEN_REQUEST_TIMEOUT)
            .form(&form_params);

        if flow.use_basic_auth {
            if let Some(client_secret) = &flow.client_secret {
                let basic =
                    BASE64_STANDARD.encode(format!("{}:{}", flow.client_id, client_secret));
                request = request.header(AUTHORIZATION, format!("Basic {basic}"));
            }
        }

        ldebug!(
            "system",
            LogStage::ExternalApi,
            LogComponent::OAuth,
            "refresh_grant_start",
            "发送刷新授权请求",
            token_url = %flow.token_url
        );

        let response = self.transport.execute(request.build()?).await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            if let Ok(error_body) = serde_json::from_str::<TokenResponse>(&body) {
                if let Some(error) = error_body.error {
                    return Err(auth_error!(
                        "刷新授权被拒绝: {}: {}",
                        error,
                        error_body.error_description.unwrap_or_default()
                    ));
                }
            }
            return Err(network_error!("刷新授权失败: HTTP {}: {}", status, body));
        }

        let parsed: TokenResponse = serde_json::from_str(&body)?;
        // 个别服务商用 200 返回错误体
        if let Some(error) = parsed.error {
            return Err(auth_error!(
                "刷新授权被拒绝: {}: {}",
                error,
                parsed.error_description.unwrap_or_default()
            ));
        }

        let access_token = parsed
            .access_token
            .ok_or_else(|| auth_error!("刷新授权响应缺少access_token字段"))?;
        let expires_at = parsed
            .expires_in
            .map(|seconds| Utc::now() + chrono::Duration::seconds(seconds));

        Ok(TokenGrant {
            access_token,
            refresh_token: parsed.refresh_token,
            id_token: parsed.id_token,
            expires_in: parsed.expires_in,
            expires_at,
            scope: parsed.scope,
        })
    }
}
