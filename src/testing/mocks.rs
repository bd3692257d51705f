//! # 测试 Mock 辅助
//!
//! wiremock 端点搭建与刷新链路的响应模板。

use std::collections::HashMap;

use once_cell::sync::Lazy;
use serde_json::{Value, json};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::executor::{PROVIDER_ANTIGRAVITY, PROVIDER_CODEX};
use crate::refresh::{OAuthFlowConfig, ProviderRefreshFlow};

/// OAuth 刷新端点的挂载路径
pub const OAUTH_TOKEN_PATH: &str = "/oauth/token";
/// 派生令牌交换端点的挂载路径
pub const DERIVED_TOKEN_PATH: &str = "/v1internal:fetchSessionToken";

static OAUTH_BODY_TEMPLATE: Lazy<Value> = Lazy::new(|| {
    json!({
        "access_token": "ya29.mock-access",
        "refresh_token": "1//mock-refresh",
        "expires_in": 3600,
        "token_type": "Bearer",
        "scope": "openid"
    })
});

/// 标准 OAuth 刷新成功响应体
pub fn oauth_token_body(access_token: &str, refresh_token: Option<&str>) -> Value {
    let mut body = OAUTH_BODY_TEMPLATE.clone();
    body["access_token"] = json!(access_token);
    match refresh_token {
        Some(token) => body["refresh_token"] = json!(token),
        None => {
            body.as_object_mut()
                .and_then(|map| map.remove("refresh_token"));
        }
    }
    body
}

/// OAuth 错误响应体
pub fn oauth_error_body(error: &str, description: &str) -> Value {
    json!({ "error": error, "error_description": description })
}

/// 派生令牌交换成功响应体
pub fn derived_token_body(token: &str, expires_in_secs: i64) -> Value {
    json!({ "token": token, "expiresIn": expires_in_secs })
}

/// 挂载 OAuth 刷新端点
pub async fn mount_oauth_token(server: &MockServer, response: ResponseTemplate) {
    Mock::given(method("POST"))
        .and(path(OAUTH_TOKEN_PATH))
        .respond_with(response)
        .mount(server)
        .await;
}

/// 挂载派生令牌交换端点
pub async fn mount_derived_token(server: &MockServer, response: ResponseTemplate) {
    Mock::given(method("POST"))
        .and(path(DERIVED_TOKEN_PATH))
        .respond_with(response)
        .mount(server)
        .await;
}

/// 指向 mock 服务器的刷新流程表
///
/// antigravity 走两级链路，codex 只走 OAuth 刷新。
pub fn mock_flows(server_uri: &str) -> HashMap<String, ProviderRefreshFlow> {
    let mut flows = HashMap::new();
    flows.insert(
        PROVIDER_ANTIGRAVITY.to_string(),
        ProviderRefreshFlow {
            oauth: OAuthFlowConfig::confidential_client(
                format!("{server_uri}{OAUTH_TOKEN_PATH}"),
                "test-client-id",
                "test-client-secret",
            ),
            derived_exchange_url: Some(format!("{server_uri}{DERIVED_TOKEN_PATH}")),
        },
    );
    flows.insert(
        PROVIDER_CODEX.to_string(),
        ProviderRefreshFlow {
            oauth: OAuthFlowConfig::public_client(
                format!("{server_uri}{OAUTH_TOKEN_PATH}"),
                "test-client-id",
            ),
            derived_exchange_url: None,
        },
    );
    flows
}
