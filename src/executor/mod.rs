//! # Executor 策略层
//!
//! 每个服务商一份策略对象，负责拼 URL、拼请求头、改写请求体，
//! 以及判断并执行凭证刷新。注册表按服务商 ID 分发：注册过的
//! 走特化策略，没注册的懒建一个通用策略并记忆，保证同一 ID
//! 在进程内只有一个实例。

pub mod antigravity;
pub mod codex;
pub mod default;
pub mod registry;

use async_trait::async_trait;
use chrono::Duration;
use reqwest::header::HeaderMap;

pub use antigravity::AntigravityExecutor;
pub use codex::CodexExecutor;
pub use default::DefaultExecutor;
pub use registry::ExecutorRegistry;

use crate::error::Result;
use crate::store::ProviderCredentials;

/// 内置特化服务商 ID
pub const PROVIDER_ANTIGRAVITY: &str = "antigravity";
/// 内置特化服务商 ID
pub const PROVIDER_CODEX: &str = "codex";

/// 访问令牌的预刷新提前量（毫秒）
pub const TOKEN_EXPIRY_BUFFER_MS: i64 = 60_000;

/// 基础刷新判定：过期时间点落入提前量窗口
///
/// 没有过期信息的凭证（静态密钥）永不触发刷新。
pub fn base_needs_refresh(credentials: &ProviderCredentials) -> bool {
    credentials.expires_within(Duration::milliseconds(TOKEN_EXPIRY_BUFFER_MS))
}

/// 服务商策略
///
/// 除 `refresh_credentials` 外全部是同步的进程内计算。
#[async_trait]
pub trait Executor: Send + Sync {
    /// 服务商标识
    fn provider_id(&self) -> &str;

    /// 目标端点，`url_index` 在多上游间选择，越界收敛到最后一个
    fn build_url(&self, model: &str, stream: bool, url_index: usize) -> Result<String>;

    /// 上游请求头
    fn build_headers(&self, credentials: &ProviderCredentials, stream: bool) -> Result<HeaderMap>;

    /// 出站请求体改写，返回是否有改动
    fn transform_request(
        &self,
        model: &str,
        body: &mut serde_json::Value,
        stream: bool,
        credentials: &ProviderCredentials,
    ) -> Result<bool> {
        let _ = (model, body, stream, credentials);
        Ok(false)
    }

    /// 凭证是否需要预刷新
    fn needs_refresh(&self, credentials: &ProviderCredentials) -> bool {
        base_needs_refresh(credentials)
    }

    /// 执行一次刷新，失败返回 `None`
    async fn refresh_credentials(
        &self,
        credentials: &ProviderCredentials,
    ) -> Option<ProviderCredentials>;
}
