//! # 凭证存储接口
//!
//! 网关核心对 API 密钥与服务商连接的唯一数据入口。宿主可以接数据库、
//! 配置文件或远程服务，核心只依赖本 trait；`memory` 模块提供内置的
//! 内存实现，供测试与单机部署使用。

pub mod memory;
pub mod types;

use async_trait::async_trait;

pub use memory::InMemoryCredentialStore;
pub use types::{ApiKey, ConnectionPatch, ProviderConnection, ProviderCredentials, TokenUsage};

use crate::error::Result;

/// 凭证存储抽象
///
/// 所有方法按记录粒度原子生效；计数增量方法返回更新后的快照，
/// 供准入层拼装限额响应。
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// 按密钥值查找 API 密钥
    async fn get_api_key_by_value(&self, value: &str) -> Result<Option<ApiKey>>;

    /// 按记录 ID 查找 API 密钥
    async fn get_api_key_by_id(&self, id: &str) -> Result<Option<ApiKey>>;

    /// 请求计数加 `amount`，返回更新后的记录
    async fn increment_api_key_request_usage(&self, id: &str, amount: i64) -> Result<ApiKey>;

    /// 令牌计数加 `amount`，返回更新后的记录
    async fn increment_api_key_token_usage(&self, id: &str, amount: i64) -> Result<ApiKey>;

    /// 按连接 ID 查找服务商连接
    async fn get_provider_connection_by_id(&self, id: &str)
        -> Result<Option<ProviderConnection>>;

    /// 应用连接补丁，返回更新后的记录
    async fn update_provider_connection(
        &self,
        id: &str,
        patch: ConnectionPatch,
    ) -> Result<ProviderConnection>;
}
