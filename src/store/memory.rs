//! # 内存凭证存储
//!
//! 基于 `DashMap` 的 [`CredentialStore`] 实现。按记录粒度加锁，
//! 计数增量在持有分片锁的情况下完成读改写，天然原子。

use dashmap::DashMap;

use async_trait::async_trait;
use chrono::Utc;

use super::types::{ApiKey, ConnectionPatch, ProviderConnection};
use super::CredentialStore;
use crate::error::Result;
use crate::store_error;

/// 内存存储
///
/// `key_index` 维护密钥值到记录 ID 的反查索引；密钥值创建后不可变，
/// 索引只在插入时写入。
#[derive(Debug, Default)]
pub struct InMemoryCredentialStore {
    api_keys: DashMap<String, ApiKey>,
    key_index: DashMap<String, String>,
    connections: DashMap<String, ProviderConnection>,
}

impl InMemoryCredentialStore {
    /// 新建空存储
    pub fn new() -> Self {
        Self::default()
    }

    /// 写入（或覆盖）一条 API 密钥记录
    pub fn insert_api_key(&self, key: ApiKey) {
        self.key_index.insert(key.value.clone(), key.id.clone());
        self.api_keys.insert(key.id.clone(), key);
    }

    /// 写入（或覆盖）一条服务商连接记录
    pub fn insert_connection(&self, connection: ProviderConnection) {
        self.connections.insert(connection.id.clone(), connection);
    }

    /// 当前密钥记录数
    pub fn api_key_count(&self) -> usize {
        self.api_keys.len()
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn get_api_key_by_value(&self, value: &str) -> Result<Option<ApiKey>> {
        let Some(id) = self.key_index.get(value).map(|entry| entry.clone()) else {
            return Ok(None);
        };
        Ok(self.api_keys.get(&id).map(|entry| entry.clone()))
    }

    async fn get_api_key_by_id(&self, id: &str) -> Result<Option<ApiKey>> {
        Ok(self.api_keys.get(id).map(|entry| entry.clone()))
    }

    async fn increment_api_key_request_usage(&self, id: &str, amount: i64) -> Result<ApiKey> {
        let mut entry = self
            .api_keys
            .get_mut(id)
            .ok_or_else(|| store_error!("API密钥不存在: {}", id))?;
        entry.request_used += amount;
        Ok(entry.clone())
    }

    async fn increment_api_key_token_usage(&self, id: &str, amount: i64) -> Result<ApiKey> {
        let mut entry = self
            .api_keys
            .get_mut(id)
            .ok_or_else(|| store_error!("API密钥不存在: {}", id))?;
        entry.token_used += amount;
        Ok(entry.clone())
    }

    async fn get_provider_connection_by_id(
        &self,
        id: &str,
    ) -> Result<Option<ProviderConnection>> {
        Ok(self.connections.get(id).map(|entry| entry.clone()))
    }

    async fn update_provider_connection(
        &self,
        id: &str,
        patch: ConnectionPatch,
    ) -> Result<ProviderConnection> {
        let mut entry = self
            .connections
            .get_mut(id)
            .ok_or_else(|| store_error!("服务商连接不存在: {}", id))?;
        if let Some(credentials) = patch.credentials {
            entry.credentials = credentials;
        }
        if let Some(account_email) = patch.account_email {
            entry.account_email = Some(account_email);
        }
        entry.updated_at = Utc::now();
        Ok(entry.clone())
    }
}
