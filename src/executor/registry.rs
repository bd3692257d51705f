//! # Executor 注册表
//!
//! 特化策略在构造时注册完毕；未知服务商第一次出现时懒建一个
//! 通用策略并记忆。`DashMap` 的 entry 写入保证并发首访也只产生
//! 一个实例。

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;

use super::{
    AntigravityExecutor, CodexExecutor, DefaultExecutor, Executor, PROVIDER_ANTIGRAVITY,
    PROVIDER_CODEX,
};
use crate::ldebug;
use crate::logging::{LogComponent, LogStage};
use crate::refresh::CredentialRefresher;

/// 进程级策略注册表
pub struct ExecutorRegistry {
    specialized: HashMap<String, Arc<dyn Executor>>,
    defaults: DashMap<String, Arc<dyn Executor>>,
    refresher: Arc<CredentialRefresher>,
}

impl ExecutorRegistry {
    /// 注册全部内置特化策略
    pub fn new(refresher: Arc<CredentialRefresher>) -> Self {
        let mut specialized: HashMap<String, Arc<dyn Executor>> = HashMap::new();
        specialized.insert(
            PROVIDER_ANTIGRAVITY.to_string(),
            Arc::new(AntigravityExecutor::new(Arc::clone(&refresher))),
        );
        specialized.insert(
            PROVIDER_CODEX.to_string(),
            Arc::new(CodexExecutor::new(Arc::clone(&refresher))),
        );
        Self {
            specialized,
            defaults: DashMap::new(),
            refresher,
        }
    }

    /// 取服务商的策略
    ///
    /// 特化优先；未知 ID 懒建通用策略并记忆，同一 ID 永远拿到
    /// 同一个实例。
    pub fn get_executor(&self, provider_id: &str) -> Arc<dyn Executor> {
        if let Some(executor) = self.specialized.get(provider_id) {
            return Arc::clone(executor);
        }

        if let Some(existing) = self.defaults.get(provider_id) {
            return Arc::clone(&existing);
        }

        let entry = self.defaults.entry(provider_id.to_string()).or_insert_with(|| {
            ldebug!(
                provider_id,
                LogStage::Internal,
                LogComponent::ExecutorRegistry,
                "default_executor_created",
                "为未注册服务商创建通用策略"
            );
            let executor: Arc<dyn Executor> = Arc::new(DefaultExecutor::new(
                provider_id,
                Arc::clone(&self.refresher),
            ));
            executor
        });
        Arc::clone(&entry)
    }

    /// 是否注册了特化策略
    pub fn has_specialized_executor(&self, provider_id: &str) -> bool {
        self.specialized.contains_key(provider_id)
    }

    /// 已记忆的通用策略数量
    pub fn cached_default_count(&self) -> usize {
        self.defaults.len()
    }

    /// 清空记忆的通用策略，完全重置时使用
    pub fn clear_defaults(&self) {
        self.defaults.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RefreshConfig;
    use crate::transport::{OutboundTransport, PlainTransport};

    fn registry() -> ExecutorRegistry {
        let transport: Arc<dyn OutboundTransport> =
            Arc::new(PlainTransport::new().expect("plain transport"));
        let refresher =
            CredentialRefresher::new(transport, &RefreshConfig::default()).expect("refresher");
        ExecutorRegistry::new(Arc::new(refresher))
    }

    #[test]
    fn test_specialized_lookup() {
        let registry = registry();
        assert!(registry.has_specialized_executor(PROVIDER_ANTIGRAVITY));
        assert!(registry.has_specialized_executor(PROVIDER_CODEX));
        assert!(!registry.has_specialized_executor("openai"));

        let executor = registry.get_executor(PROVIDER_CODEX);
        assert_eq!(executor.provider_id(), PROVIDER_CODEX);
        // 特化策略不进默认缓存
        assert_eq!(registry.cached_default_count(), 0);
    }

    #[test]
    fn test_default_executor_memoized_per_id() {
        let registry = registry();
        let first = registry.get_executor("openai");
        let second = registry.get_executor("openai");
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.cached_default_count(), 1);

        let other = registry.get_executor("mistral");
        assert!(!Arc::ptr_eq(&first, &other));
        assert_eq!(registry.cached_default_count(), 2);
    }

    #[test]
    fn test_specialized_instance_is_stable() {
        let registry = registry();
        let first = registry.get_executor(PROVIDER_ANTIGRAVITY);
        let second = registry.get_executor(PROVIDER_ANTIGRAVITY);
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_clear_defaults_resets_cache() {
        let registry = registry();
        registry.get_executor("openai");
        registry.get_executor("mistral");
        registry.clear_defaults();
        assert_eq!(registry.cached_default_count(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_first_access_yields_one_instance() {
        let registry = Arc::new(registry());
        let mut tasks = tokio::task::JoinSet::new();
        for _ in 0..16 {
            let registry = Arc::clone(&registry);
            tasks.spawn(async move { registry.get_executor("qwen") });
        }

        let mut instances = Vec::new();
        while let Some(result) = tasks.join_next().await {
            instances.push(result.unwrap());
        }
        assert_eq!(registry.cached_default_count(), 1);
        for pair in instances.windows(2) {
            assert!(Arc::ptr_eq(&pair[0], &pair[1]));
        }
    }
}
