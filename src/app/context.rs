//! # 网关上下文（DI 容器）
//!
//! 统一持有跨模块共享的服务实例，按依赖顺序装配，
//! 便于在测试中注入替身存储或传输。

use std::sync::Arc;

use crate::admission::AdmissionController;
use crate::config::GatewayConfig;
use crate::error::Result;
use crate::executor::ExecutorRegistry;
use crate::linfo;
use crate::logging::{LogComponent, LogStage};
use crate::refresh::{CredentialRefresher, RefreshManager};
use crate::session::SessionStore;
use crate::store::CredentialStore;
use crate::transport::{OutboundTransport, build_transport};

/// 网关服务集合
///
/// 职责：
/// - 装配传输、刷新、执行器、会话、准入五类服务（Service 层）
/// - 不包含请求处理逻辑（代理面由调用方搭建）
#[derive(Clone)]
pub struct GatewayContext {
    config: Arc<GatewayConfig>,
    store: Arc<dyn CredentialStore>,
    transport: Arc<dyn OutboundTransport>,
    registry: Arc<ExecutorRegistry>,
    refresher: Arc<CredentialRefresher>,
    refresh_manager: Arc<RefreshManager>,
    session_store: Arc<SessionStore>,
    admission: Arc<AdmissionController>,
}

impl std::fmt::Debug for GatewayContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayContext").finish_non_exhaustive()
    }
}

impl GatewayContext {
    /// 按依赖顺序初始化全部服务
    pub fn new(config: GatewayConfig, store: Arc<dyn CredentialStore>) -> Result<Self> {
        config.validate()?;
        let config = Arc::new(config);

        let transport = build_transport(&config.transport)?;
        let refresher = Arc::new(CredentialRefresher::new(
            Arc::clone(&transport),
            &config.refresh,
        )?);
        let registry = Arc::new(ExecutorRegistry::new(Arc::clone(&refresher)));
        let refresh_manager = Arc::new(RefreshManager::new(
            Arc::clone(&store),
            Arc::clone(&registry),
        ));
        let session_store = Arc::new(SessionStore::new(config.session.trim_identity_keys));
        let admission = Arc::new(AdmissionController::new(Arc::clone(&store)));

        linfo!(
            "system",
            LogStage::Startup,
            LogComponent::Config,
            "context_initialized",
            "网关上下文装配完成",
            mode = ?config.transport.mode
        );

        Ok(Self {
            config,
            store,
            transport,
            registry,
            refresher,
            refresh_manager,
            session_store,
            admission,
        })
    }

    /// 清空可再生的运行时状态
    ///
    /// 会话映射与默认执行器缓存可从存储重建，凭证数据不动。
    pub fn reset(&self) {
        self.session_store.clear();
        self.registry.clear_defaults();
        linfo!(
            "system",
            LogStage::Internal,
            LogComponent::Config,
            "context_reset",
            "运行时缓存已清空"
        );
    }

    #[must_use]
    pub fn config(&self) -> Arc<GatewayConfig> {
        Arc::clone(&self.config)
    }

    #[must_use]
    pub fn store(&self) -> Arc<dyn CredentialStore> {
        Arc::clone(&self.store)
    }

    #[must_use]
    pub fn transport(&self) -> Arc<dyn OutboundTransport> {
        Arc::clone(&self.transport)
    }

    #[must_use]
    pub fn executor_registry(&self) -> Arc<ExecutorRegistry> {
        Arc::clone(&self.registry)
    }

    #[must_use]
    pub fn refresher(&self) -> Arc<CredentialRefresher> {
        Arc::clone(&self.refresher)
    }

    #[must_use]
    pub fn refresh_manager(&self) -> Arc<RefreshManager> {
        Arc::clone(&self.refresh_manager)
    }

    #[must_use]
    pub fn session_store(&self) -> Arc<SessionStore> {
        Arc::clone(&self.session_store)
    }

    #[must_use]
    pub fn admission(&self) -> Arc<AdmissionController> {
        Arc::clone(&self.admission)
    }
}
