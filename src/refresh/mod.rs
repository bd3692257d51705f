//! # 凭证刷新子系统
//!
//! 统一入口 `refresh_token_by_provider` 按服务商 ID 分发到对应的
//! 刷新流程：单级服务商走一次 OAuth 刷新授权，两级服务商走
//! 派生交换、OAuth 刷新、派生重试的完整链条。失败一律返回 `None`
//! 而不是上抛，重试节奏交给调用方。
//!
//! `RefreshManager` 是带存储的编排层：按连接加锁、重读、复查
//! 是否需要刷新，把并发的过期调用合并成一次真实刷新。

pub mod derived;
pub mod token_exchange;

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};

pub use derived::{DerivedGrant, DerivedTokenClient, RetryConfig};
pub use token_exchange::{OAuthFlowConfig, TokenExchangeClient, TokenGrant, TokenResponse};

use crate::config::RefreshConfig;
use crate::error::Result;
use crate::executor::{ExecutorRegistry, PROVIDER_ANTIGRAVITY, PROVIDER_CODEX};
use crate::logging::{LogComponent, LogStage};
use crate::store::{ConnectionPatch, CredentialStore, ProviderCredentials};
use crate::transport::OutboundTransport;
use crate::{ldebug, lerror, linfo, lwarn, store_error};

// Google 安装式应用的内置 OAuth 凭证，antigravity 客户端公开携带
const ANTIGRAVITY_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const ANTIGRAVITY_CLIENT_ID: &str =
    "1071006060591-tmhssin2h21lcre235vtolojh4g403ep.apps.googleusercontent.com";
const ANTIGRAVITY_CLIENT_SECRET: &str = "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";
const ANTIGRAVITY_DERIVED_EXCHANGE_URL: &str =
    "https://cloudcode-pa.googleapis.com/v1internal:fetchSessionToken";

const CODEX_TOKEN_URL: &str = "https://auth.openai.com/oauth/token";
const CODEX_CLIENT_ID: &str = "app_EMoamEEZ73f0CkXaXp7hrann";

/// 一个服务商的刷新流程描述
#[derive(Debug, Clone)]
pub struct ProviderRefreshFlow {
    /// OAuth 刷新授权配置
    pub oauth: OAuthFlowConfig,
    /// 两级凭证服务商的派生交换端点，单级服务商为 None
    pub derived_exchange_url: Option<String>,
}

/// 内置服务商的刷新流程表
pub fn default_flows() -> HashMap<String, ProviderRefreshFlow> {
    let mut flows = HashMap::new();
    flows.insert(
        PROVIDER_ANTIGRAVITY.to_string(),
        ProviderRefreshFlow {
            oauth: OAuthFlowConfig::confidential_client(
                ANTIGRAVITY_TOKEN_URL,
                ANTIGRAVITY_CLIENT_ID,
                ANTIGRAVITY_CLIENT_SECRET,
            ),
            derived_exchange_url: Some(ANTIGRAVITY_DERIVED_EXCHANGE_URL.to_string()),
        },
    );
    flows.insert(
        PROVIDER_CODEX.to_string(),
        ProviderRefreshFlow {
            oauth: OAuthFlowConfig::public_client(CODEX_TOKEN_URL, CODEX_CLIENT_ID),
            derived_exchange_url: None,
        },
    );
    flows
}

/// 按服务商分发的凭证刷新器
pub struct CredentialRefresher {
    oauth_client: TokenExchangeClient,
    derived_client: DerivedTokenClient,
    flows: HashMap<String, ProviderRefreshFlow>,
}

impl CredentialRefresher {
    /// 用内置流程表构造
    pub fn new(transport: Arc<dyn OutboundTransport>, config: &RefreshConfig) -> Result<Self> {
        Self::with_flows(transport, config, default_flows())
    }

    /// 用自定义流程表构造，测试时把端点指向本地 mock
    pub fn with_flows(
        transport: Arc<dyn OutboundTransport>,
        config: &RefreshConfig,
        flows: HashMap<String, ProviderRefreshFlow>,
    ) -> Result<Self> {
        Ok(Self {
            oauth_client: TokenExchangeClient::new(Arc::clone(&transport))?,
            derived_client: DerivedTokenClient::new(transport, RetryConfig::from_refresh(config))?,
            flows,
        })
    }

    /// 该服务商是否注册了刷新流程
    pub fn has_flow(&self, provider_id: &str) -> bool {
        self.flows.contains_key(provider_id)
    }

    /// 统一刷新入口
    ///
    /// 没有流程、缺少刷新令牌、链条全部失败都返回 `None`，
    /// 存储里的凭证保持不动。
    pub async fn refresh_token_by_provider(
        &self,
        provider_id: &str,
        credentials: &ProviderCredentials,
    ) -> Option<ProviderCredentials> {
        let Some(flow) = self.flows.get(provider_id) else {
            ldebug!(
                provider_id,
                LogStage::Authentication,
                LogComponent::RefreshService,
                "no_refresh_flow",
                "该服务商没有注册刷新流程"
            );
            return None;
        };

        if flow.derived_exchange_url.is_some() {
            self.refresh_two_tier(provider_id, flow, credentials).await
        } else {
            self.refresh_oauth_only(provider_id, flow, credentials)
                .await
        }
    }

    /// 单级流程：一次刷新授权
    async fn refresh_oauth_only(
        &self,
        provider_id: &str,
        flow: &ProviderRefreshFlow,
        credentials: &ProviderCredentials,
    ) -> Option<ProviderCredentials> {
        let Some(refresh_token) = credentials.refresh_token.as_deref() else {
            lwarn!(
                provider_id,
                LogStage::Authentication,
                LogComponent::RefreshService,
                "refresh_token_missing",
                "凭证缺少刷新令牌，无法刷新"
            );
            return None;
        };

        match self
            .oauth_client
            .refresh_access_token(&flow.oauth, refresh_token)
            .await
        {
            Ok(grant) => {
                let mut next = credentials.clone();
                apply_grant(&mut next, &grant);
                linfo!(
                    provider_id,
                    LogStage::Authentication,
                    LogComponent::RefreshService,
                    "oauth_refresh_succeeded",
                    "访问令牌刷新成功"
                );
                Some(next)
            }
            Err(err) => {
                lwarn!(
                    provider_id,
                    LogStage::Authentication,
                    LogComponent::RefreshService,
                    "oauth_refresh_failed",
                    "刷新授权失败",
                    error = %err
                );
                None
            }
        }
    }

    /// 两级流程：派生交换、OAuth 刷新、派生重试
    async fn refresh_two_tier(
        &self,
        provider_id: &str,
        flow: &ProviderRefreshFlow,
        credentials: &ProviderCredentials,
    ) -> Option<ProviderCredentials> {
        let exchange_url = flow.derived_exchange_url.as_deref()?;

        // 步骤1：先用手头的访问令牌直接换派生令牌
        match self
            .derived_client
            .exchange(exchange_url, &credentials.access_token)
            .await
        {
            Ok(grant) => {
                // 一次成功：访问/刷新令牌原样保留，只更新派生令牌
                let mut next = credentials.clone();
                next.derived_token = Some(grant.token);
                next.derived_expires_at = grant.expires_at;
                linfo!(
                    provider_id,
                    LogStage::Authentication,
                    LogComponent::RefreshService,
                    "derived_refresh_direct",
                    "派生令牌直接换取成功"
                );
                return Some(next);
            }
            Err(err) => {
                lwarn!(
                    provider_id,
                    LogStage::Authentication,
                    LogComponent::RefreshService,
                    "derived_direct_failed",
                    "当前访问令牌换派生令牌失败，转入OAuth刷新",
                    error = %err
                );
            }
        }

        // 步骤2：用刷新令牌换新的 OAuth 对
        let Some(refresh_token) = credentials.refresh_token.as_deref() else {
            lwarn!(
                provider_id,
                LogStage::Authentication,
                LogComponent::RefreshService,
                "refresh_token_missing",
                "凭证缺少刷新令牌，刷新链条终止"
            );
            return None;
        };
        let oauth_grant = match self
            .oauth_client
            .refresh_access_token(&flow.oauth, refresh_token)
            .await
        {
            Ok(grant) => grant,
            Err(err) => {
                lwarn!(
                    provider_id,
                    LogStage::Authentication,
                    LogComponent::RefreshService,
                    "oauth_refresh_failed",
                    "OAuth刷新失败，刷新链条终止",
                    error = %err
                );
                return None;
            }
        };

        // 步骤3：拿新访问令牌重试派生交换
        let mut next = credentials.clone();
        apply_grant(&mut next, &oauth_grant);
        match self
            .derived_client
            .exchange(exchange_url, &oauth_grant.access_token)
            .await
        {
            Ok(derived_grant) => {
                // 新 OAuth 对和新派生令牌一起返回
                next.derived_token = Some(derived_grant.token);
                next.derived_expires_at = derived_grant.expires_at;
                linfo!(
                    provider_id,
                    LogStage::Authentication,
                    LogComponent::RefreshService,
                    "derived_refresh_after_oauth",
                    "OAuth刷新后派生令牌换取成功"
                );
                Some(next)
            }
            Err(err) => {
                // OAuth 对已经换新，派生令牌保持陈旧，下次调用再试
                lwarn!(
                    provider_id,
                    LogStage::Authentication,
                    LogComponent::RefreshService,
                    "derived_retry_failed",
                    "新访问令牌仍换不到派生令牌，仅返回OAuth对",
                    error = %err
                );
                Some(next)
            }
        }
    }
}

/// 把刷新授权结果并入凭证袋
///
/// 端点未返回新刷新令牌时沿用旧值；过期信息整体以新授权为准。
fn apply_grant(bag: &mut ProviderCredentials, grant: &TokenGrant) {
    bag.access_token = grant.access_token.clone();
    if let Some(refresh_token) = &grant.refresh_token {
        bag.refresh_token = Some(refresh_token.clone());
    }
    bag.expires_in = grant.expires_in;
    bag.expires_at = grant.expires_at;
    if let Some(id_token) = &grant.id_token {
        bag.extra.insert(
            "id_token".to_string(),
            serde_json::Value::String(id_token.clone()),
        );
    }
}

/// 带存储的刷新编排器
///
/// 同一连接的并发刷新合并为一次：按连接取互斥锁，拿锁后重读
/// 连接并复查 `needs_refresh`，确有必要才跑刷新链条并回写存储。
pub struct RefreshManager {
    store: Arc<dyn CredentialStore>,
    registry: Arc<ExecutorRegistry>,
    refresh_locks: RwLock<HashMap<String, Arc<Mutex<()>>>>,
}

impl RefreshManager {
    /// 创建编排器
    pub fn new(store: Arc<dyn CredentialStore>, registry: Arc<ExecutorRegistry>) -> Self {
        Self {
            store,
            registry,
            refresh_locks: RwLock::new(HashMap::new()),
        }
    }

    /// 刷新一个连接的凭证
    ///
    /// 返回 `Some(credentials)` 表示拿到了可用凭证（可能是并发刷新
    /// 留下的新鲜值），`None` 表示刷新链条全部失败；存储异常上抛。
    pub async fn refresh_connection(
        &self,
        connection_id: &str,
    ) -> Result<Option<ProviderCredentials>> {
        let lock = self.connection_lock(connection_id).await;
        let _guard = lock.lock().await;

        // 拿锁后重读，并发的另一次刷新可能已经完成
        let connection = self
            .store
            .get_provider_connection_by_id(connection_id)
            .await?
            .ok_or_else(|| store_error!("服务商连接不存在: {}", connection_id))?;

        let executor = self.registry.get_executor(&connection.provider_id);
        if !executor.needs_refresh(&connection.credentials) {
            ldebug!(
                connection_id,
                LogStage::Authentication,
                LogComponent::RefreshService,
                "refresh_skipped",
                "凭证仍然新鲜，跳过刷新"
            );
            return Ok(Some(connection.credentials));
        }

        match executor.refresh_credentials(&connection.credentials).await {
            Some(new_credentials) => {
                let updated = self
                    .store
                    .update_provider_connection(
                        connection_id,
                        ConnectionPatch::credentials(new_credentials),
                    )
                    .await?;
                linfo!(
                    connection_id,
                    LogStage::Authentication,
                    LogComponent::RefreshService,
                    "connection_refreshed",
                    "连接凭证已刷新入库",
                    provider = %connection.provider_id
                );
                Ok(Some(updated.credentials))
            }
            None => {
                lerror!(
                    connection_id,
                    LogStage::Error,
                    LogComponent::RefreshService,
                    "connection_refresh_failed",
                    "刷新链条全部失败，保留原凭证",
                    provider = %connection.provider_id
                );
                Ok(None)
            }
        }
    }

    /// 取（或建）该连接的互斥锁
    async fn connection_lock(&self, connection_id: &str) -> Arc<Mutex<()>> {
        if let Some(lock) = self.refresh_locks.read().await.get(connection_id) {
            return Arc::clone(lock);
        }
        let mut locks = self.refresh_locks.write().await;
        Arc::clone(
            locks
                .entry(connection_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(()))),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assert_error_type;
    use crate::error::GatewayError;
    use crate::store::MockCredentialStore;
    use crate::testing::fixtures::{ConnectionFixture, CredentialsFixture};
    use crate::testing::helpers::{fast_test_config, init_test_env, seeded_store};
    use crate::testing::mocks::{
        derived_token_body, mock_flows, mount_derived_token, mount_oauth_token,
        oauth_error_body, oauth_token_body,
    };
    use crate::transport::PlainTransport;
    use wiremock::{MockServer, ResponseTemplate};

    fn test_refresher() -> CredentialRefresher {
        let transport: Arc<dyn OutboundTransport> =
            Arc::new(PlainTransport::new().expect("plain transport"));
        CredentialRefresher::new(transport, &RefreshConfig::default()).expect("refresher")
    }

    fn mock_refresher(server_uri: &str) -> CredentialRefresher {
        let transport: Arc<dyn OutboundTransport> =
            Arc::new(PlainTransport::new().expect("plain transport"));
        CredentialRefresher::with_flows(
            transport,
            &fast_test_config().refresh,
            mock_flows(server_uri),
        )
        .expect("refresher")
    }

    #[test]
    fn test_default_flows_cover_builtin_providers() {
        let flows = default_flows();
        assert!(flows[PROVIDER_ANTIGRAVITY].derived_exchange_url.is_some());
        assert!(flows[PROVIDER_CODEX].derived_exchange_url.is_none());
        assert!(flows[PROVIDER_CODEX].oauth.client_secret.is_none());
    }

    #[tokio::test]
    async fn test_unknown_provider_returns_none_without_network() {
        let refresher = test_refresher();
        assert!(!refresher.has_flow("mystery"));
        let creds = ProviderCredentials::bearer_only("at");
        assert!(refresher
            .refresh_token_by_provider("mystery", &creds)
            .await
            .is_none());
    }

    #[tokio::test]
    async fn test_oauth_only_without_refresh_token_returns_none() {
        let refresher = test_refresher();
        let creds = ProviderCredentials::bearer_only("at");
        assert!(refresher
            .refresh_token_by_provider(PROVIDER_CODEX, &creds)
            .await
            .is_none());
    }

    #[test]
    fn test_apply_grant_keeps_old_refresh_token_when_absent() {
        let mut bag = ProviderCredentials {
            access_token: "old-at".to_string(),
            refresh_token: Some("old-rt".to_string()),
            expires_in: Some(3600),
            ..Default::default()
        };
        let grant = TokenGrant {
            access_token: "new-at".to_string(),
            refresh_token: None,
            id_token: None,
            expires_in: Some(1800),
            expires_at: None,
            scope: None,
        };
        apply_grant(&mut bag, &grant);
        assert_eq!(bag.access_token, "new-at");
        assert_eq!(bag.refresh_token.as_deref(), Some("old-rt"));
        assert_eq!(bag.expires_in, Some(1800));
    }

    #[tokio::test]
    async fn test_oauth_only_round_trip_against_mock_server() {
        init_test_env();
        let server = MockServer::start().await;
        mount_oauth_token(
            &server,
            ResponseTemplate::new(200)
                .set_body_json(oauth_token_body("new-at", Some("new-rt"))),
        )
        .await;

        let refresher = mock_refresher(&server.uri());
        let stale = CredentialsFixture::new()
            .access_token("old-at")
            .refresh_token("old-rt")
            .expired()
            .build();

        let next = refresher
            .refresh_token_by_provider(PROVIDER_CODEX, &stale)
            .await
            .expect("刷新应当成功");
        assert_eq!(next.access_token, "new-at");
        assert_eq!(next.refresh_token.as_deref(), Some("new-rt"));
    }

    #[tokio::test]
    async fn test_two_tier_direct_exchange_keeps_oauth_pair() {
        init_test_env();
        let server = MockServer::start().await;
        mount_derived_token(
            &server,
            ResponseTemplate::new(200)
                .set_body_json(derived_token_body("derived-new", 600)),
        )
        .await;

        let refresher = mock_refresher(&server.uri());
        let creds = CredentialsFixture::new().derived_token("derived-old").build();

        let next = refresher
            .refresh_token_by_provider(PROVIDER_ANTIGRAVITY, &creds)
            .await
            .expect("派生交换应当成功");
        assert_eq!(next.derived_token.as_deref(), Some("derived-new"));
        assert_eq!(next.access_token, creds.access_token);
        assert_eq!(next.refresh_token, creds.refresh_token);
    }

    #[tokio::test]
    async fn test_revoked_refresh_token_ends_chain() {
        init_test_env();
        let server = MockServer::start().await;
        mount_derived_token(&server, ResponseTemplate::new(401)).await;
        mount_oauth_token(
            &server,
            ResponseTemplate::new(400)
                .set_body_json(oauth_error_body("invalid_grant", "Token has been revoked")),
        )
        .await;

        let refresher = mock_refresher(&server.uri());
        let creds = CredentialsFixture::new().build();
        assert!(refresher
            .refresh_token_by_provider(PROVIDER_ANTIGRAVITY, &creds)
            .await
            .is_none());
    }

    #[tokio::test]
    async fn test_manager_persists_refreshed_connection() {
        init_test_env();
        let server = MockServer::start().await;
        mount_derived_token(
            &server,
            ResponseTemplate::new(200)
                .set_body_json(derived_token_body("derived-new", 600)),
        )
        .await;

        let store = seeded_store(
            Vec::new(),
            vec![ConnectionFixture::new()
                .id("conn-ag")
                .credentials(CredentialsFixture::new().expired().build())
                .build()],
        );
        let registry = Arc::new(ExecutorRegistry::new(Arc::new(mock_refresher(
            &server.uri(),
        ))));
        let manager = RefreshManager::new(store.clone(), registry);

        let refreshed = manager
            .refresh_connection("conn-ag")
            .await
            .expect("存储应当可用")
            .expect("刷新应当成功");
        assert_eq!(refreshed.derived_token.as_deref(), Some("derived-new"));

        let stored = store
            .get_provider_connection_by_id("conn-ag")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            stored.credentials.derived_token.as_deref(),
            Some("derived-new")
        );
    }

    #[tokio::test]
    async fn test_manager_propagates_store_read_failures() {
        let mut store = MockCredentialStore::new();
        store
            .expect_get_provider_connection_by_id()
            .returning(|_| Err(store_error!("后端不可用")));
        let registry = Arc::new(ExecutorRegistry::new(Arc::new(test_refresher())));
        let manager = RefreshManager::new(Arc::new(store), registry);

        let result = manager.refresh_connection("conn-1").await;
        assert_error_type!(result, GatewayError::Store { .. });
    }
}
