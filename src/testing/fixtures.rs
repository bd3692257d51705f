//! # 测试数据构建器
//!
//! 密钥、凭证与连接三类 fixture，链式设值后 `build()` 出存储类型。

use chrono::{Duration, Utc};
use serde_json::Value;

use crate::store::{ApiKey, ProviderConnection, ProviderCredentials};

/// API 密钥测试数据构建器
pub struct ApiKeyFixture {
    pub id: String,
    pub value: String,
    pub is_active: bool,
    pub request_limit: i64,
    pub token_limit: i64,
    pub request_used: i64,
    pub token_used: i64,
    pub allowed_models: Vec<String>,
}

impl Default for ApiKeyFixture {
    fn default() -> Self {
        Self {
            id: "key-test".to_string(),
            value: "sk-test-key".to_string(),
            is_active: true,
            request_limit: 0,
            token_limit: 0,
            request_used: 0,
            token_used: 0,
            allowed_models: Vec::new(),
        }
    }
}

impl ApiKeyFixture {
    /// 创建新的密钥 fixture
    pub fn new() -> Self {
        Self::default()
    }

    /// 设置密钥 ID
    pub fn id(mut self, id: &str) -> Self {
        self.id = id.to_string();
        self
    }

    /// 设置密钥明文
    pub fn value(mut self, value: &str) -> Self {
        self.value = value.to_string();
        self
    }

    /// 设置为禁用状态
    pub fn inactive(mut self) -> Self {
        self.is_active = false;
        self
    }

    /// 设置请求数限额
    pub fn request_limit(mut self, limit: i64) -> Self {
        self.request_limit = limit;
        self
    }

    /// 设置已用请求数
    pub fn request_used(mut self, used: i64) -> Self {
        self.request_used = used;
        self
    }

    /// 设置令牌限额
    pub fn token_limit(mut self, limit: i64) -> Self {
        self.token_limit = limit;
        self
    }

    /// 设置已用令牌数
    pub fn token_used(mut self, used: i64) -> Self {
        self.token_used = used;
        self
    }

    /// 设置模型白名单
    pub fn allowed_models(mut self, models: &[&str]) -> Self {
        self.allowed_models = models.iter().map(|m| (*m).to_string()).collect();
        self
    }

    /// 构建 [`ApiKey`]
    pub fn build(self) -> ApiKey {
        let mut key = ApiKey::new(self.id, self.value);
        key.is_active = self.is_active;
        key.request_limit = self.request_limit;
        key.token_limit = self.token_limit;
        key.request_used = self.request_used;
        key.token_used = self.token_used;
        key.allowed_models = self.allowed_models;
        key
    }
}

/// 服务商凭证测试数据构建器
///
/// 过期偏移量相对构建时刻计算，负值代表已过期。
pub struct CredentialsFixture {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_in_secs: Option<i64>,
    pub derived_token: Option<String>,
    pub derived_expires_in_secs: Option<i64>,
    pub extra: serde_json::Map<String, Value>,
}

impl Default for CredentialsFixture {
    fn default() -> Self {
        Self {
            access_token: "ya29.test-access".to_string(),
            refresh_token: Some("1//test-refresh".to_string()),
            expires_in_secs: Some(3600),
            derived_token: None,
            derived_expires_in_secs: None,
            extra: serde_json::Map::new(),
        }
    }
}

impl CredentialsFixture {
    /// 创建新的凭证 fixture
    pub fn new() -> Self {
        Self::default()
    }

    /// 纯静态密钥：无刷新令牌、无过期时间
    pub fn bearer_only(token: &str) -> Self {
        Self {
            access_token: token.to_string(),
            refresh_token: None,
            expires_in_secs: None,
            derived_token: None,
            derived_expires_in_secs: None,
            extra: serde_json::Map::new(),
        }
    }

    /// 设置访问令牌
    pub fn access_token(mut self, token: &str) -> Self {
        self.access_token = token.to_string();
        self
    }

    /// 设置刷新令牌
    pub fn refresh_token(mut self, token: &str) -> Self {
        self.refresh_token = Some(token.to_string());
        self
    }

    /// 去掉刷新令牌
    pub fn without_refresh_token(mut self) -> Self {
        self.refresh_token = None;
        self
    }

    /// 设置访问令牌的剩余有效期（秒），负值即已过期
    pub fn expires_in_secs(mut self, secs: i64) -> Self {
        self.expires_in_secs = Some(secs);
        self
    }

    /// 访问令牌已过期
    pub fn expired(mut self) -> Self {
        self.expires_in_secs = Some(-60);
        self
    }

    /// 设置派生令牌
    pub fn derived_token(mut self, token: &str) -> Self {
        self.derived_token = Some(token.to_string());
        self
    }

    /// 设置派生令牌的剩余有效期（秒）
    pub fn derived_expires_in_secs(mut self, secs: i64) -> Self {
        self.derived_expires_in_secs = Some(secs);
        self
    }

    /// 附加额外字段
    pub fn extra(mut self, key: &str, value: Value) -> Self {
        self.extra.insert(key.to_string(), value);
        self
    }

    /// 构建 [`ProviderCredentials`]
    pub fn build(self) -> ProviderCredentials {
        let now = Utc::now();
        ProviderCredentials {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at: self.expires_in_secs.map(|s| now + Duration::seconds(s)),
            expires_in: self.expires_in_secs,
            derived_token: self.derived_token,
            derived_expires_at: self
                .derived_expires_in_secs
                .map(|s| now + Duration::seconds(s)),
            extra: self.extra,
        }
    }
}

/// 服务商连接测试数据构建器
pub struct ConnectionFixture {
    pub id: String,
    pub provider_id: String,
    pub account_email: Option<String>,
    pub credentials: ProviderCredentials,
}

impl Default for ConnectionFixture {
    fn default() -> Self {
        Self {
            id: "conn-test".to_string(),
            provider_id: "antigravity".to_string(),
            account_email: Some("dev@example.com".to_string()),
            credentials: CredentialsFixture::new().build(),
        }
    }
}

impl ConnectionFixture {
    /// 创建新的连接 fixture
    pub fn new() -> Self {
        Self::default()
    }

    /// 设置连接 ID
    pub fn id(mut self, id: &str) -> Self {
        self.id = id.to_string();
        self
    }

    /// 设置服务商
    pub fn provider(mut self, provider_id: &str) -> Self {
        self.provider_id = provider_id.to_string();
        self
    }

    /// 设置凭证
    pub fn credentials(mut self, credentials: ProviderCredentials) -> Self {
        self.credentials = credentials;
        self
    }

    /// 构建 [`ProviderConnection`]
    pub fn build(self) -> ProviderConnection {
        let mut connection =
            ProviderConnection::new(self.id, self.provider_id, self.credentials);
        connection.account_email = self.account_email;
        connection
    }
}
