//! # 派生令牌交换客户端
//!
//! 两级凭证服务商用长效访问令牌换取短效派生令牌。上游偶发的
//! 408/429/5xx 和传输错误按指数退避加抖动重试；401/403/400 这类
//! 确定性失败立即上抛，让刷新链条转入 OAuth 刷新分支。

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::StatusCode;
use serde::Deserialize;

use crate::config::RefreshConfig;
use crate::error::{GatewayError, Result};
use crate::logging::{LogComponent, LogStage};
use crate::transport::OutboundTransport;
use crate::{auth_error, internal_error, ldebug, lwarn, network_error};

/// 派生交换单次请求等待上限
const EXCHANGE_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// 可重试的上游状态码
const RETRYABLE_STATUSES: [StatusCode; 6] = [
    StatusCode::REQUEST_TIMEOUT,
    StatusCode::TOO_MANY_REQUESTS,
    StatusCode::INTERNAL_SERVER_ERROR,
    StatusCode::BAD_GATEWAY,
    StatusCode::SERVICE_UNAVAILABLE,
    StatusCode::GATEWAY_TIMEOUT,
];

/// 重试预算
#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    /// 总尝试次数（含首次）
    pub max_attempts: u32,
    /// 首次重试前的基础等待
    pub base_delay: Duration,
    /// 等待上限
    pub max_delay: Duration,
}

impl RetryConfig {
    /// 从 `[refresh]` 配置段换算
    pub fn from_refresh(config: &RefreshConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
        }
    }

    /// 第 `attempt` 次失败后的等待：指数退避加随机抖动
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let backoff_ms = self
            .base_delay
            .as_millis()
            .saturating_mul(1u128 << exponent)
            .min(self.max_delay.as_millis()) as u64;
        let jitter_ms = fastrand::u64(..=backoff_ms / 2);
        Duration::from_millis(backoff_ms.saturating_add(jitter_ms).min(
            u64::try_from(self.max_delay.as_millis()).unwrap_or(u64::MAX),
        ))
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::from_refresh(&RefreshConfig::default())
    }
}

/// 派生令牌端点响应
///
/// 过期信息两种写法都见过：相对秒数或绝对时间点。
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct DerivedTokenResponse {
    token: Option<String>,
    expires_in: Option<i64>,
    expire_time: Option<DateTime<Utc>>,
}

/// 解析后的派生令牌
#[derive(Debug, Clone, PartialEq)]
pub struct DerivedGrant {
    pub token: String,
    pub expires_at: Option<DateTime<Utc>>,
}

enum ExchangeFailure {
    /// 值得重试的瞬时失败
    Transient(GatewayError),
    /// 确定性失败，重试无意义
    Fatal(GatewayError),
}

/// 派生令牌交换客户端
pub struct DerivedTokenClient {
    builder: reqwest::Client,
    transport: Arc<dyn OutboundTransport>,
    retry: RetryConfig,
}

impl DerivedTokenClient {
    /// 创建客户端
    pub fn new(transport: Arc<dyn OutboundTransport>, retry: RetryConfig) -> Result<Self> {
        let builder = reqwest::Client::builder().build()?;
        Ok(Self {
            builder,
            transport,
            retry,
        })
    }

    /// 用访问令牌换派生令牌，带重试
    pub async fn exchange(&self, exchange_url: &str, access_token: &str) -> Result<DerivedGrant> {
        let mut last_err: Option<GatewayError> = None;

        for attempt in 1..=self.retry.max_attempts {
            if attempt > 1 {
                let delay = self.retry.delay_for(attempt - 1);
                ldebug!(
                    "system",
                    LogStage::ExternalApi,
                    LogComponent::DerivedToken,
                    "exchange_backoff",
                    "派生令牌交换退避等待后重试",
                    attempt = attempt,
                    delay_ms = delay.as_millis() as u64
                );
                tokio::time::sleep(delay).await;
            }

            match self.attempt_exchange(exchange_url, access_token).await {
                Ok(grant) => return Ok(grant),
                Err(ExchangeFailure::Fatal(err)) => return Err(err),
                Err(ExchangeFailure::Transient(err)) => {
                    lwarn!(
                        "system",
                        LogStage::ExternalApi,
                        LogComponent::DerivedToken,
                        "exchange_attempt_failed",
                        "派生令牌交换瞬时失败",
                        attempt = attempt,
                        error = %err
                    );
                    last_err = Some(err);
                }
            }
        }

        Err(last_err.unwrap_or_else(|| internal_error!("派生令牌交换未执行任何尝试")))
    }

    async fn attempt_exchange(
        &self,
        exchange_url: &str,
        access_token: &str,
    ) -> std::result::Result<DerivedGrant, ExchangeFailure> {
        let request = self
            .builder
            .post(exchange_url)
            .header(AUTHORIZATION, format!("Bearer {access_token}"))
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "application/json")
            .timeout(EXCHANGE_REQUEST_TIMEOUT)
            .json(&serde_json::json!({}))
            .build()
            .map_err(|err| ExchangeFailure::Fatal(err.into()))?;

        let response = self
            .transport
            .execute(request)
            .await
            .map_err(ExchangeFailure::Transient)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let err = if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
                auth_error!("派生令牌交换被拒绝: HTTP {}: {}", status, body)
            } else {
                network_error!("派生令牌交换失败: HTTP {}: {}", status, body)
            };
            if RETRYABLE_STATUSES.contains(&status) {
                return Err(ExchangeFailure::Transient(err));
            }
            return Err(ExchangeFailure::Fatal(err));
        }

        let parsed: DerivedTokenResponse = response
            .json()
            .await
            .map_err(|err| ExchangeFailure::Fatal(err.into()))?;
        let Some(token) = parsed.token.filter(|token| !token.is_empty()) else {
            return Err(ExchangeFailure::Fatal(auth_error!(
                "派生令牌响应缺少token字段"
            )));
        };

        let expires_at = parsed.expire_time.or_else(|| {
            parsed
                .expires_in
                .map(|seconds| Utc::now() + chrono::Duration::seconds(seconds))
        });

        Ok(DerivedGrant { token, expires_at })
    }
}
