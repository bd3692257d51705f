//! # 准入控制器
//!
//! 对入站请求做密钥校验、模型白名单和限额检查。
//! 同一密钥的计数检查串行化：先拿 per-key 锁，锁内重读记录再判限额，
//! 避免并发请求用同一份过期计数同时放行。

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};

use crate::error::Result;
use crate::logging::{LogComponent, LogStage};
use crate::store::{ApiKey, CredentialStore, TokenUsage};
use crate::{ldebug, lwarn};

use super::model_match::{is_model_allowed, normalize_allowed_models};
use super::response::{AdmissionRejection, QuotaSnapshot};

/// 一次待准入的请求
#[derive(Debug, Clone)]
pub struct AdmissionRequest {
    /// 日志关联用的请求 ID
    pub request_id: String,
    /// 原始 Authorization 头（或裸密钥）
    pub authorization: Option<String>,
}

impl AdmissionRequest {
    /// 构造准入请求
    pub fn new(request_id: impl Into<String>, authorization: Option<String>) -> Self {
        Self {
            request_id: request_id.into(),
            authorization,
        }
    }
}

/// 准入选项
#[derive(Debug, Clone)]
pub struct AdmissionOptions {
    /// 通过后是否消耗一次请求配额
    pub consume_request: bool,
    /// 请求的模型，`None` 则跳过白名单检查
    pub model: Option<String>,
}

impl Default for AdmissionOptions {
    fn default() -> Self {
        Self {
            consume_request: true,
            model: None,
        }
    }
}

impl AdmissionOptions {
    /// 带模型的选项
    pub fn for_model(model: impl Into<String>) -> Self {
        Self {
            consume_request: true,
            model: Some(model.into()),
        }
    }

    /// 只查不扣
    pub fn check_only() -> Self {
        Self {
            consume_request: false,
            model: None,
        }
    }
}

/// 准入通过的结果
#[derive(Debug, Clone)]
pub struct AdmissionPass {
    /// 密钥 ID
    pub api_key_id: String,
    /// 扣减后的密钥记录
    pub api_key: ApiKey,
}

impl AdmissionPass {
    /// 当前配额快照
    pub fn quota(&self) -> QuotaSnapshot {
        QuotaSnapshot::from_key(&self.api_key)
    }
}

/// 准入裁决：拒绝是数据，不走错误通道
#[derive(Debug, Clone)]
pub enum AdmissionVerdict {
    /// 放行
    Pass(AdmissionPass),
    /// 拒绝，带完整线上响应
    Reject(AdmissionRejection),
}

impl AdmissionVerdict {
    /// 是否放行
    pub const fn is_pass(&self) -> bool {
        matches!(self, Self::Pass(_))
    }
}

/// 从授权头里取出密钥明文
///
/// 容忍三种写法：`Bearer sk-xxx`（大小写不敏感）、裸密钥、带多余空白。
/// 取不出非空内容返回 `None`。
pub fn extract_bearer_secret(authorization: Option<&str>) -> Option<String> {
    let raw = authorization?.trim();
    if raw.is_empty() {
        return None;
    }
    let secret = match raw.split_once(char::is_whitespace) {
        Some((scheme, rest)) if scheme.eq_ignore_ascii_case("bearer") => rest.trim(),
        _ => raw,
    };
    if secret.is_empty() {
        None
    } else {
        Some(secret.to_string())
    }
}

/// 准入控制器
pub struct AdmissionController {
    store: Arc<dyn CredentialStore>,
    usage_locks: RwLock<HashMap<String, Arc<Mutex<()>>>>,
}

impl AdmissionController {
    /// 创建控制器
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        Self {
            store,
            usage_locks: RwLock::new(HashMap::new()),
        }
    }

    /// 校验密钥并执行限额检查
    ///
    /// 检查顺序固定：密钥存在、启用、模型白名单、请求限额、令牌限额。
    /// 请求限额先于令牌限额判定。`Err` 只代表存储层故障。
    pub async fn enforce_api_key_quota(
        &self,
        request: &AdmissionRequest,
        options: &AdmissionOptions,
    ) -> Result<AdmissionVerdict> {
        let Some(secret) = extract_bearer_secret(request.authorization.as_deref()) else {
            lwarn!(
                &request.request_id,
                LogStage::Authentication,
                LogComponent::Admission,
                "admission_rejected",
                "请求缺少API密钥"
            );
            return Ok(AdmissionVerdict::Reject(AdmissionRejection::missing_api_key()));
        };

        let Some(key) = self.store.get_api_key_by_value(&secret).await? else {
            lwarn!(
                &request.request_id,
                LogStage::Authentication,
                LogComponent::Admission,
                "admission_rejected",
                "API密钥不存在"
            );
            return Ok(AdmissionVerdict::Reject(AdmissionRejection::invalid_api_key()));
        };

        if !key.is_active {
            lwarn!(
                &request.request_id,
                LogStage::Authentication,
                LogComponent::Admission,
                "admission_rejected",
                "API密钥已禁用",
                api_key_id = %key.id
            );
            return Ok(AdmissionVerdict::Reject(AdmissionRejection::api_key_disabled()));
        }

        if let Some(model) = options.model.as_deref() {
            if !is_model_allowed(model, &key.allowed_models) {
                let allowed = normalize_allowed_models(&key.allowed_models);
                lwarn!(
                    &request.request_id,
                    LogStage::Authentication,
                    LogComponent::Admission,
                    "admission_rejected",
                    "模型不在白名单",
                    api_key_id = %key.id,
                    model = %model
                );
                return Ok(AdmissionVerdict::Reject(AdmissionRejection::model_not_allowed(
                    model, &allowed,
                )));
            }
        }

        // 计数判定在 per-key 锁内进行，锁内重读拿最新用量
        let lock = self.usage_lock(&key.id).await;
        let _guard = lock.lock().await;

        let Some(current) = self.store.get_api_key_by_id(&key.id).await? else {
            lwarn!(
                &request.request_id,
                LogStage::Authentication,
                LogComponent::Admission,
                "admission_rejected",
                "API密钥在检查期间被删除",
                api_key_id = %key.id
            );
            return Ok(AdmissionVerdict::Reject(AdmissionRejection::invalid_api_key()));
        };

        if current.request_limit > 0 && current.request_used >= current.request_limit {
            lwarn!(
                &request.request_id,
                LogStage::Authentication,
                LogComponent::Admission,
                "admission_rejected",
                "请求数限额耗尽",
                api_key_id = %current.id,
                request_used = current.request_used,
                request_limit = current.request_limit
            );
            return Ok(AdmissionVerdict::Reject(
                AdmissionRejection::request_quota_exceeded(&current),
            ));
        }

        if current.token_limit > 0 && current.token_used >= current.token_limit {
            lwarn!(
                &request.request_id,
                LogStage::Authentication,
                LogComponent::Admission,
                "admission_rejected",
                "令牌限额耗尽",
                api_key_id = %current.id,
                token_used = current.token_used,
                token_limit = current.token_limit
            );
            return Ok(AdmissionVerdict::Reject(
                AdmissionRejection::token_quota_exceeded(&current),
            ));
        }

        let settled = if options.consume_request {
            self.store
                .increment_api_key_request_usage(&current.id, 1)
                .await?
        } else {
            current
        };

        ldebug!(
            &request.request_id,
            LogStage::Authentication,
            LogComponent::Admission,
            "admission_passed",
            "准入通过",
            api_key_id = %settled.id,
            consumed = options.consume_request,
            request_used = settled.request_used
        );

        Ok(AdmissionVerdict::Pass(AdmissionPass {
            api_key_id: settled.id.clone(),
            api_key: settled,
        }))
    }

    /// 回写一次请求的令牌用量
    ///
    /// 总量非正时不落库，返回 `Ok(None)`。
    pub async fn record_api_key_token_usage(
        &self,
        request_id: &str,
        api_key_id: &str,
        usage: &TokenUsage,
    ) -> Result<Option<ApiKey>> {
        let total = usage.total();
        if total <= 0 {
            return Ok(None);
        }

        let lock = self.usage_lock(api_key_id).await;
        let _guard = lock.lock().await;

        let updated = self
            .store
            .increment_api_key_token_usage(api_key_id, total)
            .await?;

        ldebug!(
            request_id,
            LogStage::Authentication,
            LogComponent::Admission,
            "token_usage_recorded",
            "令牌用量已回写",
            api_key_id = %api_key_id,
            prompt_tokens = usage.prompt_tokens,
            completion_tokens = usage.completion_tokens,
            token_used = updated.token_used
        );

        Ok(Some(updated))
    }

    /// 取（或建）该密钥的用量互斥锁
    async fn usage_lock(&self, api_key_id: &str) -> Arc<Mutex<()>> {
        if let Some(lock) = self.usage_locks.read().await.get(api_key_id) {
            return Arc::clone(lock);
        }
        let mut locks = self.usage_locks.write().await;
        Arc::clone(
            locks
                .entry(api_key_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(()))),
        )
    }
}
