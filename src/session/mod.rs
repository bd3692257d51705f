//! # 会话亲和缓存
//!
//! 为上游请求维护两张进程级映射：身份键到会话 ID 的亲和表，
//! 以及会话 ID 到最近一次请求签名的缓存。两张表都只在进程
//! 生命周期内有效，不做持久化，也不做容量淘汰。

use dashmap::DashMap;

use chrono::Utc;
use uuid::Uuid;

use crate::logging::{LogComponent, LogStage};
use crate::{ldebug, linfo};

/// 会话缓存统计
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionStats {
    /// 身份键到会话 ID 的映射条数
    pub sessions: usize,
    /// 会话签名条数
    pub signatures: usize,
}

/// 进程级会话缓存
///
/// 同一身份键总是拿到同一个会话 ID；缺失身份键时每次生成
/// 一次性 ID 且不落表，避免匿名调用互相串线。
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: DashMap<String, String>,
    signatures: DashMap<String, String>,
    trim_identity_keys: bool,
}

impl SessionStore {
    /// 新建空缓存
    pub fn new(trim_identity_keys: bool) -> Self {
        Self {
            sessions: DashMap::new(),
            signatures: DashMap::new(),
            trim_identity_keys,
        }
    }

    /// 为身份键派生会话 ID
    ///
    /// 身份键为 `None` 或空串时返回全新 ID 并且不写入亲和表；
    /// 否则首次派生后写表，后续同键调用返回同一 ID。
    pub fn derive_session_id(&self, identity_key: Option<&str>) -> String {
        let normalized = identity_key.map(|raw| {
            if self.trim_identity_keys {
                raw.trim()
            } else {
                raw
            }
        });

        let Some(key) = normalized.filter(|key| !key.is_empty()) else {
            return Self::fresh_session_id();
        };

        if let Some(existing) = self.sessions.get(key) {
            return existing.clone();
        }

        let entry = self
            .sessions
            .entry(key.to_string())
            .or_insert_with(Self::fresh_session_id);
        let session_id = entry.clone();
        drop(entry);

        ldebug!(
            "system",
            LogStage::Cache,
            LogComponent::SessionCache,
            "session_derived",
            "为身份键建立会话亲和",
            session_id = %session_id
        );
        session_id
    }

    /// 缓存会话签名，后写覆盖先写
    ///
    /// 会话 ID 或签名为空串时不落缓存。
    pub fn cache_signature(&self, session_id: &str, signature: &str) {
        if session_id.is_empty() || signature.is_empty() {
            return;
        }
        self.signatures
            .insert(session_id.to_string(), signature.to_string());
    }

    /// 读取会话签名
    pub fn get_cached_signature(&self, session_id: &str) -> Option<String> {
        self.signatures.get(session_id).map(|entry| entry.clone())
    }

    /// 清空亲和表与签名缓存
    pub fn clear(&self) {
        let stats = self.stats();
        self.sessions.clear();
        self.signatures.clear();
        linfo!(
            "system",
            LogStage::Cache,
            LogComponent::SessionCache,
            "session_store_cleared",
            "会话缓存已清空",
            sessions = stats.sessions,
            signatures = stats.signatures
        );
    }

    /// 当前缓存规模
    pub fn stats(&self) -> SessionStats {
        SessionStats {
            sessions: self.sessions.len(),
            signatures: self.signatures.len(),
        }
    }

    /// 一次性会话 ID：随机段拼接毫秒时间戳
    fn fresh_session_id() -> String {
        format!(
            "{}{}",
            Uuid::new_v4().simple(),
            Utc::now().timestamp_millis()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_identity_key_is_stable() {
        let store = SessionStore::new(true);
        let first = store.derive_session_id(Some("user@example.com"));
        let second = store.derive_session_id(Some("user@example.com"));
        assert_eq!(first, second);
        assert_eq!(store.stats().sessions, 1);
    }

    #[test]
    fn test_distinct_identity_keys_get_distinct_sessions() {
        let store = SessionStore::new(true);
        let a = store.derive_session_id(Some("a@example.com"));
        let b = store.derive_session_id(Some("b@example.com"));
        assert_ne!(a, b);
        assert_eq!(store.stats().sessions, 2);
    }

    #[test]
    fn test_missing_identity_key_is_fresh_and_uncached() {
        let store = SessionStore::new(true);
        let first = store.derive_session_id(None);
        let second = store.derive_session_id(None);
        assert_ne!(first, second);
        assert_eq!(store.stats().sessions, 0);
    }

    #[test]
    fn test_empty_identity_key_behaves_like_missing() {
        let store = SessionStore::new(true);
        let first = store.derive_session_id(Some(""));
        let second = store.derive_session_id(Some("   "));
        assert_ne!(first, second);
        assert_eq!(store.stats().sessions, 0);
    }

    #[test]
    fn test_trim_disabled_keeps_whitespace_significant() {
        let store = SessionStore::new(false);
        let padded = store.derive_session_id(Some(" user@example.com "));
        let bare = store.derive_session_id(Some("user@example.com"));
        assert_ne!(padded, bare);
        assert_eq!(store.stats().sessions, 2);
    }

    #[test]
    fn test_signature_cache_last_write_wins() {
        let store = SessionStore::new(true);
        store.cache_signature("sess-1", "sig-a");
        store.cache_signature("sess-1", "sig-b");
        assert_eq!(store.get_cached_signature("sess-1").as_deref(), Some("sig-b"));
    }

    #[test]
    fn test_signature_cache_ignores_empty_arguments() {
        let store = SessionStore::new(true);
        store.cache_signature("", "sig-a");
        store.cache_signature("sess-1", "");
        assert_eq!(store.stats().signatures, 0);
        assert!(store.get_cached_signature("sess-1").is_none());
    }

    #[test]
    fn test_clear_empties_both_maps() {
        let store = SessionStore::new(true);
        store.derive_session_id(Some("user@example.com"));
        store.cache_signature("sess-1", "sig-a");
        store.clear();
        assert_eq!(
            store.stats(),
            SessionStats {
                sessions: 0,
                signatures: 0
            }
        );
    }

    #[test]
    fn test_fresh_session_id_shape() {
        let id = SessionStore::fresh_session_id();
        // 32 位十六进制随机段 + 13 位毫秒时间戳
        assert!(id.len() >= 32 + 13);
        assert!(id.chars().all(|c| c.is_ascii_alphanumeric()));
    }
}
