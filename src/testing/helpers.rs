//! # 测试辅助函数
//!
//! 日志订阅器初始化、快速重试配置与预置存储。

use std::sync::{Arc, Once};

use tracing::Level;

use crate::config::GatewayConfig;
use crate::store::{ApiKey, InMemoryCredentialStore, ProviderConnection};

static TRACING: Once = Once::new();

/// 测试进程内只初始化一次日志订阅器
pub fn init_test_env() {
    TRACING.call_once(|| {
        tracing_subscriber::fmt()
            .with_max_level(Level::DEBUG)
            .with_test_writer()
            .try_init()
            .ok();
    });
}

/// 重试间隔压到毫秒级的测试配置
pub fn fast_test_config() -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.refresh.base_delay_ms = 1;
    config.refresh.max_delay_ms = 4;
    config
}

/// 预置数据的内存存储
pub fn seeded_store(
    keys: Vec<ApiKey>,
    connections: Vec<ProviderConnection>,
) -> Arc<InMemoryCredentialStore> {
    let store = InMemoryCredentialStore::new();
    for key in keys {
        store.insert_api_key(key);
    }
    for connection in connections {
        store.insert_connection(connection);
    }
    Arc::new(store)
}

/// 断言 `$result` 是匹配给定模式的 `Err`
#[macro_export]
macro_rules! assert_error_type {
    ($result:expr, $pattern:pat) => {
        match $result {
            Err($pattern) => (),
            Err(other) => panic!("错误类型不符: {other:?}"),
            Ok(value) => panic!("预期 Err，得到 Ok: {value:?}"),
        }
    };
}

/// 断言文本包含子串，失败时打印两者
#[macro_export]
macro_rules! assert_contains {
    ($text:expr, $substring:expr) => {
        assert!(
            $text.contains($substring),
            "文本 {:?} 未包含 {:?}",
            $text,
            $substring
        );
    };
}
