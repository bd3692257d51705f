//! # 错误构造宏
//!
//! 每个故障面一个宏，单参形式直接收任意 `Into<String>`，
//! 多参形式走 `format!`。`provider_error!` 首参固定为服务商标识。

/// 构造配置错误
#[macro_export]
macro_rules! config_error {
    ($msg:expr) => {
        $crate::error::GatewayError::config($msg)
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::error::GatewayError::config(format!($fmt, $($arg)*))
    };
}

/// 构造凭证存储错误
#[macro_export]
macro_rules! store_error {
    ($msg:expr) => {
        $crate::error::GatewayError::store($msg)
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::error::GatewayError::store(format!($fmt, $($arg)*))
    };
}

/// 构造网络错误
#[macro_export]
macro_rules! network_error {
    ($msg:expr) => {
        $crate::error::GatewayError::network($msg)
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::error::GatewayError::network(format!($fmt, $($arg)*))
    };
}

/// 构造认证错误
#[macro_export]
macro_rules! auth_error {
    ($msg:expr) => {
        $crate::error::GatewayError::auth($msg)
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::error::GatewayError::auth(format!($fmt, $($arg)*))
    };
}

/// 构造服务商错误，首参为服务商标识
#[macro_export]
macro_rules! provider_error {
    ($provider:expr, $msg:expr) => {
        $crate::error::GatewayError::provider($msg, $provider)
    };
    ($provider:expr, $fmt:expr, $($arg:tt)*) => {
        $crate::error::GatewayError::provider(format!($fmt, $($arg)*), $provider)
    };
}

/// 构造内部错误
#[macro_export]
macro_rules! internal_error {
    ($msg:expr) => {
        $crate::error::GatewayError::internal($msg)
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::error::GatewayError::internal(format!($fmt, $($arg)*))
    };
}

/// 条件不成立时提前返回配置错误
#[macro_export]
macro_rules! ensure_config {
    ($cond:expr, $msg:expr) => {
        if !($cond) {
            return Err($crate::config_error!($msg));
        }
    };
    ($cond:expr, $fmt:expr, $($arg:tt)*) => {
        if !($cond) {
            return Err($crate::config_error!($fmt, $($arg)*));
        }
    };
}
