//! # Provider Gateway Core Library
//!
//! AI 服务商网关核心库：密钥准入、两级凭证刷新、会话亲和与出站传输。

pub mod admission;
pub mod app;
pub mod config;
pub mod error;
pub mod executor;
pub mod logging;
pub mod refresh;
pub mod session;
pub mod store;
pub mod testing;
pub mod transport;

// Re-export commonly used types
pub use app::GatewayContext;
pub use config::GatewayConfig;
pub use error::{GatewayError, Result};
