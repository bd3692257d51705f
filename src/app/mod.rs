//! # 应用装配层
//!
//! 把配置、存储与各服务装配成一个可克隆的上下文。

pub mod context;

pub use context::GatewayContext;
