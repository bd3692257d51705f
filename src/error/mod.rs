//! # 统一错误处理
//!
//! 全 crate 共用一个 [`GatewayError`] 与 [`Result`] 别名；
//! `Context` trait 负责在错误向上冒泡时追加场景描述。

pub mod macros;
pub mod types;


use std::fmt::Display;

pub use types::GatewayError;

/// crate 级 Result 别名，可失败的函数一律返回它
pub type Result<T> = std::result::Result<T, GatewayError>;

/// 给任意可转换为 [`GatewayError`] 的错误追加上下文
pub trait Context<T, E> {
    #[track_caller]
    fn context<C>(self, context: C) -> Result<T>
    where
        C: Display;

    #[track_caller]
    fn with_context<C, F>(self, context: F) -> Result<T>
    where
        F: FnOnce() -> C,
        C: Display;
}

impl<T, E> Context<T, E> for std::result::Result<T, E>
where
    E: Into<GatewayError>,
{
    #[track_caller]
    fn context<C>(self, context: C) -> Result<T>
    where
        C: Display,
    {
        self.with_context(|| context)
    }

    #[track_caller]
    fn with_context<C, F>(self, context: F) -> Result<T>
    where
        F: FnOnce() -> C,
        C: Display,
    {
        self.map_err(|error| GatewayError::Context {
            context: context().to_string(),
            source: Box::new(error.into()),
        })
    }
}

/// 一步完成「转换 + 包上下文」的便捷函数
#[track_caller]
pub fn context_error<T>(err: impl Into<GatewayError>, context: impl Display) -> Result<T> {
    Err(err.into()).context(context)
}

/// 错误归类，映射到 4xx/5xx 两档，供日志与告警分级
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// 客户端侧问题（参数、凭证），对应 4xx
    Client,
    /// 网关或其依赖的问题，对应 5xx
    Server,
}
