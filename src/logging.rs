//! # 日志配置模块
//!
//! 提供统一的结构化日志宏与订阅器初始化。所有组件通过
//! `ldebug!`/`linfo!`/`lwarn!`/`lerror!` 输出带阶段与组件标签的事件，
//! 便于按请求 ID 聚合排查。

use std::env;
use std::fmt;
use tracing_subscriber::{EnvFilter, fmt as sub_fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// 请求处理阶段标签
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogStage {
    /// 进程启动
    Startup,
    /// 配置加载与校验
    Configuration,
    /// 准入认证与配额
    Authentication,
    /// 出站请求体改写
    RequestModify,
    /// 上游请求发送
    UpstreamRequest,
    /// 外部令牌接口调用
    ExternalApi,
    /// 进程内缓存操作
    Cache,
    /// 内部状态变更
    Internal,
    /// 错误路径
    Error,
}

impl LogStage {
    /// 稳定的字符串形式，写入日志字段
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Startup => "startup",
            Self::Configuration => "configuration",
            Self::Authentication => "authentication",
            Self::RequestModify => "request_modify",
            Self::UpstreamRequest => "upstream_request",
            Self::ExternalApi => "external_api",
            Self::Cache => "cache",
            Self::Internal => "internal",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for LogStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 产生日志的组件标签
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogComponent {
    /// 准入控制器
    Admission,
    /// Executor 注册表
    ExecutorRegistry,
    /// Antigravity 策略
    AntigravityExecutor,
    /// Codex 策略
    CodexExecutor,
    /// OAuth 令牌交换客户端
    OAuth,
    /// 派生令牌交换客户端
    DerivedToken,
    /// 凭证刷新编排
    RefreshService,
    /// 出站传输层
    Transport,
    /// 会话/签名缓存
    SessionCache,
    /// 凭证存储
    Store,
    /// 配置
    Config,
}

impl LogComponent {
    /// 稳定的字符串形式，写入日志字段
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Admission => "admission",
            Self::ExecutorRegistry => "executor_registry",
            Self::AntigravityExecutor => "antigravity_executor",
            Self::CodexExecutor => "codex_executor",
            Self::OAuth => "oauth_client",
            Self::DerivedToken => "derived_token_client",
            Self::RefreshService => "refresh_service",
            Self::Transport => "transport",
            Self::SessionCache => "session_cache",
            Self::Store => "store",
            Self::Config => "config",
        }
    }
}

impl fmt::Display for LogComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// debug 级结构化日志
#[macro_export]
macro_rules! ldebug {
    ($request_id:expr, $stage:expr, $component:expr, $event:expr, $message:expr) => {
        tracing::debug!(
            request_id = %$request_id,
            stage = $stage.as_str(),
            component = $component.as_str(),
            event = $event,
            "{}",
            $message
        )
    };
    ($request_id:expr, $stage:expr, $component:expr, $event:expr, $message:expr, $($fields:tt)+) => {
        tracing::debug!(
            request_id = %$request_id,
            stage = $stage.as_str(),
            component = $component.as_str(),
            event = $event,
            $($fields)+,
            "{}",
            $message
        )
    };
}

/// info 级结构化日志
#[macro_export]
macro_rules! linfo {
    ($request_id:expr, $stage:expr, $component:expr, $event:expr, $message:expr) => {
        tracing::info!(
            request_id = %$request_id,
            stage = $stage.as_str(),
            component = $component.as_str(),
            event = $event,
            "{}",
            $message
        )
    };
    ($request_id:expr, $stage:expr, $component:expr, $event:expr, $message:expr, $($fields:tt)+) => {
        tracing::info!(
            request_id = %$request_id,
            stage = $stage.as_str(),
            component = $component.as_str(),
            event = $event,
            $($fields)+,
            "{}",
            $message
        )
    };
}

/// warn 级结构化日志
#[macro_export]
macro_rules! lwarn {
    ($request_id:expr, $stage:expr, $component:expr, $event:expr, $message:expr) => {
        tracing::warn!(
            request_id = %$request_id,
            stage = $stage.as_str(),
            component = $component.as_str(),
            event = $event,
            "{}",
            $message
        )
    };
    ($request_id:expr, $stage:expr, $component:expr, $event:expr, $message:expr, $($fields:tt)+) => {
        tracing::warn!(
            request_id = %$request_id,
            stage = $stage.as_str(),
            component = $component.as_str(),
            event = $event,
            $($fields)+,
            "{}",
            $message
        )
    };
}

/// error 级结构化日志
#[macro_export]
macro_rules! lerror {
    ($request_id:expr, $stage:expr, $component:expr, $event:expr, $message:expr) => {
        tracing::error!(
            request_id = %$request_id,
            stage = $stage.as_str(),
            component = $component.as_str(),
            event = $event,
            "{}",
            $message
        )
    };
    ($request_id:expr, $stage:expr, $component:expr, $event:expr, $message:expr, $($fields:tt)+) => {
        tracing::error!(
            request_id = %$request_id,
            stage = $stage.as_str(),
            component = $component.as_str(),
            event = $event,
            $($fields)+,
            "{}",
            $message
        )
    };
}

/// 初始化日志系统
///
/// `RUST_LOG` 优先；未设置时按传入级别构造默认过滤器。
/// 重复调用会被订阅器拒绝，返回错误由调用方忽略即可，
/// 库自身从不主动初始化。
pub fn init_logging(log_level: Option<&str>) {
    let level = log_level.unwrap_or("info");
    let default_filter = format!("{level},provider_gateway=debug");

    let log_filter = env::var("RUST_LOG").unwrap_or(default_filter);

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| log_filter.into()))
        .with(
            sub_fmt::layer()
                .with_target(true)
                .with_level(true)
                .with_thread_ids(false)
                .with_thread_names(false)
                .with_file(false)
                .with_line_number(false)
                .compact(),
        )
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_labels_are_stable() {
        assert_eq!(LogStage::Authentication.as_str(), "authentication");
        assert_eq!(LogStage::UpstreamRequest.as_str(), "upstream_request");
        assert_eq!(LogStage::Cache.to_string(), "cache");
    }

    #[test]
    fn test_component_labels_are_stable() {
        assert_eq!(LogComponent::Admission.as_str(), "admission");
        assert_eq!(LogComponent::OAuth.as_str(), "oauth_client");
        assert_eq!(LogComponent::Transport.to_string(), "transport");
    }

    #[test]
    fn test_log_macros_accept_extra_fields() {
        // 只验证宏展开可编译、可执行
        crate::ldebug!(
            "system",
            LogStage::Cache,
            LogComponent::SessionCache,
            "macro_smoke",
            "smoke test"
        );
        crate::linfo!(
            "req-1",
            LogStage::Authentication,
            LogComponent::Admission,
            "macro_smoke",
            "smoke test with fields",
            api_key_id = "k-1",
            consumed = true
        );
    }
}
