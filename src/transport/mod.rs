//! # 出站传输层
//!
//! 所有发往服务商的请求都经过 [`OutboundTransport`] 这一个口子。
//! 自托管部署安装指纹传输（绕行规则 + 浏览器指纹 + 失败回退），
//! 托管沙箱部署保持原始传输不动。组件之间通过注入的 trait 对象
//! 协作，测试里可以换成任意实现。

pub mod bypass;
pub mod client;

use std::sync::Arc;

use async_trait::async_trait;

pub use bypass::BypassRules;
pub use client::{FingerprintTransport, PlainTransport};

use crate::config::TransportConfig;
use crate::error::Result;
use crate::linfo;
use crate::logging::{LogComponent, LogStage};

/// 出站请求入口
///
/// 签名与标准客户端一致：一个构造完毕的请求进，一个响应出。
/// 实现不得自带整体超时，取消由调用方丢弃 future 完成。
#[async_trait]
pub trait OutboundTransport: Send + Sync {
    /// 发出请求并返回响应
    async fn execute(&self, request: reqwest::Request) -> Result<reqwest::Response>;
}

/// 按部署模式装配传输
///
/// 自托管模式装配指纹传输并合并环境变量里的绕行模式；
/// 托管模式返回原始传输。
pub fn build_transport(config: &TransportConfig) -> Result<Arc<dyn OutboundTransport>> {
    if !config.is_self_hosted() {
        linfo!(
            "system",
            LogStage::Startup,
            LogComponent::Transport,
            "transport_installed",
            "托管模式，使用原始传输"
        );
        return Ok(Arc::new(PlainTransport::new()?));
    }

    let rules = BypassRules::new(config.effective_bypass_patterns());
    linfo!(
        "system",
        LogStage::Startup,
        LogComponent::Transport,
        "transport_installed",
        "自托管模式，启用指纹传输",
        bypass_patterns = rules.len(),
        fallback_enabled = config.fallback_enabled
    );
    Ok(Arc::new(FingerprintTransport::new(
        rules,
        config.fallback_enabled,
    )?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DeploymentMode;

    #[test]
    fn test_build_transport_honors_deployment_mode() {
        let self_hosted = TransportConfig {
            mode: DeploymentMode::SelfHosted,
            ..Default::default()
        };
        assert!(build_transport(&self_hosted).is_ok());

        let managed = TransportConfig {
            mode: DeploymentMode::Managed,
            ..Default::default()
        };
        assert!(build_transport(&managed).is_ok());
    }
}
