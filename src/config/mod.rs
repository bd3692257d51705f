//! # 配置管理模块
//!
//! TOML 文件加载、默认值与校验。代理端点类环境变量
//! （`HTTPS_PROXY` 等）由 HTTP 客户端层自行读取，不经过这里。

mod gateway_config;

pub use gateway_config::{
    DeploymentMode, GatewayConfig, PROXY_BYPASS_ENV, RefreshConfig, SessionConfig, TransportConfig,
};

use std::path::Path;

use crate::error::{Context, Result};
use crate::logging::{LogComponent, LogStage};

/// 从 TOML 文件加载配置并完成校验
pub fn load_config(path: &Path) -> Result<GatewayConfig> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("读取配置文件失败: {}", path.display()))?;
    let config: GatewayConfig = toml::from_str(&raw)?;
    config.validate().context("配置校验失败")?;

    crate::linfo!(
        "system",
        LogStage::Configuration,
        LogComponent::Config,
        "config_loaded",
        "Gateway configuration loaded",
        path = %path.display(),
        mode = ?config.transport.mode
    );

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_config_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
            [transport]
            mode = "self_hosted"
            bypass_hosts = ["localhost", ".corp.example.com"]

            [refresh]
            max_attempts = 2
            base_delay_ms = 500
            max_delay_ms = 4000
            "#
        )
        .unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.refresh.max_attempts, 2);
        assert_eq!(config.transport.bypass_hosts.len(), 2);
    }

    #[test]
    fn test_load_config_missing_file() {
        let err = load_config(Path::new("/nonexistent/gateway.toml")).unwrap_err();
        assert!(err.to_string().contains("读取配置文件失败"));
    }

    #[test]
    fn test_load_config_rejects_invalid_values() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
            [refresh]
            max_attempts = 0
            "#
        )
        .unwrap();

        let err = load_config(file.path()).unwrap_err();
        assert!(err.to_string().contains("配置校验失败"));
    }
}
