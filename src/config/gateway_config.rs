//! # 网关配置结构定义

use serde::{Deserialize, Serialize};

use crate::ensure_config;
use crate::error::Result;

/// 透传代理旁路模式时读取的环境变量
pub const PROXY_BYPASS_ENV: &str = "GATEWAY_PROXY_BYPASS";

/// 网关主配置结构
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// 出站传输层配置
    pub transport: TransportConfig,
    /// 凭证刷新配置
    pub refresh: RefreshConfig,
    /// 会话缓存配置
    pub session: SessionConfig,
}

/// 部署模式
///
/// 指纹伪装传输只在自托管模式下安装；托管沙箱模式
/// 使用未修改的出站客户端。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentMode {
    /// 自托管部署
    SelfHosted,
    /// 多租户沙箱/托管执行
    Managed,
}

impl Default for DeploymentMode {
    fn default() -> Self {
        Self::SelfHosted
    }
}

/// 传输层配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// 部署模式
    pub mode: DeploymentMode,
    /// 静态旁路主机模式（逗号分隔的环境变量会追加在其后）
    pub bypass_hosts: Vec<String>,
    /// 指纹客户端失败后是否回退到未修改客户端
    pub fallback_enabled: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            mode: DeploymentMode::default(),
            bypass_hosts: Vec::new(),
            fallback_enabled: true,
        }
    }
}

impl TransportConfig {
    /// 是否应安装指纹伪装传输
    pub fn is_self_hosted(&self) -> bool {
        self.mode == DeploymentMode::SelfHosted
    }

    /// 合并静态配置与环境变量里的旁路模式列表
    pub fn effective_bypass_patterns(&self) -> Vec<String> {
        self.merged_bypass_patterns(std::env::var(PROXY_BYPASS_ENV).ok().as_deref())
    }

    fn merged_bypass_patterns(&self, env_value: Option<&str>) -> Vec<String> {
        let mut patterns = self.bypass_hosts.clone();
        if let Some(raw) = env_value {
            patterns.extend(
                raw.split(',')
                    .map(str::trim)
                    .filter(|p| !p.is_empty())
                    .map(str::to_string),
            );
        }
        patterns
    }
}

/// 凭证刷新与重试配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RefreshConfig {
    /// 派生令牌交换的最大尝试次数
    pub max_attempts: u32,
    /// 重试基础延迟（毫秒）
    pub base_delay_ms: u64,
    /// 重试延迟上限（毫秒）
    pub max_delay_ms: u64,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
            max_delay_ms: 10000,
        }
    }
}

/// 会话缓存配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// 派生会话 ID 前是否裁剪身份键两端空白
    pub trim_identity_keys: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            trim_identity_keys: true,
        }
    }
}

impl GatewayConfig {
    /// 验证配置的有效性
    pub fn validate(&self) -> Result<()> {
        ensure_config!(
            self.refresh.max_attempts > 0,
            "refresh.max_attempts 必须大于 0"
        );
        ensure_config!(
            self.refresh.base_delay_ms > 0,
            "refresh.base_delay_ms 必须大于 0"
        );
        ensure_config!(
            self.refresh.max_delay_ms >= self.refresh.base_delay_ms,
            "refresh.max_delay_ms 不能小于 base_delay_ms"
        );

        for pattern in &self.transport.bypass_hosts {
            ensure_config!(
                !pattern.trim().is_empty(),
                "transport.bypass_hosts 不允许空白模式"
            );
        }

        Ok(())
    }
}
