//! # 传输实现
//!
//! `PlainTransport` 是未经修饰的 reqwest 客户端；`FingerprintTransport`
//! 把默认请求头固定成常见浏览器版本的指纹，并在失败时回退到原始
//! 传输重试一次。两个客户端都沿用 reqwest 对代理环境变量的读取，
//! 不额外设置整体超时，取消语义由调用方丢弃 future 实现。

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT_LANGUAGE};

use super::bypass::BypassRules;
use super::OutboundTransport;
use crate::error::Result;
use crate::logging::{LogComponent, LogStage};
use crate::{ldebug, lwarn};

/// 模拟的浏览器版本
const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

/// 固定指纹请求头
fn fingerprint_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
    headers.insert(
        "sec-ch-ua",
        HeaderValue::from_static(
            "\"Google Chrome\";v=\"131\", \"Chromium\";v=\"131\", \"Not_A Brand\";v=\"24\"",
        ),
    );
    headers.insert("sec-ch-ua-mobile", HeaderValue::from_static("?0"));
    headers.insert("sec-ch-ua-platform", HeaderValue::from_static("\"Windows\""));
    headers
}

/// 原始传输
#[derive(Debug, Clone)]
pub struct PlainTransport {
    client: reqwest::Client,
}

impl PlainTransport {
    /// 用默认客户端构造
    pub fn new() -> Result<Self> {
        Ok(Self {
            client: reqwest::Client::builder().build()?,
        })
    }

    /// 用外部客户端构造，测试时注入
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl OutboundTransport for PlainTransport {
    async fn execute(&self, request: reqwest::Request) -> Result<reqwest::Response> {
        Ok(self.client.execute(request).await?)
    }
}

/// 指纹传输
///
/// 命中绕行规则的主机直接走原始客户端；其余请求先走指纹客户端，
/// 出错时记录告警并用请求副本通过原始客户端重试一次。副本在发送
/// 前抓取，流式请求体无法复制时只能原样上抛。
pub struct FingerprintTransport {
    spoofed: reqwest::Client,
    plain: reqwest::Client,
    bypass: BypassRules,
    fallback_enabled: bool,
}

impl FingerprintTransport {
    /// 构造指纹传输
    pub fn new(bypass: BypassRules, fallback_enabled: bool) -> Result<Self> {
        let spoofed = reqwest::Client::builder()
            .user_agent(BROWSER_USER_AGENT)
            .default_headers(fingerprint_headers())
            .build()?;
        let plain = reqwest::Client::builder().build()?;
        Ok(Self {
            spoofed,
            plain,
            bypass,
            fallback_enabled,
        })
    }

    /// 用外部客户端构造，测试或定制代理时注入
    pub fn with_clients(
        spoofed: reqwest::Client,
        plain: reqwest::Client,
        bypass: BypassRules,
        fallback_enabled: bool,
    ) -> Self {
        Self {
            spoofed,
            plain,
            bypass,
            fallback_enabled,
        }
    }
}

#[async_trait]
impl OutboundTransport for FingerprintTransport {
    async fn execute(&self, request: reqwest::Request) -> Result<reqwest::Response> {
        if self.bypass.matches_url(request.url()) {
            ldebug!(
                "system",
                LogStage::UpstreamRequest,
                LogComponent::Transport,
                "bypass_hit",
                "目标主机命中绕行规则，走原始传输",
                host = %request.url().host_str().unwrap_or_default()
            );
            return Ok(self.plain.execute(request).await?);
        }

        let fallback = if self.fallback_enabled {
            request.try_clone()
        } else {
            None
        };
        let url = request.url().clone();

        match self.spoofed.execute(request).await {
            Ok(response) => Ok(response),
            Err(err) if !self.fallback_enabled => Err(err.into()),
            Err(err) => match fallback {
                Some(retry) => {
                    lwarn!(
                        "system",
                        LogStage::UpstreamRequest,
                        LogComponent::Transport,
                        "fingerprint_transport_failed",
                        "指纹客户端请求失败，改用原始传输重试一次",
                        url = %url,
                        error = %err
                    );
                    Ok(self.plain.execute(retry).await?)
                }
                None => {
                    lwarn!(
                        "system",
                        LogStage::UpstreamRequest,
                        LogComponent::Transport,
                        "fingerprint_fallback_unavailable",
                        "指纹客户端请求失败且请求体不可重放，无法回退",
                        url = %url,
                        error = %err
                    );
                    Err(err.into())
                }
            },
        }
    }
}
