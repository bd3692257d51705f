//! 测试：出站传输的绕行分流与指纹失败回退

use std::time::Duration;

use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use provider_gateway::config::{DeploymentMode, TransportConfig};
use provider_gateway::transport::{
    BypassRules, FingerprintTransport, OutboundTransport, build_transport,
};

/// 指向黑洞代理的客户端，任何请求都立刻失败
fn broken_client() -> reqwest::Client {
    reqwest::Client::builder()
        .proxy(reqwest::Proxy::all("http://127.0.0.1:9").unwrap())
        .timeout(Duration::from_secs(5))
        .build()
        .unwrap()
}

fn ping_request(server: &MockServer) -> reqwest::Request {
    reqwest::Client::new()
        .get(format!("{}/ping", server.uri()))
        .build()
        .unwrap()
}

async fn mount_ping(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/ping"))
        .respond_with(ResponseTemplate::new(200).set_body_string("pong"))
        .mount(server)
        .await;
}

#[tokio::test]
async fn fingerprint_failure_falls_back_to_plain_transport() {
    let server = MockServer::start().await;
    mount_ping(&server).await;

    let transport = FingerprintTransport::with_clients(
        broken_client(),
        reqwest::Client::new(),
        BypassRules::default(),
        true,
    );

    let response = transport.execute(ping_request(&server)).await.unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    assert_eq!(response.text().await.unwrap(), "pong");
}

#[tokio::test]
async fn fallback_disabled_surfaces_the_original_error() {
    let server = MockServer::start().await;
    mount_ping(&server).await;

    let transport = FingerprintTransport::with_clients(
        broken_client(),
        reqwest::Client::new(),
        BypassRules::default(),
        false,
    );

    let err = transport.execute(ping_request(&server)).await.unwrap_err();
    assert!(err.to_string().contains("网络错误"));
}

#[tokio::test]
async fn bypass_hosts_skip_the_spoofed_client_entirely() {
    let server = MockServer::start().await;
    mount_ping(&server).await;

    // 绕行命中时连回退开关都不参与，直接走原始客户端
    let transport = FingerprintTransport::with_clients(
        broken_client(),
        reqwest::Client::new(),
        BypassRules::new(vec!["127.0.0.1".to_string()]),
        false,
    );

    let response = transport.execute(ping_request(&server)).await.unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);
}

#[tokio::test]
async fn built_transports_reach_upstream_in_both_modes() {
    let server = MockServer::start().await;
    mount_ping(&server).await;

    for mode in [DeploymentMode::SelfHosted, DeploymentMode::Managed] {
        let config = TransportConfig {
            mode,
            ..Default::default()
        };
        let transport = build_transport(&config).unwrap();
        let response = transport.execute(ping_request(&server)).await.unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::OK);
    }
}
