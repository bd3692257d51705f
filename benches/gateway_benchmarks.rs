//! # 网关热路径性能基准测试
//!
//! 覆盖准入判定、模型白名单匹配、绕行规则与会话派生。

use std::hint::black_box;
use std::sync::Arc;

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use tokio::runtime::Runtime;

use provider_gateway::admission::{
    AdmissionController, AdmissionOptions, AdmissionRequest, is_model_allowed,
};
use provider_gateway::session::SessionStore;
use provider_gateway::store::{ApiKey, InMemoryCredentialStore};
use provider_gateway::transport::BypassRules;

/// 构造 n 条带命名空间的白名单
fn allow_list(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("ns{i}/model-{i}")).collect()
}

/// 模型白名单匹配基准测试
fn bench_model_allow_list(c: &mut Criterion) {
    let mut group = c.benchmark_group("model_allow_list");

    for size in [1usize, 8, 32].iter() {
        let allowed = allow_list(*size);
        let last_model = format!("model-{}", size - 1);

        group.bench_with_input(BenchmarkId::new("hit_last", size), size, |b, _| {
            b.iter(|| is_model_allowed(black_box(&last_model), black_box(&allowed)));
        });
        group.bench_with_input(BenchmarkId::new("miss", size), size, |b, _| {
            b.iter(|| is_model_allowed(black_box("model-absent"), black_box(&allowed)));
        });
    }

    group.finish();
}

/// 绕行规则匹配基准测试
fn bench_bypass_rules(c: &mut Criterion) {
    let rules = BypassRules::new(vec![
        ".corp.example.com".to_string(),
        "localhost".to_string(),
        "metadata.google.internal".to_string(),
        ".svc.cluster.local".to_string(),
    ]);

    c.bench_function("bypass_match_suffix_hit", |b| {
        b.iter(|| rules.matches_host(black_box("api.eu.corp.example.com")));
    });
    c.bench_function("bypass_match_miss", |b| {
        b.iter(|| rules.matches_host(black_box("upstream.provider.example.net")));
    });
}

/// 会话派生基准测试
fn bench_session_derivation(c: &mut Criterion) {
    let store = SessionStore::new(true);
    for i in 0..1000 {
        store.derive_session_id(Some(&format!("caller-{i}")));
    }

    c.bench_function("session_derive_existing", |b| {
        b.iter(|| {
            let key = format!("caller-{}", fastrand::usize(0..1000));
            store.derive_session_id(black_box(Some(&key)))
        });
    });
    c.bench_function("session_derive_anonymous", |b| {
        b.iter(|| store.derive_session_id(black_box(None)));
    });
}

/// 准入判定基准测试（只查不扣，保持计数稳定）
fn bench_admission_check(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();

    let backing = InMemoryCredentialStore::new();
    let mut key = ApiKey::new("key-bench", "sk-bench");
    key.allowed_models = allow_list(8);
    backing.insert_api_key(key);
    let controller = AdmissionController::new(Arc::new(backing));

    let request = AdmissionRequest::new("req-bench", Some("Bearer sk-bench".to_string()));
    let options = AdmissionOptions {
        consume_request: false,
        model: Some("model-3".to_string()),
    };

    c.bench_function("admission_check_only", |b| {
        b.iter(|| {
            rt.block_on(async {
                controller
                    .enforce_api_key_quota(black_box(&request), black_box(&options))
                    .await
                    .unwrap()
                    .is_pass()
            })
        });
    });
}

criterion_group!(
    benches,
    bench_model_allow_list,
    bench_bypass_rules,
    bench_admission_check,
    bench_session_derivation
);

criterion_main!(benches);
