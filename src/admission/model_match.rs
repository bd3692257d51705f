//! # 模型白名单匹配
//!
//! 白名单先归一化（去空白、丢空项、去重），再按三条规则匹配：
//! 完全相等；一方是另一方加 `/` 段的命名空间扩展；或双方各剥掉
//! 首个 `namespace/` 段后尾部相等。空白名单放行所有模型。

use std::collections::HashSet;

/// 归一化白名单，保持首见顺序
pub fn normalize_allowed_models(allowed: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut normalized = Vec::new();
    for entry in allowed {
        let trimmed = entry.trim();
        if trimmed.is_empty() {
            continue;
        }
        if seen.insert(trimmed) {
            normalized.push(trimmed.to_string());
        }
    }
    normalized
}

/// `longer` 是否为 `shorter` 加一段 `/` 后缀的扩展
fn namespaced_extension(longer: &str, shorter: &str) -> bool {
    longer.len() > shorter.len()
        && longer.starts_with(shorter)
        && longer.as_bytes()[shorter.len()] == b'/'
}

/// 剥掉首个 `namespace/` 段，没有就原样返回
fn strip_leading_namespace(id: &str) -> &str {
    match id.split_once('/') {
        Some((_, tail)) => tail,
        None => id,
    }
}

/// 两个模型标识是否匹配
pub fn model_identifiers_match(a: &str, b: &str) -> bool {
    if a == b {
        return true;
    }
    if namespaced_extension(a, b) || namespaced_extension(b, a) {
        return true;
    }
    strip_leading_namespace(a) == strip_leading_namespace(b)
}

/// 模型是否被白名单放行
///
/// 归一化后为空的白名单（包括全是空白项）放行所有模型。
pub fn is_model_allowed(model: &str, allowed_models: &[String]) -> bool {
    let normalized = normalize_allowed_models(allowed_models);
    if normalized.is_empty() {
        return true;
    }
    normalized
        .iter()
        .any(|entry| model_identifiers_match(model, entry))
}
