//! # 代理绕行规则
//!
//! 逗号分隔的主机模式列表，决定哪些目标主机跳过指纹客户端、
//! 直接走原始传输。匹配规则：
//! - `*` 匹配所有主机
//! - 以 `.` 开头的模式匹配「等于去点后的主机」或「以该模式结尾」
//! - 其余模式匹配「主机完全相等」或「`*.模式` 形式的子域后缀」

use url::Url;

/// 已归一化的绕行模式集合
#[derive(Debug, Clone, Default)]
pub struct BypassRules {
    patterns: Vec<String>,
}

impl BypassRules {
    /// 构造规则集，模式去空白、去空项并统一小写
    pub fn new(patterns: impl IntoIterator<Item = String>) -> Self {
        let patterns = patterns
            .into_iter()
            .map(|pattern| pattern.trim().to_ascii_lowercase())
            .filter(|pattern| !pattern.is_empty())
            .collect();
        Self { patterns }
    }

    /// 是否没有任何模式
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// 规则条数
    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    /// URL 的主机是否命中任一模式
    ///
    /// 无主机的 URL（如 `data:`）一律不绕行。
    pub fn matches_url(&self, url: &Url) -> bool {
        url.host_str().is_some_and(|host| self.matches_host(host))
    }

    /// 主机名是否命中任一模式
    pub fn matches_host(&self, host: &str) -> bool {
        let host = host.trim().trim_end_matches('.').to_ascii_lowercase();
        if host.is_empty() {
            return false;
        }
        self.patterns
            .iter()
            .any(|pattern| Self::pattern_matches(pattern, &host))
    }

    fn pattern_matches(pattern: &str, host: &str) -> bool {
        if pattern == "*" {
            return true;
        }
        if let Some(bare) = pattern.strip_prefix('.') {
            return host == bare || host.ends_with(pattern);
        }
        host == pattern || host.ends_with(&format!(".{pattern}"))
    }
}
