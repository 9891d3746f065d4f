// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

//! Rewrite rules and request matching

use serde::{Deserialize, Serialize};
use url::Url;

/// A single parameter-rewrite rule.
///
/// Matches a request when the normalized request host equals the rule host
/// or is a DNS child of it, and the request path starts with the rule path.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Rule {
    /// Host to match; accepts a bare host, `host:port`, or a full URL
    pub host: String,
    /// Path prefix to match; empty matches any path
    pub path: String,
    /// Name of the parameter to rewrite
    pub param_name: String,
    /// Replacement value
    pub param_value: String,
    /// Disabled rules are skipped without being removed
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl Rule {
    /// Create an enabled rule from trimmed fields
    pub fn new(
        host: impl Into<String>,
        path: impl Into<String>,
        param_name: impl Into<String>,
        param_value: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            path: path.into(),
            param_name: param_name.into(),
            param_value: param_value.into(),
            enabled: true,
        }
    }

    /// Check this rule against a normalized request host and path.
    ///
    /// `request_host` must already be the bare lowercase hostname;
    /// `request_path` is the path plus query string.
    pub fn matches(&self, request_host: &str, request_path: &str) -> bool {
        let (rule_host, host_path) = split_host_and_path(&self.host);

        if !host_matches(request_host, &rule_host) {
            return false;
        }

        // A path typed into the host field counts when the path field is empty
        let rule_path = if self.path.trim().is_empty() {
            host_path
        } else {
            self.path.trim().to_string()
        };
        let rule_path = normalize_path(&rule_path);

        rule_path.is_empty() || request_path.starts_with(&rule_path)
    }
}

/// Normalize a configured host, accepting entries with a scheme or full URL.
///
/// Returns the lowercase hostname plus any path component the user typed
/// alongside it.
pub fn split_host_and_path(raw: &str) -> (String, String) {
    let raw = raw.trim();
    if raw.is_empty() {
        return (String::new(), String::new());
    }

    let candidate = if raw.contains("://") {
        raw.to_string()
    } else {
        format!("http://{raw}")
    };

    if let Ok(url) = Url::parse(&candidate) {
        if let Some(host) = url.host_str() {
            let path = match url.path() {
                "" | "/" => String::new(),
                p => p.to_string(),
            };
            return (host.to_lowercase(), path);
        }
    }

    // Unparseable entry: fall back to stripping a port by hand
    let host = raw
        .split_once(':')
        .map(|(h, _)| h)
        .unwrap_or(raw)
        .to_lowercase();
    (host, String::new())
}

/// Check a request host against a rule host: exact or DNS-suffix match
pub fn host_matches(request_host: &str, rule_host: &str) -> bool {
    if rule_host.is_empty() {
        return true;
    }
    let request_host = request_host.to_lowercase();
    request_host == rule_host || request_host.ends_with(&format!(".{rule_host}"))
}

fn normalize_path(path: &str) -> String {
    let path = path.trim();
    if path.is_empty() || path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    }
}

/// Select the enabled rules matching a request, in insertion order
pub fn matching_rules<'a>(rules: &'a [Rule], host: &str, path: &str) -> Vec<&'a Rule> {
    rules
        .iter()
        .filter(|r| r.enabled && r.matches(host, path))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_host_and_path() {
        assert_eq!(
            split_host_and_path("example.com"),
            ("example.com".to_string(), String::new())
        );
        assert_eq!(
            split_host_and_path("https://Example.com:8443/login"),
            ("example.com".to_string(), "/login".to_string())
        );
        assert_eq!(
            split_host_and_path("example.com:8080"),
            ("example.com".to_string(), String::new())
        );
        assert_eq!(split_host_and_path(""), (String::new(), String::new()));
    }

    #[test]
    fn test_host_matching() {
        assert!(host_matches("example.com", "example.com"));
        assert!(host_matches("api.example.com", "example.com"));
        assert!(host_matches("a.b.example.com", "example.com"));
        assert!(!host_matches("badexample.com", "example.com"));
        assert!(!host_matches("example.com.evil.net", "example.com"));
        assert!(host_matches("anything.net", ""));
    }

    #[test]
    fn test_rule_matches_path_prefix() {
        let rule = Rule::new("example.com", "/search", "q", "hacked");
        assert!(rule.matches("example.com", "/search?q=cats"));
        assert!(rule.matches("example.com", "/search/advanced"));
        assert!(!rule.matches("example.com", "/login"));
    }

    #[test]
    fn test_path_from_host_field() {
        let rule = Rule::new("http://example.com/api", "", "key", "value");
        assert!(rule.matches("example.com", "/api/v1"));
        assert!(!rule.matches("example.com", "/other"));
    }

    #[test]
    fn test_path_normalized_with_leading_slash() {
        let rule = Rule::new("example.com", "search", "q", "x");
        assert!(rule.matches("example.com", "/search"));
    }

    #[test]
    fn test_matching_rules_skips_disabled() {
        let mut disabled = Rule::new("example.com", "", "a", "1");
        disabled.enabled = false;
        let enabled = Rule::new("example.com", "", "b", "2");
        let rules = vec![disabled, enabled];

        let matched = matching_rules(&rules, "example.com", "/");
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].param_name, "b");
    }
}
