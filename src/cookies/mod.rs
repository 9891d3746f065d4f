// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

//! Cookie capture table and the operator Jar
//!
//! Cookies seen in `Set-Cookie` response headers are captured per domain.
//! The Jar is a separate, operator-curated list: only explicit promotion
//! writes it, and when non-empty it overrides the `Cookie` header on every
//! forwarded request.

use std::collections::HashMap;

use dashmap::DashMap;
use parking_lot::RwLock;
use tracing::debug;

/// Per-domain cookie capture plus the replay Jar
#[derive(Debug, Default)]
pub struct CookieManager {
    /// domain -> cookie name -> value
    captured: DashMap<String, HashMap<String, String>>,
    /// Ordered (name, value) pairs promoted by the operator
    jar: RwLock<Vec<(String, String)>>,
}

impl CookieManager {
    /// Create an empty manager
    pub fn new() -> Self {
        Self::default()
    }

    /// Record every cookie from a response's `Set-Cookie` headers,
    /// normalized to the response host
    pub fn capture_from_response(&self, host: &str, set_cookie_headers: &[&str]) {
        for header in set_cookie_headers {
            if let Some((name, value)) = parse_set_cookie(header) {
                debug!("Captured cookie {name} for {host}");
                self.captured
                    .entry(host.to_lowercase())
                    .or_default()
                    .insert(name, value);
            }
        }
    }

    /// Snapshot of the capture table
    pub fn captured(&self) -> HashMap<String, HashMap<String, String>> {
        self.captured
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect()
    }

    /// Look up a captured cookie value
    pub fn captured_value(&self, domain: &str, name: &str) -> Option<String> {
        self.captured
            .get(&domain.to_lowercase())
            .and_then(|cookies| cookies.get(name).cloned())
    }

    /// Copy a captured cookie into the Jar; returns false when absent
    pub fn promote(&self, domain: &str, name: &str) -> bool {
        match self.captured_value(domain, name) {
            Some(value) => {
                self.add_to_jar(name, value);
                true
            }
            None => false,
        }
    }

    /// Add or update a Jar entry, preserving insertion order
    pub fn add_to_jar(&self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        let mut jar = self.jar.write();
        match jar.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = value,
            None => jar.push((name, value)),
        }
    }

    /// Remove a Jar entry by name
    pub fn remove_from_jar(&self, name: &str) {
        self.jar.write().retain(|(n, _)| n != name);
    }

    /// Empty the Jar
    pub fn clear_jar(&self) {
        self.jar.write().clear();
    }

    /// Snapshot of the Jar in insertion order
    pub fn jar(&self) -> Vec<(String, String)> {
        self.jar.read().clone()
    }

    /// Whether the Jar has no entries
    pub fn jar_is_empty(&self) -> bool {
        self.jar.read().is_empty()
    }

    /// Serialize the Jar as a `Cookie` header value
    pub fn jar_header(&self) -> String {
        self.jar
            .read()
            .iter()
            .map(|(n, v)| format!("{n}={v}"))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Parse the name/value pair out of a `Set-Cookie` header, ignoring
/// attributes
fn parse_set_cookie(header: &str) -> Option<(String, String)> {
    let first = header.split(';').next()?.trim();
    let (name, value) = first.split_once('=')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    Some((name.to_string(), value.trim().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_parses_attributes_away() {
        let manager = CookieManager::new();
        manager.capture_from_response(
            "Example.com",
            &["session=abc123; Domain=example.com; Path=/; Secure; HttpOnly"],
        );
        assert_eq!(
            manager.captured_value("example.com", "session"),
            Some("abc123".to_string())
        );
    }

    #[test]
    fn test_capture_overwrites_same_name() {
        let manager = CookieManager::new();
        manager.capture_from_response("example.com", &["token=old"]);
        manager.capture_from_response("example.com", &["token=new"]);
        assert_eq!(
            manager.captured_value("example.com", "token"),
            Some("new".to_string())
        );
    }

    #[test]
    fn test_capture_never_touches_jar() {
        let manager = CookieManager::new();
        manager.capture_from_response("example.com", &["session=abc"]);
        assert!(manager.jar_is_empty());
    }

    #[test]
    fn test_jar_header_order() {
        let manager = CookieManager::new();
        manager.add_to_jar("first", "1");
        manager.add_to_jar("second", "2");
        assert_eq!(manager.jar_header(), "first=1; second=2");

        // Updating keeps position
        manager.add_to_jar("first", "updated");
        assert_eq!(manager.jar_header(), "first=updated; second=2");
    }

    #[test]
    fn test_promote() {
        let manager = CookieManager::new();
        manager.capture_from_response("example.com", &["session=abc"]);
        assert!(manager.promote("example.com", "session"));
        assert!(!manager.promote("example.com", "missing"));
        assert_eq!(manager.jar_header(), "session=abc");
    }

    #[test]
    fn test_remove_and_clear() {
        let manager = CookieManager::new();
        manager.add_to_jar("a", "1");
        manager.add_to_jar("b", "2");
        manager.remove_from_jar("a");
        assert_eq!(manager.jar_header(), "b=2");
        manager.clear_jar();
        assert!(manager.jar_is_empty());
    }

    #[test]
    fn test_malformed_set_cookie_ignored() {
        let manager = CookieManager::new();
        manager.capture_from_response("example.com", &["no-equals-sign", "=novalue"]);
        assert!(manager.captured().is_empty());
    }
}
