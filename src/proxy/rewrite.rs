// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

//! Rule-driven parameter rewriting
//!
//! Every enabled rule matching the request is applied in insertion order.
//! Rules only replace parameters that are already present; a multi-valued
//! parameter has all of its occurrences replaced.

use bytes::Bytes;
use tracing::info;
use url::Url;

use crate::config::{matching_rules, Rule};
use crate::flow::FlowRequest;

/// Apply all matching rules to a request, returning how many rewrites
/// actually changed something
pub fn apply_rules(rules: &[Rule], request: &mut FlowRequest) -> usize {
    let matched: Vec<Rule> = matching_rules(rules, &request.host, &request.path)
        .into_iter()
        .cloned()
        .collect();

    let mut changed = 0;
    for rule in matched {
        if rewrite_query(request, &rule.param_name, &rule.param_value) {
            info!(
                "Query rule applied: '{}' -> '{}' on {}",
                rule.param_name, rule.param_value, request.url
            );
            changed += 1;
        }
        if rewrite_form_body(request, &rule.param_name, &rule.param_value) {
            info!(
                "Body rule applied: '{}' -> '{}' on {}",
                rule.param_name, rule.param_value, request.url
            );
            changed += 1;
        }
    }
    changed
}

/// Replace a query parameter's value (all occurrences), keeping pair order
fn rewrite_query(request: &mut FlowRequest, name: &str, value: &str) -> bool {
    let Ok(mut url) = Url::parse(&request.url) else {
        return false;
    };

    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    if !pairs.iter().any(|(k, _)| k == name) {
        return false;
    }
    if pairs
        .iter()
        .all(|(k, v)| k != name || v == value)
    {
        return false;
    }

    let rewritten: String = url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(pairs.iter().map(|(k, v)| {
            if k == name {
                (k.as_str(), value)
            } else {
                (k.as_str(), v.as_str())
            }
        }))
        .finish();
    url.set_query(Some(&rewritten));

    request.url = url.to_string();
    request.path = match url.query() {
        Some(q) => format!("{}?{q}", url.path()),
        None => url.path().to_string(),
    };
    true
}

/// Replace a form-body parameter's value (all occurrences) on POST requests,
/// keeping Content-Length consistent
fn rewrite_form_body(request: &mut FlowRequest, name: &str, value: &str) -> bool {
    if request.method.to_uppercase() != "POST" || !request.is_form() || request.body.is_empty() {
        return false;
    }

    let pairs: Vec<(String, String)> = url::form_urlencoded::parse(&request.body)
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    if !pairs.iter().any(|(k, _)| k == name) {
        return false;
    }
    if pairs.iter().all(|(k, v)| k != name || v == value) {
        return false;
    }

    let rewritten: String = url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(pairs.iter().map(|(k, v)| {
            if k == name {
                (k.as_str(), value)
            } else {
                (k.as_str(), v.as_str())
            }
        }))
        .finish();

    request.body = Bytes::from(rewritten);
    request
        .headers
        .set("Content-Length", request.body.len().to_string());
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn get_request(url: &str) -> FlowRequest {
        let parsed = Url::parse(url).unwrap();
        let path = match parsed.query() {
            Some(q) => format!("{}?{q}", parsed.path()),
            None => parsed.path().to_string(),
        };
        FlowRequest::new("GET", url, parsed.host_str().unwrap(), path)
    }

    fn post_form(url: &str, body: &str) -> FlowRequest {
        let mut request = get_request(url);
        request.method = "POST".to_string();
        request
            .headers
            .append("Content-Type", "application/x-www-form-urlencoded");
        request.headers.append("Content-Length", body.len().to_string());
        request.body = Bytes::from(body.to_string());
        request
    }

    #[test]
    fn test_query_rewrite() {
        let rules = vec![Rule::new("example.com", "/search", "q", "hacked")];
        let mut request = get_request("http://example.com/search?q=cats&p=1");

        assert_eq!(apply_rules(&rules, &mut request), 1);
        assert_eq!(request.url, "http://example.com/search?q=hacked&p=1");
        assert_eq!(request.path, "/search?q=hacked&p=1");
    }

    #[test]
    fn test_untouched_parameters_keep_values() {
        let rules = vec![Rule::new("example.com", "/search", "q", "hacked")];
        let mut request = get_request("http://example.com/search?q=cats&p=1&keep=me");
        apply_rules(&rules, &mut request);
        let params = request.query_params();
        assert_eq!(params.get("p"), Some(&"1".to_string()));
        assert_eq!(params.get("keep"), Some(&"me".to_string()));
    }

    #[test]
    fn test_rules_never_add_parameters() {
        let rules = vec![Rule::new("example.com", "/search", "absent", "x")];
        let mut request = get_request("http://example.com/search?q=cats");
        assert_eq!(apply_rules(&rules, &mut request), 0);
        assert_eq!(request.url, "http://example.com/search?q=cats");
    }

    #[test]
    fn test_multivalued_replace_all() {
        let rules = vec![Rule::new("example.com", "", "id", "9")];
        let mut request = get_request("http://example.com/x?id=1&id=2&other=3");
        apply_rules(&rules, &mut request);
        assert_eq!(request.url, "http://example.com/x?id=9&id=9&other=3");
    }

    #[test]
    fn test_form_body_rewrite_updates_content_length() {
        let rules = vec![Rule::new("example.com", "/login", "pw", "changed")];
        let mut request = post_form("http://example.com/login", "user=a&pw=b");

        assert_eq!(apply_rules(&rules, &mut request), 1);
        assert_eq!(request.body_text(), "user=a&pw=changed");
        assert_eq!(
            request.headers.get("content-length"),
            Some(request.body.len().to_string().as_str())
        );
    }

    #[test]
    fn test_get_body_never_rewritten() {
        let rules = vec![Rule::new("example.com", "", "pw", "x")];
        let mut request = get_request("http://example.com/login");
        request
            .headers
            .append("Content-Type", "application/x-www-form-urlencoded");
        request.body = Bytes::from_static(b"pw=b");
        assert_eq!(apply_rules(&rules, &mut request), 0);
        assert_eq!(request.body_text(), "pw=b");
    }

    #[test]
    fn test_disabled_and_unmatched_rules_skipped() {
        let mut disabled = Rule::new("example.com", "", "q", "x");
        disabled.enabled = false;
        let other_host = Rule::new("other.com", "", "q", "x");
        let rules = vec![disabled, other_host];

        let mut request = get_request("http://example.com/search?q=cats");
        assert_eq!(apply_rules(&rules, &mut request), 0);
        assert_eq!(request.url, "http://example.com/search?q=cats");
    }

    #[test]
    fn test_rule_value_url_encoded() {
        let rules = vec![Rule::new("example.com", "", "q", "two words&more")];
        let mut request = get_request("http://example.com/search?q=cats");
        apply_rules(&rules, &mut request);
        assert!(request.url.contains("q=two+words%26more"));
    }
}
