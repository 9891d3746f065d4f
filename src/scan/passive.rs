// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

//! Passive vulnerability scanner
//!
//! Inspects a request/response pair read-only. Each category reports at
//! most one finding per response, so scanning the same flow twice yields
//! the same set.

use lazy_static::lazy_static;
use regex::Regex;
use tracing::{debug, warn};

use super::{Finding, Severity};
use crate::flow::{FlowRequest, FlowResponse};

lazy_static! {
    /// Database error strings leaking into response bodies
    static ref SQL_ERROR_PATTERNS: Vec<Regex> = compile(&[
        r"(?i)sql\s+syntax",
        r"(?i)mysql_fetch",
        r"(?i)unclosed\s+quotation\s+mark",
        r"(?i)quoted\s+string\s+not\s+properly\s+terminated",
        r"(?i)ora-\d{5}",
        r"(?i)postgresql.*error",
        r"(?i)microsoft\s+sql\s+server",
        r"(?i)odbc\s+(microsoft|sql\s+server|driver)",
        r"(?i)sqlite.*error",
        r"(?i)warning.*mysql",
        r"(?i)pg_query\(\)",
        r"(?i)jdbc.*exception",
    ]);

    /// Script fragments whose reflection from request to response signals XSS
    static ref XSS_REFLECTION_PATTERNS: Vec<Regex> = compile(&[
        r"(?i)<script[^>]*>.*?</script>",
        r"(?i)javascript:",
        r"(?i)onerror\s*=",
        r"(?i)onload\s*=",
        r"(?i)onclick\s*=",
        r"(?i)onmouseover\s*=",
        r"(?i)<iframe[^>]*>",
        r"(?i)<object[^>]*>",
        r"(?i)<embed[^>]*>",
    ]);

    /// Traversal sequences in request URLs or bodies
    static ref PATH_TRAVERSAL_PATTERNS: Vec<Regex> = compile(&[
        r"\.\./.*\.\./.*\.\.",
        r"\.\.[\\/]",
        r"[\\/]etc[\\/]passwd",
        r"[\\/]windows[\\/]win\.ini",
        r"[\\/]boot\.ini",
        r"%2e%2e%2f",
        r"%252e%252e%252f",
        r"\.\.%5c",
    ]);

    /// System-file content confirming a traversal hit
    static ref SYSTEM_FILE_PATTERN: Regex =
        Regex::new(r"root:.*:0:0:|daemon:|bin:|sys:").unwrap();

    /// Secrets and credentials in response bodies
    static ref SENSITIVE_PATTERNS: Vec<(Regex, &'static str)> = vec![
        (rx(r#"(?i)(password|passwd|pwd)\s*[:=]\s*["']?([^"'\s]{3,})"#), "Cleartext password"),
        (rx(r#"(?i)api[_-]?key\s*[:=]\s*["']?([a-zA-Z0-9_\-]{10,})"#), "Exposed API key"),
        (rx(r#"(?i)secret[_-]?key\s*[:=]\s*["']?([a-zA-Z0-9_\-]{10,})"#), "Exposed secret key"),
        (rx(r#"(?i)token\s*[:=]\s*["']?([a-zA-Z0-9_\-\.]{20,})"#), "Exposed token"),
        (rx(r"(?i)authorization:\s*bearer\s+([a-zA-Z0-9_\-\.]{20,})"), "Exposed bearer token"),
        (rx(r#"(?i)aws[_-]?access[_-]?key[_-]?id\s*[:=]\s*["']?(AKIA[A-Z0-9]{16})"#), "AWS access key"),
        (rx(r"-----BEGIN\s+(RSA\s+)?PRIVATE\s+KEY-----"), "Private key material"),
        (rx(r"(?i)connection[_-]?string\s*[:=]"), "Connection string"),
        (rx(r"(?i)mongodb://"), "MongoDB connection string"),
        (rx(r"(?i)mysql://|postgresql://"), "Database connection string"),
    ];

    /// Known vulnerable component versions
    static ref VULNERABLE_VERSION_PATTERNS: Vec<(Regex, &'static str)> = vec![
        (rx(r"Apache/2\.4\.49"), "Apache 2.4.49 path traversal (CVE-2021-41773)"),
        (rx(r"Apache/2\.4\.50"), "Apache 2.4.50 path traversal (CVE-2021-42013)"),
        (rx(r"(?i)log4j.*2\.(0|1|2|3|4|5|6|7|8|9|10|11|12|13|14|15|16)\b"), "Possible Log4Shell (CVE-2021-44228)"),
        (rx(r"(?i)struts"), "Apache Struts - check known CVEs"),
        (rx(r"(?i)spring.*framework.*[45]\."), "Spring Framework - check Spring4Shell"),
        (rx(r"(?i)phpMyAdmin/[234]\."), "phpMyAdmin - check known CVEs"),
        (rx(r"(?i)WordPress/[45]\."), "WordPress - check known vulnerabilities"),
        (rx(r"(?i)Drupal\s+[78]\."), "Drupal - check Drupalgeddon"),
        (rx(r"(?i)jQuery\s+(1\.|2\.|3\.[0-4])"), "Outdated jQuery - XSS vulnerabilities"),
    ];
}

/// Header names whose presence in a response discloses secrets
const SENSITIVE_HEADERS: &[&str] = &["x-api-key", "x-auth-token", "authorization"];

/// Substrings that indicate a CSRF token is present
const CSRF_INDICATORS: &[&str] = &["csrf", "xsrf", "_token", "token", "authenticity"];

/// Methods that change server state
const STATE_CHANGING_METHODS: &[&str] = &["POST", "PUT", "DELETE", "PATCH"];

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns.iter().map(|p| Regex::new(p).unwrap()).collect()
}

fn rx(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap()
}

/// Regex-driven response inspection
#[derive(Debug, Clone, Copy, Default)]
pub struct PassiveScanner;

impl PassiveScanner {
    /// Create a scanner
    pub fn new() -> Self {
        Self
    }

    /// Scan one request/response pair; the pair is never modified
    pub fn scan(&self, request: &FlowRequest, response: &FlowResponse) -> Vec<Finding> {
        let mut findings = Vec::new();
        let body = response.body_text();

        if let Some(f) = self.check_sql_errors(request, &body) {
            findings.push(f);
        }
        if let Some(f) = self.check_reflected_xss(request, &body) {
            findings.push(f);
        }
        if let Some(f) = self.check_path_traversal(request, response, &body) {
            findings.push(f);
        }
        if let Some(f) = self.check_sensitive_body(request, &body) {
            findings.push(f);
        }
        if let Some(f) = self.check_sensitive_headers(request, response) {
            findings.push(f);
        }
        if let Some(f) = self.check_vulnerable_versions(request, response, &body) {
            findings.push(f);
        }
        if let Some(f) = self.check_csrf(request) {
            findings.push(f);
        }

        for finding in &findings {
            warn!("Passive scan: {finding}");
        }
        findings
    }

    fn check_sql_errors(&self, request: &FlowRequest, body: &str) -> Option<Finding> {
        for pattern in SQL_ERROR_PATTERNS.iter() {
            if let Some(m) = pattern.find(body) {
                return Some(Finding::new(
                    "SQL Injection",
                    Severity::High,
                    &request.url,
                    &request.method,
                    "Database error message reflected in the response",
                    m.as_str(),
                ));
            }
        }
        None
    }

    fn check_reflected_xss(&self, request: &FlowRequest, body: &str) -> Option<Finding> {
        let request_data = format!("{}{}", request.url, request.body_text());
        for pattern in XSS_REFLECTION_PATTERNS.iter() {
            for m in pattern.find_iter(&request_data) {
                if body.contains(m.as_str()) {
                    return Some(Finding::new(
                        "Cross-Site Scripting (XSS)",
                        Severity::High,
                        &request.url,
                        &request.method,
                        "Request payload reflected unencoded in the response",
                        m.as_str(),
                    ));
                }
            }
        }
        None
    }

    fn check_path_traversal(
        &self,
        request: &FlowRequest,
        response: &FlowResponse,
        body: &str,
    ) -> Option<Finding> {
        let request_data = format!("{}{}", request.url, request.body_text());
        for pattern in PATH_TRAVERSAL_PATTERNS.iter() {
            let Some(m) = pattern.find(&request_data) else {
                continue;
            };
            if SYSTEM_FILE_PATTERN.is_match(body) {
                return Some(Finding::new(
                    "Path Traversal",
                    Severity::Critical,
                    &request.url,
                    &request.method,
                    "Traversal payload answered with system file content",
                    SYSTEM_FILE_PATTERN.find(body).map(|m| m.as_str()).unwrap_or_default(),
                ));
            }
            if response.status == 200 {
                return Some(Finding::new(
                    "Path Traversal",
                    Severity::Medium,
                    &request.url,
                    &request.method,
                    "Traversal payload accepted with a 200 response",
                    m.as_str(),
                ));
            }
            debug!("Traversal payload in request but no oracle hit: {}", request.url);
            return None;
        }
        None
    }

    fn check_sensitive_body(&self, request: &FlowRequest, body: &str) -> Option<Finding> {
        for (pattern, description) in SENSITIVE_PATTERNS.iter() {
            if let Some(m) = pattern.find(body) {
                return Some(Finding::new(
                    "Sensitive Information Disclosure",
                    Severity::Medium,
                    &request.url,
                    &request.method,
                    *description,
                    m.as_str(),
                ));
            }
        }
        None
    }

    fn check_sensitive_headers(
        &self,
        request: &FlowRequest,
        response: &FlowResponse,
    ) -> Option<Finding> {
        for header in SENSITIVE_HEADERS {
            if response.headers.contains(header) {
                return Some(Finding::new(
                    "Sensitive Header Disclosure",
                    Severity::Low,
                    &request.url,
                    &request.method,
                    format!("Sensitive header exposed in the response: {header}"),
                    *header,
                ));
            }
        }
        None
    }

    fn check_vulnerable_versions(
        &self,
        request: &FlowRequest,
        response: &FlowResponse,
        body: &str,
    ) -> Option<Finding> {
        let server = response.headers.get("server").unwrap_or_default();
        for (pattern, description) in VULNERABLE_VERSION_PATTERNS.iter() {
            if pattern.is_match(server) {
                return Some(Finding::new(
                    "Known Vulnerable Component",
                    Severity::High,
                    &request.url,
                    &request.method,
                    *description,
                    server,
                ));
            }
            if let Some(m) = pattern.find(body) {
                return Some(Finding::new(
                    "Known Vulnerable Component",
                    Severity::High,
                    &request.url,
                    &request.method,
                    *description,
                    m.as_str(),
                ));
            }
        }
        None
    }

    fn check_csrf(&self, request: &FlowRequest) -> Option<Finding> {
        if !STATE_CHANGING_METHODS.contains(&request.method.to_uppercase().as_str()) {
            return None;
        }

        let body = request.body_text().to_lowercase();
        let has_token = CSRF_INDICATORS.iter().any(|i| body.contains(i))
            || CSRF_INDICATORS
                .iter()
                .any(|i| request.headers.any_name_contains(i));
        if has_token {
            return None;
        }

        Some(Finding::new(
            "Missing CSRF Protection",
            Severity::Medium,
            &request.url,
            &request.method,
            "State-changing request carries no apparent CSRF token",
            format!("{} without CSRF token", request.method),
        ))
    }
}
