// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

//! Active vulnerability scanner
//!
//! Replays a captured request with probe payloads at each insertion point
//! (query and urlencoded-body parameters) and reasons over error, boolean,
//! timing, and reflection oracles. The scanner owns a private HTTP client
//! with certificate verification disabled; that client must not be reused
//! anywhere else.

use std::collections::HashSet;
use std::time::{Duration, Instant};

use lazy_static::lazy_static;
use regex::Regex;
use tracing::{debug, info, warn};
use url::Url;

use super::{Finding, Severity};
use crate::error::Result;
use crate::flow::FlowRequest;

lazy_static! {
    static ref SQL_ERROR_PATTERNS: Vec<Regex> = [
        r"(?i)sql\s+syntax",
        r"(?i)mysql_fetch",
        r"(?i)unclosed\s+quotation\s+mark",
        r"(?i)quoted\s+string\s+not\s+properly\s+terminated",
        r"(?i)ora-\d{5}",
        r"(?i)postgresql.*error",
        r"(?i)microsoft\s+sql\s+server",
        r"(?i)odbc\s+driver",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect();

    static ref COMMAND_OUTPUT_PATTERN: Regex =
        Regex::new(r"uid=\d+|(?i)\b(root|daemon|www-data|nt authority|administrator)\b").unwrap();
}

/// Error-based SQL injection probes
const SQLI_ERROR_PAYLOADS: &[&str] = &["'", "\"", "' OR 1=1 --"];

/// Time-based SQL injection probes per dialect
const SQLI_TIME_PAYLOADS: &[(&str, &str)] = &[
    ("' OR SLEEP(5)--", "MySQL"),
    ("'; WAITFOR DELAY '0:0:5'--", "MSSQL"),
    ("'||pg_sleep(5)--", "PostgreSQL"),
];

/// OS command injection delay probes
const CMD_DELAY_PAYLOADS: &[&str] = &[";sleep 5", "|sleep 5", "&timeout /t 5"];

/// OS command injection output probes
const CMD_OUTPUT_PAYLOADS: &[&str] = &[";whoami", "|whoami"];

/// Reflection marker for XSS probes
const XSS_PAYLOAD: &str = "activescanner<xss>test";

/// Where a parameter lives in the request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InsertionKind {
    Query,
    Body,
}

/// One probe-able parameter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertionPoint {
    pub kind: InsertionKind,
    pub name: String,
    pub value: String,
}

/// Active scanner configuration
#[derive(Debug, Clone)]
pub struct ActiveScannerConfig {
    /// Per-probe request timeout
    pub timeout: Duration,
    /// RTT increase treated as a confirmed delay
    pub delay_threshold: Duration,
}

impl Default for ActiveScannerConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            delay_threshold: Duration::from_secs(4),
        }
    }
}

/// Probes captured requests for injectable parameters
pub struct ActiveScanner {
    client: reqwest::Client,
    config: ActiveScannerConfig,
}

struct Probe {
    status: u16,
    body: String,
    elapsed: Duration,
}

impl ActiveScanner {
    /// Create a scanner with the default configuration
    pub fn new() -> Result<Self> {
        Self::with_config(ActiveScannerConfig::default())
    }

    /// Create a scanner with a custom configuration.
    ///
    /// Certificate verification is disabled: scan targets routinely present
    /// self-signed or proxy-minted certificates.
    pub fn with_config(config: ActiveScannerConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        Ok(Self { client, config })
    }

    /// Enumerate the insertion points of a request: each distinct query
    /// parameter, plus each body parameter when the body is a urlencoded form
    pub fn insertion_points(request: &FlowRequest) -> Vec<InsertionPoint> {
        let mut points = Vec::new();
        let mut seen = HashSet::new();

        if let Ok(url) = Url::parse(&request.url) {
            for (name, value) in url.query_pairs() {
                if seen.insert((InsertionKind::Query, name.to_string())) {
                    points.push(InsertionPoint {
                        kind: InsertionKind::Query,
                        name: name.to_string(),
                        value: value.to_string(),
                    });
                }
            }
        }

        if request.is_form() {
            for (name, value) in url::form_urlencoded::parse(&request.body) {
                if seen.insert((InsertionKind::Body, name.to_string())) {
                    points.push(InsertionPoint {
                        kind: InsertionKind::Body,
                        name: name.to_string(),
                        value: value.to_string(),
                    });
                }
            }
        }

        debug!("Insertion points found: {}", points.len());
        points
    }

    /// Run every probe family over every insertion point of a request.
    ///
    /// Findings are deduplicated by (type, url, parameter); a probe that
    /// fails with a transport error is skipped and scanning continues.
    pub async fn scan_request(&self, request: &FlowRequest) -> Vec<Finding> {
        info!("Active scan: {} {}", request.method, request.url);
        let points = Self::insertion_points(request);

        let mut findings = Vec::new();
        let mut seen: HashSet<(String, String, String)> = HashSet::new();

        for point in &points {
            debug!("Probing {:?} parameter '{}'", point.kind, point.name);

            let baseline = self.send_with_payload(request, point, &point.value).await;

            let families = [
                self.check_sqli_error(request, point).await,
                self.check_sqli_boolean(request, point, baseline.as_ref()).await,
                self.check_sqli_time(request, point, baseline.as_ref()).await,
                self.check_command_injection(request, point, baseline.as_ref()).await,
                self.check_xss(request, point).await,
            ];

            for finding in families.into_iter().flatten() {
                let key = (
                    finding.vuln_type.clone(),
                    finding.url.clone(),
                    point.name.clone(),
                );
                if seen.insert(key) {
                    warn!("Active scan hit: {finding}");
                    findings.push(finding);
                }
            }
        }

        if !findings.is_empty() {
            warn!("{} active finding(s) for {}", findings.len(), request.url);
        }
        findings
    }

    /// Error-based SQL injection: append quote-breakers, watch for database
    /// error strings
    async fn check_sqli_error(
        &self,
        request: &FlowRequest,
        point: &InsertionPoint,
    ) -> Option<Finding> {
        for payload in SQLI_ERROR_PAYLOADS {
            let full = format!("{}{payload}", point.value);
            let Some(probe) = self.send_with_payload(request, point, &full).await else {
                continue;
            };
            for pattern in SQL_ERROR_PATTERNS.iter() {
                if let Some(m) = pattern.find(&probe.body) {
                    return Some(Finding::new(
                        "SQL Injection (Error-Based)",
                        Severity::High,
                        &request.url,
                        &request.method,
                        format!("Database error triggered via parameter '{}' with payload {payload:?}", point.name),
                        m.as_str(),
                    ));
                }
            }
        }
        None
    }

    /// Boolean-based SQL injection: a true-condition probe should leave the
    /// response length alone while a false-condition probe changes it
    async fn check_sqli_boolean(
        &self,
        request: &FlowRequest,
        point: &InsertionPoint,
        baseline: Option<&Probe>,
    ) -> Option<Finding> {
        let baseline = baseline?;
        let len_base = baseline.body.len() as i64;

        let true_probe = self
            .send_with_payload(request, point, &format!("{}' AND '1'='1", point.value))
            .await?;
        let false_probe = self
            .send_with_payload(request, point, &format!("{}' AND '1'='2", point.value))
            .await?;

        let threshold = (len_base / 10).max(100);
        let true_delta = (len_base - true_probe.body.len() as i64).abs();
        let false_delta = (len_base - false_probe.body.len() as i64).abs();

        if true_delta < threshold && false_delta >= threshold {
            return Some(Finding::new(
                "SQL Injection (Boolean-Based)",
                Severity::High,
                &request.url,
                &request.method,
                format!(
                    "Parameter '{}' responds differently to true/false conditions (baseline {len_base}, false {})",
                    point.name,
                    false_probe.body.len()
                ),
                format!("delta {false_delta} >= threshold {threshold}"),
            ));
        }
        None
    }

    /// Time-based SQL injection: sleep payloads per dialect against the
    /// baseline round trip time
    async fn check_sqli_time(
        &self,
        request: &FlowRequest,
        point: &InsertionPoint,
        baseline: Option<&Probe>,
    ) -> Option<Finding> {
        let baseline_rtt = baseline.map(|p| p.elapsed).unwrap_or_default();

        for (payload, dialect) in SQLI_TIME_PAYLOADS {
            let full = format!("{}{payload}", point.value);
            let Some(probe) = self.send_with_payload(request, point, &full).await else {
                continue;
            };
            if probe.elapsed > baseline_rtt + self.config.delay_threshold {
                return Some(Finding::new(
                    "SQL Injection (Time-Based)",
                    Severity::High,
                    &request.url,
                    &request.method,
                    format!(
                        "{dialect} sleep payload delayed parameter '{}' by {:?}",
                        point.name,
                        probe.elapsed - baseline_rtt
                    ),
                    *payload,
                ));
            }
        }
        None
    }

    /// OS command injection: shell delay payloads and command-output probes
    async fn check_command_injection(
        &self,
        request: &FlowRequest,
        point: &InsertionPoint,
        baseline: Option<&Probe>,
    ) -> Option<Finding> {
        let baseline_rtt = baseline.map(|p| p.elapsed).unwrap_or_default();

        for payload in CMD_DELAY_PAYLOADS {
            let full = format!("{}{payload}", point.value);
            let Some(probe) = self.send_with_payload(request, point, &full).await else {
                continue;
            };
            if probe.elapsed > baseline_rtt + self.config.delay_threshold {
                return Some(Finding::new(
                    "OS Command Injection",
                    Severity::Critical,
                    &request.url,
                    &request.method,
                    format!("Shell delay payload stalled parameter '{}'", point.name),
                    *payload,
                ));
            }
        }

        for payload in CMD_OUTPUT_PAYLOADS {
            let full = format!("{}{payload}", point.value);
            let Some(probe) = self.send_with_payload(request, point, &full).await else {
                continue;
            };
            if let Some(m) = COMMAND_OUTPUT_PATTERN.find(&probe.body) {
                return Some(Finding::new(
                    "OS Command Injection",
                    Severity::Critical,
                    &request.url,
                    &request.method,
                    format!("Command output reflected via parameter '{}'", point.name),
                    m.as_str(),
                ));
            }
        }
        None
    }

    /// Reflected XSS: a tagged marker that comes back verbatim
    async fn check_xss(&self, request: &FlowRequest, point: &InsertionPoint) -> Option<Finding> {
        let full = format!("{}{XSS_PAYLOAD}", point.value);
        let probe = self.send_with_payload(request, point, &full).await?;
        if probe.body.contains(XSS_PAYLOAD) {
            return Some(Finding::new(
                "Cross-Site Scripting (XSS)",
                Severity::High,
                &request.url,
                &request.method,
                format!("XSS probe reflected via parameter '{}'", point.name),
                XSS_PAYLOAD,
            ));
        }
        None
    }

    /// Send the captured request with one parameter replaced.
    ///
    /// Transport errors are logged at debug and swallowed so one failing
    /// probe never aborts the scan.
    async fn send_with_payload(
        &self,
        request: &FlowRequest,
        point: &InsertionPoint,
        payload: &str,
    ) -> Option<Probe> {
        let outcome = self.try_send(request, point, payload).await;
        match outcome {
            Ok(probe) => {
                debug!(
                    "Probe '{}' -> {} ({} bytes, {:?})",
                    point.name,
                    probe.status,
                    probe.body.len(),
                    probe.elapsed
                );
                Some(probe)
            }
            Err(e) => {
                debug!("Probe against '{}' failed: {e}", point.name);
                None
            }
        }
    }

    async fn try_send(
        &self,
        request: &FlowRequest,
        point: &InsertionPoint,
        payload: &str,
    ) -> Result<Probe> {
        let mut url = Url::parse(&request.url)?;
        let mut body = request.body.to_vec();

        match point.kind {
            InsertionKind::Query => {
                let pairs: Vec<(String, String)> = url
                    .query_pairs()
                    .map(|(k, v)| {
                        if k == point.name.as_str() {
                            (k.to_string(), payload.to_string())
                        } else {
                            (k.to_string(), v.to_string())
                        }
                    })
                    .collect();
                url.query_pairs_mut().clear().extend_pairs(pairs);
            }
            InsertionKind::Body => {
                let rewritten: String = url::form_urlencoded::Serializer::new(String::new())
                    .extend_pairs(url::form_urlencoded::parse(&request.body).map(|(k, v)| {
                        if k == point.name.as_str() {
                            (k.to_string(), payload.to_string())
                        } else {
                            (k.to_string(), v.to_string())
                        }
                    }))
                    .finish();
                body = rewritten.into_bytes();
            }
        }

        let method = reqwest::Method::from_bytes(request.method.as_bytes())
            .unwrap_or(reqwest::Method::GET);
        let mut builder = self.client.request(method, url);
        for (name, value) in &request.headers {
            if name.eq_ignore_ascii_case("host") || name.eq_ignore_ascii_case("content-length") {
                continue;
            }
            builder = builder.header(name.as_str(), value.as_str());
        }
        if !body.is_empty() {
            builder = builder.body(body);
        }

        let start = Instant::now();
        let response = builder.send().await?;
        let status = response.status().as_u16();
        let text = response.text().await.unwrap_or_default();
        Ok(Probe {
            status,
            body: text,
            elapsed: start.elapsed(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn get_request(url: &str) -> FlowRequest {
        let parsed = Url::parse(url).unwrap();
        FlowRequest::new("GET", url, parsed.host_str().unwrap_or_default(), parsed.path())
    }

    #[test]
    fn test_insertion_points_query_and_body() {
        let mut request = FlowRequest::new(
            "POST",
            "http://example.com/login?next=home",
            "example.com",
            "/login",
        );
        request
            .headers
            .append("Content-Type", "application/x-www-form-urlencoded");
        request.body = Bytes::from_static(b"user=a&pw=b");

        let points = ActiveScanner::insertion_points(&request);
        assert_eq!(points.len(), 3);
        assert_eq!(points[0].kind, InsertionKind::Query);
        assert_eq!(points[0].name, "next");
        assert!(points
            .iter()
            .any(|p| p.kind == InsertionKind::Body && p.name == "pw"));
    }

    #[test]
    fn test_insertion_points_deduplicated() {
        let request = get_request("http://example.com/a?id=1&id=2&q=x");
        let points = ActiveScanner::insertion_points(&request);
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].value, "1");
    }

    #[test]
    fn test_body_ignored_without_form_content_type() {
        let mut request = FlowRequest::new("POST", "http://example.com/api", "example.com", "/api");
        request.body = Bytes::from_static(b"{\"user\":\"a\"}");
        assert!(ActiveScanner::insertion_points(&request).is_empty());
    }

    #[tokio::test]
    async fn test_error_based_sqli_detected() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/item"))
            .and(query_param("id", "5'"))
            .respond_with(
                ResponseTemplate::new(500)
                    .set_body_string("You have an error in your SQL syntax near '5'"),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/item"))
            .respond_with(ResponseTemplate::new(200).set_body_string("item page"))
            .mount(&server)
            .await;

        let scanner = ActiveScanner::new().unwrap();
        let request = get_request(&format!("{}/item?id=5", server.uri()));
        let findings = scanner.scan_request(&request).await;

        let sqli = findings
            .iter()
            .find(|f| f.vuln_type == "SQL Injection (Error-Based)")
            .expect("error-based finding");
        assert_eq!(sqli.severity, Severity::High);
        assert!(sqli.description.contains("'id'"));
    }

    #[tokio::test]
    async fn test_boolean_based_sqli_detected() {
        let server = MockServer::start().await;
        let long_body = "x".repeat(2000);
        Mock::given(method("GET"))
            .and(path("/item"))
            .and(query_param("id", "5' AND '1'='2"))
            .respond_with(ResponseTemplate::new(200).set_body_string("x".repeat(120)))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/item"))
            .respond_with(ResponseTemplate::new(200).set_body_string(long_body))
            .mount(&server)
            .await;

        let scanner = ActiveScanner::new().unwrap();
        let request = get_request(&format!("{}/item?id=5", server.uri()));
        let findings = scanner.scan_request(&request).await;

        assert!(findings
            .iter()
            .any(|f| f.vuln_type == "SQL Injection (Boolean-Based)"));
    }

    #[tokio::test]
    async fn test_xss_reflection_detected() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(format!("you searched for cats{XSS_PAYLOAD}")),
            )
            .mount(&server)
            .await;

        let scanner = ActiveScanner::new().unwrap();
        let request = get_request(&format!("{}/search?q=cats", server.uri()));
        let findings = scanner.scan_request(&request).await;

        assert!(findings
            .iter()
            .any(|f| f.vuln_type == "Cross-Site Scripting (XSS)"));
    }

    #[tokio::test]
    async fn test_clean_target_yields_no_findings() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("all quiet"))
            .mount(&server)
            .await;

        let scanner = ActiveScanner::new().unwrap();
        let request = get_request(&format!("{}/page?p=1", server.uri()));
        assert!(scanner.scan_request(&request).await.is_empty());
    }
}
