// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

//! Flow records - the canonical request/response artifact

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::headers::Headers;
use crate::scan::Finding;

/// Request half of a flow
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowRequest {
    /// HTTP method
    pub method: String,
    /// Full URL including scheme and query string
    pub url: String,
    /// Hostname (no port)
    pub host: String,
    /// Path plus query string
    pub path: String,
    /// Request headers
    pub headers: Headers,
    /// Request body
    #[serde(skip)]
    pub body: Bytes,
}

/// Response half of a flow
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowResponse {
    /// HTTP status code
    pub status: u16,
    /// Response headers
    pub headers: Headers,
    /// Response body
    #[serde(skip)]
    pub body: Bytes,
}

/// One HTTP transaction through the proxy.
///
/// Created by the proxy engine when the request is read, finalized when the
/// response arrives, and committed to [`super::History`]. After commit the
/// record is read-only except for the vulnerability list, which grows via
/// [`super::History::append_findings`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Flow {
    /// Monotonic flow id, unique for the process lifetime
    pub id: u64,
    /// Time the request was received
    pub timestamp: DateTime<Utc>,
    /// Request half
    pub request: FlowRequest,
    /// Response half, absent until the upstream answered
    pub response: Option<FlowResponse>,
    /// Findings appended by the passive and active scanners
    pub vulnerabilities: Vec<Finding>,
}

impl FlowRequest {
    /// Create a request half
    pub fn new(
        method: impl Into<String>,
        url: impl Into<String>,
        host: impl Into<String>,
        path: impl Into<String>,
    ) -> Self {
        Self {
            method: method.into(),
            url: url.into(),
            host: host.into(),
            path: path.into(),
            headers: Headers::new(),
            body: Bytes::new(),
        }
    }

    /// Body decoded as UTF-8 with replacement
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Content-Type header, if any
    pub fn content_type(&self) -> Option<&str> {
        self.headers.get("content-type")
    }

    /// Check whether the body is a urlencoded form
    pub fn is_form(&self) -> bool {
        self.content_type()
            .map(|ct| ct.starts_with("application/x-www-form-urlencoded"))
            .unwrap_or(false)
    }

    /// Query parameters as a name -> value map (last value wins)
    pub fn query_params(&self) -> HashMap<String, String> {
        match url::Url::parse(&self.url) {
            Ok(u) => u
                .query_pairs()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            Err(_) => HashMap::new(),
        }
    }

    /// Form body parameters as a name -> value map (last value wins)
    pub fn body_params(&self) -> HashMap<String, String> {
        url::form_urlencoded::parse(&self.body)
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }
}

impl FlowResponse {
    /// Create a response half
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: Headers::new(),
            body: Bytes::new(),
        }
    }

    /// Body decoded as UTF-8 with replacement
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Content-Type header, if any
    pub fn content_type(&self) -> Option<&str> {
        self.headers.get("content-type")
    }

    /// Check if the response is HTML
    pub fn is_html(&self) -> bool {
        self.content_type()
            .map(|ct| ct.contains("text/html"))
            .unwrap_or(false)
    }

    /// Check if the status is a success (2xx)
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

impl Flow {
    /// Create a flow from its request half
    pub fn new(id: u64, request: FlowRequest) -> Self {
        Self {
            id,
            timestamp: Utc::now(),
            request,
            response: None,
            vulnerabilities: Vec::new(),
        }
    }

    /// Status code, 0 when no response was recorded
    pub fn status(&self) -> u16 {
        self.response.as_ref().map(|r| r.status).unwrap_or(0)
    }

    /// One-line summary for logs and history tables
    pub fn summary(&self) -> String {
        format!("{} {} -> {}", self.request.method, self.request.url, self.status())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_flow() -> Flow {
        let mut request = FlowRequest::new(
            "GET",
            "http://example.com/search?q=cats&p=1",
            "example.com",
            "/search?q=cats&p=1",
        );
        request.headers.append("Host", "example.com");
        Flow::new(7, request)
    }

    #[test]
    fn test_query_params() {
        let flow = sample_flow();
        let params = flow.request.query_params();
        assert_eq!(params.get("q"), Some(&"cats".to_string()));
        assert_eq!(params.get("p"), Some(&"1".to_string()));
    }

    #[test]
    fn test_form_detection() {
        let mut request = FlowRequest::new("POST", "http://example.com/login", "example.com", "/login");
        request
            .headers
            .append("Content-Type", "application/x-www-form-urlencoded; charset=utf-8");
        request.body = Bytes::from_static(b"user=a&pw=b");
        assert!(request.is_form());
        assert_eq!(request.body_params().get("pw"), Some(&"b".to_string()));
    }

    #[test]
    fn test_status_without_response() {
        let flow = sample_flow();
        assert_eq!(flow.status(), 0);
        assert!(flow.response.is_none());
    }
}
