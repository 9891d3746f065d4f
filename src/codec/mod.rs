// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

//! Raw HTTP request codec
//!
//! Parses the textual HTTP/1.1 requests pasted into replay and intruder
//! surfaces, supports in-place parameter substitution, and re-emits the
//! request with `Host` and `Content-Length` recomputed. Emission does not
//! preserve exact whitespace or casing.

pub mod transforms;

use crate::error::{Error, Result};

/// A parsed raw HTTP/1.1 request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRequest {
    /// HTTP method from the request line
    pub method: String,
    /// Request target (origin form, usually path plus query)
    pub target: String,
    /// Headers in their original order
    pub headers: Vec<(String, String)>,
    /// Body text
    pub body: String,
}

impl RawRequest {
    /// Parse a raw request: head and body split at the first blank line,
    /// request line into method and target, one header per line.
    ///
    /// A `Host` header is required since it drives URL reconstruction.
    pub fn parse(raw: &str) -> Result<Self> {
        let normalized = raw.replace("\r\n", "\n");
        let trimmed = normalized.trim_start_matches('\n');
        let (head, body) = match trimmed.split_once("\n\n") {
            Some((head, body)) => (head, body.to_string()),
            None => (trimmed.trim_end_matches('\n'), String::new()),
        };

        let mut lines = head.lines();
        let request_line = lines
            .next()
            .filter(|l| !l.trim().is_empty())
            .ok_or_else(|| Error::parse("empty request"))?;

        let mut parts = request_line.split_whitespace();
        let method = parts
            .next()
            .ok_or_else(|| Error::parse("missing method in request line"))?
            .to_string();
        let target = parts
            .next()
            .ok_or_else(|| Error::parse("missing target in request line"))?
            .to_string();

        let mut headers = Vec::new();
        for line in lines {
            if line.trim().is_empty() {
                continue;
            }
            let (name, value) = line
                .split_once(':')
                .ok_or_else(|| Error::parse(format!("malformed header line: {line}")))?;
            headers.push((name.trim().to_string(), value.trim().to_string()));
        }

        let parsed = Self {
            method,
            target,
            headers,
            body,
        };
        parsed.host()?;
        Ok(parsed)
    }

    /// The `Host` header value
    pub fn host(&self) -> Result<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case("host"))
            .map(|(_, v)| v.as_str())
            .ok_or_else(|| Error::parse("missing Host header"))
    }

    /// First value of a named header
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Scheme inferred from the host: plain HTTP for loopback and private
    /// addresses, HTTPS for everything else
    pub fn scheme(&self) -> &'static str {
        let host = self.host().unwrap_or_default();
        let private = ["127.0.0.1", "localhost", "192.168.", "10.", "172."];
        if private.iter().any(|p| host.starts_with(p)) {
            "http"
        } else {
            "https"
        }
    }

    /// Reconstructed absolute URL
    pub fn url(&self) -> Result<String> {
        if self.target.starts_with("http://") || self.target.starts_with("https://") {
            return Ok(self.target.clone());
        }
        let host = self.host()?;
        let target = if self.target.starts_with('/') {
            self.target.clone()
        } else {
            format!("/{}", self.target)
        };
        Ok(format!("{}://{}{}", self.scheme(), host, target))
    }

    /// Whether the body is a urlencoded form
    pub fn is_form(&self) -> bool {
        self.header("content-type")
            .map(|ct| ct.contains("application/x-www-form-urlencoded"))
            .unwrap_or(false)
    }

    /// Substitute a parameter value.
    ///
    /// Replaces the value in the target's query string when present, else in
    /// a urlencoded body, else appends `?name=value` (or `&`) to the target.
    pub fn substitute_param(&mut self, name: &str, value: &str) {
        let value = value.trim();

        if let Some(replaced) = substitute_value(&self.target, name, value) {
            self.target = replaced;
            return;
        }
        if !self.body.is_empty() && self.is_form() {
            if let Some(replaced) = substitute_value(&self.body, name, value) {
                self.body = replaced;
                return;
            }
        }
        self.target = append_param(&self.target, name, value);
    }

    /// Emit the request as HTTP/1.1 text.
    ///
    /// `Host` and `Content-Length` are recomputed: a canonical `Host` line
    /// derived from the parsed header leads the header block, and the
    /// length is taken from the body. The remaining headers keep their
    /// original order.
    pub fn emit(&self) -> String {
        let mut out = format!("{} {} HTTP/1.1\r\n", self.method, self.target);
        if let Ok(host) = self.host() {
            out.push_str(&format!("Host: {host}\r\n"));
        }
        for (name, value) in &self.headers {
            if name.eq_ignore_ascii_case("host") || name.eq_ignore_ascii_case("content-length") {
                continue;
            }
            out.push_str(&format!("{name}: {value}\r\n"));
        }
        if !self.body.is_empty() {
            out.push_str(&format!("Content-Length: {}\r\n", self.body.len()));
        }
        out.push_str("\r\n");
        out.push_str(&self.body);
        out
    }
}

/// Replace every value of `name` in a query string or urlencoded body.
///
/// `source` may be a bare query string, a path with a `?query` suffix, or a
/// form body. Returns `None` when the parameter is absent.
fn substitute_value(source: &str, name: &str, value: &str) -> Option<String> {
    let (prefix, query) = match source.split_once('?') {
        Some((path, query)) => (Some(path), query),
        None if source.starts_with('/') => return None,
        None => (None, source),
    };

    let mut found = false;
    let rewritten: Vec<String> = query
        .split('&')
        .map(|pair| {
            let key = pair.split('=').next().unwrap_or(pair);
            if key == name {
                found = true;
                format!("{name}={value}")
            } else {
                pair.to_string()
            }
        })
        .collect();

    if !found {
        return None;
    }

    let joined = rewritten.join("&");
    Some(match prefix {
        Some(path) => format!("{path}?{joined}"),
        None => joined,
    })
}

/// Append a parameter to a request target
fn append_param(target: &str, name: &str, value: &str) -> String {
    if target.contains('?') {
        format!("{target}&{name}={value}")
    } else {
        format!("{target}?{name}={value}")
    }
}
