// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

//! Vulnerability scanning
//!
//! The passive scanner inspects every proxied response read-only; the active
//! scanner replays captured requests with probe payloads and reasons over
//! error, boolean, timing, and reflection oracles.

mod active;
mod passive;

pub use active::{ActiveScanner, ActiveScannerConfig};
pub use passive::PassiveScanner;

use serde::{Deserialize, Serialize};
use std::fmt;

/// Finding severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Low => "Low",
            Severity::Medium => "Medium",
            Severity::High => "High",
            Severity::Critical => "Critical",
        };
        f.write_str(s)
    }
}

/// A single vulnerability finding
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Finding {
    /// Vulnerability class, e.g. "SQL Injection (Error-Based)"
    pub vuln_type: String,
    /// Severity derived from the class and oracle strength
    pub severity: Severity,
    /// URL the finding applies to
    pub url: String,
    /// HTTP method of the triggering request
    pub method: String,
    /// Human-readable description
    pub description: String,
    /// Evidence excerpt (truncated)
    pub evidence: String,
}

/// Evidence excerpts are capped so one giant response cannot bloat a flow
const MAX_EVIDENCE_LEN: usize = 100;

impl Finding {
    /// Create a finding, truncating the evidence excerpt
    pub fn new(
        vuln_type: impl Into<String>,
        severity: Severity,
        url: impl Into<String>,
        method: impl Into<String>,
        description: impl Into<String>,
        evidence: impl Into<String>,
    ) -> Self {
        let mut evidence = evidence.into();
        if evidence.len() > MAX_EVIDENCE_LEN {
            let mut cut = MAX_EVIDENCE_LEN;
            while !evidence.is_char_boundary(cut) {
                cut -= 1;
            }
            evidence.truncate(cut);
        }
        Self {
            vuln_type: vuln_type.into(),
            severity,
            url: url.into(),
            method: method.into(),
            description: description.into(),
            evidence,
        }
    }

    /// Key used to suppress exact duplicates on a flow
    pub fn dedup_key(&self) -> (&str, &str, &str) {
        (&self.vuln_type, &self.url, &self.evidence)
    }
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} at {} ({})",
            self.severity, self.vuln_type, self.url, self.description
        )
    }
}

/// Format a findings report for terminal display
pub fn format_report(findings: &[Finding]) -> String {
    if findings.is_empty() {
        return "No vulnerabilities detected.".to_string();
    }

    let mut out = String::new();
    out.push_str(&format!("{} finding(s)\n", findings.len()));
    for (i, finding) in findings.iter().enumerate() {
        out.push_str(&format!(
            "{}. {} [{}]\n   URL: {}\n   Method: {}\n   {}\n   Evidence: {}\n",
            i + 1,
            finding.vuln_type,
            finding.severity,
            finding.url,
            finding.method,
            finding.description,
            finding.evidence,
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Critical > Severity::High);
        assert!(Severity::High > Severity::Medium);
        assert!(Severity::Medium > Severity::Low);
    }

    #[test]
    fn test_evidence_truncated() {
        let finding = Finding::new(
            "Sensitive Information Disclosure",
            Severity::Medium,
            "http://example.com",
            "GET",
            "credentials in body",
            "x".repeat(500),
        );
        assert_eq!(finding.evidence.len(), 100);
    }

    #[test]
    fn test_report_formatting() {
        assert_eq!(format_report(&[]), "No vulnerabilities detected.");
        let finding = Finding::new(
            "XSS",
            Severity::High,
            "http://example.com",
            "GET",
            "payload reflected",
            "<script>",
        );
        let report = format_report(&[finding]);
        assert!(report.contains("XSS"));
        assert!(report.contains("High"));
    }
}
