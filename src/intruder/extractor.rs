// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

//! Grep extraction from attack responses

use regex::Regex;
use tracing::warn;

/// Extracts values from responses with user-supplied regular expressions.
///
/// Each pattern must carry exactly one capture group; for every response the
/// first match of each pattern is captured, or the empty string when the
/// pattern does not match. Invalid patterns are skipped with a warning.
#[derive(Debug, Clone, Default)]
pub struct GrepExtractor {
    patterns: Vec<Regex>,
}

impl GrepExtractor {
    /// Compile the given patterns, dropping any that fail to compile
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Self {
        let patterns = patterns
            .iter()
            .filter_map(|p| {
                let p = p.as_ref();
                match Regex::new(p) {
                    Ok(re) => Some(re),
                    Err(e) => {
                        warn!("Skipping invalid grep pattern '{p}': {e}");
                        None
                    }
                }
            })
            .collect();
        Self { patterns }
    }

    /// Number of usable patterns
    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    /// Check if there are no usable patterns
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Extract one value per pattern from a response body
    pub fn extract(&self, text: &str) -> Vec<String> {
        self.patterns
            .iter()
            .map(|re| {
                re.captures(text)
                    .and_then(|c| c.get(1))
                    .map(|m| m.as_str().to_string())
                    .unwrap_or_default()
            })
            .collect()
    }
}
