// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

//! Bounded flow history with monotonic ids

use std::collections::VecDeque;

use parking_lot::Mutex;
use regex::Regex;

use super::record::Flow;
use crate::scan::Finding;

/// Default history capacity
pub const DEFAULT_CAPACITY: usize = 1000;

/// Ring buffer of committed flows.
///
/// Oldest entries are evicted on overflow; flow ids keep increasing across
/// evictions so pollers can use [`History::entries_since`] for incremental
/// refresh without rescanning.
#[derive(Debug)]
pub struct History {
    entries: Mutex<VecDeque<Flow>>,
    capacity: usize,
}

impl Default for History {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl History {
    /// Create a history bounded to `capacity` entries
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity: capacity.max(1),
        }
    }

    /// Commit a flow, evicting the oldest entry when full
    pub fn push(&self, flow: Flow) {
        let mut entries = self.entries.lock();
        if entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(flow);
    }

    /// Full snapshot, oldest first
    pub fn snapshot(&self) -> Vec<Flow> {
        self.entries.lock().iter().cloned().collect()
    }

    /// Entries whose id exceeds `last_id`, in commit order
    pub fn entries_since(&self, last_id: u64) -> Vec<Flow> {
        self.entries
            .lock()
            .iter()
            .filter(|f| f.id > last_id)
            .cloned()
            .collect()
    }

    /// Look up a flow by id
    pub fn get(&self, id: u64) -> Option<Flow> {
        self.entries.lock().iter().find(|f| f.id == id).cloned()
    }

    /// Number of retained entries
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Drop all entries
    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    /// Append scan findings to a committed flow.
    ///
    /// Exact duplicates (same type, url, and evidence) are suppressed, so
    /// re-scanning a flow never grows its list.
    pub fn append_findings(&self, flow_id: u64, findings: Vec<Finding>) {
        let mut entries = self.entries.lock();
        if let Some(flow) = entries.iter_mut().find(|f| f.id == flow_id) {
            for finding in findings {
                let duplicate = flow
                    .vulnerabilities
                    .iter()
                    .any(|v| v.dedup_key() == finding.dedup_key());
                if !duplicate {
                    flow.vulnerabilities.push(finding);
                }
            }
        }
    }

    /// Entries whose method, URL, or status match a regex filter.
    ///
    /// An invalid pattern means no filter: the full snapshot is returned.
    pub fn matching(&self, pattern: &str) -> Vec<Flow> {
        let re = match Regex::new(pattern) {
            Ok(re) => re,
            Err(_) => return self.snapshot(),
        };
        self.entries
            .lock()
            .iter()
            .filter(|f| {
                re.is_match(&f.request.method)
                    || re.is_match(&f.request.url)
                    || re.is_match(&f.status().to_string())
            })
            .cloned()
            .collect()
    }
}
