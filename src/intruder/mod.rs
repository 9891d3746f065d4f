// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

//! Intruder - payload-position attacks
//!
//! Takes a raw request with `§`-delimited payload positions, expands it into
//! an attack plan (Sniper, Battering Ram, Pitchfork, or Cluster Bomb), runs
//! the plan at bounded concurrency through the replay executor, and reports
//! result rows with grep-extracted values.

mod attack;
mod extractor;
mod positions;
mod processor;

pub use attack::{generate, AttackType};
pub use extractor::GrepExtractor;
pub use positions::{
    count_positions, find_positions, replace_positions, PayloadPosition, DELIMITER,
    ORIGINAL_MARKER,
};
pub use processor::{apply_chain, Processor};

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Semaphore};
use tracing::{error, info, warn};

use crate::error::Result;
use crate::events::{Event, EventBus};
use crate::replay::{ReplayExecutor, ReplayResponse};

/// Default worker pool size
pub const DEFAULT_WORKERS: usize = 10;

/// Attack configuration
#[derive(Debug, Clone)]
pub struct IntruderConfig {
    /// Payload-position strategy
    pub attack_type: AttackType,
    /// Payload lists; Sniper and Battering Ram use the first, Pitchfork and
    /// Cluster Bomb take one per position
    pub payload_sets: Vec<Vec<String>>,
    /// Per-position processor chains; missing chains mean identity
    pub processors: Vec<Vec<Processor>>,
    /// Grep-extraction patterns, one capture group each
    pub grep_patterns: Vec<String>,
    /// Worker pool size
    pub workers: usize,
}

impl IntruderConfig {
    /// Create a config with default workers and no processors
    pub fn new(attack_type: AttackType, payload_sets: Vec<Vec<String>>) -> Self {
        Self {
            attack_type,
            payload_sets,
            processors: Vec::new(),
            grep_patterns: Vec::new(),
            workers: DEFAULT_WORKERS,
        }
    }

    /// Set per-position processor chains
    pub fn processors(mut self, processors: Vec<Vec<Processor>>) -> Self {
        self.processors = processors;
        self
    }

    /// Set grep-extraction patterns
    pub fn grep_patterns(mut self, patterns: Vec<String>) -> Self {
        self.grep_patterns = patterns;
        self
    }

    /// Set the worker pool size
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }
}

/// One result row of an attack run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttackResult {
    /// The payload tuple after processing
    pub payloads: Vec<String>,
    /// Requested URL (empty for failed rows)
    pub url: String,
    /// Response status, 0 on failure
    pub status: u16,
    /// Response body length in bytes
    pub length: usize,
    /// Grep-extracted values, one per pattern
    pub extracted: Vec<String>,
    /// Success means a 2xx status
    pub success: bool,
    /// Failure description for rows that never got a response
    pub error: Option<String>,
}

impl AttackResult {
    /// Build a row from a replay response
    pub fn from_response(
        payloads: Vec<String>,
        response: &ReplayResponse,
        extracted: Vec<String>,
    ) -> Self {
        Self {
            payloads,
            url: response.url.clone(),
            status: response.status,
            length: response.body.len(),
            extracted,
            success: response.is_success(),
            error: None,
        }
    }

    /// Build a failure row
    pub fn failure(payloads: Vec<String>, error: String) -> Self {
        Self {
            payloads,
            url: String::new(),
            status: 0,
            length: 0,
            extracted: Vec::new(),
            success: false,
            error: Some(error),
        }
    }
}

/// Handle used to cancel a running attack
#[derive(Debug, Clone)]
pub struct CancelHandle {
    sender: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    /// Create a handle and its receiver side
    pub fn new() -> (Self, watch::Receiver<bool>) {
        let (sender, receiver) = watch::channel(false);
        (
            Self {
                sender: Arc::new(sender),
            },
            receiver,
        )
    }

    /// Cancel the run; in-flight workers abandon their request at the next
    /// suspension point
    pub fn cancel(&self) {
        let _ = self.sender.send(true);
    }

    /// Whether cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        *self.sender.borrow()
    }
}

impl Default for CancelHandle {
    fn default() -> Self {
        Self::new().0
    }
}

/// The attack runner
pub struct Intruder {
    raw_request: String,
    config: IntruderConfig,
    executor: ReplayExecutor,
    events: EventBus,
}

impl Intruder {
    /// Create a runner over a raw request template
    pub fn new(
        raw_request: impl Into<String>,
        config: IntruderConfig,
        executor: ReplayExecutor,
        events: EventBus,
    ) -> Self {
        Self {
            raw_request: raw_request.into(),
            config,
            executor,
            events,
        }
    }

    /// Expand the attack plan into concrete raw requests without sending.
    ///
    /// Returns `(raw_request_text, processed_payload_tuple)` pairs in plan
    /// order.
    pub fn generate_requests(&self) -> Result<Vec<(String, Vec<String>)>> {
        let k = count_positions(&self.raw_request);
        // Validate delimiters even when generation is about to produce 0 tuples
        find_positions(&self.raw_request)?;
        let plan = generate(self.config.attack_type, &self.config.payload_sets, k)?;

        plan.into_iter()
            .map(|tuple| {
                let processed = self.process_tuple(tuple);
                let raw = replace_positions(&self.raw_request, &processed)?;
                Ok((raw, processed))
            })
            .collect()
    }

    /// Run the attack. Rows, progress, and completion are emitted on the
    /// event bus; the returned vector holds one row per tuple, in
    /// submission (plan) order regardless of which requests finish first.
    pub async fn run(&self, mut cancel: watch::Receiver<bool>) -> Result<Vec<AttackResult>> {
        let requests = self.generate_requests()?;
        let total = requests.len();
        let extractor = GrepExtractor::new(&self.config.grep_patterns);

        info!(
            "Intruder: {} attack, {total} requests, {} workers",
            self.config.attack_type, self.config.workers
        );
        self.events.emit(Event::IntruderProgressStart { total });

        let semaphore = Arc::new(Semaphore::new(self.config.workers.max(1)));
        let mut handles = Vec::with_capacity(total);
        for (raw, payloads) in requests {
            let executor = self.executor.clone();
            let extractor = extractor.clone();
            let semaphore = semaphore.clone();
            let mut cancel = cancel.clone();
            handles.push(tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await.expect("semaphore closed");
                if *cancel.borrow() {
                    return AttackResult::failure(payloads, "cancelled".to_string());
                }
                tokio::select! {
                    outcome = executor.send_from_raw(&raw, None, None) => match outcome {
                        Ok(response) => {
                            let extracted = extractor.extract(&response.body_text());
                            AttackResult::from_response(payloads, &response, extracted)
                        }
                        Err(e) => AttackResult::failure(payloads, e.to_string()),
                    },
                    _ = cancel.changed() => {
                        AttackResult::failure(payloads, "cancelled".to_string())
                    }
                }
            }));
        }

        let mut results = Vec::with_capacity(total);
        let mut done = 0usize;
        for handle in handles {
            let row = match handle.await {
                Ok(row) => row,
                Err(e) => {
                    // A panicking worker costs its row, never the run
                    error!("Intruder worker panicked: {e}");
                    AttackResult::failure(Vec::new(), format!("worker panicked: {e}"))
                }
            };
            done += 1;
            self.events.emit(Event::IntruderResult(row.clone()));
            self.events.emit(Event::IntruderProgressUpdate {
                percent: done as f64 * 100.0 / total.max(1) as f64,
            });
            results.push(row);
        }

        if *cancel.borrow_and_update() {
            warn!("Intruder run cancelled after {done}/{total} requests");
        }
        self.events.emit(Event::IntruderProgressDone);
        Ok(results)
    }

    fn process_tuple(&self, tuple: Vec<String>) -> Vec<String> {
        tuple
            .into_iter()
            .enumerate()
            .map(|(slot, payload)| {
                if payload == ORIGINAL_MARKER {
                    return payload;
                }
                match self.config.processors.get(slot) {
                    Some(chain) => apply_chain(chain, &payload),
                    None => payload,
                }
            })
            .collect()
    }
}
