// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

//! Manual intercept gate
//!
//! While intercept is enabled, each flow is handed to the operator one at a
//! time: the proxy task blocks until the operator forwards (optionally with
//! edits) or drops the request, or until the deadline expires. Flows queue
//! behind the held one in arrival order.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::{oneshot, Mutex as AsyncMutex};
use tracing::{info, warn};

use crate::events::{Event, EventBus};
use crate::flow::Headers;

/// Default operator deadline
pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(300);

/// The request view handed to the operator
#[derive(Debug, Clone)]
pub struct InterceptedRequest {
    pub method: String,
    pub url: String,
    pub host: String,
    pub path: String,
    pub headers: Headers,
    pub body: Bytes,
}

/// The operator's verdict on a held request
#[derive(Debug)]
pub enum InterceptDecision {
    /// Continue the pipeline, optionally with edited headers and/or body
    Forward {
        headers: Option<Headers>,
        body: Option<Bytes>,
    },
    /// Abort the flow; nothing is sent upstream or returned to the client
    Drop,
}

impl InterceptDecision {
    /// Forward without edits
    pub fn pass() -> Self {
        InterceptDecision::Forward {
            headers: None,
            body: None,
        }
    }
}

struct HeldRequest {
    view: InterceptedRequest,
    responder: oneshot::Sender<InterceptDecision>,
}

/// Synchronous handoff point between the proxy and the operator
pub struct InterceptGate {
    enabled: AtomicBool,
    /// Serializes flows so at most one request is held at a time
    serial: AsyncMutex<()>,
    held: Mutex<Option<HeldRequest>>,
    deadline: Duration,
    events: EventBus,
}

impl InterceptGate {
    /// Create a gate with the default 300s operator deadline
    pub fn new(events: EventBus) -> Self {
        Self::with_deadline(events, DEFAULT_DEADLINE)
    }

    /// Create a gate with a custom deadline
    pub fn with_deadline(events: EventBus, deadline: Duration) -> Self {
        Self {
            enabled: AtomicBool::new(false),
            serial: AsyncMutex::new(()),
            held: Mutex::new(None),
            deadline,
            events,
        }
    }

    /// Whether manual intercept is on
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// Enable or disable intercept.
    ///
    /// Enabling while a request is held is idempotent. Disabling converts a
    /// held request to a drop and clears the slot.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
        if !enabled {
            if let Some(held) = self.held.lock().take() {
                warn!("Intercept disabled with {} held, dropping", held.view.url);
                let _ = held.responder.send(InterceptDecision::Drop);
            }
        }
        info!("Intercept {}", if enabled { "enabled" } else { "disabled" });
    }

    /// Flip the intercept flag, returning the new state
    pub fn toggle(&self) -> bool {
        let enabled = !self.is_enabled();
        self.set_enabled(enabled);
        enabled
    }

    /// Offer a flow to the operator, blocking until a decision arrives.
    ///
    /// A disabled gate is a straight pass-through. Deadline expiry is
    /// equivalent to a drop.
    pub async fn offer(&self, view: InterceptedRequest) -> InterceptDecision {
        if !self.is_enabled() {
            return InterceptDecision::pass();
        }

        // Queue behind any currently held flow, in arrival order
        let _serial = self.serial.lock().await;
        if !self.is_enabled() {
            return InterceptDecision::pass();
        }

        let (tx, rx) = oneshot::channel();
        let url = view.url.clone();
        let method = view.method.clone();
        *self.held.lock() = Some(HeldRequest {
            view,
            responder: tx,
        });
        self.events.emit(Event::InterceptedRequest {
            method,
            url: url.clone(),
        });

        match tokio::time::timeout(self.deadline, rx).await {
            Ok(Ok(decision)) => decision,
            // Responder dropped without an answer
            Ok(Err(_)) => InterceptDecision::Drop,
            Err(_) => {
                self.held.lock().take();
                warn!("Intercept deadline expired for {url}, dropping");
                self.events.emit(Event::InterceptTimeout { url });
                InterceptDecision::Drop
            }
        }
    }

    /// The currently held request, if any
    pub fn pending(&self) -> Option<InterceptedRequest> {
        self.held.lock().as_ref().map(|h| h.view.clone())
    }

    /// Resolve the held request. Returns false when nothing is held.
    pub fn resolve(&self, decision: InterceptDecision) -> bool {
        match self.held.lock().take() {
            Some(held) => held.responder.send(decision).is_ok(),
            None => false,
        }
    }
}
