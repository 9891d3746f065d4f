// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

//! Event bus
//!
//! Single-producer-multi-consumer delivery of UI-facing events. Consumers
//! subscribe for a broadcast receiver; emission never blocks and is silently
//! dropped when nobody is listening.

use serde_json::json;
use tokio::sync::broadcast;

use crate::intruder::AttackResult;
use crate::scan::Finding;
use crate::spider::SpiderStats;

/// Default buffered capacity per subscriber
const CHANNEL_CAPACITY: usize = 1024;

/// A UI-facing event
#[derive(Debug, Clone)]
pub enum Event {
    /// A flow was committed to history
    NewHistoryEntry {
        id: u64,
        method: String,
        url: String,
        status: u16,
    },
    /// A request is held in the intercept gate awaiting the operator
    InterceptedRequest { method: String, url: String },
    /// A held request hit the operator deadline and was dropped
    InterceptTimeout { url: String },
    /// A WebSocket upgrade completed
    WsSessionStarted { id: u64, url: String },
    /// A WebSocket frame was observed
    WsFrame {
        session_id: u64,
        from_client: bool,
        size: usize,
    },
    /// A WebSocket session ended
    WsSessionClosed { id: u64 },
    /// Periodic spider progress counters
    SpiderStats(SpiderStats),
    /// An intruder run started; total tuple count
    IntruderProgressStart { total: usize },
    /// Intruder progress in percent
    IntruderProgressUpdate { percent: f64 },
    /// One intruder result row
    IntruderResult(AttackResult),
    /// The intruder run finished or was cancelled
    IntruderProgressDone,
    /// A scanner produced a finding
    ScanFinding(Finding),
    /// The proxy started or stopped
    ProxyStateChanged { running: bool },
    /// A non-fatal proxy error
    ProxyError { message: String },
}

impl Event {
    /// Wire name of the event type
    pub fn kind(&self) -> &'static str {
        match self {
            Event::NewHistoryEntry { .. } => "new_history_entry",
            Event::InterceptedRequest { .. } => "intercepted_request",
            Event::InterceptTimeout { .. } => "intercept_timeout",
            Event::WsSessionStarted { .. } => "ws_session_started",
            Event::WsFrame { .. } => "ws_frame",
            Event::WsSessionClosed { .. } => "ws_session_closed",
            Event::SpiderStats(_) => "spider_stats",
            Event::IntruderProgressStart { .. } => "intruder_progress_start",
            Event::IntruderProgressUpdate { .. } => "intruder_progress_update",
            Event::IntruderResult(_) => "intruder_result",
            Event::IntruderProgressDone => "intruder_progress_done",
            Event::ScanFinding(_) => "scan_finding",
            Event::ProxyStateChanged { .. } => "proxy_state_changed",
            Event::ProxyError { .. } => "proxy_error",
        }
    }

    /// Serialize to the `{type, data}` message envelope
    pub fn envelope(&self) -> serde_json::Value {
        let data = match self {
            Event::NewHistoryEntry {
                id,
                method,
                url,
                status,
            } => json!({"id": id, "method": method, "url": url, "status": status}),
            Event::InterceptedRequest { method, url } => json!({"method": method, "url": url}),
            Event::InterceptTimeout { url } => json!({"url": url}),
            Event::WsSessionStarted { id, url } => json!({"id": id, "url": url}),
            Event::WsFrame {
                session_id,
                from_client,
                size,
            } => json!({"session_id": session_id, "from_client": from_client, "size": size}),
            Event::WsSessionClosed { id } => json!({"id": id}),
            Event::SpiderStats(stats) => serde_json::to_value(stats).unwrap_or_default(),
            Event::IntruderProgressStart { total } => json!({"total": total}),
            Event::IntruderProgressUpdate { percent } => json!({"value": percent}),
            Event::IntruderResult(result) => serde_json::to_value(result).unwrap_or_default(),
            Event::IntruderProgressDone => json!({}),
            Event::ScanFinding(finding) => serde_json::to_value(finding).unwrap_or_default(),
            Event::ProxyStateChanged { running } => json!({"running": running}),
            Event::ProxyError { message } => json!({"message": message}),
        };
        json!({"type": self.kind(), "data": data})
    }
}

/// Broadcast bus for [`Event`]s
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Event>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    /// Create a bus with the default capacity
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    /// Subscribe for events emitted after this call
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }

    /// Emit an event; a bus with no subscribers swallows it
    pub fn emit(&self, event: Event) {
        let _ = self.sender.send(event);
    }

    /// Number of live subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::assert_ok;

    #[tokio::test]
    async fn test_emit_and_receive() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();

        bus.emit(Event::ProxyStateChanged { running: true });
        match assert_ok!(rx.recv().await) {
            Event::ProxyStateChanged { running } => assert!(running),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_emit_without_subscribers_is_noop() {
        let bus = EventBus::new();
        bus.emit(Event::IntruderProgressDone);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_envelope_shape() {
        let event = Event::NewHistoryEntry {
            id: 3,
            method: "GET".into(),
            url: "http://example.com/".into(),
            status: 200,
        };
        let envelope = event.envelope();
        assert_eq!(envelope["type"], "new_history_entry");
        assert_eq!(envelope["data"]["id"], 3);
        assert_eq!(envelope["data"]["status"], 200);
    }
}
