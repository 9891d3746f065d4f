// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

//! Proxy engine and its pipeline stages
//!
//! The engine terminates client connections (with MITM TLS for `CONNECT`
//! tunnels), and runs each flow through the intercept gate, the rewrite
//! rules, and the Cookie Jar overlay before forwarding upstream. WebSocket
//! upgrades are relayed with passive frame observation.

mod ca;
mod engine;
mod intercept;
mod rewrite;
mod websocket;

pub use ca::CertificateAuthority;
pub use engine::ProxyEngine;
pub use intercept::{InterceptDecision, InterceptGate, InterceptedRequest, DEFAULT_DEADLINE};
pub use rewrite::apply_rules;
pub use websocket::{
    DecodedFrame, FrameDecoder, WebSocketLog, WsMessage, WsSession, WsStatus,
};
