// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

//! # Remora - Intercepting HTTP/HTTPS Proxy
//!
//! An interactive man-in-the-middle proxy for authorized security testing.
//! Remora sits between a client and arbitrary upstream servers, records a
//! searchable history of every flow, rewrites request parameters by rule,
//! pauses requests for manual editing, replays requests with payload
//! substitution, probes responses for common vulnerabilities, and spiders
//! discovered hosts.
//!
//! ## Features
//!
//! - **TLS interception**: per-host certificates minted on the fly, signed
//!   by a locally generated root CA
//! - **Rewrite rules**: host/path-scoped query and form parameter rewriting
//! - **Manual intercept**: hold a request, edit headers/body, forward or drop
//! - **Cookie Jar**: force a chosen session identity onto replayed traffic
//! - **Intruder**: Sniper / Battering Ram / Pitchfork / Cluster Bomb attack
//!   plans with payload processors and grep extraction
//! - **Scanning**: passive signature checks on every response, active probes
//!   over query and form insertion points
//! - **Spider**: scoped crawler that enumerates URLs and forms
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use remora::{ConfigStore, ProxyEngine};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Arc::new(ConfigStore::load("intercept_config.json"));
//!     config.add_rule("example.com", "/search", "q", "hacked")?;
//!
//!     let engine = ProxyEngine::new(config)?;
//!     let mut events = engine.events().subscribe();
//!
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("{}", event.envelope());
//!         }
//!     });
//!
//!     engine.run().await?;
//!     Ok(())
//! }
//! ```

pub mod codec;
pub mod config;
pub mod cookies;
pub mod error;
pub mod events;
pub mod flow;
pub mod intruder;
pub mod proxy;
pub mod replay;
pub mod scan;
pub mod spider;

// Re-exports for convenience
pub use codec::RawRequest;
pub use config::{ConfigStore, Rule};
pub use cookies::CookieManager;
pub use error::{Error, Result};
pub use events::{Event, EventBus};
pub use flow::{Flow, FlowRequest, FlowResponse, Headers, History};
pub use intruder::{AttackType, Intruder, IntruderConfig};
pub use proxy::{InterceptDecision, InterceptGate, ProxyEngine};
pub use replay::ReplayExecutor;
pub use scan::{ActiveScanner, Finding, PassiveScanner, Severity};
pub use spider::Spider;
