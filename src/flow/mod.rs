// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

//! Flow records and history
//!
//! A flow is the paired request/response artifact for one HTTP transaction
//! through the proxy. Flows carry an ordered, case-insensitive header
//! multimap and are committed to a bounded history ring.

mod headers;
mod history;
mod record;

pub use headers::Headers;
pub use history::{History, DEFAULT_CAPACITY};
pub use record::{Flow, FlowRequest, FlowResponse};
