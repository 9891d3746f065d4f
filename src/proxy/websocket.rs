// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

//! Passive WebSocket observation
//!
//! After a successful upgrade the proxy relays raw bytes between client and
//! server; this module decodes RFC 6455 frames out of each direction and
//! appends them to a per-flow session log. Frames are never modified or
//! injected.

use bytes::{Buf, BytesMut};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::codec::transforms::hex_encode_bytes;

/// WebSocket opcodes we care about
pub mod opcode {
    pub const CONTINUATION: u8 = 0x0;
    pub const TEXT: u8 = 0x1;
    pub const BINARY: u8 = 0x2;
    pub const CLOSE: u8 = 0x8;
    pub const PING: u8 = 0x9;
    pub const PONG: u8 = 0xA;
}

/// Session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WsStatus {
    Active,
    Closed,
}

/// One observed WebSocket session, keyed by its flow id
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WsSession {
    pub id: u64,
    pub url: String,
    pub host: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub status: WsStatus,
    pub message_count: usize,
}

/// One observed frame
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WsMessage {
    pub timestamp: DateTime<Utc>,
    pub from_client: bool,
    pub size: usize,
    pub is_binary: bool,
    /// Decoded text, or lowercase hex for binary payloads
    pub content: String,
}

/// Session and message store
#[derive(Debug, Default)]
pub struct WebSocketLog {
    sessions: DashMap<u64, WsSession>,
    messages: DashMap<u64, Vec<WsMessage>>,
}

impl WebSocketLog {
    /// Create an empty log
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session for an upgraded flow
    pub fn start_session(&self, id: u64, url: impl Into<String>, host: impl Into<String>) {
        self.sessions.insert(
            id,
            WsSession {
                id,
                url: url.into(),
                host: host.into(),
                start_time: Utc::now(),
                end_time: None,
                status: WsStatus::Active,
                message_count: 0,
            },
        );
        self.messages.insert(id, Vec::new());
    }

    /// Append one frame payload to a session.
    ///
    /// A payload that is not valid UTF-8 is recorded as binary with hex
    /// content; text is recorded with replacement on decode errors.
    pub fn record_frame(&self, id: u64, from_client: bool, payload: &[u8]) {
        let Some(mut messages) = self.messages.get_mut(&id) else {
            return;
        };

        let (content, is_binary) = match std::str::from_utf8(payload) {
            Ok(text) => (text.to_string(), false),
            Err(_) => (hex_encode_bytes(payload), true),
        };
        messages.push(WsMessage {
            timestamp: Utc::now(),
            from_client,
            size: payload.len(),
            is_binary,
            content,
        });
        drop(messages);

        if let Some(mut session) = self.sessions.get_mut(&id) {
            session.message_count += 1;
        }
    }

    /// Mark a session closed
    pub fn close_session(&self, id: u64) {
        if let Some(mut session) = self.sessions.get_mut(&id) {
            session.end_time = Some(Utc::now());
            session.status = WsStatus::Closed;
        }
    }

    /// All sessions, most recent last
    pub fn sessions(&self) -> Vec<WsSession> {
        let mut sessions: Vec<WsSession> = self.sessions.iter().map(|e| e.value().clone()).collect();
        sessions.sort_by_key(|s| s.id);
        sessions
    }

    /// Messages of one session in arrival order
    pub fn messages(&self, id: u64) -> Vec<WsMessage> {
        self.messages
            .get(&id)
            .map(|m| m.clone())
            .unwrap_or_default()
    }

    /// Session by flow id
    pub fn session(&self, id: u64) -> Option<WsSession> {
        self.sessions.get(&id).map(|s| s.clone())
    }

    /// Drop every session and message
    pub fn clear(&self) {
        self.sessions.clear();
        self.messages.clear();
    }
}

/// One decoded WebSocket frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedFrame {
    pub fin: bool,
    pub opcode: u8,
    pub payload: Vec<u8>,
}

impl DecodedFrame {
    /// Data frames carry observable payloads; control frames do not
    pub fn is_data(&self) -> bool {
        matches!(
            self.opcode,
            opcode::CONTINUATION | opcode::TEXT | opcode::BINARY
        )
    }

    /// Whether this frame closes the connection
    pub fn is_close(&self) -> bool {
        self.opcode == opcode::CLOSE
    }
}

/// Incremental RFC 6455 frame decoder for one stream direction.
///
/// Bytes are fed as they are relayed; complete frames come out, unmasked.
/// Malformed framing stops the decoder rather than guessing.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: BytesMut,
    poisoned: bool,
}

impl FrameDecoder {
    /// Create a decoder
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed relayed bytes, returning every frame completed by them
    pub fn feed(&mut self, data: &[u8]) -> Vec<DecodedFrame> {
        if self.poisoned {
            return Vec::new();
        }
        self.buf.extend_from_slice(data);

        let mut frames = Vec::new();
        while let Some(frame) = self.try_decode() {
            frames.push(frame);
        }
        frames
    }

    fn try_decode(&mut self) -> Option<DecodedFrame> {
        if self.buf.len() < 2 {
            return None;
        }

        let b0 = self.buf[0];
        let b1 = self.buf[1];
        let fin = b0 & 0x80 != 0;
        let opcode = b0 & 0x0F;
        let masked = b1 & 0x80 != 0;
        let len7 = (b1 & 0x7F) as u64;

        let mut offset = 2usize;
        let payload_len = match len7 {
            126 => {
                if self.buf.len() < offset + 2 {
                    return None;
                }
                let len = u16::from_be_bytes([self.buf[offset], self.buf[offset + 1]]) as u64;
                offset += 2;
                len
            }
            127 => {
                if self.buf.len() < offset + 8 {
                    return None;
                }
                let mut bytes = [0u8; 8];
                bytes.copy_from_slice(&self.buf[offset..offset + 8]);
                offset += 8;
                u64::from_be_bytes(bytes)
            }
            n => n,
        };

        // Refuse absurd frames instead of buffering forever
        if payload_len > 64 * 1024 * 1024 {
            debug!("WebSocket frame of {payload_len} bytes, stopping observer");
            self.poisoned = true;
            return None;
        }
        let payload_len = payload_len as usize;

        let mask_key = if masked {
            if self.buf.len() < offset + 4 {
                return None;
            }
            let key = [
                self.buf[offset],
                self.buf[offset + 1],
                self.buf[offset + 2],
                self.buf[offset + 3],
            ];
            offset += 4;
            Some(key)
        } else {
            None
        };

        if self.buf.len() < offset + payload_len {
            return None;
        }

        self.buf.advance(offset);
        let mut payload = self.buf.split_to(payload_len).to_vec();
        if let Some(key) = mask_key {
            for (i, byte) in payload.iter_mut().enumerate() {
                *byte ^= key[i % 4];
            }
        }

        Some(DecodedFrame {
            fin,
            opcode,
            payload,
        })
    }
}
