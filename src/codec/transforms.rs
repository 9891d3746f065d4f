// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

//! Encode/decode helpers shared by the intruder processors and UI tooling

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

use crate::error::{Error, Result};

/// Percent-encode everything except unreserved characters and `/`
const URL_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'_')
    .remove(b'.')
    .remove(b'-')
    .remove(b'~')
    .remove(b'/');

/// Base64-encode a string
pub fn b64_encode(input: &str) -> String {
    BASE64.encode(input.as_bytes())
}

/// Decode a Base64 string to UTF-8
pub fn b64_decode(input: &str) -> Result<String> {
    let bytes = BASE64
        .decode(input.trim())
        .map_err(|e| Error::other(format!("invalid base64: {e}")))?;
    String::from_utf8(bytes).map_err(|e| Error::other(format!("decoded bytes are not UTF-8: {e}")))
}

/// Percent-encode a string for use in a URL
pub fn url_encode(input: &str) -> String {
    utf8_percent_encode(input, URL_ENCODE_SET).to_string()
}

/// Decode percent-escapes, replacing invalid UTF-8
pub fn url_decode(input: &str) -> String {
    percent_decode_str(input).decode_utf8_lossy().into_owned()
}

/// Escape HTML metacharacters
pub fn html_encode(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}

/// Lowercase hex encoding of the UTF-8 bytes
pub fn hex_encode(input: &str) -> String {
    input.bytes().map(|b| format!("{b:02x}")).collect()
}

/// Lowercase hex encoding of arbitrary bytes
pub fn hex_encode_bytes(input: &[u8]) -> String {
    input.iter().map(|b| format!("{b:02x}")).collect()
}
