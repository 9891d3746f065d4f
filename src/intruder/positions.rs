// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

//! Payload position parsing
//!
//! Positions are marked inline in a raw request by wrapping the value in
//! `§` delimiters: `GET /api?user=§admin§`. The section sign is two bytes
//! in UTF-8, so offsets are byte offsets into the raw text.

use crate::error::{Error, Result};

/// Position delimiter
pub const DELIMITER: char = '§';

/// Tuple slot meaning "leave this position's original value in place"
pub const ORIGINAL_MARKER: &str = "§ORIGINAL§";

/// One payload position in a raw request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadPosition {
    /// Byte offset of the opening delimiter
    pub start: usize,
    /// Byte offset just past the closing delimiter
    pub end: usize,
    /// The original value between the delimiters
    pub value: String,
}

/// Find every `§…§` position in a raw request.
///
/// An odd number of delimiters is a parse error.
pub fn find_positions(raw: &str) -> Result<Vec<PayloadPosition>> {
    let marks: Vec<usize> = raw.match_indices(DELIMITER).map(|(i, _)| i).collect();
    if marks.len() % 2 != 0 {
        return Err(Error::Attack(format!(
            "unbalanced payload delimiters: found {} '{DELIMITER}' marks",
            marks.len()
        )));
    }

    let delim_len = DELIMITER.len_utf8();
    let positions = marks
        .chunks_exact(2)
        .map(|pair| {
            let (open, close) = (pair[0], pair[1]);
            PayloadPosition {
                start: open,
                end: close + delim_len,
                value: raw[open + delim_len..close].to_string(),
            }
        })
        .collect();
    Ok(positions)
}

/// Count the payload positions in a raw request
pub fn count_positions(raw: &str) -> usize {
    raw.matches(DELIMITER).count() / 2
}

/// Substitute one value per position, removing the delimiters.
///
/// A value equal to [`ORIGINAL_MARKER`] resolves to the position's parsed
/// original value. `values` must have one entry per position.
pub fn replace_positions(raw: &str, values: &[String]) -> Result<String> {
    let positions = find_positions(raw)?;
    if positions.len() != values.len() {
        return Err(Error::Attack(format!(
            "expected {} payload values, got {}",
            positions.len(),
            values.len()
        )));
    }

    let mut out = String::with_capacity(raw.len());
    let mut cursor = 0;
    for (position, value) in positions.iter().zip(values) {
        out.push_str(&raw[cursor..position.start]);
        if value == ORIGINAL_MARKER {
            out.push_str(&position.value);
        } else {
            out.push_str(value);
        }
        cursor = position.end;
    }
    out.push_str(&raw[cursor..]);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_positions() {
        let raw = "GET /path?param1=§value1§&param2=§value2§ HTTP/1.1";
        let positions = find_positions(raw).unwrap();
        assert_eq!(positions.len(), 2);
        assert_eq!(positions[0].value, "value1");
        assert_eq!(positions[1].value, "value2");
        assert_eq!(count_positions(raw), 2);
    }

    #[test]
    fn test_odd_delimiters_rejected() {
        assert!(find_positions("GET /?a=§b HTTP/1.1").is_err());
    }

    #[test]
    fn test_no_positions() {
        let positions = find_positions("GET / HTTP/1.1").unwrap();
        assert!(positions.is_empty());
    }

    #[test]
    fn test_replace_positions() {
        let raw = "GET /path?a=§x§&b=§y§ HTTP/1.1";
        let replaced =
            replace_positions(raw, &["NEW1".to_string(), "NEW2".to_string()]).unwrap();
        assert_eq!(replaced, "GET /path?a=NEW1&b=NEW2 HTTP/1.1");
        assert!(!replaced.contains(DELIMITER));
    }

    #[test]
    fn test_original_marker_resolved() {
        let raw = "GET /path?a=§x§&b=§y§ HTTP/1.1";
        let replaced =
            replace_positions(raw, &["payload".to_string(), ORIGINAL_MARKER.to_string()])
                .unwrap();
        assert_eq!(replaced, "GET /path?a=payload&b=y HTTP/1.1");
    }

    #[test]
    fn test_value_count_mismatch() {
        let raw = "GET /?a=§x§ HTTP/1.1";
        assert!(replace_positions(raw, &[]).is_err());
    }
}
