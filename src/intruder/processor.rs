// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

//! Payload processors
//!
//! Each payload position can carry an ordered chain of transformations
//! applied to the payload before substitution.

use md5::Md5;
use sha1::Sha1;
use sha2::{Digest, Sha256};

use crate::codec::transforms;
use crate::error::{Error, Result};

/// One payload transformation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Processor {
    /// Prepend a fixed string
    Prefix(String),
    /// Append a fixed string
    Suffix(String),
    /// Percent-encode for URLs
    UrlEncode,
    /// Escape HTML metacharacters
    HtmlEncode,
    /// Lowercase hex of the UTF-8 bytes
    HexEncode,
    /// Base64 encode
    Base64,
    /// MD5 digest, hex
    Md5,
    /// SHA-1 digest, hex
    Sha1,
    /// SHA-256 digest, hex
    Sha256,
}

impl Processor {
    /// Build a processor from its wire name and optional value
    pub fn parse(name: &str, value: Option<&str>) -> Result<Self> {
        match name.trim().to_lowercase().as_str() {
            "prefix" => Ok(Processor::Prefix(value.unwrap_or_default().to_string())),
            "suffix" => Ok(Processor::Suffix(value.unwrap_or_default().to_string())),
            "url_encode" => Ok(Processor::UrlEncode),
            "html_encode" => Ok(Processor::HtmlEncode),
            "hex_encode" => Ok(Processor::HexEncode),
            "base64" => Ok(Processor::Base64),
            "md5" => Ok(Processor::Md5),
            "sha1" => Ok(Processor::Sha1),
            "sha256" => Ok(Processor::Sha256),
            other => Err(Error::Attack(format!("unknown processor: {other}"))),
        }
    }

    /// Apply the transformation
    pub fn apply(&self, input: &str) -> String {
        match self {
            Processor::Prefix(prefix) => format!("{prefix}{input}"),
            Processor::Suffix(suffix) => format!("{input}{suffix}"),
            Processor::UrlEncode => transforms::url_encode(input),
            Processor::HtmlEncode => transforms::html_encode(input),
            Processor::HexEncode => transforms::hex_encode(input),
            Processor::Base64 => transforms::b64_encode(input),
            Processor::Md5 => {
                let digest = Md5::digest(input.as_bytes());
                transforms::hex_encode_bytes(&digest)
            }
            Processor::Sha1 => {
                let digest = Sha1::digest(input.as_bytes());
                transforms::hex_encode_bytes(&digest)
            }
            Processor::Sha256 => {
                let digest = Sha256::digest(input.as_bytes());
                transforms::hex_encode_bytes(&digest)
            }
        }
    }
}

/// Apply a processor chain left to right; an empty chain is identity
pub fn apply_chain(chain: &[Processor], input: &str) -> String {
    chain
        .iter()
        .fold(input.to_string(), |acc, p| p.apply(&acc))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_suffix() {
        assert_eq!(Processor::Prefix("test_".into()).apply("value"), "test_value");
        assert_eq!(Processor::Suffix("_test".into()).apply("value"), "value_test");
    }

    #[test]
    fn test_encoders() {
        assert_eq!(Processor::UrlEncode.apply("test value"), "test%20value");
        assert_eq!(Processor::Base64.apply("test"), "dGVzdA==");
        assert_eq!(Processor::HexEncode.apply("test"), "74657374");
        assert!(Processor::HtmlEncode
            .apply("<script>alert(1)</script>")
            .contains("&lt;script&gt;"));
    }

    #[test]
    fn test_digests() {
        assert_eq!(
            Processor::Md5.apply("test"),
            "098f6bcd4621d373cade4e832627b4f6"
        );
        assert_eq!(
            Processor::Sha1.apply("test"),
            "a94a8fe5ccb19ba61c4c0873d391e987982fbbd3"
        );
        assert_eq!(Processor::Sha256.apply("test").len(), 64);
    }

    #[test]
    fn test_chain_order() {
        let chain = vec![
            Processor::Prefix("pre_".into()),
            Processor::Suffix("_suf".into()),
            Processor::UrlEncode,
        ];
        assert_eq!(apply_chain(&chain, "test"), "pre_test_suf");

        let chain = vec![Processor::Base64, Processor::Prefix("b64:".into())];
        assert_eq!(apply_chain(&chain, "test"), "b64:dGVzdA==");
    }

    #[test]
    fn test_empty_chain_is_identity() {
        assert_eq!(apply_chain(&[], "unchanged"), "unchanged");
    }

    #[test]
    fn test_parse() {
        assert_eq!(
            Processor::parse("prefix", Some("AUTH_")).unwrap(),
            Processor::Prefix("AUTH_".into())
        );
        assert_eq!(Processor::parse("md5", None).unwrap(), Processor::Md5);
        assert!(Processor::parse("rot13", None).is_err());
    }
}
