//! UTF-8 text <-> base64 wire encoding.
//!
//! The contents API carries file bodies as base64 of the UTF-8 byte sequence.
//! Every adapter that touches the wire goes through this pair.

use base64::{engine::general_purpose::STANDARD, Engine};

use crate::error::StorageError;

/// Encodes text as base64 of its UTF-8 bytes.
pub fn encode_content(text: &str) -> String {
    STANDARD.encode(text.as_bytes())
}

/// Decodes a base64 payload into UTF-8 text.
///
/// Line breaks and other ASCII whitespace are ignored; the upstream API wraps
/// encoded content at fixed widths.
pub fn decode_content(encoded: &str) -> Result<String, StorageError> {
    let bytes = decode_bytes(encoded)?;
    String::from_utf8(bytes).map_err(|e| StorageError::Encoding(e.to_string()))
}

/// Decodes a base64 payload into raw bytes.
pub fn decode_bytes(encoded: &str) -> Result<Vec<u8>, StorageError> {
    let compact: String = encoded
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();
    STANDARD
        .decode(compact)
        .map_err(|e| StorageError::Encoding(e.to_string()))
}
