//! PDF transport encoding
//!
//! Files travel to the document store as base64 data URLs, the same form a
//! browser `FileReader.readAsDataURL` produces.

use base64::{engine::general_purpose::STANDARD, Engine as _};

use crate::{Error, Result};

pub const PDF_MIME: &str = "application/pdf";

/// Encode raw bytes as `data:application/pdf;base64,<payload>`
pub fn encode_pdf(bytes: &[u8]) -> String {
    format!("data:{};base64,{}", PDF_MIME, STANDARD.encode(bytes))
}

/// Decode a data URL (or a bare base64 payload) back into bytes
pub fn decode(value: &str) -> Result<Vec<u8>> {
    let payload = match value.strip_prefix("data:") {
        Some(rest) => {
            let (header, payload) = rest
                .split_once(',')
                .ok_or_else(|| Error::Encoding("data URL has no payload separator".to_string()))?;
            if !header.ends_with(";base64") {
                return Err(Error::Encoding(format!(
                    "unsupported data URL encoding: {}",
                    header
                )));
            }
            payload
        }
        None => value,
    };

    STANDARD
        .decode(payload.trim())
        .map_err(|e| Error::Encoding(e.to_string()))
}
