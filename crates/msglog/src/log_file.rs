//! Log file entry encoding
//!
//! One text line per captured message: the message id as four hex digits,
//! a space, then the header block as uppercase hex.
//!
//! ```text
//! 0801 0801C0000011000000000000000000
//! ```

use crate::{HeaderBlock, MsgId, HEADER_LEN};
use std::fmt::Write;

/// Copy the leading bytes of a message payload into a header block.
/// Short payloads are zero padded, long ones truncated.
pub fn capture_header(payload: &[u8]) -> HeaderBlock {
    let mut hdr = [0u8; HEADER_LEN];
    let len = payload.len().min(HEADER_LEN);
    hdr[..len].copy_from_slice(&payload[..len]);
    hdr
}

/// Uppercase hex text for a byte slice
pub fn to_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        // Writing to a String cannot fail
        let _ = write!(out, "{b:02X}");
    }
    out
}

fn from_hex(text: &str) -> Option<HeaderBlock> {
    if text.len() != HEADER_LEN * 2 || !text.is_ascii() {
        return None;
    }

    let mut hdr = [0u8; HEADER_LEN];
    for (i, byte) in hdr.iter_mut().enumerate() {
        *byte = u8::from_str_radix(&text[i * 2..i * 2 + 2], 16).ok()?;
    }
    Some(hdr)
}

/// Encode one entry, including the trailing newline
pub fn encode_entry(msg_id: MsgId, hdr: &HeaderBlock) -> String {
    format!("{msg_id:04X} {}\n", to_hex(hdr))
}

/// Parse one entry line. Surrounding whitespace is ignored.
pub fn parse_entry(line: &str) -> Option<(MsgId, HeaderBlock)> {
    let mut parts = line.split_whitespace();
    let id = parts.next()?;
    let hdr = parts.next()?;
    if parts.next().is_some() || id.len() != 4 {
        return None;
    }

    let msg_id = MsgId::from_str_radix(id, 16).ok()?;
    Some((msg_id, from_hex(hdr)?))
}
