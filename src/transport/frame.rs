//! Wire framing helpers.
//!
//! Inbound payloads are trimmed and have embedded newlines turned into
//! spaces, so that newline can separate responses coalesced into one
//! outbound frame.
//!
//! Close frames and read errors are classified as abnormal (logged as
//! warnings) or normal disconnects.

// ============================================================================
// Imports
// ============================================================================

use std::io::ErrorKind;

use tokio_tungstenite::tungstenite::Error as WsError;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::error::ProtocolError;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

// ============================================================================
// Constants
// ============================================================================

/// Separator between coalesced responses.
pub const SEPARATOR: u8 = b'\n';

// ============================================================================
// Inbound
// ============================================================================

/// Trims surrounding whitespace and replaces embedded newlines with spaces.
///
/// Whitespace is Unicode whitespace, including `\x0B` and U+00A0. Trimming
/// stops at the first invalid UTF-8 sequence from either end.
#[must_use]
pub fn normalize(payload: &[u8]) -> Vec<u8> {
    trim_space(payload)
        .iter()
        .map(|&b| if b == SEPARATOR { b' ' } else { b })
        .collect()
}

/// Strips leading and trailing Unicode whitespace.
fn trim_space(payload: &[u8]) -> &[u8] {
    let mut chunks = payload.utf8_chunks();
    let Some(first) = chunks.next() else {
        return payload;
    };
    let start = first.valid().len() - first.valid().trim_start().len();

    let last = chunks.last().unwrap_or(first);
    let end = if last.invalid().is_empty() {
        payload.len() - (last.valid().len() - last.valid().trim_end().len())
    } else {
        payload.len()
    };

    &payload[start..end.max(start)]
}

// ============================================================================
// Outbound
// ============================================================================

/// Joins queued responses with [`SEPARATOR`].
#[must_use]
pub fn coalesce(batch: Vec<Vec<u8>>) -> Vec<u8> {
    let mut batch = batch.into_iter();
    let Some(mut payload) = batch.next() else {
        return Vec::new();
    };
    for next in batch {
        payload.push(SEPARATOR);
        payload.extend_from_slice(&next);
    }
    payload
}

/// Wraps a payload in a text frame, or a binary frame if it is not UTF-8.
#[must_use]
pub fn outbound_message(payload: Vec<u8>) -> Message {
    match String::from_utf8(payload) {
        Ok(text) => Message::text(text),
        Err(e) => Message::binary(e.into_bytes()),
    }
}

// ============================================================================
// Close Classification
// ============================================================================

/// How a connection ended, for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseClass {
    /// Peer went away or the link dropped without a close handshake.
    Abnormal,
    /// Ordinary disconnect.
    Normal,
}

/// Classifies a close frame received from the peer.
#[must_use]
pub fn classify_close(frame: Option<&CloseFrame>) -> CloseClass {
    match frame.map(|f| f.code) {
        Some(CloseCode::Away | CloseCode::Abnormal) => CloseClass::Abnormal,
        _ => CloseClass::Normal,
    }
}

/// Classifies a read error.
#[must_use]
pub fn classify_error(error: &WsError) -> CloseClass {
    match error {
        WsError::Protocol(ProtocolError::ResetWithoutClosingHandshake) => CloseClass::Abnormal,
        WsError::Io(e)
            if matches!(
                e.kind(),
                ErrorKind::ConnectionReset
                    | ErrorKind::ConnectionAborted
                    | ErrorKind::UnexpectedEof
                    | ErrorKind::BrokenPipe
            ) =>
        {
            CloseClass::Abnormal
        }
        _ => CloseClass::Normal,
    }
}

// ============================================================================
// Tests
// ============================================================================
