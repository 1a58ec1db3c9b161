//! Transport error taxonomy.

use lockline_crypto::CryptoError;
use thiserror::Error;

/// Errors surfaced by frame operations, handshakes, and the listener.
///
/// None of these are retried internally; retry/backoff is the caller's
/// responsibility. A signature mismatch or decrypt failure is never mapped
/// to an empty message.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Peer closed, or local close observed during a frame operation.
    /// A disconnect notification fires (once) before this reaches the caller.
    #[error("endpoint closed")]
    EndpointClosed,

    /// MAC mismatch on an encrypted frame. Fatal to that read.
    #[error("frame signature verification failed")]
    SignatureInvalid,

    /// Handshake produced empty or missing key material.
    #[error("handshake produced invalid session credentials")]
    InvalidCredentials,

    /// Structured-object decode (or encode) failure.
    #[error("deserialization failed: {0}")]
    Deserialization(String),

    /// Outgoing plaintext payload contains framing characters.
    #[error("payload contains framing characters (newline or separator)")]
    UnframeablePayload,

    /// Malformed ciphertext, padding failure, or key-material problem.
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    /// Underlying stream I/O failure that is not an observed close.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Runtime-level failure (task join, etc.).
    #[error("internal error: {0}")]
    Internal(String),
}
