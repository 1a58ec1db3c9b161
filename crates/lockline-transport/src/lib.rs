//! Lockline secure session transport.
//!
//! This crate ties the crypto primitives to a connection lifecycle:
//! - [`Endpoint`]: one side's live view of a connection (stream + optional
//!   credentials + session id) with framed read/write
//! - [`HandshakeCoordinator`] / [`handshake::initiate`]: the asymmetric
//!   exchange that transports session credentials from connector to listener
//! - [`SessionRegistry`]: the listener's collection of live endpoints
//! - [`SessionListener`]: per-connection handshake + registration driver
//! - [`SessionEvents`]: connect/disconnect notifications as broadcast
//!   messages rather than virtual dispatch
//!
//! # Wire format
//!
//! One frame per newline-terminated unit:
//!
//! ```text
//! plaintext frame:  hello\n
//! encrypted frame:  base64(aes-cbc)|base64(hmac-sha256)\n
//! ```
//!
//! Handshake object frames are single-line JSON; session identifiers travel
//! in canonical UUID string form.

#![forbid(unsafe_code)]

pub mod endpoint;
pub mod error;
pub mod events;
pub mod handshake;
pub mod listener;
pub mod registry;

pub use endpoint::{Endpoint, EndpointId, EndpointState, FRAME_SEPARATOR};
pub use error::TransportError;
pub use events::{SessionEvent, SessionEvents};
pub use handshake::HandshakeCoordinator;
pub use listener::SessionListener;
pub use registry::SessionRegistry;
