//! Cryptographic primitives for Lockline.
//!
//! This crate provides:
//! - Per-session symmetric key material ([`SessionCredentials`])
//! - A stateless engine for frame encryption and authentication ([`engine`])
//! - The RSA exchange keypair used to transport credentials ([`ExchangeKeyPair`])
//!
//! # Design
//!
//! Every engine operation is fully parameterized by the credentials passed
//! in and allocates any transient cipher context locally. Nothing here holds
//! mutable state across calls, so concurrent sessions can never race on or
//! corrupt each other's key material.
//!
//! Frames are encrypt-then-MAC: integrity is checked before the (potentially
//! expensive, potentially exploitable-if-malformed) decrypt path runs.

#![forbid(unsafe_code)]

pub mod credentials;
pub mod engine;
pub mod exchange;

pub use credentials::SessionCredentials;
pub use engine::CryptoError;
pub use exchange::{ExchangeKeyPair, PublicKeyParams, DEFAULT_EXCHANGE_KEY_BITS};
