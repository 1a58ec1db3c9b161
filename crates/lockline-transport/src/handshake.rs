//! Credential handshake.
//!
//! The listener sends its RSA public parameters as an object frame; the
//! connector generates fresh session credentials, seals their JSON under
//! that public key, and sends the result as a raw frame; the listener
//! answers with a freshly assigned session id, also raw. Only then do both
//! sides install the credentials, so no handshake frame is ever
//! symmetrically encrypted.
//!
//! ```text
//! Connector                               Listener
//!     |                                       |
//!     |  <- {modulus, exponent}               |  object frame
//!     |<--------------------------------------|
//!     |                                       |
//!     |  -> base64(rsa(credentials json))     |  raw frame
//!     |-------------------------------------->|
//!     |                                       |
//!     |  <- session uuid                      |  raw frame
//!     |<--------------------------------------|
//!     |                                       |
//!     [   both sides install credentials      ]
//! ```

use std::sync::Arc;

use lockline_crypto::{engine, ExchangeKeyPair, PublicKeyParams, SessionCredentials};
use rsa::RsaPublicKey;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::debug;
use uuid::Uuid;

use crate::endpoint::Endpoint;
use crate::error::TransportError;

/// Listener-side handshake logic, run once per newly accepted connection
/// when secure mode is requested.
///
/// The keypair is generated once per listener activation and shared
/// read-only by every coordinator call for that listener's lifetime.
#[derive(Debug, Clone)]
pub struct HandshakeCoordinator {
    keys: Arc<ExchangeKeyPair>,
}

impl HandshakeCoordinator {
    pub fn new(keys: Arc<ExchangeKeyPair>) -> Self {
        Self { keys }
    }

    /// Perform the listener side of the handshake.
    ///
    /// On success the endpoint holds the peer's credentials and a fresh
    /// session id, and is `Open`. On failure the caller is expected to
    /// close the endpoint; nothing is installed.
    pub async fn accept<S>(&self, endpoint: &mut Endpoint<S>) -> Result<Uuid, TransportError>
    where
        S: AsyncRead + AsyncWrite,
    {
        endpoint.write_object(&self.keys.public_params()).await?;

        let sealed = endpoint.read_frame().await?;
        let payload = engine::asymmetric_decrypt(&sealed, self.keys.private_key())?;
        let credentials: SessionCredentials = serde_json::from_str(&payload)
            .map_err(|e| TransportError::Deserialization(e.to_string()))?;
        if !credentials.is_valid() {
            return Err(TransportError::InvalidCredentials);
        }

        let session_id = Uuid::new_v4();
        endpoint.write_frame(&session_id.to_string()).await?;

        endpoint.install_session(session_id, credentials);
        endpoint.mark_open();
        debug!(endpoint = endpoint.id(), %session_id, "handshake accepted");
        Ok(session_id)
    }
}

/// Perform the connecting side of the handshake.
///
/// Generates the session credentials, ships them under the listener's
/// public key, and installs them together with the returned session id.
pub async fn initiate<S>(endpoint: &mut Endpoint<S>) -> Result<Uuid, TransportError>
where
    S: AsyncRead + AsyncWrite,
{
    let params: PublicKeyParams = endpoint.read_object().await?;
    let public = RsaPublicKey::try_from(&params)?;

    let credentials = SessionCredentials::generate();
    let payload = serde_json::to_string(&credentials)
        .map_err(|e| TransportError::Deserialization(e.to_string()))?;
    let sealed = engine::asymmetric_encrypt(&payload, &public)?;
    endpoint.write_frame(&sealed).await?;

    let line = endpoint.read_frame().await?;
    let session_id = Uuid::parse_str(line.trim())
        .map_err(|e| TransportError::Deserialization(e.to_string()))?;

    endpoint.install_session(session_id, credentials);
    endpoint.mark_open();
    debug!(endpoint = endpoint.id(), %session_id, "handshake complete");
    Ok(session_id)
}
