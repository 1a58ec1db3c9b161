//! RSA exchange keypair for the credential handshake.
//!
//! One keypair is generated per listener activation (not per connection) and
//! shared read-only by every handshake that listener performs. The public
//! half travels as a JSON object frame ([`PublicKeyParams`]); the connecting
//! side uses it to seal its freshly generated session credentials.

use base64::{engine::general_purpose::STANDARD, Engine};
use rsa::traits::PublicKeyParts;
use rsa::{BigUint, RsaPrivateKey, RsaPublicKey};
use serde::{Deserialize, Serialize};

use crate::engine::CryptoError;

/// Default RSA modulus size in bits.
pub const DEFAULT_EXCHANGE_KEY_BITS: usize = 4096;

/// Asymmetric keypair owned by a listener for its lifetime.
#[derive(Debug)]
pub struct ExchangeKeyPair {
    private: RsaPrivateKey,
    public: RsaPublicKey,
}

impl ExchangeKeyPair {
    /// Generate a fresh keypair.
    ///
    /// Generation at the default 4096 bits takes a noticeable amount of CPU
    /// time; callers on an async runtime should run this off the reactor
    /// threads.
    pub fn generate(bits: usize) -> Result<Self, CryptoError> {
        let mut rng = rand::thread_rng();
        let private = RsaPrivateKey::new(&mut rng, bits)
            .map_err(|e| CryptoError::KeyGeneration(e.to_string()))?;
        let public = RsaPublicKey::from(&private);
        Ok(Self { private, public })
    }

    pub fn private_key(&self) -> &RsaPrivateKey {
        &self.private
    }

    pub fn public_key(&self) -> &RsaPublicKey {
        &self.public
    }

    /// Wire form of the public half.
    pub fn public_params(&self) -> PublicKeyParams {
        PublicKeyParams::from(&self.public)
    }
}

/// JSON wire form of an RSA public key: modulus and exponent as base64
/// big-endian byte strings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicKeyParams {
    pub modulus: String,
    pub exponent: String,
}

impl From<&RsaPublicKey> for PublicKeyParams {
    fn from(key: &RsaPublicKey) -> Self {
        Self {
            modulus: STANDARD.encode(key.n().to_bytes_be()),
            exponent: STANDARD.encode(key.e().to_bytes_be()),
        }
    }
}

impl TryFrom<&PublicKeyParams> for RsaPublicKey {
    type Error = CryptoError;

    fn try_from(params: &PublicKeyParams) -> Result<Self, Self::Error> {
        let n = BigUint::from_bytes_be(&STANDARD.decode(params.modulus.as_bytes())?);
        let e = BigUint::from_bytes_be(&STANDARD.decode(params.exponent.as_bytes())?);
        RsaPublicKey::new(n, e).map_err(|e| CryptoError::InvalidKeyMaterial(e.to_string()))
    }
}
