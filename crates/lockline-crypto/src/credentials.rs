//! Symmetric key material for one session.
//!
//! Credentials are created once per session: the connecting side generates
//! them randomly and ships them to the listener inside the handshake. After
//! creation they are immutable, owned exclusively by the endpoint they were
//! assigned to, and zeroized when that endpoint is dropped.

use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// AES-256 cipher key length in bytes.
pub const CIPHER_KEY_LEN: usize = 32;

/// CBC initialization vector length in bytes (one AES block).
pub const IV_LEN: usize = 16;

/// HMAC-SHA-256 authentication key length in bytes.
pub const AUTH_KEY_LEN: usize = 32;

/// Symmetric key material scoped to one connection.
///
/// An instance with any empty field is *invalid* and means "no encryption in
/// effect" for that session; [`SessionCredentials::is_valid`] is the check
/// every framing decision goes through.
///
/// The JSON form (used as the handshake payload) carries each field as a
/// base64 string.
#[derive(Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct SessionCredentials {
    #[serde(with = "base64_bytes")]
    cipher_key: Vec<u8>,
    #[serde(with = "base64_bytes")]
    iv: Vec<u8>,
    #[serde(with = "base64_bytes")]
    auth_key: Vec<u8>,
}

impl SessionCredentials {
    /// Generate fresh random credentials.
    ///
    /// Cipher key, IV, and authentication key are drawn independently from
    /// the thread-local CSPRNG on every call.
    pub fn generate() -> Self {
        use rand::RngCore;

        let mut rng = rand::thread_rng();
        let mut cipher_key = vec![0u8; CIPHER_KEY_LEN];
        let mut iv = vec![0u8; IV_LEN];
        let mut auth_key = vec![0u8; AUTH_KEY_LEN];
        rng.fill_bytes(&mut cipher_key);
        rng.fill_bytes(&mut iv);
        rng.fill_bytes(&mut auth_key);

        Self {
            cipher_key,
            iv,
            auth_key,
        }
    }

    /// Build credentials from pre-shared key material.
    pub fn from_parts(cipher_key: Vec<u8>, iv: Vec<u8>, auth_key: Vec<u8>) -> Self {
        Self {
            cipher_key,
            iv,
            auth_key,
        }
    }

    /// True iff all three fields are non-empty.
    pub fn is_valid(&self) -> bool {
        !self.cipher_key.is_empty() && !self.iv.is_empty() && !self.auth_key.is_empty()
    }

    pub fn cipher_key(&self) -> &[u8] {
        &self.cipher_key
    }

    pub fn iv(&self) -> &[u8] {
        &self.iv
    }

    pub fn auth_key(&self) -> &[u8] {
        &self.auth_key
    }
}

/// Key material stays out of logs; only the field lengths are rendered.
impl std::fmt::Debug for SessionCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionCredentials")
            .field("cipher_key", &format_args!("[{} bytes]", self.cipher_key.len()))
            .field("iv", &format_args!("[{} bytes]", self.iv.len()))
            .field("auth_key", &format_args!("[{} bytes]", self.auth_key.len()))
            .finish()
    }
}

/// Serde adapter: `Vec<u8>` as a base64 string field.
mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded.as_bytes()).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_credentials_are_valid() {
        let creds = SessionCredentials::generate();
        assert!(creds.is_valid());
        assert_eq!(creds.cipher_key().len(), CIPHER_KEY_LEN);
        assert_eq!(creds.iv().len(), IV_LEN);
        assert_eq!(creds.auth_key().len(), AUTH_KEY_LEN);
    }

    #[test]
    fn test_generation_is_independent_per_call() {
        let a = SessionCredentials::generate();
        let b = SessionCredentials::generate();
        assert_ne!(a.cipher_key(), b.cipher_key());
        assert_ne!(a.iv(), b.iv());
        assert_ne!(a.auth_key(), b.auth_key());
    }

    #[test]
    fn test_empty_fields_are_invalid() {
        let missing_key = SessionCredentials::from_parts(vec![], vec![1; IV_LEN], vec![2; AUTH_KEY_LEN]);
        assert!(!missing_key.is_valid());

        let missing_iv = SessionCredentials::from_parts(vec![1; CIPHER_KEY_LEN], vec![], vec![2; AUTH_KEY_LEN]);
        assert!(!missing_iv.is_valid());

        let missing_auth = SessionCredentials::from_parts(vec![1; CIPHER_KEY_LEN], vec![2; IV_LEN], vec![]);
        assert!(!missing_auth.is_valid());
    }

    #[test]
    fn test_debug_output_redacts_key_material() {
        let creds = SessionCredentials::generate();
        let rendered = format!("{creds:?}");

        assert!(rendered.contains("[32 bytes]"));
        assert!(rendered.contains("[16 bytes]"));
        assert!(!rendered.contains(&format!("{:?}", creds.cipher_key())));
        assert!(!rendered.contains(&format!("{:?}", creds.auth_key())));
    }

    #[test]
    fn test_json_round_trip_uses_base64_fields() {
        let creds = SessionCredentials::generate();
        let json = serde_json::to_string(&creds).unwrap();

        // Wire form is base64 strings, not byte arrays.
        assert!(!json.contains('['));

        let decoded: SessionCredentials = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded.cipher_key(), creds.cipher_key());
        assert_eq!(decoded.iv(), creds.iv());
        assert_eq!(decoded.auth_key(), creds.auth_key());
    }
}
