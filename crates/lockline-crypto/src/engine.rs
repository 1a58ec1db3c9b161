//! Stateless frame crypto: AES-256-CBC encryption and HMAC-SHA-256 signing,
//! plus the RSA operations used by the handshake.
//!
//! All functions here are pure given their inputs. Cipher and MAC contexts
//! are allocated per call from the supplied credentials, never shared, so
//! concurrent sessions cannot observe each other's state.

use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use base64::{engine::general_purpose::STANDARD, Engine};
use hmac::{Hmac, Mac};
use rsa::{Pkcs1v15Encrypt, RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;
use thiserror::Error;

use crate::credentials::SessionCredentials;

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;
type HmacSha256 = Hmac<Sha256>;

/// Errors from cryptographic operations.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Key or IV has the wrong length for the cipher.
    #[error("invalid key material: {0}")]
    InvalidKeyMaterial(String),

    /// Ciphertext did not decrypt or unpad correctly.
    #[error("malformed ciphertext: {0}")]
    MalformedCiphertext(String),

    /// RSA encrypt/decrypt failure (padding or length mismatch).
    #[error("asymmetric operation failed: {0}")]
    Asymmetric(String),

    /// Input was not valid base64.
    #[error("invalid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    /// Decrypted bytes were not valid UTF-8.
    #[error("decrypted payload is not valid UTF-8")]
    NotUtf8,

    /// Keypair generation failed.
    #[error("key generation failed: {0}")]
    KeyGeneration(String),
}

/// Symmetric-encrypt `plaintext` under the session's cipher key and IV.
///
/// Output is base64. Deterministic given identical key/IV/plaintext; there
/// is no internal randomness beyond the supplied IV.
pub fn encrypt(plaintext: &str, creds: &SessionCredentials) -> Result<String, CryptoError> {
    let cipher = Aes256CbcEnc::new_from_slices(creds.cipher_key(), creds.iv())
        .map_err(|e| CryptoError::InvalidKeyMaterial(e.to_string()))?;
    let ciphertext = cipher.encrypt_padded_vec_mut::<Pkcs7>(plaintext.as_bytes());
    Ok(STANDARD.encode(ciphertext))
}

/// Inverse of [`encrypt`].
pub fn decrypt(ciphertext: &str, creds: &SessionCredentials) -> Result<String, CryptoError> {
    let raw = STANDARD.decode(ciphertext.as_bytes())?;
    let cipher = Aes256CbcDec::new_from_slices(creds.cipher_key(), creds.iv())
        .map_err(|e| CryptoError::InvalidKeyMaterial(e.to_string()))?;
    let plaintext = cipher
        .decrypt_padded_vec_mut::<Pkcs7>(&raw)
        .map_err(|e| CryptoError::MalformedCiphertext(e.to_string()))?;
    String::from_utf8(plaintext).map_err(|_| CryptoError::NotUtf8)
}

/// HMAC-SHA-256 of `message` under the session's authentication key, base64.
pub fn sign(message: &str, creds: &SessionCredentials) -> Result<String, CryptoError> {
    let mut mac = HmacSha256::new_from_slice(creds.auth_key())
        .map_err(|e| CryptoError::InvalidKeyMaterial(e.to_string()))?;
    mac.update(message.as_bytes());
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

/// Recompute the signature and compare in constant time.
///
/// Returns false on any mismatch or malformed input; never errors.
pub fn verify_signature(message: &str, signature: &str, creds: &SessionCredentials) -> bool {
    let Ok(expected) = STANDARD.decode(signature.as_bytes()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(creds.auth_key()) else {
        return false;
    };
    mac.update(message.as_bytes());
    mac.verify_slice(&expected).is_ok()
}

/// RSA-encrypt `plaintext` (PKCS#1 v1.5 padding), base64 output.
pub fn asymmetric_encrypt(plaintext: &str, public: &RsaPublicKey) -> Result<String, CryptoError> {
    let mut rng = rand::thread_rng();
    let ciphertext = public
        .encrypt(&mut rng, Pkcs1v15Encrypt, plaintext.as_bytes())
        .map_err(|e| CryptoError::Asymmetric(e.to_string()))?;
    Ok(STANDARD.encode(ciphertext))
}

/// Inverse of [`asymmetric_encrypt`].
pub fn asymmetric_decrypt(ciphertext: &str, private: &RsaPrivateKey) -> Result<String, CryptoError> {
    let raw = STANDARD.decode(ciphertext.as_bytes())?;
    let plaintext = private
        .decrypt(Pkcs1v15Encrypt, &raw)
        .map_err(|e| CryptoError::Asymmetric(e.to_string()))?;
    String::from_utf8(plaintext).map_err(|_| CryptoError::NotUtf8)
}
