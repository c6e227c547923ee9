//! AES-256-CBC encryption envelope shared with the processing service.
//!
//! Key derivation: UTF-8(password) truncated or zero-padded to 32 bytes
//! Encryption:     AES-256-CBC with PKCS#7 padding, random IV prepended
//!
//! Envelope layout: [ iv (16 B) | ciphertext (N B, N % 16 == 0, N > 0) ]
//!
//! The service derives the same key from the `X-Password` header, so the
//! derivation must stay byte-for-byte identical on both sides.  There is no
//! authentication tag: a wrong password or a corrupted ciphertext is only
//! detected through the padding check in [`decrypt`].

use aes::cipher::block_padding::Pkcs7;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use thiserror::Error;
use tracing::debug;

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// Byte length of the IV at the front of every envelope.
pub const IV_LEN: usize = 16;
/// AES block size.
pub const BLOCK_LEN: usize = 16;
/// Derived key length (AES-256).
pub const KEY_LEN: usize = 32;
/// Smallest well-formed envelope: IV plus one ciphertext block.
pub const MIN_ENVELOPE_LEN: usize = IV_LEN + BLOCK_LEN;

#[derive(Error, Debug)]
pub enum EnvelopeError {
    #[error("Malformed envelope: {len} bytes (need at least {MIN_ENVELOPE_LEN} with block-aligned ciphertext)")]
    Malformed { len: usize },
    #[error("Encryption failed: {0}")]
    Encryption(String),
    #[error("Decryption failed: wrong password or corrupted data")]
    Decryption,
    #[error("Invalid PKCS#7 padding: wrong password or corrupted data")]
    InvalidPadding,
}

/// A validated `iv || ciphertext` buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    bytes: Vec<u8>,
}

impl Envelope {
    /// Wrap raw wire bytes, checking the length invariants.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, EnvelopeError> {
        check_shape(bytes.len())?;
        Ok(Self { bytes })
    }

    pub fn iv(&self) -> &[u8] { &self.bytes[..IV_LEN] }

    pub fn ciphertext(&self) -> &[u8] { &self.bytes[IV_LEN..] }

    pub fn as_bytes(&self) -> &[u8] { &self.bytes }

    pub fn into_bytes(self) -> Vec<u8> { self.bytes }

    pub fn len(&self) -> usize { self.bytes.len() }

    /// Always false: a valid envelope holds at least one block.
    pub fn is_empty(&self) -> bool { self.bytes.is_empty() }

    /// Decrypt this envelope.  Equivalent to [`decrypt`] on the raw bytes.
    pub fn open(&self, password: &str) -> Result<Vec<u8>, EnvelopeError> {
        decrypt(&self.bytes, password)
    }
}

impl AsRef<[u8]> for Envelope {
    fn as_ref(&self) -> &[u8] { &self.bytes }
}

/// Derive the fixed-length key from the shared password.
///
/// Passwords longer than 32 bytes are truncated; shorter ones are padded with
/// zero bytes.  No stretching is applied.
pub fn derive_key(password: &str) -> [u8; KEY_LEN] {
    let mut key = [0u8; KEY_LEN];
    let src = password.as_bytes();
    let n = src.len().min(KEY_LEN);
    key[..n].copy_from_slice(&src[..n]);
    key
}

/// Encrypt `plaintext` with a fresh random IV.
///
/// Returns `iv (16 B) || AES-256-CBC(PKCS#7(plaintext))`.
pub fn encrypt(plaintext: &[u8], password: &str) -> Result<Envelope, EnvelopeError> {
    let key = derive_key(password);
    let mut iv = [0u8; IV_LEN];
    getrandom::getrandom(&mut iv).map_err(|e| EnvelopeError::Encryption(e.to_string()))?;

    let ciphertext = Aes256CbcEnc::new_from_slices(&key, &iv)
        .map_err(|e| EnvelopeError::Encryption(e.to_string()))?
        .encrypt_padded_vec_mut::<Pkcs7>(plaintext);

    let mut out = Vec::with_capacity(IV_LEN + ciphertext.len());
    out.extend_from_slice(&iv);
    out.extend_from_slice(&ciphertext);
    debug!(plaintext = plaintext.len(), envelope = out.len(), "sealed envelope");
    Ok(Envelope { bytes: out })
}

/// Decrypt an envelope produced by [`encrypt`] (or by the service).
///
/// The PKCS#7 padding is always validated and stripped.
pub fn decrypt(envelope: &[u8], password: &str) -> Result<Vec<u8>, EnvelopeError> {
    check_shape(envelope.len())?;
    let (iv, ciphertext) = envelope.split_at(IV_LEN);
    let key = derive_key(password);

    let plaintext = Aes256CbcDec::new_from_slices(&key, iv)
        .map_err(|_| EnvelopeError::Decryption)?
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|_| EnvelopeError::InvalidPadding)?;
    debug!(envelope = envelope.len(), plaintext = plaintext.len(), "opened envelope");
    Ok(plaintext)
}

fn check_shape(len: usize) -> Result<(), EnvelopeError> {
    if len < MIN_ENVELOPE_LEN || (len - IV_LEN) % BLOCK_LEN != 0 {
        return Err(EnvelopeError::Malformed { len });
    }
    Ok(())
}
