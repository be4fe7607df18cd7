//! Passphrase encryption using ChaCha20-Poly1305.
//!
//! Text form: `base64(salt || nonce || ciphertext+tag)`. A fresh salt and
//! nonce are drawn for every encryption, so encrypting the same plaintext
//! twice never yields the same text.

use crate::error::{CryptoError, CryptoResult};
use crate::key::{derive_key, random_salt, KdfParams, KEY_SIZE, SALT_SIZE};
use base64::{engine::general_purpose::STANDARD, Engine};
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Nonce,
};
use rand::RngCore;

/// Size of nonce in bytes (96 bits for ChaCha20-Poly1305).
pub const NONCE_SIZE: usize = 12;

/// Size of authentication tag in bytes.
pub const TAG_SIZE: usize = 16;

/// A sealed blob with everything except the passphrase needed to open it.
#[derive(Clone, Debug)]
pub struct SealedData {
    /// Salt used to derive the key from the passphrase.
    pub salt: [u8; SALT_SIZE],
    /// The nonce used for encryption (unique per encryption).
    pub nonce: [u8; NONCE_SIZE],
    /// The encrypted ciphertext (includes auth tag).
    pub ciphertext: Vec<u8>,
}

impl SealedData {
    /// Encodes to base64 for storage.
    pub fn to_base64(&self) -> String {
        let mut bytes = Vec::with_capacity(SALT_SIZE + NONCE_SIZE + self.ciphertext.len());
        bytes.extend_from_slice(&self.salt);
        bytes.extend_from_slice(&self.nonce);
        bytes.extend_from_slice(&self.ciphertext);
        STANDARD.encode(&bytes)
    }

    /// Decodes from base64.
    pub fn from_base64(encoded: &str) -> CryptoResult<Self> {
        let bytes = STANDARD
            .decode(encoded.trim())
            .map_err(|e| CryptoError::Decryption(format!("invalid base64: {e}")))?;

        if bytes.len() < SALT_SIZE + NONCE_SIZE + TAG_SIZE {
            return Err(CryptoError::Decryption("data too short".to_string()));
        }

        let mut salt = [0u8; SALT_SIZE];
        salt.copy_from_slice(&bytes[..SALT_SIZE]);
        let mut nonce = [0u8; NONCE_SIZE];
        nonce.copy_from_slice(&bytes[SALT_SIZE..SALT_SIZE + NONCE_SIZE]);
        let ciphertext = bytes[SALT_SIZE + NONCE_SIZE..].to_vec();

        Ok(Self {
            salt,
            nonce,
            ciphertext,
        })
    }
}

fn seal_with_key(
    key: &[u8; KEY_SIZE],
    salt: [u8; SALT_SIZE],
    plaintext: &[u8],
) -> CryptoResult<SealedData> {
    let cipher = ChaCha20Poly1305::new(key.into());

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|e| CryptoError::Encryption(e.to_string()))?;

    Ok(SealedData {
        salt,
        nonce: nonce_bytes,
        ciphertext,
    })
}

/// Encrypts `plaintext` under a key derived from `passphrase`.
pub fn seal(passphrase: &str, plaintext: &[u8], params: &KdfParams) -> CryptoResult<SealedData> {
    let salt = random_salt();
    let key = derive_key(passphrase, &salt, params)?;
    seal_with_key(&key, salt, plaintext)
}

/// Decrypts a sealed blob. Fails on a wrong passphrase or any tampering.
pub fn open(passphrase: &str, sealed: &SealedData, params: &KdfParams) -> CryptoResult<Vec<u8>> {
    let key = derive_key(passphrase, &sealed.salt, params)?;
    let cipher = ChaCha20Poly1305::new((&*key).into());
    let nonce = Nonce::from_slice(&sealed.nonce);

    cipher
        .decrypt(nonce, sealed.ciphertext.as_ref())
        .map_err(|_| {
            CryptoError::Decryption("decryption failed (wrong passphrase or tampered data)".to_string())
        })
}

/// Encrypts a string and returns the base64 text form.
pub fn encrypt_string(passphrase: &str, plaintext: &str, params: &KdfParams) -> CryptoResult<String> {
    Ok(seal(passphrase, plaintext.as_bytes(), params)?.to_base64())
}

/// Decrypts a base64 text form produced by [`encrypt_string`].
pub fn decrypt_string(passphrase: &str, encoded: &str, params: &KdfParams) -> CryptoResult<String> {
    let sealed = SealedData::from_base64(encoded)?;
    let plaintext = open(passphrase, &sealed, params)?;
    String::from_utf8(plaintext).map_err(|e| CryptoError::Decryption(format!("invalid UTF-8: {e}")))
}
