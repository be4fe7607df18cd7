//! Passphrase-based authenticated encryption for the Hearth license store.
//!
//! Keys are derived with Argon2id and data is sealed with
//! ChaCha20-Poly1305. Callers only ever see `encrypt_string` /
//! `decrypt_string`; a tampered or foreign blob fails to open rather than
//! decrypting to garbage.

mod cipher;
mod error;
mod key;

pub use cipher::{decrypt_string, encrypt_string, open, seal, SealedData, NONCE_SIZE, TAG_SIZE};
pub use error::{CryptoError, CryptoResult};
pub use key::{derive_key, KdfParams, KEY_SIZE, SALT_SIZE};
