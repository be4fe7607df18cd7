//! Encrypted-at-rest storage of the installation's single license record.
//!
//! On disk the store is a pretty-printed wrapper
//! `{"encrypted": true, "version": 1, "payload": "<ciphertext>"}` whose
//! payload decrypts to the JSON of a [`LicenseRecord`]. Writes go through a
//! temp file in the same directory and an atomic rename, under a lock
//! shared by every clone of the store.
//!
//! Reads with the default passphrase keep the last decrypted record keyed
//! on its ciphertext, so an unchanged file is not re-derived per request.
//! Async callers go through [`LicenseStore::blocking`], which moves the
//! key derivation and file I/O onto the blocking pool.

use crate::config::LicenseClientConfig;
use crate::error::{LicenseError, LicenseResult};
use crate::record::LicenseRecord;
use hearth_crypto::{decrypt_string, encrypt_string, KdfParams};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

/// Current wrapper format version.
pub const STORE_VERSION: u32 = 1;

/// The on-disk envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredWrapper {
    /// Always true for files written by this client.
    #[serde(default)]
    pub encrypted: bool,
    /// Format version.
    #[serde(default)]
    pub version: u32,
    /// Base64 ciphertext of the record JSON.
    #[serde(default)]
    pub payload: String,
}

/// Last record decrypted with the default passphrase.
#[derive(Debug, Clone)]
struct CachedRecord {
    payload: String,
    record: LicenseRecord,
}

/// Handle to the license store file.
#[derive(Clone)]
pub struct LicenseStore {
    path: PathBuf,
    passphrase: Option<String>,
    kdf: KdfParams,
    write_lock: Arc<Mutex<()>>,
    cache: Arc<Mutex<Option<CachedRecord>>>,
}

impl std::fmt::Debug for LicenseStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LicenseStore")
            .field("path", &self.path)
            .field("passphrase", &self.passphrase.as_ref().map(|_| "[REDACTED]"))
            .finish_non_exhaustive()
    }
}

impl LicenseStore {
    /// Opens a store at `path`. `passphrase` is the process-wide default.
    pub fn new(path: impl Into<PathBuf>, passphrase: Option<String>) -> Self {
        Self {
            path: path.into(),
            passphrase,
            kdf: KdfParams::default(),
            write_lock: Arc::new(Mutex::new(())),
            cache: Arc::new(Mutex::new(None)),
        }
    }

    /// Opens the store configured by `config`.
    pub fn from_config(config: &LicenseClientConfig) -> Self {
        Self::new(config.license_path(), config.passphrase.clone())
    }

    /// Overrides key-derivation parameters. Files written with one set of
    /// parameters can only be read back with the same set.
    #[must_use]
    pub fn with_kdf_params(mut self, kdf: KdfParams) -> Self {
        self.kdf = kdf;
        self
    }

    /// Location of the store file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether a store file exists.
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    fn passphrase<'a>(&'a self, explicit: Option<&'a str>) -> LicenseResult<&'a str> {
        explicit
            .filter(|p| !p.is_empty())
            .or(self.passphrase.as_deref().filter(|p| !p.is_empty()))
            .ok_or_else(|| LicenseError::Config("no passphrase configured".to_string()))
    }

    fn lock(&self) -> MutexGuard<'_, ()> {
        // A panic mid-write leaves at worst a stray temp file; the lock
        // itself guards no data.
        self.write_lock.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn cached(&self, payload: &str) -> Option<LicenseRecord> {
        let cache = self.cache.lock().unwrap_or_else(|p| p.into_inner());
        cache
            .as_ref()
            .filter(|c| c.payload == payload)
            .map(|c| c.record.clone())
    }

    fn remember(&self, payload: String, record: &LicenseRecord) {
        let mut cache = self.cache.lock().unwrap_or_else(|p| p.into_inner());
        *cache = Some(CachedRecord {
            payload,
            record: record.clone(),
        });
    }

    /// Runs `op` against this store on the blocking thread pool.
    pub async fn blocking<T, F>(&self, op: F) -> LicenseResult<T>
    where
        F: FnOnce(&LicenseStore) -> LicenseResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let store = self.clone();
        tokio::task::spawn_blocking(move || op(&store))
            .await
            .map_err(|e| LicenseError::Io(std::io::Error::other(e)))?
    }

    fn read_wrapper(&self) -> LicenseResult<Option<StoredWrapper>> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let wrapper: StoredWrapper = serde_json::from_str(&raw)
            .map_err(|e| LicenseError::CorruptStore(format!("wrapper is not valid JSON: {e}")))?;
        if wrapper.payload.trim().is_empty() {
            return Err(LicenseError::CorruptStore("wrapper has no payload".to_string()));
        }
        Ok(Some(wrapper))
    }

    /// Decrypts the stored payload without interpreting it.
    ///
    /// Stricter than [`read`](Self::read): the wrapper must also declare
    /// itself encrypted.
    pub fn read_plaintext(&self, passphrase: Option<&str>) -> LicenseResult<String> {
        let wrapper = self.read_wrapper()?.ok_or(LicenseError::NotInstalled)?;
        if !wrapper.encrypted {
            return Err(LicenseError::CorruptStore(
                "license file is not in the expected encrypted format".to_string(),
            ));
        }
        decrypt_string(self.passphrase(passphrase)?, &wrapper.payload, &self.kdf)
            .map_err(|e| LicenseError::Decryption(e.to_string()))
    }

    /// Reads the record using the default passphrase.
    ///
    /// `Ok(None)` when no file exists; an error with
    /// [`is_corrupt`](LicenseError::is_corrupt) when it cannot be trusted.
    pub fn read(&self) -> LicenseResult<Option<LicenseRecord>> {
        self.read_with(None)
    }

    /// Reads the record with an explicit passphrase.
    pub fn read_with(&self, passphrase: Option<&str>) -> LicenseResult<Option<LicenseRecord>> {
        let Some(wrapper) = self.read_wrapper()? else {
            return Ok(None);
        };
        let default_passphrase = passphrase.is_none();
        if default_passphrase {
            if let Some(record) = self.cached(&wrapper.payload) {
                return Ok(Some(record));
            }
        }

        let plaintext = decrypt_string(self.passphrase(passphrase)?, &wrapper.payload, &self.kdf)
            .map_err(|e| LicenseError::Decryption(e.to_string()))?;
        let record: LicenseRecord = serde_json::from_str(&plaintext)
            .map_err(|e| LicenseError::Decryption(format!("payload is not a license record: {e}")))?;
        if default_passphrase {
            self.remember(wrapper.payload, &record);
        }
        Ok(Some(record))
    }

    /// Encrypts and atomically replaces the store file.
    pub fn write(&self, record: &LicenseRecord, passphrase: Option<&str>) -> LicenseResult<()> {
        let _guard = self.lock();
        self.write_locked(record, passphrase)
    }

    fn write_locked(&self, record: &LicenseRecord, passphrase: Option<&str>) -> LicenseResult<()> {
        let plaintext = serde_json::to_string(record)?;
        let payload = encrypt_string(self.passphrase(passphrase)?, &plaintext, &self.kdf)
            .map_err(|e| LicenseError::Encryption(e.to_string()))?;

        let wrapper = StoredWrapper {
            encrypted: true,
            version: STORE_VERSION,
            payload,
        };
        let mut body = Vec::with_capacity(wrapper.payload.len() + 64);
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut serializer = serde_json::Serializer::with_formatter(&mut body, formatter);
        wrapper.serialize(&mut serializer)?;

        let dir = match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)?;

        let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
        tmp.write_all(&body)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| LicenseError::Io(e.error))?;

        info!(path = %self.path.display(), "License record written");
        Ok(())
    }

    /// Refuses with `Guarded` when the current record decrypts and is valid.
    /// An unreadable record never blocks.
    fn ensure_unlocked(&self) -> LicenseResult<()> {
        match self.read() {
            Ok(Some(existing)) if existing.is_locked() => Err(LicenseError::Guarded),
            Ok(_) => Ok(()),
            Err(e) if e.is_corrupt() => {
                debug!(error = %e, "Existing license unreadable; not guarded");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Installs a record from the local interface. Fails with `Guarded`
    /// and leaves the file untouched while a valid record is installed.
    pub fn install(&self, record: &LicenseRecord) -> LicenseResult<()> {
        let _guard = self.lock();
        self.ensure_unlocked()?;
        self.write_locked(record, None)
    }

    /// Deletes the store file unless it holds a valid record.
    /// A corrupt file is always removable.
    pub fn delete(&self) -> LicenseResult<()> {
        let _guard = self.lock();
        if !self.path.exists() {
            return Err(LicenseError::NotInstalled);
        }
        if let Err(e) = self.ensure_unlocked() {
            if matches!(e, LicenseError::Guarded) {
                warn!(path = %self.path.display(), "Refused to delete a valid license");
            }
            return Err(e);
        }
        fs::remove_file(&self.path)?;
        info!(path = %self.path.display(), "License file deleted");
        Ok(())
    }
}
