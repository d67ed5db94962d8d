use std::{
    fs::{self, File, OpenOptions},
    io::{self, ErrorKind, Write},
    path::{Path, PathBuf},
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};

use crate::{
    domain::session::SessionToken,
    infra::{
        contracts::{CredentialStore, CredentialStoreError, StoreLockGuard},
        credential_watcher::CredentialWatcher,
    },
};

const ENVELOPE_FORMAT: u32 = 1;
const CREDENTIAL_CORRUPT: &str = "STORE_CREDENTIAL_CORRUPT";

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Serialize, Deserialize)]
struct TokenEnvelope {
    format: u32,
    saved_at: DateTime<Utc>,
    blob: String,
}

/// Token persisted as a small JSON envelope at a fixed path.
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[cfg_attr(not(test), allow(dead_code))]
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn lock_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_default();
        name.push(".lock");
        self.path.with_file_name(name)
    }

    /// Removes the persisted token. Returns whether a file was removed.
    pub fn clear(&self) -> Result<bool, CredentialStoreError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(true),
            Err(source) if source.kind() == ErrorKind::NotFound => Ok(false),
            Err(source) => Err(self.io_error("remove", source)),
        }
    }

    fn io_error(&self, op: &'static str, source: io::Error) -> CredentialStoreError {
        CredentialStoreError::Io {
            op,
            location: self.location(),
            source,
        }
    }

    fn ensure_parent(&self) -> Result<(), CredentialStoreError> {
        match self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            Some(parent) => {
                fs::create_dir_all(parent).map_err(|source| self.io_error("create dir for", source))
            }
            None => Ok(()),
        }
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_default();
        name.push(format!(
            ".tmp-{}-{}",
            std::process::id(),
            TEMP_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));
        self.path.with_file_name(name)
    }

    fn write_temp(&self, tmp_path: &Path, payload: &[u8]) -> io::Result<()> {
        let mut file = File::create(tmp_path)?;
        file.write_all(payload)?;
        file.sync_all()
    }
}

impl CredentialStore for FileCredentialStore {
    fn location(&self) -> String {
        self.path.display().to_string()
    }

    fn load(&self) -> Result<Option<SessionToken>, CredentialStoreError> {
        let raw = match fs::read(&self.path) {
            Ok(raw) => raw,
            Err(source) if source.kind() == ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(self.io_error("read", source)),
        };

        match decode_envelope(&raw) {
            Ok(token) => Ok(Some(token)),
            Err(reason) => {
                tracing::warn!(
                    code = CREDENTIAL_CORRUPT,
                    location = %self.location(),
                    reason,
                    "persisted credential is unreadable; treating as absent"
                );
                Ok(None)
            }
        }
    }

    fn save(&self, token: &SessionToken) -> Result<(), CredentialStoreError> {
        self.ensure_parent()?;

        let envelope = TokenEnvelope {
            format: ENVELOPE_FORMAT,
            saved_at: Utc::now(),
            blob: STANDARD.encode(token.as_bytes()),
        };
        let payload =
            serde_json::to_vec_pretty(&envelope).map_err(|source| CredentialStoreError::Encode {
                location: self.location(),
                source,
            })?;

        let tmp_path = self.temp_path();
        if let Err(source) = self.write_temp(&tmp_path, &payload) {
            let _ = fs::remove_file(&tmp_path);
            return Err(self.io_error("write", source));
        }

        if let Err(source) = fs::rename(&tmp_path, &self.path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(self.io_error("replace", source));
        }

        tracing::debug!(
            location = %self.location(),
            bytes = token.len(),
            "credential persisted"
        );
        Ok(())
    }

    fn lock(&self) -> Result<StoreLockGuard, CredentialStoreError> {
        self.ensure_parent()?;

        let lock_path = self.lock_path();
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)
            .map_err(|source| self.io_error("open lock for", source))?;

        file.lock_exclusive()
            .map_err(|source| self.io_error("lock", source))?;

        Ok(StoreLockGuard::new(FileLock(file)))
    }

    fn watch(
        &self,
        interval: Duration,
        live: &SessionToken,
    ) -> Result<Option<CredentialWatcher>, CredentialStoreError> {
        let store = self.clone();
        let watcher = CredentialWatcher::start(interval, Some(live.clone()), move || store.load())
            .map_err(|source| self.io_error("start watcher for", source))?;

        Ok(Some(watcher))
    }
}

struct FileLock(File);

impl Drop for FileLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.0);
    }
}

fn decode_envelope(raw: &[u8]) -> Result<SessionToken, &'static str> {
    let envelope: TokenEnvelope = serde_json::from_slice(raw).map_err(|_| "malformed json")?;
    if envelope.format != ENVELOPE_FORMAT {
        return Err("unsupported format");
    }

    let bytes = STANDARD
        .decode(envelope.blob.as_bytes())
        .map_err(|_| "malformed blob")?;
    if bytes.is_empty() {
        return Err("empty blob");
    }

    Ok(SessionToken::new(bytes))
}
