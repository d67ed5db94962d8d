use crate::infra::{
    contracts::{CredentialStore, CredentialStoreError},
    credential_store::FileCredentialStore,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogoutOutcome {
    pub token_removed: bool,
}

/// Drops the persisted session so the next start needs a fresh login.
///
/// Waits for any in-flight login on the same store. The lock file is left in
/// place so every process keeps locking the same file.
pub fn logout_and_reset(store: &FileCredentialStore) -> Result<LogoutOutcome, CredentialStoreError> {
    let _guard = store.lock()?;
    let token_removed = store.clear()?;

    Ok(LogoutOutcome { token_removed })
}
