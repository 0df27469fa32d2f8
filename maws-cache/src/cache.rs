//! The cache handle used by the login flow.
//!
//! Every operation first re-verifies that the configuration root and the
//! cache directory are private to the current user. If either check fails,
//! or caching has been disabled for the process, reads are misses and
//! writes are skipped. Storage, permission, staleness and validation
//! problems are logged and never returned to the caller, since every cached
//! artifact can be re-acquired by logging in again.
//!
//! The one exception is [`CredentialCache::write_shared_credentials`]: the
//! shared credentials file is the tool's output rather than a cache, so a
//! failure to write it, including a refusal because caching is disabled or
//! the root is untrusted, is reported.

use chrono::{DateTime, Utc};
use jsonwebtoken::jwk::JwkSet;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error};

use crate::config::CacheConfig;
use crate::credentials_file::{CredentialsFile, CredentialsFileError, CREDENTIALS_FILE_NAME};
use crate::expiry::ExpiryPolicy;
use crate::keys::{self, EntryKind};
use crate::oidc::{IdToken, TokenValidator, VerifiedIdToken};
use crate::storage::{verify_or_repair, FileStorage, Requirement, SecureStorage, StorageError};
use crate::types::{RoleMap, StsCredentials};

static CACHING_DISABLED: AtomicBool = AtomicBool::new(false);

/// Turn every cache read into a miss and every cache write into a no-op for
/// the rest of the process. Cannot be undone.
///
/// This includes the shared credentials file: reads return an empty set and
/// writes fail with [`CredentialsFileError::CachingDisabled`].
pub fn disable_caching() {
    if !CACHING_DISABLED.swap(true, Ordering::SeqCst) {
        debug!("Caching disabled for the remainder of the process");
    }
}

/// Whether [`disable_caching`] has been called
pub fn caching_disabled() -> bool {
    CACHING_DISABLED.load(Ordering::SeqCst)
}

type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// A file found in the cache directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntrySummary {
    pub kind: EntryKind,
    pub file_name: String,
    pub modified: DateTime<Utc>,
}

pub struct CredentialCache {
    root: PathBuf,
    entries: FileStorage,
    profiles: FileStorage,
    policy: ExpiryPolicy,
    clock: Clock,
}

impl CredentialCache {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            root: config.root.clone(),
            entries: FileStorage::new(config.cache_dir()),
            profiles: FileStorage::new(config.root.clone()),
            policy: config.expiry_policy(),
            clock: Arc::new(Utc::now),
        }
    }

    /// Replace the time source used for expiry decisions
    pub fn with_clock<F>(mut self, clock: F) -> Self
    where
        F: Fn() -> DateTime<Utc> + Send + Sync + 'static,
    {
        self.clock = Arc::new(clock);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn cache_dir(&self) -> &Path {
        self.entries.base_dir()
    }

    pub fn credentials_path(&self) -> PathBuf {
        self.profiles.key_path(CREDENTIALS_FILE_NAME)
    }

    pub fn policy(&self) -> &ExpiryPolicy {
        &self.policy
    }

    /// Verify (creating if absent) the root and cache directory.
    ///
    /// Checked on every call rather than once, so a permission change during
    /// the run takes effect immediately.
    pub fn is_trusted(&self) -> bool {
        verify_or_repair(&self.root, Requirement::PrivateDir)
            && verify_or_repair(self.cache_dir(), Requirement::PrivateDir)
    }

    fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    fn guard(&self, operation: &str) -> bool {
        if caching_disabled() {
            debug!(operation, "Caching is disabled");
            return false;
        }
        if !self.is_trusted() {
            debug!(
                operation,
                cache_dir = %self.cache_dir().display(),
                "Cache directory has invalid permissions"
            );
            return false;
        }
        true
    }

    fn load<T: DeserializeOwned>(&self, kind: EntryKind, key: &str) -> Option<T> {
        let path = self.entries.key_path(key);

        let bytes = match self.entries.retrieve(key) {
            Ok(bytes) => bytes,
            Err(StorageError::NotFound(_)) => return None,
            Err(e) => {
                debug!(%kind, path = %path.display(), error = %e, "Unable to read cache entry");
                return None;
            }
        };

        match serde_json::from_slice(&bytes) {
            Ok(value) => Some(value),
            Err(e) => {
                debug!(%kind, path = %path.display(), error = %e, "Unable to parse cache entry");
                None
            }
        }
    }

    fn save<T: Serialize>(&self, kind: EntryKind, key: &str, value: &T) -> bool {
        let path = self.entries.key_path(key);

        let mut bytes = match serde_json::to_vec_pretty(value) {
            Ok(bytes) => bytes,
            Err(e) => {
                debug!(%kind, error = %e, "Unable to serialize cache entry");
                return false;
            }
        };
        bytes.push(b'\n');

        match self.entries.store(key, &bytes) {
            Ok(()) => {
                debug!(%kind, path = %path.display(), "Successfully wrote cache entry");
                true
            }
            Err(e) => {
                debug!(%kind, path = %path.display(), error = %e, "Unable to write cache entry");
                false
            }
        }
    }

    pub fn read_role_map(&self, endpoint_url: &str) -> Option<RoleMap> {
        if !self.guard("read_role_map") {
            return None;
        }

        let key = keys::role_map_file_name(endpoint_url);

        let modified = match self.entries.modified(&key) {
            Ok(modified) => modified,
            Err(StorageError::NotFound(_)) => return None,
            Err(e) => {
                debug!(key = %key, error = %e, "Unable to stat role map");
                return None;
            }
        };

        if !self.policy.role_map_is_fresh(modified, self.now()) {
            debug!(endpoint_url, "Cached role map has expired");
            return None;
        }

        let role_map = self.load(EntryKind::RoleMap, &key)?;
        debug!(endpoint_url, key = %key, "Using cached role map");
        Some(role_map)
    }

    pub fn write_role_map(&self, endpoint_url: &str, role_map: &RoleMap) -> bool {
        if !self.guard("write_role_map") {
            return false;
        }

        let key = keys::role_map_file_name(endpoint_url);
        self.save(EntryKind::RoleMap, &key, role_map)
    }

    /// Read a cached ID token, re-verifying its signature against
    /// `key_material` and its audience against `client_id` on every call.
    pub fn read_id_token(
        &self,
        issuer: &str,
        client_id: &str,
        key_material: &JwkSet,
    ) -> Option<VerifiedIdToken> {
        if issuer.is_empty() || client_id.is_empty() {
            return None;
        }
        if !self.guard("read_id_token") {
            return None;
        }

        let key = keys::id_token_file_name(issuer, client_id);
        let token: IdToken = self.load(EntryKind::IdToken, &key)?;

        let claims = match TokenValidator::new(client_id, key_material).validate(&token.id_token) {
            Ok(claims) => claims,
            Err(e) => {
                debug!(issuer, client_id, error = %e, "Cached id token failed validation");
                return None;
            }
        };

        if !self.policy.id_token_is_fresh(claims.exp, self.now()) {
            debug!(issuer, client_id, exp = claims.exp, "Cached id token has expired");
            return None;
        }

        debug!(issuer, client_id, key = %key, "Successfully read cached id token");
        Some(VerifiedIdToken { token, claims })
    }

    pub fn write_id_token(&self, issuer: &str, client_id: &str, token: &IdToken) -> bool {
        if issuer.is_empty() || client_id.is_empty() {
            return false;
        }
        if !self.guard("write_id_token") {
            return false;
        }

        let key = keys::id_token_file_name(issuer, client_id);
        self.save(EntryKind::IdToken, &key, token)
    }

    pub fn read_sts_credentials(&self, role_arn: &str) -> Option<StsCredentials> {
        if !self.guard("read_sts_credentials") {
            return None;
        }

        let key = keys::sts_credentials_file_name(role_arn);
        let credentials: StsCredentials = self.load(EntryKind::StsCredentials, &key)?;

        let now = self.now();
        if !self.policy.sts_credentials_are_fresh(&credentials, now) {
            debug!(role_arn, expiration = %credentials.expiration, "Cached STS credentials have expired");
            return None;
        }

        debug!(
            role_arn,
            key = %key,
            expires_in = (credentials.expiration - now).num_seconds(),
            "Using cached STS credentials"
        );
        Some(credentials)
    }

    pub fn write_sts_credentials(&self, role_arn: &str, credentials: &StsCredentials) -> bool {
        if !self.guard("write_sts_credentials") {
            return false;
        }

        let key = keys::sts_credentials_file_name(role_arn);
        self.save(EntryKind::StsCredentials, &key, credentials)
    }

    /// Current shared credentials, or an empty set if the file is missing,
    /// unreadable or exposed to other users, the root is not trusted, or
    /// caching is disabled.
    pub fn read_shared_credentials(&self) -> CredentialsFile {
        if caching_disabled() {
            debug!("Caching is disabled, ignoring AWS shared credentials");
            return CredentialsFile::new();
        }
        if !self.is_trusted() {
            debug!(root = %self.root.display(), "Configuration directory has invalid permissions");
            return CredentialsFile::new();
        }

        let path = self.credentials_path();
        debug!(path = %path.display(), "Trying to read credentials file");

        let bytes = match self.profiles.retrieve(CREDENTIALS_FILE_NAME) {
            Ok(bytes) => bytes,
            Err(StorageError::NotFound(_)) => return CredentialsFile::new(),
            Err(e) => {
                debug!(path = %path.display(), error = %e, "Unable to read credentials file");
                return CredentialsFile::new();
            }
        };

        let parsed = String::from_utf8(bytes)
            .map_err(|e| e.to_string())
            .and_then(|contents| CredentialsFile::parse(&contents).map_err(|e| e.to_string()));

        match parsed {
            Ok(file) => file,
            Err(e) => {
                debug!(path = %path.display(), error = %e, "Unable to parse credentials file");
                CredentialsFile::new()
            }
        }
    }

    /// Merge `new_sections` into the shared credentials file and write it
    /// back in section-name order. Either the whole merged file is written
    /// or the previous file is left as it was.
    ///
    /// Names or values that would add lines or sections to the file are
    /// rejected before anything is read or written.
    pub fn write_shared_credentials(
        &self,
        new_sections: &CredentialsFile,
    ) -> Result<PathBuf, CredentialsFileError> {
        let path = self.credentials_path();

        if caching_disabled() {
            error!(path = %path.display(), "Unable to write AWS shared credentials: caching is disabled");
            return Err(CredentialsFileError::CachingDisabled);
        }

        if let Err(e) = new_sections.validate() {
            error!(path = %path.display(), error = %e, "Refusing to write AWS shared credentials");
            return Err(e);
        }

        let mut merged = self.read_shared_credentials();
        merged.merge(new_sections);

        // Re-checked right before the write
        if !self.is_trusted() {
            error!(path = %path.display(), "Unable to write AWS shared credentials: configuration directory has invalid permissions");
            return Err(CredentialsFileError::UnsafeRoot);
        }

        if let Err(e) = self
            .profiles
            .store(CREDENTIALS_FILE_NAME, merged.to_string().as_bytes())
        {
            error!(path = %path.display(), error = %e, "Unable to write AWS shared credentials");
            return Err(e.into());
        }

        debug!(path = %path.display(), sections = merged.len(), "Successfully wrote AWS shared credentials");
        Ok(path)
    }

    /// Files currently in the cache directory, in name order
    pub fn entries(&self) -> Result<Vec<EntrySummary>, StorageError> {
        let mut summaries = Vec::new();

        for file_name in self.entries.keys()? {
            let Some(kind) = EntryKind::from_file_name(&file_name) else {
                continue;
            };
            let modified = self.entries.modified(&file_name)?;
            summaries.push(EntrySummary {
                kind,
                file_name,
                modified,
            });
        }

        Ok(summaries)
    }
}
