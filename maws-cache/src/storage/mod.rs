//! On-disk storage for cache artifacts
//!
//! This module provides:
//! - Ownership and mode checks for the cache root and its files
//! - Atomic, owner-only file writes keyed by cache file name

pub mod file_store;
pub mod permissions;

use chrono::{DateTime, Utc};
use std::path::PathBuf;
use thiserror::Error;

/// Trait for keyed secret storage
pub trait SecureStorage: Send + Sync {
    /// Store a secret, replacing any previous value
    fn store(&self, key: &str, value: &[u8]) -> Result<(), StorageError>;

    /// Retrieve a secret
    fn retrieve(&self, key: &str) -> Result<Vec<u8>, StorageError>;

    /// Time the secret was last written
    fn modified(&self, key: &str) -> Result<DateTime<Utc>, StorageError>;

    /// Check if a key exists
    fn exists(&self, key: &str) -> bool;
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Key not found: {0}")]
    NotFound(String),
    #[error("Access denied: {} is readable by other users", .0.display())]
    AccessDenied(PathBuf),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to move temporary file into place: {0}")]
    Persist(#[from] tempfile::PersistError),
}

pub use file_store::FileStorage;
pub use permissions::{verify_or_repair, Requirement};
