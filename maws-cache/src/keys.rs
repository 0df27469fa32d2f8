//! Cache key derivation.
//!
//! Identifiers such as endpoint URLs, issuer URLs and role ARNs can contain
//! characters that are unsafe in file names or exceed path length limits.
//! Each is reduced to the lowercase hex SHA-256 of its UTF-8 bytes and
//! prefixed with the artifact kind, so equal hashes of different kinds never
//! share a file.

use sha2::{Digest, Sha256};
use std::fmt;

/// The kinds of artifact kept in the cache directory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKind {
    RoleMap,
    IdToken,
    StsCredentials,
}

impl EntryKind {
    pub const ALL: [EntryKind; 3] = [
        EntryKind::RoleMap,
        EntryKind::IdToken,
        EntryKind::StsCredentials,
    ];

    /// File name prefix for entries of this kind
    pub fn prefix(self) -> &'static str {
        match self {
            EntryKind::RoleMap => "rolemap_",
            EntryKind::IdToken => "id_",
            EntryKind::StsCredentials => "stscreds_",
        }
    }

    /// Classify a cache file by its name
    pub fn from_file_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| name.starts_with(kind.prefix()))
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EntryKind::RoleMap => "role_map",
            EntryKind::IdToken => "id_token",
            EntryKind::StsCredentials => "sts_credentials",
        }
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fixed-length, filesystem-safe key for an arbitrary identifier
pub fn derive_key(raw_identifier: &str) -> String {
    hex::encode(Sha256::digest(raw_identifier.as_bytes()))
}

/// `rolemap_<sha256(endpoint_url)>`
pub fn role_map_file_name(endpoint_url: &str) -> String {
    format!("{}{}", EntryKind::RoleMap.prefix(), derive_key(endpoint_url))
}

/// `id_<sha256(issuer)>_<client_id>`
///
/// The client id is kept readable; path separators in it are replaced by the
/// storage layer.
pub fn id_token_file_name(issuer: &str, client_id: &str) -> String {
    format!(
        "{}{}_{}",
        EntryKind::IdToken.prefix(),
        derive_key(issuer),
        client_id
    )
}

/// `stscreds_<sha256(role_arn)>`
pub fn sts_credentials_file_name(role_arn: &str) -> String {
    format!(
        "{}{}",
        EntryKind::StsCredentials.prefix(),
        derive_key(role_arn)
    )
}
