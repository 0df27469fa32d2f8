//! Local credential cache for federated AWS CLI login.
//!
//! Keeps three kinds of artifact under a per-user configuration root so a
//! login does not have to repeat every network round trip:
//! 1. The role map returned by the role-listing endpoint, valid for an hour
//! 2. The OIDC token response, re-verified against the issuer's JWKS on read
//! 3. Temporary STS credentials, per role ARN
//!
//! The same root also holds the AWS shared credentials file, which is merged
//! rather than overwritten.
//!
//! Layout:
//! ```text
//! <root>/               0700
//! <root>/credentials    0600
//! <root>/cache/         0700
//! <root>/cache/rolemap_<sha256 of endpoint URL>
//! <root>/cache/id_<sha256 of issuer>_<client id>
//! <root>/cache/stscreds_<sha256 of role ARN>
//! ```
//!
//! If the root or cache directory is accessible to anyone but the current
//! user, every cache read is a miss and every write is skipped.
//!
//! ## Environment Variables
//! - `MAWS_CACHE_ROOT` (optional): Configuration root, defaults to `~/.maws`
//! - `MAWS_CLOCK_SKEW_ALLOWANCE` (optional): Seconds of remaining validity
//!   below which tokens and credentials are not used, defaults to 300
//! - `MAWS_ROLE_MAP_CACHE_TIME` (optional): Role map lifetime in seconds,
//!   defaults to 3600

#![deny(unsafe_code)]

pub mod cache;
pub mod config;
pub mod credentials_file;
pub mod expiry;
pub mod keys;
pub mod oidc;
pub mod storage;
pub mod types;

pub use cache::{caching_disabled, disable_caching, CredentialCache, EntrySummary};
pub use config::{CacheConfig, ConfigError};
pub use credentials_file::{CredentialsFile, CredentialsFileError, Section};
pub use expiry::ExpiryPolicy;
pub use keys::EntryKind;
pub use oidc::{IdToken, IdTokenClaims, TokenValidator, ValidationError, VerifiedIdToken};
pub use storage::StorageError;
pub use types::{RoleMap, StsCredentials};
