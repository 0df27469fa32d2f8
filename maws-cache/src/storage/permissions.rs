//! Ownership and mode checks for cache directories and files.
//!
//! A directory is trusted when it is owned by the effective user and its mode
//! is exactly `0700`. Missing directories are created with that mode. A file
//! is trusted when it has no group or other bits; an offending file is
//! narrowed to `0600` and checked again.
//!
//! None of these checks return errors. Every failure is logged and reported
//! as "not trusted" so callers can fall back to running without a cache.

use std::fs;
use std::io;
use std::path::Path;
use tracing::{debug, warn};

/// Mode required on the configuration root and cache directory
pub const DIR_MODE: u32 = 0o700;

/// Mode applied to every cache file
pub const FILE_MODE: u32 = 0o600;

/// Group and other permission bits
const GROUP_OTHER_BITS: u32 = 0o077;

/// What a path must satisfy to be trusted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    /// Directory owned by the effective user with mode `0700`, created if absent
    PrivateDir,
    /// File with no group or other bits, repaired to `0600` if possible
    PrivateFile,
}

/// Check `path` against `requirement`, creating or repairing it where allowed.
pub fn verify_or_repair(path: &Path, requirement: Requirement) -> bool {
    if path.as_os_str().is_empty() {
        debug!(?requirement, "Refusing to check an empty path");
        return false;
    }

    match requirement {
        Requirement::PrivateDir => verify_dir(path),
        Requirement::PrivateFile => verify_file(path),
    }
}

#[cfg(unix)]
fn verify_dir(path: &Path) -> bool {
    use std::os::unix::fs::MetadataExt;

    let metadata = match fs::metadata(path) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return create_private_dir(path),
        Err(e) => {
            debug!(path = %path.display(), error = %e, "Unable to stat directory");
            return false;
        }
    };

    if !metadata.is_dir() {
        debug!(path = %path.display(), "Expected a directory");
        return false;
    }

    let mode = metadata.mode() & 0o777;
    let owner = metadata.uid();
    let euid = uzers::get_effective_uid();

    debug!(
        path = %path.display(),
        mode = %format!("{mode:o}"),
        owner,
        "Directory permissions"
    );

    if owner != euid {
        debug!(path = %path.display(), owner, euid, "Directory is owned by another user");
        return false;
    }

    mode == DIR_MODE
}

#[cfg(unix)]
fn create_private_dir(path: &Path) -> bool {
    use std::os::unix::fs::DirBuilderExt;

    if let Err(e) = fs::DirBuilder::new()
        .recursive(true)
        .mode(DIR_MODE)
        .create(path)
    {
        debug!(path = %path.display(), error = %e, "Unable to create directory");
        return false;
    }

    // DirBuilder's mode is filtered through the umask
    set_mode(path, DIR_MODE)
}

#[cfg(unix)]
fn verify_file(path: &Path) -> bool {
    if !has_group_or_other_bits(path) {
        return true;
    }

    warn!(
        path = %path.display(),
        "Cached file has invalid permissions, attempting to fix"
    );

    set_mode(path, FILE_MODE) && !has_group_or_other_bits(path)
}

/// Unreadable metadata counts as exposed.
#[cfg(unix)]
fn has_group_or_other_bits(path: &Path) -> bool {
    use std::os::unix::fs::MetadataExt;

    match fs::metadata(path) {
        Ok(metadata) => metadata.mode() & GROUP_OTHER_BITS != 0,
        Err(e) => {
            debug!(path = %path.display(), error = %e, "Unable to stat file");
            true
        }
    }
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> bool {
    use std::os::unix::fs::PermissionsExt;

    match fs::set_permissions(path, fs::Permissions::from_mode(mode)) {
        Ok(()) => {
            debug!(path = %path.display(), mode = %format!("{mode:o}"), "Successfully repaired permissions");
            true
        }
        Err(e) => {
            debug!(path = %path.display(), error = %e, "Failed to repair permissions");
            false
        }
    }
}

#[cfg(not(unix))]
fn verify_dir(path: &Path) -> bool {
    debug!(path = %path.display(), "Permission checks are not supported on this platform");
    false
}

#[cfg(not(unix))]
fn verify_file(path: &Path) -> bool {
    debug!(path = %path.display(), "Permission checks are not supported on this platform");
    false
}
