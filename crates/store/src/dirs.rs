//! On-disk directory management under the library root.
//!
//! Every stored record exclusively owns `root/uid/version_id/`. These helpers
//! keep that tree in shape: validating that ids are safe directory names,
//! replacing a record's directory on install, and collapsing empty uid
//! directories on removal.
//!
//! All operations here are deliberately synchronous `std::fs`; they run on
//! whichever thread drives the calling future and block it for their
//! duration. The store is not designed for concurrent writers, so there is
//! nothing to overlap them with.

use crate::error::{ErrorKind, Result};
use std::fs;
use std::path::Path;

/// Validates that a uid or version id can be used as a single directory name.
///
/// Ids come out of manifests and remote responses, so they are treated as
/// untrusted: anything that isn't one plain path component (separators,
/// `..`, an empty string, null bytes) is rejected rather than joined onto
/// the library root.
pub(crate) fn validate_id(id: &str) -> Result<&str> {
    let ok = !id.is_empty()
        && !id.contains(['/', '\\', '\0'])
        && id != "."
        && id != ".."
        && Path::new(id).components().count() == 1;
    if !ok {
        exn::bail!(ErrorKind::InvalidId(id.to_string()));
    }
    Ok(id)
}

/// Copy `source` into `target`, replacing whatever was there before.
///
/// The removal of stale contents and the copy are not atomic, but this runs
/// only after the matching database transaction has committed, so the rows
/// already describe the incoming payload.
pub(crate) fn copy_dir_replacing(source: &Path, target: &Path) -> Result<()> {
    if !source.is_dir() {
        exn::bail!(ErrorKind::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("source directory {} does not exist", source.display()),
        )));
    }
    if target.exists() {
        fs::remove_dir_all(target).map_err(ErrorKind::from)?;
    }
    copy_dir_recursive(source, target)
}

fn copy_dir_recursive(source: &Path, target: &Path) -> Result<()> {
    fs::create_dir_all(target).map_err(ErrorKind::from)?;
    for entry in fs::read_dir(source).map_err(ErrorKind::from)? {
        let entry = entry.map_err(ErrorKind::from)?;
        let from = entry.path();
        let to = target.join(entry.file_name());
        if entry.file_type().map_err(ErrorKind::from)?.is_dir() {
            copy_dir_recursive(&from, &to)?;
        } else {
            fs::copy(&from, &to).map_err(ErrorKind::from)?;
        }
    }
    Ok(())
}

/// Remove `root/uid/version_id/`, then the uid directory itself if no
/// sibling version directories remain.
pub(crate) fn remove_version_dir(root: &Path, uid: &str, version_id: &str) -> Result<()> {
    let uid_dir = root.join(validate_id(uid)?);
    let version_dir = uid_dir.join(validate_id(version_id)?);
    if version_dir.exists() {
        fs::remove_dir_all(&version_dir).map_err(ErrorKind::from)?;
    }
    // Directory-collapse rule: a uid directory only exists to hold versions.
    if uid_dir.is_dir() && fs::read_dir(&uid_dir).map_err(ErrorKind::from)?.next().is_none() {
        fs::remove_dir(&uid_dir).map_err(ErrorKind::from)?;
    }
    Ok(())
}

/// Push the direct contents of a legacy `root/uid/` directory down into
/// `root/uid/version_id/`.
///
/// Pre-versioned layouts stored the manifest and payload directly under the
/// uid. Renames stay within one filesystem, so entries are moved rather
/// than copied.
pub(crate) fn push_down_into_version(uid_dir: &Path, version_id: &str) -> Result<()> {
    let version_dir = uid_dir.join(validate_id(version_id)?);
    fs::create_dir_all(&version_dir).map_err(ErrorKind::from)?;
    for entry in fs::read_dir(uid_dir).map_err(ErrorKind::from)? {
        let entry = entry.map_err(ErrorKind::from)?;
        if entry.path() == version_dir {
            continue;
        }
        fs::rename(entry.path(), version_dir.join(entry.file_name())).map_err(ErrorKind::from)?;
    }
    Ok(())
}
