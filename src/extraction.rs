//! Single-member archive extraction
//!
//! Each downloaded archive carries the product payload as one member with a
//! well-known suffix (`.nat` for native-format imagery) next to auxiliary
//! files. Extraction writes only the first matching member and leaves the
//! rest of the archive alone; the caller deletes the archive afterwards.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};
use zip::ZipArchive;

use crate::error::ExtractError;

/// Extract the first member whose name ends with `suffix` into `target_dir`
///
/// The member is written under its base name, preserving its unix file mode
/// when the archive records one. Members after the first match are ignored —
/// these archives carry a single payload file, so this is a single-member
/// extractor, not a general unzip.
///
/// Returns `Ok(Some(path))` with the written file, or `Ok(None)` in two
/// documented cases:
/// - `target_dir` already exists: a previous run (or a concurrent worker)
///   already processed this archive, so the call is a no-op;
/// - no member matches the suffix: nothing is written and the caller must
///   not assume a payload file exists.
///
/// # Errors
///
/// [`ExtractError::CorruptArchive`] when the archive or its member directory
/// cannot be read, [`ExtractError::Write`] when the destination cannot be
/// created or written.
pub fn extract_member(
    archive_path: &Path,
    target_dir: &Path,
    suffix: &str,
) -> Result<Option<PathBuf>, ExtractError> {
    let file = fs::File::open(archive_path).map_err(|e| ExtractError::CorruptArchive {
        archive: archive_path.to_path_buf(),
        reason: format!("failed to open archive: {e}"),
    })?;
    let mut archive = ZipArchive::new(file).map_err(|e| ExtractError::CorruptArchive {
        archive: archive_path.to_path_buf(),
        reason: format!("failed to read member directory: {e}"),
    })?;

    if let Some(parent) = target_dir.parent() {
        fs::create_dir_all(parent).map_err(|e| ExtractError::Write {
            path: parent.to_path_buf(),
            source: e,
        })?;
    }
    match fs::create_dir(target_dir) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
            // The directory exists, so this archive was already processed —
            // by an earlier run or by a worker that raced us here.
            debug!(?target_dir, "extraction directory exists, skipping");
            return Ok(None);
        }
        Err(e) => {
            return Err(ExtractError::Write {
                path: target_dir.to_path_buf(),
                source: e,
            });
        }
    }

    for index in 0..archive.len() {
        let mut member = archive
            .by_index(index)
            .map_err(|e| ExtractError::CorruptArchive {
                archive: archive_path.to_path_buf(),
                reason: format!("failed to read member {index}: {e}"),
            })?;

        if member.is_dir() || !member.name().ends_with(suffix) {
            continue;
        }

        let member_name = member.name().to_string();
        let Some(base_name) = Path::new(&member_name).file_name() else {
            warn!(member = %member_name, "skipping member with unusable name");
            continue;
        };
        let dest = target_dir.join(base_name);

        let mut out = fs::File::create(&dest).map_err(|e| ExtractError::Write {
            path: dest.clone(),
            source: e,
        })?;
        io::copy(&mut member, &mut out).map_err(|e| ExtractError::Write {
            path: dest.clone(),
            source: e,
        })?;

        #[cfg(unix)]
        if let Some(mode) = member.unix_mode() {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&dest, fs::Permissions::from_mode(mode)).map_err(|e| {
                ExtractError::Write {
                    path: dest.clone(),
                    source: e,
                }
            })?;
        }

        info!(member = %member_name, ?dest, "extracted archive member");
        return Ok(Some(dest));
    }

    debug!(?archive_path, suffix, "no member matched the extraction suffix");
    Ok(None)
}
