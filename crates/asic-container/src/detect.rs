//! Format detection: is a path an ASiC-S (simple) container?
//!
//! Decision order follows the format rules: extension allowlists first, then
//! a ZIP probe of the leading `mimetype` entry. Any failure to open or parse
//! means "not this format", never an error.

use crate::storage::{ZipReader, MIMETYPE_ASIC_S, MIMETYPE_ENTRY};
use std::path::Path;
use tracing::debug;

const EXTENDED_EXTENSIONS: &[&str] = &["asice", "sce", "bdoc"];
const SIMPLE_EXTENSIONS: &[&str] = &["asics", "scs"];

fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
}

/// True if the file extension alone marks `path` as a simple container.
///
/// Used when creating a brand-new archive, where there is no ZIP content to
/// probe yet.
pub fn has_simple_extension(path: impl AsRef<Path>) -> bool {
    matches!(extension_of(path.as_ref()), Some(ext) if SIMPLE_EXTENSIONS.contains(&ext.as_str()))
}

/// Decide whether `path` denotes an ASiC-S archive.
///
/// Extended-profile extensions answer `false` immediately; simple-profile
/// extensions answer `true`; anything else is probed as a ZIP whose first
/// listed entry must literally be `mimetype` with the simple media type.
pub fn is_simple_format(path: impl AsRef<Path>) -> bool {
    let path = path.as_ref();
    debug!(path = %path.display(), "detecting container format");

    if let Some(ext) = extension_of(path) {
        if EXTENDED_EXTENSIONS.contains(&ext.as_str()) {
            return false;
        }
        if SIMPLE_EXTENSIONS.contains(&ext.as_str()) {
            return true;
        }
    }

    match probe_zip(path) {
        Ok(is_simple) => is_simple,
        Err(err) => {
            // Not an ASiC/zip document; detection swallows the error.
            debug!(path = %path.display(), %err, "zip probe failed");
            false
        }
    }
}

fn probe_zip(path: &Path) -> crate::error::Result<bool> {
    let mut reader = ZipReader::open(path)?;
    if reader.first_entry_name() != Some(MIMETYPE_ENTRY) {
        return Ok(false);
    }
    Ok(reader.media_type()? == MIMETYPE_ASIC_S)
}
