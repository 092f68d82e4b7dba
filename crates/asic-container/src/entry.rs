//! Metadata entries: named payloads stored verbatim inside the archive.

use crate::digest::{Digest, DigestAlgorithm};
use crate::error::{Error, Result};

/// One named payload stored inside the container, independent of the data
/// object: a time-stamp token, a signatures document or an archive manifest.
///
/// Entries are append-only. The single permitted mutation is [`retire`],
/// which promotes the current chain-tip manifest into a permanently numbered
/// historical entry exactly once.
///
/// [`retire`]: MetadataEntry::retire
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataEntry {
    name: String,
    mime: String,
    data: Vec<u8>,
    root: bool,
}

impl MetadataEntry {
    /// New entry with the root flag cleared.
    pub fn new(name: impl Into<String>, mime: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            mime: mime.into(),
            data,
            root: false,
        }
    }

    /// New entry already marked root (a manifest resolved through a
    /// `Rootfile` reference of a later manifest).
    pub fn new_root(name: impl Into<String>, mime: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            root: true,
            ..Self::new(name, mime, data)
        }
    }

    /// Archive-relative path, unique within the container.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared media type.
    pub fn media_type(&self) -> &str {
        &self.mime
    }

    /// Raw stored bytes.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Whether later manifests must reference this entry as a root file.
    pub fn is_root(&self) -> bool {
        self.root
    }

    /// Digest over the entry's current raw bytes.
    pub fn digest(&self, algorithm: DigestAlgorithm) -> Digest {
        algorithm.digest(&self.data)
    }

    /// Retire a current chain-tip manifest to its numbered historical name.
    ///
    /// This is the one legal in-place transition in an entry's lifecycle:
    /// the name changes to `new_name` and the root flag is set, so the next
    /// manifest references this entry as a root file. Retiring an entry that
    /// is already root fails, which keeps "at most one current tip" enforced
    /// here instead of by caller convention.
    pub fn retire(&mut self, new_name: impl Into<String>) -> Result<()> {
        if self.root {
            return Err(Error::AlreadyRetired {
                name: self.name.clone(),
            });
        }
        self.name = new_name.into();
        self.root = true;
        Ok(())
    }
}
