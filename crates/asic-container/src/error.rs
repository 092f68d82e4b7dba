//! Error types for container operations.

use crate::seal::SealProfile;
use thiserror::Error;

/// Result type for container operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while opening, extending or persisting a container.
#[derive(Debug, Error)]
pub enum Error {
    /// Container already holds its single data object.
    #[error("cannot add document to an ASiC-S container which already contains a document")]
    DataObjectExists,

    /// Data objects must live at the archive root.
    #[error("subfolders are not supported: {directory}")]
    SubfolderNotSupported { directory: String },

    /// A primary seal entry was found while a seal is already registered.
    #[error("cannot add signature '{entry}' to an ASiC-S container which already contains a signature")]
    PrimarySealExists { entry: String },

    /// Parsing finished without a data object.
    #[error("ASiC-S container does not contain any data objects")]
    NoDataObjects,

    /// Parsing finished without a seal.
    #[error("ASiC-S container does not contain any signatures")]
    NoSeals,

    /// Rejected data object name.
    #[error("invalid data object name '{name}': {reason}")]
    InvalidName { name: String, reason: String },

    /// Archive manifest failed structural validation.
    #[error("malformed archive manifest '{entry}': {reason}")]
    MalformedManifest { entry: String, reason: String },

    /// A chain-tip manifest was retired twice.
    #[error("manifest entry '{name}' is already retired")]
    AlreadyRetired { name: String },

    /// API surface that this container variant does not implement.
    #[error("operation not supported on ASiC-S containers: {operation}")]
    Unsupported { operation: String },

    /// This format supports exactly one sealing mechanism.
    #[error("ASiC-S containers support only {expected} signing, got {found}")]
    ProfileMismatch {
        expected: SealProfile,
        found: SealProfile,
    },

    /// Digest requested for an unknown metadata entry.
    #[error("file not found: {name}")]
    EntryNotFound { name: String },

    /// Raised by format detection and deliberately swallowed there.
    #[error("not an ASiC-S archive: {reason}")]
    NotThisFormat { reason: String },

    /// I/O error from the filesystem.
    #[error("container I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Error from the ZIP layer.
    #[error("archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// Error from the XML layer.
    #[error("manifest XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    /// Error surfaced by an external collaborator (sealer, TSA client).
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Returns true for violations of the container's structural invariants.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            Self::DataObjectExists
                | Self::SubfolderNotSupported { .. }
                | Self::PrimarySealExists { .. }
                | Self::NoDataObjects
                | Self::NoSeals
                | Self::InvalidName { .. }
                | Self::MalformedManifest { .. }
                | Self::AlreadyRetired { .. }
        )
    }

    /// Returns true if this error indicates a lookup for a missing entry.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::EntryNotFound { .. })
    }
}
