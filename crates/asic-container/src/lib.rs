//! ASiC-S container lifecycle.
//!
//! An ASiC-S (Associated Signature Container, Simple profile) archive binds
//! exactly one data object to an append-only chain of cryptographic seals,
//! so a verifier can prove content integrity and sealing time long after the
//! original keys expired. This crate owns the chain logic: parsing a
//! container's entries into an ordered seal chain (following archive
//! manifest cross-references recursively), extending the chain with a new
//! timestamp seal whose manifest re-digests everything sealed so far, and
//! persisting the result.
//!
//! Cryptographic token production stays behind the [`Sealer`] trait; ZIP and
//! XML handling live in [`storage`] and [`manifest`].

pub mod container;
pub mod detect;
pub mod digest;
pub mod entry;
pub mod error;
pub mod manifest;
pub mod seal;
pub mod storage;

// Convenience re-exports
pub use container::{
    AsicContainer, DataObject, MANIFEST_ENTRY, SIGNATURES_ENTRY, TIMESTAMP_ENTRY,
    TIMESTAMP_TOKEN_MIME,
};
pub use detect::{has_simple_extension, is_simple_format};
pub use digest::{Digest, DigestAlgorithm, DigestHasher};
pub use entry::MetadataEntry;
pub use error::{Error, Result};
pub use manifest::{ArchiveManifest, DataObjectReference, SigReference, SignatureRef};
pub use seal::{LtaSeal, Seal, SealProfile, Sealer, TimestampSeal};
pub use storage::{ZipReader, ZipStorageWriter, MIMETYPE_ASIC_S};
