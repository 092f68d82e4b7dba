//! Seal objects: the ordered members of the signature chain.
//!
//! A container holds either a *Timestamp Seal* (a raw RFC 3161 time-stamp
//! token, optionally bound to the archive manifest it covers) or a
//! *Long-Term-Archival Seal* (one signature element of a shared XAdES
//! signatures document). The chain core only constructs them, asks for their
//! profile and serializes them back to bytes; the cryptographic internals
//! stay with the external collaborators.

use std::fmt;
use std::sync::Arc;

/// Sealing mechanism declared by a seal or a sealer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SealProfile {
    /// RFC 3161 time-stamp token — the only mechanism ASiC-S sign supports.
    TimestampToken,
    /// XAdES long-term-archival signature (read-only primary seals).
    XadesLta,
}

impl fmt::Display for SealProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TimestampToken => write!(f, "TimeStampToken"),
            Self::XadesLta => write!(f, "XAdES-LTA"),
        }
    }
}

/// A raw time-stamp token, optionally covering an archive manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimestampSeal {
    token: Vec<u8>,
    covered_manifest: Option<String>,
}

impl TimestampSeal {
    /// Primary seal: token over the data object, no manifest.
    pub fn new(token: Vec<u8>) -> Self {
        Self {
            token,
            covered_manifest: None,
        }
    }

    /// Extension seal: token over the named archive manifest.
    pub fn with_manifest(manifest_name: impl Into<String>, token: Vec<u8>) -> Self {
        Self {
            token,
            covered_manifest: Some(manifest_name.into()),
        }
    }

    /// Raw token bytes.
    pub fn token(&self) -> &[u8] {
        &self.token
    }

    /// Archive path of the manifest this token covers, if any.
    pub fn covered_manifest(&self) -> Option<&str> {
        self.covered_manifest.as_deref()
    }
}

/// One signature element of a shared XAdES signatures document.
#[derive(Debug, Clone)]
pub struct LtaSeal {
    document: Arc<[u8]>,
    signature_id: Option<String>,
}

impl LtaSeal {
    /// Bind a seal to one `ds:Signature` element of `document`.
    pub fn new(document: Arc<[u8]>, signature_id: Option<String>) -> Self {
        Self {
            document,
            signature_id,
        }
    }

    /// The full signatures document shared by sibling seals.
    pub fn document(&self) -> &[u8] {
        &self.document
    }

    /// `Id` attribute of the bound signature element, if declared.
    pub fn signature_id(&self) -> Option<&str> {
        self.signature_id.as_deref()
    }
}

/// An ordered member of the container's signature chain.
#[derive(Debug, Clone)]
pub enum Seal {
    /// Timestamp seal (primary or extension).
    Timestamp(TimestampSeal),
    /// Long-term-archival signature seal (primary only).
    ArchivalSignature(LtaSeal),
}

impl Seal {
    /// The sealing mechanism this seal was produced with.
    pub fn profile(&self) -> SealProfile {
        match self {
            Self::Timestamp(_) => SealProfile::TimestampToken,
            Self::ArchivalSignature(_) => SealProfile::XadesLta,
        }
    }

    /// Serialize the seal back to its stored byte form.
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Self::Timestamp(seal) => seal.token().to_vec(),
            Self::ArchivalSignature(seal) => seal.document().to_vec(),
        }
    }
}

/// External collaborator that produces seals over arbitrary content.
///
/// Implementations typically talk to a time-stamping authority; retry and
/// backoff policy belongs to them, not to the container. The container only
/// checks the declared [`SealProfile`] and requests token bytes.
pub trait Sealer {
    /// Mechanism this sealer produces.
    fn profile(&self) -> SealProfile;

    /// Produce raw seal bytes (a time-stamp token) over `content`.
    fn seal(&self, content: &[u8]) -> anyhow::Result<Vec<u8>>;
}
