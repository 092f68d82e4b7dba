//! The archive chain manager: parse-on-open, chain extension and persistence.
//!
//! An ASiC-S container binds exactly one data object to an append-only chain
//! of seals. The first (primary) seal is stored bare as
//! `META-INF/timestamp.tst` or `META-INF/signatures.xml`; every later
//! (extension) seal is a timestamp token over a fresh archive manifest that
//! re-digests everything sealed so far, including prior manifests. The chain
//! tip keeps the unnumbered manifest name; extending the chain retires the
//! tip to the next free numbered name and references it as a root file.

use crate::digest::{Digest, DigestAlgorithm};
use crate::entry::MetadataEntry;
use crate::error::{Error, Result};
use crate::manifest::{self, ArchiveManifest, DataObjectReference, SigReference};
use crate::seal::{LtaSeal, Seal, SealProfile, Sealer, TimestampSeal};
use crate::storage::{ZipReader, ZipStorageWriter, MIMETYPE_ASIC_S, MIMETYPE_ENTRY};
use std::collections::BTreeSet;
use std::io::{Seek, Write};
use std::path::Path;
use std::sync::Arc;
use tempfile::NamedTempFile;
use tracing::debug;

/// Primary timestamp seal entry (no manifest).
pub const TIMESTAMP_ENTRY: &str = "META-INF/timestamp.tst";
/// Primary XAdES-LTA seal entry.
pub const SIGNATURES_ENTRY: &str = "META-INF/signatures.xml";
/// Current chain-tip manifest entry.
pub const MANIFEST_ENTRY: &str = "META-INF/ASiCArchiveManifest.xml";
/// Media type of stored time-stamp tokens.
pub const TIMESTAMP_TOKEN_MIME: &str = "application/vnd.etsi.timestamp-token";

const MANIFEST_MIME: &str = "text/xml";
const META_INF_PREFIX: &str = "META-INF/";
const DEFAULT_DATA_MIME: &str = "application/octet-stream";

/// The container's single data object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataObject {
    name: String,
    mime: String,
    data: Vec<u8>,
}

impl DataObject {
    /// Archive-relative file name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared media type.
    pub fn media_type(&self) -> &str {
        &self.mime
    }

    /// Raw content.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Digest over the data object's content.
    pub fn digest(&self, algorithm: DigestAlgorithm) -> Digest {
        algorithm.digest(&self.data)
    }
}

/// An ASiC-S container: one data object, an ordered seal chain and the
/// metadata entries that back it.
///
/// The container owns everything outright; storage and document handles are
/// opened per operation and released before it returns. Mutating calls must
/// be externally serialized per instance; read-only queries are free once
/// construction completed.
#[derive(Debug, Default)]
pub struct AsicContainer {
    data_object: Option<DataObject>,
    seals: Vec<Seal>,
    metadata: Vec<MetadataEntry>,
    digest_algorithm: DigestAlgorithm,
}

impl AsicContainer {
    /// New empty container.
    pub fn create() -> Self {
        Self::default()
    }

    /// Choose the algorithm used for manifest digests (default SHA-256).
    pub fn with_digest_algorithm(mut self, algorithm: DigestAlgorithm) -> Self {
        self.digest_algorithm = algorithm;
        self
    }

    /// Open and parse an existing container archive.
    ///
    /// Classifies every ZIP entry in listing order, resolves archive
    /// manifests recursively and rebuilds the seal chain in trust order.
    /// Fails on any structural violation; on failure nothing is returned,
    /// so no partially parsed container is ever observable.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!(path = %path.display(), "opening ASiC-S container");

        let mut reader = ZipReader::open(path)?;
        reader.expect_media_type(MIMETYPE_ASIC_S)?;

        let mut container = Self::create();
        let names = reader.entry_names().to_vec();
        let mut visited = BTreeSet::new();

        for name in &names {
            if name == MIMETYPE_ENTRY {
                continue;
            }
            if name == TIMESTAMP_ENTRY {
                container.ensure_no_primary_seal(name)?;
                let token = reader.extract(name)?;
                container.metadata.push(MetadataEntry::new(
                    name,
                    TIMESTAMP_TOKEN_MIME,
                    token.clone(),
                ));
                container.seals.push(Seal::Timestamp(TimestampSeal::new(token)));
            } else if name == SIGNATURES_ENTRY {
                container.ensure_no_primary_seal(name)?;
                let document = reader.extract(name)?;
                let shared: Arc<[u8]> = document.clone().into();
                for signature in manifest::signature_elements(&document)? {
                    container
                        .seals
                        .push(Seal::ArchivalSignature(LtaSeal::new(
                            shared.clone(),
                            signature.id,
                        )));
                }
                container
                    .metadata
                    .push(MetadataEntry::new(name, MANIFEST_MIME, document));
            } else if name == MANIFEST_ENTRY {
                container.resolve_manifest(&mut reader, name, MANIFEST_MIME, false, &mut visited)?;
            } else if name.starts_with(META_INF_PREFIX) {
                // Reserved namespace for auxiliary metadata outside the chain.
                continue;
            } else if let Some(directory) = directory_of(name) {
                return Err(Error::SubfolderNotSupported {
                    directory: directory.to_string(),
                });
            } else if container.data_object.is_some() {
                return Err(Error::DataObjectExists);
            } else {
                let data = reader.extract(name)?;
                container.data_object = Some(DataObject {
                    name: name.clone(),
                    mime: DEFAULT_DATA_MIME.into(),
                    data,
                });
            }
        }

        if container.data_object.is_none() {
            return Err(Error::NoDataObjects);
        }
        if container.seals.is_empty() {
            return Err(Error::NoSeals);
        }
        debug!(
            seals = container.seals.len(),
            entries = container.metadata.len(),
            "container opened"
        );
        Ok(container)
    }

    /// Resolve one archive manifest and every root file it references.
    ///
    /// Root references resolve first: a manifest is only accepted once its
    /// whole ancestry is. Every later manifest re-references all retired
    /// manifests as root files, so a reference to an already-resolved
    /// manifest is skipped; the same check terminates self-referencing
    /// cycles in hostile input.
    fn resolve_manifest(
        &mut self,
        reader: &mut ZipReader,
        name: &str,
        mime: &str,
        as_root: bool,
        visited: &mut BTreeSet<String>,
    ) -> Result<()> {
        if !visited.insert(name.to_string()) {
            return Ok(());
        }
        debug!(%name, %as_root, "resolving archive manifest");

        let bytes = reader.extract(name)?;
        let document = ArchiveManifest::parse(name, &bytes)?;

        let roots: Vec<(String, String)> = document
            .root_references()
            .map(|r| (r.uri.clone(), r.mime_type.clone()))
            .collect();
        for (root_uri, root_mime) in roots {
            self.resolve_manifest(reader, &root_uri, &root_mime, true, visited)?;
        }

        let sig = document.sig_reference().clone();
        let token = reader.extract(&sig.uri)?;

        self.seals
            .push(Seal::Timestamp(TimestampSeal::with_manifest(
                name,
                token.clone(),
            )));
        let entry = if as_root {
            MetadataEntry::new_root(name, mime, bytes)
        } else {
            MetadataEntry::new(name, mime, bytes)
        };
        self.metadata.push(entry);
        self.metadata
            .push(MetadataEntry::new(&sig.uri, &sig.mime_type, token));
        Ok(())
    }

    fn ensure_no_primary_seal(&self, entry: &str) -> Result<()> {
        if self.seals.is_empty() {
            Ok(())
        } else {
            Err(Error::PrimarySealExists {
                entry: entry.to_string(),
            })
        }
    }

    /// The container's media type.
    pub fn media_type(&self) -> &'static str {
        MIMETYPE_ASIC_S
    }

    /// The single data object, if one has been added.
    pub fn data_object(&self) -> Option<&DataObject> {
        self.data_object.as_ref()
    }

    /// The seal chain, in trust order.
    pub fn seals(&self) -> &[Seal] {
        &self.seals
    }

    /// All metadata entries, in storage order.
    pub fn metadata(&self) -> &[MetadataEntry] {
        &self.metadata
    }

    /// Algorithm used for manifest digest references.
    pub fn digest_algorithm(&self) -> DigestAlgorithm {
        self.digest_algorithm
    }

    /// Add the container's single data object.
    pub fn add_data_object(
        &mut self,
        name: &str,
        media_type: &str,
        data: Vec<u8>,
    ) -> Result<()> {
        if self.data_object.is_some() {
            return Err(Error::DataObjectExists);
        }
        if name.is_empty() || name == MIMETYPE_ENTRY || name.starts_with(META_INF_PREFIX) {
            return Err(Error::InvalidName {
                name: name.to_string(),
                reason: "reserved entry name".into(),
            });
        }
        if let Some(directory) = directory_of(name) {
            return Err(Error::SubfolderNotSupported {
                directory: directory.to_string(),
            });
        }
        self.data_object = Some(DataObject {
            name: name.to_string(),
            mime: media_type.to_string(),
            data,
        });
        Ok(())
    }

    /// Digest of a metadata entry's current bytes, looked up by name.
    pub fn file_digest(&self, name: &str, algorithm: DigestAlgorithm) -> Result<Digest> {
        self.metadata
            .iter()
            .find(|entry| entry.name() == name)
            .map(|entry| entry.digest(algorithm))
            .ok_or_else(|| Error::EntryNotFound {
                name: name.to_string(),
            })
    }

    /// Append one seal to the chain.
    ///
    /// The very first seal is a bare timestamp token over the data object,
    /// stored as `META-INF/timestamp.tst` with no manifest. Every later seal
    /// goes through chain extension: a fresh archive manifest re-digests the
    /// data object and every existing metadata entry, the previous tip is
    /// retired to a numbered name, and the new token covers the manifest.
    ///
    /// Either the whole seal+manifest+token triple is appended or the
    /// container is left exactly as it was.
    pub fn sign(&mut self, sealer: &dyn Sealer) -> Result<&Seal> {
        if sealer.profile() != SealProfile::TimestampToken {
            return Err(Error::ProfileMismatch {
                expected: SealProfile::TimestampToken,
                found: sealer.profile(),
            });
        }
        let data_object = self.data_object.as_ref().ok_or(Error::NoDataObjects)?;

        if self.seals.is_empty() {
            debug!("creating primary timestamp seal");
            let token = sealer.seal(data_object.data()).map_err(Error::Other)?;
            self.metadata.push(MetadataEntry::new(
                TIMESTAMP_ENTRY,
                TIMESTAMP_TOKEN_MIME,
                token.clone(),
            ));
            self.seals.push(Seal::Timestamp(TimestampSeal::new(token)));
            return Ok(self.seals.last().expect("seal was just appended"));
        }

        let token_name = self.next_free_name("META-INF/timestamp", ".tst");
        debug!(%token_name, "extending seal chain");

        let mut document = ArchiveManifest::new(SigReference {
            uri: token_name.clone(),
            mime_type: TIMESTAMP_TOKEN_MIME.into(),
        });
        document.push_reference(DataObjectReference {
            uri: data_object.name().to_string(),
            mime_type: data_object.media_type().to_string(),
            rootfile: false,
            digest: data_object.digest(self.digest_algorithm),
        });

        // The current tip is referenced under the numbered name it is about
        // to retire to; the rename itself happens only after the sealer
        // succeeded, so a failed sign leaves no trace.
        let mut retire: Option<(usize, String)> = None;
        for (index, entry) in self.metadata.iter().enumerate() {
            let (uri, rootfile) = if entry.name() == MANIFEST_ENTRY {
                let retired_name = self.next_free_name("META-INF/ASiCArchiveManifest", ".xml");
                retire = Some((index, retired_name.clone()));
                (retired_name, true)
            } else {
                (entry.name().to_string(), entry.is_root())
            };
            document.push_reference(DataObjectReference {
                uri,
                mime_type: entry.media_type().to_string(),
                rootfile,
                digest: entry.digest(self.digest_algorithm),
            });
        }

        let manifest_bytes = document.to_bytes()?;
        let token = sealer.seal(&manifest_bytes).map_err(Error::Other)?;

        if let Some((index, retired_name)) = retire {
            self.metadata[index].retire(retired_name)?;
        }
        self.metadata.push(MetadataEntry::new(
            MANIFEST_ENTRY,
            MANIFEST_MIME,
            manifest_bytes,
        ));
        self.metadata
            .push(MetadataEntry::new(&token_name, TIMESTAMP_TOKEN_MIME, token.clone()));
        self.seals
            .push(Seal::Timestamp(TimestampSeal::with_manifest(
                MANIFEST_ENTRY,
                token,
            )));
        Ok(self.seals.last().expect("seal was just appended"))
    }

    /// Lowest free `{prefix}{NNN}{suffix}` name, `NNN` zero-padded to three
    /// digits starting at 001.
    fn next_free_name(&self, prefix: &str, suffix: &str) -> String {
        let mut counter = 1usize;
        loop {
            let candidate = format!("{prefix}{counter:03}{suffix}");
            if !self.metadata.iter().any(|entry| entry.name() == candidate) {
                return candidate;
            }
            counter += 1;
        }
    }

    /// Persist the container to `path`.
    ///
    /// Does nothing when the seal list is empty. Fails if the chain's first
    /// seal is not a timestamp token, which guards against bypassing the
    /// [`sign`] checks programmatically.
    ///
    /// The archive is assembled in a temporary file next to `path` and moved
    /// into place only once fully written, so a failed save never truncates
    /// or corrupts an existing archive at `path` (including the one the
    /// container was opened from).
    ///
    /// [`sign`]: AsicContainer::sign
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        debug!(path = %path.display(), "saving ASiC-S container");
        if self.seals.is_empty() {
            debug!("no seals; nothing to persist");
            return Ok(());
        }
        let directory = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let temp = NamedTempFile::new_in(directory)?;
        self.write_to(temp.as_file())?;
        temp.persist(path).map_err(|err| Error::Io(err.error))?;
        Ok(())
    }

    /// Persist the container into any seekable writer.
    pub fn write_to<W: Write + Seek>(&self, writer: W) -> Result<()> {
        let Some(first) = self.seals.first() else {
            return Ok(());
        };
        if first.profile() != SealProfile::TimestampToken {
            return Err(Error::ProfileMismatch {
                expected: SealProfile::TimestampToken,
                found: first.profile(),
            });
        }
        let data_object = self.data_object.as_ref().ok_or(Error::NoDataObjects)?;

        let mut zip = ZipStorageWriter::new(writer, MIMETYPE_ASIC_S)?;
        zip.add_entry(data_object.name(), data_object.data())?;
        for entry in &self.metadata {
            zip.add_entry(entry.name(), entry.data())?;
        }
        zip.finish()?;
        Ok(())
    }

    /// Embedding a detached AdES signature is not part of this format.
    pub fn add_ades_signature(&mut self, _signature: &[u8]) -> Result<()> {
        Err(Error::Unsupported {
            operation: "adding an AdES signature".into(),
        })
    }

    /// Two-phase external signing is not part of this format.
    pub fn prepare_signature(&mut self, _sealer: &dyn Sealer) -> Result<()> {
        Err(Error::Unsupported {
            operation: "preparing a signature".into(),
        })
    }
}

/// Directory prefix of an entry name, if the name points into a subfolder.
fn directory_of(name: &str) -> Option<&str> {
    let directory = &name[..name.rfind('/')?];
    (!directory.is_empty() && directory != "/" && directory != ".").then_some(directory)
}
