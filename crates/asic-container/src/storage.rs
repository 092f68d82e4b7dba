//! Archive storage: the ZIP layer underneath the container.
//!
//! ASiC containers are ZIP archives whose first entry is literally named
//! `mimetype` and holds the format's media type, stored uncompressed so the
//! tag is readable by byte inspection. Reader and writer handles are scoped
//! to a single open/save operation and never retained by the container.

use crate::error::{Error, Result};
use std::fs::File;
use std::io::{Read, Seek, Write};
use std::path::Path;
use tracing::debug;
use zip::result::ZipError;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// Media type of the simple (single data object) profile.
pub const MIMETYPE_ASIC_S: &str = "application/vnd.etsi.asic-s+zip";
/// Media type of the extended profile; rejected by this crate.
pub const MIMETYPE_ASIC_E: &str = "application/vnd.etsi.asic-e+zip";
/// Name of the format-tag entry.
pub const MIMETYPE_ENTRY: &str = "mimetype";

// Upper bound on the buffer capacity reserved from an entry's declared
// size; the size field is attacker-controlled, so anything beyond this
// grows on demand while reading.
const MAX_PREALLOC: u64 = 1 << 20;

/// Random-access reader over an existing container archive.
pub struct ZipReader {
    archive: ZipArchive<File>,
    names: Vec<String>,
}

impl ZipReader {
    /// Open a container archive from disk.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let mut archive = ZipArchive::new(file)?;
        // Entry names in central-directory order; classification is
        // order-sensitive.
        let mut names = Vec::with_capacity(archive.len());
        for index in 0..archive.len() {
            names.push(archive.by_index(index)?.name().to_string());
        }
        Ok(Self { archive, names })
    }

    /// Entry names in the order they are listed.
    pub fn entry_names(&self) -> &[String] {
        &self.names
    }

    /// Name of the first listed entry, if the archive has one.
    pub fn first_entry_name(&self) -> Option<&str> {
        self.names.first().map(String::as_str)
    }

    /// Extract one entry's raw bytes.
    pub fn extract(&mut self, name: &str) -> Result<Vec<u8>> {
        let mut entry = match self.archive.by_name(name) {
            Ok(entry) => entry,
            Err(ZipError::FileNotFound) => {
                return Err(Error::EntryNotFound { name: name.into() })
            }
            Err(err) => return Err(err.into()),
        };
        let mut data = Vec::with_capacity(entry.size().min(MAX_PREALLOC) as usize);
        entry.read_to_end(&mut data)?;
        Ok(data)
    }

    /// Read the archive's declared media type from the `mimetype` entry.
    ///
    /// The entry must hold the media-type string verbatim; trailing
    /// whitespace or non-UTF-8 content is not tolerated.
    pub fn media_type(&mut self) -> Result<String> {
        let bytes = self.extract(MIMETYPE_ENTRY).map_err(|err| match err {
            Error::EntryNotFound { .. } => Error::NotThisFormat {
                reason: "missing mimetype entry".into(),
            },
            other => other,
        })?;
        String::from_utf8(bytes).map_err(|_| Error::NotThisFormat {
            reason: "mimetype entry is not valid UTF-8".into(),
        })
    }

    /// Fail unless the archive declares `expected` as its media type.
    pub fn expect_media_type(&mut self, expected: &str) -> Result<()> {
        let found = self.media_type()?;
        if found != expected {
            debug!(%found, %expected, "media type mismatch");
            return Err(Error::NotThisFormat {
                reason: format!("media type '{found}', expected '{expected}'"),
            });
        }
        Ok(())
    }
}

/// Writer that lays entries out per the container format rules.
pub struct ZipStorageWriter<W: Write + Seek> {
    zip: ZipWriter<W>,
}

impl ZipStorageWriter<File> {
    /// Create a container archive at `path`.
    pub fn create(path: &Path, media_type: &str) -> Result<Self> {
        Self::new(File::create(path)?, media_type)
    }
}

impl<W: Write + Seek> ZipStorageWriter<W> {
    /// Start an archive; the `mimetype` entry is written first, stored
    /// uncompressed.
    pub fn new(writer: W, media_type: &str) -> Result<Self> {
        let mut zip = ZipWriter::new(writer);
        let stored = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
        zip.start_file(MIMETYPE_ENTRY, stored)?;
        zip.write_all(media_type.as_bytes())?;
        Ok(Self { zip })
    }

    /// Add one named entry, deflated.
    pub fn add_entry(&mut self, name: &str, data: &[u8]) -> Result<()> {
        let deflated = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        self.zip.start_file(name, deflated)?;
        self.zip.write_all(data)?;
        Ok(())
    }

    /// Finalize the archive and return the underlying writer.
    pub fn finish(self) -> Result<W> {
        Ok(self.zip.finish()?)
    }
}
