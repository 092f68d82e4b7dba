//! End-to-end container lifecycle: create, seal, persist, reopen, extend.

use asic_container::{
    ArchiveManifest, AsicContainer, DigestAlgorithm, Error, Seal, SealProfile, Sealer,
    MANIFEST_ENTRY, MIMETYPE_ASIC_S, TIMESTAMP_ENTRY,
};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

struct StubSealer;

impl Sealer for StubSealer {
    fn profile(&self) -> SealProfile {
        SealProfile::TimestampToken
    }

    fn seal(&self, content: &[u8]) -> anyhow::Result<Vec<u8>> {
        let mut token = b"TST".to_vec();
        token.extend_from_slice(DigestAlgorithm::Sha256.digest(content).value());
        Ok(token)
    }
}

fn craft_zip(path: &Path, entries: &[(&str, &[u8])]) {
    let file = File::create(path).unwrap();
    let mut zip = ZipWriter::new(file);
    let stored = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
    for (name, data) in entries {
        zip.start_file(*name, stored).unwrap();
        zip.write_all(data).unwrap();
    }
    zip.finish().unwrap();
}

fn workdir() -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("container.asics");
    (dir, path)
}

#[test]
fn archive_without_seals_fails_to_open() {
    let (_dir, path) = workdir();
    craft_zip(
        &path,
        &[
            ("mimetype", MIMETYPE_ASIC_S.as_bytes()),
            ("doc.txt", b"just a file"),
        ],
    );

    let err = AsicContainer::open(&path).unwrap_err();
    assert!(matches!(err, Error::NoSeals), "{err}");
}

#[test]
fn archive_without_data_object_fails_to_open() {
    let (_dir, path) = workdir();
    craft_zip(
        &path,
        &[
            ("mimetype", MIMETYPE_ASIC_S.as_bytes()),
            ("META-INF/timestamp.tst", b"token"),
        ],
    );

    let err = AsicContainer::open(&path).unwrap_err();
    assert!(matches!(err, Error::NoDataObjects), "{err}");
}

#[test]
fn two_primary_seal_entries_fail_to_open() {
    let (_dir, path) = workdir();
    craft_zip(
        &path,
        &[
            ("mimetype", MIMETYPE_ASIC_S.as_bytes()),
            ("doc.txt", b"payload"),
            ("META-INF/timestamp.tst", b"token"),
            (
                "META-INF/signatures.xml",
                b"<ds:Signature xmlns:ds=\"http://www.w3.org/2000/09/xmldsig#\"/>",
            ),
        ],
    );

    let err = AsicContainer::open(&path).unwrap_err();
    assert!(matches!(err, Error::PrimarySealExists { .. }), "{err}");
}

#[test]
fn subfolder_entry_fails_to_open_naming_the_directory() {
    let (_dir, path) = workdir();
    craft_zip(
        &path,
        &[
            ("mimetype", MIMETYPE_ASIC_S.as_bytes()),
            ("sub/doc.txt", b"nested"),
            ("META-INF/timestamp.tst", b"token"),
        ],
    );

    match AsicContainer::open(&path).unwrap_err() {
        Error::SubfolderNotSupported { directory } => assert_eq!(directory, "sub"),
        other => panic!("unexpected error {other}"),
    }
}

#[test]
fn second_top_level_file_fails_to_open() {
    let (_dir, path) = workdir();
    craft_zip(
        &path,
        &[
            ("mimetype", MIMETYPE_ASIC_S.as_bytes()),
            ("a.txt", b"one"),
            ("b.txt", b"two"),
            ("META-INF/timestamp.tst", b"token"),
        ],
    );

    let err = AsicContainer::open(&path).unwrap_err();
    assert!(matches!(err, Error::DataObjectExists), "{err}");
}

#[test]
fn unknown_meta_inf_entries_are_ignored() {
    let (_dir, path) = workdir();
    craft_zip(
        &path,
        &[
            ("mimetype", MIMETYPE_ASIC_S.as_bytes()),
            ("doc.txt", b"payload"),
            ("META-INF/timestamp.tst", b"token"),
            ("META-INF/metadata.xml", b"<aux/>"),
        ],
    );

    let container = AsicContainer::open(&path).unwrap();
    assert_eq!(container.seals().len(), 1);
    assert_eq!(container.metadata().len(), 1);
}

#[test]
fn primary_seal_roundtrip() {
    let (_dir, path) = workdir();

    let mut container = AsicContainer::create();
    container
        .add_data_object("report.pdf", "application/pdf", b"%PDF-1.7 body".to_vec())
        .unwrap();
    container.sign(&StubSealer).unwrap();
    container.save(&path).unwrap();

    let reopened = AsicContainer::open(&path).unwrap();
    assert_eq!(reopened.seals().len(), 1);
    let data_object = reopened.data_object().unwrap();
    assert_eq!(data_object.name(), "report.pdf");
    assert_eq!(data_object.data(), b"%PDF-1.7 body");
    assert_eq!(
        reopened.metadata().iter().map(|e| e.name()).collect::<Vec<_>>(),
        [TIMESTAMP_ENTRY]
    );
}

#[test]
fn chain_grows_append_only_across_saves() {
    let (_dir, path) = workdir();

    // First seal: bare token, no manifest.
    let mut container = AsicContainer::create();
    container
        .add_data_object("report.pdf", "application/pdf", b"%PDF-1.7 body".to_vec())
        .unwrap();
    container.sign(&StubSealer).unwrap();
    container.save(&path).unwrap();

    // Second seal: first extension manifest appears.
    let mut container = AsicContainer::open(&path).unwrap();
    container.sign(&StubSealer).unwrap();
    assert_eq!(container.seals().len(), 2);
    let names: Vec<_> = container.metadata().iter().map(|e| e.name().to_string()).collect();
    assert_eq!(
        names,
        [TIMESTAMP_ENTRY, MANIFEST_ENTRY, "META-INF/timestamp001.tst"]
    );
    container.save(&path).unwrap();

    // Third seal: the tip is retired, never deleted.
    let mut container = AsicContainer::open(&path).unwrap();
    assert_eq!(container.seals().len(), 2);
    container.sign(&StubSealer).unwrap();
    assert_eq!(container.seals().len(), 3);
    let names: Vec<_> = container.metadata().iter().map(|e| e.name().to_string()).collect();
    assert_eq!(
        names,
        [
            TIMESTAMP_ENTRY,
            "META-INF/ASiCArchiveManifest001.xml",
            "META-INF/timestamp001.tst",
            MANIFEST_ENTRY,
            "META-INF/timestamp002.tst",
        ]
    );
    container.save(&path).unwrap();

    // Fourth seal after reopen: the tip now references two retired
    // manifests as root files, which exercises the skip of already
    // resolved manifests during recursive resolution.
    let mut container = AsicContainer::open(&path).unwrap();
    assert_eq!(container.seals().len(), 3);
    container.sign(&StubSealer).unwrap();
    container.save(&path).unwrap();

    let reopened = AsicContainer::open(&path).unwrap();
    assert_eq!(reopened.seals().len(), 4);
    let names: Vec<_> = reopened.metadata().iter().map(|e| e.name().to_string()).collect();
    assert_eq!(
        names,
        [
            TIMESTAMP_ENTRY,
            "META-INF/ASiCArchiveManifest001.xml",
            "META-INF/timestamp001.tst",
            "META-INF/ASiCArchiveManifest002.xml",
            "META-INF/timestamp002.tst",
            MANIFEST_ENTRY,
            "META-INF/timestamp003.tst",
        ]
    );

    // Trust order survives the roundtrip: primary first, then extensions
    // bound to their manifests.
    match &reopened.seals()[0] {
        Seal::Timestamp(seal) => assert_eq!(seal.covered_manifest(), None),
        other => panic!("unexpected seal {other:?}"),
    }
    match &reopened.seals()[3] {
        Seal::Timestamp(seal) => assert_eq!(seal.covered_manifest(), Some(MANIFEST_ENTRY)),
        other => panic!("unexpected seal {other:?}"),
    }
}

#[test]
fn reopened_manifest_digests_verify() {
    let (_dir, path) = workdir();

    let mut container = AsicContainer::create();
    container
        .add_data_object("data.bin", "application/octet-stream", vec![0u8; 1024])
        .unwrap();
    container.sign(&StubSealer).unwrap();
    container.sign(&StubSealer).unwrap();
    container.sign(&StubSealer).unwrap();
    container.save(&path).unwrap();

    let reopened = AsicContainer::open(&path).unwrap();
    let tip = reopened
        .metadata()
        .iter()
        .find(|entry| entry.name() == MANIFEST_ENTRY)
        .unwrap();
    let document = ArchiveManifest::parse(MANIFEST_ENTRY, tip.data()).unwrap();

    for reference in document.references() {
        let expected = if reference.uri == "data.bin" {
            reopened
                .data_object()
                .unwrap()
                .digest(reference.digest.algorithm())
        } else {
            reopened
                .file_digest(&reference.uri, reference.digest.algorithm())
                .unwrap()
        };
        assert_eq!(
            reference.digest, expected,
            "stored digest must match recomputation for {}",
            reference.uri
        );
    }
}

#[test]
fn lta_primary_opens_extends_but_does_not_save() {
    let (_dir, path) = workdir();
    let signatures = "<asic:XAdESSignatures xmlns:asic=\"http://uri.etsi.org/02918/v1.2.1#\" \
         xmlns:ds=\"http://www.w3.org/2000/09/xmldsig#\">\
         <ds:Signature Id=\"S0\"><ds:SignatureValue>a</ds:SignatureValue></ds:Signature>\
         <ds:Signature Id=\"S1\"><ds:SignatureValue>b</ds:SignatureValue></ds:Signature>\
         </asic:XAdESSignatures>";
    craft_zip(
        &path,
        &[
            ("mimetype", MIMETYPE_ASIC_S.as_bytes()),
            ("doc.txt", b"payload"),
            ("META-INF/signatures.xml", signatures.as_bytes()),
        ],
    );

    let mut container = AsicContainer::open(&path).unwrap();
    assert_eq!(container.seals().len(), 2);
    assert!(container
        .seals()
        .iter()
        .all(|seal| seal.profile() == SealProfile::XadesLta));

    // Chain extension over an archival primary produces a timestamp seal.
    container.sign(&StubSealer).unwrap();
    assert_eq!(container.seals().len(), 3);
    assert_eq!(
        container.seals()[2].profile(),
        SealProfile::TimestampToken
    );

    // Persisting is still guarded by the first seal's profile.
    let out = path.with_extension("out.asics");
    let err = container.save(&out).unwrap_err();
    assert!(matches!(err, Error::ProfileMismatch { .. }), "{err}");
}

#[test]
fn failed_save_leaves_existing_archive_intact() {
    let (_dir, path) = workdir();
    let signatures = "<asic:XAdESSignatures xmlns:asic=\"http://uri.etsi.org/02918/v1.2.1#\" \
         xmlns:ds=\"http://www.w3.org/2000/09/xmldsig#\">\
         <ds:Signature Id=\"S0\"><ds:SignatureValue>a</ds:SignatureValue></ds:Signature>\
         </asic:XAdESSignatures>";
    craft_zip(
        &path,
        &[
            ("mimetype", MIMETYPE_ASIC_S.as_bytes()),
            ("doc.txt", b"payload"),
            ("META-INF/signatures.xml", signatures.as_bytes()),
        ],
    );
    let original = std::fs::read(&path).unwrap();

    // Saving back over the opened archive must reject the archival-primary
    // chain without touching the file on disk.
    let container = AsicContainer::open(&path).unwrap();
    let err = container.save(&path).unwrap_err();
    assert!(matches!(err, Error::ProfileMismatch { .. }), "{err}");
    assert_eq!(
        std::fs::read(&path).unwrap(),
        original,
        "a failed save must leave the archive byte-identical"
    );
}

#[test]
fn self_referencing_manifest_terminates() {
    let (_dir, path) = workdir();
    // Hostile input: the tip manifest lists itself as its own root file.
    let manifest = "<asic:ASiCManifest xmlns:asic=\"http://uri.etsi.org/02918/v1.2.1#\" \
         xmlns:ds=\"http://www.w3.org/2000/09/xmldsig#\">\
         <asic:SigReference MimeType=\"application/vnd.etsi.timestamp-token\" \
         URI=\"META-INF/timestamp001.tst\"/>\
         <asic:DataObjectReference MimeType=\"text/xml\" \
         URI=\"META-INF/ASiCArchiveManifest.xml\" Rootfile=\"true\">\
         <ds:DigestMethod Algorithm=\"http://www.w3.org/2001/04/xmlenc#sha256\"/>\
         <ds:DigestValue>47DEQpj8HBSa+/TImW+5JCeuQeRkm5NMpJWZG3hSuFU=</ds:DigestValue>\
         </asic:DataObjectReference>\
         </asic:ASiCManifest>";
    craft_zip(
        &path,
        &[
            ("mimetype", MIMETYPE_ASIC_S.as_bytes()),
            ("doc.txt", b"payload"),
            ("META-INF/ASiCArchiveManifest.xml", manifest.as_bytes()),
            ("META-INF/timestamp001.tst", b"token"),
        ],
    );

    // Must not loop or blow the stack; the cycle collapses into one seal.
    let container = AsicContainer::open(&path).unwrap();
    assert_eq!(container.seals().len(), 1);
}

#[test]
fn detection_recognizes_saved_containers() {
    let (dir, path) = workdir();

    let mut container = AsicContainer::create();
    container
        .add_data_object("doc.txt", "text/plain", b"x".to_vec())
        .unwrap();
    container.sign(&StubSealer).unwrap();

    // No hint from the .zip extension; detection probes the content.
    let unhinted = dir.path().join("container.zip");
    container.save(&unhinted).unwrap();
    assert!(asic_container::is_simple_format(&unhinted));

    container.save(&path).unwrap();
    assert!(asic_container::is_simple_format(&path));
}
