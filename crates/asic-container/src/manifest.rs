//! Archive manifest documents (`ASiCArchiveManifest*.xml`).
//!
//! A manifest lists everything one extension seal covers: the data object,
//! every earlier metadata entry (tokens, signatures documents, retired
//! manifests) and exactly one `SigReference` naming the time-stamp token
//! that seals the manifest itself. Digest method and value are carried in
//! the XML-DSIG namespace bound with prefix `ds`.
//!
//! Parsing performs structural validation in place of full XSD validation:
//! root element name and namespace, exactly one `SigReference`, and a
//! complete digest (known method URI + decodable value) on every
//! `DataObjectReference`.

use crate::digest::{Digest, DigestAlgorithm};
use crate::error::{Error, Result};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::name::{Namespace, ResolveResult};
use quick_xml::{NsReader, Writer};
use std::io::Cursor;

/// ASiC manifest namespace (ETSI EN 319 162-1).
pub const ASIC_NS: &str = "http://uri.etsi.org/02918/v1.2.1#";
/// XML digital signature namespace, bound with prefix `ds`.
pub const DSIG_NS: &str = "http://www.w3.org/2000/09/xmldsig#";

const ROOT_ELEMENT: &str = "ASiCManifest";

/// The manifest's single signature reference: the token that seals it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigReference {
    /// Archive path of the time-stamp token.
    pub uri: String,
    /// Declared media type of the token.
    pub mime_type: String,
}

/// One covered object: URI, media type, root flag and digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataObjectReference {
    /// Archive path of the covered entry.
    pub uri: String,
    /// Declared media type of the covered entry.
    pub mime_type: String,
    /// `Rootfile="true"` marks a retired manifest that must be resolved
    /// before this manifest is accepted.
    pub rootfile: bool,
    /// Digest over the covered entry's bytes.
    pub digest: Digest,
}

/// In-memory archive manifest document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveManifest {
    sig_reference: SigReference,
    references: Vec<DataObjectReference>,
}

impl ArchiveManifest {
    /// Start a manifest around its signature reference.
    pub fn new(sig_reference: SigReference) -> Self {
        Self {
            sig_reference,
            references: Vec::new(),
        }
    }

    /// Append a data-object reference; order is preserved into the XML.
    pub fn push_reference(&mut self, reference: DataObjectReference) {
        self.references.push(reference);
    }

    /// The single signature reference.
    pub fn sig_reference(&self) -> &SigReference {
        &self.sig_reference
    }

    /// All data-object references, in document order.
    pub fn references(&self) -> &[DataObjectReference] {
        &self.references
    }

    /// References flagged `Rootfile="true"`, in document order.
    pub fn root_references(&self) -> impl Iterator<Item = &DataObjectReference> {
        self.references.iter().filter(|r| r.rootfile)
    }

    /// Serialize to UTF-8 XML bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);
        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

        let mut root = BytesStart::new(format!("asic:{ROOT_ELEMENT}"));
        root.push_attribute(("xmlns:asic", ASIC_NS));
        root.push_attribute(("xmlns:ds", DSIG_NS));
        writer.write_event(Event::Start(root))?;

        let mut sig = BytesStart::new("asic:SigReference");
        sig.push_attribute(("MimeType", self.sig_reference.mime_type.as_str()));
        sig.push_attribute(("URI", self.sig_reference.uri.as_str()));
        writer.write_event(Event::Empty(sig))?;

        for reference in &self.references {
            let mut element = BytesStart::new("asic:DataObjectReference");
            element.push_attribute(("MimeType", reference.mime_type.as_str()));
            element.push_attribute(("URI", reference.uri.as_str()));
            if reference.rootfile {
                element.push_attribute(("Rootfile", "true"));
            }
            writer.write_event(Event::Start(element))?;

            let mut method = BytesStart::new("ds:DigestMethod");
            method.push_attribute(("Algorithm", reference.digest.algorithm().uri()));
            writer.write_event(Event::Empty(method))?;

            let value = reference.digest.to_base64();
            writer.write_event(Event::Start(BytesStart::new("ds:DigestValue")))?;
            writer.write_event(Event::Text(BytesText::new(&value)))?;
            writer.write_event(Event::End(BytesEnd::new("ds:DigestValue")))?;

            writer.write_event(Event::End(BytesEnd::new("asic:DataObjectReference")))?;
        }

        writer.write_event(Event::End(BytesEnd::new(format!("asic:{ROOT_ELEMENT}"))))?;
        Ok(writer.into_inner().into_inner())
    }

    /// Parse and structurally validate manifest bytes.
    ///
    /// `entry_name` is only used to label errors with the archive path the
    /// document came from.
    pub fn parse(entry_name: &str, bytes: &[u8]) -> Result<Self> {
        let malformed = |reason: String| Error::MalformedManifest {
            entry: entry_name.to_string(),
            reason,
        };

        let mut reader = NsReader::from_reader(bytes);
        let mut buf = Vec::new();

        let mut root_seen = false;
        let mut sig_reference: Option<SigReference> = None;
        let mut references: Vec<DataObjectReference> = Vec::new();
        let mut pending: Option<PendingReference> = None;
        let mut in_digest_value = false;

        loop {
            buf.clear();
            match reader.read_resolved_event_into(&mut buf)? {
                (ns, Event::Start(element)) | (ns, Event::Empty(element)) => {
                    let local = element.local_name();
                    match local.as_ref() {
                        b"ASiCManifest" => {
                            if !in_namespace(&ns, ASIC_NS) {
                                return Err(malformed(format!(
                                    "root element is not in the {ASIC_NS} namespace"
                                )));
                            }
                            root_seen = true;
                        }
                        b"SigReference" if in_namespace(&ns, ASIC_NS) => {
                            if !root_seen {
                                return Err(malformed("SigReference outside ASiCManifest".into()));
                            }
                            if sig_reference.is_some() {
                                return Err(malformed("more than one SigReference".into()));
                            }
                            let uri = required_attribute(&element, "URI")
                                .ok_or_else(|| malformed("SigReference without URI".into()))??;
                            let mime_type = required_attribute(&element, "MimeType").ok_or_else(
                                || malformed("SigReference without MimeType".into()),
                            )??;
                            sig_reference = Some(SigReference { uri, mime_type });
                        }
                        b"DataObjectReference" if in_namespace(&ns, ASIC_NS) => {
                            let uri = required_attribute(&element, "URI").ok_or_else(|| {
                                malformed("DataObjectReference without URI".into())
                            })??;
                            let mime_type = required_attribute(&element, "MimeType").ok_or_else(
                                || malformed("DataObjectReference without MimeType".into()),
                            )??;
                            let rootfile = matches!(
                                attribute(&element, "Rootfile")?.as_deref(),
                                Some("true")
                            );
                            if pending.is_some() {
                                return Err(malformed("nested DataObjectReference".into()));
                            }
                            pending = Some(PendingReference {
                                uri,
                                mime_type,
                                rootfile,
                                method: None,
                                value_text: None,
                            });
                        }
                        b"DigestMethod" if in_namespace(&ns, DSIG_NS) => {
                            let reference = pending.as_mut().ok_or_else(|| {
                                malformed("DigestMethod outside DataObjectReference".into())
                            })?;
                            let algorithm_uri = required_attribute(&element, "Algorithm")
                                .ok_or_else(|| {
                                    malformed("DigestMethod without Algorithm".into())
                                })??;
                            let algorithm =
                                DigestAlgorithm::from_uri(&algorithm_uri).ok_or_else(|| {
                                    malformed(format!(
                                        "unsupported digest algorithm '{algorithm_uri}'"
                                    ))
                                })?;
                            reference.method = Some(algorithm);
                        }
                        b"DigestValue" if in_namespace(&ns, DSIG_NS) => {
                            if pending.is_none() {
                                return Err(malformed(
                                    "DigestValue outside DataObjectReference".into(),
                                ));
                            }
                            in_digest_value = true;
                        }
                        // Auxiliary elements (e.g. extension points) are ignored.
                        _ => {}
                    }
                }
                (_, Event::Text(text)) if in_digest_value => {
                    let value = text.unescape().map_err(quick_xml::Error::from)?;
                    if let Some(reference) = pending.as_mut() {
                        reference.value_text = Some(value.into_owned());
                    }
                }
                (ns, Event::End(element)) => match element.local_name().as_ref() {
                    b"DigestValue" if in_namespace(&ns, DSIG_NS) => in_digest_value = false,
                    b"DataObjectReference" if in_namespace(&ns, ASIC_NS) => {
                        let reference = pending
                            .take()
                            .ok_or_else(|| malformed("unbalanced DataObjectReference".into()))?;
                        references.push(reference.finish(&malformed)?);
                    }
                    _ => {}
                },
                (_, Event::Eof) => break,
                _ => {}
            }
        }

        if !root_seen {
            return Err(malformed(format!("missing {ROOT_ELEMENT} root element")));
        }
        let sig_reference =
            sig_reference.ok_or_else(|| malformed("missing SigReference".into()))?;
        Ok(Self {
            sig_reference,
            references,
        })
    }
}

struct PendingReference {
    uri: String,
    mime_type: String,
    rootfile: bool,
    method: Option<DigestAlgorithm>,
    value_text: Option<String>,
}

impl PendingReference {
    fn finish(self, malformed: &dyn Fn(String) -> Error) -> Result<DataObjectReference> {
        let method = self
            .method
            .ok_or_else(|| malformed(format!("reference '{}' without DigestMethod", self.uri)))?;
        let value_text = self
            .value_text
            .ok_or_else(|| malformed(format!("reference '{}' without DigestValue", self.uri)))?;
        let digest = Digest::from_base64(method, &value_text).ok_or_else(|| {
            malformed(format!("reference '{}' has an invalid DigestValue", self.uri))
        })?;
        Ok(DataObjectReference {
            uri: self.uri,
            mime_type: self.mime_type,
            rootfile: self.rootfile,
            digest,
        })
    }
}

/// One `ds:Signature` element found in a signatures document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureRef {
    /// `Id` attribute, if the element declares one.
    pub id: Option<String>,
}

/// Enumerate the signature elements of `META-INF/signatures.xml`.
///
/// The chain only needs to know how many seals the document carries and how
/// each is addressed; XAdES semantics beyond that stay with the signature
/// collaborator.
pub fn signature_elements(bytes: &[u8]) -> Result<Vec<SignatureRef>> {
    let mut reader = NsReader::from_reader(bytes);
    let mut buf = Vec::new();
    let mut found = Vec::new();

    loop {
        buf.clear();
        match reader.read_resolved_event_into(&mut buf)? {
            (ns, Event::Start(element)) | (ns, Event::Empty(element)) => {
                if element.local_name().as_ref() == b"Signature" && in_namespace(&ns, DSIG_NS) {
                    found.push(SignatureRef {
                        id: attribute(&element, "Id")?,
                    });
                }
            }
            (_, Event::Eof) => break,
            _ => {}
        }
    }
    Ok(found)
}

fn in_namespace(ns: &ResolveResult<'_>, expected: &str) -> bool {
    matches!(ns, ResolveResult::Bound(Namespace(n)) if *n == expected.as_bytes())
}

fn attribute(element: &BytesStart<'_>, name: &str) -> Result<Option<String>> {
    match element
        .try_get_attribute(name)
        .map_err(quick_xml::Error::from)?
    {
        Some(attr) => Ok(Some(
            attr.unescape_value()
                .map_err(quick_xml::Error::from)?
                .into_owned(),
        )),
        None => Ok(None),
    }
}

fn required_attribute(element: &BytesStart<'_>, name: &str) -> Option<Result<String>> {
    attribute(element, name).transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_manifest() -> ArchiveManifest {
        let mut manifest = ArchiveManifest::new(SigReference {
            uri: "META-INF/timestamp001.tst".into(),
            mime_type: "application/vnd.etsi.timestamp-token".into(),
        });
        manifest.push_reference(DataObjectReference {
            uri: "report.pdf".into(),
            mime_type: "application/octet-stream".into(),
            rootfile: false,
            digest: DigestAlgorithm::Sha256.digest(b"%PDF-1.7 payload"),
        });
        manifest.push_reference(DataObjectReference {
            uri: "META-INF/ASiCArchiveManifest001.xml".into(),
            mime_type: "text/xml".into(),
            rootfile: true,
            digest: DigestAlgorithm::Sha512.digest(b"<asic:ASiCManifest/>"),
        });
        manifest
    }

    #[test]
    fn serialize_parse_roundtrip() {
        let manifest = sample_manifest();
        let bytes = manifest.to_bytes().unwrap();
        let parsed = ArchiveManifest::parse("META-INF/ASiCArchiveManifest.xml", &bytes).unwrap();
        assert_eq!(parsed, manifest);
    }

    #[test]
    fn root_references_are_filtered_in_order() {
        let manifest = sample_manifest();
        let roots: Vec<_> = manifest.root_references().map(|r| r.uri.as_str()).collect();
        assert_eq!(roots, ["META-INF/ASiCArchiveManifest001.xml"]);
    }

    #[test]
    fn digest_namespace_uses_ds_prefix() {
        let bytes = sample_manifest().to_bytes().unwrap();
        let xml = String::from_utf8(bytes).unwrap();
        assert!(xml.contains("<ds:DigestMethod"));
        assert!(xml.contains("<ds:DigestValue>"));
        assert!(xml.contains(&format!("xmlns:ds=\"{DSIG_NS}\"")));
    }

    #[test]
    fn missing_sig_reference_fails() {
        let xml = format!("<asic:ASiCManifest xmlns:asic=\"{ASIC_NS}\"/>");
        let err = ArchiveManifest::parse("m.xml", xml.as_bytes()).unwrap_err();
        assert!(err.to_string().contains("missing SigReference"), "{err}");
    }

    #[test]
    fn duplicate_sig_reference_fails() {
        let xml = format!(
            "<asic:ASiCManifest xmlns:asic=\"{ASIC_NS}\">\
             <asic:SigReference MimeType=\"t\" URI=\"a\"/>\
             <asic:SigReference MimeType=\"t\" URI=\"b\"/>\
             </asic:ASiCManifest>"
        );
        let err = ArchiveManifest::parse("m.xml", xml.as_bytes()).unwrap_err();
        assert!(err.to_string().contains("more than one SigReference"), "{err}");
    }

    #[test]
    fn wrong_root_namespace_fails() {
        let xml = "<ASiCManifest xmlns=\"urn:wrong\"/>";
        let err = ArchiveManifest::parse("m.xml", xml.as_bytes()).unwrap_err();
        assert!(matches!(err, Error::MalformedManifest { .. }));
    }

    #[test]
    fn unknown_digest_algorithm_fails() {
        let xml = format!(
            "<asic:ASiCManifest xmlns:asic=\"{ASIC_NS}\" xmlns:ds=\"{DSIG_NS}\">\
             <asic:SigReference MimeType=\"t\" URI=\"a\"/>\
             <asic:DataObjectReference MimeType=\"t\" URI=\"doc.txt\">\
             <ds:DigestMethod Algorithm=\"http://www.w3.org/2001/04/xmlenc#md5\"/>\
             <ds:DigestValue>AA==</ds:DigestValue>\
             </asic:DataObjectReference>\
             </asic:ASiCManifest>"
        );
        let err = ArchiveManifest::parse("m.xml", xml.as_bytes()).unwrap_err();
        assert!(err.to_string().contains("unsupported digest algorithm"), "{err}");
    }

    #[test]
    fn reference_without_digest_fails() {
        let xml = format!(
            "<asic:ASiCManifest xmlns:asic=\"{ASIC_NS}\">\
             <asic:SigReference MimeType=\"t\" URI=\"a\"/>\
             <asic:DataObjectReference MimeType=\"t\" URI=\"doc.txt\">\
             </asic:DataObjectReference>\
             </asic:ASiCManifest>"
        );
        let err = ArchiveManifest::parse("m.xml", xml.as_bytes()).unwrap_err();
        assert!(err.to_string().contains("without DigestMethod"), "{err}");
    }

    #[test]
    fn scans_signature_elements_with_ids() {
        let xml = format!(
            "<asic:XAdESSignatures xmlns:asic=\"{ASIC_NS}\" xmlns:ds=\"{DSIG_NS}\">\
             <ds:Signature Id=\"S0\"><ds:SignatureValue>x</ds:SignatureValue></ds:Signature>\
             <ds:Signature><ds:SignatureValue>y</ds:SignatureValue></ds:Signature>\
             </asic:XAdESSignatures>"
        );
        let found = signature_elements(xml.as_bytes()).unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].id.as_deref(), Some("S0"));
        assert_eq!(found[1].id, None);
    }
}
