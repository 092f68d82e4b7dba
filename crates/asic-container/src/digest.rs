//! Digest provider: hash algorithms and their canonical XML-DSIG URIs.
//!
//! Manifest references carry the algorithm as a URI (`ds:DigestMethod`) and
//! the value base64-encoded (`ds:DigestValue`), so both renderings live here
//! next to the raw computation.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use sha2::{Digest as _, Sha256, Sha384, Sha512};
use std::fmt;

/// Hash algorithms accepted in archive manifests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DigestAlgorithm {
    /// SHA-256 (default for new manifests).
    #[default]
    Sha256,
    /// SHA-384.
    Sha384,
    /// SHA-512.
    Sha512,
}

impl DigestAlgorithm {
    /// All supported algorithms, in preference order.
    pub const ALL: [DigestAlgorithm; 3] = [Self::Sha256, Self::Sha384, Self::Sha512];

    /// Canonical algorithm URI used in `ds:DigestMethod/@Algorithm`.
    pub const fn uri(self) -> &'static str {
        match self {
            Self::Sha256 => "http://www.w3.org/2001/04/xmlenc#sha256",
            Self::Sha384 => "http://www.w3.org/2001/04/xmldsig-more#sha384",
            Self::Sha512 => "http://www.w3.org/2001/04/xmlenc#sha512",
        }
    }

    /// Reverse lookup from a manifest's algorithm URI.
    pub fn from_uri(uri: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|alg| alg.uri() == uri)
    }

    /// One-shot digest over a byte slice.
    pub fn digest(self, data: &[u8]) -> Digest {
        let mut hasher = self.hasher();
        hasher.update(data);
        hasher.finish()
    }

    /// Incremental hasher for updateable byte input.
    pub fn hasher(self) -> DigestHasher {
        let inner = match self {
            Self::Sha256 => Inner::Sha256(Sha256::new()),
            Self::Sha384 => Inner::Sha384(Sha384::new()),
            Self::Sha512 => Inner::Sha512(Sha512::new()),
        };
        DigestHasher {
            algorithm: self,
            inner,
        }
    }
}

impl fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sha256 => write!(f, "SHA-256"),
            Self::Sha384 => write!(f, "SHA-384"),
            Self::Sha512 => write!(f, "SHA-512"),
        }
    }
}

/// Algorithm identifier plus raw hash value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Digest {
    algorithm: DigestAlgorithm,
    value: Vec<u8>,
}

impl Digest {
    /// Construct from a precomputed value (e.g. a parsed manifest reference).
    pub fn new(algorithm: DigestAlgorithm, value: Vec<u8>) -> Self {
        Self { algorithm, value }
    }

    /// Algorithm this value was computed with.
    pub fn algorithm(&self) -> DigestAlgorithm {
        self.algorithm
    }

    /// Raw hash value.
    pub fn value(&self) -> &[u8] {
        &self.value
    }

    /// Base64 rendering for `ds:DigestValue` content.
    pub fn to_base64(&self) -> String {
        BASE64.encode(&self.value)
    }

    /// Parse a `ds:DigestValue` text node.
    pub fn from_base64(algorithm: DigestAlgorithm, text: &str) -> Option<Self> {
        let value = BASE64.decode(text.trim()).ok()?;
        Some(Self { algorithm, value })
    }

    /// Hex rendering for log and error messages.
    pub fn to_hex(&self) -> String {
        hex::encode(&self.value)
    }
}

enum Inner {
    Sha256(Sha256),
    Sha384(Sha384),
    Sha512(Sha512),
}

/// Incremental digest over arbitrary updateable byte input.
pub struct DigestHasher {
    algorithm: DigestAlgorithm,
    inner: Inner,
}

impl DigestHasher {
    /// Feed more bytes into the hash.
    pub fn update(&mut self, data: &[u8]) {
        match &mut self.inner {
            Inner::Sha256(h) => h.update(data),
            Inner::Sha384(h) => h.update(data),
            Inner::Sha512(h) => h.update(data),
        }
    }

    /// Finalize into a [`Digest`].
    pub fn finish(self) -> Digest {
        let value = match self.inner {
            Inner::Sha256(h) => h.finalize().to_vec(),
            Inner::Sha384(h) => h.finalize().to_vec(),
            Inner::Sha512(h) => h.finalize().to_vec(),
        };
        Digest {
            algorithm: self.algorithm,
            value,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uri_roundtrip_for_all_algorithms() {
        for alg in DigestAlgorithm::ALL {
            assert_eq!(DigestAlgorithm::from_uri(alg.uri()), Some(alg));
        }
        assert_eq!(
            DigestAlgorithm::from_uri("http://www.w3.org/2001/04/xmlenc#md5"),
            None
        );
    }

    #[test]
    fn sha256_known_vector() {
        // sha256("") is the canonical empty-input vector.
        let digest = DigestAlgorithm::Sha256.digest(b"");
        assert_eq!(
            digest.to_hex(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn incremental_matches_one_shot() {
        for alg in DigestAlgorithm::ALL {
            let mut hasher = alg.hasher();
            hasher.update(b"hello ");
            hasher.update(b"world");
            assert_eq!(hasher.finish(), alg.digest(b"hello world"));
        }
    }

    #[test]
    fn base64_roundtrip() {
        let digest = DigestAlgorithm::Sha512.digest(b"payload");
        let parsed = Digest::from_base64(DigestAlgorithm::Sha512, &digest.to_base64()).unwrap();
        assert_eq!(parsed, digest);
    }

    #[test]
    fn base64_rejects_garbage() {
        assert!(Digest::from_base64(DigestAlgorithm::Sha256, "not base64!!!").is_none());
    }
}
