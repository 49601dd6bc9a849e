//! Content-addressed document digests.

use sha2::{Digest, Sha256};

use crate::error::Result;
use crate::models::signed_document::DocumentType;

/// Size of a document digest in bytes.
pub const DIGEST_SIZE: usize = 32;

const DOMAIN_TAG: &[u8] = b"medsign.document.v1";

/// SHA-256 digest of a document's canonical content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DocumentDigest([u8; DIGEST_SIZE]);

impl DocumentDigest {
    pub fn as_bytes(&self) -> &[u8; DIGEST_SIZE] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

/// Stateless hasher for canonical document content.
pub struct DocumentHasher;

impl DocumentHasher {
    /// Hashes `content` exactly as given, after checking it is canonical for
    /// `document_type`.
    ///
    /// The type tag is part of the hashed input, so identical bytes signed as
    /// two different document types never share a digest.
    pub fn hash(document_type: DocumentType, content: &[u8]) -> Result<DocumentDigest> {
        let canonical = document_type.canonicalize(content)?;

        let mut hasher = Sha256::new();
        hasher.update(DOMAIN_TAG);
        hasher.update([0u8]);
        hasher.update(document_type.as_str().as_bytes());
        hasher.update([0u8]);
        hasher.update(canonical);

        Ok(DocumentDigest(hasher.finalize().into()))
    }

    /// Plain SHA-256 of arbitrary bytes, hex encoded.
    pub fn sha256_hex(bytes: &[u8]) -> String {
        hex::encode(Sha256::digest(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashing_is_deterministic() {
        let a = DocumentHasher::hash(DocumentType::Prescription, b"Dipirona 1g").unwrap();
        let b = DocumentHasher::hash(DocumentType::Prescription, b"Dipirona 1g").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.to_hex().len(), DIGEST_SIZE * 2);
    }

    #[test]
    fn single_byte_change_changes_digest() {
        let original = DocumentHasher::hash(DocumentType::Prescription, b"Dipirona 1g 6/6h").unwrap();
        let altered = DocumentHasher::hash(DocumentType::Prescription, b"Dipirona 2g 6/6h").unwrap();
        assert_ne!(original, altered);
    }

    #[test]
    fn document_type_is_bound_into_digest() {
        let prescription = DocumentHasher::hash(DocumentType::Prescription, b"same").unwrap();
        let referral = DocumentHasher::hash(DocumentType::Referral, b"same").unwrap();
        assert_ne!(prescription, referral);
    }

    #[test]
    fn line_endings_are_never_normalized() {
        let lf = DocumentHasher::hash(DocumentType::Generic, b"a\nb").unwrap();
        let cr = DocumentHasher::hash(DocumentType::Generic, b"a\rb").unwrap();
        assert_ne!(lf, cr);

        assert!(DocumentHasher::hash(DocumentType::MedicalCertificate, b"a\rb").is_err());
        assert!(DocumentHasher::hash(DocumentType::MedicalCertificate, b"a\r\nb").is_err());
    }
}
