use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use postgres_types::{FromSql, ToSql};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AppError, Result};

/// What a document type accepts as canonical content.
///
/// Content is never rewritten; whatever is accepted is hashed byte for byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CanonicalForm {
    /// UTF-8 text with `\n` line endings and no byte order mark.
    Utf8Text,
    /// Bytes are hashed exactly as given.
    Raw,
}

/// The kinds of clinical documents that can be signed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSql, FromSql)]
#[serde(rename_all = "snake_case")]
#[postgres(name = "document_type")]
pub enum DocumentType {
    #[postgres(name = "prescription")]
    Prescription,
    #[postgres(name = "medical_certificate")]
    MedicalCertificate,
    #[postgres(name = "referral")]
    Referral,
    #[postgres(name = "exam_request")]
    ExamRequest,
    #[postgres(name = "generic")]
    Generic,
}

impl DocumentType {
    pub const ALL: [DocumentType; 5] = [
        DocumentType::Prescription,
        DocumentType::MedicalCertificate,
        DocumentType::Referral,
        DocumentType::ExamRequest,
        DocumentType::Generic,
    ];

    /// The wire and storage tag of this type.
    pub fn as_str(self) -> &'static str {
        match self {
            DocumentType::Prescription => "prescription",
            DocumentType::MedicalCertificate => "medical_certificate",
            DocumentType::Referral => "referral",
            DocumentType::ExamRequest => "exam_request",
            DocumentType::Generic => "generic",
        }
    }

    pub fn canonical_form(self) -> CanonicalForm {
        match self {
            DocumentType::Prescription
            | DocumentType::MedicalCertificate
            | DocumentType::Referral
            | DocumentType::ExamRequest => CanonicalForm::Utf8Text,
            DocumentType::Generic => CanonicalForm::Raw,
        }
    }

    /// Checks that `content` is already in this type's canonical form and
    /// returns it unchanged.
    pub fn canonicalize(self, content: &[u8]) -> Result<&[u8]> {
        if content.is_empty() {
            return Err(AppError::Validation("Document content cannot be empty".to_string()));
        }

        match self.canonical_form() {
            CanonicalForm::Raw => Ok(content),
            CanonicalForm::Utf8Text => {
                let text = std::str::from_utf8(content).map_err(|_| {
                    AppError::Validation(format!("{} content must be UTF-8 text", self.as_str()))
                })?;

                if text.starts_with('\u{feff}') {
                    return Err(AppError::Validation(format!(
                        "{} content must not start with a byte order mark",
                        self.as_str()
                    )));
                }
                if text.contains('\r') {
                    return Err(AppError::Validation(format!(
                        "{} content must use \\n line endings",
                        self.as_str()
                    )));
                }

                Ok(content)
            }
        }
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_ascii_lowercase().replace('-', "_");
        DocumentType::ALL
            .into_iter()
            .find(|kind| kind.as_str() == wanted)
            .ok_or_else(|| AppError::UnsupportedDocumentType(s.to_string()))
    }
}

/// An immutable proof that a document was signed.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedDocument {
    pub id: Uuid,
    pub document_type: DocumentType,
    /// Identifier of the document in its owning domain.
    pub document_id: String,
    /// `hex(SHA-256(signature))`; the value printed on the document for verification.
    pub signature_hash: String,
    #[serde(skip)]
    pub signature: Vec<u8>,
    /// Hex digest of the canonical content that was signed.
    pub content_digest: String,
    pub certificate_id: Uuid,
    pub signer_id: Uuid,
    pub signed_at: DateTime<Utc>,
}

/// The row written by the signing service.
#[derive(Debug, Clone)]
pub struct NewSignedDocument {
    pub id: Uuid,
    pub document_type: DocumentType,
    pub document_id: String,
    pub signature_hash: String,
    pub signature: Vec<u8>,
    pub content_digest: String,
    pub certificate_id: Uuid,
    pub signer_id: Uuid,
    pub signed_at: DateTime<Utc>,
}

impl From<NewSignedDocument> for SignedDocument {
    fn from(record: NewSignedDocument) -> Self {
        Self {
            id: record.id,
            document_type: record.document_type,
            document_id: record.document_id,
            signature_hash: record.signature_hash,
            signature: record.signature,
            content_digest: record.content_digest,
            certificate_id: record.certificate_id,
            signer_id: record.signer_id,
            signed_at: record.signed_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_types_and_rejects_others() {
        assert_eq!("prescription".parse::<DocumentType>().unwrap(), DocumentType::Prescription);
        assert_eq!("Exam-Request".parse::<DocumentType>().unwrap(), DocumentType::ExamRequest);
        assert!(matches!(
            "invoice".parse::<DocumentType>(),
            Err(AppError::UnsupportedDocumentType(kind)) if kind == "invoice"
        ));
    }

    #[test]
    fn text_types_reject_non_canonical_bytes_instead_of_rewriting() {
        let canonical = DocumentType::Prescription
            .canonicalize(b"Amoxicilina 500mg\n8/8h")
            .unwrap();
        assert_eq!(canonical, b"Amoxicilina 500mg\n8/8h");

        for content in [
            &b"\xef\xbb\xbfAmoxicilina 500mg"[..],
            b"Amoxicilina 500mg\r\n8/8h",
            b"Amoxicilina 500mg\r8/8h",
        ] {
            assert!(matches!(
                DocumentType::Prescription.canonicalize(content),
                Err(AppError::Validation(_))
            ));
        }
    }

    #[test]
    fn generic_keeps_raw_bytes() {
        let raw = [0xffu8, b'\r', b'\n', 0x00];
        let canonical = DocumentType::Generic.canonicalize(&raw).unwrap();
        assert_eq!(canonical, &raw[..]);
    }

    #[test]
    fn text_types_reject_invalid_utf8_and_empty_content() {
        assert!(DocumentType::Referral.canonicalize(&[0xff, 0xfe]).is_err());
        assert!(DocumentType::Generic.canonicalize(b"").is_err());
    }
}
