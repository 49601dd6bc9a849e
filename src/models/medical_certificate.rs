use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::models::signed_document::DocumentType;

/// A clinical document with a public, human-typed lookup code
/// (`sequence_number/year`).
#[derive(Debug, Clone)]
pub struct MedicalCertificateRecord {
    pub id: Uuid,
    pub sequence_number: i32,
    pub year: i32,
    /// Type and id under which the document's signatures are recorded.
    pub document_type: DocumentType,
    pub document_id: String,
    pub patient_id: Uuid,
    pub professional_id: Uuid,
    pub issued_at: DateTime<Utc>,
}

/// A patient as stored by the clinic.
///
/// Holds direct identifiers and must never be serialized to a public
/// response; see `models::verification` for the redacted projection.
#[derive(Clone)]
pub struct Patient {
    pub id: Uuid,
    pub full_name: String,
    pub cpf: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub birth_date: Option<NaiveDate>,
}

impl fmt::Debug for Patient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Patient")
            .field("id", &self.id)
            .field("full_name", &"<redacted>")
            .field("cpf", &"<redacted>")
            .finish_non_exhaustive()
    }
}

/// A licensed professional.
#[derive(Debug, Clone)]
pub struct Professional {
    pub id: Uuid,
    /// The account that signs on this professional's behalf.
    pub user_id: Uuid,
    pub full_name: String,
    /// Licensing council, e.g. `CRM`.
    pub council: String,
    pub registration_number: String,
    /// Two-letter state of the council registration.
    pub registration_state: String,
}

impl Professional {
    /// Formats the registration as printed on documents, e.g. `CRM 12345/SP`.
    pub fn registration(&self) -> String {
        format!(
            "{} {}/{}",
            self.council, self.registration_number, self.registration_state
        )
    }
}
