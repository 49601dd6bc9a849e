use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::signed_document::DocumentType;

/// Outcome of a public verification lookup.
///
/// `signed` and `valid` are only present once the preceding step succeeded,
/// so the payload never says more than the caller already proved.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationResult {
    pub found: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signed: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub valid: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document: Option<RedactedDocumentView>,
}

impl VerificationResult {
    pub fn not_found() -> Self {
        Self {
            found: false,
            signed: None,
            valid: None,
            document: None,
        }
    }

    pub fn unsigned() -> Self {
        Self {
            found: true,
            signed: Some(false),
            valid: None,
            document: None,
        }
    }

    pub fn mismatch() -> Self {
        Self {
            found: true,
            signed: Some(true),
            valid: Some(false),
            document: None,
        }
    }

    pub fn verified(document: RedactedDocumentView) -> Self {
        Self {
            found: true,
            signed: Some(true),
            valid: Some(true),
            document: Some(document),
        }
    }
}

/// The only shape in which a verified document leaves the service.
///
/// There is deliberately no field for CPF, phone, address or birth date.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RedactedDocumentView {
    pub document_type: DocumentType,
    pub sequence_number: i32,
    pub year: i32,
    pub issued_at: DateTime<Utc>,
    pub signed_at: DateTime<Utc>,
    /// First name plus initials, e.g. `Maria S. O.`.
    pub patient_name: String,
    pub professional_name: String,
    /// e.g. `CRM 12345/SP`.
    pub professional_registration: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signer_common_name: Option<String>,
    pub certificate_serial: String,
}

const NAME_PARTICLES: [&str; 6] = ["da", "de", "do", "das", "dos", "e"];

/// Reduces a full name to its first name followed by the initials of the
/// remaining names. Lowercase particles (`da`, `dos`, ...) are dropped.
pub fn mask_patient_name(full_name: &str) -> String {
    let mut words = full_name.split_whitespace();

    let Some(first) = words.next() else {
        return String::new();
    };

    let mut masked = first.to_string();
    for word in words {
        if NAME_PARTICLES.contains(&word.to_lowercase().as_str()) {
            continue;
        }
        if let Some(initial) = word.chars().next() {
            masked.push(' ');
            masked.extend(initial.to_uppercase());
            masked.push('.');
        }
    }

    masked
}
