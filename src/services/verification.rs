use std::sync::Arc;

use subtle::ConstantTimeEq;

use crate::error::{AppError, Result};
use crate::models::signed_document::SignedDocument;
use crate::models::medical_certificate::MedicalCertificateRecord;
use crate::models::verification::{RedactedDocumentView, VerificationResult, mask_patient_name};
use crate::repositories::DocumentStore;

/// Compares a caller-supplied hash, or a prefix of it, with the stored one.
///
/// Empty input and fragments shorter than `min_len` never match. The
/// comparison itself runs in constant time over the fragment length.
pub fn hash_matches(stored: &str, provided: &str, min_len: usize) -> bool {
    let provided = provided.trim().to_ascii_lowercase();

    if provided.is_empty() || provided.len() < min_len || provided.len() > stored.len() {
        return false;
    }

    stored.as_bytes()[..provided.len()]
        .ct_eq(provided.as_bytes())
        .into()
}

/// Answers public "is this document genuine?" lookups.
pub struct VerificationService {
    store: Arc<dyn DocumentStore>,
    min_fragment_len: usize,
}

impl VerificationService {
    pub fn new(store: Arc<dyn DocumentStore>, min_fragment_len: usize) -> Self {
        Self {
            store,
            min_fragment_len,
        }
    }

    /// Resolves `sequence_number/year` and checks `provided_hash` against the
    /// newest signature of that document.
    ///
    /// Unknown codes, unsigned documents and mismatches are ordinary results,
    /// never errors.
    pub async fn verify(
        &self,
        sequence_number: i32,
        year: i32,
        provided_hash: &str,
    ) -> Result<VerificationResult> {
        let Some(record) = self
            .store
            .find_medical_certificate_by_sequence(sequence_number, year)
            .await?
        else {
            tracing::debug!("🔍 Verification for unknown code {}/{}", sequence_number, year);
            return Ok(VerificationResult::not_found());
        };

        let Some(signed) = self
            .store
            .find_latest_signed_document(record.document_type, &record.document_id)
            .await?
        else {
            tracing::debug!("🔍 Verification for unsigned document {}/{}", sequence_number, year);
            return Ok(VerificationResult::unsigned());
        };

        if !hash_matches(&signed.signature_hash, provided_hash, self.min_fragment_len) {
            tracing::info!("❌ Verification hash mismatch for {}/{}", sequence_number, year);
            return Ok(VerificationResult::mismatch());
        }

        let view = self.redact(&record, &signed).await?;
        tracing::info!("✅ Document {}/{} verified", sequence_number, year);
        Ok(VerificationResult::verified(view))
    }

    async fn redact(
        &self,
        record: &MedicalCertificateRecord,
        signed: &SignedDocument,
    ) -> Result<RedactedDocumentView> {
        let patient = self
            .store
            .find_patient(record.patient_id)
            .await?
            .ok_or_else(|| AppError::Internal(format!("Patient of record {} is missing", record.id)))?;
        let professional = self
            .store
            .find_professional(record.professional_id)
            .await?
            .ok_or_else(|| {
                AppError::Internal(format!("Professional of record {} is missing", record.id))
            })?;
        let certificate = self
            .store
            .find_certificate(signed.certificate_id)
            .await?
            .ok_or_else(|| {
                AppError::Internal(format!("Certificate of signature {} is missing", signed.id))
            })?;

        Ok(RedactedDocumentView {
            document_type: record.document_type,
            sequence_number: record.sequence_number,
            year: record.year,
            issued_at: record.issued_at,
            signed_at: signed.signed_at,
            patient_name: mask_patient_name(&patient.full_name),
            professional_name: professional.full_name.clone(),
            professional_registration: professional.registration(),
            signer_common_name: certificate.common_name().map(str::to_string),
            certificate_serial: certificate.serial_number.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::certificate::Certificate;
    use crate::models::medical_certificate::{Patient, Professional};
    use crate::models::signed_document::{DocumentType, NewSignedDocument};
    use crate::repositories::memory::MemoryDocumentStore;
    use crate::testing::{certificate_for, epoch};
    use uuid::Uuid;

    const CPF: &str = "123.456.789-09";

    struct Fixture {
        store: Arc<MemoryDocumentStore>,
        service: VerificationService,
        record: MedicalCertificateRecord,
        certificate: Certificate,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(MemoryDocumentStore::new());
        let owner = Uuid::new_v4();
        let certificate = certificate_for(owner);
        store.insert_certificate(certificate.clone()).await;

        let patient = Patient {
            id: Uuid::new_v4(),
            full_name: "Maria da Silva Oliveira".to_string(),
            cpf: CPF.to_string(),
            phone: Some("+55 11 91234-5678".to_string()),
            address: Some("Rua das Flores, 10".to_string()),
            birth_date: None,
        };
        let professional = Professional {
            id: Uuid::new_v4(),
            user_id: owner,
            full_name: "Dra. Ana Souza".to_string(),
            council: "CRM".to_string(),
            registration_number: "12345".to_string(),
            registration_state: "SP".to_string(),
        };
        let record = MedicalCertificateRecord {
            id: Uuid::new_v4(),
            sequence_number: 42,
            year: 2024,
            document_type: DocumentType::MedicalCertificate,
            document_id: "MC42".to_string(),
            patient_id: patient.id,
            professional_id: professional.id,
            issued_at: epoch(),
        };

        store.insert_patient(patient).await;
        store.insert_professional(professional).await;
        store.insert_medical_certificate(record.clone()).await;

        Fixture {
            service: VerificationService::new(store.clone(), 16),
            store,
            record,
            certificate,
        }
    }

    async fn sign(fixture: &Fixture, signature_hash: &str) {
        let certificate = &fixture.certificate;
        fixture
            .store
            .create_signed_document(&NewSignedDocument {
                id: Uuid::new_v4(),
                document_type: fixture.record.document_type,
                document_id: fixture.record.document_id.clone(),
                signature_hash: signature_hash.to_string(),
                signature: vec![0; 256],
                content_digest: "00".repeat(32),
                certificate_id: certificate.id,
                signer_id: certificate.owner_id,
                signed_at: epoch(),
            })
            .await
            .unwrap();
    }

    fn hash(seed: char) -> String {
        std::iter::repeat_n(seed, 64).collect()
    }

    #[tokio::test]
    async fn unknown_code_is_simply_not_found() {
        let f = fixture().await;
        let result = f.service.verify(43, 2024, &hash('a')).await.unwrap();
        assert!(!result.found);
        assert!(result.signed.is_none());
    }

    #[tokio::test]
    async fn unsigned_document_is_reported() {
        let f = fixture().await;
        let result = f.service.verify(42, 2024, &hash('a')).await.unwrap();
        assert!(result.found);
        assert_eq!(result.signed, Some(false));
    }

    #[tokio::test]
    async fn correct_hash_yields_redacted_view() {
        let f = fixture().await;
        let correct = hash('a');
        sign(&f, &correct).await;

        let result = f.service.verify(42, 2024, &correct.to_uppercase()).await.unwrap();
        assert_eq!(result.valid, Some(true));

        let view = result.document.clone().unwrap();
        assert_eq!(view.patient_name, "Maria S. O.");
        assert_eq!(view.professional_registration, "CRM 12345/SP");
        assert_eq!(view.signer_common_name.as_deref(), Some("DRA ANA SOUZA"));

        let json = sonic_rs::to_string(&result).unwrap();
        assert!(!json.contains(CPF));
        assert!(!json.contains("91234"));
        assert!(!json.contains("Flores"));
        assert!(!json.contains(&correct));
    }

    #[tokio::test]
    async fn any_single_character_mutation_is_invalid() {
        let f = fixture().await;
        let correct = "9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08";
        sign(&f, correct).await;

        for position in 0..correct.len() {
            let mut mutated = correct.as_bytes().to_vec();
            mutated[position] = if mutated[position] == b'0' { b'1' } else { b'0' };
            let mutated = String::from_utf8(mutated).unwrap();

            let result = f.service.verify(42, 2024, &mutated).await.unwrap();
            assert_eq!(result.valid, Some(false), "mutation at {}", position);
            assert!(result.document.is_none());
        }

        let extended = format!("{}0", correct);
        let result = f.service.verify(42, 2024, &extended).await.unwrap();
        assert_eq!(result.valid, Some(false));
    }

    #[tokio::test]
    async fn newest_signature_decides() {
        let f = fixture().await;
        sign(&f, &hash('a')).await;
        sign(&f, &hash('b')).await;

        let old = f.service.verify(42, 2024, &hash('a')).await.unwrap();
        assert_eq!(old.valid, Some(false));
        let new = f.service.verify(42, 2024, &hash('b')).await.unwrap();
        assert_eq!(new.valid, Some(true));
    }

    #[test]
    fn fragments_must_be_long_enough() {
        let stored = hash('c');
        assert!(hash_matches(&stored, &stored[..16], 16));
        assert!(!hash_matches(&stored, &stored[..15], 16));
        assert!(!hash_matches(&stored, "", 16));
        assert!(hash_matches(&stored, &format!("  {}  ", stored), 16));
    }

    #[test]
    fn blank_hash_never_matches_even_without_minimum() {
        let stored = hash('d');
        assert!(!hash_matches(&stored, "", 0));
        assert!(!hash_matches(&stored, "   ", 0));
        assert!(hash_matches(&stored, &stored[..1], 0));
    }
}
