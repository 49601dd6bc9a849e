//! In-process document store for tests and local demos.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::Result;
use crate::models::certificate::Certificate;
use crate::models::medical_certificate::{MedicalCertificateRecord, Patient, Professional};
use crate::models::signed_document::{DocumentType, NewSignedDocument, SignedDocument};
use crate::repositories::DocumentStore;

#[derive(Default)]
struct Tables {
    certificates: Vec<Certificate>,
    signed_documents: Vec<SignedDocument>,
    medical_certificates: Vec<MedicalCertificateRecord>,
    patients: HashMap<Uuid, Patient>,
    professionals: HashMap<Uuid, Professional>,
}

/// A `DocumentStore` that keeps every table in memory.
#[derive(Default)]
pub struct MemoryDocumentStore {
    tables: RwLock<Tables>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a certificate. Inserting an active certificate deactivates the
    /// owner's previous one.
    pub async fn insert_certificate(&self, certificate: Certificate) {
        let mut tables = self.tables.write().await;
        if certificate.active {
            for existing in tables
                .certificates
                .iter_mut()
                .filter(|c| c.owner_id == certificate.owner_id)
            {
                existing.active = false;
            }
        }
        tables.certificates.push(certificate);
    }

    pub async fn deactivate_certificate(&self, certificate_id: Uuid) {
        let mut tables = self.tables.write().await;
        if let Some(certificate) = tables
            .certificates
            .iter_mut()
            .find(|c| c.id == certificate_id)
        {
            certificate.active = false;
        }
    }

    pub async fn insert_medical_certificate(&self, record: MedicalCertificateRecord) {
        self.tables.write().await.medical_certificates.push(record);
    }

    pub async fn insert_patient(&self, patient: Patient) {
        self.tables.write().await.patients.insert(patient.id, patient);
    }

    pub async fn insert_professional(&self, professional: Professional) {
        self.tables
            .write()
            .await
            .professionals
            .insert(professional.id, professional);
    }

    /// Every signed document in insertion order.
    pub async fn signed_documents(&self) -> Vec<SignedDocument> {
        self.tables.read().await.signed_documents.clone()
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn find_active_certificate(&self, owner_id: Uuid) -> Result<Option<Certificate>> {
        let tables = self.tables.read().await;
        Ok(tables
            .certificates
            .iter()
            .find(|c| c.owner_id == owner_id && c.active)
            .cloned())
    }

    async fn find_certificate(&self, certificate_id: Uuid) -> Result<Option<Certificate>> {
        let tables = self.tables.read().await;
        Ok(tables
            .certificates
            .iter()
            .find(|c| c.id == certificate_id)
            .cloned())
    }

    async fn create_signed_document(&self, record: &NewSignedDocument) -> Result<SignedDocument> {
        let mut tables = self.tables.write().await;

        if let Some(existing) = tables.signed_documents.iter().find(|d| d.id == record.id) {
            return Ok(existing.clone());
        }

        let document = SignedDocument::from(record.clone());
        tables.signed_documents.push(document.clone());
        Ok(document)
    }

    async fn find_latest_signed_document(
        &self,
        document_type: DocumentType,
        document_id: &str,
    ) -> Result<Option<SignedDocument>> {
        let tables = self.tables.read().await;
        Ok(tables
            .signed_documents
            .iter()
            .enumerate()
            .filter(|(_, d)| d.document_type == document_type && d.document_id == document_id)
            .max_by_key(|(position, d)| (d.signed_at, *position))
            .map(|(_, d)| d.clone()))
    }

    async fn find_medical_certificate_by_sequence(
        &self,
        sequence_number: i32,
        year: i32,
    ) -> Result<Option<MedicalCertificateRecord>> {
        let tables = self.tables.read().await;
        Ok(tables
            .medical_certificates
            .iter()
            .find(|r| r.sequence_number == sequence_number && r.year == year)
            .cloned())
    }

    async fn find_patient(&self, patient_id: Uuid) -> Result<Option<Patient>> {
        Ok(self.tables.read().await.patients.get(&patient_id).cloned())
    }

    async fn find_professional(&self, professional_id: Uuid) -> Result<Option<Professional>> {
        Ok(self
            .tables
            .read()
            .await
            .professionals
            .get(&professional_id)
            .cloned())
    }
}
