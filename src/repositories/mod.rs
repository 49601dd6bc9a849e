//! Document store, key containers and artifact storage.
//!
//! SQL lives in the per-entity modules as free functions over a
//! `deadpool_postgres::Pool`. `PgDocumentStore` stitches them together behind
//! the `DocumentStore` trait and applies the retry-once policy.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use deadpool_postgres::Pool;
use postgres_types::FromSql;
use tokio_postgres::Row;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::certificate::Certificate;
use crate::models::medical_certificate::{MedicalCertificateRecord, Patient, Professional};
use crate::models::signed_document::{DocumentType, NewSignedDocument, SignedDocument};

pub mod artifacts;
pub mod certificate;
pub mod key_containers;
pub mod medical_certificate;
pub mod memory;
pub mod signed_document;

/// Delay before the single retry of a transient storage failure.
const RETRY_BACKOFF: Duration = Duration::from_millis(150);

/// Persistence operations the core depends on.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// The owner's active certificate, if any.
    async fn find_active_certificate(&self, owner_id: Uuid) -> Result<Option<Certificate>>;

    /// Any certificate by id, active or not.
    async fn find_certificate(&self, certificate_id: Uuid) -> Result<Option<Certificate>>;

    /// Writes `record` and returns the row as read back from storage.
    ///
    /// Writing the same `record.id` twice yields the first row.
    async fn create_signed_document(&self, record: &NewSignedDocument) -> Result<SignedDocument>;

    /// The newest signature recorded for `(document_type, document_id)`.
    async fn find_latest_signed_document(
        &self,
        document_type: DocumentType,
        document_id: &str,
    ) -> Result<Option<SignedDocument>>;

    async fn find_medical_certificate_by_sequence(
        &self,
        sequence_number: i32,
        year: i32,
    ) -> Result<Option<MedicalCertificateRecord>>;

    async fn find_patient(&self, patient_id: Uuid) -> Result<Option<Patient>>;

    async fn find_professional(&self, professional_id: Uuid) -> Result<Option<Professional>>;
}

/// PostgreSQL-backed document store.
#[derive(Clone)]
pub struct PgDocumentStore {
    pool: Pool,
}

impl PgDocumentStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DocumentStore for PgDocumentStore {
    async fn find_active_certificate(&self, owner_id: Uuid) -> Result<Option<Certificate>> {
        retry_once("find_active_certificate", || {
            certificate::find_active_by_owner(&self.pool, owner_id)
        })
        .await
    }

    async fn find_certificate(&self, certificate_id: Uuid) -> Result<Option<Certificate>> {
        retry_once("find_certificate", || {
            certificate::find_by_id(&self.pool, certificate_id)
        })
        .await
    }

    async fn create_signed_document(&self, record: &NewSignedDocument) -> Result<SignedDocument> {
        retry_once("create_signed_document", || {
            signed_document::create(&self.pool, record)
        })
        .await
    }

    async fn find_latest_signed_document(
        &self,
        document_type: DocumentType,
        document_id: &str,
    ) -> Result<Option<SignedDocument>> {
        retry_once("find_latest_signed_document", || {
            signed_document::find_latest(&self.pool, document_type, document_id)
        })
        .await
    }

    async fn find_medical_certificate_by_sequence(
        &self,
        sequence_number: i32,
        year: i32,
    ) -> Result<Option<MedicalCertificateRecord>> {
        retry_once("find_medical_certificate_by_sequence", || {
            medical_certificate::find_by_sequence(&self.pool, sequence_number, year)
        })
        .await
    }

    async fn find_patient(&self, patient_id: Uuid) -> Result<Option<Patient>> {
        retry_once("find_patient", || {
            medical_certificate::find_patient(&self.pool, patient_id)
        })
        .await
    }

    async fn find_professional(&self, professional_id: Uuid) -> Result<Option<Professional>> {
        retry_once("find_professional", || {
            medical_certificate::find_professional(&self.pool, professional_id)
        })
        .await
    }
}

/// Runs `operation`, retrying exactly once after a short backoff when the
/// first failure is a connectivity problem.
pub async fn retry_once<T, F, Fut>(name: &'static str, mut operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    match operation().await {
        Err(e) if e.is_transient() => {
            tracing::warn!("⚠️ {} failed ({}), retrying once", name, e);
            tokio::time::sleep(RETRY_BACKOFF).await;
            operation().await
        }
        other => other,
    }
}

/// Reads a column, mapping a missing or mistyped column to `MissingData`.
pub(crate) fn column<'a, T: FromSql<'a>>(row: &'a Row, name: &str) -> Result<T> {
    row.try_get(name)
        .map_err(|_| AppError::MissingData(name.to_string()))
}
