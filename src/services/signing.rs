use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::clock::Clock;
use crate::crypto::hasher::{DIGEST_SIZE, DocumentDigest, DocumentHasher};
use crate::crypto::pkcs12::verify_signature;
use crate::error::{AppError, Result};
use crate::models::signed_document::{DocumentType, NewSignedDocument, SignedDocument};
use crate::repositories::DocumentStore;
use crate::services::sessions::CertificateSessionManager;
use crate::validation::documents::validate_document_id;

/// Length of the byte string that is actually signed.
pub const SIGNATURE_PAYLOAD_LEN: usize = DIGEST_SIZE + 16 + 8;

/// Builds `digest || owner_id || signed_at_millis (big-endian i64)`.
///
/// Binding the signer and the instant into the payload stops a signature
/// from being replayed for another professional or another moment.
pub fn signature_payload(
    digest: &DocumentDigest,
    owner_id: Uuid,
    signed_at: DateTime<Utc>,
) -> [u8; SIGNATURE_PAYLOAD_LEN] {
    let mut payload = [0u8; SIGNATURE_PAYLOAD_LEN];
    payload[..DIGEST_SIZE].copy_from_slice(digest.as_bytes());
    payload[DIGEST_SIZE..DIGEST_SIZE + 16].copy_from_slice(owner_id.as_bytes());
    payload[DIGEST_SIZE + 16..].copy_from_slice(&signed_at.timestamp_millis().to_be_bytes());
    payload
}

/// Drops sub-millisecond precision so the stored timestamp reproduces the
/// signed payload exactly.
fn truncate_to_millis(at: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(at.timestamp_millis()).unwrap_or(at)
}

/// Outcome of re-checking a document against its latest signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntegrityReport {
    pub signed_document_id: Uuid,
    pub content_matches: bool,
    pub signature_valid: bool,
}

impl IntegrityReport {
    pub fn is_valid(&self) -> bool {
        self.content_matches && self.signature_valid
    }
}

pub struct DocumentSigningService {
    sessions: Arc<CertificateSessionManager>,
    store: Arc<dyn DocumentStore>,
    clock: Arc<dyn Clock>,
}

impl DocumentSigningService {
    pub fn new(
        sessions: Arc<CertificateSessionManager>,
        store: Arc<dyn DocumentStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            sessions,
            store,
            clock,
        }
    }

    /// Signs `content` as `document_type`/`document_id` with the owner's
    /// unlocked certificate and records the result.
    ///
    /// A signature that cannot be persisted is reported as a failure.
    pub async fn sign(
        &self,
        owner_id: Uuid,
        document_type: DocumentType,
        document_id: &str,
        content: &[u8],
    ) -> Result<SignedDocument> {
        validate_document_id(document_id)?;
        let digest = DocumentHasher::hash(document_type, content)?;

        let handle = self.sessions.borrow_signing_key(owner_id).await?;
        let certificate_id = handle.certificate_id();
        let signed_at = truncate_to_millis(self.clock.now());

        let payload = signature_payload(&digest, owner_id, signed_at);
        let signature = handle.sign(&payload)?;

        let record = NewSignedDocument {
            id: Uuid::new_v4(),
            document_type,
            document_id: document_id.to_string(),
            signature_hash: DocumentHasher::sha256_hex(&signature),
            signature,
            content_digest: digest.to_hex(),
            certificate_id,
            signer_id: owner_id,
            signed_at,
        };

        let stored = self
            .store
            .create_signed_document(&record)
            .await
            .inspect_err(|e| {
                tracing::error!(
                    "❌ Signature {} for {}/{} was produced but not recorded: {}",
                    record.id,
                    document_type,
                    document_id,
                    e
                );
            })?;

        tracing::info!(
            "✍️ {} {} signed by {} (record {})",
            document_type,
            document_id,
            owner_id,
            stored.id
        );

        Ok(stored)
    }

    /// Checks candidate content against the latest signature of a document.
    ///
    /// Works for signatures made with since-deactivated certificates.
    pub async fn verify_integrity(
        &self,
        document_type: DocumentType,
        document_id: &str,
        content: &[u8],
    ) -> Result<IntegrityReport> {
        validate_document_id(document_id)?;

        let record = self
            .store
            .find_latest_signed_document(document_type, document_id)
            .await?
            .ok_or(AppError::DocumentNotFound)?;

        let certificate = self
            .store
            .find_certificate(record.certificate_id)
            .await?
            .ok_or_else(|| {
                AppError::Internal(format!(
                    "Signing certificate {} of record {} is missing",
                    record.certificate_id, record.id
                ))
            })?;

        let digest = DocumentHasher::hash(document_type, content)?;
        let payload = signature_payload(&digest, record.signer_id, record.signed_at);

        let signature_valid = DocumentHasher::sha256_hex(&record.signature) == record.signature_hash
            && verify_signature(&certificate.public_key, &payload, &record.signature)?;

        Ok(IntegrityReport {
            signed_document_id: record.id,
            content_matches: digest.to_hex() == record.content_digest,
            signature_valid,
        })
    }
}
