use deadpool_postgres::Pool;
use tokio_postgres::Row;

use crate::error::{AppError, Result};
use crate::models::signed_document::{DocumentType, NewSignedDocument, SignedDocument};
use crate::repositories::column;

const INSERT_SIGNED_DOCUMENT: &str = r#"
    INSERT INTO signed_documents (
        id, document_type, document_id, signature_hash, signature,
        content_digest, certificate_id, signer_id, signed_at
    )
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
    ON CONFLICT (id) DO NOTHING
"#;

const SELECT_BY_ID: &str = r#"
    SELECT
        id, document_type, document_id, signature_hash, signature,
        content_digest, certificate_id, signer_id, signed_at
    FROM signed_documents
    WHERE id = $1
"#;

const SELECT_LATEST: &str = r#"
    SELECT
        id, document_type, document_id, signature_hash, signature,
        content_digest, certificate_id, signer_id, signed_at
    FROM signed_documents
    WHERE document_type = $1 AND document_id = $2
    ORDER BY signed_at DESC, seq DESC
    LIMIT 1
"#;

fn row_to_signed_document(row: &Row) -> Result<SignedDocument> {
    Ok(SignedDocument {
        id: column(row, "id")?,
        document_type: column(row, "document_type")?,
        document_id: column(row, "document_id")?,
        signature_hash: column(row, "signature_hash")?,
        signature: column(row, "signature")?,
        content_digest: column(row, "content_digest")?,
        certificate_id: column(row, "certificate_id")?,
        signer_id: column(row, "signer_id")?,
        signed_at: column(row, "signed_at")?,
    })
}

/// Inserts a signed document and reads it back in the same transaction.
///
/// The insert is keyed on the caller-generated id, so replaying it after a
/// lost acknowledgement returns the row that was already written.
pub async fn create(pool: &Pool, record: &NewSignedDocument) -> Result<SignedDocument> {
    let mut client = pool.get().await?;
    let transaction = client.transaction().await?;

    let insert = transaction.prepare_cached(INSERT_SIGNED_DOCUMENT).await?;
    let inserted = transaction
        .execute(
            &insert,
            &[
                &record.id,
                &record.document_type,
                &record.document_id,
                &record.signature_hash,
                &record.signature,
                &record.content_digest,
                &record.certificate_id,
                &record.signer_id,
                &record.signed_at,
            ],
        )
        .await?;

    let select = transaction.prepare_cached(SELECT_BY_ID).await?;
    let row = transaction
        .query_opt(&select, &[&record.id])
        .await?
        .ok_or_else(|| AppError::Internal("Signed document vanished after insert".to_string()))?;

    transaction.commit().await?;

    if inserted == 0 {
        tracing::debug!("Signed document {} was already stored", record.id);
    }

    row_to_signed_document(&row)
}

/// Finds the newest signature for a document.
pub async fn find_latest(
    pool: &Pool,
    document_type: DocumentType,
    document_id: &str,
) -> Result<Option<SignedDocument>> {
    let client = pool.get().await?;
    let stmt = client.prepare_cached(SELECT_LATEST).await?;

    let row = client
        .query_opt(&stmt, &[&document_type, &document_id])
        .await?;
    row.map(|r| row_to_signed_document(&r)).transpose()
}
