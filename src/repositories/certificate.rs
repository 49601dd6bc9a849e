use deadpool_postgres::Pool;
use tokio_postgres::Row;
use uuid::Uuid;

use crate::error::Result;
use crate::models::certificate::Certificate;
use crate::repositories::column;

const CERTIFICATE_COLUMNS: &str = "id, owner_id, subject_dn, issuer_dn, serial_number, \
     not_before, not_after, public_key, container_ref, active, created_at";

fn row_to_certificate(row: &Row) -> Result<Certificate> {
    Ok(Certificate {
        id: column(row, "id")?,
        owner_id: column(row, "owner_id")?,
        subject_dn: column(row, "subject_dn")?,
        issuer_dn: column(row, "issuer_dn")?,
        serial_number: column(row, "serial_number")?,
        not_before: column(row, "not_before")?,
        not_after: column(row, "not_after")?,
        public_key: column(row, "public_key")?,
        container_ref: column(row, "container_ref")?,
        active: column(row, "active")?,
        created_at: column(row, "created_at")?,
    })
}

/// Finds the owner's active certificate.
///
/// A partial unique index guarantees at most one row matches.
pub async fn find_active_by_owner(pool: &Pool, owner_id: Uuid) -> Result<Option<Certificate>> {
    let client = pool.get().await?;
    let stmt = client
        .prepare_cached(&format!(
            "SELECT {} FROM certificates WHERE owner_id = $1 AND active = true",
            CERTIFICATE_COLUMNS
        ))
        .await?;

    let row = client.query_opt(&stmt, &[&owner_id]).await?;
    row.map(|r| row_to_certificate(&r)).transpose()
}

/// Finds a certificate by its ID, whether or not it is still active.
pub async fn find_by_id(pool: &Pool, certificate_id: Uuid) -> Result<Option<Certificate>> {
    let client = pool.get().await?;
    let stmt = client
        .prepare_cached(&format!(
            "SELECT {} FROM certificates WHERE id = $1",
            CERTIFICATE_COLUMNS
        ))
        .await?;

    let row = client.query_opt(&stmt, &[&certificate_id]).await?;
    row.map(|r| row_to_certificate(&r)).transpose()
}
