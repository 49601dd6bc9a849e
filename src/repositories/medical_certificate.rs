use deadpool_postgres::Pool;
use tokio_postgres::Row;
use uuid::Uuid;

use crate::error::Result;
use crate::models::medical_certificate::{MedicalCertificateRecord, Patient, Professional};
use crate::repositories::column;

fn row_to_record(row: &Row) -> Result<MedicalCertificateRecord> {
    Ok(MedicalCertificateRecord {
        id: column(row, "id")?,
        sequence_number: column(row, "sequence_number")?,
        year: column(row, "year")?,
        document_type: column(row, "document_type")?,
        document_id: column(row, "document_id")?,
        patient_id: column(row, "patient_id")?,
        professional_id: column(row, "professional_id")?,
        issued_at: column(row, "issued_at")?,
    })
}

fn row_to_patient(row: &Row) -> Result<Patient> {
    Ok(Patient {
        id: column(row, "id")?,
        full_name: column(row, "full_name")?,
        cpf: column(row, "cpf")?,
        phone: column(row, "phone")?,
        address: column(row, "address")?,
        birth_date: column(row, "birth_date")?,
    })
}

fn row_to_professional(row: &Row) -> Result<Professional> {
    Ok(Professional {
        id: column(row, "id")?,
        user_id: column(row, "user_id")?,
        full_name: column(row, "full_name")?,
        council: column(row, "council")?,
        registration_number: column(row, "registration_number")?,
        registration_state: column(row, "registration_state")?,
    })
}

/// Looks up a clinical document by its public `sequence/year` code.
pub async fn find_by_sequence(
    pool: &Pool,
    sequence_number: i32,
    year: i32,
) -> Result<Option<MedicalCertificateRecord>> {
    let client = pool.get().await?;
    let stmt = client
        .prepare_cached(
            r#"
            SELECT
                id, sequence_number, year, document_type, document_id,
                patient_id, professional_id, issued_at
            FROM medical_certificates
            WHERE sequence_number = $1 AND year = $2
            "#,
        )
        .await?;

    let row = client.query_opt(&stmt, &[&sequence_number, &year]).await?;
    row.map(|r| row_to_record(&r)).transpose()
}

pub async fn find_patient(pool: &Pool, patient_id: Uuid) -> Result<Option<Patient>> {
    let client = pool.get().await?;
    let stmt = client
        .prepare_cached(
            r#"
            SELECT id, full_name, cpf, phone, address, birth_date
            FROM patients
            WHERE id = $1
            "#,
        )
        .await?;

    let row = client.query_opt(&stmt, &[&patient_id]).await?;
    row.map(|r| row_to_patient(&r)).transpose()
}

pub async fn find_professional(
    pool: &Pool,
    professional_id: Uuid,
) -> Result<Option<Professional>> {
    let client = pool.get().await?;
    let stmt = client
        .prepare_cached(
            r#"
            SELECT
                id, user_id, full_name, council,
                registration_number, registration_state
            FROM professionals
            WHERE id = $1
            "#,
        )
        .await?;

    let row = client.query_opt(&stmt, &[&professional_id]).await?;
    row.map(|r| row_to_professional(&r)).transpose()
}
