use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;

use crate::{
    error::{AppError, Result},
    state::PublicState,
    validation::documents::{parse_verification_code, validate_sequence},
};

/// Query of a public verification lookup.
///
/// Either `code=42/2024` or `sequence=42&year=2024`, plus the printed hash.
#[derive(Deserialize, Debug)]
pub struct VerifyQuery {
    pub sequence: Option<i32>,
    pub year: Option<i32>,
    pub code: Option<String>,
    pub hash: String,
}

impl VerifyQuery {
    fn lookup_key(&self) -> Result<(i32, i32)> {
        match (&self.code, self.sequence, self.year) {
            (Some(code), None, None) => parse_verification_code(code),
            (None, Some(sequence), Some(year)) => {
                validate_sequence(sequence, year)?;
                Ok((sequence, year))
            }
            _ => Err(AppError::Validation(
                "Provide either code or both sequence and year".to_string(),
            )),
        }
    }
}

/// Public "is this document genuine?" endpoint.
pub async fn verify(
    State(state): State<PublicState>,
    Query(query): Query<VerifyQuery>,
) -> Result<Response> {
    let (sequence, year) = query.lookup_key()?;

    let result = state.verifier.verify(sequence, year, &query.hash).await?;

    Ok((
        StatusCode::OK,
        [
            (header::CACHE_CONTROL, "no-store, max-age=0"),
            (header::PRAGMA, "no-cache"),
        ],
        Json(result),
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(sequence: Option<i32>, year: Option<i32>, code: Option<&str>) -> VerifyQuery {
        VerifyQuery {
            sequence,
            year,
            code: code.map(str::to_string),
            hash: "ab".repeat(32),
        }
    }

    #[test]
    fn code_and_pair_forms_are_equivalent() {
        assert_eq!(query(None, None, Some("42/2024")).lookup_key().unwrap(), (42, 2024));
        assert_eq!(query(Some(42), Some(2024), None).lookup_key().unwrap(), (42, 2024));
    }

    #[test]
    fn ambiguous_or_partial_keys_are_rejected() {
        assert!(query(Some(42), None, None).lookup_key().is_err());
        assert!(query(Some(42), Some(2024), Some("42/2024")).lookup_key().is_err());
        assert!(query(None, None, None).lookup_key().is_err());
        assert!(query(Some(0), Some(2024), None).lookup_key().is_err());
    }
}
