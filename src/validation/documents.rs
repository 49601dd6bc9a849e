use base64::{Engine, engine::general_purpose::STANDARD};

use crate::error::{AppError, Result};
use crate::models::signed_document::DocumentType;

/// Largest decoded document accepted for signing.
pub const MAX_DOCUMENT_BYTES: usize = 8 * 1024 * 1024;

/// Validates an opaque document identifier.
///
/// Identifiers end up in file names and URLs, so only ASCII letters, digits,
/// `-` and `_` are accepted.
pub fn validate_document_id(document_id: &str) -> Result<()> {
    if document_id.is_empty() || document_id.len() > 128 {
        return Err(AppError::Validation(
            "Document id must be between 1 and 128 characters".to_string(),
        ));
    }

    if !document_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(AppError::Validation(
            "Document id can only contain letters, numbers, underscores, and hyphens".to_string(),
        ));
    }

    Ok(())
}

/// Validates the name of a sealed key container.
pub fn validate_container_ref(container_ref: &str) -> Result<()> {
    let valid = !container_ref.is_empty()
        && container_ref.len() <= 255
        && !container_ref.starts_with('.')
        && container_ref
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));

    if !valid {
        return Err(AppError::Internal(format!(
            "Refusing key container reference {:?}",
            container_ref
        )));
    }

    Ok(())
}

/// Parses a document type tag.
pub fn parse_document_type(document_type: &str) -> Result<DocumentType> {
    document_type.parse()
}

/// Decodes base64 document content and enforces the size limit.
pub fn decode_content(content_b64: &str) -> Result<Vec<u8>> {
    if content_b64.len() > MAX_DOCUMENT_BYTES.div_ceil(3) * 4 {
        return Err(AppError::Validation("Document is too large".to_string()));
    }

    let content = STANDARD
        .decode(content_b64.trim())
        .map_err(|_| AppError::Validation("Content must be base64 encoded".to_string()))?;

    if content.is_empty() {
        return Err(AppError::Validation("Document content cannot be empty".to_string()));
    }

    Ok(content)
}

/// Validates the requested share-link lifetime.
pub fn validate_valid_days(valid_days: u32, max_days: u32) -> Result<()> {
    if valid_days == 0 || valid_days > max_days {
        return Err(AppError::Validation(format!(
            "validDays must be between 1 and {}",
            max_days
        )));
    }

    Ok(())
}

/// Parses a public verification code of the form `42/2024`.
pub fn parse_verification_code(code: &str) -> Result<(i32, i32)> {
    let invalid = || AppError::Validation("Verification code must look like 42/2024".to_string());

    let (sequence, year) = code.trim().split_once('/').ok_or_else(invalid)?;
    let sequence: i32 = sequence.trim().parse().map_err(|_| invalid())?;
    let year: i32 = year.trim().parse().map_err(|_| invalid())?;

    validate_sequence(sequence, year)?;
    Ok((sequence, year))
}

/// Bounds check for a verification lookup key.
pub fn validate_sequence(sequence: i32, year: i32) -> Result<()> {
    if sequence <= 0 || !(1900..=9999).contains(&year) {
        return Err(AppError::Validation(
            "Sequence must be positive and year must have four digits".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_ids_reject_path_characters() {
        assert!(validate_document_id("P123").is_ok());
        assert!(validate_document_id("doc-9_b").is_ok());
        assert!(validate_document_id("../etc/passwd").is_err());
        assert!(validate_document_id("").is_err());
        assert!(validate_document_id(&"a".repeat(129)).is_err());
    }

    #[test]
    fn container_refs_cannot_escape_their_directory() {
        assert!(validate_container_ref("owner.p12.sealed").is_ok());
        assert!(validate_container_ref("../owner.p12").is_err());
        assert!(validate_container_ref(".hidden").is_err());
        assert!(validate_container_ref("a/b").is_err());
    }

    #[test]
    fn verification_codes_parse() {
        assert_eq!(parse_verification_code("42/2024").unwrap(), (42, 2024));
        assert_eq!(parse_verification_code(" 7 / 2023 ").unwrap(), (7, 2023));
        assert!(parse_verification_code("42-2024").is_err());
        assert!(parse_verification_code("0/2024").is_err());
        assert!(parse_verification_code("42/24").is_err());
    }

    #[test]
    fn content_must_be_base64() {
        assert_eq!(decode_content("aGVsbG8=").unwrap(), b"hello");
        assert!(decode_content("not base64!").is_err());
        assert!(decode_content("").is_err());
    }

    #[test]
    fn valid_days_are_bounded() {
        assert!(validate_valid_days(7, 30).is_ok());
        assert!(validate_valid_days(0, 30).is_err());
        assert!(validate_valid_days(31, 30).is_err());
    }
}
