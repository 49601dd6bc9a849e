use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::crypto::pkcs12::common_name;

/// A professional's enrolled signing identity.
///
/// Rows are never deleted; a replaced certificate is only deactivated so the
/// signatures it produced stay verifiable.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Certificate {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub subject_dn: String,
    pub issuer_dn: String,
    /// Hex serial, unique per issuer.
    pub serial_number: String,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
    /// SubjectPublicKeyInfo, DER encoded.
    #[serde(skip)]
    pub public_key: Vec<u8>,
    /// Name of the sealed PKCS#12 blob in the key container source.
    #[serde(skip)]
    pub container_ref: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl Certificate {
    /// Whether `at` falls inside `[not_before, not_after]`.
    pub fn is_valid_at(&self, at: DateTime<Utc>) -> bool {
        self.not_before <= at && at <= self.not_after
    }

    pub fn common_name(&self) -> Option<&str> {
        common_name(&self.subject_dn)
    }
}
