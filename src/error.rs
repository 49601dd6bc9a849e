use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// The application's error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// A database error.
    #[error("Database error: {0}")]
    Database(#[from] tokio_postgres::Error),

    /// A connection pool error.
    #[error("Database pool error: {0}")]
    Pool(#[from] deadpool_postgres::PoolError),

    /// The connection pool could not be built.
    #[error("Database pool configuration error: {0}")]
    PoolConfig(#[from] deadpool_postgres::CreatePoolError),

    /// A Redis error.
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// An I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A row was missing an expected column.
    #[error("Missing data: {0}")]
    MissingData(String),

    /// An authentication error.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// An authorization error.
    #[error("Authorization failed")]
    Unauthorized,

    /// A resource not found error.
    #[error("Resource not found")]
    NotFound,

    /// A validation error.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A cryptographic failure unrelated to the caller's passphrase.
    #[error("Cryptography error: {0}")]
    Crypto(String),

    /// An internal server error.
    #[error("Internal server error: {0}")]
    Internal(String),

    /// A rate limit exceeded error.
    #[error("Rate limit exceeded: {0}")]
    RateLimitExceeded(String),

    /// The passphrase did not open the key container.
    #[error("Invalid certificate passphrase")]
    InvalidPassphrase,

    /// The certificate is outside its validity window.
    #[error("Certificate is expired or not yet valid")]
    CertificateExpired,

    /// No active certificate matches the request.
    #[error("No active certificate found")]
    CertificateNotFound,

    /// The certificate session exists but its key material is purged.
    #[error("Certificate session is locked")]
    SessionLocked,

    /// There is no certificate session for this owner.
    #[error("No certificate session")]
    SessionNotFound,

    /// The absolute session lifetime elapsed.
    #[error("Certificate session expired")]
    SessionExpired,

    /// Key container decoding exceeded its time budget.
    #[error("Key container decoding timed out")]
    KeyDecodeTimeout,

    /// The document type is not one of the supported kinds.
    #[error("Unsupported document type: {0}")]
    UnsupportedDocumentType(String),

    /// A share token could not be parsed.
    #[error("Malformed share token")]
    TokenMalformed,

    /// A share token is past its expiry instant.
    #[error("Share token expired")]
    TokenExpired,

    /// A share token's HMAC or document binding did not match.
    #[error("Share token signature mismatch")]
    TokenSignatureMismatch,

    /// The requested document does not exist or was never signed.
    #[error("Document not found")]
    DocumentNotFound,
}

/// The `code` of an error response, readable by outer middleware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorCode(pub &'static str);

/// A `Result` type that uses `AppError` as the error type.
pub type Result<T> = std::result::Result<T, AppError>;

impl AppError {
    /// Stable machine-readable code sent to clients.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::InvalidPassphrase => "INVALID_PASSPHRASE",
            AppError::CertificateExpired => "CERTIFICATE_EXPIRED",
            AppError::CertificateNotFound => "CERTIFICATE_NOT_FOUND",
            AppError::SessionLocked => "SESSION_LOCKED",
            AppError::SessionNotFound => "SESSION_NOT_FOUND",
            AppError::SessionExpired => "SESSION_EXPIRED",
            AppError::KeyDecodeTimeout => "KEY_DECODE_TIMEOUT",
            AppError::UnsupportedDocumentType(_) => "UNSUPPORTED_DOCUMENT_TYPE",
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::Authentication(_) => "AUTHENTICATION_FAILED",
            AppError::Unauthorized => "FORBIDDEN",
            AppError::RateLimitExceeded(_) => "RATE_LIMITED",
            // Share-token and lookup failures are indistinguishable on the wire.
            AppError::NotFound
            | AppError::DocumentNotFound
            | AppError::TokenMalformed
            | AppError::TokenExpired
            | AppError::TokenSignatureMismatch => "NOT_FOUND",
            AppError::Database(_)
            | AppError::Pool(_)
            | AppError::PoolConfig(_)
            | AppError::Redis(_)
            | AppError::Io(_)
            | AppError::MissingData(_)
            | AppError::Crypto(_)
            | AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Whether the failure is a connectivity problem worth one retry.
    pub fn is_transient(&self) -> bool {
        match self {
            AppError::Pool(_) => true,
            AppError::Database(e) => e.code().is_none() || e.is_closed(),
            _ => false,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let code = self.code();
        let (status, message) = match self {
            AppError::Database(ref e) => {
                tracing::error!("Database error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Database error".to_string())
            }

            AppError::Pool(ref e) => {
                tracing::error!("Database pool error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Database error".to_string())
            }

            AppError::PoolConfig(ref e) => {
                tracing::error!("Database pool configuration error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Database error".to_string())
            }

            AppError::Redis(ref e) => {
                tracing::error!("Redis error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Cache error".to_string())
            }

            AppError::Io(ref e) => {
                tracing::error!("IO error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "File system error".to_string())
            }

            AppError::MissingData(ref column) => {
                tracing::error!("Missing column in row: {}", column);
                (StatusCode::INTERNAL_SERVER_ERROR, "Database error".to_string())
            }

            AppError::Authentication(ref msg) => {
                tracing::warn!("Authentication failed: {}", msg);
                (StatusCode::UNAUTHORIZED, msg.clone())
            }

            AppError::Unauthorized => {
                tracing::warn!("Authorization failed");
                (StatusCode::FORBIDDEN, "Forbidden".to_string())
            }

            AppError::NotFound
            | AppError::DocumentNotFound
            | AppError::TokenMalformed
            | AppError::TokenExpired
            | AppError::TokenSignatureMismatch => {
                tracing::debug!("Resource not found: {}", self);
                (StatusCode::NOT_FOUND, "Resource not found".to_string())
            }

            AppError::Validation(ref msg) => {
                tracing::debug!("Validation error: {}", msg);
                (StatusCode::BAD_REQUEST, msg.clone())
            }

            AppError::UnsupportedDocumentType(ref kind) => {
                tracing::debug!("Unsupported document type: {}", kind);
                (StatusCode::BAD_REQUEST, self.to_string())
            }

            AppError::Crypto(ref msg) => {
                tracing::error!("Cryptography error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Cryptography error".to_string())
            }

            AppError::Internal(ref msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }

            AppError::RateLimitExceeded(ref msg) => {
                tracing::warn!("Rate limit exceeded: {}", msg);
                (StatusCode::TOO_MANY_REQUESTS, msg.clone())
            }

            AppError::InvalidPassphrase => (StatusCode::UNAUTHORIZED, self.to_string()),
            AppError::CertificateExpired => (StatusCode::UNPROCESSABLE_ENTITY, self.to_string()),
            AppError::CertificateNotFound => (StatusCode::NOT_FOUND, self.to_string()),
            AppError::SessionLocked => (StatusCode::LOCKED, self.to_string()),
            AppError::SessionNotFound => (StatusCode::CONFLICT, self.to_string()),
            AppError::SessionExpired => (StatusCode::UNAUTHORIZED, self.to_string()),

            AppError::KeyDecodeTimeout => {
                tracing::warn!("Key container decoding timed out");
                (StatusCode::SERVICE_UNAVAILABLE, self.to_string())
            }
        };

        let body = sonic_rs::to_string(&sonic_rs::json!({
            "error": message,
            "code": code,
        }))
        .unwrap_or_else(|_| r#"{"error":"Internal server error"}"#.to_string());

        let mut response = (
            status,
            [(http::header::CONTENT_TYPE, "application/json")],
            body,
        )
            .into_response();
        response.extensions_mut().insert(ErrorCode(code));
        response
    }
}
