//! PKCS#12 ("A1") key container decoding.
//!
//! The decoded private key only ever lives as PKCS#8 DER inside a zeroizing
//! buffer. An OpenSSL key object is rebuilt for the duration of one `sign`
//! call and dropped immediately afterwards.

use std::fmt;

use chrono::{DateTime, Utc};
use openssl::{
    asn1::{Asn1Time, Asn1TimeRef},
    error::ErrorStack,
    hash::MessageDigest,
    pkcs12::Pkcs12,
    pkey::PKey,
    sign::{Signer, Verifier},
    x509::{X509, X509NameRef},
};
use zeroize::Zeroizing;

use crate::error::{AppError, Result};

/// Public details of the certificate found inside a key container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateDetails {
    pub subject_dn: String,
    pub issuer_dn: String,
    /// Upper-case hex serial number.
    pub serial_number: String,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
    /// SubjectPublicKeyInfo, DER encoded.
    pub public_key: Vec<u8>,
}

impl CertificateDetails {
    /// Extracts the public details of an X.509 certificate.
    pub fn from_x509(cert: &X509) -> Result<Self> {
        let serial_number = cert
            .serial_number()
            .to_bn()
            .and_then(|bn| bn.to_hex_str().map(|hex| hex.to_string()))
            .map_err(crypto_error("Failed to read certificate serial"))?;

        let public_key = cert
            .public_key()
            .and_then(|key| key.public_key_to_der())
            .map_err(crypto_error("Failed to export certificate public key"))?;

        Ok(Self {
            subject_dn: format_name(cert.subject_name()),
            issuer_dn: format_name(cert.issuer_name()),
            serial_number,
            not_before: asn1_to_utc(cert.not_before())?,
            not_after: asn1_to_utc(cert.not_after())?,
            public_key,
        })
    }

    /// The subject's common name, if present.
    pub fn common_name(&self) -> Option<&str> {
        common_name(&self.subject_dn)
    }
}

/// Decrypted signing material: a private key and its certificate.
pub struct KeyMaterial {
    private_key: Zeroizing<Vec<u8>>,
    certificate: CertificateDetails,
    chain_len: usize,
}

impl KeyMaterial {
    /// Wraps an unencrypted PKCS#8 DER private key.
    pub fn new(private_key_pkcs8: Zeroizing<Vec<u8>>, certificate: CertificateDetails) -> Self {
        Self {
            private_key: private_key_pkcs8,
            certificate,
            chain_len: 0,
        }
    }

    pub fn certificate(&self) -> &CertificateDetails {
        &self.certificate
    }

    /// Number of CA certificates bundled with the key.
    pub fn chain_len(&self) -> usize {
        self.chain_len
    }

    /// Signs `payload` with SHA-256 using the held private key.
    pub fn sign(&self, payload: &[u8]) -> Result<Vec<u8>> {
        let key = PKey::private_key_from_pkcs8(&self.private_key)
            .map_err(crypto_error("Failed to load private key"))?;

        let mut signer = Signer::new(MessageDigest::sha256(), &key)
            .map_err(crypto_error("Failed to initialise signer"))?;
        signer
            .update(payload)
            .map_err(crypto_error("Failed to feed signer"))?;
        signer
            .sign_to_vec()
            .map_err(crypto_error("Failed to produce signature"))
    }
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("private_key", &"<redacted>")
            .field("certificate", &self.certificate.subject_dn)
            .field("chain_len", &self.chain_len)
            .finish()
    }
}

/// Turns a key container plus passphrase into usable key material.
pub trait KeyMaterialCodec: Send + Sync {
    fn decode(&self, container: &[u8], passphrase: &str) -> Result<KeyMaterial>;
}

/// OpenSSL-backed PKCS#12 decoder.
#[derive(Debug, Clone, Copy, Default)]
pub struct Pkcs12Codec;

impl KeyMaterialCodec for Pkcs12Codec {
    fn decode(&self, container: &[u8], passphrase: &str) -> Result<KeyMaterial> {
        let pkcs12 = Pkcs12::from_der(container).map_err(|e| {
            tracing::debug!("PKCS#12 parse failure: {}", e);
            AppError::Crypto("Key container is not a valid PKCS#12 bundle".to_string())
        })?;

        // MAC verification and bag decryption both fail on a wrong passphrase.
        let parsed = pkcs12.parse2(passphrase).map_err(|_| AppError::InvalidPassphrase)?;

        let key = parsed
            .pkey
            .ok_or_else(|| AppError::Crypto("PKCS#12 bundle has no private key".to_string()))?;
        let cert = parsed
            .cert
            .ok_or_else(|| AppError::Crypto("PKCS#12 bundle has no certificate".to_string()))?;

        let cert_key = cert
            .public_key()
            .map_err(crypto_error("Failed to read certificate public key"))?;
        if !key.public_eq(&cert_key) {
            return Err(AppError::Crypto(
                "PKCS#12 private key does not match its certificate".to_string(),
            ));
        }

        let private_key = Zeroizing::new(
            key.private_key_to_pkcs8()
                .map_err(crypto_error("Failed to export private key"))?,
        );

        let mut material = KeyMaterial::new(private_key, CertificateDetails::from_x509(&cert)?);
        material.chain_len = parsed.ca.map(|ca| ca.len()).unwrap_or(0);
        Ok(material)
    }
}

/// Checks `signature` over `payload` against a DER SubjectPublicKeyInfo.
pub fn verify_signature(public_key_der: &[u8], payload: &[u8], signature: &[u8]) -> Result<bool> {
    let key = PKey::public_key_from_der(public_key_der)
        .map_err(crypto_error("Failed to load public key"))?;

    let mut verifier = Verifier::new(MessageDigest::sha256(), &key)
        .map_err(crypto_error("Failed to initialise verifier"))?;
    verifier
        .update(payload)
        .map_err(crypto_error("Failed to feed verifier"))?;

    // A malformed signature is reported as an error by some key types.
    Ok(verifier.verify(signature).unwrap_or(false))
}

/// Extracts `CN=` from a formatted distinguished name.
pub fn common_name(dn: &str) -> Option<&str> {
    dn.split(", ")
        .find_map(|part| part.strip_prefix("CN="))
        .filter(|cn| !cn.is_empty())
}

fn format_name(name: &X509NameRef) -> String {
    name.entries()
        .map(|entry| {
            let key = entry
                .object()
                .nid()
                .short_name()
                .unwrap_or("?");
            let value = entry
                .data()
                .as_utf8()
                .map(|value| value.to_string())
                .unwrap_or_default();
            format!("{}={}", key, value)
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn asn1_to_utc(time: &Asn1TimeRef) -> Result<DateTime<Utc>> {
    let epoch = Asn1Time::from_unix(0).map_err(crypto_error("Failed to build epoch"))?;
    let diff = epoch
        .diff(time)
        .map_err(crypto_error("Failed to read certificate validity"))?;

    let seconds = i64::from(diff.days) * 86_400 + i64::from(diff.secs);
    DateTime::from_timestamp(seconds, 0)
        .ok_or_else(|| AppError::Crypto("Certificate validity out of range".to_string()))
}

fn crypto_error(context: &'static str) -> impl Fn(ErrorStack) -> AppError {
    move |e| AppError::Crypto(format!("{}: {}", context, e))
}
