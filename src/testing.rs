//! Fixtures shared by unit tests.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use once_cell::sync::Lazy;
use openssl::{
    asn1::Asn1Time,
    bn::BigNum,
    hash::MessageDigest,
    pkcs12::Pkcs12,
    pkey::PKey,
    rsa::Rsa,
    x509::{X509, X509NameBuilder},
};
use uuid::Uuid;

use crate::clock::{Clock, ManualClock};
use crate::crypto::pkcs12::{KeyMaterialCodec, Pkcs12Codec};
use crate::models::certificate::Certificate;
use crate::repositories::key_containers::MemoryKeyContainerSource;
use crate::repositories::memory::MemoryDocumentStore;
use crate::services::sessions::{CertificateSessionManager, SessionPolicy};

pub const PASSPHRASE: &str = "correct horse battery staple";

/// A PKCS#12 container and the SPKI public key inside it.
pub struct TestBundle {
    pub container: Vec<u8>,
    pub public_key: Vec<u8>,
}

pub static BUNDLE: Lazy<TestBundle> = Lazy::new(|| build_bundle("DRA ANA SOUZA", 4242));

/// A second identity, used to provoke key/record mismatches.
pub static OTHER_BUNDLE: Lazy<TestBundle> = Lazy::new(|| build_bundle("DR OUTRO", 7));

fn not_before() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

fn not_after() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 12, 31, 23, 59, 59).unwrap()
}

/// The instant every test clock starts at.
pub fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
}

fn build_bundle(common_name: &str, serial: u32) -> TestBundle {
    let key = PKey::from_rsa(Rsa::generate(2048).unwrap()).unwrap();

    let mut name = X509NameBuilder::new().unwrap();
    name.append_entry_by_text("C", "BR").unwrap();
    name.append_entry_by_text("O", "ICP-Brasil").unwrap();
    name.append_entry_by_text("CN", common_name).unwrap();
    let name = name.build();

    let mut cert = X509::builder().unwrap();
    cert.set_version(2).unwrap();
    let serial = BigNum::from_u32(serial).unwrap().to_asn1_integer().unwrap();
    cert.set_serial_number(&serial).unwrap();
    cert.set_subject_name(&name).unwrap();
    cert.set_issuer_name(&name).unwrap();
    cert.set_pubkey(&key).unwrap();
    cert.set_not_before(&Asn1Time::from_unix(not_before().timestamp()).unwrap())
        .unwrap();
    cert.set_not_after(&Asn1Time::from_unix(not_after().timestamp()).unwrap())
        .unwrap();
    cert.sign(&key, MessageDigest::sha256()).unwrap();
    let cert = cert.build();

    let container = Pkcs12::builder()
        .name("medsign")
        .pkey(&key)
        .cert(&cert)
        .build2(PASSPHRASE)
        .unwrap()
        .to_der()
        .unwrap();

    TestBundle {
        container,
        public_key: key.public_key_to_der().unwrap(),
    }
}

/// An active certificate record matching [`BUNDLE`].
pub fn certificate_for(owner_id: Uuid) -> Certificate {
    let id = Uuid::new_v4();
    Certificate {
        id,
        owner_id,
        subject_dn: "C=BR, O=ICP-Brasil, CN=DRA ANA SOUZA".to_string(),
        issuer_dn: "C=BR, O=ICP-Brasil, CN=DRA ANA SOUZA".to_string(),
        serial_number: "1092".to_string(),
        not_before: not_before(),
        not_after: not_after(),
        public_key: BUNDLE.public_key.clone(),
        container_ref: format!("{}.p12.sealed", id),
        active: true,
        created_at: not_before(),
    }
}

pub fn test_policy() -> SessionPolicy {
    SessionPolicy {
        idle_timeout: Duration::from_secs(300),
        absolute_timeout: Duration::from_secs(1800),
        key_decode_timeout: Duration::from_secs(5),
        max_concurrent_decodes: 4,
    }
}

/// A session manager wired to in-memory collaborators and a manual clock,
/// with one professional enrolled.
pub struct Harness {
    pub store: Arc<MemoryDocumentStore>,
    pub containers: Arc<MemoryKeyContainerSource>,
    pub clock: Arc<ManualClock>,
    pub sessions: Arc<CertificateSessionManager>,
    pub owner_id: Uuid,
    pub certificate: Certificate,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with(Arc::new(Pkcs12Codec), test_policy()).await
    }

    pub async fn with(codec: Arc<dyn KeyMaterialCodec>, policy: SessionPolicy) -> Self {
        let store = Arc::new(MemoryDocumentStore::new());
        let containers = Arc::new(MemoryKeyContainerSource::new());
        let clock = Arc::new(ManualClock::new(epoch()));

        let owner_id = Uuid::new_v4();
        let certificate = certificate_for(owner_id);
        store.insert_certificate(certificate.clone()).await;
        containers.insert(certificate.container_ref.clone(), BUNDLE.container.clone());

        let sessions = Arc::new(CertificateSessionManager::new(
            store.clone(),
            containers.clone(),
            codec,
            clock.clone() as Arc<dyn Clock>,
            policy,
        ));

        Self {
            store,
            containers,
            clock,
            sessions,
            owner_id,
            certificate,
        }
    }

    /// A harness whose owner already holds an unlocked session.
    pub async fn started() -> Self {
        let harness = Self::new().await;
        harness
            .sessions
            .start(harness.owner_id, None, PASSPHRASE)
            .await
            .unwrap();
        harness
    }

    pub fn advance(&self, by: Duration) {
        self.clock.advance(by);
    }
}
