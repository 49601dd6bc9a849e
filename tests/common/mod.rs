#![allow(dead_code)]

use std::sync::Arc;

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
use zeroize::Zeroizing;

use medsign::clock::{Clock, ManualClock};
use medsign::crypto::pkcs12::Pkcs12Codec;
use medsign::models::certificate::Certificate;
use medsign::models::medical_certificate::{MedicalCertificateRecord, Patient, Professional};
use medsign::models::signed_document::DocumentType;
use medsign::repositories::artifacts::MemoryArtifactStore;
use medsign::repositories::key_containers::MemoryKeyContainerSource;
use medsign::repositories::memory::MemoryDocumentStore;
use medsign::services::sessions::{CertificateSessionManager, SessionPolicy};
use medsign::services::share_tokens::ShareTokenService;
use medsign::services::signing::DocumentSigningService;
use medsign::services::verification::VerificationService;
use medsign::state::{PublicState, ShareLinks};

pub const PASSPHRASE: &str = "integration passphrase";
pub const PATIENT_CPF: &str = "987.654.321-00";

/// A generated A1 container and the DER public key inside it.
pub struct Identity {
    pub container: Vec<u8>,
    pub public_key: Vec<u8>,
}

pub static IDENTITY: Lazy<Identity> = Lazy::new(|| {
    let key = PKey::from_rsa(Rsa::generate(2048).unwrap()).unwrap();

    let mut name = X509NameBuilder::new().unwrap();
    name.append_entry_by_text("C", "BR").unwrap();
    name.append_entry_by_text("CN", "DR JOAO PEREIRA").unwrap();
    let name = name.build();

    let mut cert = X509::builder().unwrap();
    cert.set_version(2).unwrap();
    cert.set_serial_number(&BigNum::from_u32(99).unwrap().to_asn1_integer().unwrap())
        .unwrap();
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
        .name("integration")
        .pkey(&key)
        .cert(&cert)
        .build2(PASSPHRASE)
        .unwrap()
        .to_der()
        .unwrap();

    Identity {
        container,
        public_key: key.public_key_to_der().unwrap(),
    }
});

fn not_before() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

fn not_after() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()
}

pub fn start_of_test() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 10, 9, 30, 0).unwrap()
}

/// The whole service wired to in-memory collaborators.
pub struct TestApp {
    pub clock: Arc<ManualClock>,
    pub store: Arc<MemoryDocumentStore>,
    pub artifacts: Arc<MemoryArtifactStore>,
    pub sessions: Arc<CertificateSessionManager>,
    pub signing: DocumentSigningService,
    pub public: PublicState,
    pub owner_id: Uuid,
}

impl TestApp {
    pub async fn new() -> Self {
        let clock = Arc::new(ManualClock::new(start_of_test()));
        let store = Arc::new(MemoryDocumentStore::new());
        let containers = Arc::new(MemoryKeyContainerSource::new());
        let artifacts = Arc::new(MemoryArtifactStore::new());

        let owner_id = Uuid::new_v4();
        let certificate = Certificate {
            id: Uuid::new_v4(),
            owner_id,
            subject_dn: "C=BR, CN=DR JOAO PEREIRA".to_string(),
            issuer_dn: "C=BR, CN=DR JOAO PEREIRA".to_string(),
            serial_number: "63".to_string(),
            not_before: not_before(),
            not_after: not_after(),
            public_key: IDENTITY.public_key.clone(),
            container_ref: "joao.p12.sealed".to_string(),
            active: true,
            created_at: not_before(),
        };
        containers.insert(certificate.container_ref.clone(), IDENTITY.container.clone());
        store.insert_certificate(certificate).await;

        let sessions = Arc::new(CertificateSessionManager::new(
            store.clone(),
            containers,
            Arc::new(Pkcs12Codec),
            clock.clone() as Arc<dyn Clock>,
            SessionPolicy {
                idle_timeout: std::time::Duration::from_secs(300),
                absolute_timeout: std::time::Duration::from_secs(1800),
                key_decode_timeout: std::time::Duration::from_secs(10),
                max_concurrent_decodes: 2,
            },
        ));

        let signing = DocumentSigningService::new(sessions.clone(), store.clone(), clock.clone());

        let public = PublicState {
            verifier: Arc::new(VerificationService::new(store.clone(), 16)),
            share: ShareLinks {
                tokens: Arc::new(ShareTokenService::new(
                    Zeroizing::new(vec![0x5a; 32]),
                    None,
                    clock.clone(),
                    7,
                    30,
                )),
                artifacts: artifacts.clone(),
            },
        };

        Self {
            clock,
            store,
            artifacts,
            sessions,
            signing,
            public,
            owner_id,
        }
    }

    /// Registers public code `sequence/year` for `document_type`/`document_id`,
    /// issued by this app's professional.
    pub async fn register_document(
        &self,
        sequence: i32,
        year: i32,
        document_type: DocumentType,
        document_id: &str,
    ) {
        let patient = Patient {
            id: Uuid::new_v4(),
            full_name: "Carlos Eduardo dos Santos".to_string(),
            cpf: PATIENT_CPF.to_string(),
            phone: Some("+55 21 99876-5432".to_string()),
            address: Some("Av. Atlantica, 500".to_string()),
            birth_date: chrono::NaiveDate::from_ymd_opt(1980, 5, 17),
        };
        let professional = Professional {
            id: Uuid::new_v4(),
            user_id: self.owner_id,
            full_name: "Dr. Joao Pereira".to_string(),
            council: "CRM".to_string(),
            registration_number: "54321".to_string(),
            registration_state: "RJ".to_string(),
        };

        self.store
            .insert_medical_certificate(MedicalCertificateRecord {
                id: Uuid::new_v4(),
                sequence_number: sequence,
                year,
                document_type,
                document_id: document_id.to_string(),
                patient_id: patient.id,
                professional_id: professional.id,
                issued_at: start_of_test(),
            })
            .await;
        self.store.insert_patient(patient).await;
        self.store.insert_professional(professional).await;
    }
}
