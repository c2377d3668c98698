//! Shared test fixture: in-memory backends, a fixed clock, a recording
//! mailer and a static DNS resolver.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use frontier_core::config::AppConfig;
use frontier_core::error::ServiceError;
use frontier_core::models::PasskeyUserData;
use frontier_core::schema::{base_schema, SchemaDocument, SchemaRegistry};
use frontier_core::services::{Mailer, TxtResolver};
use frontier_core::store::Clock;
use frontier_core::{AppState, Ports};
use webauthn_rs::prelude::Passkey;
use webauthn_rs_core::proto::{
    AttestationFormat, AttestationMetadata, COSEAlgorithm, COSEEC2Key, COSEKey, COSEKeyType,
    Credential, ECDSACurve, ParsedAttestation, ParsedAttestationData, RegisteredExtensions,
    UserVerificationPolicy,
};

/// Clock pinned to a start instant; tests advance it explicitly.
pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap();
        *now += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

#[derive(Debug, Clone)]
pub struct SentMail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Mailer double that records outgoing mail instead of sending it.
#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<SentMail>>,
}

impl RecordingMailer {
    pub fn last(&self) -> Option<SentMail> {
        self.sent.lock().unwrap().last().cloned()
    }

    pub fn count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), ServiceError> {
        self.sent.lock().unwrap().push(SentMail {
            to: to.to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
        });
        Ok(())
    }
}

/// Resolver double serving TXT records from a map.
#[derive(Default)]
pub struct StaticResolver {
    records: Mutex<HashMap<String, Vec<String>>>,
}

impl StaticResolver {
    pub fn set(&self, name: &str, values: Vec<String>) {
        self.records
            .lock()
            .unwrap()
            .insert(name.to_string(), values);
    }
}

#[async_trait]
impl TxtResolver for StaticResolver {
    async fn lookup_txt(&self, name: &str) -> Result<Vec<String>, ServiceError> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .unwrap_or_default())
    }
}

pub struct TestApp {
    pub config: AppConfig,
    pub state: AppState,
    pub clock: Arc<FixedClock>,
    pub mailer: Arc<RecordingMailer>,
    pub resolver: Arc<StaticResolver>,
}

pub fn spawn_app() -> TestApp {
    spawn_app_with_schema(base_schema())
}

pub fn spawn_app_with_schema(document: SchemaDocument) -> TestApp {
    let config = AppConfig::default();
    let registry = Arc::new(SchemaRegistry::new(document).expect("schema compiles"));
    let clock = Arc::new(FixedClock::new(Utc::now()));
    let mailer = Arc::new(RecordingMailer::default());
    let resolver = Arc::new(StaticResolver::default());

    let state = AppState::build(
        &config,
        registry,
        Ports {
            clock: clock.clone(),
            mailer: mailer.clone(),
            resolver: resolver.clone(),
        },
    )
    .expect("state builds");

    TestApp {
        config,
        state,
        clock,
        mailer,
        resolver,
    }
}

/// A stored passkey credential, assembled without a registration
/// ceremony. The key material is inert; it only has to round-trip
/// through challenge construction.
pub fn seeded_passkey() -> Passkey {
    let credential = Credential {
        cred_id: vec![0x01; 16].into(),
        cred: COSEKey {
            type_: COSEAlgorithm::ES256,
            key: COSEKeyType::EC_EC2(COSEEC2Key {
                curve: ECDSACurve::SECP256R1,
                x: vec![0x02; 32].into(),
                y: vec![0x03; 32].into(),
            }),
        },
        counter: 0,
        transports: None,
        user_verified: false,
        backup_eligible: false,
        backup_state: false,
        registration_policy: UserVerificationPolicy::Preferred,
        extensions: RegisteredExtensions::none(),
        attestation: ParsedAttestation {
            data: ParsedAttestationData::None,
            metadata: AttestationMetadata::None,
        },
        attestation_format: AttestationFormat::None,
    };
    Passkey::from(credential)
}

/// Store one passkey credential for `email`, so the next flow start
/// takes the login branch.
pub async fn seed_passkey_user(app: &TestApp, email: &str) {
    let mut data = PasskeyUserData::new(email.to_string(), app.clock.now());
    data.credentials.push(seeded_passkey());
    app.state.stores.passkeys.upsert(data).await.unwrap();
}

/// Pull the 6-digit code out of an OTP mail body.
pub fn extract_otp(body: &str) -> String {
    let digits: Vec<char> = body.chars().collect();
    for window in digits.windows(6) {
        if window.iter().all(|c| c.is_ascii_digit()) {
            return window.iter().collect();
        }
    }
    panic!("no 6-digit code in mail body: {body}");
}

/// Pull the `code` query parameter out of a magic-link mail body.
pub fn extract_link_nonce(body: &str) -> String {
    let start = body.find("code=").expect("link carries a code") + "code=".len();
    body[start..]
        .chars()
        .take_while(|c| c.is_ascii_hexdigit())
        .collect()
}
