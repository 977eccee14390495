//! Shared fixtures for the integration tests
#![allow(dead_code)]

use std::net::TcpListener;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use lazy_static::lazy_static;
use regex::Regex;

use authcore::auth::{BcryptHasher, TokenIssuer};
use authcore::clock::MockClock;
use authcore::configuration::JwtSettings;
use authcore::domain::User;
use authcore::email_client::NotificationSender;
use authcore::error::EmailError;
use authcore::routes::CookiePolicy;
use authcore::services::{AuthService, Registration};
use authcore::startup::run;
use authcore::store::{InMemoryStore, Stores};

pub const PASSWORD: &str = "SecurePass123";

lazy_static! {
    static ref CODE: Regex = Regex::new(r"\b(\d{6})\b").unwrap();
}

#[derive(Debug, Clone)]
pub struct SentMessage {
    pub recipient: String,
    pub subject: String,
    pub html_body: String,
}

/// Keeps every message instead of delivering it
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<SentMessage>>,
}

impl RecordingNotifier {
    pub fn sent_to(&self, recipient: &str) -> Vec<SentMessage> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.recipient == recipient)
            .cloned()
            .collect()
    }

    /// The verification code from the newest message to `recipient`
    pub fn last_code_for(&self, recipient: &str) -> String {
        let message = self
            .sent_to(recipient)
            .pop()
            .expect("No message was sent to this recipient");
        CODE.captures(&message.html_body)
            .expect("Message carries no verification code")[1]
            .to_string()
    }
}

#[async_trait]
impl NotificationSender for RecordingNotifier {
    async fn send(&self, recipient: &str, subject: &str, html_body: &str) -> Result<(), EmailError> {
        self.sent.lock().unwrap().push(SentMessage {
            recipient: recipient.to_string(),
            subject: subject.to_string(),
            html_body: html_body.to_string(),
        });
        Ok(())
    }
}

/// Rejects every message
pub struct FailingNotifier;

#[async_trait]
impl NotificationSender for FailingNotifier {
    async fn send(&self, _: &str, _: &str, _: &str) -> Result<(), EmailError> {
        Err(EmailError::SendFailed("mail server unreachable".to_string()))
    }
}

pub fn jwt_settings() -> JwtSettings {
    JwtSettings {
        secret: "test-secret-key-at-least-32-characters-long".to_string(),
        issuer: "authcore-test".to_string(),
        access_token_expiry: 3600,
        refresh_token_expiry: 604_800,
    }
}

pub fn token_issuer() -> TokenIssuer {
    TokenIssuer::new(&jwt_settings()).expect("Invalid test JWT settings")
}

/// Everything a service-level test needs to drive and inspect the core
pub struct TestService {
    pub service: Arc<AuthService>,
    pub store: Arc<InMemoryStore>,
    pub clock: Arc<MockClock>,
    pub notifier: Arc<RecordingNotifier>,
}

impl TestService {
    pub fn new() -> Self {
        let store = Arc::new(InMemoryStore::new());
        Self::with_stores(store.clone(), Stores::shared(store))
    }

    /// Build over custom stores; `store` is the inspection handle
    pub fn with_stores(store: Arc<InMemoryStore>, stores: Stores) -> Self {
        let clock = Arc::new(MockClock::new(Utc::now()));
        let notifier = Arc::new(RecordingNotifier::default());
        let service = build_service(stores, clock.clone(), notifier.clone());

        Self {
            service: Arc::new(service),
            store,
            clock,
            notifier,
        }
    }

    pub async fn signup(&self, email: &str) -> User {
        self.service
            .signup(registration(email))
            .await
            .expect("Signup failed")
    }

    /// Sign up and verify, leaving an active account
    pub async fn active_user(&self, email: &str) -> User {
        let user = self.signup(email).await;
        let code = self.notifier.last_code_for(email);
        self.service
            .verify(email, &code)
            .await
            .expect("Verification failed");
        user
    }

    pub fn active_refresh_tokens(&self, user: &User) -> usize {
        self.store
            .refresh_tokens_for(user.id)
            .iter()
            .filter(|r| !r.is_revoked)
            .count()
    }
}

pub fn build_service(
    stores: Stores,
    clock: Arc<MockClock>,
    notifier: Arc<dyn NotificationSender>,
) -> AuthService {
    AuthService::new(
        stores,
        token_issuer(),
        Arc::new(BcryptHasher::new(4)),
        notifier,
        clock,
        chrono::Duration::minutes(15),
    )
}

pub fn registration(email: &str) -> Registration {
    Registration {
        email: email.to_string(),
        password: PASSWORD.to_string(),
        username: "tester".to_string(),
    }
}

pub struct TestApp {
    pub address: String,
    pub store: Arc<InMemoryStore>,
    pub clock: Arc<MockClock>,
    pub notifier: Arc<RecordingNotifier>,
}

/// Run the server on an ephemeral port over the in-memory store
pub fn spawn_app() -> TestApp {
    let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();
    let address = format!("http://127.0.0.1:{}", port);

    let store = Arc::new(InMemoryStore::new());
    let clock = Arc::new(MockClock::new(Utc::now()));
    let notifier = Arc::new(RecordingNotifier::default());
    let auth = build_service(Stores::shared(store.clone()), clock.clone(), notifier.clone());

    let server = run(listener, auth, CookiePolicy { secure: false })
        .expect("Failed to create server");
    let _ = tokio::spawn(server);

    TestApp {
        address,
        store,
        clock,
        notifier,
    }
}
