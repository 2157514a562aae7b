//! Shared setup for integration tests: an in-memory store, a fixed clock and
//! a seeded client + account.

#![allow(dead_code)]

use chrono::Utc;
use std::sync::Arc;

use gatekeeper::config::{DatabaseConfig, Environment, GatekeeperConfig, TokenConfig};
use gatekeeper::models::{Account, Client, ClientType};
use gatekeeper::services::{FixedClock, GrantRequest};
use gatekeeper::store::{MemoryStore, TokenStore};
use gatekeeper::utils::{hash_password, secret_digest, Password};
use gatekeeper::Gatekeeper;

pub const CLIENT_SECRET: &str = "s3cret";
pub const ALICE_PASSWORD: &str = "correct-horse-battery-staple";

pub fn test_config() -> GatekeeperConfig {
    GatekeeperConfig {
        environment: Environment::Dev,
        service_name: "gatekeeper-test".to_string(),
        log_level: "debug".to_string(),
        database: DatabaseConfig {
            url: "postgres://unused-in-tests/gatekeeper".to_string(),
            max_connections: 5,
            min_connections: 1,
        },
        token: TokenConfig {
            algorithm: "HS256".to_string(),
            secret: Some("integration-test-secret".to_string()),
            private_key_path: None,
            public_key_path: None,
            issuer: "gatekeeper-test".to_string(),
            access_token_expiry_minutes: None,
            verification_expiry_minutes: 60,
            password_reset_expiry_minutes: 30,
        },
    }
}

pub struct TestHarness {
    pub gate: Gatekeeper,
    pub store: Arc<MemoryStore>,
    pub clock: Arc<FixedClock>,
    pub client: Client,
    pub account: Account,
}

/// Wire a gatekeeper over an in-memory store with one confidential client
/// ("app1", secret `CLIENT_SECRET`, scope "read") and one enabled account
/// ("alice", password `ALICE_PASSWORD`).
pub async fn setup() -> TestHarness {
    gatekeeper::init_tracing("debug");

    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(FixedClock::new(Utc::now()));
    let gate = Gatekeeper::with_clock(&test_config(), store.clone(), clock.clone())
        .expect("Failed to wire gatekeeper");

    let mut client = Client::new("app1".to_string(), ClientType::Native);
    client.scope = vec!["read".to_string()];
    client.secret_digest = Some(secret_digest(CLIENT_SECRET));
    store.insert_client(&client).await.unwrap();

    let password_hash = hash_password(&Password::new(ALICE_PASSWORD.to_string())).unwrap();
    let mut account = Account::new("alice".to_string(), password_hash.into_string());
    account.scope = vec!["profile".to_string()];
    store.insert_account(&account).await.unwrap();

    TestHarness {
        gate,
        store,
        clock,
        client,
        account,
    }
}

pub fn password_request(harness: &TestHarness) -> GrantRequest {
    GrantRequest {
        grant_type: Some("password".to_string()),
        client_id: Some(harness.client.client_id.to_string()),
        username: Some("alice".to_string()),
        password: Some(ALICE_PASSWORD.to_string()),
        ..Default::default()
    }
}

pub fn client_credentials_request(harness: &TestHarness) -> GrantRequest {
    GrantRequest {
        grant_type: Some("client_credentials".to_string()),
        client_id: Some(harness.client.client_id.to_string()),
        client_secret: Some(CLIENT_SECRET.to_string()),
        ..Default::default()
    }
}

pub fn refresh_request(harness: &TestHarness, refresh_token: &str) -> GrantRequest {
    GrantRequest {
        grant_type: Some("refresh_token".to_string()),
        client_id: Some(harness.client.client_id.to_string()),
        refresh_token: Some(refresh_token.to_string()),
        ..Default::default()
    }
}
