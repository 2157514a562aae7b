//! In-memory store used by tests and local development.
//!
//! A single mutex guards all state, so the increment and delete operations get
//! the same per-record atomicity the SQL backend provides.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

use crate::models::{Account, Client, ClientToken, TokenRecord, UserToken};
use crate::store::{NewTokenOptions, TokenStore};

#[derive(Default)]
struct Inner {
    tokens: HashMap<Uuid, TokenRecord>,
    clients: HashMap<Uuid, Client>,
    accounts: HashMap<Uuid, Account>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live token records (test assertions).
    pub fn token_count(&self) -> usize {
        self.inner.lock().unwrap().tokens.len()
    }

    /// Flip a record's enabled flag in place (test assertions).
    pub fn set_token_enabled(&self, id: Uuid, enabled: bool) {
        if let Some(record) = self.inner.lock().unwrap().tokens.get_mut(&id) {
            record.base_mut().enabled = enabled;
        }
    }
}

#[async_trait]
impl TokenStore for MemoryStore {
    async fn create_client_token(
        &self,
        client: &Client,
        scope: Vec<String>,
        payload: Option<Map<String, Value>>,
        opts: NewTokenOptions,
    ) -> Result<TokenRecord, anyhow::Error> {
        let base = opts.build_base(client.client_id, scope, payload);
        let record = TokenRecord::Client(ClientToken { base });

        let mut inner = self.inner.lock().unwrap();
        inner.tokens.insert(record.id(), record.clone());
        Ok(record)
    }

    async fn create_user_token(
        &self,
        account: &Account,
        client: &Client,
        scope: Vec<String>,
        payload: Option<Map<String, Value>>,
        opts: NewTokenOptions,
    ) -> Result<TokenRecord, anyhow::Error> {
        let refresh_token_id = opts.refreshable.then(Uuid::new_v4);
        let base = opts.build_base(client.client_id, scope, payload);
        let record = TokenRecord::User(UserToken {
            base,
            account_id: account.account_id,
            refresh_token_id,
        });

        let mut inner = self.inner.lock().unwrap();
        inner.tokens.insert(record.id(), record.clone());
        Ok(record)
    }

    async fn find_token(&self, id: Uuid) -> Result<Option<TokenRecord>, anyhow::Error> {
        Ok(self.inner.lock().unwrap().tokens.get(&id).cloned())
    }

    async fn find_by_refresh_token(
        &self,
        refresh_token_id: Uuid,
        client_id: Uuid,
    ) -> Result<Option<TokenRecord>, anyhow::Error> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .tokens
            .values()
            .find(|record| {
                record.refresh_token_id() == Some(refresh_token_id)
                    && record.client_id() == client_id
            })
            .cloned())
    }

    async fn revoke(&self, id: Uuid) -> Result<bool, anyhow::Error> {
        Ok(self.inner.lock().unwrap().tokens.remove(&id).is_some())
    }

    async fn increment_usage(&self, id: Uuid) -> Result<Option<i64>, anyhow::Error> {
        let mut inner = self.inner.lock().unwrap();
        let Some(record) = inner.tokens.get_mut(&id) else {
            return Ok(None);
        };
        let Some(usage) = record.base_mut().usage.as_mut() else {
            return Ok(None);
        };
        usage.count += 1;
        Ok(Some(usage.count))
    }

    async fn find_client(&self, id: Uuid) -> Result<Option<Client>, anyhow::Error> {
        Ok(self.inner.lock().unwrap().clients.get(&id).cloned())
    }

    async fn find_account(&self, id: Uuid) -> Result<Option<Account>, anyhow::Error> {
        Ok(self.inner.lock().unwrap().accounts.get(&id).cloned())
    }

    async fn find_account_by_username(
        &self,
        username: &str,
    ) -> Result<Option<Account>, anyhow::Error> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .accounts
            .values()
            .find(|account| account.username == username)
            .cloned())
    }

    async fn insert_client(&self, client: &Client) -> Result<(), anyhow::Error> {
        self.inner
            .lock()
            .unwrap()
            .clients
            .insert(client.client_id, client.clone());
        Ok(())
    }

    async fn insert_account(&self, account: &Account) -> Result<(), anyhow::Error> {
        self.inner
            .lock()
            .unwrap()
            .accounts
            .insert(account.account_id, account.clone());
        Ok(())
    }
}
