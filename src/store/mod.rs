//! Persistence seam for token records, clients and accounts.
//!
//! The issuance and verification core only ever talks to [`TokenStore`]; the
//! backing storage (Postgres in production, in-memory in tests) stays behind
//! this trait.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::{create_pool, run_migrations, PgStore};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::models::{Account, Client, TokenBase, TokenRecord, TokenUsage};

/// Options applied to a newly created token record.
#[derive(Debug, Clone, Default)]
pub struct NewTokenOptions {
    pub origin: Option<String>,
    pub audience: Option<String>,
    pub subject: Option<String>,
    pub expires_utc: Option<DateTime<Utc>>,
    pub usage_max: Option<i64>,
    /// Allocate a refresh-token id on the record (user tokens only).
    pub refreshable: bool,
}

impl NewTokenOptions {
    pub(crate) fn build_base(
        &self,
        client_id: Uuid,
        scope: Vec<String>,
        payload: Option<Map<String, Value>>,
    ) -> TokenBase {
        let mut base = TokenBase::new(client_id);
        base.scope = scope;
        base.payload = payload;
        base.origin = self.origin.clone();
        base.audience = self.audience.clone();
        base.subject = self.subject.clone();
        base.expires_utc = self.expires_utc;
        base.usage = self.usage_max.map(TokenUsage::with_max);
        base
    }
}

/// Persistence operations required by the token core.
///
/// `revoke` and `increment_usage` must be atomic per record: concurrent
/// duplicate calls observe a single linearizable outcome.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Create and persist a client-only token record.
    async fn create_client_token(
        &self,
        client: &Client,
        scope: Vec<String>,
        payload: Option<Map<String, Value>>,
        opts: NewTokenOptions,
    ) -> Result<TokenRecord, anyhow::Error>;

    /// Create and persist a user token record; allocates a refresh-token id
    /// when `opts.refreshable` is set.
    async fn create_user_token(
        &self,
        account: &Account,
        client: &Client,
        scope: Vec<String>,
        payload: Option<Map<String, Value>>,
        opts: NewTokenOptions,
    ) -> Result<TokenRecord, anyhow::Error>;

    async fn find_token(&self, id: Uuid) -> Result<Option<TokenRecord>, anyhow::Error>;

    /// Find the user token carrying `refresh_token_id`, scoped to `client_id`
    /// so one client's refresh token can never be replayed through another.
    async fn find_by_refresh_token(
        &self,
        refresh_token_id: Uuid,
        client_id: Uuid,
    ) -> Result<Option<TokenRecord>, anyhow::Error>;

    /// Delete a token record. Returns whether a record was actually removed;
    /// revoking twice is safe and reports `false` the second time.
    async fn revoke(&self, id: Uuid) -> Result<bool, anyhow::Error>;

    /// Atomically increment a usage-limited token's counter, returning the new
    /// count. `None` when the record is missing or not usage-limited.
    async fn increment_usage(&self, id: Uuid) -> Result<Option<i64>, anyhow::Error>;

    async fn find_client(&self, id: Uuid) -> Result<Option<Client>, anyhow::Error>;

    async fn find_account(&self, id: Uuid) -> Result<Option<Account>, anyhow::Error>;

    async fn find_account_by_username(
        &self,
        username: &str,
    ) -> Result<Option<Account>, anyhow::Error>;

    async fn insert_client(&self, client: &Client) -> Result<(), anyhow::Error>;

    async fn insert_account(&self, account: &Account) -> Result<(), anyhow::Error>;
}
