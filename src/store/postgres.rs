//! PostgreSQL store over sqlx.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::FromRow;
use std::time::Duration;
use uuid::Uuid;

use crate::config::DatabaseConfig;
use crate::models::{
    Account, Client, ClientToken, TokenBase, TokenRecord, TokenUsage, UserToken,
};
use crate::store::{NewTokenOptions, TokenStore};

/// Create a PostgreSQL connection pool.
pub async fn create_pool(config: &DatabaseConfig) -> Result<PgPool, sqlx::Error> {
    tracing::info!("Connecting to PostgreSQL...");

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(30))
        .idle_timeout(Duration::from_secs(600))
        .connect(&config.url)
        .await?;

    tracing::info!("Successfully connected to PostgreSQL");
    Ok(pool)
}

/// Run schema migrations.
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    tracing::info!("Running database migrations...");
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Flat row shape for the tokens table; converted to the discriminated
/// [`TokenRecord`] on read.
#[derive(Debug, FromRow)]
struct TokenRow {
    token_id: Uuid,
    client_id: Uuid,
    account_id: Option<Uuid>,
    refresh_token_id: Option<Uuid>,
    enabled: bool,
    scope: Vec<String>,
    origin: Option<String>,
    audience: Option<String>,
    subject: Option<String>,
    expires_utc: Option<DateTime<Utc>>,
    payload: Option<Value>,
    usage_count: Option<i64>,
    usage_max: Option<i64>,
    created_utc: DateTime<Utc>,
}

impl TokenRow {
    fn into_record(self) -> TokenRecord {
        let base = TokenBase {
            id: self.token_id,
            client_id: self.client_id,
            enabled: self.enabled,
            scope: self.scope,
            origin: self.origin,
            audience: self.audience,
            subject: self.subject,
            expires_utc: self.expires_utc,
            payload: self.payload.and_then(|v| match v {
                Value::Object(map) => Some(map),
                _ => None,
            }),
            usage: match (self.usage_count, self.usage_max) {
                (Some(count), Some(max)) => Some(TokenUsage { count, max }),
                _ => None,
            },
            created_utc: self.created_utc,
        };

        match self.account_id {
            Some(account_id) => TokenRecord::User(UserToken {
                base,
                account_id,
                refresh_token_id: self.refresh_token_id,
            }),
            None => TokenRecord::Client(ClientToken { base }),
        }
    }
}

/// PostgreSQL-backed token store.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Health check - ping the database.
    pub async fn health_check(&self) -> Result<(), anyhow::Error> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| anyhow::anyhow!("Database health check failed: {}", e))?;
        Ok(())
    }

    async fn insert_token(&self, record: &TokenRecord) -> Result<(), anyhow::Error> {
        let base = record.base();
        sqlx::query(
            r#"
            INSERT INTO tokens (
                token_id, client_id, account_id, refresh_token_id, enabled, scope,
                origin, audience, subject, expires_utc, payload, usage_count,
                usage_max, created_utc
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(base.id)
        .bind(base.client_id)
        .bind(record.account_id())
        .bind(record.refresh_token_id())
        .bind(base.enabled)
        .bind(&base.scope)
        .bind(&base.origin)
        .bind(&base.audience)
        .bind(&base.subject)
        .bind(base.expires_utc)
        .bind(base.payload.clone().map(Value::Object))
        .bind(base.usage.as_ref().map(|u| u.count))
        .bind(base.usage.as_ref().map(|u| u.max))
        .bind(base.created_utc)
        .execute(&self.pool)
        .await
        .map_err(|e| anyhow::anyhow!(e))?;
        Ok(())
    }
}

#[async_trait]
impl TokenStore for PgStore {
    async fn create_client_token(
        &self,
        client: &Client,
        scope: Vec<String>,
        payload: Option<Map<String, Value>>,
        opts: NewTokenOptions,
    ) -> Result<TokenRecord, anyhow::Error> {
        let base = opts.build_base(client.client_id, scope, payload);
        let record = TokenRecord::Client(ClientToken { base });
        self.insert_token(&record).await?;
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
        self.insert_token(&record).await?;
        Ok(record)
    }

    async fn find_token(&self, id: Uuid) -> Result<Option<TokenRecord>, anyhow::Error> {
        let row = sqlx::query_as::<_, TokenRow>("SELECT * FROM tokens WHERE token_id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| anyhow::anyhow!(e))?;
        Ok(row.map(TokenRow::into_record))
    }

    async fn find_by_refresh_token(
        &self,
        refresh_token_id: Uuid,
        client_id: Uuid,
    ) -> Result<Option<TokenRecord>, anyhow::Error> {
        let row = sqlx::query_as::<_, TokenRow>(
            "SELECT * FROM tokens WHERE refresh_token_id = $1 AND client_id = $2",
        )
        .bind(refresh_token_id)
        .bind(client_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| anyhow::anyhow!(e))?;
        Ok(row.map(TokenRow::into_record))
    }

    async fn revoke(&self, id: Uuid) -> Result<bool, anyhow::Error> {
        // DELETE ... RETURNING makes the revoke linearizable per record: of two
        // concurrent revokes, exactly one sees the row.
        let deleted =
            sqlx::query_scalar::<_, Uuid>("DELETE FROM tokens WHERE token_id = $1 RETURNING token_id")
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| anyhow::anyhow!(e))?;
        Ok(deleted.is_some())
    }

    async fn increment_usage(&self, id: Uuid) -> Result<Option<i64>, anyhow::Error> {
        let count = sqlx::query_scalar::<_, i64>(
            r#"
            UPDATE tokens
            SET usage_count = usage_count + 1
            WHERE token_id = $1 AND usage_count IS NOT NULL
            RETURNING usage_count
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| anyhow::anyhow!(e))?;
        Ok(count)
    }

    async fn find_client(&self, id: Uuid) -> Result<Option<Client>, anyhow::Error> {
        sqlx::query_as::<_, Client>("SELECT * FROM clients WHERE client_id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| anyhow::anyhow!(e))
    }

    async fn find_account(&self, id: Uuid) -> Result<Option<Account>, anyhow::Error> {
        sqlx::query_as::<_, Account>("SELECT * FROM accounts WHERE account_id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| anyhow::anyhow!(e))
    }

    async fn find_account_by_username(
        &self,
        username: &str,
    ) -> Result<Option<Account>, anyhow::Error> {
        sqlx::query_as::<_, Account>("SELECT * FROM accounts WHERE username = $1")
            .bind(username)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| anyhow::anyhow!(e))
    }

    async fn insert_client(&self, client: &Client) -> Result<(), anyhow::Error> {
        sqlx::query(
            r#"
            INSERT INTO clients (
                client_id, name, client_type_code, enabled, deleted, scope,
                restricted, allow_list, deny_list, expiration, secret_digest,
                allowed_origins, created_utc, updated_utc
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(client.client_id)
        .bind(&client.name)
        .bind(&client.client_type_code)
        .bind(client.enabled)
        .bind(client.deleted)
        .bind(&client.scope)
        .bind(client.restricted)
        .bind(&client.allow_list)
        .bind(&client.deny_list)
        .bind(&client.expiration)
        .bind(&client.secret_digest)
        .bind(&client.allowed_origins)
        .bind(client.created_utc)
        .bind(client.updated_utc)
        .execute(&self.pool)
        .await
        .map_err(|e| anyhow::anyhow!(e))?;
        Ok(())
    }

    async fn insert_account(&self, account: &Account) -> Result<(), anyhow::Error> {
        sqlx::query(
            r#"
            INSERT INTO accounts (
                account_id, username, password_hash, enabled, deleted, scope,
                verification_required, verified_utc, created_utc, updated_utc
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(account.account_id)
        .bind(&account.username)
        .bind(&account.password_hash)
        .bind(account.enabled)
        .bind(account.deleted)
        .bind(&account.scope)
        .bind(account.verification_required)
        .bind(account.verified_utc)
        .bind(account.created_utc)
        .bind(account.updated_utc)
        .execute(&self.pool)
        .await
        .map_err(|e| anyhow::anyhow!(e))?;
        Ok(())
    }
}
