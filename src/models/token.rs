//! Token records - the server-side state behind every signed token.
//!
//! A signed token's `jti` claim always equals the backing record's id, which is
//! the sole link between the stateless wire token and the stateful record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Usage cap on a token record. `count` is the number of completed
/// verifications; the token is exhausted once `count` exceeds `max`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub count: i64,
    pub max: i64,
}

impl TokenUsage {
    pub fn with_max(max: i64) -> Self {
        Self { count: 0, max }
    }

    pub fn exhausted(&self) -> bool {
        self.count > self.max
    }
}

/// Fields shared by both token record kinds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenBase {
    pub id: Uuid,
    pub client_id: Uuid,
    pub enabled: bool,
    pub scope: Vec<String>,
    pub origin: Option<String>,
    pub audience: Option<String>,
    pub subject: Option<String>,
    pub expires_utc: Option<DateTime<Utc>>,
    /// Opaque caller-supplied claims carried into the signed token.
    pub payload: Option<Map<String, Value>>,
    pub usage: Option<TokenUsage>,
    pub created_utc: DateTime<Utc>,
}

impl TokenBase {
    pub fn new(client_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            client_id,
            enabled: true,
            scope: Vec::new(),
            origin: None,
            audience: None,
            subject: None,
            expires_utc: None,
            payload: None,
            usage: None,
            created_utc: Utc::now(),
        }
    }
}

/// Client-only credential: no account reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientToken {
    pub base: TokenBase,
}

/// Token issued on behalf of an account; refreshable when a refresh-token id
/// was allocated at creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserToken {
    pub base: TokenBase,
    pub account_id: Uuid,
    pub refresh_token_id: Option<Uuid>,
}

/// Token record, discriminated by the presence of an account reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TokenRecord {
    Client(ClientToken),
    User(UserToken),
}

impl TokenRecord {
    pub fn base(&self) -> &TokenBase {
        match self {
            TokenRecord::Client(t) => &t.base,
            TokenRecord::User(t) => &t.base,
        }
    }

    pub fn base_mut(&mut self) -> &mut TokenBase {
        match self {
            TokenRecord::Client(t) => &mut t.base,
            TokenRecord::User(t) => &mut t.base,
        }
    }

    pub fn id(&self) -> Uuid {
        self.base().id
    }

    pub fn client_id(&self) -> Uuid {
        self.base().client_id
    }

    pub fn account_id(&self) -> Option<Uuid> {
        match self {
            TokenRecord::Client(_) => None,
            TokenRecord::User(t) => Some(t.account_id),
        }
    }

    pub fn refresh_token_id(&self) -> Option<Uuid> {
        match self {
            TokenRecord::Client(_) => None,
            TokenRecord::User(t) => t.refresh_token_id,
        }
    }

    /// Expiration is advisory on the record; it is enforced against the signed
    /// token's `exp` claim at verification time.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self.base().expires_utc {
            Some(expires) => now > expires,
            None => false,
        }
    }
}
