//! Account model - end-user identities that tokens may be issued on behalf of.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// End-user account entity.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Account {
    pub account_id: Uuid,
    pub username: String,
    pub password_hash: String,
    pub enabled: bool,
    pub deleted: bool,
    pub scope: Vec<String>,
    pub verification_required: bool,
    pub verified_utc: Option<DateTime<Utc>>,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl Account {
    pub fn new(username: String, password_hash: String) -> Self {
        let now = Utc::now();
        Self {
            account_id: Uuid::new_v4(),
            username,
            password_hash,
            enabled: true,
            deleted: false,
            scope: Vec::new(),
            verification_required: false,
            verified_utc: None,
            created_utc: now,
            updated_utc: now,
        }
    }

    /// An account is verified when verification is not required, or when the
    /// verification timestamp has been recorded.
    pub fn is_verified(&self) -> bool {
        !self.verification_required || self.verified_utc.is_some()
    }

    /// Mark the account verified as of `now`.
    pub fn mark_verified(&mut self, now: DateTime<Utc>) {
        self.verified_utc = Some(now);
        self.updated_utc = now;
    }
}
