//! Token issuance: eligibility checks, record creation, signing.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::sync::Arc;
use uuid::Uuid;
use validator::{ValidationError, ValidationErrors};

use crate::models::{Account, Client, TokenRecord};
use crate::services::clock::Clock;
use crate::services::codec::{Claims, SignOptions};
use crate::services::error::AuthError;
use crate::services::registry::{CodecRegistry, PASSWORD_RESET_SUBJECT, VERIFICATION_SUBJECT};
use crate::store::{NewTokenOptions, TokenStore};
use crate::utils::parse_relative_duration;

/// Per-issuance options.
#[derive(Debug, Clone, Default)]
pub struct IssueOptions {
    pub subject: Option<String>,
    pub audience: Option<String>,
    pub origin: Option<String>,
    /// Relative duration override ("5 seconds", "1 day"); falls back to the
    /// client's expiration policy, then to no expiration.
    pub expiration: Option<String>,
    /// Explicit scope; defaults to the client's granted scope (plus the
    /// account's for user tokens).
    pub scope: Option<Vec<String>>,
    pub usage_max: Option<i64>,
    pub refreshable: bool,
}

/// A freshly minted token pair plus its backing record.
#[derive(Debug)]
pub struct IssuedToken {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub record: TokenRecord,
}

pub struct Issuer {
    store: Arc<dyn TokenStore>,
    codecs: Arc<CodecRegistry>,
    clock: Arc<dyn Clock>,
}

impl Issuer {
    pub fn new(store: Arc<dyn TokenStore>, codecs: Arc<CodecRegistry>, clock: Arc<dyn Clock>) -> Self {
        Self { store, codecs, clock }
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn codecs(&self) -> &Arc<CodecRegistry> {
        &self.codecs
    }

    /// Issue a client-only token.
    ///
    /// A restricted client requires an account and therefore cannot obtain an
    /// anonymous client token.
    pub async fn issue_client_token(
        &self,
        client: &Client,
        payload: Option<&Map<String, Value>>,
        opts: IssueOptions,
    ) -> Result<IssuedToken, AuthError> {
        if client.deleted {
            return Err(AuthError::ClientDeleted);
        }
        if !client.enabled {
            return Err(AuthError::ClientDisabled);
        }
        if client.restricted {
            return Err(AuthError::ClientRestricted);
        }

        let now = self.clock.now();
        let scope = opts.scope.clone().unwrap_or_else(|| client.scope.clone());
        let expires_utc = self.compute_expiration(client, &opts, now)?;

        let record = self
            .store
            .create_client_token(
                client,
                scope,
                payload.cloned(),
                NewTokenOptions {
                    origin: opts.origin,
                    audience: opts.audience,
                    subject: opts.subject,
                    expires_utc,
                    usage_max: opts.usage_max,
                    refreshable: false,
                },
            )
            .await?;

        let access_token = self.sign_access(&record, now)?;

        tracing::info!(client_id = %client.client_id, token_id = %record.id(), "Issued client token");

        Ok(IssuedToken {
            access_token,
            refresh_token: None,
            record,
        })
    }

    /// Issue a token on behalf of an account.
    pub async fn issue_user_token(
        &self,
        account: &Account,
        client: &Client,
        payload: Option<&Map<String, Value>>,
        opts: IssueOptions,
    ) -> Result<IssuedToken, AuthError> {
        if client.deleted {
            return Err(AuthError::ClientDeleted);
        }
        if !client.enabled {
            return Err(AuthError::ClientDisabled);
        }
        if account.deleted {
            return Err(AuthError::AccountDeleted);
        }
        if !account.enabled {
            return Err(AuthError::AccountDisabled);
        }
        if client.restricted && !client.allows_account(account.account_id) {
            return Err(AuthError::InvalidAccount);
        }

        let now = self.clock.now();
        let scope = opts
            .scope
            .clone()
            .unwrap_or_else(|| merge_scope(&client.scope, &account.scope));
        let expires_utc = self.compute_expiration(client, &opts, now)?;

        let record = self
            .store
            .create_user_token(
                account,
                client,
                scope,
                payload.cloned(),
                NewTokenOptions {
                    origin: opts.origin,
                    audience: opts.audience,
                    subject: opts.subject,
                    expires_utc,
                    usage_max: opts.usage_max,
                    refreshable: opts.refreshable,
                },
            )
            .await?;

        let access_token = self.sign_access(&record, now)?;

        let refresh_token = match record.refresh_token_id() {
            Some(refresh_id) => Some(self.codecs.refresh().sign(
                None,
                SignOptions {
                    jwt_id: refresh_id,
                    ..Default::default()
                },
                now,
            )?),
            None => None,
        };

        tracing::info!(
            client_id = %client.client_id,
            account_id = %account.account_id,
            token_id = %record.id(),
            refreshable = refresh_token.is_some(),
            "Issued user token"
        );

        Ok(IssuedToken {
            access_token,
            refresh_token,
            record,
        })
    }

    /// Verify an access token with the primary codec.
    pub fn verify_token(&self, token: &str) -> Result<Claims, AuthError> {
        self.codecs.access().verify(token, self.clock.now())
    }

    /// Short-lived signed token for account verification links. Not persisted;
    /// the `jti` claim binds it to the account.
    pub fn issue_verification_token(&self, account: &Account) -> Result<String, AuthError> {
        self.codecs.verification().sign(
            None,
            SignOptions {
                jwt_id: account.account_id,
                ..Default::default()
            },
            self.clock.now(),
        )
    }

    /// Resolve a verification token back to its account id.
    pub fn verify_verification_token(&self, token: &str) -> Result<Uuid, AuthError> {
        let claims = self.codecs.verification().verify(token, self.clock.now())?;
        if claims.sub.as_deref() != Some(VERIFICATION_SUBJECT) {
            return Err(AuthError::InvalidToken(
                "Not an account verification token".to_string(),
            ));
        }
        claims.jwt_id()
    }

    /// Short-lived signed token for password reset links.
    pub fn issue_password_reset_token(&self, account: &Account) -> Result<String, AuthError> {
        self.codecs.password_reset().sign(
            None,
            SignOptions {
                jwt_id: account.account_id,
                ..Default::default()
            },
            self.clock.now(),
        )
    }

    /// Resolve a password reset token back to its account id.
    pub fn verify_password_reset_token(&self, token: &str) -> Result<Uuid, AuthError> {
        let claims = self.codecs.password_reset().verify(token, self.clock.now())?;
        if claims.sub.as_deref() != Some(PASSWORD_RESET_SUBJECT) {
            return Err(AuthError::InvalidToken(
                "Not a password reset token".to_string(),
            ));
        }
        claims.jwt_id()
    }

    /// Expiration is computed once at issuance: the per-request override wins,
    /// then the client's policy, then no expiration.
    fn compute_expiration(
        &self,
        client: &Client,
        opts: &IssueOptions,
        now: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>, AuthError> {
        let policy = opts.expiration.as_deref().or(client.expiration.as_deref());
        match policy {
            Some(policy) => {
                let duration = parse_relative_duration(policy).map_err(|e| {
                    let mut errors = ValidationErrors::new();
                    let mut error = ValidationError::new("expiration");
                    error.message = Some(e.to_string().into());
                    errors.add("expiration", error);
                    AuthError::Validation(errors)
                })?;
                Ok(Some(now + duration))
            }
            None => Ok(None),
        }
    }

    fn sign_access(&self, record: &TokenRecord, now: DateTime<Utc>) -> Result<String, AuthError> {
        let base = record.base();
        self.codecs.access().sign(
            base.payload.as_ref(),
            SignOptions {
                jwt_id: base.id,
                subject: base.subject.clone(),
                audience: base.audience.clone(),
                expires_utc: base.expires_utc,
                scope: base.scope.clone(),
            },
            now,
        )
    }
}

fn merge_scope(client_scope: &[String], account_scope: &[String]) -> Vec<String> {
    let mut merged: Vec<String> = client_scope.to_vec();
    for entry in account_scope {
        if !merged.contains(entry) {
            merged.push(entry.clone());
        }
    }
    merged
}
