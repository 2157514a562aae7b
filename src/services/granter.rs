//! Grant strategies and dispatch.
//!
//! One-shot flow per grant request: structural validation, strategy selection,
//! client resolution, pluggable pre-checks, credential authentication, then
//! issuance. Structural (schema) validation always precedes the dynamic
//! per-client pre-checks, which precede credential checks.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;
use validator::{Validate, ValidationError, ValidationErrors};

use crate::models::{Client, ClientType};
use crate::services::clock::Clock;
use crate::services::error::AuthError;
use crate::services::issuer::{IssueOptions, IssuedToken, Issuer};
use crate::services::registry::CodecRegistry;
use crate::store::TokenStore;
use crate::utils::{secrets_match, verify_password, Password, PasswordHashString};

pub const GRANT_TYPE_PASSWORD: &str = "password";
pub const GRANT_TYPE_CLIENT_CREDENTIALS: &str = "client_credentials";
pub const GRANT_TYPE_REFRESH_TOKEN: &str = "refresh_token";

/// Incoming grant request: a flat map of string fields from the HTTP layer.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct GrantRequest {
    #[validate(length(min = 1, message = "grant_type must not be empty"))]
    pub grant_type: Option<String>,
    #[validate(length(min = 1, message = "client_id must not be empty"))]
    pub client_id: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub client_secret: Option<String>,
    pub refresh_token: Option<String>,
    pub origin: Option<String>,
    /// Space-separated scope override.
    pub scope: Option<String>,
    /// Truthy ("true"/"1") to request a refresh token alongside the access token.
    pub refreshable: Option<String>,
}

impl GrantRequest {
    pub fn refreshable_requested(&self) -> bool {
        matches!(self.refreshable.as_deref(), Some("true") | Some("1"))
    }

    pub fn scope_list(&self) -> Option<Vec<String>> {
        self.scope
            .as_deref()
            .map(|s| s.split_whitespace().map(str::to_string).collect())
    }

    fn field(&self, name: &str) -> Option<&str> {
        match name {
            "grant_type" => self.grant_type.as_deref(),
            "client_id" => self.client_id.as_deref(),
            "username" => self.username.as_deref(),
            "password" => self.password.as_deref(),
            "client_secret" => self.client_secret.as_deref(),
            "refresh_token" => self.refresh_token.as_deref(),
            "origin" => self.origin.as_deref(),
            _ => None,
        }
    }
}

/// Batch-check that every named field is present and non-empty; all missing
/// fields are reported together.
fn require_fields(req: &GrantRequest, fields: &[&'static str]) -> Result<(), AuthError> {
    let mut errors = ValidationErrors::new();
    for &field in fields {
        match req.field(field) {
            Some(value) if !value.is_empty() => {}
            _ => {
                let mut error = ValidationError::new("required");
                error.message = Some(format!("{} is required", field).into());
                errors.add(field, error);
            }
        }
    }
    if errors.is_empty() {
        Ok(())
    } else {
        Err(AuthError::Validation(errors))
    }
}

/// Successful grant response returned to the HTTP layer.
#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    pub token_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<i64>,
}

impl TokenResponse {
    fn from_issued(issued: IssuedToken, clock: &dyn Clock) -> Self {
        let expires_in = issued
            .record
            .base()
            .expires_utc
            .map(|expires| (expires - clock.now()).num_seconds());
        Self {
            access_token: issued.access_token,
            refresh_token: issued.refresh_token,
            token_type: "Bearer".to_string(),
            expires_in,
        }
    }
}

/// A named grant strategy.
#[async_trait]
pub trait Granter: Send + Sync {
    fn grant_type(&self) -> &'static str;

    /// Structural request-shape validation; runs before any credential check.
    fn validate(&self, req: &GrantRequest) -> Result<(), AuthError>;

    /// Authenticate the credential and mint the token.
    async fn grant(&self, client: &Client, req: &GrantRequest)
        -> Result<TokenResponse, AuthError>;
}

/// Dynamic per-client pre-check, run after structural validation and before
/// the strategy's credential check.
pub trait GrantCheck: Send + Sync {
    fn check(&self, client: &Client, req: &GrantRequest) -> Result<(), AuthError>;
}

/// Origin pre-check: browser-facing client types must present an origin, and
/// any presented origin must be on the client's allow-list.
pub struct OriginCheck;

impl GrantCheck for OriginCheck {
    fn check(&self, client: &Client, req: &GrantRequest) -> Result<(), AuthError> {
        let origin_required = matches!(
            client.client_type(),
            Some(ClientType::Recaptcha) | Some(ClientType::Hybrid)
        );

        match req.origin.as_deref() {
            Some(origin) => {
                if !client.allows_origin(origin) {
                    return Err(AuthError::InvalidOrigin);
                }
            }
            None if origin_required => {
                return Err(AuthError::InvalidOrigin);
            }
            None => {}
        }
        Ok(())
    }
}

/// Resource-owner password grant.
pub struct PasswordGranter {
    store: Arc<dyn TokenStore>,
    issuer: Arc<Issuer>,
}

impl PasswordGranter {
    pub fn new(store: Arc<dyn TokenStore>, issuer: Arc<Issuer>) -> Self {
        Self { store, issuer }
    }
}

#[async_trait]
impl Granter for PasswordGranter {
    fn grant_type(&self) -> &'static str {
        GRANT_TYPE_PASSWORD
    }

    fn validate(&self, req: &GrantRequest) -> Result<(), AuthError> {
        require_fields(req, &["username", "password"])
    }

    async fn grant(
        &self,
        client: &Client,
        req: &GrantRequest,
    ) -> Result<TokenResponse, AuthError> {
        let username = req.username.as_deref().unwrap_or_default();
        let account = self
            .store
            .find_account_by_username(username)
            .await?
            .ok_or(AuthError::UnknownAccount)?;

        if !account.enabled {
            return Err(AuthError::AccountDisabled);
        }

        let password = Password::new(req.password.clone().unwrap_or_default());
        verify_password(
            &password,
            &PasswordHashString::new(account.password_hash.clone()),
        )
        .map_err(|_| AuthError::InvalidPassword)?;

        let issued = self
            .issuer
            .issue_user_token(
                &account,
                client,
                None,
                IssueOptions {
                    origin: req.origin.clone(),
                    scope: req.scope_list(),
                    refreshable: req.refreshable_requested(),
                    ..Default::default()
                },
            )
            .await?;

        Ok(TokenResponse::from_issued(issued, self.issuer.clock().as_ref()))
    }
}

/// Confidential-client credentials grant.
pub struct ClientCredentialsGranter {
    issuer: Arc<Issuer>,
}

impl ClientCredentialsGranter {
    pub fn new(issuer: Arc<Issuer>) -> Self {
        Self { issuer }
    }
}

#[async_trait]
impl Granter for ClientCredentialsGranter {
    fn grant_type(&self) -> &'static str {
        GRANT_TYPE_CLIENT_CREDENTIALS
    }

    fn validate(&self, req: &GrantRequest) -> Result<(), AuthError> {
        require_fields(req, &["client_secret"])
    }

    async fn grant(
        &self,
        client: &Client,
        req: &GrantRequest,
    ) -> Result<TokenResponse, AuthError> {
        let presented = req.client_secret.as_deref().unwrap_or_default();
        let stored = client
            .secret_digest
            .as_deref()
            .ok_or(AuthError::InvalidSecret)?;

        // Digest comparison runs in constant time.
        if !secrets_match(presented, stored) {
            return Err(AuthError::InvalidSecret);
        }

        let issued = self
            .issuer
            .issue_client_token(
                client,
                None,
                IssueOptions {
                    origin: req.origin.clone(),
                    scope: req.scope_list(),
                    ..Default::default()
                },
            )
            .await?;

        Ok(TokenResponse::from_issued(issued, self.issuer.clock().as_ref()))
    }
}

/// Refresh-token grant: rotate-on-refresh, always minting a new access +
/// refresh pair and consuming the presented record.
pub struct RefreshTokenGranter {
    store: Arc<dyn TokenStore>,
    issuer: Arc<Issuer>,
    codecs: Arc<CodecRegistry>,
}

impl RefreshTokenGranter {
    pub fn new(
        store: Arc<dyn TokenStore>,
        issuer: Arc<Issuer>,
        codecs: Arc<CodecRegistry>,
    ) -> Self {
        Self { store, issuer, codecs }
    }
}

#[async_trait]
impl Granter for RefreshTokenGranter {
    fn grant_type(&self) -> &'static str {
        GRANT_TYPE_REFRESH_TOKEN
    }

    fn validate(&self, req: &GrantRequest) -> Result<(), AuthError> {
        require_fields(req, &["refresh_token"])
    }

    async fn grant(
        &self,
        client: &Client,
        req: &GrantRequest,
    ) -> Result<TokenResponse, AuthError> {
        let presented = req.refresh_token.as_deref().unwrap_or_default();
        let now = self.issuer.clock().now();

        let claims = self.codecs.refresh().verify(presented, now)?;
        let refresh_id = claims.jwt_id()?;

        // Lookup is scoped by the requesting client: another client presenting
        // this refresh token simply finds nothing.
        let old = self
            .store
            .find_by_refresh_token(refresh_id, client.client_id)
            .await?
            .ok_or(AuthError::UnknownToken)?;

        if !old.base().enabled {
            return Err(AuthError::TokenDisabled);
        }

        let account_id = old
            .account_id()
            .ok_or_else(|| AuthError::InvalidToken("Token is not refreshable".to_string()))?;
        let account = self
            .store
            .find_account(account_id)
            .await?
            .ok_or(AuthError::UnknownAccount)?;

        // Rotate: create the replacement pair first, then consume the old
        // record. The issuer re-runs the client/account eligibility chain, so
        // a since-disabled participant fails here before anything is revoked.
        let old_base = old.base();
        let issued = self
            .issuer
            .issue_user_token(
                &account,
                client,
                old_base.payload.as_ref(),
                IssueOptions {
                    subject: old_base.subject.clone(),
                    audience: old_base.audience.clone(),
                    origin: old_base.origin.clone(),
                    scope: Some(old_base.scope.clone()),
                    refreshable: true,
                    ..Default::default()
                },
            )
            .await?;

        if !self.store.revoke(old.id()).await? {
            // A concurrent refresh already consumed the record; withdraw the
            // pair created above and fail the exchange.
            let _ = self.store.revoke(issued.record.id()).await;
            tracing::warn!(
                client_id = %client.client_id,
                refresh_token_id = %refresh_id,
                "Refresh token replayed concurrently"
            );
            return Err(AuthError::UnknownToken);
        }

        tracing::info!(
            client_id = %client.client_id,
            account_id = %account.account_id,
            old_token_id = %old.id(),
            new_token_id = %issued.record.id(),
            "Refresh token rotated"
        );

        Ok(TokenResponse::from_issued(issued, self.issuer.clock().as_ref()))
    }
}

/// Explicit registry mapping `grant_type` values to strategies. Built once at
/// startup and injected wherever grants are served.
pub struct GranterRegistry {
    granters: HashMap<&'static str, Box<dyn Granter>>,
    checks: Vec<Box<dyn GrantCheck>>,
    store: Arc<dyn TokenStore>,
}

impl GranterRegistry {
    /// Registry with the three built-in strategies and the origin pre-check.
    pub fn new(
        store: Arc<dyn TokenStore>,
        issuer: Arc<Issuer>,
        codecs: Arc<CodecRegistry>,
    ) -> Self {
        let mut registry = Self {
            granters: HashMap::new(),
            checks: vec![Box::new(OriginCheck)],
            store: store.clone(),
        };
        registry.register(Box::new(PasswordGranter::new(store.clone(), issuer.clone())));
        registry.register(Box::new(ClientCredentialsGranter::new(issuer.clone())));
        registry.register(Box::new(RefreshTokenGranter::new(store, issuer, codecs)));
        registry
    }

    pub fn register(&mut self, granter: Box<dyn Granter>) {
        self.granters.insert(granter.grant_type(), granter);
    }

    pub fn add_check(&mut self, check: Box<dyn GrantCheck>) {
        self.checks.push(check);
    }

    /// Serve one grant request end to end.
    pub async fn grant(&self, req: &GrantRequest) -> Result<TokenResponse, AuthError> {
        // Structural validation first; nothing credential-shaped is touched
        // until the request shape is known good.
        require_fields(req, &["grant_type", "client_id"])?;
        req.validate()?;

        let grant_type = req.grant_type.as_deref().unwrap_or_default();
        let granter = self
            .granters
            .get(grant_type)
            .ok_or_else(|| AuthError::UnsupportedGrantType(grant_type.to_string()))?;

        granter.validate(req)?;

        let client_id = req
            .client_id
            .as_deref()
            .and_then(|s| Uuid::parse_str(s).ok())
            .ok_or(AuthError::UnknownClient)?;
        let client = self
            .store
            .find_client(client_id)
            .await?
            .ok_or(AuthError::UnknownClient)?;

        for check in &self.checks {
            check.check(&client, req)?;
        }

        granter.grant(&client, req).await
    }
}
