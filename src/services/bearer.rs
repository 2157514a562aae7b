//! Bearer-token verification policy.
//!
//! A fixed decision chain from token string to authenticated principal. The
//! check order is a contract: signature validity is established before any
//! record state is consulted, so an invalid token on a disabled client reports
//! `invalid_token`, never `client_disabled`.

use std::sync::Arc;

use crate::models::{Account, Client, TokenRecord};
use crate::services::clock::Clock;
use crate::services::error::AuthError;
use crate::services::registry::CodecRegistry;
use crate::store::TokenStore;

/// Authenticated caller produced by a successful verification.
#[derive(Debug)]
pub struct Principal {
    pub client: Client,
    pub account: Option<Account>,
    pub scope: Vec<String>,
    pub record: TokenRecord,
}

pub struct BearerPolicy {
    store: Arc<dyn TokenStore>,
    codecs: Arc<CodecRegistry>,
    clock: Arc<dyn Clock>,
}

impl BearerPolicy {
    pub fn new(
        store: Arc<dyn TokenStore>,
        codecs: Arc<CodecRegistry>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { store, codecs, clock }
    }

    /// Authenticate from a raw Authorization header value.
    pub async fn authenticate_header(
        &self,
        header: Option<&str>,
    ) -> Result<Principal, AuthError> {
        let header = header.ok_or(AuthError::MissingToken)?;

        let mut parts = header.splitn(2, ' ');
        let scheme = parts.next().unwrap_or_default();
        if !scheme.eq_ignore_ascii_case("bearer") {
            return Err(AuthError::InvalidScheme);
        }

        let token = parts
            .next()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(AuthError::InvalidAuthorization)?;

        self.authenticate(token).await
    }

    /// Authenticate a bearer token string.
    pub async fn authenticate(&self, token: &str) -> Result<Principal, AuthError> {
        // 1. Signature and expiration.
        let claims = self.codecs.access().verify(token, self.clock.now())?;
        let token_id = claims.jwt_id()?;

        // 2. Backing record.
        let record = self
            .store
            .find_token(token_id)
            .await?
            .ok_or(AuthError::UnknownToken)?;

        // 3. Record enabled.
        if !record.base().enabled {
            return Err(AuthError::TokenDisabled);
        }

        // 4. Usage cap, enforced with an atomic increment.
        if let Some(usage) = record.base().usage.as_ref() {
            let count = self
                .store
                .increment_usage(token_id)
                .await?
                .ok_or(AuthError::UnknownToken)?;
            if count > usage.max {
                return Err(AuthError::MaxUsage);
            }
        }

        // 5. Client state.
        let client = self
            .store
            .find_client(record.client_id())
            .await?
            .ok_or(AuthError::UnknownClient)?;
        if !client.enabled {
            return Err(AuthError::ClientDisabled);
        }
        if client.deleted {
            return Err(AuthError::ClientDeleted);
        }

        // 6. Account state, for user tokens.
        let account = match record.account_id() {
            Some(account_id) => {
                let account = self
                    .store
                    .find_account(account_id)
                    .await?
                    .ok_or(AuthError::UnknownAccount)?;
                if !account.enabled {
                    return Err(AuthError::AccountDisabled);
                }
                if account.deleted {
                    return Err(AuthError::AccountDeleted);
                }
                Some(account)
            }
            None => None,
        };

        Ok(Principal {
            scope: record.base().scope.clone(),
            client,
            account,
            record,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TokenConfig;
    use crate::models::ClientType;
    use crate::services::clock::FixedClock;
    use crate::services::issuer::{IssueOptions, Issuer};
    use crate::store::MemoryStore;
    use chrono::Utc;

    async fn test_setup() -> (BearerPolicy, Issuer, Arc<MemoryStore>, Client, Account) {
        let config = TokenConfig {
            algorithm: "HS256".to_string(),
            secret: Some("bearer-test-secret".to_string()),
            private_key_path: None,
            public_key_path: None,
            issuer: "gatekeeper-test".to_string(),
            access_token_expiry_minutes: Some(15),
            verification_expiry_minutes: 60,
            password_reset_expiry_minutes: 30,
        };
        let codecs = Arc::new(CodecRegistry::from_config(&config).unwrap());
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(FixedClock::new(Utc::now()));

        let policy = BearerPolicy::new(store.clone(), codecs.clone(), clock.clone());
        let issuer = Issuer::new(store.clone(), codecs, clock);

        let client = Client::new("app1".to_string(), ClientType::Native);
        let account = Account::new("alice".to_string(), "hash".to_string());
        store.insert_client(&client).await.unwrap();
        store.insert_account(&account).await.unwrap();

        (policy, issuer, store, client, account)
    }

    #[tokio::test]
    async fn test_header_shape_errors() {
        let (policy, _issuer, _store, _client, _account) = test_setup().await;

        let err = policy.authenticate_header(None).await.unwrap_err();
        assert_eq!(err.code(), "missing_token");

        let err = policy
            .authenticate_header(Some("Basic dXNlcjpwYXNz"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "invalid_scheme");

        let err = policy.authenticate_header(Some("Bearer ")).await.unwrap_err();
        assert_eq!(err.code(), "invalid_authorization");
    }

    #[tokio::test]
    async fn test_successful_client_token_principal() {
        let (policy, issuer, _store, client, _account) = test_setup().await;
        let issued = issuer
            .issue_client_token(&client, None, IssueOptions::default())
            .await
            .unwrap();

        let principal = policy
            .authenticate_header(Some(&format!("Bearer {}", issued.access_token)))
            .await
            .unwrap();
        assert_eq!(principal.client.client_id, client.client_id);
        assert!(principal.account.is_none());
    }

    #[tokio::test]
    async fn test_invalid_signature_beats_disabled_client() {
        let (policy, issuer, store, mut client, account) = test_setup().await;
        let issued = issuer
            .issue_user_token(&account, &client, None, IssueOptions::default())
            .await
            .unwrap();

        client.enabled = false;
        store.insert_client(&client).await.unwrap();

        // Tampered token + disabled client: the signature check wins.
        let tampered = format!("{}x", issued.access_token);
        let err = policy.authenticate(&tampered).await.unwrap_err();
        assert_eq!(err.code(), "invalid_token");

        // Intact token reveals the client state.
        let err = policy.authenticate(&issued.access_token).await.unwrap_err();
        assert_eq!(err.code(), "client_disabled");
    }

    #[tokio::test]
    async fn test_revoked_record_reports_unknown_token() {
        let (policy, issuer, store, client, account) = test_setup().await;
        let issued = issuer
            .issue_user_token(&account, &client, None, IssueOptions::default())
            .await
            .unwrap();

        store.revoke(issued.record.id()).await.unwrap();
        let err = policy.authenticate(&issued.access_token).await.unwrap_err();
        assert_eq!(err.code(), "unknown_token");
    }

    #[tokio::test]
    async fn test_account_state_cascade() {
        let (policy, issuer, store, client, mut account) = test_setup().await;
        let issued = issuer
            .issue_user_token(&account, &client, None, IssueOptions::default())
            .await
            .unwrap();

        account.enabled = false;
        store.insert_account(&account).await.unwrap();
        let err = policy.authenticate(&issued.access_token).await.unwrap_err();
        assert_eq!(err.code(), "account_disabled");

        account.enabled = true;
        account.deleted = true;
        store.insert_account(&account).await.unwrap();
        let err = policy.authenticate(&issued.access_token).await.unwrap_err();
        assert_eq!(err.code(), "account_deleted");
    }

    #[tokio::test]
    async fn test_usage_cap_enforced() {
        let (policy, issuer, _store, client, _account) = test_setup().await;
        let issued = issuer
            .issue_client_token(
                &client,
                None,
                IssueOptions {
                    usage_max: Some(2),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert!(policy.authenticate(&issued.access_token).await.is_ok());
        assert!(policy.authenticate(&issued.access_token).await.is_ok());
        let err = policy.authenticate(&issued.access_token).await.unwrap_err();
        assert_eq!(err.code(), "max_usage");
    }
}
