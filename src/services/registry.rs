//! Named codec registry.
//!
//! Built once at startup from configuration and passed by reference to the
//! issuer and granters; there is no module-level codec cache.

use chrono::Duration;
use std::sync::Arc;

use crate::config::TokenConfig;
use crate::services::codec::{
    parse_algorithm, CodecOverrides, DefaultExpiry, KeyMaterial, TokenCodec,
};
use crate::services::error::AuthError;

pub const ACCESS_SUBJECT: &str = "gatekeeper.access";
pub const REFRESH_SUBJECT: &str = "gatekeeper.refresh";
pub const VERIFICATION_SUBJECT: &str = "gatekeeper.account_verification";
pub const PASSWORD_RESET_SUBJECT: &str = "gatekeeper.password_reset";

/// The distinctly-scoped codecs derived from one configured key.
pub struct CodecRegistry {
    access: TokenCodec,
    refresh: TokenCodec,
    verification: TokenCodec,
    password_reset: TokenCodec,
}

impl CodecRegistry {
    pub fn from_config(config: &TokenConfig) -> Result<Self, AuthError> {
        let algorithm = parse_algorithm(&config.algorithm)?;

        let keys = match (&config.secret, &config.private_key_path, &config.public_key_path) {
            (Some(secret), None, None) => KeyMaterial::from_secret(secret, algorithm)?,
            (None, Some(private), Some(public)) => {
                KeyMaterial::from_rsa_pem_files(private, public, algorithm)?
            }
            (None, None, None) => {
                return Err(AuthError::Config(anyhow::anyhow!(
                    "Either a signing secret or a key pair must be configured"
                )))
            }
            _ => {
                return Err(AuthError::Config(anyhow::anyhow!(
                    "Configure exactly one of: signing secret, or private + public key paths"
                )))
            }
        };

        let mut access = TokenCodec::new(Arc::new(keys))
            .with_issuer(config.issuer.clone())
            .with_subject(ACCESS_SUBJECT);
        if let Some(minutes) = config.access_token_expiry_minutes {
            access = access.with_default_expiry(Duration::minutes(minutes));
        }

        // Refresh tokens are revoked explicitly rather than timing out.
        let refresh = access.child(CodecOverrides {
            subject: Some(REFRESH_SUBJECT.to_string()),
            expires_in: DefaultExpiry::Disabled,
            ..Default::default()
        });

        let verification = access.child(CodecOverrides {
            subject: Some(VERIFICATION_SUBJECT.to_string()),
            expires_in: DefaultExpiry::After(Duration::minutes(
                config.verification_expiry_minutes,
            )),
            ..Default::default()
        });

        let password_reset = access.child(CodecOverrides {
            subject: Some(PASSWORD_RESET_SUBJECT.to_string()),
            expires_in: DefaultExpiry::After(Duration::minutes(
                config.password_reset_expiry_minutes,
            )),
            ..Default::default()
        });

        tracing::info!(algorithm = %config.algorithm, issuer = %config.issuer, "Token codecs initialized");

        Ok(Self {
            access,
            refresh,
            verification,
            password_reset,
        })
    }

    pub fn access(&self) -> &TokenCodec {
        &self.access
    }

    pub fn refresh(&self) -> &TokenCodec {
        &self.refresh
    }

    pub fn verification(&self) -> &TokenCodec {
        &self.verification
    }

    pub fn password_reset(&self) -> &TokenCodec {
        &self.password_reset
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TokenConfig;
    use chrono::Utc;
    use uuid::Uuid;

    fn test_config() -> TokenConfig {
        TokenConfig {
            algorithm: "HS256".to_string(),
            secret: Some("registry-test-secret".to_string()),
            private_key_path: None,
            public_key_path: None,
            issuer: "gatekeeper-test".to_string(),
            access_token_expiry_minutes: Some(15),
            verification_expiry_minutes: 60,
            password_reset_expiry_minutes: 30,
        }
    }

    #[test]
    fn test_registry_requires_key_material() {
        let mut config = test_config();
        config.secret = None;

        let result = CodecRegistry::from_config(&config);
        assert!(matches!(result, Err(AuthError::Config(_))));
    }

    #[test]
    fn test_registry_rejects_ambiguous_key_material() {
        let mut config = test_config();
        config.private_key_path = Some("/tmp/key.pem".to_string());

        let result = CodecRegistry::from_config(&config);
        assert!(matches!(result, Err(AuthError::Config(_))));
    }

    #[test]
    fn test_named_codecs_have_distinct_subjects() {
        let registry = CodecRegistry::from_config(&test_config()).unwrap();
        let now = Utc::now();

        let refresh_token = registry
            .refresh()
            .sign(None, crate::services::codec::SignOptions {
                jwt_id: Uuid::new_v4(),
                ..Default::default()
            }, now)
            .unwrap();

        let claims = registry.access().verify(&refresh_token, now).unwrap();
        assert_eq!(claims.sub.as_deref(), Some(REFRESH_SUBJECT));
        // The refresh codec carries no default expiration.
        assert!(claims.exp.is_none());

        let reset_token = registry
            .password_reset()
            .sign(None, crate::services::codec::SignOptions {
                jwt_id: Uuid::new_v4(),
                ..Default::default()
            }, now)
            .unwrap();
        let claims = registry.access().verify(&reset_token, now).unwrap();
        assert_eq!(claims.sub.as_deref(), Some(PASSWORD_RESET_SUBJECT));
        assert!(claims.exp.is_some());
    }
}
