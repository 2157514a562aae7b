//! Signing and verification of compact signed tokens.
//!
//! A [`TokenCodec`] binds key material to claim defaults (issuer, subject,
//! audience, default lifetime). Child codecs share the key material while
//! overriding a subset of defaults, which is how the refresh, verification and
//! reset codecs are derived from one configured secret.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs;
use std::sync::Arc;
use uuid::Uuid;

use crate::services::error::AuthError;

/// Claim names the codec manages itself; stripped from caller payloads so the
/// flattened extra map never collides with them.
const RESERVED_CLAIMS: &[&str] = &["jti", "iss", "sub", "aud", "exp", "iat", "scope"];

/// Claims carried by a signed token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Token record id; the sole link back to server-side state.
    pub jti: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aud: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
    pub iat: i64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scope: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Claims {
    pub fn jwt_id(&self) -> Result<Uuid, AuthError> {
        Uuid::parse_str(&self.jti)
            .map_err(|_| AuthError::InvalidToken("Malformed jti claim".to_string()))
    }
}

/// Shared signing/verification key material.
pub struct KeyMaterial {
    encoding: EncodingKey,
    decoding: DecodingKey,
    algorithm: Algorithm,
}

impl KeyMaterial {
    /// Symmetric secret (HMAC family algorithms).
    pub fn from_secret(secret: &str, algorithm: Algorithm) -> Result<Self, AuthError> {
        match algorithm {
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => {}
            other => {
                return Err(AuthError::Config(anyhow::anyhow!(
                    "Algorithm {:?} requires an asymmetric key pair, not a secret",
                    other
                )))
            }
        }
        if secret.is_empty() {
            return Err(AuthError::Config(anyhow::anyhow!("Signing secret is empty")));
        }

        Ok(Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            algorithm,
        })
    }

    /// RSA key pair loaded from PEM files.
    pub fn from_rsa_pem_files(
        private_key_path: &str,
        public_key_path: &str,
        algorithm: Algorithm,
    ) -> Result<Self, AuthError> {
        match algorithm {
            Algorithm::RS256 | Algorithm::RS384 | Algorithm::RS512 => {}
            other => {
                return Err(AuthError::Config(anyhow::anyhow!(
                    "Algorithm {:?} is not an RSA algorithm",
                    other
                )))
            }
        }

        let private_pem = fs::read_to_string(private_key_path).map_err(|e| {
            AuthError::Config(anyhow::anyhow!(
                "Failed to read private key from {}: {}",
                private_key_path,
                e
            ))
        })?;
        let encoding = EncodingKey::from_rsa_pem(private_pem.as_bytes())
            .map_err(|e| AuthError::Config(anyhow::anyhow!("Failed to parse private key: {}", e)))?;

        let public_pem = fs::read_to_string(public_key_path).map_err(|e| {
            AuthError::Config(anyhow::anyhow!(
                "Failed to read public key from {}: {}",
                public_key_path,
                e
            ))
        })?;
        let decoding = DecodingKey::from_rsa_pem(public_pem.as_bytes())
            .map_err(|e| AuthError::Config(anyhow::anyhow!("Failed to parse public key: {}", e)))?;

        Ok(Self {
            encoding,
            decoding,
            algorithm,
        })
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }
}

/// Parse an algorithm name from configuration.
pub fn parse_algorithm(name: &str) -> Result<Algorithm, AuthError> {
    match name.to_uppercase().as_str() {
        "HS256" => Ok(Algorithm::HS256),
        "HS384" => Ok(Algorithm::HS384),
        "HS512" => Ok(Algorithm::HS512),
        "RS256" => Ok(Algorithm::RS256),
        "RS384" => Ok(Algorithm::RS384),
        "RS512" => Ok(Algorithm::RS512),
        other => Err(AuthError::Config(anyhow::anyhow!(
            "Unsupported token algorithm: {}",
            other
        ))),
    }
}

/// Default lifetime behavior when deriving a child codec.
#[derive(Debug, Clone, Default)]
pub enum DefaultExpiry {
    /// Keep the parent's default lifetime.
    #[default]
    Inherit,
    /// No default lifetime; tokens only expire when explicitly requested.
    Disabled,
    /// Replace the parent's default lifetime.
    After(Duration),
}

/// Overrides applied when deriving a child codec.
#[derive(Debug, Clone, Default)]
pub struct CodecOverrides {
    pub issuer: Option<String>,
    pub subject: Option<String>,
    pub audience: Option<String>,
    pub expires_in: DefaultExpiry,
}

/// Per-token options supplied at signing time.
#[derive(Debug, Clone, Default)]
pub struct SignOptions {
    pub jwt_id: Uuid,
    pub subject: Option<String>,
    pub audience: Option<String>,
    pub expires_utc: Option<DateTime<Utc>>,
    pub scope: Vec<String>,
}

#[derive(Clone)]
pub struct TokenCodec {
    keys: Arc<KeyMaterial>,
    issuer: Option<String>,
    subject: Option<String>,
    audience: Option<String>,
    expires_in: Option<Duration>,
}

impl TokenCodec {
    pub fn new(keys: Arc<KeyMaterial>) -> Self {
        Self {
            keys,
            issuer: None,
            subject: None,
            audience: None,
            expires_in: None,
        }
    }

    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = Some(issuer.into());
        self
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    pub fn with_default_expiry(mut self, expires_in: Duration) -> Self {
        self.expires_in = Some(expires_in);
        self
    }

    /// Derive a codec sharing this codec's key material with some defaults
    /// replaced.
    pub fn child(&self, overrides: CodecOverrides) -> Self {
        Self {
            keys: Arc::clone(&self.keys),
            issuer: overrides.issuer.or_else(|| self.issuer.clone()),
            subject: overrides.subject.or_else(|| self.subject.clone()),
            audience: overrides.audience.or_else(|| self.audience.clone()),
            expires_in: match overrides.expires_in {
                DefaultExpiry::Inherit => self.expires_in,
                DefaultExpiry::Disabled => None,
                DefaultExpiry::After(d) => Some(d),
            },
        }
    }

    /// Sign a token. Expiration precedence: an `exp` already present in the
    /// caller payload wins over `opts.expires_utc`, which wins over the codec's
    /// default lifetime.
    pub fn sign(
        &self,
        payload: Option<&Map<String, Value>>,
        opts: SignOptions,
        now: DateTime<Utc>,
    ) -> Result<String, AuthError> {
        let mut extra = payload.cloned().unwrap_or_default();

        let payload_exp = extra.get("exp").and_then(Value::as_i64);
        for key in RESERVED_CLAIMS {
            extra.remove(*key);
        }

        let exp = payload_exp
            .or_else(|| opts.expires_utc.map(|t| t.timestamp()))
            .or_else(|| self.expires_in.map(|d| (now + d).timestamp()));

        let claims = Claims {
            jti: opts.jwt_id.to_string(),
            iss: self.issuer.clone(),
            sub: opts.subject.or_else(|| self.subject.clone()),
            aud: opts.audience.or_else(|| self.audience.clone()),
            exp,
            iat: now.timestamp(),
            scope: opts.scope,
            extra,
        };

        let header = Header::new(self.keys.algorithm);
        encode(&header, &claims, &self.keys.encoding)
            .map_err(|e| AuthError::InvalidToken(format!("Failed to encode token: {}", e)))
    }

    /// Verify a token's signature and expiration against the supplied time.
    ///
    /// Only this codec's own algorithm is accepted; anything else is rejected.
    /// The library's wall-clock expiration check is disabled so that `now`
    /// stays injectable; the `exp` claim is checked here instead.
    pub fn verify(&self, token: &str, now: DateTime<Utc>) -> Result<Claims, AuthError> {
        let mut validation = Validation::new(self.keys.algorithm);
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.set_required_spec_claims::<&str>(&[]);

        let data =
            decode::<Claims>(token, &self.keys.decoding, &validation).map_err(|e| {
                match e.kind() {
                    ErrorKind::InvalidAlgorithm => AuthError::UnsupportedAlgorithm,
                    ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                    _ => AuthError::InvalidToken(e.to_string()),
                }
            })?;

        if let Some(exp) = data.claims.exp {
            if now.timestamp() >= exp {
                return Err(AuthError::TokenExpired);
            }
        }

        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn test_codec() -> TokenCodec {
        let keys = KeyMaterial::from_secret("test-signing-secret", Algorithm::HS256).unwrap();
        TokenCodec::new(Arc::new(keys)).with_issuer("gatekeeper-test")
    }

    #[test]
    fn test_construction_rejects_empty_secret() {
        let result = KeyMaterial::from_secret("", Algorithm::HS256);
        assert!(matches!(result, Err(AuthError::Config(_))));
    }

    #[test]
    fn test_construction_rejects_mismatched_algorithm() {
        let result = KeyMaterial::from_secret("secret", Algorithm::RS256);
        assert!(matches!(result, Err(AuthError::Config(_))));
    }

    #[test]
    fn test_rsa_key_loading_failures() {
        // Missing file.
        let result = KeyMaterial::from_rsa_pem_files(
            "/nonexistent/private.pem",
            "/nonexistent/public.pem",
            Algorithm::RS256,
        );
        assert!(matches!(result, Err(AuthError::Config(_))));

        // File exists but is not a PEM key.
        let dir = tempfile::tempdir().unwrap();
        let bogus = dir.path().join("private.pem");
        std::fs::write(&bogus, "not a key").unwrap();
        let result = KeyMaterial::from_rsa_pem_files(
            bogus.to_str().unwrap(),
            bogus.to_str().unwrap(),
            Algorithm::RS256,
        );
        assert!(matches!(result, Err(AuthError::Config(_))));
    }

    #[test]
    fn test_sign_verify_round_trip() {
        let codec = test_codec();
        let now = Utc::now();
        let jwt_id = Uuid::new_v4();

        let mut payload = Map::new();
        payload.insert("role".to_string(), json!("admin"));

        let token = codec
            .sign(
                Some(&payload),
                SignOptions {
                    jwt_id,
                    subject: Some("gatekeeper.access".to_string()),
                    scope: vec!["read".to_string(), "write".to_string()],
                    ..Default::default()
                },
                now,
            )
            .unwrap();

        let claims = codec.verify(&token, now).unwrap();
        assert_eq!(claims.jwt_id().unwrap(), jwt_id);
        assert_eq!(claims.iss.as_deref(), Some("gatekeeper-test"));
        assert_eq!(claims.sub.as_deref(), Some("gatekeeper.access"));
        assert_eq!(claims.scope, vec!["read", "write"]);
        assert_eq!(claims.extra.get("role"), Some(&json!("admin")));
        assert!(claims.exp.is_none());
    }

    #[test]
    fn test_payload_exp_wins_over_options() {
        let codec = test_codec().with_default_expiry(Duration::minutes(15));
        let now = Utc::now();
        let explicit_exp = (now + Duration::hours(3)).timestamp();

        let mut payload = Map::new();
        payload.insert("exp".to_string(), json!(explicit_exp));

        let token = codec
            .sign(
                Some(&payload),
                SignOptions {
                    jwt_id: Uuid::new_v4(),
                    expires_utc: Some(now + Duration::minutes(5)),
                    ..Default::default()
                },
                now,
            )
            .unwrap();

        let claims = codec.verify(&token, now).unwrap();
        assert_eq!(claims.exp, Some(explicit_exp));
    }

    #[test]
    fn test_expired_token_rejected() {
        let codec = test_codec();
        let now = Utc::now();

        let token = codec
            .sign(
                None,
                SignOptions {
                    jwt_id: Uuid::new_v4(),
                    expires_utc: Some(now + Duration::seconds(60)),
                    ..Default::default()
                },
                now,
            )
            .unwrap();

        assert!(codec.verify(&token, now).is_ok());
        let result = codec.verify(&token, now + Duration::seconds(61));
        assert!(matches!(result, Err(AuthError::TokenExpired)));
    }

    #[test]
    fn test_garbage_token_rejected() {
        let codec = test_codec();
        let result = codec.verify("not-a-token", Utc::now());
        assert!(matches!(result, Err(AuthError::InvalidToken(_))));
    }

    #[test]
    fn test_wrong_key_rejected() {
        let signer = test_codec();
        let other_keys = KeyMaterial::from_secret("different-secret", Algorithm::HS256).unwrap();
        let verifier = TokenCodec::new(Arc::new(other_keys));

        let now = Utc::now();
        let token = signer
            .sign(
                None,
                SignOptions {
                    jwt_id: Uuid::new_v4(),
                    ..Default::default()
                },
                now,
            )
            .unwrap();

        assert!(matches!(
            verifier.verify(&token, now),
            Err(AuthError::InvalidToken(_))
        ));
    }

    #[test]
    fn test_foreign_algorithm_rejected() {
        // HS384-signed token must not pass an HS256-only verifier.
        let hs384 = KeyMaterial::from_secret("test-signing-secret", Algorithm::HS384).unwrap();
        let signer = TokenCodec::new(Arc::new(hs384));
        let verifier = test_codec();

        let now = Utc::now();
        let token = signer
            .sign(
                None,
                SignOptions {
                    jwt_id: Uuid::new_v4(),
                    ..Default::default()
                },
                now,
            )
            .unwrap();

        assert!(matches!(
            verifier.verify(&token, now),
            Err(AuthError::UnsupportedAlgorithm)
        ));
    }

    #[test]
    fn test_child_codec_overrides_subset() {
        let base = test_codec().with_default_expiry(Duration::minutes(15));
        let refresh = base.child(CodecOverrides {
            subject: Some("gatekeeper.refresh".to_string()),
            expires_in: DefaultExpiry::Disabled,
            ..Default::default()
        });

        let now = Utc::now();
        let token = refresh
            .sign(
                None,
                SignOptions {
                    jwt_id: Uuid::new_v4(),
                    ..Default::default()
                },
                now,
            )
            .unwrap();

        // Shared key material: the base codec verifies what the child signs.
        let claims = base.verify(&token, now).unwrap();
        assert_eq!(claims.sub.as_deref(), Some("gatekeeper.refresh"));
        assert_eq!(claims.iss.as_deref(), Some("gatekeeper-test"));
        assert!(claims.exp.is_none());
    }

    #[test]
    fn test_reserved_claims_stripped_from_payload() {
        let codec = test_codec();
        let now = Utc::now();
        let jwt_id = Uuid::new_v4();

        let mut payload = Map::new();
        payload.insert("jti".to_string(), json!("spoofed"));
        payload.insert("iss".to_string(), json!("spoofed-issuer"));
        payload.insert("device".to_string(), json!("pixel-8"));

        let token = codec
            .sign(
                Some(&payload),
                SignOptions {
                    jwt_id,
                    ..Default::default()
                },
                now,
            )
            .unwrap();

        let claims = codec.verify(&token, now).unwrap();
        assert_eq!(claims.jwt_id().unwrap(), jwt_id);
        assert_eq!(claims.iss.as_deref(), Some("gatekeeper-test"));
        assert_eq!(claims.extra.get("device"), Some(&json!("pixel-8")));
        assert!(claims.extra.get("jti").is_none());
    }
}
