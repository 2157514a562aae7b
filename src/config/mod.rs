use serde::Deserialize;
use std::env;

use crate::services::error::AuthError;

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Dev,
    Prod,
}

impl std::str::FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dev" => Ok(Environment::Dev),
            "prod" => Ok(Environment::Prod),
            _ => Err(format!("Invalid environment: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GatekeeperConfig {
    pub environment: Environment,
    pub service_name: String,
    pub log_level: String,
    pub database: DatabaseConfig,
    pub token: TokenConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

/// Signing configuration: a symmetric secret (HMAC algorithms) or a PEM key
/// pair (RSA algorithms), never both.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenConfig {
    pub algorithm: String,
    pub secret: Option<String>,
    pub private_key_path: Option<String>,
    pub public_key_path: Option<String>,
    pub issuer: String,
    /// Default access token lifetime; None means tokens only expire when a
    /// client or request supplies an expiration policy.
    pub access_token_expiry_minutes: Option<i64>,
    pub verification_expiry_minutes: i64,
    pub password_reset_expiry_minutes: i64,
}

impl GatekeeperConfig {
    pub fn from_env() -> Result<Self, AuthError> {
        dotenvy::dotenv().ok();

        let env_str = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string());
        let environment: Environment = env_str
            .parse()
            .map_err(|e: String| AuthError::Config(anyhow::anyhow!(e)))?;
        let is_prod = environment == Environment::Prod;

        let config = GatekeeperConfig {
            environment,
            service_name: get_env("SERVICE_NAME", Some("gatekeeper"), is_prod)?,
            log_level: get_env("LOG_LEVEL", Some("info"), is_prod)?,
            database: DatabaseConfig {
                url: get_env("DATABASE_URL", None, is_prod)?,
                max_connections: parse_env("DATABASE_MAX_CONNECTIONS", Some("10"), is_prod)?,
                min_connections: parse_env("DATABASE_MIN_CONNECTIONS", Some("1"), is_prod)?,
            },
            token: TokenConfig {
                algorithm: get_env("TOKEN_ALGORITHM", Some("HS256"), is_prod)?,
                secret: env::var("TOKEN_SECRET").ok(),
                private_key_path: env::var("TOKEN_PRIVATE_KEY_PATH").ok(),
                public_key_path: env::var("TOKEN_PUBLIC_KEY_PATH").ok(),
                issuer: get_env("TOKEN_ISSUER", Some("gatekeeper"), is_prod)?,
                access_token_expiry_minutes: match env::var("TOKEN_ACCESS_EXPIRY_MINUTES") {
                    Ok(v) => Some(v.parse().map_err(|e: std::num::ParseIntError| {
                        AuthError::Config(anyhow::anyhow!(e.to_string()))
                    })?),
                    Err(_) => None,
                },
                verification_expiry_minutes: parse_env(
                    "TOKEN_VERIFICATION_EXPIRY_MINUTES",
                    Some("1440"),
                    is_prod,
                )?,
                password_reset_expiry_minutes: parse_env(
                    "TOKEN_PASSWORD_RESET_EXPIRY_MINUTES",
                    Some("30"),
                    is_prod,
                )?,
            },
        };

        config.validate()?;
        Ok(config)
    }

    /// Fails fast on misconfiguration; missing key material is a startup
    /// error, never a per-request one.
    pub fn validate(&self) -> Result<(), AuthError> {
        self.token.validate()?;

        if self.database.max_connections == 0 {
            return Err(AuthError::Config(anyhow::anyhow!(
                "DATABASE_MAX_CONNECTIONS must be greater than 0"
            )));
        }

        Ok(())
    }
}

impl TokenConfig {
    pub fn validate(&self) -> Result<(), AuthError> {
        let has_secret = self.secret.is_some();
        let has_pair = self.private_key_path.is_some() && self.public_key_path.is_some();
        let has_partial_pair =
            self.private_key_path.is_some() != self.public_key_path.is_some();

        if has_partial_pair {
            return Err(AuthError::Config(anyhow::anyhow!(
                "Both TOKEN_PRIVATE_KEY_PATH and TOKEN_PUBLIC_KEY_PATH must be set for a key pair"
            )));
        }
        if !has_secret && !has_pair {
            return Err(AuthError::Config(anyhow::anyhow!(
                "Either TOKEN_SECRET or a key pair must be configured"
            )));
        }
        if has_secret && has_pair {
            return Err(AuthError::Config(anyhow::anyhow!(
                "Configure either TOKEN_SECRET or a key pair, not both"
            )));
        }

        if let Some(minutes) = self.access_token_expiry_minutes {
            if minutes <= 0 {
                return Err(AuthError::Config(anyhow::anyhow!(
                    "TOKEN_ACCESS_EXPIRY_MINUTES must be positive"
                )));
            }
        }
        if self.verification_expiry_minutes <= 0 || self.password_reset_expiry_minutes <= 0 {
            return Err(AuthError::Config(anyhow::anyhow!(
                "Token expiry minutes must be positive"
            )));
        }

        Ok(())
    }
}

fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AuthError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if is_prod {
                Err(AuthError::Config(anyhow::anyhow!(
                    "{} is required in production but not set",
                    key
                )))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(AuthError::Config(anyhow::anyhow!(
                    "{} is required but not set",
                    key
                )))
            }
        }
    }
}

fn parse_env<T: std::str::FromStr>(
    key: &str,
    default: Option<&str>,
    is_prod: bool,
) -> Result<T, AuthError>
where
    T::Err: std::fmt::Display,
{
    get_env(key, default, is_prod)?
        .parse()
        .map_err(|e: T::Err| AuthError::Config(anyhow::anyhow!("{}: {}", key, e)))
}
