//! Client model - registered callers that may request token grants.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use uuid::Uuid;

/// Client type codes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientType {
    Native,
    Android,
    Recaptcha,
    Hybrid,
}

impl ClientType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClientType::Native => "native",
            ClientType::Android => "android",
            ClientType::Recaptcha => "recaptcha",
            ClientType::Hybrid => "hybrid",
        }
    }
}

impl fmt::Display for ClientType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ClientType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "native" => Ok(ClientType::Native),
            "android" => Ok(ClientType::Android),
            "recaptcha" => Ok(ClientType::Recaptcha),
            "hybrid" => Ok(ClientType::Hybrid),
            _ => Err(format!("Invalid client type: {}", s)),
        }
    }
}

/// Registered client entity.
///
/// A restricted client may only obtain tokens on behalf of accounts it explicitly
/// permits via `allow_list`; `deny_list` entries always lose, even when allowed.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Client {
    pub client_id: Uuid,
    pub name: String,
    pub client_type_code: String,
    pub enabled: bool,
    pub deleted: bool,
    pub scope: Vec<String>,
    pub restricted: bool,
    pub allow_list: Vec<Uuid>,
    pub deny_list: Vec<Uuid>,
    /// Relative duration string ("1 day") applied to issued tokens by default.
    pub expiration: Option<String>,
    /// SHA-256 hex digest of the confidential client secret.
    pub secret_digest: Option<String>,
    pub allowed_origins: Vec<String>,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl Client {
    pub fn new(name: String, client_type: ClientType) -> Self {
        let now = Utc::now();
        Self {
            client_id: Uuid::new_v4(),
            name,
            client_type_code: client_type.as_str().to_string(),
            enabled: true,
            deleted: false,
            scope: Vec::new(),
            restricted: false,
            allow_list: Vec::new(),
            deny_list: Vec::new(),
            expiration: None,
            secret_digest: None,
            allowed_origins: Vec::new(),
            created_utc: now,
            updated_utc: now,
        }
    }

    pub fn client_type(&self) -> Option<ClientType> {
        self.client_type_code.parse().ok()
    }

    /// Whether this restricted client permits tokens on behalf of `account_id`.
    ///
    /// Deny takes precedence over allow. Unrestricted clients permit everyone.
    pub fn allows_account(&self, account_id: Uuid) -> bool {
        if !self.restricted {
            return true;
        }
        if self.deny_list.contains(&account_id) {
            return false;
        }
        self.allow_list.contains(&account_id)
    }

    /// Whether `origin` is acceptable for this client. An empty list allows any.
    pub fn allows_origin(&self, origin: &str) -> bool {
        self.allowed_origins.is_empty() || self.allowed_origins.iter().any(|o| o == origin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unrestricted_client_allows_any_account() {
        let client = Client::new("app1".to_string(), ClientType::Native);
        assert!(client.allows_account(Uuid::new_v4()));
    }

    #[test]
    fn test_restricted_client_requires_allow_list_entry() {
        let mut client = Client::new("app1".to_string(), ClientType::Native);
        client.restricted = true;

        let listed = Uuid::new_v4();
        let unlisted = Uuid::new_v4();
        client.allow_list.push(listed);

        assert!(client.allows_account(listed));
        assert!(!client.allows_account(unlisted));
    }

    #[test]
    fn test_deny_list_wins_over_allow_list() {
        let mut client = Client::new("app1".to_string(), ClientType::Native);
        client.restricted = true;

        let account = Uuid::new_v4();
        client.allow_list.push(account);
        client.deny_list.push(account);

        assert!(!client.allows_account(account));
    }

    #[test]
    fn test_origin_allow_list() {
        let mut client = Client::new("app1".to_string(), ClientType::Recaptcha);
        assert!(client.allows_origin("https://anywhere.example.com"));

        client.allowed_origins.push("https://app.example.com".to_string());
        assert!(client.allows_origin("https://app.example.com"));
        assert!(!client.allows_origin("https://evil.example.com"));
    }

    #[test]
    fn test_client_type_round_trip() {
        let client = Client::new("app1".to_string(), ClientType::Android);
        assert_eq!(client.client_type(), Some(ClientType::Android));
        assert_eq!(ClientType::Hybrid.to_string(), "hybrid");
    }
}
