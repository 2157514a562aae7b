use serde::Serialize;
use thiserror::Error;

/// Domain errors for grant and verification flows.
///
/// Every variant maps to a stable machine-readable code via [`AuthError::code`];
/// the Display string is the human-readable detail. None of these crash the
/// process; configuration problems surface at startup, everything else per
/// request.
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Configuration error: {0}")]
    Config(anyhow::Error),

    #[error("Validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("Unsupported grant type: {0}")]
    UnsupportedGrantType(String),

    #[error("Missing authorization token")]
    MissingToken,

    #[error("Invalid authorization scheme")]
    InvalidScheme,

    #[error("Invalid authorization header")]
    InvalidAuthorization,

    #[error("Incorrect password")]
    InvalidPassword,

    #[error("Incorrect client secret")]
    InvalidSecret,

    #[error("Invalid token: {0}")]
    InvalidToken(String),

    #[error("Token expired")]
    TokenExpired,

    #[error("Signature algorithm not accepted")]
    UnsupportedAlgorithm,

    #[error("Client is disabled")]
    ClientDisabled,

    #[error("Client has been deleted")]
    ClientDeleted,

    #[error("Restricted client cannot issue client-only tokens")]
    ClientRestricted,

    #[error("Account is disabled")]
    AccountDisabled,

    #[error("Account has been deleted")]
    AccountDeleted,

    #[error("Account is not allowed on this client")]
    InvalidAccount,

    #[error("Origin is not allowed for this client")]
    InvalidOrigin,

    #[error("Unknown token")]
    UnknownToken,

    #[error("Unknown client")]
    UnknownClient,

    #[error("Unknown account")]
    UnknownAccount,

    #[error("Token is disabled")]
    TokenDisabled,

    #[error("Token usage limit exceeded")]
    MaxUsage,

    #[error("Storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

impl AuthError {
    /// Stable machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::Config(_) => "invalid_configuration",
            AuthError::Validation(_) => "validation_failed",
            AuthError::UnsupportedGrantType(_) => "unsupported_grant_type",
            AuthError::MissingToken => "missing_token",
            AuthError::InvalidScheme => "invalid_scheme",
            AuthError::InvalidAuthorization => "invalid_authorization",
            AuthError::InvalidPassword => "invalid_password",
            AuthError::InvalidSecret => "invalid_secret",
            AuthError::InvalidToken(_) => "invalid_token",
            AuthError::TokenExpired => "token_expired",
            AuthError::UnsupportedAlgorithm => "unsupported_algorithm",
            AuthError::ClientDisabled => "client_disabled",
            AuthError::ClientDeleted => "client_deleted",
            AuthError::ClientRestricted => "client_restricted",
            AuthError::AccountDisabled => "account_disabled",
            AuthError::AccountDeleted => "account_deleted",
            AuthError::InvalidAccount => "invalid_account",
            AuthError::InvalidOrigin => "invalid_origin",
            AuthError::UnknownToken => "unknown_token",
            AuthError::UnknownClient => "unknown_client",
            AuthError::UnknownAccount => "unknown_account",
            AuthError::TokenDisabled => "token_disabled",
            AuthError::MaxUsage => "max_usage",
            AuthError::Storage(_) => "storage_error",
        }
    }
}

/// Structured failure returned to the external HTTP collaborator.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: &'static str,
    pub message: String,
}

impl From<&AuthError> for ErrorResponse {
    fn from(err: &AuthError) -> Self {
        Self {
            code: err.code(),
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_stable() {
        assert_eq!(AuthError::TokenExpired.code(), "token_expired");
        assert_eq!(AuthError::InvalidPassword.code(), "invalid_password");
        assert_eq!(
            AuthError::UnsupportedGrantType("implicit".to_string()).code(),
            "unsupported_grant_type"
        );
        assert_eq!(AuthError::MaxUsage.code(), "max_usage");
    }

    #[test]
    fn test_error_response_carries_code_and_detail() {
        let err = AuthError::InvalidToken("bad signature".to_string());
        let resp = ErrorResponse::from(&err);

        assert_eq!(resp.code, "invalid_token");
        assert!(resp.message.contains("bad signature"));
    }
}
