pub mod credentials;
pub mod duration;

pub use credentials::{
    hash_password, secret_digest, secrets_match, verify_password, Password, PasswordHashString,
};
pub use duration::parse_relative_duration;
