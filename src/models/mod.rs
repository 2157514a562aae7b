pub mod account;
pub mod client;
pub mod token;

pub use account::Account;
pub use client::{Client, ClientType};
pub use token::{ClientToken, TokenBase, TokenRecord, TokenUsage, UserToken};
