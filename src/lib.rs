//! Gatekeeper token core.
//!
//! An OAuth2-style issuance and verification engine: named grant strategies
//! (`password`, `client_credentials`, `refresh_token`) exchange credentials
//! for signed tokens backed by server-side records, and a bearer policy turns
//! presented tokens back into authenticated principals. The HTTP surface and
//! the storage backend are collaborators behind small seams; everything here
//! is transport-agnostic.

pub mod config;
pub mod models;
pub mod services;
pub mod store;
pub mod utils;

use std::sync::Arc;

use config::GatekeeperConfig;
use services::{BearerPolicy, Clock, CodecRegistry, GranterRegistry, Issuer, SystemClock};
use store::TokenStore;

pub use services::error::{AuthError, ErrorResponse};

/// Fully wired token core: grant dispatch plus bearer verification over one
/// store and one codec registry.
pub struct Gatekeeper {
    pub granters: GranterRegistry,
    pub bearer: BearerPolicy,
    pub issuer: Arc<Issuer>,
}

impl Gatekeeper {
    pub fn new(config: &GatekeeperConfig, store: Arc<dyn TokenStore>) -> Result<Self, AuthError> {
        Self::with_clock(config, store, Arc::new(SystemClock))
    }

    /// Wire with an explicit time source (tests use a fixed clock).
    pub fn with_clock(
        config: &GatekeeperConfig,
        store: Arc<dyn TokenStore>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, AuthError> {
        config.validate()?;
        let codecs = Arc::new(CodecRegistry::from_config(&config.token)?);
        let issuer = Arc::new(Issuer::new(store.clone(), codecs.clone(), clock.clone()));
        let granters = GranterRegistry::new(store.clone(), issuer.clone(), codecs.clone());
        let bearer = BearerPolicy::new(store, codecs, clock);

        Ok(Self {
            granters,
            bearer,
            issuer,
        })
    }
}

/// Initialize the tracing subscriber. `RUST_LOG` wins over the configured
/// level.
pub fn init_tracing(log_level: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .try_init();
}
