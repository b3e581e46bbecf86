pub mod config;
pub mod error;
pub mod response;
pub mod types;
pub mod auth;
pub mod rate_limit;
pub mod store;
pub mod email;
pub mod s3;
pub mod notify;
pub mod users;
pub mod guardians;
pub mod alerts;
pub mod health;

use auth::TokenVerifier;
use config::Config;
use email::Mailer;
use rate_limit::RateLimiter;
use s3::EvidenceStore;
use std::sync::Arc;
use store::DocumentStore;

/// Shared application state, built once per process and handed to every request.
pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn DocumentStore>,
    pub mailer: Arc<dyn Mailer>,
    pub evidence: Arc<dyn EvidenceStore>,
    pub verifier: TokenVerifier,
    pub rate_limiter: RateLimiter,
}

impl AppState {
    pub fn new(
        config: Config,
        store: Arc<dyn DocumentStore>,
        mailer: Arc<dyn Mailer>,
        evidence: Arc<dyn EvidenceStore>,
        verifier: TokenVerifier,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            store,
            mailer,
            evidence,
            verifier,
            rate_limiter: RateLimiter::default(),
        })
    }
}
