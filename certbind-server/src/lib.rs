//! Storage, downstream delivery and process wiring for certbind.

pub mod config;
pub mod store;
pub mod webhook;

use std::sync::Arc;

use certbind_auth::{CertAuth, CertAuthStore, CheckinAndCommandService};

pub use config::{ConfigError, ConfigOverrides, ServerConfig};
pub use store::{AssociationRecord, SqliteCertAuthStore, SqliteStoreError};
pub use webhook::{WebhookError, WebhookService};

/// Put the certificate association middleware, configured by `config`, in
/// front of `next`.
pub fn build_service(
    config: &ServerConfig,
    store: Arc<dyn CertAuthStore>,
    next: Arc<dyn CheckinAndCommandService>,
) -> CertAuth {
    if config.policy.warn_only {
        tracing::warn!("cert auth is in warn-only mode: spoofed clients may pass");
    }
    CertAuth::new(next, store).with_policy(config.policy)
}
