//! The check-in and command capability implemented by every chain stage.

use async_trait::async_trait;
use certbind_core::{Authenticate, CheckOut, Command, CommandResults, Request, TokenUpdate};

use crate::certauth::CertAuthFailure;

/// Protocol operations a stage of the handler chain exposes.
///
/// Middleware implements this trait and holds the next stage behind the
/// same trait, so stages stack in any order.
#[async_trait]
pub trait CheckinAndCommandService: Send + Sync {
    async fn authenticate(&self, req: &Request, msg: &Authenticate) -> Result<(), ServiceError>;

    async fn token_update(&self, req: &Request, msg: &TokenUpdate) -> Result<(), ServiceError>;

    async fn check_out(&self, req: &Request, msg: &CheckOut) -> Result<(), ServiceError>;

    /// Handle a command report and optionally return the next command.
    async fn command_and_report_results(
        &self,
        req: &Request,
        results: &CommandResults,
    ) -> Result<Option<Command>, ServiceError>;
}

/// Error returned from any stage of the chain.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// The request was rejected by certificate authentication.
    #[error(transparent)]
    CertAuth(#[from] CertAuthFailure),

    /// A downstream handler failed.
    #[error("{0}")]
    Handler(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl ServiceError {
    pub fn handler(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::Handler(err.into())
    }

    /// The certificate authentication failure, if that is what this is.
    pub fn as_cert_auth(&self) -> Option<&CertAuthFailure> {
        match self {
            Self::CertAuth(failure) => Some(failure),
            Self::Handler(_) => None,
        }
    }
}
