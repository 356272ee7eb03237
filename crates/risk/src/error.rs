use thiserror::Error;

use opsradar_core::DomainError;

#[derive(Debug, Error)]
pub enum RiskError {
    #[error("invalid job input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Domain(#[from] DomainError),
}
