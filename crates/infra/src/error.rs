use opsradar_risk::RiskError;

use crate::store::StoreError;

/// Failure of a single scan pass.
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Risk(#[from] RiskError),
}
