//! Engine error types
//!
//! A `CalcError` aborts the whole calculation run. Per-metric failures
//! (bad formula, unknown source, division by zero, ...) are not errors
//! at this level; they are reported inside `CalculationResult` and the
//! run continues with the next metric.

use esg_store::StoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CalcError {
    /// Storage became unavailable mid-run
    #[error("Store unavailable: {0}")]
    Store(#[from] StoreError),

    /// The requested reporting period is malformed
    #[error("Period error: {0}")]
    Period(#[from] esg_model::PeriodError),
}

pub type Result<T> = std::result::Result<T, CalcError>;
