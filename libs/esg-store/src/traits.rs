//! Storage access traits
//!
//! The engine is generic over these three traits; the SQLite store
//! implements all of them and the in-memory store backs the tests.

use crate::error::Result;
use async_trait::async_trait;
use esg_model::{CalculationLog, Filter, MetricFormula, Period};

/// Uniform read/aggregate access to named raw tables
///
/// Pure query construction: count, sum and average under an equality
/// filter, implicitly period-scoped when the source has a period
/// column. Empty result sets are 0, never errors; unknown source or
/// field names are defined (non-fatal) errors.
#[async_trait]
pub trait DataSourceAdapter: Send + Sync {
    async fn count(&self, source: &str, filter: &Filter, period: &Period) -> Result<f64>;

    async fn sum(&self, source: &str, field: &str, filter: &Filter, period: &Period)
        -> Result<f64>;

    async fn avg(&self, source: &str, field: &str, filter: &Filter, period: &Period)
        -> Result<f64>;
}

/// Read access to metric formula definitions
#[async_trait]
pub trait FormulaCatalog: Send + Sync {
    /// The active formula for a metric code, if any
    async fn active_formula(&self, metric_code: &str) -> Result<Option<MetricFormula>>;

    /// All metrics with an active formula
    async fn list_active(&self) -> Result<Vec<MetricFormula>>;
}

/// Append-only sink for calculation audit records
#[async_trait]
pub trait LogSink: Send + Sync {
    async fn append(&self, entry: &CalculationLog) -> Result<()>;
}
