//! esg-model - Shared data model for the ESG metric engine
//!
//! Core types exchanged between the storage layer and the calculation
//! engine:
//! - `FormulaConfig`: declarative formula tree (tagged by operation kind)
//! - `MetricFormula`: binding of one formula to one metric code
//! - `CalculationResult`: outcome of evaluating a formula
//! - `CalculationLog`: append-only audit record per evaluation attempt
//! - `Period`: reporting period key with previous-period derivation

pub mod period;
pub mod types;

// Re-export public API
pub use period::{Period, PeriodError};
pub use types::{
    CalculationLog, CalculationResult, CalculationStatus, Filter, FormulaConfig, MetricFormula,
    WeightedOperand,
};
