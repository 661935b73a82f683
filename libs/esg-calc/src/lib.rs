//! esg-calc - ESG metric calculation engine
//!
//! Evaluates declarative formula trees against raw operational data,
//! one reporting period at a time:
//!
//! ```text
//!   FormulaCatalog          CalculationRun              LogSink
//!   (active formulas) --> (memoized evaluation) --> (audit entries)
//!                               |
//!                        DataSourceAdapter
//!                        (count / sum / avg)
//! ```
//!
//! Failures stay inside `CalculationResult`; a run only aborts when
//! storage itself goes away. Batch runs order metrics so cross-metric
//! references are computed before their dependents.

pub mod accessors;
pub mod dependency;
pub mod error;
pub mod evaluator;
pub mod expression;
pub mod run;

// Re-export public API
pub use accessors::{builtin_accessors, AccessorSpec, AggregateKind};
pub use dependency::{extract_dependencies, topological_sort};
pub use error::{CalcError, Result};
pub use expression::{evaluate_expression, ExprError};
pub use run::{compute_all, compute_many, compute_one, CalculationRun};
