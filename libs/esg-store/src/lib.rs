//! esg-store - Storage layer for the ESG metric engine
//!
//! Three concerns behind three traits:
//! - `DataSourceAdapter`: aggregate reads (count/sum/avg) over the raw
//!   operational tables, scoped by period and equality filter
//! - `FormulaCatalog`: active metric formula definitions
//! - `LogSink`: append-only calculation audit log
//!
//! `SqliteStore` implements all three over a `SqlitePool`; `MemoryStore`
//! backs the engine tests. The `SourceRegistry` is the single gate
//! between logical source/field names and SQL identifiers.

pub mod error;
pub mod memory;
pub mod registry;
pub mod repository;
pub mod schema;
pub mod sqlite;
pub mod traits;

// Re-export public API
pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use registry::{SourceDef, SourceRegistry};
pub use schema::apply_schema;
pub use sqlite::SqliteStore;
pub use traits::{DataSourceAdapter, FormulaCatalog, LogSink};
