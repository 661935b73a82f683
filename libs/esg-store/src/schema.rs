//! Engine-owned table schema
//!
//! Only the tables this layer writes are created here. The raw
//! operational tables (employees, carbon_emissions, ...) belong to the
//! import collaborator and are read-only to the engine.

use crate::error::Result;
use sqlx::SqlitePool;

/// Metric formula definitions - the PRIMARY KEY enforces at most one
/// formula (and therefore at most one active formula) per metric code.
pub const METRIC_FORMULAS_DDL: &str = r#"
CREATE TABLE IF NOT EXISTS metric_formulas (
    metric_code TEXT PRIMARY KEY,
    name TEXT,
    unit TEXT,
    config_json TEXT NOT NULL,
    active INTEGER NOT NULL DEFAULT 1,
    updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
)
"#;

/// Append-only calculation audit log
pub const CALCULATION_LOGS_DDL: &str = r#"
CREATE TABLE IF NOT EXISTS calculation_logs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    metric_code TEXT NOT NULL,
    period TEXT NOT NULL,
    input_details TEXT,
    calculated_value REAL,
    status TEXT NOT NULL,
    error_message TEXT,
    execution_time_ms INTEGER NOT NULL,
    created_at TEXT NOT NULL
)
"#;

/// Create engine-owned tables if they do not exist
pub async fn apply_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(METRIC_FORMULAS_DDL).execute(pool).await?;
    sqlx::query(CALCULATION_LOGS_DDL).execute(pool).await?;
    Ok(())
}
