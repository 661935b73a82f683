//! Formula and log persistence helpers
//!
//! Free functions over a `SqlitePool`, used by the CLI and the
//! integration tests. Engine-side reads go through the trait
//! implementations in `sqlite.rs` instead.

use crate::error::Result;
use crate::sqlite::{hydrate_formula, hydrate_log};
use esg_model::{CalculationLog, MetricFormula};
use sqlx::SqlitePool;
use tracing::debug;

/// Insert or replace a formula definition
pub async fn upsert_formula(pool: &SqlitePool, formula: &MetricFormula) -> Result<()> {
    let config_json = serde_json::to_string(&formula.config)?;

    sqlx::query(
        r#"
        INSERT INTO metric_formulas (metric_code, name, unit, config_json, active, updated_at)
        VALUES (?, ?, ?, ?, ?, CURRENT_TIMESTAMP)
        ON CONFLICT(metric_code) DO UPDATE SET
            name = excluded.name,
            unit = excluded.unit,
            config_json = excluded.config_json,
            active = excluded.active,
            updated_at = CURRENT_TIMESTAMP
        "#,
    )
    .bind(&formula.metric_code)
    .bind(&formula.name)
    .bind(&formula.unit)
    .bind(config_json)
    .bind(formula.active as i64)
    .execute(pool)
    .await?;

    debug!(metric_code = %formula.metric_code, "formula upserted");
    Ok(())
}

/// Flip the active flag on a formula; returns false when the metric
/// code is unknown
pub async fn set_formula_active(
    pool: &SqlitePool,
    metric_code: &str,
    active: bool,
) -> Result<bool> {
    let result = sqlx::query("UPDATE metric_formulas SET active = ? WHERE metric_code = ?")
        .bind(active as i64)
        .bind(metric_code)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// All formula definitions, active or not, ordered by metric code
pub async fn list_formulas(pool: &SqlitePool) -> Result<Vec<MetricFormula>> {
    let rows = sqlx::query(
        r#"
        SELECT metric_code, name, unit, config_json, active
        FROM metric_formulas
        ORDER BY metric_code ASC
        "#,
    )
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(hydrate_formula).collect()
}

/// Most recent calculation log entries, newest first
pub async fn recent_logs(pool: &SqlitePool, limit: u32) -> Result<Vec<CalculationLog>> {
    let rows = sqlx::query(
        r#"
        SELECT metric_code, period, input_details, calculated_value,
               status, error_message, execution_time_ms, created_at
        FROM calculation_logs
        ORDER BY id DESC
        LIMIT ?
        "#,
    )
    .bind(limit as i64)
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(hydrate_log).collect()
}

/// Log entries for one metric and period, oldest first
pub async fn logs_for_metric(
    pool: &SqlitePool,
    metric_code: &str,
    period: &str,
) -> Result<Vec<CalculationLog>> {
    let rows = sqlx::query(
        r#"
        SELECT metric_code, period, input_details, calculated_value,
               status, error_message, execution_time_ms, created_at
        FROM calculation_logs
        WHERE metric_code = ? AND period = ?
        ORDER BY id ASC
        "#,
    )
    .bind(metric_code)
    .bind(period)
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(hydrate_log).collect()
}
