//! SQLite-backed store
//!
//! Implements the adapter, catalog and log-sink traits over a
//! `SqlitePool`. Aggregate SQL is assembled exclusively from
//! registry-resolved identifiers; filter and period values are always
//! bound parameters.

use crate::error::{Result, StoreError};
use crate::registry::{SourceDef, SourceRegistry};
use crate::traits::{DataSourceAdapter, FormulaCatalog, LogSink};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use esg_model::{CalculationLog, CalculationStatus, Filter, MetricFormula, Period};
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};

/// SQLite implementation of the storage traits
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
    registry: SourceRegistry,
}

impl SqliteStore {
    /// Create a store with the builtin source registry
    pub fn new(pool: SqlitePool) -> Self {
        Self::with_registry(pool, SourceRegistry::builtin())
    }

    pub fn with_registry(pool: SqlitePool, registry: SourceRegistry) -> Self {
        Self { pool, registry }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn registry(&self) -> &SourceRegistry {
        &self.registry
    }

    /// Append registry-validated WHERE clauses for the filter and the
    /// implicit period scope
    fn push_where(
        builder: &mut QueryBuilder<'_, Sqlite>,
        def: &SourceDef,
        source: &str,
        filter: &Filter,
        period: &Period,
    ) -> Result<()> {
        builder.push(" WHERE 1 = 1");

        if let Some(period_column) = def.period_column {
            builder.push(format!(" AND {} = ", period_column));
            builder.push_bind(period.as_str().to_string());
        }

        for (field, value) in filter {
            let column = def
                .column(field)
                .ok_or_else(|| StoreError::unknown_field(source, field.clone()))?;
            builder.push(format!(" AND {} = ", column));
            push_filter_value(builder, value);
        }

        Ok(())
    }
}

/// Bind a JSON filter value with its natural SQLite type
fn push_filter_value(builder: &mut QueryBuilder<'_, Sqlite>, value: &serde_json::Value) {
    match value {
        serde_json::Value::Bool(b) => {
            builder.push_bind(*b);
        },
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                builder.push_bind(i);
            } else {
                builder.push_bind(n.as_f64().unwrap_or(0.0));
            }
        },
        serde_json::Value::String(s) => {
            builder.push_bind(s.clone());
        },
        other => {
            builder.push_bind(other.to_string());
        },
    }
}

#[async_trait]
impl DataSourceAdapter for SqliteStore {
    async fn count(&self, source: &str, filter: &Filter, period: &Period) -> Result<f64> {
        let def = self.registry.get(source)?;
        let mut builder = QueryBuilder::new(format!("SELECT COUNT(*) FROM {}", def.table));
        Self::push_where(&mut builder, def, source, filter, period)?;

        let count: i64 = builder.build_query_scalar().fetch_one(&self.pool).await?;
        Ok(count as f64)
    }

    async fn sum(
        &self,
        source: &str,
        field: &str,
        filter: &Filter,
        period: &Period,
    ) -> Result<f64> {
        let def = self.registry.get(source)?;
        let column = self.registry.resolve_field(source, field)?;
        let mut builder = QueryBuilder::new(format!(
            "SELECT CAST(COALESCE(SUM({}), 0) AS REAL) FROM {}",
            column, def.table
        ));
        Self::push_where(&mut builder, def, source, filter, period)?;

        let sum: f64 = builder.build_query_scalar().fetch_one(&self.pool).await?;
        Ok(sum)
    }

    async fn avg(
        &self,
        source: &str,
        field: &str,
        filter: &Filter,
        period: &Period,
    ) -> Result<f64> {
        let def = self.registry.get(source)?;
        let column = self.registry.resolve_field(source, field)?;
        let mut builder = QueryBuilder::new(format!(
            "SELECT CAST(COALESCE(AVG({}), 0) AS REAL) FROM {}",
            column, def.table
        ));
        Self::push_where(&mut builder, def, source, filter, period)?;

        let avg: f64 = builder.build_query_scalar().fetch_one(&self.pool).await?;
        Ok(avg)
    }
}

#[async_trait]
impl FormulaCatalog for SqliteStore {
    async fn active_formula(&self, metric_code: &str) -> Result<Option<MetricFormula>> {
        let row = sqlx::query(
            r#"
            SELECT metric_code, name, unit, config_json, active
            FROM metric_formulas
            WHERE metric_code = ? AND active = 1
            "#,
        )
        .bind(metric_code)
        .fetch_optional(&self.pool)
        .await?;

        row.map(hydrate_formula).transpose()
    }

    async fn list_active(&self) -> Result<Vec<MetricFormula>> {
        let rows = sqlx::query(
            r#"
            SELECT metric_code, name, unit, config_json, active
            FROM metric_formulas
            WHERE active = 1
            ORDER BY metric_code ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(hydrate_formula).collect()
    }
}

#[async_trait]
impl LogSink for SqliteStore {
    async fn append(&self, entry: &CalculationLog) -> Result<()> {
        let input_details = entry
            .input_details
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        sqlx::query(
            r#"
            INSERT INTO calculation_logs
                (metric_code, period, input_details, calculated_value,
                 status, error_message, execution_time_ms, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&entry.metric_code)
        .bind(entry.period.as_str())
        .bind(input_details)
        .bind(entry.calculated_value)
        .bind(entry.status.as_str())
        .bind(&entry.error_message)
        .bind(entry.execution_time_ms as i64)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

/// Hydrate a metric_formulas row into MetricFormula
pub(crate) fn hydrate_formula(row: SqliteRow) -> Result<MetricFormula> {
    let metric_code: String = row.try_get("metric_code")?;
    let name: Option<String> = row.try_get("name")?;
    let unit: Option<String> = row.try_get("unit")?;
    let config_json: String = row.try_get("config_json")?;
    let active: i64 = row.try_get("active")?;

    let config = serde_json::from_str(&config_json)
        .map_err(|e| StoreError::Serialization(format!("formula '{}': {}", metric_code, e)))?;

    Ok(MetricFormula {
        metric_code,
        name,
        unit,
        config,
        active: active != 0,
    })
}

/// Hydrate a calculation_logs row into CalculationLog
pub(crate) fn hydrate_log(row: SqliteRow) -> Result<CalculationLog> {
    let metric_code: String = row.try_get("metric_code")?;
    let period: String = row.try_get("period")?;
    let input_details: Option<String> = row.try_get("input_details")?;
    let calculated_value: Option<f64> = row.try_get("calculated_value")?;
    let status: String = row.try_get("status")?;
    let error_message: Option<String> = row.try_get("error_message")?;
    let execution_time_ms: i64 = row.try_get("execution_time_ms")?;
    let created_at: DateTime<Utc> = row.try_get("created_at")?;

    let period = Period::parse(&period)
        .map_err(|e| StoreError::Serialization(format!("log period: {}", e)))?;
    let input_details = input_details
        .as_deref()
        .map(serde_json::from_str)
        .transpose()?;
    let status = match status.as_str() {
        "success" => CalculationStatus::Success,
        _ => CalculationStatus::Failed,
    };

    Ok(CalculationLog {
        metric_code,
        period,
        input_details,
        calculated_value,
        status,
        error_message,
        execution_time_ms: execution_time_ms as u64,
        created_at,
    })
}
