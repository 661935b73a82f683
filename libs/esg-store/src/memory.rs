//! In-memory store for tests
//!
//! Backs the engine tests without a database. Rows live in a map of
//! source name to row list; aggregates apply the same equality-filter
//! and period-scoping semantics as the SQLite store. A query counter
//! lets tests assert memoization.

use crate::error::Result;
use crate::registry::SourceRegistry;
use crate::traits::{DataSourceAdapter, FormulaCatalog, LogSink};
use async_trait::async_trait;
use esg_model::{CalculationLog, Filter, MetricFormula, Period};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;

type Row = BTreeMap<String, serde_json::Value>;

/// In-memory implementation of the storage traits
pub struct MemoryStore {
    registry: SourceRegistry,
    rows: RwLock<HashMap<String, Vec<Row>>>,
    formulas: RwLock<BTreeMap<String, MetricFormula>>,
    logs: RwLock<Vec<CalculationLog>>,
    query_count: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            registry: SourceRegistry::builtin(),
            rows: RwLock::new(HashMap::new()),
            formulas: RwLock::new(BTreeMap::new()),
            logs: RwLock::new(Vec::new()),
            query_count: AtomicUsize::new(0),
        }
    }

    /// Insert one raw row; the period is stored under the `period` key
    pub async fn insert_row(
        &self,
        source: &str,
        period: &str,
        fields: &[(&str, serde_json::Value)],
    ) {
        let mut row = Row::new();
        row.insert("period".to_string(), serde_json::json!(period));
        for (key, value) in fields {
            row.insert((*key).to_string(), value.clone());
        }
        self.rows
            .write()
            .await
            .entry(source.to_string())
            .or_default()
            .push(row);
    }

    /// Register a formula definition
    pub async fn put_formula(&self, formula: MetricFormula) {
        self.formulas
            .write()
            .await
            .insert(formula.metric_code.clone(), formula);
    }

    /// Snapshot of all appended log entries, in append order
    pub async fn logs(&self) -> Vec<CalculationLog> {
        self.logs.read().await.clone()
    }

    /// Total number of aggregate queries served
    pub fn query_count(&self) -> usize {
        self.query_count.load(Ordering::Relaxed)
    }

    /// Rows of a source matching the filter and period
    async fn select(&self, source: &str, filter: &Filter, period: &Period) -> Result<Vec<Row>> {
        self.registry.get(source)?;
        for field in filter.keys() {
            self.registry.resolve_field(source, field)?;
        }
        self.query_count.fetch_add(1, Ordering::Relaxed);

        let rows = self.rows.read().await;
        let matching = rows
            .get(source)
            .map(|rows| {
                rows.iter()
                    .filter(|row| {
                        row.get("period").and_then(|v| v.as_str()) == Some(period.as_str())
                            && filter.iter().all(|(field, want)| {
                                row.get(field).is_some_and(|have| have == want)
                            })
                    })
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        Ok(matching)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn numeric(row: &Row, field: &str) -> Option<f64> {
    row.get(field).and_then(|v| v.as_f64())
}

#[async_trait]
impl DataSourceAdapter for MemoryStore {
    async fn count(&self, source: &str, filter: &Filter, period: &Period) -> Result<f64> {
        Ok(self.select(source, filter, period).await?.len() as f64)
    }

    async fn sum(
        &self,
        source: &str,
        field: &str,
        filter: &Filter,
        period: &Period,
    ) -> Result<f64> {
        self.registry.resolve_field(source, field)?;
        let rows = self.select(source, filter, period).await?;
        Ok(rows.iter().filter_map(|row| numeric(row, field)).sum())
    }

    async fn avg(
        &self,
        source: &str,
        field: &str,
        filter: &Filter,
        period: &Period,
    ) -> Result<f64> {
        self.registry.resolve_field(source, field)?;
        let rows = self.select(source, filter, period).await?;
        let values: Vec<f64> = rows.iter().filter_map(|row| numeric(row, field)).collect();
        if values.is_empty() {
            return Ok(0.0);
        }
        Ok(values.iter().sum::<f64>() / values.len() as f64)
    }
}

#[async_trait]
impl FormulaCatalog for MemoryStore {
    async fn active_formula(&self, metric_code: &str) -> Result<Option<MetricFormula>> {
        Ok(self
            .formulas
            .read()
            .await
            .get(metric_code)
            .filter(|f| f.active)
            .cloned())
    }

    async fn list_active(&self) -> Result<Vec<MetricFormula>> {
        Ok(self
            .formulas
            .read()
            .await
            .values()
            .filter(|f| f.active)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl LogSink for MemoryStore {
    async fn append(&self, entry: &CalculationLog) -> Result<()> {
        self.logs.write().await.push(entry.clone());
        Ok(())
    }
}
