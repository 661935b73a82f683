//! Calculation runs
//!
//! A `CalculationRun` scopes one reporting period: every metric is
//! evaluated at most once per run, metric references hit the run cache,
//! and every evaluation attempt appends one audit log entry. Runs are
//! generic over the storage traits so tests drive them with the
//! in-memory store.

use crate::accessors::{builtin_accessors, AccessorSpec};
use crate::dependency::{extract_dependencies, topological_sort};
use crate::error::Result;
use chrono::Utc;
use esg_model::{CalculationLog, CalculationResult, CalculationStatus, MetricFormula, Period};
use esg_store::{DataSourceAdapter, FormulaCatalog, LogSink};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Per-metric cache state within one run
pub(crate) enum CacheSlot {
    /// Evaluation has started; hitting this again means a cycle
    InProgress,
    Done(CalculationResult),
}

/// One memoized calculation pass over a single period
pub struct CalculationRun<'a, A, C, L>
where
    A: DataSourceAdapter + ?Sized,
    C: FormulaCatalog + ?Sized,
    L: LogSink + ?Sized,
{
    pub(crate) adapter: &'a A,
    pub(crate) catalog: &'a C,
    pub(crate) sink: &'a L,
    pub(crate) period: Period,
    pub(crate) cache: HashMap<String, CacheSlot>,
    /// Guard against cycles in previous-period metric references,
    /// which bypass the main cache
    pub(crate) inflight: HashSet<(String, Period)>,
    pub(crate) accessors: HashMap<&'static str, AccessorSpec>,
}

impl<'a, A, C, L> CalculationRun<'a, A, C, L>
where
    A: DataSourceAdapter + ?Sized,
    C: FormulaCatalog + ?Sized,
    L: LogSink + ?Sized,
{
    pub fn new(adapter: &'a A, catalog: &'a C, sink: &'a L, period: Period) -> Self {
        Self {
            adapter,
            catalog,
            sink,
            period,
            cache: HashMap::new(),
            inflight: HashSet::new(),
            accessors: builtin_accessors(),
        }
    }

    pub fn period(&self) -> &Period {
        &self.period
    }

    /// Calculate one metric, serving repeats from the run cache
    ///
    /// A cache hit returns the earlier result without a new audit
    /// entry. A fresh evaluation always appends exactly one entry,
    /// success or failure.
    pub async fn calculate_metric(&mut self, metric_code: &str) -> Result<CalculationResult> {
        match self.cache.get(metric_code) {
            Some(CacheSlot::Done(result)) => {
                debug!(metric_code, "cache hit");
                return Ok(result.clone());
            },
            Some(CacheSlot::InProgress) => {
                return Ok(CalculationResult::fail(format!(
                    "circular metric reference: {}",
                    metric_code
                )));
            },
            None => {},
        }

        self.cache
            .insert(metric_code.to_string(), CacheSlot::InProgress);
        let started = Instant::now();

        let loaded = match self.catalog.active_formula(metric_code).await {
            Ok(found) => Ok(found),
            Err(e) if e.is_fatal() => return Err(e.into()),
            Err(e) => Err(e.to_string()),
        };

        let result = match loaded {
            Ok(Some(formula)) => self.evaluate_formula(&formula).await?,
            Ok(None) => CalculationResult::fail(format!(
                "no active formula for metric: {}",
                metric_code
            )),
            Err(message) => CalculationResult::fail(message),
        };

        self.finish(metric_code, started, result).await
    }

    /// Calculate a metric from an already-loaded formula, skipping the
    /// catalog lookup. Caching and audit logging behave exactly as in
    /// `calculate_metric`.
    pub async fn calculate_metric_with(
        &mut self,
        formula: &MetricFormula,
    ) -> Result<CalculationResult> {
        let metric_code = formula.metric_code.as_str();
        match self.cache.get(metric_code) {
            Some(CacheSlot::Done(result)) => return Ok(result.clone()),
            Some(CacheSlot::InProgress) => {
                return Ok(CalculationResult::fail(format!(
                    "circular metric reference: {}",
                    metric_code
                )));
            },
            None => {},
        }

        self.cache
            .insert(metric_code.to_string(), CacheSlot::InProgress);
        let started = Instant::now();
        let result = self.evaluate_formula(formula).await?;
        self.finish(metric_code, started, result).await
    }

    async fn evaluate_formula(&mut self, formula: &MetricFormula) -> Result<CalculationResult> {
        let period = self.period.clone();
        let mut result = self.evaluate(&formula.config, period).await?;
        if result.success && result.unit.is_none() {
            result.unit = formula.unit.clone();
        }
        Ok(result)
    }

    /// Append the audit entry and cache the finished result
    async fn finish(
        &mut self,
        metric_code: &str,
        started: Instant,
        result: CalculationResult,
    ) -> Result<CalculationResult> {
        let entry = CalculationLog {
            metric_code: metric_code.to_string(),
            period: self.period.clone(),
            input_details: result.details.clone(),
            calculated_value: result.value,
            status: if result.success {
                CalculationStatus::Success
            } else {
                CalculationStatus::Failed
            },
            error_message: result.error.clone(),
            execution_time_ms: started.elapsed().as_millis() as u64,
            created_at: Utc::now(),
        };
        if let Err(e) = self.sink.append(&entry).await {
            if e.is_fatal() {
                return Err(e.into());
            }
            warn!(metric_code, error = %e, "failed to append calculation log");
        }

        self.cache
            .insert(metric_code.to_string(), CacheSlot::Done(result.clone()));
        Ok(result)
    }

    /// Calculate an explicit list of metrics
    pub async fn calculate_many(
        &mut self,
        metric_codes: &[String],
    ) -> Result<BTreeMap<String, CalculationResult>> {
        let mut results = BTreeMap::new();
        for code in metric_codes {
            let result = self.calculate_metric(code).await?;
            results.insert(code.clone(), result);
        }
        Ok(results)
    }

    /// Calculate every metric with an active formula, dependencies first
    pub async fn calculate_all(&mut self) -> Result<BTreeMap<String, CalculationResult>> {
        let formulas = self.catalog.list_active().await?;
        self.calculate_batch(formulas).await
    }

    /// Calculate the metrics whose code starts with a module prefix
    /// (e.g. "E-" for the environmental module). Dependencies outside
    /// the prefix are still resolved on demand.
    pub async fn calculate_for_module_prefix(
        &mut self,
        prefix: &str,
    ) -> Result<BTreeMap<String, CalculationResult>> {
        let formulas = self
            .catalog
            .list_active()
            .await?
            .into_iter()
            .filter(|f| f.metric_code.starts_with(prefix))
            .collect();
        self.calculate_batch(formulas).await
    }

    async fn calculate_batch(
        &mut self,
        formulas: Vec<MetricFormula>,
    ) -> Result<BTreeMap<String, CalculationResult>> {
        let mut by_code: BTreeMap<String, MetricFormula> = formulas
            .into_iter()
            .map(|f| (f.metric_code.clone(), f))
            .collect();
        let graph: BTreeMap<String, BTreeSet<String>> = by_code
            .iter()
            .map(|(code, f)| (code.clone(), extract_dependencies(&f.config)))
            .collect();
        let order = topological_sort(&graph);

        let mut results = BTreeMap::new();
        for code in order {
            // Formulas are already in hand; skip the per-metric
            // catalog read
            let result = match by_code.remove(&code) {
                Some(formula) => self.calculate_metric_with(&formula).await?,
                None => self.calculate_metric(&code).await?,
            };
            results.insert(code, result);
        }

        let computed = results.values().filter(|r| r.success).count();
        let failed = results.len() - computed;
        info!(period = %self.period, computed, failed, "calculation batch finished");
        Ok(results)
    }
}

/// Calculate one metric against a store implementing all three traits
pub async fn compute_one<S>(
    store: &S,
    period: Period,
    metric_code: &str,
) -> Result<CalculationResult>
where
    S: DataSourceAdapter + FormulaCatalog + LogSink,
{
    let mut run = CalculationRun::new(store, store, store, period);
    run.calculate_metric(metric_code).await
}

/// Calculate an explicit list of metrics against a store implementing
/// all three traits
pub async fn compute_many<S>(
    store: &S,
    period: Period,
    metric_codes: &[String],
) -> Result<BTreeMap<String, CalculationResult>>
where
    S: DataSourceAdapter + FormulaCatalog + LogSink,
{
    let mut run = CalculationRun::new(store, store, store, period);
    run.calculate_many(metric_codes).await
}

/// Calculate all active metrics against a store implementing all three
/// traits
pub async fn compute_all<S>(
    store: &S,
    period: Period,
) -> Result<BTreeMap<String, CalculationResult>>
where
    S: DataSourceAdapter + FormulaCatalog + LogSink,
{
    let mut run = CalculationRun::new(store, store, store, period);
    run.calculate_all().await
}
