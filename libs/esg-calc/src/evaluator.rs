//! Formula tree evaluation
//!
//! Recursive evaluation of `FormulaConfig` against the data-source
//! adapter. Failures are carried inside `CalculationResult`; only a
//! fatal store outage surfaces as `Err` and aborts the run. Defined
//! numeric edge cases:
//! - ratio/percentage with zero denominator evaluates to 0
//! - year-over-year from a zero base is 100 when current is positive,
//!   otherwise 0
//! - weighted average with zero total weight evaluates to 0

use crate::error::{CalcError, Result};
use crate::expression::evaluate_expression;
use crate::run::CalculationRun;
use esg_model::{CalculationResult, Filter, FormulaConfig, Period, WeightedOperand};
use esg_store::{DataSourceAdapter, FormulaCatalog, LogSink};
use regex::Regex;
use serde_json::json;
use std::future::Future;
use std::pin::Pin;
use std::sync::OnceLock;

/// Operand outcome: a number, or an already-labelled failure message
type Operand = std::result::Result<f64, String>;

/// Longest chain of cross-period metric references a single evaluation
/// may follow before it is treated as circular
const MAX_CROSS_PERIOD_DEPTH: usize = 8;

/// Demote non-fatal store errors to failure data
fn store_value(value: esg_store::Result<f64>) -> Result<Operand> {
    match value {
        Ok(v) => Ok(Ok(v)),
        Err(e) if e.is_fatal() => Err(CalcError::Store(e)),
        Err(e) => Ok(Err(e.to_string())),
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn placeholder_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{([A-Za-z0-9_.]+)\}").expect("placeholder regex"))
}

impl<A, C, L> CalculationRun<'_, A, C, L>
where
    A: DataSourceAdapter + ?Sized,
    C: FormulaCatalog + ?Sized,
    L: LogSink + ?Sized,
{
    /// Evaluate one formula node at the given period
    ///
    /// Boxed because metric references recurse through
    /// `calculate_metric` and back into here.
    pub(crate) fn evaluate<'s>(
        &'s mut self,
        config: &'s FormulaConfig,
        period: Period,
    ) -> Pin<Box<dyn Future<Output = Result<CalculationResult>> + Send + 's>> {
        Box::pin(async move {
            match config {
                FormulaConfig::Count {
                    data_source,
                    filter,
                } => self.eval_count(data_source, filter, &period).await,
                FormulaConfig::Sum {
                    data_source,
                    field,
                    filter,
                    multiply,
                } => {
                    self.eval_sum(data_source, field, filter, *multiply, &period)
                        .await
                },
                FormulaConfig::Avg {
                    data_source,
                    field,
                    filter,
                } => self.eval_avg(data_source, field, filter, &period).await,
                FormulaConfig::Ratio {
                    numerator,
                    denominator,
                } => self.eval_ratio(numerator, denominator, period, false).await,
                FormulaConfig::Percentage {
                    numerator,
                    denominator,
                } => self.eval_ratio(numerator, denominator, period, true).await,
                FormulaConfig::Difference { current, previous } => {
                    self.eval_difference(current, previous, period).await
                },
                FormulaConfig::YoyRate { current, previous } => {
                    self.eval_yoy_rate(current, previous, period).await
                },
                FormulaConfig::WeightedAvg { components } => {
                    self.eval_weighted_avg(components, period).await
                },
                FormulaConfig::Metric { metric_code } => {
                    if period == *self.period() {
                        self.calculate_metric(metric_code).await
                    } else {
                        self.eval_metric_at(metric_code, period).await
                    }
                },
                FormulaConfig::Custom { expression } => {
                    self.eval_custom(expression, &period).await
                },
            }
        })
    }

    /// Evaluate a sub-formula, prefixing any failure with its role
    async fn eval_operand(
        &mut self,
        config: &FormulaConfig,
        period: Period,
        label: &str,
    ) -> Result<Operand> {
        let result = self.evaluate(config, period).await?;
        if result.success {
            Ok(Ok(result.value_or_zero()))
        } else {
            let message = result.error.unwrap_or_else(|| "calculation failed".to_string());
            Ok(Err(format!("{}: {}", label, message)))
        }
    }

    async fn eval_count(
        &mut self,
        data_source: &str,
        filter: &Filter,
        period: &Period,
    ) -> Result<CalculationResult> {
        match store_value(self.adapter.count(data_source, filter, period).await)? {
            Ok(value) => Ok(CalculationResult::ok(value).with_details(json!({
                "kind": "count",
                "dataSource": data_source,
                "value": value,
            }))),
            Err(message) => Ok(CalculationResult::fail(message)),
        }
    }

    async fn eval_sum(
        &mut self,
        data_source: &str,
        field: &str,
        filter: &Filter,
        multiply: Option<f64>,
        period: &Period,
    ) -> Result<CalculationResult> {
        match store_value(self.adapter.sum(data_source, field, filter, period).await)? {
            Ok(raw) => {
                let value = raw * multiply.unwrap_or(1.0);
                let mut details = json!({
                    "kind": "sum",
                    "dataSource": data_source,
                    "field": field,
                    "value": value,
                });
                if let Some(factor) = multiply {
                    details["multiply"] = json!(factor);
                    details["rawValue"] = json!(raw);
                }
                Ok(CalculationResult::ok(value).with_details(details))
            },
            Err(message) => Ok(CalculationResult::fail(message)),
        }
    }

    async fn eval_avg(
        &mut self,
        data_source: &str,
        field: &str,
        filter: &Filter,
        period: &Period,
    ) -> Result<CalculationResult> {
        match store_value(self.adapter.avg(data_source, field, filter, period).await)? {
            Ok(value) => Ok(CalculationResult::ok(value).with_details(json!({
                "kind": "avg",
                "dataSource": data_source,
                "field": field,
                "value": value,
            }))),
            Err(message) => Ok(CalculationResult::fail(message)),
        }
    }

    async fn eval_ratio(
        &mut self,
        numerator: &FormulaConfig,
        denominator: &FormulaConfig,
        period: Period,
        as_percentage: bool,
    ) -> Result<CalculationResult> {
        let numerator = match self.eval_operand(numerator, period.clone(), "numerator").await? {
            Ok(value) => value,
            Err(message) => return Ok(CalculationResult::fail(message)),
        };
        let denominator = match self
            .eval_operand(denominator, period, "denominator")
            .await?
        {
            Ok(value) => value,
            Err(message) => return Ok(CalculationResult::fail(message)),
        };

        // Zero denominator is a defined outcome, not an error
        let ratio = if denominator == 0.0 {
            0.0
        } else {
            numerator / denominator
        };
        let value = if as_percentage { round2(ratio * 100.0) } else { ratio };

        let mut details = json!({
            "numerator": numerator,
            "denominator": denominator,
        });
        if denominator == 0.0 {
            details["note"] = json!("zero denominator");
        }
        let mut result = CalculationResult::ok(value).with_details(details);
        if as_percentage {
            result = result.with_unit("%");
        }
        Ok(result)
    }

    async fn eval_difference(
        &mut self,
        current: &FormulaConfig,
        previous: &FormulaConfig,
        period: Period,
    ) -> Result<CalculationResult> {
        let previous_period = period.previous();
        let current = match self.eval_operand(current, period, "current").await? {
            Ok(value) => value,
            Err(message) => return Ok(CalculationResult::fail(message)),
        };
        let previous = match self
            .eval_operand(previous, previous_period, "previous")
            .await?
        {
            Ok(value) => value,
            Err(message) => return Ok(CalculationResult::fail(message)),
        };

        Ok(CalculationResult::ok(current - previous).with_details(json!({
            "current": current,
            "previous": previous,
        })))
    }

    async fn eval_yoy_rate(
        &mut self,
        current: &FormulaConfig,
        previous: &FormulaConfig,
        period: Period,
    ) -> Result<CalculationResult> {
        let previous_period = period.previous();
        let current = match self.eval_operand(current, period, "current").await? {
            Ok(value) => value,
            Err(message) => return Ok(CalculationResult::fail(message)),
        };
        let previous = match self
            .eval_operand(previous, previous_period, "previous")
            .await?
        {
            Ok(value) => value,
            Err(message) => return Ok(CalculationResult::fail(message)),
        };

        // Growth from a zero base has no ratio; report 100% when
        // something appeared, 0% when nothing did
        let value = if previous == 0.0 {
            if current > 0.0 {
                100.0
            } else {
                0.0
            }
        } else {
            round2((current - previous) / previous.abs() * 100.0)
        };

        let mut details = json!({
            "current": current,
            "previous": previous,
        });
        if previous == 0.0 {
            details["note"] = json!("zero base period");
        }
        Ok(CalculationResult::ok(value).with_unit("%").with_details(details))
    }

    async fn eval_weighted_avg(
        &mut self,
        components: &[WeightedOperand],
        period: Period,
    ) -> Result<CalculationResult> {
        let mut weighted_sum = 0.0;
        let mut total_weight = 0.0;
        let mut parts = Vec::with_capacity(components.len());

        for (index, component) in components.iter().enumerate() {
            let value = match self
                .eval_operand(
                    &component.value,
                    period.clone(),
                    &format!("component {} value", index),
                )
                .await?
            {
                Ok(value) => value,
                Err(message) => return Ok(CalculationResult::fail(message)),
            };
            let weight = match self
                .eval_operand(
                    &component.weight,
                    period.clone(),
                    &format!("component {} weight", index),
                )
                .await?
            {
                Ok(weight) => weight,
                Err(message) => return Ok(CalculationResult::fail(message)),
            };

            weighted_sum += value * weight;
            total_weight += weight;
            parts.push(json!({ "value": value, "weight": weight }));
        }

        let value = if total_weight == 0.0 {
            0.0
        } else {
            weighted_sum / total_weight
        };

        let mut details = json!({ "components": parts });
        if total_weight == 0.0 {
            details["note"] = json!("zero total weight");
        }
        Ok(CalculationResult::ok(value).with_details(details))
    }

    /// Evaluate a metric reference outside the run period (previous-year
    /// contexts). These bypass the run cache and audit log; the inflight
    /// set breaks reference cycles.
    async fn eval_metric_at(
        &mut self,
        metric_code: &str,
        period: Period,
    ) -> Result<CalculationResult> {
        // A self-reference under yoy_rate/difference shifts the period
        // on every hop (A@2024 -> A@2023 -> ...), so the key set alone
        // never repeats; the depth cap terminates those chains.
        let key = (metric_code.to_string(), period.clone());
        if self.inflight.contains(&key) || self.inflight.len() >= MAX_CROSS_PERIOD_DEPTH {
            return Ok(CalculationResult::fail(format!(
                "circular metric reference: {}",
                metric_code
            )));
        }

        let loaded = match self.catalog.active_formula(metric_code).await {
            Ok(found) => found,
            Err(e) if e.is_fatal() => return Err(e.into()),
            Err(e) => return Ok(CalculationResult::fail(e.to_string())),
        };
        let Some(formula) = loaded else {
            return Ok(CalculationResult::fail(format!(
                "no active formula for metric: {}",
                metric_code
            )));
        };

        self.inflight.insert(key.clone());
        let result = self.evaluate(&formula.config, period).await;
        self.inflight.remove(&key);
        result
    }

    async fn eval_custom(
        &mut self,
        expression: &str,
        period: &Period,
    ) -> Result<CalculationResult> {
        let regex = placeholder_regex();

        let mut values: Vec<(String, f64)> = Vec::new();
        for captures in regex.captures_iter(expression) {
            let name = &captures[1];
            if values.iter().any(|(known, _)| known == name) {
                continue;
            }
            let Some(spec) = self.accessors.get(name).copied() else {
                return Ok(CalculationResult::fail(format!(
                    "unknown placeholder: {}",
                    name
                )));
            };
            match store_value(spec.fetch(self.adapter, period).await)? {
                Ok(value) => values.push((name.to_string(), value)),
                Err(message) => {
                    return Ok(CalculationResult::fail(format!("{}: {}", name, message)))
                },
            }
        }

        let substituted = regex
            .replace_all(expression, |captures: &regex::Captures| {
                let value = values
                    .iter()
                    .find(|(name, _)| name == &captures[1])
                    .map(|(_, v)| *v)
                    .unwrap_or(0.0);
                // Parenthesize negatives so "a - {x}" stays well formed
                if value < 0.0 {
                    format!("({})", value)
                } else {
                    format!("{}", value)
                }
            })
            .into_owned();

        match evaluate_expression(&substituted) {
            Ok(value) => Ok(CalculationResult::ok(value).with_details(json!({
                "expression": expression,
                "substituted": substituted,
                "value": value,
            }))),
            Err(e) => Ok(CalculationResult::fail(format!(
                "expression error: {}",
                e
            ))),
        }
    }
}
