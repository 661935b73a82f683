//! Formula and result type definitions
//!
//! Core types for metric calculation:
//! - FormulaConfig: declarative formula tree, tagged by operation kind
//! - MetricFormula: binds one formula to one metric code
//! - CalculationResult: evaluation outcome, failures carried as data
//! - CalculationLog: append-only audit record per evaluation attempt

use crate::period::Period;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Equality filter applied to a raw data source (logical field -> value)
pub type Filter = BTreeMap<String, serde_json::Value>;

// ============================================================================
// Formula Tree
// ============================================================================

/// Declarative formula tree - one variant per operation kind
///
/// This is the serialized shape authored by the admin surface and
/// stored in `metric_formulas.config_json`. Wire field names are
/// camelCase to match the stored documents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FormulaConfig {
    /// Row count over a data source under an equality filter
    Count {
        #[serde(rename = "dataSource")]
        data_source: String,
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        filter: Filter,
    },

    /// Field summation over a data source
    Sum {
        #[serde(rename = "dataSource")]
        data_source: String,
        field: String,
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        filter: Filter,
        /// Optional scalar applied to the summed value
        #[serde(default, skip_serializing_if = "Option::is_none")]
        multiply: Option<f64>,
    },

    /// Field average over a data source
    Avg {
        #[serde(rename = "dataSource")]
        data_source: String,
        field: String,
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        filter: Filter,
    },

    /// Numerator / denominator (zero denominator yields 0, not an error)
    Ratio {
        numerator: Box<FormulaConfig>,
        denominator: Box<FormulaConfig>,
    },

    /// Ratio scaled to percent, unit "%"
    Percentage {
        numerator: Box<FormulaConfig>,
        denominator: Box<FormulaConfig>,
    },

    /// Current minus previous; `previous` is evaluated one year back
    Difference {
        current: Box<FormulaConfig>,
        previous: Box<FormulaConfig>,
    },

    /// Year-over-year growth rate in percent
    YoyRate {
        current: Box<FormulaConfig>,
        previous: Box<FormulaConfig>,
    },

    /// Weighted mean over {value, weight} pairs
    WeightedAvg { components: Vec<WeightedOperand> },

    /// Reference to another metric's own formula (memoized per run)
    Metric {
        #[serde(rename = "metricCode")]
        metric_code: String,
    },

    /// Restricted arithmetic expression with {source.metric} placeholders
    Custom { expression: String },
}

/// One value/weight pair of a weighted average
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightedOperand {
    pub value: FormulaConfig,
    pub weight: FormulaConfig,
}

/// Binding of a formula to a metric code
///
/// At most one formula exists per metric code; the `active` flag
/// controls whether the engine evaluates it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricFormula {
    pub metric_code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    pub config: FormulaConfig,
    pub active: bool,
}

// ============================================================================
// Results and Audit Log
// ============================================================================

/// Outcome of evaluating one formula
///
/// Failures are data, never panics: `success=false` always carries a
/// human-readable `error`. Successful results may carry `details`
/// documenting intermediate numerator/denominator/weight values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalculationResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CalculationResult {
    /// Successful result with a value
    pub fn ok(value: f64) -> Self {
        Self {
            success: true,
            value: Some(value),
            unit: None,
            details: None,
            error: None,
        }
    }

    /// Failed result with a message
    pub fn fail(error: impl Into<String>) -> Self {
        Self {
            success: false,
            value: None,
            unit: None,
            details: None,
            error: Some(error.into()),
        }
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Numeric value, coercing absence to 0 for aggregate composition
    pub fn value_or_zero(&self) -> f64 {
        self.value.unwrap_or(0.0)
    }
}

/// Evaluation status recorded in the audit log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CalculationStatus {
    Success,
    Failed,
}

impl CalculationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }
}

/// Append-only audit record, written once per evaluation attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalculationLog {
    pub metric_code: String,
    pub period: Period,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_details: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub calculated_value: Option<f64>,
    pub status: CalculationStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub execution_time_ms: u64,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_formula_kind_tags() {
        let config: FormulaConfig = serde_json::from_value(json!({
            "kind": "count",
            "dataSource": "employees",
            "filter": { "gender": "female" }
        }))
        .unwrap();

        match config {
            FormulaConfig::Count { data_source, filter } => {
                assert_eq!(data_source, "employees");
                assert_eq!(filter.get("gender"), Some(&json!("female")));
            },
            other => panic!("Expected count, got {:?}", other),
        }
    }

    #[test]
    fn test_nested_percentage_roundtrip() {
        let config: FormulaConfig = serde_json::from_value(json!({
            "kind": "percentage",
            "numerator": { "kind": "count", "dataSource": "employees", "filter": { "gender": "female" } },
            "denominator": { "kind": "count", "dataSource": "employees" }
        }))
        .unwrap();

        let back = serde_json::to_value(&config).unwrap();
        assert_eq!(back["kind"], "percentage");
        assert_eq!(back["numerator"]["kind"], "count");
        assert_eq!(back["denominator"]["dataSource"], "employees");
    }

    #[test]
    fn test_yoy_rate_tag() {
        let config: FormulaConfig = serde_json::from_value(json!({
            "kind": "yoy_rate",
            "current": { "kind": "sum", "dataSource": "carbon_emissions", "field": "co2_tonnes" },
            "previous": { "kind": "sum", "dataSource": "carbon_emissions", "field": "co2_tonnes" }
        }))
        .unwrap();
        assert!(matches!(config, FormulaConfig::YoyRate { .. }));
    }

    #[test]
    fn test_metric_reference_field_name() {
        let config: FormulaConfig =
            serde_json::from_value(json!({ "kind": "metric", "metricCode": "E-001" })).unwrap();
        match config {
            FormulaConfig::Metric { metric_code } => assert_eq!(metric_code, "E-001"),
            other => panic!("Expected metric, got {:?}", other),
        }
    }

    #[test]
    fn test_weighted_avg_components() {
        let config: FormulaConfig = serde_json::from_value(json!({
            "kind": "weighted_avg",
            "components": [
                { "value": { "kind": "custom", "expression": "10" },
                  "weight": { "kind": "custom", "expression": "2" } }
            ]
        }))
        .unwrap();
        match config {
            FormulaConfig::WeightedAvg { components } => assert_eq!(components.len(), 1),
            other => panic!("Expected weighted_avg, got {:?}", other),
        }
    }

    #[test]
    fn test_result_constructors() {
        let ok = CalculationResult::ok(42.0).with_unit("%");
        assert!(ok.success);
        assert_eq!(ok.value, Some(42.0));
        assert_eq!(ok.unit.as_deref(), Some("%"));
        assert!(ok.error.is_none());

        let fail = CalculationResult::fail("no active formula");
        assert!(!fail.success);
        assert!(fail.value.is_none());
        assert_eq!(fail.error.as_deref(), Some("no active formula"));
        assert_eq!(fail.value_or_zero(), 0.0);
    }

    #[test]
    fn test_status_serialization() {
        assert_eq!(
            serde_json::to_string(&CalculationStatus::Success).unwrap(),
            "\"success\""
        );
        assert_eq!(CalculationStatus::Failed.as_str(), "failed");
    }
}
