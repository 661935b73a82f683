//! Named data accessors for custom expressions
//!
//! A custom formula references data through `{name}` placeholders, e.g.
//! `{carbon.total} / {employees.total}`. Each name maps to a fixed
//! aggregate over one registered source; formulas can never name raw
//! tables or columns directly.

use esg_model::{Filter, Period};
use esg_store::{DataSourceAdapter, Result};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateKind {
    Count,
    Sum,
    Avg,
}

/// One placeholder-addressable aggregate
#[derive(Debug, Clone, Copy)]
pub struct AccessorSpec {
    pub kind: AggregateKind,
    pub source: &'static str,
    /// Aggregated field, unused for counts
    pub field: &'static str,
    pub filter: &'static [(&'static str, &'static str)],
}

impl AccessorSpec {
    /// Run the aggregate against the adapter for one period
    pub async fn fetch(&self, adapter: &(impl DataSourceAdapter + ?Sized), period: &Period) -> Result<f64> {
        let filter: Filter = self
            .filter
            .iter()
            .map(|(k, v)| ((*k).to_string(), serde_json::Value::String((*v).to_string())))
            .collect();

        match self.kind {
            AggregateKind::Count => adapter.count(self.source, &filter, period).await,
            AggregateKind::Sum => adapter.sum(self.source, self.field, &filter, period).await,
            AggregateKind::Avg => adapter.avg(self.source, self.field, &filter, period).await,
        }
    }
}

macro_rules! count {
    ($map:expr, $name:literal, $source:literal, $filter:expr) => {
        $map.insert($name, AccessorSpec {
            kind: AggregateKind::Count,
            source: $source,
            field: "",
            filter: $filter,
        });
    };
}

macro_rules! sum {
    ($map:expr, $name:literal, $source:literal, $field:literal, $filter:expr) => {
        $map.insert($name, AccessorSpec {
            kind: AggregateKind::Sum,
            source: $source,
            field: $field,
            filter: $filter,
        });
    };
}

/// The builtin placeholder table
pub fn builtin_accessors() -> HashMap<&'static str, AccessorSpec> {
    let mut m: HashMap<&'static str, AccessorSpec> = HashMap::new();

    count!(m, "employees.total", "employees", &[]);
    count!(m, "employees.female", "employees", &[("gender", "female")]);
    count!(m, "employees.male", "employees", &[("gender", "male")]);
    count!(m, "employees.resigned", "resignations", &[]);
    count!(m, "employees.newHires", "new_hires", &[]);

    sum!(m, "carbon.total", "carbon_emissions", "co2_tonnes", &[]);
    sum!(m, "carbon.scope1", "carbon_emissions", "co2_tonnes", &[("scope", "scope1")]);
    sum!(m, "carbon.scope2", "carbon_emissions", "co2_tonnes", &[("scope", "scope2")]);
    sum!(m, "carbon.scope3", "carbon_emissions", "co2_tonnes", &[("scope", "scope3")]);

    sum!(m, "energy.total", "energy_usage", "kwh", &[]);
    sum!(m, "energy.renewable", "energy_usage", "kwh", &[("energy_type", "renewable")]);

    count!(m, "safety.incidents", "safety_incidents", &[]);
    sum!(m, "safety.lostDays", "safety_incidents", "lost_days", &[]);

    sum!(m, "training.hours", "trainings", "hours", &[]);
    sum!(m, "training.participants", "trainings", "participants", &[]);

    count!(m, "suppliers.total", "suppliers", &[]);
    count!(m, "suppliers.audited", "suppliers", &[("esg_assessed", "yes")]);

    count!(m, "board.total", "board_members", &[]);
    count!(m, "board.female", "board_members", &[("gender", "female")]);

    sum!(m, "water.total", "water_usage", "cubic_meters", &[]);
    sum!(m, "waste.total", "waste_records", "tonnes", &[]);
    sum!(m, "donations.total", "donations", "amount", &[]);

    m
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use esg_store::SourceRegistry;

    #[test]
    fn test_accessors_resolve_against_registry() {
        let registry = SourceRegistry::builtin();
        for (name, spec) in builtin_accessors() {
            let def = registry.get(spec.source).unwrap_or_else(|_| panic!("{}", name));
            if spec.kind != AggregateKind::Count {
                assert!(def.column(spec.field).is_some(), "{} field {}", name, spec.field);
            }
            for (filter_field, _) in spec.filter {
                assert!(def.column(filter_field).is_some(), "{} filter {}", name, filter_field);
            }
        }
    }

    #[tokio::test]
    async fn test_fetch_applies_filter() {
        use esg_store::MemoryStore;
        use serde_json::json;

        let store = MemoryStore::new();
        store
            .insert_row("employees", "2024", &[("gender", json!("female"))])
            .await;
        store
            .insert_row("employees", "2024", &[("gender", json!("male"))])
            .await;

        let accessors = builtin_accessors();
        let period = Period::parse("2024").unwrap();
        let female = accessors["employees.female"].fetch(&store, &period).await.unwrap();
        assert_eq!(female, 1.0);
    }
}
