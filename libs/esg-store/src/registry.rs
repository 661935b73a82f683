//! Logical data-source registry
//!
//! Owns the mapping from logical source names (as used in formulas,
//! e.g. `carbon_emissions`) to physical tables, and from logical field
//! names to columns. Every identifier that reaches SQL text is resolved
//! through this registry; caller-supplied names never are.

use crate::error::{Result, StoreError};
use std::collections::HashMap;

/// Definition of one raw data source
#[derive(Debug, Clone, Copy)]
pub struct SourceDef {
    /// Physical table name
    pub table: &'static str,
    /// Period column, if the source is period-scoped
    pub period_column: Option<&'static str>,
    /// Logical field name -> physical column
    pub fields: &'static [(&'static str, &'static str)],
}

impl SourceDef {
    /// Resolve a logical field to its column
    pub fn column(&self, field: &str) -> Option<&'static str> {
        self.fields
            .iter()
            .find(|(logical, _)| *logical == field)
            .map(|(_, column)| *column)
    }
}

/// Registry of all known data sources
#[derive(Debug, Clone)]
pub struct SourceRegistry {
    sources: HashMap<&'static str, SourceDef>,
}

macro_rules! source {
    ($map:expr, $name:literal, $table:literal, $fields:expr) => {
        $map.insert(
            $name,
            SourceDef {
                table: $table,
                period_column: Some("period"),
                fields: $fields,
            },
        );
    };
}

impl SourceRegistry {
    /// The builtin registry of raw ESG operational tables
    ///
    /// All sources are period-scoped; the period column is part of the
    /// collaborator-owned schema contract.
    pub fn builtin() -> Self {
        let mut m: HashMap<&'static str, SourceDef> = HashMap::new();

        source!(m, "employees", "employees", &[
            ("gender", "gender"),
            ("employment_type", "employment_type"),
            ("age_band", "age_band"),
            ("salary", "salary"),
            ("tenure_years", "tenure_years"),
        ]);
        source!(m, "new_hires", "new_hires", &[
            ("gender", "gender"),
            ("age_band", "age_band"),
        ]);
        source!(m, "resignations", "resignations", &[
            ("gender", "gender"),
            ("voluntary", "voluntary"),
        ]);
        source!(m, "trainings", "trainings", &[
            ("category", "category"),
            ("hours", "hours"),
            ("participants", "participants"),
            ("cost", "cost"),
        ]);
        source!(m, "safety_incidents", "safety_incidents", &[
            ("severity", "severity"),
            ("lost_days", "lost_days"),
            ("injured_count", "injured_count"),
        ]);
        source!(m, "carbon_emissions", "carbon_emissions", &[
            ("scope", "scope"),
            ("source_category", "source_category"),
            ("co2_tonnes", "co2_tonnes"),
        ]);
        source!(m, "energy_usage", "energy_usage", &[
            ("energy_type", "energy_type"),
            ("kwh", "kwh"),
            ("cost", "cost"),
        ]);
        source!(m, "water_usage", "water_usage", &[
            ("cubic_meters", "cubic_meters"),
            ("recycled_cubic_meters", "recycled_cubic_meters"),
        ]);
        source!(m, "waste_records", "waste_records", &[
            ("waste_type", "waste_type"),
            ("tonnes", "tonnes"),
            ("recycled_tonnes", "recycled_tonnes"),
        ]);
        source!(m, "suppliers", "suppliers", &[
            ("region", "region"),
            ("esg_assessed", "esg_assessed"),
            ("local", "local"),
        ]);
        source!(m, "supplier_audits", "supplier_audits", &[
            ("result", "result"),
            ("findings", "findings"),
        ]);
        source!(m, "donations", "donations", &[
            ("category", "category"),
            ("amount", "amount"),
        ]);
        source!(m, "volunteer_activities", "volunteer_activities", &[
            ("hours", "hours"),
            ("participants", "participants"),
        ]);
        source!(m, "board_members", "board_members", &[
            ("gender", "gender"),
            ("independent", "independent"),
            ("attendance_rate", "attendance_rate"),
        ]);
        source!(m, "executives", "executives", &[
            ("gender", "gender"),
            ("compensation", "compensation"),
        ]);
        source!(m, "shareholder_meetings", "shareholder_meetings", &[
            ("attendance_rate", "attendance_rate"),
            ("resolutions", "resolutions"),
        ]);
        source!(m, "ethics_reports", "ethics_reports", &[
            ("category", "category"),
            ("resolved", "resolved"),
        ]);
        source!(m, "data_breaches", "data_breaches", &[
            ("severity", "severity"),
            ("affected_records", "affected_records"),
        ]);
        source!(m, "patents", "patents", &[("category", "category")]);
        source!(m, "rnd_projects", "rnd_projects", &[
            ("budget", "budget"),
            ("green", "green"),
        ]);
        source!(m, "customer_satisfaction", "customer_satisfaction", &[
            ("score", "score"),
            ("responses", "responses"),
        ]);
        source!(m, "product_recalls", "product_recalls", &[("units", "units")]);
        source!(m, "compliance_violations", "compliance_violations", &[
            ("category", "category"),
            ("fine_amount", "fine_amount"),
        ]);
        source!(m, "parental_leaves", "parental_leaves", &[
            ("gender", "gender"),
            ("days", "days"),
            ("returned", "returned"),
        ]);

        Self { sources: m }
    }

    /// Look up a source definition by logical name
    pub fn get(&self, name: &str) -> Result<&SourceDef> {
        self.sources
            .get(name)
            .ok_or_else(|| StoreError::UnknownSource(name.to_string()))
    }

    /// Resolve a logical field to its physical column
    pub fn resolve_field(&self, source: &str, field: &str) -> Result<&'static str> {
        self.get(source)?
            .column(field)
            .ok_or_else(|| StoreError::unknown_field(source, field))
    }

    /// All registered logical source names, sorted
    pub fn source_names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.sources.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    #[test]
    fn test_builtin_covers_raw_tables() {
        let registry = SourceRegistry::builtin();
        assert!(registry.source_names().len() >= 24);
        assert!(registry.get("employees").is_ok());
        assert!(registry.get("carbon_emissions").is_ok());
    }

    #[test]
    fn test_unknown_source() {
        let registry = SourceRegistry::builtin();
        let err = registry.get("no_such_table").unwrap_err();
        assert!(err.to_string().contains("no_such_table"));
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_resolve_field() {
        let registry = SourceRegistry::builtin();
        assert_eq!(
            registry.resolve_field("carbon_emissions", "co2_tonnes").unwrap(),
            "co2_tonnes"
        );
        assert!(registry.resolve_field("carbon_emissions", "nope").is_err());
    }

    #[test]
    fn test_period_scoping_flag() {
        let registry = SourceRegistry::builtin();
        assert_eq!(registry.get("employees").unwrap().period_column, Some("period"));
    }
}
