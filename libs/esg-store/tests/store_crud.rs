//! Integration tests for the SQLite store
//!
//! Exercises formula CRUD, aggregate queries and the calculation log
//! using in-memory SQLite.

#![allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable

use chrono::Utc;
use esg_model::{CalculationLog, CalculationStatus, FormulaConfig, MetricFormula, Period};
use esg_store::{
    apply_schema, repository, DataSourceAdapter, FormulaCatalog, LogSink, SqliteStore,
};
use serde_json::json;
use sqlx::SqlitePool;
use std::collections::BTreeMap;

/// Create an in-memory SQLite pool with engine tables and a couple of
/// raw operational tables
async fn setup_test_db() -> SqlitePool {
    let pool = SqlitePool::connect("sqlite::memory:")
        .await
        .expect("Failed to create in-memory database");

    apply_schema(&pool).await.expect("Failed to apply schema");

    // Raw tables normally owned by the data-import collaborator
    sqlx::query(
        r#"
        CREATE TABLE employees (
            id INTEGER PRIMARY KEY,
            period TEXT NOT NULL,
            gender TEXT,
            employment_type TEXT,
            age_band TEXT,
            salary REAL,
            tenure_years REAL
        )
        "#,
    )
    .execute(&pool)
    .await
    .expect("Failed to create employees table");

    sqlx::query(
        r#"
        CREATE TABLE carbon_emissions (
            id INTEGER PRIMARY KEY,
            period TEXT NOT NULL,
            scope TEXT,
            source_category TEXT,
            co2_tonnes REAL
        )
        "#,
    )
    .execute(&pool)
    .await
    .expect("Failed to create carbon_emissions table");

    pool
}

async fn seed_employees(pool: &SqlitePool, rows: &[(&str, &str, f64)]) {
    for (period, gender, salary) in rows {
        sqlx::query("INSERT INTO employees (period, gender, salary) VALUES (?, ?, ?)")
            .bind(period)
            .bind(gender)
            .bind(salary)
            .execute(pool)
            .await
            .expect("Failed to seed employees");
    }
}

fn sample_formula(code: &str) -> MetricFormula {
    MetricFormula {
        metric_code: code.to_string(),
        name: Some("Total employees".to_string()),
        unit: Some("people".to_string()),
        config: FormulaConfig::Count {
            data_source: "employees".to_string(),
            filter: BTreeMap::new(),
        },
        active: true,
    }
}

#[tokio::test]
async fn test_count_scoped_by_period_and_filter() {
    let pool = setup_test_db().await;
    seed_employees(&pool, &[
        ("2024", "female", 100.0),
        ("2024", "male", 120.0),
        ("2024", "female", 90.0),
        ("2023", "female", 80.0),
    ])
    .await;

    let store = SqliteStore::new(pool);
    let period = Period::parse("2024").unwrap();

    let all = store.count("employees", &BTreeMap::new(), &period).await.unwrap();
    assert_eq!(all, 3.0);

    let mut filter = BTreeMap::new();
    filter.insert("gender".to_string(), json!("female"));
    let female = store.count("employees", &filter, &period).await.unwrap();
    assert_eq!(female, 2.0);
}

#[tokio::test]
async fn test_sum_and_avg_empty_is_zero() {
    let pool = setup_test_db().await;
    let store = SqliteStore::new(pool);
    let period = Period::parse("2024").unwrap();
    let empty = BTreeMap::new();

    let sum = store
        .sum("carbon_emissions", "co2_tonnes", &empty, &period)
        .await
        .unwrap();
    assert_eq!(sum, 0.0);

    let avg = store
        .avg("carbon_emissions", "co2_tonnes", &empty, &period)
        .await
        .unwrap();
    assert_eq!(avg, 0.0);
}

#[tokio::test]
async fn test_sum_with_scope_filter() {
    let pool = setup_test_db().await;
    for (period, scope, tonnes) in [
        ("2024", "scope1", 10.5),
        ("2024", "scope1", 4.5),
        ("2024", "scope2", 7.0),
        ("2023", "scope1", 99.0),
    ] {
        sqlx::query("INSERT INTO carbon_emissions (period, scope, co2_tonnes) VALUES (?, ?, ?)")
            .bind(period)
            .bind(scope)
            .bind(tonnes)
            .execute(&pool)
            .await
            .unwrap();
    }

    let store = SqliteStore::new(pool);
    let period = Period::parse("2024").unwrap();
    let mut filter = BTreeMap::new();
    filter.insert("scope".to_string(), json!("scope1"));

    let sum = store
        .sum("carbon_emissions", "co2_tonnes", &filter, &period)
        .await
        .unwrap();
    assert_eq!(sum, 15.0);
}

#[tokio::test]
async fn test_unknown_source_and_field() {
    let pool = setup_test_db().await;
    let store = SqliteStore::new(pool);
    let period = Period::parse("2024").unwrap();
    let empty = BTreeMap::new();

    let err = store.count("no_such_source", &empty, &period).await.unwrap_err();
    assert!(!err.is_fatal());

    let err = store
        .sum("employees", "no_such_field", &empty, &period)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("no_such_field"));

    // Filter keys are validated the same way as fields
    let mut filter = BTreeMap::new();
    filter.insert("not_a_column".to_string(), json!("x"));
    assert!(store.count("employees", &filter, &period).await.is_err());
}

#[tokio::test]
async fn test_formula_upsert_and_lookup() {
    let pool = setup_test_db().await;
    let formula = sample_formula("E-001");
    repository::upsert_formula(&pool, &formula).await.unwrap();

    let store = SqliteStore::new(pool.clone());
    let loaded = store.active_formula("E-001").await.unwrap().expect("formula missing");
    assert_eq!(loaded.metric_code, "E-001");
    assert_eq!(loaded.unit.as_deref(), Some("people"));
    assert!(matches!(loaded.config, FormulaConfig::Count { .. }));

    // Upsert replaces in place
    let mut updated = sample_formula("E-001");
    updated.name = Some("Headcount".to_string());
    repository::upsert_formula(&pool, &updated).await.unwrap();

    let formulas = repository::list_formulas(&pool).await.unwrap();
    assert_eq!(formulas.len(), 1);
    assert_eq!(formulas[0].name.as_deref(), Some("Headcount"));
}

#[tokio::test]
async fn test_deactivated_formula_hidden_from_engine() {
    let pool = setup_test_db().await;
    repository::upsert_formula(&pool, &sample_formula("E-001")).await.unwrap();
    repository::upsert_formula(&pool, &sample_formula("E-002")).await.unwrap();

    let changed = repository::set_formula_active(&pool, "E-001", false).await.unwrap();
    assert!(changed);
    assert!(!repository::set_formula_active(&pool, "nope", false).await.unwrap());

    let store = SqliteStore::new(pool.clone());
    assert!(store.active_formula("E-001").await.unwrap().is_none());

    let active = store.list_active().await.unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].metric_code, "E-002");

    // Still visible to the admin listing
    assert_eq!(repository::list_formulas(&pool).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_log_append_and_readback() {
    let pool = setup_test_db().await;
    let store = SqliteStore::new(pool.clone());
    let period = Period::parse("2024-Q1").unwrap();

    let ok_entry = CalculationLog {
        metric_code: "E-001".to_string(),
        period: period.clone(),
        input_details: Some(json!({"kind": "count", "value": 42.0})),
        calculated_value: Some(42.0),
        status: CalculationStatus::Success,
        error_message: None,
        execution_time_ms: 3,
        created_at: Utc::now(),
    };
    let failed_entry = CalculationLog {
        metric_code: "E-002".to_string(),
        period: period.clone(),
        input_details: None,
        calculated_value: None,
        status: CalculationStatus::Failed,
        error_message: Some("unknown data source: nope".to_string()),
        execution_time_ms: 1,
        created_at: Utc::now(),
    };
    store.append(&ok_entry).await.unwrap();
    store.append(&failed_entry).await.unwrap();

    let recent = repository::recent_logs(&pool, 10).await.unwrap();
    assert_eq!(recent.len(), 2);
    // Newest first
    assert_eq!(recent[0].metric_code, "E-002");
    assert_eq!(recent[0].status, CalculationStatus::Failed);
    assert_eq!(recent[1].calculated_value, Some(42.0));
    assert_eq!(recent[1].period.as_str(), "2024-Q1");
    assert_eq!(
        recent[1].input_details.as_ref().and_then(|d| d["value"].as_f64()),
        Some(42.0)
    );

    let for_metric = repository::logs_for_metric(&pool, "E-001", "2024-Q1").await.unwrap();
    assert_eq!(for_metric.len(), 1);
    assert_eq!(for_metric[0].error_message, None);
}
