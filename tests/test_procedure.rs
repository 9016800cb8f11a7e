//! Tests for merge procedure generation
//!
//! Tests verify that generated procedures:
//! - match the expected text exactly for a simple table
//! - differ between the incremental and target variants only in the main table
//! - never update unit-key columns
//! - join on every unit key, in declaration order

use stagemerge::{build_procedure, MergeConfig, MergeTarget, ProcedureWriter, RawConfig};

const SYNC_ORDERS_INC: &str = r#"CREATE OR REPLACE PROCEDURE dw.sync_orders()
LANGUAGE plpgsql
AS $procedure$
BEGIN

    -- Step 1: Insert records with NULL source_timestamp_ms into the main table
    INSERT INTO dw.inc_orders (
        id, status, amount
    )
    SELECT
        id, status, amount
    FROM dw.stg_orders
    WHERE source_timestamp_ms IS NULL;

    -- Step 2: Archive NULL-source_timestamp_ms records
    INSERT INTO dw.archived_orders (
        id, status, amount, dw_created_timestamp_ms
    )
    SELECT
        id, status, amount, dw_created_timestamp_ms
    FROM dw.stg_orders
    WHERE source_timestamp_ms IS NULL;

    -- Step 3: Delete NULL-source_timestamp_ms records from staging
    DELETE FROM dw.stg_orders
    WHERE source_timestamp_ms IS NULL;

    -- Step 4: Merge latest records by id based on operation type
    WITH latest_ops AS (
        SELECT
            id, status, amount, rn
        FROM (
            SELECT
            id, status, amount, ROW_NUMBER() OVER (PARTITION BY id ORDER BY source_timestamp_ms DESC) AS rn
            FROM dw.stg_orders
            WHERE op IN ('+I', '+U', '-D')
        ) sub
        WHERE rn = 1
    )
    MERGE INTO dw.inc_orders AS tgt
    USING latest_ops AS src
    ON tgt.id = src.id
    WHEN MATCHED AND src.op IN ('+I', '+U') THEN
        UPDATE SET
            status = src.status,
            amount = src.amount,
            dw_last_modified_timestamp_ms = CURRENT_TIMESTAMP(3) AT TIME ZONE 'UTC'
    WHEN MATCHED AND src.op = '-D' THEN
        DELETE
    WHEN NOT MATCHED AND src.op IN ('+I', '+U') THEN
        INSERT (
            id, status, amount
        )
        VALUES (
            src.id, src.status, src.amount
        );

    -- Step 5: Archive all remaining staging records
    INSERT INTO dw.archived_orders (
        id, status, amount, dw_created_timestamp_ms
    )
    SELECT
        id, status, amount, dw_created_timestamp_ms
    FROM dw.stg_orders;

    -- Step 6: Truncate staging table
    DELETE FROM dw.stg_orders;

EXCEPTION
    WHEN OTHERS THEN
        RAISE EXCEPTION 'Error in sync_orders: %', SQLERRM;

END;
$procedure$
;"#;

fn config_with(extra: &[(&str, &str)], columns: &str, unit_keys: &str) -> MergeConfig {
    let mut pairs = vec![
        ("fileName", "sync_orders"),
        ("schemaName", "dw"),
        ("tableName", "orders"),
        ("columns", columns),
        ("unitKeys", unit_keys),
    ];
    pairs.extend_from_slice(extra);
    MergeConfig::from_raw(&RawConfig::from_pairs(pairs)).unwrap()
}

fn orders_config() -> MergeConfig {
    config_with(&[], "id,status,amount", "id")
}

/// Lines of the UPDATE SET clause, trimmed.
fn update_set_lines(sql: &str) -> Vec<String> {
    let start = sql.find("UPDATE SET\n").expect("Should find UPDATE SET") + "UPDATE SET\n".len();
    let end = sql[start..]
        .find("    WHEN MATCHED AND src.op = '-D'")
        .expect("Should find delete branch");
    sql[start..start + end]
        .lines()
        .map(|line| line.trim().trim_end_matches(',').to_string())
        .collect()
}

fn on_clause(sql: &str) -> &str {
    sql.lines()
        .find(|line| line.trim_start().starts_with("ON "))
        .expect("Should find ON clause")
        .trim()
}

#[test]
fn test_incremental_procedure_text() {
    let sql = build_procedure(&orders_config(), MergeTarget::Incremental);
    assert_eq!(sql, SYNC_ORDERS_INC);
}

#[test]
fn test_target_procedure_uses_plain_table_name() {
    let sql = build_procedure(&orders_config(), MergeTarget::Target);
    assert!(sql.contains("    INSERT INTO dw.orders (\n"));
    assert!(sql.contains("    MERGE INTO dw.orders AS tgt\n"));
    assert!(!sql.contains("inc_orders"));
}

#[test]
fn test_generation_is_deterministic() {
    let config = config_with(&[], "region, id, status, amount, op", "region, id");
    for target in MergeTarget::ALL {
        assert_eq!(build_procedure(&config, target), build_procedure(&config, target));
    }
}

#[test]
fn test_variants_differ_only_in_main_table() {
    let config = config_with(&[], "id,status,amount,op", "id");
    let inc = build_procedure(&config, MergeTarget::Incremental);
    let target = build_procedure(&config, MergeTarget::Target);

    assert_ne!(inc, target);
    // Step 1 INSERT and step 4 MERGE
    assert_eq!(inc.matches("dw.inc_orders").count(), 2);
    assert_eq!(inc.replace("dw.inc_orders", "dw.orders"), target);
}

#[test]
fn test_update_set_excludes_unit_keys() {
    let config = config_with(&[], "Region, ID, status, amount, op", "region,id");
    let sql = build_procedure(&config, MergeTarget::Target);
    let lines = update_set_lines(&sql);

    assert_eq!(
        lines,
        vec![
            "status = src.status",
            "amount = src.amount",
            "op = src.op",
            "dw_last_modified_timestamp_ms = CURRENT_TIMESTAMP(3) AT TIME ZONE 'UTC'",
        ]
    );
    for key in ["Region", "ID"] {
        assert!(
            !lines.iter().any(|line| line.starts_with(&format!("{} =", key))),
            "unit key {} must not be updated",
            key
        );
    }
}

#[test]
fn test_join_predicate_has_one_conjunct_per_unit_key() {
    let config = config_with(&[], "tenant,region,id,status", "tenant, region ,id");
    let sql = build_procedure(&config, MergeTarget::Incremental);
    let on = on_clause(&sql);

    assert_eq!(
        on,
        "ON tgt.tenant = src.tenant AND tgt.region = src.region AND tgt.id = src.id"
    );
    assert_eq!(on.trim_start_matches("ON ").split(" AND ").count(), 3);
}

#[test]
fn test_timestamp_column_overrides() {
    let config = config_with(
        &[
            ("source_timestamps", " event_ts "),
            ("created_timestamps", "created_at"),
            ("last_modified_timestamps", "updated_at"),
        ],
        "id,status",
        "id",
    );
    let sql = build_procedure(&config, MergeTarget::Target);

    assert!(sql.contains("WHERE event_ts IS NULL;"));
    assert!(sql.contains("ORDER BY event_ts DESC"));
    assert!(sql.contains("id, status, created_at\n"));
    assert!(sql.contains("updated_at = CURRENT_TIMESTAMP(3) AT TIME ZONE 'UTC'"));
    assert!(sql.contains("    -- Step 1: Insert records with NULL event_ts into the main table\n"));
    assert!(sql.contains("    -- Step 2: Archive NULL-event_ts records\n"));
    assert!(sql.contains("    -- Step 3: Delete NULL-event_ts records from staging\n"));
    assert!(!sql.contains("source_timestamp_ms"));
    assert!(!sql.contains("dw_created_timestamp_ms"));
    assert!(!sql.contains("dw_last_modified_timestamp_ms"));
}

#[test]
fn test_values_follow_declared_column_order() {
    let config = config_with(&[], "status, id, amount", "id");
    let writer = ProcedureWriter::new(&config);
    let sql = writer.generate(MergeTarget::Incremental);

    assert!(sql.contains("        INSERT (\n            status, id, amount\n        )\n"));
    assert!(sql.contains("        VALUES (\n            src.status, src.id, src.amount\n        );\n"));
}

#[test]
fn test_exception_handler_names_procedure() {
    let config = config_with(&[], "id", "id");
    let sql = build_procedure(&config, MergeTarget::Incremental);

    assert!(sql.contains(
        "EXCEPTION\n    WHEN OTHERS THEN\n        RAISE EXCEPTION 'Error in sync_orders: %', SQLERRM;\n"
    ));
    assert!(sql.ends_with("END;\n$procedure$\n;"));
}

#[test]
fn test_steps_appear_in_order() {
    let sql = build_procedure(&orders_config(), MergeTarget::Incremental);
    let positions: Vec<usize> = (1..=6)
        .map(|step| {
            sql.find(&format!("-- Step {}:", step))
                .unwrap_or_else(|| panic!("Should find step {}", step))
        })
        .collect();

    assert!(positions.windows(2).all(|w| w[0] < w[1]));
}
