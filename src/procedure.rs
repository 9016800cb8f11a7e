//! Merge procedure text generation.
//!
//! Builds a PostgreSQL `plpgsql` procedure that moves change rows from the
//! staging table into the main table in six fixed steps:
//!
//! 1. copy rows without a source timestamp into the main table
//! 2. archive those rows
//! 3. delete those rows from staging
//! 4. `MERGE` the latest `+I`/`+U`/`-D` row per `id` into the main table
//! 5. archive every remaining staging row
//! 6. empty the staging table
//!
//! The main table is either the incremental table (`inc_<table>`) or the
//! target table itself, selected with [`MergeTarget`].

use crate::config::MergeConfig;

const SRC_ALIAS: &str = "src";
const TGT_ALIAS: &str = "tgt";

/// Separator between UPDATE SET assignments (one per line, three levels deep)
const SET_SEPARATOR: &str = ",\n            ";

/// Which table the procedure merges into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MergeTarget {
    /// `schema.inc_<table>`
    Incremental,
    /// `schema.<table>`
    Target,
}

impl MergeTarget {
    /// Both variants, in generation order.
    pub const ALL: [MergeTarget; 2] = [MergeTarget::Incremental, MergeTarget::Target];

    /// Map an "is target table" flag onto a variant.
    pub fn from_flag(is_target_table: bool) -> Self {
        if is_target_table {
            MergeTarget::Target
        } else {
            MergeTarget::Incremental
        }
    }

    pub fn is_target_table(self) -> bool {
        self == MergeTarget::Target
    }

    /// Name of the directory the generated script is written to.
    pub fn output_dir_name(self) -> &'static str {
        match self {
            MergeTarget::Incremental => "merge_into_inc_tables",
            MergeTarget::Target => "merge_into_target_tables",
        }
    }

    fn table_prefix(self) -> &'static str {
        match self {
            MergeTarget::Incremental => "inc_",
            MergeTarget::Target => "",
        }
    }
}

/// Generate the procedure text for `config` merging into `target`.
///
/// The output depends only on the arguments, so repeated calls return
/// identical text.
///
/// # Example
///
/// ```
/// use stagemerge::{build_procedure, MergeConfig, MergeTarget, RawConfig};
///
/// let config = MergeConfig::from_raw(&RawConfig::from_pairs([
///     ("fileName", "sync_orders"),
///     ("schemaName", "dw"),
///     ("tableName", "orders"),
///     ("columns", "id,status,amount"),
///     ("unitKeys", "id"),
/// ]))
/// .unwrap();
///
/// let sql = build_procedure(&config, MergeTarget::Incremental);
/// assert!(sql.starts_with("CREATE OR REPLACE PROCEDURE dw.sync_orders()"));
/// assert!(sql.contains("INSERT INTO dw.inc_orders ("));
/// assert!(sql.contains("    ON tgt.id = src.id\n"));
/// ```
pub fn build_procedure(config: &MergeConfig, target: MergeTarget) -> String {
    ProcedureWriter::new(config).generate(target)
}

/// Writes merge procedures for one configuration.
pub struct ProcedureWriter<'a> {
    config: &'a MergeConfig,
}

impl<'a> ProcedureWriter<'a> {
    pub fn new(config: &'a MergeConfig) -> Self {
        Self { config }
    }

    /// `schema.fileName`
    pub fn procedure_name(&self) -> String {
        format!("{}.{}", self.config.schema_name, self.config.file_name)
    }

    /// Table written by steps 1 and 4.
    pub fn main_table(&self, target: MergeTarget) -> String {
        format!(
            "{}.{}{}",
            self.config.schema_name,
            target.table_prefix(),
            self.config.table_name
        )
    }

    pub fn staging_table(&self) -> String {
        format!("{}.stg_{}", self.config.schema_name, self.config.table_name)
    }

    pub fn archive_table(&self) -> String {
        format!("{}.archived_{}", self.config.schema_name, self.config.table_name)
    }

    /// Declared columns joined with `, `.
    pub fn column_list(&self) -> String {
        self.config.columns.join(", ")
    }

    /// Declared columns qualified with the source alias.
    pub fn source_column_list(&self) -> String {
        self.config
            .columns
            .iter()
            .map(|c| format!("{}.{}", SRC_ALIAS, c))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// MERGE join predicate: one equality per unit key, in declaration order.
    pub fn unit_key_condition(&self) -> String {
        let predicates = self
            .config
            .unit_keys
            .iter()
            .map(|key| format!("{}.{} = {}.{}", TGT_ALIAS, key, SRC_ALIAS, key))
            .collect::<Vec<_>>()
            .join(" AND ");
        format!("ON {}", predicates)
    }

    /// UPDATE SET assignments for every non-key column, followed by the
    /// modified timestamp.
    pub fn update_set(&self) -> String {
        let mut assignments: Vec<String> = self
            .config
            .columns
            .iter()
            .filter(|c| !self.config.is_unit_key(c))
            .map(|c| format!("{} = {}.{}", c, SRC_ALIAS, c))
            .collect();
        assignments.push(format!(
            "{} = CURRENT_TIMESTAMP(3) AT TIME ZONE 'UTC'",
            self.config.modified_timestamp_column
        ));
        assignments.join(SET_SEPARATOR)
    }

    /// Generate the full procedure definition.
    pub fn generate(&self, target: MergeTarget) -> String {
        let config = self.config;
        let main = self.main_table(target);
        let staging = self.staging_table();
        let archive = self.archive_table();
        let columns = self.column_list();
        let source_ts = &config.source_timestamp_column;
        let created_ts = &config.created_timestamp_column;

        let mut sql = String::new();

        sql.push_str(&format!(
            "CREATE OR REPLACE PROCEDURE {}()\n\
             LANGUAGE plpgsql\n\
             AS $procedure$\n\
             BEGIN\n\n",
            self.procedure_name()
        ));

        // Step 1
        sql.push_str(&format!(
            "    -- Step 1: Insert records with NULL {source_ts} into the main table\n\
             \x20   INSERT INTO {main} (\n\
             \x20       {columns}\n\
             \x20   )\n\
             \x20   SELECT\n\
             \x20       {columns}\n\
             \x20   FROM {staging}\n\
             \x20   WHERE {source_ts} IS NULL;\n\n"
        ));

        // Step 2
        sql.push_str(&format!(
            "    -- Step 2: Archive NULL-{source_ts} records\n\
             \x20   INSERT INTO {archive} (\n\
             \x20       {columns}, {created_ts}\n\
             \x20   )\n\
             \x20   SELECT\n\
             \x20       {columns}, {created_ts}\n\
             \x20   FROM {staging}\n\
             \x20   WHERE {source_ts} IS NULL;\n\n"
        ));

        // Step 3
        sql.push_str(&format!(
            "    -- Step 3: Delete NULL-{source_ts} records from staging\n\
             \x20   DELETE FROM {staging}\n\
             \x20   WHERE {source_ts} IS NULL;\n\n"
        ));

        // Step 4
        sql.push_str(&format!(
            "    -- Step 4: Merge latest records by id based on operation type\n\
             \x20   WITH latest_ops AS (\n\
             \x20       SELECT\n\
             \x20           {columns}, rn\n\
             \x20       FROM (\n\
             \x20           SELECT\n\
             \x20           {columns}, ROW_NUMBER() OVER (PARTITION BY id ORDER BY {source_ts} DESC) AS rn\n\
             \x20           FROM {staging}\n\
             \x20           WHERE op IN ('+I', '+U', '-D')\n\
             \x20       ) sub\n\
             \x20       WHERE rn = 1\n\
             \x20   )\n\
             \x20   MERGE INTO {main} AS {tgt}\n\
             \x20   USING latest_ops AS {src}\n\
             \x20   {on}\n\
             \x20   WHEN MATCHED AND {src}.op IN ('+I', '+U') THEN\n\
             \x20       UPDATE SET\n\
             \x20           {update_set}\n\
             \x20   WHEN MATCHED AND {src}.op = '-D' THEN\n\
             \x20       DELETE\n\
             \x20   WHEN NOT MATCHED AND {src}.op IN ('+I', '+U') THEN\n\
             \x20       INSERT (\n\
             \x20           {columns}\n\
             \x20       )\n\
             \x20       VALUES (\n\
             \x20           {source_columns}\n\
             \x20       );\n\n",
            tgt = TGT_ALIAS,
            src = SRC_ALIAS,
            on = self.unit_key_condition(),
            update_set = self.update_set(),
            source_columns = self.source_column_list(),
        ));

        // Step 5
        sql.push_str(&format!(
            "    -- Step 5: Archive all remaining staging records\n\
             \x20   INSERT INTO {archive} (\n\
             \x20       {columns}, {created_ts}\n\
             \x20   )\n\
             \x20   SELECT\n\
             \x20       {columns}, {created_ts}\n\
             \x20   FROM {staging};\n\n"
        ));

        // Step 6
        sql.push_str(&format!(
            "    -- Step 6: Truncate staging table\n\
             \x20   DELETE FROM {staging};\n\n"
        ));

        sql.push_str(&format!(
            "EXCEPTION\n\
             \x20   WHEN OTHERS THEN\n\
             \x20       RAISE EXCEPTION 'Error in {}: %', SQLERRM;\n\n\
             END;\n\
             $procedure$\n\
             ;",
            config.file_name
        ));

        sql
    }
}
