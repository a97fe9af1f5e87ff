//! Applies a planned action list against the live database. Additive
//! actions are naturally idempotent; the table rebuild follows the
//! shadow-swap protocol with a backup table as both rollback source and
//! durable crash marker.

use std::collections::BTreeMap;

use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection};
use serde::Serialize;

use crate::error::StoreError;
use crate::helpers::{ensure_list, EPOCH_RFC3339};
use crate::inspect;
use crate::junction::{migrate_junction, JunctionSpec};
use crate::plan::MigrationAction;
use crate::schema::{self, backup_name};
use crate::synthesize::synthesize_parents;

/// Per-boot outcome of one execution pass, surfaced through the boot report.
#[derive(Debug, Default, Clone, Serialize)]
pub struct ExecutionReport {
    pub applied: Vec<String>,
    pub skipped: Vec<String>,
    /// Tables that lost their data to the last-resort empty-table fallback.
    pub degraded_tables: Vec<String>,
    pub junction_rows: u64,
    pub synthesized_templates: u64,
    pub relinked_listings: u64,
}

impl ExecutionReport {
    /// Fold a later pass into this report.
    pub fn merge(&mut self, other: ExecutionReport) {
        self.applied.extend(other.applied);
        self.skipped.extend(other.skipped);
        self.degraded_tables.extend(other.degraded_tables);
        self.junction_rows += other.junction_rows;
        self.synthesized_templates += other.synthesized_templates;
        self.relinked_listings += other.relinked_listings;
    }
}

/// Apply actions in plan order.
///
/// # Errors
/// Returns [`StoreError::MigrationStep`] naming the failing action. Rebuild
/// failures do not propagate: they restore from backup or degrade to an
/// empty table so the boot can continue.
pub fn execute(
    conn: &mut Connection,
    actions: &[MigrationAction],
) -> Result<ExecutionReport, StoreError> {
    let mut report = ExecutionReport::default();

    for action in actions {
        apply_one(conn, action, &mut report).map_err(|err| match err {
            StoreError::Sqlite(source) => {
                StoreError::MigrationStep { action: action.to_string(), source }
            }
            other => other,
        })?;
    }

    Ok(report)
}

fn apply_one(
    conn: &mut Connection,
    action: &MigrationAction,
    report: &mut ExecutionReport,
) -> Result<(), StoreError> {
    match action {
        MigrationAction::CreateTable { table, ddl } => {
            // IF NOT EXISTS in the DDL makes re-application a no-op.
            conn.execute_batch(ddl)?;
            tracing::info!(table, "created table");
            report.applied.push(action.to_string());
        }
        MigrationAction::AddColumn { table, column, ddl } => {
            if inspect::column_exists(conn, table, column)? {
                report.skipped.push(action.to_string());
            } else {
                conn.execute_batch(&format!("ALTER TABLE {table} ADD COLUMN {ddl}"))?;
                tracing::info!(table, column, "added column");
                report.applied.push(action.to_string());
            }
        }
        MigrationAction::CopyColumn { table, from, to } => {
            let copied = conn.execute(
                &format!(
                    "UPDATE {table} SET {to} = {from}
                     WHERE {to} IS NULL AND {from} IS NOT NULL"
                ),
                [],
            )?;
            tracing::info!(table, from, to, rows = copied, "copied legacy column values");
            report.applied.push(action.to_string());
        }
        MigrationAction::RebuildTable { table } => {
            rebuild_table(conn, table, report)?;
        }
        MigrationAction::MigrateJunction {
            parent_table,
            source_column,
            junction_table,
            parent_key,
            child_key,
        } => {
            let spec = JunctionSpec {
                parent_table: parent_table.clone(),
                source_column: source_column.clone(),
                junction_table: junction_table.clone(),
                parent_key: parent_key.clone(),
                child_table: "patterns".to_string(),
                child_key: child_key.clone(),
            };
            report.junction_rows += migrate_junction(conn, &spec)?;
            report.applied.push(action.to_string());
        }
        MigrationAction::SynthesizeParent { rule } => {
            let outcome = synthesize_parents(conn, *rule)?;
            report.synthesized_templates += outcome.templates_created;
            report.relinked_listings += outcome.listings_relinked;
            report.applied.push(action.to_string());
        }
    }
    Ok(())
}

/// The shadow-swap protocol. Rename the live table to its backup name,
/// create the new shape under the original name, copy rows with remaps,
/// verify counts, then drop the backup. The swap runs in one transaction,
/// but the backup table is the actual safety net: its presence on the next
/// boot means an interrupted swap to resume.
fn rebuild_table(
    conn: &mut Connection,
    table: &str,
    report: &mut ExecutionReport,
) -> Result<(), StoreError> {
    let backup = backup_name(table);
    let ddl = schema::ddl_for(table)
        .ok_or_else(|| StoreError::Planning(format!("no target shape for table {table}")))?;

    // FK enforcement and rename behavior are connection-level pragmas and
    // no-ops inside a transaction, so both are toggled outside the swap.
    // legacy_alter_table keeps RENAME from rewriting REFERENCES clauses in
    // dependent tables to the backup name.
    set_foreign_keys(conn, false)?;
    set_legacy_alter_table(conn, true)?;
    let result = rebuild_swap(conn, table, &backup, ddl);

    let outcome = match result {
        Ok(()) => {
            tracing::info!(table, "rebuilt table in new shape");
            report.applied.push(format!("rebuild table {table}"));
            Ok(())
        }
        Err(err) => {
            tracing::error!(table, error = %err, "table rebuild failed; attempting restore");
            match restore_or_degrade(conn, table, &backup, ddl) {
                Restored::PreviousShape => {
                    // Old shape intact; the rebuild is retried next boot.
                    report.skipped.push(format!("rebuild table {table} (restored, retry next boot)"));
                    Ok(())
                }
                Restored::EmptyTable => {
                    tracing::error!(
                        table,
                        "restore failed; created empty table in new shape, data unrecoverable"
                    );
                    report.degraded_tables.push(table.to_string());
                    Ok(())
                }
                Restored::Unusable(fatal) => Err(fatal),
            }
        }
    };

    set_legacy_alter_table(conn, false)?;
    set_foreign_keys(conn, true)?;
    outcome
}

fn rebuild_swap(
    conn: &mut Connection,
    table: &str,
    backup: &str,
    ddl: &str,
) -> Result<(), StoreError> {
    let tx = conn.transaction()?;

    if inspect::table_exists(&tx, backup)? {
        // Interrupted run. If the live table already reached the new shape
        // and holds everything the backup does, only the cleanup was missed.
        if inspect::table_exists(&tx, table)? {
            if is_new_shape(&tx, table)? && row_count(&tx, table)? >= row_count(&tx, backup)? {
                tx.execute_batch(&format!("DROP TABLE {backup}"))?;
                tx.commit()?;
                tracing::info!(table, "dropped stale backup from a completed rebuild");
                return Ok(());
            }
            // Partial live table; the backup is the source of truth.
            tx.execute_batch(&format!("DROP TABLE {table}"))?;
        }
    } else {
        tx.execute_batch(&format!("ALTER TABLE {table} RENAME TO {backup}"))?;
    }

    tx.execute_batch(ddl)?;
    carry_legacy_columns(&tx, table, backup)?;
    copy_rows(&tx, table, backup)?;

    let copied = row_count(&tx, table)?;
    let expected = row_count(&tx, backup)?;
    if copied != expected {
        // Dropping the transaction rolls the swap back.
        return Err(StoreError::Verification { table: table.to_string(), expected, actual: copied });
    }

    tx.execute_batch(&format!("DROP TABLE {backup}"))?;
    tx.commit()?;
    Ok(())
}

enum Restored {
    PreviousShape,
    EmptyTable,
    Unusable(StoreError),
}

/// Step-8 recovery: put the backup back under the live name, or as a last
/// resort create an empty table in the new shape so the process can boot.
fn restore_or_degrade(conn: &Connection, table: &str, backup: &str, ddl: &str) -> Restored {
    let restore = || -> Result<(), StoreError> {
        if inspect::table_exists(conn, table)? {
            // The transactional swap rolled back; the live table (old or
            // backup-sourced shape) is intact.
            return Ok(());
        }
        if inspect::table_exists(conn, backup)? {
            conn.execute_batch(&format!("ALTER TABLE {backup} RENAME TO {table}"))?;
            return Ok(());
        }
        Err(StoreError::Planning(format!("neither {table} nor {backup} exists after failed swap")))
    };

    if restore().is_ok() {
        return Restored::PreviousShape;
    }

    match conn.execute_batch(ddl) {
        Ok(()) => Restored::EmptyTable,
        Err(err) => Restored::Unusable(StoreError::MigrationStep {
            action: format!("rebuild table {table}"),
            source: err,
        }),
    }
}

/// A table is in its target shape when every target column is present and
/// its declaration carries no CHECK constraint.
fn is_new_shape(conn: &Connection, table: &str) -> Result<bool, StoreError> {
    let Some(required) = schema::target_columns(table) else {
        return Ok(false);
    };
    let columns = inspect::columns_of(conn, table)?;
    let all_present =
        required.iter().all(|name| columns.iter().any(|info| info.name == *name));
    if !all_present {
        return Ok(false);
    }

    let sql: Option<String> = conn
        .query_row(
            "SELECT sql FROM sqlite_master WHERE type = 'table' AND name = ?1",
            [table],
            |row| row.get(0),
        )
        .map_err(StoreError::Introspection)?;
    Ok(sql.is_some_and(|ddl| !ddl.to_uppercase().contains("CHECK")))
}

fn row_count(conn: &Connection, table: &str) -> Result<u64, StoreError> {
    let count: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))?;
    Ok(u64::try_from(count).unwrap_or(0))
}

/// Legacy columns on the source with no counterpart in the target shape
/// (e.g. a not-yet-dropped `pattern_id`) are carried through the rebuild;
/// dropping them is a separate concern the rebuild never takes on.
fn carry_legacy_columns(conn: &Connection, table: &str, backup: &str) -> Result<(), StoreError> {
    let source = inspect::columns_of(conn, backup)?;
    let target = inspect::columns_of(conn, table)?;

    for info in source {
        if target.iter().any(|existing| existing.name == info.name) {
            continue;
        }
        let decl_type = if info.decl_type.is_empty() { "TEXT" } else { info.decl_type.as_str() };
        conn.execute_batch(&format!("ALTER TABLE {table} ADD COLUMN {} {decl_type}", info.name))?;
        tracing::info!(table, column = info.name, "carried legacy column through rebuild");
    }
    Ok(())
}

/// Row-by-row copy with shape remaps: a legacy scalar `type` becomes a
/// one-element JSON list, missing counts default to 1, missing timestamps
/// to the epoch.
fn copy_rows(conn: &Connection, table: &str, backup: &str) -> Result<(), StoreError> {
    let source_cols = inspect::columns_of(conn, backup)?;
    let target_cols = inspect::columns_of(conn, table)?;

    let select_list =
        source_cols.iter().map(|info| info.name.clone()).collect::<Vec<_>>().join(", ");
    let insert_list =
        target_cols.iter().map(|info| info.name.clone()).collect::<Vec<_>>().join(", ");
    let placeholders =
        (1..=target_cols.len()).map(|i| format!("?{i}")).collect::<Vec<_>>().join(", ");

    let mut select = conn.prepare(&format!("SELECT {select_list} FROM {backup}"))?;
    let mut insert =
        conn.prepare(&format!("INSERT INTO {table} ({insert_list}) VALUES ({placeholders})"))?;

    let mut rows = select.query([])?;
    while let Some(row) = rows.next()? {
        let mut by_name: BTreeMap<&str, Value> = BTreeMap::new();
        for (index, info) in source_cols.iter().enumerate() {
            by_name.insert(info.name.as_str(), row.get::<_, Value>(index)?);
        }

        let mut values = Vec::with_capacity(target_cols.len());
        for info in &target_cols {
            let raw = by_name.remove(info.name.as_str()).unwrap_or(Value::Null);
            values.push(remap_value(&info.name, raw)?);
        }
        insert.execute(params_from_iter(values))?;
    }
    Ok(())
}

fn remap_value(column: &str, value: Value) -> Result<Value, StoreError> {
    match (column, value) {
        ("type", Value::Text(raw)) => Ok(Value::Text(ensure_list(&raw)?)),
        ("type" | "colors" | "tags", Value::Null) => Ok(Value::Text("[]".to_string())),
        ("number_of_items", Value::Null) => Ok(Value::Integer(1)),
        ("created_at" | "updated_at", Value::Null) => Ok(Value::Text(EPOCH_RFC3339.to_string())),
        (_, other) => Ok(other),
    }
}

fn set_foreign_keys(conn: &Connection, enabled: bool) -> Result<(), StoreError> {
    conn.pragma_update(None, "foreign_keys", enabled)?;
    Ok(())
}

fn set_legacy_alter_table(conn: &Connection, enabled: bool) -> Result<(), StoreError> {
    conn.pragma_update(None, "legacy_alter_table", enabled)?;
    Ok(())
}
