//! Converts a legacy single-parent foreign key column into rows of a
//! many-to-many junction table.

use rusqlite::{params, Connection};

use crate::error::StoreError;

/// Names the tables and key columns of one junction migration.
#[derive(Debug, Clone)]
pub struct JunctionSpec {
    pub parent_table: String,
    pub source_column: String,
    pub junction_table: String,
    pub parent_key: String,
    pub child_table: String,
    pub child_key: String,
}

/// Migrate every resolvable legacy ref into the junction table.
///
/// One set-based statement: pairs already present are skipped via an
/// explicit `NOT EXISTS` (idempotent, second run inserts zero), dangling
/// refs are skipped (left for the read gate to report, never an FK error),
/// and the parent row's `created_at` is preserved on the junction row. The
/// legacy column itself is never dropped here.
///
/// Returns the number of rows inserted.
///
/// # Errors
/// Returns an error when the insert statement fails.
pub fn migrate_junction(conn: &Connection, spec: &JunctionSpec) -> Result<u64, StoreError> {
    let JunctionSpec { parent_table, source_column, junction_table, parent_key, child_table, child_key } =
        spec;

    let inserted = conn.execute(
        &format!(
            "INSERT INTO {junction_table} ({parent_key}, {child_key}, created_at)
             SELECT p.id, p.{source_column}, p.created_at
             FROM {parent_table} p
             WHERE p.{source_column} IS NOT NULL
               AND EXISTS (SELECT 1 FROM {child_table} c WHERE c.id = p.{source_column})
               AND NOT EXISTS (SELECT 1 FROM {junction_table} j
                               WHERE j.{parent_key} = p.id
                                 AND j.{child_key} = p.{source_column})"
        ),
        [],
    )?;

    let inserted = inserted as u64;
    tracing::info!(
        parent_table,
        source_column,
        junction_table,
        rows = inserted,
        "migrated legacy refs into junction table"
    );
    Ok(inserted)
}

/// Insert one junction pair if it is not already present. Shared with the
/// data synthesizer, which links synthesized parents the same way migrated
/// rows are linked.
///
/// # Errors
/// Returns an error when the insert fails.
pub fn link_if_absent(
    conn: &Connection,
    junction_table: &str,
    parent_key: &str,
    child_key: &str,
    parent_id: &str,
    child_id: &str,
    created_at: &str,
) -> Result<bool, StoreError> {
    let inserted = conn.execute(
        &format!(
            "INSERT INTO {junction_table} ({parent_key}, {child_key}, created_at)
             SELECT ?1, ?2, ?3
             WHERE NOT EXISTS (SELECT 1 FROM {junction_table}
                               WHERE {parent_key} = ?1 AND {child_key} = ?2)"
        ),
        params![parent_id, child_id, created_at],
    )?;
    Ok(inserted > 0)
}
