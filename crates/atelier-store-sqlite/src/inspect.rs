//! Read-only schema introspection. Everything the planner knows about the
//! database comes from one [`SchemaSnapshot`] taken here; no later step
//! re-queries the catalog to decide what to do.

use std::collections::{BTreeMap, BTreeSet};

use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection};
use serde::Serialize;

use crate::error::StoreError;
use crate::schema::BACKUP_SUFFIX;

/// Sentinel primary key used by the constraint probe. Inserted only inside a
/// rolled-back transaction, so it never survives.
const PROBE_SENTINEL_ID: &str = "__atelier_shape_probe__";

/// Representative value of the current `type` shape: a JSON list. A legacy
/// `CHECK (type IN (...))` rejects it, which is exactly the signal.
const PROBE_TYPE_VALUE: &str = r#"["digital_download","printable"]"#;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ColumnInfo {
    pub name: String,
    pub decl_type: String,
    pub not_null: bool,
    pub default_value: Option<String>,
    pub primary_key: bool,
}

/// Outcome of the probe-insert used to detect whether a value constraint
/// still rejects the current value shape.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProbeOutcome {
    /// The new shape inserts cleanly; no rebuild needed.
    Accepted,
    /// A constraint violation: the legacy CHECK is still present.
    Rejected,
    /// The probed table or column does not exist yet.
    NotApplicable,
    /// The probe failed for an unexpected reason. Conservative handling:
    /// no rebuild this boot, retried on the next one.
    Failed(String),
}

/// Everything the planner consumes, captured in one pass.
#[derive(Debug, Clone, Serialize)]
pub struct SchemaSnapshot {
    /// User tables and their columns, backup tables included under their
    /// on-disk (suffixed) names.
    pub tables: BTreeMap<String, Vec<ColumnInfo>>,
    /// Logical names of tables that currently have a `_old_backup` shadow,
    /// i.e. an interrupted rebuild to resume.
    pub backup_tables: BTreeSet<String>,
    /// Constraint probe outcome for `product_templates.type`.
    pub type_probe: ProbeOutcome,
    /// Listing rows whose legacy `product_id` has not been mirrored into
    /// `product_template_id`.
    pub copyable_product_refs: u64,
    /// Resolvable `listings.pattern_id` refs missing from `listing_patterns`.
    pub unmigrated_listing_pattern_refs: u64,
    /// Resolvable `product_templates.pattern_id` refs missing from
    /// `template_patterns`.
    pub unmigrated_template_pattern_refs: u64,
    /// Listings with at least one pattern link but no resolvable template.
    pub synthesis_candidates: u64,
}

impl SchemaSnapshot {
    #[must_use]
    pub fn table_exists(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }

    #[must_use]
    pub fn column_exists(&self, table: &str, column: &str) -> bool {
        self.tables
            .get(table)
            .is_some_and(|columns| columns.iter().any(|info| info.name == column))
    }
}

/// List user tables, sorted. Internal `sqlite_` tables are excluded.
///
/// # Errors
/// Returns [`StoreError::Introspection`] when the catalog cannot be read.
pub fn list_tables(conn: &Connection) -> Result<Vec<String>, StoreError> {
    let mut stmt = conn
        .prepare(
            "SELECT name FROM sqlite_master
             WHERE type = 'table' AND name NOT LIKE 'sqlite_%'
             ORDER BY name ASC",
        )
        .map_err(StoreError::Introspection)?;
    let rows = stmt.query_map([], |row| row.get::<_, String>(0)).map_err(StoreError::Introspection)?;

    let mut tables = Vec::new();
    for row in rows {
        tables.push(row.map_err(StoreError::Introspection)?);
    }
    Ok(tables)
}

/// # Errors
/// Returns [`StoreError::Introspection`] when the catalog cannot be read.
pub fn table_exists(conn: &Connection, name: &str) -> Result<bool, StoreError> {
    let exists = conn
        .query_row(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1)",
            params![name],
            |row| row.get::<_, i64>(0),
        )
        .map_err(StoreError::Introspection)?;
    Ok(exists == 1)
}

/// Column metadata for one table, in declaration order. An absent table
/// yields an empty list, never an error.
///
/// # Errors
/// Returns [`StoreError::Introspection`] when the catalog cannot be read.
pub fn columns_of(conn: &Connection, table: &str) -> Result<Vec<ColumnInfo>, StoreError> {
    if !table_exists(conn, table)? {
        return Ok(Vec::new());
    }

    let mut stmt = conn
        .prepare(&format!("PRAGMA table_info({table})"))
        .map_err(StoreError::Introspection)?;
    let rows = stmt
        .query_map([], |row| {
            Ok(ColumnInfo {
                name: row.get(1)?,
                decl_type: row.get(2)?,
                not_null: row.get::<_, i64>(3)? != 0,
                default_value: row.get(4)?,
                primary_key: row.get::<_, i64>(5)? != 0,
            })
        })
        .map_err(StoreError::Introspection)?;

    let mut columns = Vec::new();
    for row in rows {
        columns.push(row.map_err(StoreError::Introspection)?);
    }
    Ok(columns)
}

/// # Errors
/// Returns [`StoreError::Introspection`] when the catalog cannot be read.
pub fn column_exists(conn: &Connection, table: &str, column: &str) -> Result<bool, StoreError> {
    Ok(columns_of(conn, table)?.iter().any(|info| info.name == column))
}

/// Take the full snapshot the planner consumes.
///
/// # Errors
/// Returns [`StoreError::Introspection`] when any catalog or count query
/// fails. A probe failure is *not* an error here; it is recorded in the
/// snapshot as [`ProbeOutcome::Failed`].
pub fn snapshot(conn: &mut Connection) -> Result<SchemaSnapshot, StoreError> {
    let mut tables = BTreeMap::new();
    let mut backup_tables = BTreeSet::new();

    for name in list_tables(conn)? {
        let columns = columns_of(conn, &name)?;
        if let Some(logical) = name.strip_suffix(BACKUP_SUFFIX) {
            backup_tables.insert(logical.to_string());
        }
        tables.insert(name, columns);
    }

    let type_probe = probe_type_shape(conn, &tables)?;
    let copyable_product_refs = count_copyable_product_refs(conn, &tables)?;
    let unmigrated_listing_pattern_refs =
        count_unmigrated_refs(conn, &tables, "listings", "patterns", "listing_patterns", "listing_id")?;
    let unmigrated_template_pattern_refs = count_unmigrated_refs(
        conn,
        &tables,
        "product_templates",
        "patterns",
        "template_patterns",
        "template_id",
    )?;
    let synthesis_candidates = count_synthesis_candidates(conn, &tables)?;

    Ok(SchemaSnapshot {
        tables,
        backup_tables,
        type_probe,
        copyable_product_refs,
        unmigrated_listing_pattern_refs,
        unmigrated_template_pattern_refs,
        synthesis_candidates,
    })
}

fn has_column(tables: &BTreeMap<String, Vec<ColumnInfo>>, table: &str, column: &str) -> bool {
    tables.get(table).is_some_and(|columns| columns.iter().any(|info| info.name == column))
}

/// Attempt a representative insert of the new `type` shape inside a
/// transaction that is always rolled back. A CHECK violation means the
/// legacy constraint is still in place and the table needs a rebuild.
fn probe_type_shape(
    conn: &mut Connection,
    tables: &BTreeMap<String, Vec<ColumnInfo>>,
) -> Result<ProbeOutcome, StoreError> {
    let Some(columns) = tables.get("product_templates") else {
        return Ok(ProbeOutcome::NotApplicable);
    };
    if !columns.iter().any(|info| info.name == "type") {
        return Ok(ProbeOutcome::NotApplicable);
    }

    let mut names = Vec::new();
    let mut values = Vec::new();
    for info in columns {
        match info.name.as_str() {
            "id" => {
                names.push("id");
                values.push(Value::Text(PROBE_SENTINEL_ID.to_string()));
            }
            "type" => {
                names.push("type");
                values.push(Value::Text(PROBE_TYPE_VALUE.to_string()));
            }
            _ if info.not_null && info.default_value.is_none() => {
                // Satisfy unrelated NOT NULL columns with a benign value so
                // the only constraint under test is the one on `type`.
                names.push(&info.name);
                let upper = info.decl_type.to_uppercase();
                if upper.contains("INT") {
                    values.push(Value::Integer(0));
                } else if upper.contains("REAL") || upper.contains("FLOA") || upper.contains("DOUB")
                {
                    values.push(Value::Real(0.0));
                } else {
                    values.push(Value::Text(String::new()));
                }
            }
            _ => {}
        }
    }

    let placeholders =
        (1..=names.len()).map(|i| format!("?{i}")).collect::<Vec<_>>().join(", ");
    let sql = format!(
        "INSERT INTO product_templates ({}) VALUES ({placeholders})",
        names.join(", ")
    );

    let tx = conn.transaction().map_err(StoreError::Introspection)?;
    let outcome = match tx.execute(&sql, params_from_iter(values)) {
        Ok(_) => ProbeOutcome::Accepted,
        Err(rusqlite::Error::SqliteFailure(err, message))
            if err.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            let text = message.unwrap_or_default();
            if text.contains("CHECK") {
                ProbeOutcome::Rejected
            } else {
                ProbeOutcome::Failed(format!("unexpected constraint violation: {text}"))
            }
        }
        Err(err) => ProbeOutcome::Failed(err.to_string()),
    };
    tx.rollback().map_err(StoreError::Introspection)?;

    Ok(outcome)
}

fn count(conn: &Connection, sql: &str) -> Result<u64, StoreError> {
    let value = conn
        .query_row(sql, [], |row| row.get::<_, i64>(0))
        .map_err(StoreError::Introspection)?;
    Ok(u64::try_from(value).unwrap_or(0))
}

fn count_copyable_product_refs(
    conn: &Connection,
    tables: &BTreeMap<String, Vec<ColumnInfo>>,
) -> Result<u64, StoreError> {
    if !has_column(tables, "listings", "product_id") {
        return Ok(0);
    }
    if has_column(tables, "listings", "product_template_id") {
        count(
            conn,
            "SELECT COUNT(*) FROM listings
             WHERE product_id IS NOT NULL AND product_template_id IS NULL",
        )
    } else {
        // The target column is planned as an AddColumn in the same boot.
        count(conn, "SELECT COUNT(*) FROM listings WHERE product_id IS NOT NULL")
    }
}

/// Resolvable legacy single-FK refs not yet represented in the junction
/// table. Dangling refs are excluded: they cannot be migrated and are left
/// for the read gate to report.
fn count_unmigrated_refs(
    conn: &Connection,
    tables: &BTreeMap<String, Vec<ColumnInfo>>,
    parent_table: &str,
    child_table: &str,
    junction_table: &str,
    parent_key: &str,
) -> Result<u64, StoreError> {
    if !has_column(tables, parent_table, "pattern_id") || !tables.contains_key(child_table) {
        return Ok(0);
    }

    let junction_filter = if tables.contains_key(junction_table) {
        format!(
            "AND NOT EXISTS (SELECT 1 FROM {junction_table} j
                             WHERE j.{parent_key} = p.id AND j.pattern_id = p.pattern_id)"
        )
    } else {
        // The junction table is planned as a CreateTable in the same boot.
        String::new()
    };

    count(
        conn,
        &format!(
            "SELECT COUNT(*) FROM {parent_table} p
             WHERE p.pattern_id IS NOT NULL
               AND EXISTS (SELECT 1 FROM {child_table} c WHERE c.id = p.pattern_id)
               {junction_filter}"
        ),
    )
}

/// Listings that have (or will have, once junction migration runs) at least
/// one resolvable pattern link but no resolvable product template.
fn count_synthesis_candidates(
    conn: &Connection,
    tables: &BTreeMap<String, Vec<ColumnInfo>>,
) -> Result<u64, StoreError> {
    if !tables.contains_key("listings") || !tables.contains_key("patterns") {
        return Ok(0);
    }

    let mut link_clauses = Vec::new();
    if tables.contains_key("listing_patterns") {
        link_clauses.push(
            "EXISTS (SELECT 1 FROM listing_patterns lp
                     JOIN patterns pa ON pa.id = lp.pattern_id
                     WHERE lp.listing_id = l.id)"
                .to_string(),
        );
    }
    if has_column(tables, "listings", "pattern_id") {
        link_clauses.push(
            "(l.pattern_id IS NOT NULL
              AND EXISTS (SELECT 1 FROM patterns pa WHERE pa.id = l.pattern_id))"
                .to_string(),
        );
    }
    if link_clauses.is_empty() {
        return Ok(0);
    }
    let has_link = link_clauses.join(" OR ");

    let template_resolves = if has_column(tables, "listings", "product_template_id")
        && tables.contains_key("product_templates")
    {
        "l.product_template_id IS NOT NULL
         AND EXISTS (SELECT 1 FROM product_templates t WHERE t.id = l.product_template_id)"
            .to_string()
    } else {
        // No template column or no template table: nothing can resolve.
        "0".to_string()
    };

    count(
        conn,
        &format!(
            "SELECT COUNT(*) FROM listings l
             WHERE ({has_link}) AND NOT ({template_resolves})"
        ),
    )
}
