//! The declarative migration rule set. `plan` is a pure function of one
//! [`SchemaSnapshot`]: no database access, no side effects, and the same
//! snapshot always yields the same ordered action list. Applying the plan
//! makes the next snapshot plan empty (fixed point).

use std::fmt::{Display, Formatter};

use serde::Serialize;

use crate::inspect::{ProbeOutcome, SchemaSnapshot};
use crate::schema::{ADDABLE_COLUMNS, TARGET_TABLES};

/// One planned migration step, ordered additive-first so later steps can
/// rely on tables and columns already existing.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum MigrationAction {
    CreateTable {
        table: String,
        #[serde(skip)]
        ddl: &'static str,
    },
    AddColumn {
        table: String,
        column: String,
        #[serde(skip)]
        ddl: &'static str,
    },
    /// Mirror a legacy scalar column into its successor on the same table.
    CopyColumn {
        table: String,
        from: String,
        to: String,
    },
    /// Shadow-table swap; the only action that rewrites a table in place.
    RebuildTable {
        table: String,
    },
    /// Convert a legacy single-FK column into junction rows.
    MigrateJunction {
        parent_table: String,
        source_column: String,
        junction_table: String,
        parent_key: String,
        child_key: String,
    },
    /// Synthesize missing parent rows so legacy data satisfies the listing
    /// invariant.
    SynthesizeParent {
        rule: SynthesisRule,
    },
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SynthesisRule {
    /// Listings with pattern links but no resolvable product template get a
    /// minimal template synthesized and linked.
    ListingTemplate,
}

impl Display for MigrationAction {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CreateTable { table, .. } => write!(f, "create table {table}"),
            Self::AddColumn { table, column, .. } => write!(f, "add column {table}.{column}"),
            Self::CopyColumn { table, from, to } => {
                write!(f, "copy column {table}.{from} -> {table}.{to}")
            }
            Self::RebuildTable { table } => write!(f, "rebuild table {table}"),
            Self::MigrateJunction { parent_table, source_column, junction_table, .. } => {
                write!(f, "migrate junction {parent_table}.{source_column} -> {junction_table}")
            }
            Self::SynthesizeParent { rule } => match rule {
                SynthesisRule::ListingTemplate => {
                    write!(f, "synthesize product templates for orphaned listings")
                }
            },
        }
    }
}

/// Derive the ordered action list for the inspected state.
///
/// Ordering is owned here and is stable: `CreateTable`, `AddColumn`,
/// `CopyColumn`, `RebuildTable`, `MigrateJunction`, `SynthesizeParent`.
/// Additive steps precede the rebuild, the rebuild precedes data repair
/// (synthesis must insert rows the relaxed shape accepts), and junction
/// migration precedes synthesis (synthesis keys off pattern links).
#[must_use]
pub fn plan(snapshot: &SchemaSnapshot) -> Vec<MigrationAction> {
    let mut actions = Vec::new();

    for &(table, ddl) in TARGET_TABLES {
        if !snapshot.table_exists(table) {
            actions.push(MigrationAction::CreateTable { table: table.to_string(), ddl });
        }
    }

    for spec in ADDABLE_COLUMNS {
        if snapshot.table_exists(spec.table) && !snapshot.column_exists(spec.table, spec.column) {
            actions.push(MigrationAction::AddColumn {
                table: spec.table.to_string(),
                column: spec.column.to_string(),
                ddl: spec.ddl,
            });
        }
    }

    if snapshot.copyable_product_refs > 0 {
        actions.push(MigrationAction::CopyColumn {
            table: "listings".to_string(),
            from: "product_id".to_string(),
            to: "product_template_id".to_string(),
        });
    }

    // A leftover backup table always wins a rebuild slot: it is the durable
    // marker of an interrupted swap, and resuming it is the only way to get
    // rid of it. A probe rejection means the legacy CHECK is still in place.
    // Probe failure plans nothing (conservative; retried next boot).
    if snapshot.backup_tables.contains("product_templates")
        || snapshot.type_probe == ProbeOutcome::Rejected
    {
        actions.push(MigrationAction::RebuildTable { table: "product_templates".to_string() });
    }

    if snapshot.unmigrated_template_pattern_refs > 0 {
        actions.push(MigrationAction::MigrateJunction {
            parent_table: "product_templates".to_string(),
            source_column: "pattern_id".to_string(),
            junction_table: "template_patterns".to_string(),
            parent_key: "template_id".to_string(),
            child_key: "pattern_id".to_string(),
        });
    }
    if snapshot.unmigrated_listing_pattern_refs > 0 {
        actions.push(MigrationAction::MigrateJunction {
            parent_table: "listings".to_string(),
            source_column: "pattern_id".to_string(),
            junction_table: "listing_patterns".to_string(),
            parent_key: "listing_id".to_string(),
            child_key: "pattern_id".to_string(),
        });
    }

    if snapshot.synthesis_candidates > 0 {
        actions.push(MigrationAction::SynthesizeParent { rule: SynthesisRule::ListingTemplate });
    }

    actions
}
