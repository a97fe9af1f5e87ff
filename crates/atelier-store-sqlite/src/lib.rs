//! SQLite-backed store for the atelier catalog. Opening a store runs the
//! full schema-evolution sequence (inspect, plan, execute, verify) exactly
//! once, before the handle exists; every entity accessor therefore operates
//! on a database already in the current shape.

use std::fmt::{Display, Formatter};
use std::fs;
use std::path::Path;

use rusqlite::Connection;
use serde::Serialize;

mod entities;
pub mod error;
pub mod execute;
pub mod gate;
pub mod helpers;
pub mod inspect;
pub mod junction;
pub mod plan;
pub mod schema;
pub mod synthesize;

pub use error::StoreError;
pub use execute::ExecutionReport;
pub use gate::IntegrityViolation;
pub use inspect::{ColumnInfo, ProbeOutcome, SchemaSnapshot};
pub use plan::{plan, MigrationAction, SynthesisRule};
pub use synthesize::DEFAULT_TEMPLATE_NAME;

/// Terminal state of a boot that produced a handle. Failures surface as
/// errors from [`Store::open`], so a report never describes a store that is
/// not serving.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BootPhase {
    /// Verified at the target shape; nothing left to do.
    Ready,
    /// Serving, with skipped actions deferred to the next boot.
    ReadyWithPending,
}

impl Display for BootPhase {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Ready => "ready",
            Self::ReadyWithPending => "ready_with_pending",
        };
        write!(f, "{name}")
    }
}

/// What one boot did, retrievable from the handle and printed by the CLI.
#[derive(Debug, Clone, Serialize)]
pub struct BootReport {
    pub phase: BootPhase,
    pub planned: Vec<String>,
    pub execution: ExecutionReport,
    /// Actions a follow-up plan still wants (e.g. a rebuild skipped after a
    /// probe failure). Retried on the next boot.
    pub pending_after_boot: Vec<String>,
}

/// Inspect-and-plan output without execution, for `--dry-run` and status.
#[derive(Debug, Clone, Serialize)]
pub struct PlanPreview {
    pub tables: Vec<String>,
    pub backup_tables: Vec<String>,
    pub actions: Vec<MigrationAction>,
}

/// The single handle to the embedded store. Constructing it is the only way
/// to reach the entity accessors, so no read or write can observe a
/// pre-migration schema.
pub struct Store {
    pub(crate) conn: Connection,
    report: BootReport,
}

impl Store {
    /// Open (or create) the database file, run the boot sequence, and
    /// return a ready handle. The parent directory is created if missing.
    ///
    /// # Errors
    /// Returns an error for storage-level failures: unopenable file,
    /// unreadable catalog, or a migration step that could not be recovered.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        Self::boot(conn)
    }

    /// In-memory store for tests; the same boot sequence applies.
    ///
    /// # Errors
    /// Returns an error when the boot sequence fails.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::boot(Connection::open_in_memory()?)
    }

    /// Inspect and plan against the database at `path` without executing
    /// anything. The file is created empty if absent, in which case the
    /// preview is the full create-table plan.
    ///
    /// # Errors
    /// Returns an error when the file cannot be opened or inspected.
    pub fn preview(path: &Path) -> Result<PlanPreview, StoreError> {
        let mut conn = Connection::open(path)?;
        let snapshot = inspect::snapshot(&mut conn)?;
        let actions = plan::plan(&snapshot);
        Ok(PlanPreview {
            tables: snapshot.tables.keys().cloned().collect(),
            backup_tables: snapshot.backup_tables.iter().cloned().collect(),
            actions,
        })
    }

    /// Re-plan passes per boot. Actions that unlock further work (a rebuild
    /// resurrecting a table whose legacy refs then need junction migration)
    /// converge on the second pass; the bound only stops a plan that keeps
    /// asking for a step execution keeps declining.
    const MAX_BOOT_PASSES: usize = 3;

    fn boot(mut conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )?;

        let mut planned = Vec::new();
        let mut execution = ExecutionReport::default();
        for pass in 0..Self::MAX_BOOT_PASSES {
            let snapshot = inspect::snapshot(&mut conn)?;
            if let ProbeOutcome::Failed(reason) = &snapshot.type_probe {
                tracing::warn!(reason, "constraint probe failed; rebuild skipped this boot");
            }

            let actions = plan::plan(&snapshot);
            if actions.is_empty() {
                break;
            }
            if pass == 0 {
                planned = actions.iter().map(ToString::to_string).collect();
            }
            tracing::info!(pass, actions = actions.len(), "planned migration actions");
            execution.merge(execute::execute(&mut conn, &actions)?);
        }

        // Verification: a fresh snapshot should plan nothing. Anything still
        // pending was explicitly skipped and is retried on the next boot.
        let after = inspect::snapshot(&mut conn)?;
        let pending_after_boot =
            plan::plan(&after).iter().map(ToString::to_string).collect::<Vec<_>>();
        if pending_after_boot.is_empty() {
            tracing::info!("schema verified at target shape");
        } else {
            tracing::warn!(
                pending = pending_after_boot.len(),
                "actions still pending after boot; deferred to next start"
            );
        }

        let phase = if pending_after_boot.is_empty() {
            BootPhase::Ready
        } else {
            BootPhase::ReadyWithPending
        };
        let report = BootReport { phase, planned, execution, pending_after_boot };
        Ok(Self { conn, report })
    }

    #[must_use]
    pub fn boot_report(&self) -> &BootReport {
        &self.report
    }
}
