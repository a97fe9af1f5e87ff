//! Synthesizes minimal parent rows so legacy data satisfies the listing
//! invariant. Synthesis never fabricates business data beyond what the
//! invariant requires: no price, no tags, no description.

use rusqlite::{params, Connection, OptionalExtension};
use ulid::Ulid;

use crate::error::StoreError;
use crate::helpers::now_rfc3339;
use crate::junction::link_if_absent;
use crate::plan::SynthesisRule;

/// Name of the standing synthesized template. One default template is
/// shared by every orphaned listing that has no better fit, so repeated
/// migrations never multiply placeholders.
pub const DEFAULT_TEMPLATE_NAME: &str = "Digital Download";

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SynthesisOutcome {
    pub templates_created: u64,
    pub listings_relinked: u64,
}

/// Repair every listing that matches the rule's orphan predicate.
///
/// For [`SynthesisRule::ListingTemplate`]: each listing with at least one
/// resolvable pattern link and no resolvable template gets a template via,
/// in order of preference, an existing single-item template already linked
/// to the listing's first pattern, the standing default template, or a
/// freshly created minimal one. The chosen template is linked to the pattern
/// in `template_patterns` and the listing is pointed at it. Idempotent:
/// repaired listings no longer match the predicate.
///
/// # Errors
/// Returns an error when any lookup or write fails.
pub fn synthesize_parents(
    conn: &Connection,
    rule: SynthesisRule,
) -> Result<SynthesisOutcome, StoreError> {
    match rule {
        SynthesisRule::ListingTemplate => synthesize_listing_templates(conn),
    }
}

fn synthesize_listing_templates(conn: &Connection) -> Result<SynthesisOutcome, StoreError> {
    // Orphans: a resolvable pattern link exists (junction migration has
    // already run) but the template ref is NULL or dangling. The first
    // pattern by junction timestamp anchors the fit search.
    let mut stmt = conn.prepare(
        "SELECT l.id,
                (SELECT lp.pattern_id FROM listing_patterns lp
                 JOIN patterns pa ON pa.id = lp.pattern_id
                 WHERE lp.listing_id = l.id
                 ORDER BY lp.created_at ASC, lp.pattern_id ASC
                 LIMIT 1)
         FROM listings l
         WHERE (l.product_template_id IS NULL
                OR NOT EXISTS (SELECT 1 FROM product_templates t
                               WHERE t.id = l.product_template_id))
         ORDER BY l.id ASC",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, Option<String>>(1)?))
    })?;

    let mut orphans = Vec::new();
    for row in rows {
        let (listing_id, first_pattern) = row?;
        if let Some(pattern_id) = first_pattern {
            orphans.push((listing_id, pattern_id));
        }
        // Listings with zero resolvable patterns are not repairable; the
        // read gate filters them.
    }

    let mut outcome = SynthesisOutcome::default();
    let now = now_rfc3339()?;

    for (listing_id, pattern_id) in orphans {
        let template_id = match find_fitting_template(conn, &pattern_id)? {
            Some(id) => id,
            None => {
                let (id, created) = default_template(conn, &now)?;
                if created {
                    outcome.templates_created += 1;
                }
                id
            }
        };

        link_if_absent(
            conn,
            "template_patterns",
            "template_id",
            "pattern_id",
            &template_id,
            &pattern_id,
            &now,
        )?;
        conn.execute(
            "UPDATE listings SET product_template_id = ?1 WHERE id = ?2",
            params![template_id, listing_id],
        )?;
        outcome.listings_relinked += 1;

        tracing::info!(listing_id, template_id, pattern_id, "relinked orphaned listing");
    }

    Ok(outcome)
}

/// A single-item template already linked to this pattern is the closest
/// logical fit.
fn find_fitting_template(
    conn: &Connection,
    pattern_id: &str,
) -> Result<Option<String>, StoreError> {
    let found = conn
        .query_row(
            "SELECT t.id FROM product_templates t
             JOIN template_patterns tp ON tp.template_id = t.id
             WHERE tp.pattern_id = ?1 AND t.number_of_items = 1
             ORDER BY t.created_at ASC, t.id ASC
             LIMIT 1",
            params![pattern_id],
            |row| row.get::<_, String>(0),
        )
        .optional()?;
    Ok(found)
}

/// Reuse the standing default template, creating it on first need. Only the
/// fields the invariant requires are set; everything else stays empty.
fn default_template(conn: &Connection, now: &str) -> Result<(String, bool), StoreError> {
    let existing = conn
        .query_row(
            "SELECT id FROM product_templates
             WHERE name = ?1 AND number_of_items = 1
             ORDER BY created_at ASC, id ASC
             LIMIT 1",
            params![DEFAULT_TEMPLATE_NAME],
            |row| row.get::<_, String>(0),
        )
        .optional()?;
    if let Some(id) = existing {
        return Ok((id, false));
    }

    let id = Ulid::new().to_string();
    conn.execute(
        "INSERT INTO product_templates (id, name, type, number_of_items, description, created_at, updated_at)
         VALUES (?1, ?2, '[]', 1, NULL, ?3, ?3)",
        params![id, DEFAULT_TEMPLATE_NAME, now],
    )?;
    tracing::info!(template_id = id, "synthesized default product template");
    Ok((id, true))
}

#[cfg(test)]
mod tests {
    use anyhow::Result;

    use super::*;
    use crate::schema;

    fn migrated_conn() -> Result<Connection> {
        let conn = Connection::open_in_memory()?;
        for (_, ddl) in schema::TARGET_TABLES {
            conn.execute_batch(ddl)?;
        }
        conn.execute_batch(
            "INSERT INTO patterns (id, name, created_at, updated_at)
             VALUES ('P1', 'Rose', '2024-01-01T00:00:00Z', '2024-01-01T00:00:00Z');
             INSERT INTO listings (id, title, created_at, updated_at)
             VALUES ('L1', 'Test', '2024-01-02T00:00:00Z', '2024-01-02T00:00:00Z');
             INSERT INTO listing_patterns (listing_id, pattern_id, created_at)
             VALUES ('L1', 'P1', '2024-01-02T00:00:00Z');",
        )?;
        Ok(conn)
    }

    #[test]
    fn synthesizes_one_default_template_and_relinks() -> Result<()> {
        let conn = migrated_conn()?;
        let outcome = synthesize_parents(&conn, SynthesisRule::ListingTemplate)?;
        assert_eq!(outcome.templates_created, 1);
        assert_eq!(outcome.listings_relinked, 1);

        let (name, items): (String, i64) = conn.query_row(
            "SELECT t.name, t.number_of_items FROM product_templates t
             JOIN listings l ON l.product_template_id = t.id
             WHERE l.id = 'L1'",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        assert_eq!(name, DEFAULT_TEMPLATE_NAME);
        assert_eq!(items, 1);

        let linked: i64 = conn.query_row(
            "SELECT COUNT(*) FROM template_patterns WHERE pattern_id = 'P1'",
            [],
            |row| row.get(0),
        )?;
        assert_eq!(linked, 1);
        Ok(())
    }

    #[test]
    fn second_run_changes_nothing() -> Result<()> {
        let conn = migrated_conn()?;
        synthesize_parents(&conn, SynthesisRule::ListingTemplate)?;
        let outcome = synthesize_parents(&conn, SynthesisRule::ListingTemplate)?;
        assert_eq!(outcome, SynthesisOutcome::default());

        let templates: i64 =
            conn.query_row("SELECT COUNT(*) FROM product_templates", [], |row| row.get(0))?;
        assert_eq!(templates, 1);
        Ok(())
    }

    #[test]
    fn orphans_sharing_a_pattern_share_the_template() -> Result<()> {
        let conn = migrated_conn()?;
        conn.execute_batch(
            "INSERT INTO listings (id, title, created_at, updated_at)
             VALUES ('L2', 'Second', '2024-01-03T00:00:00Z', '2024-01-03T00:00:00Z');
             INSERT INTO listing_patterns (listing_id, pattern_id, created_at)
             VALUES ('L2', 'P1', '2024-01-03T00:00:00Z');",
        )?;

        let outcome = synthesize_parents(&conn, SynthesisRule::ListingTemplate)?;
        assert_eq!(outcome.templates_created, 1);
        assert_eq!(outcome.listings_relinked, 2);

        let distinct: i64 = conn.query_row(
            "SELECT COUNT(DISTINCT product_template_id) FROM listings",
            [],
            |row| row.get(0),
        )?;
        assert_eq!(distinct, 1);
        Ok(())
    }

    #[test]
    fn prefers_an_existing_fitting_template() -> Result<()> {
        let conn = migrated_conn()?;
        conn.execute_batch(
            "INSERT INTO product_templates (id, name, type, number_of_items, created_at, updated_at)
             VALUES ('T1', 'Single Rose Card', '[\"printable\"]', 1,
                     '2023-06-01T00:00:00Z', '2023-06-01T00:00:00Z');
             INSERT INTO template_patterns (template_id, pattern_id, created_at)
             VALUES ('T1', 'P1', '2023-06-01T00:00:00Z');",
        )?;

        let outcome = synthesize_parents(&conn, SynthesisRule::ListingTemplate)?;
        assert_eq!(outcome.templates_created, 0);
        assert_eq!(outcome.listings_relinked, 1);

        let template: Option<String> = conn.query_row(
            "SELECT product_template_id FROM listings WHERE id = 'L1'",
            [],
            |row| row.get(0),
        )?;
        assert_eq!(template.as_deref(), Some("T1"));
        Ok(())
    }

    #[test]
    fn listings_without_patterns_are_left_alone() -> Result<()> {
        let conn = migrated_conn()?;
        conn.execute_batch(
            "INSERT INTO listings (id, title, created_at, updated_at)
             VALUES ('L9', 'Unrepairable', '2024-01-04T00:00:00Z', '2024-01-04T00:00:00Z');",
        )?;

        let outcome = synthesize_parents(&conn, SynthesisRule::ListingTemplate)?;
        assert_eq!(outcome.listings_relinked, 1); // only L1

        let template: Option<String> = conn.query_row(
            "SELECT product_template_id FROM listings WHERE id = 'L9'",
            [],
            |row| row.get(0),
        )?;
        assert_eq!(template, None);
        Ok(())
    }
}
