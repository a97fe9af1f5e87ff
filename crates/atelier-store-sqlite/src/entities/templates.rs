use atelier_core::{
    NewProductTemplate, PatternCount, PatternId, ProductTemplate, ProductTemplateUpdate,
    TemplateId,
};
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::StoreError;
use crate::helpers::{decode_list, encode_list, now_rfc3339, parse_rfc3339};
use crate::{junction, Store};

struct TemplateRow {
    id: String,
    name: String,
    product_types: String,
    number_of_items: i64,
    description: Option<String>,
    created_at: String,
    updated_at: String,
}

impl TemplateRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            product_types: row.get(2)?,
            number_of_items: row.get(3)?,
            description: row.get(4)?,
            created_at: row.get(5)?,
            updated_at: row.get(6)?,
        })
    }

    fn hydrate(self, conn: &Connection) -> Result<ProductTemplate, StoreError> {
        let number_of_items = PatternCount::from_count(self.number_of_items).unwrap_or_else(|| {
            tracing::warn!(
                template_id = self.id,
                number_of_items = self.number_of_items,
                "legacy pattern count outside 1/3/5; reading as 1"
            );
            PatternCount::One
        });
        Ok(ProductTemplate {
            pattern_ids: linked_pattern_ids(conn, &self.id)?,
            id: TemplateId(self.id),
            name: self.name,
            product_types: decode_list(&self.product_types),
            number_of_items,
            description: self.description,
            created_at: parse_rfc3339(&self.created_at)?,
            updated_at: parse_rfc3339(&self.updated_at)?,
        })
    }
}

fn linked_pattern_ids(conn: &Connection, template_id: &str) -> Result<Vec<PatternId>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT pattern_id FROM template_patterns
         WHERE template_id = ?1
         ORDER BY created_at ASC, pattern_id ASC",
    )?;
    let rows = stmt.query_map(params![template_id], |row| row.get::<_, String>(0))?;
    let mut ids = Vec::new();
    for row in rows {
        ids.push(PatternId(row?));
    }
    Ok(ids)
}

fn pattern_exists(conn: &Connection, pattern_id: &str) -> Result<bool, StoreError> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM patterns WHERE id = ?1)",
        params![pattern_id],
        |row| row.get(0),
    )?;
    Ok(exists != 0)
}

const SELECT_TEMPLATE: &str = "SELECT id, name, type, number_of_items, description, \
     created_at, updated_at FROM product_templates";

impl Store {
    /// Create a template and its pattern links in one transaction. Every
    /// referenced pattern must already exist.
    ///
    /// # Errors
    /// Returns [`StoreError::MissingDependency`] for an unresolvable
    /// pattern id, a validation error for a blank name, or a storage error.
    pub fn create_template(
        &mut self,
        new: NewProductTemplate,
    ) -> Result<ProductTemplate, StoreError> {
        new.validate()?;
        for pattern_id in &new.pattern_ids {
            if !pattern_exists(&self.conn, pattern_id.as_str())? {
                return Err(StoreError::MissingDependency(format!(
                    "pattern {pattern_id} does not exist"
                )));
            }
        }

        let id = TemplateId::new();
        let now = now_rfc3339()?;
        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT INTO product_templates (id, name, type, number_of_items, description,
                                            created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
            params![
                id.as_str(),
                new.name,
                encode_list(&new.product_types)?,
                new.number_of_items.as_i64(),
                new.description,
                now,
            ],
        )?;
        for pattern_id in &new.pattern_ids {
            junction::link_if_absent(
                &tx,
                "template_patterns",
                "template_id",
                "pattern_id",
                id.as_str(),
                pattern_id.as_str(),
                &now,
            )?;
        }
        tx.commit()?;

        self.get_template(&id)?.ok_or_else(|| {
            StoreError::MissingDependency(format!("template {id} missing after insert"))
        })
    }

    /// # Errors
    /// Returns a storage error when the query fails.
    pub fn list_templates(&self) -> Result<Vec<ProductTemplate>, StoreError> {
        let mut stmt = self
            .conn
            .prepare(&format!("{SELECT_TEMPLATE} ORDER BY created_at DESC, id ASC"))?;
        let rows = stmt.query_map([], TemplateRow::from_row)?;
        let mut templates = Vec::new();
        for row in rows {
            templates.push(row?.hydrate(&self.conn)?);
        }
        Ok(templates)
    }

    /// # Errors
    /// Returns a storage error when the query fails.
    pub fn get_template(&self, id: &TemplateId) -> Result<Option<ProductTemplate>, StoreError> {
        let row = self
            .conn
            .query_row(
                &format!("{SELECT_TEMPLATE} WHERE id = ?1"),
                params![id.as_str()],
                TemplateRow::from_row,
            )
            .optional()?;
        row.map(|row| row.hydrate(&self.conn)).transpose()
    }

    /// Apply a partial patch. Pattern links are fixed at creation; only the
    /// scalar fields are patchable. Returns `None` when the id does not
    /// exist.
    ///
    /// # Errors
    /// Returns a storage error when the update fails.
    pub fn update_template(
        &mut self,
        id: &TemplateId,
        update: ProductTemplateUpdate,
    ) -> Result<Option<ProductTemplate>, StoreError> {
        let Some(mut template) = self.get_template(id)? else {
            return Ok(None);
        };
        if let Some(name) = update.name {
            template.name = name;
        }
        if let Some(product_types) = update.product_types {
            template.product_types = product_types;
        }
        if let Some(number_of_items) = update.number_of_items {
            template.number_of_items = number_of_items;
        }
        if let Some(description) = update.description {
            template.description = Some(description);
        }

        let now = now_rfc3339()?;
        self.conn.execute(
            "UPDATE product_templates
             SET name = ?2, type = ?3, number_of_items = ?4, description = ?5, updated_at = ?6
             WHERE id = ?1",
            params![
                id.as_str(),
                template.name,
                encode_list(&template.product_types)?,
                template.number_of_items.as_i64(),
                template.description,
                now,
            ],
        )?;
        template.updated_at = parse_rfc3339(&now)?;
        Ok(Some(template))
    }

    /// Delete a template; its pattern links cascade and listings that still
    /// reference it have the reference cleared, so they drop out of gated
    /// reads instead of blocking the delete.
    ///
    /// # Errors
    /// Returns a storage error when the delete fails.
    pub fn delete_template(&mut self, id: &TemplateId) -> Result<bool, StoreError> {
        let deleted = self.conn.execute(
            "DELETE FROM product_templates WHERE id = ?1",
            params![id.as_str()],
        )?;
        Ok(deleted > 0)
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use atelier_core::{
        NewListing, NewPattern, NewProductTemplate, PatternCount, PatternId,
        ProductTemplateUpdate,
    };

    use crate::error::StoreError;
    use crate::Store;

    fn store_with_pattern() -> Result<(Store, PatternId)> {
        let mut store = Store::open_in_memory()?;
        let pattern = store.create_pattern(NewPattern {
            name: "Waves".to_string(),
            ..NewPattern::default()
        })?;
        Ok((store, pattern.id))
    }

    fn sample(pattern_ids: Vec<PatternId>) -> NewProductTemplate {
        NewProductTemplate {
            name: "Greeting Cards".to_string(),
            product_types: vec!["printable".to_string()],
            number_of_items: PatternCount::Three,
            description: None,
            pattern_ids,
        }
    }

    #[test]
    fn create_links_patterns_and_round_trips() -> Result<()> {
        let (mut store, pattern_id) = store_with_pattern()?;
        let created = store.create_template(sample(vec![pattern_id.clone()]))?;

        assert_eq!(created.pattern_ids, vec![pattern_id]);
        assert_eq!(created.number_of_items, PatternCount::Three);
        assert_eq!(store.get_template(&created.id)?.as_ref(), Some(&created));
        Ok(())
    }

    #[test]
    fn unresolvable_pattern_is_a_missing_dependency() -> Result<()> {
        let (mut store, _) = store_with_pattern()?;
        let result = store.create_template(sample(vec![PatternId::from("no-such-pattern")]));
        assert!(matches!(result, Err(StoreError::MissingDependency(_))));
        assert!(store.list_templates()?.is_empty());
        Ok(())
    }

    #[test]
    fn update_patches_scalars_only() -> Result<()> {
        let (mut store, pattern_id) = store_with_pattern()?;
        let created = store.create_template(sample(vec![pattern_id]))?;

        let updated = store
            .update_template(
                &created.id,
                ProductTemplateUpdate {
                    number_of_items: Some(PatternCount::Five),
                    ..ProductTemplateUpdate::default()
                },
            )?
            .ok_or_else(|| anyhow::anyhow!("template should exist"))?;

        assert_eq!(updated.number_of_items, PatternCount::Five);
        assert_eq!(updated.pattern_ids, created.pattern_ids);
        Ok(())
    }

    #[test]
    fn delete_cascades_pattern_links() -> Result<()> {
        let (mut store, pattern_id) = store_with_pattern()?;
        let created = store.create_template(sample(vec![pattern_id]))?;

        assert!(store.delete_template(&created.id)?);
        let remaining: i64 =
            store.conn.query_row("SELECT COUNT(*) FROM template_patterns", [], |row| row.get(0))?;
        assert_eq!(remaining, 0);
        Ok(())
    }

    #[test]
    fn deleting_a_referenced_template_clears_listing_references() -> Result<()> {
        let (mut store, pattern_id) = store_with_pattern()?;
        let template = store.create_template(sample(vec![pattern_id.clone()]))?;
        let listing = store.generate_listing(NewListing {
            product_template_id: template.id.clone(),
            pattern_ids: vec![pattern_id],
            title: "Wave Cards".to_string(),
            description: None,
            price_cents: None,
            tags: vec![],
        })?;

        assert!(store.delete_template(&template.id)?);

        let orphaned: Option<String> = store.conn.query_row(
            "SELECT product_template_id FROM listings WHERE id = ?1",
            [listing.id.as_str()],
            |row| row.get(0),
        )?;
        assert_eq!(orphaned, None);
        Ok(())
    }
}
