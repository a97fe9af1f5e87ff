use atelier_core::{NewPattern, Pattern, PatternId, PatternUpdate};
use rusqlite::{params, OptionalExtension};

use crate::error::StoreError;
use crate::helpers::{decode_list, encode_list, now_rfc3339, parse_rfc3339};
use crate::Store;

struct PatternRow {
    id: String,
    name: String,
    style: Option<String>,
    colors: String,
    tags: String,
    image_path: Option<String>,
    created_at: String,
    updated_at: String,
}

impl PatternRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            style: row.get(2)?,
            colors: row.get(3)?,
            tags: row.get(4)?,
            image_path: row.get(5)?,
            created_at: row.get(6)?,
            updated_at: row.get(7)?,
        })
    }

    fn hydrate(self) -> Result<Pattern, StoreError> {
        Ok(Pattern {
            id: PatternId(self.id),
            name: self.name,
            style: self.style,
            colors: decode_list(&self.colors),
            tags: decode_list(&self.tags),
            image_path: self.image_path,
            created_at: parse_rfc3339(&self.created_at)?,
            updated_at: parse_rfc3339(&self.updated_at)?,
        })
    }
}

const SELECT_PATTERN: &str = "SELECT id, name, style, colors, tags, image_path, \
     created_at, updated_at FROM patterns";

impl Store {
    /// # Errors
    /// Returns a validation error for a blank name, or a storage error.
    pub fn create_pattern(&mut self, new: NewPattern) -> Result<Pattern, StoreError> {
        new.validate()?;
        let id = PatternId::new();
        let now = now_rfc3339()?;
        self.conn.execute(
            "INSERT INTO patterns (id, name, style, colors, tags, image_path, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
            params![
                id.as_str(),
                new.name,
                new.style,
                encode_list(&new.colors)?,
                encode_list(&new.tags)?,
                new.image_path,
                now,
            ],
        )?;
        Ok(Pattern {
            id,
            name: new.name,
            style: new.style,
            colors: new.colors,
            tags: new.tags,
            image_path: new.image_path,
            created_at: parse_rfc3339(&now)?,
            updated_at: parse_rfc3339(&now)?,
        })
    }

    /// # Errors
    /// Returns a storage error when the query fails.
    pub fn list_patterns(&self) -> Result<Vec<Pattern>, StoreError> {
        let mut stmt = self
            .conn
            .prepare(&format!("{SELECT_PATTERN} ORDER BY created_at DESC, id ASC"))?;
        let rows = stmt.query_map([], PatternRow::from_row)?;
        let mut patterns = Vec::new();
        for row in rows {
            patterns.push(row?.hydrate()?);
        }
        Ok(patterns)
    }

    /// # Errors
    /// Returns a storage error when the query fails.
    pub fn get_pattern(&self, id: &PatternId) -> Result<Option<Pattern>, StoreError> {
        let row = self
            .conn
            .query_row(
                &format!("{SELECT_PATTERN} WHERE id = ?1"),
                params![id.as_str()],
                PatternRow::from_row,
            )
            .optional()?;
        row.map(PatternRow::hydrate).transpose()
    }

    /// Apply a partial patch. Returns `None` when the id does not exist.
    ///
    /// # Errors
    /// Returns a storage error when the update fails.
    pub fn update_pattern(
        &mut self,
        id: &PatternId,
        update: PatternUpdate,
    ) -> Result<Option<Pattern>, StoreError> {
        let Some(mut pattern) = self.get_pattern(id)? else {
            return Ok(None);
        };
        if let Some(name) = update.name {
            pattern.name = name;
        }
        if let Some(style) = update.style {
            pattern.style = Some(style);
        }
        if let Some(colors) = update.colors {
            pattern.colors = colors;
        }
        if let Some(tags) = update.tags {
            pattern.tags = tags;
        }
        if let Some(image_path) = update.image_path {
            pattern.image_path = Some(image_path);
        }

        let now = now_rfc3339()?;
        self.conn.execute(
            "UPDATE patterns
             SET name = ?2, style = ?3, colors = ?4, tags = ?5, image_path = ?6, updated_at = ?7
             WHERE id = ?1",
            params![
                id.as_str(),
                pattern.name,
                pattern.style,
                encode_list(&pattern.colors)?,
                encode_list(&pattern.tags)?,
                pattern.image_path,
                now,
            ],
        )?;
        pattern.updated_at = parse_rfc3339(&now)?;
        Ok(Some(pattern))
    }

    /// Delete a pattern; junction links cascade. Returns whether a row
    /// existed.
    ///
    /// # Errors
    /// Returns a storage error when the delete fails.
    pub fn delete_pattern(&mut self, id: &PatternId) -> Result<bool, StoreError> {
        let deleted = self
            .conn
            .execute("DELETE FROM patterns WHERE id = ?1", params![id.as_str()])?;
        Ok(deleted > 0)
    }
}
