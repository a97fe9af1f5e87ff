use atelier_core::{BrandIdentity, BrandIdentityId, BrandIdentityUpdate, NewBrandIdentity};
use rusqlite::{params, OptionalExtension};

use crate::error::StoreError;
use crate::helpers::{now_rfc3339, parse_rfc3339};
use crate::Store;

struct BrandRow {
    id: String,
    shop_name: String,
    tagline: Option<String>,
    about: Option<String>,
    voice: Option<String>,
    created_at: String,
    updated_at: String,
}

impl BrandRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            shop_name: row.get(1)?,
            tagline: row.get(2)?,
            about: row.get(3)?,
            voice: row.get(4)?,
            created_at: row.get(5)?,
            updated_at: row.get(6)?,
        })
    }

    fn hydrate(self) -> Result<BrandIdentity, StoreError> {
        Ok(BrandIdentity {
            id: BrandIdentityId(self.id),
            shop_name: self.shop_name,
            tagline: self.tagline,
            about: self.about,
            voice: self.voice,
            created_at: parse_rfc3339(&self.created_at)?,
            updated_at: parse_rfc3339(&self.updated_at)?,
        })
    }
}

const SELECT_BRAND: &str = "SELECT id, shop_name, tagline, about, voice, created_at, updated_at \
     FROM brand_identities";

impl Store {
    /// # Errors
    /// Returns a validation error for a blank shop name, or a storage error.
    pub fn create_brand_identity(
        &mut self,
        new: NewBrandIdentity,
    ) -> Result<BrandIdentity, StoreError> {
        new.validate()?;
        let id = BrandIdentityId::new();
        let now = now_rfc3339()?;
        self.conn.execute(
            "INSERT INTO brand_identities (id, shop_name, tagline, about, voice,
                                           created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
            params![id.as_str(), new.shop_name, new.tagline, new.about, new.voice, now],
        )?;
        Ok(BrandIdentity {
            id,
            shop_name: new.shop_name,
            tagline: new.tagline,
            about: new.about,
            voice: new.voice,
            created_at: parse_rfc3339(&now)?,
            updated_at: parse_rfc3339(&now)?,
        })
    }

    /// # Errors
    /// Returns a storage error when the query fails.
    pub fn list_brand_identities(&self) -> Result<Vec<BrandIdentity>, StoreError> {
        let mut stmt =
            self.conn.prepare(&format!("{SELECT_BRAND} ORDER BY created_at DESC, id ASC"))?;
        let rows = stmt.query_map([], BrandRow::from_row)?;
        let mut identities = Vec::new();
        for row in rows {
            identities.push(row?.hydrate()?);
        }
        Ok(identities)
    }

    /// # Errors
    /// Returns a storage error when the query fails.
    pub fn get_brand_identity(
        &self,
        id: &BrandIdentityId,
    ) -> Result<Option<BrandIdentity>, StoreError> {
        let row = self
            .conn
            .query_row(
                &format!("{SELECT_BRAND} WHERE id = ?1"),
                params![id.as_str()],
                BrandRow::from_row,
            )
            .optional()?;
        row.map(BrandRow::hydrate).transpose()
    }

    /// Apply a partial patch. Returns `None` when the id does not exist.
    ///
    /// # Errors
    /// Returns a storage error when the update fails.
    pub fn update_brand_identity(
        &mut self,
        id: &BrandIdentityId,
        update: BrandIdentityUpdate,
    ) -> Result<Option<BrandIdentity>, StoreError> {
        let Some(mut identity) = self.get_brand_identity(id)? else {
            return Ok(None);
        };
        if let Some(shop_name) = update.shop_name {
            identity.shop_name = shop_name;
        }
        if let Some(tagline) = update.tagline {
            identity.tagline = Some(tagline);
        }
        if let Some(about) = update.about {
            identity.about = Some(about);
        }
        if let Some(voice) = update.voice {
            identity.voice = Some(voice);
        }

        let now = now_rfc3339()?;
        self.conn.execute(
            "UPDATE brand_identities
             SET shop_name = ?2, tagline = ?3, about = ?4, voice = ?5, updated_at = ?6
             WHERE id = ?1",
            params![
                id.as_str(),
                identity.shop_name,
                identity.tagline,
                identity.about,
                identity.voice,
                now,
            ],
        )?;
        identity.updated_at = parse_rfc3339(&now)?;
        Ok(Some(identity))
    }

    /// # Errors
    /// Returns a storage error when the delete fails.
    pub fn delete_brand_identity(&mut self, id: &BrandIdentityId) -> Result<bool, StoreError> {
        let deleted = self
            .conn
            .execute("DELETE FROM brand_identities WHERE id = ?1", params![id.as_str()])?;
        Ok(deleted > 0)
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use atelier_core::{BrandIdentityUpdate, NewBrandIdentity};

    use crate::Store;

    fn sample() -> NewBrandIdentity {
        NewBrandIdentity {
            shop_name: "Linden & Loom".to_string(),
            tagline: Some("patterns with provenance".to_string()),
            about: None,
            voice: Some("warm, unhurried".to_string()),
        }
    }

    #[test]
    fn create_then_fetch_round_trips() -> Result<()> {
        let mut store = Store::open_in_memory()?;
        let created = store.create_brand_identity(sample())?;
        assert_eq!(store.get_brand_identity(&created.id)?.as_ref(), Some(&created));
        Ok(())
    }

    #[test]
    fn update_patches_only_given_fields() -> Result<()> {
        let mut store = Store::open_in_memory()?;
        let created = store.create_brand_identity(sample())?;

        let updated = store
            .update_brand_identity(
                &created.id,
                BrandIdentityUpdate {
                    about: Some("Hand-drawn patterns from a small studio.".to_string()),
                    ..BrandIdentityUpdate::default()
                },
            )?
            .ok_or_else(|| anyhow::anyhow!("identity should exist"))?;

        assert_eq!(updated.about.as_deref(), Some("Hand-drawn patterns from a small studio."));
        assert_eq!(updated.shop_name, created.shop_name);
        assert_eq!(updated.tagline, created.tagline);
        Ok(())
    }

    #[test]
    fn delete_reports_presence() -> Result<()> {
        let mut store = Store::open_in_memory()?;
        let created = store.create_brand_identity(sample())?;
        assert!(store.delete_brand_identity(&created.id)?);
        assert!(!store.delete_brand_identity(&created.id)?);
        Ok(())
    }
}
