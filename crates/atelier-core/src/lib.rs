use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use ulid::Ulid;

#[derive(Debug, Clone, thiserror::Error, Eq, PartialEq)]
pub enum DomainError {
    #[error("validation error: {0}")]
    Validation(String),
}

/// Identifiers are opaque TEXT: databases migrated from older releases carry
/// whatever ids they already had, while freshly created rows get ULIDs.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(transparent)]
pub struct PatternId(pub String);

impl PatternId {
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new().to_string())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for PatternId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for PatternId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for PatternId {
    fn from(raw: &str) -> Self {
        Self(raw.to_string())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(transparent)]
pub struct TemplateId(pub String);

impl TemplateId {
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new().to_string())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TemplateId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for TemplateId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for TemplateId {
    fn from(raw: &str) -> Self {
        Self(raw.to_string())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(transparent)]
pub struct ListingId(pub String);

impl ListingId {
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new().to_string())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ListingId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for ListingId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ListingId {
    fn from(raw: &str) -> Self {
        Self(raw.to_string())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(transparent)]
pub struct BrandIdentityId(pub String);

impl BrandIdentityId {
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new().to_string())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for BrandIdentityId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for BrandIdentityId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for BrandIdentityId {
    fn from(raw: &str) -> Self {
        Self(raw.to_string())
    }
}

/// How many patterns a product template is assembled from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PatternCount {
    One,
    Three,
    Five,
}

impl PatternCount {
    #[must_use]
    pub fn as_i64(self) -> i64 {
        match self {
            Self::One => 1,
            Self::Three => 3,
            Self::Five => 5,
        }
    }

    #[must_use]
    pub fn from_count(count: i64) -> Option<Self> {
        match count {
            1 => Some(Self::One),
            3 => Some(Self::Three),
            5 => Some(Self::Five),
            _ => None,
        }
    }
}

impl Display for PatternCount {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_i64())
    }
}

/// A reusable surface design, the unit everything else is assembled from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
    pub id: PatternId,
    pub name: String,
    pub style: Option<String>,
    pub colors: Vec<String>,
    pub tags: Vec<String>,
    pub image_path: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewPattern {
    pub name: String,
    pub style: Option<String>,
    pub colors: Vec<String>,
    pub tags: Vec<String>,
    pub image_path: Option<String>,
}

impl NewPattern {
    /// # Errors
    /// Returns a validation error when `name` is blank.
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.name.trim().is_empty() {
            return Err(DomainError::Validation(
                "pattern name must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Partial patch; `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PatternUpdate {
    pub name: Option<String>,
    pub style: Option<String>,
    pub colors: Option<Vec<String>>,
    pub tags: Option<Vec<String>>,
    pub image_path: Option<String>,
}

/// A sellable product shape: which product kinds it renders to and how many
/// patterns it consumes. Pattern links are optional metadata, not a hard
/// requirement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductTemplate {
    pub id: TemplateId,
    pub name: String,
    pub product_types: Vec<String>,
    pub number_of_items: PatternCount,
    pub description: Option<String>,
    pub pattern_ids: Vec<PatternId>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewProductTemplate {
    pub name: String,
    pub product_types: Vec<String>,
    pub number_of_items: PatternCount,
    pub description: Option<String>,
    pub pattern_ids: Vec<PatternId>,
}

impl NewProductTemplate {
    /// # Errors
    /// Returns a validation error when `name` is blank.
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.name.trim().is_empty() {
            return Err(DomainError::Validation(
                "product template name must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProductTemplateUpdate {
    pub name: Option<String>,
    pub product_types: Option<Vec<String>>,
    pub number_of_items: Option<PatternCount>,
    pub description: Option<String>,
}

/// A generated shop listing. Every listing references a product template and
/// at least one pattern; store reads enforce that invariant, so a hydrated
/// `Listing` always carries a resolvable template id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Listing {
    pub id: ListingId,
    pub product_template_id: TemplateId,
    pub title: String,
    pub description: Option<String>,
    pub price_cents: Option<i64>,
    pub tags: Vec<String>,
    pub pattern_ids: Vec<PatternId>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// Payload for listing generation, the only way listings come to exist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewListing {
    pub product_template_id: TemplateId,
    pub pattern_ids: Vec<PatternId>,
    pub title: String,
    pub description: Option<String>,
    pub price_cents: Option<i64>,
    pub tags: Vec<String>,
}

impl NewListing {
    /// # Errors
    /// Returns a validation error when `title` is blank.
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.title.trim().is_empty() {
            return Err(DomainError::Validation(
                "listing title must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Partial patch; pattern and template links are fixed at generation time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListingUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub price_cents: Option<i64>,
    pub tags: Option<Vec<String>>,
}

/// The shop's voice. No structural invariants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrandIdentity {
    pub id: BrandIdentityId,
    pub shop_name: String,
    pub tagline: Option<String>,
    pub about: Option<String>,
    pub voice: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewBrandIdentity {
    pub shop_name: String,
    pub tagline: Option<String>,
    pub about: Option<String>,
    pub voice: Option<String>,
}

impl NewBrandIdentity {
    /// # Errors
    /// Returns a validation error when `shop_name` is blank.
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.shop_name.trim().is_empty() {
            return Err(DomainError::Validation(
                "brand identity shop_name must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BrandIdentityUpdate {
    pub shop_name: Option<String>,
    pub tagline: Option<String>,
    pub about: Option<String>,
    pub voice: Option<String>,
}

/// Listing-creation pricing defaults.
///
/// Deliberately a standalone, named policy: migration and data synthesis
/// never price anything. Only operator-driven listing creation may fall
/// back to this value when no price is given.
pub mod pricing {
    pub const DEFAULT_PRICE_CENTS: i64 = 599;
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn minted_ids_are_ulids_and_distinct() {
        let a = PatternId::new();
        let b = PatternId::new();
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 26);
        assert!(Ulid::from_string(a.as_str()).is_ok());
    }

    #[test]
    fn legacy_ids_round_trip_untouched() {
        let id = ListingId::from("L1");
        assert_eq!(id.as_str(), "L1");
        assert_eq!(id.to_string(), "L1");

        let json = match serde_json::to_string(&id) {
            Ok(json) => json,
            Err(err) => panic!("listing id should serialize: {err}"),
        };
        assert_eq!(json, "\"L1\"");
    }

    #[test]
    fn pattern_count_maps_both_ways() {
        for count in [PatternCount::One, PatternCount::Three, PatternCount::Five] {
            assert_eq!(PatternCount::from_count(count.as_i64()), Some(count));
        }
        assert_eq!(PatternCount::from_count(0), None);
        assert_eq!(PatternCount::from_count(2), None);
        assert_eq!(PatternCount::from_count(-5), None);
    }

    #[test]
    fn blank_names_fail_validation() {
        let pattern = NewPattern {
            name: "  ".to_string(),
            ..NewPattern::default()
        };
        assert!(pattern.validate().is_err());

        let listing = NewListing {
            product_template_id: TemplateId::new(),
            pattern_ids: vec![PatternId::new()],
            title: String::new(),
            description: None,
            price_cents: None,
            tags: vec![],
        };
        assert!(listing.validate().is_err());

        let brand = NewBrandIdentity {
            shop_name: "\t".to_string(),
            ..NewBrandIdentity::default()
        };
        assert!(brand.validate().is_err());
    }

    #[test]
    fn listing_serializes_timestamps_as_rfc3339() {
        let listing = Listing {
            id: ListingId::from("L1"),
            product_template_id: TemplateId::from("T1"),
            title: "Test".to_string(),
            description: None,
            price_cents: Some(pricing::DEFAULT_PRICE_CENTS),
            tags: vec!["geometric".to_string()],
            pattern_ids: vec![PatternId::from("P1")],
            created_at: OffsetDateTime::UNIX_EPOCH,
            updated_at: OffsetDateTime::UNIX_EPOCH,
        };
        let value = match serde_json::to_value(&listing) {
            Ok(value) => value,
            Err(err) => panic!("listing should serialize: {err}"),
        };
        assert_eq!(value["created_at"], "1970-01-01T00:00:00Z");
        assert_eq!(value["price_cents"], 599);
    }

    proptest! {
        #[test]
        fn property_any_text_id_survives_serde(raw in ".{0,64}") {
            let id = PatternId(raw);
            let json = serde_json::to_string(&id);
            prop_assert!(json.is_ok());
            let back: Result<PatternId, _> =
                serde_json::from_str(&json.unwrap_or_else(|_| unreachable!()));
            prop_assert!(back.is_ok());
            prop_assert_eq!(back.unwrap_or_else(|_| unreachable!()), id);
        }
    }
}
