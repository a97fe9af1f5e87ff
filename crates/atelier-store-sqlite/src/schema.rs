//! The target schema the engine converges toward, plus the per-table list of
//! columns that can be retrofitted onto legacy tables with `ALTER TABLE`.

pub const PATTERNS_DDL: &str = r"
CREATE TABLE IF NOT EXISTS patterns (
  id TEXT PRIMARY KEY,
  name TEXT NOT NULL,
  style TEXT,
  colors TEXT NOT NULL DEFAULT '[]',
  tags TEXT NOT NULL DEFAULT '[]',
  image_path TEXT,
  created_at TEXT NOT NULL,
  updated_at TEXT NOT NULL
);
";

/// `type` is a JSON list of product kinds. Earlier releases declared it as
/// `TEXT CHECK (type IN ('digital_download','printable','bundle'))`, which is
/// what the constraint probe looks for.
pub const PRODUCT_TEMPLATES_DDL: &str = r"
CREATE TABLE IF NOT EXISTS product_templates (
  id TEXT PRIMARY KEY,
  name TEXT NOT NULL,
  type TEXT NOT NULL DEFAULT '[]',
  number_of_items INTEGER NOT NULL DEFAULT 1,
  description TEXT,
  created_at TEXT NOT NULL,
  updated_at TEXT NOT NULL
);
";

pub const TEMPLATE_PATTERNS_DDL: &str = r"
CREATE TABLE IF NOT EXISTS template_patterns (
  template_id TEXT NOT NULL REFERENCES product_templates(id) ON DELETE CASCADE,
  pattern_id TEXT NOT NULL REFERENCES patterns(id) ON DELETE CASCADE,
  created_at TEXT NOT NULL,
  PRIMARY KEY (template_id, pattern_id)
);
";

/// `product_template_id` is nullable at the SQL level everywhere: legacy
/// tables cannot gain a NOT NULL column, and deleting a template clears the
/// reference so the listing drops out of gated reads instead of blocking the
/// delete. The one-template invariant is enforced by generation, synthesis,
/// and the read gate, not by a column constraint.
pub const LISTINGS_DDL: &str = r"
CREATE TABLE IF NOT EXISTS listings (
  id TEXT PRIMARY KEY,
  product_template_id TEXT REFERENCES product_templates(id) ON DELETE SET NULL,
  title TEXT NOT NULL,
  description TEXT,
  price_cents INTEGER,
  tags TEXT NOT NULL DEFAULT '[]',
  created_at TEXT NOT NULL,
  updated_at TEXT NOT NULL
);
";

pub const LISTING_PATTERNS_DDL: &str = r"
CREATE TABLE IF NOT EXISTS listing_patterns (
  listing_id TEXT NOT NULL REFERENCES listings(id) ON DELETE CASCADE,
  pattern_id TEXT NOT NULL REFERENCES patterns(id) ON DELETE CASCADE,
  created_at TEXT NOT NULL,
  PRIMARY KEY (listing_id, pattern_id)
);
";

pub const BRAND_IDENTITIES_DDL: &str = r"
CREATE TABLE IF NOT EXISTS brand_identities (
  id TEXT PRIMARY KEY,
  shop_name TEXT NOT NULL,
  tagline TEXT,
  about TEXT,
  voice TEXT,
  created_at TEXT NOT NULL,
  updated_at TEXT NOT NULL
);
";

/// Target tables with their DDL, parents before children so creation order
/// never dangles a foreign key.
pub const TARGET_TABLES: &[(&str, &str)] = &[
    ("patterns", PATTERNS_DDL),
    ("product_templates", PRODUCT_TEMPLATES_DDL),
    ("template_patterns", TEMPLATE_PATTERNS_DDL),
    ("listings", LISTINGS_DDL),
    ("listing_patterns", LISTING_PATTERNS_DDL),
    ("brand_identities", BRAND_IDENTITIES_DDL),
];

/// A column that may be retrofitted onto an existing table. The DDL fragment
/// is the `ALTER TABLE <table> ADD COLUMN` tail; NOT NULL columns carry a
/// constant default so the statement is legal on populated tables.
#[derive(Debug, Clone, Copy)]
pub struct AddableColumn {
    pub table: &'static str,
    pub column: &'static str,
    pub ddl: &'static str,
}

/// Columns legacy tables commonly lack, in apply order. Primary keys and
/// junction keys are never addable; tables missing those need a rebuild.
pub const ADDABLE_COLUMNS: &[AddableColumn] = &[
    AddableColumn { table: "patterns", column: "style", ddl: "style TEXT" },
    AddableColumn {
        table: "patterns",
        column: "colors",
        ddl: "colors TEXT NOT NULL DEFAULT '[]'",
    },
    AddableColumn { table: "patterns", column: "tags", ddl: "tags TEXT NOT NULL DEFAULT '[]'" },
    AddableColumn { table: "patterns", column: "image_path", ddl: "image_path TEXT" },
    AddableColumn {
        table: "patterns",
        column: "created_at",
        ddl: "created_at TEXT NOT NULL DEFAULT '1970-01-01T00:00:00Z'",
    },
    AddableColumn {
        table: "patterns",
        column: "updated_at",
        ddl: "updated_at TEXT NOT NULL DEFAULT '1970-01-01T00:00:00Z'",
    },
    AddableColumn {
        table: "product_templates",
        column: "number_of_items",
        ddl: "number_of_items INTEGER NOT NULL DEFAULT 1",
    },
    AddableColumn { table: "product_templates", column: "description", ddl: "description TEXT" },
    AddableColumn {
        table: "product_templates",
        column: "created_at",
        ddl: "created_at TEXT NOT NULL DEFAULT '1970-01-01T00:00:00Z'",
    },
    AddableColumn {
        table: "product_templates",
        column: "updated_at",
        ddl: "updated_at TEXT NOT NULL DEFAULT '1970-01-01T00:00:00Z'",
    },
    // Backfilled by column copy or synthesis after the column exists.
    AddableColumn {
        table: "listings",
        column: "product_template_id",
        ddl: "product_template_id TEXT",
    },
    AddableColumn { table: "listings", column: "description", ddl: "description TEXT" },
    AddableColumn { table: "listings", column: "price_cents", ddl: "price_cents INTEGER" },
    AddableColumn { table: "listings", column: "tags", ddl: "tags TEXT NOT NULL DEFAULT '[]'" },
    AddableColumn {
        table: "listings",
        column: "created_at",
        ddl: "created_at TEXT NOT NULL DEFAULT '1970-01-01T00:00:00Z'",
    },
    AddableColumn {
        table: "listings",
        column: "updated_at",
        ddl: "updated_at TEXT NOT NULL DEFAULT '1970-01-01T00:00:00Z'",
    },
    AddableColumn { table: "brand_identities", column: "tagline", ddl: "tagline TEXT" },
    AddableColumn { table: "brand_identities", column: "about", ddl: "about TEXT" },
    AddableColumn { table: "brand_identities", column: "voice", ddl: "voice TEXT" },
    AddableColumn {
        table: "brand_identities",
        column: "created_at",
        ddl: "created_at TEXT NOT NULL DEFAULT '1970-01-01T00:00:00Z'",
    },
    AddableColumn {
        table: "brand_identities",
        column: "updated_at",
        ddl: "updated_at TEXT NOT NULL DEFAULT '1970-01-01T00:00:00Z'",
    },
];

/// Suffix that marks a table as the pre-rebuild copy of its logical table.
/// Its presence on disk is the durable crash-recovery marker.
pub const BACKUP_SUFFIX: &str = "_old_backup";

#[must_use]
pub fn backup_name(table: &str) -> String {
    format!("{table}{BACKUP_SUFFIX}")
}

#[must_use]
pub fn ddl_for(table: &str) -> Option<&'static str> {
    TARGET_TABLES.iter().find(|(name, _)| *name == table).map(|(_, ddl)| *ddl)
}

/// Column names a table carries in its target shape, used to recognize an
/// already-rebuilt table during crash resume.
#[must_use]
pub fn target_columns(table: &str) -> Option<&'static [&'static str]> {
    match table {
        "patterns" => {
            Some(&["id", "name", "style", "colors", "tags", "image_path", "created_at", "updated_at"])
        }
        "product_templates" => {
            Some(&["id", "name", "type", "number_of_items", "description", "created_at", "updated_at"])
        }
        "template_patterns" => Some(&["template_id", "pattern_id", "created_at"]),
        "listings" => Some(&[
            "id",
            "product_template_id",
            "title",
            "description",
            "price_cents",
            "tags",
            "created_at",
            "updated_at",
        ]),
        "listing_patterns" => Some(&["listing_id", "pattern_id", "created_at"]),
        "brand_identities" => {
            Some(&["id", "shop_name", "tagline", "about", "voice", "created_at", "updated_at"])
        }
        _ => None,
    }
}
