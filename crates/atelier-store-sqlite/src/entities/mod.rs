//! Typed entity accessors on [`crate::Store`]. One module per entity; all
//! reads return entities ordered newest first (`created_at DESC, id ASC`).

mod brand;
mod listings;
mod patterns;
mod templates;
