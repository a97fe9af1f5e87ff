use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::Value;

fn unique_temp_dir(prefix: &str) -> PathBuf {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_else(|err| panic!("clock should be >= UNIX_EPOCH: {err}"))
        .as_nanos();
    let dir = std::env::temp_dir().join(format!("{prefix}-{now}"));
    fs::create_dir_all(&dir)
        .unwrap_or_else(|err| panic!("failed to create temp dir {}: {err}", dir.display()));
    dir
}

fn run_atelier<I, S>(args: I) -> Output
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    Command::new(env!("CARGO_BIN_EXE_atelier"))
        .args(args)
        .output()
        .unwrap_or_else(|err| panic!("failed to execute atelier binary: {err}"))
}

fn run_json<I, S>(args: I) -> Value
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let output = run_atelier(args);
    if !output.status.success() {
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        panic!(
            "atelier command failed (status={}):\nstdout:\n{}\nstderr:\n{}",
            output.status, stdout, stderr
        );
    }

    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
    serde_json::from_str(&stdout)
        .unwrap_or_else(|err| panic!("stdout is not valid JSON: {err}\nstdout:\n{stdout}"))
}

fn as_i64(value: &Value, key: &str) -> i64 {
    value
        .get(key)
        .and_then(Value::as_i64)
        .unwrap_or_else(|| panic!("missing integer field `{key}` in payload: {value}"))
}

fn as_str<'a>(value: &'a Value, key: &str) -> &'a str {
    value
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_else(|| panic!("missing string field `{key}` in payload: {value}"))
}

fn path_str(path: &Path) -> &str {
    path.to_str().unwrap_or_else(|| panic!("path should be valid UTF-8: {}", path.display()))
}

#[test]
fn migrate_on_fresh_database_then_status_is_up_to_date() {
    let dir = unique_temp_dir("atelier-cli-migrate");
    let db = dir.join("atelier.sqlite3");

    let migrated = run_json(["--db", path_str(&db), "db", "migrate"]);
    assert_eq!(migrated["dry_run"], Value::Bool(false));
    let planned = migrated["report"]["planned"]
        .as_array()
        .unwrap_or_else(|| panic!("planned should be an array: {migrated}"));
    assert!(!planned.is_empty());

    let status = run_json(["--db", path_str(&db), "db", "status"]);
    assert_eq!(status["up_to_date"], Value::Bool(true));
    let tables = status["tables"]
        .as_array()
        .unwrap_or_else(|| panic!("tables should be an array: {status}"));
    assert!(tables.iter().any(|name| name == "listings"));
}

#[test]
fn dry_run_plans_without_applying() {
    let dir = unique_temp_dir("atelier-cli-dry-run");
    let db = dir.join("atelier.sqlite3");

    let first = run_json(["--db", path_str(&db), "db", "migrate", "--dry-run"]);
    assert_eq!(first["dry_run"], Value::Bool(true));
    let would_apply = first["would_apply"]
        .as_array()
        .unwrap_or_else(|| panic!("would_apply should be an array: {first}"));
    assert!(!would_apply.is_empty());

    // Nothing was applied: a second dry run sees the same pending plan.
    let second = run_json(["--db", path_str(&db), "db", "migrate", "--dry-run"]);
    assert_eq!(first["would_apply"], second["would_apply"]);
}

#[test]
fn pattern_crud_round_trips() {
    let dir = unique_temp_dir("atelier-cli-pattern");
    let db = dir.join("atelier.sqlite3");
    let db = path_str(&db);

    let created = run_json([
        "--db", db, "pattern", "add", "--name", "Rose Trellis", "--style", "art nouveau",
        "--color", "crimson", "--color", "sage", "--tag", "floral",
    ]);
    let id = as_str(&created, "id").to_string();
    assert_eq!(as_str(&created, "name"), "Rose Trellis");

    let shown = run_json(["--db", db, "pattern", "show", "--id", &id]);
    assert_eq!(shown["colors"], serde_json::json!(["crimson", "sage"]));

    let updated =
        run_json(["--db", db, "pattern", "update", "--id", &id, "--name", "Rose Lattice"]);
    assert_eq!(as_str(&updated, "name"), "Rose Lattice");
    assert_eq!(updated["colors"], shown["colors"]);

    let listed = run_json(["--db", db, "pattern", "list"]);
    let patterns = listed["patterns"]
        .as_array()
        .unwrap_or_else(|| panic!("patterns should be an array: {listed}"));
    assert_eq!(patterns.len(), 1);

    let removed = run_json(["--db", db, "pattern", "remove", "--id", &id]);
    assert_eq!(removed["removed"], Value::Bool(true));

    let output = run_atelier(["--db", db, "pattern", "show", "--id", &id]);
    assert!(!output.status.success());
}

#[test]
fn listing_generation_applies_default_price_and_requires_patterns() {
    let dir = unique_temp_dir("atelier-cli-listing");
    let db = dir.join("atelier.sqlite3");
    let db = path_str(&db);

    let pattern = run_json(["--db", db, "pattern", "add", "--name", "Meadow"]);
    let pattern_id = as_str(&pattern, "id").to_string();

    let template = run_json([
        "--db", db, "template", "add", "--name", "Art Print", "--product-type", "printable",
        "--pattern-id", &pattern_id,
    ]);
    let template_id = as_str(&template, "id").to_string();
    assert_eq!(template["number_of_items"], serde_json::json!("one"));

    let listing = run_json([
        "--db", db, "listing", "generate", "--template-id", &template_id, "--pattern-id",
        &pattern_id, "--title", "Meadow Art Print", "--tag", "wall-art",
    ]);
    assert_eq!(as_i64(&listing, "price_cents"), 599);
    assert_eq!(as_str(&listing, "product_template_id"), template_id);

    // Generation without any pattern is refused.
    let output = run_atelier([
        "--db", db, "listing", "generate", "--template-id", &template_id, "--title", "Bare",
    ]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("missing dependency"), "unexpected stderr: {stderr}");
}

#[test]
fn deleting_a_template_hides_its_listings() {
    let dir = unique_temp_dir("atelier-cli-gate");
    let db = dir.join("atelier.sqlite3");
    let db = path_str(&db);

    let pattern = run_json(["--db", db, "pattern", "add", "--name", "Fern"]);
    let pattern_id = as_str(&pattern, "id").to_string();
    let template = run_json(["--db", db, "template", "add", "--name", "Stickers"]);
    let template_id = as_str(&template, "id").to_string();
    let listing = run_json([
        "--db", db, "listing", "generate", "--template-id", &template_id, "--pattern-id",
        &pattern_id, "--title", "Fern Stickers",
    ]);
    let listing_id = as_str(&listing, "id").to_string();

    run_json(["--db", db, "template", "remove", "--id", &template_id]);

    let listed = run_json(["--db", db, "listing", "list"]);
    let listings = listed["listings"]
        .as_array()
        .unwrap_or_else(|| panic!("listings should be an array: {listed}"));
    assert!(listings.is_empty());

    let output = run_atelier(["--db", db, "listing", "show", "--id", &listing_id]);
    assert!(!output.status.success());
}

#[test]
fn brand_set_is_create_then_update() {
    let dir = unique_temp_dir("atelier-cli-brand");
    let db = dir.join("atelier.sqlite3");
    let db = path_str(&db);

    let created = run_json([
        "--db", db, "brand", "set", "--shop-name", "Linden & Loom", "--tagline",
        "patterns with provenance",
    ]);
    let first_id = as_str(&created, "id").to_string();

    let updated = run_json(["--db", db, "brand", "set", "--shop-name", "Linden & Loom Studio"]);
    assert_eq!(as_str(&updated, "id"), first_id);
    assert_eq!(as_str(&updated, "shop_name"), "Linden & Loom Studio");
    // Fields not passed to a later `set` are kept.
    assert_eq!(as_str(&updated, "tagline"), "patterns with provenance");

    let shown = run_json(["--db", db, "brand", "show"]);
    assert_eq!(as_str(&shown, "shop_name"), "Linden & Loom Studio");
}
