use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use atelier_core::{
    pricing, BrandIdentityUpdate, ListingId, ListingUpdate, NewBrandIdentity, NewListing,
    NewPattern, NewProductTemplate, PatternCount, PatternId, PatternUpdate, TemplateId,
};
use atelier_store_sqlite::Store;
use clap::{Args, Parser, Subcommand};
use serde_json::Value;

#[derive(Debug, Parser)]
#[command(name = "atelier")]
#[command(about = "Atelier catalog CLI")]
struct Cli {
    #[arg(long, env = "ATELIER_DB", default_value = "./atelier.sqlite3")]
    db: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    Db {
        #[command(subcommand)]
        command: DbCommand,
    },
    Pattern {
        #[command(subcommand)]
        command: Box<PatternCommand>,
    },
    Template {
        #[command(subcommand)]
        command: Box<TemplateCommand>,
    },
    Listing {
        #[command(subcommand)]
        command: Box<ListingCommand>,
    },
    Brand {
        #[command(subcommand)]
        command: Box<BrandCommand>,
    },
}

#[derive(Debug, Subcommand)]
enum DbCommand {
    Migrate(DbMigrateArgs),
    Status,
}

#[derive(Debug, Args)]
struct DbMigrateArgs {
    #[arg(long, default_value_t = false)]
    dry_run: bool,
}

#[derive(Debug, Subcommand)]
enum PatternCommand {
    Add(PatternAddArgs),
    List,
    Show(IdArg),
    Update(PatternUpdateArgs),
    Remove(IdArg),
}

#[derive(Debug, Args)]
struct PatternAddArgs {
    #[arg(long)]
    name: String,
    #[arg(long)]
    style: Option<String>,
    #[arg(long = "color")]
    colors: Vec<String>,
    #[arg(long = "tag")]
    tags: Vec<String>,
    #[arg(long)]
    image_path: Option<String>,
}

#[derive(Debug, Args)]
struct PatternUpdateArgs {
    #[arg(long)]
    id: String,
    #[arg(long)]
    name: Option<String>,
    #[arg(long)]
    style: Option<String>,
    #[arg(long = "color")]
    colors: Option<Vec<String>>,
    #[arg(long = "tag")]
    tags: Option<Vec<String>>,
    #[arg(long)]
    image_path: Option<String>,
}

#[derive(Debug, Args)]
struct IdArg {
    #[arg(long)]
    id: String,
}

#[derive(Debug, Subcommand)]
enum TemplateCommand {
    Add(TemplateAddArgs),
    List,
    Show(IdArg),
    Remove(IdArg),
}

#[derive(Debug, Args)]
struct TemplateAddArgs {
    #[arg(long)]
    name: String,
    #[arg(long = "product-type")]
    product_types: Vec<String>,
    /// Number of patterns the template consumes: 1, 3, or 5.
    #[arg(long, default_value_t = 1)]
    number_of_items: i64,
    #[arg(long)]
    description: Option<String>,
    #[arg(long = "pattern-id")]
    pattern_ids: Vec<String>,
}

#[derive(Debug, Subcommand)]
enum ListingCommand {
    Generate(ListingGenerateArgs),
    List,
    Show(IdArg),
    Update(ListingUpdateArgs),
    Remove(IdArg),
}

#[derive(Debug, Args)]
struct ListingGenerateArgs {
    #[arg(long)]
    template_id: String,
    #[arg(long = "pattern-id")]
    pattern_ids: Vec<String>,
    #[arg(long)]
    title: String,
    #[arg(long)]
    description: Option<String>,
    /// Defaults to the standard listing price when omitted.
    #[arg(long)]
    price_cents: Option<i64>,
    #[arg(long = "tag")]
    tags: Vec<String>,
}

#[derive(Debug, Args)]
struct ListingUpdateArgs {
    #[arg(long)]
    id: String,
    #[arg(long)]
    title: Option<String>,
    #[arg(long)]
    description: Option<String>,
    #[arg(long)]
    price_cents: Option<i64>,
    #[arg(long = "tag")]
    tags: Option<Vec<String>>,
}

#[derive(Debug, Subcommand)]
enum BrandCommand {
    Set(BrandSetArgs),
    Show,
}

#[derive(Debug, Args)]
struct BrandSetArgs {
    #[arg(long)]
    shop_name: String,
    #[arg(long)]
    tagline: Option<String>,
    #[arg(long)]
    about: Option<String>,
    #[arg(long)]
    voice: Option<String>,
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

fn emit_json(value: Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

fn to_json<T: serde::Serialize>(value: &T, what: &str) -> Result<Value> {
    serde_json::to_value(value).with_context(|| format!("failed to serialize {what}"))
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    match cli.command {
        Command::Db { command } => run_db(command, &cli.db),
        Command::Pattern { command } => {
            let mut store = open_store(&cli.db)?;
            run_pattern(*command, &mut store)
        }
        Command::Template { command } => {
            let mut store = open_store(&cli.db)?;
            run_template(*command, &mut store)
        }
        Command::Listing { command } => {
            let mut store = open_store(&cli.db)?;
            run_listing(*command, &mut store)
        }
        Command::Brand { command } => {
            let mut store = open_store(&cli.db)?;
            run_brand(*command, &mut store)
        }
    }
}

fn open_store(db: &std::path::Path) -> Result<Store> {
    Store::open(db).with_context(|| format!("failed to open store at {}", db.display()))
}

fn run_db(command: DbCommand, db: &std::path::Path) -> Result<()> {
    match command {
        DbCommand::Migrate(args) => {
            if args.dry_run {
                let preview = Store::preview(db)
                    .with_context(|| format!("failed to inspect {}", db.display()))?;
                return emit_json(serde_json::json!({
                    "dry_run": true,
                    "would_apply": preview.actions,
                }));
            }

            let store = open_store(db)?;
            emit_json(serde_json::json!({
                "dry_run": false,
                "report": to_json(store.boot_report(), "boot report")?,
            }))
        }
        DbCommand::Status => {
            let preview =
                Store::preview(db).with_context(|| format!("failed to inspect {}", db.display()))?;
            emit_json(serde_json::json!({
                "tables": preview.tables,
                "backup_tables": preview.backup_tables,
                "pending_actions": preview.actions,
                "up_to_date": preview.actions.is_empty(),
            }))
        }
    }
}

fn run_pattern(command: PatternCommand, store: &mut Store) -> Result<()> {
    match command {
        PatternCommand::Add(args) => {
            let pattern = store.create_pattern(NewPattern {
                name: args.name,
                style: args.style,
                colors: args.colors,
                tags: args.tags,
                image_path: args.image_path,
            })?;
            emit_json(to_json(&pattern, "pattern")?)
        }
        PatternCommand::List => {
            let patterns = store.list_patterns()?;
            emit_json(serde_json::json!({ "patterns": patterns }))
        }
        PatternCommand::Show(args) => {
            let pattern = store
                .get_pattern(&PatternId::from(args.id.as_str()))?
                .ok_or_else(|| anyhow!("pattern not found: {}", args.id))?;
            emit_json(to_json(&pattern, "pattern")?)
        }
        PatternCommand::Update(args) => {
            let pattern = store
                .update_pattern(
                    &PatternId::from(args.id.as_str()),
                    PatternUpdate {
                        name: args.name,
                        style: args.style,
                        colors: args.colors,
                        tags: args.tags,
                        image_path: args.image_path,
                    },
                )?
                .ok_or_else(|| anyhow!("pattern not found: {}", args.id))?;
            emit_json(to_json(&pattern, "pattern")?)
        }
        PatternCommand::Remove(args) => {
            let removed = store.delete_pattern(&PatternId::from(args.id.as_str()))?;
            emit_json(serde_json::json!({ "id": args.id, "removed": removed }))
        }
    }
}

fn run_template(command: TemplateCommand, store: &mut Store) -> Result<()> {
    match command {
        TemplateCommand::Add(args) => {
            let number_of_items = PatternCount::from_count(args.number_of_items)
                .ok_or_else(|| anyhow!("--number-of-items must be 1, 3, or 5"))?;
            let template = store.create_template(NewProductTemplate {
                name: args.name,
                product_types: args.product_types,
                number_of_items,
                description: args.description,
                pattern_ids: args
                    .pattern_ids
                    .iter()
                    .map(|id| PatternId::from(id.as_str()))
                    .collect(),
            })?;
            emit_json(to_json(&template, "product template")?)
        }
        TemplateCommand::List => {
            let templates = store.list_templates()?;
            emit_json(serde_json::json!({ "templates": templates }))
        }
        TemplateCommand::Show(args) => {
            let template = store
                .get_template(&TemplateId::from(args.id.as_str()))?
                .ok_or_else(|| anyhow!("template not found: {}", args.id))?;
            emit_json(to_json(&template, "product template")?)
        }
        TemplateCommand::Remove(args) => {
            let removed = store.delete_template(&TemplateId::from(args.id.as_str()))?;
            emit_json(serde_json::json!({ "id": args.id, "removed": removed }))
        }
    }
}

fn run_listing(command: ListingCommand, store: &mut Store) -> Result<()> {
    match command {
        ListingCommand::Generate(args) => {
            let listing = store.generate_listing(NewListing {
                product_template_id: TemplateId::from(args.template_id.as_str()),
                pattern_ids: args
                    .pattern_ids
                    .iter()
                    .map(|id| PatternId::from(id.as_str()))
                    .collect(),
                title: args.title,
                description: args.description,
                price_cents: Some(args.price_cents.unwrap_or(pricing::DEFAULT_PRICE_CENTS)),
                tags: args.tags,
            })?;
            emit_json(to_json(&listing, "listing")?)
        }
        ListingCommand::List => {
            let listings = store.list_listings()?;
            emit_json(serde_json::json!({ "listings": listings }))
        }
        ListingCommand::Show(args) => {
            let listing = store
                .get_listing(&ListingId::from(args.id.as_str()))?
                .ok_or_else(|| anyhow!("listing not found: {}", args.id))?;
            emit_json(to_json(&listing, "listing")?)
        }
        ListingCommand::Update(args) => {
            let listing = store
                .update_listing(
                    &ListingId::from(args.id.as_str()),
                    ListingUpdate {
                        title: args.title,
                        description: args.description,
                        price_cents: args.price_cents,
                        tags: args.tags,
                    },
                )?
                .ok_or_else(|| anyhow!("listing not found: {}", args.id))?;
            emit_json(to_json(&listing, "listing")?)
        }
        ListingCommand::Remove(args) => {
            let removed = store.delete_listing(&ListingId::from(args.id.as_str()))?;
            emit_json(serde_json::json!({ "id": args.id, "removed": removed }))
        }
    }
}

fn run_brand(command: BrandCommand, store: &mut Store) -> Result<()> {
    match command {
        BrandCommand::Set(args) => {
            // One identity per shop: update the existing row when present.
            let existing = store.list_brand_identities()?.into_iter().next();
            let identity = match existing {
                Some(identity) => store
                    .update_brand_identity(
                        &identity.id,
                        BrandIdentityUpdate {
                            shop_name: Some(args.shop_name),
                            tagline: args.tagline,
                            about: args.about,
                            voice: args.voice,
                        },
                    )?
                    .ok_or_else(|| anyhow!("brand identity vanished during update"))?,
                None => store.create_brand_identity(NewBrandIdentity {
                    shop_name: args.shop_name,
                    tagline: args.tagline,
                    about: args.about,
                    voice: args.voice,
                })?,
            };
            emit_json(to_json(&identity, "brand identity")?)
        }
        BrandCommand::Show => {
            let identity = store
                .list_brand_identities()?
                .into_iter()
                .next()
                .ok_or_else(|| anyhow!("no brand identity set"))?;
            emit_json(to_json(&identity, "brand identity")?)
        }
    }
}
