use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{ArgAction, Args, Parser, Subcommand};
use entity_schema_codegen::{
    CodegenConfig, EntityFile, FileWriter, WriteOutcome, generate_data_context, generate_dtos,
    generate_entities, load_metadata,
};
use entity_schema_core::{EntityRegistry, Schema, validate_schema};
use entity_schema_sqlite::{ColumnMetadata, DbContext, MetadataStore, NoSeed, TableMetadata};
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG: &str = "entity-schema.yml";

/// Output format for metadata listings.
#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum CliOutputFormat {
    Json,
    Yaml,
    Table,
}

#[derive(Debug, Parser)]
#[command(name = "entity-sync")]
#[command(about = "SQLite schema sync, metadata inspection and code generation for entity schemas")]
struct Cli {
    /// Generator and connection settings (YAML). Defaults apply if missing.
    #[arg(long, global = true, default_value = DEFAULT_CONFIG)]
    config: PathBuf,
    /// Increase log verbosity (-v info, -vv debug, -vvv trace). RUST_LOG overrides.
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Create missing tables, record metadata and track the schema version.
    Sync(SyncArgs),
    /// Check an entity declaration file without touching a database.
    Validate(EntitiesArgs),
    /// Print the persisted column mappings of a database.
    Metadata(MetadataArgs),
    /// Print the schema version history of a database.
    Versions(VersionsArgs),
    /// Generate entity structs from a database's persisted metadata.
    GenEntities(GenEntitiesArgs),
    /// Generate DTO structs from an entity declaration file.
    GenDtos(GenDtosArgs),
    /// Generate the data context from an entity declaration file.
    GenContext(GenContextArgs),
}

#[derive(Debug, Args)]
struct EntitiesArgs {
    /// Entity declaration file (YAML, or JSON with a .json extension).
    #[arg(long)]
    entities: PathBuf,
}

#[derive(Debug, Args)]
struct SyncArgs {
    #[command(flatten)]
    entities: EntitiesArgs,
    /// Database file path.
    #[arg(long)]
    db: PathBuf,
}

#[derive(Debug, Args)]
struct MetadataArgs {
    /// Database file path.
    #[arg(long)]
    db: PathBuf,
    /// Output format.
    #[arg(long, default_value = "table")]
    format: CliOutputFormat,
}

#[derive(Debug, Args)]
struct VersionsArgs {
    /// Database file path.
    #[arg(long)]
    db: PathBuf,
    /// Maximum number of versions to show, most recent first.
    #[arg(long, default_value_t = 20)]
    limit: usize,
}

#[derive(Debug, Args)]
struct OutputArgs {
    /// Generated file path.
    #[arg(long)]
    output: PathBuf,
    /// Overwrite the file even if it was edited by hand.
    #[arg(long)]
    force: bool,
}

#[derive(Debug, Args)]
struct GenEntitiesArgs {
    /// Database file path.
    #[arg(long)]
    db: PathBuf,
    #[command(flatten)]
    output: OutputArgs,
}

#[derive(Debug, Args)]
struct GenDtosArgs {
    #[command(flatten)]
    entities: EntitiesArgs,
    #[command(flatten)]
    output: OutputArgs,
    /// Comma-separated entities to generate (default: all).
    #[arg(long)]
    only: Option<String>,
    /// Module that DTOs outside --only are imported from.
    #[arg(long)]
    external_module: Option<String>,
}

#[derive(Debug, Args)]
struct GenContextArgs {
    #[command(flatten)]
    entities: EntitiesArgs,
    #[command(flatten)]
    output: OutputArgs,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = CodegenConfig::load_or_default(&cli.config)
        .map_err(|e| format!("Failed to load config '{}': {e}", cli.config.display()))
        .and_then(|config| match cli.command {
            Command::Sync(args) => run_sync(&config, args),
            Command::Validate(args) => run_validate(args),
            Command::Metadata(args) => run_metadata(&config, args),
            Command::Versions(args) => run_versions(&config, args),
            Command::GenEntities(args) => run_gen_entities(&config, args),
            Command::GenDtos(args) => run_gen_dtos(&config, args),
            Command::GenContext(args) => run_gen_context(&config, args),
        });

    if let Err(err) = result {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

// ---------------------------------------------------------------------------
// schema commands
// ---------------------------------------------------------------------------

fn run_sync(config: &CodegenConfig, args: SyncArgs) -> Result<(), String> {
    let schema = load_schema(&args.entities.entities)?;
    let db = DbContext::open(&args.db, Arc::new(schema), config.context_config())
        .map_err(|e| format!("Failed to open database '{}': {e}", args.db.display()))?;
    let report = db
        .sync_schema(&NoSeed)
        .map_err(|e| format!("Schema sync failed: {e}"))?;

    println!(
        "Synced {} tables into '{}'.",
        report.tables.len(),
        args.db.display()
    );
    println!("  Tables: {}", report.tables.join(", "));
    println!("  Metadata rows: {}", report.metadata_rows);
    println!("  Entities hash: {}", report.entities_hash);
    match report.version {
        Some(version) => println!("  Recorded version {version}"),
        None => println!("  Schema unchanged; no version recorded"),
    }
    Ok(())
}

fn run_validate(args: EntitiesArgs) -> Result<(), String> {
    let schema = load_schema(&args.entities)?;
    let errors = validate_schema(&schema);
    if errors.is_empty() {
        println!(
            "{}: {} entities valid",
            args.entities.display(),
            schema.len()
        );
        return Ok(());
    }
    for err in &errors {
        eprintln!("  {err}");
    }
    Err(format!(
        "{}: {} validation error(s)",
        args.entities.display(),
        errors.len()
    ))
}

fn run_metadata(config: &CodegenConfig, args: MetadataArgs) -> Result<(), String> {
    let metadata = load_metadata(&args.db, config.context_config()).map_err(|e| e.to_string())?;
    let rendered = match args.format {
        CliOutputFormat::Json => serde_json::to_string_pretty(&metadata)
            .map_err(|e| format!("Failed to serialize metadata: {e}"))?,
        CliOutputFormat::Yaml => serde_yaml::to_string(&metadata)
            .map_err(|e| format!("Failed to serialize metadata: {e}"))?,
        CliOutputFormat::Table => format_metadata_table(&metadata),
    };
    println!("{}", rendered.trim_end());
    Ok(())
}

fn run_versions(config: &CodegenConfig, args: VersionsArgs) -> Result<(), String> {
    let db = open_existing(&args.db, config)?;
    let versions = db
        .schema_versions(args.limit)
        .map_err(|e| format!("Failed to read versions: {e}"))?;
    if versions.is_empty() {
        println!("No schema versions recorded in '{}'.", args.db.display());
        return Ok(());
    }
    println!("{:<8} {:<14} {:<28} ENTITIES", "VERSION", "HASH", "APPLIED AT");
    for v in versions {
        let short: String = v.entities_hash.chars().take(12).collect();
        println!(
            "{:<8} {:<14} {:<28} {}",
            v.version, short, v.applied_at, v.entity_count
        );
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// generate commands
// ---------------------------------------------------------------------------

fn run_gen_entities(config: &CodegenConfig, args: GenEntitiesArgs) -> Result<(), String> {
    let metadata = load_metadata(&args.db, config.context_config()).map_err(|e| e.to_string())?;
    let store = MetadataStore::new(config.prefix.clone()).map_err(|e| e.to_string())?;
    write_generated(&generate_entities(&metadata, &store), config, &args.output)
}

fn run_gen_dtos(config: &CodegenConfig, args: GenDtosArgs) -> Result<(), String> {
    let schema = load_valid_schema(&args.entities.entities)?;
    let mut opts = config.dto_options();
    opts.entities = args.only.map(|raw| parse_csv_list(&raw));
    if let Some(module) = args.external_module {
        opts.external_module = module;
    }
    write_generated(&generate_dtos(&schema, &opts), config, &args.output)
}

fn run_gen_context(config: &CodegenConfig, args: GenContextArgs) -> Result<(), String> {
    let schema = load_valid_schema(&args.entities.entities)?;
    write_generated(&generate_data_context(&schema), config, &args.output)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn load_schema(path: &Path) -> Result<Schema, String> {
    EntityFile::load(path)
        .and_then(|file| file.resolve())
        .map_err(|e| format!("Failed to load entities '{}': {e}", path.display()))
}

/// Loads a schema for generation, refusing one that a sync would reject.
fn load_valid_schema(path: &Path) -> Result<Schema, String> {
    let schema = load_schema(path)?;
    match validate_schema(&schema).first() {
        None => Ok(schema),
        Some(err) => Err(format!("{}: {err}", path.display())),
    }
}

fn open_existing(path: &Path, config: &CodegenConfig) -> Result<DbContext, String> {
    if !path.exists() {
        return Err(format!("Database '{}' does not exist", path.display()));
    }
    let schema = EntityRegistry::new()
        .resolve()
        .map_err(|e| format!("Failed to build empty schema: {e}"))?;
    DbContext::open(path, Arc::new(schema), config.context_config())
        .map_err(|e| format!("Failed to open database '{}': {e}", path.display()))
}

fn write_generated(
    writer: &FileWriter,
    config: &CodegenConfig,
    args: &OutputArgs,
) -> Result<(), String> {
    let outcome = writer
        .write_file(&args.output, &config.cache_dir, args.force)
        .map_err(|e| format!("Failed to write '{}': {e}", args.output.display()))?;
    match outcome {
        WriteOutcome::Written => {
            println!("{} generated at '{}'.", writer.name(), args.output.display());
        }
        WriteOutcome::Skipped => println!(
            "Skipped '{}': modified by hand. Use --force to overwrite.",
            args.output.display()
        ),
    }
    Ok(())
}

fn format_metadata_table(metadata: &TableMetadata) -> String {
    let mut out = String::new();
    for (table, columns) in metadata {
        out.push_str(table);
        out.push('\n');
        for column in columns {
            out.push_str(&format!(
                "  {:<20} {:<10} {}\n",
                column.column_name,
                column.field_type.name(),
                column_flags(column)
            ));
        }
    }
    out
}

fn column_flags(column: &ColumnMetadata) -> String {
    let mut flags = Vec::new();
    if column.is_primary_key {
        flags.push("PK".to_string());
    }
    if !column.is_nullable {
        flags.push("NOT NULL".to_string());
    }
    if let (Some(table), Some(col)) = (&column.foreign_table, &column.foreign_column) {
        flags.push(format!("-> {table}.{col}"));
    }
    if let Some(back) = &column.back_populates {
        flags.push(format!("(back_populates {back})"));
    }
    if let Some(default) = &column.default_value {
        flags.push(format!("DEFAULT {default}"));
    }
    flags.join(" ")
}

fn parse_csv_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}
