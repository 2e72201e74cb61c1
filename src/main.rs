use std::error::Error;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process;

use clap::{Args, Parser, Subcommand, ValueEnum};
use serde_json::Value;

use hasconf::apply::Applier;
use hasconf::client::GatewayClient;
use hasconf::config::AppConfig;
use hasconf::emit;
use hasconf::resolve;
use hasconf::schema::{self, SourceKind};
use hasconf::store::{
    ConfigStore, DEFAULT_BASE_METADATA_PATH, DEFAULT_CONFIG_DIR, DEFAULT_METADATA_PATH,
};

#[derive(Parser)]
#[command(name = "hasconf", about = "Hasura configuration tool for use with SQD indexers")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze the schema and write a fresh set of Hasura configuration
    /// calls that track all available tables and foreign key relationships
    Regenerate(RegenerateArgs),
    /// Apply the generated configuration calls to the Hasura endpoint
    Apply(ApplyArgs),
}

#[derive(Args)]
struct RegenerateArgs {
    /// Where to read schema facts from
    #[arg(long, value_enum, default_value_t = SourceArg::Live)]
    from: SourceArg,
    /// Output presentation
    #[arg(long, value_enum, default_value_t = StyleArg::Incremental)]
    style: StyleArg,
    /// Declarative model manifest (static source only)
    #[arg(long, default_value = "model.json")]
    model: PathBuf,
    /// Base metadata document to merge into (declarative style only)
    #[arg(long, default_value = DEFAULT_BASE_METADATA_PATH)]
    base: PathBuf,
    /// Output directory (incremental style)
    #[arg(long, default_value = DEFAULT_CONFIG_DIR)]
    out_dir: PathBuf,
    /// Output document (declarative style)
    #[arg(long, default_value = DEFAULT_METADATA_PATH)]
    out_file: PathBuf,
    /// Also emit a default read permission per table
    #[arg(long, action = clap::ArgAction::SetTrue)]
    with_permissions: bool,
    /// Overwrite existing output without confirmation
    #[arg(long, action = clap::ArgAction::SetTrue)]
    force: bool,
}

#[derive(Args)]
struct ApplyArgs {
    #[arg(long, value_enum, default_value_t = StyleArg::Incremental)]
    style: StyleArg,
    #[arg(long, default_value = DEFAULT_CONFIG_DIR)]
    out_dir: PathBuf,
    #[arg(long, default_value = DEFAULT_METADATA_PATH)]
    out_file: PathBuf,
}

#[derive(Clone, Copy, ValueEnum)]
enum SourceArg {
    /// Read the declarative model manifest
    Static,
    /// Introspect the live database through Hasura
    Live,
}

#[derive(Clone, Copy, ValueEnum)]
enum StyleArg {
    /// A directory of individually numbered operation files
    Incremental,
    /// One replace-metadata document
    Declarative,
}

#[tokio::main]
async fn main() {
    // Init structured logging (respects RUST_LOG; defaults to info)
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    // Load .env if present
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let cfg = match AppConfig::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("FATAL: {e}");
            process::exit(1);
        }
    };

    let outcome = match cli.command {
        Commands::Regenerate(args) => regenerate(&cfg, args).await,
        Commands::Apply(args) => apply(&cfg, args).await,
    };

    if let Err(e) = outcome {
        eprintln!("error: {e}");
        process::exit(1);
    }
}

async fn regenerate(cfg: &AppConfig, args: RegenerateArgs) -> Result<(), Box<dyn Error>> {
    let store = match args.style {
        StyleArg::Incremental => ConfigStore::Directory(args.out_dir.clone()),
        StyleArg::Declarative => ConfigStore::Document(args.out_file.clone()),
    };

    if store.has_output() && !args.force && !confirm_overwrite(store.path())? {
        tracing::info!("keeping existing configuration");
        return Ok(());
    }

    let kind = match args.from {
        SourceArg::Static => SourceKind::Static,
        SourceArg::Live => SourceKind::Live,
    };
    let source = schema::create_source(kind, cfg, &args.model)?;

    let tables = source.list_tables().await?;
    let constraints = source.list_constraints().await?;
    let relationships = resolve::resolve(&constraints)?;
    tracing::info!(
        tables = tables.len(),
        relationships = relationships.len(),
        "resolved schema"
    );

    // Everything is computed before the store is touched, so a failed run
    // never leaves partial output behind.
    match args.style {
        StyleArg::Incremental => {
            let ops = emit::emit_operations(cfg, &tables, &relationships, args.with_permissions);
            store.clear()?;
            for op in &ops {
                store.write_operation(op)?;
            }
            tracing::info!(
                operations = ops.len(),
                dir = %store.path().display(),
                "wrote configuration"
            );
        }
        StyleArg::Declarative => {
            let raw = fs::read_to_string(&args.base).map_err(|e| {
                format!(
                    "cannot read base metadata document {}: {e}",
                    args.base.display()
                )
            })?;
            let base: Value = serde_json::from_str(&raw).map_err(|e| {
                format!(
                    "malformed base metadata document {}: {e}",
                    args.base.display()
                )
            })?;
            let doc = emit::emit_metadata_document(cfg, &tables, &relationships, &base)?;
            store.clear()?;
            store.write_document(&doc)?;
            tracing::info!(path = %store.path().display(), "wrote metadata document");
        }
    }

    Ok(())
}

async fn apply(cfg: &AppConfig, args: ApplyArgs) -> Result<(), Box<dyn Error>> {
    let store = match args.style {
        StyleArg::Incremental => ConfigStore::Directory(args.out_dir),
        StyleArg::Declarative => ConfigStore::Document(args.out_file),
    };

    let operations = store.read_all()?;
    if operations.is_empty() {
        tracing::warn!("nothing to apply; run `hasconf regenerate` first");
        return Ok(());
    }

    let client = GatewayClient::new(cfg)?;
    let applier = Applier::new(&client);
    let result = applier.apply(&operations).await;
    tracing::info!(
        applied = result.applied,
        failed = result.failures.len(),
        "apply finished"
    );

    if !result.is_success() {
        return Err(format!(
            "{} of {} operations failed",
            result.failures.len(),
            operations.len()
        )
        .into());
    }
    Ok(())
}

/// Ask before clobbering existing output; declining is a clean no-op.
fn confirm_overwrite(path: &Path) -> Result<bool, io::Error> {
    print!("{} already exists, overwrite? [y/N] ", path.display());
    io::stdout().flush()?;
    let mut answer = String::new();
    io::stdin().read_line(&mut answer)?;
    Ok(matches!(answer.trim(), "y" | "Y" | "yes"))
}
