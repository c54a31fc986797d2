//! medallion CLI entry point

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use medallion::{
    commands::{
        cmd_changes, cmd_chunk, cmd_ingest, cmd_init, cmd_model_deploy, cmd_model_deployments,
        cmd_model_log, cmd_model_register, cmd_model_release, cmd_parse, cmd_rag_config, cmd_run,
        cmd_status, cmd_sync, format_deployment_message, load_chunk_counter, load_variants,
        print_changes,
        print_chunk_stats, print_deployments, print_ingest_stats, print_init, print_logged_chains,
        print_parse_stats, print_release, print_run_report, print_status, print_sync_report,
        InitOptions, RemoteServices,
    },
    config::Config,
    databricks::{VectorIndexService, WorkspaceClient},
    error::Result,
    progress::LogWriterFactory,
    tables::TableStore,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, error};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "medallion")]
#[command(version, about = "Bronze/silver/gold PDF pipeline for Databricks Vector Search", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, env = "MEDALLION_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Emit log lines as JSON
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file and create the table database
    Init {
        /// Force overwrite existing config
        #[arg(long)]
        force: bool,

        /// Workspace URL
        #[arg(long)]
        host: Option<String>,

        /// Unity Catalog catalog for the tables and the model
        #[arg(long)]
        catalog: Option<String>,

        /// Unity Catalog schema for the tables and the model
        #[arg(long)]
        schema: Option<String>,

        /// Source volume holding the PDF files
        #[arg(long)]
        volume: Option<String>,

        /// Vector Search endpoint hosting the index
        #[arg(long)]
        vector_search_endpoint: Option<String>,
    },

    /// Run the whole pipeline: ingest, parse, chunk, sync
    Run {
        /// Stop after writing the gold table
        #[arg(long)]
        skip_sync: bool,
    },

    /// Scan the source volume into the bronze table
    Ingest,

    /// Extract PDF text into the silver table
    Parse,

    /// Chunk parsed documents into the gold table
    Chunk,

    /// Sync (or create) the vector index over the gold table
    Sync,

    /// Show table, index and run status
    Status {
        /// Do not contact the workspace
        #[arg(long)]
        offline: bool,
    },

    /// Show the gold table's change feed
    Changes {
        /// Only changes after this table version
        #[arg(long, default_value = "0")]
        since: i64,
    },

    /// Print the vector search block for the chain configuration
    RagConfig,

    /// Log, register and deploy the chain model
    Model {
        #[command(subcommand)]
        action: ModelAction,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Subcommand)]
enum ModelAction {
    /// Log the chain to an MLflow run
    Log {
        /// JSON file with config variants, one run each
        #[arg(long)]
        variants: Option<PathBuf>,
    },

    /// Register a logged chain in Unity Catalog
    Register {
        /// Model URI of the logged chain (runs:/<run_id>/chain)
        #[arg(long)]
        model_uri: String,

        /// catalog.schema.model name (defaults to the config)
        #[arg(long)]
        name: Option<String>,
    },

    /// Deploy a registered model version
    Deploy {
        /// Model version to deploy
        #[arg(long)]
        version: String,

        /// catalog.schema.model name (defaults to the config)
        #[arg(long)]
        name: Option<String>,
    },

    /// List deployments of the model
    Deployments {
        /// catalog.schema.model name (defaults to the config)
        #[arg(long)]
        name: Option<String>,

        /// Only this model version
        #[arg(long)]
        version: Option<String>,
    },

    /// Log, register and deploy in one go
    Release,
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("{}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let registry = tracing_subscriber::registry().with(filter);
    if cli.log_json {
        registry
            .with(fmt::layer().json().with_writer(LogWriterFactory::default()))
            .init();
    } else {
        registry
            .with(fmt::layer().with_writer(LogWriterFactory::default()))
            .init();
    }

    if let Commands::Completions { shell } = cli.command {
        let mut cmd = Cli::command();
        generate(shell, &mut cmd, "medallion", &mut std::io::stdout());
        return Ok(());
    }

    if matches!(cli.command, Commands::Init { .. }) {
        return handle_init(cli).await;
    }

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Init { .. } | Commands::Completions { .. } => unreachable!(),

        Commands::Run { skip_sync } => {
            let counter = load_chunk_counter(&config).await?;
            let store = TableStore::open(&config.paths.db_file).await?;
            let report = if skip_sync {
                cmd_run(&config, &store, counter, None).await?
            } else {
                let client = WorkspaceClient::from_config(&config)?;
                let remote = RemoteServices {
                    index: &client,
                    serving: &client,
                };
                cmd_run(&config, &store, counter, Some(remote)).await?
            };
            output(cli.json, &report, print_run_report)?;
        }

        Commands::Ingest => {
            let store = TableStore::open(&config.paths.db_file).await?;
            let stats = cmd_ingest(&config, &store).await?;
            output(cli.json, &stats, print_ingest_stats)?;
        }

        Commands::Parse => {
            let store = TableStore::open(&config.paths.db_file).await?;
            let stats = cmd_parse(&config, &store).await?;
            output(cli.json, &stats, print_parse_stats)?;
        }

        Commands::Chunk => {
            let counter = load_chunk_counter(&config).await?;
            let store = TableStore::open(&config.paths.db_file).await?;
            let stats = cmd_chunk(&config, &store, counter).await?;
            output(cli.json, &stats, print_chunk_stats)?;
        }

        Commands::Sync => {
            let store = TableStore::open(&config.paths.db_file).await?;
            let client = WorkspaceClient::from_config(&config)?;
            let report = cmd_sync(&config, &store, &client).await?;
            output(cli.json, &report, print_sync_report)?;
        }

        Commands::Status { offline } => {
            let store = TableStore::open(&config.paths.db_file).await?;
            let client = if offline {
                None
            } else {
                match WorkspaceClient::from_config(&config) {
                    Ok(client) => Some(client),
                    Err(e) => {
                        debug!("Not checking the index: {}", e);
                        None
                    }
                }
            };
            let index = client.as_ref().map(|c| c as &dyn VectorIndexService);
            let status = cmd_status(&config, &store, index).await?;
            output(cli.json, &status, print_status)?;
        }

        Commands::Changes { since } => {
            let store = TableStore::open(&config.paths.db_file).await?;
            let changes = cmd_changes(&config, &store, since).await?;
            output(cli.json, &changes, |c| print_changes(c))?;
        }

        Commands::RagConfig => {
            let yaml = cmd_rag_config(&config)?;
            if cli.json {
                let value = serde_json::json!({ "rag_config": yaml });
                println!("{}", serde_json::to_string_pretty(&value)?);
            } else {
                println!("{}", yaml);
            }
        }

        Commands::Model { action } => {
            let client = WorkspaceClient::from_config(&config)?;
            handle_model(&config, &client, action, cli.json).await?;
        }
    }

    Ok(())
}

async fn handle_init(cli: Cli) -> Result<()> {
    let Commands::Init {
        force,
        host,
        catalog,
        schema,
        volume,
        vector_search_endpoint,
    } = cli.command
    else {
        unreachable!()
    };

    let config = cmd_init(InitOptions {
        config_path: resolve_config_path(cli.config.as_deref()),
        force,
        host,
        catalog,
        schema,
        volume,
        vector_search_endpoint,
    })
    .await?;
    print_init(&config);
    Ok(())
}

async fn handle_model(
    config: &Config,
    client: &WorkspaceClient,
    action: ModelAction,
    json: bool,
) -> Result<()> {
    let host = client.host_name().to_string();

    match action {
        ModelAction::Log { variants } => {
            let variants = match variants {
                Some(path) => load_variants(&path)?,
                None => Vec::new(),
            };
            let logged = cmd_model_log(config, client, &variants).await?;
            output(json, &logged, |l| print_logged_chains(l))?;
        }

        ModelAction::Register { model_uri, name } => {
            let registered = cmd_model_register(config, client, &model_uri, name.as_deref()).await?;
            output(json, &registered, |r| {
                println!("✓ Registered {} version {}", r.name, r.version)
            })?;
        }

        ModelAction::Deploy { version, name } => {
            let deployment = cmd_model_deploy(config, client, name.as_deref(), &version).await?;
            output(json, &deployment, |d| {
                println!("{}", format_deployment_message(d, &host))
            })?;
        }

        ModelAction::Deployments { name, version } => {
            let deployments =
                cmd_model_deployments(config, client, name.as_deref(), version.as_deref()).await?;
            output(json, &deployments, |d| print_deployments(d, &host))?;
        }

        ModelAction::Release => {
            let report = cmd_model_release(config, client).await?;
            output(json, &report, |r| print_release(r, &host))?;
        }
    }

    Ok(())
}

/// Print a command result as JSON or through its console printer
fn output<T: Serialize + ?Sized>(json: bool, value: &T, print: impl FnOnce(&T)) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        print(value);
    }
    Ok(())
}

fn resolve_config_path(path: Option<&Path>) -> PathBuf {
    match path {
        Some(path) if path.is_dir() => path.join("config.toml"),
        Some(path) => path.to_path_buf(),
        None => Config::default_config_path(),
    }
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    let config_path = resolve_config_path(path);

    if !config_path.exists() {
        eprintln!(
            "Config file not found: {}\nRun 'medallion init' first.",
            config_path.display()
        );
        std::process::exit(1);
    }

    Config::load(&config_path)
}
