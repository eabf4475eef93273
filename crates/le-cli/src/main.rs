use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use le_client::IngressClient;
use le_core::LectureId;
use le_db::Database;
use tracing_subscriber::EnvFilter;

use le_cli::commands::{infer, replay, serve, stats, status};
use le_cli::{Cli, Commands, Config};

/// Open the configured database, ensuring the parent directory exists.
fn open_database(config: &Config) -> Result<Database> {
    if let Some(parent) = config.database_path.parent() {
        std::fs::create_dir_all(parent).context("failed to create database directory")?;
    }
    Database::open(&config.database_path).with_context(|| {
        format!(
            "failed to open database {}",
            config.database_path.display()
        )
    })
}

fn parse_lecture_id(value: &str) -> Result<LectureId> {
    LectureId::new(value).with_context(|| format!("invalid lecture id {value:?}"))
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load_from(cli.config.as_deref()).context("failed to load configuration")?;

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level))
    };
    // Use try_init to avoid panic if tracing is already initialized (e.g., in tests)
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
    tracing::debug!(?config, "loaded configuration");

    let mut stdout = std::io::stdout().lock();
    match cli.command {
        Some(Commands::Serve { bind }) => serve::run(&config, bind)?,
        Some(Commands::Stats { lecture_id, json }) => {
            let lecture_id = parse_lecture_id(&lecture_id)?;
            let db = open_database(&config)?;
            stats::run(&mut stdout, &db, &lecture_id, json)?;
        }
        Some(Commands::Status) => {
            let db = open_database(&config)?;
            status::run(&mut stdout, &db, &config.database_path)?;
        }
        Some(Commands::Replay { trace, post }) => {
            if post {
                let client = IngressClient::new(
                    &config.client.ingress_url,
                    config.client.api_token.clone(),
                    config.client.timeout(),
                )
                .context("invalid ingress client configuration")?;
                replay::run(
                    &mut stdout,
                    &trace,
                    config.viewer,
                    replay::Target::Ingress(client),
                )?;
            } else {
                let mut db = open_database(&config)?;
                replay::run(
                    &mut stdout,
                    &trace,
                    config.viewer,
                    replay::Target::Local {
                        db: &mut db,
                        path: &config.database_path,
                        limits: config.limits,
                    },
                )?;
            }
        }
        Some(Commands::Infer { frame, lecture_id }) => {
            let lecture_id = parse_lecture_id(&lecture_id)?;
            infer::run(&mut stdout, &config, &frame, &lecture_id)?;
        }
        None => {
            Cli::command().print_help()?;
        }
    }

    Ok(())
}
