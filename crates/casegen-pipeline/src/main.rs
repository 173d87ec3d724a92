use std::path::PathBuf;
use std::sync::Arc;

use clap::{value_parser, Arg, ArgAction, Command};
use casegen_llm::{HttpProvider, ProviderConfig, TokenEndpoint};
use casegen_pipeline::{CasegenConfig, CasegenService};
use casegen_store::MemoryStore;
use casegen_validate::{CandidateTest, ValidationLevel, Validator};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Command::new("casegen")
        .version(casegen_pipeline::VERSION)
        .about("AI-assisted test-case generation pipeline")
        .arg_required_else_help(true)
        .subcommand(
            Command::new("serve")
                .about("Run the worker pool")
                .arg(
                    Arg::new("config")
                        .long("config")
                        .value_parser(value_parser!(PathBuf))
                        .help("Path to a TOML config file"),
                ),
        )
        .subcommand(
            Command::new("validate")
                .about("Validate a Python test file and print the result")
                .arg(
                    Arg::new("file")
                        .long("file")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("Path to the test source"),
                )
                .arg(
                    Arg::new("syntax-only")
                        .long("syntax-only")
                        .action(ArgAction::SetTrue)
                        .help("Run only the syntax layer"),
                ),
        )
        .subcommand(
            Command::new("config")
                .about("Print the effective configuration")
                .arg(
                    Arg::new("config")
                        .long("config")
                        .value_parser(value_parser!(PathBuf))
                        .help("Path to a TOML config file"),
                ),
        );

    match cli.get_matches().subcommand() {
        Some(("serve", args)) => {
            let config = CasegenConfig::load(
                args.get_one::<PathBuf>("config").map(PathBuf::as_path),
            )?;
            serve(config).await
        }
        Some(("validate", args)) => {
            let path = args.get_one::<PathBuf>("file").expect("required arg");
            let level = if args.get_flag("syntax-only") {
                ValidationLevel::Syntax
            } else {
                ValidationLevel::Full
            };
            validate_file(path, level).await
        }
        Some(("config", args)) => {
            let config = CasegenConfig::load(
                args.get_one::<PathBuf>("config").map(PathBuf::as_path),
            )?;
            println!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }
        _ => Ok(()),
    }
}

async fn serve(config: CasegenConfig) -> anyhow::Result<()> {
    let provider = Arc::new(HttpProvider::new(ProviderConfig {
        base_url: config.llm.base_url.clone(),
        embeddings_url: config.llm.embeddings_url.clone(),
        embedding_model: config.llm.embedding_model.clone(),
        token: match (
            config.llm.token_url.clone(),
            config.llm.key_id.clone(),
            config.llm.key_secret.clone(),
        ) {
            (Some(url), Some(key_id), Some(key_secret)) => Some(TokenEndpoint {
                url,
                key_id,
                key_secret,
            }),
            _ => None,
        },
    }));

    // A database-backed store would be wired here from config.db_url; the
    // in-memory store keeps single-node deployments self-contained.
    let store = Arc::new(MemoryStore::new());
    let driver = Arc::new(UnconfiguredDriver);

    let (_service, workers) = CasegenService::start(config, store, driver, provider);
    tracing::info!("casegen worker pool running, ctrl-c to stop");

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");
    drop(_service);
    workers.join().await;
    Ok(())
}

async fn validate_file(path: &std::path::Path, level: ValidationLevel) -> anyhow::Result<()> {
    let code = std::fs::read_to_string(path)?;
    let validator = Validator::new();
    let result = validator
        .validate_one(&CandidateTest::new("cli", code), level)
        .await?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

/// Placeholder driver for deployments without a browser sidecar
struct UnconfiguredDriver;

#[async_trait::async_trait]
impl casegen_recon::PageDriver for UnconfiguredDriver {
    async fn extract(
        &self,
        _url: &str,
        _timeout: std::time::Duration,
    ) -> Result<casegen_recon::PageStructure, casegen_recon::ReconError> {
        Err(casegen_recon::ReconError::Driver(
            "no page driver configured".to_string(),
        ))
    }
}
