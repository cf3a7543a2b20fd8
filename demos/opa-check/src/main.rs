//! Command-line probe for a running Open Policy Agent.
//!
//! The agent URL and bearer token come from `OPA_AGENT_URL` and
//! `OPA_AGENT_TOKEN` unless given on the command line.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use opa_client::{
    ClientConfig, DecisionClient, DecisionResult, HyperTransport, HyperTransportConfig, QueryFlags,
};
use serde_json::Value;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
#[command(name = "opa-check")]
struct Cli {
    /// Agent base URL; defaults to `OPA_AGENT_URL`.
    #[arg(long, global = true)]
    url: Option<String>,

    /// Bearer token; defaults to `OPA_AGENT_TOKEN`.
    #[arg(long, global = true)]
    token: Option<String>,

    /// Request timeout in seconds.
    #[arg(long, global = true, default_value_t = 30)]
    timeout: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the agent's build provenance.
    Version,
    /// Evaluate a policy document.
    Policy(PolicyArgs),
    /// Evaluate an ad-hoc query.
    Query(QueryArgs),
    /// Upload a JSON data document.
    PutData(UploadArgs),
    /// Upload a Rego module.
    PutPolicy(PutPolicyArgs),
}

#[derive(Args)]
struct FlagArgs {
    /// Ask for a full explanation trace.
    #[arg(long)]
    explain: bool,
    /// Ask for evaluation metrics.
    #[arg(long)]
    metrics: bool,
    /// Ask for instrumentation metrics.
    #[arg(long)]
    instrument: bool,
    /// Ask for build provenance.
    #[arg(long)]
    provenance: bool,
}

impl FlagArgs {
    fn flags(&self) -> QueryFlags {
        QueryFlags::new(self.explain, self.metrics, self.instrument, self.provenance)
    }
}

#[derive(Args)]
struct PolicyArgs {
    /// Policy path, e.g. `authz/allow`.
    name: String,
    /// JSON input document.
    #[arg(long, default_value = "{}")]
    input: String,
    #[command(flatten)]
    flags: FlagArgs,
}

#[derive(Args)]
struct QueryArgs {
    /// Rego query, e.g. `data.authz.allow == true`.
    query: String,
    /// JSON input document.
    #[arg(long, default_value = "{}")]
    input: String,
    #[command(flatten)]
    flags: FlagArgs,
}

#[derive(Args)]
struct UploadArgs {
    /// Document path on the agent.
    name: String,
    /// File holding the content to upload.
    file: PathBuf,
}

#[derive(Args)]
struct PutPolicyArgs {
    #[command(flatten)]
    upload: UploadArgs,
    /// Ask for compile metrics.
    #[arg(long)]
    metrics: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let client = connect(&cli)?;

    match cli.command {
        Commands::Version => {
            let provenance = client.agent_version().await?;
            println!("{}", serde_json::to_string_pretty(&provenance)?);
        }
        Commands::Policy(args) => {
            let input = parse_input(&args.input)?;
            let decision = client.policy(&args.name, &input, args.flags.flags()).await?;
            print_decision(&decision)?;
        }
        Commands::Query(args) => {
            let input = parse_input(&args.input)?;
            let decision = client.query(&args.query, &input, args.flags.flags()).await?;
            print_decision(&decision)?;
        }
        Commands::PutData(args) => {
            let content = read_file(&args.file)?;
            client.data_update(&args.name, content).await?;
            info!(name = %args.name, "data document uploaded");
        }
        Commands::PutPolicy(args) => {
            let content = read_file(&args.upload.file)?;
            let metrics = client
                .policy_update(&args.upload.name, content, args.metrics)
                .await?;
            info!(name = %args.upload.name, "policy module uploaded");
            if !metrics.is_empty() {
                println!("{}", serde_json::to_string_pretty(&metrics)?);
            }
        }
    }

    Ok(())
}

fn connect(cli: &Cli) -> Result<DecisionClient> {
    let mut config = match &cli.url {
        Some(url) => ClientConfig::new(url)?,
        None => ClientConfig::from_env()?,
    };
    if let Some(token) = &cli.token {
        config = config.with_token(token.clone());
    }

    let transport = HyperTransport::new(
        HyperTransportConfig::default().with_timeout(Duration::from_secs(cli.timeout)),
    );
    Ok(DecisionClient::with_transport(config, Arc::new(transport))?)
}

fn parse_input(raw: &str) -> Result<Value> {
    serde_json::from_str(raw).context("input is not valid JSON")
}

fn read_file(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))
}

fn print_decision(decision: &DecisionResult) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(decision)?);
    Ok(())
}
