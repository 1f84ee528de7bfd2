//! Operator probe for the dispatch layer
//!
//! `hearth-probe health` prints the health snapshot after a registry load;
//! `hearth-probe call <service> <path>` issues one GET and prints the
//! response envelope. Both write JSON to stdout.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use hearth_infra::observability::{init_tracing, LogFormat};
use hearth_infra::{config, DispatchContext, RequestOptions};

#[derive(Parser)]
#[command(name = "hearth-probe")]
#[command(version, about = "Inspect and exercise the Hearth dispatch layer", long_about = None)]
struct Cli {
    /// Config file (defaults to probing hearth.toml / config.toml)
    #[arg(short = 'c', long = "config", value_name = "PATH", global = true)]
    config: Option<std::path::PathBuf>,

    /// Log output format: pretty or json
    #[arg(long = "log-format", default_value = "pretty", global = true)]
    log_format: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load the registry and print breaker, limiter and directory state
    Health,

    /// Call one service with GET and print the response
    Call {
        /// Service name, e.g. weather
        service: String,

        /// Request path, e.g. /current
        path: String,

        /// Query parameter as key=value (repeatable)
        #[arg(long = "param", value_name = "KEY=VALUE")]
        params: Vec<String>,

        /// Session id to charge the call to
        #[arg(long)]
        session: Option<String>,

        /// Request timeout in milliseconds
        #[arg(long = "timeout-ms")]
        timeout_ms: Option<u64>,
    },
}

fn parse_param(raw: &str) -> Result<(String, String)> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => bail!("invalid --param '{raw}', expected KEY=VALUE"),
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("serialize output")?;
    println!("{rendered}");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format.parse::<LogFormat>()?)?;

    let dispatch_config = match cli.config {
        Some(path) => {
            let mut loaded = config::load_from_file(Some(path))?;
            config::apply_env_overrides(&mut loaded)?;
            loaded
        }
        None => config::load()?,
    };

    let context = DispatchContext::new(dispatch_config)?;
    context.start().await;

    match cli.command {
        Commands::Health => {
            print_json(&context.client.get_health_status())?;
        }
        Commands::Call { service, path, params, session, timeout_ms } => {
            let mut options = RequestOptions::new();
            for raw in &params {
                let (key, value) = parse_param(raw)?;
                options = options.param(key, value);
            }
            if let Some(session) = session {
                options = options.session(session);
            }
            if let Some(ms) = timeout_ms {
                options = options.timeout(Duration::from_millis(ms));
            }

            let response = context.client.get(&service, &path, options).await;
            print_json(&response)?;
        }
    }

    context.shutdown();
    Ok(())
}
