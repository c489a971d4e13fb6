//! bunqlink CLI - set up and drive a signed bunq API session
//!
//! Configuration comes from the environment (a `.env` file is loaded when
//! present). Credentials persist in a JSON file, by default under the user's
//! config directory.
//!
//! # Quick Start
//!
//! ```bash
//! export BUNQ_API_KEY=sandbox_...
//! bunqlink setup
//! bunqlink request get user
//! bunqlink status
//! bunqlink logout
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use bunqlink_client::{BunqClient, BunqConfig, Environment, FileStore, Method, SessionOrchestrator};

mod commands;
mod display;

use commands::{request, session};

/// bunqlink CLI - bunq API trust setup and signed requests
#[derive(Parser)]
#[command(name = "bunqlink")]
#[command(author = "bunqlink Contributors")]
#[command(version)]
#[command(about = "Installation, device registration and signed sessions for the bunq API", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// bunq environment (overrides BUNQ_ENVIRONMENT)
    #[arg(long, short, global = true)]
    environment: Option<Environment>,

    /// Credential file (default: <config dir>/bunqlink/credentials.json)
    #[arg(long, global = true, env = "BUNQLINK_STORE")]
    store: Option<PathBuf>,

    /// More log output (-v info, -vv debug); RUST_LOG takes precedence
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run installation, device registration and session creation from scratch
    Setup,

    /// Open a new session on the stored installation
    Refresh,

    /// Show what is stored, without contacting bunq
    Status,

    /// Delete the session remotely and forget every stored credential
    Logout,

    /// Send a signed request with the stored session
    Request {
        /// HTTP method
        #[arg(value_enum)]
        method: HttpMethod,

        /// Path relative to the API base URL, e.g. `user` or `user/1/monetary-account`
        path: String,

        /// JSON body (inline, or @file)
        #[arg(short, long)]
        data: Option<String>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
}

impl From<HttpMethod> for Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::Get => Method::Get,
            HttpMethod::Post => Method::Post,
            HttpMethod::Put => Method::Put,
            HttpMethod::Delete => Method::Delete,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut config = BunqConfig::from_env().map_err(anyhow::Error::msg)?;
    if let Some(environment) = cli.environment {
        config.environment = environment;
    }

    let store_path = match cli.store {
        Some(path) => path,
        None => FileStore::default_path().context("No config directory; pass --store")?,
    };
    tracing::debug!(path = %store_path.display(), environment = %config.environment, "Using credential store");

    let store = Arc::new(FileStore::new(&store_path));
    let client = BunqClient::new(config)?;
    let orchestrator = SessionOrchestrator::new(client, store);

    display::banner(orchestrator.config());

    let result = match cli.command {
        Commands::Setup => session::setup(&orchestrator).await,
        Commands::Refresh => session::refresh(&orchestrator).await,
        Commands::Status => session::status(&orchestrator, &store_path).await,
        Commands::Logout => session::logout(&orchestrator).await,
        Commands::Request { method, path, data } => {
            request::send(&orchestrator, method.into(), &path, data.as_deref()).await
        }
    };

    if let Err(err) = result {
        display::error(&format!("{:#}", err));
        println!();
        std::process::exit(1);
    }
    Ok(())
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .init();
}

/// Fail with every configuration problem at once
pub(crate) fn require_valid(config: &BunqConfig) -> anyhow::Result<()> {
    if let Err(problems) = config.validate() {
        for problem in &problems {
            display::warning(problem);
        }
        anyhow::bail!("{}", problems.join("; "));
    }
    Ok(())
}
