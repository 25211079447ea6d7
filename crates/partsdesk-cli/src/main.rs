//! PartsDesk CLI
//!
//! Command-line client for the PartsDesk backend: session management and
//! list fetching with the resilient page decoder.

mod config;

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use config::CliConfig;
use partsdesk_client::{ApiClient, Credentials, PageSource, RouteFetcher};
use partsdesk_core::SessionStore;
use partsdesk_core::expiry::remaining_lifetime;
use partsdesk_observability::{Metrics, init_logging};
use partsdesk_session::FileSessionStore;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

#[derive(Parser)]
#[command(name = "partsdesk")]
#[command(about = "PartsDesk - inventory and service ticket client", long_about = None)]
struct Cli {
    /// Path to a YAML or TOML config file
    #[arg(long, global = true, env = "PARTSDESK_CONFIG")]
    config: Option<PathBuf>,

    /// Override the backend base URL
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// Override the log level
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Print Prometheus metrics to stderr when done
    #[arg(long, global = true, default_value = "false")]
    metrics: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in and persist the session
    Login {
        #[arg(long)]
        email: String,

        #[arg(long, env = "PARTSDESK_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Forget the persisted session
    Logout,
    /// Show the persisted session
    Status,
    /// Renew the session token if it is close to expiry
    Renew,
    /// Fetch a list endpoint and print its items as JSON
    Fetch {
        /// Route relative to the base URL, e.g. /repuestos
        path: String,

        /// Page to load
        #[arg(long, default_value = "1")]
        page: u32,

        #[arg(long, default_value = "20")]
        per_page: u32,

        /// Follow next pages until exhausted
        #[arg(long, default_value = "false")]
        all: bool,

        /// Page cap for --all
        #[arg(long, default_value = "50")]
        max_pages: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = CliConfig::load(cli.config.as_deref())?;
    if let Some(base_url) = cli.base_url {
        config.api.base_url = base_url;
    }
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }

    init_logging(&config.logging)
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    let session_path = config.session_path();
    debug!(path = %session_path.display(), "Opening session store");
    let store = Arc::new(
        FileSessionStore::open(&session_path)
            .with_context(|| format!("Failed to open session file {}", session_path.display()))?,
    );

    let metrics = Metrics::new().context("Failed to register metrics")?;
    let client = ApiClient::with_metrics(config.api.clone(), store.clone(), metrics.clone())?;

    match cli.command {
        Commands::Login { email, password } => {
            let session = client.login(&Credentials::new(email, password)).await?;
            println!(
                "Logged in as {} ({})",
                session.user_id.as_deref().unwrap_or("unknown user"),
                session.role.as_deref().unwrap_or("no role"),
            );
        }
        Commands::Logout => {
            client.logout()?;
            println!("Logged out");
        }
        Commands::Status => print_status(store.as_ref(), &client),
        Commands::Renew => {
            let outcome = client.renewal().extend_if_needed().await;
            println!("Renewal: {}", outcome.as_str());
        }
        Commands::Fetch {
            path,
            page,
            per_page,
            all,
            max_pages,
        } => {
            let source: PageSource<serde_json::Value, _> = PageSource::with_decoder(
                RouteFetcher::new(client.clone(), path).per_page(per_page),
                client.decoder().clone(),
            );

            let items = if all {
                source.load_all(page, max_pages).await?
            } else {
                let result = source.load(page).await?;
                if let Some(next) = result.next_key {
                    eprintln!("More results available: --page {}", next);
                }
                result.items
            };
            println!("{}", serde_json::to_string_pretty(&items)?);
        }
    }

    if cli.metrics {
        eprintln!("{}", metrics.gather_text()?);
    }

    Ok(())
}

fn print_status(store: &dyn SessionStore, client: &ApiClient) {
    let Some(session) = store.session().filter(|s| s.has_token()) else {
        println!("Not logged in");
        return;
    };

    println!("Logged in");
    println!("  user:    {}", session.user_id.as_deref().unwrap_or("-"));
    println!("  role:    {}", session.role.as_deref().unwrap_or("-"));
    if let Some(secondary) = session.secondary_id.as_deref() {
        println!("  linked:  {}", secondary);
    }
    match session.expires_at.as_deref() {
        Some(expires_at) => match remaining_lifetime(expires_at, Utc::now()) {
            Some(remaining) if remaining.num_seconds() > 0 => println!(
                "  expires: {} (in {} min)",
                expires_at,
                remaining.num_minutes()
            ),
            Some(_) => println!("  expires: {} (expired)", expires_at),
            None => println!("  expires: {} (unparseable)", expires_at),
        },
        None => println!("  expires: unknown"),
    }
    println!(
        "  renewal: {}",
        if client.renewal().needs_extension() {
            "due"
        } else {
            "not due"
        }
    );
}
