//! To-do API client
//!
//! Command-line front end over the authenticated session:
//! 1. Loads config (flags > env > `todo-client.toml` > defaults)
//! 2. Opens the per-origin session file
//! 3. Runs one subcommand through the session manager, which attaches the
//!    bearer token and refreshes it on a 401
//! 4. Exits 0 on success, 1 on any surfaced failure

mod commands;
mod config;
mod forms;
mod metrics;
mod navigator;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use common::Secret;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use todo_auth::{Endpoints, Registration, SessionStore};
use todo_session::SessionManager;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::commands::Outcome;
use crate::config::Config;
use crate::navigator::TerminalNavigator;

#[derive(Parser, Debug)]
#[command(name = "todo", version, about = "To-do API client with a persistent login")]
struct Cli {
    /// Config file (default: CONFIG_PATH, then ./todo-client.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// API base URL, overriding TODO_API_URL and the config file
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// Print session metrics to stderr in Prometheus text format on exit
    #[arg(long, global = true)]
    print_metrics: bool,

    /// Log as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Log in and store the session
    Login {
        #[arg(long)]
        username: Option<String>,
        /// Read the password from the first line of stdin
        #[arg(long)]
        password_stdin: bool,
    },
    /// Create an account and store its session
    Register {
        #[arg(long, default_value = "")]
        first_name: String,
        #[arg(long, default_value = "")]
        last_name: String,
        #[arg(long, default_value = "")]
        username: String,
        #[arg(long, default_value = "")]
        email: String,
        /// Read the password from the first line of stdin
        #[arg(long)]
        password_stdin: bool,
    },
    /// Show the dashboard greeting for the logged-in user
    Dashboard,
    /// Forget the stored session
    Logout,
    /// Show whether a session is stored and when its access token expires
    Status,
}

fn init_tracing(json: bool) {
    // CLI output stays clean unless LOG_LEVEL / RUST_LOG ask for more
    let filter = EnvFilter::try_from_env("LOG_LEVEL")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
            .init();
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    match run(cli).await {
        Ok(outcome) => outcome.into(),
        Err(e) => {
            error!(error = %e, "command failed");
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<Outcome> {
    // Install before the session manager emits anything
    let prometheus = if cli.print_metrics {
        Some(metrics::install_recorder().context("failed to install Prometheus recorder")?)
    } else {
        None
    };

    let source = Config::resolve_path(cli.config.as_deref());
    debug!(path = %source.path.display(), explicit = source.explicit, "loading configuration");
    let mut config = Config::load(&source)
        .with_context(|| format!("failed to load config from {}", source.path.display()))?;
    config
        .override_base_url(cli.base_url)
        .context("invalid --base-url")?;

    let endpoints = Endpoints::new(&config.api.base_url).context("invalid API base URL")?;
    let store_path = config.store_path()?;
    let store = SessionStore::open(store_path.clone(), endpoints.origin())
        .await
        .with_context(|| format!("failed to open session file {}", store_path.display()))?;
    info!(
        base_url = %endpoints.base(),
        store = %store_path.display(),
        timeout_secs = config.api.timeout_secs,
        "configuration loaded"
    );

    let client = reqwest::Client::builder()
        .timeout(config.timeout())
        .build()
        .context("failed to build HTTP client")?;
    let session = SessionManager::new(
        client,
        endpoints,
        Arc::new(store),
        Arc::new(TerminalNavigator::new()),
    );

    let mut out = io::stdout();
    let outcome = match cli.command {
        Command::Login {
            username,
            password_stdin,
        } => {
            commands::announce_expired_session(&session, &mut out).await?;
            let username = match username {
                Some(username) => username,
                None => prompt_line("Username")?,
            };
            let password = read_password(password_stdin)?;
            commands::login(&session, &username, &password, &mut out).await?
        }
        Command::Register {
            first_name,
            last_name,
            username,
            email,
            password_stdin,
        } => {
            let password = read_password(password_stdin)?;
            let registration = Registration {
                first_name,
                last_name,
                username,
                email,
                password: password.expose().clone(),
            };
            commands::register(&session, &registration, &mut out).await?
        }
        Command::Dashboard => commands::dashboard(&session, &mut out).await?,
        Command::Logout => commands::logout(&session, &mut out).await?,
        Command::Status => commands::status(&session, unix_now(), &mut out).await?,
    };

    if let Some(handle) = prometheus {
        eprint!("{}", handle.render());
    }
    Ok(outcome)
}

/// Read one line from stdin after printing `label`.
fn prompt_line(label: &str) -> Result<String> {
    print!("{label}: ");
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .with_context(|| format!("failed to read {label}"))?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

fn read_password(from_stdin: bool) -> Result<Secret<String>> {
    let password = if from_stdin {
        let mut line = String::new();
        io::stdin()
            .lock()
            .read_line(&mut line)
            .context("failed to read password from stdin")?;
        line.trim_end_matches(['\r', '\n']).to_string()
    } else {
        rpassword::prompt_password("Password: ").context("failed to read password")?
    };
    Ok(Secret::new(password))
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
