mod codes;
mod db;
mod ipc;
mod ledger;
mod registry;
mod schedule;
mod settings;
mod stats;

use anyhow::Context;
use clap::Parser;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::settings::Settings;

/// Make-up class attendance sidecar. Reads one JSON request per line on stdin
/// and writes one JSON response per line on stdout.
#[derive(Parser, Debug)]
#[command(version)]
struct Cli {
    /// Settings file (TOML). Defaults to an optional `makeupd.toml` in the working directory.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Workspace directory to open at startup, overriding the settings file.
    #[arg(long)]
    workspace: Option<PathBuf>,
}

fn env_bool(name: &str, default: bool) -> bool {
    match std::env::var(name) {
        Ok(v) => matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        Err(_) => default,
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // stdout belongs to the protocol.
    if env_bool("MAKEUPD_LOG_JSON", false) {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
            .init();
    }
}

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing();

    let settings = Settings::load(cli.config.as_deref()).context("load settings")?;
    let startup_workspace = cli.workspace.clone().or_else(|| settings.workspace.clone());
    let mut state = ipc::AppState::new(settings);

    if let Some(path) = startup_workspace {
        ipc::open_workspace(&mut state, path).context("open workspace")?;
    }

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(error = %e, "stdin closed");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let resp = match serde_json::from_str::<ipc::Request>(&line) {
            Ok(req) => ipc::handle_request(&mut state, req),
            Err(e) => {
                tracing::warn!(error = %e, "unparseable request line");
                ipc::err("", "bad_json", e.to_string(), None)
            }
        };

        writeln!(stdout, "{}", resp).context("write response")?;
        stdout.flush().context("flush response")?;
    }

    Ok(())
}
