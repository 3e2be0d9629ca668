//! pressled CLI
//!
//! `pressled run` starts the daemon; every other command talks to it over
//! the control socket.

use std::process::ExitCode;

use clap::Parser;

mod cli;
use cli::{Cli, Commands};

mod commands;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            // --help / --version go to stdout and exit 0, usage errors exit 1
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    // Initialize logging
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match dispatch(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn dispatch(cli: Cli) -> anyhow::Result<()> {
    let Cli {
        config,
        socket,
        command,
        ..
    } = cli;
    let socket_path = || commands::socket_path(config.as_deref(), socket.as_deref());

    match command {
        // === Daemon ===
        Commands::Run { simulate } => {
            commands::run::run(config.as_deref(), socket.as_deref(), simulate).await
        }

        // === LED Commands ===
        Commands::Led { index, action } => commands::led::led(&socket_path()?, index, action).await,
        Commands::All { action } => commands::led::all(&socket_path()?, action).await,

        // === Query Commands ===
        Commands::Status => commands::query::status(&socket_path()?).await,
        Commands::Button { reset } => commands::query::button(&socket_path()?, reset).await,
        Commands::Endpoints => commands::query::endpoints(&socket_path()?).await,

        // === Configuration ===
        Commands::Config { init, force } => {
            let path = config.clone().unwrap_or_else(pressled::Config::default_path);
            if init {
                commands::config::init(&path, force)
            } else {
                commands::config::show(&path)
            }
        }

        // === Simulation ===
        Commands::Press { times, interval_ms } => {
            commands::query::press(&socket_path()?, times, interval_ms).await
        }
    }
}
