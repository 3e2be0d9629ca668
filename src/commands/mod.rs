//! Command handlers for the CLI application.
//!
//! - `run`: the daemon (driver + control socket)
//! - `config`: print or initialize the config file
//! - `led`: LED switching through the daemon
//! - `query`: status, button, endpoint listing and simulated presses

pub mod config;
pub mod led;
pub mod query;
pub mod run;

use std::path::{Path, PathBuf};

use pressled::{Client, Config};

/// Load the config file (explicit path or the default location)
pub fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(Config::default_path);
    Config::load(&path)
}

/// Socket to talk to: `--socket`, then the config file, then the default
pub fn socket_path(config: Option<&Path>, socket: Option<&Path>) -> anyhow::Result<PathBuf> {
    match socket {
        Some(socket) => Ok(socket.to_path_buf()),
        None => Ok(load_config(config)?.socket_path()),
    }
}

/// Connect to the daemon
pub async fn connect(socket: &Path) -> anyhow::Result<Client> {
    Ok(Client::connect(socket).await?)
}
