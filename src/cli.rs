// CLI definitions using clap

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "pressled")]
#[command(author, version, about = "Multi-press GPIO button driving a bank of LEDs")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Config file path (default: ~/.config/pressled/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Control socket path (overrides the config file)
    #[arg(short, long, global = true)]
    pub socket: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    // === Daemon ===
    /// Run the driver and serve the control socket
    #[command(visible_alias = "serve")]
    Run {
        /// Use an in-memory GPIO chip instead of hardware
        #[arg(long)]
        simulate: bool,
    },

    // === LED Commands ===
    /// Switch one LED
    Led {
        /// LED index (0-based)
        index: usize,
        action: LedAction,
    },

    /// Switch every LED
    All { action: LedAction },

    // === Query Commands ===
    /// Show every LED and the button
    #[command(visible_alias = "st")]
    Status,

    /// Show the button status (consumes the pressed flag)
    Button {
        /// Reset the press session and turn all LEDs off
        #[arg(long)]
        reset: bool,
    },

    /// List control endpoints
    #[command(visible_alias = "ls")]
    Endpoints,

    // === Configuration ===
    /// Print the effective config, or write a default one with --init
    Config {
        /// Write the default config to the config path
        #[arg(long)]
        init: bool,

        /// Overwrite an existing file
        #[arg(long, requires = "init")]
        force: bool,
    },

    // === Simulation ===
    /// Tap the simulated button (daemon must run with --simulate)
    Press {
        /// Number of taps
        #[arg(short = 'n', long, default_value = "1")]
        times: u32,

        /// Delay between taps in milliseconds
        #[arg(long, default_value = "200")]
        interval_ms: u64,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum LedAction {
    On,
    Off,
    Toggle,
}

impl LedAction {
    /// Write token for this action
    pub fn token(self) -> &'static str {
        match self {
            LedAction::On => "1",
            LedAction::Off => "0",
            LedAction::Toggle => "t",
        }
    }
}
