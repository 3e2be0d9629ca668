//! Daemon configuration file
//!
//! Stored as TOML at `~/.config/pressled/config.toml`. Every field has a
//! default, so a missing file or a partial one both work.

use std::path::{Path, PathBuf};
use std::time::Duration;

use pressled_core::{ButtonLine, DriverConfig, LedLine};
use serde::{Deserialize, Serialize};

const SOCKET_NAME: &str = "pressled.sock";

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// GPIO chip name or device path
    pub chip: String,
    /// Control socket path (default: `$XDG_RUNTIME_DIR/pressled.sock`)
    pub socket: Option<PathBuf>,
    /// Consumer label for acquired lines
    pub consumer: String,
    pub timing: TimingConfig,
    pub button: ButtonConfig,
    pub leds: Vec<LedConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub debounce_ms: u64,
    pub multi_press_timeout_ms: u64,
    pub max_presses: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ButtonConfig {
    pub line: u32,
    pub active_low: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedConfig {
    pub name: String,
    pub line: u32,
}

impl Default for TimingConfig {
    fn default() -> Self {
        let driver = DriverConfig::default();
        Self {
            debounce_ms: driver.debounce.as_millis() as u64,
            multi_press_timeout_ms: driver.multi_press_timeout.as_millis() as u64,
            max_presses: driver.max_presses,
        }
    }
}

impl Default for ButtonConfig {
    fn default() -> Self {
        let button = DriverConfig::default().button;
        Self {
            line: button.offset,
            active_low: button.active_low,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let driver = DriverConfig::default();
        Self {
            chip: "gpiochip0".to_string(),
            socket: None,
            consumer: driver.consumer.clone(),
            timing: TimingConfig::default(),
            button: ButtonConfig::default(),
            leds: driver
                .leds
                .iter()
                .map(|l| LedConfig {
                    name: l.name.clone(),
                    line: l.offset,
                })
                .collect(),
        }
    }
}

impl Config {
    /// Get the default config file path
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("pressled")
            .join("config.toml")
    }

    /// Default control socket path
    pub fn default_socket_path() -> PathBuf {
        dirs::runtime_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join(SOCKET_NAME)
    }

    /// Load config from a file, or return default if not found
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Config = toml::from_str(&content)
                .map_err(|e| anyhow::anyhow!("{}: {}", path.display(), e))?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save config to a file
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Socket path, falling back to the default
    pub fn socket_path(&self) -> PathBuf {
        self.socket.clone().unwrap_or_else(Self::default_socket_path)
    }

    /// Convert to the driver's configuration and validate it
    pub fn to_driver_config(&self) -> anyhow::Result<DriverConfig> {
        let config = DriverConfig {
            debounce: Duration::from_millis(self.timing.debounce_ms),
            multi_press_timeout: Duration::from_millis(self.timing.multi_press_timeout_ms),
            max_presses: self.timing.max_presses,
            leds: self
                .leds
                .iter()
                .map(|l| LedLine::new(l.name.clone(), l.line))
                .collect(),
            button: ButtonLine {
                offset: self.button.line,
                active_low: self.button.active_low,
            },
            consumer: self.consumer.clone(),
        };
        config.validate()?;
        Ok(config)
    }
}
