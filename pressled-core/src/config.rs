//! Driver configuration

use std::time::Duration;

use crate::error::ControlError;

/// Most LEDs a single driver instance will manage
pub const MAX_LEDS: usize = 8;

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(50);
pub const DEFAULT_MULTI_PRESS_TIMEOUT: Duration = Duration::from_millis(1000);
pub const DEFAULT_MAX_PRESSES: u8 = 5;
pub const DEFAULT_CONSUMER: &str = "pressled";

/// An LED output line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedLine {
    pub name: String,
    pub offset: u32,
}

impl LedLine {
    pub fn new(name: impl Into<String>, offset: u32) -> Self {
        Self {
            name: name.into(),
            offset,
        }
    }
}

/// The button input line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ButtonLine {
    pub offset: u32,
    /// Pressed pulls the line low (press = falling edge)
    pub active_low: bool,
}

/// Everything `Driver::start` needs
#[derive(Debug, Clone)]
pub struct DriverConfig {
    pub debounce: Duration,
    pub multi_press_timeout: Duration,
    pub max_presses: u8,
    pub leds: Vec<LedLine>,
    pub button: ButtonLine,
    /// Consumer label for acquired lines
    pub consumer: String,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            debounce: DEFAULT_DEBOUNCE,
            multi_press_timeout: DEFAULT_MULTI_PRESS_TIMEOUT,
            max_presses: DEFAULT_MAX_PRESSES,
            leds: vec![
                LedLine::new("green_led", 17),
                LedLine::new("white_led", 27),
                LedLine::new("yellow_led", 22),
            ],
            button: ButtonLine {
                offset: 16,
                active_low: true,
            },
            consumer: DEFAULT_CONSUMER.to_string(),
        }
    }
}

impl DriverConfig {
    pub fn validate(&self) -> Result<(), ControlError> {
        if self.leds.is_empty() || self.leds.len() > MAX_LEDS {
            return Err(ControlError::InvalidConfig(format!(
                "expected 1..={MAX_LEDS} LEDs, got {}",
                self.leds.len()
            )));
        }
        if self.max_presses == 0 {
            return Err(ControlError::InvalidConfig(
                "max_presses must be at least 1".to_string(),
            ));
        }
        if self.multi_press_timeout.is_zero() {
            return Err(ControlError::InvalidConfig(
                "multi_press_timeout must be non-zero".to_string(),
            ));
        }

        let mut offsets: Vec<u32> = self.leds.iter().map(|l| l.offset).collect();
        offsets.push(self.button.offset);
        offsets.sort_unstable();
        if let Some(w) = offsets.windows(2).find(|w| w[0] == w[1]) {
            return Err(ControlError::InvalidConfig(format!(
                "line {} assigned twice",
                w[0]
            )));
        }

        let mut names: Vec<&str> = self.leds.iter().map(|l| l.name.as_str()).collect();
        names.sort_unstable();
        if let Some(w) = names.windows(2).find(|w| w[0] == w[1]) {
            return Err(ControlError::InvalidConfig(format!(
                "LED name {} used twice",
                w[0]
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DriverConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.leds.len(), 3);
        assert_eq!(config.leds[1].name, "white_led");
        assert_eq!(config.debounce, Duration::from_millis(50));
        assert!(config.button.active_low);
    }

    #[test]
    fn test_validate_led_count() {
        let mut config = DriverConfig::default();
        config.leds.clear();
        assert!(matches!(config.validate(), Err(ControlError::InvalidConfig(_))));

        config.leds = (0..9).map(|i| LedLine::new(format!("led{i}"), i)).collect();
        config.button.offset = 100;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_duplicate_lines() {
        let mut config = DriverConfig::default();
        config.leds[2].offset = config.button.offset;
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("line 16"), "{err}");
    }

    #[test]
    fn test_validate_limits() {
        let mut config = DriverConfig::default();
        config.max_presses = 0;
        assert!(config.validate().is_err());

        let mut config = DriverConfig::default();
        config.multi_press_timeout = Duration::ZERO;
        assert!(config.validate().is_err());
    }
}
