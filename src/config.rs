//! Configuration for the input sampler
//!
//! Loaded once at startup from a TOML file. Every section has defaults matching the stock
//! wiring (six buttons on BCM pins, joystick on MCP3008 channels 0 and 1), so a missing file
//! still yields a runnable setup. A file that exists but does not parse or validate is an error.
//!
//! ```toml
//! [timing]
//! read_interval_ms = 50
//! debounce_ms = 50
//!
//! [output]
//! path = "/tmp/input.txt"
//! temp_suffix = ".tmp"
//!
//! [joystick]
//! x = 0
//! y = 1
//!
//! [[buttons]]
//! name = "a"
//! pin = 17
//! ```

use crate::snapshot::InputId;
use serde::Deserialize;
use std::collections::HashSet;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

const CONFIG_ENV_VAR: &str = "GPIOINPUT_CONFIG";
const CONFIG_DIR: &str = "gpioinput";
const CONFIG_FILE: &str = "config.toml";

/// Number of input channels on the MCP3008
pub const ADC_CHANNELS: u8 = 8;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Complete sampler configuration
#[derive(Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct InputConfig {
    pub timing: TimingConfig,
    pub output: OutputConfig,
    pub gpio: GpioConfig,
    pub spi: SpiConfig,
    pub joystick: JoystickConfig,
    /// Buttons in publishing order; the stock table when the key is absent
    #[serde(default = "default_buttons")]
    pub buttons: Vec<ButtonConfig>,
}

#[derive(Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct TimingConfig {
    /// Nominal tick length
    pub read_interval_ms: u64,
    /// Time a raw level must hold after its last edge before it becomes stable
    pub debounce_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            read_interval_ms: 50, // 20 Hz
            debounce_ms: 50,
        }
    }
}

#[derive(Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct OutputConfig {
    pub path: PathBuf,
    /// Appended to `path` for the staging file; keeps it on the same filesystem
    pub temp_suffix: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("/tmp/input.txt"),
            temp_suffix: ".tmp".to_string(),
        }
    }
}

impl OutputConfig {
    pub fn temp_path(&self) -> PathBuf {
        let mut name = OsString::from(self.path.as_os_str());
        name.push(&self.temp_suffix);
        PathBuf::from(name)
    }
}

/// Pull resistor applied to every button pin
#[derive(Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PullMode {
    Up,
    Down,
    Off,
}

#[derive(Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct GpioConfig {
    pub pull: PullMode,
    /// A LOW level means pressed
    pub active_low: bool,
}

impl Default for GpioConfig {
    fn default() -> Self {
        Self {
            pull: PullMode::Up,
            active_low: true,
        }
    }
}

#[derive(Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct SpiConfig {
    pub bus: u8,
    pub slave_select: u8,
    pub clock_speed_hz: u32,
}

impl Default for SpiConfig {
    fn default() -> Self {
        Self {
            bus: 0,
            slave_select: 0,
            clock_speed_hz: 1_350_000,
        }
    }
}

/// Converter channels of the two joystick axes
#[derive(Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct JoystickConfig {
    pub x: u8,
    pub y: u8,
}

impl Default for JoystickConfig {
    fn default() -> Self {
        Self { x: 0, y: 1 }
    }
}

#[derive(Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ButtonConfig {
    pub name: InputId,
    /// BCM pin number
    pub pin: u8,
}

impl ButtonConfig {
    pub fn new(name: &str, pin: u8) -> Self {
        Self {
            name: InputId::from(name),
            pin,
        }
    }
}

fn default_buttons() -> Vec<ButtonConfig> {
    vec![
        ButtonConfig::new("a", 17),
        ButtonConfig::new("b", 4),
        ButtonConfig::new("x", 27),
        ButtonConfig::new("y", 22),
        ButtonConfig::new("menu", 23),
        ButtonConfig::new("stick", 26),
    ]
}

impl InputConfig {
    /// Stock wiring used when no config file is present
    pub fn stock() -> Self {
        Self {
            buttons: default_buttons(),
            ..Self::default()
        }
    }

    pub fn read_interval(&self) -> Duration {
        Duration::from_millis(self.timing.read_interval_ms)
    }

    pub fn debounce_time(&self) -> Duration {
        Duration::from_millis(self.timing.debounce_ms)
    }

    /// Loads the config at `path`, falling back to the stock setup if there is no file
    pub async fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            warn!("No config location available, using stock configuration");
            return Ok(Self::stock());
        };

        let exists = tokio::fs::try_exists(path)
            .await
            .map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;
        if !exists {
            warn!(
                "Config file {} does not exist, using stock configuration",
                path.display()
            );
            return Ok(Self::stock());
        }

        let content =
            tokio::fs::read_to_string(path)
                .await
                .map_err(|source| ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })?;
        let config = Self::from_toml(&content, path)?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Parses and validates TOML content; `path` is only used for error messages
    pub fn from_toml(content: &str, path: &Path) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        debug!("Parsed {} buttons from {}", config.buttons.len(), path.display());
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.buttons.is_empty() {
            return Err(ConfigError::Invalid("no buttons configured".into()));
        }

        let mut names = HashSet::new();
        let mut pins = HashSet::new();
        for button in &self.buttons {
            let name = button.name.as_str();
            if name.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "button on pin {} has an empty name",
                    button.pin
                )));
            }
            if name.chars().any(|c| c == ':' || c == ',' || c.is_whitespace()) {
                return Err(ConfigError::Invalid(format!(
                    "button name '{name}' contains a reserved character"
                )));
            }
            if name == "jx" || name == "jy" {
                return Err(ConfigError::Invalid(format!(
                    "button name '{name}' is reserved for the joystick"
                )));
            }
            if !names.insert(name) {
                return Err(ConfigError::Invalid(format!(
                    "button name '{name}' is used more than once"
                )));
            }
            if !pins.insert(button.pin) {
                return Err(ConfigError::Invalid(format!(
                    "pin {} is assigned to more than one button",
                    button.pin
                )));
            }
        }

        for (axis, channel) in [("x", self.joystick.x), ("y", self.joystick.y)] {
            if channel >= ADC_CHANNELS {
                return Err(ConfigError::Invalid(format!(
                    "joystick axis {axis} uses channel {channel}, must be 0-{}",
                    ADC_CHANNELS - 1
                )));
            }
        }

        if self.timing.read_interval_ms == 0 {
            return Err(ConfigError::Invalid("read_interval_ms must be > 0".into()));
        }
        if self.timing.debounce_ms == 0 {
            return Err(ConfigError::Invalid("debounce_ms must be > 0".into()));
        }
        if self.output.temp_suffix.is_empty() {
            return Err(ConfigError::Invalid("temp_suffix must not be empty".into()));
        }
        if self.output.path.file_name().is_none() {
            return Err(ConfigError::Invalid(format!(
                "output path {} has no file name",
                self.output.path.display()
            )));
        }
        if self.spi.bus > 6 {
            return Err(ConfigError::Invalid(format!(
                "SPI bus {} does not exist",
                self.spi.bus
            )));
        }
        if self.spi.slave_select > 2 {
            return Err(ConfigError::Invalid(format!(
                "SPI slave select {} is not supported",
                self.spi.slave_select
            )));
        }

        Ok(())
    }
}

/// Picks the config location: CLI argument, then `GPIOINPUT_CONFIG`, then the user config dir
pub fn resolve_config_path(cli_arg: Option<String>) -> Option<PathBuf> {
    if let Some(arg) = cli_arg {
        return Some(PathBuf::from(arg));
    }
    if let Ok(from_env) = std::env::var(CONFIG_ENV_VAR) {
        if !from_env.is_empty() {
            return Some(PathBuf::from(from_env));
        }
    }
    dirs::config_dir().map(|mut dir| {
        dir.push(CONFIG_DIR);
        dir.push(CONFIG_FILE);
        dir
    })
}
