//! Fixed-rate sampling loop
//!
//! Every tick reads all buttons, runs them through the debouncer, reads both joystick axes and
//! hands the resulting [`Snapshot`] to the [`Publisher`]. One tick finishes completely before the
//! next starts; the only suspension point is the delay between ticks.
//!
//! # Lifecycle
//!
//! ```text
//! Sampler<Initializing> ──initialize()──► Sampler<Sampling> ──run()/tick()──► shutdown()
//! ```
//!
//! # Failure handling
//!
//! - A transient read error keeps the previous value of that one input for the tick
//! - A fatal read error ends the loop with [`SamplerError::Peripheral`]
//! - A failed publish is logged and the next tick publishes its own snapshot
//!
//! Peripherals are released exactly once by [`Sampler::shutdown`], whichever way the loop ended.

use crate::config::{ButtonConfig, ConfigError, InputConfig, JoystickConfig};
use crate::debounce::Debouncer;
use crate::hardware::{AnalogReader, Clock, DigitalReader, ReadError};
use crate::publisher::{PublishOutcome, Publisher};
use crate::snapshot::{JoystickValues, Snapshot, AXIS_MAX};
use chrono::{DateTime, Local};
use rppal::gpio::Level;
use statum::{machine, state};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

// Sampler errors
#[derive(Debug, thiserror::Error)]
pub enum SamplerError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Peripheral failure while reading {input}: {source}")]
    Peripheral { input: String, source: ReadError },
}

/// Counters for the periodic stats line
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SamplerStats {
    pub ticks: u64,
    pub writes: u64,
    pub skipped_writes: u64,
    pub transient_failures: u64,
    pub publish_failures: u64,
    pub last_write: Option<DateTime<Local>>,
}

#[state]
#[derive(Debug, Clone)]
pub enum SamplerState {
    Initializing,
    Sampling,
}

#[machine]
#[derive(Debug)]
pub struct Sampler<S: SamplerState> {
    // Buttons in publishing order
    buttons: Vec<ButtonConfig>,
    joystick: JoystickConfig,
    active_low: bool,
    read_interval: Duration,

    digital: Box<dyn DigitalReader>,
    analog: Box<dyn AnalogReader>,
    clock: Box<dyn Clock>,

    debouncer: Debouncer,
    publisher: Publisher,

    // Reused when an axis read fails
    last_joystick: JoystickValues,
    stats: SamplerStats,
}

// Methods available in every state
impl<S: SamplerState> Sampler<S> {
    pub fn stats(&self) -> SamplerStats {
        SamplerStats {
            writes: self.publisher.writes(),
            skipped_writes: self.publisher.skipped(),
            ..self.stats.clone()
        }
    }
}

impl Sampler<Initializing> {
    /// Builds a sampler around already acquired peripherals
    pub fn create(
        config: &InputConfig,
        digital: Box<dyn DigitalReader>,
        analog: Box<dyn AnalogReader>,
        clock: Box<dyn Clock>,
    ) -> Result<Self, SamplerError> {
        config.validate()?;
        debug!("Creating sampler with config: {:?}", config);

        let debouncer = Debouncer::new(
            config.debounce_time(),
            config.buttons.iter().map(|button| &button.name),
        );
        let publisher = Publisher::new(&config.output);

        Ok(Self::new(
            config.buttons.clone(),
            config.joystick,
            config.gpio.active_low,
            config.read_interval(),
            digital,
            analog,
            clock,
            debouncer,
            publisher,
            JoystickValues::CENTERED,
            SamplerStats::default(),
        ))
    }

    pub fn initialize(self) -> Result<Sampler<Sampling>, SamplerError> {
        info!(
            "Initializing sampler: {} buttons, joystick on channels {}/{}, {}ms interval, {}ms debounce",
            self.buttons.len(),
            self.joystick.x,
            self.joystick.y,
            self.read_interval.as_millis(),
            self.debouncer.threshold().as_millis()
        );
        for button in &self.buttons {
            debug!("  {} -> GPIO {}", button.name, button.pin);
        }

        if let Some(parent) = self.publisher.target().parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                warn!(
                    "Output directory {} does not exist, writes will fail until it does",
                    parent.display()
                );
            }
        }

        debug!("Transitioning to Sampling state");
        Ok(self.transition())
    }
}

impl Sampler<Sampling> {
    /// Runs one read-debounce-publish cycle
    pub async fn tick(&mut self) -> Result<Snapshot, SamplerError> {
        let now = self.clock.now();

        let mut buttons = Vec::with_capacity(self.buttons.len());
        for button in &self.buttons {
            let stable = match self.digital.read_level(button.pin) {
                Ok(level) => {
                    let pressed = is_pressed(level, self.active_low);
                    self.debouncer.debounce(&button.name, pressed, now)
                }
                Err(e) if e.is_fatal() => {
                    return Err(SamplerError::Peripheral {
                        input: button.name.to_string(),
                        source: e,
                    });
                }
                Err(e) => {
                    warn!("Keeping previous state of {}: {}", button.name, e);
                    self.stats.transient_failures += 1;
                    self.debouncer.stable(&button.name)
                }
            };
            buttons.push((button.name.clone(), stable));
        }

        let joystick = JoystickValues {
            x: self.read_axis("jx", self.joystick.x, self.last_joystick.x)?,
            y: self.read_axis("jy", self.joystick.y, self.last_joystick.y)?,
        };
        self.last_joystick = joystick;

        let snapshot = Snapshot::new(buttons, joystick);
        match self.publisher.publish(&snapshot).await {
            Ok(PublishOutcome::Written) => self.stats.last_write = Some(Local::now()),
            Ok(PublishOutcome::Unchanged) => {}
            Err(e) => {
                warn!("Failed to write input file: {}", e);
                self.stats.publish_failures += 1;
            }
        }

        self.stats.ticks += 1;
        Ok(snapshot)
    }

    fn read_axis(&mut self, axis: &str, channel: u8, previous: u16) -> Result<u16, SamplerError> {
        match self.analog.read_channel(channel) {
            Ok(value) if value <= AXIS_MAX => Ok(value),
            Ok(value) => {
                warn!(
                    "Axis {} read {} on channel {}, keeping {}",
                    axis, value, channel, previous
                );
                self.stats.transient_failures += 1;
                Ok(previous)
            }
            Err(e) if e.is_fatal() => Err(SamplerError::Peripheral {
                input: axis.to_string(),
                source: e,
            }),
            Err(e) => {
                warn!("Keeping previous value of {}: {}", axis, e);
                self.stats.transient_failures += 1;
                Ok(previous)
            }
        }
    }

    /// Ticks at the configured interval until `cancel` fires or a peripheral fails
    pub async fn run(&mut self, cancel: &CancellationToken) -> Result<SamplerStats, SamplerError> {
        info!("GPIO reader started");

        let mut last_log_time = Local::now();
        let log_interval = chrono::Duration::seconds(10);

        loop {
            if cancel.is_cancelled() {
                info!("Stop requested, leaving sampling loop");
                break;
            }

            let tick_start = tokio::time::Instant::now();
            self.tick().await?;

            let now = Local::now();
            if now - last_log_time > log_interval {
                self.log_stats();
                last_log_time = now;
            }

            // Next tick is due one interval after this one started
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Stop requested during sleep, leaving sampling loop");
                    break;
                }
                _ = tokio::time::sleep_until(tick_start + self.read_interval) => {}
            }
        }

        Ok(self.stats())
    }

    fn log_stats(&self) {
        let stats = self.stats();
        info!(
            "Sampler stats: {} ticks, {} writes, {} unchanged, {} read failures, {} publish failures, last write {}",
            stats.ticks,
            stats.writes,
            stats.skipped_writes,
            stats.transient_failures,
            stats.publish_failures,
            stats
                .last_write
                .map(|t| t.format("%H:%M:%S%.3f").to_string())
                .unwrap_or_else(|| "never".to_string())
        );
    }

    /// Releases all peripherals and returns the final counters
    pub fn shutdown(mut self) -> SamplerStats {
        self.digital.release();
        self.analog.release();
        let stats = self.stats();
        self.log_stats();
        stats
    }
}

fn is_pressed(level: Level, active_low: bool) -> bool {
    match level {
        Level::Low => active_low,
        Level::High => !active_low,
    }
}
