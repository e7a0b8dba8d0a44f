//! Hardware access for the sampler
//!
//! The sampler only sees the [`DigitalReader`], [`AnalogReader`] and [`Clock`] traits. The
//! Raspberry Pi implementations live in [`gpio`] (buttons via rppal's GPIO) and [`adc`] (MCP3008
//! over SPI). Tests swap them for the scripted fakes in `fake`.
//!
//! Peripherals are acquired when a reader is constructed and released by [`DigitalReader::release`]
//! / [`AnalogReader::release`]. Release is idempotent; the hardware readers also release on drop.

pub mod adc;
#[cfg(test)]
pub mod fake;
pub mod gpio;

use rppal::gpio::Level;
use std::fmt::Debug;
use std::time::{Duration, Instant};

/// Failure of a single read
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum ReadError {
    /// The read failed or returned an out-of-range value; the next tick may succeed
    #[error("Transient read failure: {0}")]
    Transient(String),

    /// The device is unusable
    #[error("Peripheral failure: {0}")]
    Fatal(String),
}

impl ReadError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, ReadError::Fatal(_))
    }
}

/// Errors while acquiring peripherals at startup
#[derive(Debug, thiserror::Error)]
pub enum HardwareError {
    #[error("GPIO error: {0}")]
    Gpio(#[from] rppal::gpio::Error),

    #[error("SPI error: {0}")]
    Spi(#[from] rppal::spi::Error),

    #[error("Unsupported setting: {0}")]
    Unsupported(String),
}

/// Instantaneous logic level of button pins
pub trait DigitalReader: Debug + Send {
    fn read_level(&mut self, pin: u8) -> Result<Level, ReadError>;

    /// Gives the pins back to the system
    fn release(&mut self);
}

/// Raw 10-bit converter readings
pub trait AnalogReader: Debug + Send {
    fn read_channel(&mut self, channel: u8) -> Result<u16, ReadError>;

    /// Closes the converter handle
    fn release(&mut self);
}

/// Monotonic time source, measured from an arbitrary fixed origin
pub trait Clock: Debug + Send {
    fn now(&self) -> Duration;
}

/// Wall-clock independent time based on [`Instant`]
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn monotonic_clock_never_goes_back() {
        let clock = MonotonicClock::new();
        let first = clock.now();
        let second = clock.now();
        assert!(second >= first);
    }

    #[test]
    fn fatal_classification() {
        assert!(ReadError::Fatal("bus gone".into()).is_fatal());
        assert!(!ReadError::Transient("glitch".into()).is_fatal());
    }
}
