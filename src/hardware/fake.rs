//! Scripted peripherals for tests
//!
//! Each fake hands out a cloneable control handle so a test can change readings and inspect
//! release counts after the fake itself has been moved into a sampler.

use super::{AnalogReader, Clock, DigitalReader, ReadError};
use rppal::gpio::Level;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug)]
struct Script<K, V> {
    values: HashMap<K, Result<V, ReadError>>,
    // Runtime time of every read, paused or not
    reads: Vec<(K, Instant)>,
    // Blocks the next read of that key once
    stalls: HashMap<K, Duration>,
    releases: usize,
}

impl<K, V> Default for Script<K, V> {
    fn default() -> Self {
        Self {
            values: HashMap::new(),
            reads: Vec::new(),
            stalls: HashMap::new(),
            releases: 0,
        }
    }
}

/// Control side of [`FakeDigital`]
#[derive(Debug, Clone, Default)]
pub struct DigitalControl(Arc<Mutex<Script<u8, Level>>>);

impl DigitalControl {
    pub fn set(&self, pin: u8, level: Level) {
        if let Ok(mut script) = self.0.lock() {
            script.values.insert(pin, Ok(level));
        }
    }

    pub fn fail(&self, pin: u8, error: ReadError) {
        if let Ok(mut script) = self.0.lock() {
            script.values.insert(pin, Err(error));
        }
    }

    /// Makes the next read of `pin` block the calling thread for `duration`
    pub fn stall(&self, pin: u8, duration: Duration) {
        if let Ok(mut script) = self.0.lock() {
            script.stalls.insert(pin, duration);
        }
    }

    pub fn reads(&self) -> usize {
        self.0.lock().map(|script| script.reads.len()).unwrap_or(0)
    }

    /// When each read of `pin` happened
    pub fn read_times(&self, pin: u8) -> Vec<Instant> {
        self.0
            .lock()
            .map(|script| {
                script
                    .reads
                    .iter()
                    .filter(|(read_pin, _)| *read_pin == pin)
                    .map(|(_, at)| *at)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn releases(&self) -> usize {
        self.0.lock().map(|script| script.releases).unwrap_or(0)
    }
}

/// Digital reader answering from a script; unscripted pins read HIGH (idle with pull-up)
#[derive(Debug)]
pub struct FakeDigital {
    control: DigitalControl,
    released: bool,
}

impl FakeDigital {
    pub fn new() -> (Self, DigitalControl) {
        let control = DigitalControl::default();
        (
            Self {
                control: control.clone(),
                released: false,
            },
            control,
        )
    }
}

impl DigitalReader for FakeDigital {
    fn read_level(&mut self, pin: u8) -> Result<Level, ReadError> {
        let mut script = self
            .control
            .0
            .lock()
            .map_err(|e| ReadError::Fatal(e.to_string()))?;
        script.reads.push((pin, Instant::now()));
        if let Some(stall) = script.stalls.remove(&pin) {
            std::thread::sleep(stall);
        }
        script.values.get(&pin).cloned().unwrap_or(Ok(Level::High))
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if let Ok(mut script) = self.control.0.lock() {
            script.releases += 1;
        }
    }
}

/// Control side of [`FakeAnalog`]
#[derive(Debug, Clone, Default)]
pub struct AnalogControl(Arc<Mutex<Script<u8, u16>>>);

impl AnalogControl {
    pub fn set(&self, channel: u8, value: u16) {
        if let Ok(mut script) = self.0.lock() {
            script.values.insert(channel, Ok(value));
        }
    }

    pub fn fail(&self, channel: u8, error: ReadError) {
        if let Ok(mut script) = self.0.lock() {
            script.values.insert(channel, Err(error));
        }
    }

    pub fn releases(&self) -> usize {
        self.0.lock().map(|script| script.releases).unwrap_or(0)
    }
}

/// Analog reader answering from a script; unscripted channels read mid-scale
#[derive(Debug)]
pub struct FakeAnalog {
    control: AnalogControl,
    released: bool,
}

impl FakeAnalog {
    pub fn new() -> (Self, AnalogControl) {
        let control = AnalogControl::default();
        (
            Self {
                control: control.clone(),
                released: false,
            },
            control,
        )
    }
}

impl AnalogReader for FakeAnalog {
    fn read_channel(&mut self, channel: u8) -> Result<u16, ReadError> {
        let mut script = self
            .control
            .0
            .lock()
            .map_err(|e| ReadError::Fatal(e.to_string()))?;
        script.reads.push((channel, Instant::now()));
        script.values.get(&channel).cloned().unwrap_or(Ok(512))
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if let Ok(mut script) = self.control.0.lock() {
            script.releases += 1;
        }
    }
}

/// Manually advanced clock
#[derive(Debug, Clone, Default)]
pub struct FakeClock(Arc<AtomicU64>);

impl FakeClock {
    pub fn set(&self, at: Duration) {
        self.0.store(at.as_micros() as u64, Ordering::SeqCst);
    }

    pub fn advance(&self, by: Duration) {
        self.0.fetch_add(by.as_micros() as u64, Ordering::SeqCst);
    }
}

impl Clock for FakeClock {
    fn now(&self) -> Duration {
        Duration::from_micros(self.0.load(Ordering::SeqCst))
    }
}
