use super::{DigitalReader, HardwareError, ReadError};
use crate::config::{ButtonConfig, PullMode};
use rppal::gpio::{Gpio, InputPin, Level};
use std::collections::HashMap;
use tracing::{debug, info};

/// Button pins registered as inputs through rppal
#[derive(Debug)]
pub struct GpioButtons {
    pins: HashMap<u8, InputPin>,
    released: bool,
}

impl GpioButtons {
    /// Registers every configured pin as an input with the given pull resistor
    pub fn open(buttons: &[ButtonConfig], pull: PullMode) -> Result<Self, HardwareError> {
        let gpio = Gpio::new()?;
        let mut pins = HashMap::with_capacity(buttons.len());

        for button in buttons {
            let pin = gpio.get(button.pin)?;
            let input = match pull {
                PullMode::Up => pin.into_input_pullup(),
                PullMode::Down => pin.into_input_pulldown(),
                PullMode::Off => pin.into_input(),
            };
            debug!(
                "GPIO {} initialized for button {} ({:?})",
                button.pin, button.name, pull
            );
            pins.insert(button.pin, input);
        }

        info!("Registered {} button pins", pins.len());
        Ok(Self {
            pins,
            released: false,
        })
    }
}

impl DigitalReader for GpioButtons {
    fn read_level(&mut self, pin: u8) -> Result<Level, ReadError> {
        if self.released {
            return Err(ReadError::Fatal("GPIO pins already released".into()));
        }
        self.pins
            .get(&pin)
            .map(InputPin::read)
            .ok_or_else(|| ReadError::Fatal(format!("GPIO {pin} is not registered")))
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        // Dropping an InputPin restores its previous mode and pull state
        let count = self.pins.len();
        self.pins.clear();
        self.released = true;
        info!("Released {} GPIO pins", count);
    }
}

impl Drop for GpioButtons {
    fn drop(&mut self) {
        self.release();
    }
}
