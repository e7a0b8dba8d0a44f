use super::{AnalogReader, HardwareError, ReadError};
use crate::config::{SpiConfig, ADC_CHANNELS};
use crate::snapshot::AXIS_MAX;
use rppal::spi::{Bus, Mode, SlaveSelect, Spi};
use std::io::ErrorKind;
use tracing::{debug, info};

/// MCP3008 8-channel 10-bit converter on a SPI bus
#[derive(Debug)]
pub struct Mcp3008 {
    spi: Option<Spi>,
}

impl Mcp3008 {
    pub fn open(config: &SpiConfig) -> Result<Self, HardwareError> {
        let bus = match config.bus {
            0 => Bus::Spi0,
            1 => Bus::Spi1,
            2 => Bus::Spi2,
            3 => Bus::Spi3,
            4 => Bus::Spi4,
            5 => Bus::Spi5,
            6 => Bus::Spi6,
            other => return Err(HardwareError::Unsupported(format!("SPI bus {other}"))),
        };
        let slave_select = match config.slave_select {
            0 => SlaveSelect::Ss0,
            1 => SlaveSelect::Ss1,
            2 => SlaveSelect::Ss2,
            other => {
                return Err(HardwareError::Unsupported(format!(
                    "SPI slave select {other}"
                )))
            }
        };

        let spi = Spi::new(bus, slave_select, config.clock_speed_hz, Mode::Mode0)?;
        info!(
            "MCP3008 ADC initialized on SPI{}.{} at {} Hz",
            config.bus, config.slave_select, config.clock_speed_hz
        );
        Ok(Self { spi: Some(spi) })
    }
}

/// Single-ended conversion request for `channel`
pub fn request_frame(channel: u8) -> [u8; 3] {
    [0x01, (0x08 | channel) << 4, 0x00]
}

/// Extracts the 10-bit result from the response frame
pub fn decode_frame(rx: &[u8; 3]) -> u16 {
    (((rx[1] & 0x03) as u16) << 8) | rx[2] as u16
}

fn classify_spi_error(err: rppal::spi::Error) -> ReadError {
    match err {
        rppal::spi::Error::Io(io)
            if matches!(
                io.kind(),
                ErrorKind::Interrupted | ErrorKind::TimedOut | ErrorKind::WouldBlock
            ) =>
        {
            ReadError::Transient(format!("SPI transfer: {io}"))
        }
        other => ReadError::Fatal(format!("SPI transfer: {other}")),
    }
}

impl AnalogReader for Mcp3008 {
    fn read_channel(&mut self, channel: u8) -> Result<u16, ReadError> {
        if channel >= ADC_CHANNELS {
            return Err(ReadError::Fatal(format!(
                "channel {channel} out of range, must be 0-{}",
                ADC_CHANNELS - 1
            )));
        }
        let spi = self
            .spi
            .as_mut()
            .ok_or_else(|| ReadError::Fatal("SPI handle already released".into()))?;

        let tx = request_frame(channel);
        let mut rx = [0u8; 3];
        spi.transfer(&mut rx, &tx).map_err(classify_spi_error)?;

        let value = decode_frame(&rx);
        if value > AXIS_MAX {
            return Err(ReadError::Transient(format!(
                "channel {channel} returned {value}"
            )));
        }
        debug!("ADC channel {} = {}", channel, value);
        Ok(value)
    }

    fn release(&mut self) {
        if self.spi.take().is_some() {
            info!("Closed MCP3008 SPI handle");
        }
    }
}

impl Drop for Mcp3008 {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_selects_single_ended_channel() {
        assert_eq!(request_frame(0), [0x01, 0x80, 0x00]);
        assert_eq!(request_frame(1), [0x01, 0x90, 0x00]);
        assert_eq!(request_frame(7), [0x01, 0xF0, 0x00]);
    }

    #[test]
    fn decode_uses_low_two_bits_of_second_byte() {
        assert_eq!(decode_frame(&[0x00, 0x02, 0x00]), 512);
        assert_eq!(decode_frame(&[0xFF, 0xFF, 0xFF]), 1023);
        assert_eq!(decode_frame(&[0x00, 0xFC, 0x2A]), 42);
    }

    #[test]
    fn interrupted_transfer_is_transient() {
        let err = rppal::spi::Error::Io(std::io::Error::from(ErrorKind::Interrupted));
        assert!(!classify_spi_error(err).is_fatal());

        let err = rppal::spi::Error::Io(std::io::Error::from(ErrorKind::NotFound));
        assert!(classify_spi_error(err).is_fatal());
    }
}
