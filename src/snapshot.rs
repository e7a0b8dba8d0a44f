//! Snapshot of all inputs for one tick and its published text form
//!
//! One record per snapshot, newline terminated:
//!
//! ```text
//! a:0,b:1,x:0,y:0,menu:0,stick:0,jx:512,jy:498
//! ```
//!
//! Buttons appear in configuration order, followed by `jx` and `jy`.

use serde::Deserialize;
use std::fmt;
use std::str::FromStr;

/// Largest value the 10-bit converter can report
pub const AXIS_MAX: u16 = 1023;

/// Stable name of one physical input
#[derive(Deserialize, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct InputId(String);

impl InputId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for InputId {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

impl From<String> for InputId {
    fn from(name: String) -> Self {
        Self(name)
    }
}

impl fmt::Display for InputId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Raw converter readings of the joystick axes
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct JoystickValues {
    pub x: u16,
    pub y: u16,
}

impl JoystickValues {
    /// Stick at rest on a 10-bit converter
    pub const CENTERED: Self = Self { x: 512, y: 512 };
}

/// Combined input state of one tick
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Snapshot {
    buttons: Vec<(InputId, bool)>,
    joystick: JoystickValues,
}

impl Snapshot {
    /// `buttons` must already be in configuration order
    pub fn new(buttons: Vec<(InputId, bool)>, joystick: JoystickValues) -> Self {
        Self { buttons, joystick }
    }

    pub fn buttons(&self) -> &[(InputId, bool)] {
        &self.buttons
    }

    pub fn joystick(&self) -> JoystickValues {
        self.joystick
    }

    pub fn is_pressed(&self, id: &str) -> Option<bool> {
        self.buttons
            .iter()
            .find(|(name, _)| name.as_str() == id)
            .map(|(_, pressed)| *pressed)
    }

    /// Serialized record including the trailing newline
    pub fn to_record(&self) -> String {
        format!("{self}\n")
    }
}

impl fmt::Display for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, pressed) in &self.buttons {
            write!(f, "{}:{},", name, u8::from(*pressed))?;
        }
        write!(f, "jx:{},jy:{}", self.joystick.x, self.joystick.y)
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SnapshotParseError {
    #[error("Field '{0}' is not of the form name:value")]
    MalformedField(String),

    #[error("Button '{name}' has invalid value '{value}', expected 0 or 1")]
    InvalidButtonValue { name: String, value: String },

    #[error("Axis '{name}' has invalid value '{value}', expected 0-1023")]
    InvalidAxisValue { name: String, value: String },

    #[error("Record must end with jx and jy fields")]
    MissingJoystick,
}

impl FromStr for Snapshot {
    type Err = SnapshotParseError;

    fn from_str(record: &str) -> Result<Self, Self::Err> {
        let record = record.strip_suffix('\n').unwrap_or(record);
        let mut fields = Vec::new();
        for field in record.split(',') {
            let (name, value) = field
                .split_once(':')
                .filter(|(name, _)| !name.is_empty())
                .ok_or_else(|| SnapshotParseError::MalformedField(field.to_string()))?;
            fields.push((name, value));
        }

        let Some(&[(jx_name, jx), (jy_name, jy)]) = fields.get(fields.len().saturating_sub(2)..)
        else {
            return Err(SnapshotParseError::MissingJoystick);
        };
        if jx_name != "jx" || jy_name != "jy" {
            return Err(SnapshotParseError::MissingJoystick);
        }
        let joystick = JoystickValues {
            x: parse_axis(jx_name, jx)?,
            y: parse_axis(jy_name, jy)?,
        };

        let buttons = fields[..fields.len() - 2]
            .iter()
            .map(|&(name, value)| {
                let pressed = match value {
                    "0" => false,
                    "1" => true,
                    _ => {
                        return Err(SnapshotParseError::InvalidButtonValue {
                            name: name.to_string(),
                            value: value.to_string(),
                        })
                    }
                };
                Ok((InputId::from(name), pressed))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { buttons, joystick })
    }
}

fn parse_axis(name: &str, value: &str) -> Result<u16, SnapshotParseError> {
    // `u16::from_str` also takes a leading '+'
    Some(value)
        .filter(|v| !v.is_empty() && v.bytes().all(|b| b.is_ascii_digit()))
        .and_then(|v| v.parse::<u16>().ok())
        .filter(|v| *v <= AXIS_MAX)
        .ok_or_else(|| SnapshotParseError::InvalidAxisValue {
            name: name.to_string(),
            value: value.to_string(),
        })
}
