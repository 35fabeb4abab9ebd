use phf::{Map, phf_map};
use std::fmt;
use std::ops::Add;
use std::str::FromStr;
use thiserror::Error;

static TIME_UNITS_IN_PS: Map<&'static str, f64> = phf_map! {
    "fs" => 1.0e-3,
    "ps" => 1.0,
    "ns" => 1.0e3,
    "us" => 1.0e6,
};

static LENGTH_UNITS_IN_ANGSTROM: Map<&'static str, f64> = phf_map! {
    "A" => 1.0,
    "angstrom" => 1.0,
    "nm" => 10.0,
};

static TEMPERATURE_UNITS_IN_KELVIN: Map<&'static str, f64> = phf_map! {
    "K" => 1.0,
    "kelvin" => 1.0,
};

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum UnitError {
    #[error("Quantity '{0}' has no numeric value")]
    MissingValue(String),

    #[error("Invalid numeric value in quantity '{0}'")]
    InvalidNumber(String),

    #[error("Unknown {kind} unit '{unit}' in quantity '{input}'")]
    UnknownUnit {
        kind: &'static str,
        unit: String,
        input: String,
    },
}

/// Splits a quantity such as `"1.5e3ps"` into its numeric part and its unit suffix.
fn split_quantity(input: &str) -> (&str, &str) {
    let bytes = input.as_bytes();
    let mut end = 0;
    while end < bytes.len() {
        let c = bytes[end];
        let is_exponent = (c == b'e' || c == b'E')
            && end > 0
            && bytes
                .get(end + 1)
                .is_some_and(|n| n.is_ascii_digit() || *n == b'-' || *n == b'+');
        if c.is_ascii_digit() || c == b'.' || c == b'-' || c == b'+' || is_exponent {
            end += 1;
        } else {
            break;
        }
    }
    (&input[..end], input[end..].trim())
}

fn parse_scaled(
    input: &str,
    kind: &'static str,
    table: &Map<&'static str, f64>,
) -> Result<f64, UnitError> {
    let trimmed = input.trim();
    let (number, unit) = split_quantity(trimmed);
    if number.is_empty() {
        return Err(UnitError::MissingValue(input.to_string()));
    }
    let value: f64 = number
        .parse()
        .map_err(|_| UnitError::InvalidNumber(input.to_string()))?;
    let factor = table.get(unit).ok_or_else(|| UnitError::UnknownUnit {
        kind,
        unit: unit.to_string(),
        input: input.to_string(),
    })?;
    Ok(value * factor)
}

/// A simulation time, stored in picoseconds.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct TimeQuantity {
    picoseconds: f64,
}

impl TimeQuantity {
    pub fn from_picoseconds(picoseconds: f64) -> Self {
        Self { picoseconds }
    }

    pub fn picoseconds(&self) -> f64 {
        self.picoseconds
    }
}

impl FromStr for TimeQuantity {
    type Err = UnitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_scaled(s, "time", &TIME_UNITS_IN_PS).map(Self::from_picoseconds)
    }
}

impl Add for TimeQuantity {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self::from_picoseconds(self.picoseconds + rhs.picoseconds)
    }
}

impl fmt::Display for TimeQuantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ps", self.picoseconds)
    }
}

/// A distance, stored in angstroms.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct LengthQuantity {
    angstroms: f64,
}

impl LengthQuantity {
    pub fn angstroms(&self) -> f64 {
        self.angstroms
    }
}

impl FromStr for LengthQuantity {
    type Err = UnitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_scaled(s, "length", &LENGTH_UNITS_IN_ANGSTROM).map(|angstroms| Self { angstroms })
    }
}

impl fmt::Display for LengthQuantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}A", self.angstroms)
    }
}

/// An absolute temperature, stored in kelvin.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct TemperatureQuantity {
    kelvin: f64,
}

impl TemperatureQuantity {
    pub fn kelvin(&self) -> f64 {
        self.kelvin
    }
}

impl FromStr for TemperatureQuantity {
    type Err = UnitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_scaled(s, "temperature", &TEMPERATURE_UNITS_IN_KELVIN).map(|kelvin| Self { kelvin })
    }
}

impl fmt::Display for TemperatureQuantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}K", self.kelvin)
    }
}
