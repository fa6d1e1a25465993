use serde::{Deserialize, Serialize};
use thiserror_no_std::Error;

use crate::modbus::ResponseFrame;

/// Register indices within the probe's response
const MOISTURE_REGISTER: usize = 0;
const TEMPERATURE_REGISTER: usize = 1;
const CONDUCTIVITY_REGISTER: usize = 2;

/// One decoded probe reading in physical units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SoilReading {
    /// Volumetric water content in %
    pub moisture: f32,
    /// Soil temperature in °C
    pub temperature: f32,
    /// Electrical conductivity in µS/cm
    pub conductivity: f32,
}

/// Stored field of a record, in upload order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Moisture,
    Temperature,
    Conductivity,
}

impl Field {
    pub const ALL: [Field; 3] = [Field::Moisture, Field::Temperature, Field::Conductivity];

    /// Child key used in the database
    pub const fn key(self) -> &'static str {
        match self {
            Self::Moisture => "Moisture",
            Self::Temperature => "Temperature",
            Self::Conductivity => "Conductivity",
        }
    }
}

impl SoilReading {
    /// Decode the first three registers of a checked frame.
    ///
    /// Moisture and temperature are tenths, conductivity is raw.
    pub fn decode(frame: &ResponseFrame<'_>) -> Self {
        Self {
            moisture: frame.register(MOISTURE_REGISTER) as f32 / 10.0,
            temperature: frame.register(TEMPERATURE_REGISTER) as f32 / 10.0,
            conductivity: frame.register(CONDUCTIVITY_REGISTER) as f32,
        }
    }

    pub const fn value(&self, field: Field) -> f32 {
        match field {
            Field::Moisture => self.moisture,
            Field::Temperature => self.temperature,
            Field::Conductivity => self.conductivity,
        }
    }

    /// Field/value pairs in upload order
    pub fn fields(&self) -> [(Field, f32); 3] {
        Field::ALL.map(|field| (field, self.value(field)))
    }
}

/// Upper plausibility limits; a reading exceeding any of them is discarded whole.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct PlausibilityBounds {
    pub max_moisture: f32,
    pub max_temperature: f32,
    pub max_conductivity: f32,
}

impl Default for PlausibilityBounds {
    fn default() -> Self {
        Self {
            max_moisture: 100.0,
            max_temperature: 60.0,
            max_conductivity: 1000.0,
        }
    }
}

#[derive(Error, Debug, Clone, Copy, PartialEq)]
#[error("{} {value} exceeds limit {limit}", .field.key())]
pub struct RangeViolation {
    pub field: Field,
    pub value: f32,
    pub limit: f32,
}

impl PlausibilityBounds {
    const fn limit(&self, field: Field) -> f32 {
        match field {
            Field::Moisture => self.max_moisture,
            Field::Temperature => self.max_temperature,
            Field::Conductivity => self.max_conductivity,
        }
    }

    /// Return the first field over its limit, checked in the order
    /// temperature, moisture, conductivity.
    pub fn validate(&self, reading: &SoilReading) -> Result<(), RangeViolation> {
        for field in [Field::Temperature, Field::Moisture, Field::Conductivity] {
            let value = reading.value(field);
            let limit = self.limit(field);
            if value > limit {
                return Err(RangeViolation {
                    field,
                    value,
                    limit,
                });
            }
        }
        Ok(())
    }
}
