use serde::{Deserialize, Serialize};

use crate::error::{AltResult, AltimeterError};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AltitudeSource {
    Barometric,
    Gps,
}

impl AltitudeSource {
    pub fn tag(&self) -> &'static str {
        match self {
            AltitudeSource::Barometric => "BARO",
            AltitudeSource::Gps => "GPS",
        }
    }
}

/// A single altitude value in meters, latest wins
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct AltitudeReading {
    pub value: f64,
    pub source: AltitudeSource,
}

impl AltitudeReading {
    /// Rejects NaN and infinite values.
    pub fn new(value: f64, source: AltitudeSource) -> AltResult<Self> {
        if !value.is_finite() {
            return Err(AltimeterError::InvalidReading(format!(
                "{} altitude {} is not finite",
                source.tag(),
                value
            )));
        }
        Ok(Self { value, source })
    }
}

/// Barometer callback payload
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BaroSample {
    pub timestamp: f64,
    pub relative_altitude_m: f64,
    pub pressure_hpa: f64,
}

/// GPS location callback payload
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GpsFix {
    pub timestamp: f64,
    pub altitude_m: f64,
    pub vertical_accuracy_m: f64,
    pub horizontal_accuracy_m: f64,
}

/// What a sensor delivers per callback: a payload, or the error it reported
pub type SensorUpdate<T> = Result<T, AltimeterError>;

pub fn current_timestamp() -> f64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reading_rejects_non_finite() {
        assert!(AltitudeReading::new(f64::NAN, AltitudeSource::Gps).is_err());
        assert!(AltitudeReading::new(f64::INFINITY, AltitudeSource::Barometric).is_err());
        let ok = AltitudeReading::new(42.0, AltitudeSource::Gps).unwrap();
        assert_eq!(ok.value, 42.0);
    }

    #[test]
    fn test_source_serializes_lowercase() {
        let json = serde_json::to_string(&AltitudeSource::Barometric).unwrap();
        assert_eq!(json, "\"barometric\"");
    }
}
