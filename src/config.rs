use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::{AltResult, AltimeterError};
use crate::normalizer::{FeetDial, SignalThresholds, STANDARD_PRESSURE_HPA};

// ===== Configuration =====

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AltimeterConfig {
    // Dials
    pub gps_dial_period_m: f64,
    pub baro_dial_periods_ft: [f64; 3],

    // Kollsman window
    pub reference_pressure_hpa: f64,

    // GPS signal tiers
    pub signal_thresholds: SignalThresholds,

    // Simulated sources
    pub baro_interval_ms: u64,
    pub gps_interval_ms: u64,
    pub channel_capacity: usize,

    // Status output
    pub status_interval_secs: u64,
}

impl Default for AltimeterConfig {
    fn default() -> Self {
        Self {
            gps_dial_period_m: 10.0,
            baro_dial_periods_ft: FeetDial::DEFAULT_PERIODS_FT,
            reference_pressure_hpa: STANDARD_PRESSURE_HPA,
            signal_thresholds: SignalThresholds::default(),
            baro_interval_ms: 100,
            gps_interval_ms: 1000,
            channel_capacity: 64,
            status_interval_secs: 2,
        }
    }
}

impl AltimeterConfig {
    /// Load from a JSON file. Missing fields take their defaults.
    pub fn load<P: AsRef<Path>>(path: P) -> AltResult<Self> {
        let text = fs::read_to_string(path.as_ref())?;
        let config: AltimeterConfig = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> AltResult<()> {
        if !(self.gps_dial_period_m.is_finite() && self.gps_dial_period_m > 0.0) {
            return Err(AltimeterError::InvalidConfig(format!(
                "gps_dial_period_m must be positive, got {}",
                self.gps_dial_period_m
            )));
        }
        if let Some(bad) = self
            .baro_dial_periods_ft
            .iter()
            .find(|p| !(p.is_finite() && **p > 0.0))
        {
            return Err(AltimeterError::InvalidConfig(format!(
                "baro_dial_periods_ft must be positive, got {}",
                bad
            )));
        }
        if !(self.reference_pressure_hpa.is_finite() && self.reference_pressure_hpa > 0.0) {
            return Err(AltimeterError::InvalidConfig(format!(
                "reference_pressure_hpa must be positive, got {}",
                self.reference_pressure_hpa
            )));
        }
        if !self.signal_thresholds.is_strictly_increasing() {
            return Err(AltimeterError::InvalidConfig(
                "signal_thresholds must be strictly increasing".to_string(),
            ));
        }
        if self.baro_interval_ms == 0 || self.gps_interval_ms == 0 {
            return Err(AltimeterError::InvalidConfig(
                "sensor intervals must be non-zero".to_string(),
            ));
        }
        if self.channel_capacity == 0 {
            return Err(AltimeterError::InvalidConfig(
                "channel_capacity must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}
