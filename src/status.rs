use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::altimeter::AltimeterSnapshot;
use crate::config::AltimeterConfig;
use crate::normalizer::{display_altitude, pointer_angle_degrees, FeetDial};
use crate::types::current_timestamp;

/// Gauge rotations and numeric text for the two dials
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct GaugeReadout {
    pub gps_pointer_deg: f64,
    pub gps_display_altitude: f64,
    pub baro_dial: FeetDial,
    pub baro_display_altitude: f64,
    pub kollsman_hpa: f64,
    pub signal_bars: String,
}

impl GaugeReadout {
    pub fn from_snapshot(snapshot: &AltimeterSnapshot, config: &AltimeterConfig) -> Self {
        Self {
            gps_pointer_deg: pointer_angle_degrees(snapshot.gps_altitude, config.gps_dial_period_m),
            gps_display_altitude: display_altitude(snapshot.gps_altitude),
            baro_dial: FeetDial::with_periods(
                snapshot.barometric_altitude,
                config.baro_dial_periods_ft,
            ),
            baro_display_altitude: snapshot.barometric_altitude,
            kollsman_hpa: snapshot.reference_pressure_hpa,
            signal_bars: snapshot.signal_strength.bars(),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct AltimeterStatus {
    pub timestamp: f64,
    pub uptime_seconds: u64,
    pub barometer_active: bool,
    pub gps_active: bool,
    pub snapshot: AltimeterSnapshot,
    pub gauges: GaugeReadout,
}

impl AltimeterStatus {
    pub fn new(
        snapshot: AltimeterSnapshot,
        config: &AltimeterConfig,
        uptime_seconds: u64,
        barometer_active: bool,
        gps_active: bool,
    ) -> Self {
        let gauges = GaugeReadout::from_snapshot(&snapshot, config);
        Self {
            timestamp: current_timestamp(),
            uptime_seconds,
            barometer_active,
            gps_active,
            snapshot,
            gauges,
        }
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    /// One-line readout for the terminal
    pub fn format_line(&self) -> String {
        let s = &self.snapshot;
        let baro = if self.barometer_active {
            let pa = s
                .pressure_altitude
                .map(|m| format!("{:.0} m", m))
                .unwrap_or_else(|| "n/a".to_string());
            format!(
                "{:.1} m ({:.1} hPa, QNH {:.1}, PA {})",
                s.barometric_altitude, s.pressure_hpa, s.reference_pressure_hpa, pa
            )
        } else {
            "n/a".to_string()
        };
        let gps = if self.gps_active {
            // Negative accuracy is the platform's "unknown"
            let accuracy = if s.gps_accuracy >= 0.0 {
                format!("±{:.1}", s.gps_accuracy)
            } else {
                "±n/a".to_string()
            };
            format!(
                "{:.1} m {} {} ∠{:.0}°",
                self.gauges.gps_display_altitude,
                accuracy,
                self.gauges.signal_bars,
                self.gauges.gps_pointer_deg
            )
        } else {
            "n/a".to_string()
        };
        format!(
            "Altitude: {:.1} m | Baro {} | GPS {}",
            s.displayed_altitude, baro, gps
        )
    }
}
