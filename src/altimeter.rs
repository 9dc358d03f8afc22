// altimeter.rs: per-source state slots
//
// Each source owns its slot: its own baseline, its own last-known values.
// Nothing here orders barometer updates against GPS updates; the two slots are
// locked independently and the snapshot reads them one after the other.

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

use crate::error::{AltResult, AltimeterError};
use crate::normalizer::{
    combined_altitude, pressure_altitude, relative_altitude, SignalQuality, SignalThresholds,
    STANDARD_PRESSURE_HPA,
};
use crate::types::{AltitudeReading, AltitudeSource, BaroSample, GpsFix, SensorUpdate};

/// Routine callback failures go to debug; anything else on the stream is worth a warning.
fn log_dropped(tag: &str, err: &AltimeterError) {
    if err.is_transient() {
        debug!("[{}] ignoring callback: {}", tag, err);
    } else {
        warn!("[{}] ignoring callback: {}", tag, err);
    }
}

// ===== Barometric slot =====

#[derive(Clone, Debug)]
pub struct BarometricAltimeter {
    baseline: Option<f64>,
    pub altitude: f64,
    pub raw_altitude: Option<f64>,
    pub pressure_hpa: f64,
    pub reference_pressure_hpa: f64,
    pub updates: u64,
    pub ignored: u64,
}

impl Default for BarometricAltimeter {
    fn default() -> Self {
        Self::new(STANDARD_PRESSURE_HPA)
    }
}

impl BarometricAltimeter {
    pub fn new(reference_pressure_hpa: f64) -> Self {
        Self {
            baseline: None,
            altitude: 0.0,
            raw_altitude: None,
            pressure_hpa: STANDARD_PRESSURE_HPA,
            reference_pressure_hpa,
            updates: 0,
            ignored: 0,
        }
    }

    /// Apply one callback. Returns true if the slot changed.
    ///
    /// Errors and non-finite payloads are ignored and the last good values kept.
    pub fn apply(&mut self, update: SensorUpdate<BaroSample>) -> bool {
        let sample = match update {
            Ok(sample) => sample,
            Err(e) => {
                log_dropped("BARO", &e);
                self.ignored += 1;
                return false;
            }
        };

        let reading = match AltitudeReading::new(sample.relative_altitude_m, AltitudeSource::Barometric)
        {
            Ok(r) => r,
            Err(e) => {
                warn!("[BARO] {}", e);
                self.ignored += 1;
                return false;
            }
        };

        let (relative, baseline) = relative_altitude(reading.value, self.baseline);
        self.baseline = baseline;
        self.altitude = relative;
        self.raw_altitude = Some(reading.value);

        // Pressure is an independent field; a bad pressure does not void the altitude
        if sample.pressure_hpa.is_finite() && sample.pressure_hpa > 0.0 {
            self.pressure_hpa = sample.pressure_hpa;
        } else {
            debug!("[BARO] keeping last pressure, got {}", sample.pressure_hpa);
        }

        self.updates += 1;
        true
    }

    pub fn baseline(&self) -> Option<f64> {
        self.baseline
    }

    /// Clear the baseline; the next reading becomes the new zero.
    pub fn reset_baseline(&mut self) {
        self.baseline = None;
        self.altitude = 0.0;
    }

    /// Kollsman setting for pressure altitude
    pub fn set_reference_pressure(&mut self, hpa: f64) -> AltResult<()> {
        if !(hpa.is_finite() && hpa > 0.0) {
            return Err(AltimeterError::InvalidReading(format!(
                "reference pressure {} hPa",
                hpa
            )));
        }
        self.reference_pressure_hpa = hpa;
        Ok(())
    }

    /// ICAO altitude of the last pressure against the Kollsman setting.
    pub fn pressure_altitude(&self) -> Option<f64> {
        let alt = pressure_altitude(self.pressure_hpa, self.reference_pressure_hpa);
        alt.is_finite().then_some(alt)
    }
}

// ===== GPS slot =====

#[derive(Clone, Debug)]
pub struct GpsAltimeter {
    baseline: Option<f64>,
    thresholds: SignalThresholds,
    pub altitude: f64,
    pub absolute_altitude: Option<f64>,
    pub vertical_accuracy: f64,
    pub horizontal_accuracy: f64,
    pub signal: SignalQuality,
    pub updates: u64,
    pub ignored: u64,
}

impl Default for GpsAltimeter {
    fn default() -> Self {
        Self::new(SignalThresholds::default())
    }
}

impl GpsAltimeter {
    pub fn new(thresholds: SignalThresholds) -> Self {
        Self {
            baseline: None,
            thresholds,
            altitude: 0.0,
            absolute_altitude: None,
            vertical_accuracy: 0.0,
            horizontal_accuracy: 0.0,
            signal: SignalQuality::NONE,
            updates: 0,
            ignored: 0,
        }
    }

    /// Apply one location callback. Returns true if the slot changed.
    pub fn apply(&mut self, update: SensorUpdate<GpsFix>) -> bool {
        let fix = match update {
            Ok(fix) => fix,
            Err(e) => {
                log_dropped("GPS", &e);
                self.ignored += 1;
                return false;
            }
        };

        let reading = match AltitudeReading::new(fix.altitude_m, AltitudeSource::Gps) {
            Ok(r) => r,
            Err(e) => {
                warn!("[GPS] {}", e);
                self.ignored += 1;
                return false;
            }
        };

        let (relative, baseline) = relative_altitude(reading.value, self.baseline);
        if self.baseline.is_none() {
            debug!("[GPS] baseline set to {:.1} m", reading.value);
        }
        self.baseline = baseline;
        self.altitude = relative;
        self.absolute_altitude = Some(reading.value);
        self.vertical_accuracy = fix.vertical_accuracy_m;
        self.horizontal_accuracy = fix.horizontal_accuracy_m;

        // Negative horizontal accuracy marks an invalid horizontal fix
        self.signal = if fix.horizontal_accuracy_m < 0.0 {
            SignalQuality::NONE
        } else {
            self.thresholds.classify(fix.horizontal_accuracy_m)
        };

        self.updates += 1;
        true
    }

    pub fn baseline(&self) -> Option<f64> {
        self.baseline
    }

    pub fn reset_baseline(&mut self) {
        self.baseline = None;
        self.altitude = 0.0;
    }
}

// ===== Shared state =====

/// Latest values for the presentation layer
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AltimeterSnapshot {
    pub barometric_altitude: f64,
    pub gps_altitude: f64,
    pub pressure_hpa: f64,
    pub reference_pressure_hpa: f64,
    /// ICAO altitude of `pressure_hpa` against the Kollsman setting
    pub pressure_altitude: Option<f64>,
    pub gps_accuracy: f64,
    pub signal_strength: SignalQuality,
    pub displayed_altitude: f64,
    pub baro_updates: u64,
    pub gps_updates: u64,
}

/// Two independently locked slots, cheap to clone into consumer tasks
#[derive(Clone, Debug, Default)]
pub struct AltimeterState {
    pub barometric: Arc<Mutex<BarometricAltimeter>>,
    pub gps: Arc<Mutex<GpsAltimeter>>,
}

impl AltimeterState {
    pub fn new(reference_pressure_hpa: f64, thresholds: SignalThresholds) -> Self {
        Self {
            barometric: Arc::new(Mutex::new(BarometricAltimeter::new(reference_pressure_hpa))),
            gps: Arc::new(Mutex::new(GpsAltimeter::new(thresholds))),
        }
    }

    pub fn apply_baro(&self, update: SensorUpdate<BaroSample>) -> bool {
        self.barometric
            .lock()
            .map(|mut slot| slot.apply(update))
            .unwrap_or(false)
    }

    pub fn apply_gps(&self, update: SensorUpdate<GpsFix>) -> bool {
        self.gps
            .lock()
            .map(|mut slot| slot.apply(update))
            .unwrap_or(false)
    }

    pub fn set_reference_pressure(&self, hpa: f64) -> AltResult<()> {
        let mut slot = self.barometric.lock().map_err(|_| {
            AltimeterError::Io("barometric slot lock poisoned".to_string())
        })?;
        slot.set_reference_pressure(hpa)
    }

    /// Reset both baselines; each source re-zeroes on its next reading.
    pub fn reset_baselines(&self) {
        if let Ok(mut slot) = self.barometric.lock() {
            slot.reset_baseline();
        }
        if let Ok(mut slot) = self.gps.lock() {
            slot.reset_baseline();
        }
    }

    /// Read each slot separately. The two halves may come from different instants.
    pub fn snapshot(&self) -> AltimeterSnapshot {
        let baro = self
            .barometric
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default();
        let gps = self.gps.lock().map(|s| s.clone()).unwrap_or_default();

        AltimeterSnapshot {
            barometric_altitude: baro.altitude,
            gps_altitude: gps.altitude,
            pressure_hpa: baro.pressure_hpa,
            reference_pressure_hpa: baro.reference_pressure_hpa,
            pressure_altitude: baro.pressure_altitude(),
            gps_accuracy: gps.vertical_accuracy,
            signal_strength: gps.signal,
            displayed_altitude: combined_altitude(baro.altitude, gps.altitude),
            baro_updates: baro.updates,
            gps_updates: gps.updates,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn baro(rel: f64, pressure: f64) -> SensorUpdate<BaroSample> {
        Ok(BaroSample {
            timestamp: 0.0,
            relative_altitude_m: rel,
            pressure_hpa: pressure,
        })
    }

    fn fix(alt: f64, h_acc: f64) -> SensorUpdate<GpsFix> {
        Ok(GpsFix {
            timestamp: 0.0,
            altitude_m: alt,
            vertical_accuracy_m: 3.0,
            horizontal_accuracy_m: h_acc,
        })
    }

    #[test]
    fn test_gps_lazy_baseline_sequence() {
        let mut gps = GpsAltimeter::default();
        assert_eq!(gps.baseline(), None);

        let mut outputs = Vec::new();
        for alt in [120.0, 125.0, 130.0] {
            assert!(gps.apply(fix(alt, 4.0)));
            outputs.push(gps.altitude);
        }
        assert_eq!(outputs, vec![0.0, 5.0, 10.0]);
        assert_eq!(gps.baseline(), Some(120.0));
        assert_eq!(gps.absolute_altitude, Some(130.0));
        assert_eq!(gps.signal.value(), 4);
    }

    #[test]
    fn test_gps_zero_altitude_baseline_is_kept() {
        // A first fix at exactly 0 m is a real baseline, not "unset"
        let mut gps = GpsAltimeter::default();
        gps.apply(fix(0.0, 4.0));
        gps.apply(fix(8.0, 4.0));
        assert_eq!(gps.baseline(), Some(0.0));
        assert_eq!(gps.altitude, 8.0);
    }

    #[test]
    fn test_gps_callback_error_keeps_last_value() {
        let mut gps = GpsAltimeter::default();
        gps.apply(fix(50.0, 7.0));
        gps.apply(fix(53.0, 7.0));

        assert!(!gps.apply(Err(AltimeterError::SensorCallback("kCLErrorLocationUnknown".into()))));
        assert!(!gps.apply(fix(f64::NAN, 7.0)));

        assert_eq!(gps.altitude, 3.0);
        assert_eq!(gps.signal.value(), 3);
        assert_eq!(gps.updates, 2);
        assert_eq!(gps.ignored, 2);
    }

    #[test]
    fn test_gps_invalid_horizontal_accuracy() {
        let mut gps = GpsAltimeter::default();
        gps.apply(fix(10.0, -1.0));
        assert_eq!(gps.signal, SignalQuality::NONE);
    }

    #[test]
    fn test_gps_reset_baseline() {
        let mut gps = GpsAltimeter::default();
        gps.apply(fix(100.0, 4.0));
        gps.apply(fix(110.0, 4.0));
        gps.reset_baseline();
        assert_eq!(gps.altitude, 0.0);
        gps.apply(fix(112.0, 4.0));
        assert_eq!(gps.altitude, 0.0);
        gps.apply(fix(115.0, 4.0));
        assert_eq!(gps.altitude, 3.0);
    }

    #[test]
    fn test_baro_apply_and_ignore() {
        let mut slot = BarometricAltimeter::default();
        assert!(slot.apply(baro(0.0, 1012.0)));
        assert!(slot.apply(baro(2.5, 1011.7)));
        assert_eq!(slot.altitude, 2.5);
        assert_eq!(slot.pressure_hpa, 1011.7);

        assert!(!slot.apply(Err(AltimeterError::SensorCallback("no data".into()))));
        assert!(!slot.apply(baro(f64::INFINITY, 1000.0)));
        assert_eq!(slot.altitude, 2.5);
        assert_eq!(slot.pressure_hpa, 1011.7);
    }

    #[test]
    fn test_baro_bad_pressure_keeps_last_pressure() {
        let mut slot = BarometricAltimeter::default();
        slot.apply(baro(0.0, 1005.0));
        assert!(slot.apply(baro(1.0, f64::NAN)));
        assert_eq!(slot.altitude, 1.0);
        assert_eq!(slot.pressure_hpa, 1005.0);
    }

    #[test]
    fn test_baro_reference_pressure() {
        let mut slot = BarometricAltimeter::default();
        assert_eq!(slot.pressure_altitude(), Some(0.0));

        slot.apply(baro(0.0, 900.0));
        assert_abs_diff_eq!(slot.pressure_altitude().unwrap(), 988.65, epsilon = 1.0);

        slot.set_reference_pressure(900.0).unwrap();
        assert_eq!(slot.pressure_altitude(), Some(0.0));

        assert!(slot.set_reference_pressure(0.0).is_err());
        assert!(slot.set_reference_pressure(f64::NAN).is_err());
        assert_eq!(slot.reference_pressure_hpa, 900.0);
    }

    #[test]
    fn test_snapshot_combines_independent_slots() {
        let state = AltimeterState::default();
        state.apply_gps(fix(200.0, 12.0));
        state.apply_gps(fix(207.0, 12.0));
        state.apply_baro(baro(0.4, 1010.0));
        state.apply_baro(baro(3.4, 1009.6));

        let snap = state.snapshot();
        assert_eq!(snap.gps_altitude, 7.0);
        assert_abs_diff_eq!(snap.barometric_altitude, 3.0, epsilon = 1e-12);
        assert_eq!(snap.displayed_altitude, 7.0);
        assert_eq!(snap.signal_strength.value(), 2);
        assert_eq!(snap.gps_accuracy, 3.0);
        assert_eq!(snap.pressure_hpa, 1009.6);
        assert_abs_diff_eq!(
            snap.pressure_altitude.unwrap(),
            pressure_altitude(1009.6, STANDARD_PRESSURE_HPA),
            epsilon = 1e-9
        );
        assert_eq!(snap.baro_updates, 2);
        assert_eq!(snap.gps_updates, 2);
    }

    #[test]
    fn test_update_order_is_commutative() {
        let a = AltimeterState::default();
        a.apply_baro(baro(1.0, 1000.0));
        a.apply_gps(fix(40.0, 3.0));
        a.apply_baro(baro(4.0, 999.5));
        a.apply_gps(fix(45.0, 3.0));

        let b = AltimeterState::default();
        b.apply_gps(fix(40.0, 3.0));
        b.apply_gps(fix(45.0, 3.0));
        b.apply_baro(baro(1.0, 1000.0));
        b.apply_baro(baro(4.0, 999.5));

        assert_eq!(a.snapshot(), b.snapshot());
    }

    #[test]
    fn test_non_transient_errors_are_still_ignored() {
        let state = AltimeterState::default();
        state.apply_gps(fix(30.0, 4.0));
        state.apply_gps(fix(36.0, 4.0));

        let denied = AltimeterError::AuthorizationDenied;
        assert!(!denied.is_transient());
        assert!(!state.apply_gps(Err(denied)));
        assert!(!state.apply_baro(Err(AltimeterError::SensorUnavailable("baro".into()))));

        let gps = state.gps.lock().unwrap();
        assert_eq!(gps.altitude, 6.0);
        assert_eq!(gps.ignored, 1);
        assert_eq!(state.barometric.lock().unwrap().ignored, 1);
    }

    #[test]
    fn test_snapshot_tracks_kollsman_setting() {
        let state = AltimeterState::default();
        state.apply_baro(baro(0.0, 1000.0));
        state.set_reference_pressure(1000.0).unwrap();
        assert_eq!(state.snapshot().pressure_altitude, Some(0.0));
        assert_eq!(state.snapshot().reference_pressure_hpa, 1000.0);
    }

    #[test]
    fn test_reset_baselines() {
        let state = AltimeterState::default();
        state.apply_gps(fix(10.0, 3.0));
        state.apply_gps(fix(20.0, 3.0));
        state.reset_baselines();
        assert_eq!(state.snapshot().gps_altitude, 0.0);
        assert_eq!(state.gps.lock().unwrap().baseline(), None);
    }
}
