// normalizer.rs: altitude normalization and dial geometry
//
// Pure functions only: no sensor handles, no locks, no I/O.
// The state slots in `altimeter.rs` call into this module on every update,
// and the status writer calls it again at render time for gauge rotation.

use serde::{Deserialize, Serialize};

/// ICAO standard sea-level pressure (hPa)
pub const STANDARD_PRESSURE_HPA: f64 = 1013.25;

const ICAO_SCALE_M: f64 = 44330.0;
const ICAO_EXPONENT: f64 = 1.0 / 5.255;

pub const FEET_PER_METER: f64 = 3.28084;

/// Re-zero a raw altitude against a lazily captured baseline.
///
/// An unset baseline is captured from `raw`, so the first reading is always 0.
/// Returns the relative altitude and the (possibly new) baseline.
pub fn relative_altitude(raw: f64, baseline: Option<f64>) -> (f64, Option<f64>) {
    match baseline {
        None => (0.0, Some(raw)),
        Some(base) => (raw - base, Some(base)),
    }
}

/// Dial pointer angle for a gauge making one revolution per `period_m`.
///
/// Uses the truncating remainder, so negative values give negative angles.
/// Run the result through [`normalize_degrees`] when a rotation in [0, 360)
/// is required. A zero period yields NaN.
pub fn pointer_angle_degrees(value: f64, period_m: f64) -> f64 {
    (value % period_m) / period_m * 360.0
}

/// Wrap any finite angle into [0, 360).
pub fn normalize_degrees(angle: f64) -> f64 {
    let wrapped = angle.rem_euclid(360.0);
    // rem_euclid can round up to exactly 360.0 for tiny negative inputs
    if wrapped >= 360.0 {
        0.0
    } else {
        wrapped
    }
}

/// ICAO barometric formula: pressure altitude in meters relative to `reference_hpa`.
///
/// Non-positive pressures produce NaN; callers must reject non-finite results.
pub fn pressure_altitude(pressure_hpa: f64, reference_hpa: f64) -> f64 {
    if pressure_hpa <= 0.0 || reference_hpa <= 0.0 {
        return f64::NAN;
    }
    ICAO_SCALE_M * (1.0 - (pressure_hpa / reference_hpa).powf(ICAO_EXPONENT))
}

/// Inverse of [`pressure_altitude`]: the pressure observed `altitude_m` above the reference.
pub fn pressure_at_altitude(altitude_m: f64, reference_hpa: f64) -> f64 {
    reference_hpa * (1.0 - altitude_m / ICAO_SCALE_M).powf(1.0 / ICAO_EXPONENT)
}

pub fn meters_to_feet(meters: f64) -> f64 {
    meters * FEET_PER_METER
}

/// Headline readout: the higher of the two sources.
pub fn combined_altitude(barometric_m: f64, gps_m: f64) -> f64 {
    barometric_m.max(gps_m)
}

/// Numeric readout for the GPS gauge, which never shows negative heights.
pub fn display_altitude(meters: f64) -> f64 {
    meters.max(0.0)
}

// ===== Signal quality =====

/// GPS signal tier, 0 (no signal) to 4 (best)
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SignalQuality(u8);

impl SignalQuality {
    pub const NONE: SignalQuality = SignalQuality(0);
    pub const MAX: SignalQuality = SignalQuality(4);

    pub fn value(&self) -> u8 {
        self.0
    }

    /// Signal bars for the readout, e.g. "▮▮▮▯"
    pub fn bars(&self) -> String {
        (0..Self::MAX.0)
            .map(|i| if i < self.0 { '▮' } else { '▯' })
            .collect()
    }
}

/// Horizontal-accuracy cutoffs (meters), most precise first.
///
/// Each bound is exclusive: accuracy below `excellent` is tier 4, below `good`
/// tier 3, below `fair` tier 2, below `weak` tier 1, anything else tier 0.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SignalThresholds {
    pub excellent: f64,
    pub good: f64,
    pub fair: f64,
    pub weak: f64,
}

impl Default for SignalThresholds {
    fn default() -> Self {
        Self {
            excellent: 5.0,
            good: 10.0,
            fair: 15.0,
            weak: 20.0,
        }
    }
}

impl SignalThresholds {
    pub fn is_strictly_increasing(&self) -> bool {
        let bounds = [self.excellent, self.good, self.fair, self.weak];
        bounds.iter().all(|b| b.is_finite()) && bounds.windows(2).all(|w| w[0] < w[1])
    }

    pub fn classify(&self, horizontal_accuracy_m: f64) -> SignalQuality {
        if horizontal_accuracy_m.is_nan() {
            return SignalQuality::NONE;
        }
        let tier = if horizontal_accuracy_m < self.excellent {
            4
        } else if horizontal_accuracy_m < self.good {
            3
        } else if horizontal_accuracy_m < self.fair {
            2
        } else if horizontal_accuracy_m < self.weak {
            1
        } else {
            0
        };
        SignalQuality(tier)
    }
}

/// Signal tier from horizontal accuracy using the default table.
pub fn signal_quality(horizontal_accuracy_m: f64) -> SignalQuality {
    SignalThresholds::default().classify(horizontal_accuracy_m)
}

// ===== Barometric three-hand dial =====

/// Hand angles of the feet-based barometric dial.
///
/// The long hand turns once per 100 ft, the middle hand once per 1 000 ft and
/// the short hand once per 10 000 ft.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FeetDial {
    pub hundreds_deg: f64,
    pub thousands_deg: f64,
    pub ten_thousands_deg: f64,
}

impl FeetDial {
    pub const DEFAULT_PERIODS_FT: [f64; 3] = [100.0, 1000.0, 10000.0];

    pub fn from_meters(altitude_m: f64) -> Self {
        Self::with_periods(altitude_m, Self::DEFAULT_PERIODS_FT)
    }

    pub fn with_periods(altitude_m: f64, periods_ft: [f64; 3]) -> Self {
        let feet = meters_to_feet(altitude_m);
        FeetDial {
            hundreds_deg: pointer_angle_degrees(feet, periods_ft[0]),
            thousands_deg: pointer_angle_degrees(feet, periods_ft[1]),
            ten_thousands_deg: pointer_angle_degrees(feet, periods_ft[2]),
        }
    }
}
