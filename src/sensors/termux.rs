// Termux:API sources (Android). Polls the `termux-sensor` and
// `termux-location` helpers and parses their JSON output.
//
// The barometer helper reports absolute pressure only, so relative altitude is
// the ICAO pressure altitude against the first pressure seen after start.

use log::{info, warn};
use serde::Deserialize;
use serde_json::Value;
use std::process::{Command, Stdio};
use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::sync::mpsc::Sender;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};

use super::{deliver, Authorization, BarometricSource, Delivery, GpsSource};
use crate::error::{AltResult, AltimeterError};
use crate::normalizer::pressure_altitude;
use crate::types::{current_timestamp, BaroSample, GpsFix, SensorUpdate};

/// Extract the first pressure value (hPa) from `termux-sensor -s pressure -n 1`.
///
/// Output looks like `{"BMP280 Pressure": {"values": [1009.87]}}`.
pub fn parse_pressure_output(output: &str) -> Option<f64> {
    let json: Value = serde_json::from_str(output.trim()).ok()?;
    json.as_object()?
        .values()
        .filter_map(|sensor| sensor.get("values")?.as_array()?.first()?.as_f64())
        .find(|p| p.is_finite() && *p > 0.0)
}

#[derive(Debug, Deserialize)]
struct TermuxLocation {
    altitude: Option<f64>,
    accuracy: Option<f64>,
    vertical_accuracy: Option<f64>,
}

/// Parse `termux-location` output into a fix. A missing altitude is a callback error.
pub fn parse_location_output(output: &str, timestamp: f64) -> SensorUpdate<GpsFix> {
    let location: TermuxLocation = serde_json::from_str(output.trim())
        .map_err(|e| AltimeterError::SensorCallback(format!("termux-location: {}", e)))?;

    let altitude_m = location
        .altitude
        .ok_or_else(|| AltimeterError::SensorCallback("fix without altitude".to_string()))?;

    Ok(GpsFix {
        timestamp,
        altitude_m,
        // Platform convention: negative accuracy means "unknown"
        vertical_accuracy_m: location.vertical_accuracy.unwrap_or(-1.0),
        horizontal_accuracy_m: location.accuracy.unwrap_or(-1.0),
    })
}

fn run_helper(program: &str, args: &[&str]) -> Result<String, String> {
    let output = Command::new(program)
        .args(args)
        .stderr(Stdio::null())
        .output()
        .map_err(|e| format!("{}: {}", program, e))?;
    if !output.status.success() {
        return Err(format!("{} exited with {}", program, output.status));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// For the synchronous checks (`is_available`, `request_authorization`): on a
/// multi-thread runtime the worker hands its other tasks off while the helper runs.
fn run_helper_blocking(program: &str, args: &[&str]) -> Result<String, String> {
    match Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
            tokio::task::block_in_place(|| run_helper(program, args))
        }
        _ => run_helper(program, args),
    }
}

async fn run_helper_async(program: &'static str, args: &'static [&'static str]) -> Result<String, String> {
    tokio::task::spawn_blocking(move || run_helper(program, args))
        .await
        .map_err(|e| format!("{}: {}", program, e))?
}

// ===== Barometer =====

const PRESSURE_ARGS: &[&str] = &["-s", "pressure", "-n", "1"];

/// Zero point for the pressure-only barometer. The first pressure seen becomes
/// the reference; later samples are ICAO altitudes against it.
#[derive(Clone, Debug, Default)]
pub struct PressureZero {
    reference_hpa: Option<f64>,
}

impl PressureZero {
    pub fn reference_hpa(&self) -> Option<f64> {
        self.reference_hpa
    }

    pub fn sample(&mut self, pressure_hpa: f64, timestamp: f64) -> BaroSample {
        let reference = *self.reference_hpa.get_or_insert(pressure_hpa);
        BaroSample {
            timestamp,
            relative_altitude_m: pressure_altitude(pressure_hpa, reference),
            pressure_hpa,
        }
    }
}

pub struct TermuxBarometer {
    interval: Duration,
    handle: Option<JoinHandle<()>>,
}

impl TermuxBarometer {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            handle: None,
        }
    }
}

impl BarometricSource for TermuxBarometer {
    fn name(&self) -> &str {
        "termux-sensor pressure"
    }

    fn is_available(&self) -> bool {
        run_helper_blocking("termux-sensor", &["-l"])
            .map(|list| list.to_lowercase().contains("pressure"))
            .unwrap_or(false)
    }

    fn start(&mut self, tx: Sender<SensorUpdate<BaroSample>>) -> AltResult<()> {
        if self.handle.is_some() {
            return Err(AltimeterError::AlreadyRunning);
        }

        let period = self.interval;
        self.handle = Some(tokio::spawn(async move {
            let mut ticker = interval(period);
            // A helper call can outlast the period; don't queue up catch-up ticks
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut zero = PressureZero::default();
            let mut sample_count = 0u64;
            loop {
                ticker.tick().await;
                let update = match run_helper_async("termux-sensor", PRESSURE_ARGS).await {
                    Ok(text) => match parse_pressure_output(&text) {
                        Some(pressure_hpa) => Ok(zero.sample(pressure_hpa, current_timestamp())),
                        None => Err(AltimeterError::SensorCallback(
                            "no pressure in termux-sensor output".to_string(),
                        )),
                    },
                    Err(e) => Err(AltimeterError::SensorCallback(e)),
                };
                if deliver("BARO", &tx, update, &mut sample_count) == Delivery::Closed {
                    break;
                }
            }
        }));
        info!("[BARO] {} started", self.name());
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
            info!("[BARO] {} stopped", self.name());
        }
    }
}

impl Drop for TermuxBarometer {
    fn drop(&mut self) {
        self.stop();
    }
}

// ===== GPS =====

const LOCATION_ARGS: &[&str] = &["-p", "gps", "-r", "once"];

pub struct TermuxGps {
    interval: Duration,
    granted: bool,
    handle: Option<JoinHandle<()>>,
}

impl TermuxGps {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            granted: false,
            handle: None,
        }
    }
}

impl GpsSource for TermuxGps {
    fn name(&self) -> &str {
        "termux-location"
    }

    /// Termux prompts for the location permission on first use; a helper
    /// that cannot be launched counts as denied.
    fn request_authorization(&mut self) -> Authorization {
        self.granted = run_helper_blocking("termux-location", &["-r", "last"]).is_ok();
        if self.granted {
            Authorization::Granted
        } else {
            warn!("[GPS] termux-location not usable");
            Authorization::Denied
        }
    }

    fn start(&mut self, tx: Sender<SensorUpdate<GpsFix>>) -> AltResult<()> {
        if !self.granted {
            return Err(AltimeterError::AuthorizationDenied);
        }
        if self.handle.is_some() {
            return Err(AltimeterError::AlreadyRunning);
        }

        let period = self.interval;
        self.handle = Some(tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut sample_count = 0u64;
            loop {
                ticker.tick().await;
                let update = match run_helper_async("termux-location", LOCATION_ARGS).await {
                    Ok(text) => parse_location_output(&text, current_timestamp()),
                    Err(e) => Err(AltimeterError::SensorCallback(e)),
                };
                if deliver("GPS", &tx, update, &mut sample_count) == Delivery::Closed {
                    break;
                }
            }
        }));
        info!("[GPS] {} started", self.name());
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
            info!("[GPS] {} stopped", self.name());
        }
    }
}

impl Drop for TermuxGps {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_parse_pressure_output() {
        let output = r#"{
  "BMP280 Pressure": {
    "values": [
      1009.87
    ]
  }
}"#;
        assert_eq!(parse_pressure_output(output), Some(1009.87));
    }

    #[test]
    fn test_parse_pressure_output_rejects_garbage() {
        assert_eq!(parse_pressure_output(""), None);
        assert_eq!(parse_pressure_output("{}"), None);
        assert_eq!(parse_pressure_output(r#"{"P": {"values": []}}"#), None);
        assert_eq!(parse_pressure_output(r#"{"P": {"values": [0.0]}}"#), None);
    }

    #[test]
    fn test_pressure_zero_from_first_reading() {
        let mut zero = PressureZero::default();
        assert_eq!(zero.reference_hpa(), None);

        let alts: Vec<f64> = [1010.0, 1009.0, 1010.0]
            .iter()
            .map(|p| zero.sample(*p, 0.0).relative_altitude_m)
            .collect();

        assert_eq!(zero.reference_hpa(), Some(1010.0));
        assert_eq!(alts[0], 0.0);
        // ~8.4 m per hPa near sea level
        assert_abs_diff_eq!(alts[1], 8.4, epsilon = 0.1);
        assert_eq!(alts[2], 0.0);
    }

    #[test]
    fn test_pressure_zero_keeps_pressure_and_timestamp() {
        let mut zero = PressureZero::default();
        zero.sample(1000.0, 1.0);
        let sample = zero.sample(990.0, 2.5);
        assert_eq!(sample.pressure_hpa, 990.0);
        assert_eq!(sample.timestamp, 2.5);
        assert!(sample.relative_altitude_m > 0.0);
        assert_eq!(zero.reference_hpa(), Some(1000.0));
    }

    #[test]
    fn test_missing_helper_is_an_error() {
        assert!(run_helper_blocking("altimeter-no-such-helper", &[]).is_err());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_authorization_check_on_multi_thread_runtime() {
        // Denied rather than panicking or stalling the worker
        let mut gps = TermuxGps::new(Duration::from_secs(1));
        if run_helper("termux-location", &["-r", "last"]).is_err() {
            assert_eq!(gps.request_authorization(), Authorization::Denied);
        }
        assert!(run_helper_blocking("altimeter-no-such-helper", &[]).is_err());
    }

    #[test]
    fn test_parse_location_output() {
        let output = r#"{
  "latitude": 37.7749,
  "longitude": -122.4194,
  "altitude": 132.5,
  "accuracy": 4.2,
  "vertical_accuracy": 2.9,
  "bearing": 0.0,
  "speed": 0.0,
  "elapsedMs": 31,
  "provider": "gps"
}"#;
        let fix = parse_location_output(output, 10.0).unwrap();
        assert_eq!(fix.altitude_m, 132.5);
        assert_eq!(fix.horizontal_accuracy_m, 4.2);
        assert_eq!(fix.vertical_accuracy_m, 2.9);
        assert_eq!(fix.timestamp, 10.0);
    }

    #[test]
    fn test_parse_location_without_altitude() {
        let output = r#"{"latitude": 1.0, "longitude": 2.0, "accuracy": 30.0}"#;
        assert!(matches!(
            parse_location_output(output, 0.0),
            Err(AltimeterError::SensorCallback(_))
        ));
        assert!(parse_location_output("not json", 0.0).is_err());
    }

    #[test]
    fn test_parse_location_missing_accuracy() {
        let output = r#"{"altitude": 50.0}"#;
        let fix = parse_location_output(output, 0.0).unwrap();
        assert_eq!(fix.horizontal_accuracy_m, -1.0);
    }
}
