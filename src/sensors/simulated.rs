// Simulated sources for desktop runs and tests. Deterministic: each source
// walks its own sample counter, so two runs with the same settings produce
// the same stream.

use log::{info, warn};
use tokio::sync::mpsc::Sender;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration};

use super::{deliver, Authorization, BarometricSource, Delivery, GpsSource};
use crate::error::{AltResult, AltimeterError};
use crate::normalizer::{pressure_at_altitude, STANDARD_PRESSURE_HPA};
use crate::types::{current_timestamp, BaroSample, GpsFix, SensorUpdate};

/// Altitude profile shared by both simulated sources: a slow climb with a swell.
fn profile_altitude(t: f64) -> f64 {
    0.5 * t + 4.0 * (t * 0.2).sin()
}

/// Injects a callback error every `every` samples (`None` = never).
fn is_fault(seq: u64, every: Option<u64>) -> bool {
    matches!(every, Some(n) if n > 0 && seq > 0 && seq % n == 0)
}

// ===== Barometer =====

#[derive(Clone, Debug)]
pub struct BaroProfile {
    pub interval: Duration,
    pub site_elevation_m: f64,
    pub error_every: Option<u64>,
}

impl Default for BaroProfile {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(100),
            site_elevation_m: 120.0,
            error_every: None,
        }
    }
}

pub fn baro_sample(profile: &BaroProfile, seq: u64) -> SensorUpdate<BaroSample> {
    if is_fault(seq, profile.error_every) {
        return Err(AltimeterError::SensorCallback(format!(
            "simulated barometer fault at sample {}",
            seq
        )));
    }
    let t = seq as f64 * profile.interval.as_secs_f64();
    let relative = profile_altitude(t);
    Ok(BaroSample {
        timestamp: current_timestamp(),
        relative_altitude_m: relative,
        pressure_hpa: pressure_at_altitude(profile.site_elevation_m + relative, STANDARD_PRESSURE_HPA),
    })
}

pub struct SimulatedBarometer {
    profile: BaroProfile,
    available: bool,
    handle: Option<JoinHandle<()>>,
}

impl SimulatedBarometer {
    pub fn new(profile: BaroProfile) -> Self {
        Self {
            profile,
            available: true,
            handle: None,
        }
    }

    /// A device without barometric hardware
    pub fn unavailable() -> Self {
        let mut baro = Self::new(BaroProfile::default());
        baro.available = false;
        baro
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().map(|h| !h.is_finished()).unwrap_or(false)
    }
}

impl BarometricSource for SimulatedBarometer {
    fn name(&self) -> &str {
        "simulated barometer"
    }

    fn is_available(&self) -> bool {
        self.available
    }

    fn start(&mut self, tx: Sender<SensorUpdate<BaroSample>>) -> AltResult<()> {
        if !self.available {
            return Err(AltimeterError::SensorUnavailable(self.name().to_string()));
        }
        if self.handle.is_some() {
            return Err(AltimeterError::AlreadyRunning);
        }

        let profile = self.profile.clone();
        self.handle = Some(tokio::spawn(async move {
            let mut ticker = interval(profile.interval);
            let mut seq = 0u64;
            let mut sample_count = 0u64;
            loop {
                ticker.tick().await;
                let update = baro_sample(&profile, seq);
                seq += 1;
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

impl Drop for SimulatedBarometer {
    fn drop(&mut self) {
        self.stop();
    }
}

// ===== GPS =====

#[derive(Clone, Debug)]
pub struct GpsProfile {
    pub interval: Duration,
    pub site_elevation_m: f64,
    pub error_every: Option<u64>,
}

impl Default for GpsProfile {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            site_elevation_m: 120.0,
            error_every: None,
        }
    }
}

pub fn gps_fix(profile: &GpsProfile, seq: u64) -> SensorUpdate<GpsFix> {
    if is_fault(seq, profile.error_every) {
        return Err(AltimeterError::SensorCallback(format!(
            "simulated location fault at fix {}",
            seq
        )));
    }
    let t = seq as f64 * profile.interval.as_secs_f64();
    let s = seq as f64;
    Ok(GpsFix {
        timestamp: current_timestamp(),
        // GPS altitude is noisier than the barometer
        altitude_m: profile.site_elevation_m + profile_altitude(t) + 1.5 * (s * 1.7).sin(),
        vertical_accuracy_m: 6.0 + 3.0 * (s * 0.3).cos(),
        horizontal_accuracy_m: 12.0 + 9.0 * (s * 0.1).sin(),
    })
}

pub struct SimulatedGps {
    profile: GpsProfile,
    authorized: bool,
    granted: bool,
    handle: Option<JoinHandle<()>>,
}

impl SimulatedGps {
    pub fn new(profile: GpsProfile) -> Self {
        Self {
            profile,
            authorized: true,
            granted: false,
            handle: None,
        }
    }

    /// The user declines the location prompt
    pub fn denied() -> Self {
        let mut gps = Self::new(GpsProfile::default());
        gps.authorized = false;
        gps
    }
}

impl GpsSource for SimulatedGps {
    fn name(&self) -> &str {
        "simulated gps"
    }

    fn request_authorization(&mut self) -> Authorization {
        self.granted = self.authorized;
        if self.granted {
            Authorization::Granted
        } else {
            Authorization::Denied
        }
    }

    fn start(&mut self, tx: Sender<SensorUpdate<GpsFix>>) -> AltResult<()> {
        if !self.granted {
            warn!("[GPS] start without authorization");
            return Err(AltimeterError::AuthorizationDenied);
        }
        if self.handle.is_some() {
            return Err(AltimeterError::AlreadyRunning);
        }

        let profile = self.profile.clone();
        self.handle = Some(tokio::spawn(async move {
            let mut ticker = interval(profile.interval);
            let mut seq = 0u64;
            let mut sample_count = 0u64;
            loop {
                ticker.tick().await;
                let update = gps_fix(&profile, seq);
                seq += 1;
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

impl Drop for SimulatedGps {
    fn drop(&mut self) {
        self.stop();
    }
}
