use log::{info, warn};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::altimeter::{AltimeterSnapshot, AltimeterState};
use crate::config::AltimeterConfig;
use crate::error::{AltResult, AltimeterError};
use crate::sensors::{Authorization, BarometricSource, GpsSource};
use crate::types::{BaroSample, GpsFix, SensorUpdate};

/// Which sources actually came up on `start`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StartReport {
    pub barometer: bool,
    pub gps: bool,
}

impl StartReport {
    pub fn gps_only(&self) -> bool {
        self.gps && !self.barometer
    }
}

/// Owns both sources and the shared state; one consumer task per source.
pub struct AltimeterSession<B: BarometricSource, G: GpsSource> {
    barometer: B,
    gps: G,
    state: AltimeterState,
    channel_capacity: usize,
    consumers: Vec<JoinHandle<()>>,
    running: bool,
}

impl<B: BarometricSource, G: GpsSource> AltimeterSession<B, G> {
    pub fn new(barometer: B, gps: G, config: &AltimeterConfig) -> Self {
        Self {
            barometer,
            gps,
            state: AltimeterState::new(config.reference_pressure_hpa, config.signal_thresholds),
            channel_capacity: config.channel_capacity.max(1),
            consumers: Vec::new(),
            running: false,
        }
    }

    /// Handle for readers; clones share the same slots.
    pub fn state(&self) -> AltimeterState {
        self.state.clone()
    }

    pub fn snapshot(&self) -> AltimeterSnapshot {
        self.state.snapshot()
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Subscribe to both sources. Must be called inside a tokio runtime.
    ///
    /// A missing barometer or a denied location prompt is not an error: the
    /// session runs with whatever came up, and the other slot stays at its
    /// initial values.
    pub fn start(&mut self) -> AltResult<StartReport> {
        if self.running {
            return Err(AltimeterError::AlreadyRunning);
        }

        let gps = match self.gps.request_authorization() {
            Authorization::Granted => self.start_gps(),
            Authorization::Denied => {
                warn!("[GPS] {}", AltimeterError::AuthorizationDenied);
                false
            }
        };

        let barometer = if self.barometer.is_available() {
            self.start_barometer()
        } else {
            warn!(
                "[BARO] {}, continuing GPS-only",
                AltimeterError::SensorUnavailable(self.barometer.name().to_string())
            );
            false
        };

        self.running = true;
        let report = StartReport { barometer, gps };
        info!(
            "[SESSION] started (barometer: {}, gps: {})",
            report.barometer, report.gps
        );
        Ok(report)
    }

    fn start_barometer(&mut self) -> bool {
        let (tx, mut rx) = mpsc::channel::<SensorUpdate<BaroSample>>(self.channel_capacity);
        if let Err(e) = self.barometer.start(tx) {
            warn!("[BARO] failed to start {}: {}", self.barometer.name(), e);
            return false;
        }
        let state = self.state.clone();
        self.consumers.push(tokio::spawn(async move {
            while let Some(update) = rx.recv().await {
                state.apply_baro(update);
            }
        }));
        true
    }

    fn start_gps(&mut self) -> bool {
        let (tx, mut rx) = mpsc::channel::<SensorUpdate<GpsFix>>(self.channel_capacity);
        if let Err(e) = self.gps.start(tx) {
            warn!("[GPS] failed to start {}: {}", self.gps.name(), e);
            return false;
        }
        let state = self.state.clone();
        self.consumers.push(tokio::spawn(async move {
            while let Some(update) = rx.recv().await {
                state.apply_gps(update);
            }
        }));
        true
    }

    /// Unsubscribe from both sources. Calling it when stopped does nothing.
    pub fn stop(&mut self) {
        if !self.running {
            return;
        }
        self.barometer.stop();
        self.gps.stop();
        for handle in self.consumers.drain(..) {
            handle.abort();
        }
        self.running = false;
        info!("[SESSION] stopped");
    }
}

impl<B: BarometricSource, G: GpsSource> Drop for AltimeterSession<B, G> {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensors::simulated::{BaroProfile, GpsProfile};
    use crate::sensors::{SimulatedBarometer, SimulatedGps};
    use tokio::time::{sleep, Duration};

    fn fast_baro() -> SimulatedBarometer {
        SimulatedBarometer::new(BaroProfile {
            interval: Duration::from_millis(5),
            ..Default::default()
        })
    }

    fn fast_gps() -> SimulatedGps {
        SimulatedGps::new(GpsProfile {
            interval: Duration::from_millis(5),
            ..Default::default()
        })
    }

    async fn wait_for_updates<B: BarometricSource, G: GpsSource>(
        session: &AltimeterSession<B, G>,
        baro: u64,
        gps: u64,
    ) -> AltimeterSnapshot {
        for _ in 0..400 {
            let snap = session.snapshot();
            if snap.baro_updates >= baro && snap.gps_updates >= gps {
                return snap;
            }
            sleep(Duration::from_millis(5)).await;
        }
        panic!("timed out waiting for sensor updates");
    }

    #[tokio::test]
    async fn test_session_collects_both_sources() {
        let mut session = AltimeterSession::new(fast_baro(), fast_gps(), &AltimeterConfig::default());
        let report = session.start().unwrap();
        assert!(report.barometer && report.gps);

        let snap = wait_for_updates(&session, 3, 3).await;
        assert!(snap.barometric_altitude.is_finite());
        assert!(snap.gps_altitude.is_finite());
        assert_eq!(
            snap.displayed_altitude,
            snap.barometric_altitude.max(snap.gps_altitude)
        );

        session.stop();
        assert!(!session.is_running());
    }

    #[tokio::test]
    async fn test_start_twice_is_rejected() {
        let mut session = AltimeterSession::new(fast_baro(), fast_gps(), &AltimeterConfig::default());
        session.start().unwrap();
        assert_eq!(session.start(), Err(AltimeterError::AlreadyRunning));
    }

    #[tokio::test]
    async fn test_gps_only_mode_without_barometer() {
        let mut session = AltimeterSession::new(
            SimulatedBarometer::unavailable(),
            fast_gps(),
            &AltimeterConfig::default(),
        );
        let report = session.start().unwrap();
        assert!(report.gps_only());

        let snap = wait_for_updates(&session, 0, 2).await;
        assert_eq!(snap.baro_updates, 0);
        assert_eq!(snap.barometric_altitude, 0.0);
    }

    #[tokio::test]
    async fn test_denied_authorization_leaves_gps_unset() {
        let mut session = AltimeterSession::new(
            fast_baro(),
            SimulatedGps::denied(),
            &AltimeterConfig::default(),
        );
        let report = session.start().unwrap();
        assert!(report.barometer);
        assert!(!report.gps);

        let snap = wait_for_updates(&session, 2, 0).await;
        assert_eq!(snap.gps_updates, 0);
        assert_eq!(snap.gps_altitude, 0.0);
        assert_eq!(snap.signal_strength.value(), 0);
    }

    #[tokio::test]
    async fn test_callback_errors_do_not_stop_updates() {
        let baro = SimulatedBarometer::new(BaroProfile {
            interval: Duration::from_millis(5),
            error_every: Some(2),
            ..Default::default()
        });
        let mut session = AltimeterSession::new(baro, fast_gps(), &AltimeterConfig::default());
        session.start().unwrap();

        wait_for_updates(&session, 4, 0).await;
        let ignored = session.state().barometric.lock().unwrap().ignored;
        assert!(ignored >= 1);
    }

    #[tokio::test]
    async fn test_stop_is_idempotent_and_freezes_state() {
        let mut session = AltimeterSession::new(fast_baro(), fast_gps(), &AltimeterConfig::default());
        session.stop();
        assert!(!session.is_running());

        session.start().unwrap();
        wait_for_updates(&session, 2, 2).await;
        session.stop();
        session.stop();

        let frozen = session.snapshot();
        sleep(Duration::from_millis(40)).await;
        assert_eq!(session.snapshot(), frozen);
    }
}
