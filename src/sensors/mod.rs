pub mod simulated;
pub mod termux;

use log::{debug, info};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::mpsc::Sender;

use crate::error::AltResult;
use crate::types::{BaroSample, GpsFix, SensorUpdate};

pub use simulated::{SimulatedBarometer, SimulatedGps};
pub use termux::{TermuxBarometer, TermuxGps};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Authorization {
    Granted,
    Denied,
}

/// Relative-altitude barometer. `start` subscribes, `stop` unsubscribes.
pub trait BarometricSource: Send {
    fn name(&self) -> &str;

    fn is_available(&self) -> bool;

    fn start(&mut self, tx: Sender<SensorUpdate<BaroSample>>) -> AltResult<()>;

    /// Safe to call when already stopped.
    fn stop(&mut self);
}

/// Location provider delivering altitude and accuracy.
pub trait GpsSource: Send {
    fn name(&self) -> &str;

    fn request_authorization(&mut self) -> Authorization;

    fn start(&mut self, tx: Sender<SensorUpdate<GpsFix>>) -> AltResult<()>;

    /// Safe to call when already stopped.
    fn stop(&mut self);
}

impl<T: BarometricSource + ?Sized> BarometricSource for Box<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn is_available(&self) -> bool {
        (**self).is_available()
    }

    fn start(&mut self, tx: Sender<SensorUpdate<BaroSample>>) -> AltResult<()> {
        (**self).start(tx)
    }

    fn stop(&mut self) {
        (**self).stop()
    }
}

impl<T: GpsSource + ?Sized> GpsSource for Box<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn request_authorization(&mut self) -> Authorization {
        (**self).request_authorization()
    }

    fn start(&mut self, tx: Sender<SensorUpdate<GpsFix>>) -> AltResult<()> {
        (**self).start(tx)
    }

    fn stop(&mut self) {
        (**self).stop()
    }
}

/// Outcome of pushing one update into a source channel
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Delivery {
    Sent,
    Dropped,
    Closed,
}

/// Non-blocking send; a full channel drops the update rather than stalling the sensor loop.
pub(crate) fn deliver<T>(
    tag: &str,
    tx: &Sender<SensorUpdate<T>>,
    update: SensorUpdate<T>,
    sample_count: &mut u64,
) -> Delivery {
    match tx.try_send(update) {
        Ok(_) => {
            *sample_count += 1;
            if *sample_count % 100 == 0 {
                debug!("[{}] {} samples", tag, sample_count);
            }
            Delivery::Sent
        }
        Err(TrySendError::Closed(_)) => {
            info!("[{}] channel closed after {} samples", tag, sample_count);
            Delivery::Closed
        }
        Err(TrySendError::Full(_)) => Delivery::Dropped,
    }
}
