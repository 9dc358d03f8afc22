// Altimeter core
// Barometric and GPS altitude slots, dial geometry, and sensor sources

pub mod altimeter;
pub mod config;
pub mod error;
pub mod normalizer;
pub mod sensors;
pub mod session;
pub mod status;
pub mod types;

pub use altimeter::{AltimeterSnapshot, AltimeterState, BarometricAltimeter, GpsAltimeter};
pub use config::AltimeterConfig;
pub use error::{AltResult, AltimeterError};
pub use normalizer::{
    normalize_degrees, pointer_angle_degrees, pressure_altitude, relative_altitude,
    signal_quality, FeetDial, SignalQuality, SignalThresholds,
};
pub use session::{AltimeterSession, StartReport};
pub use status::{AltimeterStatus, GaugeReadout};
pub use types::{AltitudeReading, AltitudeSource, BaroSample, GpsFix, SensorUpdate};
