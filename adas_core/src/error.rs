//! Error types for the ADAS core.

use thiserror::Error;

/// Fault taxonomy of the perception-to-decision core.
///
/// Only `InvalidInput` is ever returned as an `Err` from a stage;
/// `InvalidConfig` comes from configuration loading. The sensor
/// faults are absorbed inside the estimator cycle and surface as counters in
/// [`FaultCounters`](crate::ego_estimation::FaultCounters); the variants exist
/// so callers can log and report them uniformly.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AdasError {
    /// Collaborator data is missing or malformed (non-finite, non-positive width, ...)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A sensor delta exceeded its physical plausibility threshold
    #[error("Sensor spike on {channel}: |delta| = {delta:.3}")]
    SensorSpike { channel: SensorChannel, delta: f64 },

    /// GPS timestamp skew exceeded the validity window
    #[error("Stale GPS measurement: skew {skew_ms:.1}ms")]
    StaleMeasurement { skew_ms: f64 },

    /// Innovation covariance could not be inverted
    #[error("Singular innovation covariance: det = {det:e}")]
    SingularCovariance { det: f64 },

    /// Pipeline configuration could not be parsed or is out of range
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl AdasError {
    /// Creates an invalid-input error.
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Creates an invalid-config error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }
}

/// Sensor channels guarded by spike rejection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SensorChannel {
    AccelX,
    AccelY,
    YawRate,
    GpsVelX,
    GpsVelY,
}

impl std::fmt::Display for SensorChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SensorChannel::AccelX => "accel_x",
            SensorChannel::AccelY => "accel_y",
            SensorChannel::YawRate => "yaw_rate",
            SensorChannel::GpsVelX => "gps_vel_x",
            SensorChannel::GpsVelY => "gps_vel_y",
        };
        f.write_str(name)
    }
}
