//! The ego estimator - sensor fault filter + linear Kalman filter
//!
//! Fuses IMU accelerations and yaw rate with GPS velocity fixes into a
//! 5-dimensional ego state `[vx, vy, ax, ay, heading]`. Every fault
//! (stale GPS, sensor spike, singular innovation) degrades to the
//! open-loop prediction; a cycle never aborts.
//!
//! The filter state lives in [`EstimatorState`], owned by exactly one
//! vehicle session and passed in by `&mut` each cycle. [`EgoEstimator`]
//! itself only holds configuration and can be shared freely.

use crate::error::{AdasError, SensorChannel};
use crate::types::{normalize_heading, EgoState, GpsSample, ImuSample, TimeSample};
use nalgebra::{Matrix2, Matrix2x5, Matrix5, Vector2, Vector3, Vector5};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

const VX: usize = 0;
const VY: usize = 1;
const AX: usize = 2;
const AY: usize = 3;
const HEADING: usize = 4;

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Tuning of the fault filter and the Kalman filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EstimatorConfig {
    /// Maximum |current_time - gps.timestamp| for a usable fix (default: 50 ms)
    pub gps_validity_ms: f64,

    /// Accel spike threshold per axis (default: 3.0 m/s²)
    pub accel_spike_threshold: f64,

    /// Yaw rate spike threshold (default: 30 deg/s)
    pub yaw_rate_spike_threshold: f64,

    /// GPS velocity spike threshold per axis (default: 10 m/s)
    pub gps_velocity_spike_threshold: f64,

    /// Lower bound on the integration step (default: 1 ms)
    pub min_dt_s: f64,

    /// Diagonal of Q for [vx, vy, ax, ay, heading]
    pub process_noise: [f64; 5],

    /// Diagonal of R for [gps_vx, gps_vy]
    pub measurement_noise: [f64; 2],

    /// Initial variance on every state (P0 = I * value)
    pub initial_variance: f64,

    /// |det S| below which the innovation covariance counts as singular
    pub singular_det_threshold: f64,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            gps_validity_ms: 50.0,
            accel_spike_threshold: 3.0,
            yaw_rate_spike_threshold: 30.0,
            gps_velocity_spike_threshold: 10.0,
            min_dt_s: 1e-3,
            process_noise: [0.01; 5],
            measurement_noise: [0.1; 2],
            initial_variance: 1.0,
            singular_det_threshold: 1e-6,
        }
    }
}

// ============================================================================
// PERSISTENT STATE
// ============================================================================

/// Last sensor values that passed spike rejection.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct AcceptedSamples {
    pub accel_x: f64,
    pub accel_y: f64,
    pub yaw_rate_deg_s: f64,
    pub gps_vel_x: f64,
    pub gps_vel_y: f64,
}

/// Faults observed during the most recent cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CycleFaults {
    /// GPS missing or outside the validity window
    pub stale_gps: bool,
    pub gps_spike: bool,
    pub accel_spike: bool,
    pub yaw_rate_spike: bool,
    pub singular_innovation: bool,
    pub non_finite_sample: bool,
    /// A GPS correction was applied this cycle
    pub corrected: bool,
}

impl CycleFaults {
    /// True if any fault occurred.
    pub fn any(&self) -> bool {
        self.stale_gps
            || self.gps_spike
            || self.accel_spike
            || self.yaw_rate_spike
            || self.singular_innovation
            || self.non_finite_sample
    }
}

/// Session-lifetime fault counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FaultCounters {
    pub cycles: u64,
    pub corrections: u64,
    pub stale_gps: u64,
    pub gps_spikes: u64,
    pub accel_spikes: u64,
    pub yaw_rate_spikes: u64,
    pub singular_innovations: u64,
    pub non_finite_samples: u64,
}

impl FaultCounters {
    fn record(&mut self, faults: &CycleFaults) {
        self.cycles += 1;
        self.corrections += faults.corrected as u64;
        self.stale_gps += faults.stale_gps as u64;
        self.gps_spikes += faults.gps_spike as u64;
        self.accel_spikes += faults.accel_spike as u64;
        self.yaw_rate_spikes += faults.yaw_rate_spike as u64;
        self.singular_innovations += faults.singular_innovation as u64;
        self.non_finite_samples += faults.non_finite_sample as u64;
    }
}

/// Persistent filter state of one vehicle session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EstimatorState {
    /// [vx, vy, ax, ay, heading]
    pub state_vector: Vector5<f64>,

    /// 5x5 estimate covariance
    pub covariance: Matrix5<f64>,

    /// Last values accepted by the spike filter
    pub last_accepted: AcceptedSamples,

    /// Time of the previous update [ms]
    pub prev_update_time_ms: f64,

    /// Accumulated fault statistics
    pub counters: FaultCounters,

    /// Faults of the latest cycle
    pub last_faults: CycleFaults,
}

impl EstimatorState {
    /// Zero state at t = 0 with the configured initial covariance.
    pub fn new(config: &EstimatorConfig) -> Self {
        Self {
            state_vector: Vector5::zeros(),
            covariance: Matrix5::identity() * config.initial_variance,
            last_accepted: AcceptedSamples::default(),
            prev_update_time_ms: 0.0,
            counters: FaultCounters::default(),
            last_faults: CycleFaults::default(),
        }
    }

    /// State primed for a session that starts in motion.
    ///
    /// The spike filter compares against the last accepted values, so a
    /// vehicle that boots at speed must seed them or every GPS fix would be
    /// rejected as a spike against the zero default.
    pub fn seeded(
        config: &EstimatorConfig,
        time_ms: f64,
        velocity: Vector2<f64>,
        imu: &ImuSample,
        heading_deg: f64,
    ) -> Self {
        let mut state = Self::new(config);
        state.state_vector = Vector5::new(
            velocity.x,
            velocity.y,
            imu.accel_x,
            imu.accel_y,
            normalize_heading(heading_deg),
        );
        state.last_accepted = AcceptedSamples {
            accel_x: imu.accel_x,
            accel_y: imu.accel_y,
            yaw_rate_deg_s: imu.yaw_rate_deg_s,
            gps_vel_x: velocity.x,
            gps_vel_y: velocity.y,
        };
        state.prev_update_time_ms = time_ms;
        state
    }
}

impl Default for EstimatorState {
    fn default() -> Self {
        Self::new(&EstimatorConfig::default())
    }
}

// ============================================================================
// SPIKE FILTER
// ============================================================================

/// Outcome of a single-channel plausibility check.
#[derive(Debug, Clone, Copy, PartialEq)]
enum SampleCheck {
    Accepted,
    Spike(f64),
    NonFinite,
}

fn check_sample(raw: f64, last: f64, threshold: f64) -> SampleCheck {
    if !raw.is_finite() {
        return SampleCheck::NonFinite;
    }
    let delta = raw - last;
    if delta.abs() > threshold {
        SampleCheck::Spike(delta)
    } else {
        SampleCheck::Accepted
    }
}

// ============================================================================
// ESTIMATOR
// ============================================================================

/// Kalman ego estimator. Stateless apart from configuration.
#[derive(Debug, Clone, Default)]
pub struct EgoEstimator {
    pub config: EstimatorConfig,
}

impl EgoEstimator {
    pub fn new(config: EstimatorConfig) -> Self {
        Self { config }
    }

    /// Fresh filter state matching this estimator's configuration.
    pub fn initial_state(&self) -> EstimatorState {
        EstimatorState::new(&self.config)
    }

    /// Runs one estimation cycle and returns the new ego state.
    ///
    /// `gps` is `None` when no fix was delivered this cycle; that is handled
    /// exactly like a stale fix.
    pub fn update(
        &self,
        time: TimeSample,
        gps: Option<&GpsSample>,
        imu: &ImuSample,
        state: &mut EstimatorState,
    ) -> EgoState {
        let now = time.current_time_ms;
        let mut faults = CycleFaults::default();

        // Step 1: GPS validity window
        let mut gps_valid = match gps {
            Some(fix) => {
                let skew_ms = (now - fix.timestamp_ms).abs();
                // NaN skew fails the comparison and lands in the stale branch
                if skew_ms <= self.config.gps_validity_ms {
                    true
                } else {
                    debug!("{}", AdasError::StaleMeasurement { skew_ms });
                    false
                }
            }
            None => false,
        };
        faults.stale_gps = !gps_valid;

        // Step 2: Spike rejection on IMU channels
        let accel_x = self.filter_channel(
            SensorChannel::AccelX,
            imu.accel_x,
            &mut state.last_accepted.accel_x,
            self.config.accel_spike_threshold,
            &mut faults,
        );
        let accel_y = self.filter_channel(
            SensorChannel::AccelY,
            imu.accel_y,
            &mut state.last_accepted.accel_y,
            self.config.accel_spike_threshold,
            &mut faults,
        );
        let yaw_rate = self.filter_channel(
            SensorChannel::YawRate,
            imu.yaw_rate_deg_s,
            &mut state.last_accepted.yaw_rate_deg_s,
            self.config.yaw_rate_spike_threshold,
            &mut faults,
        );

        // Step 3: Spike rejection on GPS; any bad axis drops the whole fix
        let mut measurement = None;
        if let (true, Some(fix)) = (gps_valid, gps) {
            let checks = [
                (SensorChannel::GpsVelX, fix.vel_x, state.last_accepted.gps_vel_x),
                (SensorChannel::GpsVelY, fix.vel_y, state.last_accepted.gps_vel_y),
            ];
            for (channel, raw, last) in checks {
                match check_sample(raw, last, self.config.gps_velocity_spike_threshold) {
                    SampleCheck::Accepted => {}
                    SampleCheck::Spike(delta) => {
                        debug!("{}", AdasError::SensorSpike { channel, delta });
                        faults.gps_spike = true;
                        gps_valid = false;
                    }
                    SampleCheck::NonFinite => {
                        faults.non_finite_sample = true;
                        gps_valid = false;
                    }
                }
            }
            if gps_valid {
                state.last_accepted.gps_vel_x = fix.vel_x;
                state.last_accepted.gps_vel_y = fix.vel_y;
                measurement = Some(Vector2::new(fix.vel_x, fix.vel_y));
            }
        }

        // Step 4: Integration step, prev time advances unconditionally
        let dt = ((now - state.prev_update_time_ms) / 1000.0).max(self.config.min_dt_s);
        state.prev_update_time_ms = now;

        // Step 5: Predict
        self.predict(state, accel_x, accel_y, yaw_rate, dt);

        // Step 6: Correct
        if let Some(z) = measurement {
            match self.correct(state, z) {
                Ok(()) => faults.corrected = true,
                Err(err) => {
                    warn!("Skipping GPS correction: {}", err);
                    faults.singular_innovation = true;
                }
            }
        }

        state.state_vector[HEADING] = normalize_heading(state.state_vector[HEADING]);
        state.counters.record(&faults);
        state.last_faults = faults;

        let x = &state.state_vector;
        EgoState {
            velocity: Vector2::new(x[VX], x[VY]),
            acceleration: Vector2::new(x[AX], x[AY]),
            heading_deg: x[HEADING],
            yaw_rate_deg_s: yaw_rate,
            position: Vector3::zeros(),
        }
    }

    /// State transition matrix for step `dt`.
    ///
    /// ```text
    /// vx += ax * dt
    /// vy += ay * dt
    /// ```
    pub fn transition_matrix(dt: f64) -> Matrix5<f64> {
        let mut a = Matrix5::identity();
        a[(VX, AX)] = dt;
        a[(VY, AY)] = dt;
        a
    }

    /// Measurement matrix: GPS observes (vx, vy) directly.
    pub fn measurement_matrix() -> Matrix2x5<f64> {
        let mut h = Matrix2x5::zeros();
        h[(0, VX)] = 1.0;
        h[(1, VY)] = 1.0;
        h
    }

    fn process_noise(&self) -> Matrix5<f64> {
        Matrix5::from_diagonal(&Vector5::from(self.config.process_noise))
    }

    fn measurement_noise(&self) -> Matrix2<f64> {
        Matrix2::from_diagonal(&Vector2::from(self.config.measurement_noise))
    }

    /// Applies the spike filter to one IMU channel and returns the value to use.
    fn filter_channel(
        &self,
        channel: SensorChannel,
        raw: f64,
        last: &mut f64,
        threshold: f64,
        faults: &mut CycleFaults,
    ) -> f64 {
        match check_sample(raw, *last, threshold) {
            SampleCheck::Accepted => {
                *last = raw;
                raw
            }
            SampleCheck::Spike(delta) => {
                debug!("{}", AdasError::SensorSpike { channel, delta });
                match channel {
                    SensorChannel::YawRate => faults.yaw_rate_spike = true,
                    _ => faults.accel_spike = true,
                }
                *last
            }
            SampleCheck::NonFinite => {
                faults.non_finite_sample = true;
                *last
            }
        }
    }

    /// Prediction step.
    ///
    /// The filtered IMU accelerations replace the acceleration states, then
    /// `x = A x + B yaw_rate` and `P = A P Aᵀ + Q`.
    fn predict(&self, state: &mut EstimatorState, ax: f64, ay: f64, yaw_rate: f64, dt: f64) {
        state.state_vector[AX] = ax;
        state.state_vector[AY] = ay;

        let a = Self::transition_matrix(dt);
        state.state_vector = a * state.state_vector;
        state.state_vector[HEADING] += yaw_rate * dt;

        state.covariance = a * state.covariance * a.transpose() + self.process_noise();
    }

    /// Correction step with GPS velocity `z`.
    ///
    /// Uses an explicit 2x2 inverse of S. The acceleration states keep the
    /// accepted IMU values. On a singular S the state is left at the
    /// prediction and the error is returned.
    fn correct(&self, state: &mut EstimatorState, z: Vector2<f64>) -> Result<(), AdasError> {
        let h = Self::measurement_matrix();
        let p = state.covariance;

        // Innovation y = z - H x
        let innovation = z - h * state.state_vector;

        // S = H P Hᵀ + R
        let s = h * p * h.transpose() + self.measurement_noise();
        let det = s[(0, 0)] * s[(1, 1)] - s[(0, 1)] * s[(1, 0)];
        // Negated comparison also catches NaN
        if !(det.abs() >= self.config.singular_det_threshold) {
            return Err(AdasError::SingularCovariance { det });
        }
        let s_inv = Matrix2::new(s[(1, 1)], -s[(0, 1)], -s[(1, 0)], s[(0, 0)]) / det;

        // K = P Hᵀ S⁻¹
        let gain = p * h.transpose() * s_inv;

        // Acceleration states stay on the accepted IMU values
        let (ax, ay) = (state.state_vector[AX], state.state_vector[AY]);
        state.state_vector += gain * innovation;
        state.state_vector[AX] = ax;
        state.state_vector[AY] = ay;

        state.covariance = (Matrix5::identity() - gain * h) * p;
        Ok(())
    }
}
