//! Ground truth oracle for simulation.
//!
//! The Oracle maintains the "God's eye view" of the driving scene:
//! - True ego kinematics (speed, acceleration, heading, yaw rate)
//! - True object states in the ego-aligned frame
//! - Sensor sample generation (GPS, IMU, perception) with noise and faults
//!
//! Objects are expressed relative to the ego vehicle: positions in the ego
//! frame, velocities as absolute speeds along the ego axes, which is what a
//! perception stack hands to the gate.

use adas_core::types::{GpsSample, ImuSample, ObjectStatus, ObjectType, RawObject};
use adas_core::EgoState;
use nalgebra::{Vector2, Vector3};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

use crate::error::SimError;

/// GPS fixes arrive this long after capture [ms]
const GPS_LATENCY_MS: f64 = 10.0;

/// Age of a fix delivered during a stale-GPS fault [ms]
const STALE_GPS_AGE_MS: f64 = 200.0;

/// Sensor noise standard deviations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorNoise {
    /// GPS velocity noise per axis [m/s]
    pub gps_velocity_std: f64,
    /// IMU acceleration noise per axis [m/s²]
    pub accel_std: f64,
    /// Gyro noise [deg/s]
    pub yaw_rate_std: f64,
    /// Perception position noise per axis [m]
    pub object_position_std: f64,
    /// Perception velocity noise per axis [m/s]
    pub object_velocity_std: f64,
}

impl Default for SensorNoise {
    fn default() -> Self {
        Self {
            gps_velocity_std: 0.05,
            accel_std: 0.05,
            yaw_rate_std: 0.2,
            object_position_std: 0.1,
            object_velocity_std: 0.05,
        }
    }
}

/// Sampled noise distributions, validated once.
#[derive(Debug, Clone)]
struct NoiseModel {
    gps_velocity: Normal<f64>,
    accel: Normal<f64>,
    yaw_rate: Normal<f64>,
    object_position: Normal<f64>,
    object_velocity: Normal<f64>,
}

impl NoiseModel {
    fn new(noise: &SensorNoise) -> Result<Self, SimError> {
        let normal = |name: &str, std: f64| {
            Normal::new(0.0, std).map_err(|e| SimError::InvalidNoise(format!("{name}: {e}")))
        };
        Ok(Self {
            gps_velocity: normal("gps_velocity_std", noise.gps_velocity_std)?,
            accel: normal("accel_std", noise.accel_std)?,
            yaw_rate: normal("yaw_rate_std", noise.yaw_rate_std)?,
            object_position: normal("object_position_std", noise.object_position_std)?,
            object_velocity: normal("object_velocity_std", noise.object_velocity_std)?,
        })
    }
}

/// A scheduled sensor fault.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum SensorFault {
    /// No GPS fix in `[from_s, to_s)`
    GpsDropout { from_s: f64, to_s: f64 },
    /// GPS fixes in `[from_s, to_s)` carry an old timestamp
    GpsStale { from_s: f64, to_s: f64 },
    /// One GPS fix near `at_s` is offset by `magnitude` m/s on x
    GpsSpike { at_s: f64, magnitude: f64 },
    /// One IMU sample near `at_s` is offset by `magnitude` m/s² on x
    ImuSpike { at_s: f64, magnitude: f64 },
}

/// True ego kinematics.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EgoTruth {
    pub velocity: Vector2<f64>,
    pub acceleration: Vector2<f64>,
    pub heading_deg: f64,
    pub yaw_rate_deg_s: f64,
}

impl EgoTruth {
    /// Ego driving straight at `speed` m/s.
    pub fn cruising(speed: f64) -> Self {
        Self {
            velocity: Vector2::new(speed, 0.0),
            acceleration: Vector2::zeros(),
            heading_deg: 0.0,
            yaw_rate_deg_s: 0.0,
        }
    }
}

/// A ground truth object in the ego-aligned frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectTruth {
    pub id: i32,
    pub object_type: ObjectType,
    /// Position relative to the ego vehicle [m]
    pub position: Vector3<f64>,
    /// Absolute velocity along the ego axes [m/s]
    pub velocity: Vector2<f64>,
    /// [m/s²]
    pub acceleration: Vector2<f64>,
    /// Heading relative to the ego heading [deg]
    pub relative_heading_deg: f64,
}

/// The Oracle - maintains ground truth and generates sensor samples.
pub struct Oracle {
    rng: ChaCha8Rng,
    noise: NoiseModel,
    ego: EgoTruth,
    objects: Vec<ObjectTruth>,
    faults: Vec<SensorFault>,
    next_id: i32,
    /// Current simulation time [s]
    current_time: f64,
    /// Half a tick, used to match one-shot faults to a single sample [s]
    fault_window: f64,
}

impl Oracle {
    /// Creates a new Oracle with the given physics seed.
    pub fn new(seed: u64, noise: &SensorNoise) -> Result<Self, SimError> {
        Ok(Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
            noise: NoiseModel::new(noise)?,
            ego: EgoTruth::cruising(0.0),
            objects: Vec::new(),
            faults: Vec::new(),
            next_id: 1,
            current_time: 0.0,
            fault_window: 0.025,
        })
    }

    /// Sets the tick period so one-shot faults fire exactly once.
    pub fn set_tick_period(&mut self, dt: f64) {
        self.fault_window = dt * 0.5;
    }

    pub fn set_ego(&mut self, ego: EgoTruth) {
        self.ego = ego;
    }

    pub fn ego(&self) -> &EgoTruth {
        &self.ego
    }

    /// Spawns a new object and returns its ID.
    pub fn spawn_object(
        &mut self,
        object_type: ObjectType,
        position: Vector3<f64>,
        velocity: Vector2<f64>,
    ) -> i32 {
        let id = self.next_id;
        self.next_id += 1;
        self.objects.push(ObjectTruth {
            id,
            object_type,
            position,
            velocity,
            acceleration: Vector2::zeros(),
            relative_heading_deg: 0.0,
        });
        id
    }

    pub fn object(&self, id: i32) -> Option<&ObjectTruth> {
        self.objects.iter().find(|o| o.id == id)
    }

    pub fn object_mut(&mut self, id: i32) -> Option<&mut ObjectTruth> {
        self.objects.iter_mut().find(|o| o.id == id)
    }

    /// Returns all scene objects in spawn order.
    pub fn objects(&self) -> &[ObjectTruth] {
        &self.objects
    }

    pub fn inject(&mut self, fault: SensorFault) {
        self.faults.push(fault);
    }

    /// Returns the current simulation time [s].
    pub fn time(&self) -> f64 {
        self.current_time
    }

    /// Current simulation time [ms].
    pub fn time_ms(&self) -> f64 {
        (self.current_time * 1000.0).round()
    }

    /// Advances physics by dt seconds.
    ///
    /// The ego never reverses: braking to a standstill clamps speed and
    /// longitudinal acceleration to zero.
    pub fn step(&mut self, dt: f64) {
        self.current_time += dt;

        let ego_prev = self.ego.velocity;
        let mut ego_next = ego_prev + self.ego.acceleration * dt;
        if self.ego.acceleration.x < 0.0 && ego_next.x <= 0.0 {
            ego_next.x = 0.0;
            self.ego.acceleration.x = 0.0;
        }
        self.ego.velocity = ego_next;
        self.ego.heading_deg += self.ego.yaw_rate_deg_s * dt;

        // Trapezoidal relative motion keeps accelerating pairs exact
        let ego_mean = (ego_prev + ego_next) * 0.5;
        for obj in self.objects.iter_mut() {
            let prev = obj.velocity;
            obj.velocity += obj.acceleration * dt;
            let relative = (prev + obj.velocity) * 0.5 - ego_mean;
            obj.position.x += relative.x * dt;
            obj.position.y += relative.y * dt;
        }
    }

    fn fault_active(&self, pred: impl Fn(&SensorFault) -> bool) -> bool {
        self.faults.iter().any(pred)
    }

    fn one_shot(&self, at_s: f64) -> bool {
        (self.current_time - at_s).abs() < self.fault_window
    }

    fn in_window(&self, from_s: f64, to_s: f64) -> bool {
        self.current_time >= from_s && self.current_time < to_s
    }

    /// GPS velocity fix for the current time, or `None` during a dropout.
    pub fn gps_sample(&mut self) -> Option<GpsSample> {
        let dropout = self.fault_active(|f| {
            matches!(*f, SensorFault::GpsDropout { from_s, to_s } if self.in_window(from_s, to_s))
        });
        if dropout {
            return None;
        }

        let stale = self.fault_active(|f| {
            matches!(*f, SensorFault::GpsStale { from_s, to_s } if self.in_window(from_s, to_s))
        });
        let spike: f64 = self
            .faults
            .iter()
            .filter_map(|f| match *f {
                SensorFault::GpsSpike { at_s, magnitude } if self.one_shot(at_s) => Some(magnitude),
                _ => None,
            })
            .sum();

        let age = if stale { STALE_GPS_AGE_MS } else { GPS_LATENCY_MS };
        let vel_x = self.ego.velocity.x + self.noise.gps_velocity.sample(&mut self.rng) + spike;
        let vel_y = self.ego.velocity.y + self.noise.gps_velocity.sample(&mut self.rng);

        Some(GpsSample {
            vel_x,
            vel_y,
            timestamp_ms: self.time_ms() - age,
        })
    }

    /// IMU reading for the current time.
    pub fn imu_sample(&mut self) -> ImuSample {
        let spike: f64 = self
            .faults
            .iter()
            .filter_map(|f| match *f {
                SensorFault::ImuSpike { at_s, magnitude } if self.one_shot(at_s) => Some(magnitude),
                _ => None,
            })
            .sum();

        ImuSample {
            accel_x: self.ego.acceleration.x + self.noise.accel.sample(&mut self.rng) + spike,
            accel_y: self.ego.acceleration.y + self.noise.accel.sample(&mut self.rng),
            yaw_rate_deg_s: self.ego.yaw_rate_deg_s + self.noise.yaw_rate.sample(&mut self.rng),
        }
    }

    /// Perception object list for the current time.
    pub fn perceive(&mut self) -> Vec<RawObject> {
        let heading = self.ego.heading_deg;
        let mut out = Vec::with_capacity(self.objects.len());

        for obj in self.objects.iter() {
            let x = obj.position.x + self.noise.object_position.sample(&mut self.rng);
            let y = obj.position.y + self.noise.object_position.sample(&mut self.rng);
            let vx = obj.velocity.x + self.noise.object_velocity.sample(&mut self.rng);
            let vy = obj.velocity.y + self.noise.object_velocity.sample(&mut self.rng);

            let status = if obj.velocity.norm() > 0.5 {
                ObjectStatus::Moving
            } else {
                ObjectStatus::Stationary
            };

            out.push(RawObject {
                id: obj.id,
                object_type: obj.object_type,
                position: Vector3::new(x, y, obj.position.z),
                velocity: Vector2::new(vx, vy),
                acceleration: obj.acceleration,
                heading_deg: heading + obj.relative_heading_deg,
                distance: x.hypot(y),
                status,
            });
        }
        out
    }

    /// Ego truth in the shape the estimator produces, for error metrics.
    pub fn ego_state(&self) -> EgoState {
        EgoState {
            velocity: self.ego.velocity,
            acceleration: self.ego.acceleration,
            heading_deg: adas_core::types::normalize_heading(self.ego.heading_deg),
            yaw_rate_deg_s: self.ego.yaw_rate_deg_s,
            position: Vector3::zeros(),
        }
    }
}
