//! Shared data model: sensor samples, ego state, object lists and targets.
//!
//! Everything is expressed in the ego frame: the ego vehicle sits at the
//! origin, x points forward along the ego heading, y points left.

use nalgebra::{Vector2, Vector3};
use serde::{Deserialize, Serialize};

/// Upper bound on objects processed per cycle, regardless of `max_count`.
pub const MAX_OBJECTS: usize = 64;

/// Sentinel target id meaning "no target selected".
pub const NO_TARGET_ID: i32 = -1;

/// Wraps an angle in degrees into (-180, 180].
pub fn normalize_heading(deg: f64) -> f64 {
    let wrapped = deg.rem_euclid(360.0);
    if wrapped > 180.0 {
        wrapped - 360.0
    } else {
        wrapped
    }
}

// ============================================================================
// SENSOR INPUTS
// ============================================================================

/// Control-loop clock sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeSample {
    /// Current cycle time [ms]
    pub current_time_ms: f64,
}

impl TimeSample {
    pub fn new(current_time_ms: f64) -> Self {
        Self { current_time_ms }
    }
}

/// GPS velocity fix.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GpsSample {
    /// Longitudinal velocity [m/s]
    pub vel_x: f64,
    /// Lateral velocity [m/s]
    pub vel_y: f64,
    /// Capture time [ms], same clock as `TimeSample`
    pub timestamp_ms: f64,
}

/// IMU reading.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ImuSample {
    /// [m/s²]
    pub accel_x: f64,
    /// [m/s²]
    pub accel_y: f64,
    /// [deg/s]
    pub yaw_rate_deg_s: f64,
}

// ============================================================================
// EGO STATE
// ============================================================================

/// Filtered ego kinematics produced by the estimator once per cycle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EgoState {
    /// [m/s]
    pub velocity: Vector2<f64>,
    /// [m/s²]
    pub acceleration: Vector2<f64>,
    /// [deg], always in (-180, 180]
    pub heading_deg: f64,
    /// [deg/s]
    pub yaw_rate_deg_s: f64,
    /// Always the origin: the estimator tracks motion, not pose
    pub position: Vector3<f64>,
}

impl Default for EgoState {
    fn default() -> Self {
        Self {
            velocity: Vector2::zeros(),
            acceleration: Vector2::zeros(),
            heading_deg: 0.0,
            yaw_rate_deg_s: 0.0,
            position: Vector3::zeros(),
        }
    }
}

// ============================================================================
// OBJECTS
// ============================================================================

/// Perceived object class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectType {
    Car,
    Pedestrian,
    Bicycle,
    Motorcycle,
}

/// Motion status of an object relative to the ego vehicle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectStatus {
    Moving,
    Stopped,
    Stationary,
    Oncoming,
}

impl ObjectStatus {
    /// Moving or stopped in traffic, i.e. a vehicle the ego lane can follow.
    #[inline]
    pub fn is_in_traffic(self) -> bool {
        matches!(self, ObjectStatus::Moving | ObjectStatus::Stopped)
    }
}

/// An object as delivered by the perception source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawObject {
    /// Unique within a cycle, non-negative
    pub id: i32,
    pub object_type: ObjectType,
    /// [m] ego frame
    pub position: Vector3<f64>,
    /// [m/s]
    pub velocity: Vector2<f64>,
    /// [m/s²]
    pub acceleration: Vector2<f64>,
    /// [deg]
    pub heading_deg: f64,
    /// Range reported by perception [m]
    pub distance: f64,
    pub status: ObjectStatus,
}

impl RawObject {
    /// True when every numeric field is finite.
    pub fn is_finite(&self) -> bool {
        self.position.iter().all(|v| v.is_finite())
            && self.velocity.iter().all(|v| v.is_finite())
            && self.acceleration.iter().all(|v| v.is_finite())
            && self.heading_deg.is_finite()
            && self.distance.is_finite()
    }
}

/// An object that passed the gate, with reclassified status and a spatial cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilteredObject {
    pub id: i32,
    pub object_type: ObjectType,
    pub position: Vector3<f64>,
    pub velocity: Vector2<f64>,
    pub acceleration: Vector2<f64>,
    /// [deg] in (-180, 180]
    pub heading_deg: f64,
    /// Along-lane range [m], curve corrected
    pub distance: f64,
    pub status: ObjectStatus,
    /// Spatial bucket in [1, 20]
    pub cell_id: u8,
}

/// A gated object extrapolated to the prediction horizon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictedObject {
    pub id: i32,
    pub object_type: ObjectType,
    /// Position at the horizon [m]
    pub position: Vector3<f64>,
    pub velocity: Vector2<f64>,
    pub acceleration: Vector2<f64>,
    pub heading_deg: f64,
    /// Along-lane range of the horizon position [m]
    pub distance: f64,
    pub status: ObjectStatus,
    pub cell_id: u8,
    pub cut_in: bool,
    pub cut_out: bool,
}

// ============================================================================
// TARGETS
// ============================================================================

/// Traffic situation attached to a selected target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Situation {
    #[default]
    Normal,
    CutIn,
    CutOut,
    Curve,
}

/// Priority target handed to a control law (ACC or AEB).
///
/// `id == NO_TARGET_ID` means nothing was selected this cycle; the kinematic
/// fields are zeroed in that case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Target {
    pub id: i32,
    pub position: Vector3<f64>,
    pub velocity: Vector2<f64>,
    pub acceleration: Vector2<f64>,
    pub distance: f64,
    pub heading_deg: f64,
    pub status: ObjectStatus,
    pub situation: Situation,
}

impl Target {
    /// The "no target" value.
    pub fn none() -> Self {
        Self {
            id: NO_TARGET_ID,
            position: Vector3::zeros(),
            velocity: Vector2::zeros(),
            acceleration: Vector2::zeros(),
            distance: 0.0,
            heading_deg: 0.0,
            status: ObjectStatus::Stationary,
            situation: Situation::Normal,
        }
    }

    /// Snapshot of a predicted object tagged with its situation.
    pub fn from_predicted(obj: &PredictedObject, situation: Situation) -> Self {
        Self {
            id: obj.id,
            position: obj.position,
            velocity: obj.velocity,
            acceleration: obj.acceleration,
            distance: obj.distance,
            heading_deg: obj.heading_deg,
            status: obj.status,
            situation,
        }
    }

    #[inline]
    pub fn is_selected(&self) -> bool {
        self.id != NO_TARGET_ID
    }

    /// Selected object id, if any.
    pub fn object_id(&self) -> Option<i32> {
        self.is_selected().then_some(self.id)
    }
}

impl Default for Target {
    fn default() -> Self {
        Self::none()
    }
}

/// The per-cycle arbitration result: exactly one ACC and one AEB target.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TargetSelection {
    pub acc: Target,
    pub aeb: Target,
}

impl TargetSelection {
    pub fn none() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_normalize_heading_range() {
        assert_relative_eq!(normalize_heading(0.0), 0.0);
        assert_relative_eq!(normalize_heading(180.0), 180.0);
        assert_relative_eq!(normalize_heading(-180.0), 180.0);
        assert_relative_eq!(normalize_heading(190.0), -170.0);
        assert_relative_eq!(normalize_heading(-190.0), 170.0);
        assert_relative_eq!(normalize_heading(725.0), 5.0);
    }

    #[test]
    fn test_target_none_sentinel() {
        let target = Target::none();
        assert_eq!(target.id, NO_TARGET_ID);
        assert!(!target.is_selected());
        assert_eq!(target.object_id(), None);
        assert_eq!(target.situation, Situation::Normal);
    }

    #[test]
    fn test_raw_object_finiteness() {
        let mut obj = RawObject {
            id: 1,
            object_type: ObjectType::Car,
            position: Vector3::new(10.0, 0.0, 0.0),
            velocity: Vector2::new(5.0, 0.0),
            acceleration: Vector2::zeros(),
            heading_deg: 0.0,
            distance: 10.0,
            status: ObjectStatus::Moving,
        };
        assert!(obj.is_finite());

        obj.velocity.y = f64::NAN;
        assert!(!obj.is_finite());
    }
}
