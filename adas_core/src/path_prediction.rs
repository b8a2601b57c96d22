//! Path predictor - extrapolates gated objects to a fixed horizon and flags
//! lane cut-ins and cut-outs.

use crate::lane_selection::LaneContext;
use crate::types::{FilteredObject, ObjectStatus, PredictedObject, MAX_OBJECTS};
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

/// Predictor tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PredictionConfig {
    /// Extrapolation horizon (default: 3.0 s)
    pub horizon_s: f64,

    /// Max |predicted lateral offset| for a cut-in (default: 0.85 m)
    pub cut_in_lateral_m: f64,

    /// Margin beyond the half lane width for a cut-out (default: 0.85 m)
    pub cut_out_margin_m: f64,

    /// Minimum longitudinal speed of a cut-in candidate (default: 0.5 m/s)
    pub cut_in_min_vx: f64,

    /// Minimum |lateral speed| for either flag (default: 0.2 m/s)
    pub min_lateral_speed: f64,
}

impl Default for PredictionConfig {
    fn default() -> Self {
        Self {
            horizon_s: 3.0,
            cut_in_lateral_m: 0.85,
            cut_out_margin_m: 0.85,
            cut_in_min_vx: 0.5,
            min_lateral_speed: 0.2,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PathPredictor {
    pub config: PredictionConfig,
}

impl PathPredictor {
    pub fn new(config: PredictionConfig) -> Self {
        Self { config }
    }

    /// Predicts every filtered object (up to `min(max_count, MAX_OBJECTS)`).
    pub fn predict(
        &self,
        filtered: &[FilteredObject],
        lane: &LaneContext,
        max_count: usize,
    ) -> Vec<PredictedObject> {
        filtered
            .iter()
            .take(max_count.min(MAX_OBJECTS))
            .map(|obj| self.predict_one(obj, lane))
            .collect()
    }

    /// Horizon position of one object.
    ///
    /// Moving objects hold their velocity; everything else is extrapolated
    /// with its acceleration.
    pub fn extrapolate(&self, obj: &FilteredObject) -> Vector3<f64> {
        let t = self.config.horizon_s;
        let v = obj.velocity;
        let shift = match obj.status {
            ObjectStatus::Moving => v * t,
            _ => v * t + obj.acceleration * (0.5 * t * t),
        };
        Vector3::new(obj.position.x + shift.x, obj.position.y + shift.y, obj.position.z)
    }

    fn predict_one(&self, obj: &FilteredObject, lane: &LaneContext) -> PredictedObject {
        let position = self.extrapolate(obj);
        let planar_range = position.x.hypot(position.y);

        let lateral = lane.lateral_offset(position.y).abs();
        let vx = obj.velocity.x;
        let vy = obj.velocity.y.abs();

        let cut_in = vx >= self.config.cut_in_min_vx
            && vy >= self.config.min_lateral_speed
            && lateral <= self.config.cut_in_lateral_m;
        let cut_out = vy >= self.config.min_lateral_speed
            && lateral > lane.lane_width * 0.5 + self.config.cut_out_margin_m;

        PredictedObject {
            id: obj.id,
            object_type: obj.object_type,
            position,
            velocity: obj.velocity,
            acceleration: obj.acceleration,
            heading_deg: obj.heading_deg,
            distance: lane.along_lane_distance(planar_range),
            status: obj.status,
            cell_id: obj.cell_id,
            cut_in,
            cut_out,
        }
    }
}
