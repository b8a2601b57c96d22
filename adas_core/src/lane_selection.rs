//! Lane selection: reduces raw lane geometry to the per-cycle `LaneContext`
//! consumed by the gate, predictor and arbitrator.

use crate::error::AdasError;
use crate::types::{normalize_heading, EgoState};
use serde::{Deserialize, Serialize};

/// Curvature radius below which a lane counts as curved [m]
pub const CURVE_RADIUS_THRESHOLD: f64 = 800.0;

/// Radius change between segments that flags a curve transition [m]
pub const CURVE_TRANSITION_THRESHOLD: f64 = 400.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LaneType {
    Straight,
    Curve,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LaneChangeStatus {
    Keep,
    Changing,
    Done,
}

/// Lane description as delivered by the map/camera source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LaneGeometry {
    pub lane_type: LaneType,
    /// Radius of the current segment [m]; 0 when unknown
    pub curvature_radius: f64,
    /// Radius of the next segment [m]; 0 when unknown
    pub next_curvature_radius: f64,
    /// Ego offset from the lane center [m]
    pub lane_offset: f64,
    /// Lane heading [deg]
    pub lane_heading_deg: f64,
    /// [m]
    pub lane_width: f64,
    pub change_status: LaneChangeStatus,
}

impl LaneGeometry {
    /// Straight lane of the given width with the ego centered.
    pub fn straight(lane_width: f64) -> Self {
        Self {
            lane_type: LaneType::Straight,
            curvature_radius: 0.0,
            next_curvature_radius: 0.0,
            lane_offset: 0.0,
            lane_heading_deg: 0.0,
            lane_width,
            change_status: LaneChangeStatus::Keep,
        }
    }
}

/// Per-cycle lane summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LaneContext {
    /// Lane type as reported by the source, carried through unchanged
    pub lane_type: LaneType,
    pub is_curved: bool,
    /// Ego heading minus lane heading [deg] in (-180, 180]
    pub heading_error_deg: f64,
    /// [m]
    pub lane_offset: f64,
    /// [m]
    pub lane_width: f64,
    pub is_within_lane: bool,
    pub is_changing_lane: bool,
    pub curve_transition: bool,
}

impl LaneContext {
    /// Straight lane of the given width, ego centered and keeping lane.
    pub fn straight(lane_width: f64) -> Self {
        Self {
            lane_type: LaneType::Straight,
            is_curved: false,
            heading_error_deg: 0.0,
            lane_offset: 0.0,
            lane_width,
            is_within_lane: true,
            is_changing_lane: false,
            curve_transition: false,
        }
    }

    /// Derives the lane context from raw geometry and the current ego heading.
    pub fn from_geometry(geometry: &LaneGeometry, ego: &EgoState) -> Result<Self, AdasError> {
        let numbers = [
            geometry.curvature_radius,
            geometry.next_curvature_radius,
            geometry.lane_offset,
            geometry.lane_heading_deg,
            geometry.lane_width,
            ego.heading_deg,
        ];
        if numbers.iter().any(|v| !v.is_finite()) {
            return Err(AdasError::invalid("lane geometry contains non-finite values"));
        }
        if geometry.lane_width <= 0.0 {
            return Err(AdasError::invalid(format!(
                "lane width must be positive, got {}",
                geometry.lane_width
            )));
        }

        let radius = geometry.curvature_radius;
        let next_radius = geometry.next_curvature_radius;

        let is_curved = radius > 0.0 && radius < CURVE_RADIUS_THRESHOLD;
        let curve_transition = radius > 0.0
            && next_radius > 0.0
            && (next_radius - radius).abs() > CURVE_TRANSITION_THRESHOLD;

        Ok(Self {
            lane_type: geometry.lane_type,
            is_curved,
            heading_error_deg: normalize_heading(ego.heading_deg - geometry.lane_heading_deg),
            lane_offset: geometry.lane_offset,
            lane_width: geometry.lane_width,
            is_within_lane: geometry.lane_offset.abs() < geometry.lane_width * 0.5,
            is_changing_lane: geometry.change_status != LaneChangeStatus::Keep,
            curve_transition,
        })
    }

    /// Checks a caller-supplied context before the gate uses it.
    pub fn validate(&self) -> Result<(), AdasError> {
        if !(self.heading_error_deg.is_finite()
            && self.lane_offset.is_finite()
            && self.lane_width.is_finite())
        {
            return Err(AdasError::invalid("lane context contains non-finite values"));
        }
        if self.lane_width <= 0.0 {
            return Err(AdasError::invalid(format!(
                "lane width must be positive, got {}",
                self.lane_width
            )));
        }
        Ok(())
    }

    /// Converts a planar range into along-lane range.
    ///
    /// On curved lanes the range is divided by `|cos(heading_error)|` unless
    /// the cosine is too close to zero to be meaningful. The result is never
    /// negative for a non-negative range.
    pub fn along_lane_distance(&self, range: f64) -> f64 {
        if !self.is_curved {
            return range;
        }
        let c = self.heading_error_deg.to_radians().cos();
        if c.abs() > 1e-3 {
            range / c.abs()
        } else {
            range
        }
    }

    /// Lateral offset of a point from the lane center [m].
    #[inline]
    pub fn lateral_offset(&self, y: f64) -> f64 {
        y - self.lane_offset
    }
}
