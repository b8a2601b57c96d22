//! Object gate - range/lateral gating, status reclassification and cell assignment
//!
//! Turns the raw perception list into the bounded set of objects that are
//! close enough to the ego lane to matter for longitudinal control.

use crate::error::AdasError;
use crate::lane_selection::LaneContext;
use crate::types::{
    normalize_heading, EgoState, FilteredObject, ObjectStatus, RawObject, MAX_OBJECTS,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Width of one longitudinal cell band step [m]
const CELL_LENGTH_M: f64 = 10.0;

pub const MIN_CELL_ID: u8 = 1;
pub const MAX_CELL_ID: u8 = 20;

/// Gate tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    /// Objects beyond this range are dropped (default: 200 m)
    pub max_range_m: f64,

    /// Extra lateral allowance per degree of heading error on curves (default: 0.05 m/deg)
    pub curve_lateral_gain: f64,

    /// Heading difference at or above which an object is oncoming (default: 150 deg)
    pub oncoming_heading_deg: f64,

    /// |obj.vx - ego.vx| at or above which an object is moving (default: 0.5 m/s)
    pub moving_rel_speed: f64,

    /// Keep a perception-reported Stopped status instead of Stationary
    pub preserve_stopped: bool,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            max_range_m: 200.0,
            curve_lateral_gain: 0.05,
            oncoming_heading_deg: 150.0,
            moving_rel_speed: 0.5,
            preserve_stopped: false,
        }
    }
}

/// Longitudinal cell for an along-lane distance, before the lateral shift.
///
/// ```text
/// [0, 60]    -> 1..=6
/// (60, 120]  -> 7..=12
/// (120, inf) -> 13..=20
/// ```
pub fn base_cell(distance: f64) -> i32 {
    let band = |start: f64, first: i32, last: i32| {
        let step = ((distance - start) / CELL_LENGTH_M).floor().max(0.0) as i32;
        (first + step).min(last)
    };
    if distance <= 60.0 {
        band(0.0, 1, 6)
    } else if distance <= 120.0 {
        band(60.0, 7, 12)
    } else {
        band(120.0, 13, 20)
    }
}

/// Final cell id: base cell shifted by the lateral position within the lane.
pub fn cell_id(distance: f64, lateral_offset: f64, lane_width: f64) -> u8 {
    let lateral = lateral_offset.abs();
    let mut cell = base_cell(distance);
    if lateral < lane_width * 0.25 {
        cell -= 1;
    } else if lateral >= lane_width * 0.75 {
        cell += 1;
    }
    cell.clamp(MIN_CELL_ID as i32, MAX_CELL_ID as i32) as u8
}

#[derive(Debug, Clone, Default)]
pub struct ObjectGate {
    pub config: GateConfig,
}

impl ObjectGate {
    pub fn new(config: GateConfig) -> Self {
        Self { config }
    }

    /// Gates the raw object list against the ego lane.
    ///
    /// Returns at most `min(max_count, MAX_OBJECTS)` objects in input order.
    /// Malformed objects are skipped; a malformed lane context is an error.
    pub fn filter(
        &self,
        raw: &[RawObject],
        ego: &EgoState,
        lane: &LaneContext,
        max_count: usize,
    ) -> Result<Vec<FilteredObject>, AdasError> {
        lane.validate()?;

        let capacity = max_count.min(MAX_OBJECTS);
        let mut filtered = Vec::with_capacity(capacity);

        let lateral_threshold = if lane.is_curved {
            lane.lane_width + lane.heading_error_deg.abs() * self.config.curve_lateral_gain
        } else {
            lane.lane_width
        };

        for obj in raw {
            if filtered.len() >= capacity {
                break;
            }

            if !obj.is_finite() || obj.id < 0 || obj.distance < 0.0 {
                debug!("Gate: skipping malformed object {}", obj.id);
                continue;
            }

            if obj.distance > self.config.max_range_m {
                debug!("Gate: object {} out of range ({:.1}m)", obj.id, obj.distance);
                continue;
            }

            let lateral = lane.lateral_offset(obj.position.y);
            if lateral.abs() > lateral_threshold {
                debug!(
                    "Gate: object {} outside lane corridor ({:.2}m > {:.2}m)",
                    obj.id,
                    lateral.abs(),
                    lateral_threshold
                );
                continue;
            }

            let distance = lane.along_lane_distance(obj.distance);

            filtered.push(FilteredObject {
                id: obj.id,
                object_type: obj.object_type,
                position: obj.position,
                velocity: obj.velocity,
                acceleration: obj.acceleration,
                heading_deg: normalize_heading(obj.heading_deg),
                distance,
                status: self.classify(obj, ego),
                cell_id: cell_id(distance, lateral, lane.lane_width),
            });
        }

        Ok(filtered)
    }

    /// Reclassifies the motion status relative to the ego vehicle.
    pub fn classify(&self, obj: &RawObject, ego: &EgoState) -> ObjectStatus {
        let heading_diff = normalize_heading(obj.heading_deg - ego.heading_deg).abs();
        if heading_diff >= self.config.oncoming_heading_deg {
            return ObjectStatus::Oncoming;
        }
        if (obj.velocity.x - ego.velocity.x).abs() >= self.config.moving_rel_speed {
            return ObjectStatus::Moving;
        }
        if self.config.preserve_stopped && obj.status == ObjectStatus::Stopped {
            ObjectStatus::Stopped
        } else {
            ObjectStatus::Stationary
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ObjectType;
    use approx::assert_relative_eq;
    use nalgebra::{Vector2, Vector3};
    use proptest::prelude::*;

    fn object(id: i32, distance: f64, y: f64, vx: f64) -> RawObject {
        RawObject {
            id,
            object_type: ObjectType::Car,
            position: Vector3::new(distance, y, 0.0),
            velocity: Vector2::new(vx, 0.0),
            acceleration: Vector2::zeros(),
            heading_deg: 0.0,
            distance,
            status: ObjectStatus::Moving,
        }
    }

    #[test]
    fn test_base_cell_bands() {
        assert_eq!(base_cell(0.0), 1);
        assert_eq!(base_cell(30.0), 4);
        assert_eq!(base_cell(59.9), 6);
        assert_eq!(base_cell(60.0), 6);
        assert_eq!(base_cell(60.1), 7);
        assert_eq!(base_cell(120.0), 12);
        assert_eq!(base_cell(125.0), 13);
        assert_eq!(base_cell(500.0), 20);
    }

    #[test]
    fn test_cell_lateral_shift() {
        // Inner quarter of a 3.5m lane is < 0.875m
        assert_eq!(cell_id(30.0, 0.3, 3.5), 3);
        assert_eq!(cell_id(30.0, 1.5, 3.5), 4);
        assert_eq!(cell_id(30.0, 2.7, 3.5), 5);
        // Clamped at both ends
        assert_eq!(cell_id(0.0, 0.0, 3.5), 1);
        assert_eq!(cell_id(500.0, 3.0, 3.5), 20);
    }

    #[test]
    fn test_single_object_in_lane() {
        let gate = ObjectGate::default();
        let ego = EgoState::default();
        let lane = LaneContext::straight(3.5);

        let out = gate.filter(&[object(7, 30.0, 0.3, 8.0)], &ego, &lane, 10).unwrap();

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].id, 7);
        assert_eq!(out[0].status, ObjectStatus::Moving);
        assert_eq!(base_cell(out[0].distance), 4);
        assert_eq!(out[0].cell_id, 3);
        assert_relative_eq!(out[0].distance, 30.0);
    }

    #[test]
    fn test_range_and_lateral_gating() {
        let gate = ObjectGate::default();
        let ego = EgoState::default();
        let lane = LaneContext::straight(3.5);
        let raw = vec![
            object(1, 50.0, 0.0, 5.0),
            object(2, 250.0, 0.0, 5.0), // too far
            object(3, 40.0, 1.0, 5.0),
            object(4, 40.0, 4.0, 5.0), // outside corridor
        ];

        let out = gate.filter(&raw, &ego, &lane, 10).unwrap();
        let ids: Vec<i32> = out.iter().map(|o| o.id).collect();
        assert_eq!(ids, vec![1, 3]);
    }

    #[test]
    fn test_curve_widens_corridor_and_corrects_distance() {
        let gate = ObjectGate::default();
        let ego = EgoState::default();
        let lane = LaneContext {
            is_curved: true,
            heading_error_deg: 20.0,
            ..LaneContext::straight(3.5)
        };

        // Threshold 3.5 + 20 * 0.05 = 4.5
        let out = gate.filter(&[object(1, 40.0, 4.2, 5.0)], &ego, &lane, 10).unwrap();
        assert_eq!(out.len(), 1);
        assert_relative_eq!(out[0].distance, 40.0 / 20f64.to_radians().cos(), epsilon = 1e-9);
    }

    #[test]
    fn test_status_reclassification() {
        let gate = ObjectGate::default();
        let ego = EgoState {
            velocity: Vector2::new(10.0, 0.0),
            ..Default::default()
        };

        let mut oncoming = object(1, 50.0, 0.0, -10.0);
        oncoming.heading_deg = -170.0;
        assert_eq!(gate.classify(&oncoming, &ego), ObjectStatus::Oncoming);

        let same_speed = object(2, 50.0, 0.0, 10.2);
        assert_eq!(gate.classify(&same_speed, &ego), ObjectStatus::Stationary);

        let slower = object(3, 50.0, 0.0, 9.5);
        assert_eq!(gate.classify(&slower, &ego), ObjectStatus::Moving);
    }

    #[test]
    fn test_preserve_stopped_is_opt_in() {
        let ego = EgoState::default();
        let mut stopped = object(1, 20.0, 0.0, 0.0);
        stopped.status = ObjectStatus::Stopped;

        assert_eq!(
            ObjectGate::default().classify(&stopped, &ego),
            ObjectStatus::Stationary
        );

        let gate = ObjectGate::new(GateConfig {
            preserve_stopped: true,
            ..Default::default()
        });
        assert_eq!(gate.classify(&stopped, &ego), ObjectStatus::Stopped);
    }

    #[test]
    fn test_malformed_objects_skipped() {
        let gate = ObjectGate::default();
        let ego = EgoState::default();
        let lane = LaneContext::straight(3.5);

        let mut nan = object(1, 20.0, 0.0, 5.0);
        nan.position.x = f64::NAN;
        let raw = vec![
            nan,
            object(-3, 20.0, 0.0, 5.0),
            object(2, -1.0, 0.0, 5.0),
            object(4, 20.0, 0.0, 5.0),
        ];

        let out = gate.filter(&raw, &ego, &lane, 10).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].id, 4);
    }

    #[test]
    fn test_invalid_lane_is_error() {
        let gate = ObjectGate::default();
        let lane = LaneContext::straight(-1.0);
        let result = gate.filter(&[object(1, 10.0, 0.0, 1.0)], &EgoState::default(), &lane, 10);
        assert!(matches!(result, Err(AdasError::InvalidInput(_))));
    }

    #[test]
    fn test_output_capped() {
        let gate = ObjectGate::default();
        let raw: Vec<RawObject> = (0..100).map(|i| object(i, 10.0, 0.0, 5.0)).collect();

        let out = gate.filter(&raw, &EgoState::default(), &LaneContext::straight(3.5), 3).unwrap();
        assert_eq!(out.len(), 3);

        let out = gate
            .filter(&raw, &EgoState::default(), &LaneContext::straight(3.5), 1000)
            .unwrap();
        assert_eq!(out.len(), MAX_OBJECTS);
    }

    proptest! {
        #[test]
        fn prop_cell_id_in_range(
            distance in 0.0f64..1000.0,
            lateral in -10.0f64..10.0,
            width in 0.5f64..6.0,
        ) {
            let cell = cell_id(distance, lateral, width);
            prop_assert!((MIN_CELL_ID..=MAX_CELL_ID).contains(&cell));
        }

        #[test]
        fn prop_gate_output_headings_normalized(heading in -1000.0f64..1000.0) {
            let gate = ObjectGate::default();
            let mut obj = object(1, 30.0, 0.0, 5.0);
            obj.heading_deg = heading;
            let out = gate
                .filter(&[obj], &EgoState::default(), &LaneContext::straight(3.5), 4)
                .unwrap();
            prop_assert!(out[0].heading_deg > -180.0 && out[0].heading_deg <= 180.0);
        }
    }
}
