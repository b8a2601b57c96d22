//! Target arbitrator - picks the single ACC and AEB target per cycle.
//!
//! Both selections are a single pass over the predicted objects. Candidates
//! are scored by proximity with situation bonuses; the first object with the
//! strictly highest score wins, so ties keep input order.

use crate::lane_selection::LaneContext;
use crate::types::{
    EgoState, ObjectStatus, ObjectType, PredictedObject, Situation, Target, TargetSelection,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Arbitration tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArbitrationConfig {
    /// Score base; a candidate scores `base - distance` (default: 200)
    pub score_base: f64,

    /// Half width of the front zone (default: 1.75 m)
    pub front_zone_half_width: f64,

    /// Outer edge of the side zone (default: 3.5 m)
    pub side_zone_half_width: f64,

    /// ACC bonus for a near target on a curve (default: 10)
    pub curve_bonus: f64,

    /// Cells below this id count as near for the curve bonus (default: 5)
    pub curve_bonus_max_cell: u8,

    /// AEB bonus for a cut-in (default: 30)
    pub cut_in_bonus: f64,

    /// AEB bonus for an imminent collision (default: 20)
    pub ttc_bonus: f64,

    /// TTC below which the bonus applies (default: 3 s)
    pub ttc_threshold_s: f64,

    /// Closing speed above which TTC is finite (default: 0.1 m/s)
    pub min_closing_speed: f64,

    /// Ego speed below which stationary objects become AEB relevant (default: 0.1 m/s)
    pub ego_standstill_speed: f64,
}

impl Default for ArbitrationConfig {
    fn default() -> Self {
        Self {
            score_base: 200.0,
            front_zone_half_width: 1.75,
            side_zone_half_width: 3.5,
            curve_bonus: 10.0,
            curve_bonus_max_cell: 5,
            cut_in_bonus: 30.0,
            ttc_bonus: 20.0,
            ttc_threshold_s: 3.0,
            min_closing_speed: 0.1,
            ego_standstill_speed: 0.1,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TargetArbitrator {
    pub config: ArbitrationConfig,
}

impl TargetArbitrator {
    pub fn new(config: ArbitrationConfig) -> Self {
        Self { config }
    }

    /// Selects the ACC and AEB targets. Either may be `Target::none()`.
    pub fn select(
        &self,
        predicted: &[PredictedObject],
        ego: &EgoState,
        lane: &LaneContext,
    ) -> TargetSelection {
        let mut best_acc: Option<(f64, &PredictedObject)> = None;
        let mut best_aeb: Option<(f64, &PredictedObject)> = None;

        for obj in predicted {
            if obj.cut_out || obj.position.x < 0.0 {
                debug!("Arbitration: object {} excluded", obj.id);
                continue;
            }

            if let Some(score) = self.acc_score(obj, lane) {
                if best_acc.map_or(true, |(best, _)| score > best) {
                    best_acc = Some((score, obj));
                }
            }

            if let Some(score) = self.aeb_score(obj, ego) {
                if best_aeb.map_or(true, |(best, _)| score > best) {
                    best_aeb = Some((score, obj));
                }
            }
        }

        let to_target = |best: Option<(f64, &PredictedObject)>| match best {
            Some((score, obj)) => {
                debug!("Arbitration: object {} selected with score {:.1}", obj.id, score);
                Target::from_predicted(obj, situation_of(obj, lane))
            }
            None => Target::none(),
        };

        TargetSelection {
            acc: to_target(best_acc),
            aeb: to_target(best_aeb),
        }
    }

    /// ACC score, or `None` if the object is not an ACC candidate.
    pub fn acc_score(&self, obj: &PredictedObject, lane: &LaneContext) -> Option<f64> {
        let eligible = obj.object_type == ObjectType::Car
            && obj.position.y.abs() <= self.config.front_zone_half_width
            && obj.status.is_in_traffic();
        if !eligible {
            return None;
        }

        let mut score = self.config.score_base - obj.distance;
        if lane.is_curved && obj.cell_id < self.config.curve_bonus_max_cell {
            score += self.config.curve_bonus;
        }
        Some(score)
    }

    /// AEB score, or `None` if the object is not an AEB candidate.
    pub fn aeb_score(&self, obj: &PredictedObject, ego: &EgoState) -> Option<f64> {
        let lateral = obj.position.y.abs();
        let in_front = lateral <= self.config.front_zone_half_width;
        let in_side = lateral > self.config.front_zone_half_width
            && lateral <= self.config.side_zone_half_width;

        let ego_standstill = ego.velocity.x.abs() < self.config.ego_standstill_speed;
        let eligible = if in_front {
            obj.status.is_in_traffic() || (obj.status == ObjectStatus::Stationary && ego_standstill)
        } else {
            in_side && obj.cut_in
        };
        if !eligible {
            return None;
        }

        let mut score = self.config.score_base - obj.distance;
        if obj.cut_in {
            score += self.config.cut_in_bonus;
        }
        if self.time_to_collision(obj, ego) < self.config.ttc_threshold_s {
            score += self.config.ttc_bonus;
        }
        Some(score)
    }

    /// Time to collision [s]; infinite unless the ego is closing in.
    pub fn time_to_collision(&self, obj: &PredictedObject, ego: &EgoState) -> f64 {
        let closing_speed = ego.velocity.x - obj.velocity.x;
        if closing_speed > self.config.min_closing_speed {
            obj.distance / closing_speed
        } else {
            f64::INFINITY
        }
    }
}

/// Situation tag for a selected object.
///
/// Cut-out objects never become candidates, so `CutOut` only appears if a
/// caller bypasses the exclusion in `select`.
pub fn situation_of(obj: &PredictedObject, lane: &LaneContext) -> Situation {
    if obj.cut_in {
        Situation::CutIn
    } else if obj.cut_out {
        Situation::CutOut
    } else if lane.is_curved {
        Situation::Curve
    } else {
        Situation::Normal
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NO_TARGET_ID;
    use approx::assert_relative_eq;
    use nalgebra::{Vector2, Vector3};
    use proptest::prelude::*;

    fn predicted(id: i32, x: f64, y: f64, vx: f64, status: ObjectStatus) -> PredictedObject {
        PredictedObject {
            id,
            object_type: ObjectType::Car,
            position: Vector3::new(x, y, 0.0),
            velocity: Vector2::new(vx, 0.0),
            acceleration: Vector2::zeros(),
            heading_deg: 0.0,
            distance: x.hypot(y),
            status,
            cell_id: 4,
            cut_in: false,
            cut_out: false,
        }
    }

    fn ego(vx: f64) -> EgoState {
        EgoState {
            velocity: Vector2::new(vx, 0.0),
            ..Default::default()
        }
    }

    #[test]
    fn test_single_lead_vehicle_selected_for_both() {
        let arbitrator = TargetArbitrator::default();
        let lead = predicted(1, 40.0, 0.0, 8.0, ObjectStatus::Moving);

        let selection = arbitrator.select(&[lead], &ego(10.0), &LaneContext::straight(3.5));

        assert_eq!(selection.acc.id, 1);
        assert_eq!(selection.aeb.id, 1);
        assert_eq!(selection.acc.situation, Situation::Normal);
        let slower = predicted(1, 40.0, 0.0, 8.0, ObjectStatus::Moving);
        assert_relative_eq!(arbitrator.time_to_collision(&slower, &ego(10.0)), 20.0);
    }

    #[test]
    fn test_cut_out_never_selected() {
        let arbitrator = TargetArbitrator::default();
        let mut leaving = predicted(1, 5.0, 0.0, 0.0, ObjectStatus::Moving);
        leaving.cut_out = true;
        leaving.cut_in = true;
        let far = predicted(2, 90.0, 0.0, 9.0, ObjectStatus::Moving);

        let lane = LaneContext::straight(3.5);
        let selection = arbitrator.select(&[leaving.clone()], &ego(10.0), &lane);
        assert_eq!(selection.acc.id, NO_TARGET_ID);
        assert_eq!(selection.aeb.id, NO_TARGET_ID);

        let selection = arbitrator.select(&[leaving, far], &ego(10.0), &LaneContext::straight(3.5));
        assert_eq!(selection.acc.id, 2);
        assert_eq!(selection.aeb.id, 2);
    }

    #[test]
    fn test_objects_behind_excluded() {
        let arbitrator = TargetArbitrator::default();
        let behind = predicted(1, -5.0, 0.0, 12.0, ObjectStatus::Moving);

        let selection = arbitrator.select(&[behind], &ego(10.0), &LaneContext::straight(3.5));
        assert!(!selection.acc.is_selected());
        assert!(!selection.aeb.is_selected());
    }

    #[test]
    fn test_acc_requires_car_in_traffic() {
        let arbitrator = TargetArbitrator::default();
        let lane = LaneContext::straight(3.5);

        let mut pedestrian = predicted(1, 20.0, 0.0, 1.0, ObjectStatus::Moving);
        pedestrian.object_type = ObjectType::Pedestrian;
        assert!(arbitrator.acc_score(&pedestrian, &lane).is_none());

        let parked = predicted(2, 20.0, 0.0, 0.0, ObjectStatus::Stationary);
        assert!(arbitrator.acc_score(&parked, &lane).is_none());

        let stopped = predicted(3, 20.0, 0.0, 0.0, ObjectStatus::Stopped);
        assert_relative_eq!(arbitrator.acc_score(&stopped, &lane).unwrap(), 180.0);
    }

    #[test]
    fn test_stationary_aeb_only_at_standstill() {
        let arbitrator = TargetArbitrator::default();
        let obstacle = predicted(1, 15.0, 0.0, 0.0, ObjectStatus::Stationary);

        assert!(arbitrator.aeb_score(&obstacle, &ego(10.0)).is_none());
        assert!(arbitrator.aeb_score(&obstacle, &ego(0.05)).is_some());
    }

    #[test]
    fn test_side_zone_requires_cut_in() {
        let arbitrator = TargetArbitrator::default();
        let mut merging = predicted(1, 30.0, 2.5, 8.0, ObjectStatus::Moving);
        assert!(arbitrator.aeb_score(&merging, &ego(10.0)).is_none());

        merging.cut_in = true;
        let score = arbitrator.aeb_score(&merging, &ego(10.0)).unwrap();
        assert_relative_eq!(score, 200.0 - merging.distance + 30.0);
    }

    #[test]
    fn test_ttc_bonus_prefers_closing_object() {
        let arbitrator = TargetArbitrator::default();
        let lane = LaneContext::straight(3.5);
        // TTC 10/5 = 2s earns +20, beats a slightly closer but slow-closing object
        let closing = predicted(1, 10.0, 0.0, 5.0, ObjectStatus::Moving);
        let near = predicted(2, 8.0, 1.0, 9.95, ObjectStatus::Moving);

        let selection = arbitrator.select(&[near, closing], &ego(10.0), &lane);
        assert_eq!(selection.aeb.id, 1);
        assert_eq!(selection.acc.id, 2);
    }

    #[test]
    fn test_ties_keep_first_seen() {
        let arbitrator = TargetArbitrator::default();
        let a = predicted(5, 30.0, 0.0, 10.0, ObjectStatus::Moving);
        let b = predicted(6, 30.0, 0.0, 10.0, ObjectStatus::Moving);

        let selection = arbitrator.select(&[a, b], &ego(10.0), &LaneContext::straight(3.5));
        assert_eq!(selection.acc.id, 5);
        assert_eq!(selection.aeb.id, 5);
    }

    #[test]
    fn test_curve_situation_and_bonus() {
        let arbitrator = TargetArbitrator::default();
        let lane = LaneContext {
            is_curved: true,
            ..LaneContext::straight(3.5)
        };
        let near = predicted(1, 30.0, 0.0, 10.0, ObjectStatus::Moving);

        assert_relative_eq!(arbitrator.acc_score(&near, &lane).unwrap(), 180.0);
        let selection = arbitrator.select(&[near], &ego(10.0), &lane);
        assert_eq!(selection.acc.situation, Situation::Curve);
    }

    #[test]
    fn test_situation_precedence() {
        let lane = LaneContext {
            is_curved: true,
            ..LaneContext::straight(3.5)
        };
        let mut obj = predicted(1, 30.0, 0.0, 10.0, ObjectStatus::Moving);
        obj.cut_in = true;
        obj.cut_out = true;
        assert_eq!(situation_of(&obj, &lane), Situation::CutIn);
        obj.cut_in = false;
        assert_eq!(situation_of(&obj, &lane), Situation::CutOut);
    }

    fn arb_status() -> impl Strategy<Value = ObjectStatus> {
        prop_oneof![
            Just(ObjectStatus::Moving),
            Just(ObjectStatus::Stopped),
            Just(ObjectStatus::Stationary),
            Just(ObjectStatus::Oncoming),
        ]
    }

    proptest! {
        #[test]
        fn prop_selected_targets_are_eligible(
            objs in prop::collection::vec(
                (
                    -20.0f64..150.0,
                    -5.0f64..5.0,
                    -5.0f64..20.0,
                    arb_status(),
                    any::<bool>(),
                    any::<bool>(),
                ),
                0..12,
            ),
            ego_vx in 0.0f64..30.0,
        ) {
            let arbitrator = TargetArbitrator::default();
            let lane = LaneContext::straight(3.5);
            let predicted: Vec<PredictedObject> = objs
                .iter()
                .enumerate()
                .map(|(i, &(x, y, vx, status, cut_in, cut_out))| {
                    let mut p = predicted(i as i32, x, y, vx, status);
                    p.cut_in = cut_in;
                    p.cut_out = cut_out;
                    p
                })
                .collect();

            let selection = arbitrator.select(&predicted, &ego(ego_vx), &lane);

            for target in [&selection.acc, &selection.aeb] {
                if let Some(id) = target.object_id() {
                    let obj = &predicted[id as usize];
                    prop_assert!(!obj.cut_out);
                    prop_assert!(obj.position.x >= 0.0);
                } else {
                    prop_assert_eq!(target.clone(), Target::none());
                }
            }
            if let Some(id) = selection.acc.object_id() {
                prop_assert!(arbitrator.acc_score(&predicted[id as usize], &lane).is_some());
            }
            if let Some(id) = selection.aeb.object_id() {
                prop_assert!(arbitrator.aeb_score(&predicted[id as usize], &ego(ego_vx)).is_some());
            }
        }
    }
}
