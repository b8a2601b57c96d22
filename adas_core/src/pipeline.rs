//! Pipeline - runs one perception-to-decision cycle end to end.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        AdasPipeline                          │
//! │                                                              │
//! │  time, gps, imu ──► EgoEstimator ──► EgoState                │
//! │                        (EstimatorState, owned)    │          │
//! │                                                   ▼          │
//! │  lane ──────────────► LaneContext ──► ObjectGate ◄── objects │
//! │                                          │                   │
//! │                                          ▼                   │
//! │                                   PathPredictor              │
//! │                                          │                   │
//! │                                          ▼                   │
//! │                                 TargetArbitrator ──► ACC/AEB │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! The estimator always runs. Invalid lane or object input degrades the
//! cycle to neutral targets instead of failing it.
//!
//! # Usage
//!
//! ```ignore
//! use adas_core::pipeline::{AdasPipeline, CycleInput, PipelineConfig};
//!
//! let mut pipeline = AdasPipeline::new(PipelineConfig::default());
//! let output = pipeline.step(&input);
//! if let Some(id) = output.targets.acc.object_id() {
//!     // hand over to the ACC control law
//! }
//! ```

use crate::ego_estimation::{CycleFaults, EgoEstimator, EstimatorConfig, EstimatorState};
use crate::error::AdasError;
use crate::lane_selection::{LaneContext, LaneGeometry};
use crate::object_gate::{GateConfig, ObjectGate};
use crate::path_prediction::{PathPredictor, PredictionConfig};
use crate::target_arbitration::{ArbitrationConfig, TargetArbitrator};
use crate::types::{
    EgoState, FilteredObject, GpsSample, ImuSample, PredictedObject, RawObject, TargetSelection,
    TimeSample, MAX_OBJECTS,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Configuration of every pipeline stage.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub estimator: EstimatorConfig,
    pub gate: GateConfig,
    pub prediction: PredictionConfig,
    pub arbitration: ArbitrationConfig,
}

impl PipelineConfig {
    /// Parses and validates a JSON configuration. Missing fields take defaults.
    pub fn from_json_str(json: &str) -> Result<Self, AdasError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| AdasError::config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects values that would make a stage meaningless.
    pub fn validate(&self) -> Result<(), AdasError> {
        let est = &self.estimator;
        let non_negative = [
            ("estimator.gps_validity_ms", est.gps_validity_ms),
            ("estimator.accel_spike_threshold", est.accel_spike_threshold),
            ("estimator.yaw_rate_spike_threshold", est.yaw_rate_spike_threshold),
            ("estimator.gps_velocity_spike_threshold", est.gps_velocity_spike_threshold),
            ("estimator.initial_variance", est.initial_variance),
            ("gate.max_range_m", self.gate.max_range_m),
            ("gate.curve_lateral_gain", self.gate.curve_lateral_gain),
            ("prediction.horizon_s", self.prediction.horizon_s),
        ];
        for (name, value) in non_negative {
            if !(value >= 0.0) {
                return Err(AdasError::config(format!("{name} must be >= 0, got {value}")));
            }
        }
        if !(est.min_dt_s > 0.0) {
            return Err(AdasError::config("estimator.min_dt_s must be > 0"));
        }
        let noise_ok = est
            .process_noise
            .iter()
            .chain(est.measurement_noise.iter())
            .all(|q| *q >= 0.0);
        if !noise_ok {
            return Err(AdasError::config("noise variances must be >= 0"));
        }
        Ok(())
    }
}

// ============================================================================
// CYCLE I/O
// ============================================================================

/// Lane information for a cycle: either a ready context or raw geometry
/// that is resolved against the freshly estimated ego heading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LaneInput {
    Context(LaneContext),
    Geometry(LaneGeometry),
}

impl From<LaneContext> for LaneInput {
    fn from(ctx: LaneContext) -> Self {
        LaneInput::Context(ctx)
    }
}

impl From<LaneGeometry> for LaneInput {
    fn from(geometry: LaneGeometry) -> Self {
        LaneInput::Geometry(geometry)
    }
}

impl LaneInput {
    fn resolve(&self, ego: &EgoState) -> Result<LaneContext, AdasError> {
        match self {
            LaneInput::Context(ctx) => {
                ctx.validate()?;
                Ok(ctx.clone())
            }
            LaneInput::Geometry(geometry) => LaneContext::from_geometry(geometry, ego),
        }
    }
}

/// Everything the pipeline consumes in one cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleInput {
    pub time: TimeSample,
    pub gps: Option<GpsSample>,
    pub imu: ImuSample,
    pub lane: LaneInput,
    pub objects: Vec<RawObject>,
    /// Caller's cap on objects per stage (further bounded by `MAX_OBJECTS`)
    pub max_count: usize,
}

/// Whether the cycle's decisions are backed by valid input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CycleStatus {
    Nominal,
    /// Lane or object input was rejected; targets are neutral
    Degraded(String),
}

impl CycleStatus {
    pub fn is_nominal(&self) -> bool {
        matches!(self, CycleStatus::Nominal)
    }
}

/// Everything the pipeline produces in one cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleOutput {
    pub ego: EgoState,
    pub filtered: Vec<FilteredObject>,
    pub predicted: Vec<PredictedObject>,
    pub targets: TargetSelection,
    /// Sensor faults absorbed by the estimator
    pub faults: CycleFaults,
    pub status: CycleStatus,
}

/// Pipeline-level counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PipelineDiagnostics {
    pub cycles: u64,
    pub invalid_input_cycles: u64,
    pub acc_target_cycles: u64,
    pub aeb_target_cycles: u64,
}

// ============================================================================
// PIPELINE
// ============================================================================

/// One vehicle's decision pipeline.
///
/// Owns its [`EstimatorState`]; run one pipeline per vehicle.
#[derive(Debug, Clone)]
pub struct AdasPipeline {
    pub config: PipelineConfig,
    estimator: EgoEstimator,
    gate: ObjectGate,
    predictor: PathPredictor,
    arbitrator: TargetArbitrator,
    state: EstimatorState,
    diagnostics: PipelineDiagnostics,
}

impl AdasPipeline {
    /// Creates a pipeline with a fresh estimator state.
    pub fn new(config: PipelineConfig) -> Self {
        let state = EstimatorState::new(&config.estimator);
        Self::with_state(config, state)
    }

    /// Creates a pipeline resuming from an existing estimator state.
    pub fn with_state(config: PipelineConfig, state: EstimatorState) -> Self {
        Self {
            estimator: EgoEstimator::new(config.estimator.clone()),
            gate: ObjectGate::new(config.gate.clone()),
            predictor: PathPredictor::new(config.prediction.clone()),
            arbitrator: TargetArbitrator::new(config.arbitration.clone()),
            config,
            state,
            diagnostics: PipelineDiagnostics::default(),
        }
    }

    /// Runs one cycle.
    pub fn step(&mut self, input: &CycleInput) -> CycleOutput {
        self.diagnostics.cycles += 1;

        let ego = self
            .estimator
            .update(input.time, input.gps.as_ref(), &input.imu, &mut self.state);
        let faults = self.state.last_faults;

        match self.select_targets(input, &ego) {
            Ok((filtered, predicted, targets)) => {
                self.diagnostics.acc_target_cycles += targets.acc.is_selected() as u64;
                self.diagnostics.aeb_target_cycles += targets.aeb.is_selected() as u64;
                debug!(
                    "Cycle {}: {} gated, acc={:?} aeb={:?}",
                    self.diagnostics.cycles,
                    filtered.len(),
                    targets.acc.object_id(),
                    targets.aeb.object_id()
                );
                CycleOutput {
                    ego,
                    filtered,
                    predicted,
                    targets,
                    faults,
                    status: CycleStatus::Nominal,
                }
            }
            Err(err) => {
                self.diagnostics.invalid_input_cycles += 1;
                warn!("Cycle {} degraded: {}", self.diagnostics.cycles, err);
                CycleOutput {
                    ego,
                    filtered: Vec::new(),
                    predicted: Vec::new(),
                    targets: TargetSelection::none(),
                    faults,
                    status: CycleStatus::Degraded(err.to_string()),
                }
            }
        }
    }

    fn select_targets(
        &self,
        input: &CycleInput,
        ego: &EgoState,
    ) -> Result<(Vec<FilteredObject>, Vec<PredictedObject>, TargetSelection), AdasError> {
        let lane = input.lane.resolve(ego)?;
        let max_count = input.max_count.min(MAX_OBJECTS);

        let filtered = self.gate.filter(&input.objects, ego, &lane, max_count)?;
        let predicted = self.predictor.predict(&filtered, &lane, max_count);
        let targets = self.arbitrator.select(&predicted, ego, &lane);
        Ok((filtered, predicted, targets))
    }

    /// Current estimator state.
    pub fn state(&self) -> &EstimatorState {
        &self.state
    }

    pub fn diagnostics(&self) -> PipelineDiagnostics {
        self.diagnostics
    }

    /// Clears the estimator and counters, keeping configuration.
    pub fn reset(&mut self) {
        self.state = EstimatorState::new(&self.config.estimator);
        self.diagnostics = PipelineDiagnostics::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ObjectStatus, ObjectType};
    use nalgebra::{Vector2, Vector3};

    fn car(id: i32, distance: f64, y: f64, vx: f64) -> RawObject {
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

    fn input(objects: Vec<RawObject>, lane: LaneInput) -> CycleInput {
        CycleInput {
            time: TimeSample::new(0.0),
            gps: Some(GpsSample {
                vel_x: 0.0,
                vel_y: 0.0,
                timestamp_ms: 0.0,
            }),
            imu: ImuSample::default(),
            lane,
            objects,
            max_count: 10,
        }
    }

    #[test]
    fn test_full_cycle_selects_lead() {
        let mut pipeline = AdasPipeline::new(PipelineConfig::default());
        let objects = vec![car(1, 40.0, 0.0, 8.0), car(2, 40.0, 6.0, 8.0), car(3, 300.0, 0.0, 8.0)];

        let out = pipeline.step(&input(objects, LaneContext::straight(3.5).into()));

        assert!(out.status.is_nominal());
        assert_eq!(out.filtered.len(), 1);
        assert_eq!(out.targets.acc.object_id(), Some(1));
        assert_eq!(out.targets.aeb.object_id(), Some(1));
        assert_eq!(pipeline.diagnostics().acc_target_cycles, 1);
    }

    #[test]
    fn test_invalid_lane_degrades_to_neutral_targets() {
        let mut pipeline = AdasPipeline::new(PipelineConfig::default());

        let out = pipeline.step(&input(
            vec![car(1, 40.0, 0.0, 8.0)],
            LaneGeometry::straight(f64::NAN).into(),
        ));

        assert!(matches!(out.status, CycleStatus::Degraded(_)));
        assert_eq!(out.targets, TargetSelection::none());
        assert!(out.filtered.is_empty());
        assert_eq!(pipeline.diagnostics().invalid_input_cycles, 1);
        // Estimator still ran
        assert_eq!(pipeline.state().counters.cycles, 1);
    }

    #[test]
    fn test_pipelines_do_not_share_state() {
        let mut a = AdasPipeline::new(PipelineConfig::default());
        let mut b = AdasPipeline::new(PipelineConfig::default());

        let mut moving = input(Vec::new(), LaneContext::straight(3.5).into());
        moving.time = TimeSample::new(100.0);
        moving.imu.accel_x = 2.0;
        moving.gps = None;
        a.step(&moving);

        let out_b = b.step(&input(Vec::new(), LaneContext::straight(3.5).into()));
        assert_eq!(out_b.ego.velocity.x, 0.0);
        assert!(a.state().state_vector[0] > 0.0);
    }

    #[test]
    fn test_reset_clears_state() {
        let mut pipeline = AdasPipeline::new(PipelineConfig::default());
        let mut cycle = input(Vec::new(), LaneContext::straight(3.5).into());
        cycle.gps = None;
        cycle.imu.accel_x = 1.0;
        cycle.time = TimeSample::new(500.0);
        pipeline.step(&cycle);

        pipeline.reset();
        assert_eq!(pipeline.state(), &EstimatorState::new(&pipeline.config.estimator));
        assert_eq!(pipeline.diagnostics(), PipelineDiagnostics::default());
    }

    #[test]
    fn test_config_from_json_partial() {
        let config =
            PipelineConfig::from_json_str(r#"{ "prediction": { "horizon_s": 2.0 } }"#).unwrap();
        assert_eq!(config.prediction.horizon_s, 2.0);
        assert_eq!(config.gate, GateConfig::default());
    }

    #[test]
    fn test_config_rejects_bad_values() {
        assert!(matches!(
            PipelineConfig::from_json_str(r#"{ "prediction": { "horizon_s": -1.0 } }"#),
            Err(AdasError::InvalidConfig(_))
        ));
        assert!(PipelineConfig::from_json_str("not json").is_err());
    }

    #[test]
    fn test_step_is_deterministic() {
        let objects = vec![car(1, 35.0, 0.2, 9.0), car(2, 60.0, -0.5, 11.0)];
        let cycle = input(objects, LaneContext::straight(3.5).into());

        let mut a = AdasPipeline::new(PipelineConfig::default());
        let mut b = AdasPipeline::new(PipelineConfig::default());
        assert_eq!(a.step(&cycle), b.step(&cycle));
    }
}
