//! Scenario runner - executes closed-loop driving scenarios.
//!
//! Each tick the Oracle advances ground truth, the scenario script applies
//! its maneuvers, and the resulting sensor samples run through one
//! [`AdasPipeline`]. After the run the recorded trace is checked against the
//! scenario's pass criteria.

use crate::exporter::{EgoFrame, ObjectPosition, SimEvent, SimExport, SimFrame, TargetFrame};
use crate::oracle::{EgoTruth, Oracle, SensorFault, SensorNoise};
use crate::scenarios::ScenarioId;

use adas_core::ego_estimation::{EstimatorState, FaultCounters};
use adas_core::lane_selection::{LaneChangeStatus, LaneContext, LaneGeometry, LaneType};
use adas_core::pipeline::{AdasPipeline, CycleInput, CycleOutput, LaneInput, PipelineConfig};
use adas_core::types::{ImuSample, ObjectType, Situation, Target, TimeSample, MAX_OBJECTS};
use nalgebra::{Vector2, Vector3};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Lane width used by every scenario [m]
const LANE_WIDTH: f64 = 3.5;

/// Export every Nth tick
const EXPORT_INTERVAL: u64 = 2;

// ============================================================================
// CONFIGURATION & RESULTS
// ============================================================================

/// Harness configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Control loop rate (default: 20 Hz)
    pub tick_rate_hz: u32,

    /// Requested duration, clamped to each scenario's valid range (default: 10 s)
    pub duration_secs: f64,

    pub noise: SensorNoise,

    pub pipeline: PipelineConfig,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            tick_rate_hz: 20,
            duration_secs: 10.0,
            noise: SensorNoise::default(),
            pipeline: PipelineConfig::default(),
        }
    }
}

/// Results from running a scenario.
#[derive(Debug, Clone)]
pub struct ScenarioResult {
    /// Scenario that was run
    pub scenario: ScenarioId,

    /// Seed used
    pub seed: u64,

    /// Whether scenario passed all assertions
    pub passed: bool,

    /// Total ticks executed
    pub total_ticks: u64,

    /// Final simulation time in seconds
    pub final_time_secs: f64,

    /// Failure message if any
    pub failure_reason: Option<String>,

    /// Metrics collected during run
    pub metrics: ScenarioMetrics,
}

/// Metrics collected during scenario execution.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScenarioMetrics {
    /// RMS of |v_est - v_true| over the run [m/s]
    pub velocity_rmse: f64,

    /// Worst single-tick |v_est - v_true| [m/s]
    pub max_velocity_error: f64,

    /// Ticks with an ACC target
    pub acc_target_ticks: u64,

    /// Ticks with an AEB target
    pub aeb_target_ticks: u64,

    /// Ticks where either target was tagged as a cut-in
    pub cut_in_ticks: u64,

    /// Ticks where the ACC target was tagged as a curve
    pub curve_ticks: u64,

    /// Cycles that fell back to neutral targets
    pub degraded_cycles: u64,

    /// Estimator fault counters at the end of the run
    pub faults: FaultCounters,
}

/// One tick of the recorded trace.
#[derive(Debug, Clone)]
struct TickRecord {
    time_s: f64,
    true_velocity: Vector2<f64>,
    est_velocity: Vector2<f64>,
    acc: Option<(i32, Situation)>,
    aeb: Option<(i32, Situation)>,
    degraded: bool,
}

impl TickRecord {
    fn new(oracle: &Oracle, output: &CycleOutput) -> Self {
        let pick = |t: &Target| t.object_id().map(|id| (id, t.situation));
        Self {
            time_s: oracle.time(),
            true_velocity: oracle.ego().velocity,
            est_velocity: output.ego.velocity,
            acc: pick(&output.targets.acc),
            aeb: pick(&output.targets.aeb),
            degraded: !output.status.is_nominal(),
        }
    }

    fn velocity_error(&self) -> f64 {
        (self.est_velocity - self.true_velocity).norm()
    }

    fn acc_is(&self, id: i32) -> bool {
        self.acc.map_or(false, |(target, _)| target == id)
    }

    fn aeb_is(&self, id: i32) -> bool {
        self.aeb.map_or(false, |(target, _)| target == id)
    }
}

impl ScenarioMetrics {
    fn from_trace(trace: &[TickRecord], faults: FaultCounters) -> Self {
        let n = trace.len().max(1) as f64;
        let sq_sum: f64 = trace.iter().map(|r| r.velocity_error().powi(2)).sum();
        Self {
            velocity_rmse: (sq_sum / n).sqrt(),
            max_velocity_error: trace.iter().map(TickRecord::velocity_error).fold(0.0, f64::max),
            acc_target_ticks: trace.iter().filter(|r| r.acc.is_some()).count() as u64,
            aeb_target_ticks: trace.iter().filter(|r| r.aeb.is_some()).count() as u64,
            cut_in_ticks: trace
                .iter()
                .filter(|r| {
                    [r.acc, r.aeb]
                        .iter()
                        .any(|t| matches!(t, Some((_, Situation::CutIn))))
                })
                .count() as u64,
            curve_ticks: trace
                .iter()
                .filter(|r| matches!(r.acc, Some((_, Situation::Curve))))
                .count() as u64,
            degraded_cycles: trace.iter().filter(|r| r.degraded).count() as u64,
            faults,
        }
    }
}

/// Fraction of trace entries satisfying `pred`.
fn share(trace: &[TickRecord], pred: impl Fn(&TickRecord) -> bool) -> f64 {
    if trace.is_empty() {
        return 0.0;
    }
    trace.iter().filter(|r| pred(r)).count() as f64 / trace.len() as f64
}

fn require(ok: bool, reason: impl FnOnce() -> String) -> Result<(), String> {
    if ok {
        Ok(())
    } else {
        Err(reason())
    }
}

// ============================================================================
// SCENARIO SCRIPTS
// ============================================================================

/// Scene setup and maneuvers of one scenario.
struct Script {
    scenario: ScenarioId,
    /// Lead, merger or obstacle
    primary: i32,
    /// Second vehicle where the scenario has one
    secondary: Option<i32>,
}

impl Script {
    /// Populates the Oracle and returns the script.
    fn build(scenario: ScenarioId, oracle: &mut Oracle) -> Self {
        let car = |oracle: &mut Oracle, x: f64, y: f64, vx: f64| {
            oracle.spawn_object(ObjectType::Car, Vector3::new(x, y, 0.0), Vector2::new(vx, 0.0))
        };

        match scenario {
            ScenarioId::FollowLead => {
                oracle.set_ego(EgoTruth::cruising(20.0));
                let lead = car(oracle, 40.0, 0.0, 21.0);
                Self {
                    scenario,
                    primary: lead,
                    secondary: None,
                }
            }
            ScenarioId::CutIn => {
                oracle.set_ego(EgoTruth::cruising(20.0));
                let lead = car(oracle, 60.0, 0.0, 21.0);
                let merger = car(oracle, 30.0, LANE_WIDTH, 18.0);
                Self {
                    scenario,
                    primary: merger,
                    secondary: Some(lead),
                }
            }
            ScenarioId::CutOut => {
                oracle.set_ego(EgoTruth::cruising(15.0));
                let lead = car(oracle, 30.0, 0.0, 14.0);
                let next = car(oracle, 70.0, 0.0, 13.0);
                Self {
                    scenario,
                    primary: lead,
                    secondary: Some(next),
                }
            }
            ScenarioId::GpsDropout => {
                oracle.set_ego(EgoTruth {
                    acceleration: Vector2::new(1.0, 0.0),
                    ..EgoTruth::cruising(15.0)
                });
                let lead = car(oracle, 50.0, 0.0, 17.0);
                if let Some(obj) = oracle.object_mut(lead) {
                    obj.acceleration = Vector2::new(1.0, 0.0);
                }
                oracle.inject(SensorFault::GpsDropout {
                    from_s: 3.0,
                    to_s: 5.0,
                });
                Self {
                    scenario,
                    primary: lead,
                    secondary: None,
                }
            }
            ScenarioId::ImuSpike => {
                oracle.set_ego(EgoTruth::cruising(20.0));
                let lead = car(oracle, 40.0, 0.0, 21.0);
                for at_s in [2.0, 4.0, 6.0] {
                    oracle.inject(SensorFault::ImuSpike {
                        at_s,
                        magnitude: 8.0,
                    });
                }
                oracle.inject(SensorFault::GpsSpike {
                    at_s: 3.0,
                    magnitude: 15.0,
                });
                Self {
                    scenario,
                    primary: lead,
                    secondary: None,
                }
            }
            ScenarioId::CurvedRoad => {
                // 20 m/s on a 500m radius
                oracle.set_ego(EgoTruth {
                    yaw_rate_deg_s: (20.0f64 / 500.0).to_degrees(),
                    ..EgoTruth::cruising(20.0)
                });
                let lead = car(oracle, 35.0, 0.5, 21.0);
                Self {
                    scenario,
                    primary: lead,
                    secondary: None,
                }
            }
            ScenarioId::StationaryObstacle => {
                oracle.set_ego(EgoTruth {
                    acceleration: Vector2::new(-2.5, 0.0),
                    ..EgoTruth::cruising(10.0)
                });
                let obstacle = car(oracle, 25.0, 0.0, 0.0);
                Self {
                    scenario,
                    primary: obstacle,
                    secondary: None,
                }
            }
        }
    }

    /// Applies time-triggered maneuvers before the physics step.
    fn maneuver(&self, oracle: &mut Oracle) {
        let t = oracle.time();
        let lateral = match self.scenario {
            // Merge from the left lane center to the ego lane center
            ScenarioId::CutIn => Some(if (2.0..5.5).contains(&t) { -1.0 } else { 0.0 }),
            // Drift right out of the ego lane
            ScenarioId::CutOut => Some(if (2.0..5.0).contains(&t) { 1.2 } else { 0.0 }),
            _ => None,
        };
        if let (Some(vy), Some(obj)) = (lateral, oracle.object_mut(self.primary)) {
            obj.velocity.y = vy;
        }
    }

    /// Lane input for the current tick.
    fn lane(&self, oracle: &Oracle) -> LaneInput {
        match self.scenario {
            ScenarioId::CurvedRoad => LaneGeometry {
                lane_type: LaneType::Curve,
                curvature_radius: 500.0,
                next_curvature_radius: 500.0,
                lane_offset: 0.0,
                lane_heading_deg: oracle.ego().heading_deg - 3.0,
                lane_width: LANE_WIDTH,
                change_status: LaneChangeStatus::Keep,
            }
            .into(),
            _ => LaneContext::straight(LANE_WIDTH).into(),
        }
    }

    /// Pass criteria.
    fn check(&self, trace: &[TickRecord], metrics: &ScenarioMetrics) -> Result<(), String> {
        require(metrics.degraded_cycles == 0, || {
            format!("{} degraded cycles", metrics.degraded_cycles)
        })?;

        let primary = self.primary;
        match self.scenario {
            ScenarioId::FollowLead => {
                let acc = share(trace, |r| r.acc_is(primary));
                let aeb = share(trace, |r| r.aeb_is(primary));
                require(acc >= 0.95, || {
                    format!("ACC held lead only {:.0}% of ticks", acc * 100.0)
                })?;
                require(aeb >= 0.95, || {
                    format!("AEB held lead only {:.0}% of ticks", aeb * 100.0)
                })?;
                require(metrics.velocity_rmse < 0.2, || {
                    format!("velocity RMSE {:.3} m/s", metrics.velocity_rmse)
                })
            }
            ScenarioId::CutIn => {
                let tagged = trace.iter().any(|r| {
                    matches!(r.acc, Some((id, Situation::CutIn)) if id == primary)
                        || matches!(r.aeb, Some((id, Situation::CutIn)) if id == primary)
                });
                require(tagged, || "merger never selected as a cut-in".to_string())?;
                let settled: Vec<TickRecord> =
                    trace.iter().filter(|r| r.time_s >= 6.5).cloned().collect();
                let acc = share(&settled, |r| r.acc_is(primary));
                require(acc >= 0.9, || {
                    format!("ACC held merger only {:.0}% of ticks after merge", acc * 100.0)
                })
            }
            ScenarioId::CutOut => {
                let before = share(
                    &trace.iter().filter(|r| r.time_s < 2.0).cloned().collect::<Vec<_>>(),
                    |r| r.acc_is(primary),
                );
                require(before >= 0.9, || {
                    format!("ACC held lead only {:.0}% of ticks before cut-out", before * 100.0)
                })?;
                let after: Vec<TickRecord> =
                    trace.iter().filter(|r| r.time_s >= 2.5).cloned().collect();
                require(!after.iter().any(|r| r.acc_is(primary)), || {
                    "departing lead kept as ACC target".to_string()
                })?;
                let next = self.secondary.unwrap_or(primary);
                let switched = share(&after, |r| r.acc_is(next));
                require(switched >= 0.9, || {
                    format!("ACC held next vehicle only {:.0}% of ticks", switched * 100.0)
                })
            }
            ScenarioId::GpsDropout => {
                let rate = trace.len() as f64 / trace.last().map_or(1.0, |r| r.time_s);
                let expected = (2.0 * rate * 0.9) as u64;
                require(metrics.faults.stale_gps >= expected, || {
                    format!("only {} stale GPS cycles recorded", metrics.faults.stale_gps)
                })?;
                require(metrics.max_velocity_error < 0.5, || {
                    format!("max velocity error {:.3} m/s", metrics.max_velocity_error)
                })
            }
            ScenarioId::ImuSpike => {
                require(metrics.faults.accel_spikes >= 3, || {
                    format!("{} of 3 IMU spikes rejected", metrics.faults.accel_spikes)
                })?;
                require(metrics.faults.gps_spikes >= 1, || "GPS spike not rejected".to_string())?;
                require(metrics.max_velocity_error < 0.3, || {
                    format!("max velocity error {:.3} m/s", metrics.max_velocity_error)
                })
            }
            ScenarioId::CurvedRoad => {
                let tagged = share(trace, |r| {
                    matches!(r.acc, Some((id, Situation::Curve)) if id == primary)
                });
                require(tagged >= 0.9, || {
                    format!("curve-tagged lead only {:.0}% of ticks", tagged * 100.0)
                })
            }
            ScenarioId::StationaryObstacle => {
                let stopped: Vec<TickRecord> =
                    trace.iter().filter(|r| r.time_s >= 5.0).cloned().collect();
                require(!stopped.iter().any(|r| r.acc_is(primary)), || {
                    "stationary obstacle selected for ACC".to_string()
                })?;
                let aeb = share(&stopped, |r| r.aeb_is(primary));
                require(aeb >= 0.9, || {
                    format!("AEB held obstacle only {:.0}% of standstill ticks", aeb * 100.0)
                })
            }
        }
    }
}

// ============================================================================
// RUNNER
// ============================================================================

/// Runs driving scenarios.
pub struct ScenarioRunner {
    /// Configuration seed
    seed: u64,

    config: SimConfig,
}

impl ScenarioRunner {
    /// Creates a new scenario runner.
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            config: SimConfig::default(),
        }
    }

    /// Replaces the whole harness configuration.
    pub fn with_config(mut self, config: SimConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the tick rate.
    pub fn with_tick_rate(mut self, hz: u32) -> Self {
        self.config.tick_rate_hz = hz.max(1);
        self
    }

    /// Sets the requested duration.
    pub fn with_duration(mut self, secs: f64) -> Self {
        self.config.duration_secs = secs;
        self
    }

    /// Sets the pipeline configuration under test.
    pub fn with_pipeline(mut self, pipeline: PipelineConfig) -> Self {
        self.config.pipeline = pipeline;
        self
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    /// Runs a scenario and returns the result.
    pub fn run(&self, scenario: ScenarioId) -> ScenarioResult {
        self.execute(scenario, None)
    }

    /// Runs a scenario and records frames for export.
    pub fn run_with_export(&self, scenario: ScenarioId) -> (ScenarioResult, SimExport) {
        let mut export = SimExport::new(scenario.name(), self.seed);
        let result = self.execute(scenario, Some(&mut export));
        export.finalize(
            result.passed,
            result.failure_reason.clone(),
            Some(result.metrics.velocity_rmse),
        );
        (result, export)
    }

    fn effective_duration(&self, scenario: ScenarioId) -> f64 {
        let (min, max) = scenario.duration_range();
        let requested = self.config.duration_secs;
        let duration = if requested.is_finite() { requested.clamp(min, max) } else { min };
        if duration != requested {
            warn!(
                "{}: duration {:.1}s clamped to {:.1}s",
                scenario.name(),
                requested,
                duration
            );
        }
        duration
    }

    fn execute(&self, scenario: ScenarioId, mut export: Option<&mut SimExport>) -> ScenarioResult {
        info!(
            "{}: {} (seed={}) - {}",
            scenario.code(),
            scenario.name(),
            self.seed,
            scenario.description()
        );

        let physics_seed = self.seed.wrapping_mul(0x9e3779b97f4a7c15);
        let mut oracle = match Oracle::new(physics_seed, &self.config.noise) {
            Ok(oracle) => oracle,
            Err(err) => return self.aborted(scenario, err.to_string()),
        };

        let tick_rate = self.config.tick_rate_hz.max(1);
        let dt = 1.0 / tick_rate as f64;
        oracle.set_tick_period(dt);

        let script = Script::build(scenario, &mut oracle);

        // Boot the estimator with the true initial motion
        let truth = *oracle.ego();
        let boot_imu = ImuSample {
            accel_x: truth.acceleration.x,
            accel_y: truth.acceleration.y,
            yaw_rate_deg_s: truth.yaw_rate_deg_s,
        };
        let state = EstimatorState::seeded(
            &self.config.pipeline.estimator,
            oracle.time_ms(),
            truth.velocity,
            &boot_imu,
            truth.heading_deg,
        );
        let mut pipeline = AdasPipeline::with_state(self.config.pipeline.clone(), state);

        let target_ticks = (self.effective_duration(scenario) * tick_rate as f64).round() as u64;
        let mut trace = Vec::with_capacity(target_ticks as usize);

        for tick in 0..target_ticks {
            script.maneuver(&mut oracle);
            oracle.step(dt);

            let input = CycleInput {
                time: TimeSample::new(oracle.time_ms()),
                gps: oracle.gps_sample(),
                imu: oracle.imu_sample(),
                lane: script.lane(&oracle),
                objects: oracle.perceive(),
                max_count: MAX_OBJECTS,
            };
            let output = pipeline.step(&input);
            let record = TickRecord::new(&oracle, &output);

            if let Some(export) = export.as_deref_mut() {
                if tick % EXPORT_INTERVAL == 0 {
                    export.add_frame(frame(&oracle, &output));
                }
            }

            if tick % tick_rate as u64 == 0 {
                debug!(
                    "  t={:.1}s | v_true={:.2} v_est={:.2} | acc={:?} aeb={:?}",
                    record.time_s,
                    record.true_velocity.x,
                    record.est_velocity.x,
                    record.acc,
                    record.aeb
                );
            }

            trace.push(record);
        }

        let metrics = ScenarioMetrics::from_trace(&trace, pipeline.state().counters);
        let verdict = script.check(&trace, &metrics);

        match &verdict {
            Ok(()) => info!(
                "{} passed: rmse={:.3} m/s, acc ticks={}, aeb ticks={}",
                scenario.name(),
                metrics.velocity_rmse,
                metrics.acc_target_ticks,
                metrics.aeb_target_ticks
            ),
            Err(reason) => warn!("{} failed: {}", scenario.name(), reason),
        }

        ScenarioResult {
            scenario,
            seed: self.seed,
            passed: verdict.is_ok(),
            total_ticks: target_ticks,
            final_time_secs: oracle.time(),
            failure_reason: verdict.err(),
            metrics,
        }
    }

    fn aborted(&self, scenario: ScenarioId, reason: String) -> ScenarioResult {
        warn!("{} aborted: {}", scenario.name(), reason);
        ScenarioResult {
            scenario,
            seed: self.seed,
            passed: false,
            total_ticks: 0,
            final_time_secs: 0.0,
            failure_reason: Some(reason),
            metrics: ScenarioMetrics::default(),
        }
    }
}

fn frame(oracle: &Oracle, output: &CycleOutput) -> SimFrame {
    let truth = oracle.ego_state();
    let target = |t: &Target| {
        t.is_selected().then(|| TargetFrame {
            id: t.id,
            distance: t.distance,
            situation: t.situation,
        })
    };

    let mut events = Vec::new();
    if output.faults.any() {
        events.push(SimEvent::warn(format!("estimator faults: {:?}", output.faults)));
    }
    if let adas_core::pipeline::CycleStatus::Degraded(reason) = &output.status {
        events.push(SimEvent::warn(format!("degraded cycle: {reason}")));
    }

    SimFrame {
        time_sec: oracle.time(),
        ego: EgoFrame {
            true_vx: truth.velocity.x,
            true_vy: truth.velocity.y,
            est_vx: output.ego.velocity.x,
            est_vy: output.ego.velocity.y,
            true_heading_deg: truth.heading_deg,
            est_heading_deg: output.ego.heading_deg,
        },
        ground_truth: oracle.objects().iter().map(ObjectPosition::from).collect(),
        acc_target: target(&output.targets.acc),
        aeb_target: target(&output.targets.aeb),
        events,
    }
}
