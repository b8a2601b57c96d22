//! ADAS Core - Ego State Estimation and ACC/AEB Target Selection
//!
//! This library turns raw driver-assistance inputs into control decisions:
//! 1. **Ego Estimation**: spike-filtered IMU/GPS fusion via a linear Kalman filter
//! 2. **Object Gating**: range/lateral gating, status reclassification and spatial cells
//! 3. **Path Prediction**: fixed-horizon extrapolation with cut-in/cut-out flags
//! 4. **Target Arbitration**: one ACC and one AEB target per cycle

pub mod ego_estimation;
pub mod error;
pub mod lane_selection;
pub mod object_gate;
pub mod path_prediction;
pub mod pipeline;
pub mod target_arbitration;
pub mod types;

// Re-export key types for convenience
pub use ego_estimation::{EgoEstimator, EstimatorConfig, EstimatorState};
pub use error::AdasError;
pub use lane_selection::{LaneContext, LaneGeometry};
pub use object_gate::ObjectGate;
pub use path_prediction::PathPredictor;
pub use pipeline::{AdasPipeline, CycleInput, CycleOutput, PipelineConfig};
pub use target_arbitration::TargetArbitrator;
pub use types::{EgoState, GpsSample, ImuSample, RawObject, Target, TargetSelection, TimeSample};
