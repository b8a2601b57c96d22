//! JSON exporter for offline inspection.
//!
//! Exports simulation frames as JSON: ground truth, estimates and the
//! selected targets per recorded tick.

use adas_core::types::Situation;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;
use std::path::Path;

use crate::error::SimError;
use crate::oracle::ObjectTruth;

/// A single frame of simulation data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimFrame {
    /// Simulation time in seconds
    pub time_sec: f64,

    pub ego: EgoFrame,

    /// Ground truth object positions
    pub ground_truth: Vec<ObjectPosition>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub acc_target: Option<TargetFrame>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub aeb_target: Option<TargetFrame>,

    /// Events (faults, degraded cycles, etc.)
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub events: Vec<SimEvent>,
}

/// Ego truth next to the estimate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EgoFrame {
    pub true_vx: f64,
    pub true_vy: f64,
    pub est_vx: f64,
    pub est_vy: f64,
    pub true_heading_deg: f64,
    pub est_heading_deg: f64,
}

/// Position of an object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectPosition {
    pub id: i32,
    pub x: f64,
    pub y: f64,
}

impl From<&ObjectTruth> for ObjectPosition {
    fn from(obj: &ObjectTruth) -> Self {
        Self {
            id: obj.id,
            x: obj.position.x,
            y: obj.position.y,
        }
    }
}

/// A selected target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetFrame {
    pub id: i32,
    pub distance: f64,
    pub situation: Situation,
}

/// Simulation event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimEvent {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
}

impl SimEvent {
    pub fn warn(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            level: Some("warn".to_string()),
        }
    }
}

/// Complete simulation export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimExport {
    /// Scenario name
    pub scenario: String,

    /// Seed used
    pub seed: u64,

    /// Duration in seconds
    pub duration_sec: f64,

    /// All frames
    pub frames: Vec<SimFrame>,

    /// Final results
    pub passed: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,

    /// Final ego velocity RMS error if applicable
    #[serde(skip_serializing_if = "Option::is_none")]
    pub velocity_rmse: Option<f64>,
}

impl SimExport {
    /// Creates a new export container.
    pub fn new(scenario: &str, seed: u64) -> Self {
        Self {
            scenario: scenario.to_string(),
            seed,
            duration_sec: 0.0,
            frames: Vec::new(),
            passed: false,
            failure_reason: None,
            velocity_rmse: None,
        }
    }

    /// Adds a frame.
    pub fn add_frame(&mut self, frame: SimFrame) {
        self.duration_sec = frame.time_sec;
        self.frames.push(frame);
    }

    /// Finalizes the export.
    pub fn finalize(
        &mut self,
        passed: bool,
        failure_reason: Option<String>,
        velocity_rmse: Option<f64>,
    ) {
        self.passed = passed;
        self.failure_reason = failure_reason;
        self.velocity_rmse = velocity_rmse;
    }

    /// Writes to a JSON file.
    pub fn write_to_file(&self, path: impl AsRef<Path>) -> Result<(), SimError> {
        let json = serde_json::to_string_pretty(self)?;
        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }
}
