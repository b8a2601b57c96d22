//! ADAS Deterministic Simulation Harness
//!
//! Closed-loop driving scenarios for the ADAS core: a seeded ground-truth
//! Oracle feeds noisy GPS, IMU and perception samples into an
//! [`adas_core::AdasPipeline`], and each scenario checks the estimate and
//! the ACC/AEB targets against the truth.
//!
//! # Core Principle
//!
//! All randomness derives from a single 64-bit seed, so any failing run can
//! be replayed exactly with `adas-sim --seed <seed> --scenario <name>`.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                     ScenarioRunner                       │
//! │                                                          │
//! │  ┌────────────────────┐      samples     ┌────────────┐  │
//! │  │       Oracle       │ ───────────────► │    Adas    │  │
//! │  │ (ChaCha8 + Normal) │  GPS/IMU/objects │  Pipeline  │  │
//! │  └────────────────────┘                  └─────┬──────┘  │
//! │            ▲                                   │         │
//! │            │ maneuvers               ego, ACC/AEB        │
//! │  ┌─────────┴──────────┐                        ▼         │
//! │  │  Scenario script   │ ◄──────── trace + pass criteria  │
//! │  └────────────────────┘                                  │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use adas_sim::{ScenarioRunner, ScenarioId};
//!
//! let result = ScenarioRunner::new(42)
//!     .with_duration(10.0)
//!     .run(ScenarioId::CutIn);
//! assert!(result.passed);
//! ```

pub mod config;
pub mod error;
pub mod exporter;
pub mod oracle;
pub mod runner;
pub mod scenarios;

pub use config::load_pipeline_config;
pub use error::SimError;
pub use exporter::{SimExport, SimFrame};
pub use oracle::{EgoTruth, Oracle, SensorFault, SensorNoise};
pub use runner::{ScenarioMetrics, ScenarioResult, ScenarioRunner, SimConfig};
pub use scenarios::ScenarioId;
