//! Configuration loading for the CLI.

use adas_core::PipelineConfig;
use std::path::Path;

use crate::error::SimError;

/// Reads a JSON pipeline configuration. Omitted fields keep their defaults.
pub fn load_pipeline_config(path: impl AsRef<Path>) -> Result<PipelineConfig, SimError> {
    let text = std::fs::read_to_string(path)?;
    Ok(PipelineConfig::from_json_str(&text)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_pipeline_config() {
        let path =
            std::env::temp_dir().join(format!("adas_sim_config_{}.json", std::process::id()));
        let text = r#"{ "gate": { "max_range_m": 120.0, "preserve_stopped": true } }"#;
        std::fs::write(&path, text).unwrap();

        let config = load_pipeline_config(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config.gate.max_range_m, 120.0);
        assert!(config.gate.preserve_stopped);
        assert_eq!(config.prediction.horizon_s, 3.0);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let result = load_pipeline_config("/nonexistent/adas_sim/config.json");
        assert!(matches!(result, Err(SimError::Io(_))));
    }
}
