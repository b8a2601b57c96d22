//! Closed-loop driving scenarios.

use crate::error::SimError;

/// Scenario identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScenarioId {
    /// SIM-001: Steady car following
    FollowLead,

    /// SIM-002: Neighbor merges between ego and lead
    CutIn,

    /// SIM-003: Lead leaves the lane, revealing a farther vehicle
    CutOut,

    /// SIM-004: GPS blackout while accelerating
    GpsDropout,

    /// SIM-005: IMU and GPS spikes
    ImuSpike,

    // ═══════════════════════════════════════════════════
    // GEOMETRY SCENARIOS
    // ═══════════════════════════════════════════════════
    /// SIM-006: Following on a curve with heading error
    CurvedRoad,

    /// SIM-007: Ego brakes to a standstill behind an obstacle
    StationaryObstacle,
}

impl ScenarioId {
    /// Returns a list of all scenarios.
    pub fn all() -> Vec<ScenarioId> {
        vec![
            ScenarioId::FollowLead,
            ScenarioId::CutIn,
            ScenarioId::CutOut,
            ScenarioId::GpsDropout,
            ScenarioId::ImuSpike,
            ScenarioId::CurvedRoad,
            ScenarioId::StationaryObstacle,
        ]
    }

    /// Returns the scenario name.
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioId::FollowLead => "follow_lead",
            ScenarioId::CutIn => "cut_in",
            ScenarioId::CutOut => "cut_out",
            ScenarioId::GpsDropout => "gps_dropout",
            ScenarioId::ImuSpike => "imu_spike",
            ScenarioId::CurvedRoad => "curved_road",
            ScenarioId::StationaryObstacle => "stationary_obstacle",
        }
    }

    /// Returns a description of the scenario.
    pub fn description(&self) -> &'static str {
        match self {
            ScenarioId::FollowLead => {
                "Ego at 20 m/s behind a 21 m/s lead, verify stable ACC/AEB target"
            }
            ScenarioId::CutIn => "Neighbor merges 30m ahead, verify cut-in tagging and takeover",
            ScenarioId::CutOut => {
                "Lead drifts out of lane, verify exclusion and switch to next vehicle"
            }
            ScenarioId::GpsDropout => "2s GPS loss while accelerating, verify IMU dead reckoning",
            ScenarioId::ImuSpike => "Injected IMU/GPS spikes, verify rejection and bounded error",
            ScenarioId::CurvedRoad => "500m radius curve with heading error, verify curve tagging",
            ScenarioId::StationaryObstacle => {
                "Ego stops behind a parked car, verify AEB-only selection"
            }
        }
    }

    /// Returns the scenario code (SIM-xxx).
    pub fn code(&self) -> &'static str {
        match self {
            ScenarioId::FollowLead => "SIM-001",
            ScenarioId::CutIn => "SIM-002",
            ScenarioId::CutOut => "SIM-003",
            ScenarioId::GpsDropout => "SIM-004",
            ScenarioId::ImuSpike => "SIM-005",
            ScenarioId::CurvedRoad => "SIM-006",
            ScenarioId::StationaryObstacle => "SIM-007",
        }
    }

    /// Duration bounds [s] within which the scenario's checks are meaningful.
    pub fn duration_range(&self) -> (f64, f64) {
        match self {
            ScenarioId::FollowLead => (3.0, 120.0),
            ScenarioId::CutIn => (8.0, 12.0),
            ScenarioId::CutOut => (7.0, 20.0),
            ScenarioId::GpsDropout => (6.0, 30.0),
            ScenarioId::ImuSpike => (7.0, 60.0),
            ScenarioId::CurvedRoad => (3.0, 60.0),
            ScenarioId::StationaryObstacle => (7.0, 60.0),
        }
    }

    /// Parses a `--scenario` argument: a single name or `all`.
    pub fn parse_selection(arg: &str) -> Result<Vec<ScenarioId>, SimError> {
        if arg.eq_ignore_ascii_case("all") {
            Ok(Self::all())
        } else {
            arg.parse::<ScenarioId>()
                .map(|id| vec![id])
                .map_err(SimError::UnknownScenario)
        }
    }
}

impl std::fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for ScenarioId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "follow_lead" | "followlead" | "sim-001" => Ok(ScenarioId::FollowLead),
            "cut_in" | "cutin" | "sim-002" => Ok(ScenarioId::CutIn),
            "cut_out" | "cutout" | "sim-003" => Ok(ScenarioId::CutOut),
            "gps_dropout" | "gpsdropout" | "sim-004" => Ok(ScenarioId::GpsDropout),
            "imu_spike" | "imuspike" | "sim-005" => Ok(ScenarioId::ImuSpike),
            "curved_road" | "curvedroad" | "sim-006" => Ok(ScenarioId::CurvedRoad),
            "stationary_obstacle" | "stationaryobstacle" | "sim-007" => {
                Ok(ScenarioId::StationaryObstacle)
            }
            _ => Err(format!("Unknown scenario: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_round_trip() {
        for id in ScenarioId::all() {
            assert_eq!(id.name().parse::<ScenarioId>(), Ok(id));
            assert_eq!(id.code().parse::<ScenarioId>(), Ok(id));
            assert_eq!(id.to_string(), id.name());
        }
    }

    #[test]
    fn test_parse_aliases_and_case() {
        assert_eq!("CutIn".parse::<ScenarioId>(), Ok(ScenarioId::CutIn));
        assert_eq!("GPS_DROPOUT".parse::<ScenarioId>(), Ok(ScenarioId::GpsDropout));
        assert!("split_brain".parse::<ScenarioId>().is_err());
    }

    #[test]
    fn test_duration_ranges_are_ordered() {
        for id in ScenarioId::all() {
            let (min, max) = id.duration_range();
            assert!(min > 0.0 && min <= max, "{id}");
        }
    }

    #[test]
    fn test_parse_selection() {
        assert_eq!(ScenarioId::parse_selection("all").unwrap().len(), 7);
        assert_eq!(
            ScenarioId::parse_selection("curved_road").unwrap(),
            vec![ScenarioId::CurvedRoad]
        );
        assert!(matches!(
            ScenarioId::parse_selection("nope"),
            Err(SimError::UnknownScenario(_))
        ));
    }
}
