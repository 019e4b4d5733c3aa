// STATUS REPLAY
// Re-runs one evaluation from JSON snapshots so operators can compare nodes
//
// SAFETY INVARIANTS:
// 1. Output depends only on the three inputs (no clock, no environment)
// 2. Rendering is stable: identical decisions print identical bytes

use inference_validation::{compute_status, CurrentEpochStats, ModuleParams, ParamsError, Participant, StatusDecision};
use log::{info, warn};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("Invalid parameter snapshot: {0}")]
    Params(#[from] ParamsError),

    #[error("Invalid participant record: {0}")]
    Participant(#[source] serde_json::Error),

    #[error("Invalid previous counters: {0}")]
    Previous(#[source] serde_json::Error),

    #[error("Failed to encode decision: {0}")]
    Encode(#[source] serde_json::Error),
}

/// Evaluate a participant exactly as the controller would, without applying anything.
///
/// `previous_json` defaults to zeroed counters, i.e. everything counts as new evidence.
pub fn replay(
    params_json: &str,
    participant_json: &str,
    previous_json: Option<&str>,
) -> Result<StatusDecision, ReplayError> {
    let params = ModuleParams::from_json_str(params_json)?;
    if let Err(e) = params.validate() {
        warn!("Replaying with out-of-bounds parameters: {}", e);
    }

    let participant: Participant = serde_json::from_str(participant_json).map_err(ReplayError::Participant)?;
    let previous = match previous_json {
        Some(json) => serde_json::from_str(json).map_err(ReplayError::Previous)?,
        None => CurrentEpochStats::default(),
    };

    let decision = compute_status(
        Some(&params.validation),
        Some(&params.confirmation_poc),
        &participant,
        &previous,
    );
    info!(
        "Replayed {}: {:?} ({})",
        participant.address, decision.status, decision.reason
    );
    Ok(decision)
}

/// Pretty JSON rendering of a decision.
pub fn render(decision: &StatusDecision) -> Result<String, ReplayError> {
    serde_json::to_string_pretty(decision).map_err(ReplayError::Encode)
}

#[cfg(test)]
mod tests {
    use super::*;
    use inference_validation::{ParticipantStatus, StatusReason};

    const PARAMS: &str = r#"{
        "validation": {
            "false_positive_rate": "0.05",
            "quick_failure_threshold": "0.000001",
            "bad_participant_invalidation_rate": "0.1",
            "invalidation_h_threshold": "4",
            "downtime_good_percentage": "0.1",
            "downtime_bad_percentage": "0.2",
            "downtime_h_threshold": "4",
            "min_ramp_up_measurements": 10,
            "invalid_reputation_preserve": "0.5"
        }
    }"#;

    #[test_log::test]
    fn test_replay_consecutive_failures() {
        let participant = r#"{
            "address": "gonka1alice",
            "status": "ACTIVE",
            "consecutive_invalid_inferences": 20
        }"#;

        let decision = replay(PARAMS, participant, None).unwrap();
        assert_eq!(decision.status, ParticipantStatus::Invalid);
        assert_eq!(decision.reason, StatusReason::ConsecutiveFailures);
    }

    #[test]
    fn test_replay_with_previous_counters() {
        let participant = r#"{
            "address": "gonka1alice",
            "current_epoch_stats": {
                "validated_inferences": 120,
                "invalidated_inferences": 9,
                "invalid_llr": "3.8"
            }
        }"#;
        let previous = r#"{ "validated_inferences": 120, "invalidated_inferences": 8 }"#;

        // one new invalidation: 3.8 + ln 2 crosses H = 4
        let decision = replay(PARAMS, participant, Some(previous)).unwrap();
        assert_eq!(decision.status, ParticipantStatus::Invalid);
        assert_eq!(decision.reason, StatusReason::StatisticalInvalidations);
        assert_eq!(decision.stats.invalid_llr().to_string(), "4.493147180560");
    }

    #[test]
    fn test_render_is_byte_identical() {
        let participant = r#"{
            "address": "gonka1bob",
            "current_epoch_stats": { "inference_count": 40, "missed_requests": 3 }
        }"#;

        let first = render(&replay(PARAMS, participant, None).unwrap()).unwrap();
        for _ in 0..5 {
            let again = render(&replay(PARAMS, participant, None).unwrap()).unwrap();
            assert_eq!(again, first);
        }
        assert!(first.contains("\"status\": \"ACTIVE\""));
    }

    #[test]
    fn test_replay_errors() {
        assert!(matches!(replay("7", "{}", None), Err(ReplayError::Params(_))));
        assert!(matches!(replay(PARAMS, "{}", None), Err(ReplayError::Participant(_))));
        assert!(matches!(
            replay(PARAMS, r#"{ "address": "gonka1alice" }"#, Some("nope")),
            Err(ReplayError::Previous(_))
        ));
    }
}
