// PARTICIPANT RECORD
// Status, reputation and per-epoch counters of a compute-network participant
//
// SAFETY INVARIANTS:
// 1. Status is private: only the transition controller assigns it
// 2. The LLR accumulators are written only by status evaluation and settlement
// 3. Raw counters change only through the record_* handlers
// 4. Counters saturate instead of overflowing

use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};

/// Lifecycle status of a participant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ParticipantStatus {
    /// Serving and validating normally
    #[default]
    Active,
    /// Provisional, too few samples to judge
    Ramping,
    /// Excluded for downtime or a failed confirmation PoC
    Inactive,
    /// Excluded for invalid work
    Invalid,
}

impl ParticipantStatus {
    /// INVALID and INACTIVE are only cleared by an explicit epoch-boundary reset.
    pub fn is_sticky(&self) -> bool {
        matches!(self, ParticipantStatus::Invalid | ParticipantStatus::Inactive)
    }
}

/// Counters accumulated during the current epoch, reset at settlement.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CurrentEpochStats {
    pub inference_count: u64,
    pub missed_requests: u64,
    pub validated_inferences: u64,
    pub invalidated_inferences: u64,

    /// Confirmed / claimed PoC weight, when a confirmation round has run
    pub confirmation_poc_ratio: Option<BigDecimal>,

    /// Cumulative log-likelihood ratio of the invalidation test
    pub(crate) invalid_llr: BigDecimal,

    /// Cumulative log-likelihood ratio of the downtime test
    pub(crate) inactive_llr: BigDecimal,
}

impl CurrentEpochStats {
    /// Overwrite both accumulators. Stored stats come back through deserialization;
    /// outside this crate only the evaluator writes the LLRs.
    pub(crate) fn with_llrs(mut self, invalid_llr: BigDecimal, inactive_llr: BigDecimal) -> Self {
        self.invalid_llr = invalid_llr;
        self.inactive_llr = inactive_llr;
        self
    }

    pub fn invalid_llr(&self) -> &BigDecimal {
        &self.invalid_llr
    }

    pub fn inactive_llr(&self) -> &BigDecimal {
        &self.inactive_llr
    }

    pub(crate) fn reset(&mut self) {
        *self = CurrentEpochStats::default();
    }
}

/// A participant as stored by the chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub address: String,

    #[serde(default)]
    status: ParticipantStatus,

    /// Reputation: epochs settled while ACTIVE
    #[serde(default)]
    pub epochs_completed: u32,

    /// Current streak of invalidations, cleared by a successful validation
    #[serde(default)]
    pub consecutive_invalid_inferences: u64,

    #[serde(default)]
    pub current_epoch_stats: CurrentEpochStats,
}

impl Participant {
    pub fn new(address: impl Into<String>) -> Self {
        Participant {
            address: address.into(),
            status: ParticipantStatus::Active,
            epochs_completed: 0,
            consecutive_invalid_inferences: 0,
            current_epoch_stats: CurrentEpochStats::default(),
        }
    }

    /// Rehydrate a participant whose status was already persisted.
    pub fn from_stored(address: impl Into<String>, status: ParticipantStatus) -> Self {
        Participant {
            status,
            ..Participant::new(address)
        }
    }

    pub fn status(&self) -> ParticipantStatus {
        self.status
    }

    pub(crate) fn assign_status(&mut self, status: ParticipantStatus) {
        self.status = status;
    }

    /// An inference this participant executed has finished.
    pub fn record_inference_finished(&mut self) {
        let stats = &mut self.current_epoch_stats;
        stats.inference_count = stats.inference_count.saturating_add(1);
    }

    /// A validator confirmed one of this participant's inferences.
    pub fn record_validated(&mut self) {
        let stats = &mut self.current_epoch_stats;
        stats.validated_inferences = stats.validated_inferences.saturating_add(1);
        self.consecutive_invalid_inferences = 0;
    }

    /// A vote invalidated one of this participant's inferences.
    pub fn record_invalidated(&mut self) {
        let stats = &mut self.current_epoch_stats;
        stats.invalidated_inferences = stats.invalidated_inferences.saturating_add(1);
        self.consecutive_invalid_inferences = self.consecutive_invalid_inferences.saturating_add(1);
    }

    /// A liveness check found a request this participant never served.
    pub fn record_missed_request(&mut self) {
        let stats = &mut self.current_epoch_stats;
        stats.missed_requests = stats.missed_requests.saturating_add(1);
    }

    pub fn record_confirmation_poc_ratio(&mut self, ratio: BigDecimal) {
        self.current_epoch_stats.confirmation_poc_ratio = Some(ratio);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bigdecimal::Zero;
    use std::str::FromStr;

    #[test]
    fn test_new_participant_is_active() {
        let participant = Participant::new("gonka1alice");
        assert_eq!(participant.status(), ParticipantStatus::Active);
        assert_eq!(participant.epochs_completed, 0);
        assert!(participant.current_epoch_stats.invalid_llr().is_zero());
        assert!(participant.current_epoch_stats.inactive_llr().is_zero());
    }

    #[test]
    fn test_sticky_statuses() {
        assert!(ParticipantStatus::Invalid.is_sticky());
        assert!(ParticipantStatus::Inactive.is_sticky());
        assert!(!ParticipantStatus::Active.is_sticky());
        assert!(!ParticipantStatus::Ramping.is_sticky());
    }

    #[test]
    fn test_validation_resets_streak() {
        let mut participant = Participant::new("gonka1alice");
        participant.record_invalidated();
        participant.record_invalidated();
        assert_eq!(participant.consecutive_invalid_inferences, 2);

        participant.record_validated();
        assert_eq!(participant.consecutive_invalid_inferences, 0);
        assert_eq!(participant.current_epoch_stats.invalidated_inferences, 2);
        assert_eq!(participant.current_epoch_stats.validated_inferences, 1);
    }

    #[test]
    fn test_counters() {
        let mut participant = Participant::new("gonka1alice");
        participant.record_inference_finished();
        participant.record_inference_finished();
        participant.record_missed_request();
        participant.record_confirmation_poc_ratio(BigDecimal::from_str("0.8").unwrap());

        let stats = &participant.current_epoch_stats;
        assert_eq!(stats.inference_count, 2);
        assert_eq!(stats.missed_requests, 1);
        assert_eq!(stats.confirmation_poc_ratio, Some(BigDecimal::from_str("0.8").unwrap()));
    }

    #[test]
    fn test_reset_clears_llrs() {
        let mut stats = CurrentEpochStats {
            inference_count: 9,
            ..CurrentEpochStats::default()
        }
        .with_llrs(BigDecimal::from(2), BigDecimal::from(-1));

        stats.reset();
        assert_eq!(stats, CurrentEpochStats::default());
    }

    #[test]
    fn test_llrs_rehydrate_from_storage() {
        let stored = r#"{"inference_count": 12, "invalid_llr": "1.137", "inactive_llr": "-0.25"}"#;
        let stats: CurrentEpochStats = serde_json::from_str(stored).unwrap();

        assert_eq!(stats.inference_count, 12);
        assert_eq!(*stats.invalid_llr(), BigDecimal::from_str("1.137").unwrap());
        assert_eq!(*stats.inactive_llr(), BigDecimal::from_str("-0.25").unwrap());

        let encoded = serde_json::to_string(&stats).unwrap();
        assert_eq!(serde_json::from_str::<CurrentEpochStats>(&encoded).unwrap(), stats);
    }

    #[test]
    fn test_status_json_encoding() {
        let participant = Participant::from_stored("gonka1bob", ParticipantStatus::Invalid);
        let json = serde_json::to_string(&participant).unwrap();
        assert!(json.contains("\"status\":\"INVALID\""));

        let decoded: Participant = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, participant);
    }
}
