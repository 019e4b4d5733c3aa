// STATUS EVALUATION
// Ordered, pure decision procedure turning counters into a participant status
//
// SAFETY INVARIANTS:
// 1. Pure: no I/O, no clocks, no randomness, no floats
// 2. INVALID and INACTIVE are sticky and reported as AlreadySet
// 3. Configuration errors never escalate: they yield ACTIVE / AlgorithmError
// 4. Each SPRT consumes only the counter delta since the previous snapshot
// 5. Returned stats always carry the updated LLR accumulators

use crate::params::{ConfirmationPoCParams, ValidationParams};
use crate::participant::{CurrentEpochStats, Participant, ParticipantStatus};
use bigdecimal::{BigDecimal, Zero};
use inference_math::{is_consecutive_failure_rare, Decision, SequentialProbabilityRatioTest, LOG_PRECISION};
use log::{debug, error};
use serde::{Deserialize, Serialize};

/// Why a status was chosen. The string forms are stable and recorded on-chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusReason {
    #[serde(rename = "")]
    None,
    ConsecutiveFailures,
    Ramping,
    StatisticalInvalidations,
    Downtime,
    FailedConfirmationPoc,
    /// Bad parameters or math domain error; should never happen in production
    AlgorithmError,
    /// Participant was already INVALID or INACTIVE
    AlreadySet,
}

impl StatusReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusReason::None => "",
            StatusReason::ConsecutiveFailures => "consecutive_failures",
            StatusReason::Ramping => "ramping",
            StatusReason::StatisticalInvalidations => "statistical_invalidations",
            StatusReason::Downtime => "downtime",
            StatusReason::FailedConfirmationPoc => "failed_confirmation_poc",
            StatusReason::AlgorithmError => "algorithm_error",
            StatusReason::AlreadySet => "already_set",
        }
    }
}

impl std::fmt::Display for StatusReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusDecision {
    pub status: ParticipantStatus,
    pub reason: StatusReason,
    /// The participant's counters with updated LLR accumulators
    pub stats: CurrentEpochStats,
}

impl StatusDecision {
    fn new(status: ParticipantStatus, reason: StatusReason, stats: CurrentEpochStats) -> Self {
        StatusDecision { status, reason, stats }
    }
}

/// Verdict of one sub-check, with configuration problems kept distinct.
enum CheckOutcome {
    Clear,
    Failed,
    Misconfigured,
}

/// Evaluate a participant against the current parameters.
///
/// `previous` is the counter snapshot from the last evaluation; only the growth
/// since then is fed into the sequential tests.
pub fn compute_status(
    params: Option<&ValidationParams>,
    confirmation: Option<&ConfirmationPoCParams>,
    participant: &Participant,
    previous: &CurrentEpochStats,
) -> StatusDecision {
    let mut stats = participant.current_epoch_stats.clone();

    // Genesis / bootstrap: nothing to judge against
    let params = match params {
        Some(params) => params,
        None => return StatusDecision::new(ParticipantStatus::Active, StatusReason::None, stats),
    };
    let (false_positive_rate, cutoff) =
        match (&params.false_positive_rate, &params.quick_failure_threshold) {
            (Some(rate), Some(cutoff)) => (rate, cutoff),
            _ => return StatusDecision::new(ParticipantStatus::Active, StatusReason::None, stats),
        };

    if participant.status().is_sticky() {
        return StatusDecision::new(participant.status(), StatusReason::AlreadySet, stats);
    }

    match is_consecutive_failure_rare(
        false_positive_rate,
        participant.consecutive_invalid_inferences,
        cutoff,
    ) {
        Ok(true) => {
            return StatusDecision::new(
                ParticipantStatus::Invalid,
                StatusReason::ConsecutiveFailures,
                stats,
            )
        }
        Ok(false) => {}
        Err(e) => {
            error!("Consecutive failure check failed for {}: {}", participant.address, e);
            return StatusDecision::new(ParticipantStatus::Active, StatusReason::AlgorithmError, stats);
        }
    }

    match invalidation_check(&mut stats, previous, params, false_positive_rate) {
        CheckOutcome::Failed => {
            return StatusDecision::new(
                ParticipantStatus::Invalid,
                StatusReason::StatisticalInvalidations,
                stats,
            )
        }
        CheckOutcome::Misconfigured => {
            error!("Invalidation SPRT misconfigured, keeping {} active", participant.address);
            return StatusDecision::new(ParticipantStatus::Active, StatusReason::AlgorithmError, stats);
        }
        CheckOutcome::Clear => {}
    }

    match downtime_check(&mut stats, previous, params) {
        CheckOutcome::Failed => {
            return StatusDecision::new(ParticipantStatus::Inactive, StatusReason::Downtime, stats)
        }
        CheckOutcome::Misconfigured => {
            error!("Downtime SPRT misconfigured, keeping {} active", participant.address);
            return StatusDecision::new(ParticipantStatus::Active, StatusReason::AlgorithmError, stats);
        }
        CheckOutcome::Clear => {}
    }

    if let CheckOutcome::Failed = confirmation_poc_check(&stats, confirmation) {
        return StatusDecision::new(
            ParticipantStatus::Inactive,
            StatusReason::FailedConfirmationPoc,
            stats,
        );
    }

    StatusDecision::new(ParticipantStatus::Active, StatusReason::None, stats)
}

/// SPRT over (invalidated, validated) deltas.
fn invalidation_check(
    stats: &mut CurrentEpochStats,
    previous: &CurrentEpochStats,
    params: &ValidationParams,
    false_positive_rate: &BigDecimal,
) -> CheckOutcome {
    let (bad_rate, threshold) = match (
        &params.bad_participant_invalidation_rate,
        &params.invalidation_h_threshold,
    ) {
        (Some(bad_rate), Some(threshold)) => (bad_rate, threshold),
        _ => return CheckOutcome::Misconfigured,
    };

    let mut sprt = match SequentialProbabilityRatioTest::new(
        false_positive_rate.clone(),
        bad_rate.clone(),
        threshold.clone(),
        stats.invalid_llr.clone(),
        LOG_PRECISION,
    ) {
        Ok(sprt) => sprt,
        Err(e) => {
            debug!("Invalidation SPRT rejected parameters: {}", e);
            return CheckOutcome::Misconfigured;
        }
    };

    sprt.update_counts(
        delta(stats.invalidated_inferences, previous.invalidated_inferences),
        delta(stats.validated_inferences, previous.validated_inferences),
    );
    let decision = sprt.decision();
    stats.invalid_llr = sprt.into_llr();
    outcome(decision)
}

/// SPRT over (missed, inference count) deltas.
fn downtime_check(
    stats: &mut CurrentEpochStats,
    previous: &CurrentEpochStats,
    params: &ValidationParams,
) -> CheckOutcome {
    let (good, bad, threshold) = match (
        &params.downtime_good_percentage,
        &params.downtime_bad_percentage,
        &params.downtime_h_threshold,
    ) {
        (Some(good), Some(bad), Some(threshold)) => (good, bad, threshold),
        _ => return CheckOutcome::Misconfigured,
    };

    let mut sprt = match SequentialProbabilityRatioTest::new(
        good.clone(),
        bad.clone(),
        threshold.clone(),
        stats.inactive_llr.clone(),
        LOG_PRECISION,
    ) {
        Ok(sprt) => sprt,
        Err(e) => {
            debug!("Downtime SPRT rejected parameters: {}", e);
            return CheckOutcome::Misconfigured;
        }
    };

    sprt.update_counts(
        delta(stats.missed_requests, previous.missed_requests),
        delta(stats.inference_count, previous.inference_count),
    );
    let decision = sprt.decision();
    stats.inactive_llr = sprt.into_llr();
    outcome(decision)
}

fn confirmation_poc_check(
    stats: &CurrentEpochStats,
    params: Option<&ConfirmationPoCParams>,
) -> CheckOutcome {
    let alpha = match params.and_then(|p| p.alpha_threshold.as_ref()) {
        Some(alpha) if !alpha.is_zero() => alpha,
        _ => return CheckOutcome::Clear,
    };
    match &stats.confirmation_poc_ratio {
        Some(ratio) if ratio < alpha => CheckOutcome::Failed,
        _ => CheckOutcome::Clear,
    }
}

fn outcome(decision: Decision) -> CheckOutcome {
    match decision {
        Decision::Fail => CheckOutcome::Failed,
        Decision::Pass | Decision::Continue => CheckOutcome::Clear,
    }
}

/// Signed growth of a counter; a shrinking counter comes out negative.
fn delta(current: u64, previous: u64) -> i64 {
    let difference = i128::from(current) - i128::from(previous);
    i64::try_from(difference).unwrap_or(if difference < 0 { i64::MIN } else { i64::MAX })
}
