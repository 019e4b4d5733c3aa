// STATUS TRANSITION CONTROLLER
// The single writer of participant status and trigger of invalidation side effects
//
// SAFETY INVARIANTS:
// 1. No other code path assigns Participant::status
// 2. Unchanged status is a no-op (apart from persisting the LLR accumulators)
// 3. INVALID and INACTIVE are never left from here; only an epoch reset clears them
// 4. The INVALID side effects run once, on the transition into INVALID
// 5. Slashing is guarded by a per-(epoch, address) record; an existing exclusion entry is never rewritten
// 6. Side effects are not rolled back: every step is attempted and failures are reported together

use crate::collaborators::{
    CollaboratorError, CollateralLedger, EpochMembership, ExcludedParticipant, ExclusionLedger, SlashRecords,
};
use crate::params::ModuleParams;
use crate::participant::{CurrentEpochStats, Participant, ParticipantStatus};
use crate::status::{compute_status, StatusReason};
use bigdecimal::{BigDecimal, One, RoundingMode, ToPrimitive, Zero};
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Block-level context of an evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockContext {
    pub height: u64,
    /// Epoch currently in effect, if the chain has started one
    pub effective_epoch: Option<u64>,
}

/// Mutable handles to everything an invalidation touches.
pub struct Collaborators<'a> {
    pub collateral: &'a mut dyn CollateralLedger,
    pub membership: &'a mut dyn EpochMembership,
    pub exclusions: &'a mut dyn ExclusionLedger,
    pub slash_records: &'a mut dyn SlashRecords,
}

/// Step of the invalidation sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvalidationStep {
    SlashCollateral,
    MarkSlashed,
    RecordExclusion,
    RemoveFromGroups,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SideEffectFailure {
    pub step: InvalidationStep,
    pub error: CollaboratorError,
}

#[derive(Debug, Error)]
pub enum TransitionError {
    #[error("{} invalidation side effect(s) failed for {address}; status is {status:?}", .failures.len())]
    SideEffects {
        address: String,
        status: ParticipantStatus,
        failures: Vec<SideEffectFailure>,
    },
}

/// What the invalidation sequence actually did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvalidationEffects {
    pub slashed: bool,
    pub exclusion_recorded: bool,
    pub epochs_completed_before: u32,
    pub epochs_completed_after: u32,
    pub removed_from_groups: bool,
}

/// Result of one controller call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusTransition {
    pub from: ParticipantStatus,
    pub to: ParticipantStatus,
    pub reason: StatusReason,
    /// Present only on a transition into INVALID
    pub invalidation: Option<InvalidationEffects>,
}

impl StatusTransition {
    pub fn changed(&self) -> bool {
        self.from != self.to
    }
}

pub struct StatusTransitionController {
    params: ModuleParams,
}

impl StatusTransitionController {
    pub fn new(params: ModuleParams) -> Self {
        StatusTransitionController { params }
    }

    /// Evaluate `participant` and apply the outcome.
    ///
    /// The updated LLR accumulators are always written back. When the status moves
    /// into INVALID the four invalidation steps run in order; if any of them fail
    /// the status stays written and the failures are returned together.
    pub fn update_participant_status(
        &self,
        participant: &mut Participant,
        previous: &CurrentEpochStats,
        block: &BlockContext,
        effects: &mut Collaborators<'_>,
    ) -> Result<StatusTransition, TransitionError> {
        let decision = compute_status(
            Some(&self.params.validation),
            Some(&self.params.confirmation_poc),
            participant,
            previous,
        );
        participant.current_epoch_stats = decision.stats;

        let from = participant.status();
        let unchanged = StatusTransition {
            from,
            to: from,
            reason: decision.reason,
            invalidation: None,
        };

        if decision.status == from {
            debug!("Status of {} unchanged ({:?}, {})", participant.address, from, decision.reason);
            return Ok(unchanged);
        }
        if from.is_sticky() {
            warn!(
                "Refusing to move {} from {:?} to {:?} outside an epoch reset",
                participant.address, from, decision.status
            );
            return Ok(unchanged);
        }

        participant.assign_status(decision.status);
        info!(
            "Participant {} status {:?} -> {:?} ({})",
            participant.address, from, decision.status, decision.reason
        );

        let mut transition = StatusTransition {
            from,
            to: decision.status,
            reason: decision.reason,
            invalidation: None,
        };

        if decision.status == ParticipantStatus::Invalid {
            let (report, failures) = self.invalidate(participant, decision.reason, block, effects);
            transition.invalidation = Some(report);
            if !failures.is_empty() {
                return Err(TransitionError::SideEffects {
                    address: participant.address.clone(),
                    status: participant.status(),
                    failures,
                });
            }
        }

        Ok(transition)
    }

    fn invalidate(
        &self,
        participant: &mut Participant,
        reason: StatusReason,
        block: &BlockContext,
        effects: &mut Collaborators<'_>,
    ) -> (InvalidationEffects, Vec<SideEffectFailure>) {
        let address = participant.address.clone();
        let mut report = InvalidationEffects::default();
        let mut failures = Vec::new();

        // 1) Slash collateral, once per epoch
        match &self.params.collateral.slash_fraction_invalid {
            Some(fraction) => {
                let already = block
                    .effective_epoch
                    .map(|epoch| effects.slash_records.already_slashed(epoch, &address))
                    .unwrap_or(false);
                if already {
                    warn!("{} already slashed this epoch, skipping", address);
                } else {
                    match effects.collateral.slash_collateral(&address, fraction) {
                        Ok(()) => {
                            report.slashed = true;
                            match block.effective_epoch {
                                Some(epoch) => {
                                    if let Err(e) = effects.slash_records.mark_slashed(epoch, &address) {
                                        error!("Failed to record slash of {}: {}", address, e);
                                        failures.push(SideEffectFailure {
                                            step: InvalidationStep::MarkSlashed,
                                            error: e,
                                        });
                                    }
                                }
                                None => warn!("No effective epoch, slash of {} left unrecorded", address),
                            }
                        }
                        Err(e) => {
                            error!("Failed to slash {}: {}", address, e);
                            failures.push(SideEffectFailure {
                                step: InvalidationStep::SlashCollateral,
                                error: e,
                            });
                        }
                    }
                }
            }
            None => warn!("No invalid slash fraction configured, {} not slashed", address),
        }

        // 2) Exclusion entry for the effective epoch, unless one already exists
        match block.effective_epoch {
            Some(epoch) if effects.exclusions.is_excluded(epoch, &address) => {
                warn!("{} already excluded for epoch {}, keeping the existing entry", address, epoch);
            }
            Some(epoch) => {
                let entry = ExcludedParticipant {
                    address: address.clone(),
                    epoch_index: epoch,
                    reason: reason.as_str().to_string(),
                    effective_height: block.height,
                };
                match effects.exclusions.record_exclusion(entry) {
                    Ok(()) => report.exclusion_recorded = true,
                    Err(e) => {
                        error!("Failed to record exclusion of {}: {}", address, e);
                        failures.push(SideEffectFailure {
                            step: InvalidationStep::RecordExclusion,
                            error: e,
                        });
                    }
                }
            }
            None => warn!("No effective epoch, exclusion of {} not recorded", address),
        }

        // 3) Reputation haircut
        report.epochs_completed_before = participant.epochs_completed;
        participant.epochs_completed = preserve_reputation(
            participant.epochs_completed,
            self.params.validation.invalid_reputation_preserve.as_ref(),
        );
        report.epochs_completed_after = participant.epochs_completed;

        // 4) Leave the current epoch's groups
        match effects.membership.remove_from_groups(&address, reason) {
            Ok(()) => report.removed_from_groups = true,
            Err(e) => {
                error!("Failed to remove {} from epoch groups: {}", address, e);
                failures.push(SideEffectFailure {
                    step: InvalidationStep::RemoveFromGroups,
                    error: e,
                });
            }
        }

        (report, failures)
    }
}

/// round(completed * preserve), unchanged when the fraction is unset or outside [0, 1].
pub fn preserve_reputation(completed: u32, preserve: Option<&BigDecimal>) -> u32 {
    let preserve = match preserve {
        Some(preserve) if *preserve >= BigDecimal::zero() && *preserve <= BigDecimal::one() => preserve,
        _ => return completed,
    };
    (BigDecimal::from(completed) * preserve)
        .with_scale_round(0, RoundingMode::HalfUp)
        .to_u32()
        .unwrap_or(completed)
}
