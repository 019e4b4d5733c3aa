// EPOCH SETTLEMENT
// Closes an epoch: reputation credit, performance summaries, counter reset
//
// SAFETY INVARIANTS:
// 1. Participants are visited in address order, whatever order the caller holds them in
// 2. Only ACTIVE participants earn an epoch of reputation
// 3. Counters and both LLR accumulators start the next epoch at zero

use crate::participant::{Participant, ParticipantStatus};
use log::{debug, info};
use serde::{Deserialize, Serialize};

/// Per-participant record of a settled epoch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpochPerformanceSummary {
    pub epoch_index: u64,
    pub participant: String,
    pub status: ParticipantStatus,
    pub inference_count: u64,
    pub missed_requests: u64,
    pub validated_inferences: u64,
    pub invalidated_inferences: u64,
}

/// Settle `epoch_index` for every participant, returning summaries in address order.
pub fn settle_epoch(epoch_index: u64, participants: &mut [Participant]) -> Vec<EpochPerformanceSummary> {
    let mut order: Vec<usize> = (0..participants.len()).collect();
    order.sort_by(|a, b| participants[*a].address.cmp(&participants[*b].address));

    let mut summaries = Vec::with_capacity(order.len());
    for index in order {
        let participant = &mut participants[index];
        if participant.status() == ParticipantStatus::Active {
            participant.epochs_completed = participant.epochs_completed.saturating_add(1);
        }

        let stats = &participant.current_epoch_stats;
        summaries.push(EpochPerformanceSummary {
            epoch_index,
            participant: participant.address.clone(),
            status: participant.status(),
            inference_count: stats.inference_count,
            missed_requests: stats.missed_requests,
            validated_inferences: stats.validated_inferences,
            invalidated_inferences: stats.invalidated_inferences,
        });
        debug!(
            "Settled {} for epoch {}: {} inferences, {} missed",
            participant.address, epoch_index, stats.inference_count, stats.missed_requests
        );

        participant.current_epoch_stats.reset();
    }

    info!("Epoch {} settled for {} participants", epoch_index, summaries.len());
    summaries
}
