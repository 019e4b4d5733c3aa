//! PARTICIPANT TRUST ENGINE
//!
//! Turns validation counters into participant statuses and applies the
//! consequences of a transition:
//! - `status::compute_status` is the pure, ordered decision procedure
//! - `participant_status::StatusTransitionController` is the only writer of status
//! - `collaborators` are the narrow seams to ledger, membership and exclusion storage
//! - `settlement::settle_epoch` closes an epoch

pub mod params;
pub mod participant;
pub mod status;
pub mod collaborators;
pub mod participant_status;
pub mod settlement;

pub use params::{
    CollateralParams, ConfirmationPoCParams, DecimalBounds, ModuleParams, ParamsError, ValidationParams,
};

pub use participant::{CurrentEpochStats, Participant, ParticipantStatus};

pub use status::{compute_status, StatusDecision, StatusReason};

pub use collaborators::{
    CollaboratorError, CollateralLedger, EpochMembership, ExcludedParticipant, ExclusionLedger,
    InMemoryCollateralLedger, InMemoryEpochMembership, InMemoryExclusionLedger, InMemorySlashRecords,
    SlashRecords,
};

pub use participant_status::{
    preserve_reputation, BlockContext, Collaborators, InvalidationEffects, InvalidationStep,
    SideEffectFailure, StatusTransition, StatusTransitionController, TransitionError,
};

pub use settlement::{settle_epoch, EpochPerformanceSummary};
