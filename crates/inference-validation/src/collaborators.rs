// EXTERNAL COLLABORATORS
// Narrow interfaces to the ledger, epoch membership and exclusion storage
//
// SAFETY INVARIANTS:
// 1. Exclusion entries are unique per (epoch, address); re-recording overwrites with identical data
// 2. Slash records are keyed exactly like exclusion entries
// 3. In-memory implementations iterate in key order (BTreeMap / BTreeSet)

use crate::status::StatusReason;
use bigdecimal::{BigDecimal, RoundingMode, Zero};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CollaboratorError {
    #[error("Participant {0} is not a member of any epoch group")]
    NotAMember(String),

    #[error("Collaborator unavailable: {0}")]
    Unavailable(String),
}

/// Exclusion of a participant from an epoch, as stored on-chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExcludedParticipant {
    pub address: String,
    pub epoch_index: u64,
    /// Canonical reason string, e.g. "consecutive_failures"
    pub reason: String,
    /// Block height at which the exclusion took effect
    pub effective_height: u64,
}

/// Locked-stake ledger. Callers guard against double slashing.
#[cfg_attr(test, mockall::automock)]
pub trait CollateralLedger {
    fn slash_collateral(&mut self, address: &str, fraction: &BigDecimal) -> Result<(), CollaboratorError>;
}

/// Current-epoch validator and compute group membership.
#[cfg_attr(test, mockall::automock)]
pub trait EpochMembership {
    fn remove_from_groups(&mut self, address: &str, reason: StatusReason) -> Result<(), CollaboratorError>;
}

/// Append-only exclusion ledger, unique per (epoch, address).
#[cfg_attr(test, mockall::automock)]
pub trait ExclusionLedger {
    fn record_exclusion(&mut self, entry: ExcludedParticipant) -> Result<(), CollaboratorError>;
    fn is_excluded(&self, epoch_index: u64, address: &str) -> bool;
}

/// Per-epoch "already slashed" markers.
#[cfg_attr(test, mockall::automock)]
pub trait SlashRecords {
    fn already_slashed(&self, epoch_index: u64, address: &str) -> bool;
    fn mark_slashed(&mut self, epoch_index: u64, address: &str) -> Result<(), CollaboratorError>;
}

/// Collateral balances held in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCollateralLedger {
    balances: BTreeMap<String, BigDecimal>,
    /// (address, amount) in the order slashes were applied
    slashes: Vec<(String, BigDecimal)>,
}

impl InMemoryCollateralLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deposit(&mut self, address: &str, amount: BigDecimal) {
        let balance = self.balances.entry(address.to_string()).or_insert_with(BigDecimal::zero);
        *balance = &*balance + &amount;
    }

    pub fn balance(&self, address: &str) -> BigDecimal {
        self.balances.get(address).cloned().unwrap_or_else(BigDecimal::zero)
    }

    pub fn slashes(&self) -> &[(String, BigDecimal)] {
        &self.slashes
    }
}

impl CollateralLedger for InMemoryCollateralLedger {
    fn slash_collateral(&mut self, address: &str, fraction: &BigDecimal) -> Result<(), CollaboratorError> {
        let balance = match self.balances.get_mut(address) {
            Some(balance) => balance,
            None => {
                debug!("No collateral locked for {}, nothing to slash", address);
                return Ok(());
            }
        };

        // Whole units only; the remainder stays locked.
        let amount = (&*balance * fraction).with_scale_round(0, RoundingMode::Down);
        *balance = &*balance - &amount;
        info!("Slashed {} from {} (fraction {})", amount, address, fraction);
        self.slashes.push((address.to_string(), amount));
        Ok(())
    }
}

/// Group name → members.
#[derive(Debug, Clone, Default)]
pub struct InMemoryEpochMembership {
    groups: BTreeMap<String, BTreeSet<String>>,
}

impl InMemoryEpochMembership {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_member(&mut self, group: &str, address: &str) {
        self.groups
            .entry(group.to_string())
            .or_default()
            .insert(address.to_string());
    }

    pub fn is_member(&self, address: &str) -> bool {
        self.groups.values().any(|members| members.contains(address))
    }

    pub fn members(&self, group: &str) -> Vec<String> {
        self.groups
            .get(group)
            .map(|members| members.iter().cloned().collect())
            .unwrap_or_default()
    }
}

impl EpochMembership for InMemoryEpochMembership {
    fn remove_from_groups(&mut self, address: &str, reason: StatusReason) -> Result<(), CollaboratorError> {
        let mut removed = false;
        for (group, members) in self.groups.iter_mut() {
            if members.remove(address) {
                info!("Removed {} from group {} ({})", address, group, reason);
                removed = true;
            }
        }
        if !removed {
            return Err(CollaboratorError::NotAMember(address.to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryExclusionLedger {
    entries: BTreeMap<(u64, String), ExcludedParticipant>,
}

impl InMemoryExclusionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, epoch_index: u64, address: &str) -> Option<&ExcludedParticipant> {
        self.entries.get(&(epoch_index, address.to_string()))
    }

    /// Entries of one epoch, ordered by address.
    pub fn for_epoch(&self, epoch_index: u64) -> Vec<&ExcludedParticipant> {
        self.entries
            .range((epoch_index, String::new())..)
            .take_while(|((epoch, _), _)| *epoch == epoch_index)
            .map(|(_, entry)| entry)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl ExclusionLedger for InMemoryExclusionLedger {
    fn record_exclusion(&mut self, entry: ExcludedParticipant) -> Result<(), CollaboratorError> {
        let key = (entry.epoch_index, entry.address.clone());
        self.entries.insert(key, entry);
        Ok(())
    }

    fn is_excluded(&self, epoch_index: u64, address: &str) -> bool {
        self.entries.contains_key(&(epoch_index, address.to_string()))
    }
}

#[derive(Debug, Clone, Default)]
pub struct InMemorySlashRecords {
    slashed: BTreeSet<(u64, String)>,
}

impl InMemorySlashRecords {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SlashRecords for InMemorySlashRecords {
    fn already_slashed(&self, epoch_index: u64, address: &str) -> bool {
        self.slashed.contains(&(epoch_index, address.to_string()))
    }

    fn mark_slashed(&mut self, epoch_index: u64, address: &str) -> Result<(), CollaboratorError> {
        self.slashed.insert((epoch_index, address.to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> BigDecimal {
        BigDecimal::from_str(s).unwrap()
    }

    fn exclusion(epoch_index: u64, address: &str) -> ExcludedParticipant {
        ExcludedParticipant {
            address: address.to_string(),
            epoch_index,
            reason: StatusReason::ConsecutiveFailures.as_str().to_string(),
            effective_height: 120,
        }
    }

    #[test]
    fn test_slash_rounds_down_to_whole_units() {
        let mut ledger = InMemoryCollateralLedger::new();
        ledger.deposit("gonka1alice", BigDecimal::from(1003));

        ledger.slash_collateral("gonka1alice", &dec("0.2")).unwrap();
        assert_eq!(ledger.balance("gonka1alice"), BigDecimal::from(803));
        assert_eq!(ledger.slashes(), &[("gonka1alice".to_string(), BigDecimal::from(200))]);
    }

    #[test]
    fn test_slash_without_collateral_is_noop() {
        let mut ledger = InMemoryCollateralLedger::new();
        assert!(ledger.slash_collateral("gonka1nobody", &dec("0.2")).is_ok());
        assert!(ledger.slashes().is_empty());
    }

    #[test]
    fn test_exclusion_is_idempotent() {
        let mut ledger = InMemoryExclusionLedger::new();
        ledger.record_exclusion(exclusion(7, "gonka1alice")).unwrap();
        ledger.record_exclusion(exclusion(7, "gonka1alice")).unwrap();
        ledger.record_exclusion(exclusion(8, "gonka1alice")).unwrap();

        assert_eq!(ledger.len(), 2);
        assert!(ledger.is_excluded(7, "gonka1alice"));
        assert!(!ledger.is_excluded(7, "gonka1bob"));
        assert_eq!(ledger.for_epoch(7).len(), 1);
        assert_eq!(ledger.get(8, "gonka1alice"), Some(&exclusion(8, "gonka1alice")));
    }

    #[test]
    fn test_for_epoch_is_ordered_by_address() {
        let mut ledger = InMemoryExclusionLedger::new();
        for address in ["gonka1carol", "gonka1alice", "gonka1bob"] {
            ledger.record_exclusion(exclusion(3, address)).unwrap();
        }
        ledger.record_exclusion(exclusion(4, "gonka1aaron")).unwrap();

        let addresses: Vec<_> = ledger.for_epoch(3).iter().map(|e| e.address.as_str()).collect();
        assert_eq!(addresses, vec!["gonka1alice", "gonka1bob", "gonka1carol"]);
    }

    #[test]
    fn test_membership_removal() {
        let mut membership = InMemoryEpochMembership::new();
        membership.add_member("parent", "gonka1alice");
        membership.add_member("model/qwen", "gonka1alice");
        membership.add_member("parent", "gonka1bob");

        membership
            .remove_from_groups("gonka1alice", StatusReason::Downtime)
            .unwrap();
        assert!(!membership.is_member("gonka1alice"));
        assert_eq!(membership.members("parent"), vec!["gonka1bob".to_string()]);

        assert_eq!(
            membership.remove_from_groups("gonka1alice", StatusReason::Downtime),
            Err(CollaboratorError::NotAMember("gonka1alice".to_string()))
        );
    }

    #[test]
    fn test_slash_records() {
        let mut records = InMemorySlashRecords::new();
        assert!(!records.already_slashed(2, "gonka1alice"));
        records.mark_slashed(2, "gonka1alice").unwrap();
        assert!(records.already_slashed(2, "gonka1alice"));
        assert!(!records.already_slashed(3, "gonka1alice"));
    }
}
