use std::collections::{HashMap, HashSet};

use epochsweep_api::prelude::*;

/// A claimed slot. Handed to the executor and never returned to the gate.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Reservation {
    pub kind: ActionKind,
    pub epoch_index: u64,
    pub block: u64,
    pub initial: bool,
}

/// Decides whether an action may run and claims the slot when it may.
///
/// Weight submissions are interval based. Stake movements are keyed on the
/// epoch index, with one extra initial claim per kind outside the cadence.
/// Claims are never rolled back.
#[derive(Debug)]
pub struct ActionGate {
    weights: IntervalPolicy,
    claimed_epochs: HashMap<ActionKind, u64>,
    initial_claimed: HashSet<ActionKind>,
}

impl ActionGate {
    pub fn new(min_blocks_between_weight_sets: u64) -> Self {
        Self {
            weights: IntervalPolicy::new(min_blocks_between_weight_sets),
            claimed_epochs: HashMap::new(),
            initial_claimed: HashSet::new(),
        }
    }

    pub fn weights_policy(&self) -> &IntervalPolicy {
        &self.weights
    }

    pub fn last_claimed_epoch(&self, kind: ActionKind) -> Option<u64> {
        self.claimed_epochs.get(&kind).copied()
    }

    /// Pure check; claims nothing.
    pub fn is_eligible(&self, kind: ActionKind, epoch_index: u64, current_block: u64) -> bool {
        match kind {
            ActionKind::SetWeights => self.weights.permits(current_block),
            ActionKind::MoveStake | ActionKind::TransferStake => self
                .last_claimed_epoch(kind)
                .map_or(true, |claimed| epoch_index > claimed),
        }
    }

    /// Claim the slot for `kind`, failing if it is already taken.
    pub fn reserve(
        &mut self,
        kind: ActionKind,
        epoch_index: u64,
        current_block: u64,
    ) -> Result<Reservation, GateError> {
        if !self.is_eligible(kind, epoch_index, current_block) {
            let key = match kind {
                ActionKind::SetWeights => self.weights.last_action_block.unwrap_or(current_block),
                _ => epoch_index,
            };
            return Err(GateError::DoubleReservation { kind, key });
        }

        match kind {
            ActionKind::SetWeights => self.weights.record(current_block),
            _ => {
                self.claimed_epochs.insert(kind, epoch_index);
            }
        }

        Ok(Reservation {
            kind,
            epoch_index,
            block: current_block,
            initial: false,
        })
    }

    /// Check and claim in one step.
    pub fn should_act(&mut self, kind: ActionKind, epoch_index: u64, current_block: u64) -> bool {
        self.reserve(kind, epoch_index, current_block).is_ok()
    }

    pub fn initial_eligible(&self, kind: ActionKind) -> bool {
        !self.initial_claimed.contains(&kind)
    }

    /// Claim the one-time out-of-cadence slot for `kind`. Does not touch the
    /// per-epoch claims.
    pub fn reserve_initial(
        &mut self,
        kind: ActionKind,
        epoch_index: u64,
        current_block: u64,
    ) -> Result<Reservation, GateError> {
        if !self.initial_claimed.insert(kind) {
            return Err(GateError::InitialAlreadyClaimed(kind));
        }
        Ok(Reservation {
            kind,
            epoch_index,
            block: current_block,
            initial: true,
        })
    }
}
