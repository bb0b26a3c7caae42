use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::balance::Balance;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    SetWeights,
    MoveStake,
    TransferStake,
}

impl ActionKind {
    pub const ALL: [ActionKind; 3] = [
        ActionKind::SetWeights,
        ActionKind::MoveStake,
        ActionKind::TransferStake,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::SetWeights => "set_weights",
            ActionKind::MoveStake => "move_stake",
            ActionKind::TransferStake => "transfer_stake",
        }
    }

    /// Whether the action moves value and therefore carries an amount.
    pub fn moves_stake(&self) -> bool {
        matches!(self, ActionKind::MoveStake | ActionKind::TransferStake)
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionOutcome {
    Pending,
    Included,
    Finalized,
    Failed,
}

impl ActionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ActionOutcome::Included | ActionOutcome::Finalized)
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, ActionOutcome::Pending)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionOutcome::Pending => "pending",
            ActionOutcome::Included => "included",
            ActionOutcome::Finalized => "finalized",
            ActionOutcome::Failed => "failed",
        }
    }
}

impl fmt::Display for ActionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How long a submission waits before it counts as confirmed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Durability {
    /// Included in a block (faster)
    #[default]
    Inclusion,
    /// Finalized by the chain (slower, stronger)
    Finalization,
}

impl Durability {
    /// Outcome recorded once a submission reaches this level.
    pub fn outcome(&self) -> ActionOutcome {
        match self {
            Durability::Inclusion => ActionOutcome::Included,
            Durability::Finalization => ActionOutcome::Finalized,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Durability::Inclusion => "inclusion",
            Durability::Finalization => "finalization",
        }
    }
}

impl fmt::Display for Durability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One attempted action in one slot. Process-local; never persisted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActionRecord {
    pub kind: ActionKind,
    pub attempted_at_block: u64,
    pub epoch_index: u64,
    pub outcome: ActionOutcome,
    /// Amount moved, for stake actions
    pub amount: Option<Balance>,
    pub retry_count: u32,
    pub confirmed_at_block: Option<u64>,
    pub created_at: DateTime<Utc>,
}

impl ActionRecord {
    pub fn pending(kind: ActionKind, attempted_at_block: u64, epoch_index: u64) -> Self {
        Self {
            kind,
            attempted_at_block,
            epoch_index,
            outcome: ActionOutcome::Pending,
            amount: None,
            retry_count: 0,
            confirmed_at_block: None,
            created_at: Utc::now(),
        }
    }

    pub fn confirm(&mut self, outcome: ActionOutcome, block: Option<u64>) {
        self.outcome = outcome;
        self.confirmed_at_block = block;
    }

    pub fn fail(&mut self) {
        self.outcome = ActionOutcome::Failed;
    }
}
