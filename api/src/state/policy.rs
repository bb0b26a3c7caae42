use serde::{Deserialize, Serialize};

/// Minimum-interval policy for one action kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntervalPolicy {
    pub min_blocks_between_actions: u64,
    pub last_action_block: Option<u64>,
}

impl IntervalPolicy {
    pub const fn new(min_blocks_between_actions: u64) -> Self {
        Self {
            min_blocks_between_actions,
            last_action_block: None,
        }
    }

    /// Whether an action at `current_block` is allowed. A block below the last
    /// reservation is never allowed.
    pub fn permits(&self, current_block: u64) -> bool {
        match self.last_action_block {
            None => true,
            Some(last) => {
                current_block >= last
                    && current_block - last >= self.min_blocks_between_actions
            }
        }
    }

    /// First block at which the next action is allowed.
    pub fn next_eligible_block(&self) -> Option<u64> {
        self.last_action_block
            .map(|last| last.saturating_add(self.min_blocks_between_actions))
    }

    pub fn record(&mut self, block: u64) {
        self.last_action_block = Some(block);
    }
}
