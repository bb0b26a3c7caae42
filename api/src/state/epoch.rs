use serde::{Deserialize, Serialize};

/// First block of the epoch containing `block`, assuming epochs aligned to `tempo`.
#[inline]
pub const fn epoch_start_for(block: u64, tempo: u64) -> u64 {
    if tempo == 0 {
        return block;
    }
    (block / tempo) * tempo
}

/// Index of the epoch that starts at or before `block`.
#[inline]
pub const fn epoch_index_for(block: u64, tempo: u64) -> u64 {
    if tempo == 0 {
        return 0;
    }
    block / tempo
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpochState {
    pub current_epoch_index: u64,
    pub epoch_start_block: u64,
    /// Blocks per epoch
    pub tempo: u64,
    pub last_observed_block: u64,
}

impl EpochState {
    /// Tempo-aligned state for a first observation of `block`.
    pub fn from_block(block: u64, tempo: u64) -> Self {
        let epoch_start_block = epoch_start_for(block, tempo);
        Self {
            current_epoch_index: epoch_index_for(epoch_start_block, tempo),
            epoch_start_block,
            tempo,
            last_observed_block: block,
        }
    }

    #[inline]
    pub fn next_epoch_start(&self) -> u64 {
        self.epoch_start_block.saturating_add(self.tempo)
    }

    #[inline]
    pub fn blocks_until_next_epoch(&self) -> u64 {
        self.next_epoch_start().saturating_sub(self.last_observed_block)
    }
}
