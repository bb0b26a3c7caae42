use std::fmt;

use epochsweep_api::prelude::*;

/// Every action record produced during this process's lifetime.
#[derive(Debug, Default)]
pub struct ActionHistory {
    records: Vec<ActionRecord>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HistorySummary {
    pub attempts: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub pending: usize,
    pub moved: Balance,
}

impl ActionHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: ActionRecord) {
        self.records.push(record);
    }

    pub fn records(&self) -> &[ActionRecord] {
        &self.records
    }

    pub fn last(&self, kind: ActionKind) -> Option<&ActionRecord> {
        self.records.iter().rev().find(|r| r.kind == kind)
    }

    pub fn for_epoch(&self, kind: ActionKind, epoch_index: u64) -> impl Iterator<Item = &ActionRecord> {
        self.records
            .iter()
            .filter(move |r| r.kind == kind && r.epoch_index == epoch_index)
    }

    pub fn summary(&self) -> HistorySummary {
        self.summary_since(0)
    }

    pub fn succeeded_since(&self, start: usize, kind: ActionKind) -> usize {
        let start = start.min(self.records.len());
        self.records[start..]
            .iter()
            .filter(|r| r.kind == kind && r.outcome.is_success())
            .count()
    }

    /// Summary of the records pushed at or after position `start`.
    pub fn summary_since(&self, start: usize) -> HistorySummary {
        let start = start.min(self.records.len());
        self.records[start..].iter().fold(HistorySummary::default(), |mut acc, r| {
            acc.attempts += 1;
            match r.outcome {
                ActionOutcome::Included | ActionOutcome::Finalized => {
                    acc.succeeded += 1;
                    if r.kind.moves_stake() {
                        acc.moved = acc.moved.saturating_add(r.amount.unwrap_or_default());
                    }
                }
                ActionOutcome::Failed => acc.failed += 1,
                ActionOutcome::Pending => acc.pending += 1,
            }
            acc
        })
    }
}

impl HistorySummary {
    /// Share of finished attempts that succeeded, in percent.
    pub fn success_rate(&self) -> Option<f64> {
        let finished = self.succeeded + self.failed;
        if finished == 0 {
            return None;
        }
        Some(self.succeeded as f64 * 100.0 / finished as f64)
    }
}

impl fmt::Display for HistorySummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} attempts, {} succeeded, {} failed, {} pending, {} moved",
            self.attempts, self.succeeded, self.failed, self.pending, self.moved
        )
    }
}
