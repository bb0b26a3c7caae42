use log::{debug, info, warn};

use epochsweep_api::prelude::*;
use epochsweep_client::ChainClient;

use crate::metrics;

/// Result of feeding one block height into the tracker.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Observation {
    Unchanged,
    BoundaryCrossed(u64),
    /// The block went backwards; the poll was discarded.
    Regressed { last: u64, observed: u64 },
}

/// Follows block heights and reports each epoch boundary exactly once.
///
/// The next boundary comes from the chain's own "next epoch start" answer when
/// one was supplied through [`EpochTracker::set_next_boundary`], otherwise from
/// tempo alignment (`floor(block / tempo) * tempo + tempo`).
#[derive(Debug)]
pub struct EpochTracker {
    tempo: u64,
    state: Option<EpochState>,
    next_boundary_hint: Option<u64>,
}

impl EpochTracker {
    pub fn new(tempo: u64) -> Self {
        Self {
            tempo: tempo.max(1),
            state: None,
            next_boundary_hint: None,
        }
    }

    pub fn tempo(&self) -> u64 {
        self.tempo
    }

    pub fn state(&self) -> Option<&EpochState> {
        self.state.as_ref()
    }

    pub fn current_epoch(&self) -> Option<u64> {
        self.state.map(|s| s.current_epoch_index)
    }

    /// Block at which the next boundary will be reported.
    pub fn next_boundary(&self) -> Option<u64> {
        let state = self.state?;
        Some(self.next_boundary_hint.unwrap_or_else(|| state.next_epoch_start()))
    }

    /// Record the chain's answer to "when does the next epoch start". Hints at
    /// or before the current epoch start are ignored.
    pub fn set_next_boundary(&mut self, block: u64) {
        if let Some(state) = &self.state {
            if block <= state.epoch_start_block {
                debug!("Ignoring stale epoch boundary hint {block} (epoch started at {})", state.epoch_start_block);
                return;
            }
        }
        self.next_boundary_hint = Some(block);
    }

    pub fn observe(&mut self, block: u64) -> Observation {
        let Some(state) = self.state.as_mut() else {
            let state = EpochState::from_block(block, self.tempo);
            debug!(
                "Tracking epoch {} (start {}, next boundary {})",
                state.current_epoch_index,
                state.epoch_start_block,
                self.next_boundary_hint.unwrap_or_else(|| state.next_epoch_start())
            );
            self.state = Some(state);
            return Observation::Unchanged;
        };

        if block < state.last_observed_block {
            warn!(
                "Block height went backwards ({} -> {block}); discarding poll",
                state.last_observed_block
            );
            return Observation::Regressed {
                last: state.last_observed_block,
                observed: block,
            };
        }
        state.last_observed_block = block;

        let boundary = self
            .next_boundary_hint
            .unwrap_or_else(|| state.next_epoch_start());
        if block < boundary {
            return Observation::Unchanged;
        }

        // Whole epochs that passed beyond the boundary without a poll.
        let missed = (block - boundary) / self.tempo;
        let new_start = boundary + missed * self.tempo;
        // Hinted boundaries need not be tempo-aligned, so indices always
        // advance from the previous one.
        let new_index = state.current_epoch_index + 1 + missed;

        if missed > 0 {
            warn!("Missed {missed} epoch boundary(ies) between polls");
        }

        state.epoch_start_block = new_start;
        state.current_epoch_index = new_index;
        self.next_boundary_hint = None;

        Observation::BoundaryCrossed(new_index)
    }
}

/// Result of one block height poll.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Poll {
    /// The block read failed; retried on the next scheduled poll.
    Failed,
    Regressed,
    Observed { block: u64, epoch_index: u64, crossed: bool },
}

/// Reads the block height from the chain and feeds it to an [`EpochTracker`],
/// asking the chain for the next boundary whenever a new epoch begins.
#[derive(Debug)]
pub struct EpochPoller {
    tracker: EpochTracker,
    netuid: u16,
    boundary_query_supported: bool,
}

impl EpochPoller {
    pub fn new(tempo: u64, netuid: u16) -> Self {
        Self {
            tracker: EpochTracker::new(tempo),
            netuid,
            boundary_query_supported: true,
        }
    }

    pub fn tracker(&self) -> &EpochTracker {
        &self.tracker
    }

    pub async fn poll(&mut self, chain: &dyn ChainClient) -> Poll {
        let block = match chain.get_current_block().await {
            Ok(block) => block,
            Err(e) => {
                warn!("Block height poll failed on {}: {e}", chain.endpoint());
                metrics::inc_poll_failures();
                return Poll::Failed;
            }
        };

        let first = self.tracker.state().is_none();
        let crossed = match self.tracker.observe(block) {
            Observation::Regressed { .. } => return Poll::Regressed,
            Observation::Unchanged => false,
            Observation::BoundaryCrossed(index) => {
                info!("Epoch boundary reached at block {block}: epoch {index}");
                true
            }
        };

        if first || crossed {
            self.refresh_boundary(chain).await;
        }

        let epoch_index = self.tracker.current_epoch().unwrap_or_default();
        metrics::set_block_height(block);
        metrics::set_epoch_index(epoch_index);

        Poll::Observed { block, epoch_index, crossed }
    }

    async fn refresh_boundary(&mut self, chain: &dyn ChainClient) {
        if !self.boundary_query_supported {
            return;
        }
        match chain.get_next_epoch_start(self.netuid).await {
            Ok(Some(block)) => {
                debug!("Next epoch boundary for netuid {} at block {block}", self.netuid);
                self.tracker.set_next_boundary(block);
            }
            Ok(None) => {
                warn!("Chain client cannot report the next epoch start; using tempo-based boundaries");
                self.boundary_query_supported = false;
            }
            Err(e) => {
                warn!("Failed to fetch next epoch start: {e}; using tempo-based boundary");
            }
        }
    }
}

/// Blocks per epoch for `netuid`, falling back to the usual tempo.
pub async fn fetch_tempo(chain: &dyn ChainClient, netuid: u16) -> u64 {
    match chain.get_tempo(netuid).await {
        Ok(tempo) if tempo > 0 => {
            info!("Subnet {netuid} tempo: {tempo} blocks per epoch");
            tempo
        }
        Ok(_) => {
            warn!("Subnet {netuid} reported a zero tempo; assuming {DEFAULT_TEMPO}");
            DEFAULT_TEMPO
        }
        Err(e) => {
            warn!("Failed to fetch tempo for subnet {netuid}: {e}; assuming {DEFAULT_TEMPO}");
            DEFAULT_TEMPO
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    #[test]
    fn scenario_from_block_1000() {
        let mut tracker = EpochTracker::new(360);
        assert_eq!(tracker.observe(1000), Observation::Unchanged);
        assert_eq!(tracker.state().unwrap().epoch_start_block, 720);
        assert_eq!(tracker.next_boundary(), Some(1080));
        assert_eq!(tracker.observe(1050), Observation::Unchanged);
        assert_eq!(tracker.observe(1085), Observation::BoundaryCrossed(3));
        assert_eq!(tracker.observe(1100), Observation::Unchanged);
        assert_eq!(tracker.state().unwrap().epoch_start_block, 1080);
    }

    #[test]
    fn regression_is_discarded() {
        let mut tracker = EpochTracker::new(360);
        tracker.observe(1000);
        assert_eq!(
            tracker.observe(990),
            Observation::Regressed { last: 1000, observed: 990 }
        );
        assert_eq!(tracker.state().unwrap().last_observed_block, 1000);
        assert_eq!(tracker.observe(1080), Observation::BoundaryCrossed(3));
    }

    #[test]
    fn boundary_hint_takes_precedence() {
        let mut tracker = EpochTracker::new(360);
        tracker.observe(1000);
        tracker.set_next_boundary(1043);
        assert_eq!(tracker.observe(1042), Observation::Unchanged);
        assert_eq!(tracker.observe(1043), Observation::BoundaryCrossed(3));
        assert_eq!(tracker.state().unwrap().epoch_start_block, 1043);
        // Without a fresh hint the next boundary is one tempo later.
        assert_eq!(tracker.next_boundary(), Some(1403));
    }

    #[test]
    fn tempo_boundaries_after_a_hint_keep_counting() {
        let mut tracker = EpochTracker::new(360);
        tracker.observe(1000);
        tracker.set_next_boundary(1043);

        let mut reported = Vec::new();
        for block in [1043, 1200, 1403, 1500, 1763, 2000, 2123] {
            if let Observation::BoundaryCrossed(index) = tracker.observe(block) {
                reported.push((block, index));
            }
        }
        assert_eq!(reported, vec![(1043, 3), (1403, 4), (1763, 5), (2123, 6)]);
    }

    #[test]
    fn hint_after_tempo_boundaries_keeps_counting() {
        let mut tracker = EpochTracker::new(360);
        tracker.observe(1000);
        assert_eq!(tracker.observe(1080), Observation::BoundaryCrossed(3));
        tracker.set_next_boundary(1450);
        assert_eq!(tracker.observe(1440), Observation::Unchanged);
        assert_eq!(tracker.observe(1450), Observation::BoundaryCrossed(4));
        assert_eq!(tracker.observe(1810), Observation::BoundaryCrossed(5));
        // missed boundaries are counted from the hinted start
        assert_eq!(tracker.observe(2600), Observation::BoundaryCrossed(7));
        assert_eq!(tracker.state().unwrap().epoch_start_block, 2530);
    }

    #[test]
    fn stale_hint_is_ignored() {
        let mut tracker = EpochTracker::new(360);
        tracker.observe(1000);
        tracker.set_next_boundary(700);
        assert_eq!(tracker.next_boundary(), Some(1080));
    }

    #[test]
    fn jump_reports_latest_epoch() {
        let mut tracker = EpochTracker::new(360);
        tracker.observe(1000);
        assert_eq!(tracker.observe(1900), Observation::BoundaryCrossed(5));
        assert_eq!(tracker.state().unwrap().epoch_start_block, 1800);
    }

    #[test]
    fn one_report_per_distinct_epoch() {
        let mut rng = rand::thread_rng();

        for _ in 0..200 {
            let tempo = rng.gen_range(1..=400);
            let mut block: u64 = rng.gen_range(0..10_000);
            let mut tracker = EpochTracker::new(tempo);

            let mut seen = vec![block / tempo];
            let mut reported = Vec::new();
            tracker.observe(block);

            for _ in 0..rng.gen_range(1..300) {
                block += rng.gen_range(0..=tempo / 2 + 1);
                let epoch = block / tempo;
                if seen.last() != Some(&epoch) {
                    seen.push(epoch);
                }
                if let Observation::BoundaryCrossed(index) = tracker.observe(block) {
                    reported.push(index);
                }
            }

            assert_eq!(reported, seen[1..].to_vec());
        }
    }

    #[test]
    fn small_steps_never_skip_an_epoch() {
        let mut tracker = EpochTracker::new(360);
        let mut reported = Vec::new();
        for block in (0..3_600).step_by(25) {
            if let Observation::BoundaryCrossed(index) = tracker.observe(block) {
                reported.push(index);
            }
        }
        assert_eq!(reported, (1..=9).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn poller_uses_the_chain_boundary() {
        use epochsweep_client::mock::MockChain;

        let chain = MockChain::new(1_000, 360);
        chain.set_next_epoch_start(Some(1_043));
        let mut poller = EpochPoller::new(360, 35);

        assert_eq!(
            poller.poll(&chain).await,
            Poll::Observed { block: 1_000, epoch_index: 2, crossed: false }
        );
        assert_eq!(poller.tracker().next_boundary(), Some(1_043));

        chain.set_block(1_043);
        chain.set_next_epoch_start(Some(1_404));
        assert_eq!(
            poller.poll(&chain).await,
            Poll::Observed { block: 1_043, epoch_index: 3, crossed: true }
        );
        assert_eq!(poller.tracker().next_boundary(), Some(1_404));
    }

    #[tokio::test]
    async fn poller_falls_back_to_tempo_after_a_hint() {
        use epochsweep_client::mock::MockChain;

        let chain = MockChain::new(1_000, 360);
        chain.set_next_epoch_start(Some(1_043));
        let mut poller = EpochPoller::new(360, 35);
        poller.poll(&chain).await;

        chain.set_block(1_043);
        chain.set_next_epoch_start(None);
        assert_eq!(
            poller.poll(&chain).await,
            Poll::Observed { block: 1_043, epoch_index: 3, crossed: true }
        );
        assert_eq!(poller.tracker().next_boundary(), Some(1_403));

        chain.set_block(1_403);
        assert_eq!(
            poller.poll(&chain).await,
            Poll::Observed { block: 1_403, epoch_index: 4, crossed: true }
        );
    }

    #[tokio::test]
    async fn boundary_query_error_after_a_hint() {
        use epochsweep_client::mock::MockChain;

        let chain = MockChain::new(1_000, 360);
        chain.set_next_epoch_start(Some(1_043));
        let mut poller = EpochPoller::new(360, 35);
        poller.poll(&chain).await;

        chain.set_block(1_043);
        chain.fail_boundary_reads(1);
        assert_eq!(
            poller.poll(&chain).await,
            Poll::Observed { block: 1_043, epoch_index: 3, crossed: true }
        );
        assert_eq!(poller.tracker().next_boundary(), Some(1_403));

        // the query stays enabled after a transient error
        chain.set_block(1_403);
        chain.set_next_epoch_start(Some(1_770));
        assert_eq!(
            poller.poll(&chain).await,
            Poll::Observed { block: 1_403, epoch_index: 4, crossed: true }
        );
        assert_eq!(poller.tracker().next_boundary(), Some(1_770));

        chain.set_block(1_770);
        assert_eq!(
            poller.poll(&chain).await,
            Poll::Observed { block: 1_770, epoch_index: 5, crossed: true }
        );
    }

    #[tokio::test]
    async fn poller_survives_failed_reads() {
        use epochsweep_client::mock::MockChain;

        let chain = MockChain::new(1_000, 360);
        chain.fail_block_reads(2);
        let mut poller = EpochPoller::new(360, 35);

        assert_eq!(poller.poll(&chain).await, Poll::Failed);
        assert_eq!(poller.poll(&chain).await, Poll::Failed);
        assert!(poller.tracker().state().is_none());
        assert!(matches!(poller.poll(&chain).await, Poll::Observed { block: 1_000, .. }));
    }

    #[tokio::test]
    async fn zero_tempo_falls_back() {
        use epochsweep_client::mock::MockChain;

        let chain = MockChain::new(1_000, 0);
        assert_eq!(fetch_tempo(&chain, 35).await, DEFAULT_TEMPO);
    }
}
