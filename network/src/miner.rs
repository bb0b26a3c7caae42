use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};

use epochsweep_client::{short_address, ChainClient, Notifier, StakeAccount};

use crate::epoch::{EpochPoller, Poll};
use crate::executor::{ActionExecutor, ActionParams, ExecutorConfig};
use crate::gate::ActionGate;
use crate::pipeline::{run_action, Cycle, Slot};
use crate::report::{Reporter, SummarySchedule};
use crate::utils::Shutdown;

#[derive(Clone, Debug)]
pub struct MinerConfig {
    pub coldkey: String,
    /// Hotkey that earns the stake being swept.
    pub hotkey: String,
    pub aggregator_hotkey: String,
    pub destination_coldkey: String,
    pub netuid: u16,
    pub skip_initial_transfer: bool,
    pub poll_interval: Duration,
    /// Period of the activity summary notification; `None` disables it.
    pub summary_interval: Option<Duration>,
}

impl MinerConfig {
    fn sweep(&self) -> ActionParams {
        ActionParams::MoveStake {
            account: StakeAccount::new(&self.coldkey, &self.hotkey, self.netuid),
            to_hotkey: self.aggregator_hotkey.clone(),
        }
    }

    fn transfer(&self) -> ActionParams {
        ActionParams::TransferStake {
            account: StakeAccount::new(&self.coldkey, &self.aggregator_hotkey, self.netuid),
            to_coldkey: self.destination_coldkey.clone(),
        }
    }
}

/// Outcome of a single miner iteration.
#[derive(Clone, Debug, PartialEq)]
pub enum MinerTick {
    PollFailed,
    Regressed,
    /// Still inside the epoch the process started in.
    AwaitingBoundary { block: u64 },
    Cycles { block: u64, sweep: Cycle, transfer: Cycle },
}

/// Sweeps the earning hotkey into the aggregator and forwards the aggregate
/// to the destination coldkey, once per epoch each.
pub struct Miner {
    chain: Arc<dyn ChainClient>,
    config: MinerConfig,
    poller: EpochPoller,
    gate: ActionGate,
    executor: ActionExecutor,
    reporter: Reporter,
    summary: SummarySchedule,
    shutdown: Shutdown,
    /// Epoch the process started in; cadence actions begin after it.
    start_epoch: Option<u64>,
}

impl Miner {
    pub fn new(
        chain: Arc<dyn ChainClient>,
        notifier: Arc<dyn Notifier>,
        config: MinerConfig,
        executor_config: ExecutorConfig,
        tempo: u64,
        shutdown: Shutdown,
    ) -> Self {
        Self {
            executor: ActionExecutor::new(chain.clone(), executor_config, shutdown.clone()),
            reporter: Reporter::new(notifier, &config.hotkey, config.netuid),
            summary: SummarySchedule::new(config.summary_interval),
            poller: EpochPoller::new(tempo, config.netuid),
            gate: ActionGate::new(0),
            chain,
            config,
            shutdown,
            start_epoch: None,
        }
    }

    pub fn gate(&self) -> &ActionGate {
        &self.gate
    }

    pub fn reporter(&self) -> &Reporter {
        &self.reporter
    }

    pub async fn run(mut self) -> anyhow::Result<()> {
        info!(
            "Miner started: {} -> {} -> {} on netuid {}",
            short_address(&self.config.hotkey),
            short_address(&self.config.aggregator_hotkey),
            short_address(&self.config.destination_coldkey),
            self.config.netuid
        );
        self.log_snapshot().await;
        self.reporter
            .startup(format!(
                "Miner started on netuid {}; forwarding to {}",
                self.config.netuid,
                short_address(&self.config.destination_coldkey)
            ))
            .await;

        // The initial pass needs one good block read.
        while !self.shutdown.is_triggered() {
            if self.initial_pass().await.is_some() {
                break;
            }
            if !self.shutdown.sleep(self.config.poll_interval).await {
                break;
            }
        }

        while !self.shutdown.is_triggered() {
            if !self.shutdown.sleep(self.config.poll_interval).await {
                break;
            }
            let tick = self.tick().await;
            debug!("Miner tick: {tick:?}");
            if self.summary.due() {
                self.reporter.periodic_summary("Miner").await;
            }
        }

        let summary = self.reporter.history().summary();
        info!("Miner stopping: {summary}");
        self.reporter.shutdown("Miner stopping").await;
        Ok(())
    }

    /// Startup sweep plus, unless skipped, the initial forward transfer.
    /// Returns `None` when the block height could not be read.
    pub async fn initial_pass(&mut self) -> Option<(Cycle, Option<Cycle>)> {
        let (block, epoch_index) = match self.poller.poll(self.chain.as_ref()).await {
            Poll::Observed { block, epoch_index, .. } => (block, epoch_index),
            _ => return None,
        };
        self.start_epoch = Some(epoch_index);

        let sweep = self.act(self.config.sweep(), Slot::Initial, epoch_index, block).await;
        let transfer = if self.config.skip_initial_transfer {
            info!("Skipping initial transfer");
            None
        } else {
            Some(self.act(self.config.transfer(), Slot::Initial, epoch_index, block).await)
        };
        Some((sweep, transfer))
    }

    /// One poll → gate → execute → report pass for both stake actions.
    pub async fn tick(&mut self) -> MinerTick {
        let (block, epoch_index) = match self.poller.poll(self.chain.as_ref()).await {
            Poll::Failed => return MinerTick::PollFailed,
            Poll::Regressed => return MinerTick::Regressed,
            Poll::Observed { block, epoch_index, .. } => (block, epoch_index),
        };

        let start_epoch = *self.start_epoch.get_or_insert(epoch_index);
        if epoch_index <= start_epoch {
            return MinerTick::AwaitingBoundary { block };
        }

        let sweep = self.act(self.config.sweep(), Slot::Cadence, epoch_index, block).await;
        let transfer = self.act(self.config.transfer(), Slot::Cadence, epoch_index, block).await;
        MinerTick::Cycles { block, sweep, transfer }
    }

    async fn act(&mut self, params: ActionParams, slot: Slot, epoch_index: u64, block: u64) -> Cycle {
        run_action(
            &mut self.gate,
            &self.executor,
            &mut self.reporter,
            &params,
            slot,
            epoch_index,
            block,
        )
        .await
    }

    async fn log_snapshot(&self) {
        for hotkey in [&self.config.hotkey, &self.config.aggregator_hotkey] {
            let account = StakeAccount::new(&self.config.coldkey, hotkey.as_str(), self.config.netuid);
            match self.chain.get_balance(&account).await {
                Ok(balance) => info!(
                    "Stake snapshot: {} (netuid {}) = {balance}",
                    short_address(hotkey),
                    self.config.netuid
                ),
                Err(e) => warn!("Stake snapshot for {} failed: {e}", short_address(hotkey)),
            }
        }
    }
}
