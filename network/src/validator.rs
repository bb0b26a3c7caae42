use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use epochsweep_client::{short_address, ChainClient, Notifier, WeightMap};

use crate::epoch::{EpochPoller, Poll};
use crate::executor::{ActionExecutor, ActionParams, ExecutorConfig};
use crate::gate::ActionGate;
use crate::pipeline::{run_action, Cycle, Slot};
use crate::report::{Reporter, SummarySchedule};
use crate::utils::Shutdown;

/// Where the validator points its weight.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TargetSelection {
    Fixed(u16),
    /// The uid registered by the subnet owner's hotkey.
    SubnetOwner,
}

#[derive(Clone, Debug)]
pub struct ValidatorConfig {
    pub hotkey: String,
    pub netuid: u16,
    pub target: TargetSelection,
    pub set_weights_interval: u64,
    pub poll_interval: Duration,
    pub target_refresh: Duration,
    /// Period of the activity summary notification; `None` disables it.
    pub summary_interval: Option<Duration>,
}

/// Outcome of a single validator iteration.
#[derive(Clone, Debug, PartialEq)]
pub enum ValidatorTick {
    PollFailed,
    Regressed,
    /// No target uid could be resolved yet.
    NoTarget,
    Cycle { block: u64, cycle: Cycle },
}

/// Sets weight 1.0 on the target uid every `set_weights_interval` blocks.
pub struct Validator {
    chain: Arc<dyn ChainClient>,
    config: ValidatorConfig,
    poller: EpochPoller,
    gate: ActionGate,
    executor: ActionExecutor,
    reporter: Reporter,
    summary: SummarySchedule,
    shutdown: Shutdown,
    target_uid: Option<u16>,
    version_key: u64,
    last_refresh: Option<Instant>,
}

impl Validator {
    pub fn new(
        chain: Arc<dyn ChainClient>,
        notifier: Arc<dyn Notifier>,
        config: ValidatorConfig,
        executor_config: ExecutorConfig,
        tempo: u64,
        shutdown: Shutdown,
    ) -> Self {
        let target_uid = match config.target {
            TargetSelection::Fixed(uid) => Some(uid),
            TargetSelection::SubnetOwner => None,
        };

        Self {
            executor: ActionExecutor::new(chain.clone(), executor_config, shutdown.clone()),
            reporter: Reporter::new(notifier, &config.hotkey, config.netuid),
            summary: SummarySchedule::new(config.summary_interval),
            poller: EpochPoller::new(tempo, config.netuid),
            gate: ActionGate::new(config.set_weights_interval),
            chain,
            config,
            shutdown,
            target_uid,
            version_key: 0,
            last_refresh: None,
        }
    }

    pub fn target_uid(&self) -> Option<u16> {
        self.target_uid
    }

    pub fn version_key(&self) -> u64 {
        self.version_key
    }

    pub fn gate(&self) -> &ActionGate {
        &self.gate
    }

    pub fn reporter(&self) -> &Reporter {
        &self.reporter
    }

    pub async fn run(mut self) -> anyhow::Result<()> {
        let target = match self.config.target {
            TargetSelection::Fixed(uid) => format!("uid {uid}"),
            TargetSelection::SubnetOwner => "subnet owner".to_string(),
        };
        info!(
            "Validator started: hotkey {}, netuid {}, target {target}, interval {} blocks",
            short_address(&self.config.hotkey),
            self.config.netuid,
            self.config.set_weights_interval
        );
        self.reporter
            .startup(format!(
                "Validator started on netuid {} targeting {target}",
                self.config.netuid
            ))
            .await;

        while !self.shutdown.is_triggered() {
            let tick = self.tick().await;
            debug!("Validator tick: {tick:?}");
            if self.summary.due() {
                self.reporter.periodic_summary("Validator").await;
            }

            if !self.shutdown.sleep(self.config.poll_interval).await {
                break;
            }
        }

        let summary = self.reporter.history().summary();
        info!("Validator stopping: {summary}");
        self.reporter.shutdown("Validator stopping").await;
        Ok(())
    }

    /// One poll → gate → execute → report pass.
    pub async fn tick(&mut self) -> ValidatorTick {
        let (block, epoch_index) = match self.poller.poll(self.chain.as_ref()).await {
            Poll::Failed => return ValidatorTick::PollFailed,
            Poll::Regressed => return ValidatorTick::Regressed,
            Poll::Observed { block, epoch_index, .. } => (block, epoch_index),
        };

        if self.refresh_due() {
            self.refresh_target().await;
        }

        let Some(target_uid) = self.target_uid else {
            warn!("No weight target resolved yet; skipping cycle");
            return ValidatorTick::NoTarget;
        };

        let params = ActionParams::SetWeights {
            hotkey: self.config.hotkey.clone(),
            netuid: self.config.netuid,
            weights: WeightMap::from([(target_uid, 1.0)]),
            version_key: self.version_key,
        };

        let cycle = run_action(
            &mut self.gate,
            &self.executor,
            &mut self.reporter,
            &params,
            Slot::Cadence,
            epoch_index,
            block,
        )
        .await;

        if let Cycle::NotEligible = cycle {
            if let Some(next) = self.gate.weights_policy().next_eligible_block() {
                debug!("Next weight submission eligible at block {next}");
            }
        }

        ValidatorTick::Cycle { block, cycle }
    }

    fn refresh_due(&self) -> bool {
        self.last_refresh
            .map_or(true, |at| at.elapsed() >= self.config.target_refresh)
    }

    /// Re-resolve the target uid (when auto) and the weights version key.
    /// Failures keep the previous values and retry on the next poll.
    async fn refresh_target(&mut self) {
        let netuid = self.config.netuid;

        if self.config.target == TargetSelection::SubnetOwner {
            let owner = match self.chain.get_subnet_owner_hotkey(netuid).await {
                Ok(owner) => owner,
                Err(e) => {
                    warn!("Failed to fetch subnet owner hotkey: {e}");
                    return;
                }
            };
            match self.chain.get_uid_for_hotkey(&owner, netuid).await {
                Ok(Some(uid)) => {
                    if self.target_uid != Some(uid) {
                        self.reporter.target_changed(self.target_uid, uid, &owner).await;
                        self.target_uid = Some(uid);
                    }
                }
                Ok(None) => {
                    warn!("Subnet owner {} is not registered on netuid {netuid}", short_address(&owner));
                    return;
                }
                Err(e) => {
                    warn!("Failed to resolve uid of subnet owner: {e}");
                    return;
                }
            }
        }

        match self.chain.get_weights_version_key(netuid).await {
            Ok(version_key) => {
                if version_key != self.version_key {
                    debug!("Weights version key for netuid {netuid}: {version_key}");
                }
                self.version_key = version_key;
            }
            Err(e) => {
                warn!("Failed to fetch weights version key: {e}");
                return;
            }
        }

        self.last_refresh = Some(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use epochsweep_api::prelude::*;
    use crate::retry::RetryPolicy;
    use epochsweep_client::mock::{MockCall, MockChain, RecordingNotifier};
    use epochsweep_client::EventKind;

    const HOTKEY: &str = "5ValidatorValidatorValidatorValidatorValidatorVa";
    const OWNER: &str = "5OwnerOwnerOwnerOwnerOwnerOwnerOwnerOwnerOwnerOw";

    fn validator(chain: &Arc<MockChain>, notifier: &RecordingNotifier, target: TargetSelection) -> Validator {
        let config = ValidatorConfig {
            hotkey: HOTKEY.to_string(),
            netuid: 35,
            target,
            set_weights_interval: 720,
            poll_interval: Duration::from_secs(30),
            target_refresh: Duration::from_secs(6 * 3600),
            summary_interval: None,
        };
        let executor_config = ExecutorConfig {
            durability: Durability::Inclusion,
            confirmation_timeout: Duration::from_secs(5),
            retry: RetryPolicy::immediate(3),
        };
        Validator::new(
            chain.clone(),
            Arc::new(notifier.clone()),
            config,
            executor_config,
            360,
            Shutdown::never(),
        )
    }

    #[tokio::test]
    async fn sets_full_weight_on_fixed_target() {
        let chain = Arc::new(MockChain::new(5_000, 360));
        chain.register(HOTKEY);
        chain.grant_permit(HOTKEY);
        chain.set_version_key(4_020);
        let mut validator = validator(&chain, &RecordingNotifier::new(), TargetSelection::Fixed(69));

        let tick = validator.tick().await;
        assert!(matches!(tick, ValidatorTick::Cycle { cycle: Cycle::Executed(_), .. }));

        let calls = chain.calls();
        let MockCall::SetWeights { weights, version_key, .. } = &calls[0] else {
            panic!("expected a weight submission");
        };
        assert_eq!(weights, &WeightMap::from([(69, 1.0)]));
        assert_eq!(*version_key, 4_020);
    }

    #[tokio::test]
    async fn resolves_owner_target_and_notices_changes() {
        let chain = Arc::new(MockChain::new(5_000, 360));
        chain.register(HOTKEY);
        chain.grant_permit(HOTKEY);
        chain.set_subnet_owner(OWNER, 12);
        let notifier = RecordingNotifier::new();
        let mut validator = validator(&chain, &notifier, TargetSelection::SubnetOwner);

        validator.tick().await;
        assert_eq!(validator.target_uid(), Some(12));
        assert_eq!(notifier.count_of(EventKind::TargetChanged), 0);

        chain.set_subnet_owner(OWNER, 13);
        validator.last_refresh = None;
        validator.tick().await;
        assert_eq!(validator.target_uid(), Some(13));
        assert_eq!(notifier.count_of(EventKind::TargetChanged), 1);
    }

    #[tokio::test]
    async fn unresolved_target_skips_the_cycle() {
        let chain = Arc::new(MockChain::new(5_000, 360));
        let mut validator = validator(&chain, &RecordingNotifier::new(), TargetSelection::SubnetOwner);
        assert_eq!(validator.tick().await, ValidatorTick::NoTarget);
        assert!(chain.calls().is_empty());
    }

    #[tokio::test]
    async fn interval_gates_resubmission() {
        let chain = Arc::new(MockChain::new(5_000, 360));
        chain.register(HOTKEY);
        chain.grant_permit(HOTKEY);
        let mut validator = validator(&chain, &RecordingNotifier::new(), TargetSelection::Fixed(69));

        validator.tick().await;
        chain.set_block(5_719);
        assert!(matches!(
            validator.tick().await,
            ValidatorTick::Cycle { cycle: Cycle::NotEligible, .. }
        ));
        chain.set_block(5_720);
        validator.tick().await;
        assert_eq!(chain.calls_of(ActionKind::SetWeights), 2);
    }

    #[tokio::test]
    async fn lost_permit_is_skipped_without_reservation() {
        let chain = Arc::new(MockChain::new(5_000, 360));
        chain.register(HOTKEY);
        let mut validator = validator(&chain, &RecordingNotifier::new(), TargetSelection::Fixed(69));

        let tick = validator.tick().await;
        assert!(matches!(
            tick,
            ValidatorTick::Cycle { cycle: Cycle::Skipped(ActionError::NoPermit(_)), .. }
        ));
        assert_eq!(validator.gate().weights_policy().last_action_block, None);
    }
}
