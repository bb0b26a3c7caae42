use log::error;

use epochsweep_api::prelude::*;

use crate::executor::{ActionExecutor, ActionParams, Execution};
use crate::gate::ActionGate;
use crate::report::Reporter;

/// Which slot an action is drawn from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Slot {
    /// The regular interval or per-epoch slot.
    Cadence,
    /// The one-time slot taken at startup.
    Initial,
}

/// What one gate → pre-check → execute → report pass did.
#[derive(Clone, Debug, PartialEq)]
pub enum Cycle {
    /// The slot is already taken or the interval has not elapsed.
    NotEligible,
    /// The pre-check declined; no slot was consumed.
    Skipped(ActionError),
    Executed(Execution),
    /// Reservation failed after a passing eligibility check.
    GateRejected(GateError),
}

impl Cycle {
    pub fn executed(&self) -> Option<&Execution> {
        match self {
            Cycle::Executed(execution) => Some(execution),
            _ => None,
        }
    }
}

/// Run one action through the gate. Pre-checks run before the slot is
/// reserved, so a failed pre-check leaves the slot free for a later poll.
pub async fn run_action(
    gate: &mut ActionGate,
    executor: &ActionExecutor,
    reporter: &mut Reporter,
    params: &ActionParams,
    slot: Slot,
    epoch_index: u64,
    current_block: u64,
) -> Cycle {
    let kind = params.kind();

    let eligible = match slot {
        Slot::Cadence => gate.is_eligible(kind, epoch_index, current_block),
        Slot::Initial => gate.initial_eligible(kind),
    };
    if !eligible {
        return Cycle::NotEligible;
    }

    let precheck = match executor.precheck(params).await {
        Ok(precheck) => precheck,
        Err(reason) => {
            reporter.skipped(kind, epoch_index, &reason).await;
            return Cycle::Skipped(reason);
        }
    };

    let reservation = match slot {
        Slot::Cadence => gate.reserve(kind, epoch_index, current_block),
        Slot::Initial => gate.reserve_initial(kind, epoch_index, current_block),
    };
    let reservation = match reservation {
        Ok(reservation) => reservation,
        Err(e) => {
            error!("{kind}: {e}; aborting cycle");
            return Cycle::GateRejected(e);
        }
    };

    let execution = executor.execute(&reservation, params, precheck).await;
    reporter.executed(&execution).await;
    Cycle::Executed(execution)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::executor::ExecutorConfig;
    use crate::retry::RetryPolicy;
    use crate::utils::Shutdown;
    use epochsweep_client::mock::{MockChain, RecordingNotifier};
    use epochsweep_client::{StakeAccount, WeightMap};

    const HOTKEY: &str = "5HotkeyHotkeyHotkeyHotkeyHotkeyHotkeyHotkeyHotk";

    struct Harness {
        chain: Arc<MockChain>,
        gate: ActionGate,
        executor: ActionExecutor,
        reporter: Reporter,
    }

    fn harness() -> Harness {
        let chain = Arc::new(MockChain::new(5_000, 360));
        let config = ExecutorConfig {
            durability: Durability::Inclusion,
            confirmation_timeout: Duration::from_secs(5),
            retry: RetryPolicy::immediate(3),
        };
        Harness {
            executor: ActionExecutor::new(chain.clone(), config, Shutdown::never()),
            reporter: Reporter::new(Arc::new(RecordingNotifier::new()), HOTKEY, 35),
            gate: ActionGate::new(720),
            chain,
        }
    }

    fn weights() -> ActionParams {
        ActionParams::SetWeights {
            hotkey: HOTKEY.to_string(),
            netuid: 35,
            weights: WeightMap::from([(69, 1.0)]),
            version_key: 0,
        }
    }

    #[tokio::test]
    async fn unregistered_does_not_touch_the_interval() {
        let mut h = harness();
        let cycle = run_action(&mut h.gate, &h.executor, &mut h.reporter, &weights(), Slot::Cadence, 13, 5_000).await;

        assert!(matches!(cycle, Cycle::Skipped(ActionError::NotRegistered(_))));
        assert_eq!(h.gate.weights_policy().last_action_block, None);
        assert_eq!(h.chain.calls_of(ActionKind::SetWeights), 0);
    }

    #[tokio::test]
    async fn permitted_weight_set_reserves_the_interval() {
        let mut h = harness();
        h.chain.register(HOTKEY);
        h.chain.grant_permit(HOTKEY);

        let cycle = run_action(&mut h.gate, &h.executor, &mut h.reporter, &weights(), Slot::Cadence, 13, 5_000).await;
        assert!(cycle.executed().unwrap().succeeded());
        assert_eq!(h.gate.weights_policy().last_action_block, Some(5_000));

        let again = run_action(&mut h.gate, &h.executor, &mut h.reporter, &weights(), Slot::Cadence, 13, 5_719).await;
        assert_eq!(again, Cycle::NotEligible);
        assert_eq!(h.chain.calls_of(ActionKind::SetWeights), 1);
    }

    #[tokio::test]
    async fn failed_attempt_keeps_its_reservation() {
        let mut h = harness();
        h.chain.register(HOTKEY);
        h.chain.grant_permit(HOTKEY);
        h.chain.fail_next_submissions(vec![
            epochsweep_client::mock::MockFailure::Reject("bad".into());
            3
        ]);

        let cycle = run_action(&mut h.gate, &h.executor, &mut h.reporter, &weights(), Slot::Cadence, 13, 5_000).await;
        assert!(!cycle.executed().unwrap().succeeded());
        assert!(!h.gate.is_eligible(ActionKind::SetWeights, 14, 5_100));
    }

    #[tokio::test]
    async fn zero_balance_leaves_epoch_slot_free() {
        let mut h = harness();
        let sweep = ActionParams::MoveStake {
            account: StakeAccount::new("cold", HOTKEY, 35),
            to_hotkey: "agg".to_string(),
        };

        let cycle = run_action(&mut h.gate, &h.executor, &mut h.reporter, &sweep, Slot::Cadence, 13, 5_000).await;
        assert!(matches!(cycle, Cycle::Skipped(ActionError::ZeroBalanceSkip(_))));
        assert!(h.gate.is_eligible(ActionKind::MoveStake, 13, 5_010));

        h.chain.set_balance("cold", HOTKEY, Balance::from_rao(10));
        let cycle = run_action(&mut h.gate, &h.executor, &mut h.reporter, &sweep, Slot::Cadence, 13, 5_010).await;
        assert!(cycle.executed().unwrap().succeeded());
        assert_eq!(h.gate.last_claimed_epoch(ActionKind::MoveStake), Some(13));
    }
}
