use std::sync::Arc;
use std::time::Duration;

use rand::Rng;

use epochsweep_api::prelude::*;
use epochsweep_client::mock::{MockChain, MockFailure, RecordingNotifier};
use epochsweep_client::EventKind;
use epochsweep_network::executor::ExecutorConfig;
use epochsweep_network::miner::{Miner, MinerConfig, MinerTick};
use epochsweep_network::pipeline::Cycle;
use epochsweep_network::retry::RetryPolicy;
use epochsweep_network::utils::{shutdown_channel, Shutdown};

const COLD: &str = "5ColdkeyColdkeyColdkeyColdkeyColdkeyColdkeyCold";
const PRIMARY: &str = "5PrimaryPrimaryPrimaryPrimaryPrimaryPrimaryPrim";
const AGG: &str = "5AggregatorAggregatorAggregatorAggregatorAggreg";
const DEST: &str = "5DestinationDestinationDestinationDestinationDe";
const TEMPO: u64 = 360;

fn config(skip_initial_transfer: bool) -> MinerConfig {
    MinerConfig {
        coldkey: COLD.to_string(),
        hotkey: PRIMARY.to_string(),
        aggregator_hotkey: AGG.to_string(),
        destination_coldkey: DEST.to_string(),
        netuid: 35,
        skip_initial_transfer,
        poll_interval: Duration::from_secs(30),
        summary_interval: Some(Duration::from_secs(3_600)),
    }
}

fn executor_config(attempts: u32) -> ExecutorConfig {
    ExecutorConfig {
        durability: Durability::Inclusion,
        confirmation_timeout: Duration::from_secs(5),
        retry: RetryPolicy::immediate(attempts),
    }
}

#[tokio::test]
async fn at_most_one_sweep_and_transfer_per_epoch() {
    let mut rng = rand::thread_rng();
    let chain = Arc::new(MockChain::new(1_000, TEMPO));
    let notifier = RecordingNotifier::new();
    let mut miner = Miner::new(
        chain.clone(),
        Arc::new(notifier.clone()),
        config(true),
        executor_config(3),
        TEMPO,
        Shutdown::never(),
    );
    miner.initial_pass().await.unwrap();

    let mut total_emitted = 0u64;
    let mut epochs = Vec::new();

    for _ in 0..400 {
        // emissions accrue between polls
        let emission = rng.gen_range(0..1_000);
        total_emitted += emission;
        let current = chain.balance(COLD, PRIMARY);
        chain.set_balance(COLD, PRIMARY, current.saturating_add(Balance::from_rao(emission)));
        chain.advance_blocks(rng.gen_range(0..=5));

        if let MinerTick::Cycles { sweep, transfer, .. } = miner.tick().await {
            for cycle in [&sweep, &transfer] {
                if let Cycle::Executed(execution) = cycle {
                    epochs.push((execution.record.kind, execution.record.epoch_index));
                }
            }
        }
    }

    let mut deduped = epochs.clone();
    deduped.sort();
    deduped.dedup();
    assert_eq!(deduped.len(), epochs.len(), "duplicate reservation in {epochs:?}");

    // Everything swept so far has either been forwarded or is waiting on the aggregator.
    let forwarded = chain.balance(DEST, AGG).rao();
    let waiting = chain.balance(COLD, AGG).rao();
    let unswept = chain.balance(COLD, PRIMARY).rao();
    assert_eq!(forwarded + waiting + unswept, total_emitted);
    assert_eq!(notifier.count_of(EventKind::ActionFailed), 0);
}

#[tokio::test]
async fn zero_balance_is_retried_within_the_epoch() {
    let chain = Arc::new(MockChain::new(1_000, TEMPO));
    let mut miner = Miner::new(
        chain.clone(),
        Arc::new(RecordingNotifier::new()),
        config(true),
        executor_config(3),
        TEMPO,
        Shutdown::never(),
    );
    miner.initial_pass().await.unwrap();

    chain.set_block(1_080);
    let MinerTick::Cycles { sweep, .. } = miner.tick().await else {
        panic!("expected the epoch cycles");
    };
    assert!(matches!(sweep, Cycle::Skipped(ActionError::ZeroBalanceSkip(_))));

    chain.set_balance(COLD, PRIMARY, Balance::from_rao(77));
    chain.set_block(1_100);
    let MinerTick::Cycles { sweep, transfer, .. } = miner.tick().await else {
        panic!("expected the epoch cycles");
    };
    assert!(sweep.executed().unwrap().succeeded());
    assert!(transfer.executed().unwrap().succeeded());
    assert_eq!(chain.balance(DEST, AGG), Balance::from_rao(77));

    chain.set_balance(COLD, PRIMARY, Balance::from_rao(5));
    chain.set_block(1_200);
    let MinerTick::Cycles { sweep, transfer, .. } = miner.tick().await else {
        panic!("expected the epoch cycles");
    };
    assert_eq!(sweep, Cycle::NotEligible);
    assert_eq!(transfer, Cycle::NotEligible);
}

#[tokio::test]
async fn failed_transfer_waits_for_next_epoch() {
    let chain = Arc::new(MockChain::new(1_000, TEMPO));
    let notifier = RecordingNotifier::new();
    let mut miner = Miner::new(
        chain.clone(),
        Arc::new(notifier.clone()),
        config(true),
        executor_config(2),
        TEMPO,
        Shutdown::never(),
    );
    miner.initial_pass().await.unwrap();

    chain.set_balance(COLD, AGG, Balance::from_rao(900));
    chain.set_block(1_080);
    chain.fail_next_submissions([
        MockFailure::Transport("connection reset".into()),
        MockFailure::Transport("connection reset".into()),
    ]);
    let MinerTick::Cycles { transfer, .. } = miner.tick().await else {
        panic!("expected the epoch cycles");
    };
    assert_eq!(transfer.executed().unwrap().record.outcome, ActionOutcome::Failed);
    assert_eq!(notifier.count_of(EventKind::ActionFailed), 1);

    chain.set_block(1_100);
    let MinerTick::Cycles { transfer, .. } = miner.tick().await else {
        panic!("expected the epoch cycles");
    };
    assert_eq!(transfer, Cycle::NotEligible);

    chain.set_block(1_440);
    let MinerTick::Cycles { transfer, .. } = miner.tick().await else {
        panic!("expected the epoch cycles");
    };
    assert!(transfer.executed().unwrap().succeeded());
    assert_eq!(chain.balance(DEST, AGG), Balance::from_rao(900));
}

#[tokio::test]
async fn tempo_fallback_after_hinted_boundary_sweeps_every_epoch() {
    let chain = Arc::new(MockChain::new(1_000, TEMPO));
    chain.set_next_epoch_start(Some(1_043));
    let mut miner = Miner::new(
        chain.clone(),
        Arc::new(RecordingNotifier::new()),
        config(true),
        executor_config(3),
        TEMPO,
        Shutdown::never(),
    );
    miner.initial_pass().await.unwrap();
    chain.set_next_epoch_start(None);

    chain.set_balance(COLD, PRIMARY, Balance::from_rao(40));
    chain.set_block(1_043);
    let MinerTick::Cycles { sweep, .. } = miner.tick().await else {
        panic!("expected the epoch cycles");
    };
    assert_eq!(sweep.executed().unwrap().record.epoch_index, 3);

    chain.set_balance(COLD, PRIMARY, Balance::from_rao(70));
    chain.set_block(1_403);
    let MinerTick::Cycles { sweep, transfer, .. } = miner.tick().await else {
        panic!("expected the epoch cycles");
    };
    let sweep = sweep.executed().unwrap();
    assert!(sweep.succeeded());
    assert_eq!(sweep.record.epoch_index, 4);
    assert!(transfer.executed().unwrap().succeeded());
    assert!(chain.balance(COLD, PRIMARY).is_zero());
    assert_eq!(chain.balance(DEST, AGG), Balance::from_rao(110));
}

#[tokio::test]
async fn boundary_query_error_does_not_stall_the_miner() {
    let chain = Arc::new(MockChain::new(1_000, TEMPO));
    chain.set_next_epoch_start(Some(1_043));
    let mut miner = Miner::new(
        chain.clone(),
        Arc::new(RecordingNotifier::new()),
        config(true),
        executor_config(3),
        TEMPO,
        Shutdown::never(),
    );
    miner.initial_pass().await.unwrap();

    chain.fail_boundary_reads(1);
    chain.set_block(1_043);
    assert!(matches!(miner.tick().await, MinerTick::Cycles { .. }));

    chain.set_balance(COLD, PRIMARY, Balance::from_rao(15));
    chain.set_block(1_403);
    let MinerTick::Cycles { sweep, .. } = miner.tick().await else {
        panic!("expected the epoch cycles");
    };
    assert!(sweep.executed().unwrap().succeeded());
    assert_eq!(chain.calls_of(ActionKind::MoveStake), 1);
}

#[tokio::test]
async fn block_regression_aborts_the_cycle() {
    let chain = Arc::new(MockChain::new(1_000, TEMPO));
    chain.set_balance(COLD, PRIMARY, Balance::from_rao(10));
    let mut miner = Miner::new(
        chain.clone(),
        Arc::new(RecordingNotifier::new()),
        config(true),
        executor_config(3),
        TEMPO,
        Shutdown::never(),
    );
    miner.initial_pass().await.unwrap();

    chain.set_block(990);
    assert_eq!(miner.tick().await, MinerTick::Regressed);
    chain.fail_block_reads(1);
    assert_eq!(miner.tick().await, MinerTick::PollFailed);
    assert_eq!(chain.calls_of(ActionKind::MoveStake), 1);
}

#[tokio::test(start_paused = true)]
async fn run_stops_on_shutdown_and_reports_summary() {
    let chain = Arc::new(MockChain::new(1_000, TEMPO));
    chain.set_balance(COLD, PRIMARY, Balance::from_rao(250));
    let notifier = RecordingNotifier::new();
    let (trigger, shutdown) = shutdown_channel();
    let miner = Miner::new(
        chain.clone(),
        Arc::new(notifier.clone()),
        config(false),
        executor_config(3),
        TEMPO,
        shutdown,
    );

    let handle = tokio::spawn(miner.run());
    tokio::time::sleep(Duration::from_secs(95)).await;
    trigger.trigger();
    handle.await.unwrap().unwrap();

    let events = notifier.events();
    assert_eq!(events.first().unwrap().kind, EventKind::Startup);
    let last = events.last().unwrap();
    assert_eq!(last.kind, EventKind::Shutdown);
    assert!(last.context["summary"].contains("2 succeeded"));
    assert_eq!(chain.balance(DEST, AGG), Balance::from_rao(250));
}

#[tokio::test(start_paused = true)]
async fn run_sends_a_periodic_summary() {
    let chain = Arc::new(MockChain::new(1_000, TEMPO));
    chain.set_balance(COLD, PRIMARY, Balance::from_rao(250));
    let notifier = RecordingNotifier::new();
    let (trigger, shutdown) = shutdown_channel();
    let miner = Miner::new(
        chain.clone(),
        Arc::new(notifier.clone()),
        config(false),
        executor_config(3),
        TEMPO,
        shutdown,
    );

    let handle = tokio::spawn(miner.run());
    tokio::time::sleep(Duration::from_secs(3_700)).await;
    trigger.trigger();
    handle.await.unwrap().unwrap();

    let summaries: Vec<_> = notifier
        .events()
        .into_iter()
        .filter(|e| e.kind == EventKind::Summary)
        .collect();
    assert_eq!(summaries.len(), 1);
    assert!(summaries[0].message.starts_with("Miner summary"));
    assert!(summaries[0].message.contains("2 succeeded"));
    assert_eq!(summaries[0].context["move_stake"], "1");
    assert_eq!(summaries[0].context["transfer_stake"], "1");
}
