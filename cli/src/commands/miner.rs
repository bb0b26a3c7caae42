use anyhow::{anyhow, Result};

use epochsweep_client::{short_address, NodeRole};
use epochsweep_network::epoch::fetch_tempo;
use epochsweep_network::metrics::Process;
use epochsweep_network::miner::{Miner, MinerConfig};

use crate::cli::Context;
use crate::config::SweepConfig;
use crate::log;

use super::{prepare_process, run_loop};

pub fn miner_config(config: &SweepConfig) -> Result<MinerConfig> {
    let aggregator_hotkey = config.miner.aggregator_hotkey
        .clone()
        .ok_or_else(|| anyhow!("miner.aggregator_hotkey is not configured"))?;
    let destination_coldkey = config.miner.destination_coldkey
        .clone()
        .ok_or_else(|| anyhow!("miner.destination_coldkey is not configured"))?;

    Ok(MinerConfig {
        coldkey: config.identity.coldkey.clone(),
        hotkey: config.identity.hotkey.clone(),
        aggregator_hotkey,
        destination_coldkey,
        netuid: config.subnet.netuid,
        skip_initial_transfer: config.miner.skip_initial_transfer,
        poll_interval: config.execution.poll_interval(),
        summary_interval: config.notify.summary_interval(),
    })
}

pub async fn handle_miner_command(context: Context) -> Result<()> {
    let config = context.config.clone();
    let miner_config = miner_config(&config)?;

    log::print_section_header("Miner");
    log::print_field("Coldkey", short_address(&miner_config.coldkey));
    log::print_field("Hotkey", short_address(&miner_config.hotkey));
    log::print_field("Aggregator", short_address(&miner_config.aggregator_hotkey));
    log::print_field("Destination", short_address(&miner_config.destination_coldkey));
    log::print_field("Netuid", miner_config.netuid);
    log::print_field("Initial transfer", if miner_config.skip_initial_transfer { "skipped" } else { "enabled" });
    log::print_field("Durability", config.execution.durability);

    let shutdown = prepare_process(&context, Process::Miner)?;
    let chain = context.chain();
    let tempo = fetch_tempo(chain.as_ref(), miner_config.netuid).await;
    log::print_field("Tempo", format!("{tempo} blocks"));
    log::print_divider();

    let miner = Miner::new(
        chain,
        context.notifier(NodeRole::Miner),
        miner_config,
        config.execution.executor_config(),
        tempo,
        shutdown.clone(),
    );

    run_loop(shutdown, miner.run()).await
}
