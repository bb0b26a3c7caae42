use anyhow::Result;
use std::time::Duration;

use epochsweep_client::{short_address, NodeRole};
use epochsweep_network::epoch::fetch_tempo;
use epochsweep_network::metrics::Process;
use epochsweep_network::validator::{TargetSelection, Validator, ValidatorConfig};

use crate::cli::Context;
use crate::config::SweepConfig;
use crate::log;

use super::{prepare_process, run_loop};

pub fn validator_config(config: &SweepConfig) -> ValidatorConfig {
    let target = match config.validator.target_uid {
        Some(uid) => TargetSelection::Fixed(uid),
        None => TargetSelection::SubnetOwner,
    };

    ValidatorConfig {
        hotkey: config.identity.hotkey.clone(),
        netuid: config.subnet.netuid,
        target,
        set_weights_interval: config.validator.set_weights_interval,
        poll_interval: config.execution.poll_interval(),
        target_refresh: Duration::from_secs(config.validator.target_refresh_seconds),
        summary_interval: config.notify.summary_interval(),
    }
}

pub async fn handle_validator_command(context: Context) -> Result<()> {
    let config = context.config.clone();
    let validator_config = validator_config(&config);

    log::print_section_header("Validator");
    log::print_field("Hotkey", short_address(&validator_config.hotkey));
    log::print_field("Netuid", validator_config.netuid);
    match validator_config.target {
        TargetSelection::Fixed(uid) => log::print_field("Target", format!("uid {uid}")),
        TargetSelection::SubnetOwner => log::print_field("Target", "subnet owner (auto)"),
    }
    log::print_field("Interval", format!("{} blocks", validator_config.set_weights_interval));
    log::print_field("Durability", config.execution.durability);

    let shutdown = prepare_process(&context, Process::Validator)?;
    let chain = context.chain();
    let tempo = fetch_tempo(chain.as_ref(), validator_config.netuid).await;
    log::print_field("Tempo", format!("{tempo} blocks"));
    log::print_divider();

    let validator = Validator::new(
        chain,
        context.notifier(NodeRole::Validator),
        validator_config,
        config.execution.executor_config(),
        tempo,
        shutdown.clone(),
    );

    run_loop(shutdown, validator.run()).await
}
