use anyhow::Result;

use epochsweep_api::prelude::*;
use epochsweep_client::{short_address, ChainClient, ChainError, StakeAccount};
use epochsweep_network::epoch::fetch_tempo;

use crate::cli::Context;
use crate::config::SweepConfig;
use crate::log;

/// Read-only view of the chain and the configured accounts.
#[derive(Debug)]
pub struct Status {
    pub block: u64,
    pub tempo: u64,
    pub epoch: EpochState,
    /// From the chain client when it exposes the query.
    pub next_epoch_hint: Option<u64>,
    pub hotkey: Option<HotkeyStatus>,
    pub balances: Vec<(String, Result<Balance, ChainError>)>,
}

#[derive(Debug)]
pub struct HotkeyStatus {
    pub hotkey: String,
    pub registered: Result<bool, ChainError>,
    pub permit: Result<bool, ChainError>,
    pub uid: Result<Option<u16>, ChainError>,
}

pub async fn collect_status(chain: &dyn ChainClient, config: &SweepConfig) -> Result<Status> {
    let netuid = config.subnet.netuid;
    let block = chain.get_current_block().await?;
    let tempo = fetch_tempo(chain, netuid).await;
    let epoch = EpochState::from_block(block, tempo);
    let next_epoch_hint = chain.get_next_epoch_start(netuid).await.unwrap_or(None);

    let identity = &config.identity;
    let hotkey = if identity.hotkey.is_empty() {
        None
    } else {
        Some(HotkeyStatus {
            hotkey: identity.hotkey.clone(),
            registered: chain.is_registered(&identity.hotkey, netuid).await,
            permit: chain.has_permit(&identity.hotkey, netuid).await,
            uid: chain.get_uid_for_hotkey(&identity.hotkey, netuid).await,
        })
    };

    let mut balances = Vec::new();
    if !identity.coldkey.is_empty() {
        let mut hotkeys = Vec::new();
        if !identity.hotkey.is_empty() {
            hotkeys.push(identity.hotkey.clone());
        }
        if let Some(ref aggregator) = config.miner.aggregator_hotkey {
            hotkeys.push(aggregator.clone());
        }
        for hotkey in hotkeys {
            let account = StakeAccount::new(&identity.coldkey, &hotkey, netuid);
            let balance = chain.get_balance(&account).await;
            balances.push((hotkey, balance));
        }
    }

    Ok(Status {
        block,
        tempo,
        epoch,
        next_epoch_hint,
        hotkey,
        balances,
    })
}

pub async fn handle_info_command(context: Context) -> Result<()> {
    let chain = context.chain();
    let status = collect_status(chain.as_ref(), &context.config).await?;

    log::print_section_header("Chain");
    log::print_field("Endpoint", context.endpoint());
    log::print_field("Block", status.block);
    log::print_field("Netuid", context.netuid());
    log::print_field("Tempo", format!("{} blocks", status.tempo));

    log::print_section_header("Epoch");
    log::print_field("Index", status.epoch.current_epoch_index);
    log::print_field("Started at", status.epoch.epoch_start_block);
    let next = status.next_epoch_hint.unwrap_or_else(|| status.epoch.next_epoch_start());
    log::print_field("Next epoch", format!(
        "{next} (in {} blocks)",
        next.saturating_sub(status.block)
    ));

    if let Some(ref hotkey) = status.hotkey {
        log::print_section_header("Hotkey");
        log::print_field("Address", short_address(&hotkey.hotkey));
        log::print_field("Registered", describe(&hotkey.registered));
        log::print_field("Validator permit", describe(&hotkey.permit));
        let uid = match &hotkey.uid {
            Ok(Some(uid)) => uid.to_string(),
            Ok(None) => "none".to_string(),
            Err(e) => format!("unavailable ({e})"),
        };
        log::print_field("Uid", uid);
    } else {
        log::print_warning("No hotkey configured; set [identity] hotkey to see registration status.");
    }

    if !status.balances.is_empty() {
        log::print_section_header("Stake");
        for (hotkey, balance) in &status.balances {
            log::print_field(&short_address(hotkey), describe(balance));
        }
    }

    log::print_divider();
    Ok(())
}

fn describe<T: std::fmt::Display>(value: &Result<T, ChainError>) -> String {
    match value {
        Ok(value) => value.to_string(),
        Err(e) => format!("unavailable ({e})"),
    }
}
