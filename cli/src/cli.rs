use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use epochsweep_api::prelude::*;
use epochsweep_client::{ChainClient, NodeRole, NoopNotifier, Notifier, RpcChainClient, SlackNotifier};
use epochsweep_network::validator::TargetSelection;

use crate::config::SweepConfig;

#[derive(Parser)]
#[command(
    name = "epochsweep",
    about = "Epoch-synchronized weight setting and stake sweeping for subnet validators and miners.",
    arg_required_else_help = true,
    version = env!("CARGO_PKG_VERSION")
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(short = 'c', long = "config", help = "Path to config file (overrides default)", global = true)]
    pub config: Option<PathBuf>,

    #[arg(short = 'v', long = "verbose", help = "Print verbose output", global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {

    /// Write a default configuration file
    Init {},

    /// Print chain, epoch and account status without acting
    Info {},

    /// Set full weight on the target uid at a fixed block interval
    Validator {
        #[arg(
            short = 't',
            long = "target",
            help = "Target uid, or 'auto' for the subnet owner's uid",
            value_parser = parse_target
        )]
        target: Option<TargetSelection>,

        #[arg(long = "interval", help = "Minimum blocks between weight submissions")]
        interval: Option<u64>,

        #[command(flatten)]
        common: CommonArgs,
    },

    /// Sweep stake to the aggregator and forward it once per epoch
    Miner {
        #[arg(short = 'a', long = "aggregator", help = "Hotkey that collects swept stake")]
        aggregator: Option<String>,

        #[arg(short = 'd', long = "destination", help = "Coldkey that receives the forwarded stake")]
        destination: Option<String>,

        #[arg(long = "skip-initial-transfer", help = "Do not forward the aggregate at startup")]
        skip_initial_transfer: bool,

        #[command(flatten)]
        common: CommonArgs,
    },
}

/// Overrides shared by both long-running processes.
#[derive(Args, Clone, Debug, Default)]
pub struct CommonArgs {
    #[arg(short = 'n', long = "netuid", help = "Subnet to operate on")]
    pub netuid: Option<u16>,

    #[arg(short = 'p', long = "poll-interval", help = "Seconds between block height polls")]
    pub poll_interval: Option<u64>,

    #[arg(long = "durability", help = "Wait for 'inclusion' or 'finalization'", value_parser = parse_durability)]
    pub durability: Option<Durability>,

    #[arg(short = 'r', long = "retries", help = "Submission attempts per slot")]
    pub retry_bound: Option<u32>,

    #[arg(short = 'w', long = "webhook", help = "Notification webhook url")]
    pub webhook: Option<String>,
}

impl CommonArgs {
    fn apply(&self, config: &mut SweepConfig) {
        if let Some(netuid) = self.netuid {
            config.subnet.netuid = netuid;
        }
        if let Some(poll_interval) = self.poll_interval {
            config.execution.poll_interval_seconds = poll_interval;
        }
        if let Some(durability) = self.durability {
            config.execution.durability = durability;
        }
        if let Some(retry_bound) = self.retry_bound {
            config.execution.retry_bound = retry_bound;
        }
        if let Some(ref webhook) = self.webhook {
            config.notify.webhook_url = Some(webhook.clone());
        }
    }
}

impl Commands {
    /// Role of the long-running process this command starts, if any.
    pub fn role(&self) -> Option<NodeRole> {
        match self {
            Commands::Validator { .. } => Some(NodeRole::Validator),
            Commands::Miner { .. } => Some(NodeRole::Miner),
            _ => None,
        }
    }

    /// Command line flags take precedence over the config file.
    pub fn apply_overrides(&self, config: &mut SweepConfig) {
        match self {
            Commands::Validator { target, interval, common } => {
                common.apply(config);
                match target {
                    Some(TargetSelection::Fixed(uid)) => config.validator.target_uid = Some(*uid),
                    Some(TargetSelection::SubnetOwner) => config.validator.target_uid = None,
                    None => {}
                }
                if let Some(interval) = interval {
                    config.validator.set_weights_interval = *interval;
                }
            }
            Commands::Miner { aggregator, destination, skip_initial_transfer, common } => {
                common.apply(config);
                if let Some(aggregator) = aggregator {
                    config.miner.aggregator_hotkey = Some(aggregator.clone());
                }
                if let Some(destination) = destination {
                    config.miner.destination_coldkey = Some(destination.clone());
                }
                if *skip_initial_transfer {
                    config.miner.skip_initial_transfer = true;
                }
            }
            Commands::Init {} | Commands::Info {} => {}
        }
    }
}

fn parse_target(value: &str) -> Result<TargetSelection, String> {
    match value {
        "auto" | "owner" => Ok(TargetSelection::SubnetOwner),
        uid => uid
            .parse::<u16>()
            .map(TargetSelection::Fixed)
            .map_err(|_| format!("expected a uid or 'auto', found '{uid}'")),
    }
}

fn parse_durability(value: &str) -> Result<Durability, String> {
    match value {
        "inclusion" | "included" => Ok(Durability::Inclusion),
        "finalization" | "finalized" => Ok(Durability::Finalization),
        other => Err(format!("expected 'inclusion' or 'finalization', found '{other}'")),
    }
}

pub struct Context {
    pub config: Arc<SweepConfig>,
    pub chain: Arc<RpcChainClient>,
}

impl Context {
    pub fn try_build(config: SweepConfig) -> Result<Self> {
        let chain = Arc::new(RpcChainClient::new(config.rpc_config())?);

        Ok(Self {
            config: Arc::new(config),
            chain,
        })
    }

    pub fn chain(&self) -> Arc<dyn ChainClient> {
        self.chain.clone()
    }

    pub fn endpoint(&self) -> &str {
        self.chain.current_endpoint()
    }

    pub fn netuid(&self) -> u16 {
        self.config.subnet.netuid
    }

    /// Webhook notifier when a webhook is configured, otherwise log only.
    pub fn notifier(&self, role: NodeRole) -> Arc<dyn Notifier> {
        match self.config.notify.webhook_url {
            Some(ref webhook) if !webhook.is_empty() => Arc::new(SlackNotifier::new(
                webhook.clone(),
                self.config.notify.error_webhook_url.clone(),
                role,
                self.config.identity.hotkey.clone(),
            )),
            _ => Arc::new(NoopNotifier),
        }
    }
}
