mod cli;
mod log;
mod commands;
mod config;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};
use commands::{info, init, miner, validator};
use env_logger::{self, Env};

use crate::cli::Context;
use crate::config::{ConfigError, SweepConfig};

const DEFAULT_LOG_FILTER: &str = "epochsweep_network=debug,epochsweep_client=debug";

fn main() -> Result<()> {
    let num_threads = num_cpus::get();

    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(num_threads)
        .enable_all()
        .build()?;

    rt.block_on(run_cli())
}

async fn run_cli() -> Result<()> {

    log::print_title(format!("EPOCHSWEEP {}", env!("CARGO_PKG_VERSION")).as_str());

    let cli = Cli::parse();

    if let Commands::Init {} = cli.command {
        init_logger(None, cli.verbose);
        return init::handle_init_command(&cli.config);
    }

    let mut config = match SweepConfig::load_with_path(&cli.config) {
        Ok(config) => config,
        Err(ConfigError::ConfigFileNotFound) => {
            log::print_info("~/.epochsweep.toml not found, creating default configuration...");
            match SweepConfig::create_default() {
                Ok(config) => {
                    log::print_info("✓ Default configuration created successfully");
                    config
                },
                Err(creation_error) => exit_with_config_error(creation_error),
            }
        },
        Err(e) => exit_with_config_error(e),
    };

    init_logger(config.logging.log_level.map(|level| level.filter()), cli.verbose);

    cli.command.apply_overrides(&mut config);
    if let Some(role) = cli.command.role() {
        if let Err(e) = config.validate_for(role) {
            exit_with_config_error(e);
        }
    } else if let Err(e) = config.validate() {
        exit_with_config_error(e);
    }

    let context = Context::try_build(config)?;

    log::print_message(&format!("Connected to: {}", context.endpoint()));

    match cli.command {
        Commands::Validator { .. } => {
            validator::handle_validator_command(context).await?;
        }
        Commands::Miner { .. } => {
            miner::handle_miner_command(context).await?;
        }
        Commands::Info {} => {
            info::handle_info_command(context).await?;
        }
        Commands::Init {} => {}
    }

    Ok(())
}

/// `RUST_LOG` wins over the config file; `-v` raises the default to trace.
fn init_logger(config_filter: Option<String>, verbose: bool) {
    let default_filter = if verbose {
        "epochsweep_network=trace,epochsweep_client=trace,epochsweep=trace".to_string()
    } else {
        config_filter.unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string())
    };

    env_logger::Builder::from_env(Env::default()
        .default_filter_or(default_filter)).init();
}

fn exit_with_config_error(e: ConfigError) -> ! {
    match e {
        ConfigError::CustomConfigFileNotFound(path) => {
            log::print_error(&format!("Custom config file not found: {}", path));
            log::print_info("Please check the path and try again.");
        },

        ConfigError::InvalidUrl(msg) => {
            log::print_error(&format!("URL Configuration Error: {}", msg));
            log::print_info("Please fix the URL in your config file and try again.");
        },

        ConfigError::MissingField(field) => {
            log::print_error(&format!("Missing required setting: {}", field));
            log::print_info("Set it in your config file or pass the matching command line flag.");
        },

        ConfigError::InvalidAddress(msg) => {
            log::print_error(&format!("Address Configuration Error: {}", msg));
            log::print_info("Addresses must be 48-character SS58 strings.");
        },

        ConfigError::InvalidValue(msg) => {
            log::print_error(&format!("Invalid setting: {}", msg));
        },

        ConfigError::FileReadError(io_err) => {
            log::print_error(&format!("Could not read config file: {}", io_err));
        },

        ConfigError::ParseError(parse_err) => {
            log::print_error(&format!("Invalid config file format: {}", parse_err));
            log::print_info("Please check your config file syntax.");
        },

        ConfigError::HomeDirectoryNotFound => {
            log::print_error("Could not determine home directory");
        },

        ConfigError::DefaultConfigCreationFailed(msg) => {
            log::print_error(&format!("Failed to create default config: {}", msg));
        },

        ConfigError::ConfigFileNotFound => {
            log::print_error("Configuration file not found");
            log::print_info("Run `epochsweep init` to create one.");
        },
    }
    std::process::exit(1);
}
