pub mod init;
pub mod info;
pub mod validator;
pub mod miner;

use anyhow::Result;
use tokio::task::JoinSet;

use epochsweep_network::metrics::{run_metrics_server, Process};
use epochsweep_network::utils::{shutdown_channel, spawn_signal_listener, wait_for_shutdown, Shutdown};

use crate::cli::Context;
use crate::log;

/// Installs the signal listener and, when enabled, the metrics endpoint.
fn prepare_process(context: &Context, process: Process) -> Result<Shutdown> {
    let (trigger, shutdown) = shutdown_channel();
    spawn_signal_listener(trigger);

    let metrics = &context.config.metrics;
    if metrics.enabled {
        run_metrics_server(process, metrics.port)?;
        let port = metrics.port.unwrap_or_else(|| process.default_metrics_port());
        log::print_field("Metrics", format!("http://0.0.0.0:{port}/metrics"));
    }

    Ok(shutdown)
}

/// Runs one loop until it exits or a shutdown signal arrives.
async fn run_loop<F>(shutdown: Shutdown, process: F) -> Result<()>
where
    F: std::future::Future<Output = Result<()>> + Send + 'static,
{
    let mut tasks = JoinSet::new();
    tasks.spawn(process);
    wait_for_shutdown(shutdown, tasks).await
}
