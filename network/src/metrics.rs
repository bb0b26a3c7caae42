use std::{
    convert::Infallible, net::{Ipv4Addr, SocketAddr, SocketAddrV4}, sync::Once
};

use hyper::{Request, Response};
use hyper::body::{Bytes, Incoming};
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use hyper_util::server::conn::auto;
use http_body_util::Full;

use tokio::net::TcpListener;

use prometheus::{
    IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder
};

use log::{error, info};

use epochsweep_api::prelude::*;

lazy_static::lazy_static! {
    static ref REGISTRY: Registry = Registry::new();

    // Actions that reserved a slot and were submitted
    static ref EPOCHSWEEP_ACTIONS_ATTEMPTED_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new(
            "epochsweep_actions_attempted_total",
            "Total number of reserved actions, labelled by kind"
        ),
        &["kind"]
    ).unwrap();

    // Actions that reached inclusion or finalization
    static ref EPOCHSWEEP_ACTIONS_SUCCEEDED_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new(
            "epochsweep_actions_succeeded_total",
            "Total number of confirmed actions, labelled by kind"
        ),
        &["kind"]
    ).unwrap();

    static ref EPOCHSWEEP_ACTIONS_FAILED_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new(
            "epochsweep_actions_failed_total",
            "Total number of actions that exhausted their retries, labelled by kind"
        ),
        &["kind"]
    ).unwrap();

    // Pre-check skips (not registered, no permit, zero balance, query failure)
    static ref EPOCHSWEEP_ACTIONS_SKIPPED_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new(
            "epochsweep_actions_skipped_total",
            "Total number of skipped action cycles, labelled by kind and reason"
        ),
        &["kind", "reason"]
    ).unwrap();

    static ref EPOCHSWEEP_ACTION_RETRIES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new(
            "epochsweep_action_retries_total",
            "Total number of in-slot retries, labelled by kind"
        ),
        &["kind"]
    ).unwrap();

    // Amount moved in rao
    static ref EPOCHSWEEP_AMOUNT_MOVED_RAO_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new(
            "epochsweep_amount_moved_rao_total",
            "Total stake moved in rao, labelled by kind"
        ),
        &["kind"]
    ).unwrap();

    static ref EPOCHSWEEP_POLL_FAILURES_TOTAL: IntCounter = IntCounter::new(
        "epochsweep_poll_failures_total",
        "Total number of failed block height polls"
    ).unwrap();

    // Last observed block
    static ref EPOCHSWEEP_BLOCK_HEIGHT: IntGauge = IntGauge::new(
        "epochsweep_block_height",
        "Last observed block height"
    ).unwrap();

    static ref EPOCHSWEEP_EPOCH_INDEX: IntGauge = IntGauge::new(
        "epochsweep_epoch_index",
        "Current epoch index"
    ).unwrap();
}

fn metrics_handler() -> Result<Response<Full<Bytes>>, Infallible> {
    let metrics = TextEncoder::new()
        .encode_to_string(&REGISTRY.gather())
        .unwrap_or_else(|error| {
            error!("could not encode custom metrics: {error}");
            String::new()
        });

    let mut response = Response::new(Full::new(Bytes::from(metrics)));
    response.headers_mut().insert(
        hyper::header::CONTENT_TYPE,
        hyper::header::HeaderValue::from_static("text/plain"),
    );
    Ok(response)
}

async fn handle_metrics_request(req: Request<Incoming>) -> Result<Response<Full<Bytes>>, Infallible> {
    match req.uri().path() {
        "/metrics" => metrics_handler(),
        _ => Ok(not_found_handler()),
    }
}

fn not_found_handler() -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from("Not Found")));
    *response.status_mut() = hyper::StatusCode::NOT_FOUND;
    response
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Process {
    Validator,
    Miner,
}

impl Process {
    pub fn default_metrics_port(&self) -> u16 {
        match self {
            Process::Validator => VALIDATOR_METRICS_PORT,
            Process::Miner => MINER_METRICS_PORT,
        }
    }
}

pub fn run_metrics_server(process: Process, port: Option<u16>) -> anyhow::Result<()> {
    // Register once
    static REGISTER: Once = Once::new();
    let mut registration = Ok(());
    REGISTER.call_once(|| {
        registration = register_collectors(process);
    });
    registration?;

    let port = port.unwrap_or_else(|| process.default_metrics_port());
    let address = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::new(0, 0, 0, 0), port));

    tokio::spawn(async move {
        let listener = match TcpListener::bind(address).await {
            Ok(l) => {
                info!("Prometheus server started at http://{address}/metrics");
                l
            },
            Err(e) => {
                error!("Failed to bind Prometheus server: {e:?}");
                return;
            }
        };

        loop {
            let (stream, _) = match listener.accept().await {
                Ok(pair) => pair,
                Err(e) => {
                    error!("Prometheus accept failed: {e:?}");
                    continue;
                }
            };

            let io = TokioIo::new(stream);
            let service = service_fn(handle_metrics_request);

            tokio::spawn(async move {
                let builder = auto::Builder::new(hyper_util::rt::TokioExecutor::new());
                let conn = builder.serve_connection(io, service);
                if let Err(e) = conn.await {
                    error!("Prometheus connection failed: {e:?}");
                }
            });
        }
    });

    Ok(())
}

fn register_collectors(process: Process) -> prometheus::Result<()> {
    macro_rules! register {
        ($collector:ident) => {
            REGISTRY.register(Box::new($collector.clone()))?;
        };
    }

    register!(EPOCHSWEEP_ACTIONS_ATTEMPTED_TOTAL);
    register!(EPOCHSWEEP_ACTIONS_SUCCEEDED_TOTAL);
    register!(EPOCHSWEEP_ACTIONS_FAILED_TOTAL);
    register!(EPOCHSWEEP_ACTIONS_SKIPPED_TOTAL);
    register!(EPOCHSWEEP_ACTION_RETRIES_TOTAL);
    register!(EPOCHSWEEP_POLL_FAILURES_TOTAL);
    register!(EPOCHSWEEP_BLOCK_HEIGHT);
    register!(EPOCHSWEEP_EPOCH_INDEX);

    match process {
        Process::Miner => {
            register!(EPOCHSWEEP_AMOUNT_MOVED_RAO_TOTAL);
        }
        Process::Validator => {}
    }
    Ok(())
}

pub fn inc_actions_attempted(kind: ActionKind) {
    EPOCHSWEEP_ACTIONS_ATTEMPTED_TOTAL
        .with_label_values(&[kind.as_str()])
        .inc();
}

pub fn inc_actions_succeeded(kind: ActionKind) {
    EPOCHSWEEP_ACTIONS_SUCCEEDED_TOTAL
        .with_label_values(&[kind.as_str()])
        .inc();
}

pub fn inc_actions_failed(kind: ActionKind) {
    EPOCHSWEEP_ACTIONS_FAILED_TOTAL
        .with_label_values(&[kind.as_str()])
        .inc();
}

pub fn inc_actions_skipped(kind: ActionKind, reason: &str) {
    EPOCHSWEEP_ACTIONS_SKIPPED_TOTAL
        .with_label_values(&[kind.as_str(), reason])
        .inc();
}

pub fn inc_action_retries(kind: ActionKind, retries: u32) {
    EPOCHSWEEP_ACTION_RETRIES_TOTAL
        .with_label_values(&[kind.as_str()])
        .inc_by(retries as u64);
}

pub fn add_amount_moved(kind: ActionKind, amount: Balance) {
    EPOCHSWEEP_AMOUNT_MOVED_RAO_TOTAL
        .with_label_values(&[kind.as_str()])
        .inc_by(amount.rao());
}

pub fn inc_poll_failures() {
    EPOCHSWEEP_POLL_FAILURES_TOTAL.inc();
}

pub fn set_block_height(block: u64) {
    EPOCHSWEEP_BLOCK_HEIGHT.set(block as i64);
}

pub fn set_epoch_index(epoch_index: u64) {
    EPOCHSWEEP_EPOCH_INDEX.set(epoch_index as i64);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate_per_label() {
        let before = EPOCHSWEEP_ACTIONS_SKIPPED_TOTAL
            .with_label_values(&["move_stake", "metrics_test"])
            .get();
        inc_actions_skipped(ActionKind::MoveStake, "metrics_test");
        inc_actions_skipped(ActionKind::MoveStake, "metrics_test");
        let after = EPOCHSWEEP_ACTIONS_SKIPPED_TOTAL
            .with_label_values(&["move_stake", "metrics_test"])
            .get();
        assert_eq!(after - before, 2);
    }

    #[test]
    fn default_ports() {
        assert_eq!(Process::Validator.default_metrics_port(), 8876);
        assert_eq!(Process::Miner.default_metrics_port(), 8877);
    }
}
