use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use log::{debug, warn};
use reqwest::Client as HttpClient;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

use epochsweep_api::prelude::*;

use crate::chain::*;

/// JSON-RPC method names exposed by the chain gateway.
pub mod methods {
    pub const CURRENT_BLOCK: &str = "chain_getCurrentBlock";
    pub const NEXT_EPOCH_START: &str = "subnet_getNextEpochStart";
    pub const TEMPO: &str = "subnet_getTempo";
    pub const IS_REGISTERED: &str = "subnet_isHotkeyRegistered";
    pub const HAS_PERMIT: &str = "subnet_hasValidatorPermit";
    pub const OWNER_HOTKEY: &str = "subnet_getOwnerHotkey";
    pub const UID_FOR_HOTKEY: &str = "subnet_getUidForHotkey";
    pub const WEIGHTS_VERSION_KEY: &str = "subnet_getWeightsVersionKey";
    pub const STAKE_BALANCE: &str = "stake_getBalance";
    pub const SET_WEIGHTS: &str = "extrinsic_setWeights";
    pub const MOVE_STAKE: &str = "extrinsic_moveStake";
    pub const TRANSFER_STAKE: &str = "extrinsic_transferStake";
}

#[derive(Clone, Debug)]
pub struct RpcConfig {
    pub endpoints: Vec<String>,
    pub request_timeout: Duration,
    /// HTTP timeout for extrinsic calls, which block until confirmation.
    pub extrinsic_timeout: Duration,
    pub auth_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ExtrinsicResponse {
    success: bool,
    #[serde(default)]
    block: Option<u64>,
    #[serde(default)]
    tx_hash: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Chain client over JSON-RPC/HTTP with round-robin endpoint failover: it stays
/// on an endpoint while calls succeed and moves to the next one after a
/// transport failure.
pub struct RpcChainClient {
    http: HttpClient,
    endpoints: Vec<String>,
    current: AtomicUsize,
    next_id: AtomicU64,
    extrinsic_timeout: Duration,
    auth_token: Option<String>,
}

impl RpcChainClient {
    pub fn new(config: RpcConfig) -> Result<Self> {
        if config.endpoints.is_empty() {
            return Err(anyhow!("At least one chain endpoint is required"));
        }

        let http = HttpClient::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| anyhow!("Failed to build HTTP client: {}", e))?;

        Ok(Self {
            http,
            endpoints: config.endpoints,
            current: AtomicUsize::new(0),
            next_id: AtomicU64::new(1),
            extrinsic_timeout: config.extrinsic_timeout,
            auth_token: config.auth_token,
        })
    }

    pub fn current_endpoint(&self) -> &str {
        &self.endpoints[self.current.load(Ordering::Relaxed) % self.endpoints.len()]
    }

    fn rotate_from(&self, failed: usize) {
        if self.endpoints.len() < 2 {
            return;
        }
        let next = (failed + 1) % self.endpoints.len();
        // only the first caller that saw `failed` moves the cursor
        if self
            .current
            .compare_exchange(failed, next, Ordering::AcqRel, Ordering::Relaxed)
            .is_ok()
        {
            warn!(
                "Switching chain endpoint from {} to {}",
                self.endpoints[failed], self.endpoints[next]
            );
        }
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
        extrinsic: Option<Durability>,
    ) -> Result<T, ChainError> {
        let index = self.current.load(Ordering::Relaxed) % self.endpoints.len();
        let url = &self.endpoints[index];
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        debug!("rpc {method} -> {url} (id {id})");

        let mut request = self
            .http
            .post(url)
            .header("Content-Type", "application/json")
            .body(
                json!({
                    "jsonrpc": "2.0", "id": id,
                    "method": method,
                    "params": params,
                })
                .to_string(),
            );

        if extrinsic.is_some() {
            request = request.timeout(self.extrinsic_timeout);
        }
        if let Some(token) = &self.auth_token {
            request = request.bearer_auth(token);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                if let (true, Some(durability)) = (e.is_timeout(), extrinsic) {
                    return Err(ChainError::Timeout(durability));
                }
                self.rotate_from(index);
                return Err(ChainError::Transport(e.to_string()));
            }
        };

        let status = response.status();
        if status.is_server_error() {
            self.rotate_from(index);
            return Err(ChainError::Transport(format!("HTTP {status} from {url}")));
        }

        let body = response
            .json::<Value>()
            .await
            .map_err(|e| ChainError::Decode(e.to_string()))?;

        decode_response(body)
    }

    async fn submit(&self, method: &str, params: Value, durability: Durability) -> Result<Confirmation, ChainError> {
        let response: ExtrinsicResponse = self.call(method, params, Some(durability)).await?;
        confirmation_from(response, durability)
    }
}

fn decode_response<T: DeserializeOwned>(body: Value) -> Result<T, ChainError> {
    if let Some(error) = body.get("error") {
        let code = error["code"].as_i64().unwrap_or_default();
        let message = error["message"].as_str().unwrap_or("unknown error").to_string();
        return Err(ChainError::Rpc { code, message });
    }

    let result = body
        .get("result")
        .cloned()
        .ok_or_else(|| ChainError::Decode(format!("Missing result: {body}")))?;

    serde_json::from_value(result).map_err(|e| ChainError::Decode(e.to_string()))
}

fn confirmation_from(response: ExtrinsicResponse, durability: Durability) -> Result<Confirmation, ChainError> {
    if !response.success {
        return Err(ChainError::Rejected(
            response.message.unwrap_or_else(|| "no message".to_string()),
        ));
    }

    let block = response
        .block
        .ok_or_else(|| ChainError::Decode("Confirmed extrinsic without block".to_string()))?;

    Ok(Confirmation {
        block,
        durability,
        tx_hash: response.tx_hash.unwrap_or_default(),
    })
}

fn wait_params(durability: Durability) -> (bool, bool) {
    // (wait_for_inclusion, wait_for_finalization)
    match durability {
        Durability::Inclusion => (true, false),
        Durability::Finalization => (true, true),
    }
}

#[async_trait]
impl ChainClient for RpcChainClient {
    fn endpoint(&self) -> String {
        self.current_endpoint().to_string()
    }

    async fn get_current_block(&self) -> Result<u64, ChainError> {
        self.call(methods::CURRENT_BLOCK, json!({}), None).await
    }

    async fn get_next_epoch_start(&self, netuid: u16) -> Result<Option<u64>, ChainError> {
        match self.call::<Option<u64>>(methods::NEXT_EPOCH_START, json!({ "netuid": netuid }), None).await {
            Ok(block) => Ok(block),
            Err(e) if e.is_unsupported() => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn get_tempo(&self, netuid: u16) -> Result<u64, ChainError> {
        self.call(methods::TEMPO, json!({ "netuid": netuid }), None).await
    }

    async fn is_registered(&self, hotkey: &str, netuid: u16) -> Result<bool, ChainError> {
        self.call(methods::IS_REGISTERED, json!({ "hotkey": hotkey, "netuid": netuid }), None).await
    }

    async fn has_permit(&self, hotkey: &str, netuid: u16) -> Result<bool, ChainError> {
        self.call(methods::HAS_PERMIT, json!({ "hotkey": hotkey, "netuid": netuid }), None).await
    }

    async fn get_balance(&self, account: &StakeAccount) -> Result<Balance, ChainError> {
        let rao: u64 = self
            .call(
                methods::STAKE_BALANCE,
                json!({
                    "coldkey": account.coldkey,
                    "hotkey": account.hotkey,
                    "netuid": account.netuid,
                }),
                None,
            )
            .await?;
        Ok(Balance::from_rao(rao))
    }

    async fn get_subnet_owner_hotkey(&self, netuid: u16) -> Result<String, ChainError> {
        self.call(methods::OWNER_HOTKEY, json!({ "netuid": netuid }), None).await
    }

    async fn get_uid_for_hotkey(&self, hotkey: &str, netuid: u16) -> Result<Option<u16>, ChainError> {
        self.call(methods::UID_FOR_HOTKEY, json!({ "hotkey": hotkey, "netuid": netuid }), None).await
    }

    async fn get_weights_version_key(&self, netuid: u16) -> Result<u64, ChainError> {
        self.call(methods::WEIGHTS_VERSION_KEY, json!({ "netuid": netuid }), None).await
    }

    async fn set_weights(
        &self,
        hotkey: &str,
        netuid: u16,
        weights: &WeightMap,
        version_key: u64,
        durability: Durability,
    ) -> Result<Confirmation, ChainError> {
        let (wait_for_inclusion, wait_for_finalization) = wait_params(durability);
        let uids: Vec<u16> = weights.keys().copied().collect();
        let values: Vec<f32> = weights.values().copied().collect();

        self.submit(
            methods::SET_WEIGHTS,
            json!({
                "hotkey": hotkey,
                "netuid": netuid,
                "uids": uids,
                "weights": values,
                "version_key": version_key,
                "wait_for_inclusion": wait_for_inclusion,
                "wait_for_finalization": wait_for_finalization,
            }),
            durability,
        )
        .await
    }

    async fn move_stake(
        &self,
        account: &StakeAccount,
        to_hotkey: &str,
        amount: Balance,
        durability: Durability,
    ) -> Result<Confirmation, ChainError> {
        let (wait_for_inclusion, wait_for_finalization) = wait_params(durability);

        self.submit(
            methods::MOVE_STAKE,
            json!({
                "coldkey": account.coldkey,
                "origin_hotkey": account.hotkey,
                "destination_hotkey": to_hotkey,
                "netuid": account.netuid,
                "amount": amount.rao(),
                "wait_for_inclusion": wait_for_inclusion,
                "wait_for_finalization": wait_for_finalization,
            }),
            durability,
        )
        .await
    }

    async fn transfer_stake(
        &self,
        account: &StakeAccount,
        to_coldkey: &str,
        amount: Balance,
        durability: Durability,
    ) -> Result<Confirmation, ChainError> {
        let (wait_for_inclusion, wait_for_finalization) = wait_params(durability);

        self.submit(
            methods::TRANSFER_STAKE,
            json!({
                "coldkey": account.coldkey,
                "hotkey": account.hotkey,
                "destination_coldkey": to_coldkey,
                "netuid": account.netuid,
                "amount": amount.rao(),
                "wait_for_inclusion": wait_for_inclusion,
                "wait_for_finalization": wait_for_finalization,
            }),
            durability,
        )
        .await
    }
}
