use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, warn};

use epochsweep_api::prelude::*;
use epochsweep_client::{short_address, ChainClient, ChainError, Confirmation, StakeAccount, WeightMap};

use crate::alerts::FailureClass;
use crate::gate::Reservation;
use crate::retry::RetryPolicy;
use crate::utils::Shutdown;

/// Everything needed to submit one action.
#[derive(Clone, Debug, PartialEq)]
pub enum ActionParams {
    SetWeights {
        hotkey: String,
        netuid: u16,
        weights: WeightMap,
        version_key: u64,
    },
    MoveStake {
        account: StakeAccount,
        to_hotkey: String,
    },
    TransferStake {
        account: StakeAccount,
        to_coldkey: String,
    },
}

impl ActionParams {
    pub fn kind(&self) -> ActionKind {
        match self {
            ActionParams::SetWeights { .. } => ActionKind::SetWeights,
            ActionParams::MoveStake { .. } => ActionKind::MoveStake,
            ActionParams::TransferStake { .. } => ActionKind::TransferStake,
        }
    }

    /// Account whose balance is moved, for stake actions.
    pub fn source(&self) -> Option<&StakeAccount> {
        match self {
            ActionParams::SetWeights { .. } => None,
            ActionParams::MoveStake { account, .. } | ActionParams::TransferStake { account, .. } => {
                Some(account)
            }
        }
    }
}

/// State observed by a passing pre-check.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Precheck {
    /// Balance to move, read just before reservation.
    pub balance: Option<Balance>,
}

/// Final record of one reserved slot plus the error that ended it, if any.
#[derive(Clone, Debug, PartialEq)]
pub struct Execution {
    pub record: ActionRecord,
    pub error: Option<ActionError>,
    /// The amount was inferred from a balance drop after a timed-out wait.
    pub assumed_landed: bool,
}

impl Execution {
    pub fn succeeded(&self) -> bool {
        self.record.outcome.is_success()
    }
}

#[derive(Clone, Copy, Debug)]
pub struct ExecutorConfig {
    pub durability: Durability,
    pub confirmation_timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            durability: Durability::default(),
            confirmation_timeout: Duration::from_secs(DEFAULT_CONFIRMATION_TIMEOUT_SECONDS),
            retry: RetryPolicy::default(),
        }
    }
}

/// Submits actions through the chain client and classifies what happened.
/// Chain errors never escape; they become an [`ActionError`] on the
/// returned [`Execution`].
pub struct ActionExecutor {
    chain: Arc<dyn ChainClient>,
    config: ExecutorConfig,
    shutdown: Shutdown,
}

impl ActionExecutor {
    pub fn new(chain: Arc<dyn ChainClient>, config: ExecutorConfig, shutdown: Shutdown) -> Self {
        Self { chain, config, shutdown }
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Safety checks that must pass before a slot is reserved.
    pub async fn precheck(&self, params: &ActionParams) -> Result<Precheck, ActionError> {
        match params {
            ActionParams::SetWeights { hotkey, netuid, .. } => {
                let registered = self
                    .chain
                    .is_registered(hotkey, *netuid)
                    .await
                    .map_err(query_failed)?;
                if !registered {
                    return Err(ActionError::NotRegistered(short_address(hotkey)));
                }

                let permit = self
                    .chain
                    .has_permit(hotkey, *netuid)
                    .await
                    .map_err(query_failed)?;
                if !permit {
                    return Err(ActionError::NoPermit(short_address(hotkey)));
                }

                Ok(Precheck::default())
            }
            ActionParams::MoveStake { account, .. } | ActionParams::TransferStake { account, .. } => {
                let balance = self.chain.get_balance(account).await.map_err(query_failed)?;
                if balance.is_zero() {
                    return Err(ActionError::ZeroBalanceSkip(short_address(&account.hotkey)));
                }
                Ok(Precheck { balance: Some(balance) })
            }
        }
    }

    /// Run the reserved slot to a terminal outcome, retrying within it.
    pub async fn execute(
        &self,
        reservation: &Reservation,
        params: &ActionParams,
        precheck: Precheck,
    ) -> Execution {
        let kind = params.kind();
        let mut record = ActionRecord::pending(kind, reservation.block, reservation.epoch_index);
        let mut amount = precheck.balance;
        let mut attempts: u32 = 0;
        let mut last_error = ActionError::SubmissionFailed("no attempt made".to_string());
        let mut any_timed_out = false;

        loop {
            if attempts > 0 {
                let delay = self.config.retry.delay_after(attempts);
                debug!("{kind}: retrying in {delay:?} (attempt {} of {})", attempts + 1, self.config.retry.max_attempts);
                if !self.shutdown.sleep(delay).await {
                    return self.interrupted(record);
                }

                if let Some(account) = params.source() {
                    match self.chain.get_balance(account).await {
                        Ok(balance) if balance.is_zero() && any_timed_out => {
                            info!(
                                "{kind}: balance of {} is now zero; treating the timed-out submission as landed",
                                short_address(&account.hotkey)
                            );
                            record.amount = amount;
                            record.retry_count = attempts - 1;
                            record.confirm(ActionOutcome::Included, None);
                            return Execution { record, error: None, assumed_landed: true };
                        }
                        Ok(balance) if balance.is_zero() => {
                            warn!("{kind}: balance drained by someone else; giving up on this slot");
                            break;
                        }
                        Ok(balance) => amount = Some(balance),
                        Err(e) => {
                            warn!("{kind}: balance re-read failed: {e}");
                            last_error = query_failed(e);
                            attempts += 1;
                            if !self.config.retry.has_attempts_left(attempts) {
                                break;
                            }
                            continue;
                        }
                    }
                }
            }

            attempts += 1;
            record.retry_count = attempts - 1;
            record.amount = amount.filter(|_| kind.moves_stake());

            match amount {
                Some(value) => info!("{kind}: submitting {value} (attempt {attempts})"),
                None => info!("{kind}: submitting (attempt {attempts})"),
            }

            let submission = tokio::time::timeout(
                self.config.confirmation_timeout,
                self.submit(params, amount),
            );

            match self.shutdown.run_until(submission).await {
                None => return self.interrupted(record),
                Some(Ok(Ok(confirmation))) => {
                    info!(
                        "{kind}: {} at block {} ({})",
                        confirmation.durability.outcome(),
                        confirmation.block,
                        confirmation.tx_hash
                    );
                    record.confirm(confirmation.durability.outcome(), Some(confirmation.block));
                    return Execution { record, error: None, assumed_landed: false };
                }
                Some(Err(_)) | Some(Ok(Err(ChainError::Timeout(_)))) => {
                    warn!("{kind}: confirmation not received within {:?}", self.config.confirmation_timeout);
                    any_timed_out = true;
                    last_error = ActionError::ConfirmationTimeout;
                }
                Some(Ok(Err(e))) => {
                    warn!("{kind}: submission failed: {e}");
                    let message = e.to_string();
                    last_error = ActionError::SubmissionFailed(message.clone());
                    if kind == ActionKind::SetWeights && FailureClass::classify(&message) == FailureClass::Benign {
                        break;
                    }
                }
            }

            if !self.config.retry.has_attempts_left(attempts) {
                break;
            }
        }

        error!("{kind}: giving up after {attempts} attempt(s): {last_error}");
        record.fail();
        Execution { record, error: Some(last_error), assumed_landed: false }
    }

    async fn submit(&self, params: &ActionParams, amount: Option<Balance>) -> Result<Confirmation, ChainError> {
        let durability = self.config.durability;
        let amount = amount.unwrap_or_default();
        match params {
            ActionParams::SetWeights { hotkey, netuid, weights, version_key } => {
                self.chain
                    .set_weights(hotkey, *netuid, weights, *version_key, durability)
                    .await
            }
            ActionParams::MoveStake { account, to_hotkey } => {
                self.chain.move_stake(account, to_hotkey, amount, durability).await
            }
            ActionParams::TransferStake { account, to_coldkey } => {
                self.chain.transfer_stake(account, to_coldkey, amount, durability).await
            }
        }
    }

    fn interrupted(&self, record: ActionRecord) -> Execution {
        warn!("{}: shutdown requested; not waiting for the outcome", record.kind);
        Execution {
            record,
            error: Some(ActionError::Shutdown),
            assumed_landed: false,
        }
    }
}

fn query_failed(e: ChainError) -> ActionError {
    ActionError::QueryFailed(e.to_string())
}
