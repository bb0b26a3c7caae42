//! In-memory chain and notifier used by tests.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use epochsweep_api::prelude::*;

use crate::chain::*;
use crate::notify::*;

/// Scripted outcome for the next submission.
#[derive(Clone, Debug, PartialEq)]
pub enum MockFailure {
    Reject(String),
    Transport(String),
    /// Nothing lands and the chain reports a confirmation timeout.
    Timeout,
    /// The extrinsic lands but the confirmation wait still times out.
    LandedButTimedOut,
    /// The call never returns.
    Hang,
}

#[derive(Clone, Debug, PartialEq)]
pub enum MockCall {
    SetWeights {
        hotkey: String,
        netuid: u16,
        weights: WeightMap,
        version_key: u64,
        durability: Durability,
    },
    MoveStake {
        coldkey: String,
        from_hotkey: String,
        to_hotkey: String,
        amount: Balance,
    },
    TransferStake {
        coldkey: String,
        hotkey: String,
        to_coldkey: String,
        amount: Balance,
    },
}

impl MockCall {
    pub fn kind(&self) -> ActionKind {
        match self {
            MockCall::SetWeights { .. } => ActionKind::SetWeights,
            MockCall::MoveStake { .. } => ActionKind::MoveStake,
            MockCall::TransferStake { .. } => ActionKind::TransferStake,
        }
    }
}

#[derive(Default)]
struct MockState {
    block: u64,
    failing_block_reads: u32,
    failing_boundary_reads: u32,
    next_epoch_start: Option<u64>,
    tempo: u64,
    registered: HashSet<String>,
    permits: HashSet<String>,
    balances: HashMap<(String, String), Balance>,
    owner_hotkey: String,
    uids: HashMap<String, u16>,
    version_key: u64,
    submission_failures: VecDeque<MockFailure>,
    calls: Vec<MockCall>,
}

#[derive(Default)]
pub struct MockChain {
    state: Mutex<MockState>,
}

impl MockChain {
    pub fn new(block: u64, tempo: u64) -> Self {
        let chain = Self::default();
        {
            let mut state = chain.state.lock().unwrap();
            state.block = block;
            state.tempo = tempo;
        }
        chain
    }

    pub fn block(&self) -> u64 {
        self.state.lock().unwrap().block
    }

    pub fn set_block(&self, block: u64) {
        self.state.lock().unwrap().block = block;
    }

    pub fn advance_blocks(&self, blocks: u64) {
        self.state.lock().unwrap().block += blocks;
    }

    pub fn fail_block_reads(&self, count: u32) {
        self.state.lock().unwrap().failing_block_reads = count;
    }

    pub fn fail_boundary_reads(&self, count: u32) {
        self.state.lock().unwrap().failing_boundary_reads = count;
    }

    pub fn set_next_epoch_start(&self, block: Option<u64>) {
        self.state.lock().unwrap().next_epoch_start = block;
    }

    pub fn register(&self, hotkey: &str) {
        self.state.lock().unwrap().registered.insert(hotkey.to_string());
    }

    pub fn deregister(&self, hotkey: &str) {
        self.state.lock().unwrap().registered.remove(hotkey);
    }

    pub fn grant_permit(&self, hotkey: &str) {
        self.state.lock().unwrap().permits.insert(hotkey.to_string());
    }

    pub fn revoke_permit(&self, hotkey: &str) {
        self.state.lock().unwrap().permits.remove(hotkey);
    }

    pub fn set_balance(&self, coldkey: &str, hotkey: &str, balance: Balance) {
        self.state
            .lock()
            .unwrap()
            .balances
            .insert((coldkey.to_string(), hotkey.to_string()), balance);
    }

    pub fn balance(&self, coldkey: &str, hotkey: &str) -> Balance {
        self.state
            .lock()
            .unwrap()
            .balances
            .get(&(coldkey.to_string(), hotkey.to_string()))
            .copied()
            .unwrap_or_default()
    }

    pub fn set_subnet_owner(&self, hotkey: &str, uid: u16) {
        let mut state = self.state.lock().unwrap();
        state.owner_hotkey = hotkey.to_string();
        state.uids.insert(hotkey.to_string(), uid);
    }

    pub fn set_version_key(&self, version_key: u64) {
        self.state.lock().unwrap().version_key = version_key;
    }

    pub fn fail_next_submissions(&self, failures: impl IntoIterator<Item = MockFailure>) {
        self.state.lock().unwrap().submission_failures.extend(failures);
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn calls_of(&self, kind: ActionKind) -> usize {
        self.calls().iter().filter(|c| c.kind() == kind).count()
    }

    fn apply(state: &mut MockState, call: &MockCall) -> Result<(), ChainError> {
        match call {
            MockCall::SetWeights { .. } => Ok(()),
            MockCall::MoveStake { coldkey, from_hotkey, to_hotkey, amount } => {
                Self::debit(state, coldkey, from_hotkey, *amount)?;
                Self::credit(state, coldkey, to_hotkey, *amount);
                Ok(())
            }
            MockCall::TransferStake { coldkey, hotkey, to_coldkey, amount } => {
                Self::debit(state, coldkey, hotkey, *amount)?;
                Self::credit(state, to_coldkey, hotkey, *amount);
                Ok(())
            }
        }
    }

    fn debit(state: &mut MockState, coldkey: &str, hotkey: &str, amount: Balance) -> Result<(), ChainError> {
        let entry = state
            .balances
            .entry((coldkey.to_string(), hotkey.to_string()))
            .or_default();
        if *entry < amount {
            return Err(ChainError::Rejected("Not enough stake to withdraw".to_string()));
        }
        *entry = entry.saturating_sub(amount);
        Ok(())
    }

    fn credit(state: &mut MockState, coldkey: &str, hotkey: &str, amount: Balance) {
        let entry = state
            .balances
            .entry((coldkey.to_string(), hotkey.to_string()))
            .or_default();
        *entry = entry.saturating_add(amount);
    }

    async fn submit(&self, call: MockCall, durability: Durability) -> Result<Confirmation, ChainError> {
        let (failure, result) = {
            let mut state = self.state.lock().unwrap();
            state.calls.push(call.clone());
            let failure = state.submission_failures.pop_front();
            let result = match failure {
                None | Some(MockFailure::LandedButTimedOut) => Self::apply(&mut state, &call),
                _ => Ok(()),
            };
            (failure, result.map(|_| state.block + 1))
        };

        match failure {
            None => result.map(|block| Confirmation {
                block,
                durability,
                tx_hash: format!("0x{block:x}"),
            }),
            Some(MockFailure::Reject(message)) => Err(ChainError::Rejected(message)),
            Some(MockFailure::Transport(message)) => Err(ChainError::Transport(message)),
            Some(MockFailure::Timeout) | Some(MockFailure::LandedButTimedOut) => {
                Err(ChainError::Timeout(durability))
            }
            Some(MockFailure::Hang) => std::future::pending().await,
        }
    }
}

#[async_trait]
impl ChainClient for MockChain {
    fn endpoint(&self) -> String {
        "mock://chain".to_string()
    }

    async fn get_current_block(&self) -> Result<u64, ChainError> {
        let mut state = self.state.lock().unwrap();
        if state.failing_block_reads > 0 {
            state.failing_block_reads -= 1;
            return Err(ChainError::Transport("connection refused".to_string()));
        }
        Ok(state.block)
    }

    async fn get_next_epoch_start(&self, _netuid: u16) -> Result<Option<u64>, ChainError> {
        let mut state = self.state.lock().unwrap();
        if state.failing_boundary_reads > 0 {
            state.failing_boundary_reads -= 1;
            return Err(ChainError::Transport("connection reset".to_string()));
        }
        Ok(state.next_epoch_start)
    }

    async fn get_tempo(&self, _netuid: u16) -> Result<u64, ChainError> {
        Ok(self.state.lock().unwrap().tempo)
    }

    async fn is_registered(&self, hotkey: &str, _netuid: u16) -> Result<bool, ChainError> {
        Ok(self.state.lock().unwrap().registered.contains(hotkey))
    }

    async fn has_permit(&self, hotkey: &str, _netuid: u16) -> Result<bool, ChainError> {
        Ok(self.state.lock().unwrap().permits.contains(hotkey))
    }

    async fn get_balance(&self, account: &StakeAccount) -> Result<Balance, ChainError> {
        Ok(self.balance(&account.coldkey, &account.hotkey))
    }

    async fn get_subnet_owner_hotkey(&self, _netuid: u16) -> Result<String, ChainError> {
        Ok(self.state.lock().unwrap().owner_hotkey.clone())
    }

    async fn get_uid_for_hotkey(&self, hotkey: &str, _netuid: u16) -> Result<Option<u16>, ChainError> {
        Ok(self.state.lock().unwrap().uids.get(hotkey).copied())
    }

    async fn get_weights_version_key(&self, _netuid: u16) -> Result<u64, ChainError> {
        Ok(self.state.lock().unwrap().version_key)
    }

    async fn set_weights(
        &self,
        hotkey: &str,
        netuid: u16,
        weights: &WeightMap,
        version_key: u64,
        durability: Durability,
    ) -> Result<Confirmation, ChainError> {
        let call = MockCall::SetWeights {
            hotkey: hotkey.to_string(),
            netuid,
            weights: weights.clone(),
            version_key,
            durability,
        };
        self.submit(call, durability).await
    }

    async fn move_stake(
        &self,
        account: &StakeAccount,
        to_hotkey: &str,
        amount: Balance,
        durability: Durability,
    ) -> Result<Confirmation, ChainError> {
        let call = MockCall::MoveStake {
            coldkey: account.coldkey.clone(),
            from_hotkey: account.hotkey.clone(),
            to_hotkey: to_hotkey.to_string(),
            amount,
        };
        self.submit(call, durability).await
    }

    async fn transfer_stake(
        &self,
        account: &StakeAccount,
        to_coldkey: &str,
        amount: Balance,
        durability: Durability,
    ) -> Result<Confirmation, ChainError> {
        let call = MockCall::TransferStake {
            coldkey: account.coldkey.clone(),
            hotkey: account.hotkey.clone(),
            to_coldkey: to_coldkey.to_string(),
            amount,
        };
        self.submit(call, durability).await
    }
}

/// Stores delivered notifications in memory; can be told to fail.
#[derive(Clone, Default)]
pub struct RecordingNotifier {
    events: Arc<Mutex<Vec<NotifyEvent>>>,
    failing: Arc<Mutex<bool>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        let notifier = Self::default();
        *notifier.failing.lock().unwrap() = true;
        notifier
    }

    pub fn events(&self) -> Vec<NotifyEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn count_of(&self, kind: EventKind) -> usize {
        self.events().iter().filter(|e| e.kind == kind).count()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn notify(&self, event: &NotifyEvent) -> Result<(), NotifyError> {
        self.events.lock().unwrap().push(event.clone());
        if *self.failing.lock().unwrap() {
            return Err(NotifyError::Rejected("webhook unavailable".to_string()));
        }
        Ok(())
    }
}
