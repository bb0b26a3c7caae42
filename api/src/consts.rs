// ====================================================================
// Token Units
// ====================================================================
/// Number of decimal places of the chain's native unit
pub const UNIT_DECIMALS: u32 = 9;
/// Smallest on-chain unit (rao) per whole unit = 10^UNIT_DECIMALS
pub const RAO_PER_UNIT: u64 = 10u64.pow(UNIT_DECIMALS);

// ====================================================================
// Time & Epoch Constants
// ====================================================================
/// Target block time in seconds
pub const BLOCK_TIME_SECONDS: u64 = 12;
/// Blocks per epoch on most subnets
pub const DEFAULT_TEMPO: u64 = 360;
/// Minimum blocks between weight submissions (two epochs)
pub const DEFAULT_SET_WEIGHTS_INTERVAL: u64 = 2 * DEFAULT_TEMPO;

// ====================================================================
// Loop Defaults
// ====================================================================
/// Subnet the processes operate on when none is configured
pub const DEFAULT_NETUID: u16 = 35;
/// Seconds between block height polls
pub const DEFAULT_POLL_INTERVAL_SECONDS: u64 = 30;
/// Submission attempts per reserved slot
pub const DEFAULT_RETRY_BOUND: u32 = 3;
/// First backoff delay between attempts
pub const DEFAULT_BACKOFF_BASE_MS: u64 = 2_000;
/// Upper bound on a single backoff delay
pub const DEFAULT_BACKOFF_CAP_MS: u64 = 30_000;
/// Upper bound on a single confirmation wait
pub const DEFAULT_CONFIRMATION_TIMEOUT_SECONDS: u64 = 120;
/// Upper bound on a single read-only chain query
pub const DEFAULT_REQUEST_TIMEOUT_SECONDS: u64 = 20;
/// How often the activity summary is sent (daily)
pub const DEFAULT_SUMMARY_INTERVAL_SECONDS: u64 = 24 * 3600;
/// How often the auto-resolved weight target and version key are refreshed (6 hours)
pub const DEFAULT_TARGET_REFRESH_SECONDS: u64 = 6 * 3600;

// ====================================================================
// Metrics
// ====================================================================
pub const VALIDATOR_METRICS_PORT: u16 = 8876;
pub const MINER_METRICS_PORT: u16 = 8877;

// ====================================================================
// Miscellaneous
// ====================================================================
/// Length of an SS58-encoded account address
pub const SS58_ADDRESS_LEN: usize = 48;
/// Number of trailing address characters shown in notifications
pub const SHORT_ADDRESS_LEN: usize = 8;
