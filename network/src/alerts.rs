use std::fmt;
use std::time::{Duration, Instant};

/// No success for this long always alerts.
pub const ABSOLUTE_SILENCE: Duration = Duration::from_secs(2 * 3600);
/// No success for this long alerts unless the failure is benign and recent.
pub const PROLONGED_SILENCE: Duration = Duration::from_secs(3600);
/// Minimum gap between two non-critical alerts.
pub const ALERT_COOLDOWN: Duration = Duration::from_secs(600);
/// Unknown failures alert once they repeat this many times in a row.
pub const UNKNOWN_FAILURE_STREAK: u32 = 2;

const BENIGN_PATTERNS: &[&str] = &[
    "no attempt made. perhaps it is too soon to commit weights",
    "too soon to commit weights",
    "too soon to commit",
];

const CRITICAL_PATTERNS: &[&str] = &[
    "maximum recursion depth exceeded",
    "invalid transaction",
];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureClass {
    /// Expected rate-limit rejections
    Benign,
    Critical,
    Unknown,
}

impl FailureClass {
    pub fn classify(message: &str) -> Self {
        let lower = message.to_lowercase();
        if BENIGN_PATTERNS.iter().any(|p| lower.contains(p)) {
            FailureClass::Benign
        } else if CRITICAL_PATTERNS.iter().any(|p| lower.contains(p)) {
            FailureClass::Critical
        } else {
            FailureClass::Unknown
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FailureClass::Benign => "benign",
            FailureClass::Critical => "critical",
            FailureClass::Unknown => "unknown",
        }
    }
}

impl fmt::Display for FailureClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What to do after a weight submission failure.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FailureVerdict {
    pub class: FailureClass,
    pub alert: bool,
    pub consecutive_failures: u32,
    pub since_success: Duration,
}

/// Tracks weight submission results and decides which failures are worth a
/// notification.
#[derive(Debug)]
pub struct WeightAlertPolicy {
    consecutive_failures: u32,
    last_success: Instant,
    last_alert: Option<Instant>,
    had_critical: bool,
}

impl WeightAlertPolicy {
    pub fn new(now: Instant) -> Self {
        Self {
            consecutive_failures: 0,
            last_success: now,
            last_alert: None,
            had_critical: false,
        }
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Returns `true` when a recovery notice is due.
    pub fn record_success(&mut self, now: Instant) -> bool {
        let recovered = self.consecutive_failures > 0 && self.had_critical;
        self.consecutive_failures = 0;
        self.last_success = now;
        self.had_critical = false;
        recovered
    }

    pub fn record_failure(&mut self, message: &str, now: Instant) -> FailureVerdict {
        let class = FailureClass::classify(message);
        self.consecutive_failures += 1;
        if class == FailureClass::Critical {
            self.had_critical = true;
        }

        let since_success = now.saturating_duration_since(self.last_success);
        let since_alert = self.last_alert.map(|at| now.saturating_duration_since(at));
        let alert = should_alert(class, self.consecutive_failures, since_success, since_alert);
        if alert {
            self.last_alert = Some(now);
        }

        FailureVerdict {
            class,
            alert,
            consecutive_failures: self.consecutive_failures,
            since_success,
        }
    }
}

fn should_alert(
    class: FailureClass,
    consecutive_failures: u32,
    since_success: Duration,
    since_alert: Option<Duration>,
) -> bool {
    if since_success > ABSOLUTE_SILENCE {
        return true;
    }

    let cooling_down = since_alert.is_some_and(|d| d < ALERT_COOLDOWN);
    if class != FailureClass::Critical && since_success <= PROLONGED_SILENCE && cooling_down {
        return false;
    }

    match class {
        FailureClass::Critical => true,
        _ if since_success > PROLONGED_SILENCE => true,
        FailureClass::Benign => false,
        FailureClass::Unknown => consecutive_failures >= UNKNOWN_FAILURE_STREAK,
    }
}

/// Notification body for a weight failure that passed the policy.
pub fn failure_message(verdict: &FailureVerdict, error: &str, hotkey: &str, netuid: u16) -> String {
    let lower = error.to_lowercase();
    let hours = verdict.since_success.as_secs_f64() / 3600.0;

    if lower.contains("maximum recursion depth exceeded") {
        format!(
            "CRITICAL: weight setting recursion error\nHotkey: {hotkey}\nNetuid: {netuid}\nError: {error}"
        )
    } else if lower.contains("invalid transaction") {
        format!(
            "CRITICAL: chain rejected weight transaction\nHotkey: {hotkey}\nNetuid: {netuid}\nError: {error}"
        )
    } else if verdict.class == FailureClass::Unknown {
        format!(
            "Unknown weight setting failure\nHotkey: {hotkey}\nNetuid: {netuid}\nConsecutive failures: {}\nError: {error}",
            verdict.consecutive_failures
        )
    } else {
        let urgency = if verdict.since_success >= ABSOLUTE_SILENCE { "URGENT" } else { "WARNING" };
        format!(
            "{urgency}: weight setting issues detected\nHotkey: {hotkey}\nNetuid: {netuid}\nNo successful weight setting in {hours:.1} hours\nLast error: {error}"
        )
    }
}

pub fn recovery_message(hotkey: &str, netuid: u16) -> String {
    format!("Weight setting recovered after failures\nHotkey: {hotkey}\nNetuid: {netuid}")
}
