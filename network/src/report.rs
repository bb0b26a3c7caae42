use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, error, info, warn};

use epochsweep_api::prelude::*;
use epochsweep_client::{format_uptime, short_address, EventKind, Notifier, NotifyEvent, Severity};

use crate::alerts::{failure_message, recovery_message, WeightAlertPolicy};
use crate::executor::Execution;
use crate::history::ActionHistory;
use crate::metrics;

const NOTIFY_TIMEOUT: Duration = Duration::from_secs(15);

/// Decides when the periodic activity summary is due, on the tokio clock.
#[derive(Debug)]
pub struct SummarySchedule {
    interval: Option<Duration>,
    next: Option<tokio::time::Instant>,
}

impl SummarySchedule {
    /// A zero or absent interval disables the summary.
    pub fn new(interval: Option<Duration>) -> Self {
        let interval = interval.filter(|i| !i.is_zero());
        Self {
            interval,
            next: interval.map(|i| tokio::time::Instant::now() + i),
        }
    }

    pub fn due(&mut self) -> bool {
        let (Some(interval), Some(next)) = (self.interval, self.next) else {
            return false;
        };
        let now = tokio::time::Instant::now();
        if now < next {
            return false;
        }

        // periods that passed during a long cycle are folded into this one
        let mut following = next + interval;
        while following <= now {
            following += interval;
        }
        self.next = Some(following);
        true
    }
}

/// Terminal sink for every cycle: logs, metrics, in-memory history and
/// notifications. Notification failures are logged and otherwise ignored.
pub struct Reporter {
    notifier: Arc<dyn Notifier>,
    hotkey: String,
    netuid: u16,
    history: ActionHistory,
    weight_alerts: WeightAlertPolicy,
    last_skip: HashMap<ActionKind, &'static str>,
    notify_timeout: Duration,
    started_at: tokio::time::Instant,
    /// History position where the current summary period begins.
    summary_mark: usize,
    period_skips: BTreeMap<&'static str, usize>,
    period_target_changes: usize,
}

impl Reporter {
    pub fn new(notifier: Arc<dyn Notifier>, hotkey: &str, netuid: u16) -> Self {
        Self {
            notifier,
            hotkey: hotkey.to_string(),
            netuid,
            history: ActionHistory::new(),
            weight_alerts: WeightAlertPolicy::new(Instant::now()),
            last_skip: HashMap::new(),
            notify_timeout: NOTIFY_TIMEOUT,
            started_at: tokio::time::Instant::now(),
            summary_mark: 0,
            period_skips: BTreeMap::new(),
            period_target_changes: 0,
        }
    }

    pub fn history(&self) -> &ActionHistory {
        &self.history
    }

    /// Fire-and-forget delivery bounded by a timeout.
    pub async fn send(&self, event: NotifyEvent) {
        match tokio::time::timeout(self.notify_timeout, self.notifier.notify(&event)).await {
            Ok(Ok(())) => debug!("{} notification delivered: {:?}", self.notifier.name(), event.kind),
            Ok(Err(e)) => warn!("{} notification failed: {e}", self.notifier.name()),
            Err(_) => warn!("{} notification timed out", self.notifier.name()),
        }
    }

    fn event(&self, kind: EventKind, severity: Severity, message: impl Into<String>) -> NotifyEvent {
        NotifyEvent::new(kind, severity, message).with("netuid", self.netuid)
    }

    /// A pre-check declined the cycle. Notifies only when the reason changes.
    pub async fn skipped(&mut self, kind: ActionKind, epoch_index: u64, reason: &ActionError) {
        metrics::inc_actions_skipped(kind, reason.label());
        *self.period_skips.entry(reason.label()).or_default() += 1;

        let repeated = self.last_skip.insert(kind, reason.label()) == Some(reason.label());

        match reason {
            ActionError::ZeroBalanceSkip(_) => {
                info!("{kind}: epoch {epoch_index}: {reason}; nothing to do");
            }
            ActionError::QueryFailed(_) => {
                warn!("{kind}: epoch {epoch_index}: {reason}; will retry on next poll");
            }
            ActionError::NotRegistered(_) | ActionError::NoPermit(_) => {
                warn!("{kind}: epoch {epoch_index}: {reason}; skipping");
                if !repeated {
                    let event = self
                        .event(EventKind::ActionSkipped, Severity::Warning, reason.to_string())
                        .with("action", kind);
                    self.send(event).await;
                }
            }
            other => {
                error!("{kind}: unexpected skip reason: {other}");
            }
        }
    }

    pub async fn executed(&mut self, execution: &Execution) {
        let record = &execution.record;
        let kind = record.kind;
        self.last_skip.remove(&kind);
        self.history.push(record.clone());

        metrics::inc_actions_attempted(kind);
        metrics::inc_action_retries(kind, record.retry_count);

        if execution.succeeded() {
            metrics::inc_actions_succeeded(kind);
            if let Some(amount) = record.amount {
                metrics::add_amount_moved(kind, amount);
            }
            self.succeeded(execution).await;
        } else if execution.error == Some(ActionError::Shutdown) {
            info!("{kind}: outcome not awaited due to shutdown (epoch {})", record.epoch_index);
        } else {
            metrics::inc_actions_failed(kind);
            self.failed(execution).await;
        }
    }

    async fn succeeded(&mut self, execution: &Execution) {
        let record = &execution.record;
        match record.kind {
            ActionKind::SetWeights => {
                info!("Weights set (epoch {}, {})", record.epoch_index, record.outcome);
                if self.weight_alerts.record_success(Instant::now()) {
                    let message = recovery_message(&short_address(&self.hotkey), self.netuid);
                    let event = self.event(EventKind::WeightRecovered, Severity::Success, message);
                    self.send(event).await;
                }
            }
            kind => {
                let amount = record.amount.unwrap_or_default();
                let verb = match kind {
                    ActionKind::MoveStake => "Swept",
                    _ => "Transferred",
                };
                let mut message = format!("{verb} {amount} in epoch {}", record.epoch_index);
                if execution.assumed_landed {
                    message.push_str(" (confirmed by balance after a timed-out wait)");
                }
                info!("{kind}: {message}");

                let mut event = self
                    .event(EventKind::ActionSucceeded, Severity::Success, message)
                    .with("action", kind)
                    .with("retries", record.retry_count);
                if let Some(block) = record.confirmed_at_block {
                    event = event.with("block", block);
                }
                self.send(event).await;
            }
        }
    }

    async fn failed(&mut self, execution: &Execution) {
        let record = &execution.record;
        let error = execution
            .error
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_else(|| "unknown error".to_string());

        match record.kind {
            ActionKind::SetWeights => {
                let verdict = self.weight_alerts.record_failure(&error, Instant::now());
                warn!(
                    "Weight setting failed ({} failure, {} in a row): {error}",
                    verdict.class, verdict.consecutive_failures
                );
                if verdict.alert {
                    let message = failure_message(&verdict, &error, &short_address(&self.hotkey), self.netuid);
                    let event = self
                        .event(EventKind::WeightFailure, Severity::Error, message)
                        .with("class", verdict.class);
                    self.send(event).await;
                }
            }
            kind => {
                let message = format!(
                    "{kind} failed in epoch {} after {} attempt(s): {error}",
                    record.epoch_index,
                    record.retry_count + 1
                );
                let event = self
                    .event(EventKind::ActionFailed, Severity::Error, message)
                    .with("action", kind);
                self.send(event).await;
            }
        }
    }

    pub async fn target_changed(&mut self, previous: Option<u16>, current: u16, owner_hotkey: &str) {
        let message = match previous {
            Some(previous) => format!("Weight target changed from uid {previous} to uid {current}"),
            None => format!("Weight target resolved to uid {current}"),
        };
        info!("{message} (owner {})", short_address(owner_hotkey));
        if previous.is_some() {
            self.period_target_changes += 1;
            let event = self
                .event(EventKind::TargetChanged, Severity::Warning, message)
                .with("owner", short_address(owner_hotkey));
            self.send(event).await;
        }
    }

    /// Activity since the previous summary, then starts a new period.
    pub async fn periodic_summary(&mut self, role: &str) {
        let recent = self.history.summary_since(self.summary_mark);
        let rate = recent
            .success_rate()
            .map_or_else(|| "n/a".to_string(), |rate| format!("{rate:.1}%"));
        let message = format!("{role} summary: {recent}");
        info!("{message}");

        let mut event = self
            .event(EventKind::Summary, Severity::Info, message)
            .with("success_rate", rate)
            .with("lifetime", self.history.summary())
            .with("uptime", format_uptime(self.started_at.elapsed()));
        for kind in ActionKind::ALL {
            let succeeded = self.history.succeeded_since(self.summary_mark, kind);
            if succeeded > 0 {
                event = event.with(kind.as_str(), succeeded);
            }
        }
        for (reason, count) in &self.period_skips {
            event = event.with(&format!("skipped_{reason}"), count);
        }
        if self.period_target_changes > 0 {
            event = event.with("target_changes", self.period_target_changes);
        }
        self.send(event).await;

        self.summary_mark = self.history.records().len();
        self.period_skips.clear();
        self.period_target_changes = 0;
    }

    pub async fn startup(&self, message: impl Into<String>) {
        let event = self.event(EventKind::Startup, Severity::Info, message);
        self.send(event).await;
    }

    pub async fn shutdown(&self, message: impl Into<String>) {
        let summary = self.history.summary();
        let event = self
            .event(EventKind::Shutdown, Severity::Warning, message)
            .with("summary", summary);
        self.send(event).await;
    }
}
