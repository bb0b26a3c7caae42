use std::fmt;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client as HttpClient;
use serde_json::{json, Value};

use crate::chain::short_address;
use super::{Notifier, NotifyError, NotifyEvent, Severity};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeRole {
    Validator,
    Miner,
}

impl fmt::Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeRole::Validator => write!(f, "Validator"),
            NodeRole::Miner => write!(f, "Miner"),
        }
    }
}

/// Posts Slack-compatible attachments to an incoming webhook. Warnings and
/// errors go to the error webhook when one is configured.
pub struct SlackNotifier {
    http: HttpClient,
    webhook_url: String,
    error_webhook_url: Option<String>,
    role: NodeRole,
    hotkey: String,
    hostname: String,
    started_at: Instant,
}

impl SlackNotifier {
    pub fn new(
        webhook_url: String,
        error_webhook_url: Option<String>,
        role: NodeRole,
        hotkey: String,
    ) -> Self {
        let http = HttpClient::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();

        Self {
            http,
            webhook_url,
            error_webhook_url,
            role,
            hotkey,
            hostname: local_hostname(),
            started_at: Instant::now(),
        }
    }

    fn webhook_for(&self, severity: Severity) -> &str {
        match (severity, &self.error_webhook_url) {
            (Severity::Warning | Severity::Error, Some(url)) => url,
            _ => &self.webhook_url,
        }
    }

    pub fn payload(&self, event: &NotifyEvent) -> Value {
        let mut fields = vec![
            json!({
                "title": format!("{} Alert", self.role),
                "value": event.message,
                "short": false,
            }),
            json!({
                "title": format!("Host | {} Hotkey", self.role),
                "value": format!("{} | {}", self.hostname, short_address(&self.hotkey)),
                "short": true,
            }),
            json!({
                "title": "Uptime",
                "value": format_uptime(self.started_at.elapsed()),
                "short": true,
            }),
        ];

        for (key, value) in &event.context {
            fields.push(json!({ "title": key, "value": value, "short": true }));
        }

        json!({
            "attachments": [{
                "color": severity_color(event.severity),
                "fields": fields,
                "footer": format!("epochsweep {} notification", self.role),
                "ts": Utc::now().timestamp(),
            }]
        })
    }
}

#[async_trait]
impl Notifier for SlackNotifier {
    fn name(&self) -> &'static str {
        "slack"
    }

    async fn notify(&self, event: &NotifyEvent) -> Result<(), NotifyError> {
        let response = self
            .http
            .post(self.webhook_for(event.severity))
            .json(&self.payload(event))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(NotifyError::Rejected(format!("webhook returned {status}")));
        }
        Ok(())
    }
}

fn severity_color(severity: Severity) -> &'static str {
    match severity {
        Severity::Error => "#ff0000",
        Severity::Warning => "#ff9900",
        Severity::Success => "#00ff00",
        Severity::Info => "#0099ff",
    }
}

pub fn format_uptime(uptime: Duration) -> String {
    let secs = uptime.as_secs_f64();
    if secs >= 86_400.0 {
        format!("{:.1} days", secs / 86_400.0)
    } else {
        format!("{:.1} hours", secs / 3_600.0)
    }
}

fn local_hostname() -> String {
    std::env::var("HOSTNAME")
        .ok()
        .filter(|h| !h.trim().is_empty())
        .or_else(|| {
            std::fs::read_to_string("/etc/hostname")
                .ok()
                .map(|h| h.trim().to_string())
                .filter(|h| !h.is_empty())
        })
        .unwrap_or_else(|| "unknown-host".to_string())
}
