use async_trait::async_trait;

use super::{Notifier, NotifyError, NotifyEvent};

/// Used when no webhook is configured.
#[derive(Clone, Debug, Default)]
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    fn name(&self) -> &'static str {
        "noop"
    }

    async fn notify(&self, event: &NotifyEvent) -> Result<(), NotifyError> {
        log::trace!("notification dropped ({}): {}", event.severity, event.message);
        Ok(())
    }
}
