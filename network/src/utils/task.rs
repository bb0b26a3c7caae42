use std::future::Future;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::watch;
use tokio::{signal, task::JoinSet};

/// Raises the shutdown signal seen by every [`Shutdown`] handle.
#[derive(Debug)]
pub struct ShutdownTrigger {
    tx: watch::Sender<bool>,
}

/// Cooperative shutdown signal checked between loop iterations and raced
/// against in-flight confirmation waits.
#[derive(Clone, Debug)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

pub fn shutdown_channel() -> (ShutdownTrigger, Shutdown) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTrigger { tx }, Shutdown { rx })
}

impl ShutdownTrigger {
    pub fn trigger(&self) {
        let _ = self.tx.send(true);
    }

    pub fn subscribe(&self) -> Shutdown {
        Shutdown { rx: self.tx.subscribe() }
    }
}

impl Shutdown {
    /// A handle that never fires.
    pub fn never() -> Self {
        let (_, rx) = watch::channel(false);
        Shutdown { rx }
    }

    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once shutdown has been requested.
    pub async fn wait(&mut self) {
        if self.rx.wait_for(|triggered| *triggered).await.is_err() {
            // Sender dropped without triggering; nothing will ever fire.
            std::future::pending::<()>().await;
        }
    }

    /// Run `fut` unless shutdown fires first.
    pub async fn run_until<F: Future>(&self, fut: F) -> Option<F::Output> {
        let mut this = self.clone();
        tokio::select! {
            biased;
            _ = this.wait() => None,
            out = fut => Some(out),
        }
    }

    /// Sleep for `duration`; returns `false` if shutdown interrupted it.
    pub async fn sleep(&self, duration: Duration) -> bool {
        self.run_until(tokio::time::sleep(duration)).await.is_some()
    }
}

/// Trigger shutdown on Ctrl-C or SIGTERM.
pub fn spawn_signal_listener(trigger: ShutdownTrigger) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        wait_for_signal().await;
        log::info!("shutting down…");
        trigger.trigger();
    })
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal as unix_signal, SignalKind};

    match unix_signal(SignalKind::terminate()) {
        Ok(mut term) => {
            tokio::select! {
                _ = signal::ctrl_c() => {}
                _ = term.recv() => {}
            }
        }
        Err(e) => {
            log::warn!("could not install SIGTERM handler: {e}");
            let _ = signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = signal::ctrl_c().await;
}

/// Wait until shutdown is requested or the first task finishes, then drain.
pub async fn wait_for_shutdown(mut shutdown: Shutdown, mut tasks: JoinSet<Result<()>>) -> Result<()> {
    tokio::select! {
        biased;
        _ = shutdown.wait() => {}

        // or first task that ends with Err/panic
        Some(res) = tasks.join_next() => {
            res??;
        }
    }

    // let loops finish their current iteration and exit on their own.
    while let Some(res) = tasks.join_next().await {
        match res {
            Ok(Err(e)) => log::warn!("task ended with error: {e:?}"),
            Err(e) => log::warn!("task aborted: {e}"),
            Ok(Ok(())) => {}
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn sleep_is_cut_short() {
        let (trigger, shutdown) = shutdown_channel();
        let sleeper = tokio::spawn({
            let shutdown = shutdown.clone();
            async move { shutdown.sleep(Duration::from_secs(3_600)).await }
        });
        tokio::task::yield_now().await;
        trigger.trigger();
        assert!(!sleeper.await.unwrap());
        assert!(shutdown.is_triggered());
    }

    #[tokio::test(start_paused = true)]
    async fn sleep_completes_without_signal() {
        let shutdown = Shutdown::never();
        assert!(shutdown.sleep(Duration::from_secs(30)).await);
        assert!(!shutdown.is_triggered());
    }

    #[tokio::test]
    async fn run_until_returns_output() {
        let (_trigger, shutdown) = shutdown_channel();
        assert_eq!(shutdown.run_until(async { 7 }).await, Some(7));
    }
}
