use crate::activity::ActivityTracker;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::{self, JoinHandle};
use tracing::info;

/// One-shot shutdown signal shared by the idle monitor, the signal handler
/// and the HTTP server.
#[derive(Clone)]
pub struct Shutdown {
    tx: watch::Sender<bool>,
    rx: watch::Receiver<bool>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self { tx, rx }
    }

    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    pub async fn wait(&self) {
        let mut rx = self.rx.clone();
        // the sender lives in self, wait_for cannot observe a closed channel here
        let _ = rx.wait_for(|stop| *stop).await;
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Polls the activity timestamp and triggers shutdown once the kernel has been
/// idle for `idle_timeout`.
pub fn spawn_idle_monitor(
    activity: ActivityTracker,
    idle_timeout: Duration,
    check_every: Duration,
    shutdown: Shutdown,
) -> JoinHandle<()> {
    task::spawn(async move {
        info!("idle timeout enabled: {}s", idle_timeout.as_secs());
        let mut ticker = tokio::time::interval(check_every);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let idle = activity.idle_since();
                    if idle >= idle_timeout {
                        info!("idle for {}s, initiating shutdown", idle.as_secs());
                        shutdown.trigger();
                        return;
                    }
                    let remaining = idle_timeout - idle;
                    info!("idle for {}s, shutdown in {}s if no activity", idle.as_secs(), remaining.as_secs());
                }
                _ = shutdown.wait() => return,
            }
        }
    })
}

/// SIGINT / SIGTERM trigger shutdown.
pub fn spawn_signal_listener(shutdown: Shutdown) -> JoinHandle<()> {
    task::spawn(async move {
        tokio::select! {
            _ = termination_signal() => {
                info!("termination signal received, shutting down");
                shutdown.trigger();
            }
            _ = shutdown.wait() => {}
        }
    })
}

#[cfg(unix)]
async fn termination_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = term.recv() => {}
            }
        }
        Err(_) => {
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn termination_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
