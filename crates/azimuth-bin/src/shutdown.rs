// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Process shutdown.
//!
//! SIGTERM, SIGINT and SIGQUIT (Ctrl+C off Unix) and a call to
//! [`ShutdownCoordinator::initiate_shutdown`] all flip the same latch.
//! Anything holding a [`ShutdownSignal`] wakes up once, even if it started
//! waiting after the latch flipped.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::info;

// =============================================================================
// ShutdownCoordinator
// =============================================================================

/// Shutdown latch shared by the runtime and its tasks.
///
/// ```ignore
/// let coordinator = ShutdownCoordinator::new();
/// tokio::spawn(server.run(coordinator.shutdown_signal().wait()));
/// coordinator.wait_for_shutdown().await;
/// ```
#[derive(Clone)]
pub struct ShutdownCoordinator {
    latch: Arc<watch::Sender<bool>>,
}

impl ShutdownCoordinator {
    /// Creates an unlatched coordinator.
    pub fn new() -> Self {
        let (latch, _) = watch::channel(false);
        Self {
            latch: Arc::new(latch),
        }
    }

    /// A future-producing handle for one task.
    pub fn shutdown_signal(&self) -> ShutdownSignal {
        ShutdownSignal {
            receiver: self.latch.subscribe(),
        }
    }

    /// Flips the latch. Later calls do nothing.
    pub fn initiate_shutdown(&self) {
        let flipped = self.latch.send_if_modified(|down| !std::mem::replace(down, true));
        if flipped {
            info!("Shutdown initiated");
        }
    }

    /// `true` once the latch has flipped.
    pub fn is_shutdown_initiated(&self) -> bool {
        *self.latch.borrow()
    }

    /// Returns when an OS signal arrives or the latch flips some other way.
    pub async fn wait_for_shutdown(&self) {
        let manual = self.shutdown_signal();
        if manual.is_triggered() {
            return;
        }

        tokio::select! {
            name = os_signal() => info!(signal = name, "Signal received"),
            _ = manual.wait() => return,
        }
        self.initiate_shutdown();
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(unix)]
async fn os_signal() -> &'static str {
    use tokio::signal::unix::{signal, SignalKind};

    let mut term = signal(SignalKind::terminate()).expect("SIGTERM handler");
    let mut int = signal(SignalKind::interrupt()).expect("SIGINT handler");
    let mut quit = signal(SignalKind::quit()).expect("SIGQUIT handler");

    tokio::select! {
        _ = term.recv() => "SIGTERM",
        _ = int.recv() => "SIGINT",
        _ = quit.recv() => "SIGQUIT",
    }
}

#[cfg(not(unix))]
async fn os_signal() -> &'static str {
    tokio::signal::ctrl_c().await.expect("Ctrl+C handler");
    "Ctrl+C"
}

// =============================================================================
// ShutdownSignal
// =============================================================================

/// One task's view of the latch.
pub struct ShutdownSignal {
    receiver: watch::Receiver<bool>,
}

impl ShutdownSignal {
    /// Resolves once the latch has flipped.
    pub async fn wait(mut self) {
        // An error means every coordinator is gone; nothing can flip it any more.
        let _ = self.receiver.wait_for(|down| *down).await;
    }

    /// `true` if the latch has already flipped.
    pub fn is_triggered(&self) -> bool {
        *self.receiver.borrow()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_initiate_flips_once() {
        let coordinator = ShutdownCoordinator::new();
        let signal = coordinator.shutdown_signal();
        assert!(!coordinator.is_shutdown_initiated());

        coordinator.initiate_shutdown();
        coordinator.initiate_shutdown();

        assert!(coordinator.is_shutdown_initiated());
        assert!(signal.is_triggered());
    }

    #[tokio::test]
    async fn test_signal_resolves_later() {
        let coordinator = ShutdownCoordinator::new();
        let signal = coordinator.shutdown_signal();

        let trigger = coordinator.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            trigger.initiate_shutdown();
        });

        tokio::time::timeout(Duration::from_secs(1), signal.wait())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_signal_taken_after_shutdown() {
        let coordinator = ShutdownCoordinator::new();
        coordinator.initiate_shutdown();

        let signal = coordinator.shutdown_signal();
        assert!(signal.is_triggered());
        tokio::time::timeout(Duration::from_millis(100), signal.wait())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_wait_for_shutdown_returns_on_manual_trigger() {
        let coordinator = ShutdownCoordinator::new();

        let trigger = coordinator.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            trigger.initiate_shutdown();
        });

        tokio::time::timeout(Duration::from_secs(1), coordinator.wait_for_shutdown())
            .await
            .unwrap();
    }
}
