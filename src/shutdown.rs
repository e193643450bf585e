// SPDX-FileCopyrightText: 2025 Robin Vobruba <hoijui.quaero@gmail.com>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

use std::{future::Future, io};
use tokio::sync::watch;

/// Requests the crawl to stop (e.g. on Ctrl-C).
#[derive(Debug)]
pub struct ShutdownTrigger {
    tx: watch::Sender<bool>,
}

impl ShutdownTrigger {
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }
}

/// Observes whether a stop was requested.
///
/// Cheap to clone; every clone observes the same trigger.
#[derive(Debug, Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

impl Shutdown {
    /// A shutdown that will never be requested.
    #[must_use]
    pub fn never() -> Self {
        channel().1
    }

    #[must_use]
    pub fn is_requested(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once a stop was requested.
    /// Never resolves if the trigger was dropped without firing.
    pub async fn requested(&self) {
        let mut rx = self.rx.clone();
        let trigger_dropped = rx.wait_for(|stop| *stop).await.is_err();
        if trigger_dropped {
            std::future::pending::<()>().await;
        }
    }
}

#[must_use]
pub fn channel() -> (ShutdownTrigger, Shutdown) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTrigger { tx }, Shutdown { rx })
}

/// Requests a graceful stop on the first signal,
/// and returns once a second signal arrives,
/// after which the caller should exit right away.
///
/// `next_signal` is called once per awaited signal (e.g. `tokio::signal::ctrl_c`).
///
/// # Errors
///
/// If listening for a signal fails.
pub async fn escalate_on_signals<F, Fut>(
    trigger: &ShutdownTrigger,
    mut next_signal: F,
) -> io::Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = io::Result<()>>,
{
    next_signal().await?;
    tracing::warn!("Stop requested; letting running downloads finish (stop again to exit now) ...");
    trigger.trigger();
    next_signal().await?;
    tracing::error!("Second stop request; exiting without waiting for downloads");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{cell::Cell, time::Duration};

    #[tokio::test]
    async fn trigger_is_observed_by_clones() {
        let (trigger, shutdown) = channel();
        let other = shutdown.clone();
        assert!(!other.is_requested());
        trigger.trigger();
        assert!(other.is_requested());
        tokio::time::timeout(Duration::from_secs(1), shutdown.requested())
            .await
            .expect("shutdown should resolve after trigger");
    }

    #[tokio::test]
    async fn never_does_not_resolve() {
        let shutdown = Shutdown::never();
        assert!(!shutdown.is_requested());
        let waited = tokio::time::timeout(Duration::from_millis(50), shutdown.requested()).await;
        assert!(waited.is_err());
    }

    #[tokio::test]
    async fn second_signal_escalates() {
        let (trigger, shutdown) = channel();
        let (first_tx, first_rx) = tokio::sync::oneshot::channel::<()>();
        let (second_tx, second_rx) = tokio::sync::oneshot::channel::<()>();
        // popped from the back
        let mut pending = vec![second_rx, first_rx];

        let watcher = escalate_on_signals(&trigger, || {
            let next = pending.pop();
            async move {
                match next {
                    Some(rx) => rx.await.map_err(io::Error::other),
                    None => Err(io::Error::other("no more signals")),
                }
            }
        });
        tokio::pin!(watcher);

        first_tx.send(()).unwrap();
        let early = tokio::time::timeout(Duration::from_millis(50), &mut watcher).await;
        assert!(early.is_err(), "one signal must not escalate");
        assert!(shutdown.is_requested());

        second_tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(1), &mut watcher)
            .await
            .expect("second signal should end the watcher")
            .unwrap();
    }

    #[tokio::test]
    async fn failing_listener_does_not_trigger() {
        let (trigger, shutdown) = channel();
        let calls = Cell::new(0);

        let res = escalate_on_signals(&trigger, || {
            calls.set(calls.get() + 1);
            async { Err(io::Error::other("no signal support")) }
        })
        .await;

        assert!(res.is_err());
        assert_eq!(calls.get(), 1);
        assert!(!shutdown.is_requested());
    }
}
