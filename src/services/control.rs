//! Cooperative cancellation shared by the polling and retry loops.
//!
//! A [`RunControl`] combines a `watch` cancellation flag with an optional
//! deadline. Async code races work against [`RunControl::cancelled`] with
//! `tokio::select!`; blocking code (cookie stores, file walks) checks
//! [`RunControl::is_cancelled`] between attempts and sleeps through
//! [`RunControl::sleep`] so a cancel never waits out a full backoff.

use std::time::{Duration, Instant};
use tokio::sync::watch;

/// Slice length for blocking sleeps that must stay responsive to cancellation.
const SLEEP_SLICE: Duration = Duration::from_millis(25);

/// Sending half: flips the shared flag for every clone of the paired [`RunControl`].
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }
}

#[derive(Debug, Clone)]
pub struct RunControl {
    cancel_rx: watch::Receiver<bool>,
    deadline: Option<Instant>,
}

impl RunControl {
    pub fn new() -> (CancelHandle, Self) {
        let (tx, cancel_rx) = watch::channel(false);
        (
            CancelHandle { tx },
            Self {
                cancel_rx,
                deadline: None,
            },
        )
    }

    /// A control that can only expire through a deadline.
    pub fn never() -> Self {
        let (_handle, control) = Self::new();
        control
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(existing) => existing.min(deadline),
            None => deadline,
        });
        self
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel_rx.borrow() || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Time left before the deadline, if one is set.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// Resolves once the run is cancelled or the deadline passes.
    pub async fn cancelled(&self) {
        let mut rx = self.cancel_rx.clone();
        let flag = async move {
            loop {
                if *rx.borrow_and_update() {
                    return;
                }
                if rx.changed().await.is_err() {
                    // Sender gone: the flag can never flip again.
                    std::future::pending::<()>().await;
                }
            }
        };

        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    _ = flag => {}
                    _ = tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)) => {}
                }
            }
            None => flag.await,
        }
    }

    /// Blocking sleep that wakes early on cancellation.
    ///
    /// Returns `false` if the run was cancelled before the full duration elapsed.
    pub fn sleep(&self, duration: Duration) -> bool {
        let until = Instant::now() + duration;
        loop {
            if self.is_cancelled() {
                return false;
            }
            let now = Instant::now();
            if now >= until {
                return true;
            }
            std::thread::sleep(SLEEP_SLICE.min(until - now));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_never_is_not_cancelled() {
        let control = RunControl::never();
        assert!(!control.is_cancelled());
        assert!(control.remaining().is_none());
        assert!(control.sleep(Duration::from_millis(5)));
    }

    #[test]
    fn test_cancel_handle_reaches_clones() {
        let (handle, control) = RunControl::new();
        let clone = control.clone();
        handle.cancel();
        assert!(control.is_cancelled());
        assert!(clone.is_cancelled());
        assert!(!clone.sleep(Duration::from_secs(5)));
    }

    #[test]
    fn test_expired_deadline_cancels() {
        let control = RunControl::never().with_timeout(Duration::ZERO);
        assert!(control.is_cancelled());
        assert_eq!(control.remaining(), Some(Duration::ZERO));
    }

    #[test]
    fn test_earlier_deadline_wins() {
        let soon = Instant::now() + Duration::from_secs(1);
        let later = soon + Duration::from_secs(60);
        let control = RunControl::never().with_deadline(soon).with_deadline(later);
        assert_eq!(control.deadline(), Some(soon));
    }

    #[tokio::test]
    async fn test_cancelled_resolves_on_signal() {
        let (handle, control) = RunControl::new();
        let waiter = tokio::spawn(async move { control.cancelled().await });
        handle.cancel();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("cancelled() did not resolve")
            .unwrap();
    }

    #[test]
    fn test_cancelled_stays_pending_until_signal() {
        use tokio_test::{assert_pending, assert_ready, task};

        let (handle, control) = RunControl::new();
        let mut waiter = task::spawn(control.cancelled());

        assert_pending!(waiter.poll());
        handle.cancel();
        assert!(waiter.is_woken());
        assert_ready!(waiter.poll());
    }

    #[tokio::test]
    async fn test_cancelled_resolves_on_deadline() {
        let control = RunControl::never().with_timeout(Duration::from_millis(20));
        tokio::time::timeout(Duration::from_secs(1), control.cancelled())
            .await
            .expect("deadline did not fire");
    }
}
