//! One-shot readiness signal
//!
//! Operations issued before the store is provisioned park on [`Readiness::wait`]
//! and resume once [`Readiness::signal`] fires. The signal fires at most once
//! and never resets. Parked operations resume independently, so their
//! original call order is not preserved.

use tokio::sync::watch;

/// Single-fire readiness flag
#[derive(Debug)]
pub struct Readiness {
    state: watch::Sender<bool>,
}

impl Readiness {
    pub fn new() -> Self {
        let (state, _) = watch::channel(false);
        Self { state }
    }

    pub fn is_ready(&self) -> bool {
        *self.state.borrow()
    }

    /// Mark ready. Returns false if it already was.
    pub fn signal(&self) -> bool {
        self.state.send_if_modified(|ready| {
            if *ready {
                false
            } else {
                *ready = true;
                true
            }
        })
    }

    /// Resolve once ready; immediately if already ready
    pub async fn wait(&self) {
        if self.is_ready() {
            return;
        }
        let mut state = self.state.subscribe();
        // The sender is owned by `self`, so this cannot observe a closed channel
        let _ = state.wait_for(|ready| *ready).await;
    }

    /// Number of callers currently parked in [`wait`](Self::wait)
    pub fn waiting(&self) -> usize {
        self.state.receiver_count()
    }
}

impl Default for Readiness {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio_test::{assert_pending, assert_ready, task};

    #[test]
    fn test_signal_fires_once() {
        let ready = Readiness::new();
        assert!(!ready.is_ready());
        assert!(ready.signal());
        assert!(ready.is_ready());
        assert!(!ready.signal());
        assert!(ready.is_ready());
    }

    #[test]
    fn test_wait_parks_until_signal() {
        let ready = Readiness::new();
        let mut waiter = task::spawn(ready.wait());

        assert_pending!(waiter.poll());
        assert_eq!(ready.waiting(), 1);

        ready.signal();
        assert!(waiter.is_woken());
        assert_ready!(waiter.poll());
    }

    #[test]
    fn test_wait_after_signal_does_not_park() {
        let ready = Readiness::new();
        ready.signal();
        let mut waiter = task::spawn(ready.wait());
        assert_ready!(waiter.poll());
        assert_eq!(ready.waiting(), 0);
    }

    #[tokio::test]
    async fn test_many_waiters_all_resume() {
        let ready = Arc::new(Readiness::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let ready = Arc::clone(&ready);
                tokio::spawn(async move { ready.wait().await })
            })
            .collect();

        tokio::task::yield_now().await;
        ready.signal();
        for handle in handles {
            handle.await.unwrap();
        }
    }
}
