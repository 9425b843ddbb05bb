//! Error notification
//!
//! Storage errors are always returned to the caller. Listeners registered
//! here additionally receive every reported error, which is how
//! out-of-band observers (metrics, alerting) hook in.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::error::SessionError;

/// Listener called for every reported error
pub type ErrorListener = Arc<dyn Fn(&SessionError) + Send + Sync>;

/// Listener called for the next reported error only
pub type OnceErrorListener = Box<dyn FnOnce(&SessionError) + Send>;

/// Handle for removing a registered listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

enum Listener {
    Every(ErrorListener),
    Once(OnceErrorListener),
}

/// Observer list for storage errors
pub struct ErrorChannel {
    listeners: Mutex<Vec<(ListenerId, Listener)>>,
    next_id: AtomicU64,
}

impl ErrorChannel {
    pub fn new() -> Self {
        Self {
            listeners: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(0),
        }
    }

    fn register(&self, listener: Listener) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.lock().push((id, listener));
        id
    }

    /// Register a listener for every error
    pub fn on(&self, listener: ErrorListener) -> ListenerId {
        self.register(Listener::Every(listener))
    }

    /// Register a listener for the next error
    pub fn once(&self, listener: OnceErrorListener) -> ListenerId {
        self.register(Listener::Once(listener))
    }

    /// Remove a listener. Returns false if it was not registered.
    pub fn remove(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.lock();
        let before = listeners.len();
        listeners.retain(|(registered, _)| *registered != id);
        listeners.len() != before
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }

    /// Notify every listener, returning how many were called.
    ///
    /// Listeners run outside the lock, so they may register or remove
    /// listeners themselves.
    pub fn emit(&self, error: &SessionError) -> usize {
        let mut every = Vec::new();
        let mut once = Vec::new();
        {
            let mut listeners = self.listeners.lock();
            for (id, listener) in std::mem::take(&mut *listeners) {
                match listener {
                    Listener::Every(f) => {
                        every.push(Arc::clone(&f));
                        listeners.push((id, Listener::Every(f)));
                    }
                    Listener::Once(f) => once.push(f),
                }
            }
        }

        let notified = every.len() + once.len();
        for f in every {
            f(error);
        }
        for f in once {
            f(error);
        }
        notified
    }

    /// Report an error and hand it back for the caller to return.
    ///
    /// With no listener registered the error is logged, so it is never
    /// only held by a caller that may drop it.
    pub fn handle(&self, error: SessionError) -> SessionError {
        if self.emit(&error) == 0 {
            tracing::warn!(error = %error, "session store error with no error listener");
        }
        error
    }
}

impl Default for ErrorChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ErrorChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ErrorChannel")
            .field("listeners", &self.listener_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn error() -> SessionError {
        SessionError::Unsupported("length")
    }

    #[test]
    fn test_handle_without_listeners_returns_error() {
        let channel = ErrorChannel::new();
        let returned = channel.handle(error());
        assert!(matches!(returned, SessionError::Unsupported("length")));
    }

    #[test]
    fn test_every_listener_receives_errors() {
        let channel = ErrorChannel::new();
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        channel.on(Arc::new(move |_: &SessionError| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        channel.handle(error());
        channel.handle(error());
        assert_eq!(seen.load(Ordering::SeqCst), 2);
        assert_eq!(channel.listener_count(), 1);
    }

    #[test]
    fn test_once_listener_fires_once() {
        let channel = ErrorChannel::new();
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        channel.once(Box::new(move |e: &SessionError| {
            assert_eq!(e.to_string(), "length not implemented");
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        assert_eq!(channel.emit(&error()), 1);
        assert_eq!(channel.emit(&error()), 0);
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_remove_listener() {
        let channel = ErrorChannel::new();
        let id = channel.on(Arc::new(|_: &SessionError| panic!("removed listener called")));
        assert!(channel.remove(id));
        assert!(!channel.remove(id));
        assert_eq!(channel.emit(&error()), 0);
    }
}
