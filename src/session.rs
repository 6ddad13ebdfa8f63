/// Single-slot signature session shared between the capture server's HTTP
/// handlers and the foreground waiter.
///
/// Holds at most one pending signature and at most one running server handle.
/// All access goes through one mutex, so a `submit` from a handler task is
/// visible to the next `peek`/`take` on the waiter side.
use crate::serve::ServerHandle;
use std::sync::{Mutex, MutexGuard};

/// Errors for session lifecycle operations.
#[derive(Debug, PartialEq, Eq)]
pub enum SessionError {
    /// A capture server is already running; only one session may be active.
    AlreadyRunning,
    /// Stop was requested but no capture server is running.
    NotRunning,
}

impl std::fmt::Display for SessionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionError::AlreadyRunning => {
                write!(f, "a signature capture session is already running")
            }
            SessionError::NotRunning => {
                write!(f, "no signature capture session is running")
            }
        }
    }
}

impl std::error::Error for SessionError {}

#[derive(Default)]
struct Slot {
    signature: Option<String>,
    server: Option<ServerHandle>,
}

/// Process-wide single-slot store for one capture attempt.
pub struct SignatureSession {
    slot: Mutex<Slot>,
}

impl SignatureSession {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(Slot::default()),
        }
    }

    fn slot(&self) -> MutexGuard<'_, Slot> {
        match self.slot.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Register a running server handle. Fails if a server is already
    /// registered; on failure the handle is dropped, which tears the new
    /// listener down through its shutdown channel.
    pub fn start(&self, handle: ServerHandle) -> Result<(), SessionError> {
        let mut slot = self.slot();
        if slot.server.is_some() {
            return Err(SessionError::AlreadyRunning);
        }
        slot.server = Some(handle);
        Ok(())
    }

    /// Whether a capture server is currently registered.
    pub fn is_running(&self) -> bool {
        self.slot().server.is_some()
    }

    /// Store a received signature. Last write wins: a session captures one
    /// signature per run, and a resubmission before consumption replaces the
    /// earlier value.
    pub fn submit(&self, signature: String) {
        let mut slot = self.slot();
        if slot.signature.is_some() {
            tracing::warn!("replacing previously submitted signature");
        }
        slot.signature = Some(signature);
    }

    /// Non-destructive read of the stored signature.
    pub fn peek(&self) -> Option<String> {
        self.slot().signature.clone()
    }

    /// Destructive read: returns the stored signature and clears the slot so
    /// it cannot be consumed twice.
    pub fn take(&self) -> Option<String> {
        self.slot().signature.take()
    }

    /// Release the server handle, handing it back to the caller for
    /// shutdown. Fails if no server is registered.
    pub fn stop(&self) -> Result<ServerHandle, SessionError> {
        self.slot().server.take().ok_or(SessionError::NotRunning)
    }
}

impl Default for SignatureSession {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dummy_handle() -> ServerHandle {
        let (tx, _rx) = tokio::sync::oneshot::channel();
        ServerHandle::new(tx, tokio::spawn(async {}))
    }

    #[test]
    fn test_submit_last_write_wins() {
        let session = SignatureSession::new();
        session.submit("0xfirst".to_string());
        session.submit("0xsecond".to_string());
        assert_eq!(session.take().as_deref(), Some("0xsecond"));
    }

    #[test]
    fn test_take_clears_slot() {
        let session = SignatureSession::new();
        session.submit("0xabc".to_string());
        assert_eq!(session.take().as_deref(), Some("0xabc"));
        assert_eq!(session.take(), None);
    }

    #[test]
    fn test_peek_is_non_destructive() {
        let session = SignatureSession::new();
        session.submit("0xabc".to_string());
        assert_eq!(session.peek().as_deref(), Some("0xabc"));
        assert_eq!(session.peek().as_deref(), Some("0xabc"));
        assert_eq!(session.take().as_deref(), Some("0xabc"));
    }

    #[test]
    fn test_peek_empty_session() {
        let session = SignatureSession::new();
        assert_eq!(session.peek(), None);
    }

    #[tokio::test]
    async fn test_start_twice_is_already_running() {
        let session = SignatureSession::new();
        session.start(dummy_handle()).unwrap();
        assert_eq!(
            session.start(dummy_handle()).unwrap_err(),
            SessionError::AlreadyRunning
        );
        assert!(session.is_running());
    }

    #[tokio::test]
    async fn test_stop_without_start_is_not_running() {
        let session = SignatureSession::new();
        assert_eq!(session.stop().unwrap_err(), SessionError::NotRunning);
    }

    #[tokio::test]
    async fn test_stop_releases_the_slot() {
        let session = SignatureSession::new();
        session.start(dummy_handle()).unwrap();
        assert!(session.is_running());

        let handle = session.stop().unwrap();
        handle.shutdown().await;
        assert!(!session.is_running());

        // A fresh start is accepted again
        session.start(dummy_handle()).unwrap();
    }

    #[test]
    fn test_signature_survives_server_stop() {
        let session = SignatureSession::new();
        session.submit("0xabc".to_string());
        assert_eq!(session.stop().unwrap_err(), SessionError::NotRunning);
        assert_eq!(session.peek().as_deref(), Some("0xabc"));
    }
}
