/// Bounded polling waiter that owns a capture-server run end to end:
/// start the server, poll the session until a signature lands or the attempt
/// budget runs out, then stop the server no matter which way it went.
use crate::config::ServerConfig;
use crate::serve::{self, ServeError};
use crate::session::{SessionError, SignatureSession};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Lifecycle states of one acquire run, kept for status reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaiterState {
    Idle,
    Starting,
    Polling,
    Succeeded,
    TimedOut,
    Stopped,
}

/// Errors surfaced by `acquire`.
#[derive(Debug)]
pub enum AcquireError {
    /// The capture server could not be started; fatal to this call, no retry.
    Start(ServeError),
    /// The attempt budget ran out with no signature. Expected outcome, the
    /// server has already been stopped.
    Timeout { attempts: u32, interval: Duration },
}

impl std::fmt::Display for AcquireError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AcquireError::Start(e) => write!(f, "failed to start capture server: {}", e),
            AcquireError::Timeout { attempts, interval } => write!(
                f,
                "no signature received after {} checks over {}s; run the command again and \
                 complete the signing flow in the browser",
                attempts,
                (*interval * *attempts).as_secs_f64()
            ),
        }
    }
}

impl std::error::Error for AcquireError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AcquireError::Start(e) => Some(e),
            AcquireError::Timeout { .. } => None,
        }
    }
}

/// Foreground coordinator for one capture session.
pub struct SignatureWaiter {
    session: Arc<SignatureSession>,
    server: ServerConfig,
    state: Mutex<WaiterState>,
}

impl SignatureWaiter {
    pub fn new(session: Arc<SignatureSession>, server: ServerConfig) -> Self {
        Self {
            session,
            server,
            state: Mutex::new(WaiterState::Idle),
        }
    }

    /// The session this waiter coordinates.
    pub fn session(&self) -> &Arc<SignatureSession> {
        &self.session
    }

    /// Last observed lifecycle state.
    pub fn state(&self) -> WaiterState {
        match self.state.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    fn set_state(&self, state: WaiterState) {
        tracing::debug!(?state, "waiter state");
        match self.state.lock() {
            Ok(mut guard) => *guard = state,
            Err(poisoned) => *poisoned.into_inner() = state,
        }
    }

    /// Start the capture server and wait for a signature.
    ///
    /// Polls the session every `poll_interval`, up to `max_attempts` times.
    /// The server is stopped before this returns, on success and on timeout
    /// alike, so a follow-up `acquire` never sees `AlreadyRunning` left over
    /// from this call.
    pub async fn acquire(
        &self,
        poll_interval: Duration,
        max_attempts: u32,
    ) -> Result<String, AcquireError> {
        // A losing concurrent call must not clobber the winner's state: it
        // restores whatever state it observed before the failed start.
        let prior = self.state();
        self.set_state(WaiterState::Starting);
        if let Err(e) = serve::start(self.session.clone(), &self.server).await {
            self.set_state(prior);
            return Err(AcquireError::Start(e));
        }

        self.set_state(WaiterState::Polling);
        let mut captured = None;
        for attempt in 1..=max_attempts {
            tokio::time::sleep(poll_interval).await;
            if let Some(signature) = self.session.peek() {
                tracing::info!(attempt, "signature captured");
                captured = Some(signature);
                break;
            }
            tracing::debug!(attempt, max_attempts, "no signature yet");
        }

        self.set_state(match captured {
            Some(_) => WaiterState::Succeeded,
            None => WaiterState::TimedOut,
        });

        // Unconditional teardown; a NotRunning here means someone force-stopped
        // the server mid-poll, which is fine.
        if let Err(e) = serve::stop(&self.session).await {
            tracing::warn!("stopping capture server after acquire: {e}");
        }
        self.set_state(WaiterState::Stopped);

        match captured {
            Some(signature) => Ok(signature),
            None => Err(AcquireError::Timeout {
                attempts: max_attempts,
                interval: poll_interval,
            }),
        }
    }

    /// Non-blocking report of whether a signature has arrived. Never echoes
    /// the full signature, only a masked preview.
    pub fn check_status(&self) -> String {
        match self.session.peek() {
            Some(signature) => format!("Signature received: {}", mask(&signature)),
            None => {
                "No signature has been received yet. Complete the signing flow in the browser."
                    .to_string()
            }
        }
    }

    /// Explicit cancellation: stop the capture server if one is running.
    /// Idempotent; stopping an idle waiter is a no-op.
    pub async fn force_stop(&self) {
        match serve::stop(&self.session).await {
            Ok(()) => {
                tracing::info!("capture server force-stopped");
                self.set_state(WaiterState::Stopped);
            }
            Err(SessionError::NotRunning) => {}
            Err(e) => tracing::warn!("force-stop: {e}"),
        }
    }
}

/// First and last ten characters of the signature; short values pass through.
fn mask(signature: &str) -> String {
    let chars: Vec<char> = signature.chars().collect();
    if chars.len() <= 20 {
        return signature.to_string();
    }
    let head: String = chars[..10].iter().collect();
    let tail: String = chars[chars.len() - 10..].iter().collect();
    format!("{head}...{tail}")
}
