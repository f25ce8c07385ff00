//! Session lifecycle notifications.
//!
//! The request client never navigates anywhere itself. When a session can no
//! longer be recovered it emits `AuthEvent::AuthenticationLost`, and the front
//! end decides what to do (show a login prompt, exit, ...).

use tokio::sync::broadcast;
use tracing::debug;

/// Buffer size for the event channel.
/// Events are rare; slow subscribers only lose the oldest ones.
const EVENT_CHANNEL_CAPACITY: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthLossReason {
    /// The refresh endpoint rejected the stored refresh token, or could not
    /// be reached.
    RefreshFailed,
    /// No email or refresh token was stored.
    RefreshUnavailable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    LoggedIn { email: String },
    LoggedOut,
    TokenRefreshed,
    AuthenticationLost { reason: AuthLossReason },
}

#[derive(Debug, Clone)]
pub struct AuthEvents {
    sender: broadcast::Sender<AuthEvent>,
}

impl Default for AuthEvents {
    fn default() -> Self {
        let (sender, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { sender }
    }
}

impl AuthEvents {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.sender.subscribe()
    }

    pub fn emit(&self, event: AuthEvent) {
        // Sending only fails when nobody is listening
        if self.sender.send(event.clone()).is_err() {
            debug!(?event, "No subscribers for auth event");
        }
    }
}
