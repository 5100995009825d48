//! Typed broadcast of safe-mode transitions.
//!
//! Independent subsystems (UI, SDUI renderer, video player) subscribe and
//! self-adjust. Signals carry no payload; a subscriber that lags or joins late
//! should ask the manager for the current mode instead of replaying history.

use tokio::sync::broadcast;

use relaunch_types::SafeModeSignal;

const BUS_CAPACITY: usize = 16;

#[derive(Debug, Clone)]
pub struct SafeModeBus {
    sender: broadcast::Sender<SafeModeSignal>,
}

impl SafeModeBus {
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(BUS_CAPACITY);
        Self { sender }
    }

    /// Receivers only see signals published after they subscribed.
    ///
    /// Use `try_recv` from synchronous code or `recv().await` from a runtime.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SafeModeSignal> {
        self.sender.subscribe()
    }

    /// Publish to every current subscriber. Returns how many were reached.
    pub fn publish(&self, signal: SafeModeSignal) -> usize {
        match self.sender.send(signal) {
            Ok(reached) => {
                tracing::debug!(?signal, subscribers = reached, "Published safe mode signal");
                reached
            }
            Err(_) => {
                tracing::debug!(?signal, "No subscribers for safe mode signal");
                0
            }
        }
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for SafeModeBus {
    fn default() -> Self {
        Self::new()
    }
}
