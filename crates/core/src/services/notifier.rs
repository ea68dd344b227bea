use tokio::sync::broadcast;

use super::total_service::TotalState;

/// Slow subscribers that fall further behind than this start losing events.
pub const CHANNEL_CAPACITY: usize = 64;

/// State-change notifications for the UI collaborator.
#[derive(Debug, Clone, PartialEq)]
pub enum FinanceEvent {
    /// An account was created, edited or deleted, or its balance moved.
    AccountsChanged,
    TransactionsChanged,
    TotalChanged(TotalState),
}

/// Fan-out of [`FinanceEvent`]s to every current subscriber.
#[derive(Debug, Clone)]
pub struct Notifier {
    sender: broadcast::Sender<FinanceEvent>,
}

impl Notifier {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    /// A receiver for every event published from now on.
    ///
    /// Delivery is only guaranteed while the receiver keeps up. One that
    /// falls more than [`CHANNEL_CAPACITY`] events behind loses the oldest
    /// ones and gets `RecvError::Lagged` (`TryRecvError::Lagged`) once; it
    /// should treat that as "anything may have changed" and reload accounts,
    /// transactions and the total before reading on.
    pub fn subscribe(&self) -> broadcast::Receiver<FinanceEvent> {
        self.sender.subscribe()
    }

    /// Publish an event. Having no subscribers is not an error.
    pub fn publish(&self, event: FinanceEvent) {
        if self.sender.send(event).is_err() {
            tracing::trace!("No subscribers for finance event");
        }
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new()
    }
}
