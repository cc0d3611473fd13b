//! Session event channel
//!
//! Publish/subscribe surface owned by one streaming session. Progress
//! monitors subscribe here to observe per-command confirmations, token state
//! transitions and machine value updates. Unlike a process-wide bus, every
//! session owns its own instance and sessions share nothing.

use crate::machine::{MachineValue, MachineValueId};
use crate::types::Position;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Identifier of one submitted execution token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TokenId(pub Uuid);

impl TokenId {
    /// Create a fresh token id
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TokenId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Token({})", &self.0.to_string()[..8])
    }
}

/// Lifecycle state of an execution token
///
/// Tokens move PENDING -> RUNNING -> {COMPLETED | CANCELLED} and never
/// re-enter PENDING.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenState {
    /// Queued, not yet current
    Pending,
    /// Current token, commands in flight
    Running,
    /// Every command confirmed
    Completed,
    /// Cancelled by stop/clear or a transport failure
    Cancelled,
}

impl TokenState {
    /// True for COMPLETED and CANCELLED
    pub fn is_terminal(&self) -> bool {
        matches!(self, TokenState::Completed | TokenState::Cancelled)
    }
}

/// Category of a session event, used for subscription filtering
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventCategory {
    /// Token lifecycle and per-command progress
    Execution,
    /// Machine value updates
    Machine,
    /// Probe cycle results
    Probe,
}

/// Events published by a streaming session
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// A token changed state
    TokenStateChanged {
        /// The token concerned.
        token: TokenId,
        /// Its new state.
        state: TokenState,
    },
    /// The device confirmed one command of the current token
    CommandConfirmed {
        /// The token the command belongs to.
        token: TokenId,
        /// Zero-based index of the confirmed command within the token.
        index: usize,
        /// Confirmed commands so far.
        confirmed: usize,
        /// Total commands in the token.
        total: usize,
    },
    /// A machine value changed
    MachineValueChanged {
        /// The updated value id.
        id: MachineValueId,
        /// The new value.
        value: MachineValue,
    },
    /// A probe cycle finished
    ProbeFinished {
        /// Whether the probe input triggered before the travel limit.
        triggered: bool,
        /// The position at trigger (or at the limit).
        position: Position,
    },
}

impl SessionEvent {
    /// The category this event belongs to
    pub fn category(&self) -> EventCategory {
        match self {
            SessionEvent::TokenStateChanged { .. } | SessionEvent::CommandConfirmed { .. } => {
                EventCategory::Execution
            }
            SessionEvent::MachineValueChanged { .. } => EventCategory::Machine,
            SessionEvent::ProbeFinished { .. } => EventCategory::Probe,
        }
    }
}

/// Subscription handle for unsubscribing from events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Sub({})", &self.0.to_string()[..8])
    }
}

/// Filter to receive only specific event categories
#[derive(Debug, Clone, Default)]
pub enum EventFilter {
    /// Receive all events.
    #[default]
    All,
    /// Receive events matching any of these categories.
    Categories(Vec<EventCategory>),
}

impl EventFilter {
    /// Check if an event matches this filter
    pub fn matches(&self, event: &SessionEvent) -> bool {
        match self {
            EventFilter::All => true,
            EventFilter::Categories(categories) => categories.contains(&event.category()),
        }
    }
}

type EventHandler = Box<dyn Fn(SessionEvent) + Send + Sync>;

/// Per-session event bus
///
/// Synchronous handlers are called on the publishing thread; async consumers
/// take a broadcast receiver instead.
pub struct SessionEventBus {
    sender: broadcast::Sender<SessionEvent>,
    handlers: RwLock<HashMap<SubscriptionId, (EventFilter, EventHandler)>>,
}

impl SessionEventBus {
    /// Default broadcast channel capacity
    const CHANNEL_CAPACITY: usize = 1024;

    /// Create a new event bus
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(Self::CHANNEL_CAPACITY);
        Self {
            sender,
            handlers: RwLock::new(HashMap::new()),
        }
    }

    /// Publish an event to all subscribers
    pub fn publish(&self, event: SessionEvent) {
        let handlers = self.handlers.read();
        for (_, (filter, handler)) in handlers.iter() {
            if filter.matches(&event) {
                handler(event.clone());
            }
        }
        // Broadcast send only fails when no async receiver exists, which is
        // not an error for the publisher.
        let _ = self.sender.send(event);
    }

    /// Subscribe with a synchronous handler
    ///
    /// The handler runs on the publishing thread and must return quickly.
    pub fn subscribe<F>(&self, filter: EventFilter, handler: F) -> SubscriptionId
    where
        F: Fn(SessionEvent) + Send + Sync + 'static,
    {
        let id = SubscriptionId::new();
        self.handlers.write().insert(id, (filter, Box::new(handler)));
        tracing::debug!("Subscription {} added", id);
        id
    }

    /// Get a receiver for async event consumption
    pub fn receiver(&self) -> broadcast::Receiver<SessionEvent> {
        self.sender.subscribe()
    }

    /// Unsubscribe a synchronous handler
    ///
    /// Returns true if the subscription was found and removed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let removed = self.handlers.write().remove(&id).is_some();
        if removed {
            tracing::debug!("Subscription {} removed", id);
        }
        removed
    }

    /// Number of synchronous subscribers
    pub fn subscriber_count(&self) -> usize {
        self.handlers.read().len()
    }
}

impl Default for SessionEventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SessionEventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionEventBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn probe_event() -> SessionEvent {
        SessionEvent::ProbeFinished {
            triggered: true,
            position: Position::ZERO,
        }
    }

    #[test]
    fn test_subscribe_and_unsubscribe() {
        let bus = SessionEventBus::new();

        let id = bus.subscribe(EventFilter::All, |_| {});
        assert_eq!(bus.subscriber_count(), 1);

        assert!(bus.unsubscribe(id));
        assert_eq!(bus.subscriber_count(), 0);

        // Double unsubscribe should return false
        assert!(!bus.unsubscribe(id));
    }

    #[test]
    fn test_event_delivery() {
        let bus = SessionEventBus::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = counter.clone();

        let _id = bus.subscribe(EventFilter::All, move |_| {
            counter_clone.fetch_add(1, Ordering::SeqCst);
        });

        bus.publish(probe_event());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_event_filtering() {
        let bus = SessionEventBus::new();
        let execution_count = Arc::new(AtomicUsize::new(0));
        let probe_count = Arc::new(AtomicUsize::new(0));

        let ec = execution_count.clone();
        bus.subscribe(
            EventFilter::Categories(vec![EventCategory::Execution]),
            move |_| {
                ec.fetch_add(1, Ordering::SeqCst);
            },
        );

        let pc = probe_count.clone();
        bus.subscribe(
            EventFilter::Categories(vec![EventCategory::Probe]),
            move |_| {
                pc.fetch_add(1, Ordering::SeqCst);
            },
        );

        bus.publish(probe_event());
        bus.publish(SessionEvent::TokenStateChanged {
            token: TokenId::new(),
            state: TokenState::Running,
        });

        assert_eq!(execution_count.load(Ordering::SeqCst), 1);
        assert_eq!(probe_count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_async_receiver() {
        let bus = SessionEventBus::new();
        let mut receiver = bus.receiver();

        bus.publish(probe_event());

        match receiver.try_recv() {
            Ok(SessionEvent::ProbeFinished { triggered, .. }) => assert!(triggered),
            other => panic!("Wrong event received: {:?}", other),
        }
    }

    #[test]
    fn test_token_state_terminal() {
        assert!(!TokenState::Pending.is_terminal());
        assert!(!TokenState::Running.is_terminal());
        assert!(TokenState::Completed.is_terminal());
        assert!(TokenState::Cancelled.is_terminal());
    }
}
