//! Lifecycle events and the manager-owned event bus.
//!
//! Subscribers either register a callback (optionally filtered by
//! [`EventKind`]) or take an `mpsc` receiver. Every published event is also
//! logged through `tracing` at `info`.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::mpsc;

use serde::{Deserialize, Serialize};

use crate::model::{
    AgentId, Change, ConflictId, ConflictKind, DocumentPath, LockId, OperationId,
    ResolutionStrategy,
};

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// Why a lock went away.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnlockReason {
    /// The holder released it, or its pass finished.
    Released,
    /// A more urgent operation took it over.
    Preempted,
    /// Its TTL ran out.
    Expired,
}

impl fmt::Display for UnlockReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Released => write!(f, "released"),
            Self::Preempted => write!(f, "preempted"),
            Self::Expired => write!(f, "expired"),
        }
    }
}

/// Discriminant of a [`LifecycleEvent`], used for filtering.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// See [`LifecycleEvent::OperationQueued`].
    OperationQueued,
    /// See [`LifecycleEvent::DocumentLocked`].
    DocumentLocked,
    /// See [`LifecycleEvent::DocumentUnlocked`].
    DocumentUnlocked,
    /// See [`LifecycleEvent::ConflictResolved`].
    ConflictResolved,
    /// See [`LifecycleEvent::ConsolidationComplete`].
    ConsolidationComplete,
}

/// Something that happened to a document.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LifecycleEvent {
    /// An operation joined a document queue.
    OperationQueued {
        /// Target document.
        document: DocumentPath,
        /// The queued operation.
        operation_id: OperationId,
        /// Its agent.
        agent_id: AgentId,
        /// Queue length after insertion.
        queue_len: usize,
        /// When.
        at: u64,
    },
    /// A lock was taken or refreshed.
    DocumentLocked {
        /// Locked document.
        document: DocumentPath,
        /// The lock.
        lock_id: LockId,
        /// Holder.
        agent_id: AgentId,
        /// Operation the lock was taken for.
        operation_id: OperationId,
        /// TTL end.
        expires_at: u64,
        /// When.
        at: u64,
    },
    /// A lock went away.
    DocumentUnlocked {
        /// Unlocked document.
        document: DocumentPath,
        /// The lock.
        lock_id: LockId,
        /// Former holder.
        agent_id: AgentId,
        /// Why.
        reason: UnlockReason,
        /// When.
        at: u64,
    },
    /// A resolution strategy was applied to a conflict.
    ConflictResolved {
        /// Affected document.
        document: DocumentPath,
        /// The conflict.
        conflict_id: ConflictId,
        /// Its kind.
        kind: ConflictKind,
        /// Strategy applied.
        strategy: ResolutionStrategy,
        /// Whether it worked.
        success: bool,
        /// When.
        at: u64,
    },
    /// A consolidation pass finished.
    ConsolidationComplete {
        /// Affected document.
        document: DocumentPath,
        /// Operations that took part.
        operations: Vec<OperationId>,
        /// Whether the pass fully succeeded.
        success: bool,
        /// What the caller must apply.
        final_changes: Vec<Change>,
        /// When.
        at: u64,
    },
}

impl LifecycleEvent {
    /// The event's discriminant.
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::OperationQueued { .. } => EventKind::OperationQueued,
            Self::DocumentLocked { .. } => EventKind::DocumentLocked,
            Self::DocumentUnlocked { .. } => EventKind::DocumentUnlocked,
            Self::ConflictResolved { .. } => EventKind::ConflictResolved,
            Self::ConsolidationComplete { .. } => EventKind::ConsolidationComplete,
        }
    }

    /// The document the event is about.
    #[must_use]
    pub const fn document(&self) -> &DocumentPath {
        match self {
            Self::OperationQueued { document, .. }
            | Self::DocumentLocked { document, .. }
            | Self::DocumentUnlocked { document, .. }
            | Self::ConflictResolved { document, .. }
            | Self::ConsolidationComplete { document, .. } => document,
        }
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Handle returned by a subscription, used to unsubscribe.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Callback invoked for each matching event.
pub type EventCallback = Box<dyn Fn(&LifecycleEvent) + Send + Sync>;

enum Sink {
    Callback(EventCallback),
    Channel(mpsc::Sender<LifecycleEvent>),
}

struct Subscriber {
    id: SubscriptionId,
    kinds: Option<BTreeSet<EventKind>>,
    sink: Sink,
}

impl Subscriber {
    fn wants(&self, kind: EventKind) -> bool {
        self.kinds.as_ref().is_none_or(|k| k.contains(&kind))
    }
}

/// Publish/subscribe hub for lifecycle events.
#[derive(Default)]
pub struct EventBus {
    subscribers: Vec<Subscriber>,
    next_id: u64,
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}

impl EventBus {
    fn register(&mut self, kinds: Option<BTreeSet<EventKind>>, sink: Sink) -> SubscriptionId {
        self.next_id += 1;
        let id = SubscriptionId(self.next_id);
        self.subscribers.push(Subscriber { id, kinds, sink });
        id
    }

    /// Call `f` for every event whose kind is in `kinds`. An empty slice
    /// subscribes to everything.
    pub fn subscribe<F>(&mut self, kinds: &[EventKind], f: F) -> SubscriptionId
    where
        F: Fn(&LifecycleEvent) + Send + Sync + 'static,
    {
        let filter = (!kinds.is_empty()).then(|| kinds.iter().copied().collect());
        self.register(filter, Sink::Callback(Box::new(f)))
    }

    /// Receive matching events on a channel. An empty slice subscribes to
    /// everything. The subscription ends when the receiver is dropped.
    pub fn channel(&mut self, kinds: &[EventKind]) -> mpsc::Receiver<LifecycleEvent> {
        let (tx, rx) = mpsc::channel();
        let filter = (!kinds.is_empty()).then(|| kinds.iter().copied().collect());
        self.register(filter, Sink::Channel(tx));
        rx
    }

    /// Remove a subscription. Returns whether it existed.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|s| s.id != id);
        self.subscribers.len() != before
    }

    /// Number of live subscriptions.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Deliver `event` to every matching subscriber.
    pub fn publish(&mut self, event: &LifecycleEvent) {
        tracing::info!(
            event = ?event.kind(),
            document = %event.document(),
            "lifecycle event"
        );
        let kind = event.kind();
        self.subscribers.retain(|sub| {
            if !sub.wants(kind) {
                return true;
            }
            match &sub.sink {
                Sink::Callback(f) => {
                    f(event);
                    true
                }
                // A closed channel drops its subscription.
                Sink::Channel(tx) => tx.send(event.clone()).is_ok(),
            }
        });
    }
}
