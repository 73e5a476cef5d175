//! In-process domain event bus for Vigil.
//!
//! A single hub with a bounded replay history and filterable subscriptions.
//! Delivery is synchronous and in publish order; a failing handler is logged
//! and never prevents delivery to the remaining subscribers. There is no
//! durability — history dies with the process.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use uuid::Uuid;

use vigil_core::event::{Aggregate, DomainEvent, EventFilter};


/// Default bound on the replay history.
pub const DEFAULT_HISTORY_CAPACITY: usize = 1000;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Callback invoked for each matching event. Failures are values: the bus
/// logs them and moves on.
pub type EventHandler =
  Arc<dyn Fn(&DomainEvent) -> Result<(), BoxError> + Send + Sync>;

/// Opaque handle returned by [`EventBus::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(Uuid);

/// Per-subscription delivery counters, exposed for debugging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionStats {
  pub id:         SubscriptionId,
  /// Number of events this subscription has been handed so far.
  pub deliveries: u64,
}

// ─── Bus ─────────────────────────────────────────────────────────────────────

struct Subscription {
  id:         SubscriptionId,
  filter:     Option<EventFilter>,
  handler:    EventHandler,
  deliveries: u64,
}

struct BusState {
  history:       VecDeque<DomainEvent>,
  subscriptions: Vec<Subscription>,
}

/// The event hub. Cheap to share: wrap in an [`Arc`] and clone the handle.
pub struct EventBus {
  capacity: usize,
  state:    Mutex<BusState>,
}

impl Default for EventBus {
  fn default() -> Self {
    Self::new(DEFAULT_HISTORY_CAPACITY)
  }
}

impl EventBus {
  /// Create a bus whose replay history holds at most `capacity` events;
  /// the oldest are evicted beyond that.
  pub fn new(capacity: usize) -> Self {
    Self {
      capacity,
      state: Mutex::new(BusState {
        history:       VecDeque::with_capacity(capacity.min(256)),
        subscriptions: Vec::new(),
      }),
    }
  }

  fn state(&self) -> std::sync::MutexGuard<'_, BusState> {
    // A poisoned lock means a panic while appending to plain collections;
    // the state is still structurally sound, so keep going.
    self.state.lock().unwrap_or_else(|e| e.into_inner())
  }

  /// Append `event` to the history and deliver it to every matching
  /// subscription, in subscription order. Never fails.
  pub fn publish(&self, event: DomainEvent) {
    let handlers: Vec<(SubscriptionId, EventHandler)> = {
      let mut state = self.state();

      state.history.push_back(event.clone());
      while state.history.len() > self.capacity {
        state.history.pop_front();
      }

      state
        .subscriptions
        .iter_mut()
        .filter(|sub| {
          sub.filter.as_ref().is_none_or(|f| f.matches(&event))
        })
        .map(|sub| {
          sub.deliveries += 1;
          (sub.id, Arc::clone(&sub.handler))
        })
        .collect()
    };
    // The lock is released before handlers run, so a handler may publish
    // or subscribe without deadlocking.

    for (id, handler) in handlers {
      if let Err(error) = handler(&event) {
        tracing::warn!(
          subscription = %id.0,
          event = %event.id,
          kind = ?event.kind,
          %error,
          "event subscriber failed; continuing delivery"
        );
      }
    }
  }

  /// Register `handler` for events matching `filter` (all events when
  /// `None`). The subscription lives until [`EventBus::unsubscribe`].
  pub fn subscribe(
    &self,
    filter: Option<EventFilter>,
    handler: EventHandler,
  ) -> SubscriptionId {
    let id = SubscriptionId(Uuid::new_v4());
    self.state().subscriptions.push(Subscription {
      id,
      filter,
      handler,
      deliveries: 0,
    });
    id
  }

  /// Remove a subscription. Idempotent: unknown ids are ignored.
  pub fn unsubscribe(&self, id: SubscriptionId) {
    self.state().subscriptions.retain(|sub| sub.id != id);
  }

  // ── Replay ────────────────────────────────────────────────────────────

  /// Events currently in the history window, oldest first, optionally
  /// filtered.
  pub fn event_history(&self, filter: Option<&EventFilter>) -> Vec<DomainEvent> {
    self
      .state()
      .history
      .iter()
      .filter(|event| filter.is_none_or(|f| f.matches(event)))
      .cloned()
      .collect()
  }

  /// History narrowed to a single aggregate instance.
  pub fn aggregate_history(
    &self,
    aggregate: Aggregate,
    aggregate_id: &str,
  ) -> Vec<DomainEvent> {
    let filter = EventFilter {
      aggregate: Some(aggregate),
      aggregate_id: Some(aggregate_id.to_owned()),
      ..Default::default()
    };
    self.event_history(Some(&filter))
  }

  /// Delivery counters for every live subscription.
  pub fn subscription_stats(&self) -> Vec<SubscriptionStats> {
    self
      .state()
      .subscriptions
      .iter()
      .map(|sub| SubscriptionStats { id: sub.id, deliveries: sub.deliveries })
      .collect()
  }

  /// Number of events currently held in the history window.
  pub fn history_len(&self) -> usize {
    self.state().history.len()
  }
}
