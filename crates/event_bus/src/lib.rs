// Rust guideline compliant 2026-10-03

//! Event bus -- fans live channel events out to independent consumers.
//!
//! Consumers register handlers per event name and own the returned
//! [`Subscription`]; dropping it unregisters the handler. Handlers for one
//! event run synchronously in registration order, and a failing handler
//! never stops the remaining ones.
//!
//! Entry points: [`EventBus::on`], [`EventBus::off`], [`EventBus::detach`],
//! [`EventBus::dispatch`], [`EventBus::run`].

use connection::ConnectionManager;
use domain::{ChannelEvent, HandlerError, Transport};
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

/// Handler invoked for every matching event.
pub type EventHandler = Rc<dyn Fn(&ChannelEvent) -> Result<(), HandlerError>>;

// ---------------------------------------------------------------------------
// ConsumerId
// ---------------------------------------------------------------------------

/// Label of the logical consumer that owns a subscription.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConsumerId(String);

impl ConsumerId {
    /// Create a consumer label.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The label.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConsumerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

struct Registration {
    id: u64,
    event: String,
    consumer: ConsumerId,
    handler: EventHandler,
}

#[derive(Default)]
struct Registry {
    next_id: Cell<u64>,
    /// Registration order is dispatch order.
    entries: RefCell<Vec<Registration>>,
}

impl Registry {
    /// Removed entries are dropped after the borrow is released: a handler
    /// may own subscriptions whose drop re-enters the registry.
    fn remove(&self, id: u64) -> bool {
        let removed = {
            let mut entries = self.entries.borrow_mut();
            entries.iter().position(|r| r.id == id).map(|i| entries.remove(i))
        };
        removed.is_some()
    }
}

/// Handle of one registered handler.
///
/// The handler is unregistered when the handle is dropped, so no
/// registration can outlive the consumer that owns it.
#[must_use = "dropping the subscription unregisters the handler immediately"]
pub struct Subscription {
    id: u64,
    event: String,
    consumer: ConsumerId,
    registry: Weak<Registry>,
}

impl Subscription {
    /// Event name this subscription listens to.
    #[must_use]
    pub fn event(&self) -> &str {
        &self.event
    }

    /// Owning consumer.
    #[must_use]
    pub fn consumer(&self) -> &ConsumerId {
        &self.consumer
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() && registry.remove(self.id) {
            tracing::debug!(event = %self.event, consumer = %self.consumer, "event_bus.unsubscribed");
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("event", &self.event)
            .field("consumer", &self.consumer)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// DispatchReport
// ---------------------------------------------------------------------------

/// Outcome of one fan-out.
#[derive(Debug, Default)]
pub struct DispatchReport {
    /// Handlers invoked.
    pub delivered: usize,
    /// Handlers that failed, with their consumer, in invocation order.
    pub failures: Vec<(ConsumerId, HandlerError)>,
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Routes named channel events to registered handlers.
///
/// Constructed once per session and shared by reference (or `Rc`) with
/// every consumer. The only component that listens to the transport.
#[derive(Default)]
pub struct EventBus {
    registry: Rc<Registry>,
}

impl EventBus {
    /// Create a bus with no subscriptions.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `event` on behalf of `consumer`.
    pub fn on(
        &self,
        event: &str,
        consumer: &ConsumerId,
        handler: impl Fn(&ChannelEvent) -> Result<(), HandlerError> + 'static,
    ) -> Subscription {
        let id = self.registry.next_id.get();
        self.registry.next_id.set(id + 1);
        self.registry.entries.borrow_mut().push(Registration {
            id,
            event: event.to_owned(),
            consumer: consumer.clone(),
            handler: Rc::new(handler),
        });
        tracing::debug!(event, %consumer, "event_bus.subscribed");
        Subscription {
            id,
            event: event.to_owned(),
            consumer: consumer.clone(),
            registry: Rc::downgrade(&self.registry),
        }
    }

    /// Unregister explicitly. Equivalent to dropping the handle.
    pub fn off(&self, subscription: Subscription) {
        drop(subscription);
    }

    /// Remove every registration owned by `consumer`. Returns how many were removed.
    pub fn detach(&self, consumer: &ConsumerId) -> usize {
        let removed: Vec<Registration> = {
            let mut entries = self.registry.entries.borrow_mut();
            let (gone, kept) = std::mem::take(&mut *entries)
                .into_iter()
                .partition(|r| &r.consumer == consumer);
            *entries = kept;
            gone
        };
        tracing::debug!(%consumer, removed = removed.len(), "event_bus.detached");
        removed.len()
    }

    /// Number of handlers currently registered for `event`.
    #[must_use]
    pub fn handler_count(&self, event: &str) -> usize {
        self.registry.entries.borrow().iter().filter(|r| r.event == event).count()
    }

    /// Deliver `event` to every handler registered for its name.
    ///
    /// Handlers run in registration order against the set registered when
    /// dispatch starts. A failing handler is logged and recorded; the
    /// fan-out continues. Events nobody listens to are dropped silently.
    pub fn dispatch(&self, event: &ChannelEvent) -> DispatchReport {
        // Snapshot so handlers may (un)subscribe without a re-entrant borrow.
        let targets: Vec<(ConsumerId, EventHandler)> = self
            .registry
            .entries
            .borrow()
            .iter()
            .filter(|r| r.event == event.name)
            .map(|r| (r.consumer.clone(), Rc::clone(&r.handler)))
            .collect();

        let mut report = DispatchReport::default();
        for (consumer, handler) in targets {
            report.delivered += 1;
            if let Err(e) = handler(event) {
                tracing::warn!(event = %event.name, %consumer, error = %e, "event_bus.handler.failed");
                report.failures.push((consumer, e));
            }
        }
        tracing::trace!(event = %event.name, delivered = report.delivered, "event_bus.dispatched");
        report
    }

    /// Pump events from `manager` into [`dispatch`](Self::dispatch) until the
    /// channel is down for good. Returns the number of events received.
    ///
    /// Nothing is queued across reconnects: consumers re-derive state by polling.
    pub async fn run<T: Transport>(&self, manager: &ConnectionManager<T>) -> u64 {
        let mut count = 0u64;
        while let Some(event) = manager.recv().await {
            self.dispatch(&event);
            count += 1;
        }
        tracing::info!(events = count, "event_bus.run.stopped: channel closed");
        count
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriptions", &self.registry.entries.borrow().len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
