// Rust guideline compliant 2026-10-05

//! Notification queue -- bounded feed of user-facing alerts, newest first.
//!
//! Entry points: [`NotificationQueue::add`], [`NotificationQueue::mark_read`],
//! [`NotificationQueue::mark_all`], [`NotificationQueue::clear`],
//! [`NotificationQueue::attach`].

use domain::{NewNotification, Notification, NotificationKind, Notifier, events, format_rupees};
use event_bus::{ConsumerId, EventBus, Subscription};
use serde_json::Value;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;
use uuid::Uuid;

/// Maximum number of retained notifications; older ones are evicted.
pub const CAPACITY: usize = 30;

/// Consumer label used on the event bus.
pub const CONSUMER: &str = "notifications";

/// Ordered notification feed.
///
/// Mutations apply in call order. The unread count is always derived from
/// the entries, never stored.
#[derive(Default)]
pub struct NotificationQueue {
    /// Front is the most recent entry.
    items: RefCell<VecDeque<Notification>>,
}

impl NotificationQueue {
    /// Create an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert at the head as unread and return the assigned id.
    ///
    /// Evicts the oldest entries beyond [`CAPACITY`].
    pub fn add(&self, notification: NewNotification) -> Uuid {
        let id = Uuid::new_v4();
        let mut items = self.items.borrow_mut();
        items.push_front(Notification {
            id,
            kind: notification.kind,
            title: notification.title,
            message: notification.message,
            created_at: chrono::Utc::now(),
            read: false,
        });
        if items.len() > CAPACITY {
            let evicted = items.len() - CAPACITY;
            items.truncate(CAPACITY);
            tracing::debug!(evicted, "notifications.evicted");
        }
        tracing::debug!(%id, kind = ?notification.kind, "notifications.added");
        id
    }

    /// Mark one entry read. Returns `false` when `id` is not in the queue.
    pub fn mark_read(&self, id: Uuid) -> bool {
        let mut items = self.items.borrow_mut();
        match items.iter_mut().find(|n| n.id == id) {
            Some(n) => {
                n.read = true;
                true
            }
            None => false,
        }
    }

    /// Mark every entry read. Returns how many were unread.
    pub fn mark_all(&self) -> usize {
        let mut flipped = 0;
        for n in self.items.borrow_mut().iter_mut().filter(|n| !n.read) {
            n.read = true;
            flipped += 1;
        }
        flipped
    }

    /// Remove every entry.
    pub fn clear(&self) {
        self.items.borrow_mut().clear();
    }

    /// Number of entries with `read == false`.
    #[must_use]
    pub fn unread_count(&self) -> usize {
        self.items.borrow().iter().filter(|n| !n.read).count()
    }

    /// Number of retained entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.borrow().len()
    }

    /// `true` when the queue holds nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.borrow().is_empty()
    }

    /// Copy of the entries, newest first.
    #[must_use]
    pub fn items(&self) -> Vec<Notification> {
        self.items.borrow().iter().cloned().collect()
    }

    /// Raise a fraud alert for every `transaction:new` whose payload says
    /// `decision: "BLOCK"`. Other payloads are ignored.
    pub fn attach(self: &Rc<Self>, bus: &EventBus) -> Subscription {
        let queue = Rc::downgrade(self);
        bus.on(events::TRANSACTION_NEW, &ConsumerId::new(CONSUMER), move |event| {
            if let Some(alert) = blocked_alert(&event.payload)
                && let Some(queue) = queue.upgrade()
            {
                queue.add(alert);
            }
            Ok(())
        })
    }
}

fn blocked_alert(payload: &Value) -> Option<NewNotification> {
    let decision = payload.get("decision").and_then(Value::as_str)?;
    if !decision.trim().eq_ignore_ascii_case("BLOCK") {
        return None;
    }
    let merchant = payload.get("merchant").and_then(Value::as_str).unwrap_or("an unknown merchant");
    let message = match payload.get("amount").and_then(Value::as_f64) {
        Some(amount) => format!("{} blocked from {merchant}", format_rupees(amount)),
        None => format!("Payment to {merchant} blocked"),
    };
    Some(NewNotification::new(NotificationKind::Fraud, "Fraud blocked", message))
}

impl Notifier for NotificationQueue {
    fn notify(&self, notification: NewNotification) -> Uuid {
        self.add(notification)
    }
}

impl fmt::Debug for NotificationQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotificationQueue")
            .field("len", &self.len())
            .field("unread", &self.unread_count())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
