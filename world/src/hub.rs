//! Registry that fans alert level transitions out to listeners.

use std::{
    cell::{Cell, RefCell},
    fmt,
    rc::{Rc, Weak},
};

use evacuation_core::{LevelChange, LevelListener};
use tracing::{trace, warn};

use crate::LevelClock;

/// Handle identifying a single registration within a [`SubscriptionHub`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    /// Retrieves the numeric representation of the handle.
    #[must_use]
    pub const fn get(&self) -> u64 {
        self.0
    }
}

/// Listener that also owns presentation state needing explicit lifecycle
/// handling when it is enabled or disabled.
pub trait AlertSubscriber: LevelListener {
    /// Applies the clock's current level locally. Receives `None` when the
    /// clock is unavailable, in which case the first level is assumed.
    fn synchronize(&mut self, clock: Option<&LevelClock>);

    /// Returns every owned animated resource to its resting state.
    fn quiesce(&mut self);
}

struct Registration {
    id: SubscriptionId,
    listener: Weak<RefCell<dyn LevelListener>>,
}

impl Registration {
    fn targets(&self, address: *const ()) -> bool {
        self.listener.as_ptr() as *const () == address
    }
}

/// Broadcasts level changes to registered listeners.
///
/// The hub only holds weak references, so dropping a listener is enough to
/// stop deliveries to it. All methods take `&self`, which allows handlers to
/// subscribe or unsubscribe while a publish is in progress; such changes apply
/// to the next publish.
#[derive(Default)]
pub struct SubscriptionHub {
    registrations: RefCell<Vec<Registration>>,
    next_id: Cell<u64>,
}

impl SubscriptionHub {
    /// Creates an empty hub.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a listener. Registering the same listener again returns the
    /// existing handle.
    ///
    /// No notification is replayed; callers synchronise the listener with the
    /// clock themselves (see [`SubscriptionHub::enable`]).
    pub fn subscribe<L>(&self, listener: &Rc<RefCell<L>>) -> SubscriptionId
    where
        L: LevelListener + 'static,
    {
        let address = Rc::as_ptr(listener) as *const ();
        let mut registrations = self.registrations.borrow_mut();
        registrations.retain(|registration| registration.listener.strong_count() > 0);

        if let Some(existing) = registrations
            .iter()
            .find(|registration| registration.targets(address))
        {
            return existing.id;
        }

        let id = SubscriptionId(self.next_id.get());
        self.next_id.set(id.0 + 1);

        let strong: Rc<RefCell<dyn LevelListener>> = listener.clone();
        registrations.push(Registration {
            id,
            listener: Rc::downgrade(&strong),
        });
        trace!(subscription = id.0, listeners = registrations.len(), "listener_subscribed");
        id
    }

    /// Removes a registration. Returns `true` if it was present; removing an
    /// unknown or already removed handle is a no-op.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut registrations = self.registrations.borrow_mut();
        let before = registrations.len();
        registrations.retain(|registration| registration.id != id);
        let removed = registrations.len() != before;
        if removed {
            trace!(subscription = id.0, listeners = registrations.len(), "listener_unsubscribed");
        }
        removed
    }

    /// Delivers `change` to every listener registered when the call began, in
    /// registration order. Returns the number of listeners that were invoked.
    pub fn publish(&self, change: LevelChange) -> usize {
        let snapshot: Vec<(SubscriptionId, Weak<RefCell<dyn LevelListener>>)> = {
            let mut registrations = self.registrations.borrow_mut();
            registrations.retain(|registration| registration.listener.strong_count() > 0);
            registrations
                .iter()
                .map(|registration| (registration.id, Weak::clone(&registration.listener)))
                .collect()
        };

        let mut delivered = 0;
        for (id, listener) in snapshot {
            let Some(listener) = listener.upgrade() else {
                continue;
            };
            match listener.try_borrow_mut() {
                Ok(mut listener) => {
                    listener.on_level_changed(change);
                    delivered += 1;
                }
                Err(_) => {
                    warn!(
                        subscription = id.0,
                        next = change.next.get(),
                        "listener_busy_notification_dropped"
                    );
                }
            };
        }
        delivered
    }

    /// Registers `subscriber` and immediately applies the clock's current level
    /// to it locally, without notifying anybody else.
    pub fn enable<S>(&self, subscriber: &Rc<RefCell<S>>, clock: Option<&LevelClock>) -> SubscriptionId
    where
        S: AlertSubscriber + 'static,
    {
        let id = self.subscribe(subscriber);
        match subscriber.try_borrow_mut() {
            Ok(mut subscriber) => subscriber.synchronize(clock),
            Err(_) => warn!(subscription = id.0, "subscriber_busy_sync_skipped"),
        }
        id
    }

    /// Unregisters `subscriber` and forces its owned resources back to rest.
    pub fn disable<S>(&self, id: SubscriptionId, subscriber: &RefCell<S>)
    where
        S: AlertSubscriber,
    {
        let _ = self.unsubscribe(id);
        match subscriber.try_borrow_mut() {
            Ok(mut subscriber) => subscriber.quiesce(),
            Err(_) => warn!(subscription = id.0, "subscriber_busy_quiesce_skipped"),
        }
    }

    /// Number of registrations whose listener is still alive.
    #[must_use]
    pub fn len(&self) -> usize {
        self.registrations
            .borrow()
            .iter()
            .filter(|registration| registration.listener.strong_count() > 0)
            .count()
    }

    /// Reports whether no live listener is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for SubscriptionHub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ids: Vec<u64> = self
            .registrations
            .borrow()
            .iter()
            .map(|registration| registration.id.0)
            .collect();
        f.debug_struct("SubscriptionHub")
            .field("subscriptions", &ids)
            .field("next_id", &self.next_id.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use evacuation_core::AlertLevel;

    #[derive(Debug, Default)]
    struct Recorder {
        seen: Vec<LevelChange>,
    }

    impl LevelListener for Recorder {
        fn on_level_changed(&mut self, change: LevelChange) {
            self.seen.push(change);
        }
    }

    fn change(previous: u32, next: u32) -> LevelChange {
        LevelChange::new(AlertLevel::new(previous), AlertLevel::new(next))
    }

    #[test]
    fn duplicate_subscription_reuses_handle() {
        let hub = SubscriptionHub::new();
        let recorder = Rc::new(RefCell::new(Recorder::default()));

        let first = hub.subscribe(&recorder);
        let second = hub.subscribe(&recorder);
        assert_eq!(first, second);

        assert_eq!(hub.publish(change(1, 2)), 1);
        assert_eq!(recorder.borrow().seen, vec![change(1, 2)]);
    }

    #[test]
    fn unsubscribe_is_idempotent() {
        let hub = SubscriptionHub::new();
        let recorder = Rc::new(RefCell::new(Recorder::default()));
        let id = hub.subscribe(&recorder);

        assert!(hub.unsubscribe(id));
        assert!(!hub.unsubscribe(id));
        assert!(!hub.unsubscribe(SubscriptionId(99)));
        assert_eq!(hub.publish(change(1, 2)), 0);
        assert!(recorder.borrow().seen.is_empty());
    }

    #[test]
    fn dropped_listener_is_never_notified() {
        let hub = SubscriptionHub::new();
        let recorder = Rc::new(RefCell::new(Recorder::default()));
        let _ = hub.subscribe(&recorder);
        drop(recorder);

        assert_eq!(hub.publish(change(1, 2)), 0);
        assert!(hub.is_empty());
    }

    #[test]
    fn hub_does_not_keep_listeners_alive() {
        let hub = SubscriptionHub::new();
        let recorder = Rc::new(RefCell::new(Recorder::default()));
        let _ = hub.subscribe(&recorder);
        assert_eq!(Rc::strong_count(&recorder), 1);
    }
}
