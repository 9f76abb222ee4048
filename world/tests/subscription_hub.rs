use std::{cell::RefCell, rc::Rc};

use evacuation_core::{AlertLevel, LevelChange, LevelListener};
use evacuation_world::{SubscriptionHub, SubscriptionId};

type Journal = Rc<RefCell<Vec<(&'static str, u32)>>>;

struct Named {
    name: &'static str,
    journal: Journal,
}

impl LevelListener for Named {
    fn on_level_changed(&mut self, change: LevelChange) {
        self.journal.borrow_mut().push((self.name, change.next.get()));
    }
}

/// Unsubscribes itself and a peer on its first notification.
struct Leaver {
    hub: Rc<SubscriptionHub>,
    own: Option<SubscriptionId>,
    peer: Option<SubscriptionId>,
    journal: Journal,
}

impl LevelListener for Leaver {
    fn on_level_changed(&mut self, change: LevelChange) {
        self.journal.borrow_mut().push(("leaver", change.next.get()));
        if let Some(own) = self.own.take() {
            assert!(self.hub.unsubscribe(own));
        }
        if let Some(peer) = self.peer.take() {
            assert!(self.hub.unsubscribe(peer));
        }
    }
}

/// Subscribes a late listener during its first notification.
struct Recruiter {
    hub: Rc<SubscriptionHub>,
    recruit: Rc<RefCell<Named>>,
    recruited: bool,
}

impl LevelListener for Recruiter {
    fn on_level_changed(&mut self, _change: LevelChange) {
        if !self.recruited {
            self.recruited = true;
            let _ = self.hub.subscribe(&self.recruit);
        }
    }
}

fn change(next: u32) -> LevelChange {
    LevelChange::new(AlertLevel::new(next - 1), AlertLevel::new(next))
}

fn named(name: &'static str, journal: &Journal) -> Rc<RefCell<Named>> {
    Rc::new(RefCell::new(Named {
        name,
        journal: Rc::clone(journal),
    }))
}

#[test]
fn delivers_in_registration_order() {
    let hub = SubscriptionHub::new();
    let journal = Journal::default();
    let first = named("first", &journal);
    let second = named("second", &journal);
    let third = named("third", &journal);

    let _ = hub.subscribe(&first);
    let _ = hub.subscribe(&second);
    let _ = hub.subscribe(&third);

    assert_eq!(hub.publish(change(2)), 3);
    assert_eq!(
        *journal.borrow(),
        vec![("first", 2), ("second", 2), ("third", 2)]
    );
}

#[test]
fn removals_during_publish_apply_to_next_publish() {
    let hub = Rc::new(SubscriptionHub::new());
    let journal = Journal::default();

    let leaver = Rc::new(RefCell::new(Leaver {
        hub: Rc::clone(&hub),
        own: None,
        peer: None,
        journal: Rc::clone(&journal),
    }));
    let peer = named("peer", &journal);

    let leaver_id = hub.subscribe(&leaver);
    let peer_id = hub.subscribe(&peer);
    {
        let mut leaver = leaver.borrow_mut();
        leaver.own = Some(leaver_id);
        leaver.peer = Some(peer_id);
    }

    assert_eq!(hub.publish(change(2)), 2);
    assert_eq!(*journal.borrow(), vec![("leaver", 2), ("peer", 2)]);

    assert_eq!(hub.publish(change(3)), 0);
    assert_eq!(journal.borrow().len(), 2);
    assert!(hub.is_empty());
}

#[test]
fn additions_during_publish_wait_for_next_publish() {
    let hub = Rc::new(SubscriptionHub::new());
    let journal = Journal::default();
    let recruit = named("recruit", &journal);
    let recruiter = Rc::new(RefCell::new(Recruiter {
        hub: Rc::clone(&hub),
        recruit: Rc::clone(&recruit),
        recruited: false,
    }));

    let _ = hub.subscribe(&recruiter);

    assert_eq!(hub.publish(change(2)), 1);
    assert!(journal.borrow().is_empty());

    assert_eq!(hub.publish(change(3)), 2);
    assert_eq!(*journal.borrow(), vec![("recruit", 3)]);
}
