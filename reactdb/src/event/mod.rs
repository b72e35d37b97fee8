//! Typed publish/subscribe registry.
//!
//! Every model, database and observable owns one [`Listeners`] per event type.
//! Subscribing returns a [`Subscription`]; dropping it (or calling
//! [`Subscription::unsubscribe`]) removes the handler, so teardown is
//! deterministic.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

type Handler<E> = Rc<dyn Fn(&E)>;

struct Entry<E> {
    id: u64,
    alive: Rc<Cell<bool>>,
    handler: Handler<E>,
}

struct Registry<E> {
    next_id: Cell<u64>,
    entries: RefCell<Vec<Entry<E>>>,
}

/// An ordered list of handlers for one event type.
pub struct Listeners<E> {
    registry: Rc<Registry<E>>,
}

impl<E: 'static> Listeners<E> {
    pub fn new() -> Self {
        Listeners {
            registry: Rc::new(Registry {
                next_id: Cell::new(0),
                entries: RefCell::new(Vec::new()),
            }),
        }
    }

    /// Register a handler. Handlers fire in subscription order.
    pub fn subscribe(&self, handler: impl Fn(&E) + 'static) -> Subscription {
        let id = self.registry.next_id.get();
        self.registry.next_id.set(id + 1);
        let alive = Rc::new(Cell::new(true));
        self.registry.entries.borrow_mut().push(Entry {
            id,
            alive: alive.clone(),
            handler: Rc::new(handler),
        });

        let registry: Weak<Registry<E>> = Rc::downgrade(&self.registry);
        Subscription {
            cancel: Some(Box::new(move || {
                alive.set(false);
                if let Some(registry) = registry.upgrade() {
                    registry.entries.borrow_mut().retain(|e| e.id != id);
                }
            })),
        }
    }

    /// Deliver an event to every handler registered at the time of the call.
    ///
    /// Handlers may subscribe, unsubscribe or emit again while running; a
    /// handler removed during delivery is skipped.
    pub fn emit(&self, event: &E) {
        let snapshot: Vec<(Rc<Cell<bool>>, Handler<E>)> = self
            .registry
            .entries
            .borrow()
            .iter()
            .map(|e| (e.alive.clone(), e.handler.clone()))
            .collect();

        for (alive, handler) in snapshot {
            if alive.get() {
                handler(event);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.registry.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove every handler. Outstanding subscriptions become no-ops.
    pub fn clear(&self) {
        let removed: Vec<Entry<E>> = self.registry.entries.borrow_mut().drain(..).collect();
        for entry in removed {
            entry.alive.set(false);
        }
    }
}

impl<E: 'static> Default for Listeners<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> fmt::Debug for Listeners<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listeners")
            .field("handlers", &self.registry.entries.borrow().len())
            .finish()
    }
}

/// Handle to a registered handler. Unsubscribes when dropped.
#[must_use = "dropping a Subscription unsubscribes its handler; call `detach` to keep it"]
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce()>>,
}

impl Subscription {
    pub fn unsubscribe(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }

    /// Keep the handler registered for as long as its registry lives.
    pub fn detach(mut self) {
        self.cancel = None;
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}
