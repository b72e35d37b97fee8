//! Observable cells and lists used by view rows.

use crate::event::{Listeners, Subscription};
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

struct StateInner<T> {
    value: RefCell<T>,
    changes: Listeners<T>,
}

/// A single observable value. Clones share the same cell.
pub struct State<T> {
    inner: Rc<StateInner<T>>,
}

impl<T: Clone + 'static> State<T> {
    pub fn new(value: T) -> Self {
        State {
            inner: Rc::new(StateInner {
                value: RefCell::new(value),
                changes: Listeners::new(),
            }),
        }
    }

    pub fn get(&self) -> T {
        self.inner.value.borrow().clone()
    }

    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.inner.value.borrow())
    }

    /// Replace the value and notify observers with the new value.
    pub fn set(&self, value: T) {
        *self.inner.value.borrow_mut() = value.clone();
        self.inner.changes.emit(&value);
    }

    pub fn on_change(&self, handler: impl Fn(&T) + 'static) -> Subscription {
        self.inner.changes.subscribe(handler)
    }

    pub fn ptr_eq(&self, other: &State<T>) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T> Clone for State<T> {
    fn clone(&self) -> Self {
        State {
            inner: self.inner.clone(),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for State<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("State").field(&*self.inner.value.borrow()).finish()
    }
}

/// A structural change to a [`StateList`].
#[derive(Debug, Clone)]
pub enum ListChange<T> {
    Inserted { index: usize, item: T },
    Removed { index: usize, item: T },
}

struct StateListInner<T> {
    items: RefCell<Vec<T>>,
    changes: Listeners<ListChange<T>>,
}

/// An observable ordered sequence. Clones share the same list.
pub struct StateList<T> {
    inner: Rc<StateListInner<T>>,
}

impl<T: Clone + 'static> StateList<T> {
    pub fn new() -> Self {
        Self::from_vec(Vec::new())
    }

    pub fn from_vec(items: Vec<T>) -> Self {
        StateList {
            inner: Rc::new(StateListInner {
                items: RefCell::new(items),
                changes: Listeners::new(),
            }),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.items.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.items.borrow().is_empty()
    }

    pub fn get(&self, index: usize) -> Option<T> {
        self.inner.items.borrow().get(index).cloned()
    }

    pub fn to_vec(&self) -> Vec<T> {
        self.inner.items.borrow().clone()
    }

    pub fn position(&self, predicate: impl Fn(&T) -> bool) -> Option<usize> {
        self.inner.items.borrow().iter().position(predicate)
    }

    pub fn push(&self, item: T) {
        let index = {
            let mut items = self.inner.items.borrow_mut();
            items.push(item.clone());
            items.len() - 1
        };
        self.inner.changes.emit(&ListChange::Inserted { index, item });
    }

    /// Insert at `index`, clamped to the end of the list.
    pub fn insert(&self, index: usize, item: T) {
        let index = {
            let mut items = self.inner.items.borrow_mut();
            let index = index.min(items.len());
            items.insert(index, item.clone());
            index
        };
        self.inner.changes.emit(&ListChange::Inserted { index, item });
    }

    pub fn remove(&self, index: usize) -> Option<T> {
        let item = {
            let mut items = self.inner.items.borrow_mut();
            if index >= items.len() {
                return None;
            }
            items.remove(index)
        };
        self.inner.changes.emit(&ListChange::Removed {
            index,
            item: item.clone(),
        });
        Some(item)
    }

    /// Remove the first item matching `predicate`.
    pub fn remove_first(&self, predicate: impl Fn(&T) -> bool) -> Option<T> {
        let index = self.position(predicate)?;
        self.remove(index)
    }

    pub fn on_change(&self, handler: impl Fn(&ListChange<T>) + 'static) -> Subscription {
        self.inner.changes.subscribe(handler)
    }

    pub fn ptr_eq(&self, other: &StateList<T>) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T: Clone + 'static> Default for StateList<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for StateList<T> {
    fn clone(&self) -> Self {
        StateList {
            inner: self.inner.clone(),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for StateList<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.inner.items.borrow().iter()).finish()
    }
}
