//! A small typed event bus used by the registries and handlers in this
//! core ("a small, typed event bus... prefer typed channels /
//! observer interfaces over string-keyed emitters").
//!
//! Single-threaded: listeners run synchronously, in subscription order,
//! on the thread that calls `emit`. A listener that panics would abort
//! dispatch to the rest, so callers that wrap fallible user code should
//! catch and log rather than let it propagate ("Listener throws:
//! catch, log, continue dispatch to other listeners").

use std::{cell::RefCell, rc::Rc};

pub struct ListenerId(u64);

pub struct EventBus<T> {
    listeners: RefCell<Vec<(u64, Rc<dyn Fn(&T)>)>>,
    next_id: RefCell<u64>,
}

impl<T> EventBus<T> {
    pub fn new() -> Self {
        Self {
            listeners: RefCell::new(Vec::new()),
            next_id: RefCell::new(0),
        }
    }

    /// Registers a listener; returns an id usable with `off`.
    pub fn on(&self, listener: impl Fn(&T) + 'static) -> ListenerId {
        let mut next_id = self.next_id.borrow_mut();
        let id = *next_id;
        *next_id += 1;
        self.listeners.borrow_mut().push((id, Rc::new(listener)));
        ListenerId(id)
    }

    pub fn off(&self, id: ListenerId) {
        self.listeners.borrow_mut().retain(|(lid, _)| *lid != id.0);
    }

    pub fn remove_all_listeners(&self) {
        self.listeners.borrow_mut().clear();
    }

    /// Dispatches `event` to every listener registered at the time of the
    /// call, in subscription order. Listeners are cloned out of the
    /// registry before dispatch so a listener that reentrantly calls
    /// `on`/`off` doesn't deadlock against the `RefCell` borrow.
    pub fn emit(&self, event: &T) {
        let snapshot: Vec<_> = self.listeners.borrow().iter().map(|(_, f)| f.clone()).collect();
        for listener in snapshot {
            listener(event);
        }
    }
}

impl<T> Default for EventBus<T> {
    fn default() -> Self {
        Self::new()
    }
}
