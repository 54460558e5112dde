// Barline
// Copyright (C) 2021  Wesley Merkel
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

//! An insertion-ordered publish/subscribe registry.
//!
//! Handlers are stored per event kind in the order they were added. Dispatch works on a snapshot
//! of the handlers, and every handler is checked against the live registry right before it is
//! called, so a handler removed by an earlier handler in the same dispatch is never invoked.

use std::{cell::RefCell, collections::HashMap, fmt, hash::Hash, rc::Rc};

/// Identifies a subscription. Returned when subscribing and used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Ord, PartialOrd, Hash)]
pub struct ListenerId(u64);

pub(crate) type Handler<E> = Rc<RefCell<dyn FnMut(&E)>>;

pub(crate) struct Registry<K, E: ?Sized> {
    next_id: u64,
    handlers: HashMap<K, Vec<(ListenerId, Handler<E>)>>,
}

impl<K, E: ?Sized> fmt::Debug for Registry<K, E>
where
    K: fmt::Debug + Eq + Hash,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let counts = self
            .handlers
            .iter()
            .map(|(kind, handlers)| (kind, handlers.len()))
            .collect::<HashMap<_, _>>();
        f.debug_struct("Registry")
            .field("handlers", &counts)
            .finish()
    }
}

impl<K, E: ?Sized> Default for Registry<K, E> {
    fn default() -> Registry<K, E> {
        Registry {
            next_id: 0,
            handlers: HashMap::new(),
        }
    }
}

impl<K, E> Registry<K, E>
where
    K: Copy + Eq + Hash,
    E: ?Sized,
{
    pub fn add(&mut self, kind: K, handler: Handler<E>) -> ListenerId {
        let id = ListenerId(self.next_id);
        self.next_id += 1;
        self.handlers.entry(kind).or_default().push((id, handler));
        id
    }

    pub fn remove(&mut self, kind: K, id: ListenerId) -> bool {
        let handlers = match self.handlers.get_mut(&kind) {
            Some(handlers) => handlers,
            None => return false,
        };
        let len = handlers.len();
        handlers.retain(|(listener, _)| *listener != id);
        handlers.len() != len
    }

    pub fn contains(&self, kind: K, id: ListenerId) -> bool {
        self.handlers
            .get(&kind)
            .map_or(false, |handlers| handlers.iter().any(|(listener, _)| *listener == id))
    }

    pub fn snapshot(&self, kind: K) -> Vec<(ListenerId, Handler<E>)> {
        self.handlers.get(&kind).cloned().unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.handlers.values().map(Vec::len).sum()
    }

    pub fn clear(&mut self) {
        self.handlers.clear();
    }
}

/// Calls every handler subscribed to `kind` at the time of the call, in subscription order.
///
/// The registry is only borrowed between handler calls, so handlers may subscribe and unsubscribe
/// freely. A handler that is already running further up the stack is skipped.
pub(crate) fn dispatch<K, E>(registry: &RefCell<Registry<K, E>>, kind: K, event: &E)
where
    K: Copy + Eq + Hash + fmt::Debug,
{
    let snapshot = registry.borrow().snapshot(kind);
    for (id, handler) in snapshot {
        if !registry.borrow().contains(kind, id) {
            continue;
        }
        match handler.try_borrow_mut() {
            Ok(mut handler) => (&mut *handler)(event),
            Err(_) => log::warn!("skipping re-entrant {:?} listener {:?}", kind, id),
        }
    }
}
