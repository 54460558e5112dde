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

//! The bar-synchronized commit protocol.
//!
//! A [`Session`] holds two snapshots of what should be playing. The *committed* snapshot is what
//! is playing now. The *pending* snapshot collects everything [enqueued](Session::enqueue) by the
//! latest evaluation and is created on the first enqueue after a commit.
//!
//! Changes take effect on bar boundaries in two phases driven by the [`Clock`]:
//!
//! 1. [`precommit`](Session::precommit) runs on the clock's pre-bar event, shortly before the
//!    boundary. If something is pending, every committed instrument and modulator is told to stop
//!    at the exact boundary time and external listeners of the old evaluation are detached.
//!    Nothing audible changes yet.
//! 2. [`commit`](Session::commit) runs on the bar event, at the boundary. The pending snapshot
//!    replaces the committed one, its listeners are attached and its modulators started, and
//!    every committed instrument plays the new bar.
//!
//! When nothing is pending both phases leave the committed snapshot alone, so a loop keeps
//! playing unchanged. Items enqueued after the pre-bar event of a boundary wait for the next one,
//! so the old snapshot is always retired before the new one is installed.

use crate::{
    clock::{Clock, ClockEvent, ClockEventKind, ListenerId, Metronome},
    graph::{Modulator, Observer, ObserverCallback},
    instrument::{Instrument, Playable},
};
use std::{fmt, mem};

/// Something an evaluation asks the session to install.
pub enum QueuedItem {
    Instrument(Box<dyn Playable>),
    Modulator(Box<dyn Modulator>),
    Listener(ExternalListener),
}

impl QueuedItem {
    pub fn instrument(instrument: impl Playable + 'static) -> QueuedItem {
        QueuedItem::Instrument(Box::new(instrument))
    }

    pub fn modulator(modulator: impl Modulator + 'static) -> QueuedItem {
        QueuedItem::Modulator(Box::new(modulator))
    }
}

impl fmt::Debug for QueuedItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueuedItem::Instrument(instrument) => {
                f.debug_tuple("Instrument").field(&instrument.name()).finish()
            }
            QueuedItem::Modulator(modulator) => {
                f.debug_tuple("Modulator").field(&modulator.name()).finish()
            }
            QueuedItem::Listener(listener) => f.debug_tuple("Listener").field(listener).finish(),
        }
    }
}

impl<T: Clone + 'static> From<Instrument<T>> for QueuedItem {
    fn from(instrument: Instrument<T>) -> QueuedItem {
        QueuedItem::instrument(instrument)
    }
}

impl From<ExternalListener> for QueuedItem {
    fn from(listener: ExternalListener) -> QueuedItem {
        QueuedItem::Listener(listener)
    }
}

/// Where an [`ExternalListener`] receives its events from.
pub enum ListenerTarget {
    /// Events of one kind fired by the session's clock.
    Clock(ClockEventKind, Box<dyn FnMut(&ClockEvent)>),
    /// Messages delivered by the session's observer under an id.
    Observer(String, ObserverCallback),
}

/// A callback that is active for as long as the evaluation that created it.
///
/// The callback is attached when its evaluation is committed and detached when the next one
/// retires it. A detached listener is never attached again.
pub struct ExternalListener(ListenerState);

enum ListenerState {
    Detached(ListenerTarget),
    OnClock(ClockEventKind, ListenerId),
    OnObserver(String),
    Spent,
}

impl fmt::Debug for ExternalListener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            ListenerState::Detached(ListenerTarget::Clock(kind, _)) => {
                write!(f, "ExternalListener(detached, {:?})", kind)
            }
            ListenerState::Detached(ListenerTarget::Observer(id, _)) => {
                write!(f, "ExternalListener(detached, {:?})", id)
            }
            ListenerState::OnClock(kind, _) => write!(f, "ExternalListener(attached, {:?})", kind),
            ListenerState::OnObserver(id) => write!(f, "ExternalListener(attached, {:?})", id),
            ListenerState::Spent => write!(f, "ExternalListener(spent)"),
        }
    }
}

impl ExternalListener {
    pub fn new(target: ListenerTarget) -> ExternalListener {
        ExternalListener(ListenerState::Detached(target))
    }

    /// Listens to clock events of `kind`.
    pub fn on_clock<F>(kind: ClockEventKind, callback: F) -> ExternalListener
    where
        F: FnMut(&ClockEvent) + 'static,
    {
        ExternalListener::new(ListenerTarget::Clock(kind, Box::new(callback)))
    }

    /// Listens to observer messages delivered under `id`.
    pub fn on_observer<F>(id: impl Into<String>, callback: F) -> ExternalListener
    where
        F: FnMut(&[u8]) + 'static,
    {
        ExternalListener::new(ListenerTarget::Observer(id.into(), Box::new(callback)))
    }

    pub fn is_attached(&self) -> bool {
        matches!(
            self.0,
            ListenerState::OnClock(..) | ListenerState::OnObserver(_)
        )
    }

    fn attach(&mut self, clock: &Clock, observer: &mut Option<Box<dyn Observer>>) {
        self.0 = match mem::replace(&mut self.0, ListenerState::Spent) {
            ListenerState::Detached(ListenerTarget::Clock(kind, callback)) => {
                ListenerState::OnClock(kind, clock.on(kind, callback))
            }
            ListenerState::Detached(ListenerTarget::Observer(id, callback)) => match observer {
                Some(observer) => {
                    observer.register(&id, callback);
                    ListenerState::OnObserver(id)
                }
                None => {
                    log::warn!("session: no observer to attach listener {:?} to", id);
                    ListenerState::Detached(ListenerTarget::Observer(id, callback))
                }
            },
            state => state,
        };
    }

    fn detach(&mut self, clock: &Clock, observer: &mut Option<Box<dyn Observer>>) {
        match mem::replace(&mut self.0, ListenerState::Spent) {
            ListenerState::OnClock(kind, id) => {
                clock.off(kind, id);
            }
            ListenerState::OnObserver(id) => {
                if let Some(observer) = observer {
                    observer.unregister(&id);
                }
            }
            ListenerState::Detached(_) | ListenerState::Spent => {}
        }
    }
}

#[derive(Default)]
struct Snapshot {
    instruments: Vec<Box<dyn Playable>>,
    modulators: Vec<Box<dyn Modulator>>,
    listeners: Vec<ExternalListener>,
}

impl Snapshot {
    fn push(&mut self, item: QueuedItem) {
        match item {
            QueuedItem::Instrument(instrument) => self.instruments.push(instrument),
            QueuedItem::Modulator(modulator) => self.modulators.push(modulator),
            QueuedItem::Listener(listener) => self.listeners.push(listener),
        }
    }

    fn retire(&mut self, at: f64, clock: &Clock, observer: &mut Option<Box<dyn Observer>>) {
        for instrument in &mut self.instruments {
            if let Err(err) = instrument.retire(at) {
                log::error!("session: failed to retire {}: {}", instrument.name(), err);
            }
        }
        for modulator in &mut self.modulators {
            if let Err(err) = modulator.stop(at) {
                log::error!("session: failed to stop {}: {}", modulator.name(), err);
            }
        }
        for listener in &mut self.listeners {
            listener.detach(clock, observer);
        }
    }
}

/// Pending and committed snapshots of instruments, modulators and listeners.
///
/// See [the module level documentation](self) for the protocol.
pub struct Session {
    clock: Clock,
    observer: Option<Box<dyn Observer>>,
    committed: Snapshot,
    pending: Option<Snapshot>,
    // The committed snapshot has been retired for the upcoming boundary.
    retiring: bool,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("committed", &self.instrument_names())
            .field("pending", &self.pending.is_some())
            .field("retiring", &self.retiring)
            .finish()
    }
}

impl Session {
    /// Creates an empty session whose clock listeners attach to `clock`.
    pub fn new(clock: Clock) -> Session {
        Session {
            clock,
            observer: None,
            committed: Snapshot::default(),
            pending: None,
            retiring: false,
        }
    }

    /// Sets the observer that observer listeners attach to.
    pub fn with_observer(mut self, observer: impl Observer + 'static) -> Self {
        self.set_observer(observer);
        self
    }

    /// Replaces the observer. Listeners that are already attached stay with the old one.
    pub fn set_observer(&mut self, observer: impl Observer + 'static) {
        self.observer = Some(Box::new(observer));
    }

    /// Adds an item to the pending snapshot, creating it if needed.
    pub fn enqueue(&mut self, item: impl Into<QueuedItem>) {
        let item = item.into();
        log::debug!("session: enqueue {:?}", item);
        self.pending.get_or_insert_with(Snapshot::default).push(item);
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Names of the committed instruments, in enqueue order.
    pub fn instrument_names(&self) -> Vec<&str> {
        self.committed
            .instruments
            .iter()
            .map(|instrument| instrument.name())
            .collect()
    }

    /// Names of the committed modulators, in enqueue order.
    pub fn modulator_names(&self) -> Vec<&str> {
        self.committed
            .modulators
            .iter()
            .map(|modulator| modulator.name())
            .collect()
    }

    pub fn listener_count(&self) -> usize {
        self.committed.listeners.len()
    }

    /// Retires the committed snapshot at `at`, the time of the upcoming bar boundary, if
    /// something is pending.
    ///
    /// Retirement failures are logged and do not stop the rest of the snapshot from being
    /// retired.
    pub fn precommit(&mut self, at: f64) {
        if self.pending.is_none() || self.retiring {
            return;
        }
        log::debug!("session: retiring committed snapshot at {}", at);
        self.committed
            .retire(at, &self.clock, &mut self.observer);
        self.retiring = true;
    }

    /// Installs the pending snapshot, if it has been precommitted, and plays the bar starting at
    /// `metronome`.
    pub fn commit(&mut self, metronome: &Metronome) {
        if self.pending.is_some() && !self.retiring {
            log::debug!(
                "session: pending snapshot missed the boundary of bar {}",
                metronome.bar
            );
        } else if let Some(mut pending) = self.pending.take() {
            for listener in &mut pending.listeners {
                listener.attach(&self.clock, &mut self.observer);
            }
            for modulator in &mut pending.modulators {
                if let Err(err) = modulator.start(metronome.time) {
                    log::error!("session: failed to start {}: {}", modulator.name(), err);
                }
            }
            self.committed = pending;
            self.retiring = false;
            log::debug!(
                "session: committed {:?} at bar {}",
                self.instrument_names(),
                metronome.bar
            );
        }

        let bar_duration = metronome.beat_duration * f64::from(self.clock.beats_per_bar());
        for instrument in &mut self.committed.instruments {
            if let Err(err) = instrument.play(metronome, bar_duration) {
                log::error!("session: {} failed to play: {}", instrument.name(), err);
            }
        }
    }

    /// Retires everything at `at` and drops anything pending.
    pub fn clear(&mut self, at: f64) {
        let mut committed = mem::take(&mut self.committed);
        if !self.retiring {
            committed.retire(at, &self.clock, &mut self.observer);
        }
        self.pending = None;
        self.retiring = false;
    }
}
