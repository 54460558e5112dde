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

//! The top-level handle of a performance.
//!
//! An [`Engine`] owns a [`Clock`] and a [`Session`] and wires the clock's pre-bar and bar events
//! to the session's [`precommit`](Session::precommit) and [`commit`](Session::commit). User code
//! is run through [`Engine::evaluate`], the boundary between a script and the running
//! performance: everything the script enqueues is handed to the session only if the script
//! succeeds, so a failing script never disturbs what is playing.
//!
//! # Examples
//!
//! ```
//! use barline::{
//!     clock::ManualTime,
//!     engine::{Engine, EngineConfig},
//!     graph::Recorder,
//!     instrument::Instrument,
//!     pattern::Slot,
//! };
//!
//! let time = ManualTime::new();
//! let recorder = Recorder::new();
//! let engine = Engine::new(EngineConfig::default(), time.clone());
//!
//! engine.evaluate(|eval| {
//!     let hats = Instrument::new("hats", recorder.clone())
//!         .note(vec![Slot::Value(42)])
//!         .xox(vec!["x-x-"]);
//!     eval.enqueue(hats);
//!     Ok::<(), String>(())
//! })?;
//! engine.start();
//!
//! assert_eq!(engine.session().instrument_names(), vec!["hats"]);
//! assert_eq!(recorder.starts(), vec![("42".to_string(), 0.0), ("42".to_string(), 1.0)]);
//! # barline::engine::Result::Ok(())
//! ```

use crate::{
    clock::{Clock, ClockConfig, ClockEventKind, Status, TimeSource},
    graph::Observer,
    scheduler::{self, Scheduler},
    session::{QueuedItem, Session},
};
use serde::{Deserialize, Serialize};
use std::{
    cell::{Ref, RefCell},
    fmt, fs, io,
    path::Path,
    rc::Rc,
};
use thiserror::Error;

/// A specialized [`Result`] type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The error type for engine operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("reading config file: {0}")]
    ConfigRead(#[source] io::Error),
    #[error("parsing config: {0}")]
    ConfigParse(#[source] serde_json::Error),
    #[error("evaluation failed: {0}")]
    Evaluation(String),
    #[error("session is busy, evaluations cannot run from inside a commit")]
    SessionBusy,
}

/// Engine settings, loadable from JSON.
///
/// Every field is optional in JSON; missing fields take their default values.
///
/// ```
/// use barline::engine::EngineConfig;
///
/// let config = EngineConfig::from_json_str(r#"{ "bpm": 90, "beats_per_bar": 3 }"#)?;
/// assert_eq!(config.clock.bpm, 90.0);
/// assert_eq!(config.clock.beats_per_bar, 3);
/// assert_eq!(config.clock.lookahead, 0.025);
/// # barline::engine::Result::Ok(())
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    #[serde(flatten)]
    pub clock: ClockConfig,
}

impl EngineConfig {
    pub fn from_json_str(json: &str) -> Result<EngineConfig> {
        serde_json::from_str(json).map_err(Error::ConfigParse)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<EngineConfig> {
        let json = fs::read_to_string(path).map_err(Error::ConfigRead)?;
        EngineConfig::from_json_str(&json)
    }

    pub fn bpm(mut self, bpm: f64) -> Self {
        self.clock = self.clock.bpm(bpm);
        self
    }

    pub fn beats_per_bar(mut self, beats_per_bar: u32) -> Self {
        self.clock = self.clock.beats_per_bar(beats_per_bar);
        self
    }

    pub fn lookahead(mut self, lookahead: f64) -> Self {
        self.clock = self.clock.lookahead(lookahead);
        self
    }

    pub fn schedule_ahead(mut self, schedule_ahead: f64) -> Self {
        self.clock = self.clock.schedule_ahead(schedule_ahead);
        self
    }

    pub fn prefire_offset(mut self, prefire_offset: f64) -> Self {
        self.clock = self.clock.prefire_offset(prefire_offset);
        self
    }
}

/// What a script can do to the performance. Nothing takes effect unless the script succeeds.
#[derive(Debug, Default)]
pub struct Evaluation {
    items: Vec<QueuedItem>,
    bpm: Option<f64>,
}

impl Evaluation {
    /// Queues an instrument, modulator or listener for the next bar boundary.
    pub fn enqueue(&mut self, item: impl Into<QueuedItem>) {
        self.items.push(item.into());
    }

    /// Changes the tempo once the script has succeeded.
    pub fn bpm(&mut self, bpm: f64) {
        self.bpm = Some(bpm);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// A clock and a session wired together.
pub struct Engine {
    clock: Clock,
    session: Rc<RefCell<Session>>,
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("clock", &self.clock)
            .field("session", &self.session.try_borrow().ok())
            .finish()
    }
}

impl Engine {
    pub fn new(config: EngineConfig, time: impl TimeSource + 'static) -> Engine {
        let clock = Clock::new(time, config.clock);
        let session = Rc::new(RefCell::new(Session::new(clock.clone())));

        let weak = Rc::downgrade(&session);
        clock.on(ClockEventKind::PreBar, move |event| {
            let (session, metronome) = match (weak.upgrade(), event.metronome()) {
                (Some(session), Some(metronome)) => (session, metronome),
                _ => return,
            };
            match session.try_borrow_mut() {
                Ok(mut session) => session.precommit(metronome.time),
                Err(_) => log::error!("engine: session busy, bar {} not precommitted", metronome.bar),
            };
        });

        let weak = Rc::downgrade(&session);
        clock.on(ClockEventKind::Bar, move |event| {
            let (session, metronome) = match (weak.upgrade(), event.metronome()) {
                (Some(session), Some(metronome)) => (session, metronome),
                _ => return,
            };
            match session.try_borrow_mut() {
                Ok(mut session) => session.commit(metronome),
                Err(_) => log::error!("engine: session busy, bar {} not committed", metronome.bar),
            };
        });

        Engine { clock, session }
    }

    /// Sets the observer that observer listeners attach to.
    pub fn with_observer(self, observer: impl Observer + 'static) -> Self {
        self.session.borrow_mut().set_observer(observer);
        self
    }

    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    /// Borrows the session for inspection.
    ///
    /// # Panics
    ///
    /// Panics if called from inside a commit, like any other [`RefCell`] borrow conflict.
    pub fn session(&self) -> Ref<'_, Session> {
        self.session.borrow()
    }

    /// Runs a script and queues what it enqueued for the next bar boundary.
    ///
    /// # Errors
    ///
    /// If the script fails its error is logged and returned as [`Error::Evaluation`], and
    /// nothing it enqueued is kept. Returns [`Error::SessionBusy`] if called from inside a
    /// commit.
    pub fn evaluate<F, E>(&self, script: F) -> Result<()>
    where
        F: FnOnce(&mut Evaluation) -> std::result::Result<(), E>,
        E: fmt::Display,
    {
        let mut evaluation = Evaluation::default();
        if let Err(err) = script(&mut evaluation) {
            log::error!("engine: evaluation failed: {}", err);
            return Err(Error::Evaluation(err.to_string()));
        }

        let mut session = self
            .session
            .try_borrow_mut()
            .map_err(|_| Error::SessionBusy)?;
        log::debug!("engine: evaluation queued {} items", evaluation.len());
        if let Some(bpm) = evaluation.bpm {
            self.clock.set_bpm(bpm);
        }
        for item in evaluation.items {
            session.enqueue(item);
        }
        Ok(())
    }

    pub fn start(&self) {
        self.clock.start();
    }

    pub fn pause(&self) {
        self.clock.pause();
    }

    pub fn stop(&self) {
        self.clock.stop();
    }

    /// Destroys the clock and releases everything still sounding.
    pub fn destroy(&self) {
        if self.clock.status() == Status::Destroyed {
            return;
        }
        let now = self.clock.now();
        self.clock.destroy();
        match self.session.try_borrow_mut() {
            Ok(mut session) => session.clear(now),
            Err(_) => log::error!("engine: session busy, not cleared on destroy"),
        }
    }

    /// Runs one scheduling pass of the clock. Returns false once the engine has been destroyed.
    pub fn tick(&self) -> bool {
        self.clock.tick()
    }

    /// Drives the clock on `scheduler` until the engine is destroyed or the scheduler is
    /// cancelled.
    pub fn run(&self, scheduler: Scheduler) -> scheduler::Result<()> {
        scheduler.run(self.clock.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{clock::ManualTime, graph::Recorder, instrument::Instrument, pattern::Slot};
    use pretty_assertions::assert_eq;

    #[test]
    fn config_fields_are_optional() {
        assert_eq!(EngineConfig::from_json_str("{}").unwrap(), EngineConfig::default());
        assert_eq!(
            EngineConfig::from_json_str(r#"{"bpm": 140.0, "prefire_offset": 0.02}"#).unwrap(),
            EngineConfig::default().bpm(140.0).prefire_offset(0.02)
        );
    }

    #[test]
    fn malformed_config_is_an_error() {
        assert!(matches!(
            EngineConfig::from_json_str(r#"{"bpm": "fast"}"#),
            Err(Error::ConfigParse(_))
        ));
        assert!(matches!(
            EngineConfig::from_json_file("/nonexistent/barline.json"),
            Err(Error::ConfigRead(_))
        ));
    }

    #[test]
    fn failed_evaluations_keep_nothing() {
        let engine = Engine::new(EngineConfig::default(), ManualTime::new());
        let result = engine.evaluate(|eval| {
            eval.enqueue(Instrument::new("lead", Recorder::new()).note(vec![Slot::Value(1)]));
            eval.bpm(60.0);
            Err("syntax error")
        });

        assert!(matches!(result, Err(Error::Evaluation(message)) if message == "syntax error"));
        assert!(!engine.session().has_pending());
        assert_eq!(engine.clock().bpm(), 120.0);
    }

    #[test]
    fn tempo_changes_apply_on_success() {
        let engine = Engine::new(EngineConfig::default(), ManualTime::new());
        engine
            .evaluate(|eval| {
                eval.bpm(90.0);
                Ok::<(), String>(())
            })
            .unwrap();
        assert_eq!(engine.clock().bpm(), 90.0);
        assert!(!engine.session().has_pending());
    }

    #[test]
    fn destroy_is_terminal() {
        let engine = Engine::new(EngineConfig::default(), ManualTime::new());
        engine.start();
        engine.destroy();
        engine.destroy();
        assert!(!engine.tick());
        assert_eq!(engine.clock().status(), Status::Destroyed);
    }
}
