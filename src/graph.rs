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

//! Interfaces to the audio graph and other external collaborators.
//!
//! The engine does not produce sound itself. It asks collaborators to start and stop voices at
//! precise audio times and to route them into the graph:
//!
//! * [`Synth`] creates a [`Voice`] for a pattern value.
//! * [`Voice`] is one sounding note: it can be started, stopped, connected into a [`NodeId`] and
//!   reports when it has ended.
//! * [`Modulator`] is a long running control source that is started and stopped on bar
//!   boundaries.
//! * [`Observer`] delivers external events, such as MIDI input, to callbacks registered by id.
//!
//! Two implementations are provided: [`Recorder`], which records every call for inspection, and
//! [`osc::OscSynth`], which drives a SuperCollider server over OSC.

use std::{fmt, io};
use thiserror::Error;

pub mod osc;
mod recorder;

pub use recorder::{Call, Recorder, RecorderObserver};

/// A specialized [`Result`] type for collaborator operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The error type returned by collaborators.
#[derive(Debug, Error)]
pub enum Error {
    #[error("voice {0} has already been stopped")]
    AlreadyStopped(String),
    #[error("cannot connect into node {0}")]
    Connect(NodeId),
    #[error("encoding OSC packet: {0:?}")]
    OscEncode(rosc::OscError),
    #[error("sending packet: {0}")]
    Send(#[source] io::Error),
    #[error("{0}")]
    Other(String),
}

/// A node of the audio graph that voices can be connected into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Ord, PartialOrd, Hash)]
pub struct NodeId(pub i32);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One sounding note.
///
/// Times are audio times in seconds, on the same time line as the
/// [`Clock`](crate::clock::Clock).
pub trait Voice {
    fn start(&mut self, at: f64) -> Result<()>;

    /// Releases the voice at `at`. The voice may keep sounding for a short fade after that.
    ///
    /// Stopping a voice again moves its release to the earlier of the two times. A stopped voice
    /// cannot be started.
    fn stop(&mut self, at: f64) -> Result<()>;

    /// Withdraws a voice whose start time has not come yet, so that it never sounds. The ended
    /// callback runs right away.
    fn cancel(&mut self) -> Result<()>;

    fn connect(&mut self, into: NodeId) -> Result<()>;

    fn disconnect(&mut self) -> Result<()>;

    /// Registers a callback to run once the voice has finished sounding.
    fn on_ended(&mut self, callback: Box<dyn FnOnce()>);
}

/// Creates voices for pattern values.
pub trait Synth<T> {
    fn voice(&mut self, value: &T) -> Result<Box<dyn Voice>>;
}

/// A control source that runs for as long as the evaluation that created it is active.
pub trait Modulator {
    fn name(&self) -> &str;

    fn start(&mut self, at: f64) -> Result<()>;

    fn stop(&mut self, at: f64) -> Result<()>;
}

/// A callback receiving raw external messages, such as MIDI bytes.
pub type ObserverCallback = Box<dyn FnMut(&[u8])>;

/// A source of external events that delivers them to callbacks registered under an id.
///
/// Registering a second callback under the same id replaces the first.
pub trait Observer {
    fn register(&mut self, id: &str, callback: ObserverCallback);

    fn unregister(&mut self, id: &str);
}
