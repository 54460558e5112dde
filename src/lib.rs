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

//! A bar-synchronized engine for live coding music.
//!
//! # Introduction
//!
//! Live coding is the practice of writing and rewriting the program that makes music while the
//! music plays. Every time the performer evaluates their code, the new version has to replace the
//! old one without a glitch: no gap in the sound, no doubled notes, and no change landing in the
//! middle of a bar. Barline provides the parts needed to do that:
//!
//!  * [`pattern`](crate::pattern) - [`PatternArray`](pattern::PatternArray), a cyclic sequence of
//!    bars ("cycles") made of equally spaced slots, and an algebra of transformations over it:
//!    speeding up and slowing down, reversing, rotating, Euclidean rhythms, hex and `x-x-` drum
//!    notation and a small text notation for sequences.
//!
//!  * [`clock`](crate::clock) - A lookahead [`Clock`](clock::Clock) that announces beats and bars
//!    slightly before they happen, with the exact audio time they happen at. Each beat and bar is
//!    preceded by a pre-event that fires even earlier.
//!
//!  * [`session`](crate::session) - The commit protocol. What an evaluation enqueues is held back
//!    until the next bar: the pre-bar event retires what is playing at exactly the bar line, and
//!    the bar event installs the new evaluation and plays it.
//!
//!  * [`instrument`](crate::instrument) - An [`Instrument`](instrument::Instrument) plays one
//!    cycle of its pattern per bar through a synth.
//!
//!  * [`graph`](crate::graph) - The interfaces to the outside world: synths, voices, modulators
//!    and observers of external input. [`graph::osc`] plays voices on a
//!    [SuperCollider](https://supercollider.github.io/) server and
//!    [`Recorder`](graph::Recorder) records what would have been played.
//!
//!  * [`engine`](crate::engine) - An [`Engine`](engine::Engine) wires a clock and a session
//!    together and runs evaluations.
//!
//!  * [`scheduler`](crate::scheduler) - Drives the clock in real time.
//!
//! Everything runs on a single thread. The clock does not own a timer; something has to call
//! [`Clock::tick`](clock::Clock::tick) regularly, which is what the scheduler does.
//!
//! # Examples
//!
//! This example plays a four on the floor kick drum and an offbeat hi-hat on a SuperCollider
//! server for a minute.
//!
//! ```no_run
//! # use std::error::Error;
//! use barline::{
//!     clock::SystemTimeSource,
//!     engine::{Engine, EngineConfig},
//!     graph::osc::OscSynth,
//!     instrument::Instrument,
//!     pattern::Slot,
//!     scheduler::Scheduler,
//! };
//! use std::{thread, time::Duration};
//!
//! fn main() -> Result<(), Box<dyn Error>> {
//!     // Audio time zero is the moment the time source is created. The anchor lets the OSC
//!     // synths translate audio times into OSC time tags.
//!     let time = SystemTimeSource::new();
//!     let anchor = time.anchor();
//!     let engine = Engine::new(EngineConfig::default().bpm(124.0), time);
//!
//!     // The synth definitions must already be loaded on a server listening on this port.
//!     let kick = OscSynth::connect("kick", "127.0.0.1:57110", anchor)?;
//!     let hats = OscSynth::connect("hats", "127.0.0.1:57110", anchor)?;
//!
//!     engine.evaluate(|eval| {
//!         eval.enqueue(
//!             Instrument::new("kick", kick)
//!                 .note(vec![Slot::Value(36.0)])
//!                 .euclid(4, 4, 0),
//!         );
//!         eval.enqueue(
//!             Instrument::new("hats", hats)
//!                 .note(vec![Slot::Value(80.0)])
//!                 .xox(vec!["-x-x"]),
//!         );
//!         Ok::<(), String>(())
//!     })?;
//!     engine.start();
//!
//!     // The scheduler drives the clock on this thread until another thread cancels it.
//!     let scheduler = Scheduler::new();
//!     let handle = scheduler.handle();
//!     thread::spawn(move || {
//!         thread::sleep(Duration::from_secs(60));
//!         handle.cancel();
//!     });
//!     engine.run(scheduler)?;
//!     Ok(())
//! }
//! ```
//!
//! # Timing
//!
//! All times are audio times: seconds on the time line of the clock's
//! [`TimeSource`](clock::TimeSource). The clock announces a beat `schedule_ahead` seconds before
//! it happens and its pre-event `prefire_offset` seconds before that, so collaborators always
//! receive start and stop times in the future. [`ManualTime`](clock::ManualTime) replaces the
//! real time line in tests.

pub mod clock;
pub mod engine;
pub mod graph;
pub mod instrument;
pub mod pattern;
pub mod scheduler;
pub mod session;
