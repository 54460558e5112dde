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

//! A repeating timer for polling jobs.
//!
//! This module provides the timer that drives a [`Clock`](crate::clock::Clock). A [`Scheduler`]
//! invokes [`Job::run`] on a job continuously. The interval until the next invocation is the
//! [`Duration`] returned by `Job::run`, and the scheduler stops once the job returns `None`.
//!
//! The job always runs on the thread that called [`Scheduler::run`]; a helper thread does nothing
//! but sleep between invocations. This keeps the single threaded model of the clock and the
//! session intact while still letting another thread cancel the scheduler through a [`Handle`].
//!
//! # Examples
//!
//! ```no_run
//! use barline::scheduler::Scheduler;
//! use std::time::Duration;
//!
//! let mut beats = 0..4;
//! Scheduler::new().run(move || {
//!     let beat = beats.next()?;
//!     println!("beat {}", beat);
//!     Some(Duration::from_millis(500))
//! })?;
//! # barline::scheduler::Result::Ok(())
//! ```
//!
//! # Timing
//!
//! The delay between invocations is only as precise as [`std::thread::sleep`], which is on the
//! order of 10ths of milliseconds on a modern desktop computer. Jobs that need precise timing
//! should not rely on when they are run. The clock, for example, looks ahead by a fixed window
//! and stamps every event with the audio time it should sound at.

use std::time::Duration;
use thiserror::Error;

mod scheduler_impl;

pub use scheduler_impl::Handle;

/// A specialized [`Result`] type for scheduler errors.
pub type Result<T> = std::result::Result<T, Error>;

/// The error type returned by [`Scheduler`] operations.
#[derive(Debug, Error)]
#[error(transparent)]
pub struct Error(scheduler_impl::Error);

/// A repeating timer for recurring jobs.
#[derive(Debug, Default)]
pub struct Scheduler(scheduler_impl::Scheduler);

impl Scheduler {
    /// Create a new scheduler
    pub fn new() -> Scheduler {
        Scheduler(scheduler_impl::Scheduler::default())
    }

    /// Returns a [`Handle`] which can be used to stop a [`Scheduler`] from another thread.
    ///
    /// The [`Scheduler::run`] method will return right after the job's current invocation once
    /// [`Handle::cancel`] is called on the handle returned by this method.
    pub fn handle(&self) -> Handle {
        self.0.handle()
    }

    /// Runs the job until it returns `None` or the scheduler is cancelled.
    ///
    /// This function will block until the job has finished running.
    pub fn run(self, job: impl Job) -> Result<()> {
        self.0.run(job).map_err(Error)
    }
}

/// A recurring job.
pub trait Job {
    /// Runs the job and returns how long to wait before running it again.
    ///
    /// Returning `None` stops the scheduler.
    fn run(&mut self) -> Option<Duration>;
}

impl<F> Job for F
where
    F: FnMut() -> Option<Duration>,
{
    fn run(&mut self) -> Option<Duration> {
        self()
    }
}
