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

use crate::scheduler::Job;
use std::{
    sync::mpsc::{self, Receiver, Sender},
    thread,
    time::Duration,
};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// A handle to a scheduler.
///
/// Returned by [`Scheduler::handle`](super::Scheduler::handle). `Handle` primarily provides
/// [`Handle::cancel`] which cancels the scheduler that created it.
#[derive(Debug, Clone)]
pub struct Handle {
    sender: Sender<Message>,
}

impl Handle {
    /// Cancel the scheduler that created this handle.
    pub fn cancel(self) {
        let _ = self.sender.send(Message::Quit);
    }
}

#[derive(Debug)]
pub struct Scheduler {
    receiver: Receiver<Message>,
    sender: Sender<Message>,
}

impl Default for Scheduler {
    fn default() -> Scheduler {
        let (sender, receiver) = mpsc::channel();
        Scheduler { receiver, sender }
    }
}

impl Scheduler {
    pub fn handle(&self) -> Handle {
        let sender = self.sender.clone();
        Handle { sender }
    }

    pub fn run<J: Job>(self, mut job: J) -> Result<()> {
        let delay_sender = spawn_delay(self.sender.clone());

        loop {
            let delay = match job.run() {
                Some(delay) => delay,
                None => {
                    log::debug!("scheduler: job finished");
                    return Ok(());
                }
            };
            delay_sender
                .send(delay)
                .map_err(|_| Error::DelayThreadGone)?;

            match self.receiver.recv().unwrap_or(Message::Quit) {
                Message::DelayPassed => {}
                Message::Quit => {
                    log::debug!("scheduler: cancelled");
                    return Ok(());
                }
            }
        }
    }
}

#[derive(Debug)]
pub enum Message {
    DelayPassed,
    Quit,
}

fn spawn_delay(message_sender: Sender<Message>) -> Sender<Duration> {
    let (delay_sender, delays) = mpsc::channel();
    thread::spawn({
        move || {
            for delay in delays {
                thread::sleep(delay);
                if message_sender.send(Message::DelayPassed).is_err() {
                    break;
                }
            }
        }
    });
    delay_sender
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("the delay thread stopped unexpectedly")]
    DelayThreadGone,
}
