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

use super::{Error, Modulator, NodeId, Observer, ObserverCallback, Result, Synth, Voice};
use std::{
    cell::RefCell,
    collections::{HashMap, HashSet},
    fmt,
    rc::Rc,
};

/// A collaborator call captured by a [`Recorder`].
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Created { voice: u64, value: String },
    Start { voice: u64, at: f64 },
    Stop { voice: u64, at: f64 },
    Cancel { voice: u64 },
    Connect { voice: u64, into: NodeId },
    Disconnect { voice: u64 },
    ModulatorStart { name: String, at: f64 },
    ModulatorStop { name: String, at: f64 },
}

/// A collaborator that makes no sound and records every call made to it.
///
/// Clones share the same log, so one clone can be handed to an instrument while another is kept
/// for inspection. Voices created from any value implementing [`Debug`](fmt::Debug) are labelled
/// with its debug representation.
///
/// Voices never end on their own. Call [`end_voices`](Recorder::end_voices) to run the ended
/// callbacks of voices that were stopped before a given time.
///
/// # Examples
///
/// ```
/// use barline::graph::{Call, Recorder, Synth};
///
/// let recorder = Recorder::new();
/// let mut synth = recorder.clone();
/// let mut voice = synth.voice(&60)?;
/// voice.start(1.0)?;
/// voice.stop(1.5)?;
///
/// assert_eq!(recorder.starts(), vec![("60".to_string(), 1.0)]);
/// assert_eq!(recorder.calls().last(), Some(&Call::Stop { voice: 0, at: 1.5 }));
/// # barline::graph::Result::Ok(())
/// ```
#[derive(Clone, Default)]
pub struct Recorder(Rc<RefCell<RecorderInner>>);

#[derive(Default)]
struct RecorderInner {
    calls: Vec<Call>,
    next_voice: u64,
    stops: HashMap<u64, f64>,
    ended: HashMap<u64, Box<dyn FnOnce()>>,
    refuse_stops: bool,
}

impl fmt::Debug for Recorder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.0.borrow();
        f.debug_struct("Recorder")
            .field("calls", &inner.calls.len())
            .field("voices", &inner.next_voice)
            .finish()
    }
}

impl Recorder {
    pub fn new() -> Recorder {
        Recorder::default()
    }

    /// Returns every call recorded so far.
    pub fn calls(&self) -> Vec<Call> {
        self.0.borrow().calls.clone()
    }

    /// Returns the recorded calls and clears the log.
    pub fn take_calls(&self) -> Vec<Call> {
        std::mem::take(&mut self.0.borrow_mut().calls)
    }

    /// Returns the label and start time of every voice start, in call order. Voices that were
    /// cancelled afterwards are left out, since they never sounded.
    pub fn starts(&self) -> Vec<(String, f64)> {
        let inner = self.0.borrow();
        let labels: HashMap<u64, &str> = inner
            .calls
            .iter()
            .filter_map(|call| match call {
                Call::Created { voice, value } => Some((*voice, value.as_str())),
                _ => None,
            })
            .collect();
        let cancelled: HashSet<u64> = inner
            .calls
            .iter()
            .filter_map(|call| match call {
                Call::Cancel { voice } => Some(*voice),
                _ => None,
            })
            .collect();
        inner
            .calls
            .iter()
            .filter_map(|call| match call {
                Call::Start { voice, at } if !cancelled.contains(voice) => {
                    Some((labels.get(voice).copied().unwrap_or("").to_string(), *at))
                }
                _ => None,
            })
            .collect()
    }

    /// Returns the stop times of every voice stop, in call order.
    pub fn stops(&self) -> Vec<f64> {
        self.0
            .borrow()
            .calls
            .iter()
            .filter_map(|call| match call {
                Call::Stop { at, .. } => Some(*at),
                _ => None,
            })
            .collect()
    }

    /// Creates a modulator that records into this log.
    pub fn modulator(&self, name: impl Into<String>) -> RecordingModulator {
        RecordingModulator {
            recorder: self.clone(),
            name: name.into(),
        }
    }

    /// Makes every subsequent voice stop fail.
    pub fn refuse_stops(&self, refuse: bool) {
        self.0.borrow_mut().refuse_stops = refuse;
    }

    /// Runs the ended callbacks of voices that were stopped at or before `until`.
    pub fn end_voices(&self, until: f64) {
        let callbacks: Vec<Box<dyn FnOnce()>> = {
            let mut inner = self.0.borrow_mut();
            let mut ids: Vec<u64> = inner
                .stops
                .iter()
                .filter(|(_, at)| **at <= until)
                .map(|(id, _)| *id)
                .collect();
            ids.sort_unstable();
            ids.iter()
                .filter_map(|id| {
                    inner.stops.remove(id);
                    inner.ended.remove(id)
                })
                .collect()
        };
        for callback in callbacks {
            callback();
        }
    }

    fn record(&self, call: Call) {
        self.0.borrow_mut().calls.push(call);
    }
}

impl<T: fmt::Debug> Synth<T> for Recorder {
    fn voice(&mut self, value: &T) -> Result<Box<dyn Voice>> {
        let id = {
            let mut inner = self.0.borrow_mut();
            let id = inner.next_voice;
            inner.next_voice += 1;
            id
        };
        self.record(Call::Created {
            voice: id,
            value: format!("{:?}", value),
        });
        Ok(Box::new(RecordingVoice {
            recorder: self.clone(),
            id,
            stopped: false,
        }))
    }
}

struct RecordingVoice {
    recorder: Recorder,
    id: u64,
    stopped: bool,
}

impl Voice for RecordingVoice {
    fn start(&mut self, at: f64) -> Result<()> {
        if self.stopped {
            return Err(Error::AlreadyStopped(self.id.to_string()));
        }
        self.recorder.record(Call::Start { voice: self.id, at });
        Ok(())
    }

    fn stop(&mut self, at: f64) -> Result<()> {
        if self.recorder.0.borrow().refuse_stops {
            return Err(Error::Other(format!("voice {} refused to stop", self.id)));
        }
        self.stopped = true;
        self.recorder.record(Call::Stop { voice: self.id, at });
        let mut inner = self.recorder.0.borrow_mut();
        let stop = inner.stops.entry(self.id).or_insert(at);
        *stop = stop.min(at);
        Ok(())
    }

    fn cancel(&mut self) -> Result<()> {
        self.stopped = true;
        self.recorder.record(Call::Cancel { voice: self.id });
        let ended = {
            let mut inner = self.recorder.0.borrow_mut();
            inner.stops.remove(&self.id);
            inner.ended.remove(&self.id)
        };
        if let Some(ended) = ended {
            ended();
        }
        Ok(())
    }

    fn connect(&mut self, into: NodeId) -> Result<()> {
        self.recorder.record(Call::Connect {
            voice: self.id,
            into,
        });
        Ok(())
    }

    fn disconnect(&mut self) -> Result<()> {
        self.recorder.record(Call::Disconnect { voice: self.id });
        Ok(())
    }

    fn on_ended(&mut self, callback: Box<dyn FnOnce()>) {
        self.recorder.0.borrow_mut().ended.insert(self.id, callback);
    }
}

/// A [`Modulator`] created by [`Recorder::modulator`].
#[derive(Debug, Clone)]
pub struct RecordingModulator {
    recorder: Recorder,
    name: String,
}

impl Modulator for RecordingModulator {
    fn name(&self) -> &str {
        &self.name
    }

    fn start(&mut self, at: f64) -> Result<()> {
        self.recorder.record(Call::ModulatorStart {
            name: self.name.clone(),
            at,
        });
        Ok(())
    }

    fn stop(&mut self, at: f64) -> Result<()> {
        self.recorder.record(Call::ModulatorStop {
            name: self.name.clone(),
            at,
        });
        Ok(())
    }
}

/// An [`Observer`] whose messages are injected by hand.
///
/// Clones share the same registrations.
#[derive(Clone, Default)]
pub struct RecorderObserver(Rc<RefCell<HashMap<String, Rc<RefCell<ObserverCallback>>>>>);

impl fmt::Debug for RecorderObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("RecorderObserver")
            .field(&self.registered())
            .finish()
    }
}

impl RecorderObserver {
    pub fn new() -> RecorderObserver {
        RecorderObserver::default()
    }

    /// Returns the registered ids in sorted order.
    pub fn registered(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.0.borrow().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Delivers `message` to the callback registered under `id`. Returns false if there is none.
    pub fn emit(&self, id: &str, message: &[u8]) -> bool {
        let callback = self.0.borrow().get(id).cloned();
        match callback {
            Some(callback) => match callback.try_borrow_mut() {
                Ok(mut callback) => {
                    callback(message);
                    true
                }
                Err(_) => {
                    log::warn!("observer callback {:?} re-entered, message dropped", id);
                    false
                }
            },
            None => false,
        }
    }
}

impl Observer for RecorderObserver {
    fn register(&mut self, id: &str, callback: ObserverCallback) {
        self.0
            .borrow_mut()
            .insert(id.to_string(), Rc::new(RefCell::new(callback)));
    }

    fn unregister(&mut self, id: &str) {
        self.0.borrow_mut().remove(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::cell::Cell;

    #[test]
    fn ended_callbacks_run_once_stop_time_passes() {
        let recorder = Recorder::new();
        let mut synth = recorder.clone();
        let ended = Rc::new(Cell::new(0));

        for (value, stop) in vec![(1, 1.0), (2, 2.0)] {
            let mut voice = synth.voice(&value).unwrap();
            let ended = Rc::clone(&ended);
            voice.on_ended(Box::new(move || ended.set(ended.get() + 1)));
            voice.start(0.0).unwrap();
            voice.stop(stop).unwrap();
        }

        recorder.end_voices(0.5);
        assert_eq!(ended.get(), 0);
        recorder.end_voices(1.0);
        assert_eq!(ended.get(), 1);
        recorder.end_voices(5.0);
        recorder.end_voices(5.0);
        assert_eq!(ended.get(), 2);
    }

    #[test]
    fn earliest_stop_wins() {
        let recorder = Recorder::new();
        let mut synth = recorder.clone();
        let ended = Rc::new(Cell::new(false));
        let mut voice = synth.voice(&1).unwrap();
        {
            let ended = Rc::clone(&ended);
            voice.on_ended(Box::new(move || ended.set(true)));
        }
        voice.stop(2.0).unwrap();
        voice.stop(1.0).unwrap();
        assert!(matches!(voice.start(0.0), Err(Error::AlreadyStopped(_))));
        assert_eq!(recorder.stops(), vec![2.0, 1.0]);

        recorder.end_voices(1.0);
        assert!(ended.get());
    }

    #[test]
    fn cancelled_voices_end_at_once_and_are_not_listed() {
        let recorder = Recorder::new();
        let mut synth = recorder.clone();
        let ended = Rc::new(Cell::new(0));
        for value in 1..=2 {
            let mut voice = synth.voice(&value).unwrap();
            let ended = Rc::clone(&ended);
            voice.on_ended(Box::new(move || ended.set(ended.get() + 1)));
            voice.start(f64::from(value)).unwrap();
            voice.stop(3.0).unwrap();
            if value == 2 {
                voice.cancel().unwrap();
            }
        }
        assert_eq!(ended.get(), 1);
        assert_eq!(recorder.starts(), vec![("1".to_string(), 1.0)]);

        recorder.end_voices(5.0);
        assert_eq!(ended.get(), 2);
    }

    #[test]
    fn refused_stops_are_not_recorded() {
        let mut synth = Recorder::new();
        let mut voice = Synth::<i32>::voice(&mut synth, &1).unwrap();
        synth.refuse_stops(true);
        assert!(voice.stop(1.0).is_err());
        synth.refuse_stops(false);
        voice.stop(1.0).unwrap();
        assert_eq!(synth.stops(), vec![1.0]);
    }

    #[test]
    fn observer_callbacks_can_unregister_themselves() {
        let observer = RecorderObserver::new();
        let mut handle = observer.clone();
        let seen = Rc::new(RefCell::new(Vec::new()));
        {
            let seen = Rc::clone(&seen);
            let mut inner = observer.clone();
            handle.register(
                "knob",
                Box::new(move |bytes| {
                    seen.borrow_mut().push(bytes.to_vec());
                    inner.unregister("knob");
                }),
            );
        }

        assert!(observer.emit("knob", &[176, 1, 64]));
        assert_eq!(observer.registered(), Vec::<String>::new());
        assert!(!observer.emit("knob", &[176, 1, 65]));
        assert_eq!(*seen.borrow(), vec![vec![176, 1, 64]]);
    }
}
