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

//! Instruments: a pattern bound to a synth.
//!
//! An [`Instrument`] owns a [`PatternArray`] and a [`Synth`]. Every bar the
//! [`Session`](crate::session::Session) asks it to [`play`](Instrument::play) the cycle for that
//! bar: each slot of the cycle gets an equal share of the bar, and each value slot becomes one
//! voice that is started at the beginning of its share and released at the end. Rests are
//! silent.
//!
//! # Examples
//!
//! ```
//! use barline::{clock::Metronome, graph::Recorder, instrument::Instrument, pattern::Slot};
//!
//! let recorder = Recorder::new();
//! let mut bass = Instrument::new("bass", recorder.clone())
//!     .note(vec![Slot::values(vec![36, 36]), Slot::values(vec![43])]);
//!
//! let bar = Metronome { bar: 1, beat: 0, time: 2.0, beat_duration: 0.5 };
//! bass.play(&bar, 2.0)?;
//!
//! assert_eq!(recorder.starts(), vec![("43".to_string(), 2.0)]);
//! # barline::graph::Result::Ok(())
//! ```

use crate::{
    clock::Metronome,
    graph::{self, NodeId, Synth, Voice},
    pattern::{Cycle, HexToken, PatternArray, Spread, XoxToken},
};
use std::{cell::Cell, fmt, rc::Rc, str::FromStr};

/// Something the session can play every bar and retire when it is replaced.
pub trait Playable {
    fn name(&self) -> &str;

    /// Realizes the bar starting at `metronome`, which lasts `bar_duration` seconds. Returns the
    /// number of voices started.
    fn play(&mut self, metronome: &Metronome, bar_duration: f64) -> graph::Result<usize>;

    /// Releases everything still sounding after `at` at exactly `at` and withdraws anything due
    /// to start later. A retired playable never plays again.
    fn retire(&mut self, at: f64) -> graph::Result<()>;
}

/// A pattern of values played through a synth.
pub struct Instrument<T> {
    name: String,
    pattern: PatternArray<T>,
    synth: Box<dyn Synth<T>>,
    output: Option<NodeId>,
    voices: Vec<Sounding>,
    retired: bool,
}

struct Sounding {
    voice: Box<dyn Voice>,
    start_at: f64,
    stop_at: f64,
    ended: Rc<Cell<bool>>,
}

impl<T> fmt::Debug for Instrument<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instrument")
            .field("name", &self.name)
            .field("output", &self.output)
            .field("voices", &self.voices.len())
            .field("retired", &self.retired)
            .finish()
    }
}

impl<T: Clone> Instrument<T> {
    /// Creates an instrument with an empty pattern.
    pub fn new(name: impl Into<String>, synth: impl Synth<T> + 'static) -> Instrument<T> {
        Instrument {
            name: name.into(),
            pattern: PatternArray::default(),
            synth: Box::new(synth),
            output: None,
            voices: Vec::new(),
            retired: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pattern(&self) -> &PatternArray<T> {
        &self.pattern
    }

    /// Replaces the whole pattern.
    pub fn with_pattern(mut self, pattern: PatternArray<T>) -> Self {
        self.pattern = pattern;
        self
    }

    /// Routes voices created from now on into `node`.
    pub fn connect(mut self, node: NodeId) -> Self {
        self.output = Some(node);
        self
    }

    /// Stops routing new voices into a node.
    pub fn disconnect(mut self) -> Self {
        self.output = None;
        self
    }

    pub fn note<I, C>(self, cycles: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<Cycle<T>>,
    {
        self.map_pattern(|pattern| pattern.note(cycles))
    }

    pub fn fast(self, n: f64) -> Self {
        self.map_pattern(|pattern| pattern.fast(n))
    }

    pub fn slow(self, n: f64) -> Self {
        self.map_pattern(|pattern| pattern.slow(n))
    }

    pub fn stretch(self, factor: f64) -> Self {
        self.map_pattern(|pattern| pattern.stretch(factor))
    }

    pub fn reverse(self) -> Self {
        self.map_pattern(PatternArray::reverse)
    }

    pub fn rotate(self, n: i64) -> Self {
        self.map_pattern(|pattern| pattern.rotate(n))
    }

    pub fn chop(self, n: usize) -> Self {
        self.map_pattern(|pattern| pattern.chop(n))
    }

    pub fn arrange<I>(self, sections: I) -> Self
    where
        I: IntoIterator<Item = (i64, Cycle<T>)>,
    {
        self.map_pattern(|pattern| pattern.arrange(sections))
    }

    pub fn euclid(self, pulses: impl Into<Spread>, steps: i64, rotation: impl Into<Spread>) -> Self {
        self.map_pattern(|pattern| pattern.euclid(pulses, steps, rotation))
    }

    pub fn hex<I, H>(self, tokens: I) -> Self
    where
        I: IntoIterator<Item = H>,
        H: Into<HexToken>,
    {
        self.map_pattern(|pattern| pattern.hex(tokens))
    }

    pub fn xox<I, X>(self, tokens: I) -> Self
    where
        I: IntoIterator<Item = X>,
        X: Into<XoxToken>,
    {
        self.map_pattern(|pattern| pattern.xox(tokens))
    }

    fn map_pattern(mut self, f: impl FnOnce(PatternArray<T>) -> PatternArray<T>) -> Self {
        self.pattern = f(std::mem::take(&mut self.pattern));
        self
    }

    /// Plays the cycle for `metronome.bar`, spreading its slots evenly over `bar_duration`
    /// seconds starting at `metronome.time`.
    ///
    /// # Errors
    ///
    /// Returns the first error reported by the synth or a voice. Voices started before the error
    /// keep playing.
    pub fn play(&mut self, metronome: &Metronome, bar_duration: f64) -> graph::Result<usize> {
        self.prune(metronome.time);
        if self.retired {
            log::debug!("{}: retired, not playing bar {}", self.name, metronome.bar);
            return Ok(0);
        }

        let cycle = self.pattern.cycle(metronome.bar as i64);
        if cycle.is_empty() {
            return Ok(0);
        }
        let slot_duration = bar_duration / cycle.len() as f64;

        let mut started = 0;
        for (index, slot) in cycle.iter().enumerate() {
            let value = match slot.value() {
                Some(value) => value,
                None => continue,
            };
            let start = metronome.time + index as f64 * slot_duration;
            let stop = start + slot_duration;

            let mut voice = self.synth.voice(value)?;
            if let Some(node) = self.output {
                voice.connect(node)?;
            }
            let ended = Rc::new(Cell::new(false));
            {
                let ended = Rc::clone(&ended);
                voice.on_ended(Box::new(move || ended.set(true)));
            }
            voice.start(start)?;
            voice.stop(stop)?;
            self.voices.push(Sounding {
                voice,
                start_at: start,
                stop_at: stop,
                ended,
            });
            started += 1;
        }
        log::debug!(
            "{}: bar {} started {} voices at {}",
            self.name,
            metronome.bar,
            started,
            metronome.time
        );
        Ok(started)
    }

    /// Moves the release of every voice still sounding after `at` to `at`, cancels voices due
    /// to start at or after `at`, and stops playing new bars.
    ///
    /// A tempo change can move a bar line in front of voices that were scheduled a whole bar
    /// ahead, which is why some voices may not have started yet.
    ///
    /// # Errors
    ///
    /// Every voice is asked to stop even if some fail; the first failure is returned.
    pub fn retire(&mut self, at: f64) -> graph::Result<()> {
        self.retired = true;
        let mut result = Ok(());
        for sounding in &mut self.voices {
            if sounding.ended.get() || sounding.stop_at <= at {
                continue;
            }
            let outcome = if sounding.start_at >= at {
                sounding.voice.cancel().map(|()| sounding.ended.set(true))
            } else {
                sounding.voice.stop(at).map(|()| sounding.stop_at = at)
            };
            if let Err(err) = outcome {
                log::warn!("{}: failed to cut voice at {}: {}", self.name, at, err);
                if result.is_ok() {
                    result = Err(err);
                }
            }
        }
        result
    }

    pub fn is_retired(&self) -> bool {
        self.retired
    }

    /// The number of voices that may still be sounding.
    pub fn sounding(&self) -> usize {
        self.voices
            .iter()
            .filter(|sounding| !sounding.ended.get())
            .count()
    }

    fn prune(&mut self, now: f64) {
        self.voices
            .retain(|sounding| !sounding.ended.get() && sounding.stop_at > now);
    }
}

impl<T: Clone + FromStr> Instrument<T> {
    pub fn sequence(self, text: &str) -> Self {
        self.map_pattern(|pattern| pattern.sequence(text))
    }
}

impl<T: Clone> Playable for Instrument<T> {
    fn name(&self) -> &str {
        Instrument::name(self)
    }

    fn play(&mut self, metronome: &Metronome, bar_duration: f64) -> graph::Result<usize> {
        Instrument::play(self, metronome, bar_duration)
    }

    fn retire(&mut self, at: f64) -> graph::Result<()> {
        Instrument::retire(self, at)
    }
}
