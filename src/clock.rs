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

//! A lookahead beat clock.
//!
//! The [`Clock`] turns a monotonic audio time into musical events. It is polled by a repeating
//! timer (see [`scheduler`](crate::scheduler)) and on every pass it looks a short window into the
//! future. Beats that start inside that window are announced right away, together with the exact
//! audio time they will sound at, so listeners can schedule audio ahead of time without jitter.
//!
//! Each beat is announced twice:
//!
//! * A *pre-event* ([`ClockEvent::PreBeat`], plus [`ClockEvent::PreBar`] on the first beat of a
//!   bar) is fired slightly earlier than the beat itself, when the beat enters the lookahead
//!   window extended by the pre-fire offset. It carries the upcoming position and time.
//! * The *event* ([`ClockEvent::Beat`], plus [`ClockEvent::Bar`] on the first beat of a bar)
//!   is fired when the beat enters the lookahead window.
//!
//! The pre-event of a beat is always dispatched before the beat itself. The session uses this to
//! retire old voices before the boundary that installs new ones.
//!
//! # Examples
//!
//! ```
//! use barline::clock::{Clock, ClockConfig, ClockEvent, ClockEventKind, ManualTime};
//! use std::{cell::RefCell, rc::Rc};
//!
//! let time = ManualTime::new();
//! let clock = Clock::new(time.clone(), ClockConfig::default());
//!
//! let bars = Rc::new(RefCell::new(Vec::new()));
//! let seen = bars.clone();
//! clock.on(ClockEventKind::Bar, move |event: &ClockEvent| {
//!     if let Some(metronome) = event.metronome() {
//!         seen.borrow_mut().push((metronome.bar, metronome.time));
//!     }
//! });
//!
//! clock.start();
//! for step in 1..=80 {
//!     time.set(step as f64 * 0.025);
//!     clock.tick();
//! }
//!
//! assert_eq!(*bars.borrow(), vec![(0, 0.0), (1, 2.0)]);
//! ```

use crate::scheduler::Job;
use serde::{Deserialize, Serialize};
use std::{
    cell::{Cell, RefCell},
    fmt,
    rc::Rc,
    time::{Duration, Instant, SystemTime},
};

mod listeners;

pub use listeners::ListenerId;

use listeners::Registry;

/// A monotonic audio time source, in seconds.
pub trait TimeSource {
    /// The current audio time. Must never decrease.
    fn now(&self) -> f64;

    /// Whether the underlying audio device is suspended.
    fn is_suspended(&self) -> bool {
        false
    }

    /// Resumes a suspended audio device.
    fn resume(&self) {}
}

/// Audio time measured from when the source was created.
#[derive(Debug, Clone, Copy)]
pub struct SystemTimeSource {
    origin: Instant,
    anchor: SystemTime,
}

impl SystemTimeSource {
    pub fn new() -> SystemTimeSource {
        SystemTimeSource {
            origin: Instant::now(),
            anchor: SystemTime::now(),
        }
    }

    /// The wall-clock time of audio time zero.
    pub fn anchor(&self) -> SystemTime {
        self.anchor
    }
}

impl Default for SystemTimeSource {
    fn default() -> SystemTimeSource {
        SystemTimeSource::new()
    }
}

impl TimeSource for SystemTimeSource {
    fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }
}

/// A time source that only moves when told to.
///
/// Clones share the same time, so a test can keep one clone and hand another to a [`Clock`].
#[derive(Debug, Clone, Default)]
pub struct ManualTime(Rc<ManualTimeInner>);

#[derive(Debug, Default)]
struct ManualTimeInner {
    now: Cell<f64>,
    suspended: Cell<bool>,
}

impl ManualTime {
    pub fn new() -> ManualTime {
        ManualTime::default()
    }

    /// Sets the current time. Times earlier than the current time are ignored.
    pub fn set(&self, now: f64) {
        if now >= self.0.now.get() {
            self.0.now.set(now);
        }
    }

    pub fn advance(&self, seconds: f64) {
        self.set(self.0.now.get() + seconds);
    }

    pub fn suspend(&self) {
        self.0.suspended.set(true);
    }
}

impl TimeSource for ManualTime {
    fn now(&self) -> f64 {
        self.0.now.get()
    }

    fn is_suspended(&self) -> bool {
        self.0.suspended.get()
    }

    fn resume(&self) {
        self.0.suspended.set(false);
    }
}

/// Tempo and scheduling windows for a [`Clock`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClockConfig {
    /// Beats per minute.
    pub bpm: f64,
    pub beats_per_bar: u32,
    /// Seconds between scheduling passes.
    pub lookahead: f64,
    /// Seconds ahead of the current time that beats are announced.
    pub schedule_ahead: f64,
    /// Extra seconds ahead of `schedule_ahead` that pre-events are announced.
    pub prefire_offset: f64,
}

impl Default for ClockConfig {
    fn default() -> ClockConfig {
        ClockConfig {
            bpm: 120.0,
            beats_per_bar: 4,
            lookahead: 0.025,
            schedule_ahead: 0.1,
            prefire_offset: 0.05,
        }
    }
}

impl ClockConfig {
    pub fn bpm(mut self, bpm: f64) -> Self {
        self.bpm = bpm;
        self
    }

    pub fn beats_per_bar(mut self, beats_per_bar: u32) -> Self {
        self.beats_per_bar = beats_per_bar;
        self
    }

    pub fn lookahead(mut self, lookahead: f64) -> Self {
        self.lookahead = lookahead;
        self
    }

    pub fn schedule_ahead(mut self, schedule_ahead: f64) -> Self {
        self.schedule_ahead = schedule_ahead;
        self
    }

    pub fn prefire_offset(mut self, prefire_offset: f64) -> Self {
        self.prefire_offset = prefire_offset;
        self
    }

    /// Replaces out of range values with their defaults.
    pub fn sanitized(self) -> ClockConfig {
        let defaults = ClockConfig::default();
        let positive = |value: f64, default: f64, name: &str| {
            if value.is_finite() && value > 0.0 {
                value
            } else {
                log::warn!("clock: invalid {} {}, using {}", name, value, default);
                default
            }
        };
        let non_negative = |value: f64, default: f64, name: &str| {
            if value.is_finite() && value >= 0.0 {
                value
            } else {
                log::warn!("clock: invalid {} {}, using {}", name, value, default);
                default
            }
        };
        ClockConfig {
            bpm: positive(self.bpm, defaults.bpm, "bpm"),
            beats_per_bar: if self.beats_per_bar == 0 {
                log::warn!("clock: invalid beats per bar 0, using {}", defaults.beats_per_bar);
                defaults.beats_per_bar
            } else {
                self.beats_per_bar
            },
            lookahead: positive(self.lookahead, defaults.lookahead, "lookahead"),
            schedule_ahead: non_negative(self.schedule_ahead, defaults.schedule_ahead, "schedule ahead"),
            prefire_offset: non_negative(self.prefire_offset, defaults.prefire_offset, "prefire offset"),
        }
    }
}

/// A position in musical time and when it sounds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Metronome {
    pub bar: u64,
    /// Beat within the bar, starting at zero.
    pub beat: u32,
    /// Audio time of the beat, in seconds.
    pub time: f64,
    /// Length of a beat at the tempo in effect when the event was fired.
    pub beat_duration: f64,
}

/// The kinds of events fired by a [`Clock`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClockEventKind {
    PreBeat,
    Beat,
    PreBar,
    Bar,
    Start,
    Stop,
    Pause,
}

/// An event fired by a [`Clock`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClockEvent {
    PreBeat(Metronome),
    Beat(Metronome),
    PreBar(Metronome),
    Bar(Metronome),
    Start,
    Stop,
    Pause,
}

impl ClockEvent {
    pub fn kind(&self) -> ClockEventKind {
        match self {
            ClockEvent::PreBeat(_) => ClockEventKind::PreBeat,
            ClockEvent::Beat(_) => ClockEventKind::Beat,
            ClockEvent::PreBar(_) => ClockEventKind::PreBar,
            ClockEvent::Bar(_) => ClockEventKind::Bar,
            ClockEvent::Start => ClockEventKind::Start,
            ClockEvent::Stop => ClockEventKind::Stop,
            ClockEvent::Pause => ClockEventKind::Pause,
        }
    }

    pub fn metronome(&self) -> Option<&Metronome> {
        match self {
            ClockEvent::PreBeat(metronome)
            | ClockEvent::Beat(metronome)
            | ClockEvent::PreBar(metronome)
            | ClockEvent::Bar(metronome) => Some(metronome),
            ClockEvent::Start | ClockEvent::Stop | ClockEvent::Pause => None,
        }
    }
}

/// The transport state of a [`Clock`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Stopped,
    Running,
    Paused,
    Destroyed,
}

/// A lookahead beat clock. See [the module level documentation](self) for more.
///
/// `Clock` is a cheap handle; clones refer to the same clock. Every method may be called from
/// inside one of the clock's own listeners.
#[derive(Clone)]
pub struct Clock(Rc<ClockInner>);

struct ClockInner {
    time: Box<dyn TimeSource>,
    state: RefCell<State>,
    listeners: RefCell<Registry<ClockEventKind, ClockEvent>>,
}

#[derive(Debug)]
struct State {
    config: ClockConfig,
    status: Status,
    /// -1 before the first beat after a stop.
    bar: i64,
    beat: u32,
    next_beat_time: f64,
    bar_time: f64,
    prefired: bool,
    /// When the next scheduling pass is due. `None` while the timer is cancelled.
    timer: Option<f64>,
}

impl State {
    fn upcoming(&self) -> (i64, u32) {
        let beat = self.beat + 1;
        if beat >= self.config.beats_per_bar {
            (self.bar + 1, 0)
        } else {
            (self.bar, beat)
        }
    }

    fn beat_duration(&self) -> f64 {
        60.0 / self.config.bpm
    }

    fn metronome(&self, (bar, beat): (i64, u32)) -> Metronome {
        Metronome {
            bar: bar.max(0) as u64,
            beat,
            time: self.next_beat_time,
            beat_duration: self.beat_duration(),
        }
    }

    fn rewind(&mut self) {
        self.bar = -1;
        self.beat = self.config.beats_per_bar - 1;
    }
}

impl fmt::Debug for Clock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Clock")
            .field("state", &self.0.state.borrow())
            .field("listeners", &self.0.listeners.borrow())
            .finish()
    }
}

impl Clock {
    /// Creates a stopped clock.
    pub fn new(time: impl TimeSource + 'static, config: ClockConfig) -> Clock {
        let config = config.sanitized();
        let mut state = State {
            config,
            status: Status::Stopped,
            bar: 0,
            beat: 0,
            next_beat_time: 0.0,
            bar_time: 0.0,
            prefired: false,
            timer: None,
        };
        state.rewind();
        Clock(Rc::new(ClockInner {
            time: Box::new(time),
            state: RefCell::new(state),
            listeners: RefCell::new(Registry::default()),
        }))
    }

    /// Subscribes to events of one kind. Listeners are called in subscription order.
    pub fn on<F>(&self, kind: ClockEventKind, listener: F) -> ListenerId
    where
        F: FnMut(&ClockEvent) + 'static,
    {
        self.0
            .listeners
            .borrow_mut()
            .add(kind, Rc::new(RefCell::new(listener)))
    }

    /// Unsubscribes a listener. Returns false if it was not subscribed to `kind`.
    pub fn off(&self, kind: ClockEventKind, id: ListenerId) -> bool {
        self.0.listeners.borrow_mut().remove(kind, id)
    }

    pub fn listener_count(&self) -> usize {
        self.0.listeners.borrow().len()
    }

    /// Starts or resumes the clock.
    ///
    /// From a stopped clock the first beat fired is beat 0 of bar 0, sounding at the current
    /// time. A paused clock resumes with the beat after the last one it fired. Does nothing if
    /// the clock is already running or destroyed.
    pub fn start(&self) {
        let now = {
            let mut state = self.0.state.borrow_mut();
            match state.status {
                Status::Running | Status::Destroyed => return,
                Status::Stopped => state.rewind(),
                Status::Paused => {}
            }
            if self.0.time.is_suspended() {
                self.0.time.resume();
            }
            let now = self.0.time.now();
            state.status = Status::Running;
            state.next_beat_time = now;
            state.prefired = false;
            state.timer = Some(now);
            now
        };
        log::debug!("clock: start at {:.3}", now);
        self.emit(ClockEvent::Start);
        self.schedule();
    }

    /// Pauses the clock and cancels its timer. Does nothing unless the clock is running.
    pub fn pause(&self) {
        {
            let mut state = self.0.state.borrow_mut();
            if state.status != Status::Running {
                return;
            }
            state.status = Status::Paused;
            state.timer = None;
        }
        log::debug!("clock: pause");
        self.emit(ClockEvent::Pause);
    }

    /// Stops the clock and rewinds it to bar 0. Does nothing if the clock is already stopped.
    pub fn stop(&self) {
        match self.status() {
            Status::Stopped | Status::Destroyed => return,
            Status::Running | Status::Paused => {}
        }
        log::debug!("clock: stop");
        self.emit(ClockEvent::Stop);
        self.pause();
        let mut state = self.0.state.borrow_mut();
        if state.status == Status::Destroyed {
            return;
        }
        state.status = Status::Stopped;
        state.timer = None;
        state.bar = 0;
        state.beat = 0;
        state.next_beat_time = 0.0;
        state.bar_time = 0.0;
        state.prefired = false;
    }

    /// Stops the clock for good and drops every listener.
    pub fn destroy(&self) {
        self.stop();
        self.0.state.borrow_mut().status = Status::Destroyed;
        self.0.state.borrow_mut().timer = None;
        self.0.listeners.borrow_mut().clear();
        log::debug!("clock: destroyed");
    }

    /// Changes the tempo of every beat after the next one. Non-positive values are ignored.
    pub fn set_bpm(&self, bpm: f64) {
        if !bpm.is_finite() || bpm <= 0.0 {
            log::debug!("clock: ignoring bpm {}", bpm);
            return;
        }
        self.0.state.borrow_mut().config.bpm = bpm;
    }

    pub fn bpm(&self) -> f64 {
        self.0.state.borrow().config.bpm
    }

    pub fn beats_per_bar(&self) -> u32 {
        self.0.state.borrow().config.beats_per_bar
    }

    pub fn beat_duration(&self) -> f64 {
        self.0.state.borrow().beat_duration()
    }

    pub fn config(&self) -> ClockConfig {
        self.0.state.borrow().config
    }

    pub fn status(&self) -> Status {
        self.0.state.borrow().status
    }

    pub fn is_running(&self) -> bool {
        self.status() == Status::Running
    }

    /// The last fired bar and beat, or `None` if no beat has been fired since the clock stopped.
    pub fn position(&self) -> Option<(u64, u32)> {
        let state = self.0.state.borrow();
        if state.bar < 0 || state.status == Status::Stopped {
            None
        } else {
            Some((state.bar as u64, state.beat))
        }
    }

    /// Audio time of the next beat that has not been fired yet.
    pub fn next_beat_time(&self) -> f64 {
        self.0.state.borrow().next_beat_time
    }

    /// Audio time of the first beat of the last fired bar.
    pub fn bar_time(&self) -> f64 {
        self.0.state.borrow().bar_time
    }

    pub fn now(&self) -> f64 {
        self.0.time.now()
    }

    /// Runs a scheduling pass if the timer is due.
    ///
    /// This is what the repeating timer calls. Returns false once the clock is destroyed.
    pub fn tick(&self) -> bool {
        let due = {
            let state = self.0.state.borrow();
            if state.status == Status::Destroyed {
                return false;
            }
            state.timer.map_or(false, |due| self.0.time.now() >= due)
        };
        if due {
            self.schedule();
        }
        true
    }

    fn schedule(&self) {
        let now = self.0.time.now();
        loop {
            let (pre_event, event) = {
                let mut state = self.0.state.borrow_mut();
                if state.status != Status::Running {
                    return;
                }
                let window = now + state.config.schedule_ahead;
                if !state.prefired && state.next_beat_time < window + state.config.prefire_offset {
                    state.prefired = true;
                    let upcoming = state.upcoming();
                    (Some(state.metronome(upcoming)), None)
                } else if state.next_beat_time < window {
                    let upcoming = state.upcoming();
                    let metronome = state.metronome(upcoming);
                    state.bar = upcoming.0;
                    state.beat = upcoming.1;
                    if upcoming.1 == 0 {
                        state.bar_time = metronome.time;
                    }
                    let beat_duration = state.beat_duration();
                    state.next_beat_time += beat_duration;
                    state.prefired = false;
                    (None, Some(metronome))
                } else {
                    let lookahead = state.config.lookahead;
                    state.timer = Some(now + lookahead);
                    return;
                }
            };

            if let Some(metronome) = pre_event {
                self.emit(ClockEvent::PreBeat(metronome));
                if metronome.beat == 0 {
                    self.emit(ClockEvent::PreBar(metronome));
                }
            }
            if let Some(metronome) = event {
                log::debug!(
                    "clock: bar {} beat {} at {:.3}",
                    metronome.bar,
                    metronome.beat,
                    metronome.time
                );
                self.emit(ClockEvent::Beat(metronome));
                if metronome.beat == 0 {
                    self.emit(ClockEvent::Bar(metronome));
                }
            }
        }
    }

    fn emit(&self, event: ClockEvent) {
        listeners::dispatch(&self.0.listeners, event.kind(), &event);
    }
}

impl Job for Clock {
    fn run(&mut self) -> Option<Duration> {
        if !self.tick() {
            return None;
        }
        Some(Duration::from_secs_f64(self.config().lookahead))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type Log = Rc<RefCell<Vec<ClockEvent>>>;

    fn record(clock: &Clock, kinds: &[ClockEventKind]) -> Log {
        let log: Log = Rc::new(RefCell::new(Vec::new()));
        for &kind in kinds {
            let log = log.clone();
            clock.on(kind, move |event: &ClockEvent| log.borrow_mut().push(*event));
        }
        log
    }

    fn all_kinds() -> Vec<ClockEventKind> {
        use ClockEventKind::*;
        vec![PreBeat, Beat, PreBar, Bar, Start, Stop, Pause]
    }

    // Ticks land between the window boundaries, and the timer interval is shorter than the
    // tick spacing so every tick runs a scheduling pass.
    fn config() -> ClockConfig {
        ClockConfig::default().lookahead(0.02)
    }

    fn run_until(clock: &Clock, time: &ManualTime, from_step: u32, to_step: u32) {
        for step in from_step..=to_step {
            time.set(step as f64 * 0.025 + 0.01);
            clock.tick();
        }
    }

    fn metronome(bar: u64, beat: u32, time: f64) -> Metronome {
        Metronome {
            bar,
            beat,
            time,
            beat_duration: 0.5,
        }
    }

    #[test]
    fn start_fires_first_beat_immediately() {
        let time = ManualTime::new();
        let clock = Clock::new(time, config());
        let log = record(&clock, &all_kinds());

        clock.start();

        let m = metronome(0, 0, 0.0);
        assert_eq!(
            *log.borrow(),
            vec![
                ClockEvent::Start,
                ClockEvent::PreBeat(m),
                ClockEvent::PreBar(m),
                ClockEvent::Beat(m),
                ClockEvent::Bar(m),
            ]
        );
        assert_eq!(clock.position(), Some((0, 0)));
    }

    #[test]
    fn pre_events_precede_their_beat() {
        let time = ManualTime::new();
        let clock = Clock::new(time.clone(), config());
        clock.start();
        let log = record(&clock, &all_kinds());

        // Beat 1 is at 0.5; its pre-events are due after 0.35 and the beat itself after 0.4.
        run_until(&clock, &time, 1, 13);
        assert!(log.borrow().is_empty());

        run_until(&clock, &time, 14, 14);
        assert_eq!(*log.borrow(), vec![ClockEvent::PreBeat(metronome(0, 1, 0.5))]);

        run_until(&clock, &time, 15, 16);
        assert_eq!(
            *log.borrow(),
            vec![
                ClockEvent::PreBeat(metronome(0, 1, 0.5)),
                ClockEvent::Beat(metronome(0, 1, 0.5)),
            ]
        );
    }

    #[test]
    fn prebar_carries_the_upcoming_bar() {
        let time = ManualTime::new();
        let clock = Clock::new(time.clone(), config());
        clock.start();
        let log = record(&clock, &[ClockEventKind::PreBar, ClockEventKind::Bar]);

        run_until(&clock, &time, 1, 80);

        let m = metronome(1, 0, 2.0);
        assert_eq!(*log.borrow(), vec![ClockEvent::PreBar(m), ClockEvent::Bar(m)]);
        assert_eq!(clock.bar_time(), 2.0);
    }

    #[test]
    fn beats_are_evenly_spaced_without_drift() {
        let time = ManualTime::new();
        let clock = Clock::new(time.clone(), config().bpm(120.0));
        let fired = Rc::new(RefCell::new(Vec::new()));
        {
            let fired = fired.clone();
            let time = time.clone();
            clock.on(ClockEventKind::Beat, move |event: &ClockEvent| {
                let metronome = event.metronome().copied().unwrap();
                fired.borrow_mut().push((metronome, time.now()));
            });
        }

        clock.start();
        run_until(&clock, &time, 1, 2200);

        let fired = fired.borrow();
        assert!(fired.len() > 100, "only {} beats", fired.len());
        for pair in fired.windows(2) {
            let (previous, _) = pair[0];
            let (next, _) = pair[1];
            assert!((next.time - previous.time - 0.5).abs() < 1e-9);
        }
        for (index, (metronome, fired_at)) in fired.iter().enumerate() {
            assert_eq!(metronome.time, index as f64 * 0.5);
            assert!(*fired_at <= metronome.time + 1e-9);
            assert!(metronome.time - fired_at <= 0.1 + 1e-9);
            assert!(metronome.time - fired_at >= 0.1 - 0.025 - 1e-9 || index == 0);
            assert_eq!(metronome.bar, index as u64 / 4);
            assert_eq!(metronome.beat, index as u32 % 4);
        }
    }

    #[test]
    fn tempo_changes_apply_to_later_beats() {
        let time = ManualTime::new();
        let clock = Clock::new(time.clone(), config());
        let log = record(&clock, &[ClockEventKind::Beat]);
        clock.start();

        clock.set_bpm(60.0);
        clock.set_bpm(0.0);
        clock.set_bpm(-10.0);
        assert_eq!(clock.bpm(), 60.0);

        run_until(&clock, &time, 1, 60);
        let times: Vec<f64> = log
            .borrow()
            .iter()
            .filter_map(|event| event.metronome().map(|m| m.time))
            .collect();
        assert_eq!(times, vec![0.0, 0.5, 1.5]);
    }

    #[test]
    fn pause_cancels_the_timer_and_start_resumes() {
        let time = ManualTime::new();
        let clock = Clock::new(time.clone(), config());
        clock.start();
        let log = record(&clock, &all_kinds());

        clock.pause();
        clock.pause();
        run_until(&clock, &time, 1, 200);
        assert_eq!(*log.borrow(), vec![ClockEvent::Pause]);
        assert_eq!(clock.status(), Status::Paused);

        log.borrow_mut().clear();
        clock.start();
        let m = metronome(0, 1, time.now());
        assert_eq!(
            *log.borrow(),
            vec![ClockEvent::Start, ClockEvent::PreBeat(m), ClockEvent::Beat(m)]
        );
    }

    #[test]
    fn stop_rewinds_and_is_idempotent() {
        let time = ManualTime::new();
        let clock = Clock::new(time.clone(), config());
        clock.start();
        run_until(&clock, &time, 1, 100);
        let log = record(&clock, &all_kinds());

        clock.stop();
        clock.stop();
        assert_eq!(*log.borrow(), vec![ClockEvent::Stop, ClockEvent::Pause]);
        assert_eq!(clock.status(), Status::Stopped);
        assert_eq!(clock.position(), None);
        assert_eq!(clock.next_beat_time(), 0.0);

        log.borrow_mut().clear();
        clock.start();
        let m = metronome(0, 0, time.now());
        assert_eq!(log.borrow()[3], ClockEvent::Beat(m));
    }

    #[test]
    fn start_resumes_a_suspended_time_source() {
        let time = ManualTime::new();
        time.suspend();
        let clock = Clock::new(time.clone(), config());
        clock.start();
        assert!(!time.is_suspended());
    }

    #[test]
    fn three_beat_bars() {
        let time = ManualTime::new();
        let clock = Clock::new(time.clone(), config().beats_per_bar(3));
        let log = record(&clock, &[ClockEventKind::Bar]);
        clock.start();
        run_until(&clock, &time, 1, 60);

        let bars: Vec<(u64, f64)> = log
            .borrow()
            .iter()
            .filter_map(|event| event.metronome().map(|m| (m.bar, m.time)))
            .collect();
        assert_eq!(bars, vec![(0, 0.0), (1, 1.5)]);
    }

    #[test]
    fn listener_can_unsubscribe_itself() {
        let time = ManualTime::new();
        let clock = Clock::new(time.clone(), config());
        let count = Rc::new(Cell::new(0));
        let id = Rc::new(Cell::new(None));
        {
            let count = count.clone();
            let id_cell = id.clone();
            let handle = clock.clone();
            id.set(Some(clock.on(ClockEventKind::Beat, move |_: &ClockEvent| {
                count.set(count.get() + 1);
                if let Some(id) = id_cell.get() {
                    handle.off(ClockEventKind::Beat, id);
                }
            })));
        }

        clock.start();
        run_until(&clock, &time, 1, 200);

        assert_eq!(count.get(), 1);
        clock.destroy();
    }

    #[test]
    fn destroy_from_inside_a_listener() {
        let time = ManualTime::new();
        let clock = Clock::new(time.clone(), config());
        let log = record(&clock, &[ClockEventKind::Beat]);
        {
            let handle = clock.clone();
            clock.on(ClockEventKind::Bar, move |_: &ClockEvent| handle.destroy());
        }

        clock.start();
        assert_eq!(clock.status(), Status::Destroyed);
        assert_eq!(clock.listener_count(), 0);
        assert!(!clock.tick());

        clock.start();
        run_until(&clock, &time, 1, 100);
        assert_eq!(log.borrow().len(), 1);
    }

    #[test]
    fn invalid_config_falls_back_to_defaults() {
        let config = ClockConfig::default()
            .bpm(-1.0)
            .beats_per_bar(0)
            .lookahead(f64::NAN)
            .schedule_ahead(-0.5)
            .prefire_offset(0.0)
            .sanitized();
        assert_eq!(
            config,
            ClockConfig {
                prefire_offset: 0.0,
                ..ClockConfig::default()
            }
        );
    }
}
