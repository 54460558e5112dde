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

use barline::{
    clock::SystemTimeSource,
    engine::{Engine, EngineConfig},
    graph::Recorder,
    instrument::Instrument,
    pattern::Slot,
    scheduler::Scheduler,
};
use std::{thread, time::Duration};

#[test]
fn engine_plays_in_real_time() {
    let engine = Engine::new(EngineConfig::default().bpm(600.0), SystemTimeSource::new());
    let recorder = Recorder::new();
    let kick = Instrument::new("kick", recorder.clone()).note(vec![Slot::Value(36)]);
    engine
        .evaluate(|eval| {
            eval.enqueue(kick);
            Ok::<(), String>(())
        })
        .unwrap();
    engine.start();

    let scheduler = Scheduler::new();
    let handle = scheduler.handle();
    let canceller = thread::spawn(move || {
        thread::sleep(Duration::from_millis(500));
        handle.cancel();
    });
    engine.run(scheduler).unwrap();
    canceller.join().unwrap();

    // At 600 bpm a bar lasts 0.4 seconds, so at least two bars have started.
    let starts = recorder.starts();
    assert!(starts.len() >= 2, "only {} bars played", starts.len());
    for pair in starts.windows(2) {
        assert!((pair[1].1 - pair[0].1 - 0.4).abs() < 1e-9);
    }
}

#[test]
fn destroying_the_engine_ends_the_scheduler() {
    let engine = Engine::new(EngineConfig::default(), SystemTimeSource::new());
    engine.start();
    engine.destroy();
    engine.run(Scheduler::new()).unwrap();
}
