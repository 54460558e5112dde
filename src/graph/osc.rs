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

//! Voices played by a SuperCollider server over OSC.
//!
//! [`OscSynth`] turns each pattern value into a synth node. Starting a voice sends a timestamped
//! `/s_new` bundle and stopping it sends a timestamped `/n_set gate 0` bundle, so the server
//! performs both at the exact audio time even though they are sent ahead of time. The synth
//! definition is expected to have `freq` and `out` controls and a gated envelope that frees the
//! node when it finishes.
//!
//! Audio times are converted to wall clock times with an anchor, the wall clock time of audio
//! time zero, usually taken from [`SystemTimeSource::anchor`](crate::clock::SystemTimeSource::anchor).

use super::{Error, NodeId, Result, Synth, Voice};
use rosc::{encoder::encode, OscBundle, OscMessage, OscPacket, OscTime, OscType};
use std::{
    cell::{Cell, RefCell},
    fmt, io,
    net::{ToSocketAddrs, UdpSocket},
    rc::Rc,
    time::{Duration, SystemTime},
};

/// Node IDs below this are left for the server and other clients.
const FIRST_NODE_ID: i32 = 1000;

/// Bundles with this time tag are performed as soon as they are received.
const IMMEDIATELY: OscTime = (0, 1);

/// A destination for encoded OSC packets.
pub trait PacketSink {
    fn send_packet(&mut self, bytes: &[u8]) -> io::Result<()>;
}

impl PacketSink for UdpSocket {
    fn send_packet(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.send(bytes).map(|_| ())
    }
}

impl<F> PacketSink for F
where
    F: FnMut(&[u8]) -> io::Result<()>,
{
    fn send_packet(&mut self, bytes: &[u8]) -> io::Result<()> {
        self(bytes)
    }
}

/// Converts a MIDI note number into a frequency in hertz.
pub fn midi_to_hz(note: f32) -> f32 {
    440.0 * 2.0_f32.powf((note - 69.0) / 12.0)
}

/// Creates one synth node per pattern value, interpreting values as MIDI note numbers.
///
/// # Examples
///
/// ```no_run
/// use barline::{clock::SystemTimeSource, graph::osc::OscSynth};
///
/// let time = SystemTimeSource::new();
/// let synth = OscSynth::connect("default", "127.0.0.1:57110", time.anchor())?.group(1);
/// # barline::graph::Result::Ok(())
/// ```
pub struct OscSynth {
    synthdef: String,
    sink: Rc<RefCell<dyn PacketSink>>,
    anchor: SystemTime,
    group: i32,
    next_node_id: Rc<Cell<i32>>,
}

impl fmt::Debug for OscSynth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OscSynth")
            .field("synthdef", &self.synthdef)
            .field("group", &self.group)
            .field("next_node_id", &self.next_node_id.get())
            .finish()
    }
}

impl OscSynth {
    /// Creates a synth that sends its packets to `sink`.
    pub fn new(
        synthdef: impl Into<String>,
        sink: impl PacketSink + 'static,
        anchor: SystemTime,
    ) -> OscSynth {
        OscSynth {
            synthdef: synthdef.into(),
            sink: Rc::new(RefCell::new(sink)),
            anchor,
            group: 1,
            next_node_id: Rc::new(Cell::new(FIRST_NODE_ID)),
        }
    }

    /// Creates a synth that sends its packets over UDP to a running server.
    ///
    /// # Errors
    ///
    /// Returns an error if a UDP socket cannot be bound or connected to `server_address`.
    pub fn connect<A: ToSocketAddrs>(
        synthdef: impl Into<String>,
        server_address: A,
        anchor: SystemTime,
    ) -> Result<OscSynth> {
        let socket = UdpSocket::bind("0.0.0.0:0").map_err(Error::Send)?;
        socket.connect(server_address).map_err(Error::Send)?;
        Ok(OscSynth::new(synthdef, socket, anchor))
    }

    /// Sets the group new nodes are added to. Defaults to 1, the default group.
    pub fn group(mut self, group: i32) -> Self {
        self.group = group;
        self
    }

    /// Sets the ID of the next node to create.
    pub fn first_node_id(self, node_id: i32) -> Self {
        self.next_node_id.set(node_id);
        self
    }

    fn allocate_node_id(&self) -> i32 {
        let id = self.next_node_id.get();
        self.next_node_id.set(id.wrapping_add(1).max(FIRST_NODE_ID));
        id
    }
}

impl Synth<f32> for OscSynth {
    fn voice(&mut self, note: &f32) -> Result<Box<dyn Voice>> {
        Ok(Box::new(OscVoice {
            sink: Rc::clone(&self.sink),
            anchor: self.anchor,
            synthdef: self.synthdef.clone(),
            group: self.group,
            node_id: self.allocate_node_id(),
            freq: midi_to_hz(*note),
            out: None,
            start_at: None,
            release_at: None,
            cancelled: false,
            ended: None,
        }))
    }
}

struct OscVoice {
    sink: Rc<RefCell<dyn PacketSink>>,
    anchor: SystemTime,
    synthdef: String,
    group: i32,
    node_id: i32,
    freq: f32,
    out: Option<NodeId>,
    start_at: Option<f64>,
    release_at: Option<f64>,
    cancelled: bool,
    ended: Option<Box<dyn FnOnce()>>,
}

impl OscVoice {
    fn send(&self, timetag: OscTime, messages: Vec<OscMessage>) -> Result<()> {
        let packet = OscPacket::Bundle(OscBundle {
            timetag,
            content: messages.into_iter().map(OscPacket::Message).collect(),
        });
        log::debug!("send: {:?}", packet);
        let bytes = encode(&packet).map_err(Error::OscEncode)?;
        self.sink
            .borrow_mut()
            .send_packet(&bytes)
            .map_err(Error::Send)
    }

    fn osc_time(&self, at: f64) -> OscTime {
        const UNIX_OFFSET: u64 = 2_208_988_800; // From RFC 5905
        const TWO_POW_32: f64 = 4294967296.0;

        let time = self.anchor + Duration::from_secs_f64(at.max(0.0));
        let unix_time = time
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap_or_default();
        let epoch_time = Duration::new(UNIX_OFFSET, 0) + unix_time;
        let frac = (f64::from(epoch_time.subsec_nanos()) * TWO_POW_32 / 1.0e9).round();
        (epoch_time.as_secs() as u32, frac as u32)
    }

    fn is_stopped(&self) -> bool {
        self.cancelled || self.release_at.is_some()
    }

    fn is_playing(&self) -> bool {
        self.start_at.is_some() && !self.is_stopped()
    }

    fn set_out(&self, bus: i32) -> Result<()> {
        self.send(
            IMMEDIATELY,
            vec![OscMessage {
                addr: "/n_set".to_string(),
                args: vec![
                    self.node_id.into(),
                    "out".to_string().into(),
                    bus.into(),
                ],
            }],
        )
    }
}

impl Voice for OscVoice {
    fn start(&mut self, at: f64) -> Result<()> {
        if self.is_stopped() {
            return Err(Error::AlreadyStopped(self.node_id.to_string()));
        }
        let mut args: Vec<OscType> = vec![
            self.synthdef.clone().into(),
            self.node_id.into(),
            0_i32.into(), // add to the head of the group
            self.group.into(),
            "freq".to_string().into(),
            self.freq.into(),
        ];
        if let Some(NodeId(bus)) = self.out {
            args.push("out".to_string().into());
            args.push(bus.into());
        }
        let message = OscMessage {
            addr: "/s_new".to_string(),
            args,
        };
        self.send(self.osc_time(at), vec![message])?;
        self.start_at = Some(at);
        Ok(())
    }

    /// Releases the node. A release later than one already sent is not sent again.
    ///
    /// The server frees the node once its envelope finishes and this client does not listen for
    /// `/n_end`, so the ended callback does not run here. Owners treat the voice as finished once
    /// its release time has passed.
    fn stop(&mut self, at: f64) -> Result<()> {
        if self.cancelled || matches!(self.release_at, Some(release) if release <= at) {
            return Ok(());
        }
        let message = OscMessage {
            addr: "/n_set".to_string(),
            args: vec![self.node_id.into(), "gate".to_string().into(), 0.0_f32.into()],
        };
        self.send(self.osc_time(at), vec![message])?;
        self.release_at = Some(at);
        Ok(())
    }

    /// Frees the node at its start time. The server performs bundles with equal time tags in the
    /// order they arrive, so the node is freed before it renders any audio.
    fn cancel(&mut self) -> Result<()> {
        if self.cancelled {
            return Ok(());
        }
        if let Some(start) = self.start_at {
            let message = OscMessage {
                addr: "/n_free".to_string(),
                args: vec![self.node_id.into()],
            };
            self.send(self.osc_time(start), vec![message])?;
        }
        self.cancelled = true;
        if let Some(ended) = self.ended.take() {
            ended();
        }
        Ok(())
    }

    fn connect(&mut self, into: NodeId) -> Result<()> {
        if into.0 < 0 {
            return Err(Error::Connect(into));
        }
        self.out = Some(into);
        if self.is_playing() {
            self.set_out(into.0)?;
        }
        Ok(())
    }

    fn disconnect(&mut self) -> Result<()> {
        if self.out.take().is_some() && self.is_playing() {
            self.set_out(0)?;
        }
        Ok(())
    }

    fn on_ended(&mut self, callback: Box<dyn FnOnce()>) {
        if self.cancelled {
            callback();
        } else {
            self.ended = Some(callback);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rosc::decoder::decode;

    type Sent = Rc<RefCell<Vec<Vec<u8>>>>;

    fn synth() -> (OscSynth, Sent) {
        let sent: Sent = Rc::default();
        let sink = {
            let sent = Rc::clone(&sent);
            move |bytes: &[u8]| -> io::Result<()> {
                sent.borrow_mut().push(bytes.to_vec());
                Ok(())
            }
        };
        let anchor = SystemTime::UNIX_EPOCH + Duration::from_secs(10);
        (OscSynth::new("default", sink, anchor), sent)
    }

    fn bundle(bytes: &[u8]) -> (OscTime, Vec<OscMessage>) {
        match decode(bytes).unwrap() {
            OscPacket::Bundle(bundle) => (
                bundle.timetag,
                bundle
                    .content
                    .into_iter()
                    .map(|packet| match packet {
                        OscPacket::Message(message) => message,
                        other => panic!("unexpected packet {:?}", other),
                    })
                    .collect(),
            ),
            other => panic!("unexpected packet {:?}", other),
        }
    }

    #[test]
    fn midi_conversion() {
        assert_eq!(midi_to_hz(69.0), 440.0);
        assert_eq!(midi_to_hz(81.0), 880.0);
    }

    #[test]
    fn start_and_stop_are_timestamped() {
        let (mut synth, sent) = synth();
        let mut voice = synth.voice(&69.0).unwrap();
        voice.connect(NodeId(4)).unwrap();
        voice.start(1.5).unwrap();
        voice.stop(2.0).unwrap();

        let sent = sent.borrow();
        assert_eq!(sent.len(), 2);

        let (timetag, messages) = bundle(&sent[0]);
        assert_eq!(timetag, (2_208_988_800 + 11, 1 << 31));
        assert_eq!(messages[0].addr, "/s_new");
        assert_eq!(
            messages[0].args,
            vec![
                OscType::String("default".to_string()),
                OscType::Int(1000),
                OscType::Int(0),
                OscType::Int(1),
                OscType::String("freq".to_string()),
                OscType::Float(440.0),
                OscType::String("out".to_string()),
                OscType::Int(4),
            ]
        );

        let (timetag, messages) = bundle(&sent[1]);
        assert_eq!(timetag, (2_208_988_800 + 12, 0));
        assert_eq!(messages[0].addr, "/n_set");
        assert_eq!(
            messages[0].args,
            vec![
                OscType::Int(1000),
                OscType::String("gate".to_string()),
                OscType::Float(0.0),
            ]
        );
    }

    #[test]
    fn node_ids_are_unique() {
        let (mut synth, sent) = synth();
        for note in &[60.0, 62.0, 64.0] {
            synth.voice(note).unwrap().start(0.0).unwrap();
        }
        let ids: Vec<OscType> = sent
            .borrow()
            .iter()
            .map(|bytes| bundle(bytes).1[0].args[1].clone())
            .collect();
        assert_eq!(
            ids,
            vec![OscType::Int(1000), OscType::Int(1001), OscType::Int(1002)]
        );
    }

    #[test]
    fn rerouting_a_playing_voice_is_immediate() {
        let (mut synth, sent) = synth();
        let mut voice = synth.voice(&60.0).unwrap();
        voice.start(0.0).unwrap();
        voice.connect(NodeId(8)).unwrap();

        let (timetag, messages) = bundle(&sent.borrow()[1]);
        assert_eq!(timetag, IMMEDIATELY);
        assert_eq!(
            messages[0].args,
            vec![
                OscType::Int(1000),
                OscType::String("out".to_string()),
                OscType::Int(8),
            ]
        );
        assert!(matches!(voice.connect(NodeId(-1)), Err(Error::Connect(NodeId(-1)))));
    }

    #[test]
    fn only_earlier_releases_are_sent() {
        let (mut synth, sent) = synth();
        let mut voice = synth.voice(&60.0).unwrap();
        let ended = Rc::new(Cell::new(0));
        {
            let ended = Rc::clone(&ended);
            voice.on_ended(Box::new(move || ended.set(ended.get() + 1)));
        }
        voice.start(0.0).unwrap();
        voice.stop(1.0).unwrap();
        voice.stop(2.0).unwrap();
        voice.stop(0.5).unwrap();
        assert!(matches!(voice.start(2.0), Err(Error::AlreadyStopped(_))));
        assert_eq!(ended.get(), 0);

        let timetags: Vec<OscTime> = sent.borrow().iter().map(|bytes| bundle(bytes).0).collect();
        assert_eq!(
            timetags,
            vec![
                (2_208_988_800 + 10, 0),
                (2_208_988_800 + 11, 0),
                (2_208_988_800 + 10, 1 << 31),
            ]
        );
    }

    #[test]
    fn cancelling_frees_the_node_when_it_would_start() {
        let (mut synth, sent) = synth();
        let mut voice = synth.voice(&60.0).unwrap();
        let ended = Rc::new(Cell::new(0));
        {
            let ended = Rc::clone(&ended);
            voice.on_ended(Box::new(move || ended.set(ended.get() + 1)));
        }
        voice.start(3.0).unwrap();
        voice.stop(3.5).unwrap();
        voice.cancel().unwrap();
        voice.cancel().unwrap();
        voice.stop(3.25).unwrap();
        assert_eq!(ended.get(), 1);

        let sent = sent.borrow();
        assert_eq!(sent.len(), 3);
        let (timetag, messages) = bundle(&sent[2]);
        assert_eq!(timetag, (2_208_988_800 + 13, 0));
        assert_eq!(messages[0].addr, "/n_free");
        assert_eq!(messages[0].args, vec![OscType::Int(1000)]);
    }

    #[test]
    fn retiring_an_instrument_sends_early_releases() {
        use crate::{clock::Metronome, instrument::Instrument, pattern::Slot};

        let (synth, sent) = synth();
        let mut lead = Instrument::new("lead", synth).note(vec![Slot::values(vec![60.0_f32, 62.0])]);
        let bar = Metronome {
            bar: 0,
            beat: 0,
            time: 0.0,
            beat_duration: 0.5,
        };
        assert_eq!(lead.play(&bar, 2.0).unwrap(), 2);
        sent.borrow_mut().clear();

        // The first voice is cut short, the second never starts.
        lead.retire(0.5).unwrap();
        let sent: Vec<(OscTime, Vec<OscMessage>)> =
            sent.borrow().iter().map(|bytes| bundle(bytes)).collect();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].0, (2_208_988_800 + 10, 1 << 31));
        assert_eq!(sent[0].1[0].addr, "/n_set");
        assert_eq!(sent[0].1[0].args[0], OscType::Int(1000));
        assert_eq!(sent[1].0, (2_208_988_800 + 11, 0));
        assert_eq!(sent[1].1[0].addr, "/n_free");
        assert_eq!(sent[1].1[0].args, vec![OscType::Int(1001)]);
    }

    #[test]
    fn send_failures_are_reported() {
        let sink =
            |_: &[u8]| -> io::Result<()> { Err(io::Error::new(io::ErrorKind::Other, "down")) };
        let mut synth = OscSynth::new("default", sink, SystemTime::UNIX_EPOCH);
        let mut voice = synth.voice(&60.0).unwrap();
        assert!(matches!(voice.start(0.0), Err(Error::Send(_))));
    }
}
