//! The terminal sink.
//!
//! [`Mixer`] is shared between three threads: its node worker (edges and
//! `gain`), the audio device's callback (which calls [`Mixer::render`]) and
//! whoever runs [`Mixer::play`]. The producer list and gain sit behind one
//! mutex that is never held while pulling audio.
//!
//! [`Mixer::stop`] closes a halt channel that every pull also waits on, so a
//! device can always be shut down even when a producer never delivers.

use std::sync::Arc;

use crossbeam_channel::{unbounded, Receiver, Select, Sender};
use parking_lot::{Condvar, Mutex};
use tracing::{debug, info, trace};

use crate::buffer::AudioBuffer;
use crate::device::AudioDevice;
use crate::error::{Error, Result};
use crate::event::{Event, EventKind};
use crate::node::{Ancestry, Arity, AudioNode, Context, NodeRef};

pub const DEFAULT_GAIN: f32 = 0.5;

struct Producer {
    node: NodeRef,
    port: Receiver<AudioBuffer>,
    /// Name of the mixer node the producer feeds.
    sink: String,
}

struct MixState {
    producers: Vec<Producer>,
    gain: f32,
}

struct Transport {
    playing: bool,
    stop: bool,
    /// Dropped on stop, which wakes every pull waiting on `halted`.
    halt: Option<Sender<()>>,
    halted: Receiver<()>,
}

impl Transport {
    fn new() -> Self {
        let (tx, rx) = unbounded();
        Self { playing: false, stop: false, halt: Some(tx), halted: rx }
    }

    fn rearm(&mut self) {
        *self = Self { playing: self.playing, ..Self::new() };
    }
}

pub struct Mixer {
    state: Mutex<MixState>,
    transport: Mutex<Transport>,
    changed: Condvar,
}

impl Mixer {
    pub fn new() -> Arc<Self> {
        Self::with_gain(DEFAULT_GAIN)
    }

    pub fn with_gain(gain: f32) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(MixState { producers: Vec::new(), gain }),
            transport: Mutex::new(Transport::new()),
            changed: Condvar::new(),
        })
    }

    pub fn gain(&self) -> f32 {
        self.state.lock().gain
    }

    pub fn set_gain(&self, gain: f32) {
        self.state.lock().gain = gain;
    }

    /// Start pulling from `node`'s current output port on behalf of the mixer
    /// node named `sink`. Returns false if `node` has no output.
    pub fn attach(&self, node: &NodeRef, sink: &str) -> bool {
        let Some(port) = node.port() else { return false };
        let mut state = self.state.lock();
        state.producers.retain(|p| !p.node.ptr_eq(node));
        state.producers.push(Producer { node: node.clone(), port, sink: sink.to_string() });
        debug!(producer = node.name(), count = state.producers.len(), "mixer attach");
        true
    }

    pub fn detach(&self, node: &NodeRef) {
        let mut state = self.state.lock();
        state.producers.retain(|p| !p.node.ptr_eq(node));
        debug!(producer = node.name(), count = state.producers.len(), "mixer detach");
    }

    pub fn drop_all(&self) {
        self.state.lock().producers.clear();
    }

    pub fn producers(&self) -> Vec<String> {
        self.state.lock().producers.iter().map(|p| p.node.name().to_string()).collect()
    }

    /// Mix one buffer from every producer into `out`.
    ///
    /// Each pull blocks until that producer delivers, so a stalled producer
    /// stalls the mix. Producers whose port has closed are dropped afterwards,
    /// unless the node still feeds the mixer and has published a fresh port,
    /// which is picked up instead. After [`stop`](Self::stop) pending pulls
    /// give up and the rest of the block stays silent.
    pub fn render(&self, out: &mut [f32]) {
        out.fill(0.0);

        let halted = self.transport.lock().halted.clone();
        let (ports, gain) = {
            let state = self.state.lock();
            let ports: Vec<_> = state.producers.iter().map(|p| p.port.clone()).collect();
            (ports, state.gain)
        };

        let mut ended = Vec::new();
        for port in ports {
            let mut sel = Select::new();
            let pull = sel.recv(&port);
            sel.recv(&halted);
            let oper = sel.select();
            if oper.index() != pull {
                let _ = oper.recv(&halted);
                trace!("render halted");
                break;
            }
            match oper.recv(&port) {
                Ok(buf) => {
                    for (o, s) in out.iter_mut().zip(buf.iter()) {
                        *o += s * gain;
                    }
                }
                Err(_) => ended.push(port),
            }
        }

        if !ended.is_empty() {
            let mut state = self.state.lock();
            state.producers.retain_mut(|p| {
                if !ended.iter().any(|e| e.same_channel(&p.port)) {
                    return true;
                }
                match p.node.port() {
                    Some(fresh) if !fresh.same_channel(&p.port) && p.node.has_child(&p.sink) => {
                        trace!(producer = p.node.name(), "following reset port");
                        p.port = fresh;
                        true
                    }
                    _ => {
                        debug!(producer = p.node.name(), "producer ended");
                        false
                    }
                }
            });
        }
    }

    /// Run `device` until [`stop`](Self::stop) is called.
    ///
    /// Opens and starts the device, blocks, then stops and closes it and wakes
    /// anyone in [`join`](Self::join). A stop requested before `play` begins
    /// ends it as soon as the device has started.
    pub fn play(self: &Arc<Self>, device: &mut dyn AudioDevice) -> Result<()> {
        {
            let mut t = self.transport.lock();
            if t.playing {
                return Err(Error::Device("mixer is already playing".into()));
            }
            t.playing = true;
        }

        let result = self.run(device);

        let mut t = self.transport.lock();
        t.playing = false;
        t.rearm();
        self.changed.notify_all();
        result
    }

    fn run(self: &Arc<Self>, device: &mut dyn AudioDevice) -> Result<()> {
        device.open(Arc::clone(self))?;
        device.start()?;
        info!("playing");

        {
            let mut t = self.transport.lock();
            while !t.stop {
                self.changed.wait(&mut t);
            }
        }

        device.stop()?;
        device.close()?;
        info!("stopped");
        Ok(())
    }

    /// Ask a running or upcoming [`play`](Self::play) to return, and release
    /// any render blocked on a producer.
    pub fn stop(&self) {
        let mut t = self.transport.lock();
        t.stop = true;
        t.halt.take();
        self.changed.notify_all();
    }

    /// Block until a running [`play`](Self::play) has returned.
    pub fn join(&self) {
        let mut t = self.transport.lock();
        while t.playing {
            self.changed.wait(&mut t);
        }
    }

    pub fn is_playing(&self) -> bool {
        self.transport.lock().playing
    }
}

/// The mixer's presence in the graph: takes any number of parents and hands
/// their ports to the shared [`Mixer`].
pub struct MixerNode {
    mixer: Arc<Mixer>,
}

impl MixerNode {
    pub fn new(mixer: Arc<Mixer>) -> Self {
        Self { mixer }
    }
}

impl AudioNode for MixerNode {
    fn kind(&self) -> &'static str {
        "mixer"
    }

    fn ancestry(&self) -> Ancestry {
        Ancestry::new(Arity::Many, Arity::Zero)
    }

    fn handle(&mut self, cx: &Context<'_>, ev: Event) {
        match ev.kind {
            EventKind::Gain => self.mixer.set_gain(ev.value),
            _ => trace!(node = cx.name(), "ignoring {}", ev.kind),
        }
    }

    fn connected(&mut self, cx: &Context<'_>, parent: &NodeRef) {
        if !self.mixer.attach(parent, cx.name()) {
            debug!(node = cx.name(), parent = parent.name(), "parent has no audio");
        }
    }

    fn disconnected(&mut self, _cx: &Context<'_>, parent: &NodeRef) {
        self.mixer.detach(parent);
    }

    fn killed(&mut self) {
        self.mixer.drop_all();
        self.mixer.stop();
    }

    fn describe(&self) -> String {
        format!("gain={:.2} producers={}", self.mixer.gain(), self.mixer.producers().len())
    }
}
