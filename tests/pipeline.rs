use std::sync::Arc;
use std::thread::{self, sleep};
use std::time::{Duration, Instant};

use approx::assert_abs_diff_eq;
use crossbeam_channel::{unbounded, Receiver, Sender, TryRecvError};

use klangfeld::nodes::{Adsr, Clock, Delay, Oscillator, Sequencer, Synchronizer};
use klangfeld::{
    worker, Ancestry, AudioBuffer, AudioNode, Context, Error, Event, EventKind, Field, Inbox, Patchbay,
    ProcessContext, RingDevice, When, BUFSZ, INBOX_CAPACITY,
};

fn eventually(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        sleep(Duration::from_millis(5));
    }
    cond()
}

/// A generator holding a constant level.
struct Dc(f32);

impl AudioNode for Dc {
    fn kind(&self) -> &'static str {
        "dc"
    }

    fn ancestry(&self) -> Ancestry {
        Ancestry::CHAIN
    }

    fn num_outputs(&self) -> usize {
        1
    }

    fn process(&mut self, _ctx: &ProcessContext, buf: &mut AudioBuffer) {
        buf.fill(self.0);
    }

    fn handle(&mut self, _cx: &Context<'_>, _ev: Event) {}
}

/// Forwards every event it is handed to the test.
struct Tap(Sender<Event>);

impl Tap {
    fn new() -> (Self, Receiver<Event>) {
        let (tx, rx) = unbounded();
        (Self(tx), rx)
    }
}

impl AudioNode for Tap {
    fn kind(&self) -> &'static str {
        "tap"
    }

    fn ancestry(&self) -> Ancestry {
        Ancestry::CHAIN
    }

    fn handle(&mut self, _cx: &Context<'_>, ev: Event) {
        let _ = self.0.send(ev);
    }
}

fn values(rx: &Receiver<Event>, n: usize) -> Vec<f32> {
    (0..n)
        .map(|_| rx.recv_timeout(Duration::from_secs(2)).unwrap().value)
        .collect()
}

#[test]
fn sine_through_a_one_buffer_delay() {
    let field = Field::new();
    field.add(worker::spawn("a", Oscillator::sine()).unwrap()).unwrap();
    let b = worker::spawn("b", Delay::new(0.05)).unwrap();
    field.add(b.clone()).unwrap();

    field.connect("a", "b").unwrap();
    assert!(eventually(|| b.has_parent("a")));

    let port = b.port().unwrap();
    let first = port.recv_timeout(Duration::from_secs(2)).unwrap();
    let second = port.recv_timeout(Duration::from_secs(2)).unwrap();

    let mut expected = AudioBuffer::silence();
    Oscillator::sine().process(&ProcessContext::default(), &mut expected);

    assert!(first.is_silent());
    assert_eq!(second, expected);
}

#[test]
fn mixer_sums_producers_with_gain() {
    let bay = Patchbay::with_settings(60.0, 0.5).unwrap();
    bay.add_node("low", Dc(0.2)).unwrap();
    bay.add_node("high", Dc(0.4)).unwrap();
    bay.connect("low", "mixer").unwrap();
    bay.connect("high", "mixer").unwrap();
    assert!(eventually(|| bay.mixer().producers().len() == 2));

    let mut out = vec![1.0; BUFSZ];
    bay.mixer().render(&mut out);
    for s in &out {
        assert_abs_diff_eq!(*s, 0.3, epsilon = 1e-6);
    }
}

#[test]
fn empty_mixer_renders_silence() {
    let bay = Patchbay::new().unwrap();
    let mut out = vec![1.0; BUFSZ];
    bay.mixer().render(&mut out);
    assert!(out.iter().all(|s| *s == 0.0));
}

#[test]
fn stalled_producer_blocks_render_until_detached() {
    let bay = Patchbay::with_settings(60.0, 0.5).unwrap();
    bay.add_node("live", Dc(0.2)).unwrap();
    // an effect with nothing upstream never produces
    bay.add_node("stalled", Delay::new(0.0)).unwrap();
    bay.connect("live", "mixer").unwrap();
    bay.connect("stalled", "mixer").unwrap();
    assert!(eventually(|| bay.mixer().producers().len() == 2));

    let mixer = Arc::clone(bay.mixer());
    let render = thread::spawn(move || {
        let mut out = vec![0.0; BUFSZ];
        mixer.render(&mut out);
        out
    });

    sleep(Duration::from_millis(100));
    assert!(!render.is_finished());

    bay.disconnect("stalled", "mixer").unwrap();
    let out = render.join().unwrap();
    assert_abs_diff_eq!(out[0], 0.1, epsilon = 1e-6);

    assert!(eventually(|| bay.mixer().producers() == vec!["live".to_string()]));
    let mut out = vec![0.0; BUFSZ];
    bay.mixer().render(&mut out);
    assert_abs_diff_eq!(out[BUFSZ - 1], 0.1, epsilon = 1e-6);
}

#[test]
fn effect_chain_reaches_the_mixer() {
    let bay = Patchbay::with_settings(60.0, 1.0).unwrap();
    bay.add_node("src", Dc(0.25)).unwrap();
    bay.add("delay", "fx").unwrap();
    bay.fire("fx", Event::with_value(EventKind::Delay, 0.0), When::Immediate).unwrap();

    bay.connect("src", "fx").unwrap();
    bay.connect("fx", "mixer").unwrap();
    assert!(eventually(|| bay.mixer().producers() == vec!["fx".to_string()]));

    let mut out = vec![0.0; BUFSZ];
    bay.mixer().render(&mut out);
    assert_abs_diff_eq!(out[0], 0.25, epsilon = 1e-6);
}

#[test]
fn full_receivers_miss_ticks_without_stalling_the_clock() {
    let (clock, _deferred) = Clock::new(1200.0);
    let clock = worker::spawn("clock", clock).unwrap();

    let (full, full_rx) = Inbox::channel();
    for _ in 0..INBOX_CAPACITY {
        full.send(Event::new(EventKind::Custom("filler".into()))).unwrap();
    }
    let (ok, ok_rx) = Inbox::channel();

    clock.send(Event::register(&full)).unwrap();
    clock.send(Event::register(&ok)).unwrap();

    let ticks = values(&ok_rx, 4);
    assert!(ticks.windows(2).all(|w| w[1] > w[0]), "{:?}", ticks);
    assert_eq!(full_rx.len(), INBOX_CAPACITY);
    assert!(full_rx.try_iter().all(|ev| ev.kind == EventKind::Custom("filler".into())));

    // once there is room again, ticks resume with the index moved on
    let next = full_rx.recv_timeout(Duration::from_secs(2)).unwrap();
    assert_eq!(next.kind, EventKind::Tick);
    assert!(next.value > ticks[0]);

    clock.send(Event::kill()).unwrap();
}

#[test]
fn synchronizer_waits_for_a_matching_tick() {
    let field = Field::new();
    let sync = worker::spawn("sync", Synchronizer::new()).unwrap();
    let (tap, rx) = Tap::new();
    field.add(sync.clone()).unwrap();
    field.add(worker::spawn("tap", tap).unwrap()).unwrap();

    field.connect("sync", "tap").unwrap();
    assert!(eventually(|| sync.has_child("tap")));

    sync.send(Event::with_value(EventKind::Mod, 4.0)).unwrap();
    sync.send(Event::with_value(EventKind::Hz, 330.0)).unwrap();
    sync.send(Event::with_value(EventKind::Gain, 0.5)).unwrap();
    sync.send(Event::tick(1)).unwrap();
    sync.send(Event::tick(2)).unwrap();
    assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());

    sync.send(Event::tick(4)).unwrap();
    let got: Vec<_> = (0..2)
        .map(|_| rx.recv_timeout(Duration::from_secs(2)).unwrap())
        .map(|ev| (ev.kind, ev.value))
        .collect();
    assert_eq!(got, vec![(EventKind::Hz, 330.0), (EventKind::Gain, 0.5)]);

    sync.send(Event::tick(8)).unwrap();
    assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
}

#[test]
fn sequencer_steps_and_wraps() {
    let field = Field::new();
    let seq = worker::spawn("seq", Sequencer::new()).unwrap();
    let (tap, rx) = Tap::new();
    field.add(seq.clone()).unwrap();
    field.add(worker::spawn("tap", tap).unwrap()).unwrap();
    field.connect("seq", "tap").unwrap();
    assert!(eventually(|| seq.has_child("tap")));

    let (listener, listener_rx) = Inbox::channel();
    seq.send(Event::register(&listener)).unwrap();
    for hz in [100.0, 200.0] {
        seq.send(Event::push(vec![Event::with_value(EventKind::Hz, hz)])).unwrap();
    }
    for i in 0..3 {
        seq.send(Event::tick(i)).unwrap();
    }

    assert_eq!(values(&rx, 3), vec![100.0, 200.0, 100.0]);
    assert_eq!(values(&listener_rx, 3), vec![100.0, 200.0, 100.0]);
}

#[test]
fn stop_releases_a_render_stuck_on_a_silent_producer() {
    let bay = Patchbay::new().unwrap();
    // an echo with nothing upstream never delivers
    bay.add("echo", "e").unwrap();
    bay.connect("e", "mixer").unwrap();
    assert!(eventually(|| bay.mixer().producers().len() == 1));

    let (device, _consumer) = RingDevice::freerunning(BUFSZ * 4);
    bay.play(device).unwrap();
    assert!(eventually(|| bay.mixer().is_playing()));
    sleep(Duration::from_millis(50));

    let mixer = Arc::clone(bay.mixer());
    let (done_tx, done_rx) = unbounded();
    thread::spawn(move || {
        mixer.stop();
        mixer.join();
        let _ = done_tx.send(());
    });
    assert!(done_rx.recv_timeout(Duration::from_secs(2)).is_ok(), "playback never stopped");
    assert!(bay.join().is_ok());
}

#[test]
fn killed_workers_close_their_port_and_refuse_events() {
    let field = Field::new();
    let src = worker::spawn("src", Dc(0.5)).unwrap();
    let fx = worker::spawn("fx", Delay::new(0.0)).unwrap();
    field.add(src.clone()).unwrap();
    field.add(fx.clone()).unwrap();
    field.connect("src", "fx").unwrap();
    assert!(eventually(|| src.has_child("fx") && fx.has_parent("src")));

    let port = src.port().unwrap();
    src.send(Event::kill()).unwrap();

    assert!(eventually(|| matches!(port.try_recv(), Err(TryRecvError::Disconnected))));
    assert!(src.port().is_none());
    assert!(src.children().is_empty());

    assert!(eventually(|| src.send(Event::kill()).is_err()));
    assert!(matches!(src.send(Event::kill()), Err(Error::Dropped { node }) if node == "src"));
    assert!(src.port().is_none());

    // the rest of the graph keeps answering
    fx.send(Event::with_value(EventKind::Delay, 0.05)).unwrap();
    assert!(eventually(|| fx.describe().contains("depth=1")));
}

#[test]
fn malformed_topology_events_are_dropped() {
    let node = worker::spawn("lead", Oscillator::sine()).unwrap();

    // connect needs a node payload
    node.send(Event::new(EventKind::Connect)).unwrap();
    node.send(Event::new(EventKind::Connection)).unwrap();
    node.send(Event::with_value(EventKind::Gain, 0.25)).unwrap();

    assert!(eventually(|| node.describe().contains("gain=0.25")));
    assert!(node.children().is_empty() && node.parents().is_empty());
    node.send(Event::kill()).unwrap();
}

#[test]
fn out_of_range_parameters_leave_workers_running() {
    let delay = worker::spawn("d", Delay::new(0.1)).unwrap();
    let env = worker::spawn("env", Adsr::new()).unwrap();
    let (clock, _deferred) = Clock::new(120.0);
    let clock = worker::spawn("clock", clock).unwrap();

    delay.send(Event::with_value(EventKind::Delay, f32::INFINITY)).unwrap();
    delay.send(Event::with_value(EventKind::Delay, 0.05)).unwrap();
    env.send(Event::with_value(EventKind::Attack, 1e30)).unwrap();
    env.send(Event::with_value(EventKind::Sustain, 0.3)).unwrap();
    clock.send(Event::with_value(EventKind::Bpm, 1e-30)).unwrap();
    clock.send(Event::with_value(EventKind::Bpm, 90.0)).unwrap();

    assert!(eventually(|| delay.describe().contains("depth=1")));
    assert!(eventually(|| {
        let summary = env.describe();
        summary.contains("a=50ms") && summary.contains("s=0.30")
    }));
    assert!(eventually(|| clock.describe().starts_with("bpm=90.0")));

    for node in [delay, env, clock] {
        node.send(Event::kill()).unwrap();
    }
}
