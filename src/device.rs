//! Audio devices: whatever calls [`Mixer::render`] on a clock of its own.
//!
//! - [`RingDevice`] renders on a plain thread into an `rtrb` ring buffer, for
//!   recording, tests and hosts that own the speakers themselves.
//! - [`CpalDevice`] drives a system output stream (requires `cpal_sink`).
//!
//! # Example: Capture a second of audio
//!
//! ```no_run
//! use klangfeld::{Patchbay, RingDevice, SRATE};
//!
//! let bay = Patchbay::new().unwrap();
//! bay.add("sine", "a").unwrap();
//! bay.connect("a", "mixer").unwrap();
//!
//! let (device, mut consumer) = RingDevice::freerunning(SRATE as usize);
//! bay.play(device).unwrap();
//!
//! let mut captured = Vec::new();
//! while captured.len() < SRATE as usize {
//!     if let Ok(s) = consumer.pop() {
//!         captured.push(s);
//!     }
//! }
//! bay.stop();
//! bay.join().unwrap();
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use rtrb::{Consumer, Producer, RingBuffer};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::nodes::Mixer;
use crate::{BUFSZ, SRATE};

/// Lifecycle hooks the mixer drives around playback.
pub trait AudioDevice {
    /// Prepare to render from `mixer`.
    fn open(&mut self, mixer: Arc<Mixer>) -> Result<()>;
    /// Begin calling [`Mixer::render`].
    fn start(&mut self) -> Result<()>;
    /// Stop calling [`Mixer::render`]. Must not return while a call is running.
    fn stop(&mut self) -> Result<()>;
    fn close(&mut self) -> Result<()>;
}

impl<D: AudioDevice + ?Sized> AudioDevice for Box<D> {
    fn open(&mut self, mixer: Arc<Mixer>) -> Result<()> {
        (**self).open(mixer)
    }

    fn start(&mut self) -> Result<()> {
        (**self).start()
    }

    fn stop(&mut self) -> Result<()> {
        (**self).stop()
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }
}

/// Headless device: a render thread pushing mixed samples into a ring buffer.
///
/// In real-time mode the thread paces itself to [`SRATE`]; free-running mode
/// renders as fast as the consumer drains.
pub struct RingDevice {
    realtime: bool,
    producer: Option<Producer<f32>>,
    mixer: Option<Arc<Mixer>>,
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<Producer<f32>>>,
}

impl RingDevice {
    fn new(capacity: usize, realtime: bool) -> (Self, Consumer<f32>) {
        let (producer, consumer) = RingBuffer::new(capacity.max(BUFSZ));
        let device = Self {
            realtime,
            producer: Some(producer),
            mixer: None,
            running: Arc::new(AtomicBool::new(false)),
            thread: None,
        };
        (device, consumer)
    }

    /// A device that renders one buffer every `BUFSZ / SRATE` seconds.
    pub fn realtime(capacity: usize) -> (Self, Consumer<f32>) {
        Self::new(capacity, true)
    }

    /// A device that renders whenever the ring has room.
    pub fn freerunning(capacity: usize) -> (Self, Consumer<f32>) {
        Self::new(capacity, false)
    }
}

fn render_loop(mixer: Arc<Mixer>, mut producer: Producer<f32>, running: Arc<AtomicBool>, realtime: bool) -> Producer<f32> {
    let period = Duration::from_secs_f64(BUFSZ as f64 / SRATE as f64);
    let mut next = Instant::now();
    let mut block = vec![0.0f32; BUFSZ];

    while running.load(Ordering::Acquire) {
        if producer.is_abandoned() {
            debug!("ring consumer dropped, render thread exiting");
            break;
        }
        if producer.slots() < BUFSZ {
            thread::sleep(Duration::from_millis(1));
            continue;
        }

        mixer.render(&mut block);
        for &s in &block {
            // room was checked above and only this thread pushes
            let _ = producer.push(s);
        }

        if realtime {
            next += period;
            let now = Instant::now();
            if next > now {
                thread::sleep(next - now);
            } else {
                next = now;
            }
        }
    }
    producer
}

impl AudioDevice for RingDevice {
    fn open(&mut self, mixer: Arc<Mixer>) -> Result<()> {
        self.mixer = Some(mixer);
        Ok(())
    }

    fn start(&mut self) -> Result<()> {
        let mixer = self.mixer.clone().ok_or_else(|| Error::Device("ring device is not open".into()))?;
        let producer = self
            .producer
            .take()
            .ok_or_else(|| Error::Device("ring device already started".into()))?;

        self.running.store(true, Ordering::Release);
        let running = Arc::clone(&self.running);
        let realtime = self.realtime;
        let handle = thread::Builder::new()
            .name("render".into())
            .spawn(move || render_loop(mixer, producer, running, realtime))?;
        self.thread = Some(handle);
        info!(realtime, "ring device started");
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.thread.take() {
            let producer = handle
                .join()
                .map_err(|_| Error::Device("render thread panicked".into()))?;
            self.producer = Some(producer);
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.mixer = None;
        Ok(())
    }
}

#[cfg(feature = "cpal_sink")]
pub use self::cpal_device::CpalDevice;

#[cfg(feature = "cpal_sink")]
mod cpal_device {
    use std::sync::Arc;

    use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
    use cpal::{SampleFormat, StreamConfig};
    use tracing::{error, info};

    use super::AudioDevice;
    use crate::error::{Error, Result};
    use crate::nodes::Mixer;
    use crate::{BUFSZ, SRATE};

    /// A system output device.
    ///
    /// Use [`CpalDevice::default_output`] for the system default, or
    /// [`CpalDevice::list_outputs`] to pick one. The stream runs at [`SRATE`];
    /// the mono mix is copied to every channel.
    pub struct CpalDevice {
        device: cpal::Device,
        name: String,
        channels: u16,
        format: SampleFormat,
        stream: Option<cpal::Stream>,
    }

    impl CpalDevice {
        fn from_device(device: cpal::Device) -> Option<Self> {
            let config = device.default_output_config().ok()?;
            let name = device.name().unwrap_or_else(|_| "Unknown".into());
            Some(Self {
                device,
                name,
                channels: config.channels(),
                format: config.sample_format(),
                stream: None,
            })
        }

        /// Get the system's default output device.
        pub fn default_output() -> Option<Self> {
            cpal::default_host().default_output_device().and_then(Self::from_device)
        }

        /// List all available audio output devices.
        pub fn list_outputs() -> Vec<Self> {
            cpal::default_host()
                .output_devices()
                .map(|devices| devices.filter_map(Self::from_device).collect())
                .unwrap_or_default()
        }

        pub fn name(&self) -> &str {
            &self.name
        }

        pub fn channels(&self) -> u16 {
            self.channels
        }

        fn build(&self, mixer: Arc<Mixer>) -> Result<cpal::Stream> {
            let config = StreamConfig {
                channels: self.channels,
                sample_rate: cpal::SampleRate(SRATE),
                buffer_size: cpal::BufferSize::Default,
            };
            let channels = self.channels as usize;
            let on_error = |err: cpal::StreamError| error!("cpal stream error: {:?}", err);

            let stream = match self.format {
                SampleFormat::F32 => {
                    let mut feed = Feed::new(mixer);
                    self.device.build_output_stream(
                        &config,
                        move |data: &mut [f32], _| feed.fill(data, channels, |s| s),
                        on_error,
                        None,
                    )
                }
                SampleFormat::I16 => {
                    let mut feed = Feed::new(mixer);
                    self.device.build_output_stream(
                        &config,
                        move |data: &mut [i16], _| {
                            feed.fill(data, channels, |s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
                        },
                        on_error,
                        None,
                    )
                }
                SampleFormat::U16 => {
                    let mut feed = Feed::new(mixer);
                    self.device.build_output_stream(
                        &config,
                        move |data: &mut [u16], _| {
                            feed.fill(data, channels, |s| {
                                ((s.clamp(-1.0, 1.0) + 1.0) * 0.5 * u16::MAX as f32) as u16
                            })
                        },
                        on_error,
                        None,
                    )
                }
                other => return Err(Error::Device(format!("unsupported sample format {:?}", other))),
            };
            stream.map_err(|e| Error::Device(e.to_string()))
        }
    }

    /// Cuts the mixer's fixed-size blocks into whatever the callback asks for.
    struct Feed {
        mixer: Arc<Mixer>,
        block: Vec<f32>,
        pos: usize,
    }

    impl Feed {
        fn new(mixer: Arc<Mixer>) -> Self {
            Self { mixer, block: vec![0.0; BUFSZ], pos: BUFSZ }
        }

        fn fill<T: Copy>(&mut self, data: &mut [T], channels: usize, convert: impl Fn(f32) -> T) {
            for frame in data.chunks_mut(channels.max(1)) {
                if self.pos == BUFSZ {
                    self.mixer.render(&mut self.block);
                    self.pos = 0;
                }
                let v = convert(self.block[self.pos]);
                self.pos += 1;
                for out in frame.iter_mut() {
                    *out = v;
                }
            }
        }
    }

    impl AudioDevice for CpalDevice {
        fn open(&mut self, mixer: Arc<Mixer>) -> Result<()> {
            self.stream = Some(self.build(mixer)?);
            info!(device = %self.name, channels = self.channels, "cpal stream built");
            Ok(())
        }

        fn start(&mut self) -> Result<()> {
            match &self.stream {
                Some(stream) => stream.play().map_err(|e| Error::Device(e.to_string())),
                None => Err(Error::Device("cpal device is not open".into())),
            }
        }

        fn stop(&mut self) -> Result<()> {
            match &self.stream {
                Some(stream) => stream.pause().map_err(|e| Error::Device(e.to_string())),
                None => Ok(()),
            }
        }

        fn close(&mut self) -> Result<()> {
            self.stream = None;
            Ok(())
        }
    }
}
