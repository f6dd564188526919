//! klangfeld: drive a patch bay from a command script or standard input.
//!
//! ```text
//! klangfeld -f patch.txt              # play through the default output
//! klangfeld --record out.wav < patch  # render to a file instead
//! ```

use std::fs::File;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use clap::Parser;
use rtrb::Consumer;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use klangfeld::nodes::control::DEFAULT_BPM;
use klangfeld::nodes::sink::DEFAULT_GAIN;
use klangfeld::command::Command;
use klangfeld::{Error, Patchbay, RingDevice, SRATE};

/// Patch-bay synthesizer
#[derive(Parser)]
#[command(name = "klangfeld")]
#[command(version)]
struct Cli {
    /// Command file to run (default: read standard input)
    #[arg(short, long)]
    file: Option<PathBuf>,

    /// Tempo of the built-in clock
    #[arg(long, default_value_t = DEFAULT_BPM)]
    bpm: f32,

    /// Master gain of the mixer
    #[arg(long, default_value_t = DEFAULT_GAIN)]
    gain: f32,

    /// Render without opening a sound card
    #[arg(long)]
    headless: bool,

    /// Record the mix to a WAV file (implies --headless)
    #[arg(long)]
    record: Option<PathBuf>,

    /// Keep a Graphviz rendering of the patch at this path, rewritten after
    /// every edit
    #[arg(long)]
    dot: Option<PathBuf>,

    /// List output devices and exit
    #[arg(long)]
    list_devices: bool,

    /// More logging (-v debug, -vv trace); RUST_LOG overrides
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with_writer(io::stderr)
        .init();

    if cli.list_devices {
        list_devices();
        return Ok(());
    }

    let bay = Patchbay::with_settings(cli.bpm, cli.gain)?;
    let drainer = start_output(&bay, &cli)?;

    let dot = cli.dot.clone();
    let after = move |bay: &Patchbay, cmd: &Command| {
        let Some(path) = &dot else { return };
        if matches!(cmd, Command::Sleep(_) | Command::Info | Command::Dot) {
            return;
        }
        match std::fs::write(path, bay.dot()) {
            Ok(()) => debug!(path = %path.display(), "graph rewritten"),
            Err(e) => warn!(path = %path.display(), "cannot write graph: {}", e),
        }
    };

    let stdout = io::stdout();
    match &cli.file {
        Some(path) => bay.run_script_with(BufReader::new(File::open(path)?), stdout.lock(), after)?,
        None => bay.run_script_with(io::stdin().lock(), stdout.lock(), after)?,
    }
    info!("script finished");

    bay.stop();
    bay.join()?;
    if let Some(drainer) = drainer {
        drainer.join().map_err(|_| Error::Device("drain thread panicked".into()))??;
    }
    Ok(())
}

/// Start playback. Headless output needs a thread to empty the ring, whose
/// handle is returned.
fn start_output(bay: &Patchbay, cli: &Cli) -> klangfeld::Result<Option<JoinHandle<klangfeld::Result<()>>>> {
    if cli.headless || cli.record.is_some() {
        let (device, consumer) = RingDevice::realtime(SRATE as usize);
        bay.play(device)?;
        let record = cli.record.clone();
        let handle = thread::Builder::new().name("drain".into()).spawn(move || match record {
            Some(path) => record_wav(consumer, &path),
            None => drain(consumer, |_| Ok(())),
        })?;
        return Ok(Some(handle));
    }

    #[cfg(feature = "cpal_sink")]
    {
        bay.play_with(|| {
            klangfeld::CpalDevice::default_output().ok_or_else(|| Error::Device("no default output device".into()))
        })?;
        Ok(None)
    }

    #[cfg(not(feature = "cpal_sink"))]
    {
        warn!("built without cpal_sink, rendering headless");
        let (device, consumer) = RingDevice::realtime(SRATE as usize);
        bay.play(device)?;
        let handle = thread::Builder::new()
            .name("drain".into())
            .spawn(move || drain(consumer, |_| Ok(())))?;
        Ok(Some(handle))
    }
}

fn record_wav(consumer: Consumer<f32>, path: &Path) -> klangfeld::Result<()> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: SRATE,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let wav_err = |e: hound::Error| Error::Device(e.to_string());
    let mut writer = hound::WavWriter::create(path, spec).map_err(wav_err)?;
    drain(consumer, |s| writer.write_sample(s).map_err(wav_err))?;
    writer.finalize().map_err(wav_err)?;
    info!(path = %path.display(), "recording written");
    Ok(())
}

/// Hand every sample to `sink` until the ring's producer is gone and the ring
/// is empty.
fn drain(mut consumer: Consumer<f32>, mut sink: impl FnMut(f32) -> klangfeld::Result<()>) -> klangfeld::Result<()> {
    loop {
        match consumer.pop() {
            Ok(s) => sink(s)?,
            Err(_) if consumer.is_abandoned() && consumer.is_empty() => return Ok(()),
            Err(_) => thread::sleep(Duration::from_millis(5)),
        }
    }
}

#[cfg(feature = "cpal_sink")]
fn list_devices() {
    for device in klangfeld::CpalDevice::list_outputs() {
        println!("{} ({} channels)", device.name(), device.channels());
    }
}

#[cfg(not(feature = "cpal_sink"))]
fn list_devices() {
    warn!("built without cpal_sink, no devices to list");
}
