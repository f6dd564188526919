//! A saw voice through a gain LFO and an echo, played on the default output.
//!
//! Run with: cargo run --example echo_patch --features cpal_sink

use std::thread::sleep;
use std::time::Duration;

use klangfeld::note::parse_note;
use klangfeld::{CpalDevice, Error, Event, EventKind, Patchbay, When};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let bay = Patchbay::new()?;
    bay.add("saw", "voice")?;
    bay.add("gain-lfo", "tremolo")?;
    bay.add("echo", "space")?;

    bay.connect("voice", "tremolo")?;
    bay.connect("tremolo", "space")?;
    bay.connect("space", "mixer")?;

    bay.fire("tremolo", Event::with_value(EventKind::Hz, 3.0), When::Immediate)?;
    bay.fire("space", Event::with_value(EventKind::Delay, 0.4), When::Immediate)?;

    bay.play_with(|| CpalDevice::default_output().ok_or_else(|| Error::Device("no audio device".into())))?;

    // a new note on every clock tick
    println!("Playing...");
    for name in ["A2", "C3", "E3", "G3", "A3", "G3", "E3", "C3"] {
        let note = parse_note(name)?;
        bay.fire("voice", Event::with_value(EventKind::Hz, note.hz()), When::Deferred)?;
        sleep(Duration::from_secs(1));
    }

    bay.stop();
    bay.join()?;
    Ok(())
}
