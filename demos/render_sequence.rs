//! Clock-driven sequencer rendered to `sequence.wav` without a sound card.
//!
//! Run with: cargo run --example render_sequence

use std::thread;
use std::time::Duration;

use klangfeld::note::parse_note;
use klangfeld::{Event, EventKind, Patchbay, RingDevice, When, SRATE};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let bay = Patchbay::with_settings(240.0, 0.5)?;
    bay.add("sequencer", "seq")?;
    bay.add("sine", "lead")?;
    bay.add("adsr", "env")?;

    bay.connect("clock", "seq")?;
    bay.connect("seq", "lead")?;
    bay.connect("lead", "env")?;
    bay.connect("env", "mixer")?;

    // note on one tick, silence the next, so the envelope gets to release
    for name in ["C4", "E4", "G4", "C5"] {
        let hz = parse_note(name)?.hz();
        bay.fire("seq", Event::push(vec![Event::with_value(EventKind::KeyDown, hz)]), When::Immediate)?;
        bay.fire("seq", Event::push(vec![Event::new(EventKind::KeyUp)]), When::Immediate)?;
    }

    let (device, mut consumer) = RingDevice::freerunning(SRATE as usize);
    bay.play(device)?;

    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: SRATE,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut writer = hound::WavWriter::create("sequence.wav", spec)?;
    let mut written = 0;
    while written < 4 * SRATE as usize {
        match consumer.pop() {
            Ok(s) => {
                writer.write_sample(s)?;
                written += 1;
            }
            Err(_) => thread::sleep(Duration::from_millis(1)),
        }
    }
    writer.finalize()?;

    bay.stop();
    drop(consumer);
    bay.join()?;
    println!("wrote sequence.wav");
    Ok(())
}
