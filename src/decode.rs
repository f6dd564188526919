//! Decoding sample files to mono `f32` tables.
//!
//! `.wav` is read with `hound`, `.ogg` with `lewton` (feature `vorbis_src`).
//! Integer PCM is scaled into `[-1, 1]` by its bit depth, and multichannel
//! frames are averaged down to one channel. No resampling is done: a file
//! recorded at another rate plays back at the wrong pitch.

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::SRATE;

/// A decoded, shareable sample table.
#[derive(Clone, Debug)]
pub struct SampleData {
    samples: Arc<[f32]>,
    sample_rate: u32,
}

impl SampleData {
    pub fn from_samples(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self { samples: samples.into(), sample_rate }
    }

    /// Decode `path`, picking the format from its extension.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();

        let data = match ext.as_str() {
            "wav" | "wave" => Self::open_wav(path)?,
            "ogg" => Self::open_ogg(path)?,
            other => return Err(Error::Decode(format!("unsupported file type '{}'", other))),
        };

        if data.sample_rate != SRATE {
            warn!(path = %path.display(), rate = data.sample_rate, "sample rate differs from {}", SRATE);
        }
        debug!(path = %path.display(), frames = data.len(), "decoded");
        Ok(data)
    }

    pub fn open_wav(path: &Path) -> Result<Self> {
        let reader = hound::WavReader::open(path).map_err(decode_err)?;
        let spec = reader.spec();
        let channels = spec.channels.max(1) as usize;

        let interleaved: Vec<f32> = match spec.sample_format {
            hound::SampleFormat::Float => reader
                .into_samples::<f32>()
                .collect::<core::result::Result<_, _>>()
                .map_err(decode_err)?,
            hound::SampleFormat::Int => {
                let scale = (1i64 << (spec.bits_per_sample.clamp(1, 32) - 1)) as f32;
                reader
                    .into_samples::<i32>()
                    .map(|s| s.map(|v| v as f32 / scale))
                    .collect::<core::result::Result<_, _>>()
                    .map_err(decode_err)?
            }
        };

        Ok(Self::from_samples(downmix(&interleaved, channels), spec.sample_rate))
    }

    #[cfg(feature = "vorbis_src")]
    pub fn open_ogg(path: &Path) -> Result<Self> {
        use lewton::inside_ogg::OggStreamReader;

        let file = std::fs::File::open(path)?;
        let mut reader = OggStreamReader::new(file).map_err(decode_err)?;
        let channels = reader.ident_hdr.audio_channels.max(1) as usize;
        let sample_rate = reader.ident_hdr.audio_sample_rate;

        let mut interleaved = Vec::new();
        while let Some(packet) = reader.read_dec_packet_itl().map_err(decode_err)? {
            interleaved.extend(packet.into_iter().map(|s| s as f32 / 32768.0));
        }

        Ok(Self::from_samples(downmix(&interleaved, channels), sample_rate))
    }

    #[cfg(not(feature = "vorbis_src"))]
    pub fn open_ogg(_path: &Path) -> Result<Self> {
        Err(Error::Decode("ogg support requires the vorbis_src feature".into()))
    }

    pub fn samples(&self) -> Arc<[f32]> {
        Arc::clone(&self.samples)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

fn decode_err(e: impl std::fmt::Display) -> Error {
    Error::Decode(e.to_string())
}

fn downmix(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels == 1 {
        return interleaved.to_vec();
    }
    interleaved
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn write_wav(path: &Path, channels: u16, bits: u16, frames: &[i32]) {
        let spec = hound::WavSpec {
            channels,
            sample_rate: SRATE,
            bits_per_sample: bits,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for &s in frames {
            writer.write_sample(s).unwrap();
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn sixteen_bit_mono_is_normalized() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mono.wav");
        write_wav(&path, 1, 16, &[0, 16384, -32768, 32767]);

        let data = SampleData::open(&path).unwrap();
        assert_eq!(data.sample_rate(), SRATE);
        let s = data.samples();
        assert_eq!(s.len(), 4);
        assert_abs_diff_eq!(s[1], 0.5);
        assert_abs_diff_eq!(s[2], -1.0);
        assert_abs_diff_eq!(s[3], 1.0, epsilon = 1e-4);
    }

    #[test]
    fn stereo_is_averaged() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stereo.wav");
        write_wav(&path, 2, 16, &[16384, 0, -16384, -16384]);

        let s = SampleData::open(&path).unwrap().samples();
        assert_eq!(s.len(), 2);
        assert_abs_diff_eq!(s[0], 0.25);
        assert_abs_diff_eq!(s[1], -0.5);
    }

    #[test]
    fn float_wav_passes_through() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("float.wav");
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 22050,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for s in [0.25f32, -0.75] {
            writer.write_sample(s).unwrap();
        }
        writer.finalize().unwrap();

        let data = SampleData::open(&path).unwrap();
        assert_eq!(data.sample_rate(), 22050);
        assert_eq!(&data.samples()[..], &[0.25, -0.75]);
    }

    #[test]
    fn unknown_extension_is_rejected() {
        assert!(matches!(SampleData::open("beat.mp3"), Err(Error::Decode(_))));
    }
}
