use core::ops::{Deref, DerefMut};

use crate::BUFSZ;

/// One block of mono audio: exactly [`BUFSZ`] samples at [`SRATE`](crate::SRATE).
///
/// Buffers are boxed so moving one through a channel copies a pointer, not
/// eight kilobytes.
#[derive(Clone, Debug, PartialEq)]
pub struct AudioBuffer(Box<[f32; BUFSZ]>);

impl AudioBuffer {
    pub fn silence() -> Self {
        Self(Box::new([0.0; BUFSZ]))
    }

    /// Build a buffer by evaluating `f` at every sample index.
    pub fn from_fn(mut f: impl FnMut(usize) -> f32) -> Self {
        let mut buf = Self::silence();
        for (i, s) in buf.iter_mut().enumerate() {
            *s = f(i);
        }
        buf
    }

    pub fn is_silent(&self) -> bool {
        self.iter().all(|&s| s == 0.0)
    }

    pub fn peak(&self) -> f32 {
        self.iter().fold(0.0f32, |m, s| m.max(s.abs()))
    }
}

impl Default for AudioBuffer {
    fn default() -> Self {
        Self::silence()
    }
}

impl Deref for AudioBuffer {
    type Target = [f32];

    fn deref(&self) -> &[f32] {
        &self.0[..]
    }
}

impl DerefMut for AudioBuffer {
    fn deref_mut(&mut self) -> &mut [f32] {
        &mut self.0[..]
    }
}
