//! Decoded sound data and the resource lookup boundary.
//!
//! Decoding files is left to the host: whatever produces interleaved `f32` samples can
//! wrap them in a [`Sound`] and hand them out through a [`ResourceProvider`].

mod library;

pub use library::{ResourceProvider, SoundLibrary};

use crate::error::{Result, SoundError};
use std::sync::Arc;
use std::time::Duration;

/// Format descriptor of a sample stream, used to open device lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AudioFormat {
    /// Sample rate in Hz (e.g., 44100, 48000)
    pub sample_rate: u32,
    /// Number of interleaved channels (1 = mono, 2 = stereo)
    pub channels: u16,
    /// Bit depth of a single sample
    pub bits_per_sample: u16,
}

impl AudioFormat {
    /// Format of the `f32` streams stored in a [`Sound`].
    pub fn float(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels,
            bits_per_sample: 32,
        }
    }

    /// Samples per frame (one sample for each channel).
    pub fn frame_size(&self) -> usize {
        self.channels as usize
    }

    pub fn bytes_per_frame(&self) -> usize {
        self.frame_size() * (self.bits_per_sample as usize).div_ceil(8)
    }

    /// Number of samples (not frames) covering `duration`, rounded up to whole frames.
    pub fn samples_for(&self, duration: Duration) -> usize {
        let frames = (duration.as_nanos() * self.sample_rate as u128).div_ceil(1_000_000_000);
        frames as usize * self.frame_size()
    }

    /// Playback time of `samples` interleaved samples.
    pub fn duration_of(&self, samples: usize) -> Duration {
        let frames = samples / self.frame_size().max(1);
        Duration::from_secs_f64(frames as f64 / self.sample_rate.max(1) as f64)
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(SoundError::InvalidArgument(
                "Sample rate must be greater than 0".to_string(),
            ));
        }
        if self.channels == 0 {
            return Err(SoundError::InvalidArgument(
                "Channel count must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Immutable decoded audio, shared by every playback of it.
///
/// Samples are stored **interleaved** (`[L0, R0, L1, R1, ...]` for stereo), which is the
/// layout device lines consume. Cloning a `Sound` is cheap and yields the same sound:
/// equality is identity of the underlying data, not a comparison of samples.
#[derive(Debug, Clone)]
pub struct Sound {
    inner: Arc<SoundInner>,
}

#[derive(Debug)]
struct SoundInner {
    name: String,
    samples: Vec<f32>,
    format: AudioFormat,
    duration: Duration,
}

impl Sound {
    /// Wraps decoded interleaved samples.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if the sample rate or channel count is zero, or if the
    /// sample count is not a whole number of frames.
    pub fn new(
        name: impl Into<String>,
        samples: Vec<f32>,
        sample_rate: u32,
        channels: u16,
    ) -> Result<Self> {
        let format = AudioFormat::float(sample_rate, channels);
        format.validate()?;

        if samples.len() % format.frame_size() != 0 {
            return Err(SoundError::InvalidArgument(format!(
                "{} samples is not a whole number of {}-channel frames",
                samples.len(),
                channels
            )));
        }

        let duration = format.duration_of(samples.len());
        Ok(Self {
            inner: Arc::new(SoundInner {
                name: name.into(),
                samples,
                format,
                duration,
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn format(&self) -> AudioFormat {
        self.inner.format
    }

    pub fn sample_rate(&self) -> u32 {
        self.inner.format.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.inner.format.channels
    }

    pub fn duration(&self) -> Duration {
        self.inner.duration
    }

    /// Interleaved sample data.
    pub fn samples(&self) -> &[f32] {
        &self.inner.samples
    }

    pub fn total_frames(&self) -> usize {
        self.inner.samples.len() / self.inner.format.frame_size()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.samples.is_empty()
    }

    /// Returns `true` if both handles refer to the same decoded data.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl PartialEq for Sound {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for Sound {}
