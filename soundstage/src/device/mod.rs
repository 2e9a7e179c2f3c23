//! Device audio lines.
//!
//! A [`Line`] is one output channel on the audio device, owned by exactly one playback.
//! Each line is mixed with the others by the operating system; the crate never sums
//! samples of different sounds itself. Writes block while the line's buffer is full,
//! which paces the playback worker threads without any explicit timing.
//!
//! Two devices are provided:
//! - [`CpalDevice`]: one cpal output stream per line
//! - [`HeadlessDevice`]: no audio output, for servers, CI and tests

mod cpal_device;
mod headless;

pub use cpal_device::{CpalDevice, CpalDeviceDesc};
pub use headless::{HeadlessDevice, HeadlessDeviceDesc, HeadlessLine};

use crate::audio_data::AudioFormat;
use crate::error::Result;
use crate::sync::AtomicF32;
use std::sync::atomic::{AtomicBool, Ordering};

/// Decibel range supported by a line's gain control.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GainRange {
    /// Lowest representable gain; anything quieter must be muted instead
    pub min_db: f32,
    pub max_db: f32,
}

impl GainRange {
    pub fn new(min_db: f32, max_db: f32) -> Self {
        Self { min_db, max_db }
    }

    pub fn clamp(&self, db: f32) -> f32 {
        db.clamp(self.min_db, self.max_db)
    }
}

impl Default for GainRange {
    /// -80 dB to +6.0206 dB (a linear factor of 2).
    fn default() -> Self {
        Self {
            min_db: -80.0,
            max_db: 6.0206,
        }
    }
}

/// Opens lines on an output device.
pub trait AudioDevice: Send + Sync {
    /// Acquires a new line for samples of the given format. The line is returned open
    /// and started.
    ///
    /// # Errors
    ///
    /// Returns `ResourceUnavailable` if the device cannot provide another line.
    fn open_line(&self, format: &AudioFormat) -> Result<Box<dyn Line>>;
}

/// A single output line of the audio device.
///
/// All methods take `&self`: the writer is a playback worker thread while control calls
/// (gain, pause, cancel) arrive from the tick thread or any other thread.
pub trait Line: Send + Sync {
    fn format(&self) -> AudioFormat;

    /// Capacity of the line's internal buffer, in samples.
    fn buffer_size(&self) -> usize;

    /// Writes interleaved samples, blocking until at least one frame fits.
    ///
    /// Returns the number of samples accepted, always a whole number of frames.
    ///
    /// # Errors
    ///
    /// `LineClosed` once the line has been closed, `Device` for backend failures.
    fn write(&self, samples: &[f32]) -> Result<usize>;

    /// Blocks until every buffered sample has been played or the line is closed.
    fn drain(&self);

    /// Discards buffered samples that have not been played yet.
    fn flush(&self);

    /// Resumes consumption of buffered samples.
    fn start(&self);

    /// Halts consumption; buffered samples are kept.
    fn stop(&self);

    /// Releases the line. Idempotent.
    fn close(&self);

    fn is_open(&self) -> bool;

    /// `true` while the line is open and started.
    fn is_active(&self) -> bool;

    fn gain_range(&self) -> GainRange;

    fn set_gain_db(&self, db: f32);

    fn gain_db(&self) -> f32;

    fn set_muted(&self, muted: bool);

    fn is_muted(&self) -> bool;

    /// Sets the left/right balance in `[-1, 1]`.
    fn set_balance(&self, balance: f32);

    fn balance(&self) -> f32;
}

/// Gain, mute and balance state shared between a line handle and whatever renders it.
#[derive(Debug)]
pub(crate) struct LineControls {
    range: GainRange,
    gain_db: AtomicF32,
    muted: AtomicBool,
    balance: AtomicF32,
}

impl LineControls {
    pub(crate) fn new(range: GainRange) -> Self {
        Self {
            range,
            gain_db: AtomicF32::new(0.0),
            muted: AtomicBool::new(false),
            balance: AtomicF32::new(0.0),
        }
    }

    pub(crate) fn range(&self) -> GainRange {
        self.range
    }

    pub(crate) fn set_gain_db(&self, db: f32) {
        self.gain_db.store(self.range.clamp(db));
    }

    pub(crate) fn gain_db(&self) -> f32 {
        self.gain_db.load()
    }

    pub(crate) fn set_muted(&self, muted: bool) {
        self.muted.store(muted, Ordering::Release);
    }

    pub(crate) fn is_muted(&self) -> bool {
        self.muted.load(Ordering::Acquire)
    }

    pub(crate) fn set_balance(&self, balance: f32) {
        let balance = if balance.is_nan() { 0.0 } else { balance };
        self.balance.store(balance.clamp(-1.0, 1.0));
    }

    pub(crate) fn balance(&self) -> f32 {
        self.balance.load()
    }

    /// Linear amplitude factor of the current gain, 0 when muted.
    pub(crate) fn linear_gain(&self) -> f32 {
        if self.is_muted() {
            0.0
        } else {
            10f32.powf(self.gain_db() / 20.0)
        }
    }

    /// Left and right channel factors of the current balance.
    pub(crate) fn balance_gains(&self) -> (f32, f32) {
        let balance = self.balance();
        let left = if balance > 0.0 { 1.0 - balance } else { 1.0 };
        let right = if balance < 0.0 { 1.0 + balance } else { 1.0 };
        (left, right)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gain_is_clamped_to_range() {
        let controls = LineControls::new(GainRange::default());
        controls.set_gain_db(20.0);
        assert!((controls.gain_db() - 6.0206).abs() < 1e-4);
        controls.set_gain_db(-200.0);
        assert_eq!(controls.gain_db(), -80.0);
    }

    #[test]
    fn test_linear_gain_and_mute() {
        let controls = LineControls::new(GainRange::default());
        controls.set_gain_db(-6.0206);
        assert!((controls.linear_gain() - 0.5).abs() < 1e-4);

        controls.set_muted(true);
        assert_eq!(controls.linear_gain(), 0.0);
    }

    #[test]
    fn test_balance_gains() {
        let controls = LineControls::new(GainRange::default());
        assert_eq!(controls.balance_gains(), (1.0, 1.0));

        controls.set_balance(-0.25);
        assert_eq!(controls.balance_gains(), (1.0, 0.75));

        controls.set_balance(3.0);
        assert_eq!(controls.balance(), 1.0);
        assert_eq!(controls.balance_gains(), (0.0, 1.0));
    }
}
