use super::PlaybackInner;
use crate::error::{Result, SoundError};
use crate::sync::{AtomicF32, lock};
use std::fmt;
use std::sync::{Arc, Weak};

/// Storage of one control's value, shared with the owning playback's live set
#[derive(Debug)]
pub(crate) struct ControlCell {
    value: AtomicF32,
}

impl ControlCell {
    pub(crate) fn new(value: f32) -> Self {
        Self {
            value: AtomicF32::new(value),
        }
    }

    fn get(&self) -> f32 {
        self.value.load()
    }
}

/// Volume inputs of a playback, guarded by its volume lock
#[derive(Debug)]
pub(crate) struct VolumeState {
    /// Product of the final values of every released control
    residual: f32,
    pub(crate) controls: Vec<Arc<ControlCell>>,
}

impl VolumeState {
    pub(crate) fn new(controls: Vec<Arc<ControlCell>>) -> Self {
        Self {
            residual: 1.0,
            controls,
        }
    }

    pub(crate) fn composed(&self) -> f32 {
        self.controls
            .iter()
            .fold(self.residual, |volume, control| volume * control.get())
    }
}

/// One multiplicative factor of a playback's volume.
///
/// A playback's audible volume is the product of all of its live controls (and of the
/// values released controls had when they went away). Controls hold their playback weakly:
/// a control outliving its playback keeps working as a plain value.
///
/// Dropping a control folds its last value into the playback, so the volume does not
/// jump when, say, a fade's controls are released.
pub struct VolumeControl {
    cell: Arc<ControlCell>,
    owner: Weak<PlaybackInner>,
}

impl VolumeControl {
    pub(crate) fn attached(owner: Weak<PlaybackInner>, cell: Arc<ControlCell>) -> Self {
        Self { cell, owner }
    }

    pub fn get(&self) -> f32 {
        self.cell.get()
    }

    /// Sets the factor and recomposes the owning playback's volume.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if `value` is negative or NaN.
    pub fn set(&self, value: f32) -> Result<()> {
        if value.is_nan() || value < 0.0 {
            return Err(SoundError::InvalidArgument(format!(
                "Volume must be a non-negative number, got {}",
                value
            )));
        }

        match self.owner.upgrade() {
            Some(owner) => {
                let volume = lock(&owner.volume);
                self.cell.value.store(value);
                owner.apply_volume(volume.composed());
            }
            None => self.cell.value.store(value),
        }
        Ok(())
    }

    /// Detaches the control, keeping its current value in the playback's volume.
    pub fn release(self) {}

    /// Whether the owning playback still exists.
    pub fn is_attached(&self) -> bool {
        self.owner.strong_count() > 0
    }
}

impl Drop for VolumeControl {
    fn drop(&mut self) {
        let Some(owner) = self.owner.upgrade() else {
            return;
        };
        let mut volume = lock(&owner.volume);
        if let Some(index) = volume
            .controls
            .iter()
            .position(|cell| Arc::ptr_eq(cell, &self.cell))
        {
            volume.controls.swap_remove(index);
            volume.residual *= self.cell.get();
            owner.apply_volume(volume.composed());
        }
    }
}

impl fmt::Debug for VolumeControl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VolumeControl")
            .field("value", &self.get())
            .field("attached", &self.is_attached())
            .finish()
    }
}
