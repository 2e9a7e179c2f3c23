use super::{LoopMode, Playback, VolumeControl};
use crate::audio_data::Sound;
use crate::config::SoundSource;
use crate::device::AudioDevice;
use crate::error::{Result, SoundError};
use crate::executor::PlaybackExecutor;
use crate::math::{SpatialParams, Vec2};
use crate::sync::lock;
use std::fmt;
use std::ops::Deref;
use std::sync::{Arc, Mutex, Weak};

/// Sound effects the engine refreshes every tick. Closed for good on engine shutdown.
#[derive(Debug, Default)]
pub(crate) struct SfxRegistry {
    state: Mutex<RegistryState>,
}

#[derive(Debug, Default)]
struct RegistryState {
    sounds: Vec<Arc<SfxPlayback>>,
    closed: bool,
}

impl SfxRegistry {
    /// Adds `sfx` if it is not registered yet. Returns whether it was added.
    ///
    /// # Errors
    ///
    /// `InvalidState` once the registry is closed.
    fn register(&self, sfx: &Arc<SfxPlayback>) -> Result<bool> {
        let mut state = lock(&self.state);
        if state.closed {
            return Err(SoundError::InvalidState(
                "Sound engine has been terminated".to_string(),
            ));
        }
        if state.sounds.iter().any(|s| Arc::ptr_eq(s, sfx)) {
            return Ok(false);
        }
        state.sounds.push(sfx.clone());
        Ok(true)
    }

    pub(crate) fn remove(&self, sfx: &Arc<SfxPlayback>) {
        lock(&self.state).sounds.retain(|s| !Arc::ptr_eq(s, sfx));
    }

    pub(crate) fn snapshot(&self) -> Vec<Arc<SfxPlayback>> {
        lock(&self.state).sounds.clone()
    }

    /// Refuses every later registration and hands back the registered effects.
    pub(crate) fn close(&self) -> Vec<Arc<SfxPlayback>> {
        let mut state = lock(&self.state);
        state.closed = true;
        std::mem::take(&mut state.sounds)
    }
}

/// A sound effect heard from a position in the world.
///
/// Attenuation and pan are recomputed from the listener location every tick. The
/// attenuation has a volume control of its own, so the master volume stays free for
/// the caller.
pub struct SfxPlayback {
    playback: Playback,
    source: SoundSource,
    attenuation: VolumeControl,
    registry: Weak<SfxRegistry>,
}

impl SfxPlayback {
    pub(crate) fn new(
        device: &dyn AudioDevice,
        executor: PlaybackExecutor,
        sound: Sound,
        source: SoundSource,
        loop_mode: LoopMode,
        registry: Weak<SfxRegistry>,
    ) -> Result<Self> {
        let playback = Playback::new(device, executor, None, sound, loop_mode)?;
        let attenuation = playback.create_volume_control();
        Ok(Self {
            playback,
            source,
            attenuation,
            registry,
        })
    }

    pub fn source(&self) -> &SoundSource {
        &self.source
    }

    /// Current distance attenuation, already scaled by the sound volume setting.
    pub fn attenuation(&self) -> f32 {
        self.attenuation.get()
    }

    /// Adds the effect to the engine's per-tick updates and starts streaming.
    ///
    /// Registration comes first, so an engine shutting down concurrently either sees the
    /// effect and cancels it, or has already closed its registry.
    ///
    /// # Errors
    ///
    /// `InvalidState` if the playback was already started, or if the engine has been
    /// terminated. In the latter case the playback is cancelled and its line released.
    pub fn start(self: &Arc<Self>) -> Result<()> {
        let registry = self.registry.upgrade();
        let added = match &registry {
            Some(registry) => match registry.register(self) {
                Ok(added) => added,
                Err(e) => {
                    self.playback.abort();
                    return Err(e);
                }
            },
            None => false,
        };

        if let Err(e) = self.playback.start() {
            if let (Some(registry), true) = (&registry, added) {
                registry.remove(self);
            }
            return Err(e);
        }
        Ok(())
    }

    /// Recomputes attenuation and pan for the current listener location.
    pub fn update_location(&self, listener: Vec2, max_distance: f32, sound_volume: f32) {
        let params = match self.source.location() {
            Some(location) => SpatialParams::between(listener, location, max_distance),
            None => SpatialParams::CENTERED,
        };
        let sound_volume = if sound_volume.is_nan() {
            0.0
        } else {
            sound_volume.max(0.0)
        };

        if let Err(e) = self.attenuation.set(params.attenuation * sound_volume) {
            log::warn!("Failed to update attenuation of {}: {}", self.playback.id(), e);
        }
        self.playback.set_balance(params.pan);
    }

    pub fn playback(&self) -> &Playback {
        &self.playback
    }
}

impl Deref for SfxPlayback {
    type Target = Playback;

    fn deref(&self) -> &Self::Target {
        &self.playback
    }
}

impl fmt::Debug for SfxPlayback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SfxPlayback")
            .field("playback", &self.playback)
            .field("source", &self.source)
            .field("attenuation", &self.attenuation.get())
            .finish()
    }
}
