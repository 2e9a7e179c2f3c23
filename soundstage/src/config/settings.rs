use crate::sync::AtomicF32;

/// Volume settings polled by the engine once per tick.
///
/// The engine never caches these values, so a host settings store can implement this
/// directly and changes take effect on the next tick.
pub trait VolumeSettings: Send + Sync {
    /// Volume applied to every music playback (0.0 to 1.0)
    fn music_volume(&self) -> f32;

    /// Baseline volume of sound effects (0.0 to 1.0)
    fn sound_volume(&self) -> f32;
}

/// Lock-free volume settings that can be shared between the host and the engine.
#[derive(Debug)]
pub struct SharedVolumeSettings {
    music: AtomicF32,
    sound: AtomicF32,
}

impl Default for SharedVolumeSettings {
    fn default() -> Self {
        Self::new(1.0, 1.0)
    }
}

impl SharedVolumeSettings {
    pub fn new(music: f32, sound: f32) -> Self {
        Self {
            music: AtomicF32::new(sanitize(music)),
            sound: AtomicF32::new(sanitize(sound)),
        }
    }

    /// Set music volume (clamped to 0.0-1.0).
    pub fn set_music_volume(&self, volume: f32) {
        self.music.store(sanitize(volume));
    }

    /// Set sound effect volume (clamped to 0.0-1.0).
    pub fn set_sound_volume(&self, volume: f32) {
        self.sound.store(sanitize(volume));
    }
}

impl VolumeSettings for SharedVolumeSettings {
    fn music_volume(&self) -> f32 {
        self.music.load()
    }

    fn sound_volume(&self) -> f32 {
        self.sound.load()
    }
}

fn sanitize(volume: f32) -> f32 {
    if volume.is_nan() {
        0.0
    } else {
        volume.clamp(0.0, 1.0)
    }
}
