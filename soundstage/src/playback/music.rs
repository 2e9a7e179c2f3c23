use super::{LoopMode, Playback, VolumeControl};
use crate::audio_data::Sound;
use crate::device::AudioDevice;
use crate::error::{Result, SoundError};
use crate::executor::PlaybackExecutor;
use std::fmt;
use std::ops::Deref;

/// A piece of background music.
///
/// Two tracks are equal when they play the same sounds with the same loop mode, which is
/// how the engine decides that a request for the current track needs no restart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Track {
    intro: Option<Sound>,
    sound: Sound,
    loop_mode: LoopMode,
}

impl Track {
    pub fn new(sound: Sound, loop_mode: LoopMode) -> Self {
        Self {
            intro: None,
            sound,
            loop_mode,
        }
    }

    /// A track that repeats `sound` until it is stopped.
    pub fn looping(sound: Sound) -> Self {
        Self::new(sound, LoopMode::Infinite)
    }

    /// Plays `intro` once before the body.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if `intro` and the body differ in format.
    pub fn with_intro(mut self, intro: Sound) -> Result<Self> {
        if intro.format() != self.sound.format() {
            return Err(SoundError::InvalidArgument(format!(
                "Intro '{}' does not match the format of '{}'",
                intro.name(),
                self.sound.name()
            )));
        }
        self.intro = Some(intro);
        Ok(self)
    }

    pub fn intro(&self) -> Option<&Sound> {
        self.intro.as_ref()
    }

    pub fn sound(&self) -> &Sound {
        &self.sound
    }

    pub fn loop_mode(&self) -> LoopMode {
        self.loop_mode
    }

    pub fn name(&self) -> &str {
        self.sound.name()
    }
}

impl From<Sound> for Track {
    fn from(sound: Sound) -> Self {
        Self::looping(sound)
    }
}

/// Playback of a [`Track`], scaled by the music volume setting.
pub struct MusicPlayback {
    playback: Playback,
    track: Track,
    music_volume: VolumeControl,
}

impl MusicPlayback {
    pub(crate) fn new(
        device: &dyn AudioDevice,
        executor: PlaybackExecutor,
        track: Track,
        music_volume: f32,
    ) -> Result<Self> {
        let playback = Playback::new(
            device,
            executor,
            track.intro.clone(),
            track.sound.clone(),
            track.loop_mode,
        )?;
        let music_volume = playback.create_volume_control_with(sanitize(music_volume));
        Ok(Self {
            playback,
            track,
            music_volume,
        })
    }

    pub fn track(&self) -> &Track {
        &self.track
    }

    pub fn music_volume(&self) -> f32 {
        self.music_volume.get()
    }

    /// Applies the music volume setting; negative and NaN values count as silence.
    pub fn set_music_volume(&self, volume: f32) {
        if let Err(e) = self.music_volume.set(sanitize(volume)) {
            log::warn!("Failed to set music volume of {}: {}", self.playback.id(), e);
        }
    }

    pub fn playback(&self) -> &Playback {
        &self.playback
    }
}

fn sanitize(volume: f32) -> f32 {
    if volume.is_nan() { 0.0 } else { volume.max(0.0) }
}

impl Deref for MusicPlayback {
    type Target = Playback;

    fn deref(&self) -> &Self::Target {
        &self.playback
    }
}

impl fmt::Debug for MusicPlayback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MusicPlayback")
            .field("playback", &self.playback)
            .field("track", &self.track.name())
            .field("music_volume", &self.music_volume.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::HeadlessDevice;
    use crate::playback::tests::{executor, tone};

    #[test]
    fn test_track_equality() {
        let theme = tone("theme", 10);
        let other = tone("theme", 10);

        assert_eq!(Track::looping(theme.clone()), Track::looping(theme.clone()));
        assert_ne!(
            Track::looping(theme.clone()),
            Track::new(theme.clone(), LoopMode::Once)
        );
        assert_ne!(Track::looping(theme.clone()), Track::looping(other));
        assert_ne!(
            Track::looping(theme.clone()),
            Track::looping(theme.clone()).with_intro(tone("intro", 5)).unwrap()
        );
    }

    #[test]
    fn test_intro_format_must_match() {
        let mono = Sound::new("mono", vec![0.0; 4], 48_000, 1).unwrap();
        assert!(matches!(
            Track::looping(tone("body", 4)).with_intro(mono),
            Err(SoundError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_music_volume() {
        let device = HeadlessDevice::default();
        let music =
            MusicPlayback::new(&device, executor(), Track::looping(tone("theme", 10)), 0.5)
                .unwrap();
        assert_eq!(music.music_volume(), 0.5);
        assert!((music.composed_volume() - 0.5).abs() < 1e-6);

        music.set_music_volume(-1.0);
        assert_eq!(music.music_volume(), 0.0);
        assert_eq!(music.master_volume(), 0.0);
    }
}
