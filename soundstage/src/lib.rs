//! # Soundstage
//!
//! A game sound engine that plays background music and positional sound effects on
//! per-sound device lines.
//!
//! Soundstage leaves mixing to the operating system: every playback owns one output line
//! and a pooled worker thread streams the sound into it. The host game loop drives the
//! engine once per tick to move the listener, re-pan and attenuate sound effects, and
//! apply the volume settings.
//!
//! ## Quick Start
//!
//! ```no_run
//! use soundstage::*;
//! use std::sync::Arc;
//!
//! // Sounds are decoded by the host and registered by name
//! let library = Arc::new(SoundLibrary::new());
//! library.register(Sound::new("step", vec![0.0; 4800], 48_000, 1)?);
//! library.register(Sound::new("theme", vec![0.0; 96_000], 48_000, 2)?);
//!
//! // The host's game loop, or the bundled minimal one
//! let ticks = Arc::new(TickLoop::new());
//!
//! let device = Arc::new(CpalDevice::new(CpalDeviceDesc::default())?);
//! let engine = SoundEngine::builder(device, library, ticks.clone())
//!     .desc(SoundEngineDesc::new().max_distance(200.0))
//!     .build();
//! engine.start()?;
//!
//! // Music replaces whatever was playing before
//! engine.play_music_named("theme");
//!
//! // Sound effects can be positioned in the world
//! engine.play_sound_named("step", SoundSource::at(Vec2::new(40.0, 0.0)), LoopMode::Once);
//!
//! // Once per frame
//! ticks.tick();
//! for event in engine.poll_events() {
//!     if let PlaybackEvent::Finished { id } = event {
//!         println!("{} finished", id);
//!     }
//! }
//!
//! engine.fade_music(120, || println!("Music faded out"));
//! # Ok::<(), SoundError>(())
//! ```
//!
//! ## Key Components
//!
//! - **[`SoundEngine`]**: Plays sounds and music, updated once per tick
//! - **[`Playback`]**: Lifecycle and volume of one sound on one line
//! - **[`SfxPlayback`]** / **[`MusicPlayback`]**: Positional effects and background music
//! - **[`VolumeControl`]**: One multiplicative factor of a playback's volume
//! - **[`AudioDevice`]**: Source of output lines, backed by cpal or headless
//! - **[`TickScheduler`]**: The host game loop the engine attaches to
//!
//! ## Threading
//!
//! 1. **Tick thread**: Runs the engine update and music fades
//! 2. **Playback workers**: One per playing sound, blocked on line writes
//! 3. **Device callbacks**: Drain each line's ring buffer into its output stream

pub mod audio_data;
pub mod config;
pub mod device;
pub mod engine;
pub mod error;
pub mod executor;
pub mod math;
pub mod playback;
mod sync;
pub mod tick;

pub use audio_data::{ResourceProvider, Sound, SoundLibrary};
pub use config::{
    DEFAULT_MAX_DISTANCE, SharedVolumeSettings, SoundEngineDesc, SoundSource, VolumeSettings,
};
pub use device::{
    AudioDevice, CpalDevice, CpalDeviceDesc, GainRange, HeadlessDevice, HeadlessDeviceDesc, Line,
};
pub use engine::{CameraFocus, MusicOptions, SoundEngine, SoundEngineBuilder};
pub use error::{Result, SoundError};
pub use executor::PlaybackExecutor;
pub use math::Vec2;
pub use playback::{
    LoopMode, MusicPlayback, Playback, PlaybackEvent, PlaybackId, PlaybackListener,
    PlaybackState, SfxPlayback, Track, VolumeControl,
};
pub use tick::{TickConsumer, TickLoop, TickScheduler};
