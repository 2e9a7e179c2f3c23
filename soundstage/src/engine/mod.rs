//! The sound engine: entry point for playing sound effects and music.

mod fade;

use crate::audio_data::{ResourceProvider, Sound};
use crate::config::{SharedVolumeSettings, SoundEngineDesc, SoundSource, VolumeSettings};
use crate::device::AudioDevice;
use crate::error::{Result, SoundError};
use crate::executor::PlaybackExecutor;
use crate::math::Vec2;
use crate::playback::{
    LoopMode, MusicPlayback, PlaybackEvent, PlaybackListener, SfxPlayback, SfxRegistry, Track,
};
use crate::sync::{AtomicF32, lock};
use crate::tick::{TickConsumer, TickScheduler};
use crossbeam_channel::{Receiver, unbounded};
use fade::FadeTransition;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};

/// Supplies the default listener location, typically the camera's focus point.
pub trait CameraFocus: Send + Sync {
    fn focus(&self) -> Vec2;
}

impl<F> CameraFocus for F
where
    F: Fn() -> Vec2 + Send + Sync,
{
    fn focus(&self) -> Vec2 {
        self()
    }
}

/// Computes this tick's listener location from the previous one.
pub type ListenerLocationCallback = dyn Fn(Vec2) -> Vec2 + Send + Sync;

/// How [`SoundEngine::play_music_with`] treats the music already playing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MusicOptions {
    /// Start over even if the requested track is already the main music
    pub restart: bool,
    /// Cancel all other music before the new track starts
    pub stop: bool,
}

impl Default for MusicOptions {
    fn default() -> Self {
        Self {
            restart: false,
            stop: true,
        }
    }
}

impl MusicOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn restart(mut self, restart: bool) -> Self {
        self.restart = restart;
        self
    }

    pub fn stop(mut self, stop: bool) -> Self {
        self.stop = stop;
        self
    }
}

/// Builder for a [`SoundEngine`] and the host services it depends on
pub struct SoundEngineBuilder {
    desc: SoundEngineDesc,
    device: Arc<dyn AudioDevice>,
    resources: Arc<dyn ResourceProvider>,
    scheduler: Arc<dyn TickScheduler>,
    settings: Option<Arc<dyn VolumeSettings>>,
    camera: Option<Arc<dyn CameraFocus>>,
}

impl SoundEngineBuilder {
    pub fn desc(mut self, desc: SoundEngineDesc) -> Self {
        self.desc = desc;
        self
    }

    /// Volume settings polled every tick. Defaults to full volume.
    pub fn settings(mut self, settings: Arc<dyn VolumeSettings>) -> Self {
        self.settings = Some(settings);
        self
    }

    /// Default listener location. Defaults to the descriptor's fixed listener location.
    pub fn camera(mut self, camera: Arc<dyn CameraFocus>) -> Self {
        self.camera = Some(camera);
        self
    }

    pub fn build(self) -> Arc<SoundEngine> {
        let initial = self.desc.listener_location;
        let camera = self
            .camera
            .unwrap_or_else(|| Arc::new(move || initial) as Arc<dyn CameraFocus>);
        let settings = self.settings.unwrap_or_else(|| {
            Arc::new(SharedVolumeSettings::default()) as Arc<dyn VolumeSettings>
        });
        let executor = PlaybackExecutor::new(
            self.desc.worker_name_prefix.clone(),
            self.desc.worker_keep_alive,
        );
        let default_callback = {
            let camera = camera.clone();
            Arc::new(move |_previous: Vec2| camera.focus()) as Arc<ListenerLocationCallback>
        };
        let (event_sender, events) = unbounded::<PlaybackEvent>();

        Arc::new_cyclic(|this| SoundEngine {
            this: this.clone(),
            max_distance: AtomicF32::new(self.desc.max_distance),
            listener: Mutex::new(initial),
            desc: self.desc,
            device: self.device,
            resources: self.resources,
            scheduler: self.scheduler,
            settings,
            camera,
            executor,
            listener_callback: Mutex::new(default_callback),
            sounds: Arc::new(SfxRegistry::default()),
            music: Mutex::new(MusicSet::default()),
            event_listener: Arc::new(event_sender),
            events,
            started: AtomicBool::new(false),
            terminated: AtomicBool::new(false),
        })
    }
}

/// Active music and the main track. Playbacks are cancelled only after this lock is
/// released, since cancellation notifies listeners that may call back into the engine.
#[derive(Default)]
struct MusicSet {
    /// Always a member of `active` while set
    main: Option<Arc<MusicPlayback>>,
    active: Vec<Arc<MusicPlayback>>,
    closed: bool,
}

impl MusicSet {
    fn remove(&mut self, music: &Arc<MusicPlayback>) {
        self.active.retain(|m| !Arc::ptr_eq(m, music));
        if self.main.as_ref().is_some_and(|m| Arc::ptr_eq(m, music)) {
            self.main = None;
        }
    }
}

/// Coordinates every sound effect and music playback of a game.
///
/// `SoundEngine` plays each sound on its own device line, streamed by a pooled worker
/// thread. Once [`start`](Self::start)ed it is attached to the host's tick scheduler and
/// on every tick it:
///
/// 1. resolves the listener location,
/// 2. recomputes attenuation and pan of every playing sound effect,
/// 3. applies the music volume setting to every playing music playback,
///
/// dropping playbacks that have ended along the way.
///
/// # Example
///
/// ```ignore
/// use soundstage::{
///     HeadlessDevice, LoopMode, SoundEngine, SoundLibrary, SoundSource, TickLoop, Vec2,
/// };
/// use std::sync::Arc;
///
/// let library = Arc::new(SoundLibrary::new());
/// let ticks = Arc::new(TickLoop::new());
/// let engine = SoundEngine::builder(Arc::new(HeadlessDevice::default()), library, ticks.clone())
///     .build();
/// engine.start()?;
///
/// engine.play_sound_named("explosion", SoundSource::at(Vec2::new(40.0, 0.0)), LoopMode::Once);
/// ticks.tick();
/// ```
pub struct SoundEngine {
    this: Weak<SoundEngine>,
    desc: SoundEngineDesc,
    device: Arc<dyn AudioDevice>,
    resources: Arc<dyn ResourceProvider>,
    scheduler: Arc<dyn TickScheduler>,
    settings: Arc<dyn VolumeSettings>,
    camera: Arc<dyn CameraFocus>,
    executor: PlaybackExecutor,
    max_distance: AtomicF32,
    listener: Mutex<Vec2>,
    listener_callback: Mutex<Arc<ListenerLocationCallback>>,
    sounds: Arc<SfxRegistry>,
    music: Mutex<MusicSet>,
    event_listener: Arc<dyn PlaybackListener>,
    events: Receiver<PlaybackEvent>,
    started: AtomicBool,
    terminated: AtomicBool,
}

impl SoundEngine {
    /// Starts building an engine on top of the host's device, resources and tick loop.
    pub fn builder(
        device: Arc<dyn AudioDevice>,
        resources: Arc<dyn ResourceProvider>,
        scheduler: Arc<dyn TickScheduler>,
    ) -> SoundEngineBuilder {
        SoundEngineBuilder {
            desc: SoundEngineDesc::default(),
            device,
            resources,
            scheduler,
            settings: None,
            camera: None,
        }
    }

    pub fn desc(&self) -> &SoundEngineDesc {
        &self.desc
    }

    /// Attaches the engine to the tick scheduler and places the listener at the camera
    /// focus. Starting twice is a no-op.
    ///
    /// # Errors
    ///
    /// `InvalidState` if the engine has been terminated.
    pub fn start(self: &Arc<Self>) -> Result<()> {
        if self.terminated.load(Ordering::Acquire) {
            return Err(SoundError::InvalidState(
                "Sound engine has been terminated".to_string(),
            ));
        }
        if self.started.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        *lock(&self.listener) = self.camera.focus();
        self.scheduler.attach(self.clone());
        log::info!("Sound engine started");
        Ok(())
    }

    /// Stops every playback and shuts down the worker pool. Idempotent.
    ///
    /// The engine cannot be started again afterwards.
    pub fn terminate(&self) {
        if self.terminated.swap(true, Ordering::AcqRel) {
            return;
        }

        if let Some(this) = self.this.upgrade() {
            let consumer: Arc<dyn TickConsumer> = this;
            self.scheduler.detach(&consumer);
        }

        let music = {
            let mut set = lock(&self.music);
            set.closed = true;
            set.main = None;
            std::mem::take(&mut set.active)
        };
        for playback in music {
            playback.abort();
        }

        // Effects still starting are either aborted here or refused by the closed registry
        for sfx in self.sounds.close() {
            sfx.abort();
        }

        self.executor.shutdown();
        log::info!("Sound engine terminated");
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::Acquire)
    }

    /// Plays a sound effect.
    ///
    /// # Arguments
    ///
    /// * `sound` - The sound to play
    /// * `source` - Where the sound is heard from
    /// * `loop_mode` - Whether the sound repeats until cancelled
    ///
    /// # Returns
    ///
    /// The started playback, or `None` if no line was available (the failure is logged)
    pub fn play_sound(
        &self,
        sound: &Sound,
        source: impl Into<SoundSource>,
        loop_mode: LoopMode,
    ) -> Option<Arc<SfxPlayback>> {
        let sfx = self.create_sound(sound, source, loop_mode)?;
        if let Err(e) = sfx.start() {
            log::warn!("Failed to start sound '{}': {}", sound.name(), e);
            return None;
        }
        Some(sfx)
    }

    /// Plays the sound effect registered under `name`.
    pub fn play_sound_named(
        &self,
        name: &str,
        source: impl Into<SoundSource>,
        loop_mode: LoopMode,
    ) -> Option<Arc<SfxPlayback>> {
        let sound = self.resolve(name)?;
        self.play_sound(&sound, source, loop_mode)
    }

    /// Prepares a sound effect without starting it.
    ///
    /// The device line is acquired immediately and the spatial parameters are computed
    /// for the current listener location. The effect joins the per-tick updates once
    /// [`SfxPlayback::start`] is called.
    pub fn create_sound(
        &self,
        sound: &Sound,
        source: impl Into<SoundSource>,
        loop_mode: LoopMode,
    ) -> Option<Arc<SfxPlayback>> {
        if self.refuse_when_terminated(sound.name()) {
            return None;
        }
        let sfx = match SfxPlayback::new(
            self.device.as_ref(),
            self.executor.clone(),
            sound.clone(),
            source.into(),
            loop_mode,
            Arc::downgrade(&self.sounds),
        ) {
            Ok(sfx) => Arc::new(sfx),
            Err(e) => {
                log::warn!("Could not play sound '{}': {}", sound.name(), e);
                return None;
            }
        };

        sfx.add_listener(self.event_listener.clone());
        sfx.update_location(
            self.listener_location(),
            self.max_distance(),
            self.settings.sound_volume(),
        );
        Some(sfx)
    }

    /// Plays `track` as the main music, replacing whatever music is playing.
    ///
    /// Requesting the track that is already the main music returns the current playback
    /// without interrupting it.
    pub fn play_music(&self, track: Track) -> Option<Arc<MusicPlayback>> {
        self.play_music_with(track, MusicOptions::default(), |_| {})
    }

    /// Plays the sound registered under `name` as looping main music.
    pub fn play_music_named(&self, name: &str) -> Option<Arc<MusicPlayback>> {
        let sound = self.resolve(name)?;
        self.play_music(Track::looping(sound))
    }

    /// Plays `track` as the main music.
    ///
    /// Music that gets replaced is cancelled after the engine's own bookkeeping is done,
    /// so its listeners and the `configure` hook may call back into the engine.
    ///
    /// # Arguments
    ///
    /// * `track` - The music to play
    /// * `options` - Whether to restart an identical track and whether to stop other music
    /// * `configure` - Called with the new playback before it starts, e.g. to set its volume
    ///
    /// # Returns
    ///
    /// The main music playback, or `None` if the track could not be played (the failure is
    /// logged)
    pub fn play_music_with<F>(
        &self,
        track: Track,
        options: MusicOptions,
        configure: F,
    ) -> Option<Arc<MusicPlayback>>
    where
        F: FnOnce(&MusicPlayback),
    {
        if self.refuse_when_terminated(track.name()) {
            return None;
        }

        if !options.restart {
            if let Some(current) = lock(&self.music).main.as_ref() {
                if current.is_playing() && *current.track() == track {
                    return Some(current.clone());
                }
            }
        }

        let name = track.name().to_string();
        let music = match MusicPlayback::new(
            self.device.as_ref(),
            self.executor.clone(),
            track,
            self.settings.music_volume(),
        ) {
            Ok(music) => Arc::new(music),
            Err(e) => {
                log::warn!("Could not play music '{}': {}", name, e);
                return None;
            }
        };
        music.add_listener(self.event_listener.clone());
        configure(&music);

        let replaced = {
            let mut set = lock(&self.music);
            if set.closed {
                drop(set);
                log::warn!("Ignoring '{}': sound engine has been terminated", name);
                music.abort();
                return None;
            }
            let replaced = if options.stop {
                std::mem::take(&mut set.active)
            } else {
                Vec::new()
            };
            set.active.push(music.clone());
            set.main = Some(music.clone());
            replaced
        };

        for playback in replaced {
            playback.abort();
        }

        // A concurrent terminate or a newer request may have aborted it already
        if let Err(e) = music.start() {
            log::warn!("Failed to start music '{}': {}", name, e);
            lock(&self.music).remove(&music);
            return None;
        }
        log::info!("Playing music '{}'", name);
        Some(music)
    }

    /// Fades out all music over `ticks` ticks, then stops it and calls `on_complete`.
    ///
    /// The main music is cleared right away, so a track requested during the fade starts
    /// fresh instead of reusing a fading playback.
    pub fn fade_music<F>(&self, ticks: u32, on_complete: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let targets = {
            let mut set = lock(&self.music);
            set.main = None;
            set.active.clone()
        };
        log::info!("Fading out {} music playback(s) over {} ticks", targets.len(), ticks);
        FadeTransition::start(
            self.scheduler.clone(),
            targets,
            ticks,
            Box::new(on_complete),
        );
    }

    /// Stops all music immediately.
    pub fn stop_music(&self) {
        let music = {
            let mut set = lock(&self.music);
            set.main = None;
            set.active.clone()
        };
        for playback in music {
            playback.abort();
        }
    }

    fn refuse_when_terminated(&self, name: &str) -> bool {
        let terminated = self.is_terminated();
        if terminated {
            log::warn!("Ignoring '{}': sound engine has been terminated", name);
        }
        terminated
    }

    fn resolve(&self, name: &str) -> Option<Sound> {
        let sound = self.resources.sound(name);
        if sound.is_none() {
            log::warn!("Unknown sound '{}'", name);
        }
        sound
    }

    /// The main music, if any.
    pub fn music(&self) -> Option<Arc<MusicPlayback>> {
        lock(&self.music).main.clone()
    }

    /// Every music playback not yet pruned, including ones fading out.
    pub fn all_music(&self) -> Vec<Arc<MusicPlayback>> {
        lock(&self.music).active.clone()
    }

    /// Every started sound effect not yet pruned.
    pub fn sounds(&self) -> Vec<Arc<SfxPlayback>> {
        self.sounds.snapshot()
    }

    pub fn max_distance(&self) -> f32 {
        self.max_distance.load()
    }

    /// Sets the distance at which positional sounds become inaudible.
    pub fn set_max_distance(&self, distance: f32) {
        self.max_distance.store(distance);
    }

    /// Listener location as of the last tick.
    pub fn listener_location(&self) -> Vec2 {
        *lock(&self.listener)
    }

    /// Replaces how the listener location is resolved each tick.
    ///
    /// The callback receives the previous location. The default ignores it and returns
    /// the camera focus.
    pub fn set_listener_location_callback<F>(&self, callback: F)
    where
        F: Fn(Vec2) -> Vec2 + Send + Sync + 'static,
    {
        *lock(&self.listener_callback) = Arc::new(callback);
    }

    /// Drains finish and cancel events of every playback this engine created.
    pub fn poll_events(&self) -> Vec<PlaybackEvent> {
        self.events.try_iter().collect()
    }

    /// Number of live playback worker threads.
    pub fn worker_count(&self) -> usize {
        self.executor.worker_count()
    }

    fn update_sounds(&self, listener: Vec2) {
        let max_distance = self.max_distance();
        let sound_volume = self.settings.sound_volume();

        for sfx in self.sounds.snapshot() {
            if sfx.is_playing() {
                sfx.update_location(listener, max_distance, sound_volume);
            } else {
                self.sounds.remove(&sfx);
            }
        }
    }

    fn update_music(&self) {
        let music_volume = self.settings.music_volume();

        let music = lock(&self.music).active.clone();
        for playback in music {
            if playback.is_playing() {
                playback.set_music_volume(music_volume);
            } else {
                lock(&self.music).remove(&playback);
            }
        }
    }
}

impl TickConsumer for SoundEngine {
    fn update(&self) {
        let callback = lock(&self.listener_callback).clone();
        let previous = self.listener_location();
        let listener = callback(previous);
        *lock(&self.listener) = listener;

        self.update_sounds(listener);
        self.update_music();
    }
}

impl Drop for SoundEngine {
    fn drop(&mut self) {
        self.terminate();
    }
}
