//! Playback lifecycle and streaming.
//!
//! This module provides the types that drive a single sound on a device line:
//! - [`Playback`]: shared lifecycle, volume composition and the streaming loop
//! - [`SfxPlayback`]: a playback positioned in world space
//! - [`MusicPlayback`] and [`Track`]: background music
//! - [`VolumeControl`]: one multiplicative volume factor of a playback
//! - [`PlaybackListener`] and [`PlaybackEvent`]: completion notifications
//!
//! Most users will create playbacks through [`SoundEngine`](crate::SoundEngine) methods like
//! `play_sound()` and `play_music()` rather than constructing them directly.

mod music;
mod sfx;
mod volume;

pub use music::{MusicPlayback, Track};
pub use sfx::SfxPlayback;
pub(crate) use sfx::SfxRegistry;
pub use volume::VolumeControl;

use crate::audio_data::Sound;
use crate::device::{AudioDevice, Line};
use crate::error::{Result, SoundError};
use crate::executor::PlaybackExecutor;
use crate::sync::lock;
use crossbeam_channel::Sender;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use volume::{ControlCell, VolumeState};

static NEXT_PLAYBACK_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identifier of a playback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PlaybackId(u64);

impl PlaybackId {
    fn next() -> Self {
        Self(NEXT_PLAYBACK_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for PlaybackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "playback#{}", self.0)
    }
}

/// Loop mode for audio playback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LoopMode {
    /// Play once, then finish
    #[default]
    Once,
    /// Repeat until cancelled
    Infinite,
}

/// Lifecycle state of a playback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    /// Line acquired, not started yet
    Created,
    /// Streaming on a worker thread
    Started,
    /// Played to the end
    Finished,
    /// Stopped early, by `cancel()` or a line failure
    Cancelled,
}

/// Terminal events emitted by playbacks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackEvent {
    /// The playback reached the end of its sound
    Finished { id: PlaybackId },
    /// The playback was cancelled or lost its line
    Cancelled { id: PlaybackId },
}

impl PlaybackEvent {
    pub fn id(&self) -> PlaybackId {
        match self {
            Self::Finished { id } | Self::Cancelled { id } => *id,
        }
    }
}

/// Receives the terminal notification of a playback.
///
/// Exactly one of the two methods is called, at most once, on whatever thread completed
/// the transition: the playback's worker for `finished`, the cancelling thread for
/// `cancelled`.
pub trait PlaybackListener: Send + Sync {
    fn finished(&self, _id: PlaybackId) {}

    fn cancelled(&self, _id: PlaybackId) {}
}

impl PlaybackListener for Sender<PlaybackEvent> {
    fn finished(&self, id: PlaybackId) {
        let _ = self.send(PlaybackEvent::Finished { id });
    }

    fn cancelled(&self, id: PlaybackId) {
        let _ = self.send(PlaybackEvent::Cancelled { id });
    }
}

/// Samples written per chunk: just over half the line buffer, in whole frames.
pub(crate) fn chunk_size(buffer_size: usize, frame_size: usize) -> usize {
    let frame_size = frame_size.max(1);
    (buffer_size / frame_size / 2 + 1) * frame_size
}

/// Handle to a playing (or playable) sound on its own device line.
///
/// Cloning yields another handle to the same playback. The line is released when the
/// playback finishes or is cancelled, or when the last handle of a playback that never
/// started is dropped.
#[derive(Clone)]
pub struct Playback {
    inner: Arc<PlaybackInner>,
}

pub(crate) struct PlaybackInner {
    id: PlaybackId,
    line: Box<dyn Line>,
    intro: Option<Sound>,
    body: Sound,
    loop_mode: LoopMode,
    executor: PlaybackExecutor,
    /// Transition lock; `finish` and `cancel` decide under it
    state: Mutex<PlaybackState>,
    cancelled: AtomicBool,
    listeners: Mutex<Vec<Arc<dyn PlaybackListener>>>,
    volume: Mutex<VolumeState>,
    master: VolumeControl,
}

impl Playback {
    /// Acquires a line for `body` and prepares the playback without starting it.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if `intro` has a different format than `body`,
    /// `ResourceUnavailable` if the device has no line to spare.
    pub(crate) fn new(
        device: &dyn AudioDevice,
        executor: PlaybackExecutor,
        intro: Option<Sound>,
        body: Sound,
        loop_mode: LoopMode,
    ) -> Result<Self> {
        if let Some(intro) = &intro {
            if intro.format() != body.format() {
                return Err(SoundError::InvalidArgument(format!(
                    "Intro '{}' ({:?}) does not match the format of '{}' ({:?})",
                    intro.name(),
                    intro.format(),
                    body.name(),
                    body.format()
                )));
            }
        }

        let line = device.open_line(&body.format())?;
        let id = PlaybackId::next();
        log::debug!("Created {} for '{}'", id, body.name());

        let inner = Arc::new_cyclic(|owner| {
            let master_cell = Arc::new(ControlCell::new(1.0));
            PlaybackInner {
                id,
                line,
                intro,
                body,
                loop_mode,
                executor,
                state: Mutex::new(PlaybackState::Created),
                cancelled: AtomicBool::new(false),
                listeners: Mutex::new(Vec::new()),
                volume: Mutex::new(VolumeState::new(vec![master_cell.clone()])),
                master: VolumeControl::attached(owner.clone(), master_cell),
            }
        });
        inner.update_volume();
        Ok(Self { inner })
    }

    pub fn id(&self) -> PlaybackId {
        self.inner.id
    }

    pub fn state(&self) -> PlaybackState {
        *lock(&self.inner.state)
    }

    /// The main sound, looped according to [`loop_mode`](Self::loop_mode).
    pub fn sound(&self) -> &Sound {
        &self.inner.body
    }

    pub fn intro(&self) -> Option<&Sound> {
        self.inner.intro.as_ref()
    }

    pub fn loop_mode(&self) -> LoopMode {
        self.inner.loop_mode
    }

    /// Starts streaming on a worker thread.
    ///
    /// # Errors
    ///
    /// `InvalidState` if the playback was already started. If the executor has been shut
    /// down the playback is cancelled and that error is returned.
    pub fn start(&self) -> Result<()> {
        {
            let mut state = lock(&self.inner.state);
            if *state != PlaybackState::Created {
                return Err(SoundError::InvalidState(format!(
                    "{} cannot be started once {:?}",
                    self.inner.id, *state
                )));
            }
            *state = PlaybackState::Started;
        }

        let inner = self.inner.clone();
        if let Err(e) = self.inner.executor.submit(move || inner.run()) {
            self.inner.cancel_started();
            return Err(e);
        }
        log::debug!("Started {}", self.inner.id);
        Ok(())
    }

    /// Stops the playback and releases its line.
    ///
    /// Listeners are told exactly once, even if several threads cancel at the same time.
    /// Cancelling a playback that already finished or was cancelled does nothing.
    ///
    /// # Errors
    ///
    /// `InvalidState` if the playback was never started.
    pub fn cancel(&self) -> Result<()> {
        if *lock(&self.inner.state) == PlaybackState::Created {
            return Err(SoundError::InvalidState(format!(
                "{} cannot be cancelled before it is started",
                self.inner.id
            )));
        }
        self.inner.cancel_started();
        Ok(())
    }

    /// Cancels the playback in any non-terminal state, including one not started yet.
    ///
    /// An aborted playback can no longer be started, so a registry that aborts its
    /// members leaves no worker behind even if a `start` is in flight.
    pub(crate) fn abort(&self) {
        self.inner.cancel_from(true);
    }

    /// Whether the playback still holds its line.
    pub fn is_playing(&self) -> bool {
        self.inner.line.is_open()
    }

    pub fn is_paused(&self) -> bool {
        self.inner.line.is_open() && !self.inner.line.is_active()
    }

    /// Halts output without changing the lifecycle; buffered audio is kept.
    pub fn pause_playback(&self) {
        if self.inner.line.is_open() {
            self.inner.line.stop();
        }
    }

    pub fn resume_playback(&self) {
        if self.inner.line.is_open() {
            self.inner.line.start();
        }
    }

    pub fn set_paused(&self, paused: bool) {
        if paused {
            self.pause_playback();
        } else {
            self.resume_playback();
        }
    }

    /// Value of the master volume control.
    pub fn volume(&self) -> f32 {
        self.inner.master.get()
    }

    /// Sets the master volume control.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for negative or NaN values.
    pub fn set_volume(&self, volume: f32) -> Result<()> {
        self.inner.master.set(volume)
    }

    pub fn master_volume_control(&self) -> &VolumeControl {
        &self.inner.master
    }

    /// Effective volume as applied to the line: 0 while muted.
    pub fn master_volume(&self) -> f32 {
        if self.inner.line.is_muted() {
            0.0
        } else {
            10f32.powf(self.inner.line.gain_db() / 20.0)
        }
    }

    /// Residual volume times every live control, before conversion to decibels.
    pub fn composed_volume(&self) -> f32 {
        lock(&self.inner.volume).composed()
    }

    /// Adds an independent volume factor, starting at 1.0.
    pub fn create_volume_control(&self) -> VolumeControl {
        self.create_volume_control_with(1.0)
    }

    pub(crate) fn create_volume_control_with(&self, value: f32) -> VolumeControl {
        let cell = Arc::new(ControlCell::new(value));
        {
            let mut volume = lock(&self.inner.volume);
            volume.controls.push(cell.clone());
            self.inner.apply_volume(volume.composed());
        }
        VolumeControl::attached(Arc::downgrade(&self.inner), cell)
    }

    /// Left/right balance of the line.
    pub fn balance(&self) -> f32 {
        self.inner.line.balance()
    }

    pub(crate) fn set_balance(&self, balance: f32) {
        self.inner.line.set_balance(balance);
    }

    pub fn add_listener(&self, listener: Arc<dyn PlaybackListener>) {
        lock(&self.inner.listeners).push(listener);
    }

    /// Removes a listener previously added, matched by identity.
    pub fn remove_listener(&self, listener: &Arc<dyn PlaybackListener>) {
        lock(&self.inner.listeners).retain(|l| {
            !std::ptr::eq(Arc::as_ptr(l) as *const (), Arc::as_ptr(listener) as *const ())
        });
    }

    /// Returns `true` if both handles refer to the same playback.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Playback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Playback")
            .field("id", &self.inner.id)
            .field("sound", &self.inner.body.name())
            .field("state", &self.state())
            .finish()
    }
}

impl PlaybackInner {
    fn run(&self) {
        if let Some(intro) = &self.intro {
            if !self.stream(intro) {
                return;
            }
        }

        loop {
            if !self.stream(&self.body) {
                return;
            }
            // An empty body would spin forever
            if self.loop_mode == LoopMode::Once || self.body.is_empty() {
                break;
            }
        }
        self.finish();
    }

    /// Writes `sound` to the line. Returns `false` if streaming must stop.
    fn stream(&self, sound: &Sound) -> bool {
        let chunk = chunk_size(self.line.buffer_size(), sound.format().frame_size());
        let samples = sound.samples();
        let mut position = 0;

        while position < samples.len() {
            let end = (position + chunk).min(samples.len());
            match self.line.write(&samples[position..end]) {
                Ok(written) => position += written,
                Err(e) => {
                    if !self.cancelled.load(Ordering::Acquire) {
                        log::warn!("{} lost its line while streaming: {}", self.id, e);
                        self.cancel_started();
                    }
                    return false;
                }
            }
            if self.cancelled.load(Ordering::Acquire) {
                return false;
            }
        }
        true
    }

    fn finish(&self) {
        self.line.drain();
        {
            let mut state = lock(&self.state);
            if self.cancelled.load(Ordering::Acquire) || *state != PlaybackState::Started {
                return;
            }
            *state = PlaybackState::Finished;
            self.line.close();
        }
        log::debug!("{} finished", self.id);
        for listener in self.listener_snapshot() {
            listener.finished(self.id);
        }
    }

    /// Moves a started playback to `Cancelled`. No-op in any other state.
    fn cancel_started(&self) {
        self.cancel_from(false);
    }

    fn cancel_from(&self, include_created: bool) {
        {
            let mut state = lock(&self.state);
            let cancellable = match *state {
                PlaybackState::Started => true,
                PlaybackState::Created => include_created,
                PlaybackState::Finished | PlaybackState::Cancelled => false,
            };
            if !cancellable {
                return;
            }
            self.cancelled.store(true, Ordering::Release);
            *state = PlaybackState::Cancelled;
            self.line.stop();
            self.line.flush();
            self.line.close();
        }
        log::debug!("{} cancelled", self.id);
        for listener in self.listener_snapshot() {
            listener.cancelled(self.id);
        }
    }

    fn listener_snapshot(&self) -> Vec<Arc<dyn PlaybackListener>> {
        lock(&self.listeners).clone()
    }

    fn update_volume(&self) {
        let volume = lock(&self.volume);
        self.apply_volume(volume.composed());
    }

    /// Converts a linear volume to the line's gain, muting below its range.
    ///
    /// Callers hold the volume lock.
    fn apply_volume(&self, linear: f32) {
        let range = self.line.gain_range();
        let db = 20.0 * linear.log10();
        if db >= range.min_db {
            self.line.set_gain_db(db.min(range.max_db));
            self.line.set_muted(false);
        } else {
            self.line.set_muted(true);
        }
    }
}

impl Drop for PlaybackInner {
    fn drop(&mut self) {
        if self.line.is_open() {
            log::debug!("Releasing line of {}", self.id);
            self.line.close();
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::device::{HeadlessDevice, HeadlessDeviceDesc};
    use crossbeam_channel::{Receiver, unbounded};
    use std::time::Duration;

    pub(crate) const TIMEOUT: Duration = Duration::from_secs(5);

    pub(crate) fn executor() -> PlaybackExecutor {
        PlaybackExecutor::new("test-playback", Duration::from_secs(5))
    }

    pub(crate) fn tone(name: &str, frames: usize) -> Sound {
        let samples = (0..frames * 2).map(|i| (i as f32 * 0.01).sin()).collect();
        Sound::new(name, samples, 48_000, 2).unwrap()
    }

    fn playback(device: &HeadlessDevice, loop_mode: LoopMode) -> Playback {
        Playback::new(device, executor(), None, tone("tone", 4800), loop_mode).unwrap()
    }

    fn events(playback: &Playback) -> Receiver<PlaybackEvent> {
        let (sender, receiver) = unbounded();
        playback.add_listener(Arc::new(sender));
        receiver
    }

    #[test]
    fn test_chunk_size_is_just_over_half_the_buffer() {
        assert_eq!(chunk_size(4096, 2), 2050);
        assert_eq!(chunk_size(4096, 1), 2049);
        assert_eq!(chunk_size(1, 2), 2);
    }

    #[test]
    fn test_start_twice_fails() {
        let device = HeadlessDevice::default();
        let playback = playback(&device, LoopMode::Once);
        playback.start().unwrap();
        assert!(matches!(playback.start(), Err(SoundError::InvalidState(_))));
    }

    #[test]
    fn test_cancel_before_start_fails() {
        let device = HeadlessDevice::default();
        let playback = playback(&device, LoopMode::Once);
        assert!(matches!(playback.cancel(), Err(SoundError::InvalidState(_))));
        assert_eq!(playback.state(), PlaybackState::Created);
        assert!(playback.is_playing());
    }

    #[test]
    fn test_playback_finishes_and_releases_line() {
        let device = HeadlessDevice::default();
        let playback = playback(&device, LoopMode::Once);
        let events = events(&playback);

        playback.start().unwrap();
        assert_eq!(
            events.recv_timeout(TIMEOUT).unwrap(),
            PlaybackEvent::Finished { id: playback.id() }
        );
        assert_eq!(playback.state(), PlaybackState::Finished);
        assert!(!playback.is_playing());

        let line = &device.lines()[0];
        assert_eq!(line.samples_written(), 4800 * 2);
        assert_eq!(line.close_count(), 1);

        // Finished playbacks ignore cancellation
        playback.cancel().unwrap();
        assert!(events.recv_timeout(Duration::from_millis(50)).is_err());
    }

    #[test]
    fn test_intro_plays_before_body() {
        let device = HeadlessDevice::default();
        let playback = Playback::new(
            &device,
            executor(),
            Some(tone("intro", 100)),
            tone("body", 300),
            LoopMode::Once,
        )
        .unwrap();
        let events = events(&playback);

        playback.start().unwrap();
        events.recv_timeout(TIMEOUT).unwrap();
        assert_eq!(device.lines()[0].samples_written(), 400 * 2);
    }

    #[test]
    fn test_intro_with_different_format_is_rejected() {
        let device = HeadlessDevice::default();
        let intro = Sound::new("intro", vec![0.0; 10], 44_100, 1).unwrap();
        let result = Playback::new(&device, executor(), Some(intro), tone("body", 10), LoopMode::Once);
        assert!(matches!(result, Err(SoundError::InvalidArgument(_))));
        assert!(device.lines().is_empty());
    }

    #[test]
    fn test_cancel_is_idempotent() {
        let device = HeadlessDevice::default();
        let playback = playback(&device, LoopMode::Infinite);
        let events = events(&playback);

        playback.pause_playback();
        playback.start().unwrap();
        playback.cancel().unwrap();
        playback.cancel().unwrap();

        assert_eq!(
            events.recv_timeout(TIMEOUT).unwrap(),
            PlaybackEvent::Cancelled { id: playback.id() }
        );
        assert!(events.recv_timeout(Duration::from_millis(50)).is_err());
        assert_eq!(playback.state(), PlaybackState::Cancelled);
        assert!(!playback.is_playing());
        assert_eq!(device.lines()[0].close_count(), 1);
        assert_eq!(device.lines()[0].flush_count(), 1);
    }

    #[test]
    fn test_concurrent_cancel_notifies_once() {
        let device = HeadlessDevice::default();
        let playback = playback(&device, LoopMode::Infinite);
        let events = events(&playback);
        playback.start().unwrap();

        let cancellers: Vec<_> = (0..4)
            .map(|_| {
                let playback = playback.clone();
                std::thread::spawn(move || playback.cancel())
            })
            .collect();
        for canceller in cancellers {
            canceller.join().unwrap().unwrap();
        }

        assert!(matches!(
            events.recv_timeout(TIMEOUT).unwrap(),
            PlaybackEvent::Cancelled { .. }
        ));
        assert!(events.recv_timeout(Duration::from_millis(50)).is_err());
    }

    #[test]
    fn test_cancel_during_final_drain_wins_over_finish() {
        let device = HeadlessDevice::default();
        device.set_hold_drains(true);
        let playback = playback(&device, LoopMode::Once);
        let events = events(&playback);
        playback.start().unwrap();

        // Park the worker inside its final drain
        let line = device.lines()[0].clone();
        let deadline = std::time::Instant::now() + TIMEOUT;
        while line.drain_count() == 0 && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(line.drain_count(), 1);
        assert_eq!(playback.state(), PlaybackState::Started);

        playback.cancel().unwrap();
        device.set_hold_drains(false);

        assert_eq!(
            events.recv_timeout(TIMEOUT).unwrap(),
            PlaybackEvent::Cancelled { id: playback.id() }
        );
        assert!(events.recv_timeout(Duration::from_millis(100)).is_err());
        assert_eq!(playback.state(), PlaybackState::Cancelled);
        assert_eq!(line.close_count(), 1);
    }

    #[test]
    fn test_finish_during_released_drain_blocks_later_cancel() {
        let device = HeadlessDevice::default();
        device.set_hold_drains(true);
        let playback = playback(&device, LoopMode::Once);
        let events = events(&playback);
        playback.start().unwrap();

        let line = device.lines()[0].clone();
        let deadline = std::time::Instant::now() + TIMEOUT;
        while line.drain_count() == 0 && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(1));
        }
        device.set_hold_drains(false);

        assert_eq!(
            events.recv_timeout(TIMEOUT).unwrap(),
            PlaybackEvent::Finished { id: playback.id() }
        );
        playback.cancel().unwrap();
        assert!(events.recv_timeout(Duration::from_millis(100)).is_err());
        assert_eq!(playback.state(), PlaybackState::Finished);
        assert_eq!(line.close_count(), 1);
    }

    #[test]
    fn test_aborted_playback_cannot_start() {
        let device = HeadlessDevice::default();
        let playback = playback(&device, LoopMode::Infinite);
        let events = events(&playback);

        playback.abort();
        assert_eq!(playback.state(), PlaybackState::Cancelled);
        assert!(!playback.is_playing());
        assert_eq!(
            events.recv_timeout(TIMEOUT).unwrap(),
            PlaybackEvent::Cancelled { id: playback.id() }
        );

        assert!(matches!(playback.start(), Err(SoundError::InvalidState(_))));
        playback.abort();
        assert!(events.recv_timeout(Duration::from_millis(50)).is_err());
        assert_eq!(device.lines()[0].close_count(), 1);
    }

    #[test]
    fn test_write_failure_degrades_to_cancel() {
        let device = HeadlessDevice::default();
        let playback = playback(&device, LoopMode::Infinite);
        let events = events(&playback);

        device.set_fail_writes(true);
        playback.start().unwrap();
        assert!(matches!(
            events.recv_timeout(TIMEOUT).unwrap(),
            PlaybackEvent::Cancelled { .. }
        ));
        assert_eq!(playback.state(), PlaybackState::Cancelled);
        assert!(!playback.is_playing());
    }

    #[test]
    fn test_dropping_unstarted_playback_releases_line() {
        let device = HeadlessDevice::default();
        let playback = playback(&device, LoopMode::Once);
        let other = playback.clone();
        drop(playback);
        assert_eq!(device.open_line_count(), 1);
        drop(other);
        assert_eq!(device.open_line_count(), 0);
    }

    #[test]
    fn test_pause_and_resume() {
        let device = HeadlessDevice::default();
        let playback = playback(&device, LoopMode::Once);
        assert!(!playback.is_paused());

        playback.set_paused(true);
        assert!(playback.is_paused());
        playback.pause_playback();
        assert!(playback.is_paused());

        playback.set_paused(false);
        assert!(!playback.is_paused());
        assert_eq!(playback.state(), PlaybackState::Created);
    }

    #[test]
    fn test_paused_playback_does_not_finish() {
        let device = HeadlessDevice::default();
        let playback = playback(&device, LoopMode::Once);
        let events = events(&playback);

        playback.pause_playback();
        playback.start().unwrap();
        assert!(events.recv_timeout(Duration::from_millis(50)).is_err());
        assert_eq!(playback.state(), PlaybackState::Started);

        playback.resume_playback();
        assert!(matches!(
            events.recv_timeout(TIMEOUT).unwrap(),
            PlaybackEvent::Finished { .. }
        ));
    }

    #[test]
    fn test_volume_composition() {
        let device = HeadlessDevice::default();
        let playback = playback(&device, LoopMode::Once);
        let a = playback.create_volume_control();
        let b = playback.create_volume_control();

        playback.set_volume(0.8).unwrap();
        a.set(0.5).unwrap();
        b.set(0.25).unwrap();
        assert!((playback.composed_volume() - 0.1).abs() < 1e-6);
        assert!((playback.master_volume() - 0.1).abs() < 1e-3);
    }

    #[test]
    fn test_gain_above_range_is_clamped() {
        let device = HeadlessDevice::new(HeadlessDeviceDesc {
            gain_range: crate::device::GainRange::new(-40.0, 0.0),
            ..Default::default()
        });
        let playback = playback(&device, LoopMode::Once);
        playback.set_volume(4.0).unwrap();
        assert!((playback.master_volume() - 1.0).abs() < 1e-6);
        assert!((playback.composed_volume() - 4.0).abs() < 1e-6);
    }

    #[test]
    fn test_zero_volume_mutes() {
        let device = HeadlessDevice::default();
        let playback = playback(&device, LoopMode::Once);
        playback.set_volume(0.0).unwrap();
        assert_eq!(playback.master_volume(), 0.0);

        playback.set_volume(1.0).unwrap();
        assert!((playback.master_volume() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_quieter_than_range_mutes() {
        let device = HeadlessDevice::default();
        let playback = playback(&device, LoopMode::Once);
        // -100 dB is below the default -80 dB floor
        playback.set_volume(1e-5).unwrap();
        assert_eq!(playback.master_volume(), 0.0);
    }

    #[test]
    fn test_removed_listener_is_not_notified() {
        let device = HeadlessDevice::default();
        let playback = playback(&device, LoopMode::Once);
        let (sender, receiver) = unbounded();
        let listener: Arc<dyn PlaybackListener> = Arc::new(sender);
        playback.add_listener(listener.clone());
        playback.remove_listener(&listener);

        let events = events(&playback);
        playback.start().unwrap();
        events.recv_timeout(TIMEOUT).unwrap();
        assert!(receiver.try_recv().is_err());
    }
}
