use crate::playback::{MusicPlayback, VolumeControl};
use crate::sync::lock;
use crate::tick::{TickConsumer, TickScheduler};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

pub(crate) type FadeCallback = Box<dyn FnOnce() + Send + 'static>;

/// Linear fade-out of a fixed set of music playbacks over a number of ticks.
///
/// Each faded playback gets a fader control of its own. After `ticks` updates the faders
/// reach 0, the playbacks are cancelled and the completion callback runs.
pub(crate) struct FadeTransition {
    this: Weak<FadeTransition>,
    scheduler: Arc<dyn TickScheduler>,
    ticks: u32,
    state: Mutex<FadeState>,
}

struct FadeState {
    remaining: u32,
    faders: Vec<(Arc<MusicPlayback>, VolumeControl)>,
    on_complete: Option<FadeCallback>,
    done: bool,
}

impl FadeTransition {
    /// Attaches a fade of `targets` to `scheduler`. Completes right away when `ticks` is 0.
    pub(crate) fn start(
        scheduler: Arc<dyn TickScheduler>,
        targets: Vec<Arc<MusicPlayback>>,
        ticks: u32,
        on_complete: FadeCallback,
    ) -> Arc<Self> {
        let faders = targets
            .into_iter()
            .map(|music| {
                let fader = music.create_volume_control();
                (music, fader)
            })
            .collect();

        let fade = Arc::new_cyclic(|this| Self {
            this: this.clone(),
            scheduler,
            ticks,
            state: Mutex::new(FadeState {
                remaining: ticks,
                faders,
                on_complete: Some(on_complete),
                done: false,
            }),
        });

        if ticks == 0 {
            let state = lock(&fade.state);
            fade.set_level(&state, 0.0);
            fade.complete(state);
        } else {
            fade.scheduler.attach(fade.clone());
        }
        fade
    }

    #[cfg(test)]
    pub(crate) fn is_done(&self) -> bool {
        lock(&self.state).done
    }

    fn set_level(&self, state: &FadeState, level: f32) {
        for (music, fader) in &state.faders {
            if let Err(e) = fader.set(level) {
                log::warn!("Failed to fade {}: {}", music.id(), e);
            }
        }
    }

    fn complete(&self, mut state: MutexGuard<'_, FadeState>) {
        state.done = true;
        let faders = std::mem::take(&mut state.faders);
        let on_complete = state.on_complete.take();
        drop(state);

        for (music, fader) in faders {
            music.abort();
            fader.release();
        }

        if let Some(this) = self.this.upgrade() {
            let consumer: Arc<dyn TickConsumer> = this;
            self.scheduler.detach(&consumer);
        }
        log::debug!("Music fade over {} ticks complete", self.ticks);

        if let Some(on_complete) = on_complete {
            on_complete();
        }
    }
}

impl TickConsumer for FadeTransition {
    fn update(&self) {
        let mut state = lock(&self.state);
        if state.done {
            return;
        }

        state.remaining = state.remaining.saturating_sub(1);
        let level = state.remaining as f32 / self.ticks as f32;
        self.set_level(&state, level);

        if state.remaining == 0 {
            self.complete(state);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::HeadlessDevice;
    use crate::playback::tests::{TIMEOUT, executor, tone};
    use crate::playback::{PlaybackEvent, PlaybackState, Track};
    use crate::tick::TickLoop;
    use crossbeam_channel::unbounded;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn started_music(device: &HeadlessDevice) -> Arc<MusicPlayback> {
        let music = MusicPlayback::new(device, executor(), Track::looping(tone("theme", 4800)), 1.0)
            .unwrap();
        // Keep the worker parked so the fade alone decides when it stops
        music.pause_playback();
        music.start().unwrap();
        Arc::new(music)
    }

    #[test]
    fn test_fade_steps_down_to_zero_then_cancels() {
        let device = HeadlessDevice::default();
        let ticks = Arc::new(TickLoop::new());
        let music = started_music(&device);
        let (sender, events) = unbounded();
        music.add_listener(Arc::new(sender));

        let completions = Arc::new(AtomicUsize::new(0));
        let counter = completions.clone();
        let fade = FadeTransition::start(
            ticks.clone(),
            vec![music.clone()],
            4,
            Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );
        assert_eq!(ticks.consumer_count(), 1);

        let mut levels = Vec::new();
        for _ in 0..3 {
            ticks.tick();
            levels.push(music.composed_volume());
            assert_eq!(music.state(), PlaybackState::Started);
        }
        assert!((levels[0] - 0.75).abs() < 1e-6);
        assert!((levels[1] - 0.5).abs() < 1e-6);
        assert!((levels[2] - 0.25).abs() < 1e-6);

        ticks.tick();
        assert_eq!(music.composed_volume(), 0.0);
        assert_eq!(music.state(), PlaybackState::Cancelled);
        assert!(fade.is_done());
        assert_eq!(ticks.consumer_count(), 0);
        assert_eq!(completions.load(Ordering::SeqCst), 1);
        assert!(matches!(
            events.recv_timeout(TIMEOUT).unwrap(),
            PlaybackEvent::Cancelled { .. }
        ));

        ticks.tick();
        assert_eq!(completions.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_zero_tick_fade_completes_immediately() {
        let device = HeadlessDevice::default();
        let ticks = Arc::new(TickLoop::new());
        let music = started_music(&device);

        let completions = Arc::new(AtomicUsize::new(0));
        let counter = completions.clone();
        let fade = FadeTransition::start(
            ticks.clone(),
            vec![music.clone()],
            0,
            Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        assert!(fade.is_done());
        assert_eq!(ticks.consumer_count(), 0);
        assert_eq!(completions.load(Ordering::SeqCst), 1);
        assert_eq!(music.state(), PlaybackState::Cancelled);
        assert_eq!(music.composed_volume(), 0.0);
    }
}
