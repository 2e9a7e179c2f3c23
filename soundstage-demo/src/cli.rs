use crate::loader::{LoadOptions, load_sound};
use anyhow::Result;
use soundstage::{
    AudioDevice, CpalDevice, CpalDeviceDesc, HeadlessDevice, HeadlessDeviceDesc, LoopMode,
    PlaybackEvent, SharedVolumeSettings, Sound, SoundEngine, SoundEngineDesc, SoundLibrary,
    SoundSource, TickLoop, Track, Vec2,
};
use std::f32::consts::TAU;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

const TICK_RATE: u32 = 60;
const DEFAULT_SAMPLE_RATE: u32 = 48_000;
const ORBIT_RADIUS: f32 = 100.0;

#[derive(Debug, Clone)]
pub struct DemoOptions {
    pub headless: bool,
    pub seconds: u32,
    pub music: Option<PathBuf>,
    pub sfx: Option<PathBuf>,
}

impl Default for DemoOptions {
    fn default() -> Self {
        Self {
            headless: false,
            seconds: 20,
            music: None,
            sfx: None,
        }
    }
}

/// Plays a short scripted scene: music, an effect circling the listener, a music change
/// and a fade-out.
pub fn run(options: DemoOptions) -> Result<()> {
    let (device, sample_rate) = open_device(options.headless)?;

    let library = Arc::new(SoundLibrary::new());
    let theme = match &options.music {
        Some(path) => load_sound(
            path,
            LoadOptions {
                sample_rate: Some(sample_rate),
                mono: false,
            },
        )?,
        None => chord("theme", sample_rate, &[220.0, 277.2, 329.6], 4.0)?,
    };
    let theme_name = theme.name().to_string();
    library.register(theme);

    let sfx = match &options.sfx {
        Some(path) => load_sound(
            path,
            LoadOptions {
                sample_rate: Some(sample_rate),
                mono: true,
            },
        )?,
        None => pulse("pulse", sample_rate)?,
    };
    let alternate = chord("alternate", sample_rate, &[196.0, 246.9, 293.7], 3.0)?;

    let ticks = Arc::new(TickLoop::new());
    let settings = Arc::new(SharedVolumeSettings::new(0.8, 1.0));
    let engine = SoundEngine::builder(device, library, ticks.clone())
        .desc(SoundEngineDesc::new().max_distance(150.0))
        .settings(settings.clone())
        .camera(Arc::new(|| Vec2::ZERO))
        .build();
    engine.start()?;

    let total_ticks = options.seconds.max(1) * TICK_RATE;
    let orbit = Arc::new(Mutex::new(Vec2::new(ORBIT_RADIUS, 0.0)));
    let faded = Arc::new(AtomicBool::new(false));

    log::info!("Playing '{}'", theme_name);
    engine.play_music_named(&theme_name);

    let source = {
        let orbit = orbit.clone();
        SoundSource::tracking(move || orbit.lock().ok().map(|position| *position))
    };
    if engine.play_sound(&sfx, source, LoopMode::Infinite).is_none() {
        log::warn!("No line left for the orbiting effect");
    }

    let tick_interval = Duration::from_secs(1) / TICK_RATE;
    let mut next_tick = Instant::now();
    for tick in 0..total_ticks {
        let progress = tick as f32 / total_ticks as f32;
        if let Ok(mut position) = orbit.lock() {
            let angle = progress * TAU * 2.0;
            *position = Vec2::new(angle.cos(), angle.sin()) * ORBIT_RADIUS * (1.0 + progress);
        }

        match tick {
            t if t == total_ticks / 4 => {
                // Same track, so the running playback is kept
                engine.play_music_named(&theme_name);
            }
            t if t == total_ticks * 2 / 5 => {
                log::info!("Switching music to '{}'", alternate.name());
                engine.play_music(Track::looping(alternate.clone()));
            }
            t if t == total_ticks * 11 / 20 => {
                log::info!("Music volume setting -> 0.5");
                settings.set_music_volume(0.5);
            }
            t if t == total_ticks * 7 / 10 => {
                let faded = faded.clone();
                engine.fade_music(TICK_RATE * 2, move || faded.store(true, Ordering::Release));
            }
            _ => {}
        }

        ticks.tick();
        for event in engine.poll_events() {
            match event {
                PlaybackEvent::Finished { id } => log::info!("{} finished", id),
                PlaybackEvent::Cancelled { id } => log::info!("{} cancelled", id),
            }
        }

        next_tick += tick_interval;
        std::thread::sleep(next_tick.saturating_duration_since(Instant::now()));
    }

    log::info!(
        "Fade complete: {}, {} sound(s) and {} music playback(s) left",
        faded.load(Ordering::Acquire),
        engine.sounds().len(),
        engine.all_music().len()
    );
    engine.terminate();
    Ok(())
}

fn open_device(headless: bool) -> Result<(Arc<dyn AudioDevice>, u32)> {
    if !headless {
        match CpalDevice::new(CpalDeviceDesc::default()) {
            Ok(device) => {
                let rate = device.default_sample_rate().unwrap_or(DEFAULT_SAMPLE_RATE);
                return Ok((Arc::new(device), rate));
            }
            Err(e) => log::warn!("No audio output ({}), running headless", e),
        }
    }

    let device = HeadlessDevice::new(HeadlessDeviceDesc {
        realtime: true,
        ..Default::default()
    });
    Ok((Arc::new(device), DEFAULT_SAMPLE_RATE))
}

/// Stereo chord of sine tones with a slow fade in and out.
fn chord(name: &str, sample_rate: u32, frequencies: &[f32], seconds: f32) -> Result<Sound> {
    let frames = (sample_rate as f32 * seconds) as usize;
    let mut samples = Vec::with_capacity(frames * 2);
    for frame in 0..frames {
        let t = frame as f32 / sample_rate as f32;
        let envelope = (t / seconds * std::f32::consts::PI).sin();
        let value = frequencies
            .iter()
            .map(|f| (TAU * f * t).sin())
            .sum::<f32>()
            / frequencies.len() as f32;
        samples.push(value * envelope * 0.5);
        samples.push(value * envelope * 0.5);
    }
    Ok(Sound::new(name, samples, sample_rate, 2)?)
}

/// Mono blip repeated twice a second.
fn pulse(name: &str, sample_rate: u32) -> Result<Sound> {
    let frames = sample_rate as usize / 2;
    let blip = sample_rate as usize / 20;
    let samples = (0..frames)
        .map(|frame| {
            if frame >= blip {
                return 0.0;
            }
            let t = frame as f32 / sample_rate as f32;
            let decay = 1.0 - frame as f32 / blip as f32;
            (TAU * 880.0 * t).sin() * decay * 0.6
        })
        .collect();
    Ok(Sound::new(name, samples, sample_rate, 1)?)
}
