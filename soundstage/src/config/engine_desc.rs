use crate::math::Vec2;
use std::time::Duration;

/// Default distance at which positional sounds fade to silence.
pub const DEFAULT_MAX_DISTANCE: f32 = 150.0;

/// Configuration descriptor for a [`SoundEngine`](crate::SoundEngine)
#[derive(Debug, Clone)]
pub struct SoundEngineDesc {
    /// Distance from the listener at which positional sounds become inaudible
    pub max_distance: f32,
    /// Listener location used until the first tick resolves a new one
    pub listener_location: Vec2,
    /// How long an idle playback worker waits for new work before its thread exits
    pub worker_keep_alive: Duration,
    /// Thread name prefix for playback workers (suffixed with a running number)
    pub worker_name_prefix: String,
}

impl Default for SoundEngineDesc {
    fn default() -> Self {
        Self {
            max_distance: DEFAULT_MAX_DISTANCE,
            listener_location: Vec2::ZERO,
            worker_keep_alive: Duration::from_secs(60),
            worker_name_prefix: "sound-playback".to_string(),
        }
    }
}

impl SoundEngineDesc {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_distance(mut self, distance: f32) -> Self {
        self.max_distance = distance;
        self
    }

    pub fn listener_location(mut self, location: Vec2) -> Self {
        self.listener_location = location;
        self
    }

    pub fn worker_keep_alive(mut self, keep_alive: Duration) -> Self {
        self.worker_keep_alive = keep_alive;
        self
    }

    pub fn worker_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.worker_name_prefix = prefix.into();
        self
    }
}
