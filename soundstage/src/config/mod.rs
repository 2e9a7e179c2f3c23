mod engine_desc;
mod settings;
mod sound_source;

pub use engine_desc::{DEFAULT_MAX_DISTANCE, SoundEngineDesc};
pub use settings::{SharedVolumeSettings, VolumeSettings};
pub use sound_source::{LocationSupplier, SoundSource};
