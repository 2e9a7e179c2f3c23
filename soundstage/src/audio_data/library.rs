use crate::audio_data::Sound;
use crate::sync::lock;
use std::collections::HashMap;
use std::sync::Mutex;

/// Resolves sound names to decoded [`Sound`]s.
///
/// The engine only reads from the provider; loading, caching and eviction belong to the
/// host. Implementations must be callable from any thread.
///
/// # Example
///
/// ```ignore
/// use soundstage::audio_data::{ResourceProvider, Sound};
///
/// struct Bundled(Sound);
///
/// impl ResourceProvider for Bundled {
///     fn sound(&self, name: &str) -> Option<Sound> {
///         (name == self.0.name()).then(|| self.0.clone())
///     }
/// }
/// ```
pub trait ResourceProvider: Send + Sync {
    /// Looks up a sound by name. `None` if the name is unknown.
    fn sound(&self, name: &str) -> Option<Sound>;
}

/// Thread-safe in-memory name → [`Sound`] map.
#[derive(Debug, Default)]
pub struct SoundLibrary {
    sounds: Mutex<HashMap<String, Sound>>,
}

impl SoundLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a sound under its own name, replacing any previous entry.
    pub fn register(&self, sound: Sound) -> Option<Sound> {
        self.register_as(sound.name().to_string(), sound)
    }

    /// Registers a sound under an explicit name.
    pub fn register_as(&self, name: impl Into<String>, sound: Sound) -> Option<Sound> {
        let name = name.into();
        log::debug!("Registered sound '{}' ({:?})", name, sound.duration());
        lock(&self.sounds).insert(name, sound)
    }

    pub fn remove(&self, name: &str) -> Option<Sound> {
        lock(&self.sounds).remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        lock(&self.sounds).contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        lock(&self.sounds).keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        lock(&self.sounds).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.sounds).is_empty()
    }
}

impl ResourceProvider for SoundLibrary {
    fn sound(&self, name: &str) -> Option<Sound> {
        lock(&self.sounds).get(name).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_lookup() {
        let library = SoundLibrary::new();
        assert!(library.is_empty());

        let click = Sound::new("click", vec![0.0; 16], 48_000, 2).unwrap();
        assert!(library.register(click.clone()).is_none());
        library.register_as("ui/click", click.clone());

        assert_eq!(library.len(), 2);
        assert_eq!(library.sound("click"), Some(click.clone()));
        assert_eq!(library.sound("ui/click"), Some(click));
        assert_eq!(library.sound("missing"), None);

        assert!(library.remove("click").is_some());
        assert!(!library.contains("click"));
    }
}
