use crate::math::Vec2;
use std::fmt;
use std::sync::Arc;

/// Function sampled once per tick for the current location of a moving source.
///
/// Returning `None` makes the sound non-positional for that tick.
pub type LocationSupplier = dyn Fn() -> Option<Vec2> + Send + Sync;

/// Where a sound effect is heard from
#[derive(Clone, Default)]
pub enum SoundSource {
    /// Plays at the baseline sound volume with a centered pan
    #[default]
    NonPositional,
    /// Fixed point in world space
    Fixed(Vec2),
    /// Follows whatever the supplier reports, e.g. an entity's position
    Tracking(Arc<LocationSupplier>),
}

impl SoundSource {
    /// Create a non-positional source
    pub fn non_positional() -> Self {
        Self::NonPositional
    }

    /// Create a source fixed at the given location
    pub fn at(location: Vec2) -> Self {
        Self::Fixed(location)
    }

    /// Create a source that follows the supplied location
    pub fn tracking<F>(supplier: F) -> Self
    where
        F: Fn() -> Option<Vec2> + Send + Sync + 'static,
    {
        Self::Tracking(Arc::new(supplier))
    }

    /// Samples the current location. `None` means non-positional.
    pub fn location(&self) -> Option<Vec2> {
        match self {
            Self::NonPositional => None,
            Self::Fixed(location) => Some(*location),
            Self::Tracking(supplier) => supplier(),
        }
    }

    pub fn is_positional(&self) -> bool {
        !matches!(self, Self::NonPositional)
    }
}

impl From<Vec2> for SoundSource {
    fn from(location: Vec2) -> Self {
        Self::Fixed(location)
    }
}

impl fmt::Debug for SoundSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NonPositional => f.write_str("NonPositional"),
            Self::Fixed(location) => f.debug_tuple("Fixed").field(location).finish(),
            Self::Tracking(_) => f.write_str("Tracking(..)"),
        }
    }
}
