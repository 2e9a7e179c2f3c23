//! Math types and the distance model used for positional sound effects.

pub use glam::Vec2;

/// Per-tick spatial parameters of a positional sound relative to the listener.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpatialParams {
    /// Linear distance attenuation in `[0, 1]`
    pub attenuation: f32,
    /// Left/right balance in `[-1, 1]`; negative is left
    pub pan: f32,
}

impl SpatialParams {
    /// Full volume, centered. Used for sounds without a location.
    pub const CENTERED: Self = Self {
        attenuation: 1.0,
        pan: 0.0,
    };

    /// Computes attenuation and pan of a source at `source` heard from `listener`.
    pub fn between(listener: Vec2, source: Vec2, max_distance: f32) -> Self {
        let offset = source - listener;
        let distance = offset.length();
        Self {
            attenuation: attenuation(distance, max_distance),
            pan: pan(offset, distance),
        }
    }
}

impl Default for SpatialParams {
    fn default() -> Self {
        Self::CENTERED
    }
}

/// Linear falloff: 1 at the listener, 0 at or beyond `max_distance`.
pub fn attenuation(distance: f32, max_distance: f32) -> f32 {
    if max_distance <= 0.0 {
        return if distance <= 0.0 { 1.0 } else { 0.0 };
    }
    (1.0 - distance / max_distance).clamp(0.0, 1.0)
}

/// Balance from the lateral component of the direction towards the source.
fn pan(offset: Vec2, distance: f32) -> f32 {
    if distance <= f32::EPSILON {
        return 0.0;
    }
    (offset.x / distance).clamp(-1.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAX_DISTANCE: f32 = 150.0;

    #[test]
    fn test_attenuation_falloff() {
        assert_eq!(attenuation(0.0, MAX_DISTANCE), 1.0);
        assert!((attenuation(75.0, MAX_DISTANCE) - 0.5).abs() < 1e-6);
        assert_eq!(attenuation(150.0, MAX_DISTANCE), 0.0);
        assert_eq!(attenuation(400.0, MAX_DISTANCE), 0.0);
    }

    #[test]
    fn test_spatial_params_from_positions() {
        let listener = Vec2::new(10.0, 10.0);

        let on_listener = SpatialParams::between(listener, listener, MAX_DISTANCE);
        assert_eq!(on_listener, SpatialParams::CENTERED);

        let left = SpatialParams::between(listener, Vec2::new(-65.0, 10.0), MAX_DISTANCE);
        assert!((left.attenuation - 0.5).abs() < 1e-6);
        assert!((left.pan + 1.0).abs() < 1e-6);

        let right_below = SpatialParams::between(listener, Vec2::new(13.0, 14.0), MAX_DISTANCE);
        assert!((right_below.pan - 0.6).abs() < 1e-6);

        let straight_up = SpatialParams::between(listener, Vec2::new(10.0, -200.0), MAX_DISTANCE);
        assert_eq!(straight_up.attenuation, 0.0);
        assert_eq!(straight_up.pan, 0.0);
    }

    #[test]
    fn test_zero_max_distance_only_hears_listener_position() {
        assert_eq!(attenuation(0.0, 0.0), 1.0);
        assert_eq!(attenuation(0.5, 0.0), 0.0);
    }
}
