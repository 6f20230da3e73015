//! Numeric ranges for utterance parameters

/// Inclusive bounds for a numeric utterance parameter
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Range {
    pub min: f32,
    pub max: f32,
}

impl Range {
    pub const fn new(min: f32, max: f32) -> Self {
        Self { min, max }
    }

    /// Restrict `value` to this range
    pub fn clamp(&self, value: f32) -> f32 {
        clamp(self.min, value, self.max)
    }
}

/// Speaking rate, 1.0 is the engine's normal speed
pub const RATE: Range = Range::new(0.0, 10.0);

/// Voice pitch, 1.0 is the voice's natural pitch
pub const PITCH: Range = Range::new(0.0, 3.0);

/// Output volume, 1.0 is full volume
pub const VOLUME: Range = Range::new(0.0, 1.0);

/// Restrict `value` to `[min, max]`
///
/// The lower bound is applied first, then the upper bound. Unlike
/// [`f32::clamp`] this never panics: NaN collapses to `min` and an
/// inverted range (`min > max`) yields `max`.
pub fn clamp(min: f32, value: f32, max: f32) -> f32 {
    value.max(min).min(max)
}
