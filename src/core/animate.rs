//! Animated references: deterministic functions of the animation time.
//!
//! `{{ ~ease(from: 0, to: 360, decimals: 1) }}` interpolates between two
//! numeric endpoints along a named curve. Animated references never draw
//! from the generator.

use std::f64::consts::PI;

/// Decimal places used when a reference gives none.
pub const DEFAULT_DECIMALS: usize = 2;

/// Upper bound on `decimals`.
pub const MAX_DECIMALS: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Curve {
    Linear,
    EaseIn,
    EaseOut,
    EaseInOut,
    /// Up and back down within one cycle.
    Bounce,
}

impl Curve {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "linear" | "lerp" => Some(Self::Linear),
            "ease_in" => Some(Self::EaseIn),
            "ease_out" => Some(Self::EaseOut),
            "ease_in_out" | "ease" => Some(Self::EaseInOut),
            "bounce" => Some(Self::Bounce),
            _ => None,
        }
    }

    /// Map `t ∈ [0, 1]` to curve progress in `[0, 1]`.
    pub fn apply(&self, t: f64) -> f64 {
        let t = t.clamp(0.0, 1.0);
        match self {
            Self::Linear => t,
            Self::EaseIn => t * t,
            Self::EaseOut => t * (2.0 - t),
            Self::EaseInOut => {
                if t < 0.5 {
                    2.0 * t * t
                } else {
                    1.0 - (-2.0 * t + 2.0).powi(2) / 2.0
                }
            }
            Self::Bounce => (PI * t).sin(),
        }
    }
}

/// Interpolate `from → to` along `curve` at time `t`.
pub fn interpolate(curve: Curve, from: f64, to: f64, t: f64) -> f64 {
    from + (to - from) * curve.apply(t)
}

/// Render a number with at most `decimals` places, trailing zeros trimmed.
pub fn format_number(value: f64, decimals: usize) -> String {
    let mut s = format!("{:.*}", decimals.min(MAX_DECIMALS), value);
    if s.contains('.') {
        let trimmed = s.trim_end_matches('0').trim_end_matches('.').len();
        s.truncate(trimmed);
    }
    if s == "-0" {
        s = "0".to_string();
    }
    s
}
