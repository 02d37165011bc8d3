//! Playback clock: maps elapsed seconds to the animation time `t`.

use crate::schema::preamble::{AnimationType, Preamble};

/// Largest `t` handed to the interpreter; `t` stays inside `[0, 1)`.
const T_MAX: f64 = 1.0 - f64::EPSILON;

impl Preamble {
    /// Animation time for a frame drawn `elapsed` seconds after playback
    /// started, or `None` once a `once` animation has finished.
    pub fn frame_time(&self, elapsed: f64) -> Option<f64> {
        let elapsed = elapsed.max(0.0);
        let cycles = elapsed / self.duration;
        match self.animation {
            AnimationType::Loop => Some(cycles.fract()),
            AnimationType::Once => (cycles < 1.0).then_some(cycles),
            AnimationType::Bounce => {
                let phase = cycles % 2.0;
                let t = if phase < 1.0 { phase } else { 2.0 - phase };
                Some(t.min(T_MAX))
            }
        }
    }
}
