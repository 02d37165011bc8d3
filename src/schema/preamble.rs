//! Document metadata declared under the reserved `%preamble` rule.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Default animation length in seconds.
pub const DEFAULT_DURATION: f64 = 2.0;

/// How the animation parameter evolves once playback passes `duration`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnimationType {
    /// Runs forward, then backward, forever.
    #[default]
    Bounce,
    /// Runs forward once, then stops.
    Once,
    /// Runs forward and wraps around, forever.
    Loop,
}

impl AnimationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bounce => "bounce",
            Self::Once => "once",
            Self::Loop => "loop",
        }
    }
}

impl fmt::Display for AnimationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnimationType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bounce" => Ok(Self::Bounce),
            "once" => Ok(Self::Once),
            "loop" => Ok(Self::Loop),
            other => Err(format!(
                "unknown animation type '{}': expected bounce, once or loop",
                other
            )),
        }
    }
}

/// An `id as alias` entry of the `imports` key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Import {
    /// Opaque identifier handed to the document loader.
    pub id: String,
    /// Namespace the imported rules are merged under.
    pub alias: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preamble {
    /// Length of one animation cycle, in seconds.
    pub duration: f64,
    pub animation: AnimationType,
    pub imports: Vec<Import>,
}

impl Default for Preamble {
    fn default() -> Self {
        Self {
            duration: DEFAULT_DURATION,
            animation: AnimationType::default(),
            imports: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let p = Preamble::default();
        assert_eq!(p.duration, 2.0);
        assert_eq!(p.animation, AnimationType::Bounce);
        assert!(p.imports.is_empty());
    }

    #[test]
    fn animation_type_from_str() {
        assert_eq!("loop".parse::<AnimationType>(), Ok(AnimationType::Loop));
        assert_eq!("once".parse::<AnimationType>(), Ok(AnimationType::Once));
        assert!("sideways".parse::<AnimationType>().is_err());
    }
}
