// src/render/falloff.rs
//! Fall-off decay laws for descending bars.
//!
//! When a bar's new level is lower than what is currently displayed, the
//! displayed level descends gradually instead of snapping down. The two
//! rules below cover both archived behaviors of the reference; which one
//! runs is a construction-time choice.

/// Decay rule applied to a bar's previous displayed level.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DecayLaw {
    /// Drop by a fixed number of rows per frame, saturating at zero.
    Step(u32),
    /// Drop to `floor(previous * factor)`, `0 < factor < 1`.
    Multiplicative(f32),
}

impl DecayLaw {
    /// Next displayed level derived from the previous one. Strictly lower
    /// than `prev` for any valid law whenever `prev > 0`.
    pub fn apply(&self, prev: u32) -> u32 {
        match *self {
            DecayLaw::Step(step) => prev.saturating_sub(step),
            DecayLaw::Multiplicative(factor) => (prev as f32 * factor) as u32,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        match *self {
            DecayLaw::Step(step) if step == 0 => Err("decay step must be >= 1".to_string()),
            DecayLaw::Multiplicative(factor) if !(0.0..1.0).contains(&factor) => Err(format!(
                "decay factor must be in [0, 1), got {factor}"
            )),
            _ => Ok(()),
        }
    }
}
