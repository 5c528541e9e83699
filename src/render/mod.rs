// src/render/mod.rs
//! Terminal bar chart rendering - frame composition, adaptive scaling,
//! and fall-off smoothing.

pub mod bars;
pub mod falloff;

// Re-export commonly used types
pub use bars::BarRenderer;
pub use falloff::DecayLaw;
