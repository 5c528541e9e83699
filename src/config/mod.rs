// src/config/mod.rs
//! Pipeline configuration.
//!
//! One immutable [`Config`] is built in `main` and handed to every
//! component, so the capture, analysis, and render stages all agree on
//! sample rate, frame size, and display geometry.

use crate::audio::frame_queue::QueuePolicy;
use crate::render::falloff::DecayLaw;

/// Construction-time configuration for the whole pipeline.
#[derive(Debug, Clone)]
pub struct Config {
    /// Capture sample rate (Hz).
    pub sample_rate: u32,
    /// Samples per captured frame (also the FFT length).
    pub frame_size: usize,
    /// Highest frequency (Hz) retained for display.
    pub cutoff_hz: f32,
    /// Number of frequency bands (= number of bars).
    pub bands: usize,
    /// Bar chart height in terminal rows.
    pub height: u16,
    /// Starting magnitude mapped to the full bar height.
    pub initial_max: f32,
    /// Recompute the display ceiling from recent peaks.
    pub adaptive_scaling: bool,
    /// Fall-off rule for descending bars; `None` snaps instantly.
    pub fall_off: Option<DecayLaw>,
    /// Glyph drawn for one filled cell; blanks match its width.
    pub glyph: String,
    /// Capture→analysis queue growth/overflow behavior.
    pub queue_policy: QueuePolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
            frame_size: 1024,
            cutoff_hz: 10_000.0,
            bands: 32,
            height: 32,
            initial_max: 10_000.0,
            adaptive_scaling: true,
            fall_off: Some(DecayLaw::Step(2)),
            glyph: "██".to_string(),
            queue_policy: QueuePolicy::Unbounded,
        }
    }
}

impl Config {
    /// Number of FFT bins kept below the cutoff frequency.
    pub fn spectrum_prefix_len(&self) -> usize {
        let sent = (self.cutoff_hz * self.frame_size as f32 / self.sample_rate as f32) as usize;
        sent.min(self.frame_size / 2)
    }

    /// Reject configurations the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), String> {
        if self.sample_rate == 0 {
            return Err("sample rate must be > 0".to_string());
        }
        if self.frame_size == 0 {
            return Err("frame size must be > 0".to_string());
        }
        if self.bands == 0 {
            return Err("band count must be >= 1".to_string());
        }
        if self.height == 0 {
            return Err("display height must be >= 1".to_string());
        }
        if self.cutoff_hz <= 0.0 || self.cutoff_hz > self.sample_rate as f32 / 2.0 {
            return Err(format!(
                "cutoff must be in (0, {}] Hz, got {}",
                self.sample_rate as f32 / 2.0,
                self.cutoff_hz
            ));
        }
        if self.initial_max <= 0.0 {
            return Err("initial max must be > 0".to_string());
        }
        if self.glyph.is_empty() {
            return Err("bar glyph must not be empty".to_string());
        }
        if let Some(law) = &self.fall_off {
            law.validate()?;
        }
        Ok(())
    }
}
