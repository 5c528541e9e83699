// src/render/bars.rs
//! Bar chart frame composition and in-place terminal drawing.

use std::collections::VecDeque;
use std::io::Write;

use crossterm::{cursor::MoveUp, queue, style::Print};

use super::falloff::DecayLaw;
use crate::config::Config;
use crate::error::PipelineError;

/// Sliding window length for adaptive scaling (recent per-frame peaks).
const PEAK_WINDOW: usize = 20;
/// Headroom multiplied onto the window peak so bars rarely clip.
const HEADROOM: f32 = 1.2;
/// Floor for the display ceiling; keeps quantization finite on silence.
const MIN_SCALE: f32 = 1e-3;

/// Draws band magnitudes as a bar chart that repaints in place.
///
/// Each frame is `height` rows of `bands` cells (one space plus the glyph
/// or an equally wide blank), top row first, followed by a cursor-up so
/// the next frame overwrites this one. Dropping the renderer paints one
/// all-blank frame, erasing the chart and parking the cursor at its top
/// row.
pub struct BarRenderer<W: Write> {
    out: W,
    bands: usize,
    height: u16,
    glyph: String,
    blank: String,
    adaptive: bool,
    fall_off: Option<DecayLaw>,
    /// Last displayed height per bar.
    prev_levels: Vec<u32>,
    /// Recent per-frame peaks, oldest first. Seeded with `initial_max`.
    peak_window: VecDeque<f32>,
    /// Magnitude currently mapped to the full bar height.
    current_max: f32,
}

impl<W: Write> BarRenderer<W> {
    pub fn new(config: &Config, out: W) -> Self {
        let blank = " ".repeat(config.glyph.chars().count());
        Self {
            out,
            bands: config.bands,
            height: config.height,
            glyph: config.glyph.clone(),
            blank,
            adaptive: config.adaptive_scaling,
            fall_off: config.fall_off,
            prev_levels: vec![0; config.bands],
            peak_window: vec![config.initial_max; PEAK_WINDOW].into(),
            current_max: config.initial_max,
        }
    }

    /// Scale, smooth, and draw one frame of band magnitudes.
    pub fn render(&mut self, levels: &[f32]) -> Result<(), PipelineError> {
        debug_assert_eq!(levels.len(), self.bands);

        self.update_scale(levels);
        let quantized: Vec<u32> = levels.iter().map(|&v| self.quantize(v)).collect();
        let displayed = self.apply_fall_off(quantized);

        let frame = self.compose(&displayed);
        queue!(self.out, Print(frame), MoveUp(self.height))?;
        self.out.flush()?;
        Ok(())
    }

    /// Refresh the display ceiling from the recent-peak window.
    fn update_scale(&mut self, levels: &[f32]) {
        if !self.adaptive {
            return;
        }
        let peak = levels.iter().copied().fold(0.0f32, f32::max);
        self.peak_window.push_back(peak);
        while self.peak_window.len() > PEAK_WINDOW {
            self.peak_window.pop_front();
        }
        let window_max = self.peak_window.iter().copied().fold(0.0f32, f32::max);
        self.current_max = (window_max * HEADROOM).max(MIN_SCALE);
    }

    fn quantize(&self, value: f32) -> u32 {
        let unit = self.current_max / self.height as f32;
        (value / unit) as u32
    }

    /// Let descending bars fall gradually and record what was displayed.
    fn apply_fall_off(&mut self, mut levels: Vec<u32>) -> Vec<u32> {
        if let Some(law) = self.fall_off {
            for (level, prev) in levels.iter_mut().zip(&self.prev_levels) {
                if *level < *prev {
                    *level = law.apply(*prev);
                }
            }
        }
        self.prev_levels.copy_from_slice(&levels);
        levels
    }

    /// Build one text frame, top row first. A cell is filled when its
    /// bar reaches that row, counting rows upward from 1, so an all-zero
    /// frame is entirely blank.
    fn compose(&self, levels: &[u32]) -> String {
        let mut frame = String::new();
        for row in (1..=u32::from(self.height)).rev() {
            for &level in levels {
                frame.push(' ');
                frame.push_str(if level >= row { &self.glyph } else { &self.blank });
            }
            frame.push_str("\r\n");
        }
        frame
    }
}

impl<W: Write> Drop for BarRenderer<W> {
    fn drop(&mut self) {
        // Erase the chart; errors are moot during teardown.
        let blank_frame = self.compose(&vec![0; self.bands]);
        let _ = queue!(self.out, Print(blank_frame), MoveUp(self.height));
        let _ = self.out.flush();
    }
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::sync::{Arc, Mutex};

    use approx::assert_relative_eq;

    use super::*;

    /// Test writer whose contents survive the renderer being dropped.
    #[derive(Clone, Default)]
    struct SharedWriter(Arc<Mutex<Vec<u8>>>);

    impl SharedWriter {
        fn contents(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    impl Write for SharedWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn test_config() -> Config {
        Config {
            bands: 3,
            height: 4,
            initial_max: 4.0,
            adaptive_scaling: false,
            fall_off: None,
            glyph: "██".to_string(),
            ..Config::default()
        }
    }

    #[test]
    fn silence_renders_every_cell_blank() {
        let out = SharedWriter::default();
        let mut renderer = BarRenderer::new(&test_config(), out.clone());
        renderer.render(&[0.0, 0.0, 0.0]).unwrap();

        let drawn = out.contents();
        assert!(!drawn.contains('█'));
        assert!(drawn.contains("\u{1b}[4A"), "missing cursor-up reposition");
    }

    #[test]
    fn full_scale_input_fills_the_column() {
        let out = SharedWriter::default();
        let mut renderer = BarRenderer::new(&test_config(), out.clone());
        // initial_max 4.0 over height 4 → one row per unit of magnitude.
        renderer.render(&[4.0, 0.0, 2.0]).unwrap();

        let contents = out.contents();
        let rows: Vec<&str> = contents.lines().take(4).collect();
        // Top row: only the full-height first bar.
        assert_eq!(rows[0].trim_end_matches('\r'), " ██      ");
        // Bottom row: first and third bars.
        assert_eq!(rows[3].trim_end_matches('\r'), " ██    ██");
    }

    #[test]
    fn rerender_of_same_input_is_identical() {
        let out = SharedWriter::default();
        let mut renderer = BarRenderer::new(&test_config(), out.clone());
        renderer.render(&[3.0, 1.0, 2.0]).unwrap();
        let first = out.contents();
        renderer.render(&[3.0, 1.0, 2.0]).unwrap();
        let both = out.contents();

        assert_eq!(both.len(), first.len() * 2);
        assert_eq!(&both[..first.len()], &both[first.len()..]);
    }

    #[test]
    fn fall_off_descends_instead_of_snapping() {
        let config = Config {
            fall_off: Some(DecayLaw::Step(2)),
            ..test_config()
        };
        let out = SharedWriter::default();
        let mut renderer = BarRenderer::new(&config, out);

        renderer.render(&[4.0, 4.0, 4.0]).unwrap();
        assert_eq!(renderer.prev_levels, vec![4, 4, 4]);

        renderer.render(&[0.0, 4.0, 3.0]).unwrap();
        // Any dropping bar decays from its previous displayed level, even
        // when the decayed value undershoots the incoming one.
        assert_eq!(renderer.prev_levels, vec![2, 4, 2]);

        // Once the incoming level is at or above the displayed one, it is
        // taken as-is again.
        renderer.render(&[0.0, 4.0, 3.0]).unwrap();
        assert_eq!(renderer.prev_levels, vec![0, 4, 3]);
    }

    #[test]
    fn displayed_level_never_rises_while_input_stays_below_it() {
        let config = Config {
            height: 16,
            initial_max: 16.0,
            fall_off: Some(DecayLaw::Multiplicative(0.5)),
            ..test_config()
        };
        let out = SharedWriter::default();
        let mut renderer = BarRenderer::new(&config, out);

        renderer.render(&[16.0, 0.0, 0.0]).unwrap();
        let mut prev = renderer.prev_levels[0];
        while prev > 0 {
            renderer.render(&[0.0, 0.0, 0.0]).unwrap();
            let displayed = renderer.prev_levels[0];
            assert!(displayed < prev, "bar rose from {prev} to {displayed}");
            prev = displayed;
        }
    }

    #[test]
    fn adaptive_ceiling_keeps_headroom_over_window_peak() {
        let config = Config {
            adaptive_scaling: true,
            ..test_config()
        };
        let out = SharedWriter::default();
        let mut renderer = BarRenderer::new(&config, out);

        for peak in [1.0, 7.0, 3.0, 0.5] {
            renderer.render(&[peak, 0.0, 0.0]).unwrap();
            let window_max = renderer.peak_window.iter().copied().fold(0.0f32, f32::max);
            assert!(renderer.current_max >= window_max);
        }
    }

    #[test]
    fn adaptive_ceiling_tracks_quiet_input_once_window_turns_over() {
        let config = Config {
            adaptive_scaling: true,
            ..test_config()
        };
        let out = SharedWriter::default();
        let mut renderer = BarRenderer::new(&config, out);

        // Push the seeded initial_max out of the window entirely.
        for _ in 0..PEAK_WINDOW {
            renderer.render(&[1.0, 0.0, 0.0]).unwrap();
        }
        assert_relative_eq!(renderer.current_max, 1.0 * HEADROOM);
    }

    #[test]
    fn silent_adaptive_session_never_divides_by_zero() {
        let config = Config {
            adaptive_scaling: true,
            ..test_config()
        };
        let out = SharedWriter::default();
        let mut renderer = BarRenderer::new(&config, out.clone());
        for _ in 0..PEAK_WINDOW + 1 {
            renderer.render(&[0.0, 0.0, 0.0]).unwrap();
        }
        assert!(renderer.current_max > 0.0);
        assert!(!out.contents().contains('█'));
    }

    #[test]
    fn drop_paints_a_clearing_frame() {
        let out = SharedWriter::default();
        {
            let mut renderer = BarRenderer::new(&test_config(), out.clone());
            renderer.render(&[4.0, 4.0, 4.0]).unwrap();
        }

        let drawn = out.contents();
        // The final frame (between the two cursor-ups) is entirely blank.
        let last_frame = drawn.rsplit("\u{1b}[4A").nth(1).unwrap();
        assert!(!last_frame.contains('█'));
        assert!(drawn.ends_with("\u{1b}[4A"));
    }
}
