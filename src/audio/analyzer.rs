// src/audio/analyzer.rs
//! FFT computation and frequency band reduction.

use std::sync::Arc;

use rustfft::{num_complex::Complex, Fft, FftPlanner};

use crate::config::Config;
use crate::error::PipelineError;

/// Lower half of a frame's magnitude spectrum, with bin frequencies.
/// Inspection/labeling aid; the pipeline itself consumes [`Bands`].
#[derive(Debug, Clone)]
pub struct Spectrum {
    /// Frequency of each retained bin (Hz).
    pub freqs: Vec<f32>,
    /// Magnitude of each retained bin.
    pub magnitudes: Vec<f32>,
}

/// Band magnitudes ready for display, one entry per bar.
#[derive(Debug, Clone, PartialEq)]
pub struct Bands {
    /// Representative frequency of each band (first bin of its run, Hz).
    pub freqs: Vec<f32>,
    /// Peak magnitude within each band.
    pub levels: Vec<f32>,
}

/// Turns raw sample frames into a fixed number of band magnitudes.
pub struct SpectrumAnalyzer {
    fft: Arc<dyn Fft<f32>>,
    /// Scratch buffer reused across frames.
    buffer: Vec<Complex<f32>>,
    frame_size: usize,
    sample_rate: u32,
    /// Usable spectrum prefix below the cutoff (`sent` bins).
    prefix_len: usize,
    bands: usize,
}

impl SpectrumAnalyzer {
    pub fn new(config: &Config) -> Self {
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(config.frame_size);
        Self {
            fft,
            buffer: vec![Complex::new(0.0, 0.0); config.frame_size],
            frame_size: config.frame_size,
            sample_rate: config.sample_rate,
            prefix_len: config.spectrum_prefix_len(),
            bands: config.bands,
        }
    }

    /// Analyze one frame into exactly `bands` band magnitudes.
    pub fn analyze(&mut self, frame: &[i16]) -> Result<Bands, PipelineError> {
        let magnitudes = self.transform(frame)?;

        let mut freqs = Vec::with_capacity(self.bands);
        let mut levels = Vec::with_capacity(self.bands);
        for band in 0..self.bands {
            let (start, len) = self.band_run(band);
            freqs.push(self.bin_freq(start));
            let level = magnitudes[start..start + len]
                .iter()
                .copied()
                .fold(0.0f32, f32::max);
            levels.push(level);
        }

        Ok(Bands { freqs, levels })
    }

    /// Full lower-half spectrum of one frame, untruncated by the cutoff.
    pub fn spectrum(&mut self, frame: &[i16]) -> Result<Spectrum, PipelineError> {
        self.load(frame)?;
        self.fft.process(&mut self.buffer);

        let half = self.frame_size / 2;
        let freqs = (0..half).map(|i| self.bin_freq(i)).collect();
        let magnitudes = self.buffer.iter().take(half).map(|c| c.norm()).collect();
        Ok(Spectrum { freqs, magnitudes })
    }

    /// FFT the frame and return the magnitude prefix below the cutoff.
    fn transform(&mut self, frame: &[i16]) -> Result<Vec<f32>, PipelineError> {
        self.load(frame)?;
        self.fft.process(&mut self.buffer);
        Ok(self
            .buffer
            .iter()
            .take(self.prefix_len)
            .map(|c| c.norm())
            .collect())
    }

    fn load(&mut self, frame: &[i16]) -> Result<(), PipelineError> {
        if frame.len() != self.frame_size {
            return Err(PipelineError::MalformedFrame {
                expected: self.frame_size,
                actual: frame.len(),
            });
        }
        for (slot, &sample) in self.buffer.iter_mut().zip(frame) {
            *slot = Complex::new(sample as f32, 0.0);
        }
        Ok(())
    }

    /// Start index and length of one band's bin run. The prefix is split
    /// into `bands` contiguous runs of as-equal-as-possible length, the
    /// remainder spread across the leading runs; runs past the prefix are
    /// empty.
    fn band_run(&self, band: usize) -> (usize, usize) {
        let base = self.prefix_len / self.bands;
        let rem = self.prefix_len % self.bands;
        let start = band * base + band.min(rem);
        let len = base + usize::from(band < rem);
        (start, len)
    }

    fn bin_freq(&self, bin: usize) -> f32 {
        bin as f32 * self.sample_rate as f32 / self.frame_size as f32
    }
}

#[cfg(test)]
mod tests {
    use std::f32::consts::TAU;

    use approx::assert_relative_eq;

    use super::*;

    fn analyzer_with(bands: usize) -> SpectrumAnalyzer {
        let config = Config {
            bands,
            ..Config::default()
        };
        SpectrumAnalyzer::new(&config)
    }

    fn sine_frame(frame_size: usize, bin: usize, amplitude: f32) -> Vec<i16> {
        (0..frame_size)
            .map(|i| (amplitude * (TAU * bin as f32 * i as f32 / frame_size as f32).sin()) as i16)
            .collect()
    }

    #[test]
    fn always_returns_configured_band_count() {
        for bands in [32, 50] {
            let mut analyzer = analyzer_with(bands);
            let result = analyzer.analyze(&vec![0i16; 1024]).unwrap();
            assert_eq!(result.levels.len(), bands);
            assert_eq!(result.freqs.len(), bands);
        }
    }

    #[test]
    fn degenerate_prefix_still_fills_every_band() {
        // 10000 * 64 / 44100 = 14 usable bins, fewer than bands; the
        // trailing runs are empty and must come back as silence.
        let config = Config {
            frame_size: 64,
            bands: 20,
            ..Config::default()
        };
        let mut analyzer = SpectrumAnalyzer::new(&config);
        let result = analyzer.analyze(&sine_frame(64, 3, 1000.0)).unwrap();
        assert_eq!(result.levels.len(), 20);
        assert_eq!(result.levels[19], 0.0);
    }

    #[test]
    fn silence_yields_all_zero_bands_and_spectrum() {
        let mut analyzer = analyzer_with(32);
        let frame = vec![0i16; 1024];

        let spectrum = analyzer.spectrum(&frame).unwrap();
        assert!(spectrum.magnitudes.iter().all(|&m| m == 0.0));

        let bands = analyzer.analyze(&frame).unwrap();
        assert!(bands.levels.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn analysis_is_deterministic() {
        let frame = sine_frame(1024, 50, 12_000.0);
        let mut first = analyzer_with(32);
        let mut second = analyzer_with(32);

        let a = first.analyze(&frame).unwrap();
        let b = second.analyze(&frame).unwrap();
        let a_again = first.analyze(&frame).unwrap();

        let bits = |bands: &Bands| -> Vec<u32> {
            bands.levels.iter().map(|v| v.to_bits()).collect()
        };
        assert_eq!(bits(&a), bits(&b));
        assert_eq!(bits(&a), bits(&a_again));
    }

    #[test]
    fn dominant_sinusoid_localizes_to_one_band() {
        // Bin 100 falls in the band covering bins 99..106 (the 8 leading
        // runs hold 8 bins each, the rest 7).
        let mut analyzer = analyzer_with(32);
        let bands = analyzer.analyze(&sine_frame(1024, 100, 8_000.0)).unwrap();

        let peak_band = bands
            .levels
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap())
            .map(|(i, _)| i)
            .unwrap();
        assert_eq!(peak_band, 13);
        assert!(bands.levels[13] > bands.levels[12]);
        assert!(bands.levels[13] > bands.levels[14]);
    }

    #[test]
    fn spectrum_keeps_exactly_the_lower_half() {
        let mut analyzer = analyzer_with(32);
        let spectrum = analyzer.spectrum(&vec![0i16; 1024]).unwrap();
        assert_eq!(spectrum.magnitudes.len(), 512);
        assert_eq!(spectrum.freqs.len(), 512);
        assert_relative_eq!(spectrum.freqs[0], 0.0);
        assert_relative_eq!(spectrum.freqs[1], 44_100.0 / 1024.0);
    }

    #[test]
    fn band_frequencies_start_at_run_boundaries() {
        let mut analyzer = analyzer_with(32);
        let bands = analyzer.analyze(&vec![0i16; 1024]).unwrap();
        let bin_width = 44_100.0 / 1024.0;
        assert_relative_eq!(bands.freqs[0], 0.0);
        // Band 8 starts at bin 64 (eight leading runs of eight bins).
        assert_relative_eq!(bands.freqs[8], 64.0 * bin_width);
    }

    #[test]
    fn rejects_wrong_frame_length() {
        let mut analyzer = analyzer_with(32);
        let err = analyzer.analyze(&vec![0i16; 512]).unwrap_err();
        match err {
            PipelineError::MalformedFrame { expected, actual } => {
                assert_eq!(expected, 1024);
                assert_eq!(actual, 512);
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
