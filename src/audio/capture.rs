// src/audio/capture.rs
//! Capture device wrapper around a cpal input stream.
//!
//! The cpal callback converts whatever the device delivers into signed
//! 16-bit mono and pushes it into a lock-free SPSC ring; `read_frame`
//! assembles fixed-size frames from the consumer half. The callback never
//! takes a lock, so capture cannot stall behind the reader.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample};
use ringbuf::{traits::*, HeapCons, HeapProd, HeapRb};

use super::RawFrame;
use crate::config::Config;
use crate::error::PipelineError;
use crate::pipeline::CancelToken;

/// How many frames the callback↔reader ring can hold before samples are
/// dropped as overruns.
const RING_FRAMES: usize = 8;

/// Interval at which `read_frame` re-checks the ring, the stream error
/// slot, and the cancel token.
const POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Wraps the default input device and hands out fixed-size sample frames.
pub struct AudioSource {
    /// Keeps the capture stream alive; dropping it stops the device.
    _stream: cpal::Stream,
    samples: HeapCons<i16>,
    frame_size: usize,
    cancel: CancelToken,
    /// First error reported by the stream's error callback, if any.
    stream_error: Arc<Mutex<Option<String>>>,
    overruns: Arc<AtomicUsize>,
}

impl AudioSource {
    /// Open the default input device at the configured rate and start
    /// capturing. Must be called on the thread that will read frames:
    /// cpal streams are not `Send`.
    pub fn open(config: &Config, cancel: CancelToken) -> Result<Self, PipelineError> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| PipelineError::Device("no input device found".to_string()))?;

        let supported = device
            .default_input_config()
            .map_err(|err| PipelineError::Device(err.to_string()))?;

        let stream_config = cpal::StreamConfig {
            channels: supported.channels(),
            sample_rate: cpal::SampleRate(config.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let ring = HeapRb::<i16>::new(config.frame_size * RING_FRAMES);
        let (producer, samples) = ring.split();

        let stream_error = Arc::new(Mutex::new(None));
        let overruns = Arc::new(AtomicUsize::new(0));

        let stream = match supported.sample_format() {
            cpal::SampleFormat::I16 => build_stream::<i16>(
                &device,
                &stream_config,
                producer,
                Arc::clone(&overruns),
                Arc::clone(&stream_error),
            ),
            cpal::SampleFormat::U16 => build_stream::<u16>(
                &device,
                &stream_config,
                producer,
                Arc::clone(&overruns),
                Arc::clone(&stream_error),
            ),
            cpal::SampleFormat::F32 => build_stream::<f32>(
                &device,
                &stream_config,
                producer,
                Arc::clone(&overruns),
                Arc::clone(&stream_error),
            ),
            other => Err(PipelineError::Device(format!(
                "unsupported sample format {other:?}"
            ))),
        }?;

        stream
            .play()
            .map_err(|err| PipelineError::Device(err.to_string()))?;

        log::info!(
            "capturing from {} at {} Hz ({} channel(s), {:?})",
            device.name().unwrap_or_else(|_| "unknown".to_string()),
            config.sample_rate,
            supported.channels(),
            supported.sample_format(),
        );

        Ok(Self {
            _stream: stream,
            samples,
            frame_size: config.frame_size,
            cancel,
            stream_error,
            overruns,
        })
    }

    /// Block until a full frame of samples is available and return it in
    /// arrival order. Returns `Ok(None)` once capture has been cancelled,
    /// `Err` if the device reported a stream error.
    pub fn read_frame(&mut self) -> Result<Option<RawFrame>, PipelineError> {
        loop {
            if let Some(msg) = self.stream_error.lock().unwrap().take() {
                return Err(PipelineError::Device(msg));
            }

            if self.samples.occupied_len() >= self.frame_size {
                let mut frame = vec![0i16; self.frame_size];
                let copied = self.samples.pop_slice(&mut frame);
                debug_assert_eq!(copied, self.frame_size);
                return Ok(Some(frame));
            }

            if self.cancel.is_cancelled() {
                return Ok(None);
            }

            thread::sleep(POLL_INTERVAL);
        }
    }

    /// Samples dropped because the callback outpaced the reader.
    pub fn overrun_count(&self) -> usize {
        self.overruns.load(Ordering::Relaxed)
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut producer: HeapProd<i16>,
    overruns: Arc<AtomicUsize>,
    stream_error: Arc<Mutex<Option<String>>>,
) -> Result<cpal::Stream, PipelineError>
where
    T: cpal::SizedSample,
    i16: FromSample<T>,
{
    let channels = config.channels as usize;
    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                for frame in data.chunks(channels.max(1)) {
                    let mono = downmix(frame);
                    if producer.try_push(mono).is_err() {
                        overruns.fetch_add(1, Ordering::Relaxed);
                    }
                }
            },
            move |err| {
                let mut slot = stream_error.lock().unwrap();
                if slot.is_none() {
                    *slot = Some(err.to_string());
                }
            },
            None,
        )
        .map_err(|err| PipelineError::Device(err.to_string()))
}

/// Average one interleaved device frame down to a single i16 sample.
fn downmix<T>(frame: &[T]) -> i16
where
    T: cpal::SizedSample,
    i16: FromSample<T>,
{
    if frame.is_empty() {
        return 0;
    }
    let sum: i32 = frame
        .iter()
        .map(|&sample| i16::from_sample(sample) as i32)
        .sum();
    (sum / frame.len() as i32) as i16
}
