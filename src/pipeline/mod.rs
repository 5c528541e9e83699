// src/pipeline/mod.rs
//! Pipeline driver - owns the capture and analyze+render threads and
//! their lifecycle.
//!
//! The two loops share exactly one thing, the frame queue. Cancellation
//! is cooperative: each loop rechecks the shared token at its blocking
//! point. The capture thread owns the device end to end because cpal
//! streams cannot move between threads; device-open success or failure is
//! reported back through a one-shot channel so `start` fails fast.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::{self, JoinHandle};

use anyhow::{bail, Context, Result};

use crate::audio::{AudioSource, FrameQueue, SpectrumAnalyzer};
use crate::config::Config;
use crate::error::PipelineError;
use crate::render::BarRenderer;

/// Cooperative cancellation flag shared by the pipeline's loops.
#[derive(Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    Running,
    Stopped,
}

/// Owns both threads of the capture → analyze → render pipeline.
pub struct Pipeline {
    config: Config,
    state: State,
    cancel: CancelToken,
    queue: Arc<FrameQueue>,
    capture: Option<JoinHandle<Result<(), PipelineError>>>,
    analysis: Option<JoinHandle<Result<(), PipelineError>>>,
}

impl Pipeline {
    pub fn new(config: Config) -> Result<Self> {
        config
            .validate()
            .map_err(|msg| anyhow::anyhow!(msg))
            .context("invalid pipeline configuration")?;
        let queue = Arc::new(FrameQueue::new(config.queue_policy));
        Ok(Self {
            config,
            state: State::Idle,
            cancel: CancelToken::new(),
            queue,
            capture: None,
            analysis: None,
        })
    }

    /// Open the device and launch both loops. Fails fast with a device
    /// error if the capture stream cannot be opened.
    pub fn start(&mut self) -> Result<()> {
        if self.state != State::Idle {
            bail!("pipeline already started");
        }

        let (ready_tx, ready_rx) = mpsc::channel();
        let capture = {
            let config = self.config.clone();
            let cancel = self.cancel.clone();
            let queue = Arc::clone(&self.queue);
            thread::spawn(move || {
                let mut source = match AudioSource::open(&config, cancel.clone()) {
                    Ok(source) => {
                        let _ = ready_tx.send(Ok(()));
                        source
                    }
                    Err(err) => {
                        let _ = ready_tx.send(Err(err));
                        return Ok(());
                    }
                };

                let result = capture_loop(&mut source, &queue, &cancel);
                if source.overrun_count() > 0 {
                    log::warn!("capture dropped {} samples to overruns", source.overrun_count());
                }
                // No more frames are coming either way.
                queue.close();
                if result.is_err() {
                    cancel.cancel();
                }
                result
            })
        };

        match ready_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                let _ = capture.join();
                self.state = State::Stopped;
                return Err(err).context("failed to open capture device");
            }
            Err(_) => {
                let _ = capture.join();
                self.state = State::Stopped;
                bail!("capture thread exited before reporting readiness");
            }
        }
        self.capture = Some(capture);

        let analysis = {
            let config = self.config.clone();
            let cancel = self.cancel.clone();
            let queue = Arc::clone(&self.queue);
            thread::spawn(move || {
                let result = analysis_loop(&config, &queue);
                if result.is_err() {
                    cancel.cancel();
                    queue.close();
                }
                result
            })
        };
        self.analysis = Some(analysis);

        self.state = State::Running;
        log::info!(
            "pipeline running: {} samples/frame at {} Hz into {} bands",
            self.config.frame_size,
            self.config.sample_rate,
            self.config.bands,
        );
        Ok(())
    }

    /// True while both loops are alive.
    pub fn is_running(&self) -> bool {
        self.state == State::Running
            && self.capture.as_ref().is_some_and(|h| !h.is_finished())
            && self.analysis.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Cancel both loops, wait for them to wind down, and report the
    /// first failure, if any. Idempotent.
    pub fn stop(&mut self) -> Result<()> {
        if self.state != State::Running {
            self.state = State::Stopped;
            return Ok(());
        }

        self.cancel.cancel();
        self.queue.close();

        let capture_result = join_loop(self.capture.take(), "capture")?;
        let analysis_result = join_loop(self.analysis.take(), "analysis")?;
        self.state = State::Stopped;

        capture_result.context("capture loop failed")?;
        analysis_result.context("analysis loop failed")?;
        log::info!("pipeline stopped");
        Ok(())
    }
}

fn join_loop(
    handle: Option<JoinHandle<Result<(), PipelineError>>>,
    name: &str,
) -> Result<Result<(), PipelineError>> {
    match handle {
        Some(handle) => handle
            .join()
            .map_err(|_| anyhow::anyhow!("{name} thread panicked")),
        None => Ok(Ok(())),
    }
}

/// Read frames from the device and hand them to the queue until
/// cancelled or the device fails.
fn capture_loop(
    source: &mut AudioSource,
    queue: &FrameQueue,
    cancel: &CancelToken,
) -> Result<(), PipelineError> {
    while !cancel.is_cancelled() {
        match source.read_frame()? {
            Some(frame) => queue.push(frame),
            None => break,
        }
    }
    Ok(())
}

/// Drain the queue, analyzing and drawing each frame in capture order.
/// The renderer is owned here, so its clearing frame is painted on every
/// exit path when it drops.
fn analysis_loop(config: &Config, queue: &FrameQueue) -> Result<(), PipelineError> {
    let mut analyzer = SpectrumAnalyzer::new(config);
    let mut renderer = BarRenderer::new(config, io::stdout());

    while let Some(frame) = queue.pop_blocking() {
        let bands = analyzer.analyze(&frame)?;
        renderer.render(&bands.levels)?;
    }
    Ok(())
}
