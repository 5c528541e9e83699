// src/error.rs
//! Fatal error taxonomy for the capture/analyze/render pipeline.
//!
//! None of these are retried: any of them tears the whole pipeline down.

use std::fmt;
use std::io;

/// Errors that terminate the pipeline.
#[derive(Debug)]
pub enum PipelineError {
    /// The capture device is unavailable, misconfigured, or disconnected.
    Device(String),
    /// A frame with the wrong sample count reached the analyzer. This is a
    /// configuration bug, not an I/O condition.
    MalformedFrame { expected: usize, actual: usize },
    /// The terminal output stream became unwritable.
    Render(io::Error),
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::Device(msg) => write!(f, "capture device error: {msg}"),
            PipelineError::MalformedFrame { expected, actual } => write!(
                f,
                "malformed frame: expected {expected} samples, got {actual}"
            ),
            PipelineError::Render(err) => write!(f, "render error: {err}"),
        }
    }
}

impl std::error::Error for PipelineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PipelineError::Render(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for PipelineError {
    fn from(err: io::Error) -> Self {
        PipelineError::Render(err)
    }
}
