// src/audio/frame_queue.rs
//! FIFO handoff buffer between the capture and analysis threads.
//!
//! The producer never waits under the default policy; the consumer parks
//! on a condvar until a frame arrives or the queue is closed.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};

use super::RawFrame;

/// Growth/overflow behavior of the queue.
///
/// `Unbounded` matches the reference implementation: capture never stalls,
/// at the cost of unbounded memory if analysis falls behind. The bounded
/// policies are the hardening options for real deployments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueuePolicy {
    /// Grow without limit; `push` never blocks and never drops.
    Unbounded,
    /// Hold at most `cap` frames; `push` evicts the oldest when full.
    DropOldest(usize),
    /// Hold at most `cap` frames; `push` blocks until space frees up.
    BlockProducer(usize),
}

struct Inner {
    frames: VecDeque<RawFrame>,
    closed: bool,
}

/// Thread-safe FIFO queue of captured frames.
pub struct FrameQueue {
    policy: QueuePolicy,
    inner: Mutex<Inner>,
    not_empty: Condvar,
    not_full: Condvar,
}

impl FrameQueue {
    pub fn new(policy: QueuePolicy) -> Self {
        Self {
            policy,
            inner: Mutex::new(Inner {
                frames: VecDeque::new(),
                closed: false,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
        }
    }

    /// Enqueue a frame. Blocks only under `QueuePolicy::BlockProducer`
    /// while the queue is full; a frame pushed after `close` is discarded.
    pub fn push(&self, frame: RawFrame) {
        let mut inner = self.inner.lock().unwrap();
        match self.policy {
            QueuePolicy::Unbounded => {}
            QueuePolicy::DropOldest(cap) => {
                if inner.frames.len() >= cap.max(1) {
                    inner.frames.pop_front();
                }
            }
            QueuePolicy::BlockProducer(cap) => {
                while inner.frames.len() >= cap.max(1) && !inner.closed {
                    inner = self.not_full.wait(inner).unwrap();
                }
            }
        }
        if inner.closed {
            return;
        }
        inner.frames.push_back(frame);
        self.not_empty.notify_one();
    }

    /// Dequeue the oldest frame, waiting until one is available.
    /// Returns `None` once the queue has been closed and drained.
    pub fn pop_blocking(&self) -> Option<RawFrame> {
        let mut inner = self.inner.lock().unwrap();
        while inner.frames.is_empty() && !inner.closed {
            inner = self.not_empty.wait(inner).unwrap();
        }
        let frame = inner.frames.pop_front();
        if frame.is_some() {
            self.not_full.notify_one();
        }
        frame
    }

    /// Close the queue, waking both sides. Already-queued frames remain
    /// poppable; new pushes are discarded.
    pub fn close(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.closed = true;
        self.not_empty.notify_all();
        self.not_full.notify_all();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
