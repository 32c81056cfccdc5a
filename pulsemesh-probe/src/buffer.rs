//! Bounded sample buffer with retry-aware flushing.
//!
//! Samples queue here between collection and delivery. The buffer never
//! grows past its limit: a push over capacity sheds the oldest entry,
//! and a failed push goes back to the front of the queue with the
//! oldest backlog behind it trimmed first. At most one flush is in
//! flight at a time; `begin_flush`/`complete_flush`/`fail_flush` keep
//! that guard honest across await points.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{info, warn};

use crate::config::ProbeConfig;
use crate::models::Sample;
use crate::pusher::Pusher;

pub type SharedBuffer = Arc<Mutex<SampleBuffer>>;

pub struct SampleBuffer {
    samples: VecDeque<Sample>,
    limit: usize,
    batch_size: usize,
    flushing: bool,
}

impl SampleBuffer {
    pub fn new(config: &ProbeConfig) -> Self {
        Self {
            samples: VecDeque::new(),
            limit: config.buffer_limit,
            batch_size: config.batch_size,
            flushing: false,
        }
    }

    pub fn shared(config: &ProbeConfig) -> SharedBuffer {
        Arc::new(Mutex::new(Self::new(config)))
    }

    /// Queues a sample. Returns true when the buffer was full and the
    /// oldest unsent sample had to be dropped to make room.
    pub fn push(&mut self, sample: Sample) -> bool {
        self.samples.push_back(sample);
        if self.samples.len() > self.limit {
            self.samples.pop_front();
            return true;
        }
        false
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn is_flushing(&self) -> bool {
        self.flushing
    }

    /// True once enough samples are queued for a regular push.
    pub fn over_threshold(&self) -> bool {
        self.samples.len() >= self.batch_size
    }

    /// Takes the next batch off the front of the queue and marks the
    /// buffer as mid-flush. Returns `None` when a flush is already in
    /// flight, the buffer is empty, or (unless forced) the backlog has
    /// not reached a full batch yet.
    pub fn begin_flush(&mut self, force: bool) -> Option<Vec<Sample>> {
        if self.flushing || self.samples.is_empty() {
            return None;
        }
        if !force && self.samples.len() < self.batch_size {
            return None;
        }
        let take = self.samples.len().min(self.batch_size);
        let batch: Vec<Sample> = self.samples.drain(..take).collect();
        self.flushing = true;
        Some(batch)
    }

    pub fn complete_flush(&mut self) {
        self.flushing = false;
    }

    /// Returns an undelivered batch to the front of the queue so it is
    /// retried before anything collected later. If that overflows the
    /// limit, backlog entries directly behind the batch go first; the
    /// batch itself is only shed once no backlog remains.
    pub fn fail_flush(&mut self, batch: Vec<Sample>) {
        let retried = batch.len();
        for sample in batch.into_iter().rev() {
            self.samples.push_front(sample);
        }
        while self.samples.len() > self.limit {
            if self.samples.len() > retried {
                self.samples.remove(retried);
            } else {
                self.samples.pop_front();
            }
        }
        self.flushing = false;
    }
}

/// What a single flush attempt did.
#[derive(Debug, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Batch accepted by the control plane.
    Delivered(usize),
    /// Push failed; carries the number of samples still buffered.
    Retrying(usize),
    /// Nothing to send, or a flush was already running.
    Idle,
}

/// Runs one flush cycle: takes a batch under the lock, pushes it with
/// the lock released, then settles the buffer according to the result.
pub async fn flush_once(buffer: &SharedBuffer, pusher: &Pusher, force: bool) -> FlushOutcome {
    let batch = match buffer.lock().begin_flush(force) {
        Some(batch) => batch,
        None => return FlushOutcome::Idle,
    };

    match pusher.push(&batch).await {
        Ok(()) => {
            buffer.lock().complete_flush();
            info!("pushed {} samples -> {}", batch.len(), pusher.endpoint());
            FlushOutcome::Delivered(batch.len())
        }
        Err(err) => {
            warn!("push of {} samples failed, will retry: {err}", batch.len());
            let mut guard = buffer.lock();
            guard.fail_flush(batch);
            FlushOutcome::Retrying(guard.len())
        }
    }
}
