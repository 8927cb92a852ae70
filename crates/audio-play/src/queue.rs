//! Bounded sample queue between the player threads and the device callback.
//!
//! Producers (the decode thread, the direct PCM path) push interleaved `f32`
//! and block while the queue is full; the CPAL callback drains it without ever
//! waiting. `close()` releases blocked producers for shutdown.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::Duration;

/// Thread-safe bounded queue of interleaved `f32` samples.
///
/// The channel count is fixed for the lifetime of the queue and all sizes are
/// in samples unless a method says frames.
pub struct SharedAudio {
    channels: usize,
    inner: Mutex<SharedInner>,
    cv: Condvar,
    max_buffered_samples: usize,
}

struct SharedInner {
    queue: VecDeque<f32>,
    done: bool,
}

/// Capacity in samples for `buffer_seconds` of audio at `rate_hz`.
///
/// Non-finite or non-positive durations fall back to a quarter second.
pub fn calc_max_buffered_samples(rate_hz: u32, channels: usize, buffer_seconds: f32) -> usize {
    let secs = if buffer_seconds.is_finite() && buffer_seconds > 0.0 {
        buffer_seconds
    } else {
        0.25
    };

    let frames = (rate_hz as f32 * secs).ceil() as usize;
    frames.saturating_mul(channels).max(channels)
}

impl SharedAudio {
    pub fn new(channels: usize, max_buffered_samples: usize) -> Self {
        Self {
            channels,
            inner: Mutex::new(SharedInner {
                queue: VecDeque::with_capacity(max_buffered_samples),
                done: false,
            }),
            cv: Condvar::new(),
            max_buffered_samples,
        }
    }

    fn guard(&self) -> MutexGuard<'_, SharedInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Mark the queue finished and wake every waiter. Idempotent.
    pub fn close(&self) {
        self.guard().done = true;
        self.cv.notify_all();
    }

    /// Drop everything buffered (stale audio from a previous clip).
    pub fn clear(&self) {
        self.guard().queue.clear();
        self.cv.notify_all();
    }

    /// Push interleaved samples, blocking while the queue is full.
    ///
    /// Returns `false` if the queue was closed before all samples were taken.
    pub fn push_interleaved_blocking(&self, samples: &[f32]) -> bool {
        let mut offset = 0;

        while offset < samples.len() {
            let mut g = self.guard();
            while g.queue.len() >= self.max_buffered_samples && !g.done {
                g = self.cv.wait(g).unwrap_or_else(|e| e.into_inner());
            }
            if g.done {
                return false;
            }

            let room = self.max_buffered_samples - g.queue.len();
            let take = room.min(samples.len() - offset);
            g.queue.extend(&samples[offset..offset + take]);
            offset += take;

            drop(g);
            self.cv.notify_all();
        }
        true
    }

    /// Pop up to `max_frames` whole frames without blocking.
    ///
    /// Returns `None` if no complete frame is buffered.
    pub fn pop_nonblocking(&self, max_frames: usize) -> Option<Vec<f32>> {
        let mut g = self.guard();
        let take_frames = (g.queue.len() / self.channels).min(max_frames);
        if take_frames == 0 {
            return None;
        }
        let out: Vec<f32> = g.queue.drain(..take_frames * self.channels).collect();
        drop(g);
        self.cv.notify_all();
        Some(out)
    }

    /// Wait until the queue has drained or `timeout` elapses.
    ///
    /// Returns `true` if the queue is empty on return.
    pub fn wait_until_empty(&self, timeout: Duration) -> bool {
        let g = self.guard();
        let (g, _) = self
            .cv
            .wait_timeout_while(g, timeout, |inner| !inner.queue.is_empty() && !inner.done)
            .unwrap_or_else(|e| e.into_inner());
        g.queue.is_empty()
    }
}
