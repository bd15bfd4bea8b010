//! Buffer fan-out hub - the single tap on the live input
//!
//! Every captured buffer is handed, synchronously and on the capture thread, to
//! each registered consumer (the loop recorder, a transcription feed, a meter).
//!
//! # Snapshot/swap
//!
//! ```text
//!  control thread                         capture thread
//!  ──────────────                         ──────────────
//!  lock writer ─► clone set ─► edit       dispatch():
//!        │                                  epoch odd
//!        ▼                                  snapshot = cell.get()  (lock-free)
//!  SharedCell::set(new set) ───────────►    for c in snapshot: c.consume(buf)
//!        │                                  epoch even
//!  wait while epoch unchanged & odd
//! ```
//!
//! The capture thread never sees a set being edited: it only reads complete,
//! immutable snapshots. Old snapshots are released through `basedrop`, so a
//! snapshot dropped on the capture thread is freed on the collector thread.
//!
//! # Failure isolation
//!
//! A consumer returning an error or panicking is skipped for that buffer only.
//! Failures are counted per consumer; the first one is logged.

use std::cell::Cell;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{fence, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use basedrop::{Handle, Shared, SharedCell};
use thiserror::Error;

use crate::types::{AudioFormat, Sample};

/// A buffer delivered to consumers
///
/// The data is borrowed from the capture callback and only valid during the
/// call; consumers copy what they need to keep.
#[derive(Debug, Clone, Copy)]
pub struct InputBuffer<'a> {
    pub format: AudioFormat,
    /// Interleaved samples, `frames * format.channels` long
    pub data: &'a [Sample],
    pub frames: usize,
    /// Monotonic buffer counter since the hub was created
    pub sequence: u64,
}

impl<'a> InputBuffer<'a> {
    /// Iterate interleaved frames
    pub fn frames_iter(&self) -> impl Iterator<Item = &'a [Sample]> {
        self.data.chunks_exact(self.format.channels.max(1) as usize)
    }
}

/// Failure reported by a consumer for one buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("consumer failed: {0}")]
pub struct ConsumerError(pub &'static str);

/// Receives live input buffers on the capture thread
///
/// Implementations must not allocate, lock or block: they run inside the
/// hardware callback. This is not enforced.
pub trait AudioConsumer: Send + Sync + 'static {
    fn consume(&self, buffer: &InputBuffer<'_>) -> Result<(), ConsumerError>;
}

impl<F> AudioConsumer for F
where
    F: Fn(&InputBuffer<'_>) -> Result<(), ConsumerError> + Send + Sync + 'static,
{
    fn consume(&self, buffer: &InputBuffer<'_>) -> Result<(), ConsumerError> {
        self(buffer)
    }
}

struct ConsumerEntry {
    key: String,
    consumer: Box<dyn AudioConsumer>,
    failures: AtomicU64,
}

impl ConsumerEntry {
    #[cold]
    fn record_failure(&self, reason: &'static str) {
        if self.failures.fetch_add(1, Ordering::Relaxed) == 0 {
            log::warn!("Audio consumer '{}' failed ({}); skipping", self.key, reason);
        }
    }
}

type ConsumerSet = Vec<Arc<ConsumerEntry>>;

thread_local! {
    static IN_DISPATCH: Cell<bool> = const { Cell::new(false) };
}

/// Broadcasts captured buffers to a dynamic set of keyed consumers
pub struct FanOutHub {
    consumers: SharedCell<ConsumerSet>,
    gc: Handle,
    /// Serializes copy-on-write updates (control side only)
    writer: Mutex<()>,
    /// Odd while a dispatch is in flight
    epoch: AtomicU64,
    sequence: AtomicU64,
}

impl FanOutHub {
    pub fn new(gc: Handle) -> Self {
        Self {
            consumers: SharedCell::new(Shared::new(&gc, Vec::new())),
            gc,
            writer: Mutex::new(()),
            epoch: AtomicU64::new(0),
            sequence: AtomicU64::new(0),
        }
    }

    /// Insert or replace the consumer under `key`
    ///
    /// Takes effect from the next dispatched buffer. Returns true when an
    /// existing registration was replaced.
    pub fn register(&self, key: impl Into<String>, consumer: impl AudioConsumer) -> bool {
        self.register_boxed(key.into(), Box::new(consumer))
    }

    pub fn register_boxed(&self, key: String, consumer: Box<dyn AudioConsumer>) -> bool {
        let entry = Arc::new(ConsumerEntry {
            key,
            consumer,
            failures: AtomicU64::new(0),
        });
        let key = entry.key.clone();

        let replaced = self.update(|set| {
            let before = set.len();
            set.retain(|e| e.key != entry.key);
            let replaced = set.len() != before;
            set.push(entry);
            replaced
        });
        log::debug!(
            "Audio consumer '{}' {}",
            key,
            if replaced { "replaced" } else { "registered" }
        );
        replaced
    }

    /// Remove the consumer under `key`; no-op if absent
    ///
    /// On return the consumer will not be invoked again (unless called from
    /// inside a dispatch, where the current buffer may still reach it).
    /// Returns whether a consumer was removed.
    pub fn unregister(&self, key: &str) -> bool {
        let removed = self.update(|set| {
            let before = set.len();
            set.retain(|e| e.key != key);
            set.len() != before
        });
        if removed {
            log::debug!("Audio consumer '{}' unregistered", key);
        }
        removed
    }

    /// Deliver one interleaved capture buffer to every consumer
    ///
    /// Must be called from a single thread at a time (the capture callback).
    /// Returns the number of consumers invoked.
    pub fn dispatch(&self, format: AudioFormat, data: &[Sample]) -> usize {
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        self.epoch.fetch_add(1, Ordering::SeqCst);
        fence(Ordering::SeqCst);

        let snapshot = self.consumers.get();
        let buffer = InputBuffer {
            format,
            data,
            frames: data.len() / format.channels.max(1) as usize,
            sequence,
        };

        IN_DISPATCH.with(|flag| flag.set(true));
        for entry in snapshot.iter() {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| entry.consumer.consume(&buffer)));
            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(ConsumerError(reason))) => entry.record_failure(reason),
                Err(_) => entry.record_failure("panicked"),
            }
        }
        IN_DISPATCH.with(|flag| flag.set(false));

        let invoked = snapshot.len();
        drop(snapshot);
        self.epoch.fetch_add(1, Ordering::Release);
        invoked
    }

    /// Keys of the current registrations (unordered)
    pub fn keys(&self) -> Vec<String> {
        self.consumers.get().iter().map(|e| e.key.clone()).collect()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.consumers.get().iter().any(|e| e.key == key)
    }

    pub fn len(&self) -> usize {
        self.consumers.get().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Failures recorded for `key` since it was registered
    pub fn failures(&self, key: &str) -> Option<u64> {
        self.consumers
            .get()
            .iter()
            .find(|e| e.key == key)
            .map(|e| e.failures.load(Ordering::Relaxed))
    }

    /// Buffers dispatched since creation
    pub fn dispatched(&self) -> u64 {
        self.sequence.load(Ordering::Relaxed)
    }

    /// Copy-on-write edit of the consumer set, then wait out stale dispatches
    ///
    /// The writer lock only covers the edit and the swap. A consumer editing
    /// the set from inside a dispatch takes the same lock, so holding it while
    /// waiting for that dispatch would never return.
    fn update<R>(&self, edit: impl FnOnce(&mut ConsumerSet) -> R) -> R {
        let result = {
            let _writer = self.writer.lock().unwrap_or_else(|p| p.into_inner());
            let mut next: ConsumerSet = self.consumers.get().iter().cloned().collect();
            let result = edit(&mut next);
            self.consumers.set(Shared::new(&self.gc, next));
            result
        };

        fence(Ordering::SeqCst);
        self.wait_for_stale_dispatch();
        result
    }

    /// Block until a dispatch that might hold the previous snapshot is done
    fn wait_for_stale_dispatch(&self) {
        if IN_DISPATCH.with(|flag| flag.get()) {
            return;
        }
        let seen = self.epoch.load(Ordering::Acquire);
        if seen % 2 == 0 {
            return;
        }
        while self.epoch.load(Ordering::Acquire) == seen {
            thread::yield_now();
        }
    }
}

impl std::fmt::Debug for FanOutHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FanOutHub")
            .field("consumers", &self.keys())
            .field("dispatched", &self.dispatched())
            .finish()
    }
}
