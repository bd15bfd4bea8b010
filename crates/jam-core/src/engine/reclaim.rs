//! RT-safe deferred reclamation
//!
//! Track chains removed on the render thread and consumer-set snapshots
//! released on the capture thread hold audio buffers and boxed nodes. Freeing
//! them there would put the allocator on the hardware clock, so they are
//! wrapped in `basedrop` pointers: a drop on an audio thread only enqueues the
//! pointer, and the actual deallocation happens on the "audio-gc" thread.
//!
//! Unlike a process-wide collector, a [`Reclaimer`] is owned by its engine and
//! shuts its thread down when dropped. Handles are given out once, at spawn;
//! every handle should be gone before the reclaimer is dropped so the final
//! pass can free everything.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use basedrop::{Collector, Handle};

/// How often the collector thread reclaims deferred drops
const COLLECT_INTERVAL: Duration = Duration::from_millis(50);

/// Owner of the collector thread
pub struct Reclaimer {
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl Reclaimer {
    /// Spawn the collector thread and wait for its handle
    pub fn spawn() -> std::io::Result<(Self, Handle)> {
        let (tx, rx) = mpsc::channel();
        let running = Arc::new(AtomicBool::new(true));
        let keep_running = Arc::clone(&running);

        let thread = thread::Builder::new()
            .name("audio-gc".to_string())
            .spawn(move || {
                // Collector is !Sync, so it lives on this thread only
                let mut collector = Collector::new();
                if tx.send(collector.handle()).is_err() {
                    return;
                }
                log::debug!("Audio GC thread started");

                while keep_running.load(Ordering::Acquire) {
                    collector.collect();
                    thread::park_timeout(COLLECT_INTERVAL);
                }

                // Final pass; anything still referenced elsewhere leaks with the collector
                collector.collect();
                if let Err(collector) = collector.try_cleanup() {
                    log::debug!("Audio GC stopped with live allocations outstanding");
                    std::mem::forget(collector);
                }
                log::debug!("Audio GC thread stopped");
            })?;

        let handle = rx.recv().map_err(|_| {
            std::io::Error::new(std::io::ErrorKind::Other, "audio GC thread exited early")
        })?;

        Ok((
            Self {
                running,
                thread: Some(thread),
            },
            handle,
        ))
    }
}

impl Drop for Reclaimer {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(thread) = self.thread.take() {
            thread.thread().unpark();
            if thread.join().is_err() {
                log::error!("Audio GC thread panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use basedrop::{Owned, Shared};
    use std::sync::atomic::AtomicUsize;

    struct DropCounter(Arc<AtomicUsize>);

    impl Drop for DropCounter {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_deferred_drops_are_collected() {
        let (_reclaimer, handle) = Reclaimer::spawn().unwrap();
        let dropped = Arc::new(AtomicUsize::new(0));

        let owned = Owned::new(&handle, DropCounter(Arc::clone(&dropped)));
        let shared = Shared::new(&handle, DropCounter(Arc::clone(&dropped)));
        drop(owned);
        drop(shared);

        for _ in 0..100 {
            if dropped.load(Ordering::SeqCst) == 2 {
                break;
            }
            thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(dropped.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_reclaimer_shuts_down() {
        let (reclaimer, handle) = Reclaimer::spawn().unwrap();
        let value = Shared::new(&handle, 7u32);
        assert_eq!(*value, 7);
        drop(value);
        drop(handle);
        drop(reclaimer);
    }
}
