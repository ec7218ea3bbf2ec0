//! Counting semaphore bounding scan-phase concurrency.

use std::sync::{Condvar, Mutex};

/// A counting semaphore over `Mutex` + `Condvar`.
///
/// Permits are returned through the [`SemaphorePermit`] guard, so a worker
/// that panics still releases its slot during unwinding and cannot wedge the
/// scheduler.
pub struct Semaphore {
    available: Mutex<usize>,
    signal: Condvar,
}

impl Semaphore {
    pub fn new(permits: usize) -> Semaphore {
        Semaphore {
            available: Mutex::new(permits.max(1)),
            signal: Condvar::new(),
        }
    }

    /// Block until a permit is available.
    pub fn acquire(&self) -> SemaphorePermit<'_> {
        let mut available = self
            .available
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        while *available == 0 {
            available = self
                .signal
                .wait(available)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
        *available -= 1;
        SemaphorePermit { semaphore: self }
    }

    fn release(&self) {
        let mut available = self
            .available
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *available += 1;
        self.signal.notify_one();
    }
}

/// RAII guard for one semaphore permit.
pub struct SemaphorePermit<'a> {
    semaphore: &'a Semaphore,
}

impl Drop for SemaphorePermit<'_> {
    fn drop(&mut self) {
        self.semaphore.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn permits_bound_concurrent_holders() {
        let semaphore = Arc::new(Semaphore::new(3));
        let live = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        std::thread::scope(|scope| {
            for _ in 0..16 {
                let semaphore = Arc::clone(&semaphore);
                let live = Arc::clone(&live);
                let peak = Arc::clone(&peak);
                scope.spawn(move || {
                    let _permit = semaphore.acquire();
                    let now = live.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    std::thread::sleep(std::time::Duration::from_millis(5));
                    live.fetch_sub(1, Ordering::SeqCst);
                });
            }
        });

        assert!(peak.load(Ordering::SeqCst) <= 3);
    }

    #[test]
    fn panicking_holder_releases_its_permit() {
        let semaphore = Semaphore::new(1);
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _permit = semaphore.acquire();
            panic!("worker died");
        }));
        assert!(result.is_err());

        // the permit came back; this would deadlock otherwise
        let _permit = semaphore.acquire();
    }
}
