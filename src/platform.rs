//! Time and sleep abstraction.
//!
//! The loop has exactly one suspension point, [`Platform::wait`]. On
//! hardware that is WFI behind a timer compare; on a host it parks the
//! dispatcher thread; under test, simulated time jumps straight to the
//! next deadline so timer behavior is deterministic.

use alloc::sync::Arc;

/// Ends a [`Platform::wait`] in progress.
///
/// Must be callable from any context, including interrupt handlers —
/// implementations may only set flags or unpark, never block.
pub trait Wake: Send + Sync {
    fn wake(&self);
}

pub trait Platform {
    /// Monotonic milliseconds since an arbitrary origin.
    fn now_ms(&self) -> u64;

    /// Block until `deadline` passes, a waker fires, or spuriously.
    /// `None` means no timer is pending: sleep until woken. The caller
    /// re-evaluates readiness after every return, so spurious wakeups
    /// are harmless.
    fn wait(&mut self, deadline: Option<u64>);

    /// Handle producers use to end a wait early.
    fn waker(&self) -> Arc<dyn Wake>;
}

#[cfg(feature = "std")]
mod host {
    use super::{Platform, Wake};
    use alloc::sync::Arc;
    use core::sync::atomic::{AtomicU64, Ordering};
    use std::thread::{self, Thread};
    use std::time::{Duration, Instant};

    /// Host platform backed by thread park/unpark.
    ///
    /// Create it on the thread that will call `run()`; the waker
    /// unparks that thread.
    pub struct StdPlatform {
        origin: Instant,
        thread: Thread,
    }

    impl StdPlatform {
        pub fn new() -> Self {
            Self {
                origin: Instant::now(),
                thread: thread::current(),
            }
        }
    }

    impl Default for StdPlatform {
        fn default() -> Self {
            Self::new()
        }
    }

    impl Platform for StdPlatform {
        fn now_ms(&self) -> u64 {
            self.origin.elapsed().as_millis() as u64
        }

        fn wait(&mut self, deadline: Option<u64>) {
            match deadline {
                Some(deadline) => {
                    let now = self.now_ms();
                    if deadline > now {
                        thread::park_timeout(Duration::from_millis(deadline - now));
                    }
                }
                None => thread::park(),
            }
        }

        fn waker(&self) -> Arc<dyn Wake> {
            Arc::new(Unpark(self.thread.clone()))
        }
    }

    struct Unpark(Thread);

    impl Wake for Unpark {
        fn wake(&self) {
            self.0.unpark();
        }
    }

    /// Deterministic simulated platform: waiting completes instantly by
    /// jumping virtual time to the deadline.
    ///
    /// Single-threaded by design — producers must raise events from the
    /// loop thread (inside handlers or between runs). Use
    /// [`StdPlatform`] to exercise real cross-thread wakeups.
    pub struct SimPlatform {
        now: Arc<AtomicU64>,
    }

    /// Handle onto a [`SimPlatform`]'s clock, for reading time and
    /// modelling dispatch latency from inside handlers.
    #[derive(Clone)]
    pub struct SimClock {
        now: Arc<AtomicU64>,
    }

    impl SimPlatform {
        pub fn new() -> (Self, SimClock) {
            let now = Arc::new(AtomicU64::new(0));
            (Self { now: now.clone() }, SimClock { now })
        }
    }

    impl SimClock {
        pub fn now_ms(&self) -> u64 {
            self.now.load(Ordering::Relaxed)
        }

        pub fn advance(&self, ms: u64) {
            self.now.fetch_add(ms, Ordering::Relaxed);
        }
    }

    impl Platform for SimPlatform {
        fn now_ms(&self) -> u64 {
            self.now.load(Ordering::Relaxed)
        }

        fn wait(&mut self, deadline: Option<u64>) {
            match deadline {
                Some(deadline) => {
                    if deadline > self.now_ms() {
                        self.now.store(deadline, Ordering::Relaxed);
                    }
                }
                // Simulation deadlock: no armed timer and nothing on the
                // loop thread left to raise an event.
                None => panic!("simulated wait with no deadline: nothing can wake the loop"),
            }
        }

        fn waker(&self) -> Arc<dyn Wake> {
            Arc::new(NoopWake)
        }
    }

    struct NoopWake;

    impl Wake for NoopWake {
        fn wake(&self) {}
    }
}

#[cfg(feature = "std")]
pub use host::{SimClock, SimPlatform, StdPlatform};
