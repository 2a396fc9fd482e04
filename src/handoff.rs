//! Cross-context hand-off queue.
//!
//! The one true concurrency boundary in the crate. Producers — GPIO
//! interrupt callbacks, the GUI thread, anything outside the loop's
//! call stack — push `(contract, payload)` here and wake the loop; they
//! never touch subscription state or run handler code. The loop is the
//! sole consumer.
//!
//! A full queue drops the new event and counts it; the signaling side
//! may be an interrupt handler and must never block.

use alloc::sync::Arc;
use core::cell::Cell;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;

use crate::contract::{Contract, Payload};
use crate::platform::Wake;

/// Fixed hand-off capacity, sized for bursts of interrupt edges between
/// two loop iterations.
pub(crate) const QUEUE_CAP: usize = 16;

#[derive(Debug, Clone, Copy)]
pub(crate) struct RawEvent {
    pub contract: u16,
    pub payload: Payload,
}

struct Shared {
    queue: Channel<CriticalSectionRawMutex, RawEvent, QUEUE_CAP>,
    // cs instead of fetch_add: keeps the counter usable on cores
    // without atomic RMW (riscv32imc)
    dropped: critical_section::Mutex<Cell<u32>>,
    waker: Arc<dyn Wake>,
}

pub(crate) struct Handoff {
    shared: Arc<Shared>,
}

impl Handoff {
    pub fn new(waker: Arc<dyn Wake>) -> Self {
        Self {
            shared: Arc::new(Shared {
                queue: Channel::new(),
                dropped: critical_section::Mutex::new(Cell::new(0)),
                waker,
            }),
        }
    }

    pub fn notifier(&self, contract: Contract) -> Notifier {
        Notifier {
            contract,
            shared: self.shared.clone(),
        }
    }

    pub fn try_pop(&self) -> Option<RawEvent> {
        self.shared.queue.try_receive().ok()
    }

    /// Overflow count since the last drain, reset to zero.
    pub fn take_dropped(&self) -> u32 {
        critical_section::with(|cs| {
            let dropped = self.shared.dropped.borrow(cs);
            let count = dropped.get();
            dropped.set(0);
            count
        })
    }
}

/// Producer-side handle for one external or custom contract.
///
/// Clone freely and hand to the producing collaborator; `raise` is safe
/// from any context.
#[derive(Clone)]
pub struct Notifier {
    contract: Contract,
    shared: Arc<Shared>,
}

impl Notifier {
    pub fn contract(&self) -> Contract {
        self.contract
    }

    /// Enqueue readiness and wake the loop. Never blocks; a full queue
    /// drops the event and counts the overflow.
    pub fn raise(&self, payload: Payload) {
        let event = RawEvent {
            contract: self.contract.id,
            payload,
        };
        if self.shared.queue.try_send(event).is_err() {
            critical_section::with(|cs| {
                let dropped = self.shared.dropped.borrow(cs);
                dropped.set(dropped.get().saturating_add(1));
            });
        }
        self.shared.waker.wake();
    }
}
