//! The event loop.
//!
//! Single logical thread of script execution: handlers never run
//! concurrently with each other or themselves, and the loop is the only
//! place where readiness becomes a handler call. Each iteration picks
//! exactly one ready item — due timers before queued external events
//! before queued custom events, falling back to creation order — fires
//! it, applies any structural changes handlers requested, and goes back
//! to sleep in [`Platform::wait`], the sole suspension point.
//!
//! Cancellation is cooperative. `stop()` and `unsubscribe()` take
//! effect at step boundaries; a running handler is never preempted.

use alloc::collections::{BTreeSet, VecDeque};
use alloc::vec::Vec;

use log::{debug, info, trace, warn};

use crate::contract::{Contract, Payload, SourceKind};
use crate::error::{Error, Fault};
use crate::handoff::{Handoff, Notifier, QUEUE_CAP, RawEvent};
use crate::platform::Platform;
use crate::subscription::{SubSlot, Subscription, make_slot};
use crate::timer::{TimerMode, TimerSlot};

pub struct EventLoop<P: Platform> {
    platform: P,
    /// Contract id → producer kind, indexed by creation order.
    kinds: Vec<SourceKind>,
    timers: Vec<TimerSlot>,
    /// Registration order; dispatch for a timer walks this in order.
    subs: Vec<SubSlot>,
    /// Single-consumer contracts that currently have a subscriber.
    claimed: BTreeSet<u16>,
    handoff: Handoff,
    /// Events drained from the hand-off, arrival order preserved.
    pending: VecDeque<RawEvent>,
    /// Structural changes requested by running handlers, applied when
    /// the dispatch step completes.
    deferred: Vec<DeferredOp>,
    next_sub: u32,
    running: bool,
    stop_requested: bool,
}

pub(crate) enum DeferredOp {
    Add(SubSlot),
    Remove(Subscription),
}

impl<P: Platform> EventLoop<P> {
    pub fn new(platform: P) -> Self {
        let handoff = Handoff::new(platform.waker());
        Self {
            platform,
            kinds: Vec::new(),
            timers: Vec::new(),
            subs: Vec::new(),
            claimed: BTreeSet::new(),
            handoff,
            pending: VecDeque::new(),
            deferred: Vec::new(),
            next_sub: 0,
            running: false,
            stop_requested: false,
        }
    }

    /// Create a timer contract. The countdown starts when the first
    /// subscription appears, not here.
    pub fn timer(&mut self, mode: TimerMode, period_ms: u32) -> Result<Contract, Error> {
        if period_ms == 0 {
            return Err(Error::InvalidArgument("timer period must be at least 1 ms"));
        }
        let contract = self.new_contract(SourceKind::Timer)?;
        self.timers.push(TimerSlot::new(contract.id, mode, period_ms));
        Ok(contract)
    }

    /// Rendezvous contract for a producer outside the loop's call stack
    /// (interrupt line, GUI signal). Single consumer.
    pub fn external_contract(&mut self) -> Result<(Contract, Notifier), Error> {
        self.channel_contract(SourceKind::External)
    }

    /// Contract for application-defined events. Single consumer;
    /// dispatches after timers and external events when simultaneously
    /// ready.
    pub fn custom_contract(&mut self) -> Result<(Contract, Notifier), Error> {
        self.channel_contract(SourceKind::Custom)
    }

    fn channel_contract(&mut self, kind: SourceKind) -> Result<(Contract, Notifier), Error> {
        let contract = self.new_contract(kind)?;
        Ok((contract, self.handoff.notifier(contract)))
    }

    fn new_contract(&mut self, kind: SourceKind) -> Result<Contract, Error> {
        let id = u16::try_from(self.kinds.len()).map_err(|_| Error::Exhausted("contract table full"))?;
        self.kinds.push(kind);
        Ok(Contract { id, kind })
    }

    /// Bind `handler` and its initial state to `contract`.
    ///
    /// Timer contracts accept any number of subscriptions and fire them
    /// in registration order; external and custom contracts accept one.
    pub fn subscribe<S, F>(
        &mut self,
        contract: Contract,
        initial: S,
        handler: F,
    ) -> Result<Subscription, Error>
    where
        S: 'static,
        F: FnMut(&mut LoopCtx<'_>, Payload, S) -> Result<S, Fault> + 'static,
    {
        validate_claim(&self.kinds, &mut self.claimed, contract)?;
        let handle = Subscription(self.next_sub);
        self.next_sub += 1;
        let now = self.platform.now_ms();
        self.arm_if_timer(contract, now);
        self.subs.push(make_slot(handle, contract, initial, handler));
        debug!("subscribed {:?} to {contract}", handle);
        Ok(handle)
    }

    /// Remove a subscription. No-op if already removed. From inside a
    /// handler use [`LoopCtx::unsubscribe`], which defers to the end of
    /// the current dispatch step.
    pub fn unsubscribe(&mut self, sub: Subscription) {
        self.remove_sub(sub);
    }

    /// Request a cooperative stop. Takes effect at the next iteration
    /// boundary; the current dispatch step finishes first.
    pub fn stop(&mut self) {
        self.stop_requested = true;
    }

    /// Run until stopped or a handler faults.
    ///
    /// Queued events left over at stop are discarded. After a clean
    /// stop — and after a fault, which removes the faulting
    /// subscription — `run()` may be called again.
    pub fn run(&mut self) -> Result<(), Error> {
        if self.running {
            return Err(Error::AlreadyRunning);
        }
        self.running = true;
        self.stop_requested = false;
        info!("event loop running");
        let result = self.poll_until_stopped();
        self.running = false;
        match &result {
            Ok(()) => info!("event loop stopped"),
            Err(e) => warn!("event loop terminated: {e}"),
        }
        result
    }

    fn poll_until_stopped(&mut self) -> Result<(), Error> {
        loop {
            if self.stop_requested {
                self.discard_pending();
                return Ok(());
            }
            self.drain_handoff();
            let now = self.platform.now_ms();
            if let Some(idx) = self.due_timer(now) {
                self.fire_timer(idx)?;
                continue;
            }
            if let Some(idx) = self.select_pending() {
                if let Some(event) = self.pending.remove(idx) {
                    self.fire_channel(event)?;
                }
                continue;
            }
            self.platform.wait(self.next_deadline());
        }
    }

    /// Index of the due timer to fire: earliest deadline, ties broken
    /// by contract creation order.
    fn due_timer(&self, now: u64) -> Option<usize> {
        self.timers
            .iter()
            .enumerate()
            .filter(|(_, t)| t.due(now))
            .min_by_key(|(_, t)| (t.deadline, t.contract))
            .map(|(idx, _)| idx)
    }

    fn next_deadline(&self) -> Option<u64> {
        self.timers.iter().filter(|t| t.armed).map(|t| t.deadline).min()
    }

    /// Next queued event to dispatch: first external-kind entry in
    /// arrival order, else the first entry.
    fn select_pending(&self) -> Option<usize> {
        let mut fallback = None;
        for (idx, event) in self.pending.iter().enumerate() {
            match self.kinds.get(event.contract as usize) {
                Some(SourceKind::External) => return Some(idx),
                _ => {
                    if fallback.is_none() {
                        fallback = Some(idx);
                    }
                }
            }
        }
        fallback
    }

    fn drain_handoff(&mut self) {
        // the local batch is bounded too; whatever does not fit stays
        // in the channel, and producers drop-and-count once that fills
        while self.pending.len() < QUEUE_CAP {
            match self.handoff.try_pop() {
                Some(event) => self.pending.push_back(event),
                None => break,
            }
        }
        let dropped = self.handoff.take_dropped();
        if dropped > 0 {
            warn!("hand-off queue overflowed, {dropped} event(s) dropped");
        }
    }

    fn discard_pending(&mut self) {
        let mut discarded = self.pending.len();
        self.pending.clear();
        while self.handoff.try_pop().is_some() {
            discarded += 1;
        }
        // overflow counted before a stop is moot once everything is
        // thrown away
        let _ = self.handoff.take_dropped();
        if discarded > 0 {
            debug!("discarding {discarded} queued event(s) on stop");
        }
    }

    /// One timer dispatch step: rearm, then fire every bound
    /// subscription in registration order. The firing set is fixed
    /// before the first call; changes requested mid-step apply after.
    fn fire_timer(&mut self, idx: usize) -> Result<(), Error> {
        let now = self.platform.now_ms();
        let contract = self.timers[idx].contract;
        self.timers[idx].rearm(now);
        trace!("timer contract {contract} fired at {now} ms");

        let due: Vec<Subscription> = self
            .subs
            .iter()
            .filter(|s| s.contract.id == contract)
            .map(|s| s.handle)
            .collect();

        let mut result = Ok(());
        for handle in due {
            if self.stop_requested {
                break;
            }
            if let Err(e) = self.invoke(handle, Payload::Tick) {
                result = Err(e);
                break;
            }
        }
        self.apply_deferred();
        result
    }

    fn fire_channel(&mut self, event: RawEvent) -> Result<(), Error> {
        let handle = self
            .subs
            .iter()
            .find(|s| s.contract.id == event.contract)
            .map(|s| s.handle);
        let result = match handle {
            Some(handle) => self.invoke(handle, event.payload),
            None => {
                trace!("no subscriber for contract {}, event discarded", event.contract);
                Ok(())
            }
        };
        self.apply_deferred();
        result
    }

    fn invoke(&mut self, handle: Subscription, payload: Payload) -> Result<(), Error> {
        let Some(pos) = self.subs.iter().position(|s| s.handle == handle) else {
            return Ok(());
        };
        let Some(mut handler) = self.subs[pos].handler.take() else {
            return Ok(());
        };
        let mut state = self.subs[pos].state.take();

        let mut ctx = LoopCtx {
            handle,
            now_ms: self.platform.now_ms(),
            kinds: &self.kinds,
            claimed: &mut self.claimed,
            deferred: &mut self.deferred,
            next_sub: &mut self.next_sub,
            stop_requested: &mut self.stop_requested,
        };
        let outcome = handler(&mut ctx, payload, &mut state);

        match outcome {
            Ok(()) => {
                if let Some(slot) = self.subs.iter_mut().find(|s| s.handle == handle) {
                    slot.handler = Some(handler);
                    slot.state = state;
                }
                Ok(())
            }
            Err(fault) => {
                // a faulted subscription is never resumed: drop it,
                // releasing its claim and disarming its timer, so the
                // next run() schedules cleanly without it
                self.remove_sub(handle);
                Err(Error::Handler(fault))
            }
        }
    }

    fn apply_deferred(&mut self) {
        if self.deferred.is_empty() {
            return;
        }
        let ops = core::mem::take(&mut self.deferred);
        let now = self.platform.now_ms();
        for op in ops {
            match op {
                DeferredOp::Add(slot) => {
                    self.arm_if_timer(slot.contract, now);
                    self.subs.push(slot);
                }
                DeferredOp::Remove(handle) => self.remove_sub(handle),
            }
        }
    }

    fn arm_if_timer(&mut self, contract: Contract, now: u64) {
        if contract.kind != SourceKind::Timer {
            return;
        }
        if let Some(slot) = self.timers.iter_mut().find(|t| t.contract == contract.id) {
            if !slot.armed {
                slot.arm(now);
            }
        }
    }

    fn remove_sub(&mut self, sub: Subscription) {
        let Some(pos) = self.subs.iter().position(|s| s.handle == sub) else {
            return;
        };
        let contract = self.subs[pos].contract;
        self.subs.remove(pos);
        debug!("unsubscribed {:?} from {contract}", sub);
        if contract.kind == SourceKind::Timer {
            // last subscriber gone: let the timer idle
            if !self.subs.iter().any(|s| s.contract.id == contract.id) {
                if let Some(slot) = self.timers.iter_mut().find(|t| t.contract == contract.id) {
                    slot.armed = false;
                }
            }
        } else {
            self.claimed.remove(&contract.id);
        }
    }

    pub fn now_ms(&self) -> u64 {
        self.platform.now_ms()
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn is_active(&self, sub: Subscription) -> bool {
        self.subs.iter().any(|s| s.handle == sub)
    }

    /// Inspect a subscription's threaded state. `None` if the handle is
    /// gone or `S` is not the subscribed state type.
    pub fn peek_state<S: 'static>(&self, sub: Subscription) -> Option<&S> {
        self.subs
            .iter()
            .find(|s| s.handle == sub)?
            .state
            .as_ref()?
            .downcast_ref::<S>()
    }
}

/// Restricted view of the loop handed to a running handler.
///
/// Structural changes requested here are buffered and applied once the
/// current dispatch step completes: the set of subscriptions that fire
/// for an event is exactly the set that was active when the step
/// started. Unsubscribing the running subscription itself is legal and
/// does not affect the in-progress invocation.
pub struct LoopCtx<'a> {
    handle: Subscription,
    now_ms: u64,
    kinds: &'a [SourceKind],
    claimed: &'a mut BTreeSet<u16>,
    deferred: &'a mut Vec<DeferredOp>,
    next_sub: &'a mut u32,
    stop_requested: &'a mut bool,
}

impl LoopCtx<'_> {
    /// Handle of the subscription currently being invoked.
    pub fn handle(&self) -> Subscription {
        self.handle
    }

    /// Time observed at the start of this invocation.
    pub fn now_ms(&self) -> u64 {
        self.now_ms
    }

    /// Stop the loop after the current dispatch step. No further
    /// handler runs; queued events are discarded.
    pub fn stop(&mut self) {
        *self.stop_requested = true;
    }

    /// Deferred removal, applied after the current dispatch step.
    pub fn unsubscribe(&mut self, sub: Subscription) {
        self.deferred.push(DeferredOp::Remove(sub));
    }

    /// Subscribe from inside a handler. Claim conflicts fail here and
    /// now; activation waits for the end of the current dispatch step,
    /// so the new subscription never fires for the event in flight.
    pub fn subscribe<S, F>(
        &mut self,
        contract: Contract,
        initial: S,
        handler: F,
    ) -> Result<Subscription, Error>
    where
        S: 'static,
        F: FnMut(&mut LoopCtx<'_>, Payload, S) -> Result<S, Fault> + 'static,
    {
        validate_claim(self.kinds, self.claimed, contract)?;
        let handle = Subscription(*self.next_sub);
        *self.next_sub += 1;
        self.deferred
            .push(DeferredOp::Add(make_slot(handle, contract, initial, handler)));
        Ok(handle)
    }
}

/// Contract sanity plus the single-consumer rule. Claims are taken
/// eagerly, so two subscribe calls racing within one dispatch step
/// resolve deterministically in favor of the first.
fn validate_claim(
    kinds: &[SourceKind],
    claimed: &mut BTreeSet<u16>,
    contract: Contract,
) -> Result<(), Error> {
    match kinds.get(contract.id as usize) {
        Some(kind) if *kind == contract.kind => {}
        _ => return Err(Error::InvalidArgument("contract does not belong to this loop")),
    }
    if contract.kind != SourceKind::Timer && !claimed.insert(contract.id) {
        return Err(Error::AlreadySubscribed);
    }
    Ok(())
}
