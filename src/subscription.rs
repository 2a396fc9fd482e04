//! Subscriptions: one contract bound to one handler and its state.
//!
//! Persistent handler state lives in an explicit slot the loop passes
//! in and stores back from the handler's return value — the Rust
//! rendition of the scripting surface's `...state` arguments. The
//! engine only ever manipulates this typed slot, never captured
//! variables, which keeps state inspectable
//! ([`EventLoop::peek_state`](crate::EventLoop::peek_state)).

use alloc::boxed::Box;
use core::any::Any;

use crate::contract::{Contract, Payload};
use crate::error::Fault;
use crate::event_loop::LoopCtx;

/// Handle identifying one subscription. Stays valid until the
/// subscription is removed; operations on a removed handle are no-ops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Subscription(pub(crate) u32);

pub(crate) type StateSlot = Option<Box<dyn Any>>;

pub(crate) type BoxedHandler =
    Box<dyn FnMut(&mut LoopCtx<'_>, Payload, &mut StateSlot) -> Result<(), Fault>>;

pub(crate) struct SubSlot {
    pub handle: Subscription,
    pub contract: Contract,
    /// Taken while the handler runs; the loop is single-threaded, so a
    /// vacant slot can only mean "currently executing".
    pub handler: Option<BoxedHandler>,
    pub state: StateSlot,
}

/// Box a typed handler and its initial state into an untyped slot.
///
/// The wrapper owns the only downcast in the engine; the state slot is
/// always refilled with the same `S` the subscription was created with,
/// so the mismatch arm is unreachable by construction.
pub(crate) fn make_slot<S, F>(
    handle: Subscription,
    contract: Contract,
    initial: S,
    mut handler: F,
) -> SubSlot
where
    S: 'static,
    F: FnMut(&mut LoopCtx<'_>, Payload, S) -> Result<S, Fault> + 'static,
{
    let wrapped: BoxedHandler = Box::new(move |ctx, payload, slot| {
        let state = match slot.take().and_then(|boxed| boxed.downcast::<S>().ok()) {
            Some(state) => *state,
            None => return Err(Fault::new("subscription state lost")),
        };
        let next = handler(ctx, payload, state)?;
        *slot = Some(Box::new(next));
        Ok(())
    });

    SubSlot {
        handle,
        contract,
        handler: Some(wrapped),
        state: Some(Box::new(initial)),
    }
}
