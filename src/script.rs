//! Thin script-facing surface.
//!
//! Mirrors what the scripting runtime exposes to user code: make a
//! timer, subscribe, unsubscribe, run, stop. Everything else (pin
//! acquisition, view wiring) goes through the inner [`EventLoop`] and
//! the collaborator traits in [`hal`](crate::hal).
//!
//! The shape follows the reference scripts:
//!
//! ```text
//! subscribe(timer("periodic", 1000), fn(_, _, led, state) {
//!     led.write(state);
//!     return [led, !state];
//! }, led, true);
//! run();
//! ```

use crate::contract::{Contract, Payload};
use crate::error::{Error, Fault};
use crate::event_loop::{EventLoop, LoopCtx};
use crate::platform::Platform;
use crate::subscription::Subscription;
use crate::timer::TimerMode;

pub struct ScriptEnv<P: Platform> {
    event_loop: EventLoop<P>,
}

impl<P: Platform> ScriptEnv<P> {
    pub fn new(platform: P) -> Self {
        Self {
            event_loop: EventLoop::new(platform),
        }
    }

    pub fn timer(&mut self, mode: TimerMode, period_ms: u32) -> Result<Contract, Error> {
        self.event_loop.timer(mode, period_ms)
    }

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
        self.event_loop.subscribe(contract, initial, handler)
    }

    pub fn unsubscribe(&mut self, sub: Subscription) {
        self.event_loop.unsubscribe(sub);
    }

    pub fn run(&mut self) -> Result<(), Error> {
        self.event_loop.run()
    }

    pub fn stop(&mut self) {
        self.event_loop.stop();
    }

    /// The underlying loop, for collaborator wiring and inspection.
    pub fn event_loop(&mut self) -> &mut EventLoop<P> {
        &mut self.event_loop
    }
}
