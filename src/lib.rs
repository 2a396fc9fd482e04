// Cooperative event-dispatch core for small scripted devices.
//
// One logical thread of script execution: the loop in `event_loop` is
// the only place where source readiness turns into a handler call.
// Producers living in interrupt or GUI context never run script code;
// they enqueue through `handoff` and wake the loop.

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

pub mod contract;
pub mod error;
pub mod event_loop;
pub mod hal;
pub mod handoff;
pub mod platform;
pub mod script;
pub mod subscription;
pub mod timer;

pub use contract::{Contract, Payload, SourceKind};
pub use error::{Error, Fault};
pub use event_loop::{EventLoop, LoopCtx};
pub use handoff::Notifier;
pub use platform::{Platform, Wake};
pub use script::ScriptEnv;
pub use subscription::Subscription;
pub use timer::TimerMode;
