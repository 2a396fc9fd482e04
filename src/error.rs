//! Error taxonomy.
//!
//! Misuse errors surface synchronously from the call that caused them.
//! [`Error::Handler`] is different: it propagates out of
//! [`run()`](crate::EventLoop::run) and terminates the loop — faults in
//! script code are never swallowed or retried.

use alloc::string::String;
use core::fmt;

/// Uncaught fault raised by a handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fault {
    message: String,
}

impl Fault {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "handler fault: {}", self.message)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Malformed argument, e.g. a zero timer period.
    InvalidArgument(&'static str),
    /// Second subscription on a single-consumer contract.
    AlreadySubscribed,
    /// `run()` while the loop is already running.
    AlreadyRunning,
    /// The backing resource cannot perform this operation,
    /// e.g. PWM on a plain digital pin.
    Unsupported(&'static str),
    /// A fixed-capacity internal table is full.
    Exhausted(&'static str),
    /// A handler faulted; the loop has stopped.
    Handler(Fault),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidArgument(what) => write!(f, "invalid argument: {what}"),
            Error::AlreadySubscribed => f.write_str("contract already has a subscriber"),
            Error::AlreadyRunning => f.write_str("event loop is already running"),
            Error::Unsupported(what) => write!(f, "unsupported operation: {what}"),
            Error::Exhausted(what) => write!(f, "capacity exhausted: {what}"),
            Error::Handler(fault) => fault.fmt(f),
        }
    }
}
