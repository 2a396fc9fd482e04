//! Event source handles.
//!
//! A [`Contract`] names one event source known to an event loop: who
//! produces it and what a delivery carries. Contracts are plain copyable
//! handles; the loop keeps the actual source state.

use core::fmt;

/// Producer category behind a contract.
///
/// Also decides dispatch precedence when several sources are ready at
/// the same wakeup: timers first, then external notifications, then
/// custom application events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// Periodic or one-shot countdown owned by the loop.
    Timer,
    /// Notification raised outside the loop's call stack (interrupt
    /// edge, GUI view signal).
    External,
    /// Application-defined event (view-dispatcher custom events).
    Custom,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::Timer => f.write_str("timer"),
            SourceKind::External => f.write_str("external"),
            SourceKind::Custom => f.write_str("custom"),
        }
    }
}

/// What a single delivery carries into a handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Payload {
    /// Timer expiry.
    Tick,
    /// Bare readiness with no data, e.g. a GPIO edge.
    Signal,
    /// A 32-bit value, e.g. a view signal code or custom event.
    Value(u32),
}

/// Opaque handle naming one event source registered with an event loop.
///
/// Contract ids are allocated in creation order, which is what the
/// dispatch tie-break falls back to for simultaneously ready sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Contract {
    pub(crate) id: u16,
    pub(crate) kind: SourceKind,
}

impl Contract {
    pub fn kind(&self) -> SourceKind {
        self.kind
    }
}

impl fmt::Display for Contract {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.kind, self.id)
    }
}
