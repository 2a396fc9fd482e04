//! Collaborator contracts.
//!
//! The core never drives hardware or draws views itself. Collaborators
//! implement these traits and are handed a [`Notifier`] when the script
//! wants their events in the loop; everything they produce arrives
//! through the same hand-off queue as any other external source.
//!
//! [`Notifier`]: crate::Notifier

pub mod gpio;
pub mod gui;
pub mod serial;

pub use gpio::{Direction, DriveMode, Edge, GpioPin, GpioPort, PinConfig, Pull};
pub use gui::{ViewDispatcher, ViewId, ViewSignal};
pub use serial::SerialPort;
