//! GPIO collaborator contract.
//!
//! Pin configuration follows the usual embedded vocabulary: direction,
//! output drive, pull resistor, interrupt edge. Capabilities a concrete
//! pin lacks (analog, PWM, interrupts) report
//! [`Error::Unsupported`] instead of pretending.

use embedded_hal::digital::PinState;

use crate::contract::Contract;
use crate::error::Error;
use crate::event_loop::EventLoop;
use crate::handoff::Notifier;
use crate::platform::Platform;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Input,
    Output,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DriveMode {
    #[default]
    PushPull,
    OpenDrain,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Pull {
    #[default]
    None,
    Up,
    Down,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    Rising,
    Falling,
    Both,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PinConfig {
    pub direction: Direction,
    pub drive: DriveMode,
    pub pull: Pull,
    /// `Some` puts an input into interrupt mode.
    pub edge: Option<Edge>,
}

impl PinConfig {
    pub fn output() -> Self {
        Self {
            direction: Direction::Output,
            drive: DriveMode::default(),
            pull: Pull::default(),
            edge: None,
        }
    }

    pub fn input() -> Self {
        Self {
            direction: Direction::Input,
            drive: DriveMode::default(),
            pull: Pull::default(),
            edge: None,
        }
    }

    pub fn interrupt(edge: Edge) -> Self {
        Self {
            edge: Some(edge),
            ..Self::input()
        }
    }

    pub fn with_pull(mut self, pull: Pull) -> Self {
        self.pull = pull;
        self
    }
}

/// One acquired pin. Digital read/write are the baseline; the rest is
/// optional capability.
pub trait GpioPin {
    fn configure(&mut self, config: &PinConfig) -> Result<(), Error>;

    fn read(&mut self) -> Result<PinState, Error>;

    fn write(&mut self, level: PinState) -> Result<(), Error>;

    fn read_analog_mv(&mut self) -> Result<u16, Error> {
        Err(Error::Unsupported("analog read"))
    }

    fn write_pwm(&mut self, _frequency_hz: u32, _duty_percent: u8) -> Result<(), Error> {
        Err(Error::Unsupported("pwm output"))
    }

    /// Route this pin's configured edge events to the loop. The
    /// collaborator must call [`Notifier::raise`] from its interrupt
    /// callback and nothing else.
    fn bind_interrupt(&mut self, _notifier: Notifier) -> Result<(), Error> {
        Err(Error::Unsupported("interrupt events"))
    }
}

/// Pin acquisition by name or number, e.g. `"pc3"` or `"7"`.
pub trait GpioPort {
    type Pin: GpioPin;

    fn acquire(&mut self, name: &str) -> Result<Self::Pin, Error>;
}

impl<P: Platform> EventLoop<P> {
    /// External contract that becomes ready on each configured edge of
    /// `pin`, usable with `subscribe` like any other contract.
    pub fn interrupt_contract(&mut self, pin: &mut impl GpioPin) -> Result<Contract, Error> {
        let (contract, notifier) = self.external_contract()?;
        pin.bind_interrupt(notifier)?;
        Ok(contract)
    }
}
