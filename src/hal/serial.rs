//! Serial/UART collaborator contract.
//!
//! Reference usage is blocking read-with-timeout and write, outside the
//! event loop. A transport that can signal received data may still
//! bridge into the loop through [`bind_rx`](SerialPort::bind_rx),
//! using the same hand-off as every other external source.

use crate::contract::Contract;
use crate::error::Error;
use crate::event_loop::EventLoop;
use crate::handoff::Notifier;
use crate::platform::Platform;

pub trait SerialPort {
    fn write(&mut self, bytes: &[u8]) -> Result<(), Error>;

    /// Read up to `buf.len()` bytes, blocking at most `timeout_ms`.
    /// Returns the number of bytes read; 0 means the timeout elapsed.
    fn read(&mut self, buf: &mut [u8], timeout_ms: u32) -> Result<usize, Error>;

    /// Raise the notifier whenever received data becomes available.
    fn bind_rx(&mut self, _notifier: Notifier) -> Result<(), Error> {
        Err(Error::Unsupported("rx event binding"))
    }
}

impl<P: Platform> EventLoop<P> {
    /// External contract that becomes ready when `port` has data to
    /// read. Only useful for ports that implement `bind_rx`.
    pub fn serial_rx_contract(&mut self, port: &mut impl SerialPort) -> Result<Contract, Error> {
        let (contract, notifier) = self.external_contract()?;
        port.bind_rx(notifier)?;
        Ok(contract)
    }
}
