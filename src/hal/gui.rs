//! GUI collaborator contract.
//!
//! The view dispatcher owns rendering and input routing; the core only
//! sees the contracts its views produce. View signals (selection,
//! button press, navigation) behave like hardware interrupts; custom
//! events are the application-defined channel and dispatch after them.

use crate::contract::Contract;
use crate::error::Error;
use crate::event_loop::EventLoop;
use crate::handoff::Notifier;
use crate::platform::Platform;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewId(pub u32);

/// Per-view signal categories a view dispatcher can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewSignal {
    /// An item was chosen in a list/menu view.
    Selection,
    /// A dialog/widget button was pressed.
    ButtonPress,
    /// Back/forward navigation.
    Navigation,
}

pub trait ViewDispatcher {
    fn switch_view(&mut self, view: ViewId) -> Result<(), Error>;

    /// Post an application-defined event; it arrives on the contract
    /// bound with [`bind_custom`](Self::bind_custom).
    fn send_custom(&mut self, value: u32) -> Result<(), Error>;

    fn send_to_front(&mut self, view: ViewId) -> Result<(), Error>;

    fn send_to_back(&mut self, view: ViewId) -> Result<(), Error>;

    /// Route one view's signal to the loop. The dispatcher raises
    /// `Payload::Value` with the signal's detail (selected index,
    /// button id, navigation direction).
    fn bind_signal(
        &mut self,
        view: ViewId,
        signal: ViewSignal,
        notifier: Notifier,
    ) -> Result<(), Error>;

    /// Route custom events to the loop.
    fn bind_custom(&mut self, notifier: Notifier) -> Result<(), Error>;
}

impl<P: Platform> EventLoop<P> {
    /// External contract fed by one view's signal.
    pub fn view_contract(
        &mut self,
        gui: &mut impl ViewDispatcher,
        view: ViewId,
        signal: ViewSignal,
    ) -> Result<Contract, Error> {
        let (contract, notifier) = self.external_contract()?;
        gui.bind_signal(view, signal, notifier)?;
        Ok(contract)
    }

    /// Custom contract fed by the dispatcher's application events.
    pub fn custom_event_contract(
        &mut self,
        gui: &mut impl ViewDispatcher,
    ) -> Result<Contract, Error> {
        let (contract, notifier) = self.custom_contract()?;
        gui.bind_custom(notifier)?;
        Ok(contract)
    }
}
