//! Card transport abstraction.
//!
//! The client core never talks to a reader directly; everything goes through
//! the [`CardTransport`] trait so that PC/SC, NFC or an in-process simulator
//! can be plugged in.

use bytes::Bytes;
use tracing::trace;

use crate::command::Command;
use crate::error::Error;
use crate::response::Response;

/// A transport capable of exchanging raw APDUs with a card.
pub trait CardTransport {
    /// Transmit a raw command APDU and return the raw response.
    fn transmit_raw(&mut self, command: &[u8]) -> Result<Bytes, Error>;

    /// Reset the transport, e.g. power-cycle or reconnect the card.
    fn reset(&mut self) -> Result<(), Error>;

    /// Transmit a [`Command`] and parse the reply into a [`Response`].
    fn transmit(&mut self, command: &Command) -> Result<Response, Error> {
        let command_bytes = command.to_bytes();
        trace!(command = %hex::encode(&command_bytes), "transmitting APDU");
        let response_bytes = self.transmit_raw(&command_bytes)?;
        trace!(response = %hex::encode(&response_bytes), "received APDU response");
        Response::from_bytes(&response_bytes)
    }
}

impl<T: CardTransport + ?Sized> CardTransport for &mut T {
    fn transmit_raw(&mut self, command: &[u8]) -> Result<Bytes, Error> {
        (**self).transmit_raw(command)
    }

    fn reset(&mut self) -> Result<(), Error> {
        (**self).reset()
    }
}

/// In-memory transport replaying canned responses, for tests.
#[cfg(any(test, feature = "mock"))]
#[derive(Debug, Default)]
pub struct MockTransport {
    commands: Vec<Vec<u8>>,
    responses: std::collections::VecDeque<Vec<u8>>,
}

#[cfg(any(test, feature = "mock"))]
impl MockTransport {
    /// Create a transport with no queued responses.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a response, builder style.
    pub fn with_response(mut self, response: Vec<u8>) -> Self {
        self.responses.push_back(response);
        self
    }

    /// Queue a response.
    pub fn push_response(&mut self, response: Vec<u8>) {
        self.responses.push_back(response);
    }

    /// All commands transmitted so far, in order.
    pub fn commands(&self) -> &[Vec<u8>] {
        &self.commands
    }
}

#[cfg(any(test, feature = "mock"))]
impl CardTransport for MockTransport {
    fn transmit_raw(&mut self, command: &[u8]) -> Result<Bytes, Error> {
        self.commands.push(command.to_vec());
        match self.responses.pop_front() {
            Some(response) => Ok(Bytes::from(response)),
            None => Err(Error::other("no more mock responses")),
        }
    }

    fn reset(&mut self) -> Result<(), Error> {
        Ok(())
    }
}
