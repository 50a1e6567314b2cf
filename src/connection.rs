//! One-command-at-a-time wrapper around a [`Transport`]
//!
//! The protocol is strictly ordered and responses carry no correlation id
//! beyond their opcode echo, so the connection enforces the at-most-one
//! in-flight rule: `command` blocks until the exchange completes before the
//! engine can issue the next one.

use std::time::Duration;

use log::debug;

use crate::command::Opcode;
use crate::error::Error;
use crate::transport::{CancelToken, CommandOptions, Transport, TransportError};

pub struct Connection<T> {
    transport: T,
    cancel: CancelToken,
    unit: Option<u8>,
}

impl<T: Transport> Connection<T> {
    pub fn new(transport: T) -> Self {
        Connection {
            transport,
            cancel: CancelToken::new(),
            unit: None,
        }
    }

    /// Unit identifier forwarded to the transport with every command.
    pub fn set_unit(&mut self, unit: Option<u8>) {
        self.unit = unit;
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub(crate) fn reset_cancel(&self) {
        self.cancel.reset();
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    /// Issue one command and wait for its response.
    ///
    /// Rejects immediately with [`Error::AbortedByUser`] once the session's
    /// cancel token has tripped, without touching the transport.
    pub fn command(
        &mut self,
        op: Opcode,
        payload: &[u8],
        timeout: Duration,
    ) -> Result<Vec<u8>, Error> {
        if self.cancel.is_cancelled() {
            return Err(Error::AbortedByUser);
        }
        debug!("{} command, {} byte payload", op, payload.len());
        let options = CommandOptions {
            unit: self.unit,
            timeout,
            max_retries: 0,
        };
        match self.transport.command(op, payload, &options, &self.cancel) {
            Ok(response) => {
                debug!("{} response, {} bytes", op, response.len());
                Ok(response)
            }
            Err(TransportError::Cancelled) => Err(Error::AbortedByUser),
            Err(TransportError::Timeout) => Err(Error::CommandTimeout(op)),
            Err(err) => Err(Error::Transport(err)),
        }
    }

    pub fn into_transport(self) -> T {
        self.transport
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    /// Transport that records how often it was reached and fails every call
    /// with a fixed error.
    struct FailingTransport {
        calls: usize,
        error: fn() -> TransportError,
    }

    impl Transport for FailingTransport {
        fn command(
            &mut self,
            _op: Opcode,
            _payload: &[u8],
            _options: &CommandOptions,
            _cancel: &CancelToken,
        ) -> Result<Vec<u8>, TransportError> {
            self.calls += 1;
            Err((self.error)())
        }
    }

    #[test]
    fn timeout_names_the_command() {
        let mut connection = Connection::new(FailingTransport {
            calls: 0,
            error: || TransportError::Timeout,
        });
        let err = connection
            .command(Opcode::Verify, &[], Duration::from_millis(1))
            .unwrap_err();
        assert!(matches!(err, Error::CommandTimeout(Opcode::Verify)));
    }

    #[test]
    fn transport_cancel_maps_to_aborted() {
        let mut connection = Connection::new(FailingTransport {
            calls: 0,
            error: || TransportError::Cancelled,
        });
        let err = connection
            .command(Opcode::Data, &[0, 0, 0, 0], Duration::from_millis(1))
            .unwrap_err();
        assert!(matches!(err, Error::AbortedByUser));
    }

    #[test]
    fn tripped_token_rejects_without_touching_the_transport() {
        let mut connection = Connection::new(FailingTransport {
            calls: 0,
            error: || TransportError::Timeout,
        });
        connection.cancel_token().cancel();
        let err = connection
            .command(Opcode::Enquire, &[], Duration::from_millis(1))
            .unwrap_err();
        assert!(matches!(err, Error::AbortedByUser));
        assert_eq!(connection.into_transport().calls, 0);
    }
}
