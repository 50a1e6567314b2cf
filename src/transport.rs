//! The transport seam between the bootload engine and a concrete channel
//!
//! The engine never talks to a port directly. Whatever carries the commands
//! (a serial MODBUS master, a CAN gateway, a BLE bridge) implements
//! [`Transport`]: issue one command, return the response bytes. Framing,
//! addressing and transient-error retries belong to the transport; protocol
//! retries and timeouts-per-phase belong to the engine.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use miette::Diagnostic;
use thiserror::Error;

use crate::command::Opcode;

#[derive(Debug, Error, Diagnostic)]
#[non_exhaustive]
pub enum TransportError {
    #[error("Transport is not connected")]
    #[diagnostic(
        code(picflash::transport::not_connected),
        help("Open the channel and wait for it to report readiness before starting a load")
    )]
    NotConnected,

    #[error("No response within the allotted time")]
    #[diagnostic(code(picflash::transport::timeout))]
    Timeout,

    #[error("Request was cancelled")]
    #[diagnostic(code(picflash::transport::cancelled))]
    Cancelled,

    #[error("I/O error on the underlying channel")]
    #[diagnostic(code(picflash::transport::io))]
    Io(#[from] std::io::Error),
}

/// Per-command options handed to the transport.
#[derive(Clone, Debug)]
pub struct CommandOptions {
    /// Unit identifier, where the framing layer addresses by one.
    pub unit: Option<u8>,
    /// Deadline for this single request/response exchange.
    pub timeout: Duration,
    /// Transient-failure retries the transport may spend within the deadline.
    /// Protocol-level retries (ENQUIRE, DATA) are the engine's, not these.
    pub max_retries: u32,
}

/// Shared cancellation flag.
///
/// The engine owns one token per session and hands clones outward; a tripped
/// token is observed at every suspension point. Transports with long internal
/// waits should poll it and bail with [`TransportError::Cancelled`].
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        CancelToken::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Arm the token for a fresh session.
    pub(crate) fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// One request/response command channel to the device.
pub trait Transport {
    /// True once the channel has reported readiness. The engine refuses to
    /// start a load before this.
    fn is_connected(&self) -> bool {
        true
    }

    /// Issue one command and return the response bytes.
    ///
    /// Blocks until the response arrives, the deadline passes
    /// ([`TransportError::Timeout`]), or `cancel` trips
    /// ([`TransportError::Cancelled`]). The engine never has more than one
    /// command outstanding.
    fn command(
        &mut self,
        op: Opcode,
        payload: &[u8],
        options: &CommandOptions,
        cancel: &CancelToken,
    ) -> Result<Vec<u8>, TransportError>;
}
