//! Library errors

use std::io;

use miette::Diagnostic;
use thiserror::Error;

use crate::command::Opcode;
use crate::transport::TransportError;

/// Everything that can end a bootload session.
///
/// Every variant is terminal for the session that produced it; the caller
/// restarts the whole load rather than resuming mid-protocol.
#[derive(Debug, Error, Diagnostic)]
#[non_exhaustive]
pub enum Error {
    #[error("Error while talking to the device")]
    #[diagnostic(transparent)]
    Transport(#[from] TransportError),

    #[error("Timeout while running {0} command")]
    #[diagnostic(code(picflash::timeout))]
    CommandTimeout(Opcode),

    #[error("Device did not answer any enquiry")]
    #[diagnostic(
        code(picflash::no_response),
        help("Check that the device is powered and its bootloader is running")
    )]
    NoResponseFromDevice,

    #[error("Malformed response to the enquire command")]
    #[diagnostic(code(picflash::invalid_enq_response))]
    InvalidEnqResponse,

    #[error("Malformed response to the select command")]
    #[diagnostic(code(picflash::invalid_select_response))]
    InvalidSelectResponse,

    #[error("Malformed response to the verify command")]
    #[diagnostic(code(picflash::invalid_verify_response))]
    InvalidVerifyResponse,

    #[error("Bootloader protocol version {0} is not supported")]
    #[diagnostic(
        code(picflash::unsupported_version),
        help("Protocol versions 2, 3 and 4 are supported")
    )]
    UnsupportedVersion(u8),

    #[error("Device reports {available} memory spaces, space {requested} was requested")]
    #[diagnostic(code(picflash::unsupported_device))]
    UnsupportedDevice { available: u8, requested: usize },

    #[error("Target config does not define a memory space {0}")]
    #[diagnostic(code(picflash::invalid_space))]
    InvalidSpace(usize),

    #[error("Device rejected the erase command (status 0x{0:02X})")]
    #[diagnostic(code(picflash::erase_rejected))]
    EraseRejected(u8),

    #[error("Unexpected response to a data block (status 0x{0:02X})")]
    #[diagnostic(code(picflash::unexpected_data_response))]
    UnexpectedDataResponse(u8),

    #[error("Device acknowledged a different block than the one sent")]
    #[diagnostic(
        code(picflash::block_out_of_sequence),
        help("The device and host disagree about block ordering; restart the load")
    )]
    BlockOutOfSequence,

    #[error("Device failed to finalize the load (status 0x{0:02X})")]
    #[diagnostic(code(picflash::finish_failed))]
    FinishFailed(u8),

    #[error("Checksum mismatch: computed 0x{expected:04X}, device reports 0x{got:04X}")]
    #[diagnostic(code(picflash::checksum_mismatch))]
    ChecksumMismatch { expected: u16, got: u16 },

    #[error("Supplied hex image is not valid")]
    #[diagnostic(transparent)]
    Parse(#[from] HexError),

    #[error("Target does not support passthru")]
    #[diagnostic(code(picflash::passthru_not_supported))]
    PassthruNotSupported,

    #[error("Canceled by user")]
    #[diagnostic(code(picflash::aborted))]
    AbortedByUser,

    #[error("I/O error while reading the hex image")]
    #[diagnostic(code(picflash::io))]
    Io(#[from] io::Error),
}

/// Failures while parsing an Intel HEX image.
#[derive(Debug, Error, Diagnostic)]
#[non_exhaustive]
pub enum HexError {
    #[error("Invalid hex record on line {0}")]
    #[diagnostic(
        code(picflash::hex::invalid_line),
        help("The record is malformed, under-length, or fails its checksum")
    )]
    InvalidHexLine(usize),

    #[error("Unknown record type 0x{0:02X}")]
    #[diagnostic(code(picflash::hex::unknown_record))]
    UnknownRecordType(u8),

    #[error("Record type 0x{0:02X} is not supported")]
    #[diagnostic(
        code(picflash::hex::unsupported_record),
        help("Segment-addressed images are not supported; relink for linear addressing")
    )]
    UnsupportedRecordType(u8),

    #[error("Hex image ended without an end-of-file record")]
    #[diagnostic(code(picflash::hex::incomplete))]
    IncompleteFile,

    #[error("Parsing was cancelled")]
    #[diagnostic(code(picflash::hex::cancelled))]
    Cancelled,

    #[error("I/O error while reading hex image")]
    #[diagnostic(code(picflash::hex::io))]
    Io(#[from] io::Error),
}
