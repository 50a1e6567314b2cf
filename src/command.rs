//! Bootloader command opcodes and phase timing defaults

use std::time::Duration;

use strum::Display;

/// Positive acknowledge status byte.
pub const ACK: u8 = 0x00;
/// Negative acknowledge status byte.
pub const NACK: u8 = 0xFF;

pub const DEFAULT_ENQUIRE_TIMEOUT: Duration = Duration::from_millis(500);
pub const DEFAULT_SELECT_TIMEOUT: Duration = Duration::from_secs(3);
pub const DEFAULT_ERASE_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_DATA_TIMEOUT: Duration = Duration::from_secs(3);
pub const DEFAULT_VERIFY_TIMEOUT: Duration = Duration::from_secs(15);
pub const DEFAULT_FINISH_TIMEOUT: Duration = Duration::from_secs(3);

pub const DEFAULT_ENQUIRE_RETRIES: u32 = 2;
pub const DEFAULT_DATA_RETRIES: u32 = 3;

/// Commands understood by the resident bootloader.
///
/// Every exchange is a single request/response frame; the response echoes the
/// opcode and appends status or payload bytes.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Display)]
#[repr(u8)]
#[non_exhaustive]
pub enum Opcode {
    /// Handshake: product code, protocol version, number of memory spaces.
    Enquire = 0xF0,
    /// Route subsequent commands through an adapter to the device behind it.
    PassthruOn = 0xF1,
    PassthruOff = 0xF2,
    /// Select one memory space; the response carries its address window.
    Select = 0xF3,
    /// Erase the selected space.
    Erase = 0xF8,
    /// Program one block; payload is a 4-byte big-endian address plus data.
    Data = 0xF9,
    /// Report the device-computed CRC-16 over the selected space.
    Verify = 0xFA,
    Reset = 0xFB,
    EraseAll = 0xFC,
    /// Finalize the load.
    Finish = 0xFD,
}
