//! The bootload engine
//!
//! [`Bootloader`] drives the whole protocol against a [`Transport`]: enquire
//! with retries, select the memory space, parse and marshal the HEX image,
//! erase, stream the data blocks one at a time, verify the CRC and finish.
//! Each phase is a single command with its own timeout; only ENQUIRE and DATA
//! retry, and every terminal error ends the session.

use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::PathBuf;
use std::thread::sleep;
use std::time::Instant;

use log::{debug, info, warn};

use crate::command::{Opcode, ACK, NACK};
use crate::connection::Connection;
use crate::error::{Error, HexError};
use crate::hex;
use crate::progress::EventSink;
use crate::targets::{SpaceConfig, TargetConfig, Timeouts};
use crate::transport::{Transport, TransportError};

/// Protocol major versions the engine accepts from ENQUIRE.
const SUPPORTED_VERSIONS: [u8; 3] = [2, 3, 4];

/// First scalar version whose DATA acknowledgements echo the block address.
const DATA_ACK_ADDRESS_VERSION: u16 = 0x0401;

/// Where the HEX image comes from.
///
/// Both variants are opened and line-split uniformly.
pub enum HexSource {
    Path(PathBuf),
    Stream(Box<dyn Read>),
}

impl HexSource {
    fn open(self) -> Result<Box<dyn BufRead>, Error> {
        match self {
            HexSource::Path(path) => Ok(Box::new(BufReader::new(File::open(path)?))),
            HexSource::Stream(reader) => Ok(Box::new(BufReader::new(reader))),
        }
    }
}

impl From<PathBuf> for HexSource {
    fn from(path: PathBuf) -> Self {
        HexSource::Path(path)
    }
}

/// Requests that a running load stop at its next suspension point.
///
/// Cloned off the bootloader before the load starts and safe to invoke from
/// any thread. Aborting is idempotent; aborting before `start` or after the
/// session has ended does nothing.
#[derive(Clone)]
pub struct AbortHandle {
    cancel: crate::transport::CancelToken,
}

impl AbortHandle {
    pub fn abort(&self) {
        self.cancel.cancel();
    }
}

/// The device's answers to ENQUIRE.
#[derive(Debug, Clone, Copy)]
struct DeviceInfo {
    product_code: u8,
    version: (u8, u8),
    num_spaces: u8,
    /// Largest command payload the device buffers, 0 when not reported.
    max_buffer: u16,
}

impl DeviceInfo {
    fn scalar_version(&self) -> u16 {
        self.version.0 as u16 * 256 + self.version.1 as u16
    }
}

/// Address window and sizing returned by SELECT.
#[derive(Debug, Clone, Copy)]
struct SpaceWindow {
    block_size: u16,
    app_start: u32,
    app_end: u32,
}

pub struct Bootloader<T> {
    connection: Connection<T>,
    target: TargetConfig,
}

impl<T: Transport> Bootloader<T> {
    pub fn new(transport: T, target: TargetConfig) -> Self {
        Bootloader {
            connection: Connection::new(transport),
            target,
        }
    }

    pub fn target(&self) -> &TargetConfig {
        &self.target
    }

    pub fn abort_handle(&self) -> AbortHandle {
        AbortHandle {
            cancel: self.connection.cancel_token(),
        }
    }

    pub fn into_transport(self) -> T {
        self.connection.into_transport()
    }

    /// Route subsequent commands through the adapter to the device behind it.
    pub fn passthru_on(&mut self) -> Result<(), Error> {
        if !self.target.supports_passthru {
            return Err(Error::PassthruNotSupported);
        }
        self.connection
            .command(Opcode::PassthruOn, &[], self.target.timeouts.select)?;
        Ok(())
    }

    pub fn passthru_off(&mut self) -> Result<(), Error> {
        if !self.target.supports_passthru {
            return Err(Error::PassthruNotSupported);
        }
        self.connection
            .command(Opcode::PassthruOff, &[], self.target.timeouts.select)?;
        Ok(())
    }

    /// Erase every space the bootloader manages.
    pub fn erase_all(&mut self) -> Result<(), Error> {
        let response =
            self.connection
                .command(Opcode::EraseAll, &[], self.target.timeouts.erase)?;
        match response.first() {
            Some(&ACK) => Ok(()),
            status => Err(Error::EraseRejected(status.copied().unwrap_or(NACK))),
        }
    }

    /// Deliver `source` into memory space `space_index`.
    ///
    /// Runs the whole protocol to completion. Any failure is terminal for the
    /// session: pending work is cancelled, a single `Aborted` status is
    /// emitted, and the caller restarts the load from scratch.
    pub fn start(
        &mut self,
        source: HexSource,
        space_index: usize,
        events: &mut dyn EventSink,
    ) -> Result<(), Error> {
        self.connection.reset_cancel();
        let result = self.run(source, space_index, events);
        if let Err(ref err) = result {
            debug!("bootload failed: {err}");
            self.connection.cancel_token().cancel();
            events.status("Aborted");
        }
        result
    }

    fn run(
        &mut self,
        source: HexSource,
        space_index: usize,
        events: &mut dyn EventSink,
    ) -> Result<(), Error> {
        if !self.connection.is_connected() {
            return Err(TransportError::NotConnected.into());
        }
        let space = self
            .target
            .space(space_index)
            .ok_or(Error::InvalidSpace(space_index))?
            .clone();
        let timeouts = self.target.timeouts.for_space(&space.timeouts);

        events.status("Checking Communication");
        let device = self.enquire(space_index, &timeouts)?;
        events.status("Connected");
        info!(
            "{} v{}.{}, {} spaces, {} byte buffer",
            self.target.name,
            device.version.0,
            device.version.1,
            device.num_spaces,
            device.max_buffer
        );

        if let Some(delay) = space.select_delay {
            debug!("waiting {}ms before select", delay.as_millis());
            sleep(delay);
        }

        events.status("Selecting Memory");
        let window = self.select(space_index, device, &timeouts)?;
        events.status(&format!("Min Block Size: {}", window.block_size));
        events.status(&format!("App Start: 0x{:X}", window.app_start));
        events.status(&format!("App End: 0x{:X}", window.app_end));

        events.status("Loading File");
        let (computed_crc, flash_blocks) = self.import(source, &space, window)?;

        events.status("Erasing");
        let started = Instant::now();
        self.erase(&timeouts)?;
        events.status(&format!(
            "Erase Complete ({} sec)",
            started.elapsed().as_secs()
        ));

        events.status("Sending...");
        let started = Instant::now();
        self.send_blocks(&flash_blocks, device, &timeouts, events)?;
        events.status(&format!(
            "Programming Complete ({} sec)",
            started.elapsed().as_secs()
        ));

        events.status("Validating..");
        let started = Instant::now();
        let device_crc = self.verify(&timeouts)?;
        if device_crc != computed_crc {
            return Err(Error::ChecksumMismatch {
                expected: computed_crc,
                got: device_crc,
            });
        }
        events.status(&format!(
            "Checksum: 0x{:04X} ({} sec)",
            device_crc,
            started.elapsed().as_secs()
        ));

        self.finish(&timeouts)?;
        Ok(())
    }

    fn enquire(&mut self, space_index: usize, timeouts: &Timeouts) -> Result<DeviceInfo, Error> {
        let attempts = self.target.enquire_retries + 1;
        for attempt in 1..=attempts {
            match self.connection.command(Opcode::Enquire, &[], timeouts.enquire) {
                Ok(response) => {
                    if response.len() < 4 {
                        return Err(Error::InvalidEnqResponse);
                    }
                    let device = DeviceInfo {
                        product_code: response[0],
                        version: (response[1], response[2]),
                        num_spaces: response[3],
                        max_buffer: if response.len() >= 6 {
                            u16::from_be_bytes([response[4], response[5]])
                        } else {
                            0
                        },
                    };
                    if !SUPPORTED_VERSIONS.contains(&device.version.0) {
                        return Err(Error::UnsupportedVersion(device.version.0));
                    }
                    if (device.num_spaces as usize) < space_index + 1 {
                        return Err(Error::UnsupportedDevice {
                            available: device.num_spaces,
                            requested: space_index,
                        });
                    }
                    if !self.target.product_code.matches(device.product_code) {
                        warn!(
                            "device reports product code 0x{:02X}, expected {:?}",
                            device.product_code, self.target.product_code
                        );
                    }
                    return Ok(device);
                }
                Err(Error::CommandTimeout(_)) => {
                    debug!("no enquire response (attempt {attempt}/{attempts})");
                }
                Err(err) => return Err(err),
            }
        }
        Err(Error::NoResponseFromDevice)
    }

    fn select(
        &mut self,
        space_index: usize,
        device: DeviceInfo,
        timeouts: &Timeouts,
    ) -> Result<SpaceWindow, Error> {
        let response =
            self.connection
                .command(Opcode::Select, &[space_index as u8], timeouts.select)?;
        if response.len() < 6 {
            return Err(Error::InvalidSelectResponse);
        }
        let block_size = u16::from_be_bytes([response[0], response[1]]);
        let (app_start, app_end) = if device.version.0 >= 4 {
            // v4 reports block numbers instead of absolute addresses.
            let start_block = u16::from_be_bytes([response[2], response[3]]) as u32;
            let end_block = u16::from_be_bytes([response[4], response[5]]) as u32;
            (start_block * block_size as u32, end_block * block_size as u32)
        } else {
            if response.len() < 10 {
                return Err(Error::InvalidSelectResponse);
            }
            (
                u32::from_be_bytes([response[2], response[3], response[4], response[5]]),
                u32::from_be_bytes([response[6], response[7], response[8], response[9]]),
            )
        };
        debug!(
            "selected space {}: blocks of {}, app 0x{:X}..0x{:X}",
            space_index, block_size, app_start, app_end
        );
        Ok(SpaceWindow {
            block_size,
            app_start,
            app_end,
        })
    }

    /// Parse the image, run the load filter, compute the local CRC and build
    /// the on-wire payload list.
    ///
    /// The CRC is computed before empty blocks are dropped so it agrees with
    /// the CRC the device computes over the whole window. Parsing shares the
    /// session's cancel token, so an abort lands between line reads instead
    /// of waiting out the whole file.
    fn import(
        &self,
        source: HexSource,
        space: &SpaceConfig,
        window: SpaceWindow,
    ) -> Result<(u16, Vec<Vec<u8>>), Error> {
        let reader = source.open()?;
        let cancel = self.connection.cancel_token();
        let mut blocks = match hex::parse(reader, space.hex_block, &cancel) {
            Ok(blocks) => blocks,
            Err(HexError::Cancelled) => return Err(Error::AbortedByUser),
            Err(err) => return Err(err.into()),
        };
        space.apply_load_filter(&mut blocks);
        if blocks.is_empty() {
            warn!("hex image carries no data for {}", space.name);
        }

        let start = window.app_start as i64 - space.data_offset;
        let end = window.app_end as i64 - space.data_offset;
        let computed_crc = space.compute_checksum(start, end, &blocks);

        let span = (space.hex_block / space.addressing.divisor()) as i64;
        let mut flash_blocks = Vec::new();
        for (index, block) in blocks.iter() {
            let address = index as i64 * span + space.data_offset;
            if address < window.app_start as i64 || address + span - 1 > window.app_end as i64 {
                debug!("block {} at 0x{:X} outside the app window", index, address);
                continue;
            }
            if space.skip_empty_blocks && space.block_is_empty(block) {
                continue;
            }
            let payload = space.filter_block(index, block);
            debug_assert_eq!(payload.len(), 4 + space.send_block);
            flash_blocks.push(payload);
        }
        debug!(
            "{} blocks to send, local crc 0x{:04X}",
            flash_blocks.len(),
            computed_crc
        );
        Ok((computed_crc, flash_blocks))
    }

    fn erase(&mut self, timeouts: &Timeouts) -> Result<(), Error> {
        let response = self.connection.command(Opcode::Erase, &[], timeouts.erase)?;
        match response.first() {
            Some(&ACK) => Ok(()),
            status => Err(Error::EraseRejected(status.copied().unwrap_or(NACK))),
        }
    }

    fn send_blocks(
        &mut self,
        flash_blocks: &[Vec<u8>],
        device: DeviceInfo,
        timeouts: &Timeouts,
        events: &mut dyn EventSink,
    ) -> Result<(), Error> {
        let total = flash_blocks.len();
        let check_address_echo = device.scalar_version() >= DATA_ACK_ADDRESS_VERSION;
        for (sent, payload) in flash_blocks.iter().enumerate() {
            let response = self.send_block(payload, timeouts)?;
            match response.first() {
                Some(&ACK) => {}
                status => {
                    return Err(Error::UnexpectedDataResponse(
                        status.copied().unwrap_or(NACK),
                    ))
                }
            }
            if check_address_echo && (response.len() < 5 || response[3..5] != payload[2..4]) {
                debug!(
                    "block address echo mismatch: sent {:02X?}, got {:02X?}",
                    &payload[2..4],
                    response.get(3..5)
                );
                return Err(Error::BlockOutOfSequence);
            }
            events.progress((100 * (sent + 1) / total) as u32);
        }
        Ok(())
    }

    /// One DATA command with the per-block retry budget. Only timeouts are
    /// retried; a rejection from the device is terminal.
    fn send_block(&mut self, payload: &[u8], timeouts: &Timeouts) -> Result<Vec<u8>, Error> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.connection.command(Opcode::Data, payload, timeouts.data) {
                Ok(response) => return Ok(response),
                Err(Error::CommandTimeout(_)) if attempt <= self.target.data_retries => {
                    debug!("no data response, retrying (attempt {attempt})");
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn verify(&mut self, timeouts: &Timeouts) -> Result<u16, Error> {
        let response = self
            .connection
            .command(Opcode::Verify, &[], timeouts.verify)?;
        if response.len() < 2 {
            return Err(Error::InvalidVerifyResponse);
        }
        Ok(u16::from_be_bytes([response[0], response[1]]))
    }

    fn finish(&mut self, timeouts: &Timeouts) -> Result<(), Error> {
        let response = self
            .connection
            .command(Opcode::Finish, &[], timeouts.finish)?;
        match response.first() {
            Some(&ACK) => Ok(()),
            status => Err(Error::FinishFailed(status.copied().unwrap_or(NACK))),
        }
    }
}
