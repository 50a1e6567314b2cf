//! Target device and memory-space configuration
//!
//! A [`TargetConfig`] describes one product: its identity, retry budget,
//! default phase timeouts and an ordered list of [`SpaceConfig`]s, one per
//! addressable memory region (application flash, EEPROM, external SPI flash).
//! Per-space behavior that differs between device families (how a block is
//! packed on the wire, how the space checksum treats absent blocks, what
//! counts as an empty block) is selected through small dispatch enums rather
//! than free function values.
//!
//! Ready-made configs for the known products live in [`profiles`].

pub mod profiles;

use std::time::Duration;

use log::debug;

use crate::command;
use crate::crc::{self, CRC_SEED};
use crate::hex::BlockStore;

/// Expected product code in the ENQUIRE response.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ProductCode {
    /// Accept whatever the device reports.
    Any,
    Code(u8),
}

impl ProductCode {
    pub fn matches(&self, code: u8) -> bool {
        match *self {
            ProductCode::Any => true,
            ProductCode::Code(expected) => expected == code,
        }
    }
}

/// Bytes of parsed image per device address unit.
///
/// PIC24 parts use [`Addressing::Word`]: two logical addresses cover each
/// four-byte instruction word in the HEX file.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum Addressing {
    Byte = 1,
    Word = 2,
}

impl Addressing {
    pub fn divisor(self) -> usize {
        self as usize
    }
}

/// How one parsed block is packed into the DATA payload.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SendFilter {
    /// 4-byte big-endian address followed by the block verbatim.
    Simple,
    /// 4-byte big-endian address, then the first three bytes of every
    /// four-byte stride. Strips the phantom byte Microchip HEX files carry
    /// for PIC24 instruction alignment; a 256-byte block packs to 192.
    Pic24,
}

impl SendFilter {
    pub fn apply(
        self,
        index: u32,
        block: &[u8],
        addressing: Addressing,
        data_offset: i64,
    ) -> Vec<u8> {
        let address = block_address(index, block.len(), addressing, data_offset);
        debug_assert!(address >= 0, "block address underflowed the data offset");
        match self {
            SendFilter::Simple => {
                let mut payload = Vec::with_capacity(4 + block.len());
                payload.extend_from_slice(&(address as u32).to_be_bytes());
                payload.extend_from_slice(block);
                payload
            }
            SendFilter::Pic24 => {
                let mut payload = Vec::with_capacity(4 + block.len() / 4 * 3);
                payload.extend_from_slice(&(address as u32).to_be_bytes());
                for stride in block.chunks(4) {
                    let keep = stride.len().min(3);
                    payload.extend_from_slice(&stride[..keep]);
                }
                payload
            }
        }
    }
}

/// Natural on-wire address of a block.
pub(crate) fn block_address(
    index: u32,
    block_len: usize,
    addressing: Addressing,
    data_offset: i64,
) -> i64 {
    index as i64 * (block_len / addressing.divisor()) as i64 + data_offset
}

/// How the space checksum treats the parsed image.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ChecksumKind {
    /// Feed every address in the range; absent blocks count as 0xFF.
    Fill,
    /// Feed only present, non-empty blocks. Tiny-bootloader semantics where
    /// unused cells read back as 0xFF naturally and must not be counted.
    NoFill,
    /// Always zero. Spaces balanced offline (hexmate) so the device's own
    /// whole-space CRC lands on zero by construction.
    Zero,
}

impl ChecksumKind {
    /// Walk `[start, end)` in `hex_block`-sized steps over the store.
    pub fn compute(
        self,
        start: i64,
        end: i64,
        hex_block: usize,
        empty: EmptyCheck,
        blocks: &BlockStore,
    ) -> u16 {
        if self == ChecksumKind::Zero {
            return 0;
        }
        let mut checksum = CRC_SEED;
        let mut address = start.max(0);
        while address < end {
            let index = (address / hex_block as i64) as u32;
            match blocks.get(index) {
                Some(block) => {
                    if self == ChecksumKind::Fill || !empty.is_empty(block) {
                        checksum = crc::checksum(block, checksum);
                    }
                }
                None => {
                    if self == ChecksumKind::Fill {
                        for _ in 0..hex_block {
                            checksum = crc::update(checksum, 0xFF);
                        }
                    }
                }
            }
            address += hex_block as i64;
        }
        checksum
    }
}

/// What counts as an empty (erased) block.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum EmptyCheck {
    /// Every byte is 0xFF.
    Simple,
    /// The first three bytes of every four-byte stride are 0xFF; the phantom
    /// byte is ignored.
    Pic24,
}

impl EmptyCheck {
    pub fn is_empty(self, block: &[u8]) -> bool {
        match self {
            EmptyCheck::Simple => block.iter().all(|&b| b == 0xFF),
            EmptyCheck::Pic24 => block
                .chunks(4)
                .all(|stride| stride.iter().take(3).all(|&b| b == 0xFF)),
        }
    }
}

/// One named block range a space refuses to program.
#[derive(Clone, Debug)]
pub struct ExcludeRange {
    pub name: &'static str,
    /// First block index, inclusive.
    pub start: u32,
    /// Last block index, inclusive.
    pub end: u32,
    pub exclude: bool,
}

/// Per-space overrides for the target's default phase timeouts.
#[derive(Copy, Clone, Debug, Default)]
pub struct SpaceTimeouts {
    pub select: Option<Duration>,
    pub erase: Option<Duration>,
    pub data: Option<Duration>,
    pub verify: Option<Duration>,
    pub finish: Option<Duration>,
}

/// Default timeouts for each protocol phase.
#[derive(Copy, Clone, Debug)]
pub struct Timeouts {
    pub enquire: Duration,
    pub select: Duration,
    pub erase: Duration,
    pub data: Duration,
    pub verify: Duration,
    pub finish: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Timeouts {
            enquire: command::DEFAULT_ENQUIRE_TIMEOUT,
            select: command::DEFAULT_SELECT_TIMEOUT,
            erase: command::DEFAULT_ERASE_TIMEOUT,
            data: command::DEFAULT_DATA_TIMEOUT,
            verify: command::DEFAULT_VERIFY_TIMEOUT,
            finish: command::DEFAULT_FINISH_TIMEOUT,
        }
    }
}

impl Timeouts {
    /// Resolve against a space's overrides.
    pub fn for_space(&self, space: &SpaceTimeouts) -> Timeouts {
        Timeouts {
            enquire: self.enquire,
            select: space.select.unwrap_or(self.select),
            erase: space.erase.unwrap_or(self.erase),
            data: space.data.unwrap_or(self.data),
            verify: space.verify.unwrap_or(self.verify),
            finish: space.finish.unwrap_or(self.finish),
        }
    }
}

/// One addressable memory region on the target.
#[derive(Clone, Debug)]
pub struct SpaceConfig {
    pub name: &'static str,
    /// Block size used when parsing the HEX file.
    pub hex_block: usize,
    /// Payload size actually framed per DATA command.
    pub send_block: usize,
    pub addressing: Addressing,
    /// Added to the natural block address before transmission. Negative
    /// offsets relocate regions the HEX file bases elsewhere (PIC18 EEPROM
    /// at 0xF00000 lands at zero on the device).
    pub data_offset: i64,
    pub send_filter: SendFilter,
    pub checksum: ChecksumKind,
    pub empty_check: EmptyCheck,
    /// Skip blocks the empty check deems erased when building the send list.
    pub skip_empty_blocks: bool,
    /// Pause between the ENQUIRE handshake and SELECT, for devices that are
    /// still finishing their reset.
    pub select_delay: Option<Duration>,
    pub exclude_blocks: Vec<ExcludeRange>,
    pub timeouts: SpaceTimeouts,
}

impl SpaceConfig {
    pub fn block_is_empty(&self, block: &[u8]) -> bool {
        self.empty_check.is_empty(block)
    }

    /// Pack one parsed block into its on-wire DATA payload.
    pub fn filter_block(&self, index: u32, block: &[u8]) -> Vec<u8> {
        self.send_filter
            .apply(index, block, self.addressing, self.data_offset)
    }

    /// Checksum over `[start, end)` in HEX-file byte addresses.
    pub fn compute_checksum(&self, start: i64, end: i64, blocks: &BlockStore) -> u16 {
        self.checksum
            .compute(start, end, self.hex_block, self.empty_check, blocks)
    }

    /// Post-parse load filter: drop the block ranges this space refuses to
    /// program. Runs before the checksum so the local value matches what the
    /// device computes.
    pub fn apply_load_filter(&self, blocks: &mut BlockStore) {
        for range in &self.exclude_blocks {
            if range.exclude {
                debug!(
                    "excluding {} (blocks {}..={})",
                    range.name, range.start, range.end
                );
                blocks.remove_range(range.start, range.end);
            }
        }
    }
}

/// Everything the engine needs to know about one product. Immutable for the
/// duration of a load.
#[derive(Clone, Debug)]
pub struct TargetConfig {
    pub name: &'static str,
    pub product_code: ProductCode,
    pub product_type: u8,
    pub supports_passthru: bool,
    pub timeouts: Timeouts,
    pub enquire_retries: u32,
    pub data_retries: u32,
    pub spaces: Vec<SpaceConfig>,
}

impl TargetConfig {
    pub fn space(&self, index: usize) -> Option<&SpaceConfig> {
        self.spaces.get(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crc;

    fn store_with(block_size: usize, writes: &[(u32, &[u8])]) -> BlockStore {
        let mut store = BlockStore::new(block_size);
        for &(address, data) in writes {
            store.write(address, data);
        }
        store
    }

    #[test]
    fn simple_filter_prefixes_big_endian_address() {
        let block = [0xABu8; 64];
        let payload = SendFilter::Simple.apply(3, &block, Addressing::Byte, 0x100);
        // 3 * 64 + 0x100 = 0x1C0
        assert_eq!(&payload[..4], &[0x00, 0x00, 0x01, 0xC0]);
        assert_eq!(&payload[4..], &block[..]);
    }

    #[test]
    fn simple_filter_word_addressing_halves_the_address() {
        let block = [0u8; 256];
        let payload = SendFilter::Simple.apply(2, &block, Addressing::Word, 0);
        // 2 * 256 / 2 = 256
        assert_eq!(&payload[..4], &[0x00, 0x00, 0x01, 0x00]);
    }

    #[test]
    fn pic24_filter_strips_every_fourth_byte() {
        let block: Vec<u8> = (0..=255).collect();
        let payload = SendFilter::Pic24.apply(0, &block, Addressing::Word, 0);
        assert_eq!(payload.len(), 4 + 192);
        // First stride: 0, 1, 2 kept, 3 dropped.
        assert_eq!(&payload[4..7], &[0, 1, 2]);
        assert_eq!(payload[7], 4);
    }

    #[test]
    fn empty_checks_agree_on_erased_blocks() {
        let erased = [0xFFu8; 64];
        assert!(EmptyCheck::Simple.is_empty(&erased));
        assert!(EmptyCheck::Pic24.is_empty(&erased));

        let mut phantom_only = [0xFFu8; 64];
        phantom_only[3] = 0x00;
        assert!(!EmptyCheck::Simple.is_empty(&phantom_only));
        assert!(EmptyCheck::Pic24.is_empty(&phantom_only));

        let mut dirty = [0xFFu8; 64];
        dirty[1] = 0x00;
        assert!(!EmptyCheck::Simple.is_empty(&dirty));
        assert!(!EmptyCheck::Pic24.is_empty(&dirty));
    }

    #[test]
    fn fill_checksum_counts_absent_blocks_as_erased() {
        let store = store_with(16, &[(0, &[0x11; 16])]);
        let sparse =
            ChecksumKind::Fill.compute(0, 48, 16, EmptyCheck::Simple, &store);

        let dense = store_with(16, &[(0, &[0x11; 16]), (16, &[0xFF; 16]), (32, &[0xFF; 16])]);
        let filled =
            ChecksumKind::Fill.compute(0, 48, 16, EmptyCheck::Simple, &dense);
        assert_eq!(sparse, filled);
    }

    #[test]
    fn no_fill_checksum_skips_absent_and_empty_blocks() {
        let store = store_with(16, &[(0, &[0x11; 16]), (16, &[0xFF; 16])]);
        let skipping =
            ChecksumKind::NoFill.compute(0, 64, 16, EmptyCheck::Simple, &store);
        let only_data = store_with(16, &[(0, &[0x11; 16])]);
        let reference =
            ChecksumKind::NoFill.compute(0, 16, 16, EmptyCheck::Simple, &only_data);
        assert_eq!(skipping, reference);
    }

    #[test]
    fn no_fill_checksum_of_empty_range_is_the_seed() {
        let store = BlockStore::new(16);
        assert_eq!(
            ChecksumKind::NoFill.compute(0, 64, 16, EmptyCheck::Simple, &store),
            crc::CRC_SEED
        );
    }

    #[test]
    fn zero_checksum_is_always_zero() {
        let store = store_with(16, &[(0, &[0x42; 16])]);
        assert_eq!(
            ChecksumKind::Zero.compute(0, 16, 16, EmptyCheck::Simple, &store),
            0
        );
    }

    // A block is empty exactly when the fill checksum over a range holding
    // only that block equals the checksum of the same range fully erased.
    #[test]
    fn empty_block_agreement_with_fill_checksum() {
        let erased = ChecksumKind::Fill.compute(0, 16, 16, EmptyCheck::Simple, &BlockStore::new(16));
        for block in [[0xFFu8; 16], [0x00u8; 16]] {
            let store = store_with(16, &[(0, &block)]);
            let sum = ChecksumKind::Fill.compute(0, 16, 16, EmptyCheck::Simple, &store);
            assert_eq!(
                EmptyCheck::Simple.is_empty(&block),
                sum == erased,
                "disagreement for block {:02X?}",
                &block[..2]
            );
        }
    }

    #[test]
    fn load_filter_drops_excluded_ranges() {
        let space = SpaceConfig {
            exclude_blocks: vec![
                ExcludeRange {
                    name: "reserved",
                    start: 1,
                    end: 2,
                    exclude: true,
                },
                ExcludeRange {
                    name: "kept anyway",
                    start: 3,
                    end: 3,
                    exclude: false,
                },
            ],
            ..profiles::pic18_flash_space()
        };
        let mut store = store_with(
            space.hex_block,
            &[
                (0, &[0x01]),
                (space.hex_block as u32, &[0x02]),
                (2 * space.hex_block as u32, &[0x03]),
                (3 * space.hex_block as u32, &[0x04]),
            ],
        );
        space.apply_load_filter(&mut store);
        assert_eq!(store.len(), 2);
        assert!(store.get(0).is_some());
        assert!(store.get(1).is_none());
        assert!(store.get(2).is_none());
        assert!(store.get(3).is_some());
    }

    #[test]
    fn excluded_blocks_do_not_reach_the_checksum() {
        let space = SpaceConfig {
            exclude_blocks: vec![ExcludeRange {
                name: "reserved",
                start: 1,
                end: 1,
                exclude: true,
            }],
            ..profiles::pic18_flash_space()
        };
        let hex_block = space.hex_block;
        let mut with_data = store_with(
            hex_block,
            &[(0, &[0x01]), (hex_block as u32, &[0x02])],
        );
        space.apply_load_filter(&mut with_data);

        let clean = store_with(hex_block, &[(0, &[0x01])]);
        let end = 2 * hex_block as i64;
        assert_eq!(
            space.compute_checksum(0, end, &with_data),
            space.compute_checksum(0, end, &clean)
        );
    }

    #[test]
    fn space_timeouts_override_target_defaults() {
        let defaults = Timeouts::default();
        let overrides = SpaceTimeouts {
            erase: Some(Duration::from_secs(120)),
            ..SpaceTimeouts::default()
        };
        let resolved = defaults.for_space(&overrides);
        assert_eq!(resolved.erase, Duration::from_secs(120));
        assert_eq!(resolved.data, defaults.data);
        assert_eq!(resolved.enquire, defaults.enquire);
    }

    #[test]
    fn profile_payload_sizes_match_send_block() {
        for target in [
            profiles::pic18_controller(),
            profiles::cs1451(),
            profiles::cs1814_bt_adapter(),
            profiles::cs1435_hmi(),
        ] {
            assert!(!target.spaces.is_empty(), "{} has no spaces", target.name);
            for space in &target.spaces {
                let block = vec![0u8; space.hex_block];
                // First block index whose on-wire address is non-negative.
                let span = (space.hex_block / space.addressing.divisor()) as i64;
                let index = if space.data_offset < 0 {
                    (-space.data_offset / span) as u32
                } else {
                    0
                };
                let payload = space.filter_block(index, &block);
                assert_eq!(
                    payload.len(),
                    4 + space.send_block,
                    "{} / {}",
                    target.name,
                    space.name
                );
            }
        }
    }
}
