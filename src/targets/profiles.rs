//! Ready-made target configs for the known products
//!
//! These are conveniences: value constructors over [`TargetConfig`] and
//! [`SpaceConfig`]. Nothing in the engine depends on them.

use std::time::Duration;

use super::{
    Addressing, ChecksumKind, EmptyCheck, ExcludeRange, ProductCode, SendFilter, SpaceConfig,
    SpaceTimeouts, TargetConfig, Timeouts,
};
use crate::command::{DEFAULT_DATA_RETRIES, DEFAULT_ENQUIRE_RETRIES};

/// PIC18 application flash: byte addressing, 64-byte blocks sent verbatim.
pub fn pic18_flash_space() -> SpaceConfig {
    SpaceConfig {
        name: "application flash",
        hex_block: 64,
        send_block: 64,
        addressing: Addressing::Byte,
        data_offset: 0,
        send_filter: SendFilter::Simple,
        checksum: ChecksumKind::Fill,
        empty_check: EmptyCheck::Simple,
        skip_empty_blocks: true,
        select_delay: None,
        exclude_blocks: Vec::new(),
        timeouts: SpaceTimeouts::default(),
    }
}

/// PIC18 data EEPROM. HEX files place it at 0xF00000; the device wants it
/// zero-based, hence the negative offset.
pub fn pic18_eeprom_space() -> SpaceConfig {
    SpaceConfig {
        name: "eeprom",
        hex_block: 64,
        send_block: 64,
        addressing: Addressing::Byte,
        data_offset: -0xF0_0000,
        send_filter: SendFilter::Simple,
        checksum: ChecksumKind::Fill,
        empty_check: EmptyCheck::Simple,
        skip_empty_blocks: false,
        select_delay: None,
        exclude_blocks: Vec::new(),
        timeouts: SpaceTimeouts::default(),
    }
}

/// PIC24 application flash: word addressing, 256-byte parse blocks packed to
/// 192 bytes on the wire. The last program page carries the configuration
/// words, which the device refuses to program.
pub fn pic24_app_space() -> SpaceConfig {
    SpaceConfig {
        name: "application flash",
        hex_block: 256,
        send_block: 192,
        addressing: Addressing::Word,
        data_offset: 0,
        send_filter: SendFilter::Pic24,
        checksum: ChecksumKind::Fill,
        empty_check: EmptyCheck::Pic24,
        skip_empty_blocks: true,
        select_delay: None,
        exclude_blocks: vec![ExcludeRange {
            name: "configuration words",
            start: 0x557,
            end: 0x557,
            exclude: true,
        }],
        timeouts: SpaceTimeouts::default(),
    }
}

/// CS1435 HMI application space.
///
/// The whole-space checksum is zero by construction: the build inserts a
/// hexmate-balanced word so the device's own CRC over the space lands on
/// zero. An image not prepared that way will fail verification.
pub fn hmi_app_space() -> SpaceConfig {
    SpaceConfig {
        name: "hmi application",
        hex_block: 256,
        send_block: 192,
        addressing: Addressing::Word,
        data_offset: 0,
        send_filter: SendFilter::Pic24,
        checksum: ChecksumKind::Zero,
        empty_check: EmptyCheck::Pic24,
        skip_empty_blocks: true,
        select_delay: Some(Duration::from_millis(1500)),
        exclude_blocks: Vec::new(),
        timeouts: SpaceTimeouts::default(),
    }
}

/// External W25 SPI flash behind the HMI. HEX files base it at 0x1000000;
/// the chip itself is zero-based, and a whole-chip erase is slow.
pub fn w25_flash_space() -> SpaceConfig {
    SpaceConfig {
        name: "external spi flash",
        hex_block: 256,
        send_block: 256,
        addressing: Addressing::Byte,
        data_offset: -0x100_0000,
        send_filter: SendFilter::Simple,
        checksum: ChecksumKind::Fill,
        empty_check: EmptyCheck::Simple,
        skip_empty_blocks: true,
        select_delay: None,
        exclude_blocks: Vec::new(),
        timeouts: SpaceTimeouts {
            erase: Some(Duration::from_secs(120)),
            ..SpaceTimeouts::default()
        },
    }
}

/// PIC16 tiny bootloader program memory: 32-byte blocks, and a checksum that
/// counts only programmed blocks because unused cells read back as 0xFF
/// without ever being touched.
pub fn pic16_tiny_space() -> SpaceConfig {
    SpaceConfig {
        name: "program memory",
        hex_block: 32,
        send_block: 32,
        addressing: Addressing::Byte,
        data_offset: 0,
        send_filter: SendFilter::Simple,
        checksum: ChecksumKind::NoFill,
        empty_check: EmptyCheck::Simple,
        skip_empty_blocks: true,
        select_delay: None,
        exclude_blocks: Vec::new(),
        timeouts: SpaceTimeouts::default(),
    }
}

/// Generic PIC18-based controller: application flash plus data EEPROM.
pub fn pic18_controller() -> TargetConfig {
    TargetConfig {
        name: "PIC18 controller",
        product_code: ProductCode::Any,
        product_type: 0x01,
        supports_passthru: false,
        timeouts: Timeouts::default(),
        enquire_retries: DEFAULT_ENQUIRE_RETRIES,
        data_retries: DEFAULT_DATA_RETRIES,
        spaces: vec![pic18_flash_space(), pic18_eeprom_space()],
    }
}

/// CS1451 controller (PIC24-based).
pub fn cs1451() -> TargetConfig {
    TargetConfig {
        name: "CS1451",
        product_code: ProductCode::Code(0x14),
        product_type: 0x01,
        supports_passthru: false,
        timeouts: Timeouts::default(),
        enquire_retries: DEFAULT_ENQUIRE_RETRIES,
        data_retries: DEFAULT_DATA_RETRIES,
        spaces: vec![pic24_app_space()],
    }
}

/// CS1814 Bluetooth adapter. Loads its own PIC18 flash and can pass commands
/// through to the controller behind it.
pub fn cs1814_bt_adapter() -> TargetConfig {
    TargetConfig {
        name: "CS1814 BT adapter",
        product_code: ProductCode::Code(0x18),
        product_type: 0x02,
        supports_passthru: true,
        timeouts: Timeouts::default(),
        enquire_retries: DEFAULT_ENQUIRE_RETRIES,
        data_retries: DEFAULT_DATA_RETRIES,
        spaces: vec![pic18_flash_space()],
    }
}

/// CS1435 HMI: hexmate-balanced application space plus external SPI flash
/// for assets.
pub fn cs1435_hmi() -> TargetConfig {
    TargetConfig {
        name: "CS1435 HMI",
        product_code: ProductCode::Code(0x23),
        product_type: 0x03,
        supports_passthru: false,
        timeouts: Timeouts::default(),
        enquire_retries: DEFAULT_ENQUIRE_RETRIES,
        data_retries: DEFAULT_DATA_RETRIES,
        spaces: vec![hmi_app_space(), w25_flash_space()],
    }
}

/// PIC16 parts running the tiny bootloader.
pub fn pic16_tiny_bl() -> TargetConfig {
    TargetConfig {
        name: "PIC16 TinyBL",
        product_code: ProductCode::Any,
        product_type: 0x04,
        supports_passthru: false,
        timeouts: Timeouts::default(),
        enquire_retries: DEFAULT_ENQUIRE_RETRIES,
        data_retries: DEFAULT_DATA_RETRIES,
        spaces: vec![pic16_tiny_space()],
    }
}
