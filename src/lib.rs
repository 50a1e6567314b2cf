//! A library for delivering Intel HEX firmware images to PIC-family devices
//! over a request/response command channel
//!
//! The bootloader resident on the target accepts a small linear protocol
//! (ENQUIRE, SELECT, ERASE, DATA, VERIFY, FINISH) over whatever channel the
//! product exposes: serial, CAN, Bluetooth, usually framed as MODBUS-style
//! commands. This crate parses the HEX image into a sparse block store,
//! marshals it through a per-memory-space filter pipeline, drives the protocol
//! one command at a time, and checks that the CRC-16 it computed locally
//! matches the value the device reports after programming.
//!
//! The concrete channel is not part of this crate. Callers implement the
//! [`transport::Transport`] trait over an already-connected framing master and
//! hand it to [`flasher::Bootloader`] together with a [`targets::TargetConfig`]
//! describing the device; ready-made configs for the known products live in
//! [`targets::profiles`].
//!
//! ```toml
//! picflash = "0.1"
//! ```
//!
//! Status and progress reporting is advisory and goes through the
//! [`progress::EventSink`] callbacks passed into each load. A running load can
//! be stopped from another thread through the [`flasher::AbortHandle`] cloned
//! off the bootloader before the load starts.

pub mod command;
pub mod connection;
pub mod crc;
pub mod error;
pub mod flasher;
pub mod hex;
pub mod progress;
pub mod targets;
pub mod transport;

pub use crate::error::Error;
