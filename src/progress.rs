//! Bootload status and progress callbacks

use log::{debug, info};

/// Advisory event callbacks emitted while a load runs.
///
/// Implementations must not block: events are emitted from the engine's own
/// thread between protocol commands.
pub trait EventSink {
    /// Human-readable phase transition.
    fn status(&mut self, status: &str);

    /// Percent of data blocks acknowledged so far, 0..=100.
    fn progress(&mut self, percent: u32);
}

/// Sink that discards every event.
pub struct NullEvents;

impl EventSink for NullEvents {
    fn status(&mut self, _status: &str) {}

    fn progress(&mut self, _percent: u32) {}
}

/// Sink that forwards events to the `log` facade: statuses at info, progress
/// ticks at debug.
pub struct LogEvents;

impl EventSink for LogEvents {
    fn status(&mut self, status: &str) {
        info!("{status}");
    }

    fn progress(&mut self, percent: u32) {
        debug!("{percent}%");
    }
}
