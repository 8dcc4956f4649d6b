//! Timeout and health tracking
//!
//! Each channel counts its consecutive command timeouts. When the count
//! passes the configured threshold, or a command listed for immediate
//! escalation times out, the modem is reported as blocked to the watchdog
//! and the count starts again from zero.

use std::io::{self, Write};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::channel::ChannelId;
use crate::config::HealthConfig;
use crate::error::AtError;

/// Byte written to a watchdog descriptor to report a blocked modem
pub const BLOCKED_SIGNAL: u8 = b'B';

/// Sink for "modem blocked" notifications
pub trait WatchdogSignal: Send + Sync {
    /// Report that the modem stopped answering on `channel`
    fn signal_blocked(&self, channel: ChannelId) -> io::Result<()>;
}

/// Watchdog signal that writes [`BLOCKED_SIGNAL`] to a byte sink
///
/// Typically a pipe or FIFO read by a supervisor process.
pub struct WriterWatchdog<W> {
    writer: Mutex<W>,
}

impl<W: Write + Send> WriterWatchdog<W> {
    /// Wrap a writer
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    /// Unwrap the writer
    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

impl<W: Write + Send> WatchdogSignal for WriterWatchdog<W> {
    fn signal_blocked(&self, _channel: ChannelId) -> io::Result<()> {
        let mut writer = self.writer.lock();
        writer.write_all(&[BLOCKED_SIGNAL])?;
        writer.flush()
    }
}

/// Outcome of a transaction as seen by the tracker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum HealthEvent {
    Timeout,
    Blocked,
    Answered,
}

impl HealthEvent {
    /// Map a transaction result; anything but a timeout or a blocked write
    /// resets the count
    pub fn from_result<T>(result: &Result<T, AtError>) -> Self {
        match result {
            Err(AtError::Timeout) => Self::Timeout,
            Err(AtError::ModemBlocked) => Self::Blocked,
            _ => Self::Answered,
        }
    }
}

pub(crate) struct HealthTracker {
    config: HealthConfig,
    watchdog: Option<Arc<dyn WatchdogSignal>>,
}

impl HealthTracker {
    pub fn new(config: HealthConfig, watchdog: Option<Arc<dyn WatchdogSignal>>) -> Self {
        Self { config, watchdog }
    }

    fn escalates_immediately(&self, command: &str) -> bool {
        self.config
            .escalate_commands
            .iter()
            .any(|prefix| command.starts_with(prefix.as_str()))
    }

    /// Update a channel's counter; returns true when the watchdog was signalled
    pub fn record(
        &self,
        counter: &AtomicU32,
        channel: ChannelId,
        command: &str,
        event: HealthEvent,
    ) -> bool {
        match event {
            HealthEvent::Answered => {
                counter.store(0, Ordering::Relaxed);
                false
            }
            HealthEvent::Timeout | HealthEvent::Blocked => {
                let count = counter.fetch_add(1, Ordering::Relaxed) + 1;
                let immediate =
                    event == HealthEvent::Timeout && self.escalates_immediately(command);
                if count <= self.config.timeout_threshold && !immediate {
                    debug!("channel {} {:?} {} on {}", channel, event, count, command);
                    return false;
                }

                warn!(
                    "channel {} unresponsive after {} failed commands ({}), signalling watchdog",
                    channel, count, command
                );
                counter.store(0, Ordering::Relaxed);
                if let Some(watchdog) = &self.watchdog {
                    if let Err(e) = watchdog.signal_blocked(channel) {
                        warn!("failed to signal watchdog: {}", e);
                    }
                }
                true
            }
        }
    }
}
