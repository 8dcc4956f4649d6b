//! Reader loop
//!
//! One task per modem instance reads every channel's transport, frames the
//! bytes into lines and routes each line either to the command waiting on
//! that channel or to the channel's unsolicited handler.
//!
//! The loop runs inside a task-local marker so that issuers can detect (and
//! refuse) being called from a handler running on the loop itself.

use std::future::{poll_fn, Future};
use std::io::{self, ErrorKind};
use std::pin::Pin;
use std::sync::Arc;
use std::task::Poll;
use std::time::Duration;

use at_protocol::{is_sms_unsolicited, LineFramer};
use tokio::io::{AsyncRead, ReadBuf};
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

use crate::channel::{BoxedReader, Channel, ChannelId, LineOutcome};
use crate::config::{EngineConfig, ReaderConfig};
use crate::instance::InstanceShared;

tokio::task_local! {
    static READER_CONTEXT: ();
}

/// Whether the current task is a reader loop
pub(crate) fn in_reader_context() -> bool {
    READER_CONTEXT.try_with(|_| ()).is_ok()
}

/// Commands for the reader loop, sent over its wakeup channel
pub(crate) enum ReaderCommand {
    /// Start reading a newly opened channel
    Attach {
        channel: Arc<Channel>,
        reader: BoxedReader,
    },
    /// Stop reading a channel that is being closed
    Detach(ChannelId),
    /// Terminate the loop
    Shutdown,
}

struct ReaderSlot {
    channel: Arc<Channel>,
    reader: BoxedReader,
    framer: LineFramer,
    consecutive_eof: u32,
    /// First half of a two-line SMS notification, waiting for its PDU
    sms_header: Option<String>,
}

enum ReadStatus {
    Continue,
    Fatal,
}

/// Run the reader loop until shutdown or a fatal read error
pub(crate) async fn run_reader_loop(
    shared: Arc<InstanceShared>,
    cmd_rx: mpsc::UnboundedReceiver<ReaderCommand>,
) {
    READER_CONTEXT
        .scope((), reader_loop(shared, cmd_rx))
        .await
}

async fn reader_loop(
    shared: Arc<InstanceShared>,
    mut cmd_rx: mpsc::UnboundedReceiver<ReaderCommand>,
) {
    info!("Starting reader loop for modem {}", shared.name);

    let line_capacity = shared.config.line_capacity;
    let mut slots: Vec<ReaderSlot> = Vec::new();
    let mut next_start = 0;

    let reason = loop {
        tokio::select! {
            biased;

            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(ReaderCommand::Attach { channel, reader }) => {
                        debug!("Reader attached to channel {} ({})", channel.id, channel.name);
                        slots.push(ReaderSlot {
                            channel,
                            reader,
                            framer: LineFramer::with_capacity(line_capacity),
                            consecutive_eof: 0,
                            sms_header: None,
                        });
                    }
                    Some(ReaderCommand::Detach(id)) => {
                        debug!("Reader detached from channel {}", id);
                        slots.retain(|slot| slot.channel.id != id);
                    }
                    Some(ReaderCommand::Shutdown) | None => break "shutdown requested",
                }
            }

            (index, result) = poll_readable(&mut slots, &mut next_start), if !slots.is_empty() => {
                let slot = &mut slots[index];
                if let ReadStatus::Fatal = handle_read(&shared, slot, result).await {
                    break "read failure";
                }
            }
        }
    };

    terminate(&shared, reason);
}

/// Wait until any channel's transport yields a read result
///
/// Polling starts after the channel served last so that a chatty channel
/// cannot starve the others.
fn poll_readable<'a>(
    slots: &'a mut [ReaderSlot],
    next_start: &'a mut usize,
) -> impl Future<Output = (usize, io::Result<usize>)> + 'a {
    poll_fn(move |cx| {
        let len = slots.len();
        for offset in 0..len {
            let index = (*next_start + offset) % len;
            let slot = &mut slots[index];
            let mut buf = ReadBuf::new(slot.framer.read_space());

            if let Poll::Ready(result) = Pin::new(&mut slot.reader).poll_read(cx, &mut buf) {
                let n = buf.filled().len();
                *next_start = (index + 1) % len;
                return Poll::Ready((index, result.map(|()| n)));
            }
        }
        Poll::Pending
    })
}

async fn handle_read(
    shared: &InstanceShared,
    slot: &mut ReaderSlot,
    result: io::Result<usize>,
) -> ReadStatus {
    match result {
        Ok(0) => handle_eof(&shared.config.reader, slot).await,
        Ok(n) => {
            slot.consecutive_eof = 0;
            slot.framer.commit(n);
            trace!("Read {} bytes on channel {}", n, slot.channel.id);

            while let Some(line) = slot.framer.next_line() {
                dispatch_line(&shared.config, slot, line).await;
            }
            ReadStatus::Continue
        }
        Err(e) if matches!(e.kind(), ErrorKind::Interrupted | ErrorKind::WouldBlock) => {
            ReadStatus::Continue
        }
        Err(e) => {
            warn!(
                "Read error on channel {} ({}): {}",
                slot.channel.id, slot.channel.name, e
            );
            ReadStatus::Fatal
        }
    }
}

async fn handle_eof(config: &ReaderConfig, slot: &mut ReaderSlot) -> ReadStatus {
    slot.consecutive_eof += 1;
    let count = slot.consecutive_eof;

    if config.max_consecutive_eof.is_some_and(|max| count >= max) {
        warn!(
            "Channel {} ({}) reached end of stream",
            slot.channel.id, slot.channel.name
        );
        return ReadStatus::Fatal;
    }

    if count > config.eof_backoff_threshold {
        debug!(
            "{} consecutive EOFs on channel {}, backing off",
            count, slot.channel.id
        );
        tokio::time::sleep(Duration::from_millis(config.eof_backoff_ms)).await;
    }
    ReadStatus::Continue
}

async fn dispatch_line(config: &EngineConfig, slot: &mut ReaderSlot, line: String) {
    let channel = &slot.channel;
    if !channel.quiet {
        debug!("{} AT< {}", channel.name, line);
    }

    if let Some(header) = slot.sms_header.take() {
        channel.handler.on_unsolicited(&header, Some(&line));
        return;
    }

    if is_sms_unsolicited(&line, &config.reader.sms_unsolicited_prefixes)
        && !channel.awaits_prefixed(&line)
    {
        slot.sms_header = Some(line);
        return;
    }

    match channel.process_line(line) {
        LineOutcome::Unsolicited(line) => channel.handler.on_unsolicited(&line, None),
        LineOutcome::Completed => channel.wake_all(),
        LineOutcome::Recorded => {}
        LineOutcome::WritePdu(pdu) => {
            if !channel.quiet {
                debug!("{} AT> {}^Z", channel.name, pdu);
            }
            match tokio::time::timeout(config.write_timeout(), channel.write_pdu(&pdu)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("Failed to write PDU on channel {}: {}", channel.id, e),
                Err(_) => warn!("PDU write on channel {} stalled", channel.id),
            }
        }
    }
}

/// Mark the instance closed and release everyone waiting on it
fn terminate(shared: &InstanceShared, reason: &str) {
    if !shared.gate.close() {
        debug!("Modem {} was already closed", shared.name);
    }

    let channels: Vec<Arc<Channel>> = shared.registry.read().iter().cloned().collect();
    for channel in &channels {
        channel.wake_all();
    }

    if let Some(handler) = shared.reader_closed_handler() {
        handler.on_reader_closed(&shared.name);
    }

    info!("Reader loop ended for modem {} ({})", shared.name, reason);
}
