//! Channel state
//!
//! A channel is one command lane bound to one transport. Its mutable state
//! (the outstanding command and the response being accumulated for it) sits
//! behind a short-lived mutex that is never held across an `.await`; the
//! paired [`Notify`] plays the role of the condition variable the issuer waits
//! on.

use std::fmt;
use std::io;
use std::sync::atomic::AtomicU32;
use std::sync::Arc;

use at_protocol::{classify, Expectation, LineClass, ResponseShape, COMMAND_TERMINATOR, CTRL_Z};
use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::{watch, Notify};

use crate::error::AtError;
use crate::handler::UnsolicitedHandler;
use crate::issuer::AtRequest;
use crate::response::Response;

pub(crate) type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
pub(crate) type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Numeric identity of a channel within its modem instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId(pub u32);

impl ChannelId {
    /// Get the raw id value
    pub fn as_u32(&self) -> u32 {
        self.0
    }

    pub(crate) fn index(&self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Options for opening a channel
#[derive(Debug, Clone)]
pub struct ChannelOptions {
    /// Registry slot for the channel
    pub id: ChannelId,
    /// Name used in log output
    pub name: Option<String>,
    /// Suppress per-line logging
    pub quiet: bool,
}

impl ChannelOptions {
    /// Options for the given channel id
    pub fn new(id: ChannelId) -> Self {
        Self {
            id,
            name: None,
            quiet: false,
        }
    }

    /// Set the display name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Do not log traffic on this channel
    pub fn quiet(mut self) -> Self {
        self.quiet = true;
        self
    }
}

/// The command currently outstanding on a channel
#[derive(Debug)]
pub(crate) struct PendingCommand {
    pub shape: ResponseShape,
    pub prefix: Option<String>,
    pub sms_pdu: Option<String>,
    pub response: Response,
    pub finished: bool,
}

impl PendingCommand {
    fn new(request: &AtRequest) -> Self {
        Self {
            shape: request.shape,
            prefix: request.prefix.clone(),
            sms_pdu: request.sms_pdu.clone(),
            response: Response::default(),
            finished: false,
        }
    }

    fn expectation(&self) -> Expectation<'_> {
        Expectation {
            shape: self.shape,
            prefix: self.prefix.as_deref(),
            has_intermediate: !self.response.lines.is_empty(),
            pdu_pending: self.sms_pdu.is_some(),
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct ChannelState {
    pub pending: Option<PendingCommand>,
}

/// What the reader loop must do after a line has been classified
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum LineOutcome {
    /// Deliver to the unsolicited handler
    Unsolicited(String),
    /// The outstanding command has its final response; wake the issuer
    Completed,
    /// Recorded as intermediate data
    Recorded,
    /// Write the PDU in response to the prompt
    WritePdu(String),
}

pub(crate) struct Channel {
    pub id: ChannelId,
    pub name: String,
    pub quiet: bool,
    pub state: Mutex<ChannelState>,
    pub notify: Notify,
    pub handler: Arc<dyn UnsolicitedHandler>,
    /// Consecutive timeouts, read by the health tracker
    pub timeouts: AtomicU32,
    writer: tokio::sync::Mutex<Option<BoxedWriter>>,
    closed: watch::Sender<bool>,
}

impl Channel {
    pub fn new(
        options: ChannelOptions,
        writer: BoxedWriter,
        handler: Arc<dyn UnsolicitedHandler>,
    ) -> Self {
        let name = options
            .name
            .unwrap_or_else(|| format!("channel{}", options.id));
        Self {
            id: options.id,
            name,
            quiet: options.quiet,
            state: Mutex::new(ChannelState::default()),
            notify: Notify::new(),
            handler,
            timeouts: AtomicU32::new(0),
            writer: tokio::sync::Mutex::new(Some(writer)),
            closed: watch::Sender::new(false),
        }
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    /// Resolve once the channel has been closed
    pub async fn closed(&self) {
        let mut rx = self.closed.subscribe();
        // The sender lives as long as `self`, so this only returns once closed
        let _ = rx.wait_for(|closed| *closed).await;
    }

    /// Install a new outstanding command
    pub fn begin(&self, request: &AtRequest) -> Result<(), AtError> {
        let mut state = self.state.lock();
        if state.pending.is_some() {
            return Err(AtError::CommandPending);
        }
        state.pending = Some(PendingCommand::new(request));
        Ok(())
    }

    /// Take the response once the final line has arrived
    pub fn take_completed(&self) -> Option<Response> {
        let mut state = self.state.lock();
        match state.pending.as_mut() {
            Some(pending) if pending.finished => Some(std::mem::take(&mut pending.response)),
            _ => None,
        }
    }

    /// Clear the outstanding command slot
    pub fn finish(&self) {
        self.state.lock().pending = None;
    }

    /// Whether the outstanding command is waiting for a line with this prefix
    pub fn awaits_prefixed(&self, line: &str) -> bool {
        let state = self.state.lock();
        match state.pending.as_ref() {
            Some(pending) if !pending.finished => pending
                .prefix
                .as_deref()
                .is_some_and(|prefix| !prefix.is_empty() && line.starts_with(prefix)),
            _ => false,
        }
    }

    /// Apply one framed line to the channel state
    pub fn process_line(&self, line: String) -> LineOutcome {
        let mut state = self.state.lock();
        let Some(pending) = state.pending.as_mut().filter(|p| !p.finished) else {
            return LineOutcome::Unsolicited(line);
        };

        let class = classify(&line, Some(&pending.expectation()));
        match class {
            LineClass::Final { success } => {
                pending.response.success = success;
                pending.response.final_response = line;
                pending.finished = true;
                LineOutcome::Completed
            }
            LineClass::SmsPrompt => match pending.sms_pdu.take() {
                Some(pdu) => LineOutcome::WritePdu(pdu),
                None => LineOutcome::Unsolicited(line),
            },
            LineClass::Intermediate => {
                pending.response.lines.push(line);
                LineOutcome::Recorded
            }
            LineClass::Unsolicited => LineOutcome::Unsolicited(line),
        }
    }

    /// Write a command followed by the line terminator
    pub async fn write_command(&self, command: &str) -> io::Result<()> {
        let mut data = Vec::with_capacity(command.len() + COMMAND_TERMINATOR.len());
        data.extend_from_slice(command.as_bytes());
        data.extend_from_slice(COMMAND_TERMINATOR);
        self.write_raw(&data).await
    }

    /// Write an SMS PDU followed by Ctrl-Z
    pub async fn write_pdu(&self, pdu: &str) -> io::Result<()> {
        let mut data = Vec::with_capacity(pdu.len() + 1);
        data.extend_from_slice(pdu.as_bytes());
        data.push(CTRL_Z);
        self.write_raw(&data).await
    }

    async fn write_raw(&self, mut data: &[u8]) -> io::Result<()> {
        let mut guard = self.writer.lock().await;
        let writer = guard
            .as_mut()
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotConnected))?;

        while !data.is_empty() {
            match writer.write(data).await {
                Ok(0) => return Err(io::Error::from(io::ErrorKind::WriteZero)),
                Ok(n) => data = &data[n..],
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        writer.flush().await
    }

    /// Mark closed and shut down the write half
    pub async fn close(&self) {
        self.closed.send_replace(true);
        if let Some(mut writer) = self.writer.lock().await.take() {
            let _ = writer.shutdown().await;
        }
        self.wake_all();
    }

    /// Broadcast to every task waiting on this channel
    pub fn wake_all(&self) {
        let _state = self.state.lock();
        self.notify.notify_waiters();
    }
}
