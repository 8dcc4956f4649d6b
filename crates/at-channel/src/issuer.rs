//! Command issuing
//!
//! [`AtChannel`] is the caller-facing handle of one open channel. Each call
//! runs one transaction: install the expected response shape, wait out any
//! mode change, write the command, then wait for the reader loop to deliver
//! the final response (or for the deadline, or for the instance to close).

use std::io::ErrorKind;
use std::sync::Arc;
use std::time::Duration;

use at_protocol::ResponseShape;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::channel::{Channel, ChannelId};
use crate::error::AtError;
use crate::health::HealthEvent;
use crate::instance::InstanceShared;
use crate::reader::in_reader_context;
use crate::response::Response;

/// One command to send, with the shape of response it expects
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AtRequest {
    /// Command text, without terminator
    pub command: String,
    /// Expected response shape
    pub shape: ResponseShape,
    /// Prefix of the expected intermediate lines
    pub prefix: Option<String>,
    /// PDU to write when the modem prompts with `"> "`
    pub sms_pdu: Option<String>,
    /// Deadline for the final response; falls back to the engine default
    pub timeout: Option<Duration>,
    /// Whether the caller wants the response back
    pub want_response: bool,
}

impl AtRequest {
    /// A command that returns only a final result, e.g. `ATE0`
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            shape: ResponseShape::NoResult,
            prefix: None,
            sms_pdu: None,
            timeout: None,
            want_response: true,
        }
    }

    /// A command answered by one line starting with a digit, e.g. `AT+CGSN`
    pub fn numeric(command: impl Into<String>) -> Self {
        Self {
            shape: ResponseShape::Numeric,
            ..Self::new(command)
        }
    }

    /// A command answered by one line carrying `prefix`
    pub fn singleline(command: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            shape: ResponseShape::SingleLine,
            prefix: Some(prefix.into()),
            ..Self::new(command)
        }
    }

    /// A command answered by any number of lines
    ///
    /// Lines carrying `prefix`, or containing no `:`, are collected.
    pub fn multiline(command: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            shape: ResponseShape::MultiLine,
            prefix: Some(prefix.into()),
            ..Self::new(command)
        }
    }

    /// An SMS submission: `pdu` is written after the modem's `"> "` prompt
    pub fn sms(
        command: impl Into<String>,
        pdu: impl Into<String>,
        prefix: impl Into<String>,
    ) -> Self {
        Self {
            sms_pdu: Some(pdu.into()),
            ..Self::singleline(command, prefix)
        }
    }

    /// Set the deadline for the final response
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Discard the response once the command completes
    pub fn without_response(mut self) -> Self {
        self.want_response = false;
        self
    }
}

/// Handle for issuing commands on one open channel
///
/// Cheap to clone. At most one command may be outstanding per channel; a
/// concurrent second call fails with [`AtError::CommandPending`].
#[derive(Clone)]
pub struct AtChannel {
    pub(crate) channel: Arc<Channel>,
    pub(crate) instance: Arc<InstanceShared>,
}

impl AtChannel {
    /// Channel id
    pub fn id(&self) -> ChannelId {
        self.channel.id
    }

    /// Display name
    pub fn name(&self) -> &str {
        &self.channel.name
    }

    /// Whether the channel or its instance has been closed
    pub fn is_closed(&self) -> bool {
        self.channel.is_closed() || self.instance.gate.is_closed()
    }

    /// Send a command and wait for its final response
    ///
    /// Returns `None` when the request was built with
    /// [`without_response`](AtRequest::without_response). A response whose
    /// final line is an error (`ERROR`, `+CME ERROR: ...`) is still `Ok`;
    /// check [`Response::is_success`].
    pub async fn send(&self, request: AtRequest) -> Result<Option<Response>, AtError> {
        let response = self.transact(&request, true).await?;
        Ok(request.want_response.then_some(response))
    }

    /// Send a command that returns only a final result
    pub async fn command(&self, command: &str) -> Result<Response, AtError> {
        self.transact(&AtRequest::new(command), true).await
    }

    /// Send a command answered by one numeric line
    pub async fn command_numeric(&self, command: &str) -> Result<Response, AtError> {
        self.transact(&AtRequest::numeric(command), true).await
    }

    /// Send a command answered by one prefixed line
    pub async fn command_singleline(
        &self,
        command: &str,
        prefix: &str,
    ) -> Result<Response, AtError> {
        self.transact(&AtRequest::singleline(command, prefix), true).await
    }

    /// Send a command answered by several lines
    pub async fn command_multiline(
        &self,
        command: &str,
        prefix: &str,
    ) -> Result<Response, AtError> {
        self.transact(&AtRequest::multiline(command, prefix), true).await
    }

    /// Submit an SMS PDU
    pub async fn command_sms(
        &self,
        command: &str,
        pdu: &str,
        prefix: &str,
    ) -> Result<Response, AtError> {
        self.transact(&AtRequest::sms(command, pdu, prefix), true).await
    }

    /// Confirm a freshly opened channel is answering
    ///
    /// Sends the configured liveness command up to the configured number of
    /// times; any final response counts as alive. Handshake timeouts do not
    /// count toward health escalation.
    pub async fn handshake(&self) -> Result<(), AtError> {
        let config = &self.instance.config.handshake;
        let pause = Duration::from_millis(config.timeout_ms);
        let request = AtRequest::new(config.command.as_str()).with_timeout(pause);

        for attempt in 1..=config.retries.max(1) {
            match self.transact(&request, false).await {
                Ok(_) => {
                    debug!("Handshake on {} succeeded (attempt {})", self.name(), attempt);
                    // Give the modem time to settle before real traffic
                    tokio::time::sleep(pause).await;
                    return Ok(());
                }
                Err(AtError::Timeout) => {
                    debug!("Handshake attempt {} on {} timed out", attempt, self.name());
                }
                Err(e) => return Err(e),
            }
        }
        Err(AtError::Timeout)
    }

    async fn transact(&self, request: &AtRequest, track_health: bool) -> Result<Response, AtError> {
        if in_reader_context() {
            return Err(AtError::InvalidThread);
        }

        let result = self.exchange(request).await;

        if track_health {
            self.instance.health.record(
                &self.channel.timeouts,
                self.channel.id,
                &request.command,
                HealthEvent::from_result(&result),
            );
        }
        result
    }

    async fn exchange(&self, request: &AtRequest) -> Result<Response, AtError> {
        let channel = &self.channel;
        if self.is_closed() {
            return Err(AtError::ChannelClosed);
        }

        channel.begin(request)?;
        let _pending = PendingGuard(channel);

        tokio::select! {
            result = self.instance.gate.wait_clear() => result?,
            _ = channel.closed() => return Err(AtError::ChannelClosed),
        }

        let deadline = request
            .timeout
            .or_else(|| self.instance.config.default_timeout())
            .map(|timeout| Instant::now() + timeout);
        self.write_command(request, deadline).await?;

        loop {
            // Registered before the checks so a wakeup in between is not lost
            let notified = channel.notify.notified();

            if let Some(response) = channel.take_completed() {
                return check_shape(request.shape, response);
            }
            if self.is_closed() {
                return Err(AtError::ChannelClosed);
            }

            match deadline {
                Some(deadline) => {
                    if tokio::time::timeout_at(deadline, notified).await.is_err() {
                        debug!("{} timed out waiting for {}", channel.name, request.command);
                        return Err(AtError::Timeout);
                    }
                }
                None => notified.await,
            }
        }
    }

    /// Write the command, treating a write that stalls past the write
    /// timeout (or the command deadline, if sooner) as a blocked modem
    async fn write_command(
        &self,
        request: &AtRequest,
        deadline: Option<Instant>,
    ) -> Result<(), AtError> {
        let channel = &self.channel;
        let mut write_deadline = Instant::now() + self.instance.config.write_timeout();
        if let Some(deadline) = deadline {
            write_deadline = write_deadline.min(deadline);
        }

        if !channel.quiet {
            debug!("{} AT> {}", channel.name, request.command);
        }
        let write = channel.write_command(&request.command);
        let written = tokio::select! {
            written = tokio::time::timeout_at(write_deadline, write) => written,
            _ = channel.closed() => return Err(AtError::ChannelClosed),
            _ = self.instance.gate.closed() => return Err(AtError::ChannelClosed),
        };

        match written {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) if channel.is_closed() => Err(AtError::ChannelClosed),
            Ok(Err(e)) if e.kind() == ErrorKind::WouldBlock => Err(AtError::ModemBlocked),
            Ok(Err(e)) => Err(AtError::Io(e)),
            Err(_) => {
                warn!("{} write of {} stalled", channel.name, request.command);
                Err(AtError::ModemBlocked)
            }
        }
    }
}

/// Clears the channel's pending command on every exit path, including
/// cancellation of the issuing future
struct PendingGuard<'a>(&'a Channel);

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.0.finish();
    }
}

fn check_shape(shape: ResponseShape, response: Response) -> Result<Response, AtError> {
    let needs_line = matches!(shape, ResponseShape::Numeric | ResponseShape::SingleLine);
    if response.is_success() && needs_line && response.lines().is_empty() {
        return Err(AtError::InvalidResponse);
    }
    Ok(response)
}
