//! Modem instances
//!
//! A [`ModemInstance`] owns the reader loop task, the channel registry and
//! the mode-change gate for one modem. Channels are opened on it from any
//! byte stream (a serial port, a pty, or an in-memory duplex in tests).

use std::sync::Arc;

use parking_lot::RwLock;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_serial::SerialPortBuilderExt;
use tracing::{info, warn};

use crate::barrier::InstanceGate;
use crate::channel::{Channel, ChannelId, ChannelOptions};
use crate::config::EngineConfig;
use crate::error::AtError;
use crate::handler::{global_reader_closed_handler, ReaderClosedHandler, UnsolicitedHandler};
use crate::health::{HealthTracker, WatchdogSignal};
use crate::issuer::AtChannel;
use crate::reader::{run_reader_loop, ReaderCommand};
use crate::registry::ChannelRegistry;

/// State shared between the instance, its reader loop and its channel handles
pub(crate) struct InstanceShared {
    pub name: String,
    pub config: EngineConfig,
    pub registry: RwLock<ChannelRegistry>,
    pub gate: InstanceGate,
    pub health: HealthTracker,
    reader_tx: mpsc::UnboundedSender<ReaderCommand>,
    reader_closed: Option<Arc<dyn ReaderClosedHandler>>,
}

impl InstanceShared {
    /// The instance's own handler, else the process-wide one
    pub fn reader_closed_handler(&self) -> Option<Arc<dyn ReaderClosedHandler>> {
        self.reader_closed
            .clone()
            .or_else(global_reader_closed_handler)
    }
}

/// Builder for [`ModemInstance`]
pub struct ModemInstanceBuilder {
    name: String,
    config: EngineConfig,
    watchdog: Option<Arc<dyn WatchdogSignal>>,
    reader_closed: Option<Arc<dyn ReaderClosedHandler>>,
}

impl ModemInstanceBuilder {
    /// Use this configuration instead of the defaults
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Report blocked modems to this watchdog
    pub fn watchdog(mut self, watchdog: impl WatchdogSignal + 'static) -> Self {
        self.watchdog = Some(Arc::new(watchdog));
        self
    }

    /// Notify this handler, rather than the process-wide one, when the
    /// reader loop terminates
    pub fn reader_closed_handler(mut self, handler: impl ReaderClosedHandler + 'static) -> Self {
        self.reader_closed = Some(Arc::new(handler));
        self
    }

    /// Spawn the reader loop and return the instance
    ///
    /// Must be called from within a tokio runtime.
    pub fn build(self) -> ModemInstance {
        let (reader_tx, reader_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(InstanceShared {
            registry: RwLock::new(ChannelRegistry::new(self.config.max_channels)),
            gate: InstanceGate::new(),
            health: HealthTracker::new(self.config.health.clone(), self.watchdog),
            name: self.name,
            config: self.config,
            reader_tx,
            reader_closed: self.reader_closed,
        });

        let reader_task = tokio::spawn(run_reader_loop(shared.clone(), reader_rx));

        ModemInstance {
            shared,
            reader_task: Some(reader_task),
        }
    }
}

/// One modem: a reader loop plus the channels it serves
pub struct ModemInstance {
    shared: Arc<InstanceShared>,
    reader_task: Option<JoinHandle<()>>,
}

impl ModemInstance {
    /// Create an instance with default configuration
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(name: impl Into<String>) -> Self {
        Self::builder(name).build()
    }

    /// Start building an instance
    pub fn builder(name: impl Into<String>) -> ModemInstanceBuilder {
        ModemInstanceBuilder {
            name: name.into(),
            config: EngineConfig::default(),
            watchdog: None,
            reader_closed: None,
        }
    }

    /// Instance name
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Active configuration
    pub fn config(&self) -> &EngineConfig {
        &self.shared.config
    }

    /// Bind a byte stream as a channel
    ///
    /// Unsolicited lines arriving on the channel are passed to `handler`.
    pub fn open<T>(
        &self,
        io: T,
        options: ChannelOptions,
        handler: impl UnsolicitedHandler + 'static,
    ) -> Result<AtChannel, AtError>
    where
        T: AsyncRead + AsyncWrite + Send + 'static,
    {
        if self.shared.gate.is_closed() {
            return Err(AtError::ChannelClosed);
        }

        let (reader, writer) = tokio::io::split(io);
        let channel = Arc::new(Channel::new(options, Box::new(writer), Arc::new(handler)));
        self.shared.registry.write().insert(channel.clone())?;

        let attach = ReaderCommand::Attach {
            channel: channel.clone(),
            reader: Box::new(reader),
        };
        if self.shared.reader_tx.send(attach).is_err() {
            self.shared.registry.write().remove(channel.id);
            return Err(AtError::ChannelClosed);
        }

        info!(
            "Opened channel {} ({}) on modem {}",
            channel.id, channel.name, self.shared.name
        );
        Ok(AtChannel {
            channel,
            instance: self.shared.clone(),
        })
    }

    /// Open a serial device and bind it as a channel
    pub fn open_serial(
        &self,
        port: &str,
        baud_rate: u32,
        options: ChannelOptions,
        handler: impl UnsolicitedHandler + 'static,
    ) -> Result<AtChannel, AtError> {
        let stream = tokio_serial::new(port, baud_rate).open_native_async()?;
        self.open(stream, options, handler)
    }

    /// Handle for an open channel
    pub fn channel(&self, id: ChannelId) -> Option<AtChannel> {
        let channel = self.shared.registry.read().get(id)?;
        Some(AtChannel {
            channel,
            instance: self.shared.clone(),
        })
    }

    /// Close one channel
    ///
    /// The channel stops being read, its write half is shut down, and a
    /// command outstanding on it fails with [`AtError::ChannelClosed`].
    pub async fn close(&self, channel: &AtChannel) -> Result<(), AtError> {
        let id = channel.id();
        {
            let mut registry = self.shared.registry.write();
            match registry.get(id) {
                Some(open) if Arc::ptr_eq(&open, &channel.channel) => {}
                _ => return Err(AtError::UnknownChannel(id)),
            }
            registry.remove(id);
        }

        let _ = self.shared.reader_tx.send(ReaderCommand::Detach(id));
        channel.channel.close().await;

        info!("Closed channel {} on modem {}", id, self.shared.name);
        Ok(())
    }

    /// Mark the modem as mid configuration change
    ///
    /// While set, commands on every channel of this instance wait before
    /// writing. Clearing the flag releases all of them.
    pub fn set_mode_changing(&self, changing: bool) {
        self.shared.gate.set_mode_changing(changing);
    }

    /// Whether a mode change is in progress
    pub fn is_mode_changing(&self) -> bool {
        self.shared.gate.is_mode_changing()
    }

    /// Whether the reader loop has terminated
    pub fn is_closed(&self) -> bool {
        self.shared.gate.is_closed()
    }

    /// Stop the reader loop and wait for it to finish
    ///
    /// Outstanding commands on every channel fail with
    /// [`AtError::ChannelClosed`].
    pub async fn shutdown(mut self) {
        let _ = self.shared.reader_tx.send(ReaderCommand::Shutdown);
        if let Some(task) = self.reader_task.take() {
            if let Err(e) = task.await {
                warn!("Reader loop for modem {} failed: {}", self.shared.name, e);
            }
        }
    }
}

impl Drop for ModemInstance {
    fn drop(&mut self) {
        let _ = self.shared.reader_tx.send(ReaderCommand::Shutdown);
    }
}
