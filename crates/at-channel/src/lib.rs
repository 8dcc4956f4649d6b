//! AT Channel Engine
//!
//! This crate runs command/response transactions against cellular modems
//! that speak the AT command language over one or more byte streams.
//!
//! # Architecture
//!
//! - A [`ModemInstance`] owns one reader task that reads all of the modem's
//!   channels, frames their bytes into lines and routes each line.
//! - Each open channel is driven through an [`AtChannel`] handle. A call such
//!   as [`AtChannel::send`] writes one command and waits until the reader
//!   task has seen its final response (`OK`, `ERROR`, `+CME ERROR: ...`).
//! - Lines that belong to no outstanding command are passed to the channel's
//!   [`UnsolicitedHandler`]. Two-line SMS notifications arrive with their PDU.
//! - Consecutive timeouts are counted per channel and escalated to a
//!   [`WatchdogSignal`] past a threshold.
//! - [`ModemInstance::set_mode_changing`] holds back new commands on every
//!   channel while the modem is being reconfigured.
//!
//! # Example
//!
//! ```rust,no_run
//! use at_channel::{AtRequest, ChannelId, ChannelOptions, ModemInstance};
//!
//! # async fn run() -> Result<(), at_channel::AtError> {
//! let modem = ModemInstance::new("modem0");
//! let channel = modem.open_serial(
//!     "/dev/ttyUSB2",
//!     115_200,
//!     ChannelOptions::new(ChannelId(0)).with_name("at"),
//!     |line: &str, _pdu: Option<&str>| println!("unsolicited: {line}"),
//! )?;
//!
//! channel.handshake().await?;
//! let csq = channel.command_singleline("AT+CSQ", "+CSQ:").await?;
//! println!("{:?}", csq.first_line());
//!
//! let request = AtRequest::multiline("AT+COPS=?", "+COPS:")
//!     .with_timeout(std::time::Duration::from_secs(120));
//! if let Some(response) = channel.send(request).await? {
//!     for line in response.lines() {
//!         println!("{line}");
//!     }
//! }
//!
//! modem.shutdown().await;
//! # Ok(())
//! # }
//! ```

mod barrier;
mod channel;
mod instance;
mod issuer;
mod reader;
mod registry;

pub mod config;
pub mod error;
pub mod handler;
pub mod health;
pub mod response;

pub use at_protocol::ResponseShape;
pub use channel::{ChannelId, ChannelOptions};
pub use config::{EngineConfig, HandshakeConfig, HealthConfig, ReaderConfig};
pub use error::AtError;
pub use handler::{
    clear_reader_closed_handler, set_reader_closed_handler, IgnoreUnsolicited,
    ReaderClosedHandler, UnsolicitedHandler,
};
pub use health::{WatchdogSignal, WriterWatchdog, BLOCKED_SIGNAL};
pub use instance::{ModemInstance, ModemInstanceBuilder};
pub use issuer::{AtChannel, AtRequest};
pub use response::{CmeError, Response};
