//! Virtual modem actor task
//!
//! Owns a [`VirtualModem`] and serves it over an async stream. The task uses
//! a select! loop to:
//! - Read host bytes from the stream and write the modem's replies back
//! - Inject unsolicited lines and script changes sent over a channel
//! - Report received commands and PDUs on a broadcast channel

use std::io;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use crate::modem::{ModemInput, Reply, VirtualModem};

/// Commands that can be sent to a virtual modem actor
#[derive(Debug, Clone)]
pub enum VirtualModemCommand {
    /// Emit an unsolicited line
    Unsolicited(String),
    /// Emit a two-line SMS notification
    SmsUnsolicited {
        /// Notification line, e.g. `+CMT: ,23`
        header: String,
        /// PDU line
        pdu: String,
    },
    /// Change the reply for a command
    SetReply {
        /// Exact command text
        command: String,
        /// New reply
        reply: Reply,
    },
    /// Shutdown the virtual modem actor
    Shutdown,
}

/// Run the virtual modem actor task
///
/// Returns when the stream closes, on shutdown, or when the command channel
/// is dropped.
pub async fn run_virtual_modem_task<S>(
    mut stream: S,
    mut modem: VirtualModem,
    mut cmd_rx: mpsc::Receiver<VirtualModemCommand>,
    event_tx: broadcast::Sender<ModemInput>,
) -> io::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut buf = [0u8; 1024];

    info!("Starting virtual modem task for {}", modem.id());

    loop {
        tokio::select! {
            result = stream.read(&mut buf) => {
                match result {
                    Ok(0) => {
                        debug!("Virtual modem stream closed for {}", modem.id());
                        break;
                    }
                    Ok(n) => {
                        for input in modem.process_input(&buf[..n]) {
                            let _ = event_tx.send(input);
                        }
                        write_output(&mut stream, &mut modem).await?;
                    }
                    Err(e) => {
                        warn!("Virtual modem {} stream error: {}", modem.id(), e);
                        return Err(e);
                    }
                }
            }

            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(VirtualModemCommand::Unsolicited(line)) => {
                        modem.emit_unsolicited(&line);
                        write_output(&mut stream, &mut modem).await?;
                    }
                    Some(VirtualModemCommand::SmsUnsolicited { header, pdu }) => {
                        modem.emit_sms_unsolicited(&header, &pdu);
                        write_output(&mut stream, &mut modem).await?;
                    }
                    Some(VirtualModemCommand::SetReply { command, reply }) => {
                        modem.set_reply(command, reply);
                    }
                    Some(VirtualModemCommand::Shutdown) => {
                        info!("Shutdown requested for virtual modem {}", modem.id());
                        break;
                    }
                    None => {
                        debug!("Command channel closed for virtual modem {}", modem.id());
                        break;
                    }
                }
            }
        }
    }

    info!("Virtual modem task ended for {}", modem.id());
    Ok(())
}

async fn write_output<S>(stream: &mut S, modem: &mut VirtualModem) -> io::Result<()>
where
    S: AsyncWrite + Unpin,
{
    while let Some(bytes) = modem.take_output() {
        stream.write_all(&bytes).await?;
    }
    stream.flush().await
}
