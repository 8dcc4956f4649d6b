//! Virtual modem simulation
//!
//! A scriptable AT command responder: commands written to it are matched
//! against canned replies, and the resulting bytes are queued exactly as a
//! modem would put them on the wire.

use std::collections::{HashMap, VecDeque};

use at_protocol::{CTRL_Z, SMS_PROMPT};
use serde::{Deserialize, Serialize};
use tracing::debug;

const ESC: u8 = 0x1B;

/// How the modem answers one command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Reply {
    /// Emit these lines; the last one is normally the final result
    Lines(Vec<String>),
    /// Never answer
    Silent,
    /// Emit the `"> "` prompt, take a PDU up to Ctrl-Z, then emit `then`
    SmsPrompt {
        /// Lines emitted once the PDU has been received
        then: Vec<String>,
    },
}

impl Reply {
    /// Bare `OK`
    pub fn ok() -> Self {
        Self::Lines(vec!["OK".to_string()])
    }

    /// Bare `ERROR`
    pub fn error() -> Self {
        Self::Lines(vec!["ERROR".to_string()])
    }

    /// `+CME ERROR: <code>`
    pub fn cme_error(code: u32) -> Self {
        Self::Lines(vec![format!("+CME ERROR: {}", code)])
    }

    /// The given lines followed by `OK`
    pub fn data<S: AsRef<str>>(lines: &[S]) -> Self {
        let mut lines: Vec<String> = lines.iter().map(|l| l.as_ref().to_string()).collect();
        lines.push("OK".to_string());
        Self::Lines(lines)
    }
}

/// Something the modem received, as reported to observers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModemInput {
    /// A complete command line
    Command(String),
    /// An SMS PDU terminated by Ctrl-Z
    Pdu(String),
}

/// Scripted reply for one command
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptedReply {
    /// Exact command text, without terminator
    pub command: String,
    /// Reply to emit
    pub reply: Reply,
}

/// Configuration for creating a virtual modem
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VirtualModemConfig {
    /// Display name/identifier
    pub id: String,
    /// Whether commands are echoed back initially
    pub echo: bool,
    /// Canned replies
    pub replies: Vec<ScriptedReply>,
}

impl Default for VirtualModemConfig {
    fn default() -> Self {
        Self {
            id: "Virtual Modem".to_string(),
            echo: false,
            replies: Vec::new(),
        }
    }
}

/// A simulated modem that answers AT commands from a script
#[derive(Debug)]
pub struct VirtualModem {
    id: String,
    echo: bool,
    replies: HashMap<String, Reply>,
    /// Partial command line
    line: Vec<u8>,
    /// Set while collecting a PDU; holds the lines to emit after it
    pdu_reply: Option<Vec<String>>,
    pdu: Vec<u8>,
    pending_output: VecDeque<Vec<u8>>,
    received: Vec<String>,
    received_pdus: Vec<String>,
}

impl VirtualModem {
    /// Create a virtual modem that only knows the built-in commands
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            echo: false,
            replies: HashMap::new(),
            line: Vec::new(),
            pdu_reply: None,
            pdu: Vec::new(),
            pending_output: VecDeque::new(),
            received: Vec::new(),
            received_pdus: Vec::new(),
        }
    }

    /// Create from configuration
    pub fn from_config(config: VirtualModemConfig) -> Self {
        let mut modem = Self::new(config.id);
        modem.echo = config.echo;
        for scripted in config.replies {
            modem.set_reply(scripted.command, scripted.reply);
        }
        modem
    }

    /// Get the modem ID
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Whether commands are echoed
    pub fn echo(&self) -> bool {
        self.echo
    }

    /// Set the reply for a command, replacing any previous one
    pub fn set_reply(&mut self, command: impl Into<String>, reply: Reply) {
        self.replies.insert(command.into(), reply);
    }

    /// Commands received so far, in order
    pub fn received_commands(&self) -> &[String] {
        &self.received
    }

    /// PDUs received so far, in order
    pub fn received_pdus(&self) -> &[String] {
        &self.received_pdus
    }

    /// Whether the modem is waiting for a PDU after its prompt
    pub fn awaiting_pdu(&self) -> bool {
        self.pdu_reply.is_some()
    }

    /// Feed bytes written by the host
    pub fn process_input(&mut self, data: &[u8]) -> Vec<ModemInput> {
        let mut inputs = Vec::new();

        for &byte in data {
            if let Some(then) = self.pdu_reply.as_ref() {
                match byte {
                    CTRL_Z => {
                        let then = then.clone();
                        let pdu = String::from_utf8_lossy(&self.pdu).into_owned();
                        self.pdu.clear();
                        self.pdu_reply = None;

                        debug!("Virtual modem {} received PDU {}", self.id, pdu);
                        self.received_pdus.push(pdu.clone());
                        inputs.push(ModemInput::Pdu(pdu));
                        self.queue_lines(&then);
                    }
                    ESC => {
                        self.pdu.clear();
                        self.pdu_reply = None;
                        self.queue_line("OK");
                    }
                    b'\r' | b'\n' => {}
                    _ => self.pdu.push(byte),
                }
                continue;
            }

            match byte {
                b'\r' => {
                    let command = String::from_utf8_lossy(&self.line).trim().to_string();
                    self.line.clear();
                    if !command.is_empty() {
                        self.handle_command(&command);
                        inputs.push(ModemInput::Command(command));
                    }
                }
                b'\n' => {}
                _ => self.line.push(byte),
            }
        }

        inputs
    }

    fn handle_command(&mut self, command: &str) {
        debug!("Virtual modem {} received {}", self.id, command);
        self.received.push(command.to_string());

        if self.echo {
            self.pending_output.push_back(format!("{}\r", command).into_bytes());
        }

        let reply = match self.replies.get(command) {
            Some(reply) => reply.clone(),
            None => self.builtin_reply(command),
        };

        match reply {
            Reply::Lines(lines) => self.queue_lines(&lines),
            Reply::Silent => {}
            Reply::SmsPrompt { then } => {
                self.pending_output
                    .push_back(format!("\r\n{}", SMS_PROMPT).into_bytes());
                self.pdu_reply = Some(then);
            }
        }
    }

    fn builtin_reply(&mut self, command: &str) -> Reply {
        if command == "AT" {
            return Reply::ok();
        }
        if let Some(rest) = command.strip_prefix("ATE") {
            // ATE0 / ATE1, optionally followed by more settings
            self.echo = !rest.starts_with('0');
            return Reply::ok();
        }
        Reply::error()
    }

    /// Queue an unsolicited line
    pub fn emit_unsolicited(&mut self, line: &str) {
        self.queue_line(line);
    }

    /// Queue a two-line SMS notification
    pub fn emit_sms_unsolicited(&mut self, header: &str, pdu: &str) {
        self.queue_line(header);
        self.queue_line(pdu);
    }

    fn queue_lines(&mut self, lines: &[String]) {
        for line in lines {
            self.queue_line(line);
        }
    }

    fn queue_line(&mut self, line: &str) {
        self.pending_output
            .push_back(format!("\r\n{}\r\n", line).into_bytes());
    }

    /// Take pending output bytes
    pub fn take_output(&mut self) -> Option<Vec<u8>> {
        self.pending_output.pop_front()
    }

    /// Check if there is pending output
    pub fn has_output(&self) -> bool {
        !self.pending_output.is_empty()
    }
}
