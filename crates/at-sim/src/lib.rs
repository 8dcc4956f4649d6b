//! AT Modem Simulation Library
//!
//! This crate provides a simulated modem for exercising AT command channels
//! without hardware. It includes:
//!
//! - **VirtualModem**: answers commands from a script, including the `"> "`
//!   SMS prompt protocol, and emits unsolicited lines on demand
//! - **run_virtual_modem_task**: serves a `VirtualModem` over any async
//!   byte stream
//!
//! # Example
//!
//! ```rust
//! use at_sim::{Reply, VirtualModem};
//!
//! let mut modem = VirtualModem::new("SIM7600");
//! modem.set_reply("AT+CSQ", Reply::data(&["+CSQ: 17,99"]));
//!
//! modem.process_input(b"AT+CSQ\r");
//! while let Some(bytes) = modem.take_output() {
//!     println!("Modem output: {:?}", String::from_utf8_lossy(&bytes));
//! }
//! ```

pub mod modem;
pub mod task;

pub use modem::{ModemInput, Reply, ScriptedReply, VirtualModem, VirtualModemConfig};
pub use task::{run_virtual_modem_task, VirtualModemCommand};
