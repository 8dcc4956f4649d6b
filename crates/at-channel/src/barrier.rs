//! Mode-change barrier
//!
//! An instance-wide gate consulted before every command write. While the
//! modem is marked as mid configuration change, issuers park here; clearing
//! the flag releases all of them at once. Closing the instance also opens the
//! gate so that parked issuers can observe the close.

use tokio::sync::watch;

use crate::error::AtError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct GateState {
    mode_changing: bool,
    closed: bool,
}

pub(crate) struct InstanceGate {
    state: watch::Sender<GateState>,
}

impl InstanceGate {
    pub fn new() -> Self {
        Self {
            state: watch::Sender::new(GateState::default()),
        }
    }

    /// Set or clear the mode-changing flag; clearing wakes every waiter
    pub fn set_mode_changing(&self, changing: bool) {
        self.state.send_if_modified(|state| {
            let modified = state.mode_changing != changing;
            state.mode_changing = changing;
            modified
        });
    }

    pub fn is_mode_changing(&self) -> bool {
        self.state.borrow().mode_changing
    }

    /// Mark the instance closed; returns false if it already was
    pub fn close(&self) -> bool {
        self.state.send_if_modified(|state| {
            let first = !state.closed;
            state.closed = true;
            first
        })
    }

    pub fn is_closed(&self) -> bool {
        self.state.borrow().closed
    }

    /// Resolve once the instance has been closed
    pub async fn closed(&self) {
        let mut rx = self.state.subscribe();
        let _ = rx.wait_for(|s| s.closed).await;
    }

    /// Wait until no mode change is in progress
    pub async fn wait_clear(&self) -> Result<(), AtError> {
        let mut rx = self.state.subscribe();
        let closed = rx
            .wait_for(|s| s.closed || !s.mode_changing)
            .await
            .map(|state| state.closed)
            .map_err(|_| AtError::ChannelClosed)?;

        if closed {
            return Err(AtError::ChannelClosed);
        }
        Ok(())
    }
}
