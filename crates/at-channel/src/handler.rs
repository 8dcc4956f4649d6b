//! Callback capabilities
//!
//! Collaborators receive asynchronous modem events through two narrow
//! interfaces: an [`UnsolicitedHandler`] bound to each channel when it is
//! opened, and a [`ReaderClosedHandler`] fired when an instance's reader loop
//! terminates. Plain closures implement both.
//!
//! Handlers run on the reader loop. They must not block, and a command issued
//! from inside one fails with [`AtError::InvalidThread`](crate::AtError::InvalidThread);
//! spawn a task instead.

use std::sync::Arc;

use parking_lot::RwLock;

/// Receives lines that are not part of any outstanding command
pub trait UnsolicitedHandler: Send + Sync {
    /// Called with the unsolicited line and, for two-line SMS
    /// notifications, the PDU line that followed it
    fn on_unsolicited(&self, line: &str, sms_pdu: Option<&str>);
}

impl<F> UnsolicitedHandler for F
where
    F: Fn(&str, Option<&str>) + Send + Sync,
{
    fn on_unsolicited(&self, line: &str, sms_pdu: Option<&str>) {
        self(line, sms_pdu)
    }
}

/// Handler that drops every unsolicited line
#[derive(Debug, Clone, Copy, Default)]
pub struct IgnoreUnsolicited;

impl UnsolicitedHandler for IgnoreUnsolicited {
    fn on_unsolicited(&self, _line: &str, _sms_pdu: Option<&str>) {}
}

/// Notified once when a modem instance's reader loop terminates
pub trait ReaderClosedHandler: Send + Sync {
    /// Called with the instance name
    fn on_reader_closed(&self, instance: &str);
}

impl<F> ReaderClosedHandler for F
where
    F: Fn(&str) + Send + Sync,
{
    fn on_reader_closed(&self, instance: &str) {
        self(instance)
    }
}

static READER_CLOSED: RwLock<Option<Arc<dyn ReaderClosedHandler>>> =
    parking_lot::const_rwlock(None);

/// Register the process-wide reader-closed handler, replacing any previous one
///
/// Instances built with their own handler use that instead.
pub fn set_reader_closed_handler(handler: impl ReaderClosedHandler + 'static) {
    *READER_CLOSED.write() = Some(Arc::new(handler));
}

/// Remove the process-wide reader-closed handler
pub fn clear_reader_closed_handler() {
    *READER_CLOSED.write() = None;
}

pub(crate) fn global_reader_closed_handler() -> Option<Arc<dyn ReaderClosedHandler>> {
    READER_CLOSED.read().clone()
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn test_global_registration() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        set_reader_closed_handler(move |_: &str| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let handler = global_reader_closed_handler().unwrap();
        handler.on_reader_closed("modem0");
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        clear_reader_closed_handler();
        assert!(global_reader_closed_handler().is_none());
    }

    #[test]
    fn test_closure_handler() {
        let seen = Arc::new(RwLock::new(Vec::new()));
        let sink = seen.clone();
        let handler = move |line: &str, pdu: Option<&str>| {
            sink.write().push((line.to_string(), pdu.map(str::to_string)));
        };

        handler.on_unsolicited("RING", None);
        handler.on_unsolicited("+CMT: ,23", Some("0791"));
        assert_eq!(
            *seen.read(),
            vec![
                ("RING".to_string(), None),
                ("+CMT: ,23".to_string(), Some("0791".to_string()))
            ]
        );
    }
}
