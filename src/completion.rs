//! Asynchronous completion tokens.
//!
//! Device support that finishes work off the scan thread creates a
//! [`CompletionToken`] up front and hands it back through
//! [`crate::Bridge::signal_completion`] when done. Signalling moves the
//! native descriptor to the host scheduler, so a token can be signalled at
//! most once. A token that is never signalled releases its descriptor when
//! dropped.

use crate::error::{Error, Result};
use crate::host::{CallbackDescriptor, DatabaseHost, Priority};

/// Handle for one pending asynchronous completion.
#[derive(Debug)]
pub struct CompletionToken {
    owner: u64,
    descriptor: CallbackDescriptor,
}

impl CompletionToken {
    pub(crate) fn new(owner: u64) -> Self {
        Self { owner, descriptor: CallbackDescriptor::new() }
    }

    /// Unique id of the underlying descriptor.
    pub fn id(&self) -> u64 {
        self.descriptor.id()
    }

    /// Queues completion processing of `record` at `priority`.
    pub(crate) fn signal(
        self,
        owner: u64,
        host: &dyn DatabaseHost,
        priority: Priority,
        record: &str,
    ) -> Result<()> {
        if self.owner != owner {
            return Err(Error::InvalidToken);
        }
        let handle = host
            .record_handle(record)
            .ok_or_else(|| Error::UnknownRecord(record.to_string()))?;

        let mut descriptor = self.descriptor;
        let id = descriptor.id();
        descriptor.arm(priority, handle);
        host.request_callback(descriptor)
            .map_err(|status| Error::CallbackFailed { status: status.code })?;
        log::debug!("Completion {} queued for {} at {:?}", id, record, priority);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::MemoryHost;
    use std::time::{Duration, Instant};

    fn host() -> MemoryHost {
        MemoryHost::builder()
            .standard_record_types()
            .record("dev", "ai")
            .build()
            .unwrap()
    }

    fn wait_for(host: &MemoryHost, name: &str, count: u64) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if host.completions(name) == Some(count) {
                return true;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        false
    }

    #[test]
    fn test_signal_reaches_host() {
        let host = host();
        let token = CompletionToken::new(1);
        token.signal(1, &host, Priority::High, "dev").unwrap();
        assert!(wait_for(&host, "dev", 1));
    }

    #[test]
    fn test_foreign_token_rejected() {
        let host = host();
        let token = CompletionToken::new(1);
        assert!(matches!(token.signal(2, &host, Priority::Low, "dev"), Err(Error::InvalidToken)));
        assert_eq!(host.completions("dev"), Some(0));
    }

    #[test]
    fn test_unknown_record() {
        let host = host();
        let token = CompletionToken::new(1);
        assert!(matches!(
            token.signal(1, &host, Priority::Low, "nowhere"),
            Err(Error::UnknownRecord(_))
        ));
    }

    #[test]
    fn test_ids_differ() {
        assert_ne!(CompletionToken::new(1).id(), CompletionToken::new(1).id());
    }
}
