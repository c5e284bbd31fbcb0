//! Audit logging of trapped writes.
//!
//! [`AuditLogger`] is a write-trap listener. On the `Before` call it renders
//! the field's current value and parks it in the write event; on the `After`
//! call it renders the new value and emits one line:
//!
//! ```text
//! alice@workstation myrec.VAL 0 -> 3.14159265358979
//! ```

use crate::format::{FormattedValue, ValueFormatter};
use crate::host::{TrapPhase, WriteEvent, WriteTrapListener};
use crate::types::{FieldAddress, WriterIdentity};
use parking_lot::Mutex;
use std::io::{self, Write};
use std::sync::Arc;

/// Builds one audit line, including the trailing newline.
pub fn audit_line(
    writer: &WriterIdentity,
    address: &FieldAddress,
    before: &FormattedValue,
    after: &FormattedValue,
) -> String {
    format!("{} {} {} -> {}\n", writer, address, before, after)
}

/// Write-trap listener that logs old and new values of every trapped write.
pub struct AuditLogger {
    sink: Mutex<Box<dyn Write + Send>>,
}

impl AuditLogger {
    /// Logs to standard output.
    pub fn stdout() -> Self {
        Self::with_sink(io::stdout())
    }

    /// Logs to any writer.
    pub fn with_sink(sink: impl Write + Send + 'static) -> Self {
        Self { sink: Mutex::new(Box::new(sink)) }
    }

    fn render(event: &WriteEvent<'_>) -> FormattedValue {
        match ValueFormatter::new(event.host()).format(event.address()) {
            Ok(value) => value,
            Err(e) => {
                log::warn!("Cannot render {} for audit: {}", event.address(), e);
                FormattedValue::unavailable()
            }
        }
    }

    fn emit(&self, line: &str) {
        let mut sink = self.sink.lock();
        let result = sink.write_all(line.as_bytes()).and_then(|()| sink.flush());
        if let Err(e) = result {
            log::warn!("Dropping audit line: {}", e);
        }
    }
}

impl WriteTrapListener for AuditLogger {
    fn on_write(&self, event: &mut WriteEvent<'_>, phase: TrapPhase) {
        match phase {
            TrapPhase::Before => {
                let before = Self::render(event);
                event.attach(Box::new(before));
            }
            TrapPhase::After => {
                let before = event
                    .take_attachment()
                    .and_then(|value| value.downcast::<FormattedValue>().ok())
                    .map(|value| *value)
                    .unwrap_or_else(|| {
                        log::warn!("No pre-write value recorded for {}", event.address());
                        FormattedValue::unavailable()
                    });
                let after = Self::render(event);
                self.emit(&audit_line(event.writer(), event.address(), &before, &after));
            }
        }
    }
}

/// Cloneable in-memory sink for capturing audit output.
#[derive(Debug, Clone, Default)]
pub struct AuditBuffer {
    data: Arc<Mutex<Vec<u8>>>,
}

impl AuditBuffer {
    /// Creates an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything written so far.
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.data.lock()).into_owned()
    }

    /// Written lines, without terminators.
    pub fn lines(&self) -> Vec<String> {
        self.contents().lines().map(str::to_string).collect()
    }
}

impl Write for AuditBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.data.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
