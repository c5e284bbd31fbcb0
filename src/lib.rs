//! # iocbridge - Field Access Bridge for a Record Database Host
//!
//! iocbridge connects a Lua scripting runtime to a real-time, record-oriented
//! process database. Records are named, typed and fixed-layout; their fields
//! can be read and written by scripts, written by external clients, and
//! completed asynchronously by host worker threads.
//!
//! ## Architecture
//!
//! - **FieldCatalog**: field offsets, sizes and declared types per record type
//! - **FieldAccessor**: named-field get and put under the lock discipline
//! - **ValueFormatter**: display rendering with full float precision
//! - **AuditLogger**: one log line per trapped write, old and new value
//! - **CompletionToken**: one-shot handle for asynchronous completion
//! - **ExecutionLock**: the scripting runtime's global lock
//!
//! ## Lock discipline
//!
//! Script code holds the [`ExecutionLock`]. Host workers hold a record lock
//! and may then need the execution lock. The bridge therefore releases the
//! execution lock around every host call that can take a record lock.
//!
//! ## Example Usage
//!
//! ```rust
//! use iocbridge::host::MemoryHost;
//! use iocbridge::wire::WireType;
//! use iocbridge::{Bridge, BridgeOptions};
//! use std::sync::Arc;
//!
//! # fn main() -> Result<(), iocbridge::Error> {
//! let host = MemoryHost::builder()
//!     .standard_record_types()
//!     .record("myrec", "ao")
//!     .build()?;
//! let bridge = Bridge::new(Arc::new(host), BridgeOptions::new().writer("alice", "workstation"))?;
//!
//! let fields = bridge.lookup_named_fields("ao", &["VAL", "PREC"]);
//! assert_eq!(fields.len(), 2);
//!
//! bridge.put_field("myrec.VAL", WireType::Double, &2.5f64.to_ne_bytes(), 1)?;
//! let mut buf = [0u8; 8];
//! bridge.get_field("myrec.VAL", WireType::Double, &mut buf, 1)?;
//! assert_eq!(f64::from_ne_bytes(buf), 2.5);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

// Module declarations
pub mod accessor;
pub mod audit;
pub mod catalog;
pub mod completion;
pub mod config;
pub mod error;
pub mod format;
pub mod host;
pub mod lock;
pub mod script;
pub mod types;
pub mod wire;

// Re-exports
pub use accessor::FieldAccessor;
pub use audit::AuditLogger;
pub use catalog::{FieldCatalog, FieldMap};
pub use completion::CompletionToken;
pub use config::BridgeOptions;
pub use error::{Error, Result};
pub use format::{FormattedValue, ValueFormatter};
pub use host::{DatabaseHost, Priority};
pub use lock::ExecutionLock;
pub use types::{FieldDescriptor, FieldType, FieldTypeMap, WriterIdentity};

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use wire::{DbrValue, WireType};

static NEXT_BRIDGE_ID: AtomicU64 = AtomicU64::new(1);

/// Installs `env_logger` with `info` as the default filter.
///
/// Safe to call more than once; later calls are ignored.
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .is_test(cfg!(test))
        .try_init();
}

/// The bridge handle.
///
/// Ties one host, one execution lock and one set of options together and
/// exposes every bridge operation.
///
/// # Thread Safety
///
/// `Bridge` is `Send + Sync` and is meant to be shared as `Arc<Bridge>`
/// between the script runtime and host threads.
pub struct Bridge {
    /// Token ownership tag
    id: u64,

    /// The database host
    host: Arc<dyn DatabaseHost>,

    /// Global execution lock of the script runtime
    lock: Arc<ExecutionLock>,

    /// Configuration options
    options: BridgeOptions,

    /// Field type codes of the running host
    type_map: FieldTypeMap,

    /// Installed audit listener, at most one
    audit: Mutex<Option<Arc<AuditLogger>>>,
}

impl Bridge {
    /// Creates a bridge with its own execution lock.
    pub fn new(host: Arc<dyn DatabaseHost>, options: BridgeOptions) -> Result<Self> {
        Self::with_lock(host, Arc::new(ExecutionLock::new()), options)
    }

    /// Creates a bridge sharing an existing execution lock.
    ///
    /// If `options.access_security_file` is set, audit logging is installed
    /// before returning.
    pub fn with_lock(host: Arc<dyn DatabaseHost>, lock: Arc<ExecutionLock>, options: BridgeOptions) -> Result<Self> {
        options.validate()?;
        let type_map = FieldTypeMap::from_codes(host.field_type_codes());
        let bridge = Self {
            id: NEXT_BRIDGE_ID.fetch_add(1, Ordering::Relaxed),
            host,
            lock,
            options,
            type_map,
            audit: Mutex::new(None),
        };

        if let Some(path) = bridge.options.access_security_file.clone() {
            bridge.install_audit_logging(&path)?;
        }

        log::info!(
            "Bridge {} started for host at {} ({} field types)",
            bridge.id,
            bridge.base_path(),
            bridge.type_map.len()
        );
        Ok(bridge)
    }

    /// Configuration options.
    pub fn options(&self) -> &BridgeOptions {
        &self.options
    }

    /// The database host.
    pub fn host(&self) -> &Arc<dyn DatabaseHost> {
        &self.host
    }

    /// The execution lock scripts run under.
    pub fn execution_lock(&self) -> &Arc<ExecutionLock> {
        &self.lock
    }

    /// Root path of the host distribution.
    pub fn base_path(&self) -> &str {
        self.host.base_path()
    }

    /// Field type codes of the running host.
    pub fn type_map(&self) -> &FieldTypeMap {
        &self.type_map
    }

    /// Field type names (`DBF_*`) to host codes.
    pub fn type_enum_mapping(&self) -> BTreeMap<String, i32> {
        self.type_map.to_name_map()
    }

    /// Catalog queries against the host.
    pub fn catalog(&self) -> FieldCatalog<'_> {
        FieldCatalog::new(self.host.as_ref(), &self.type_map)
    }

    /// Every field of `record_type`.
    ///
    /// An unknown record type yields an empty map and the diagnostic
    /// `Unable to find record type "<type>" (error <status>)` at warn level
    /// through the `log` facade. It reaches stderr once a logger is
    /// installed, e.g. with [`init_logging`]; without one it is dropped.
    pub fn lookup_fields(&self, record_type: &str) -> FieldMap {
        self.catalog().dump(record_type).unwrap_or_else(|e| {
            log::warn!("{}", e);
            FieldMap::new()
        })
    }

    /// The named fields that exist on `record_type`.
    pub fn lookup_named_fields<S: AsRef<str>>(&self, record_type: &str, names: &[S]) -> FieldMap {
        self.catalog().lookup(record_type, names)
    }

    /// Field transfers attributed to the configured writer.
    pub fn accessor(&self) -> FieldAccessor<'_> {
        FieldAccessor::new(self.host.as_ref(), &self.lock, &self.options.writer)
    }

    /// Reads up to `count` elements of `name`. See [`FieldAccessor::get`].
    pub fn get_field(&self, name: &str, wire: WireType, buf: &mut [u8], count: usize) -> Result<usize> {
        self.accessor().get(name, wire, buf, count)
    }

    /// Writes `count` elements into `name`. See [`FieldAccessor::put`].
    pub fn put_field(&self, name: &str, wire: WireType, buf: &[u8], count: usize) -> Result<()> {
        self.accessor().put(name, wire, buf, count)
    }

    /// Reads and decodes up to `count` elements of `name`.
    pub fn get_values(&self, name: &str, wire: WireType, count: usize) -> Result<Vec<DbrValue>> {
        self.accessor().get_values(name, wire, count)
    }

    /// Encodes and writes `values` into `name`.
    pub fn put_values(&self, name: &str, values: &[DbrValue], wire: Option<WireType>) -> Result<()> {
        self.accessor().put_values(name, values, wire)
    }

    /// Loads the access security file at `path` and logs every trapped
    /// write to stdout.
    ///
    /// Only the first successful call per bridge has any effect.
    pub fn install_audit_logging(&self, path: &Path) -> Result<()> {
        self.install_audit_logging_with(path, AuditLogger::stdout())
    }

    /// Like [`install_audit_logging`](Self::install_audit_logging) with a
    /// caller-supplied logger.
    pub fn install_audit_logging_with(&self, path: &Path, logger: AuditLogger) -> Result<()> {
        let mut installed = self.audit.lock();
        if installed.is_some() {
            log::debug!("Audit logging already installed, ignoring {}", path.display());
            return Ok(());
        }

        // Loading takes no record lock, so the execution lock stays held and
        // the `audit` mutex is only ever taken after it.
        self.host
            .load_access_security(path)
            .map_err(|status| Error::AccessSecurity(status.to_string()))?;

        let logger = Arc::new(logger);
        self.host.register_write_listener(Arc::clone(&logger) as Arc<dyn host::WriteTrapListener>);
        *installed = Some(logger);
        log::info!("Audit logging installed from {}", path.display());
        Ok(())
    }

    /// True once audit logging has been installed.
    pub fn audit_installed(&self) -> bool {
        self.audit.lock().is_some()
    }

    /// Creates a token for one pending asynchronous completion.
    pub fn create_completion_token(&self) -> CompletionToken {
        CompletionToken::new(self.id)
    }

    /// Hands `record` back to the host scheduler at `priority`, consuming
    /// the token.
    pub fn signal_completion(&self, priority: Priority, record: &str, token: CompletionToken) -> Result<()> {
        token.signal(self.id, self.host.as_ref(), priority, record)
    }
}
