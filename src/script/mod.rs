//! Lua scripting support.
//!
//! Scripts reach the bridge through a global `ioc` table:
//!
//! | Function | Returns |
//! |---|---|
//! | `ioc.base_path()` | host distribution path |
//! | `ioc.dbf_types()` | `DBF_*` name to host code |
//! | `ioc.field_offsets(record_type)` | every field as `{offset, size, type, type_name}` |
//! | `ioc.lookup_fields(record_type, names)` | the named fields, same shape |
//! | `ioc.get_field(name, wire, n)` | a scalar when `n` is 1 (the default), else a sequence |
//! | `ioc.put_field(name, wire, value)` | nothing; `wire` may be nil, `value` a scalar or sequence |
//! | `ioc.install_audit_logging(path)` | nothing |
//! | `ioc.create_completion_token()` | an opaque token |
//! | `ioc.signal_completion(priority, record, token)` | nothing; `priority` may be nil |
//!
//! Wire types are available as `ioc.DBR_STRING` to `ioc.DBR_DOUBLE`, and
//! scheduler priorities as `ioc.PRIORITY_LOW`, `ioc.PRIORITY_MEDIUM` and
//! `ioc.PRIORITY_HIGH`. Failed operations raise Lua errors.
//!
//! # Example
//!
//! ```rust
//! use iocbridge::host::MemoryHost;
//! use iocbridge::script::LuaRuntime;
//! use iocbridge::{Bridge, BridgeOptions};
//! use std::sync::Arc;
//!
//! # fn main() -> Result<(), iocbridge::Error> {
//! let host = MemoryHost::builder()
//!     .standard_record_types()
//!     .record("counter", "longout")
//!     .build()?;
//! let bridge = Arc::new(Bridge::new(Arc::new(host), BridgeOptions::new())?);
//!
//! LuaRuntime::new(bridge).execute(r#"
//!     local n = ioc.get_field("counter", ioc.DBR_LONG)
//!     ioc.put_field("counter", ioc.DBR_LONG, n + 1)
//! "#)?;
//! # Ok(())
//! # }
//! ```

pub mod lua_runtime;

pub use lua_runtime::LuaRuntime;
