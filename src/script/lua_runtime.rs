//! LuaRuntime executes Lua scripts against a bridge.
//!
//! Every script runs in a fresh Lua state with the bridge's execution lock
//! held for the whole run. Bridge operations reach the script through the
//! global `ioc` table; transfers inside them give the execution lock up
//! while the host does its work.

use crate::catalog::FieldMap;
use crate::completion::CompletionToken;
use crate::error::{Error, Result};
use crate::host::Priority;
use crate::types::FieldTypeMap;
use crate::wire::{DbrValue, WireType};
use crate::Bridge;
use mlua::{AnyUserData, Lua, Table, UserData, UserDataMethods, Value};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// LuaRuntime runs Lua scripts with access to a [`Bridge`].
///
/// # Example
///
/// ```rust
/// use iocbridge::host::MemoryHost;
/// use iocbridge::script::LuaRuntime;
/// use iocbridge::{Bridge, BridgeOptions};
/// use std::sync::Arc;
///
/// # fn main() -> Result<(), iocbridge::Error> {
/// let host = MemoryHost::builder()
///     .standard_record_types()
///     .record("myrec", "ao")
///     .build()?;
/// let bridge = Arc::new(Bridge::new(Arc::new(host), BridgeOptions::new())?);
/// let runtime = LuaRuntime::new(Arc::clone(&bridge));
///
/// let result = runtime.execute_with_result(r#"
///     ioc.put_field("myrec.VAL", ioc.DBR_DOUBLE, 1.25)
///     return ioc.get_field("myrec.VAL", ioc.DBR_DOUBLE)
/// "#)?;
/// assert_eq!(result, Some("1.25".to_string()));
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct LuaRuntime {
    /// Bridge the scripts operate on
    bridge: Arc<Bridge>,

    /// Maximum script execution time
    timeout: Option<Duration>,
}

/// Script-side completion token. Emptied by the first signal.
struct LuaToken {
    token: Option<CompletionToken>,
}

impl UserData for LuaToken {
    fn add_methods<'lua, M: UserDataMethods<'lua, Self>>(methods: &mut M) {
        methods.add_method("id", |_, this, ()| Ok(this.token.as_ref().map(CompletionToken::id)));
        methods.add_method("pending", |_, this, ()| Ok(this.token.is_some()));
    }
}

fn to_lua<'lua>(lua: &'lua Lua, value: &DbrValue) -> mlua::Result<Value<'lua>> {
    Ok(match value {
        DbrValue::Str(s) => Value::String(lua.create_string(s)?),
        DbrValue::Int(i) => Value::Integer(*i),
        DbrValue::Float(f) => Value::Number(*f),
    })
}

fn from_lua(value: &Value<'_>) -> mlua::Result<DbrValue> {
    match value {
        Value::Integer(i) => Ok(DbrValue::Int(*i)),
        Value::Number(n) => Ok(DbrValue::Float(*n)),
        Value::Boolean(b) => Ok(DbrValue::Int(i64::from(*b))),
        Value::String(s) => Ok(DbrValue::Str(s.to_str()?.to_string())),
        other => Err(mlua::Error::RuntimeError(format!(
            "cannot write a {} to a field",
            other.type_name()
        ))),
    }
}

fn field_table<'lua>(lua: &'lua Lua, fields: &FieldMap, types: &FieldTypeMap) -> mlua::Result<Table<'lua>> {
    let table = lua.create_table()?;
    for (name, descriptor) in fields {
        let entry = lua.create_table()?;
        entry.set("offset", descriptor.byte_offset)?;
        entry.set("size", descriptor.byte_size)?;
        entry.set("type", types.code(descriptor.declared_type))?;
        entry.set("type_name", descriptor.declared_type.name())?;
        table.set(name.as_str(), entry)?;
    }
    Ok(table)
}

/// Bridge API exposed to Lua scripts as `ioc`
struct IocApi;

impl IocApi {
    fn create_api_table(lua: &Lua, bridge: Arc<Bridge>) -> mlua::Result<Table<'_>> {
        let table = lua.create_table()?;

        for wire in WireType::ALL {
            table.set(wire.name(), wire.code())?;
        }
        table.set("PRIORITY_LOW", Priority::Low.index())?;
        table.set("PRIORITY_MEDIUM", Priority::Medium.index())?;
        table.set("PRIORITY_HIGH", Priority::High.index())?;

        let b = Arc::clone(&bridge);
        let base_path_fn = lua.create_function(move |_, ()| Ok(b.base_path().to_string()))?;
        table.set("base_path", base_path_fn)?;

        let b = Arc::clone(&bridge);
        let dbf_types_fn = lua.create_function(move |lua, ()| {
            let types = lua.create_table()?;
            for (name, code) in b.type_enum_mapping() {
                types.set(name, code)?;
            }
            Ok(types)
        })?;
        table.set("dbf_types", dbf_types_fn)?;

        let b = Arc::clone(&bridge);
        let field_offsets_fn = lua.create_function(move |lua, record_type: String| {
            field_table(lua, &b.lookup_fields(&record_type), b.type_map())
        })?;
        table.set("field_offsets", field_offsets_fn)?;

        let b = Arc::clone(&bridge);
        let lookup_fields_fn = lua.create_function(move |lua, (record_type, names): (String, Vec<String>)| {
            field_table(lua, &b.lookup_named_fields(&record_type, &names), b.type_map())
        })?;
        table.set("lookup_fields", lookup_fields_fn)?;

        let b = Arc::clone(&bridge);
        let get_fn = lua.create_function(move |lua, (name, wire, count): (String, i64, Option<usize>)| {
            let wire = WireType::from_code(wire).map_err(mlua::Error::external)?;
            let count = count.unwrap_or(1);
            let values = b.get_values(&name, wire, count).map_err(mlua::Error::external)?;
            if count == 1 && values.len() == 1 {
                return to_lua(lua, &values[0]);
            }
            let items = values
                .iter()
                .map(|v| to_lua(lua, v))
                .collect::<mlua::Result<Vec<_>>>()?;
            Ok(Value::Table(lua.create_sequence_from(items)?))
        })?;
        table.set("get_field", get_fn)?;

        let b = Arc::clone(&bridge);
        let put_fn = lua.create_function(move |_, (name, wire, value): (String, Option<i64>, Value<'_>)| {
            let wire = wire
                .map(WireType::from_code)
                .transpose()
                .map_err(mlua::Error::external)?;
            let values = match value {
                Value::Table(items) => items
                    .sequence_values::<Value<'_>>()
                    .map(|item| item.and_then(|v| from_lua(&v)))
                    .collect::<mlua::Result<Vec<_>>>()?,
                other => vec![from_lua(&other)?],
            };
            b.put_values(&name, &values, wire).map_err(mlua::Error::external)
        })?;
        table.set("put_field", put_fn)?;

        let b = Arc::clone(&bridge);
        let audit_fn = lua.create_function(move |_, path: String| {
            b.install_audit_logging(Path::new(&path)).map_err(mlua::Error::external)
        })?;
        table.set("install_audit_logging", audit_fn)?;

        let b = Arc::clone(&bridge);
        let create_token_fn = lua.create_function(move |lua, ()| {
            lua.create_userdata(LuaToken { token: Some(b.create_completion_token()) })
        })?;
        table.set("create_completion_token", create_token_fn)?;

        let b = Arc::clone(&bridge);
        let signal_fn = lua.create_function(
            move |_, (priority, record, token): (Option<i64>, String, AnyUserData<'_>)| {
                let priority = match priority {
                    Some(code) => Priority::from_code(code).map_err(mlua::Error::external)?,
                    None => b.options().default_priority,
                };
                let token = token
                    .borrow_mut::<LuaToken>()?
                    .token
                    .take()
                    .ok_or_else(|| mlua::Error::external(Error::InvalidToken))?;
                b.signal_completion(priority, &record, token).map_err(mlua::Error::external)
            },
        )?;
        table.set("signal_completion", signal_fn)?;

        Ok(table)
    }
}

impl LuaRuntime {
    /// Creates a runtime using the bridge's configured script timeout.
    pub fn new(bridge: Arc<Bridge>) -> Self {
        let timeout = bridge.options().script_timeout_ms.map(Duration::from_millis);
        Self { bridge, timeout }
    }

    /// Creates a runtime with an explicit timeout.
    pub fn with_timeout(bridge: Arc<Bridge>, timeout: Option<Duration>) -> Self {
        Self { bridge, timeout }
    }

    /// The bridge scripts operate on.
    pub fn bridge(&self) -> &Arc<Bridge> {
        &self.bridge
    }

    /// Executes a script.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Script`] if the script has syntax errors, raises a
    /// runtime error (including a failed bridge operation) or exceeds the
    /// timeout.
    pub fn execute(&self, script: &str) -> Result<()> {
        self.run(script, |lua| lua.load(script).exec())
    }

    /// Executes a script and returns its result rendered as a string.
    ///
    /// - `Ok(None)` if the script returned nil or nothing
    /// - `Ok(Some(_))` for strings, numbers and booleans
    pub fn execute_with_result(&self, script: &str) -> Result<Option<String>> {
        self.run(script, |lua| {
            let value = lua.load(script).eval::<Value<'_>>()?;
            Ok(match value {
                Value::Nil => None,
                Value::String(s) => Some(s.to_str()?.to_string()),
                Value::Integer(i) => Some(i.to_string()),
                Value::Number(n) => Some(n.to_string()),
                Value::Boolean(b) => Some(b.to_string()),
                other => Some(format!("{:?}", other)),
            })
        })
    }

    /// Runs `f` holding the execution lock.
    ///
    /// For host threads that call into the script runtime, typically from a
    /// completion hook while holding a record lock.
    pub fn enter<T>(&self, f: impl FnOnce() -> T) -> T {
        let _guard = self.bridge.execution_lock().acquire();
        f()
    }

    /// Sets the timeout for script execution.
    pub fn set_timeout(&mut self, timeout: Option<Duration>) {
        self.timeout = timeout;
    }

    /// Gets the current timeout setting.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    fn run<T>(&self, script: &str, eval: impl FnOnce(&Lua) -> mlua::Result<T>) -> Result<T> {
        let start_time = Instant::now();
        let _guard = self.bridge.execution_lock().acquire();
        let lua = Lua::new();

        if let Some(timeout) = self.timeout {
            lua.set_hook(
                mlua::HookTriggers {
                    every_nth_instruction: Some(1000),
                    ..Default::default()
                },
                move |_lua, _debug| {
                    if start_time.elapsed() > timeout {
                        Err(mlua::Error::RuntimeError("Script execution timeout".to_string()))
                    } else {
                        Ok(())
                    }
                },
            );
        }

        let result = (|| -> mlua::Result<T> {
            let api = IocApi::create_api_table(&lua, Arc::clone(&self.bridge))?;
            lua.globals().set("ioc", api)?;
            eval(&lua)
        })();

        match result {
            Ok(value) => {
                log::info!("Lua script executed in {:?}", start_time.elapsed());
                Ok(value)
            }
            Err(e) => {
                log::warn!("Lua script failed ({} bytes): {}", script.len(), e);
                Err(Error::Script(format!("Lua script failed: {}", e)))
            }
        }
    }
}
