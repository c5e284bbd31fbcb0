//! Error types for the iocbridge field-access bridge.

use std::fmt;
use std::io;
use thiserror::Error;

/// The result type used throughout iocbridge.
pub type Result<T> = std::result::Result<T, Error>;

/// Direction of a field transfer, carried by [`Error::TransferFailed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transfer {
    /// A read from the host into a caller buffer.
    Get,
    /// A write from a caller buffer into the host.
    Put,
}

impl fmt::Display for Transfer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transfer::Get => f.write_str("get"),
            Transfer::Put => f.write_str("put"),
        }
    }
}

/// The error type for bridge operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The host schema has no record type of this name.
    #[error("Unable to find record type \"{record_type}\" (error {status})")]
    UnknownRecordType {
        /// The requested record type.
        record_type: String,
        /// Host status returned by the catalog.
        status: i64,
    },

    /// A `record.field` name could not be resolved to a field address.
    #[error("Unknown field: {0}")]
    UnknownField(String),

    /// No record instance of this name exists.
    #[error("Unknown record: {0}")]
    UnknownRecord(String),

    /// Some required fields are not defined by the record type.
    #[error("Fields not supported by {record_type}: {missing:?}")]
    MissingFields {
        /// The record type that was searched.
        record_type: String,
        /// Sorted names that were not found.
        missing: Vec<String>,
    },

    /// The host transfer primitive reported failure.
    #[error("{op} of {field} failed (status {status})")]
    TransferFailed {
        /// Which transfer failed.
        op: Transfer,
        /// The field name as given by the caller.
        field: String,
        /// Host status code.
        status: i64,
    },

    /// A completion signal used a token that was never created here or was
    /// already consumed.
    #[error("Invalid completion token")]
    InvalidToken,

    /// The host refused to queue completion processing.
    #[error("Completion request failed (status {status})")]
    CallbackFailed {
        /// Host status code.
        status: i64,
    },

    /// The access security configuration could not be loaded.
    #[error("Access security error: {0}")]
    AccessSecurity(String),

    /// An invalid argument was provided.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Invalid bridge configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A Lua script failed.
    #[error("Script error: {0}")]
    Script(String),

    /// An I/O error occurred.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// Creates a new invalid argument error.
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Error::InvalidArgument(msg.into())
    }

    /// Creates a new configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Creates a new transfer failure.
    pub fn transfer_failed(op: Transfer, field: impl Into<String>, status: i64) -> Self {
        Error::TransferFailed { op, field: field.into(), status }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Config(err.to_string())
    }
}

impl From<mlua::Error> for Error {
    fn from(err: mlua::Error) -> Self {
        Error::Script(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::transfer_failed(Transfer::Put, "myrec.VAL", 42);
        assert_eq!(err.to_string(), "put of myrec.VAL failed (status 42)");

        let err = Error::UnknownRecordType { record_type: "nope".into(), status: 7 };
        assert_eq!(err.to_string(), "Unable to find record type \"nope\" (error 7)");

        let err = Error::MissingFields {
            record_type: "ao".into(),
            missing: vec!["BOGUS".into(), "XYZ".into()],
        };
        assert!(err.to_string().contains("BOGUS"));
    }

    #[test]
    fn test_error_from_io() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }
}
