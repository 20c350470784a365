//! Types for working with errors produced by mywire.

use std::borrow::Cow;
use std::error::Error as StdError;
use std::fmt::Display;
use std::io;
use std::result::Result as StdResult;

/// A specialized `Result` type for mywire.
pub type Result<T, E = Error> = StdResult<T, E>;

// Convenience type alias for usage within mywire.
pub type BoxDynError = Box<dyn StdError + 'static + Send + Sync>;

/// Represents all the ways a method can fail within mywire.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Error occurred while parsing or validating connect options.
    #[error("error with configuration: {0}")]
    Configuration(#[source] BoxDynError),

    /// Error returned from the database.
    #[error("error returned from database: {0}")]
    Database(Box<dyn DatabaseError>),

    /// Error communicating with the database backend.
    ///
    /// An [`io::ErrorKind::UnexpectedEof`] here means the server closed the socket.
    #[error("error communicating with database: {0}")]
    Io(#[from] io::Error),

    /// Unexpected or invalid data encountered while communicating with the database.
    ///
    /// This should indicate there is a programming error in the driver or there
    /// is something corrupted with the connection to the database itself.
    #[error("encountered unexpected or invalid data: {0}")]
    Protocol(String),

    /// An operation was started on a connection that is already running one.
    #[error("connection is busy: {0}")]
    Busy(&'static str),

    /// The connection was ended while this operation was in flight.
    #[error("operation was canceled because the connection was ended")]
    Canceled,

    /// The server refused an outgoing packet because it exceeds `max_allowed_packet`.
    #[error("packet of {size} bytes exceeds the server's max_allowed_packet")]
    TooLarge { size: usize },

    /// A SQL template could not be compiled.
    #[error("invalid SQL template: {0}")]
    Template(String),

    /// Column index was out of bounds.
    #[error("column index out of bounds: the len is {len}, but the index is {index}")]
    ColumnIndexOutOfBounds { index: usize, len: usize },

    /// No column found for the given name.
    #[error("no column found for name: {0}")]
    ColumnNotFound(String),

    /// Error occurred while decoding a value.
    #[error("error occurred while decoding: {0}")]
    Decode(#[source] BoxDynError),

    /// The pool was shut down while we were waiting for a connection.
    #[error("attempted to acquire a connection on a closed pool")]
    PoolClosed,
}

impl StdError for Box<dyn DatabaseError> {}

impl Error {
    pub fn into_database_error(self) -> Option<Box<dyn DatabaseError + 'static>> {
        match self {
            Error::Database(err) => Some(err),
            _ => None,
        }
    }

    pub fn as_database_error(&self) -> Option<&(dyn DatabaseError + 'static)> {
        match self {
            Error::Database(err) => Some(&**err),
            _ => None,
        }
    }

    /// Whether the socket that produced this error can no longer be trusted.
    ///
    /// SQL errors leave the connection usable; transport and framing faults do not.
    pub fn breaks_connection(&self) -> bool {
        matches!(
            self,
            Error::Io(_) | Error::Protocol(_) | Error::TooLarge { .. }
        )
    }

    #[inline]
    pub fn protocol(err: impl Display) -> Self {
        Error::Protocol(err.to_string())
    }

    #[inline]
    pub fn config(err: impl StdError + Send + Sync + 'static) -> Self {
        Error::Configuration(err.into())
    }

    #[inline]
    pub fn template(err: impl Display) -> Self {
        Error::Template(err.to_string())
    }
}

/// An error that was returned from the database.
pub trait DatabaseError: 'static + Send + Sync + StdError {
    /// The primary, human-readable error message.
    fn message(&self) -> &str;

    /// The (SQLSTATE) code for the error.
    fn code(&self) -> Option<Cow<'_, str>> {
        None
    }

    #[doc(hidden)]
    fn as_error(&self) -> &(dyn StdError + Send + Sync + 'static);

    #[doc(hidden)]
    fn into_error(self: Box<Self>) -> Box<dyn StdError + Send + Sync + 'static>;
}

impl dyn DatabaseError {
    /// Downcast a reference to this generic database error to a specific
    /// database error type.
    ///
    /// # Panics
    ///
    /// Panics if the database error type is not `E`. This is a deliberate contrast from
    /// `Error::downcast_ref` which returns `Option<&E>`. In normal usage, you should know the
    /// specific error type. In other cases, use `try_downcast_ref`.
    pub fn downcast_ref<E: DatabaseError>(&self) -> &E {
        self.try_downcast_ref().unwrap_or_else(|| {
            panic!("downcast to wrong DatabaseError type; original error: {self}")
        })
    }

    /// Downcast a reference to this generic database error to a specific
    /// database error type.
    #[inline]
    pub fn try_downcast_ref<E: DatabaseError>(&self) -> Option<&E> {
        self.as_error().downcast_ref()
    }
}

impl<E> From<E> for Error
where
    E: DatabaseError,
{
    #[inline]
    fn from(error: E) -> Self {
        Error::Database(Box::new(error))
    }
}

/// Format an error message as a `Protocol` error.
#[macro_export]
macro_rules! err_protocol {
    ($expr:expr) => {
        $crate::error::Error::Protocol($expr.into())
    };

    ($fmt:expr, $($arg:tt)*) => {
        $crate::error::Error::Protocol(format!($fmt, $($arg)*))
    };
}

/// Format an error message as a `Template` error.
#[macro_export]
macro_rules! err_template {
    ($fmt:expr, $($arg:tt)*) => {
        $crate::error::Error::Template(format!($fmt, $($arg)*))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_classifies_broken_connections() {
        let eof = Error::Io(io::Error::from(io::ErrorKind::UnexpectedEof));
        assert!(eof.breaks_connection());
        assert!(err_protocol!("bad packet").breaks_connection());
        assert!(Error::TooLarge { size: 1 << 24 }.breaks_connection());

        assert!(!Error::Canceled.breaks_connection());
        assert!(!Error::Busy("query in progress").breaks_connection());
        assert!(!err_template!("unbalanced {}", "(").breaks_connection());
    }

    #[test]
    fn it_formats_protocol_errors() {
        let err = err_protocol!("expected 0x{:02x}", 0xfe_u8);
        assert_eq!(
            err.to_string(),
            "encountered unexpected or invalid data: expected 0xfe"
        );
    }
}
