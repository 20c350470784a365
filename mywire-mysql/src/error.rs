use std::borrow::Cow;
use std::error::Error as StdError;
use std::fmt::{self, Display, Formatter};

pub(crate) use mywire_core::error::*;

use crate::protocol::response::ErrPacket;

/// An error returned from the MySQL database server, or raised client-side with a
/// libmysqlclient error number.
#[derive(Debug)]
pub struct MySqlDatabaseError(pub(crate) ErrPacket);

/// `CR_AUTH_PLUGIN_CANNOT_LOAD`
pub(crate) const CR_AUTH_PLUGIN_CANNOT_LOAD: u16 = 2059;

/// `CR_AUTH_PLUGIN_ERR`
pub(crate) const CR_AUTH_PLUGIN_ERR: u16 = 2061;

/// `CR_LOAD_DATA_LOCAL_INFILE_REJECTED`
pub(crate) const CR_LOAD_DATA_LOCAL_INFILE_REJECTED: u16 = 2068;

/// `ER_NET_PACKET_TOO_LARGE`
pub(crate) const ER_NET_PACKET_TOO_LARGE: u16 = 1153;

/// `ER_UNKNOWN_COM_ERROR`
pub(crate) const ER_UNKNOWN_COM_ERROR: u16 = 1047;

impl MySqlDatabaseError {
    pub(crate) fn client(code: u16, message: impl Into<String>) -> Self {
        Self(ErrPacket::client(code, message))
    }

    /// The error number, e.g. `1062` for a duplicate key.
    pub fn number(&self) -> u16 {
        self.0.error_code
    }

    /// The five character SQLSTATE, if the server sent one.
    pub fn sql_state(&self) -> Option<&str> {
        self.0.sql_state.as_deref()
    }

    pub fn message(&self) -> &str {
        &self.0.error_message
    }
}

impl Display for MySqlDatabaseError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match &self.0.sql_state {
            Some(state) => write!(f, "{} ({}): {}", self.number(), state, self.message()),
            None => write!(f, "{}: {}", self.number(), self.message()),
        }
    }
}

impl StdError for MySqlDatabaseError {}

impl DatabaseError for MySqlDatabaseError {
    #[inline]
    fn message(&self) -> &str {
        self.message()
    }

    #[inline]
    fn code(&self) -> Option<Cow<'_, str>> {
        self.sql_state().map(Cow::Borrowed)
    }

    #[doc(hidden)]
    fn as_error(&self) -> &(dyn StdError + Send + Sync + 'static) {
        self
    }

    #[doc(hidden)]
    fn into_error(self: Box<Self>) -> Box<dyn StdError + Send + Sync + 'static> {
        self
    }
}

#[test]
fn test_display_database_error() {
    let err = MySqlDatabaseError::client(2059, "Authentication plugin 'dialog' cannot be loaded");

    assert_eq!(
        err.to_string(),
        "2059 (HY000): Authentication plugin 'dialog' cannot be loaded"
    );

    let err: Error = err.into();
    let db = err.as_database_error().unwrap();
    assert_eq!(db.downcast_ref::<MySqlDatabaseError>().number(), 2059);
}
