// https://dev.mysql.com/doc/dev/mysql-server/latest/group__group__cs__capabilities__flags.html
// https://mariadb.com/kb/en/connection/#capabilities
bitflags::bitflags! {
    /// Capability flags exchanged during the handshake.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Capabilities: u64 {
        const LONG_PASSWORD = 0x0000_0001;

        // report found (matched) rows instead of changed rows in affected_rows
        const FOUND_ROWS = 0x0000_0002;

        // column flags are two bytes wide in pre-4.1 column definitions
        const LONG_FLAG = 0x0000_0004;

        // the handshake response names an initial schema
        const CONNECT_WITH_DB = 0x0000_0008;

        const NO_SCHEMA = 0x0000_0010;
        const COMPRESS = 0x0000_0020;
        const ODBC = 0x0000_0040;

        // LOAD DATA LOCAL INFILE
        const LOCAL_FILES = 0x0000_0080;

        // the parser ignores spaces before '('
        const IGNORE_SPACE = 0x0000_0100;

        const PROTOCOL_41 = 0x0000_0200;
        const INTERACTIVE = 0x0000_0400;
        const SSL = 0x0000_0800;

        // OK and EOF packets carry status flags
        const TRANSACTIONS = 0x0000_2000;

        // 4.1 authentication; the auth response is length-prefixed
        const SECURE_CONNECTION = 0x0000_8000;

        const MULTI_STATEMENTS = 0x0001_0000;
        const MULTI_RESULTS = 0x0002_0000;
        const PS_MULTI_RESULTS = 0x0004_0000;
        const PLUGIN_AUTH = 0x0008_0000;
        const CONNECT_ATTRS = 0x0010_0000;

        // the auth response is a length-encoded string
        const PLUGIN_AUTH_LENENC_DATA = 0x0020_0000;

        const CAN_HANDLE_EXPIRED_PASSWORDS = 0x0040_0000;

        // OK packets may carry session state change information
        const SESSION_TRACK = 0x0080_0000;

        // result sets end with an OK packet instead of an EOF packet
        const DEPRECATE_EOF = 0x0100_0000;

        // MariaDB: the server sends extended capabilities in the handshake filler
        const MARIADB_CLIENT_PROGRESS = 0x0001_0000_0000;
        const MARIADB_CLIENT_COM_MULTI = 0x0002_0000_0000;
        const MARIADB_CLIENT_STMT_BULK_OPERATIONS = 0x0004_0000_0000;
    }
}
