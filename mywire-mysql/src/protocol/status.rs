// https://dev.mysql.com/doc/dev/mysql-server/latest/mysql__com_8h.html#a1d854e841086925be1883e4d7b4e8cad
// https://mariadb.com/kb/en/ok_packet/#server-status-flag
bitflags::bitflags! {
    /// Server status flags carried by OK and EOF packets.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Status: u16 {
        // a multi-statement transaction has been started
        const IN_TRANS = 0x0001;

        const AUTOCOMMIT = 0x0002;

        // another result set follows this one
        const MORE_RESULTS_EXISTS = 0x0008;

        const NO_GOOD_INDEX_USED = 0x0010;
        const NO_INDEX_USED = 0x0020;

        const CURSOR_EXISTS = 0x0040;
        const LAST_ROW_SENT = 0x0080;
        const DB_DROPPED = 0x0100;

        // sql_mode contains NO_BACKSLASH_ESCAPES; string literals escape `'` by doubling only
        const NO_BACKSLASH_ESCAPES = 0x0200;

        const METADATA_CHANGED = 0x0400;

        // the statement ran longer than long_query_time
        const QUERY_WAS_SLOW = 0x0800;

        const PS_OUT_PARAMS = 0x1000;
        const IN_TRANS_READONLY = 0x2000;

        // the OK packet carries session state change blocks
        const SESSION_STATE_CHANGED = 0x4000;
    }
}
