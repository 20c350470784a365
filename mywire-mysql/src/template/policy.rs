/// Decides which bare words in a raw SQL fragment are passed through untouched.
///
/// Words rejected by [`is_ident_allowed`](SqlPolicy::is_ident_allowed) are treated as column
/// names and backtick-quoted. Function calls rejected by
/// [`is_function_allowed`](SqlPolicy::is_function_allowed) fail compilation.
pub trait SqlPolicy: Send + Sync {
    fn is_ident_allowed(&self, ident: &str) -> bool;

    fn is_function_allowed(&self, name: &str) -> bool;
}

/// Keywords, operators and a conservative set of side-effect free MySQL functions.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultSqlPolicy;

const IDENTS: &[&str] = &[
    "AND", "AS", "ASC", "BETWEEN", "BINARY", "BOTH", "CASE", "CHAR", "COLLATE",
    "CURRENT_DATE", "CURRENT_TIME", "CURRENT_TIMESTAMP", "DATE", "DATETIME", "DAY",
    "DAY_HOUR", "DAY_MINUTE", "DAY_SECOND", "DECIMAL", "DESC", "DISTINCT", "DIV", "DOUBLE",
    "ELSE", "END", "ESCAPE", "EXISTS", "FALSE", "FLOAT", "FROM", "HOUR", "HOUR_MINUTE",
    "HOUR_SECOND", "IN", "INTERVAL", "IS", "JSON", "LEADING", "LIKE", "MICROSECOND",
    "MINUTE", "MINUTE_SECOND", "MOD", "MONTH", "NOT", "NULL", "OR", "QUARTER", "REGEXP",
    "RLIKE", "SECOND", "SIGNED", "SOUNDS", "THEN", "TIME", "TRAILING", "TRUE", "UNKNOWN",
    "UNSIGNED", "USING", "WEEK", "WHEN", "XOR", "YEAR", "YEAR_MONTH",
];

const FUNCTIONS: &[&str] = &[
    "ABS", "ADDDATE", "ADDTIME", "ASCII", "AVG", "BIN", "BIT_LENGTH", "CAST", "CEIL",
    "CEILING", "CHAR_LENGTH", "CHARACTER_LENGTH", "COALESCE", "CONCAT", "CONCAT_WS", "CONV",
    "CONVERT", "COUNT", "CURDATE", "CURRENT_DATE", "CURRENT_TIME", "CURRENT_TIMESTAMP",
    "CURTIME", "DATE", "DATE_ADD", "DATE_FORMAT", "DATE_SUB", "DATEDIFF", "DAY",
    "DAYNAME", "DAYOFMONTH", "DAYOFWEEK", "DAYOFYEAR", "EXP", "EXTRACT", "FIELD",
    "FIND_IN_SET", "FLOOR", "FORMAT", "FROM_DAYS", "FROM_UNIXTIME", "GREATEST",
    "GROUP_CONCAT", "HEX", "HOUR", "IF", "IFNULL", "IN", "INSERT", "INSTR", "ISNULL",
    "JSON_ARRAY", "JSON_CONTAINS", "JSON_EXTRACT", "JSON_LENGTH", "JSON_OBJECT",
    "JSON_UNQUOTE", "LAST_DAY", "LCASE", "LEAST", "LEFT", "LENGTH", "LN", "LOCATE", "LOG",
    "LOG10", "LOG2", "LOWER", "LPAD", "LTRIM", "MAKEDATE", "MAX", "MICROSECOND", "MID",
    "MIN", "MINUTE", "MOD", "MONTH", "MONTHNAME", "NOT", "NOW", "NULLIF", "OCT", "ORD",
    "PI", "POSITION", "POW", "POWER", "QUARTER", "RAND", "REPEAT", "REPLACE", "REVERSE",
    "RIGHT", "ROUND", "RPAD", "RTRIM", "SEC_TO_TIME", "SECOND", "SIGN", "SPACE", "SQRT",
    "STR_TO_DATE", "STRCMP", "SUBDATE", "SUBSTR", "SUBSTRING", "SUBSTRING_INDEX", "SUBTIME",
    "SUM", "SYSDATE", "TIME", "TIME_FORMAT", "TIME_TO_SEC", "TIMEDIFF", "TIMESTAMP",
    "TIMESTAMPADD", "TIMESTAMPDIFF", "TO_DAYS", "TRIM", "TRUNCATE", "UCASE", "UNHEX",
    "UNIX_TIMESTAMP", "UPPER", "UTC_DATE", "UTC_TIME", "UTC_TIMESTAMP", "WEEK", "WEEKDAY",
    "WEEKOFYEAR", "YEAR", "YEARWEEK",
];

impl SqlPolicy for DefaultSqlPolicy {
    fn is_ident_allowed(&self, ident: &str) -> bool {
        IDENTS.iter().any(|k| k.eq_ignore_ascii_case(ident))
    }

    fn is_function_allowed(&self, name: &str) -> bool {
        FUNCTIONS.iter().any(|f| f.eq_ignore_ascii_case(name))
    }
}

#[test]
fn test_default_policy() {
    let policy = DefaultSqlPolicy;

    assert!(policy.is_ident_allowed("and"));
    assert!(policy.is_ident_allowed("NULL"));
    assert!(!policy.is_ident_allowed("name"));

    assert!(policy.is_function_allowed("now"));
    assert!(policy.is_function_allowed("Concat"));
    assert!(!policy.is_function_allowed("sleep"));
    assert!(!policy.is_function_allowed("load_file"));
}
