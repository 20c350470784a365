//! Compilation of SQL templates into statement text.
//!
//! A template alternates literal SQL with parameters. The character written immediately
//! before a parameter decides how it is rendered, and the matching closing character must
//! follow it:
//!
//! | around the parameter | parameter | rendered as |
//! |---|---|---|
//! | `'…'` | any value | an escaped literal; strings, composites and streams become `?` when compiling for a prepared statement |
//! | `"…"` or `` `…` `` | string | a backtick-quoted identifier |
//! | `[…]` | list | `(v1, v2, …)`; an empty list renders as `(NULL)` |
//! | `<…>` | list of objects | `` (`c1`, `c2`) VALUES (…), (…) `` |
//! | `(…)` | string | a validated raw SQL fragment, in parentheses |
//! | `{…}` | object | `` `k`=v, … ``; close with `&}` for `AND` or `\|}` for `OR` |
//!
//! `alias.(…)` and `alias.{…}` qualify the unquoted column names inside with `` `alias`. ``.
//!
//! ```rust,ignore
//! let template = SqlTemplate::new("SELECT * FROM t WHERE name='")
//!     .param("O'Brien")
//!     .sql("'");
//!
//! assert_eq!(
//!     template.compile(&CompileOptions::default())?,
//!     r"SELECT * FROM t WHERE name='O\'Brien'"
//! );
//! ```

use crate::error::Error;
use crate::value::{Param, Value};

mod escape;
mod fragment;
mod policy;

use escape::{write_ident, write_value};
pub use policy::{DefaultSqlPolicy, SqlPolicy};

use fragment::write_fragment;

/// Most placeholders a prepared statement accepts; further values are inlined.
const MAX_PLACEHOLDERS: usize = 65_535;

/// Settings that affect how a template renders.
#[derive(Clone, Copy)]
pub struct CompileOptions<'a> {
    /// Render string literals for a session with `NO_BACKSLASH_ESCAPES` in its `sql_mode`.
    pub no_backslash_escapes: bool,

    pub policy: &'a dyn SqlPolicy,
}

impl Default for CompileOptions<'static> {
    fn default() -> Self {
        CompileOptions {
            no_backslash_escapes: false,
            policy: &DefaultSqlPolicy,
        }
    }
}

/// A SQL statement with parameters bound in quoting context.
#[derive(Debug)]
pub struct SqlTemplate {
    // always one more part than params
    parts: Vec<String>,
    params: Vec<Param>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Context {
    Value,
    Ident(char),
    List,
    Rows,
    Fragment,
    Pairs,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Joiner {
    Comma,
    And,
    Or,
}

impl SqlTemplate {
    pub fn new(sql: impl Into<String>) -> Self {
        SqlTemplate {
            parts: vec![sql.into()],
            params: Vec::new(),
        }
    }

    /// Build a template from literal parts with one parameter between each pair of them.
    pub fn from_parts(parts: Vec<String>, params: Vec<Param>) -> Result<Self, Error> {
        if parts.len() != params.len() + 1 {
            return Err(err_template!(
                "{} literal parts cannot surround {} parameters",
                parts.len(),
                params.len()
            ));
        }

        Ok(SqlTemplate { parts, params })
    }

    /// Append literal SQL.
    pub fn sql(mut self, sql: &str) -> Self {
        if let Some(last) = self.parts.last_mut() {
            last.push_str(sql);
        }

        self
    }

    /// Append a parameter.
    pub fn param(mut self, param: impl Into<Param>) -> Self {
        self.params.push(param.into());
        self.parts.push(String::new());
        self
    }

    pub fn params(&self) -> &[Param] {
        &self.params
    }

    pub(crate) fn has_streams(&self) -> bool {
        self.params.iter().any(|p| matches!(p, Param::Stream(_)))
    }

    /// Render the template with every value inlined.
    pub fn compile(&self, options: &CompileOptions<'_>) -> Result<String, Error> {
        let mut out = String::new();
        self.compile_into(&mut out, options)?;
        Ok(out)
    }

    /// Render into a reusable buffer; `out` is cleared first.
    pub fn compile_into(&self, out: &mut String, options: &CompileOptions<'_>) -> Result<(), Error> {
        out.clear();
        self.render(out, options, None)
    }

    /// Render for a prepared statement: strings, composites and streams in `'` context become
    /// `?` and are returned in placeholder order. Scalars stay inline.
    pub(crate) fn into_prepared(
        self,
        options: &CompileOptions<'_>,
    ) -> Result<(String, Vec<Param>), Error> {
        let mut sql = String::new();
        let mut placed = Vec::new();

        self.render(&mut sql, options, Some(&mut placed))?;

        let params = self
            .params
            .into_iter()
            .enumerate()
            .filter(|(index, _)| placed.binary_search(index).is_ok())
            .map(|(_, param)| param)
            .collect();

        Ok((sql, params))
    }

    fn render(
        &self,
        out: &mut String,
        options: &CompileOptions<'_>,
        mut placeholders: Option<&mut Vec<usize>>,
    ) -> Result<(), Error> {
        let nbe = options.no_backslash_escapes;
        let mut rest = self.parts[0].as_str();

        for (index, param) in self.params.iter().enumerate() {
            let (head, context, parent) = split_opener(rest, index)?;
            let (joiner, tail) = split_closer(&self.parts[index + 1], context, index)?;

            out.push_str(head);

            match (context, param) {
                (Context::Value, Param::Value(value)) if is_literal(value) => {
                    write_value(out, value, nbe)?;
                }

                (Context::Value, _) => {
                    let slot = placeholders.as_deref_mut().filter(|p| p.len() < MAX_PLACEHOLDERS);

                    match (slot, param) {
                        (Some(slot), _) => {
                            out.push('?');
                            slot.push(index);
                        }

                        (None, Param::Value(value)) => write_value(out, value, nbe)?,

                        (None, Param::Stream(_)) => {
                            return Err(err_template!(
                                "parameter {} is a stream and cannot be inlined after {:?}",
                                index,
                                rest
                            ));
                        }
                    }
                }

                (Context::Ident(_), Param::Value(Value::String(name))) => write_ident(out, name),

                (Context::List, Param::Value(Value::List(items))) => write_list(out, items, nbe)?,

                (Context::Rows, Param::Value(Value::List(rows))) => {
                    write_rows(out, rows, nbe).map_err(|e| {
                        err_template!("parameter {} after {:?}: {}", index, rest, e)
                    })?;
                }

                (Context::Fragment, Param::Value(Value::String(sql))) => {
                    out.push('(');
                    write_fragment(out, sql, parent, options.policy, nbe)?;
                    out.push(')');
                }

                (Context::Pairs, Param::Value(Value::Object(pairs))) => {
                    if pairs.is_empty() {
                        match joiner {
                            Joiner::And => out.push_str("TRUE"),
                            Joiner::Or => out.push_str("FALSE"),
                            Joiner::Comma => {
                                return Err(err_template!(
                                    "parameter {} after {:?} has no columns to assign",
                                    index,
                                    rest
                                ));
                            }
                        }
                    }

                    for (n, (key, value)) in pairs.iter().enumerate() {
                        if n > 0 {
                            out.push_str(match joiner {
                                Joiner::Comma => ", ",
                                Joiner::And => " AND ",
                                Joiner::Or => " OR ",
                            });
                        }

                        if let Some(parent) = parent {
                            write_ident(out, parent);
                            out.push('.');
                        }

                        write_ident(out, key);

                        if value.is_null() && joiner != Joiner::Comma {
                            out.push_str(" IS NULL");
                        } else {
                            out.push('=');
                            write_value(out, value, nbe)?;
                        }
                    }
                }

                (_, param) => {
                    return Err(err_template!(
                        "parameter {} after {:?} cannot be {}; expected {}",
                        index,
                        rest,
                        describe(param),
                        context.expects()
                    ));
                }
            }

            rest = tail;
        }

        out.push_str(rest);

        Ok(())
    }
}

impl From<&'_ str> for SqlTemplate {
    fn from(sql: &str) -> Self {
        SqlTemplate::new(sql)
    }
}

impl From<String> for SqlTemplate {
    fn from(sql: String) -> Self {
        SqlTemplate::new(sql)
    }
}

impl Context {
    fn closer(self) -> char {
        match self {
            Context::Value => '\'',
            Context::Ident(quote) => quote,
            Context::List => ']',
            Context::Rows => '>',
            Context::Fragment => ')',
            Context::Pairs => '}',
        }
    }

    fn expects(self) -> &'static str {
        match self {
            Context::Value => "a value",
            Context::Ident(_) | Context::Fragment => "a string",
            Context::List => "a list",
            Context::Rows => "a list of objects",
            Context::Pairs => "an object",
        }
    }
}

/// Values that always render inline, even when placeholders are requested.
fn is_literal(value: &Value) -> bool {
    matches!(
        value,
        Value::Null
            | Value::Bool(_)
            | Value::Int(_)
            | Value::UInt(_)
            | Value::Double(_)
            | Value::Decimal(_)
            | Value::Date(_)
            | Value::DateTime(_)
            | Value::Bytes(_)
    )
}

fn describe(param: &Param) -> &'static str {
    match param {
        Param::Stream(_) => "a stream",
        Param::Value(Value::Null) => "NULL",
        Param::Value(Value::List(_)) => "a list",
        Param::Value(Value::Object(_)) => "an object",
        Param::Value(Value::String(_)) => "a string",
        Param::Value(_) => "a scalar",
    }
}

fn is_ident_char(ch: char) -> bool {
    ch.is_alphanumeric() || ch == '_' || ch == '$'
}

/// Split the opening character (and an `alias.` qualifier) off the text before a parameter.
fn split_opener(part: &str, index: usize) -> Result<(&str, Context, Option<&str>), Error> {
    let opener = part
        .chars()
        .next_back()
        .ok_or_else(|| err_template!("parameter {} is not preceded by a quoting character", index))?;

    let context = match opener {
        '\'' => Context::Value,
        '"' | '`' => Context::Ident(opener),
        '[' => Context::List,
        '<' => Context::Rows,
        '(' => Context::Fragment,
        '{' => Context::Pairs,
        _ => {
            return Err(err_template!(
                "parameter {} after {:?} is not preceded by a quoting character",
                index,
                part
            ));
        }
    };

    let head = &part[..part.len() - opener.len_utf8()];

    if matches!(context, Context::Fragment | Context::Pairs) {
        if let Some(before) = head.strip_suffix('.') {
            let start = before
                .char_indices()
                .rev()
                .find(|&(_, c)| !is_ident_char(c))
                .map_or(0, |(i, c)| i + c.len_utf8());

            if start < before.len() {
                return Ok((&before[..start], context, Some(&before[start..])));
            }
        }
    }

    Ok((head, context, None))
}

/// Split the closing character off the text after a parameter.
fn split_closer(part: &str, context: Context, index: usize) -> Result<(Joiner, &str), Error> {
    if context == Context::Pairs {
        if let Some(tail) = part.strip_prefix("&}") {
            return Ok((Joiner::And, tail));
        }

        if let Some(tail) = part.strip_prefix("|}") {
            return Ok((Joiner::Or, tail));
        }
    }

    part.strip_prefix(context.closer())
        .map(|tail| (Joiner::Comma, tail))
        .ok_or_else(|| {
            err_template!(
                "parameter {} must be followed by {:?}, found {:?}",
                index,
                context.closer(),
                part
            )
        })
}

fn write_list(out: &mut String, items: &[Value], nbe: bool) -> Result<(), Error> {
    out.push('(');

    if items.is_empty() {
        out.push_str("NULL");
    }

    for (n, item) in items.iter().enumerate() {
        if n > 0 {
            out.push_str(", ");
        }

        write_value(out, item, nbe)?;
    }

    out.push(')');

    Ok(())
}

fn write_rows(out: &mut String, rows: &[Value], nbe: bool) -> Result<(), Error> {
    let records = rows
        .iter()
        .map(|row| match row {
            Value::Object(record) => Ok(record),
            _ => Err(err_template!("row values must be objects, found {:?}", row)),
        })
        .collect::<Result<Vec<_>, Error>>()?;

    let Some(first) = records.first() else {
        return Err(Error::template("no rows to insert"));
    };

    out.push('(');

    for (n, column) in first.keys().enumerate() {
        if n > 0 {
            out.push_str(", ");
        }

        write_ident(out, column);
    }

    out.push_str(") VALUES ");

    for (n, record) in records.iter().enumerate() {
        if n > 0 {
            out.push_str(", ");
        }

        out.push('(');

        for (i, column) in first.keys().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }

            write_value(out, record.get(column).unwrap_or(&Value::Null), nbe)?;
        }

        out.push(')');
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use indexmap::IndexMap;

    use super::*;

    fn object(pairs: &[(&str, Value)]) -> Value {
        Value::Object(
            pairs
                .iter()
                .map(|(k, v)| ((*k).to_owned(), v.clone()))
                .collect::<IndexMap<_, _>>(),
        )
    }

    fn compile(template: SqlTemplate) -> Result<String, Error> {
        template.compile(&CompileOptions::default())
    }

    #[test]
    fn it_escapes_values_for_backslash_mode() {
        let sql = compile(
            SqlTemplate::new("SELECT * FROM t WHERE name='")
                .param("O'Brien")
                .sql("'"),
        )
        .unwrap();

        assert_eq!(sql, r"SELECT * FROM t WHERE name='O\'Brien'");
        assert_eq!(sql.matches(r"\'").count(), 1);
    }

    #[test]
    fn it_escapes_values_without_backslashes() {
        let template = SqlTemplate::new("SELECT '").param(r"O'Brien\").sql("'");
        let options = CompileOptions {
            no_backslash_escapes: true,
            ..CompileOptions::default()
        };

        assert_eq!(template.compile(&options).unwrap(), r"SELECT 'O''Brien\'");
    }

    #[test]
    fn it_quotes_identifiers() {
        let sql = compile(
            SqlTemplate::new("SELECT `")
                .param("we`ird")
                .sql("` FROM \"")
                .param("t")
                .sql("\""),
        )
        .unwrap();

        assert_eq!(sql, "SELECT `we``ird` FROM `t`");
    }

    #[test]
    fn it_renders_lists() {
        let ids = Value::List(vec![1.into(), 2.into(), "x".into()]);

        assert_eq!(
            compile(SqlTemplate::new("WHERE id IN [").param(ids).sql("]")).unwrap(),
            "WHERE id IN (1, 2, 'x')"
        );
        assert_eq!(
            compile(SqlTemplate::new("IN [").param(Value::List(vec![])).sql("]")).unwrap(),
            "IN (NULL)"
        );
    }

    #[test]
    fn it_renders_rows() {
        let rows = Value::List(vec![
            object(&[("id", 1.into()), ("name", "a".into())]),
            object(&[("id", 2.into())]),
        ]);

        assert_eq!(
            compile(SqlTemplate::new("INSERT INTO t <").param(rows).sql(">")).unwrap(),
            "INSERT INTO t (`id`, `name`) VALUES (1, 'a'), (2, NULL)"
        );

        let err = compile(SqlTemplate::new("INSERT INTO t <").param(Value::List(vec![])).sql(">"))
            .unwrap_err();
        assert!(matches!(err, Error::Template(_)));
    }

    #[test]
    fn it_renders_pairs() {
        let pairs = object(&[("a", 1.into()), ("b", Value::Null)]);

        assert_eq!(
            compile(SqlTemplate::new("SET {").param(pairs.clone()).sql("}")).unwrap(),
            "SET `a`=1, `b`=NULL"
        );
        assert_eq!(
            compile(SqlTemplate::new("WHERE t.{").param(pairs.clone()).sql("&}")).unwrap(),
            "WHERE `t`.`a`=1 AND `t`.`b` IS NULL"
        );
        assert_eq!(
            compile(SqlTemplate::new("WHERE {").param(pairs).sql("|}")).unwrap(),
            "WHERE `a`=1 OR `b` IS NULL"
        );
    }

    #[test]
    fn it_renders_empty_conditions() {
        let empty = object(&[]);

        assert_eq!(
            compile(SqlTemplate::new("WHERE {").param(empty.clone()).sql("&}")).unwrap(),
            "WHERE TRUE"
        );
        assert_eq!(
            compile(SqlTemplate::new("WHERE {").param(empty.clone()).sql("|}")).unwrap(),
            "WHERE FALSE"
        );
        assert!(compile(SqlTemplate::new("SET {").param(empty).sql("}")).is_err());
    }

    #[test]
    fn it_validates_fragments_with_parent() {
        let sql = compile(
            SqlTemplate::new("SELECT * FROM users u WHERE u.(")
                .param("age > 18 AND lower(name) LIKE 'a%'")
                .sql(")"),
        )
        .unwrap();

        assert_eq!(
            sql,
            "SELECT * FROM users u WHERE (`u`.`age` > 18 AND lower(`u`.`name`) LIKE 'a%')"
        );
    }

    #[test]
    fn it_rejects_bad_contexts() {
        let err = compile(SqlTemplate::new("SELECT ").param(1).sql("")).unwrap_err();
        assert!(err.to_string().contains("\"SELECT \""), "{err}");

        let err = compile(SqlTemplate::new("SELECT '").param(1).sql(")")).unwrap_err();
        assert!(err.to_string().contains("must be followed by '\\''"), "{err}");

        let err = compile(SqlTemplate::new("IN [").param("x").sql("]")).unwrap_err();
        assert!(err.to_string().contains("expected a list"), "{err}");

        let err = compile(SqlTemplate::new("WHERE (").param("1; DROP TABLE t").sql(")")).unwrap_err();
        assert!(err.to_string().contains("1; DROP TABLE t"), "{err}");
    }

    #[test]
    fn it_refuses_to_inline_streams() {
        let template = SqlTemplate::new("SELECT '").param(Param::stream(&b"abc"[..])).sql("'");

        assert!(template.has_streams());
        assert!(compile(template).is_err());
    }

    #[test]
    fn it_compiles_deterministically_into_a_reused_buffer() {
        let template = SqlTemplate::new("SELECT '").param("a\\b").sql("', `").param("c").sql("`");
        let options = CompileOptions::default();

        let mut buf = String::from("garbage");
        template.compile_into(&mut buf, &options).unwrap();
        let first = buf.clone();

        template.compile_into(&mut buf, &options).unwrap();

        assert_eq!(first, r"SELECT 'a\\b', `c`");
        assert_eq!(buf, first);
    }

    #[test]
    fn it_keeps_scalars_inline_in_prepared_sql() {
        let template = SqlTemplate::new("SELECT '")
            .param(1)
            .sql("', '")
            .param(true)
            .sql("', '")
            .param("s")
            .sql("', '")
            .param(Value::Null)
            .sql("'");

        let (sql, params) = template.into_prepared(&CompileOptions::default()).unwrap();

        assert_eq!(sql, "SELECT 1, TRUE, ?, NULL");
        assert_eq!(params.len(), 1);
        assert!(matches!(&params[0], Param::Value(Value::String(s)) if s == "s"));
    }

    #[test]
    fn it_moves_values_into_placeholders() {
        let template = SqlTemplate::new("INSERT INTO t (`")
            .param("name")
            .sql("`, data) VALUES ('")
            .param("x")
            .sql("', '")
            .param(Param::stream(&b"abc"[..]))
            .sql("')");

        let (sql, params) = template.into_prepared(&CompileOptions::default()).unwrap();

        assert_eq!(sql, "INSERT INTO t (`name`, data) VALUES (?, ?)");
        assert_eq!(params.len(), 2);
        assert!(matches!(&params[0], Param::Value(Value::String(s)) if s == "x"));
        assert!(matches!(&params[1], Param::Stream(_)));
    }

    #[test]
    fn it_checks_part_counts() {
        assert!(SqlTemplate::from_parts(vec!["a".into()], vec![1.into()]).is_err());
        assert!(SqlTemplate::from_parts(vec!["'".into(), "'".into()], vec![1.into()]).is_ok());
    }
}
