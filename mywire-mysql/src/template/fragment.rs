//! Validation of raw SQL fragments bound in `(` position.
//!
//! A fragment may hold expressions: column names, literals, operators and calls of allowed
//! functions. Anything that could end the statement, start a comment or reach a variable
//! is rejected.

use crate::error::Error;
use crate::template::escape::write_ident;
use crate::template::SqlPolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Sql,
    SingleQuote,
    DoubleQuote,
    Backtick,
}

fn is_ident_start(ch: char) -> bool {
    ch.is_alphabetic() || ch == '_' || ch == '$'
}

fn is_ident_char(ch: char) -> bool {
    ch.is_alphanumeric() || ch == '_' || ch == '$'
}

/// Append `fragment` to `out`, quoting unknown identifiers and normalizing quotes.
///
/// Unknown identifiers are qualified with `parent` when given, unless they already follow
/// a `.`.
pub(crate) fn write_fragment(
    out: &mut String,
    fragment: &str,
    parent: Option<&str>,
    policy: &dyn SqlPolicy,
    no_backslash_escapes: bool,
) -> Result<(), Error> {
    let fail = |reason: &str| err_template!("{} in SQL fragment {:?}", reason, fragment);

    let chars: Vec<char> = fragment.chars().collect();
    let mut state = State::Sql;
    let mut depth = 0_usize;
    let mut after_dot = false;
    let mut i = 0;

    while i < chars.len() {
        let ch = chars[i];
        let next = chars.get(i + 1).copied();

        match state {
            State::Sql => {
                match ch {
                    '\'' => {
                        out.push('\'');
                        state = State::SingleQuote;
                    }

                    '"' => {
                        out.push('`');
                        state = State::DoubleQuote;
                    }

                    '`' => {
                        out.push('`');
                        state = State::Backtick;
                    }

                    ';' | '@' | '[' | ']' | '{' | '}' => {
                        return Err(fail(&format!("disallowed character {ch:?}")));
                    }

                    '#' => return Err(fail("comment")),
                    '-' if next == Some('-') => return Err(fail("comment")),
                    '/' if next == Some('*') => return Err(fail("comment")),

                    '(' => {
                        depth += 1;
                        out.push(ch);
                    }

                    ')' => {
                        depth = depth.checked_sub(1).ok_or_else(|| fail("unbalanced ')'"))?;
                        out.push(ch);
                    }

                    ',' if depth == 0 => return Err(fail("top-level comma")),

                    _ if ch.is_ascii_digit() => {
                        let start = i;
                        i += 1;

                        while let Some(&c) = chars.get(i) {
                            let exponent_sign = matches!(c, '+' | '-')
                                && matches!(chars[i - 1], 'e' | 'E')
                                && chars[start..i].iter().all(|c| c.is_ascii_digit() || matches!(*c, '.' | 'e' | 'E'));

                            if c.is_ascii_alphanumeric() || c == '.' || exponent_sign {
                                i += 1;
                            } else {
                                break;
                            }
                        }

                        out.extend(&chars[start..i]);
                        after_dot = false;
                        continue;
                    }

                    _ if is_ident_start(ch) => {
                        let start = i;
                        while chars.get(i).is_some_and(|&c| is_ident_char(c)) {
                            i += 1;
                        }

                        let word: String = chars[start..i].iter().collect();

                        match chars.get(i) {
                            Some('(') if !after_dot => {
                                if !policy.is_function_allowed(&word)
                                    && !policy.is_ident_allowed(&word)
                                {
                                    return Err(fail(&format!("disallowed function {word}")));
                                }

                                out.push_str(&word);
                            }

                            // a qualifier, or a name already qualified by one
                            Some('.') => write_ident(out, &word),
                            _ if after_dot => write_ident(out, &word),

                            _ if policy.is_ident_allowed(&word) => out.push_str(&word),

                            _ => {
                                if let Some(parent) = parent {
                                    write_ident(out, parent);
                                    out.push('.');
                                }

                                write_ident(out, &word);
                            }
                        }

                        after_dot = false;
                        continue;
                    }

                    _ => out.push(ch),
                }

                after_dot = ch == '.';
            }

            State::SingleQuote => match ch {
                '\\' if !no_backslash_escapes => out.push_str("\\\\"),

                '\'' if next == Some('\'') => {
                    out.push_str("''");
                    i += 1;
                }

                '\'' => {
                    out.push('\'');
                    state = State::Sql;
                }

                _ => out.push(ch),
            },

            State::DoubleQuote => match ch {
                '"' if next == Some('"') => {
                    out.push('"');
                    i += 1;
                }

                '"' => {
                    out.push('`');
                    state = State::Sql;
                }

                '`' => out.push_str("``"),

                _ => out.push(ch),
            },

            State::Backtick => match ch {
                '`' if next == Some('`') => {
                    out.push_str("``");
                    i += 1;
                }

                '`' => {
                    out.push('`');
                    state = State::Sql;
                }

                _ => out.push(ch),
            },
        }

        i += 1;
    }

    if state != State::Sql {
        return Err(fail("unterminated quote"));
    }

    if depth != 0 {
        return Err(fail("unbalanced '('"));
    }

    Ok(())
}
