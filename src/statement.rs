//! Statement text generation.
//!
//! Turns a command mode, its text and its parameters into the SQL handed to
//! the driver:
//!
//! | Mode            | Text sent                                     |
//! |-----------------|-----------------------------------------------|
//! | Function        | `SELECT * FROM name(arg => $1, $2)`           |
//! | Query           | caller text, `@name` bound to `$n`            |
//! | StoredProcedure | caller text, `@name` bound to `$n`            |
//! | cursor fetch    | `FETCH ALL IN "cursor";`                      |
//!
//! A statement without parameters goes over the simple-query protocol and
//! may hold several `;`-separated statements, each producing its own result
//! set. A statement with parameters is sent through the extended protocol
//! and must be a single statement.

use crate::param::Parameter;

/// How a command's text is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandMode {
    /// Stored-function invocation by name.
    Function,
    /// Raw SQL text.
    Query,
    /// `CALL` expression whose rows come back through a ref cursor.
    StoredProcedure,
}

/// A statement ready for the driver.
#[derive(Debug, Clone)]
pub struct Statement {
    text: String,
    parameters: Vec<Parameter>,
    prepared: bool,
}

impl Statement {
    /// Build the statement for `mode` from the configured text.
    ///
    /// Preparation only applies to statements with parameters.
    pub fn for_mode(mode: CommandMode, text: &str, parameters: Vec<Parameter>, prepared: bool) -> Self {
        let text = match mode {
            CommandMode::Function => function_call_sql(text, &parameters),
            CommandMode::Query | CommandMode::StoredProcedure => {
                bind_named_placeholders(text, &parameters)
            }
        };
        let prepared = prepared && !parameters.is_empty();
        Self {
            text,
            parameters,
            prepared,
        }
    }

    /// `FETCH ALL IN "<cursor>";` with the name inserted verbatim.
    pub fn fetch_all(cursor: &str) -> Self {
        Self {
            text: format!("FETCH ALL IN \"{cursor}\";"),
            parameters: Vec::new(),
            prepared: false,
        }
    }

    /// SQL text sent to the server.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Parameters in binding order (`$1` is the first).
    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    /// Whether the statement should be prepared and cached server-side.
    pub fn is_prepared(&self) -> bool {
        self.prepared
    }

    /// No parameters: sent as plain text, possibly several statements.
    pub fn is_simple(&self) -> bool {
        self.parameters.is_empty()
    }
}

/// `SELECT * FROM name(...)`, named notation for named parameters.
fn function_call_sql(name: &str, parameters: &[Parameter]) -> String {
    let args: Vec<String> = parameters
        .iter()
        .enumerate()
        .map(|(i, p)| {
            if p.name().is_empty() {
                format!("${}", i + 1)
            } else {
                format!("{} => ${}", p.name(), i + 1)
            }
        })
        .collect();
    format!("SELECT * FROM {}({})", name.trim(), args.join(", "))
}

/// Replace `@name` with `$n` for each bound parameter name.
///
/// Quoted literals, quoted identifiers, dollar-quoted bodies and comments are
/// copied unchanged, as is any `@` not followed by a bound parameter name.
fn bind_named_placeholders(text: &str, parameters: &[Parameter]) -> String {
    if parameters.is_empty() || !text.contains('@') {
        return text.to_string();
    }

    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len() + 8);
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();
        let end = match (c, next) {
            ('\'', _) | ('"', _) => skip_quoted(&chars, i, c),
            ('-', Some('-')) => skip_line_comment(&chars, i),
            ('/', Some('*')) => skip_block_comment(&chars, i),
            ('$', _) => skip_dollar_quoted(&chars, i).unwrap_or(i + 1),
            ('@', Some(n)) if is_ident_start(n) => {
                let mut end = i + 1;
                while end < chars.len() && is_ident_char(chars[end]) {
                    end += 1;
                }
                let name: String = chars[i + 1..end].iter().collect();
                if let Some(position) = parameters
                    .iter()
                    .position(|p| p.name().eq_ignore_ascii_case(&name))
                {
                    out.push_str(&format!("${}", position + 1));
                    i = end;
                    continue;
                }
                end
            }
            _ => i + 1,
        };
        out.extend(&chars[i..end]);
        i = end;
    }

    out
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// End (exclusive) of a quoted run starting at `start`; doubled quotes escape.
fn skip_quoted(chars: &[char], start: usize, quote: char) -> usize {
    let mut i = start + 1;
    while i < chars.len() {
        if chars[i] == quote {
            if chars.get(i + 1) == Some(&quote) {
                i += 2;
                continue;
            }
            return i + 1;
        }
        i += 1;
    }
    chars.len()
}

fn skip_line_comment(chars: &[char], start: usize) -> usize {
    chars[start..]
        .iter()
        .position(|&c| c == '\n')
        .map(|p| start + p + 1)
        .unwrap_or(chars.len())
}

/// Block comments nest in PostgreSQL.
fn skip_block_comment(chars: &[char], start: usize) -> usize {
    let mut depth = 0usize;
    let mut i = start;
    while i + 1 < chars.len() {
        match (chars[i], chars[i + 1]) {
            ('/', '*') => {
                depth += 1;
                i += 2;
            }
            ('*', '/') => {
                depth -= 1;
                i += 2;
                if depth == 0 {
                    return i;
                }
            }
            _ => i += 1,
        }
    }
    chars.len()
}

/// `$tag$ ... $tag$`; `None` when `$` does not open a dollar quote (e.g. `$1`).
fn skip_dollar_quoted(chars: &[char], start: usize) -> Option<usize> {
    let mut i = start + 1;
    if chars.get(i).is_some_and(|c| c.is_ascii_digit()) {
        return None;
    }
    while i < chars.len() && is_ident_char(chars[i]) {
        i += 1;
    }
    if chars.get(i) != Some(&'$') {
        return None;
    }
    let tag = &chars[start..=i];
    let mut j = i + 1;
    while j + tag.len() <= chars.len() {
        if &chars[j..j + tag.len()] == tag {
            return Some(j + tag.len());
        }
        j += 1;
    }
    Some(chars.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::param::ParamValue;
    use pretty_assertions::assert_eq;

    fn params(names: &[&str]) -> Vec<Parameter> {
        names
            .iter()
            .map(|n| Parameter::new(n, ParamValue::Integer(Some(1))))
            .collect()
    }

    #[test]
    fn test_function_call_named_notation() {
        let stmt = Statement::for_mode(
            CommandMode::Function,
            "public.get_user",
            params(&["user_id", "active"]),
            true,
        );
        assert_eq!(
            stmt.text(),
            "SELECT * FROM public.get_user(user_id => $1, active => $2)"
        );
    }

    #[test]
    fn test_function_call_positional_and_empty() {
        let stmt = Statement::for_mode(CommandMode::Function, "now_utc", vec![], true);
        assert_eq!(stmt.text(), "SELECT * FROM now_utc()");

        let stmt = Statement::for_mode(CommandMode::Function, "f", params(&[""]), true);
        assert_eq!(stmt.text(), "SELECT * FROM f($1)");
    }

    #[test]
    fn test_fetch_all_is_verbatim() {
        assert_eq!(Statement::fetch_all("cur1").text(), "FETCH ALL IN \"cur1\";");
        assert!(!Statement::fetch_all("cur1").is_prepared());
    }

    #[test]
    fn test_parameterless_statements_are_simple_and_unprepared() {
        let stmt = Statement::for_mode(CommandMode::Query, "select 1; select 2", vec![], true);
        assert!(stmt.is_simple());
        assert!(!stmt.is_prepared());

        let stmt = Statement::for_mode(CommandMode::Query, "select @id", params(&["id"]), true);
        assert!(!stmt.is_simple());
        assert!(stmt.is_prepared());
    }

    #[test]
    fn test_named_placeholders_bound() {
        let sql = bind_named_placeholders(
            "select * from users where id = @id and email = @Email",
            &params(&["email", "id"]),
        );
        assert_eq!(sql, "select * from users where id = $2 and email = $1");
    }

    #[test]
    fn test_placeholders_skip_literals_and_comments() {
        let sql = bind_named_placeholders(
            "select '@id', \"@id\", $f$ @id $f$ -- @id\n, /* @id /* @id */ */ @id",
            &params(&["id"]),
        );
        assert_eq!(
            sql,
            "select '@id', \"@id\", $f$ @id $f$ -- @id\n, /* @id /* @id */ */ $1"
        );
    }

    #[test]
    fn test_operators_and_positional_untouched() {
        let sql = bind_named_placeholders(
            "select tags @> $1, doc @@ @query, @unknown",
            &params(&["tags", "query"]),
        );
        assert_eq!(sql, "select tags @> $1, doc @@ $2, @unknown");
    }
}
