//! Read-only allow-list for model-generated SQL.
//!
//! LLM output is untrusted text. Before anything reaches a database it must
//! be a single `SELECT` (or `WITH ... SELECT`) statement with no write, DDL
//! or administrative keyword outside string literals, quoted identifiers and
//! comments.
//!
//! Tokenizing follows the target engine's quoting and comment rules. Where
//! the server's own settings decide how a literal ends (backslash escapes
//! under PostgreSQL `standard_conforming_strings` or MySQL
//! `NO_BACKSLASH_ESCAPES`), the statement must pass under both readings.

use crate::errors::{AppError, AppResult};
use crate::models::connection::DbEngine;

/// Statements must start with one of these keywords.
const ALLOWED_LEADING: [&str; 2] = ["SELECT", "WITH"];

/// Keywords that never appear in a read-only query.
const FORBIDDEN_KEYWORDS: [&str; 32] = [
    "INSERT", "UPDATE", "DELETE", "MERGE", "UPSERT", "REPLACE", "DROP", "CREATE", "ALTER",
    "TRUNCATE", "RENAME", "GRANT", "REVOKE", "ATTACH", "DETACH", "PRAGMA", "VACUUM", "REINDEX",
    "ANALYZE", "COPY", "CALL", "EXEC", "EXECUTE", "LOCK", "UNLOCK", "INTO", "LOAD", "HANDLER",
    "SET", "COMMIT", "ROLLBACK", "SAVEPOINT",
];

/// Keywords that double as scalar string functions (`REPLACE(s, a, b)`,
/// MySQL `INSERT(s, pos, len, new)`); allowed when used as a call.
const FUNCTION_KEYWORDS: [&str; 2] = ["REPLACE", "INSERT"];

/// A bare word found outside literals and comments.
#[derive(Debug, PartialEq, Eq)]
struct Word {
    upper: String,
    is_call: bool,
}

/// Result of scanning a statement.
#[derive(Debug, Default)]
struct Scan {
    words: Vec<Word>,
    /// Byte offset of the first top-level `;`.
    terminator: Option<usize>,
    /// Whether any token follows the first `;`.
    trailing_tokens: bool,
}

/// Validates SQL statements before execution.
pub struct SqlGuard;

impl SqlGuard {
    /// Checks that `sql` is a single read-only query for `engine`.
    ///
    /// Returns the statement trimmed and without its trailing `;`.
    ///
    /// # Errors
    /// Returns `AppError::UnsafeSql` describing the first violation.
    pub fn check(sql: &str, engine: DbEngine) -> AppResult<String> {
        let mut accepted: Option<&str> = None;
        for rules in Rules::candidates(engine) {
            let statement = check_with(sql, rules)?;
            match accepted {
                Some(prev) if prev != statement => {
                    return Err(AppError::UnsafeSql(
                        "ambiguous string literal: statement ends differently depending on \
                         backslash escaping"
                            .into(),
                    ));
                }
                _ => accepted = Some(statement),
            }
        }
        accepted
            .map(str::to_string)
            .ok_or_else(|| AppError::UnsafeSql("empty statement".into()))
    }

    /// Returns true if `sql` passes [`SqlGuard::check`].
    pub fn is_read_only(sql: &str, engine: DbEngine) -> bool {
        Self::check(sql, engine).is_ok()
    }
}

fn check_with(sql: &str, rules: Rules) -> AppResult<&str> {
    let scan = scan(sql, rules)?;

    if scan.trailing_tokens {
        return Err(AppError::UnsafeSql(
            "multiple statements are not allowed".into(),
        ));
    }

    let first = scan
        .words
        .first()
        .ok_or_else(|| AppError::UnsafeSql("empty statement".into()))?;
    if !ALLOWED_LEADING.contains(&first.upper.as_str()) {
        return Err(AppError::UnsafeSql(format!(
            "only SELECT queries are allowed, got {}",
            first.upper
        )));
    }

    if let Some(word) = scan.words.iter().find(|w| is_forbidden(w)) {
        return Err(AppError::UnsafeSql(format!(
            "forbidden keyword: {}",
            word.upper
        )));
    }

    let statement = match scan.terminator {
        Some(end) => &sql[..end],
        None => sql,
    };
    Ok(statement.trim())
}

fn is_forbidden(word: &Word) -> bool {
    let keyword = word.upper.as_str();
    if !FORBIDDEN_KEYWORDS.contains(&keyword) {
        return false;
    }
    !(word.is_call && FUNCTION_KEYWORDS.contains(&keyword))
}

/// How a backslash inside an ordinary string literal is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Backslash {
    Plain,
    Escape,
}

/// Lexical rules of one engine under one backslash reading.
#[derive(Debug, Clone, Copy)]
struct Rules {
    engine: DbEngine,
    backslash: Backslash,
}

impl Rules {
    /// SQLite never treats backslash as an escape; the servers may.
    fn candidates(engine: DbEngine) -> Vec<Rules> {
        let readings: &[Backslash] = match engine {
            DbEngine::Sqlite => &[Backslash::Plain],
            DbEngine::Postgres | DbEngine::MySql => &[Backslash::Plain, Backslash::Escape],
        };
        readings
            .iter()
            .map(|&backslash| Rules { engine, backslash })
            .collect()
    }

    /// Returns the closing character if `c` opens a literal or quoted identifier.
    fn closing_quote(&self, c: char) -> Option<char> {
        match (self.engine, c) {
            (_, '\'' | '"') => Some(c),
            (DbEngine::MySql | DbEngine::Sqlite, '`') => Some('`'),
            (DbEngine::Sqlite, '[') => Some(']'),
            _ => None,
        }
    }

    fn backslash_escapes(&self, quote: char) -> bool {
        if self.backslash == Backslash::Plain {
            return false;
        }
        match self.engine {
            DbEngine::Postgres => quote == '\'',
            DbEngine::MySql => quote == '\'' || quote == '"',
            DbEngine::Sqlite => false,
        }
    }

    fn starts_line_comment(&self, c: char, next: Option<char>, after: Option<char>) -> bool {
        match (c, next) {
            // MySQL needs whitespace or a control character after `--`
            ('-', Some('-')) if self.engine == DbEngine::MySql => {
                after.map_or(true, |a| a.is_whitespace() || a.is_control())
            }
            ('-', Some('-')) => true,
            ('#', _) => self.engine == DbEngine::MySql,
            _ => false,
        }
    }
}

fn scan(sql: &str, rules: Rules) -> AppResult<Scan> {
    let chars: Vec<(usize, char)> = sql.char_indices().collect();
    let mut out = Scan::default();
    let mut i = 0;

    while i < chars.len() {
        let (offset, c) = chars[i];
        let next = peek(&chars, i + 1);

        if rules.starts_line_comment(c, next, peek(&chars, i + 2)) {
            while i < chars.len() && chars[i].1 != '\n' {
                i += 1;
            }
            continue;
        }

        if c == '/' && next == Some('*') {
            if rules.engine == DbEngine::MySql && peek(&chars, i + 2) == Some('!') {
                return Err(AppError::UnsafeSql(
                    "executable comments are not allowed".into(),
                ));
            }
            i = skip_block_comment(&chars, i, rules.engine == DbEngine::Postgres)?;
            continue;
        }

        if let Some(close) = rules.closing_quote(c) {
            i = skip_quoted(&chars, i, close, rules.backslash_escapes(c))?;
            out.mark_token();
            continue;
        }

        if c == '$' && rules.engine == DbEngine::Postgres {
            if let Some(tag_end) = dollar_tag(&chars, i) {
                i = skip_dollar_quoted(&chars, i, tag_end)?;
                out.mark_token();
                continue;
            }
        }

        match c {
            ';' => {
                if out.terminator.is_none() {
                    out.terminator = Some(offset);
                } else {
                    out.trailing_tokens = true;
                }
                i += 1;
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && is_word_char(chars[i].1) {
                    i += 1;
                }
                let upper: String = chars[start..i]
                    .iter()
                    .map(|&(_, c)| c.to_ascii_uppercase())
                    .collect();
                out.mark_token();

                // E'...' always takes backslash escapes
                if rules.engine == DbEngine::Postgres
                    && upper == "E"
                    && peek(&chars, i) == Some('\'')
                {
                    i = skip_quoted(&chars, i, '\'', true)?;
                    continue;
                }

                let is_call = chars[i..]
                    .iter()
                    .find(|(_, c)| !c.is_whitespace())
                    .is_some_and(|&(_, c)| c == '(');
                out.words.push(Word { upper, is_call });
            }
            c if c.is_whitespace() => i += 1,
            c if c.is_ascii_digit() => {
                while i < chars.len() && (chars[i].1.is_alphanumeric() || chars[i].1 == '.') {
                    i += 1;
                }
                out.mark_token();
            }
            _ => {
                i += 1;
                out.mark_token();
            }
        }
    }

    Ok(out)
}

impl Scan {
    fn mark_token(&mut self) {
        if self.terminator.is_some() {
            self.trailing_tokens = true;
        }
    }
}

fn peek(chars: &[(usize, char)], i: usize) -> Option<char> {
    chars.get(i).map(|&(_, c)| c)
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

/// Returns the index just past the closing quote. Doubled quotes escape.
fn skip_quoted(
    chars: &[(usize, char)],
    start: usize,
    close: char,
    backslash_escapes: bool,
) -> AppResult<usize> {
    let mut i = start + 1;
    while i < chars.len() {
        let c = chars[i].1;
        if c == '\\' && backslash_escapes {
            i += 2;
            continue;
        }
        if c == close {
            if peek(chars, i + 1) == Some(close) {
                i += 2;
                continue;
            }
            return Ok(i + 1);
        }
        i += 1;
    }
    Err(AppError::UnsafeSql("unterminated quoted string".into()))
}

/// Returns the index just past the closing `*/`.
fn skip_block_comment(chars: &[(usize, char)], start: usize, nested: bool) -> AppResult<usize> {
    let mut depth = 1;
    let mut i = start + 2;
    loop {
        match (peek(chars, i), peek(chars, i + 1)) {
            (Some('*'), Some('/')) => {
                depth -= 1;
                i += 2;
                if depth == 0 {
                    return Ok(i);
                }
            }
            (Some('/'), Some('*')) if nested => {
                depth += 1;
                i += 2;
            }
            (Some(_), _) => i += 1,
            (None, _) => return Err(AppError::UnsafeSql("unterminated comment".into())),
        }
    }
}

/// Index of the `$` closing a dollar-quote tag opened at `start`, if any.
///
/// `$1` is a positional parameter, not a tag.
fn dollar_tag(chars: &[(usize, char)], start: usize) -> Option<usize> {
    if peek(chars, start + 1).is_some_and(|c| c.is_ascii_digit()) {
        return None;
    }
    let mut i = start + 1;
    while let Some(c) = peek(chars, i) {
        match c {
            '$' => return Some(i),
            c if c.is_alphanumeric() || c == '_' => i += 1,
            _ => return None,
        }
    }
    None
}

/// Returns the index just past the tag that closes a dollar-quoted string.
fn skip_dollar_quoted(chars: &[(usize, char)], start: usize, tag_end: usize) -> AppResult<usize> {
    let tag = &chars[start..=tag_end];
    let mut i = tag_end + 1;
    while i + tag.len() <= chars.len() {
        let candidate = &chars[i..i + tag.len()];
        if candidate.iter().map(|&(_, c)| c).eq(tag.iter().map(|&(_, c)| c)) {
            return Ok(i + tag.len());
        }
        i += 1;
    }
    Err(AppError::UnsafeSql("unterminated dollar-quoted string".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const ENGINES: [DbEngine; 3] = [DbEngine::Postgres, DbEngine::MySql, DbEngine::Sqlite];

    fn rejected_on(engine: DbEngine, sql: &str) -> String {
        match SqlGuard::check(sql, engine) {
            Err(AppError::UnsafeSql(msg)) => msg,
            other => panic!("expected rejection for {sql:?} on {engine:?}, got {other:?}"),
        }
    }

    fn rejected(sql: &str) -> String {
        let msgs: Vec<String> = ENGINES.iter().map(|&e| rejected_on(e, sql)).collect();
        msgs.into_iter().next().unwrap()
    }

    fn allowed(sql: &str) -> bool {
        ENGINES.iter().all(|&e| SqlGuard::is_read_only(sql, e))
    }

    #[test]
    fn test_select_is_allowed() {
        for engine in ENGINES {
            assert_eq!(
                SqlGuard::check("SELECT * FROM customers", engine).unwrap(),
                "SELECT * FROM customers"
            );
        }
    }

    #[test]
    fn test_count_query_is_allowed_and_semicolon_stripped() {
        assert_eq!(
            SqlGuard::check("  SELECT COUNT(*) FROM customers;\n", DbEngine::Sqlite).unwrap(),
            "SELECT COUNT(*) FROM customers"
        );
    }

    #[test]
    fn test_cte_is_allowed() {
        let sql = "WITH totals AS (SELECT customer_id, SUM(total) AS t FROM orders GROUP BY customer_id) \
                   SELECT * FROM totals ORDER BY t DESC LIMIT 5";
        assert!(allowed(sql));
    }

    #[test]
    fn test_delete_is_rejected() {
        assert!(rejected("DELETE FROM customers").contains("DELETE"));
    }

    #[test]
    fn test_lowercase_drop_is_rejected() {
        assert!(rejected("drop table orders").contains("DROP"));
    }

    #[test]
    fn test_stacked_statement_is_rejected() {
        assert!(rejected("SELECT 1; DROP TABLE customers").contains("multiple"));
    }

    #[test]
    fn test_data_modifying_cte_is_rejected() {
        let msg = rejected("WITH gone AS (DELETE FROM orders RETURNING *) SELECT * FROM gone");
        assert!(msg.contains("DELETE"));
    }

    #[test]
    fn test_select_into_is_rejected() {
        assert!(rejected("SELECT * INTO backup FROM customers").contains("INTO"));
    }

    #[test]
    fn test_keywords_inside_literals_are_ignored() {
        assert!(allowed(
            "SELECT * FROM products WHERE name = 'Drop; DELETE everything'"
        ));
        assert!(allowed("SELECT \"update\" FROM \"insert\" -- delete later\n"));
        assert!(allowed("SELECT 1 /* truncate */"));
    }

    #[test]
    fn test_escaped_quote_does_not_end_literal() {
        assert!(allowed(
            "SELECT * FROM customers WHERE name = 'O''Brien; DROP TABLE x'"
        ));
    }

    #[test]
    fn test_replace_function_is_allowed() {
        assert!(allowed("SELECT REPLACE(email, '@', ' at ') FROM customers"));
        assert!(rejected("REPLACE INTO customers VALUES (1)").contains("REPLACE"));
    }

    #[test]
    fn test_identifiers_containing_keywords_are_allowed() {
        assert!(allowed("SELECT created_at, updated_by FROM orders"));
    }

    #[test]
    fn test_empty_and_comment_only_are_rejected() {
        assert!(rejected("").contains("empty"));
        assert!(rejected("  -- nothing here").contains("empty"));
    }

    #[test]
    fn test_unterminated_literal_is_rejected() {
        assert!(rejected("SELECT 'oops FROM customers").contains("unterminated"));
    }

    #[test]
    fn test_non_select_statements_are_rejected() {
        for sql in [
            "INSERT INTO customers (name) VALUES ('x')",
            "UPDATE products SET price = 0",
            "PRAGMA writable_schema = 1",
            "ATTACH DATABASE 'x.db' AS x",
            "SHOW TABLES",
        ] {
            for engine in ENGINES {
                assert!(!SqlGuard::is_read_only(sql, engine), "{sql} should be rejected");
            }
        }
    }

    #[test]
    fn test_backslash_before_quote_cannot_hide_statement() {
        let sql = "SELECT 'a\\' ; DELETE FROM orders; --'";
        for engine in ENGINES {
            assert!(!SqlGuard::is_read_only(sql, engine), "{engine:?}");
        }
        let msg = rejected_on(DbEngine::Postgres, "SELECT 'a\\' ; DELETE FROM orders; -- '");
        assert!(msg.contains("multiple"));
    }

    #[test]
    fn test_backslash_in_mysql_double_quotes_cannot_hide_statement() {
        let msg = rejected_on(DbEngine::MySql, "SELECT \"a\\\" ; DELETE FROM orders; -- \"");
        assert!(msg.contains("multiple"));
    }

    #[test]
    fn test_literal_ending_in_backslash_is_ambiguous_on_servers() {
        let sql = "SELECT 'C:\\' AS path";
        assert!(SqlGuard::is_read_only(sql, DbEngine::Sqlite));
        assert!(rejected_on(DbEngine::Postgres, sql).contains("unterminated"));
        assert!(rejected_on(DbEngine::MySql, sql).contains("unterminated"));
    }

    #[test]
    fn test_statement_that_ends_differently_per_reading_is_rejected() {
        let msg = rejected_on(DbEngine::Postgres, "SELECT 'x\\';--'");
        assert!(msg.contains("ambiguous"));
    }

    #[test]
    fn test_postgres_dollar_quotes() {
        let msg = rejected_on(DbEngine::Postgres, "SELECT $$'$$; DELETE FROM orders; --'");
        assert!(msg.contains("multiple"));

        assert_eq!(
            SqlGuard::check("SELECT $tag$it's; DROP$tag$ AS s", DbEngine::Postgres).unwrap(),
            "SELECT $tag$it's; DROP$tag$ AS s"
        );
        assert!(rejected_on(DbEngine::Postgres, "SELECT $x$never closed").contains("unterminated"));
        // positional parameters are not tags
        assert!(SqlGuard::is_read_only("SELECT $1, $2 FROM orders", DbEngine::Postgres));
    }

    #[test]
    fn test_postgres_escape_string_prefix() {
        assert!(SqlGuard::is_read_only("SELECT E'it\\'s' AS s", DbEngine::Postgres));
        let msg = rejected_on(DbEngine::Postgres, "SELECT E'\\'' ; DELETE FROM orders; --'");
        assert!(msg.contains("multiple"));
    }

    #[test]
    fn test_postgres_block_comments_nest() {
        let sql = "SELECT 1 /* outer /* inner */ ; DELETE FROM orders */";
        assert!(SqlGuard::is_read_only(sql, DbEngine::Postgres));
        assert!(rejected_on(DbEngine::Sqlite, sql).contains("multiple"));
    }

    #[test]
    fn test_mysql_hash_comment() {
        let sql = "SELECT 1 # '\n; DELETE FROM orders; -- '";
        assert!(rejected_on(DbEngine::MySql, sql).contains("multiple"));
        // `#` is an operator elsewhere, so the quote opens a literal
        assert!(SqlGuard::is_read_only(sql, DbEngine::Postgres));
        assert!(SqlGuard::is_read_only("SELECT id FROM orders # newest first\n", DbEngine::MySql));
    }

    #[test]
    fn test_mysql_double_dash_needs_whitespace() {
        let msg = rejected_on(DbEngine::MySql, "SELECT 1 --x; DELETE FROM orders");
        assert!(msg.contains("multiple"));
        assert!(SqlGuard::is_read_only("SELECT 5--1", DbEngine::MySql));
    }

    #[test]
    fn test_mysql_executable_comment_is_rejected() {
        let msg = rejected_on(DbEngine::MySql, "SELECT 1 /*!50000 ; DELETE FROM orders */");
        assert!(msg.contains("executable"));
    }

    #[test]
    fn test_sqlite_bracket_identifiers() {
        assert!(SqlGuard::is_read_only(
            "SELECT [delete; now] FROM [orders]",
            DbEngine::Sqlite
        ));
        assert!(!SqlGuard::is_read_only(
            "SELECT [delete; now] FROM [orders]",
            DbEngine::Postgres
        ));
    }

    #[test]
    fn test_backtick_identifiers() {
        assert!(SqlGuard::is_read_only("SELECT `drop` FROM `orders`", DbEngine::MySql));
        assert!(SqlGuard::is_read_only("SELECT `drop` FROM `orders`", DbEngine::Sqlite));
    }
}
