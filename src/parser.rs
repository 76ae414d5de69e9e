//! SQL classification helpers: operation type, primary table, error codes.

use std::ops::Range;

use once_cell::sync::Lazy;
use regex::Regex;

/// SQL operation types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlOperation {
    Select,
    Insert,
    Update,
    Delete,
    Replace,
    Explain,
    Show,
    Create,
    Drop,
    Alter,
    Other,
}

impl SqlOperation {
    /// Returns the operation as a string suitable for span names.
    pub fn as_str(&self) -> &'static str {
        match self {
            SqlOperation::Select => "SELECT",
            SqlOperation::Insert => "INSERT",
            SqlOperation::Update => "UPDATE",
            SqlOperation::Delete => "DELETE",
            SqlOperation::Replace => "REPLACE",
            SqlOperation::Explain => "EXPLAIN",
            SqlOperation::Show => "SHOW",
            SqlOperation::Create => "CREATE",
            SqlOperation::Drop => "DROP",
            SqlOperation::Alter => "ALTER",
            SqlOperation::Other => "QUERY",
        }
    }

    /// Whether a statement of this kind produces a result set.
    pub fn returns_rows(&self) -> bool {
        matches!(
            self,
            SqlOperation::Select | SqlOperation::Explain | SqlOperation::Show
        )
    }

    fn table_pattern(&self) -> Option<&'static Regex> {
        let regex = match self {
            SqlOperation::Select | SqlOperation::Delete => &*FROM_TABLE_REGEX,
            SqlOperation::Insert | SqlOperation::Replace => &*INTO_TABLE_REGEX,
            SqlOperation::Update => &*UPDATE_TABLE_REGEX,
            SqlOperation::Create | SqlOperation::Drop | SqlOperation::Alter => {
                &*DDL_TABLE_REGEX
            }
            _ => return None,
        };
        Some(regex)
    }
}

impl std::fmt::Display for SqlOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

static FROM_TABLE_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)\bFROM\s+[`"\[]?(\w+)[`"\]]?"#).unwrap());

static INTO_TABLE_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)\bINTO\s+[`"\[]?(\w+)[`"\]]?"#).unwrap());

static UPDATE_TABLE_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)\bUPDATE\s+(?:LOW_PRIORITY\s+|IGNORE\s+)*[`"\[]?(\w+)[`"\]]?"#).unwrap());

static DDL_TABLE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)\bTABLE\s+(?:IF\s+(?:NOT\s+)?EXISTS\s+)?[`"\[]?(\w+)[`"\]]?"#).unwrap()
});

// PDO style `SQLSTATE[23000]`, MySQL style `(23000)`, Postgres style `SQLSTATE 23505`
static SQLSTATE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"SQLSTATE\s*\[?\s*([0-9A-Z]{5})\b|\(([0-9A-Z]{5})\)").unwrap()
});

/// Parse the SQL operation type from a query string.
pub fn parse_operation(sql: &str) -> SqlOperation {
    let trimmed = sql.trim_start_matches(|c: char| c.is_whitespace() || c == '(');
    let keyword: String = trimmed
        .chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .collect::<String>()
        .to_uppercase();

    match keyword.as_str() {
        "SELECT" | "WITH" | "VALUES" => SqlOperation::Select,
        "INSERT" => SqlOperation::Insert,
        "UPDATE" => SqlOperation::Update,
        "DELETE" => SqlOperation::Delete,
        "REPLACE" => SqlOperation::Replace,
        "EXPLAIN" | "DESCRIBE" | "DESC" => SqlOperation::Explain,
        "SHOW" => SqlOperation::Show,
        "CREATE" => SqlOperation::Create,
        "DROP" => SqlOperation::Drop,
        "ALTER" => SqlOperation::Alter,
        _ => SqlOperation::Other,
    }
}

/// Whether the statement is a plain `SELECT` that EXPLAIN can analyse.
///
/// Leading whitespace and opening parentheses are ignored; the keyword must be
/// followed by whitespace.
pub fn is_select_statement(sql: &str) -> bool {
    let trimmed = sql
        .trim_start_matches(|c: char| c.is_whitespace() || c == '(')
        .as_bytes();
    trimmed.len() > 6
        && trimmed[..6].eq_ignore_ascii_case(b"select")
        && trimmed[6].is_ascii_whitespace()
}

/// Extract the primary table name from a SQL query.
///
/// Returns `None` if the table cannot be determined.
pub fn extract_table(sql: &str) -> Option<String> {
    parse_operation(sql)
        .table_pattern()?
        .captures(sql)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_lowercase())
}

/// Find a five character SQLSTATE code in a driver error message.
pub fn extract_sqlstate(message: &str) -> Option<String> {
    SQLSTATE_REGEX
        .captures(message)
        .and_then(|caps| caps.get(1).or_else(|| caps.get(2)))
        .map(|m| m.as_str().to_string())
}

/// Byte ranges of single-quoted literals, quotes included.
///
/// A backslash inside a literal escapes the next byte. An unterminated
/// literal runs to the end of the text.
pub(crate) fn quoted_ranges(sql: &str) -> Vec<Range<usize>> {
    let bytes = sql.as_bytes();
    let mut ranges = Vec::new();
    let mut open = None;
    let mut i = 0;
    while i < bytes.len() {
        match (bytes[i], open) {
            (b'\\', Some(_)) => i += 1,
            (b'\'', None) => open = Some(i),
            (b'\'', Some(start)) => {
                ranges.push(start..i + 1);
                open = None;
            }
            _ => {}
        }
        i += 1;
    }
    if let Some(start) = open {
        ranges.push(start..bytes.len());
    }
    ranges
}

/// Whether byte offset `pos` falls inside one of `ranges`.
pub(crate) fn in_ranges(ranges: &[Range<usize>], pos: usize) -> bool {
    ranges.iter().any(|range| range.contains(&pos))
}

/// Parsed SQL information for span creation.
#[derive(Debug)]
pub struct ParsedSql {
    pub operation: SqlOperation,
    pub table: Option<String>,
}

impl ParsedSql {
    /// Parse a SQL statement and extract operation and table information.
    pub fn parse(sql: &str) -> Self {
        let operation = parse_operation(sql);
        let table = extract_table(sql);
        Self { operation, table }
    }

    /// Format: "{OPERATION} {table}" or "{OPERATION}"
    pub fn span_name(&self) -> String {
        match &self.table {
            Some(table) => format!("{} {}", self.operation.as_str(), table),
            None => self.operation.as_str().to_string(),
        }
    }
}
