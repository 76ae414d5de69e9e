//! Display formatting for SQL text.
//!
//! These are heuristic rewrites over the raw string, not a SQL parser. The
//! output is meant for humans reading the query log and is not guaranteed to
//! be stable when fed back in.

use once_cell::sync::Lazy;
use regex::Regex;

static JOIN_WHERE_BREAK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?P<prev>\S) (?P<kw>(?:(?:left|right|outer|inner) )?join|where) ").unwrap()
});

static CLAUSE_BREAK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(?P<prev>\S) (?P<kw>order by|limit|having) ").unwrap());

static UNION_BREAK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?P<prev>\S) (?P<kw>union(?: (?:all|distinct))?) ").unwrap()
});

// Longer keywords sharing a prefix come first so `asc` is not read as `as`.
static KEYWORDS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"(?i)\b(select|set|from|explain|update|insert|replace|left|right|outer|inner|join|where|",
        r"order by|limit|asc|as|and|or|having|union|all|distinct|on|is|not|null|true|false|",
        r"desc|between|in)\b"
    ))
    .unwrap()
});

/// Break a query over several lines and wrap keywords in `<b>` tags.
pub fn format_query(sql: &str) -> String {
    let sql = JOIN_WHERE_BREAK.replace_all(sql, "${prev}\n  ${kw} ");
    let sql = CLAUSE_BREAK.replace_all(&sql, "${prev}\n    ${kw} ");
    let sql = UNION_BREAK.replace_all(&sql, "${prev}\n\n${kw}\n\n");
    emphasize_keywords(&sql)
}

fn emphasize_keywords(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len() + 32);
    let mut last = 0;
    for m in KEYWORDS.find_iter(sql) {
        let before = sql[..m.start()].chars().next_back();
        let after = sql[m.end()..].chars().next();
        if !(opens_keyword(before) && closes_keyword(after)) {
            continue;
        }
        out.push_str(&sql[last..m.start()]);
        out.push_str("<b>");
        out.push_str(m.as_str());
        out.push_str("</b>");
        last = m.end();
    }
    out.push_str(&sql[last..]);
    out
}

fn opens_keyword(c: Option<char>) -> bool {
    c.map_or(true, |c| c.is_whitespace() || c == '(')
}

fn closes_keyword(c: Option<char>) -> bool {
    c.map_or(true, |c| c.is_whitespace() || matches!(c, ')' | '(' | ','))
}
