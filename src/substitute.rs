//! Inline bound parameter values into SQL text for display.
//!
//! The result is only ever shown to people. It is never sent to the database,
//! so dropping a parameter that has no placeholder left is harmless.

use std::ops::Range;

use once_cell::sync::Lazy;
use regex::{NoExpand, Regex};

use crate::param::{ParamKey, ParamType, Parameter};
use crate::parser::{in_ranges, quoted_ranges};

// Postgres style `$1`, `$2`, ...
static NUMBERED_PLACEHOLDER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\$(\d+)").unwrap());

/// Replace placeholders in `sql` with rendered parameter values.
///
/// Ordinal parameters fill numbered `$n` placeholders when the query has any.
/// Otherwise they are applied in ascending position, each one consuming the
/// next `?` after the previous substitution. Named parameters follow in
/// lexicographic order and replace every occurrence of their `:name` token.
pub fn substitute_parameters(sql: &str, params: &[Parameter], pretty: bool) -> String {
    let mut ordered: Vec<&Parameter> = params.iter().collect();
    ordered.sort_by(|a, b| a.key.cmp(&b.key));
    let (ordinals, named): (Vec<&Parameter>, Vec<&Parameter>) =
        ordered.into_iter().partition(|param| param.key.is_position());

    let placeholders = numbered_placeholders(sql);
    let mut query = if placeholders.is_empty() {
        substitute_question_marks(sql, &ordinals, pretty)
    } else {
        substitute_numbered(sql, &placeholders, &ordinals, pretty)
    };

    for param in named {
        let Some(token) = param.key.token() else {
            continue;
        };
        let value = render(param, pretty, &token);
        if let Ok(pattern) = Regex::new(&format!(r"{}\b", regex::escape(&token))) {
            query = pattern.replace_all(&query, NoExpand(&value)).into_owned();
        }
    }
    query
}

fn substitute_question_marks(sql: &str, ordinals: &[&Parameter], pretty: bool) -> String {
    let mut query = sql.to_string();
    let mut cursor = 0;
    for param in ordinals {
        let value = render(param, pretty, "?");
        if let Some(pos) = next_placeholder(&query, cursor) {
            query.replace_range(pos..pos + 1, &value);
            cursor = pos + value.len();
        }
    }
    query
}

/// Single pass over the numbered placeholders, so rendered values are never rescanned.
fn substitute_numbered(
    sql: &str,
    placeholders: &[(Range<usize>, usize)],
    ordinals: &[&Parameter],
    pretty: bool,
) -> String {
    let mut query = String::with_capacity(sql.len());
    let mut last = 0;
    for (range, number) in placeholders {
        let param = ordinals
            .iter()
            .find(|param| param.key == ParamKey::Position(*number));
        let Some(param) = param else {
            continue;
        };
        query.push_str(&sql[last..range.start]);
        query.push_str(&render(param, pretty, &sql[range.clone()]));
        last = range.end;
    }
    query.push_str(&sql[last..]);
    query
}

/// `$n` placeholders outside quoted literals, with their numbers.
fn numbered_placeholders(sql: &str) -> Vec<(Range<usize>, usize)> {
    let literals = quoted_ranges(sql);
    NUMBERED_PLACEHOLDER
        .captures_iter(sql)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            if in_ranges(&literals, whole.start()) {
                return None;
            }
            let number = caps[1].parse().ok()?;
            Some((whole.range(), number))
        })
        .collect()
}

/// Byte offset of the next `?` at or after `from` that is not inside a quoted literal.
fn next_placeholder(sql: &str, from: usize) -> Option<usize> {
    let literals = quoted_ranges(sql);
    sql[from..]
        .match_indices('?')
        .map(|(offset, _)| from + offset)
        .find(|pos| !in_ranges(&literals, *pos))
}

fn render(param: &Parameter, pretty: bool, placeholder: &str) -> String {
    let literal = match param.param_type {
        ParamType::Str => quote(&param.value.to_text()),
        ParamType::Int => param.value.to_int().to_string(),
        ParamType::Bool => {
            if param.value.is_truthy() {
                "true".to_string()
            } else {
                "false".to_string()
            }
        }
        ParamType::Other => "data".to_string(),
    };
    if !pretty {
        return literal;
    }

    let shown = match param.param_type {
        ParamType::Str => param.value.to_text(),
        _ => literal.clone(),
    };
    let marker = match placeholder {
        "?" => "&#63;".to_string(),
        other => escape_html(other),
    };
    format!(
        r#"<abbr title="{}" data-escaped="{}">{}</abbr>"#,
        escape_html(&shown),
        escape_html(&literal),
        marker
    )
}

fn quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('\'');
    for c in value.chars() {
        match c {
            '\'' | '"' | '\\' => {
                out.push('\\');
                out.push(c);
            }
            '\0' => out.push_str("\\0"),
            _ => out.push(c),
        }
    }
    out.push('\'');
    out
}

fn escape_html(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#039;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::param::ParamValue;

    #[test]
    fn test_single_string_parameter() {
        let params = [Parameter::positional(0, "x", ParamType::Str)];
        assert_eq!(
            substitute_parameters("select * from t where c = ?", &params, false),
            "select * from t where c = 'x'"
        );
    }

    #[test]
    fn test_ordinals_consume_left_to_right() {
        let params = [
            Parameter::positional(2, 5i64, ParamType::Int),
            Parameter::positional(1, "a", ParamType::Str),
        ];
        assert_eq!(
            substitute_parameters("select * from t where a = ? and b = ?", &params, false),
            "select * from t where a = 'a' and b = 5"
        );
    }

    #[test]
    fn test_extra_ordinals_are_dropped() {
        let params = [
            Parameter::positional(1, 1i64, ParamType::Int),
            Parameter::positional(2, 2i64, ParamType::Int),
        ];
        assert_eq!(
            substitute_parameters("delete from t where id = ?", &params, false),
            "delete from t where id = 1"
        );
    }

    #[test]
    fn test_question_marks_in_values_and_literals() {
        let params = [
            Parameter::positional(1, "what?", ParamType::Str),
            Parameter::positional(2, 3i64, ParamType::Int),
        ];
        assert_eq!(
            substitute_parameters("insert into t values (?, '?', ?)", &params, false),
            "insert into t values ('what?', '?', 3)"
        );
    }

    #[test]
    fn test_named_replaces_every_occurrence() {
        let params = [Parameter::named(":id", 7i64, ParamType::Int)];
        assert_eq!(
            substitute_parameters(
                "select * from t where id = :id or parent = :id or x = :identifier",
                &params,
                false
            ),
            "select * from t where id = 7 or parent = 7 or x = :identifier"
        );

        let params = [Parameter::named("name", "bob", ParamType::Str)];
        assert_eq!(
            substitute_parameters("select * from t where name = :name", &params, false),
            "select * from t where name = 'bob'"
        );
    }

    #[test]
    fn test_value_rendering_by_type() {
        let params = [
            Parameter::positional(1, "O'Reilly", ParamType::Str),
            Parameter::positional(2, "12abc", ParamType::Int),
            Parameter::positional(3, 1i64, ParamType::Bool),
            Parameter::positional(4, ParamValue::Null, ParamType::Bool),
            Parameter::positional(5, vec![0u8, 1, 2], ParamType::Other),
        ];
        assert_eq!(
            substitute_parameters("call p(?, ?, ?, ?, ?)", &params, false),
            r"call p('O\'Reilly', 12, true, false, data)"
        );
    }

    #[test]
    fn test_pretty_annotation() {
        let params = [
            Parameter::positional(1, "a<b", ParamType::Str),
            Parameter::named(":n", 2i64, ParamType::Int),
        ];
        assert_eq!(
            substitute_parameters("select ? from t where n = :n", &params, true),
            concat!(
                r#"select <abbr title="a&lt;b" data-escaped="&#039;a&lt;b&#039;">&#63;</abbr> "#,
                r#"from t where n = <abbr title="2" data-escaped="2">:n</abbr>"#
            )
        );
    }

    #[test]
    fn test_numbered_placeholders() {
        let params = [
            Parameter::positional(1, 7i64, ParamType::Int),
            Parameter::positional(2, "bob", ParamType::Str),
        ];
        assert_eq!(
            substitute_parameters(
                r#"SELECT "users"."id" FROM "users" WHERE "users"."id" = $1 AND "users"."name" = $2"#,
                &params,
                false
            ),
            r#"SELECT "users"."id" FROM "users" WHERE "users"."id" = 7 AND "users"."name" = 'bob'"#
        );
    }

    #[test]
    fn test_numbered_placeholders_by_number() {
        let params = [
            Parameter::positional(1, "$2", ParamType::Str),
            Parameter::positional(2, 3i64, ParamType::Int),
        ];
        assert_eq!(
            substitute_parameters("select $2, $1, '$1' from t where a = $1 and b = $12", &params, false),
            "select 3, '$2', '$1' from t where a = '$2' and b = $12"
        );
        assert_eq!(
            substitute_parameters("select * from t where id = $1", &params[1..], true),
            "select * from t where id = $1"
        );
        assert_eq!(
            substitute_parameters("select * from t where id = $2", &params[1..], true),
            r#"select * from t where id = <abbr title="3" data-escaped="3">$2</abbr>"#
        );
    }

    #[test]
    fn test_is_pure() {
        let params = [
            Parameter::named(":b", "y", ParamType::Str),
            Parameter::positional(1, "x", ParamType::Str),
        ];
        let sql = "select * from t where a = ? and b = :b";
        let first = substitute_parameters(sql, &params, false);
        assert_eq!(first, substitute_parameters(sql, &params, false));
        assert_eq!(first, "select * from t where a = 'x' and b = 'y'");
    }
}
