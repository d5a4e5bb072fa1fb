//! Token scanners: keywords, signs and integers.

use super::cursor::SourceCursor;

pub fn is_ident_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '_'
}

/// Consumes `keyword` only when it is not the prefix of a longer identifier.
pub fn scan_keyword(cursor: &mut SourceCursor<'_>, keyword: &str) -> bool {
    cursor.begin_scope();
    let matched = cursor.advance_if_str(keyword) && !cursor.peek().is_some_and(is_ident_char);
    cursor.end_scope(!matched);
    matched
}

/// Consumes a leading `+` or `-`.
pub fn scan_sign(cursor: &mut SourceCursor<'_>) -> Option<char> {
    match cursor.peek() {
        Some(sign @ ('+' | '-')) => {
            cursor.advance();
            Some(sign)
        }
        _ => None,
    }
}

/// Consumes `['+'|'-'] digit+`. Literals that do not fit an `i64` are not integers.
pub fn scan_integer(cursor: &mut SourceCursor<'_>) -> Option<i64> {
    cursor.begin_scope();
    let start = cursor.position();
    scan_sign(cursor);

    let digits = cursor.position();
    while cursor.peek().is_some_and(|ch| ch.is_ascii_digit()) {
        cursor.advance();
    }

    let value = if cursor.position() > digits {
        cursor.text()[start..cursor.position()].parse::<i64>().ok()
    } else {
        None
    };
    cursor.end_scope(value.is_none());
    value
}
