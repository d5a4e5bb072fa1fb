//! Recursive-descent parser that evaluates while it parses.
//!
//! ```text
//! statement  := expression ';'?
//! expression := logical
//! logical    := addsub ( ('&'|'|'|'^') addsub )*
//! addsub     := muldiv ( ('+'|'-') muldiv )*
//! muldiv     := unary  ( ('*'|'/'|'%') unary )*
//! unary      := value ( '.' value )? | ('+'|'-') unary | '!' unary
//! value      := '(' expression ')' | literal
//! literal    := array | 'null' | 'newobj' | 'allobj' | 'true' | 'false' | integer
//! array      := '[' ( expression ( ',' expression )* )? ']'
//! ```
//!
//! Parentheses, arrays, signs and `!` each open one nesting level on the cursor; input that
//! nests deeper than [`MAX_NESTING`](super::cursor::MAX_NESTING) is not an expression.
//!
//! Each rule yields `Ok(Some(value))`, `Ok(None)` when it does not match (the cursor is then
//! back where the rule started) or `Err` for a fault that aborts the whole evaluation.

use crate::error::ScriptError;

use super::cursor::SourceCursor;
use super::lexer::{scan_integer, scan_keyword, scan_sign};
use super::object::{BinaryOp, ScriptObject};

type Parsed = Result<Option<ScriptObject>, ScriptError>;

const LOGICAL_OPS: &[(char, BinaryOp)] = &[
    ('&', BinaryOp::And),
    ('|', BinaryOp::Or),
    ('^', BinaryOp::Xor),
];

const ADDITIVE_OPS: &[(char, BinaryOp)] = &[('+', BinaryOp::Add), ('-', BinaryOp::Subtract)];

const MULTIPLICATIVE_OPS: &[(char, BinaryOp)] = &[
    ('*', BinaryOp::Multiply),
    ('/', BinaryOp::Divide),
    ('%', BinaryOp::Modulo),
];

/// Parses and evaluates a whole statement. The statement has to cover all of `text`.
pub fn parse(text: &str) -> Result<ScriptObject, ScriptError> {
    let mut cursor = SourceCursor::new(text);
    let result = parse_statement(&mut cursor)?;
    cursor.skip_spaces();
    match result {
        Some(object) if cursor.is_at_end() => Ok(object),
        _ => Err(ScriptError::Syntax {
            remaining: cursor.remaining().to_owned(),
        }),
    }
}

pub fn parse_statement(cursor: &mut SourceCursor<'_>) -> Parsed {
    cursor.attempt(|c| {
        let Some(value) = parse_expression(c)? else {
            return Ok(None);
        };
        c.skip_spaces();
        c.advance_if(';');
        Ok(Some(value))
    })
}

pub fn parse_expression(cursor: &mut SourceCursor<'_>) -> Parsed {
    parse_logical(cursor)
}

fn parse_logical(cursor: &mut SourceCursor<'_>) -> Parsed {
    parse_binary(cursor, LOGICAL_OPS, parse_additive)
}

fn parse_additive(cursor: &mut SourceCursor<'_>) -> Parsed {
    parse_binary(cursor, ADDITIVE_OPS, parse_multiplicative)
}

fn parse_multiplicative(cursor: &mut SourceCursor<'_>) -> Parsed {
    parse_binary(cursor, MULTIPLICATIVE_OPS, parse_unary)
}

/// Left-associative chain of `operand (op operand)*`.
///
/// An operator without a right operand is left unconsumed. An operator whose operands do not
/// support it fails the whole chain.
fn parse_binary(
    cursor: &mut SourceCursor<'_>,
    operators: &[(char, BinaryOp)],
    operand: fn(&mut SourceCursor<'_>) -> Parsed,
) -> Parsed {
    cursor.attempt(|c| {
        let Some(mut lhs) = operand(c)? else {
            return Ok(None);
        };
        loop {
            c.skip_spaces();
            let Some(op) = c.peek().and_then(|ch| {
                operators
                    .iter()
                    .find(|(symbol, _)| *symbol == ch)
                    .map(|(_, op)| *op)
            }) else {
                break;
            };

            c.begin_scope();
            c.advance();
            let rhs = operand(c);
            c.end_scope(!matches!(rhs, Ok(Some(_))));
            let Some(rhs) = rhs? else {
                break;
            };

            match lhs.apply(op, &rhs)? {
                Some(value) => lhs = value,
                None => return Ok(None),
            }
        }
        Ok(Some(lhs))
    })
}

fn parse_unary(cursor: &mut SourceCursor<'_>) -> Parsed {
    if let Some(value) = cursor.attempt(parse_member)? {
        return Ok(Some(value));
    }
    if let Some(value) = cursor.nested(parse_signed)? {
        return Ok(Some(value));
    }
    cursor.nested(parse_not)
}

/// `value` optionally followed by `.value`. The base value is parsed once and reused when no
/// member access follows.
fn parse_member(c: &mut SourceCursor<'_>) -> Parsed {
    let Some(base) = parse_value(c)? else {
        return Ok(None);
    };

    c.begin_scope();
    c.skip_spaces();
    if !c.advance_if('.') {
        c.end_scope(true);
        return Ok(Some(base));
    }
    let member = parse_value(c);
    c.end_scope(!matches!(member, Ok(Some(_))));
    match member? {
        Some(member) => Ok(base.get(&member)),
        None => Ok(Some(base)),
    }
}

fn parse_signed(c: &mut SourceCursor<'_>) -> Parsed {
    c.skip_spaces();
    let Some(sign) = scan_sign(c) else {
        return Ok(None);
    };
    let Some(operand) = parse_unary(c)? else {
        return Ok(None);
    };
    Ok(if sign == '+' {
        operand.plus()
    } else {
        operand.minus()
    })
}

fn parse_not(c: &mut SourceCursor<'_>) -> Parsed {
    c.skip_spaces();
    if !c.advance_if('!') {
        return Ok(None);
    }
    let Some(operand) = parse_unary(c)? else {
        return Ok(None);
    };
    Ok(operand.negate())
}

fn parse_value(cursor: &mut SourceCursor<'_>) -> Parsed {
    if let Some(value) = cursor.nested(parse_parenthesized)? {
        return Ok(Some(value));
    }
    parse_literal(cursor)
}

fn parse_parenthesized(c: &mut SourceCursor<'_>) -> Parsed {
    c.skip_spaces();
    if !c.advance_if('(') {
        return Ok(None);
    }
    let Some(value) = parse_expression(c)? else {
        return Ok(None);
    };
    c.skip_spaces();
    Ok(c.advance_if(')').then_some(value))
}

pub fn parse_literal(cursor: &mut SourceCursor<'_>) -> Parsed {
    cursor.skip_spaces();
    if let Some(array) = cursor.nested(parse_array)? {
        return Ok(Some(array));
    }

    let keyword = if scan_keyword(cursor, "null") {
        Some(ScriptObject::null())
    } else if scan_keyword(cursor, "newobj") {
        Some(ScriptObject::new_object())
    } else if scan_keyword(cursor, "allobj") {
        Some(ScriptObject::all_objects())
    } else if scan_keyword(cursor, "true") {
        Some(ScriptObject::boolean(true))
    } else if scan_keyword(cursor, "false") {
        Some(ScriptObject::boolean(false))
    } else {
        None
    };
    if keyword.is_some() {
        return Ok(keyword);
    }

    Ok(scan_integer(cursor).map(ScriptObject::integer))
}

fn parse_array(c: &mut SourceCursor<'_>) -> Parsed {
    if !c.advance_if('[') {
        return Ok(None);
    }

    let mut items = Vec::new();
    c.skip_spaces();
    if !c.advance_if(']') {
        loop {
            let Some(item) = parse_expression(c)? else {
                return Ok(None);
            };
            items.push(Some(item));

            c.skip_spaces();
            if c.advance_if(',') {
                continue;
            }
            if c.advance_if(']') {
                break;
            }
            return Ok(None);
        }
    }
    Ok(Some(ScriptObject::array(items)))
}
