//! SIFOSC, the simple formula script.
//!
//! A line of SIFOSC is a single expression over integers, booleans, arrays and a few
//! special objects. The SIFOSC server evaluates every chat line it receives and broadcasts
//! the printed result in place of the raw text.
//!
//! ```text
//! 1 + 2 * 3            => 7
//! [1,2] + [3]          => [1,2,3]
//! !(true ^ false)      => false
//! allobj.0             => null
//! ```

pub mod cursor;
pub mod lexer;
pub mod object;
pub mod parser;
pub mod registry;

use tracing::debug;

use crate::error::ScriptError;

pub use cursor::SourceCursor;
pub use object::{BinaryOp, ScriptObject, Value};
pub use parser::parse;

/// Put in front of text that is not a valid formula.
pub const INVALID_MARKER: &str = "(not a valid SIFOSC expression) ";

/// Parsed once before a SIFOSC server opens.
pub const SELF_CHECK_SOURCE: &str = "[null,allobj,true,false]";

/// Evaluates one line and returns the printed result, or the invalid marker followed by the
/// whole line. Only arithmetic faults are errors.
pub fn run_script_line(line: &str) -> Result<String, ScriptError> {
    match parse(line) {
        Ok(value) => Ok(value.code()),
        Err(ScriptError::Syntax { remaining }) => {
            debug!(unparsed = %remaining, "not a formula");
            Ok(format!("{INVALID_MARKER}{line}"))
        }
        Err(fault) => Err(fault),
    }
}

/// Message transform used by the SIFOSC server. Never fails: a fault becomes a diagnostic
/// line.
pub fn transform_message(text: &str) -> String {
    match run_script_line(text) {
        Ok(reply) => reply,
        Err(fault) => {
            debug!(%fault, "formula evaluation aborted");
            format!("(SIFOSC evaluation failed: {fault}) {text}")
        }
    }
}

/// Makes sure the interpreter handles every literal kind.
pub fn self_check() -> Result<(), ScriptError> {
    let value = parse(SELF_CHECK_SOURCE)?;
    debug!(result = %value, "SIFOSC self-check passed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_lines_print_their_value() {
        assert_eq!(run_script_line("1 + 2 * 3").unwrap(), "7");
        assert_eq!(run_script_line("[1,2] + [3]").unwrap(), "[1,2,3]");
    }

    #[test]
    fn invalid_lines_are_marked() {
        assert_eq!(
            run_script_line("hello world").unwrap(),
            format!("{INVALID_MARKER}hello world")
        );
        assert_eq!(
            run_script_line("1 + 1 oops").unwrap(),
            format!("{INVALID_MARKER}1 + 1 oops")
        );
    }

    #[test]
    fn faults_are_errors_until_the_transform() {
        assert_eq!(run_script_line("1 % 0"), Err(ScriptError::DivideByZero));
        assert_eq!(
            transform_message("1 % 0"),
            "(SIFOSC evaluation failed: division by zero) 1 % 0"
        );
    }

    #[test]
    fn self_check_passes() {
        assert!(self_check().is_ok());
        assert_eq!(parse(SELF_CHECK_SOURCE).unwrap().code(), SELF_CHECK_SOURCE);
    }
}
