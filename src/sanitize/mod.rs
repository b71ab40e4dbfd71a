//! Query argument sanitization.
//!
//! Read queries get their integer arguments inlined as SQL literals; everything else stays
//! bound. Placeholders inside string literals, quoted identifiers and comments are left
//! alone.

mod scanner;

use scanner::{State, starts_digit};

use crate::types::CellValue;

/// Inline integer arguments into `sql`.
///
/// Returns `None` when the statement should run unchanged: there are no arguments, an
/// indexed placeholder (`?NNN`) is present, or the number of `?` placeholders does not match
/// the number of arguments.
#[must_use]
pub fn inline_integer_arguments(
    sql: &str,
    arguments: &[CellValue],
) -> Option<(String, Vec<CellValue>)> {
    if arguments.is_empty() {
        return None;
    }

    let bytes = sql.as_bytes();
    let mut out = String::with_capacity(sql.len());
    let mut kept = Vec::with_capacity(arguments.len());
    let mut state = State::Normal;
    let mut count = 0;
    let mut last = 0;
    let mut idx = 0;

    while idx < bytes.len() {
        if matches!(state, State::Normal) && bytes[idx] == b'?' {
            if starts_digit(bytes, idx + 1) {
                return None;
            }
            count += 1;
            let argument = arguments.get(count - 1)?;
            if let CellValue::Integer(value) = argument {
                out.push_str(&sql[last..idx]);
                if *value < 0 {
                    out.push_str(&format!("({value})"));
                } else {
                    out.push_str(&value.to_string());
                }
                last = idx + 1;
            } else {
                kept.push(argument.clone());
            }
            idx += 1;
            continue;
        }
        idx += 1 + state.step(bytes, idx);
    }

    if count != arguments.len() {
        return None;
    }
    out.push_str(&sql[last..]);
    Some((out, kept))
}
