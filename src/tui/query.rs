//! Editing rules for the query buffer.
//!
//! The buffer is built one keypress at a time and must stay a prefix of a
//! valid pattern: tokens of one or two digits, an optional `+`/`-`
//! modifier, single spaces between tokens.

/// Whether `ch` may be appended to the current buffer.
///
/// Only digits, modifiers and the space are ever considered; everything
/// else is rejected outright.
pub fn can_append(buffer: &str, ch: char) -> bool {
    let is_digit = ch.is_ascii_digit();
    let is_modifier = ch == '+' || ch == '-';

    let Some(last) = buffer.chars().last() else {
        // An empty buffer only opens with a digit.
        return is_digit;
    };

    if last == ' ' {
        // A fresh token only opens with a digit.
        is_digit
    } else if last.is_ascii_digit() {
        let next_to_last = buffer.chars().rev().nth(1);
        if next_to_last.is_some_and(|c| c.is_ascii_digit()) {
            // Values have at most two digits; no third one.
            is_modifier || ch == ' '
        } else {
            is_digit || is_modifier || ch == ' '
        }
    } else if last == '+' || last == '-' {
        // After a modifier the token is closed.
        ch == ' '
    } else {
        false
    }
}
