use crate::types::{ActionCall, RuleError};

use super::split::is_well_formed;

/// Upper bound on the number of arguments a single call may carry.
pub const MAX_ARGS: usize = 20;

/// Parse call text into a name and its raw arguments.
///
/// The first `(` separates the name from the argument list and a trailing `)`
/// is dropped. Arguments are split on commas whose preceding text is
/// well-formed (see [`is_well_formed`]), so commas inside quotes or nested
/// calls do not split. Each argument is trimmed and loses one enclosing quote
/// pair. Text without `(` is a bare name with zero arguments.
///
/// # Errors
///
/// Returns [`RuleError::MalformedExpression`] if quotes or parentheses in the
/// argument list never balance, and [`RuleError::TooManyArguments`] above
/// [`MAX_ARGS`] arguments.
pub fn parse_call(text: &str) -> Result<ActionCall, RuleError> {
    let text = text.trim();
    let Some(open) = text.find('(') else {
        return Ok(ActionCall::new(text, Vec::new()));
    };

    let name = text[..open].trim();
    let mut inner = &text[open + 1..];
    if let Some(stripped) = inner.strip_suffix(')') {
        inner = stripped;
    }
    if inner.trim().is_empty() {
        return Ok(ActionCall::new(name, Vec::new()));
    }

    let mut args = Vec::new();
    let mut start = 0;
    for (i, c) in inner.char_indices() {
        if c == ',' && is_well_formed(&inner[start..i]) {
            args.push(clean_arg(&inner[start..i]));
            start = i + 1;
        }
    }
    let last = &inner[start..];
    if !is_well_formed(last) {
        return Err(RuleError::MalformedExpression {
            text: text.to_owned(),
        });
    }
    args.push(clean_arg(last));

    if args.len() > MAX_ARGS {
        return Err(RuleError::TooManyArguments {
            count: args.len(),
            limit: MAX_ARGS,
        });
    }
    Ok(ActionCall::new(name, args))
}

/// The name part of call text, without parsing arguments.
#[must_use]
pub fn call_name(text: &str) -> &str {
    let text = text.trim();
    match text.find('(') {
        Some(open) => text[..open].trim(),
        None => text,
    }
}

fn clean_arg(raw: &str) -> String {
    trim_quotes(raw.trim()).to_owned()
}

/// Remove a single layer of matching `'` or `"` quotes.
#[must_use]
pub fn trim_quotes(text: &str) -> &str {
    if has_enclosing_quotes(text) {
        &text[1..text.len() - 1]
    } else {
        text
    }
}

/// Whether `text` starts and ends with the same quote character.
#[must_use]
pub fn has_enclosing_quotes(text: &str) -> bool {
    let bytes = text.as_bytes();
    bytes.len() >= 2
        && (bytes[0] == b'"' || bytes[0] == b'\'')
        && bytes[bytes.len() - 1] == bytes[0]
}
