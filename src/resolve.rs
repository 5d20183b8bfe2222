//! `$NAME` session-variable and `*Name` parameter substitution.
//!
//! Substitution is a pure function of the template and the bindings: the
//! input is never modified and substituted text is not scanned again.

use tracing::trace;

use crate::types::{ParamArray, ParamValue, RuleError, SessionRecord, VariableBindingTable};

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Byte length of the variable name at the start of `text`.
fn name_len(text: &str) -> usize {
    text.find(|c: char| !is_name_char(c)).unwrap_or(text.len())
}

/// Read `$name` for `action`, trying each candidate path until one is set.
///
/// # Errors
///
/// Returns [`RuleError::UndefinedVariable`] if no binding yields a value.
pub fn read_session_var(
    name: &str,
    action: &str,
    bindings: &VariableBindingTable,
    session: &SessionRecord,
) -> Result<String, RuleError> {
    bindings
        .candidates(name, action)
        .find_map(|path| session.get(path).and_then(ParamValue::render))
        .ok_or_else(|| RuleError::UndefinedVariable {
            name: name.to_owned(),
        })
}

/// Write `$name` for `action` through its binding.
///
/// The first candidate path that currently holds a value is written; if none
/// does, the first declared path is. An integer field stays an integer when
/// `value` parses as one.
///
/// # Errors
///
/// Returns [`RuleError::UndefinedVariable`] if `name` has no binding, or
/// [`RuleError::UnwritableVariable`] if the path names a whole record.
pub fn set_session_var(
    name: &str,
    action: &str,
    value: &str,
    bindings: &VariableBindingTable,
    session: &mut SessionRecord,
) -> Result<(), RuleError> {
    let path = bindings
        .candidates(name, action)
        .find(|path| session.get(path).is_some())
        .or_else(|| bindings.candidates(name, action).next())
        .ok_or_else(|| RuleError::UndefinedVariable {
            name: name.to_owned(),
        })?;

    if session.has_record(path) {
        return Err(RuleError::UnwritableVariable {
            name: name.to_owned(),
            path: path.to_owned(),
        });
    }

    let typed = match (session.get(path), value.trim().parse::<i64>()) {
        (Some(ParamValue::Int(_)), Ok(i)) => ParamValue::Int(i),
        _ => ParamValue::Str(value.to_owned()),
    };
    trace!(name, path, value, "session variable written");
    session.insert(path, typed);
    Ok(())
}

/// Substitute every `$NAME` in `text`. A `$` not followed by a name
/// character is kept as is.
///
/// # Errors
///
/// Returns [`RuleError::UndefinedVariable`] for the first name that does not
/// resolve; no partial substitution is returned.
pub fn resolve_session_vars(
    text: &str,
    action: &str,
    bindings: &VariableBindingTable,
    session: &SessionRecord,
) -> Result<String, RuleError> {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];
        let len = name_len(after);
        if len == 0 {
            out.push('$');
            rest = after;
            continue;
        }
        let value = read_session_var(&after[..len], action, bindings, session)?;
        out.push_str(&value);
        rest = &after[len..];
    }
    out.push_str(rest);
    Ok(out)
}

/// Substitute every `*Name` in `text` from `params`.
///
/// References to absent or unset parameters, and to parameters without a
/// scalar text form, are left as the literal token. A `*` not followed by a
/// name character (multiplication) is not a reference.
#[must_use]
pub fn resolve_param_vars(text: &str, params: &ParamArray) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(pos) = rest.find('*') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];
        let len = name_len(after);
        if len == 0 {
            out.push('*');
            rest = after;
            continue;
        }
        let token = &rest[pos..=pos + len];
        match params.value(token).and_then(ParamValue::render) {
            Some(value) => out.push_str(&value),
            None => out.push_str(token),
        }
        rest = &after[len..];
    }
    out.push_str(rest);
    out
}

/// Substitute session variables, then parameter variables.
///
/// Text of an `assign(...)` call is returned untouched: its target must stay
/// a reference rather than becoming the referenced value.
///
/// # Errors
///
/// As [`resolve_session_vars`].
pub fn bind_and_resolve(
    text: &str,
    action: &str,
    bindings: &VariableBindingTable,
    session: &SessionRecord,
    params: &ParamArray,
) -> Result<String, RuleError> {
    if text.trim_start().starts_with("assign(") {
        return Ok(text.to_owned());
    }
    let with_session = resolve_session_vars(text, action, bindings, session)?;
    Ok(resolve_param_vars(&with_session, params))
}
