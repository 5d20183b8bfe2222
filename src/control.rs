//! Control-flow natives: assignment, loops, conditionals, break, and
//! delayed or remote execution.
//!
//! All of them take their arguments unresolved; bodies and conditions are
//! substituted when they run, once per iteration.

use tracing::debug;

use crate::engine::{is_temp, CallContext};
use crate::native::{FunctionMap, NativeTable};
use crate::serial;
use crate::submit::{DelayedRequest, RemoteRequest};
use crate::types::{ParamValue, Parameter, RuleError, Status};

pub(crate) fn register(natives: &mut NativeTable, aliases: &mut FunctionMap) {
    natives.insert_raw("assign", 2, assign);
    natives.insert_raw("whileExec", 3, while_exec);
    natives.insert_raw("forExec", 5, for_exec);
    natives.insert_raw("ifExec", 5, if_exec);
    natives.insert_raw("breakExec", 0, break_exec);
    natives.insert_raw("forEachExec", 3, for_each_exec);
    natives.insert_raw("delayExec", 3, delay_exec);
    natives.insert_raw("remoteExec", 4, remote_exec);
    natives.insert_raw("recover_delayExec", 0, recover_delay_exec);

    for (external, internal) in [
        ("while", "whileExec"),
        ("for", "forExec"),
        ("if", "ifExec"),
        ("break", "breakExec"),
        ("forEach", "forEachExec"),
        ("delay", "delayExec"),
        ("remote", "remoteExec"),
    ] {
        aliases.insert(external, internal);
    }
}

fn arity(name: &str, expected: usize, args: &[Parameter]) -> RuleError {
    RuleError::ArgCountMismatch {
        name: name.to_owned(),
        expected,
        actual: args.len(),
    }
}

/// The argument as written, or the scalar value of the parameter it names.
fn text(param: &Parameter) -> String {
    param.value.render().unwrap_or_else(|| param.name.clone())
}

fn body(actions: &Parameter, recoveries: &Parameter) -> String {
    format!("{}|{}", text(actions), text(recoveries))
}

fn submission(err: impl ToString) -> RuleError {
    RuleError::Submission {
        message: err.to_string(),
    }
}

/// Run one loop iteration. `false` once the body executed `breakExec`.
fn iterate(cx: &mut CallContext<'_>, body: &str) -> Result<bool, RuleError> {
    cx.exec_my_rule(body).map(|status| !status.is_break())
}

/// `assign(*Target, expression)`: evaluate the expression and store the
/// result. A `$NAME` target writes the session variable instead.
fn assign(args: &mut [Parameter], cx: &mut CallContext<'_>) -> Result<Status, RuleError> {
    let [target, value] = args else {
        return Err(arity("assign", 2, args));
    };

    if !is_temp(&value.name) && value.value.render().is_none() && !value.value.is_null() {
        target.value = value.value.clone();
        return Ok(Status::Success);
    }

    let resolved = cx.resolve(&text(value))?;
    let rendered = match cx.evaluate(&resolved) {
        Ok(evaluation) => evaluation.rendered,
        Err(err) => {
            debug!(value = %resolved, error = %err, "assigning unevaluated text");
            resolved
        }
    };

    if is_temp(&target.name) {
        return match target.value.as_str().and_then(|s| s.strip_prefix('$')) {
            Some(name) => {
                cx.set_session_var(name, &rendered)?;
                Ok(Status::Success)
            }
            None => Err(RuleError::MalformedExpression { text: text(target) }),
        };
    }
    target.value = ParamValue::Str(rendered);
    Ok(Status::Success)
}

/// `whileExec(condition, actions, recoveries)`
fn while_exec(args: &mut [Parameter], cx: &mut CallContext<'_>) -> Result<Status, RuleError> {
    let [condition, actions, recoveries] = args else {
        return Err(arity("whileExec", 3, args));
    };
    let condition = text(condition);
    let body = body(actions, recoveries);
    while cx.condition(&condition)? {
        if !iterate(cx, &body)? {
            break;
        }
    }
    Ok(Status::Success)
}

/// `forExec(init, condition, step, actions, recoveries)`
fn for_exec(args: &mut [Parameter], cx: &mut CallContext<'_>) -> Result<Status, RuleError> {
    let [init, condition, step, actions, recoveries] = args else {
        return Err(arity("forExec", 5, args));
    };
    let condition = text(condition);
    let step = text(step);
    let body = body(actions, recoveries);

    cx.exec_my_rule(&text(init))?;
    while cx.condition(&condition)? {
        if !iterate(cx, &body)? {
            break;
        }
        cx.exec_my_rule(&step)?;
    }
    Ok(Status::Success)
}

/// `ifExec(condition, then, thenRecoveries, else, elseRecoveries)`. A break
/// inside either branch propagates to the enclosing loop.
fn if_exec(args: &mut [Parameter], cx: &mut CallContext<'_>) -> Result<Status, RuleError> {
    let [condition, then, then_recoveries, otherwise, else_recoveries] = args else {
        return Err(arity("ifExec", 5, args));
    };
    let branch = if cx.condition(&text(condition))? {
        body(then, then_recoveries)
    } else {
        body(otherwise, else_recoveries)
    };
    cx.exec_my_rule(&branch)
}

fn break_exec(_args: &mut [Parameter], _cx: &mut CallContext<'_>) -> Result<Status, RuleError> {
    Ok(Status::Break)
}

/// Split a comma-separated list. `\,` keeps a literal comma inside an item.
fn split_list(list: &str) -> Vec<String> {
    let mut items = Vec::new();
    let mut current = String::new();
    let mut chars = list.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' if chars.peek() == Some(&',') => {
                current.push(',');
                chars.next();
            }
            ',' => items.push(std::mem::take(&mut current).trim().to_owned()),
            _ => current.push(c),
        }
    }
    items.push(current.trim().to_owned());
    items
}

fn elements(value: &ParamValue) -> Vec<ParamValue> {
    match value {
        ParamValue::Null => Vec::new(),
        ParamValue::Str(s) => split_list(s).into_iter().map(ParamValue::Str).collect(),
        ParamValue::StrArray(items) => items.iter().cloned().map(ParamValue::Str).collect(),
        ParamValue::IntArray(items) => items.iter().copied().map(ParamValue::Int).collect(),
        ParamValue::Table(table) => (0..table.rows.len())
            .filter_map(|i| table.row_pairs(i))
            .map(ParamValue::KeyValue)
            .collect(),
        other => vec![other.clone()],
    }
}

/// `forEachExec(*List, actions, recoveries)`: bind `*List` to each element in
/// turn. A parameter that existed before the loop gets its list back.
fn for_each_exec(args: &mut [Parameter], cx: &mut CallContext<'_>) -> Result<Status, RuleError> {
    let [list, actions, recoveries] = args else {
        return Err(arity("forEachExec", 3, args));
    };
    if is_temp(&list.name) {
        return Err(RuleError::MalformedExpression { text: text(list) });
    }

    let name = list.name.clone();
    let items = elements(&list.value);
    let original = cx.params().get(&name).cloned();
    let body = body(actions, recoveries);

    let mut result = Ok(Status::Success);
    for item in items {
        cx.params_mut().set(&name, item);
        match iterate(cx, &body) {
            Ok(true) => {}
            Ok(false) => break,
            Err(err) => {
                result = Err(err);
                break;
            }
        }
    }

    if let Some(original) = original {
        cx.params_mut().insert(original);
    }
    result
}

/// `delayExec(schedule, actions, recoveries)`: hand the body and a packed copy
/// of the current context to the submitter.
fn delay_exec(args: &mut [Parameter], cx: &mut CallContext<'_>) -> Result<Status, RuleError> {
    let [schedule, actions, recoveries] = args else {
        return Err(arity("delayExec", 3, args));
    };
    let request = DelayedRequest {
        condition: text(schedule),
        body: text(actions),
        recovery: text(recoveries),
        packed: serial::pack(cx.exec()).map_err(submission)?,
    };
    let id = cx.submitter()?.submit_delayed(request)?;
    debug!(id, "delayed execution submitted");
    cx.exec_mut().delay_stack.push(id);
    Ok(Status::Success)
}

/// Cancel the most recent submission of this invocation. Meant as the
/// recovery paired with `delayExec`.
fn recover_delay_exec(
    _args: &mut [Parameter],
    cx: &mut CallContext<'_>,
) -> Result<Status, RuleError> {
    let Some(id) = cx.exec_mut().delay_stack.pop() else {
        return Ok(Status::Success);
    };
    cx.submitter()?.cancel_delayed(id)?;
    debug!(id, "delayed execution withdrawn");
    Ok(Status::Success)
}

/// `remoteExec(host, condition, actions, recoveries)`: run the body on another
/// server and merge the parameters it returns.
fn remote_exec(args: &mut [Parameter], cx: &mut CallContext<'_>) -> Result<Status, RuleError> {
    let [host, condition, actions, recoveries] = args else {
        return Err(arity("remoteExec", 4, args));
    };
    let request = RemoteRequest {
        host: cx.resolve(&text(host))?,
        condition: text(condition),
        body: text(actions),
        recovery: text(recoveries),
        packed: serial::pack(cx.exec()).map_err(submission)?,
    };
    debug!(host = %request.host, "remote execution submitted");
    let reply = cx.submitter()?.submit_remote(request)?;
    for param in reply.iter() {
        cx.params_mut().insert(param.clone());
    }
    Ok(Status::Success)
}
