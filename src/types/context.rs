use serde::{Deserialize, Serialize};

use super::error::RuleError;
use super::param::ParamArray;
use super::session::SessionRecord;
use super::value::ParamValue;

/// A failure recorded while executing, oldest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEntry {
    pub code: i32,
    pub message: String,
}

/// Identifier of a request handed to the delayed-execution queue.
pub type RequestId = u64;

/// State threaded through one top-level rule invocation.
///
/// Nested rule calls swap in a fresh [`ParamArray`] for their duration and
/// share everything else.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionContext {
    pub(crate) status: i32,
    pub(crate) rule_name: String,
    pub(crate) params: ParamArray,
    pub(crate) errors: Vec<ErrorEntry>,
    pub(crate) session: SessionRecord,
    pub(crate) delay_stack: Vec<RequestId>,
}

impl ExecutionContext {
    #[must_use]
    pub fn new(session: SessionRecord) -> Self {
        Self {
            session,
            ..Self::default()
        }
    }

    /// Start from an existing parameter array, e.g. the caller's inputs.
    #[must_use]
    pub fn with_params(mut self, params: ParamArray) -> Self {
        self.params = params;
        self
    }

    /// Status code of the most recently completed action.
    #[must_use]
    pub fn status(&self) -> i32 {
        self.status
    }

    /// Name of the rule currently (or most recently) executing.
    #[must_use]
    pub fn rule_name(&self) -> &str {
        &self.rule_name
    }

    #[must_use]
    pub fn params(&self) -> &ParamArray {
        &self.params
    }

    pub fn params_mut(&mut self) -> &mut ParamArray {
        &mut self.params
    }

    /// Shortcut for `params().value(name)`.
    #[must_use]
    pub fn param(&self, name: &str) -> Option<&ParamValue> {
        self.params.value(name)
    }

    #[must_use]
    pub fn session(&self) -> &SessionRecord {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut SessionRecord {
        &mut self.session
    }

    #[must_use]
    pub fn errors(&self) -> &[ErrorEntry] {
        &self.errors
    }

    /// Requests submitted by `delayExec` that no recovery has cancelled yet.
    #[must_use]
    pub fn pending_delays(&self) -> &[RequestId] {
        &self.delay_stack
    }

    pub(crate) fn push_error(&mut self, err: &RuleError, context: &str) {
        self.errors.push(ErrorEntry {
            code: err.code(),
            message: format!("{context}: {err}"),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_context_is_clean() {
        let ctx = ExecutionContext::new(SessionRecord::new().set("client.user", "rods"));
        assert_eq!(ctx.status(), 0);
        assert!(ctx.params().is_empty());
        assert!(ctx.errors().is_empty());
        assert!(ctx.pending_delays().is_empty());
        assert_eq!(
            ctx.session().get("client.user"),
            Some(&ParamValue::from("rods"))
        );
    }

    #[test]
    fn error_stack_records_code() {
        let mut ctx = ExecutionContext::default();
        ctx.push_error(&RuleError::FailAction, "executing fail");
        assert_eq!(ctx.errors()[0].code, -1_091_000);
        assert_eq!(ctx.errors()[0].message, "executing fail: fail action encountered");
    }

    #[test]
    fn with_params() {
        let ctx = ExecutionContext::default().with_params(ParamArray::new().with("*A", 1_i64));
        assert_eq!(ctx.param("*A"), Some(&ParamValue::Int(1)));
    }
}
