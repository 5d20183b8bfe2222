use std::fmt;

/// Non-failure outcome of an action, a rule body, or a whole rule invocation.
///
/// Failures are reported as [`RuleError`](crate::RuleError); the two control
/// signals below are successes from the recovery engine's point of view and are
/// never handed to a recovery walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Status {
    /// The action or body completed.
    #[default]
    Success,
    /// The body completed after executing `cut`; no further matching rules
    /// should be tried.
    CutOnSuccess,
    /// `break` was executed; unwinds to the nearest enclosing loop.
    Break,
}

impl Status {
    /// The legacy integer status code.
    #[must_use]
    pub fn code(self) -> i32 {
        match self {
            Status::Success => 0,
            Status::CutOnSuccess => -1_109_000,
            Status::Break => -1_108_000,
        }
    }

    #[must_use]
    pub fn is_break(self) -> bool {
        self == Status::Break
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Success => write!(f, "success"),
            Status::CutOnSuccess => write!(f, "cut on success"),
            Status::Break => write!(f, "break"),
        }
    }
}
