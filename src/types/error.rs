use thiserror::Error;

/// Runtime failure raised while matching, binding, evaluating or executing rules.
///
/// Every variant maps to the integer status code the embedding server reports
/// to its clients via [`RuleError::code()`]. Control signals that are not
/// failures ([`Status::Break`](crate::Status::Break) and
/// [`Status::CutOnSuccess`](crate::Status::CutOnSuccess)) live on [`Status`](crate::Status)
/// instead.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RuleError {
    #[error("no rule named '{name}'")]
    NoRuleFound { name: String },

    #[error("no more rules match '{name}'")]
    NoMoreRules { name: String },

    #[error("'{name}' takes {expected} argument(s), got {actual}")]
    ArgCountMismatch {
        name: String,
        expected: usize,
        actual: usize,
    },

    #[error("action has {count} arguments, the limit is {limit}")]
    TooManyArguments { count: usize, limit: usize },

    #[error("rule '{rule}' declares {expected} parameter(s), caller passed {actual}")]
    InsufficientInput {
        rule: String,
        expected: usize,
        actual: usize,
    },

    #[error("retry without recovery requested")]
    RetryWithoutRecovery,

    #[error("cut processed: {cause}")]
    CutProcessed {
        #[source]
        cause: Box<RuleError>,
    },

    #[error("action '{name}' failed: no candidate rule succeeded")]
    ActionFailed { name: String },

    #[error("fail action encountered")]
    FailAction,

    #[error("undefined session variable '${name}'")]
    UndefinedVariable { name: String },

    #[error("cannot write session variable '${name}' through path '{path}'")]
    UnwritableVariable { name: String, path: String },

    #[error("'{name}' is neither a rule nor a native function")]
    NoRuleOrFunctionFound { name: String },

    #[error("rule condition '{condition}' is false")]
    RuleFailed { condition: String },

    #[error("rule body has {count} actions, the limit is {limit}")]
    TooManyActions { count: usize, limit: usize },

    #[error("malformed expression '{text}'")]
    MalformedExpression { text: String },

    #[error("operator '{op}' is not supported between '{lhs}' and '{rhs}'")]
    UnsupportedOperation {
        op: String,
        lhs: String,
        rhs: String,
    },

    #[error("invalid pattern '{pattern}'")]
    InvalidPattern { pattern: String },

    #[error("nesting depth exceeded the limit of {limit}")]
    DepthExceeded { limit: usize },

    #[error("submission failed: {message}")]
    Submission { message: String },

    #[error("native call failed with status {code}: {message}")]
    Native { code: i32, message: String },
}

impl RuleError {
    /// The legacy integer status code for this error.
    #[must_use]
    pub fn code(&self) -> i32 {
        match self {
            RuleError::NoRuleFound { .. } => -1_017_000,
            RuleError::NoMoreRules { .. } => -1_018_000,
            RuleError::ArgCountMismatch { .. } => -1_021_000,
            RuleError::TooManyArguments { .. } => -1_022_000,
            RuleError::MalformedExpression { .. } => -1_084_000,
            RuleError::InsufficientInput { .. } => -1_086_000,
            RuleError::RetryWithoutRecovery => -1_088_000,
            RuleError::CutProcessed { .. } => -1_089_000,
            RuleError::ActionFailed { .. } => -1_090_000,
            RuleError::FailAction => -1_091_000,
            RuleError::UndefinedVariable { .. } => -1_094_000,
            RuleError::NoRuleOrFunctionFound { .. } => -1_097_000,
            RuleError::RuleFailed { .. } => -1_101_000,
            RuleError::InvalidPattern { .. } => -1_103_000,
            RuleError::TooManyActions { .. } => -1_111_000,
            RuleError::DepthExceeded { .. } | RuleError::Submission { .. } => -1_205_000,
            RuleError::UnsupportedOperation { .. } => -1_208_000,
            RuleError::UnwritableVariable { .. } => -1_212_000,
            RuleError::Native { code, .. } => *code,
        }
    }

    /// Build an opaque failure reported by a native call.
    pub fn native(code: i32, message: impl Into<String>) -> Self {
        RuleError::Native {
            code,
            message: message.into(),
        }
    }

    pub(crate) fn cut(cause: RuleError) -> Self {
        RuleError::CutProcessed {
            cause: Box::new(cause),
        }
    }

    /// Whether this error asks the rule scan to continue without restoring state.
    #[must_use]
    pub fn is_retry(&self) -> bool {
        matches!(self, RuleError::RetryWithoutRecovery)
    }
}

/// A rule definition rejected while building a rule base.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("invalid rule head '{head}'")]
    InvalidHead { head: String },

    #[error("rule '{rule}' has {recoveries} recoveries for {actions} actions")]
    TooManyRecoveries {
        rule: String,
        actions: usize,
        recoveries: usize,
    },

    #[error("rule '{rule}' has a malformed body")]
    MalformedBody {
        rule: String,
        #[source]
        source: RuleError,
    },
}
