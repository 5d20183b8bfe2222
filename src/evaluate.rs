//! Expression evaluation for rule guards and `assign` values.
//!
//! Expressions are already substituted text. There is no operator precedence:
//! [`split_binary`] takes the leftmost operator whose sides are well-formed and
//! each side is evaluated on its own.

use std::cmp::Ordering;
use std::fmt;

use tracing::trace;

use crate::glob::glob_match;
use crate::parse::{call_name, split_binary, unwrap_parens, BinaryOp, BinarySplit};
use crate::types::{RuleError, Status, DEFAULT_MAX_DEPTH};

/// Result of evaluating an expression: an integer truth value and the
/// rendered text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
    pub truthy: i64,
    pub rendered: String,
}

impl Evaluation {
    fn new(truthy: i64, rendered: impl Into<String>) -> Self {
        Self {
            truthy,
            rendered: rendered.into(),
        }
    }

    fn flag(b: bool) -> Self {
        let i = i64::from(b);
        Self::new(i, i.to_string())
    }

    /// Truth value from the rendered text, the way a condition reads it.
    fn from_rendered(rendered: String) -> Self {
        Self::new(atoi(&rendered), rendered)
    }

    #[must_use]
    pub fn is_true(&self) -> bool {
        self.truthy != 0
    }
}

impl fmt::Display for Evaluation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.rendered)
    }
}

/// What the evaluator needs from its surroundings to run call operands such
/// as `msiCheckQuota(*Coll) == 0`.
pub trait ActionHost {
    /// Whether `name` is a registered native function.
    fn is_native(&self, name: &str) -> bool;

    /// Execute the call text as an action.
    ///
    /// # Errors
    ///
    /// Any failure of the action; the evaluator only looks at whether there
    /// was one.
    fn run_action(&mut self, text: &str) -> Result<Status, RuleError>;

    /// Nesting bound for recursive evaluation.
    fn max_depth(&self) -> usize {
        DEFAULT_MAX_DEPTH
    }
}

/// Host with no functions, for evaluating plain expressions.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoActions;

impl ActionHost for NoActions {
    fn is_native(&self, _name: &str) -> bool {
        false
    }

    fn run_action(&mut self, text: &str) -> Result<Status, RuleError> {
        Err(RuleError::NoRuleOrFunctionFound {
            name: call_name(text).to_owned(),
        })
    }
}

/// Evaluate `text` with no functions available.
///
/// # Example
///
/// ```
/// assert_eq!(rexec::evaluate("3 + 4").unwrap().rendered, "7");
/// assert_eq!(rexec::evaluate("3.0 + 4").unwrap().rendered, "7.000000");
/// assert!(!rexec::evaluate("1 && 0").unwrap().is_true());
/// ```
///
/// # Errors
///
/// See [`evaluate_with`].
pub fn evaluate(text: &str) -> Result<Evaluation, RuleError> {
    evaluate_with(text, &mut NoActions)
}

/// Evaluate `text`, running call operands through `host`.
///
/// # Errors
///
/// Returns [`RuleError::MalformedExpression`] for unbalanced text,
/// [`RuleError::UnsupportedOperation`] for arithmetic on strings,
/// [`RuleError::InvalidPattern`] for a bad `like` pattern and
/// [`RuleError::DepthExceeded`] when nesting passes the host's bound.
pub fn evaluate_with(text: &str, host: &mut dyn ActionHost) -> Result<Evaluation, RuleError> {
    let limit = host.max_depth();
    let result = Evaluator { host, limit }.compute(text, 0)?;
    trace!(text, rendered = %result.rendered, truthy = result.truthy, "evaluated");
    Ok(result)
}

struct Evaluator<'h> {
    host: &'h mut dyn ActionHost,
    limit: usize,
}

impl Evaluator<'_> {
    fn compute(&mut self, text: &str, depth: usize) -> Result<Evaluation, RuleError> {
        if depth > self.limit {
            return Err(RuleError::DepthExceeded { limit: self.limit });
        }
        let text = text.trim();
        if text.is_empty() {
            return Ok(Evaluation::new(1, ""));
        }

        let split = match split_binary(text)? {
            Some(split) => split,
            None => match split_binary(unwrap_parens(text))? {
                Some(split) => split,
                None => return Ok(literal(text)),
            },
        };
        self.apply(&split, depth + 1)
    }

    fn apply(&mut self, split: &BinarySplit, depth: usize) -> Result<Evaluation, RuleError> {
        if depth > self.limit {
            return Err(RuleError::DepthExceeded { limit: self.limit });
        }
        let BinarySplit { lhs, op, rhs } = split;
        let op = *op;

        if op.is_logical() {
            let left = self.compute(lhs, depth)?.is_true();
            let right = self.compute(rhs, depth)?.is_true();
            return Ok(Evaluation::flag(match op {
                BinaryOp::And => left && right,
                _ => left || right,
            }));
        }

        if !matches!(op, BinaryOp::Like | BinaryOp::NotLike) && is_number(lhs) && is_number(rhs) {
            return numeric(lhs, op, rhs);
        }

        if self.is_function(lhs) || self.is_function(rhs) {
            let left = self.operand_score(lhs);
            let right = self.operand_score(rhs);
            if left == -1 {
                return Ok(Evaluation::from_rendered(right.to_string()));
            }
            if right == -1 {
                return Ok(Evaluation::from_rendered(left.to_string()));
            }
            let ordering = left.cmp(&right);
            return compare(op, ordering).map(Evaluation::flag).ok_or_else(|| {
                unsupported(op, lhs, rhs)
            });
        }

        let left = self.compute(lhs, depth)?;
        let right = self.compute(rhs, depth)?;
        if left.rendered != *lhs || right.rendered != *rhs {
            let reduced = BinarySplit {
                lhs: left.rendered,
                op,
                rhs: right.rendered,
            };
            return self.apply(&reduced, depth + 1);
        }

        let matched = match op {
            BinaryOp::Like => glob_match(rhs, lhs)?,
            BinaryOp::NotLike => !glob_match(rhs, lhs)?,
            _ => compare(op, lhs.as_bytes().cmp(rhs.as_bytes()))
                .ok_or_else(|| unsupported(op, lhs, rhs))?,
        };
        Ok(Evaluation::flag(matched))
    }

    fn is_function(&self, operand: &str) -> bool {
        operand.contains('(') && self.host.is_native(call_name(operand))
    }

    /// `1`/`0` for a call that succeeded/failed, `-1` for an empty operand,
    /// otherwise the operand's integer prefix.
    fn operand_score(&mut self, operand: &str) -> i64 {
        if self.is_function(operand) {
            i64::from(self.host.run_action(operand).is_ok())
        } else if operand.is_empty() {
            -1
        } else {
            atoi(operand)
        }
    }
}

/// A value with no operator evaluates to itself. Numeric text is true when
/// non-zero; any other text is true.
fn literal(text: &str) -> Evaluation {
    let truthy = if is_number(text) { atoi(text) } else { 1 };
    Evaluation::new(truthy, text)
}

fn numeric(lhs: &str, op: BinaryOp, rhs: &str) -> Result<Evaluation, RuleError> {
    let x = atof(lhs);
    let y = atof(rhs);
    // Prefix parsing never yields NaN.
    if let Some(holds) = compare(op, x.partial_cmp(&y).unwrap_or(Ordering::Equal)) {
        return Ok(Evaluation::flag(holds));
    }

    let value = match op {
        BinaryOp::IntAdd => return Ok(Evaluation::from_rendered(((x + y) as i64).to_string())),
        BinaryOp::Add => x + y,
        BinaryOp::Sub => x - y,
        BinaryOp::Mul => x * y,
        BinaryOp::Div => x / y,
        _ => return Err(unsupported(op, lhs, rhs)),
    };
    let rendered = if lhs.contains('.') || rhs.contains('.') {
        format!("{value:.6}")
    } else {
        (value as i64).to_string()
    };
    Ok(Evaluation::from_rendered(rendered))
}

fn compare(op: BinaryOp, ordering: Ordering) -> Option<bool> {
    Some(match op {
        BinaryOp::Lt => ordering == Ordering::Less,
        BinaryOp::Gt => ordering == Ordering::Greater,
        BinaryOp::Eq => ordering == Ordering::Equal,
        BinaryOp::Lte => ordering != Ordering::Greater,
        BinaryOp::Gte => ordering != Ordering::Less,
        BinaryOp::Neq => ordering != Ordering::Equal,
        _ => return None,
    })
}

fn unsupported(op: BinaryOp, lhs: &str, rhs: &str) -> RuleError {
    RuleError::UnsupportedOperation {
        op: op.as_str().to_owned(),
        lhs: lhs.to_owned(),
        rhs: rhs.to_owned(),
    }
}

/// Digits, `.`, `-` and `+` only. The empty string qualifies.
#[must_use]
pub fn is_number(text: &str) -> bool {
    text.chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '.' | '-' | '+'))
}

/// Integer prefix of `text`, `0` when there is none.
#[must_use]
pub fn atoi(text: &str) -> i64 {
    let s = text.trim_start();
    let (negative, digits) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };
    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    let magnitude = digits[..end]
        .bytes()
        .fold(0_i64, |acc, b| acc.wrapping_mul(10).wrapping_add(i64::from(b - b'0')));
    if negative {
        magnitude.wrapping_neg()
    } else {
        magnitude
    }
}

/// Floating-point prefix of `text`, `0.0` when there is none.
#[must_use]
pub fn atof(text: &str) -> f64 {
    let s = text.trim_start();
    let bytes = s.as_bytes();
    let mut end = 0;
    if matches!(bytes.first(), Some(b'-' | b'+')) {
        end = 1;
    }
    let mut seen_dot = false;
    let mut seen_digit = false;
    while let Some(&b) = bytes.get(end) {
        match b {
            b'0'..=b'9' => seen_digit = true,
            b'.' if !seen_dot => seen_dot = true,
            _ => break,
        }
        end += 1;
    }
    if !seen_digit {
        return 0.0;
    }
    s[..end].parse().unwrap_or(0.0)
}
