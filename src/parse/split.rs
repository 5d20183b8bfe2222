use std::fmt;

use crate::types::RuleError;

/// Binary operators recognised by [`split_binary`].
///
/// There is no precedence: the leftmost operator whose two sides are both
/// well-formed wins, so `1 + 2 * 3` splits as `1` `+` `2 * 3`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    And,
    Or,
    Gte,
    Lte,
    Eq,
    /// `++`: integer sum, truncating both operands.
    IntAdd,
    Neq,
    Lt,
    Gt,
    Add,
    Sub,
    Mul,
    Div,
    NotLike,
    Like,
}

// Tried in this order at every position: four-character tokens, then
// three-character tokens, then the word operators.
const OPERATORS: [(&str, BinaryOp); 15] = [
    (" && ", BinaryOp::And),
    (" %% ", BinaryOp::Or),
    (" >= ", BinaryOp::Gte),
    (" <= ", BinaryOp::Lte),
    (" == ", BinaryOp::Eq),
    (" ++ ", BinaryOp::IntAdd),
    (" != ", BinaryOp::Neq),
    (" < ", BinaryOp::Lt),
    (" > ", BinaryOp::Gt),
    (" + ", BinaryOp::Add),
    (" - ", BinaryOp::Sub),
    (" * ", BinaryOp::Mul),
    (" / ", BinaryOp::Div),
    (" not like ", BinaryOp::NotLike),
    (" like ", BinaryOp::Like),
];

impl BinaryOp {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            BinaryOp::And => "&&",
            BinaryOp::Or => "%%",
            BinaryOp::Gte => ">=",
            BinaryOp::Lte => "<=",
            BinaryOp::Eq => "==",
            BinaryOp::IntAdd => "++",
            BinaryOp::Neq => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Gt => ">",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::NotLike => "not like",
            BinaryOp::Like => "like",
        }
    }

    #[must_use]
    pub fn is_logical(self) -> bool {
        matches!(self, BinaryOp::And | BinaryOp::Or)
    }

    #[must_use]
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Gte
                | BinaryOp::Lte
                | BinaryOp::Eq
                | BinaryOp::Neq
                | BinaryOp::Lt
                | BinaryOp::Gt
        )
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A binary expression split into its operands, both trimmed and with one
/// redundant layer of enclosing parentheses removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinarySplit {
    pub lhs: String,
    pub op: BinaryOp,
    pub rhs: String,
}

/// Whether quotes and parentheses in `text` balance.
///
/// `'` and `"` toggle their own quote state and everything inside an open
/// quote is ignored. `(` opens a level and `)` closes one only when a level is
/// open, so a stray `)` is tolerated.
#[must_use]
pub fn is_well_formed(text: &str) -> bool {
    let mut depth = 0usize;
    let mut in_single = false;
    let mut in_double = false;
    for c in text.chars() {
        match c {
            '\'' if !in_double => in_single = !in_single,
            '"' if !in_single => in_double = !in_double,
            '(' if !in_single && !in_double => depth += 1,
            ')' if !in_single && !in_double => depth = depth.saturating_sub(1),
            _ => {}
        }
    }
    depth == 0 && !in_single && !in_double
}

/// Remove one layer of enclosing parentheses when what remains is still
/// well-formed. `(a) + (b)` is left untouched.
#[must_use]
pub fn unwrap_parens(text: &str) -> &str {
    let trimmed = text.trim();
    match trimmed
        .strip_prefix('(')
        .and_then(|rest| rest.strip_suffix(')'))
    {
        Some(inner) if is_well_formed(inner) => inner.trim(),
        _ => trimmed,
    }
}

fn operator_at(text: &str) -> Option<(&'static str, BinaryOp)> {
    OPERATORS
        .iter()
        .copied()
        .find(|(token, _)| text.starts_with(token))
}

/// Split `text` at its leftmost top-level binary operator.
///
/// Operators are space-delimited tokens. A candidate is skipped when either
/// side is not well-formed, which keeps operators inside quotes or unbalanced
/// parentheses out of the split; scanning resumes after the skipped token.
/// Returns `Ok(None)` when no operator applies.
///
/// # Errors
///
/// Returns [`RuleError::MalformedExpression`] if `text` itself is not
/// well-formed.
pub fn split_binary(text: &str) -> Result<Option<BinarySplit>, RuleError> {
    if !is_well_formed(text) {
        return Err(RuleError::MalformedExpression {
            text: text.to_owned(),
        });
    }
    let mut i = 0;
    while i < text.len() {
        if let Some((token, op)) = operator_at(&text[i..]) {
            let lhs = &text[..i];
            let rhs = &text[i + token.len()..];
            if is_well_formed(lhs) && is_well_formed(rhs) {
                return Ok(Some(BinarySplit {
                    lhs: unwrap_parens(lhs).to_owned(),
                    op,
                    rhs: unwrap_parens(rhs).to_owned(),
                }));
            }
            i += token.len();
            continue;
        }
        i += text[i..].chars().next().map_or(1, char::len_utf8);
    }
    Ok(None)
}

/// Split an action or recovery list at its first top-level `##`.
///
/// Returns the trimmed first call and, if a separator was found, the trimmed
/// remainder.
///
/// # Errors
///
/// Returns [`RuleError::MalformedExpression`] if no separator can be taken
/// and the list is not well-formed.
pub fn split_chain(text: &str) -> Result<(String, Option<String>), RuleError> {
    let mut search = 0;
    while let Some(offset) = text[search..].find("##") {
        let at = search + offset;
        if is_well_formed(&text[..at]) {
            return Ok((
                text[..at].trim().to_owned(),
                Some(text[at + 2..].trim().to_owned()),
            ));
        }
        search = at + 2;
    }
    if !is_well_formed(text) {
        return Err(RuleError::MalformedExpression {
            text: text.to_owned(),
        });
    }
    Ok((text.trim().to_owned(), None))
}

/// Split a whole `##`-chained list into its calls. Empty text yields no calls.
///
/// # Errors
///
/// Propagates [`split_chain`] failures.
pub fn split_all(text: &str) -> Result<Vec<String>, RuleError> {
    let mut steps = Vec::new();
    let mut rest = text.trim().to_owned();
    while !rest.is_empty() {
        let (first, tail) = split_chain(&rest)?;
        steps.push(first);
        match tail {
            Some(tail) => rest = tail,
            None => break,
        }
    }
    Ok(steps)
}
