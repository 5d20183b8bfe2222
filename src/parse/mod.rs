mod call;
mod error;
mod grammar;
mod parser;
mod split;

pub use call::{call_name, has_enclosing_quotes, parse_call, trim_quotes, MAX_ARGS};
pub use error::ParseError;
pub use parser::{ParsedAlias, ParsedBinding, ParsedRule};
pub use split::{
    is_well_formed, split_all, split_binary, split_chain, unwrap_parens, BinaryOp, BinarySplit,
};

/// Parse persisted rule text, one `head|condition|actions|recoveries|id`
/// record per line.
///
/// # Errors
///
/// Returns [`ParseError`] naming the first malformed line.
pub fn parse_rules(input: &str) -> Result<Vec<ParsedRule>, ParseError> {
    grammar::rules(input)
}

/// Parse variable-map text, one `name|action_scope|field_path|id` record per line.
///
/// # Errors
///
/// Returns [`ParseError`] naming the first malformed line.
pub fn parse_bindings(input: &str) -> Result<Vec<ParsedBinding>, ParseError> {
    grammar::bindings(input)
}

/// Parse function-map text, one `external_name|internal_name|id` record per line.
///
/// # Errors
///
/// Returns [`ParseError`] naming the first malformed line.
pub fn parse_function_map(input: &str) -> Result<Vec<ParsedAlias>, ParseError> {
    grammar::aliases(input)
}

/// Parse a rule head signature into its name and formal parameters.
///
/// # Errors
///
/// Returns [`ParseError`] if the head is not `name` or `name(formal, ...)`.
pub fn parse_head(input: &str) -> Result<(String, Vec<String>), ParseError> {
    grammar::rule_head(input)
}
