use winnow::ascii::{dec_int, space0};
use winnow::combinator::{cut_err, delimited, eof, opt, preceded, separated, terminated};
use winnow::error::{ModalResult, StrContext, StrContextValue};
use winnow::prelude::*;
use winnow::token::{take_till, take_while};

use super::error::ParseError;
use super::parser::{ParsedAlias, ParsedBinding, ParsedRule};

fn label(description: &'static str) -> StrContext {
    StrContext::Expected(StrContextValue::Description(description))
}

// -- Fields -----------------------------------------------------------------

fn field<'i>(input: &mut &'i str) -> ModalResult<&'i str> {
    take_till(0.., '|').parse_next(input)
}

fn next_field<'i>(input: &mut &'i str) -> ModalResult<&'i str> {
    preceded('|', field).map(str::trim).parse_next(input)
}

fn required_field<'i>(input: &mut &'i str) -> ModalResult<&'i str> {
    cut_err(next_field)
        .context(label("'|' field separator"))
        .parse_next(input)
}

fn record_id(input: &mut &str) -> ModalResult<Option<i64>> {
    opt(preceded(
        '|',
        cut_err(delimited(space0, dec_int::<_, i64, _>, space0)).context(label("numeric id")),
    ))
    .parse_next(input)
}

// -- Rule heads -------------------------------------------------------------

fn head_name<'i>(input: &mut &'i str) -> ModalResult<&'i str> {
    take_while(1.., |c: char| {
        c.is_ascii_alphanumeric() || c == '_' || c == '.'
    })
    .parse_next(input)
}

fn formal<'i>(input: &mut &'i str) -> ModalResult<&'i str> {
    delimited(
        space0,
        take_while(1.., |c: char| c != ',' && c != ')' && !c.is_whitespace()),
        space0,
    )
    .parse_next(input)
}

fn head(input: &mut &str) -> ModalResult<(String, Vec<String>)> {
    let name = delimited(space0, head_name, space0)
        .context(label("rule name"))
        .parse_next(input)?;
    let formals: Option<Vec<&str>> = opt(delimited(
        '(',
        separated(0.., formal, ','),
        (space0, cut_err(')').context(label("')'"))),
    ))
    .parse_next(input)?;
    space0.parse_next(input)?;
    Ok((
        name.to_owned(),
        formals
            .unwrap_or_default()
            .into_iter()
            .map(str::to_owned)
            .collect(),
    ))
}

// -- Records ----------------------------------------------------------------

fn rule_line(input: &mut &str) -> ModalResult<ParsedRule> {
    let (name, formals) = field
        .and_then(terminated(head, eof))
        .context(label("rule head"))
        .parse_next(input)?;
    let condition = required_field.parse_next(input)?;
    let actions = required_field.parse_next(input)?;
    let recoveries = required_field.parse_next(input)?;
    let id = record_id.parse_next(input)?;
    Ok(ParsedRule {
        name,
        formals,
        condition: condition.to_owned(),
        actions: actions.to_owned(),
        recoveries: recoveries.to_owned(),
        id,
    })
}

fn binding_line(input: &mut &str) -> ModalResult<ParsedBinding> {
    let name = field.map(str::trim).parse_next(input)?;
    let scope = required_field.parse_next(input)?;
    let path = required_field.parse_next(input)?;
    let id = record_id.parse_next(input)?;
    Ok(ParsedBinding {
        name: name.trim_start_matches('$').to_owned(),
        scope: scope
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_owned)
            .collect(),
        path: path.to_owned(),
        id,
    })
}

fn alias_line(input: &mut &str) -> ModalResult<ParsedAlias> {
    let external = field.map(str::trim).parse_next(input)?;
    let internal = required_field.parse_next(input)?;
    let id = record_id.parse_next(input)?;
    Ok(ParsedAlias {
        external: external.to_owned(),
        internal: internal.to_owned(),
        id,
    })
}

// -- Line driver ------------------------------------------------------------

/// Comment lines and lines too short to hold a record are ignored.
fn is_skipped(line: &str) -> bool {
    line.trim_start().starts_with('#') || line.trim().len() < 4
}

fn parse_lines<T>(
    input: &str,
    mut record: impl FnMut(&mut &str) -> ModalResult<T>,
) -> Result<Vec<T>, ParseError> {
    let mut out = Vec::new();
    for (n, line) in input.lines().enumerate() {
        if is_skipped(line) {
            continue;
        }
        let parsed = record
            .parse(line)
            .map_err(|e| ParseError::at_line(n + 1, e.to_string()))?;
        out.push(parsed);
    }
    Ok(out)
}

pub fn rules(input: &str) -> Result<Vec<ParsedRule>, ParseError> {
    parse_lines(input, rule_line)
}

pub fn bindings(input: &str) -> Result<Vec<ParsedBinding>, ParseError> {
    parse_lines(input, binding_line)
}

pub fn aliases(input: &str) -> Result<Vec<ParsedAlias>, ParseError> {
    parse_lines(input, alias_line)
}

pub fn rule_head(input: &str) -> Result<(String, Vec<String>), ParseError> {
    head.parse(input)
        .map_err(|e| ParseError::new(e.to_string()))
}
