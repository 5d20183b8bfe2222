use std::fmt;

/// A single `name(arg1, arg2, ...)` unit of work, as parsed from rule text.
///
/// Arguments are kept as raw text: each may be a literal, a `*Name` parameter
/// reference, or a nested call. Calls are re-parsed on every execution because
/// their argument text may still contain unresolved variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionCall {
    pub name: String,
    pub args: Vec<String>,
}

impl ActionCall {
    #[must_use]
    pub fn new(name: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            name: name.into(),
            args,
        }
    }

    #[must_use]
    pub fn argc(&self) -> usize {
        self.args.len()
    }

    /// Render the call back to text that parses to the same name and arguments.
    ///
    /// Zero-argument calls render as a bare name. Arguments that would not
    /// survive re-splitting are wrapped in quotes: embedded commas, surrounding
    /// whitespace, empty text, an enclosing quote pair, or a lone quote.
    #[must_use]
    pub fn render(&self) -> String {
        if self.args.is_empty() {
            return self.name.clone();
        }
        let args: Vec<String> = self.args.iter().map(|a| render_arg(a)).collect();
        format!("{}({})", self.name, args.join(","))
    }
}

fn render_arg(arg: &str) -> String {
    let needs_quotes = arg.is_empty()
        || arg.contains(',')
        || arg.trim() != arg
        || crate::parse::has_enclosing_quotes(arg)
        || !crate::parse::is_well_formed(arg);
    if !needs_quotes {
        return arg.to_owned();
    }
    let quote = if arg.contains('"') { '\'' } else { '"' };
    format!("{quote}{arg}{quote}")
}

impl fmt::Display for ActionCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_bare_name() {
        let call = ActionCall::new("nop", vec![]);
        assert_eq!(call.render(), "nop");
        assert_eq!(call.argc(), 0);
    }

    #[test]
    fn render_quotes_commas() {
        let call = ActionCall::new("f", vec!["a,b".into(), "c".into()]);
        assert_eq!(call.render(), "f(\"a,b\",c)");
    }

    #[test]
    fn render_quotes_with_single_when_double_present() {
        let call = ActionCall::new("f", vec!["say \"hi\", bye".into()]);
        assert_eq!(call.render(), "f('say \"hi\", bye')");
    }

    #[test]
    fn render_quotes_lone_apostrophe() {
        let call = ActionCall::new("f", vec!["it's".into()]);
        assert_eq!(call.render(), "f(\"it's\")");
    }

    #[test]
    fn render_plain_args() {
        let call = ActionCall::new("msiWriteLine", vec!["stdout".into(), "*Msg".into()]);
        assert_eq!(call.to_string(), "msiWriteLine(stdout,*Msg)");
    }
}
