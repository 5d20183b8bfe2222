//! Glob patterns for the `like` and `not like` operators.
//!
//! `*` matches any run of characters, `?` any single character, `[set]` and
//! `[!set]` (or `[^set]`) a character in or not in the set, with `a-z` ranges.
//! A backslash makes the next character literal. Patterns are anchored at
//! both ends and compiled to a [`Regex`].

use regex::Regex;

use crate::types::RuleError;

/// Whether `subject` matches the glob `pattern`.
///
/// # Errors
///
/// Returns [`RuleError::InvalidPattern`] for an unclosed `[` or a trailing
/// backslash.
pub fn glob_match(pattern: &str, subject: &str) -> Result<bool, RuleError> {
    Ok(compile(pattern)?.is_match(subject))
}

/// Compile a glob into an anchored regular expression.
///
/// # Errors
///
/// As [`glob_match`].
pub fn compile(pattern: &str) -> Result<Regex, RuleError> {
    let invalid = || RuleError::InvalidPattern {
        pattern: pattern.to_owned(),
    };

    let mut out = String::with_capacity(pattern.len() * 2 + 8);
    out.push_str("^(?s:");
    let mut chars = pattern.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            '\\' => {
                let escaped = chars.next().ok_or_else(invalid)?;
                push_literal(&mut out, escaped);
            }
            '[' => {
                out.push('[');
                if matches!(chars.peek(), Some('!' | '^')) {
                    chars.next();
                    out.push('^');
                }
                let mut members = Vec::new();
                let mut closed = false;
                // A `]` right after the opening bracket is a member.
                if chars.peek() == Some(&']') {
                    chars.next();
                    members.push(']');
                }
                for m in chars.by_ref() {
                    if m == ']' {
                        closed = true;
                        break;
                    }
                    members.push(m);
                }
                if !closed || members.is_empty() {
                    return Err(invalid());
                }
                push_set(&mut out, &members);
                out.push(']');
            }
            other => push_literal(&mut out, other),
        }
    }
    out.push_str(")$");
    Regex::new(&out).map_err(|_| invalid())
}

fn push_literal(out: &mut String, c: char) {
    let mut buf = [0u8; 4];
    out.push_str(&regex::escape(c.encode_utf8(&mut buf)));
}

fn push_set(out: &mut String, members: &[char]) {
    let mut i = 0;
    while i < members.len() {
        let c = members[i];
        if i + 2 < members.len() && members[i + 1] == '-' {
            push_set_char(out, c);
            out.push('-');
            push_set_char(out, members[i + 2]);
            i += 3;
        } else {
            push_set_char(out, c);
            i += 1;
        }
    }
}

fn push_set_char(out: &mut String, c: char) {
    if matches!(c, '\\' | '[' | ']' | '^' | '&' | '-' | '~') {
        out.push('\\');
    }
    out.push(c);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn star_and_question() {
        assert!(glob_match("/tempZone/home/*", "/tempZone/home/rods/a.txt").unwrap());
        assert!(!glob_match("/tempZone/home/*", "/otherZone/home/rods").unwrap());
        assert!(glob_match("file?.dat", "file1.dat").unwrap());
        assert!(!glob_match("file?.dat", "file12.dat").unwrap());
    }

    #[test]
    fn anchored() {
        assert!(!glob_match("abc", "xabcx").unwrap());
        assert!(glob_match("*abc*", "xabcx").unwrap());
    }

    #[test]
    fn sets_and_ranges() {
        assert!(glob_match("[a-c]x", "bx").unwrap());
        assert!(!glob_match("[a-c]x", "dx").unwrap());
        assert!(glob_match("[!a-c]x", "dx").unwrap());
        assert!(glob_match("[]]", "]").unwrap());
        assert!(glob_match("[-+]1", "-1").unwrap());
    }

    #[test]
    fn regex_metacharacters_are_literal() {
        assert!(glob_match("a.b(c)", "a.b(c)").unwrap());
        assert!(!glob_match("a.b", "axb").unwrap());
        assert!(glob_match("\\*", "*").unwrap());
        assert!(!glob_match("\\*", "x").unwrap());
    }

    #[test]
    fn invalid_patterns() {
        assert!(matches!(
            glob_match("[abc", "a"),
            Err(RuleError::InvalidPattern { .. })
        ));
        assert!(matches!(
            glob_match("abc\\", "abc"),
            Err(RuleError::InvalidPattern { .. })
        ));
    }
}
