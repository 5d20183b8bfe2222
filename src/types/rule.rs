use std::fmt;

/// Which of the two rule sets a rule belongs to. Application rules are always
/// tried before core rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuleSetKind {
    Application,
    Core,
}

/// A loaded rule: guard, head signature, action list and recovery list.
///
/// Action and recovery lists are kept as `##`-chained text and split on every
/// execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleDefinition {
    pub name: String,
    /// Declared formal parameters, e.g. `*Path`.
    pub formals: Vec<String>,
    pub condition: String,
    pub actions: String,
    pub recoveries: String,
    pub id: i64,
    pub set: RuleSetKind,
}

impl RuleDefinition {
    /// The head signature, `name(formal1,formal2)` or a bare name.
    #[must_use]
    pub fn head(&self) -> String {
        if self.formals.is_empty() {
            self.name.clone()
        } else {
            format!("{}({})", self.name, self.formals.join(","))
        }
    }
}

impl fmt::Display for RuleDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}|{}|{}|{}|{}",
            self.head(),
            self.condition,
            self.actions,
            self.recoveries,
            self.id
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> RuleDefinition {
        RuleDefinition {
            name: "acPostProcForPut".into(),
            formals: vec!["*Path".into(), "*Resc".into()],
            condition: "*Resc == demoResc".into(),
            actions: "msiA ## msiB".into(),
            recoveries: "nop ## nop".into(),
            id: 7,
            set: RuleSetKind::Core,
        }
    }

    #[test]
    fn head_with_formals() {
        assert_eq!(sample().head(), "acPostProcForPut(*Path,*Resc)");
    }

    #[test]
    fn head_without_formals() {
        let rule = RuleDefinition {
            formals: vec![],
            ..sample()
        };
        assert_eq!(rule.head(), "acPostProcForPut");
    }

    #[test]
    fn display_is_persisted_line() {
        assert_eq!(
            sample().to_string(),
            "acPostProcForPut(*Path,*Resc)|*Resc == demoResc|msiA ## msiB|nop ## nop|7"
        );
    }
}
