use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use crate::error::RexecError;
use crate::parse::{self, ParsedRule};

use super::error::{LoadError, RuleError};
use super::rule::{RuleDefinition, RuleSetKind};

/// Builder for a [`RuleBase`]. Rules are declared with closures, in the order
/// they should be tried.
///
/// # Example
///
/// ```
/// use rexec::RuleBaseBuilder;
///
/// let rules = RuleBaseBuilder::new()
///     .rule("acPostProcForPut(*Path)", |r| {
///         r.when("*Path like /tempZone/home/*")
///             .then("msiReplicate(*Path) ## msiNotify(*Path)")
///             .recover("msiTrim(*Path) ## nop")
///     })
///     .core_rule("acPostProcForPut(*Path)", |r| r.then("nop"))
///     .build()
///     .unwrap();
/// assert_eq!(rules.len(), 2);
/// ```
#[derive(Debug, Default)]
pub struct RuleBaseBuilder {
    application: Vec<(String, RuleBuilder)>,
    core: Vec<(String, RuleBuilder)>,
}

/// Intermediate builder passed to the rule definition closure.
#[derive(Debug, Default)]
pub struct RuleBuilder {
    condition: String,
    actions: String,
    recoveries: String,
    id: Option<i64>,
}

impl RuleBaseBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare an application rule. `head` is `name(formal1, ...)` or a bare name.
    #[must_use]
    pub fn rule(mut self, head: &str, f: impl FnOnce(RuleBuilder) -> RuleBuilder) -> Self {
        self.application
            .push((head.to_owned(), f(RuleBuilder::default())));
        self
    }

    /// Declare a core rule, tried after every application rule.
    #[must_use]
    pub fn core_rule(mut self, head: &str, f: impl FnOnce(RuleBuilder) -> RuleBuilder) -> Self {
        self.core.push((head.to_owned(), f(RuleBuilder::default())));
        self
    }

    /// Validate the declared rules and build the immutable rule base.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError`] if a head is not a valid signature, a body does
    /// not split, or a rule declares more recoveries than actions.
    pub fn build(self) -> Result<RuleBase, LoadError> {
        let application = build_set(RuleSetKind::Application, self.application)?;
        let core = build_set(RuleSetKind::Core, self.core)?;
        Ok(RuleBase { application, core })
    }
}

fn build_set(kind: RuleSetKind, rules: Vec<(String, RuleBuilder)>) -> Result<RuleSet, LoadError> {
    let mut set = RuleSet::empty(kind);
    for (index, (head, builder)) in rules.into_iter().enumerate() {
        let (name, formals) =
            parse::parse_head(&head).map_err(|_| LoadError::InvalidHead { head: head.clone() })?;
        set.push(RuleDefinition {
            name,
            formals,
            condition: builder.condition,
            actions: builder.actions,
            recoveries: builder.recoveries,
            id: builder.id.unwrap_or(index as i64),
            set: kind,
        })?;
    }
    Ok(set)
}

impl RuleBuilder {
    /// Guard condition. An empty guard always holds.
    #[must_use]
    pub fn when(mut self, condition: &str) -> Self {
        self.condition = condition.to_owned();
        self
    }

    /// `##`-chained action list.
    #[must_use]
    pub fn then(mut self, actions: &str) -> Self {
        self.actions = actions.to_owned();
        self
    }

    /// `##`-chained recovery list, paired index-for-index with the actions.
    #[must_use]
    pub fn recover(mut self, recoveries: &str) -> Self {
        self.recoveries = recoveries.to_owned();
        self
    }

    #[must_use]
    pub fn id(mut self, id: i64) -> Self {
        self.id = Some(id);
        self
    }
}

/// Where [`RuleBase::find_next`] resumes scanning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Cursor {
    /// Before the first application rule.
    #[default]
    Start,
    /// Just after the rule at `index` in `set`.
    At { set: RuleSetKind, index: usize },
}

/// One ordered rule set, indexed by rule name.
#[derive(Debug, Clone)]
pub struct RuleSet {
    kind: RuleSetKind,
    rules: Vec<RuleDefinition>,
    by_name: HashMap<String, Vec<usize>>,
}

impl RuleSet {
    #[must_use]
    pub fn empty(kind: RuleSetKind) -> Self {
        Self {
            kind,
            rules: Vec::new(),
            by_name: HashMap::new(),
        }
    }

    fn push(&mut self, rule: RuleDefinition) -> Result<(), LoadError> {
        validate(&rule)?;
        self.by_name
            .entry(rule.name.clone())
            .or_default()
            .push(self.rules.len());
        self.rules.push(rule);
        Ok(())
    }

    #[must_use]
    pub fn kind(&self) -> RuleSetKind {
        self.kind
    }

    pub fn rules(&self) -> impl Iterator<Item = &RuleDefinition> {
        self.rules.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<&RuleDefinition> {
        self.rules.get(index)
    }

    /// First rule named `name` at or after `from`.
    fn next_index(&self, name: &str, from: usize) -> Option<usize> {
        self.by_name
            .get(name)?
            .iter()
            .copied()
            .find(|&i| i >= from)
    }

    /// Parse persisted rule text (`head|condition|actions|recoveries|id` per line).
    ///
    /// # Errors
    ///
    /// Returns [`RexecError::Parse`] for malformed lines and
    /// [`RexecError::Load`] for rules that fail validation.
    pub fn from_text(kind: RuleSetKind, input: &str) -> Result<Self, RexecError> {
        let parsed = parse::parse_rules(input)?;
        let mut set = RuleSet::empty(kind);
        for (index, rule) in parsed.into_iter().enumerate() {
            set.push(definition_from_parsed(rule, kind, index))?;
        }
        Ok(set)
    }

    /// Read and parse a persisted rule file.
    ///
    /// # Errors
    ///
    /// Returns [`RexecError::Io`] if the file cannot be read, otherwise as
    /// [`from_text`](Self::from_text).
    pub fn from_file(kind: RuleSetKind, path: impl AsRef<Path>) -> Result<Self, RexecError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_text(kind, &content)
    }
}

fn definition_from_parsed(rule: ParsedRule, set: RuleSetKind, index: usize) -> RuleDefinition {
    RuleDefinition {
        name: rule.name,
        formals: rule.formals,
        condition: rule.condition,
        actions: rule.actions,
        recoveries: rule.recoveries,
        id: rule.id.unwrap_or(index as i64),
        set,
    }
}

fn validate(rule: &RuleDefinition) -> Result<(), LoadError> {
    let malformed = |source| LoadError::MalformedBody {
        rule: rule.name.clone(),
        source,
    };
    let actions = parse::split_all(&rule.actions).map_err(malformed)?;
    let recoveries = parse::split_all(&rule.recoveries).map_err(malformed)?;
    if recoveries.len() > actions.len() {
        return Err(LoadError::TooManyRecoveries {
            rule: rule.name.clone(),
            actions: actions.len(),
            recoveries: recoveries.len(),
        });
    }
    Ok(())
}

impl fmt::Display for RuleSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for rule in &self.rules {
            writeln!(f, "{rule}")?;
        }
        Ok(())
    }
}

/// The application and core rule sets of one process. Immutable; reloading
/// replaces the whole base.
#[derive(Debug, Clone)]
pub struct RuleBase {
    application: RuleSet,
    core: RuleSet,
}

impl Default for RuleBase {
    fn default() -> Self {
        Self {
            application: RuleSet::empty(RuleSetKind::Application),
            core: RuleSet::empty(RuleSetKind::Core),
        }
    }
}

impl RuleBase {
    /// Combine two loaded sets. Their kinds are normalised to their position.
    #[must_use]
    pub fn new(mut application: RuleSet, mut core: RuleSet) -> Self {
        retag(&mut application, RuleSetKind::Application);
        retag(&mut core, RuleSetKind::Core);
        Self { application, core }
    }

    /// Parse application and core rule text.
    ///
    /// # Errors
    ///
    /// As [`RuleSet::from_text`].
    pub fn from_text(application: &str, core: &str) -> Result<Self, RexecError> {
        Ok(Self {
            application: RuleSet::from_text(RuleSetKind::Application, application)?,
            core: RuleSet::from_text(RuleSetKind::Core, core)?,
        })
    }

    #[must_use]
    pub fn application(&self) -> &RuleSet {
        &self.application
    }

    #[must_use]
    pub fn core(&self) -> &RuleSet {
        &self.core
    }

    /// Total number of rules in both sets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.application.len() + self.core.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether any rule in either set is named `name`.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.application.by_name.contains_key(name) || self.core.by_name.contains_key(name)
    }

    /// The next rule named `name` after `cursor`: application rules first,
    /// then core rules, each in declaration order.
    ///
    /// # Errors
    ///
    /// Returns [`RuleError::NoMoreRules`] once both sets are exhausted.
    pub fn find_next(
        &self,
        name: &str,
        cursor: Cursor,
    ) -> Result<(&RuleDefinition, Cursor), RuleError> {
        let (app_from, core_from) = match cursor {
            Cursor::Start => (Some(0), 0),
            Cursor::At {
                set: RuleSetKind::Application,
                index,
            } => (Some(index + 1), 0),
            Cursor::At {
                set: RuleSetKind::Core,
                index,
            } => (None, index + 1),
        };

        if let Some(from) = app_from {
            if let Some(index) = self.application.next_index(name, from) {
                let cursor = Cursor::At {
                    set: RuleSetKind::Application,
                    index,
                };
                return Ok((&self.application.rules[index], cursor));
            }
        }
        if let Some(index) = self.core.next_index(name, core_from) {
            let cursor = Cursor::At {
                set: RuleSetKind::Core,
                index,
            };
            return Ok((&self.core.rules[index], cursor));
        }
        Err(RuleError::NoMoreRules {
            name: name.to_owned(),
        })
    }
}

fn retag(set: &mut RuleSet, kind: RuleSetKind) {
    set.kind = kind;
    for rule in &mut set.rules {
        rule.set = kind;
    }
}

impl fmt::Display for RuleBase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "# application")?;
        write!(f, "{}", self.application)?;
        writeln!(f, "# core")?;
        write!(f, "{}", self.core)
    }
}
