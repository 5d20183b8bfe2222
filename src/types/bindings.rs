use std::path::Path;

use crate::error::RexecError;

/// One `$NAME` declaration: the session field it reads and writes, optionally
/// restricted to a set of action names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    pub name: String,
    /// Action names this entry applies to. Empty means every action.
    pub scope: Vec<String>,
    /// Dot-separated path into the [`SessionRecord`](super::SessionRecord).
    pub path: String,
    pub id: Option<i64>,
}

impl Binding {
    #[must_use]
    pub fn new(name: &str, path: &str) -> Self {
        Self {
            name: name.to_owned(),
            scope: Vec::new(),
            path: path.to_owned(),
            id: None,
        }
    }

    /// Restrict this entry to the given action names.
    #[must_use]
    pub fn scoped(mut self, actions: &[&str]) -> Self {
        self.scope = actions.iter().map(|a| (*a).to_owned()).collect();
        self
    }

    fn is_unscoped(&self) -> bool {
        self.scope.is_empty()
    }

    fn applies_to(&self, action: &str) -> bool {
        self.scope.iter().any(|a| a == action)
    }
}

/// Declarative mapping from `$NAME` session variables to session field paths.
///
/// A name may be declared several times. Lookups try the entries scoped to the
/// current action first, then the unscoped ones, each group in declaration
/// order; the resolver moves to the next entry when a path is unset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VariableBindingTable {
    entries: Vec<Binding>,
}

const STANDARD: &[(&str, &str)] = &[
    ("userNameClient", "client.user"),
    ("rodsZoneClient", "client.zone"),
    ("userTypeClient", "client.type"),
    ("hostClient", "client.host"),
    ("userAuthSchemeClient", "client.auth_scheme"),
    ("userNameProxy", "proxy.user"),
    ("rodsZoneProxy", "proxy.zone"),
    ("objPath", "data.path"),
    ("rescName", "data.resc_name"),
    ("rescName", "resc.name"),
    ("rescGroupName", "data.resc_group"),
    ("dataType", "data.type"),
    ("dataSize", "data.size"),
    ("chksum", "data.checksum"),
    ("version", "data.version"),
    ("filePath", "data.file_path"),
    ("dataOwner", "data.owner"),
    ("dataOwnerZone", "data.owner_zone"),
    ("replNum", "data.repl_num"),
    ("replStatus", "data.repl_status"),
    ("dataId", "data.id"),
    ("dataComments", "data.comments"),
    ("dataExpiry", "data.expiry"),
    ("dataCreate", "data.create_time"),
    ("dataModify", "data.modify_time"),
    ("collId", "coll.id"),
    ("collName", "coll.name"),
    ("collParentName", "coll.parent"),
    ("collOwnerName", "coll.owner"),
    ("collOwnerZone", "coll.owner_zone"),
    ("rescLoc", "resc.host"),
    ("rescType", "resc.type"),
    ("rescClass", "resc.class"),
    ("rescVaultPath", "resc.vault_path"),
    ("freeSpace", "resc.free_space"),
];

impl VariableBindingTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The standard session variables over the `client`, `proxy`, `data`,
    /// `coll` and `resc` records.
    #[must_use]
    pub fn standard() -> Self {
        STANDARD
            .iter()
            .map(|(name, path)| Binding::new(name, path))
            .collect()
    }

    #[must_use]
    pub fn with(mut self, binding: Binding) -> Self {
        self.entries.push(binding);
        self
    }

    pub fn push(&mut self, binding: Binding) {
        self.entries.push(binding);
    }

    /// Append every entry of `other` after this table's entries.
    pub fn extend(&mut self, other: VariableBindingTable) {
        self.entries.extend(other.entries);
    }

    /// Candidate field paths for `$name` while executing `action`, in the order
    /// they should be tried.
    pub fn candidates<'a>(
        &'a self,
        name: &'a str,
        action: &'a str,
    ) -> impl Iterator<Item = &'a str> + 'a {
        let named = move |b: &&Binding| b.name == name;
        let scoped = self
            .entries
            .iter()
            .filter(named)
            .filter(move |b| b.applies_to(action));
        let unscoped = self
            .entries
            .iter()
            .filter(named)
            .filter(|b| b.is_unscoped());
        scoped.chain(unscoped).map(|b| b.path.as_str())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Parse a variable-map text (`name|action_scope|field_path|id` per line).
    ///
    /// # Errors
    ///
    /// Returns [`RexecError::Parse`] if a line is malformed.
    pub fn from_text(input: &str) -> Result<Self, RexecError> {
        let parsed = crate::parse::parse_bindings(input)?;
        Ok(parsed
            .into_iter()
            .map(|p| Binding {
                name: p.name,
                scope: p.scope,
                path: p.path,
                id: p.id,
            })
            .collect())
    }

    /// Read and parse a variable-map file.
    ///
    /// # Errors
    ///
    /// Returns [`RexecError::Io`] if the file cannot be read, or
    /// [`RexecError::Parse`] if its content is malformed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, RexecError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_text(&content)
    }
}

impl FromIterator<Binding> for VariableBindingTable {
    fn from_iter<I: IntoIterator<Item = Binding>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}
