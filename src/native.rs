//! Native functions callable from rule bodies, and the external-name alias map.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use crate::engine::CallContext;
use crate::error::RexecError;
use crate::types::{Parameter, RuleError, Status};

/// A function implemented by the host and invoked by name from rule text.
///
/// `args` holds one parameter per call argument, in order. Arguments that name
/// a `*` variable are written back to the caller's parameters after the call,
/// so a native returns results by assigning to them.
pub trait NativeCall: Send + Sync {
    /// # Errors
    ///
    /// Any failure; it triggers the calling rule's recovery walk.
    fn call(&self, args: &mut [Parameter], cx: &mut CallContext<'_>) -> Result<Status, RuleError>;
}

impl<F> NativeCall for F
where
    F: Fn(&mut [Parameter], &mut CallContext<'_>) -> Result<Status, RuleError> + Send + Sync,
{
    fn call(&self, args: &mut [Parameter], cx: &mut CallContext<'_>) -> Result<Status, RuleError> {
        self(args, cx)
    }
}

/// A registered native with its fixed arity.
#[derive(Clone)]
pub struct NativeEntry {
    arity: usize,
    raw_args: bool,
    call: Arc<dyn NativeCall>,
}

impl NativeEntry {
    #[must_use]
    pub fn arity(&self) -> usize {
        self.arity
    }

    /// Whether arguments reach the native as written, without variable
    /// substitution. Control-flow natives resolve their own arguments.
    #[must_use]
    pub fn raw_args(&self) -> bool {
        self.raw_args
    }

    pub(crate) fn call(
        &self,
        args: &mut [Parameter],
        cx: &mut CallContext<'_>,
    ) -> Result<Status, RuleError> {
        self.call.call(args, cx)
    }
}

impl fmt::Debug for NativeEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeEntry")
            .field("arity", &self.arity)
            .field("raw_args", &self.raw_args)
            .finish_non_exhaustive()
    }
}

/// Name to native function registry. Lookup is by exact name; arity is
/// checked by the dispatcher.
#[derive(Debug, Clone, Default)]
pub struct NativeTable {
    entries: HashMap<String, NativeEntry>,
}

impl NativeTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `call` under `name`, replacing any earlier registration.
    pub fn insert(&mut self, name: &str, arity: usize, call: impl NativeCall + 'static) {
        self.insert_entry(name, arity, false, Arc::new(call));
    }

    /// Register a native that receives its arguments unsubstituted.
    pub fn insert_raw(&mut self, name: &str, arity: usize, call: impl NativeCall + 'static) {
        self.insert_entry(name, arity, true, Arc::new(call));
    }

    fn insert_entry(
        &mut self,
        name: &str,
        arity: usize,
        raw_args: bool,
        call: Arc<dyn NativeCall>,
    ) {
        self.entries.insert(
            name.to_owned(),
            NativeEntry {
                arity,
                raw_args,
                call,
            },
        );
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&NativeEntry> {
        self.entries.get(name)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

/// External action names mapped onto internal ones, applied once to every
/// dispatched call name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FunctionMap {
    aliases: HashMap<String, String>,
}

impl FunctionMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, external: &str, internal: &str) -> Self {
        self.insert(external, internal);
        self
    }

    pub fn insert(&mut self, external: &str, internal: &str) {
        self.aliases
            .insert(external.to_owned(), internal.to_owned());
    }

    /// The internal name for `name`, or `name` itself when it has no alias.
    #[must_use]
    pub fn resolve<'a>(&'a self, name: &'a str) -> &'a str {
        self.aliases.get(name).map_or(name, String::as_str)
    }

    /// Add every alias of `other`, overriding entries with the same external name.
    pub fn extend(&mut self, other: FunctionMap) {
        self.aliases.extend(other.aliases);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.aliases.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.aliases.is_empty()
    }

    /// Parse function-map text (`external_name|internal_name|id` per line).
    ///
    /// # Errors
    ///
    /// Returns [`RexecError::Parse`] if a line is malformed.
    pub fn from_text(input: &str) -> Result<Self, RexecError> {
        let parsed = crate::parse::parse_function_map(input)?;
        let mut map = Self::new();
        for alias in parsed {
            map.insert(&alias.external, &alias.internal);
        }
        Ok(map)
    }

    /// Read and parse a function-map file.
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

#[cfg(test)]
mod tests {
    use super::*;

    fn succeed(_: &mut [Parameter], _: &mut CallContext<'_>) -> Result<Status, RuleError> {
        Ok(Status::Success)
    }

    #[test]
    fn table_registration() {
        let mut table = NativeTable::new();
        assert!(table.is_empty());
        table.insert("msiNoop", 0, succeed);
        table.insert_raw("msiRaw", 2, succeed);
        assert_eq!(table.len(), 2);
        assert!(table.contains("msiNoop"));
        assert!(!table.get("msiNoop").unwrap().raw_args());
        let raw = table.get("msiRaw").unwrap();
        assert!(raw.raw_args());
        assert_eq!(raw.arity(), 2);
        assert!(table.get("msiMissing").is_none());
    }

    #[test]
    fn reregistering_replaces() {
        let mut table = NativeTable::new();
        table.insert("msiA", 1, succeed);
        table.insert("msiA", 3, succeed);
        assert_eq!(table.len(), 1);
        assert_eq!(table.get("msiA").unwrap().arity(), 3);
    }

    #[test]
    fn function_map_resolves_once() {
        let map = FunctionMap::new().with("a", "b").with("b", "c");
        assert_eq!(map.resolve("a"), "b");
        assert_eq!(map.resolve("b"), "c");
        assert_eq!(map.resolve("z"), "z");
    }

    #[test]
    fn function_map_from_text() {
        let map = FunctionMap::from_text(
            "# aliases\nmsiGetSize|msiObjStat|1\nping|msiPing|2\nab\n",
        )
        .unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map.resolve("ping"), "msiPing");
    }
}
