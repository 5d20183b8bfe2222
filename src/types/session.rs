use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::value::ParamValue;

/// The ambient request records consulted by `$NAME` session variables.
///
/// Fields are addressed by dot-separated paths rooted at one record, for example
/// `client.user`, `data.path`, `coll.name` or `resc.host`. Which paths exist is
/// up to the embedding server; the [`VariableBindingTable`](super::VariableBindingTable)
/// maps symbolic names onto them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    data: BTreeMap<String, SessionNode>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum SessionNode {
    Leaf(ParamValue),
    Nested(BTreeMap<String, SessionNode>),
}

impl SessionRecord {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a value at a dot-separated path. Creates intermediate records as needed.
    #[must_use]
    pub fn set(mut self, path: &str, value: impl Into<ParamValue>) -> Self {
        self.insert(path, value.into());
        self
    }

    /// Insert a value at a dot-separated path (mutable reference version).
    pub fn insert(&mut self, path: &str, value: ParamValue) {
        let segments: Vec<&str> = path.split('.').collect();
        Self::insert_recursive(&mut self.data, &segments, value);
    }

    /// Look up a field. Returns `None` if the path is unset or names a record
    /// rather than a field.
    #[must_use]
    pub fn get(&self, path: &str) -> Option<&ParamValue> {
        let (field, records) = path.rsplit_once('.').map_or((path, None), |(r, f)| (f, Some(r)));
        let map = match records {
            Some(records) => self.record(records)?,
            None => &self.data,
        };
        match map.get(field)? {
            SessionNode::Leaf(value) => Some(value),
            SessionNode::Nested(_) => None,
        }
    }

    /// Whether a record (not a field) exists at `path`.
    #[must_use]
    pub fn has_record(&self, path: &str) -> bool {
        self.record(path).is_some()
    }

    fn record(&self, path: &str) -> Option<&BTreeMap<String, SessionNode>> {
        path.split('.')
            .try_fold(&self.data, |map, segment| match map.get(segment)? {
                SessionNode::Nested(nested) => Some(nested),
                SessionNode::Leaf(_) => None,
            })
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    fn insert_recursive(
        map: &mut BTreeMap<String, SessionNode>,
        segments: &[&str],
        value: ParamValue,
    ) {
        match segments {
            [] => {}
            [last] => {
                map.insert((*last).to_owned(), SessionNode::Leaf(value));
            }
            [first, rest @ ..] => {
                let entry = map
                    .entry((*first).to_owned())
                    .or_insert_with(|| SessionNode::Nested(BTreeMap::new()));
                match entry {
                    SessionNode::Nested(nested) => Self::insert_recursive(nested, rest, value),
                    SessionNode::Leaf(_) => {
                        let mut nested = BTreeMap::new();
                        Self::insert_recursive(&mut nested, rest, value);
                        *entry = SessionNode::Nested(nested);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_and_get() {
        let session = SessionRecord::new()
            .set("client.user", "rods")
            .set("data.size", 1024_i64);
        assert_eq!(session.get("client.user"), Some(&ParamValue::from("rods")));
        assert_eq!(session.get("data.size"), Some(&ParamValue::Int(1024)));
        assert_eq!(session.get("data.path"), None);
    }

    #[test]
    fn record_is_not_a_field() {
        let session = SessionRecord::new().set("coll.name", "/tempZone/home");
        assert_eq!(session.get("coll"), None);
        assert!(session.has_record("coll"));
        assert!(!session.has_record("coll.name"));
        assert!(!session.has_record("resc"));
    }

    #[test]
    fn leaf_replaced_by_record() {
        let mut session = SessionRecord::new().set("resc", "demoResc");
        session.insert("resc.name", ParamValue::from("demoResc"));
        assert_eq!(session.get("resc.name"), Some(&ParamValue::from("demoResc")));
        assert!(!session.is_empty());
    }
}
