use serde::{Deserialize, Serialize};

use super::value::ParamValue;

/// A named, dynamically-typed value. The name is the binding key and keeps
/// its leading `*` for parameter references.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub value: ParamValue,
}

impl Parameter {
    #[must_use]
    pub fn new(name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    /// A declared parameter with no value yet.
    #[must_use]
    pub fn unset(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: ParamValue::Null,
        }
    }
}

/// Insertion-ordered collection of [`Parameter`]s with unique names.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ParamArray {
    params: Vec<Parameter>,
}

impl ParamArray {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style [`insert`](Self::insert).
    #[must_use]
    pub fn with(mut self, name: &str, value: impl Into<ParamValue>) -> Self {
        self.set(name, value);
        self
    }

    /// Insert a parameter. An existing parameter of the same name is replaced
    /// in place, keeping its position.
    pub fn insert(&mut self, param: Parameter) {
        match self.params.iter_mut().find(|p| p.name == param.name) {
            Some(slot) => *slot = param,
            None => self.params.push(param),
        }
    }

    pub fn set(&mut self, name: &str, value: impl Into<ParamValue>) {
        self.insert(Parameter::new(name, value));
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Parameter> {
        self.params.iter().find(|p| p.name == name)
    }

    #[must_use]
    pub fn get_mut(&mut self, name: &str) -> Option<&mut Parameter> {
        self.params.iter_mut().find(|p| p.name == name)
    }

    #[must_use]
    pub fn value(&self, name: &str) -> Option<&ParamValue> {
        self.get(name).map(|p| &p.value)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn remove(&mut self, name: &str) -> Option<Parameter> {
        let index = self.params.iter().position(|p| p.name == name)?;
        Some(self.params.remove(index))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Parameter> {
        self.params.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.params.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// First duplicated name, if any. Arrays built through this API never
    /// have one; decoded arrays are checked with this.
    #[must_use]
    pub(crate) fn duplicate_name(&self) -> Option<&str> {
        self.params.iter().enumerate().find_map(|(i, p)| {
            self.params[..i]
                .iter()
                .any(|q| q.name == p.name)
                .then_some(p.name.as_str())
        })
    }
}

impl FromIterator<Parameter> for ParamArray {
    fn from_iter<I: IntoIterator<Item = Parameter>>(iter: I) -> Self {
        let mut array = ParamArray::new();
        for param in iter {
            array.insert(param);
        }
        array
    }
}

impl<'a> IntoIterator for &'a ParamArray {
    type Item = &'a Parameter;
    type IntoIter = std::slice::Iter<'a, Parameter>;

    fn into_iter(self) -> Self::IntoIter {
        self.params.iter()
    }
}
