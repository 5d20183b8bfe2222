use std::fmt;

use serde::{Deserialize, Serialize};

/// Dynamically-typed payload of a [`Parameter`](super::Parameter).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum ParamValue {
    /// Declared but never written. Resolves as the literal reference text.
    #[default]
    Null,
    /// A UTF-8 string.
    Str(String),
    /// A 64-bit signed integer.
    Int(i64),
    /// A 64-bit floating-point number.
    Double(f64),
    /// Opaque bytes.
    Buffer(Vec<u8>),
    /// A homogeneous list of strings.
    StrArray(Vec<String>),
    /// A homogeneous list of integers.
    IntArray(Vec<i64>),
    /// Ordered key/value pairs.
    KeyValue(Vec<(String, String)>),
    /// A tabular query result.
    Table(Table),
}

/// Column-named rows returned by a catalog query.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    #[must_use]
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_row(mut self, row: Vec<String>) -> Self {
        self.rows.push(row);
        self
    }

    /// One row as column/value pairs. Missing trailing cells render empty.
    #[must_use]
    pub fn row_pairs(&self, index: usize) -> Option<Vec<(String, String)>> {
        let row = self.rows.get(index)?;
        Some(
            self.columns
                .iter()
                .enumerate()
                .map(|(i, col)| (col.clone(), row.get(i).cloned().unwrap_or_default()))
                .collect(),
        )
    }
}

impl ParamValue {
    /// Text form used when substituting a `*Name` reference. Only scalar
    /// values have one.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        match self {
            ParamValue::Str(s) => Some(s.clone()),
            ParamValue::Int(i) => Some(i.to_string()),
            ParamValue::Double(d) => Some(format!("{d:.6}")),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, ParamValue::Null)
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Name of the discriminant, for diagnostics.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            ParamValue::Null => "null",
            ParamValue::Str(_) => "string",
            ParamValue::Int(_) => "int",
            ParamValue::Double(_) => "double",
            ParamValue::Buffer(_) => "buffer",
            ParamValue::StrArray(_) => "string array",
            ParamValue::IntArray(_) => "int array",
            ParamValue::KeyValue(_) => "key/value",
            ParamValue::Table(_) => "table",
        }
    }
}

impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        ParamValue::Int(v)
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        ParamValue::Double(v)
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        ParamValue::Str(v.to_owned())
    }
}

impl From<String> for ParamValue {
    fn from(v: String) -> Self {
        ParamValue::Str(v)
    }
}

impl From<Vec<String>> for ParamValue {
    fn from(v: Vec<String>) -> Self {
        ParamValue::StrArray(v)
    }
}

impl From<Vec<i64>> for ParamValue {
    fn from(v: Vec<i64>) -> Self {
        ParamValue::IntArray(v)
    }
}

impl From<Table> for ParamValue {
    fn from(v: Table) -> Self {
        ParamValue::Table(v)
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Null => write!(f, "null"),
            ParamValue::Str(v) => write!(f, "\"{v}\""),
            ParamValue::Int(v) => write!(f, "{v}"),
            ParamValue::Double(v) => write!(f, "{v:.6}"),
            ParamValue::Buffer(v) => write!(f, "<{} bytes>", v.len()),
            ParamValue::StrArray(v) => write!(f, "[{}]", v.join(", ")),
            ParamValue::IntArray(v) => {
                let items: Vec<String> = v.iter().map(ToString::to_string).collect();
                write!(f, "[{}]", items.join(", "))
            }
            ParamValue::KeyValue(pairs) => {
                let items: Vec<String> = pairs.iter().map(|(k, v)| format!("{k}={v}")).collect();
                write!(f, "{{{}}}", items.join(", "))
            }
            ParamValue::Table(t) => write!(f, "<table {}x{}>", t.rows.len(), t.columns.len()),
        }
    }
}
