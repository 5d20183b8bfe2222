/// A rule record read from persisted rule text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedRule {
    pub name: String,
    pub formals: Vec<String>,
    pub condition: String,
    pub actions: String,
    pub recoveries: String,
    pub id: Option<i64>,
}

/// A session-variable record read from variable-map text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedBinding {
    pub name: String,
    pub scope: Vec<String>,
    pub path: String,
    pub id: Option<i64>,
}

/// A function-name mapping read from function-map text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedAlias {
    pub external: String,
    pub internal: String,
    pub id: Option<i64>,
}
