use serde::Deserialize;

/// Default bound on nested rule dispatch and expression evaluation.
pub const DEFAULT_MAX_DEPTH: usize = 64;

/// Behavior switches for one top-level invocation.
///
/// Captured once when the invocation starts and read-only afterwards, so
/// nothing can change them mid-evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct InvocationConfig {
    /// Execute every rule whose guard holds instead of stopping at the first.
    pub try_all: bool,
    /// Emit each dispatched action and recovery at info level.
    pub trace: bool,
    /// Maximum nesting of rule calls and expression evaluation.
    pub max_depth: usize,
}

impl Default for InvocationConfig {
    fn default() -> Self {
        Self {
            try_all: false,
            trace: false,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl InvocationConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn try_all(mut self, on: bool) -> Self {
        self.try_all = on;
        self
    }

    #[must_use]
    pub fn trace(mut self, on: bool) -> Self {
        self.trace = on;
        self
    }

    #[must_use]
    pub fn max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }
}
