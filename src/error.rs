use thiserror::Error;

use crate::parse::ParseError;
use crate::serial::{DeserializeError, SerializeError};
use crate::types::{LoadError, RuleError};

/// Unified error type covering loading, execution, snapshots and I/O.
///
/// Returned by convenience methods like [`RuleBase::from_text()`](crate::RuleBase::from_text)
/// and [`RuleSet::from_file()`](crate::RuleSet::from_file).
#[derive(Debug, Error)]
pub enum RexecError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Rule(#[from] RuleError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Serialize(#[from] SerializeError),

    #[error(transparent)]
    Deserialize(#[from] DeserializeError),
}
