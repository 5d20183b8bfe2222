mod bindings;
mod call;
mod config;
mod context;
mod error;
mod param;
mod rule;
mod ruleset;
mod session;
mod status;
mod value;

pub use bindings::{Binding, VariableBindingTable};
pub use call::ActionCall;
pub use config::{DEFAULT_MAX_DEPTH, InvocationConfig};
pub use context::{ErrorEntry, ExecutionContext, RequestId};
pub use error::{LoadError, RuleError};
pub use param::{ParamArray, Parameter};
pub use rule::{RuleDefinition, RuleSetKind};
pub use ruleset::{Cursor, RuleBase, RuleBaseBuilder, RuleBuilder, RuleSet};
pub use session::SessionRecord;
pub use status::Status;
pub use value::{ParamValue, Table};
