//! Rule execution core for a data-management server's policy language.
//!
//! Rules are `head|condition|actions|recoveries|id` records grouped into an
//! application set and a core set. An [`Engine`] matches an invocation
//! against them, binds arguments, evaluates guards, runs `##`-chained action
//! lists and walks the paired recovery list backwards when a step fails.

mod control;
mod engine;
mod error;
mod evaluate;
mod glob;
mod native;
pub mod parse;
pub mod resolve;
pub mod serial;
pub mod submit;
mod types;

pub use engine::{CallContext, Engine, EngineBuilder, MAX_ACTIONS};
pub use error::RexecError;
pub use evaluate::{evaluate, evaluate_with, ActionHost, Evaluation, NoActions};
pub use glob::glob_match;
pub use native::{FunctionMap, NativeCall, NativeEntry, NativeTable};
pub use submit::{DelayQueue, DelayedRequest, LocalPeer, RemoteRequest, Submitter};
pub use types::{
    ActionCall, Binding, Cursor, ErrorEntry, ExecutionContext, InvocationConfig, LoadError,
    ParamArray, ParamValue, Parameter, RequestId, RuleBase, RuleBaseBuilder, RuleBuilder,
    RuleDefinition, RuleError, RuleSet, RuleSetKind, SessionRecord, Status, Table,
    VariableBindingTable, DEFAULT_MAX_DEPTH,
};
