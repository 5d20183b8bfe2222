//! Rule dispatch: matching, binding, guards, bodies and the recovery walk.

use std::fmt;
use std::mem;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::{debug, info, trace, warn};

use crate::control;
use crate::error::RexecError;
use crate::evaluate::{evaluate_with, ActionHost, Evaluation};
use crate::native::{FunctionMap, NativeCall, NativeEntry, NativeTable};
use crate::parse::{call_name, parse_call, split_all};
use crate::resolve;
use crate::submit::{DelayedRequest, Submitter};
use crate::types::{
    ActionCall, Cursor, ExecutionContext, InvocationConfig, ParamArray, ParamValue, Parameter,
    RuleBase, RuleDefinition, RuleError, SessionRecord, Status, VariableBindingTable,
};

/// Upper bound on the number of `##`-separated actions in one body.
pub const MAX_ACTIONS: usize = 256;

/// Parameter name prefix for literal arguments passed to natives.
pub(crate) const TEMP_PREFIX: &str = "*RNDVAR";

/// Parameter carrying a rule's accumulated output between nested calls.
const RULE_EXEC_OUT: &str = "ruleExecOut";

pub(crate) fn is_temp(name: &str) -> bool {
    name.starts_with(TEMP_PREFIX)
}

/// Whether `text` is a `*Name` parameter reference.
fn is_var_ref(text: &str) -> bool {
    text.strip_prefix('*').is_some_and(|name| {
        !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
    })
}

/// A `breakExec` outside any loop ends the invocation as a plain success.
fn settle(result: Result<Status, RuleError>) -> Result<Status, RuleError> {
    match result {
        Ok(Status::Break) => {
            debug!("break outside a loop");
            Ok(Status::Success)
        }
        other => other,
    }
}

/// The rule engine: an immutable rule base and native table shared by every
/// invocation.
///
/// Each invocation runs against its own [`ExecutionContext`], so one engine
/// can serve many threads at once. The rule base can be replaced as a whole
/// with [`swap_rule_base`](Self::swap_rule_base); invocations already running
/// keep the base they started with.
///
/// # Example
///
/// ```
/// use rexec::{Engine, ExecutionContext, ParamValue, RuleBase, SessionRecord};
///
/// let rules = RuleBase::from_text(
///     "acSetQuota(*Out)||assign(*Out, 10 * 1024)|nop|1\n",
///     "",
/// )
/// .unwrap();
/// let engine = Engine::builder().rules(rules).build();
///
/// let mut ctx = ExecutionContext::new(SessionRecord::new());
/// engine.apply_rule(&mut ctx, "acSetQuota(*Quota)").unwrap();
/// assert_eq!(ctx.param("*Quota"), Some(&ParamValue::from("10240")));
/// ```
pub struct Engine {
    rules: RwLock<Arc<RuleBase>>,
    natives: NativeTable,
    bindings: VariableBindingTable,
    aliases: FunctionMap,
    submitter: Option<Arc<dyn Submitter>>,
    config: InvocationConfig,
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("rules", &self.rule_base().len())
            .field("natives", &self.natives.len())
            .field("bindings", &self.bindings.len())
            .field("aliases", &self.aliases.len())
            .field("submitter", &self.submitter.is_some())
            .field("config", &self.config)
            .finish()
    }
}

impl Engine {
    #[must_use]
    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    /// The rule base new invocations will use.
    #[must_use]
    pub fn rule_base(&self) -> Arc<RuleBase> {
        Arc::clone(&self.rules.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Replace the whole rule base, returning the previous one.
    pub fn swap_rule_base(&self, rules: RuleBase) -> Arc<RuleBase> {
        let mut slot = self.rules.write().unwrap_or_else(PoisonError::into_inner);
        debug!(rules = rules.len(), "rule base replaced");
        mem::replace(&mut *slot, Arc::new(rules))
    }

    #[must_use]
    pub fn config(&self) -> InvocationConfig {
        self.config
    }

    #[must_use]
    pub fn natives(&self) -> &NativeTable {
        &self.natives
    }

    #[must_use]
    pub fn bindings(&self) -> &VariableBindingTable {
        &self.bindings
    }

    #[must_use]
    pub fn function_map(&self) -> &FunctionMap {
        &self.aliases
    }

    fn call_context<'a>(&'a self, exec: &'a mut ExecutionContext) -> CallContext<'a> {
        CallContext {
            engine: self,
            rules: self.rule_base(),
            config: self.config,
            exec,
            depth: 0,
        }
    }

    /// Invoke the rule named by the call text `text`, e.g.
    /// `acPostProcForPut(*Path)`. A name with no rule runs as a native.
    ///
    /// # Errors
    ///
    /// [`RuleError::NoMoreRules`] when no candidate's guard holds,
    /// [`RuleError::NoRuleOrFunctionFound`] for an unknown name, otherwise the
    /// failure the matched rule ended with.
    pub fn apply_rule(
        &self,
        ctx: &mut ExecutionContext,
        text: &str,
    ) -> Result<Status, RuleError> {
        settle(self.call_context(ctx).apply_rule(text))
    }

    /// Execute one action: a native call or a nested rule invocation.
    ///
    /// # Errors
    ///
    /// As [`CallContext::execute_action`].
    pub fn execute_action(
        &self,
        ctx: &mut ExecutionContext,
        text: &str,
    ) -> Result<Status, RuleError> {
        settle(self.call_context(ctx).execute_action(text))
    }

    /// Run an ad-hoc body against the current parameters.
    ///
    /// # Errors
    ///
    /// As [`CallContext::exec_my_rule`].
    pub fn exec_my_rule(
        &self,
        ctx: &mut ExecutionContext,
        text: &str,
    ) -> Result<Status, RuleError> {
        settle(self.call_context(ctx).exec_my_rule(text))
    }

    /// Substitute variables in `text`, then evaluate it.
    ///
    /// # Errors
    ///
    /// Resolution and evaluation failures.
    pub fn evaluate(
        &self,
        ctx: &mut ExecutionContext,
        text: &str,
    ) -> Result<Evaluation, RuleError> {
        let mut cx = self.call_context(ctx);
        let resolved = cx.resolve(text)?;
        cx.evaluate(&resolved)
    }

    /// Substitute `$` and `*` variables in `text`.
    ///
    /// # Errors
    ///
    /// [`RuleError::UndefinedVariable`] for an unbound `$` name.
    pub fn resolve(&self, ctx: &mut ExecutionContext, text: &str) -> Result<String, RuleError> {
        self.call_context(ctx).resolve(text)
    }

    /// Run a request taken from a delayed-execution queue in the context it
    /// was submitted from. Returns the final status and context.
    ///
    /// # Errors
    ///
    /// [`RexecError::Deserialize`] if the packed context is damaged, or
    /// [`RexecError::Rule`] if the body fails.
    pub fn run_delayed(
        &self,
        request: &DelayedRequest,
    ) -> Result<(Status, ExecutionContext), RexecError> {
        let mut ctx = request.context()?;
        let body = format!("{}|{}", request.body, request.recovery);
        let status = self.exec_my_rule(&mut ctx, &body)?;
        Ok((status, ctx))
    }
}

/// Builder for [`Engine`]. The control-flow natives (`assign`, `whileExec`,
/// `forEachExec`, ...) and the standard session-variable bindings are
/// registered from the start.
pub struct EngineBuilder {
    rules: RuleBase,
    natives: NativeTable,
    bindings: VariableBindingTable,
    aliases: FunctionMap,
    submitter: Option<Arc<dyn Submitter>>,
    config: InvocationConfig,
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineBuilder {
    #[must_use]
    pub fn new() -> Self {
        let mut natives = NativeTable::new();
        let mut aliases = FunctionMap::new();
        control::register(&mut natives, &mut aliases);
        Self {
            rules: RuleBase::default(),
            natives,
            bindings: VariableBindingTable::standard(),
            aliases,
            submitter: None,
            config: InvocationConfig::default(),
        }
    }

    #[must_use]
    pub fn rules(mut self, rules: RuleBase) -> Self {
        self.rules = rules;
        self
    }

    /// Register a native function taking exactly `arity` arguments.
    #[must_use]
    pub fn native<F>(mut self, name: &str, arity: usize, f: F) -> Self
    where
        F: Fn(&mut [Parameter], &mut CallContext<'_>) -> Result<Status, RuleError>
            + Send
            + Sync
            + 'static,
    {
        self.natives.insert(name, arity, f);
        self
    }

    /// Register a [`NativeCall`] implementation.
    #[must_use]
    pub fn native_call(
        mut self,
        name: &str,
        arity: usize,
        call: impl NativeCall + 'static,
    ) -> Self {
        self.natives.insert(name, arity, call);
        self
    }

    /// Replace the session-variable bindings.
    #[must_use]
    pub fn bindings(mut self, bindings: VariableBindingTable) -> Self {
        self.bindings = bindings;
        self
    }

    /// Add external-name aliases. Entries override the built-in ones.
    #[must_use]
    pub fn function_map(mut self, map: FunctionMap) -> Self {
        self.aliases.extend(map);
        self
    }

    #[must_use]
    pub fn alias(mut self, external: &str, internal: &str) -> Self {
        self.aliases.insert(external, internal);
        self
    }

    #[must_use]
    pub fn submitter(mut self, submitter: Arc<dyn Submitter>) -> Self {
        self.submitter = Some(submitter);
        self
    }

    #[must_use]
    pub fn config(mut self, config: InvocationConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn build(self) -> Engine {
        Engine {
            rules: RwLock::new(Arc::new(self.rules)),
            natives: self.natives,
            bindings: self.bindings,
            aliases: self.aliases,
            submitter: self.submitter,
            config: self.config,
        }
    }
}

/// A guard-true candidate either ran its body or was passed over.
enum Attempt {
    GuardFalse,
    Ran(Result<Status, RuleError>),
}

/// One invocation in progress: the engine, the rule base and configuration
/// captured at entry, and the execution context being threaded through.
///
/// Natives receive it to read and write parameters and the session, and to
/// run nested actions and bodies.
pub struct CallContext<'a> {
    engine: &'a Engine,
    rules: Arc<RuleBase>,
    config: InvocationConfig,
    exec: &'a mut ExecutionContext,
    depth: usize,
}

impl<'a> CallContext<'a> {
    #[must_use]
    pub fn engine(&self) -> &'a Engine {
        self.engine
    }

    #[must_use]
    pub fn config(&self) -> InvocationConfig {
        self.config
    }

    /// Nesting depth of rule invocations.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.depth
    }

    #[must_use]
    pub fn exec(&self) -> &ExecutionContext {
        self.exec
    }

    pub fn exec_mut(&mut self) -> &mut ExecutionContext {
        self.exec
    }

    #[must_use]
    pub fn params(&self) -> &ParamArray {
        &self.exec.params
    }

    pub fn params_mut(&mut self) -> &mut ParamArray {
        &mut self.exec.params
    }

    #[must_use]
    pub fn session(&self) -> &SessionRecord {
        &self.exec.session
    }

    pub fn session_mut(&mut self) -> &mut SessionRecord {
        &mut self.exec.session
    }

    /// The configured submission collaborator.
    ///
    /// # Errors
    ///
    /// [`RuleError::Submission`] if the engine was built without one.
    pub fn submitter(&self) -> Result<&'a dyn Submitter, RuleError> {
        self.engine
            .submitter
            .as_deref()
            .ok_or_else(|| RuleError::Submission {
                message: "no submitter configured".to_owned(),
            })
    }

    /// Substitute `$` and `*` variables in `text`, scoping `$` names to the
    /// current rule.
    ///
    /// # Errors
    ///
    /// [`RuleError::UndefinedVariable`] for an unbound `$` name.
    pub fn resolve(&self, text: &str) -> Result<String, RuleError> {
        let with_session = resolve::resolve_session_vars(
            text,
            &self.exec.rule_name,
            &self.engine.bindings,
            &self.exec.session,
        )?;
        Ok(resolve::resolve_param_vars(&with_session, &self.exec.params))
    }

    /// Evaluate already-substituted text. Call operands naming natives run
    /// through this context.
    ///
    /// # Errors
    ///
    /// See [`evaluate_with`].
    pub fn evaluate(&mut self, text: &str) -> Result<Evaluation, RuleError> {
        evaluate_with(text, self)
    }

    /// Substitute and evaluate `text` as a condition.
    ///
    /// # Errors
    ///
    /// Resolution and evaluation failures.
    pub fn condition(&mut self, text: &str) -> Result<bool, RuleError> {
        let resolved = self.resolve(text)?;
        Ok(self.evaluate(&resolved)?.is_true())
    }

    /// Write a `$` session variable through its binding.
    ///
    /// # Errors
    ///
    /// As [`resolve::set_session_var`].
    pub fn set_session_var(&mut self, name: &str, value: &str) -> Result<(), RuleError> {
        resolve::set_session_var(
            name,
            &self.exec.rule_name,
            value,
            &self.engine.bindings,
            &mut self.exec.session,
        )
    }

    fn note(&self, what: &str, text: &str) {
        if self.config.trace {
            info!(rule = %self.exec.rule_name, depth = self.depth, "{what}: {text}");
        } else {
            debug!(rule = %self.exec.rule_name, depth = self.depth, "{what}: {text}");
        }
    }

    fn record(&mut self, name: &str, result: &Result<Status, RuleError>) {
        match result {
            Ok(_) => self.exec.status = 0,
            Err(err) => {
                self.exec.status = err.code();
                if !err.is_retry() {
                    self.exec.push_error(err, name);
                }
            }
        }
    }

    fn aliased(&self, call: ActionCall) -> ActionCall {
        let name = self.engine.aliases.resolve(&call.name).to_owned();
        ActionCall::new(name, call.args)
    }

    fn native(&self, name: &str) -> Option<&'a NativeEntry> {
        let engine: &'a Engine = self.engine;
        engine.natives.get(engine.aliases.resolve(name))
    }

    /// Top-level entry: a rule if one exists, else a native.
    pub(crate) fn apply_rule(&mut self, text: &str) -> Result<Status, RuleError> {
        let name = call_name(text).to_owned();
        let result = self.dispatch_rule_first(text);
        self.record(&name, &result);
        result
    }

    fn dispatch_rule_first(&mut self, text: &str) -> Result<Status, RuleError> {
        let text = self.prepare(text)?;
        let call = self.aliased(parse_call(&text)?);
        if self.rules.contains(&call.name) {
            return self.apply_call(&call);
        }
        match self.native(&call.name) {
            Some(native) => self.call_native(&call, native),
            None => Err(RuleError::NoRuleOrFunctionFound { name: call.name }),
        }
    }

    /// Execute one action: natives first, then rules.
    ///
    /// The context status is set from the outcome and a failure is pushed on
    /// the error stack.
    ///
    /// # Errors
    ///
    /// [`RuleError::NoRuleOrFunctionFound`] if `text` names neither a native
    /// nor a rule, [`RuleError::ActionFailed`] if no rule's guard holds,
    /// otherwise the native's or rule's own failure.
    pub fn execute_action(&mut self, text: &str) -> Result<Status, RuleError> {
        let name = call_name(text).to_owned();
        let result = self
            .prepare(text)
            .and_then(|prepared| self.dispatch(&prepared));
        self.record(&name, &result);
        result
    }

    /// As [`execute_action`](Self::execute_action) for text whose `$`
    /// variables are already substituted.
    fn execute_prepared(&mut self, text: &str) -> Result<Status, RuleError> {
        let name = call_name(text).to_owned();
        let result = self.dispatch(text);
        self.record(&name, &result);
        result
    }

    fn dispatch(&mut self, text: &str) -> Result<Status, RuleError> {
        let call = self.aliased(parse_call(text)?);
        self.note("action", text);
        if let Some(native) = self.native(&call.name) {
            return self.call_native(&call, native);
        }
        match self.apply_call(&call) {
            Err(RuleError::NoRuleFound { name }) => Err(RuleError::NoRuleOrFunctionFound { name }),
            Err(RuleError::NoMoreRules { name }) => Err(RuleError::ActionFailed { name }),
            other => other,
        }
    }

    /// Substitute `$` variables in a step, unless it calls a native that
    /// takes its arguments unresolved. `*` references are left to argument
    /// binding so that out-parameters stay references.
    fn prepare(&self, step: &str) -> Result<String, RuleError> {
        if self.native(call_name(step)).is_some_and(NativeEntry::raw_args) {
            return Ok(step.to_owned());
        }
        let action = if self.exec.rule_name.is_empty() {
            call_name(step)
        } else {
            &self.exec.rule_name
        };
        resolve::resolve_session_vars(step, action, &self.engine.bindings, &self.exec.session)
    }

    /// Re-substitute a stored string value. Text that does not resolve is
    /// passed on unchanged.
    fn restore(&self, value: &str) -> String {
        self.resolve(value).unwrap_or_else(|err| {
            trace!(value, error = %err, "stored value kept as is");
            value.to_owned()
        })
    }

    fn call_native(
        &mut self,
        call: &ActionCall,
        native: &NativeEntry,
    ) -> Result<Status, RuleError> {
        if call.argc() != native.arity() {
            return Err(RuleError::ArgCountMismatch {
                name: call.name.clone(),
                expected: native.arity(),
                actual: call.argc(),
            });
        }

        let mut args = Vec::with_capacity(call.argc());
        for (i, arg) in call.args.iter().enumerate() {
            let param = if let Some(existing) = self.exec.params.get(arg) {
                let mut param = existing.clone();
                if !native.raw_args() {
                    if let ParamValue::Str(s) = &param.value {
                        param.value = ParamValue::Str(self.restore(s));
                    }
                }
                param
            } else if is_var_ref(arg) {
                Parameter::unset(arg.as_str())
            } else {
                let value = if native.raw_args() {
                    arg.clone()
                } else {
                    resolve::resolve_param_vars(arg, &self.exec.params)
                };
                Parameter::new(format!("{TEMP_PREFIX}{i}"), value)
            };
            args.push(param);
        }
        let passed: Vec<ParamValue> = args.iter().map(|p| p.value.clone()).collect();

        let result = native.call(&mut args, self);

        for (param, before) in args.into_iter().zip(passed) {
            if !is_temp(&param.name) && param.value != before {
                trace!(name = %param.name, "native wrote parameter");
                self.exec.params.insert(param);
            }
        }
        result
    }

    fn enter(&mut self) -> Result<(), RuleError> {
        if self.depth >= self.config.max_depth {
            return Err(RuleError::DepthExceeded {
                limit: self.config.max_depth,
            });
        }
        self.depth += 1;
        Ok(())
    }

    fn apply_call(&mut self, call: &ActionCall) -> Result<Status, RuleError> {
        self.enter()?;
        let result = self.apply_candidates(call);
        self.depth -= 1;
        result
    }

    fn apply_candidates(&mut self, call: &ActionCall) -> Result<Status, RuleError> {
        let rules = Arc::clone(&self.rules);
        if !rules.contains(&call.name) {
            return Err(RuleError::NoRuleFound {
                name: call.name.clone(),
            });
        }

        let mut cursor = Cursor::Start;
        let mut snapshot: Option<SessionRecord> = None;
        let mut retry = false;
        let mut any_success = false;
        let mut any_bound = false;
        let mut arity_error = None;

        loop {
            let (rule, next) = match rules.find_next(&call.name, cursor) {
                Ok(found) => found,
                Err(RuleError::NoMoreRules { .. }) => break,
                Err(err) => return Err(err),
            };
            cursor = next;

            let callee = match self.bind_head(rule, call) {
                Ok(callee) => callee,
                Err(err) => {
                    trace!(rule = %rule.name, id = rule.id, error = %err, "arity differs");
                    arity_error.get_or_insert(err);
                    continue;
                }
            };
            any_bound = true;
            let outer_rule = mem::replace(&mut self.exec.rule_name, rule.name.clone());
            let (attempt, callee) = self.with_params(callee, |cx| {
                cx.run_candidate(rule, &call.name, &mut snapshot, &mut retry)
            });
            self.exec.rule_name = outer_rule;

            let result = match attempt? {
                Attempt::GuardFalse => continue,
                Attempt::Ran(result) => result,
            };
            if result.is_ok() {
                self.copy_out(rule, call, &callee);
            }
            debug!(rule = %rule.name, id = rule.id, ok = result.is_ok(), "candidate ran");

            match result {
                Ok(Status::Break) => return Ok(Status::Break),
                Ok(Status::CutOnSuccess) => return Ok(Status::Success),
                Ok(Status::Success) if !self.config.try_all => return Ok(Status::Success),
                Ok(Status::Success) => any_success = true,
                Err(err) if err.is_retry() => retry = true,
                Err(err @ RuleError::CutProcessed { .. }) => return Err(err),
                Err(err) if !self.config.try_all => return Err(err),
                Err(err) => {
                    debug!(rule = %rule.name, error = %err, "candidate failed, trying next");
                }
            }
        }

        match arity_error {
            _ if any_success => Ok(Status::Success),
            Some(err) if !any_bound => Err(err),
            _ => Err(RuleError::NoMoreRules {
                name: call.name.clone(),
            }),
        }
    }

    /// Run `f` with `params` as the active array, restoring the caller's
    /// array afterwards. Returns `f`'s result and the array it left behind.
    fn with_params<T>(
        &mut self,
        params: ParamArray,
        f: impl FnOnce(&mut Self) -> T,
    ) -> (T, ParamArray) {
        let caller = mem::replace(&mut self.exec.params, params);
        let out = f(self);
        let callee = mem::replace(&mut self.exec.params, caller);
        (out, callee)
    }

    fn run_candidate(
        &mut self,
        rule: &RuleDefinition,
        action: &str,
        snapshot: &mut Option<SessionRecord>,
        retry: &mut bool,
    ) -> Result<Attempt, RuleError> {
        if !self.guard_holds(&rule.condition, action)? {
            trace!(rule = %rule.name, id = rule.id, "guard false");
            return Ok(Attempt::GuardFalse);
        }

        if let Some(saved) = snapshot.as_ref() {
            if !*retry {
                self.exec.session = saved.clone();
            }
        } else {
            *snapshot = Some(self.exec.session.clone());
        }
        *retry = false;

        self.note("rule", &rule.head());
        Ok(Attempt::Ran(
            self.execute_body(&rule.actions, &rule.recoveries),
        ))
    }

    /// An empty guard holds. A guard whose variables cannot be substituted
    /// does not.
    fn guard_holds(&mut self, condition: &str, action: &str) -> Result<bool, RuleError> {
        if condition.trim().is_empty() {
            return Ok(true);
        }
        let resolved = match resolve::bind_and_resolve(
            condition,
            action,
            &self.engine.bindings,
            &self.exec.session,
            &self.exec.params,
        ) {
            Ok(resolved) => resolved,
            Err(err) => {
                debug!(condition, error = %err, "guard not resolvable");
                return Ok(false);
            }
        };
        Ok(self.evaluate(&resolved)?.is_true())
    }

    /// Build the callee's parameter array from the caller's arguments. An
    /// argument count that differs from the head's is an error.
    fn bind_head(&self, rule: &RuleDefinition, call: &ActionCall) -> Result<ParamArray, RuleError> {
        let expected = rule.formals.len();
        if call.argc() < expected {
            return Err(RuleError::InsufficientInput {
                rule: rule.name.clone(),
                expected,
                actual: call.argc(),
            });
        }
        if call.argc() > expected {
            return Err(RuleError::ArgCountMismatch {
                name: rule.name.clone(),
                expected,
                actual: call.argc(),
            });
        }

        let mut callee = ParamArray::new();
        for (formal, arg) in rule.formals.iter().zip(&call.args) {
            let value = match self.exec.params.value(arg) {
                Some(ParamValue::Str(s)) => ParamValue::Str(self.restore(s)),
                Some(other) => other.clone(),
                None if is_var_ref(arg) => ParamValue::Null,
                None => ParamValue::Str(resolve::resolve_param_vars(arg, &self.exec.params)),
            };
            callee.set(formal, value);
        }
        if let Some(out) = self.exec.params.get(RULE_EXEC_OUT) {
            callee.insert(out.clone());
        }
        Ok(callee)
    }

    /// Copy the callee's values for formals bound to caller `*` arguments
    /// back into the caller's array.
    fn copy_out(&mut self, rule: &RuleDefinition, call: &ActionCall, callee: &ParamArray) {
        for (formal, arg) in rule.formals.iter().zip(&call.args) {
            if !is_var_ref(arg) {
                continue;
            }
            if let Some(value) = callee.value(formal).filter(|v| !v.is_null()) {
                self.exec.params.set(arg, value.clone());
            }
        }
        if let Some(out) = callee.get(RULE_EXEC_OUT) {
            self.exec.params.insert(out.clone());
        }
    }

    /// Run an action list with its paired recovery list.
    ///
    /// # Errors
    ///
    /// The first failing step's error after the recovery walk, wrapped in
    /// [`RuleError::CutProcessed`] when the body executed `cut`.
    pub fn execute_body(&mut self, actions: &str, recoveries: &str) -> Result<Status, RuleError> {
        let actions = split_all(actions)?;
        let recoveries = split_all(recoveries)?;
        if actions.len() > MAX_ACTIONS {
            return Err(RuleError::TooManyActions {
                count: actions.len(),
                limit: MAX_ACTIONS,
            });
        }

        let mut cut = false;
        for (i, step) in actions.iter().enumerate() {
            let outcome = match step.as_str() {
                "cut" => {
                    cut = true;
                    continue;
                }
                "nop" | "null" | "succeed" => continue,
                "fail" => Err(RuleError::FailAction),
                _ => self.run_step(step),
            };
            match outcome {
                Ok(Status::Break) => return Ok(Status::Break),
                Ok(_) => {}
                Err(err) if err.is_retry() => return Err(err),
                Err(err) => return self.recover(&recoveries, i, err, cut),
            }
        }
        Ok(if cut {
            Status::CutOnSuccess
        } else {
            Status::Success
        })
    }

    fn run_step(&mut self, step: &str) -> Result<Status, RuleError> {
        self.execute_action(step)
    }

    /// Walk the recoveries paired with steps `failed_at..=0`, newest first.
    fn recover(
        &mut self,
        recoveries: &[String],
        failed_at: usize,
        failure: RuleError,
        cut: bool,
    ) -> Result<Status, RuleError> {
        debug!(rule = %self.exec.rule_name, step = failed_at, error = %failure, "recovering");
        for step in recoveries.iter().take(failed_at + 1).rev() {
            if matches!(step.as_str(), "" | "nop" | "null") {
                continue;
            }
            self.note("recovery", step);
            if let Err(err) = self.run_step(step) {
                warn!(recovery = %step, error = %err, "recovery failed");
                return Err(if cut { RuleError::cut(err) } else { err });
            }
        }
        Err(if cut { RuleError::cut(failure) } else { failure })
    }

    /// Run an ad-hoc body in the current parameter array.
    ///
    /// `text` is a plain call, `actions|recoveries`, `condition|actions|recoveries`
    /// or `head|condition|actions|recoveries`; the head is ignored.
    ///
    /// # Errors
    ///
    /// [`RuleError::RuleFailed`] if the condition is false, otherwise as
    /// [`execute_body`](Self::execute_body).
    pub fn exec_my_rule(&mut self, text: &str) -> Result<Status, RuleError> {
        let text = text.trim();
        if !text.contains('|') && !text.contains("##") {
            return self.run_step(text);
        }
        let parts: Vec<&str> = text.split('|').collect();
        let (condition, actions, recoveries) = match parts.as_slice() {
            [actions] => ("", *actions, ""),
            [actions, recoveries] => ("", *actions, *recoveries),
            [condition, actions, recoveries] => (*condition, *actions, *recoveries),
            [_, condition, actions, recoveries, ..] => (*condition, *actions, *recoveries),
            [] => return Ok(Status::Success),
        };

        if !condition.trim().is_empty() && !self.condition(condition)? {
            return Err(RuleError::RuleFailed {
                condition: condition.trim().to_owned(),
            });
        }
        let result = self.execute_body(actions, recoveries);
        if result.is_ok() {
            self.exec.status = 0;
        }
        result
    }
}

impl ActionHost for CallContext<'_> {
    fn is_native(&self, name: &str) -> bool {
        self.native(name).is_some()
    }

    fn run_action(&mut self, text: &str) -> Result<Status, RuleError> {
        self.execute_prepared(text)
    }

    fn max_depth(&self) -> usize {
        self.config.max_depth
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use super::*;
    use crate::types::RuleBaseBuilder;

    fn ctx() -> ExecutionContext {
        ExecutionContext::new(
            SessionRecord::new()
                .set("client.user", "rods")
                .set("data.path", "/tempZone/home/rods/a.txt"),
        )
    }

    /// Engine whose `msiLog(*Msg)` appends to a shared log, `msiFail(*X)`
    /// always fails and `msiSet(*Out, *V)` writes its second argument to its first.
    fn engine(rules: RuleBase) -> (Engine, Arc<Mutex<Vec<String>>>) {
        engine_with(rules, InvocationConfig::default())
    }

    fn engine_with(rules: RuleBase, config: InvocationConfig) -> (Engine, Arc<Mutex<Vec<String>>>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&log);
        let engine = Engine::builder()
            .rules(rules)
            .native("msiLog", 1, move |args, _cx| {
                let text = args[0].value.render().unwrap_or_default();
                sink.lock().unwrap().push(text);
                Ok(Status::Success)
            })
            .native("msiFail", 1, |_args, _cx| Err(RuleError::native(-818_000, "failed")))
            .native("msiSet", 2, |args, _cx| {
                args[0].value = args[1].value.clone();
                Ok(Status::Success)
            })
            .config(config)
            .build();
        (engine, log)
    }

    fn logged(log: &Arc<Mutex<Vec<String>>>) -> Vec<String> {
        log.lock().unwrap().clone()
    }

    #[test]
    fn application_rules_tried_before_core() {
        let rules = RuleBaseBuilder::new()
            .rule("acTest", |r| r.when("1 == 0").then("msiLog(app-skipped)"))
            .rule("acTest", |r| r.then("msiLog(app)"))
            .core_rule("acTest", |r| r.then("msiLog(core)"))
            .build()
            .unwrap();
        let (engine, log) = engine(rules);
        let mut ctx = ctx();
        assert_eq!(engine.apply_rule(&mut ctx, "acTest").unwrap(), Status::Success);
        assert_eq!(logged(&log), vec!["app"]);
    }

    #[test]
    fn no_true_guard_is_no_more_rules() {
        let rules = RuleBaseBuilder::new()
            .rule("acTest", |r| r.when("1 == 0").then("msiLog(x)"))
            .build()
            .unwrap();
        let (engine, _) = engine(rules);
        let mut ctx = ctx();
        assert!(matches!(
            engine.apply_rule(&mut ctx, "acTest"),
            Err(RuleError::NoMoreRules { .. })
        ));
        assert!(matches!(
            engine.execute_action(&mut ctx, "acTest"),
            Err(RuleError::ActionFailed { .. })
        ));
    }

    #[test]
    fn unknown_name() {
        let (engine, _) = engine(RuleBase::default());
        let mut ctx = ctx();
        let err = engine.execute_action(&mut ctx, "acMissing(1)").unwrap_err();
        assert!(matches!(err, RuleError::NoRuleOrFunctionFound { .. }));
        assert_eq!(ctx.status(), -1_097_000);
        assert_eq!(ctx.errors().len(), 1);
    }

    #[test]
    fn native_arity_checked() {
        let (engine, _) = engine(RuleBase::default());
        let mut ctx = ctx();
        assert_eq!(
            engine.execute_action(&mut ctx, "msiLog(a, b)"),
            Err(RuleError::ArgCountMismatch {
                name: "msiLog".into(),
                expected: 1,
                actual: 2
            })
        );
    }

    #[test]
    fn native_writes_back_star_arguments() {
        let (engine, _) = engine(RuleBase::default());
        let mut ctx = ctx();
        engine.execute_action(&mut ctx, "msiSet(*Out, hello)").unwrap();
        assert_eq!(ctx.param("*Out"), Some(&ParamValue::from("hello")));
        assert!(ctx.params().iter().all(|p| !is_temp(&p.name)));
    }

    #[test]
    fn literal_arguments_are_resolved() {
        let (engine, log) = engine(RuleBase::default());
        let mut ctx = ctx().with_params(ParamArray::new().with("*Coll", "/tempZone"));
        engine.execute_action(&mut ctx, "msiLog(*Coll/home)").unwrap();
        engine.execute_action(&mut ctx, "msiLog($userNameClient)").unwrap();
        assert!(matches!(
            engine.execute_action(&mut ctx, "msiLog($noSuchVar)"),
            Err(RuleError::UndefinedVariable { .. })
        ));
        assert_eq!(logged(&log), vec!["/tempZone/home", "rods"]);
    }

    #[test]
    fn session_vars_resolved_in_steps() {
        let rules = RuleBaseBuilder::new()
            .rule("acTest", |r| r.then("msiLog($userNameClient)"))
            .build()
            .unwrap();
        let (engine, log) = engine(rules);
        engine.apply_rule(&mut ctx(), "acTest").unwrap();
        assert_eq!(logged(&log), vec!["rods"]);
    }

    #[test]
    fn recovery_walks_backwards() {
        let rules = RuleBaseBuilder::new()
            .rule("acTest", |r| {
                r.then("msiLog(a) ## msiLog(b) ## msiFail(c)")
                    .recover("msiLog(rA) ## msiLog(rB) ## msiLog(rC)")
            })
            .build()
            .unwrap();
        let (engine, log) = engine(rules);
        let err = engine.apply_rule(&mut ctx(), "acTest").unwrap_err();
        assert_eq!(err.code(), -818_000);
        assert_eq!(logged(&log), vec!["a", "b", "rC", "rB", "rA"]);
    }

    #[test]
    fn failing_recovery_stops_walk() {
        let rules = RuleBaseBuilder::new()
            .rule("acTest", |r| {
                r.then("msiLog(a) ## msiLog(b) ## fail")
                    .recover("msiLog(rA) ## msiFail(rB) ## nop")
            })
            .build()
            .unwrap();
        let (engine, log) = engine(rules);
        let err = engine.apply_rule(&mut ctx(), "acTest").unwrap_err();
        assert_eq!(err.code(), -818_000);
        assert_eq!(logged(&log), vec!["a", "b"]);
    }

    #[test]
    fn cut_wraps_failure() {
        let rules = RuleBaseBuilder::new()
            .rule("acTest", |r| r.then("cut ## msiFail(x)").recover("nop ## msiLog(r)"))
            .rule("acTest", |r| r.then("msiLog(second)"))
            .build()
            .unwrap();
        let (engine, log) = engine(rules);
        let err = engine.apply_rule(&mut ctx(), "acTest").unwrap_err();
        assert_eq!(err.code(), -1_089_000);
        assert_eq!(logged(&log), vec!["r"]);
    }

    #[test]
    fn parameters_restored_after_failure() {
        let rules = RuleBaseBuilder::new()
            .rule("acInner(*X)", |r| r.then("msiSet(*Tmp, 1) ## msiFail(*X)"))
            .build()
            .unwrap();
        let (engine, _) = engine(rules);
        let mut ctx = ctx().with_params(ParamArray::new().with("*A", "keep"));
        engine.apply_rule(&mut ctx, "acInner(*A)").unwrap_err();
        assert_eq!(ctx.params().len(), 1);
        assert_eq!(ctx.param("*A"), Some(&ParamValue::from("keep")));
        assert_eq!(ctx.rule_name(), "");
    }

    #[test]
    fn out_parameters_copied_back() {
        let rules = RuleBaseBuilder::new()
            .rule("acGet(*In, *Out)", |r| r.then("msiSet(*Out, *In)"))
            .build()
            .unwrap();
        let (engine, _) = engine(rules);
        let mut ctx = ctx().with_params(ParamArray::new().with("*Src", "value"));
        engine.apply_rule(&mut ctx, "acGet(*Src, *Dest)").unwrap();
        assert_eq!(ctx.param("*Dest"), Some(&ParamValue::from("value")));
    }

    #[test]
    fn head_arity() {
        let rules = RuleBaseBuilder::new()
            .rule("acTwo(*A, *B)", |r| r.then("nop"))
            .build()
            .unwrap();
        let (engine, _) = engine(rules);
        assert!(matches!(
            engine.apply_rule(&mut ctx(), "acTwo(1)"),
            Err(RuleError::InsufficientInput { .. })
        ));
        assert!(matches!(
            engine.apply_rule(&mut ctx(), "acTwo(1, 2, 3)"),
            Err(RuleError::ArgCountMismatch { .. })
        ));
    }

    #[test]
    fn try_all_runs_every_candidate() {
        let rules = RuleBaseBuilder::new()
            .rule("acTest", |r| r.then("msiFail(x)"))
            .rule("acTest", |r| r.then("msiLog(second)"))
            .rule("acTest", |r| r.then("msiLog(third)"))
            .build()
            .unwrap();
        let (first_match, _) = engine(rules.clone());
        assert!(first_match.apply_rule(&mut ctx(), "acTest").is_err());

        let (try_all, log) = engine_with(rules, InvocationConfig::new().try_all(true));
        assert_eq!(try_all.apply_rule(&mut ctx(), "acTest").unwrap(), Status::Success);
        assert_eq!(logged(&log), vec!["second", "third"]);
    }

    #[test]
    fn retry_continues_scan() {
        let rules = RuleBaseBuilder::new()
            .rule("acTest", |r| r.then("msiRetry"))
            .rule("acTest", |r| r.then("msiLog(second)"))
            .build()
            .unwrap();
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&log);
        let engine = Engine::builder()
            .rules(rules)
            .native("msiRetry", 0, |_, _| Err(RuleError::RetryWithoutRecovery))
            .native("msiLog", 1, move |args, _| {
                sink.lock().unwrap().push(args[0].value.render().unwrap_or_default());
                Ok(Status::Success)
            })
            .build();
        assert_eq!(engine.apply_rule(&mut ctx(), "acTest").unwrap(), Status::Success);
        assert_eq!(logged(&log), vec!["second"]);
    }

    #[test]
    fn session_restored_between_candidates() {
        let rules = RuleBaseBuilder::new()
            .rule("acTest", |r| r.then("msiTouch ## msiFail(x)"))
            .rule("acTest", |r| r.then("msiCheck"))
            .build()
            .unwrap();
        let engine = Engine::builder()
            .rules(rules)
            .native("msiTouch", 0, |_, cx| {
                cx.session_mut().insert("data.comments", ParamValue::from("touched"));
                Ok(Status::Success)
            })
            .native("msiFail", 1, |_, _| Err(RuleError::FailAction))
            .native("msiCheck", 0, |_, cx| {
                match cx.session().get("data.comments") {
                    None => Ok(Status::Success),
                    Some(_) => Err(RuleError::native(-1, "session leaked")),
                }
            })
            .config(InvocationConfig::new().try_all(true))
            .build();
        assert_eq!(engine.apply_rule(&mut ctx(), "acTest").unwrap(), Status::Success);
    }

    #[test]
    fn depth_bound() {
        let rules = RuleBaseBuilder::new()
            .rule("acLoop", |r| r.then("acLoop"))
            .build()
            .unwrap();
        let engine = Engine::builder()
            .rules(rules)
            .config(InvocationConfig::new().max_depth(8))
            .build();
        let err = engine.apply_rule(&mut ctx(), "acLoop").unwrap_err();
        assert!(matches!(err, RuleError::DepthExceeded { limit: 8 }));
    }

    #[test]
    fn guard_calls_native() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let rules = RuleBaseBuilder::new()
            .rule("acTest", |r| r.when("msiAllowed() == 1").then("nop"))
            .build()
            .unwrap();
        let engine = Engine::builder()
            .rules(rules)
            .native("msiAllowed", 0, move |_, _| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(Status::Success)
            })
            .build();
        engine.apply_rule(&mut ctx(), "acTest").unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unresolvable_guard_is_false() {
        let rules = RuleBaseBuilder::new()
            .rule("acTest", |r| r.when("$NO_SUCH_VAR == 1").then("msiLog(first)"))
            .rule("acTest", |r| r.then("msiLog(second)"))
            .build()
            .unwrap();
        let (engine, log) = engine(rules);
        engine.apply_rule(&mut ctx(), "acTest").unwrap();
        assert_eq!(logged(&log), vec!["second"]);
    }

    #[test]
    fn exec_my_rule_forms() {
        let (engine, log) = engine(RuleBase::default());
        let mut ctx = ctx();
        engine.exec_my_rule(&mut ctx, "msiLog(plain)").unwrap();
        engine.exec_my_rule(&mut ctx, "msiLog(a) ## msiLog(b)|nop ## nop").unwrap();
        engine.exec_my_rule(&mut ctx, "1 == 1|msiLog(guarded)|nop").unwrap();
        assert_eq!(
            engine.exec_my_rule(&mut ctx, "1 == 2|msiLog(never)|nop"),
            Err(RuleError::RuleFailed {
                condition: "1 == 2".into()
            })
        );
        engine.exec_my_rule(&mut ctx, "myRule|1 < 2|msiLog(headed)|nop").unwrap();
        assert_eq!(logged(&log), vec!["plain", "a", "b", "guarded", "headed"]);
    }

    #[test]
    fn too_many_actions() {
        let (engine, _) = engine(RuleBase::default());
        let body = vec!["nop"; MAX_ACTIONS + 1].join(" ## ");
        assert!(matches!(
            engine.exec_my_rule(&mut ctx(), &format!("{body}|")),
            Err(RuleError::TooManyActions { .. })
        ));
    }

    #[test]
    fn swap_rule_base_affects_new_invocations() {
        let old = RuleBase::from_text("acTest||msiLog(old)|nop|1\n", "").unwrap();
        let (engine, log) = engine(old);
        engine.apply_rule(&mut ctx(), "acTest").unwrap();
        let new = RuleBase::from_text("acTest||msiLog(new)|nop|1\n", "").unwrap();
        let previous = engine.swap_rule_base(new);
        assert_eq!(previous.len(), 1);
        engine.apply_rule(&mut ctx(), "acTest").unwrap();
        assert_eq!(logged(&log), vec!["old", "new"]);
    }

    #[test]
    fn var_ref_shape() {
        assert!(is_var_ref("*Out"));
        assert!(is_var_ref("*a_1"));
        assert!(!is_var_ref("*"));
        assert!(!is_var_ref("*A.txt"));
        assert!(!is_var_ref("Out"));
    }
}
