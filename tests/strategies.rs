#![allow(dead_code)]

use proptest::prelude::*;
use rexec::{ExecutionContext, RuleBase, RuleBaseBuilder, SessionRecord};

// --- Fixed session schema ---
// client.user : string, one of USERS
// data.size   : i64 (0..=10_000)
// data.path   : string, under one of ZONES

const USERS: &[&str] = &["rods", "alice", "bob"];
const ZONES: &[&str] = &["/tempZone/home", "/tempZone/trash", "/archive"];
const ARG_OPERATORS: &[&str] = &["==", "<", "+", "like"];

/// Generate a context that aligns with the fixed session schema.
pub fn arb_context() -> impl Strategy<Value = ExecutionContext> {
    (
        prop::sample::select(USERS),
        0_i64..=10_000,
        prop::sample::select(ZONES),
        "[a-z]{1,8}\\.(txt|csv)",
    )
        .prop_map(|(user, size, zone, file)| {
            ExecutionContext::new(
                SessionRecord::new()
                    .set("client.user", user)
                    .set("data.size", size)
                    .set("data.path", format!("{zone}/{file}")),
            )
        })
}

/// A guard over the schema, paired with a predicate saying when it holds.
#[derive(Debug, Clone)]
pub enum GenGuard {
    Always,
    SizeAbove(i64),
    UserIs(&'static str),
    UnderZone(&'static str),
}

impl GenGuard {
    pub fn text(&self) -> String {
        match self {
            GenGuard::Always => String::new(),
            GenGuard::SizeAbove(n) => format!("$dataSize > {n}"),
            GenGuard::UserIs(user) => format!("$userNameClient == {user}"),
            GenGuard::UnderZone(zone) => format!("$objPath like {zone}/*"),
        }
    }

    pub fn holds(&self, ctx: &ExecutionContext) -> bool {
        let session = ctx.session();
        match self {
            GenGuard::Always => true,
            GenGuard::SizeAbove(n) => {
                matches!(session.get("data.size"), Some(rexec::ParamValue::Int(size)) if size > n)
            }
            GenGuard::UserIs(user) => session
                .get("client.user")
                .and_then(rexec::ParamValue::as_str)
                .is_some_and(|u| u == *user),
            GenGuard::UnderZone(zone) => session
                .get("data.path")
                .and_then(rexec::ParamValue::as_str)
                .is_some_and(|p| p.starts_with(&format!("{zone}/"))),
        }
    }
}

fn arb_guard() -> impl Strategy<Value = GenGuard> {
    prop_oneof![
        1 => Just(GenGuard::Always),
        3 => (0_i64..=10_000).prop_map(GenGuard::SizeAbove),
        2 => prop::sample::select(USERS).prop_map(GenGuard::UserIs),
        2 => prop::sample::select(ZONES).prop_map(GenGuard::UnderZone),
    ]
}

/// A generated candidate rule for `acPick`. Its body marks `tag` and then
/// fails when `fails` is set.
#[derive(Debug, Clone)]
pub struct GenRule {
    pub guard: GenGuard,
    pub tag: String,
    pub fails: bool,
}

/// Application and core candidates for the single action `acPick`.
#[derive(Debug, Clone)]
pub struct GenRuleBase {
    pub application: Vec<GenRule>,
    pub core: Vec<GenRule>,
}

impl GenRuleBase {
    /// Build into a `RuleBase`. Bodies call `msiMark(tag)` and, for failing
    /// rules, `msiFail`.
    pub fn build(&self) -> RuleBase {
        let body = |rule: &GenRule| {
            if rule.fails {
                format!("msiMark({}) ## msiFail", rule.tag)
            } else {
                format!("msiMark({})", rule.tag)
            }
        };
        let mut builder = RuleBaseBuilder::new();
        for rule in &self.application {
            let (guard, actions) = (rule.guard.text(), body(rule));
            builder = builder.rule("acPick", move |r| r.when(&guard).then(&actions));
        }
        for rule in &self.core {
            let (guard, actions) = (rule.guard.text(), body(rule));
            builder = builder.core_rule("acPick", move |r| r.when(&guard).then(&actions));
        }
        builder.build().expect("generated rules should load")
    }

    /// Candidates in the order the engine tries them.
    pub fn in_order(&self) -> impl Iterator<Item = &GenRule> {
        self.application.iter().chain(&self.core)
    }
}

fn arb_rules(prefix: &'static str, max: usize) -> impl Strategy<Value = Vec<GenRule>> {
    prop::collection::vec((arb_guard(), prop::bool::weighted(0.3)), 0..=max).prop_map(
        move |rules| {
            rules
                .into_iter()
                .enumerate()
                .map(|(i, (guard, fails))| GenRule {
                    guard,
                    tag: format!("{prefix}{i}"),
                    fails,
                })
                .collect()
        },
    )
}

/// Generate 1..=8 candidates split across the two sets.
pub fn arb_rule_base() -> impl Strategy<Value = GenRuleBase> {
    (arb_rules("app", 5), arb_rules("core", 3))
        .prop_filter("need at least one rule", |(app, core)| {
            !app.is_empty() || !core.is_empty()
        })
        .prop_map(|(application, core)| GenRuleBase { application, core })
}

/// A call argument as it would appear in rule text.
pub fn arb_arg() -> impl Strategy<Value = String> {
    prop_oneof![
        "[a-zA-Z0-9_./]{1,10}",
        "\\*[A-Z][a-zA-Z0-9]{0,6}",
        "[a-z]{1,4}, [a-z]{1,4}".prop_map(|s| format!("\"{s}\"")),
        ("[a-z]{1,6}", "[a-z0-9]{1,4}", "[a-z0-9]{1,4}")
            .prop_map(|(f, a, b)| format!("{f}({a}, {b})")),
        ("[a-z0-9]{1,4}", prop::sample::select(ARG_OPERATORS), "[a-z0-9*]{1,4}")
            .prop_map(|(l, op, r)| format!("{l} {op} {r}")),
    ]
}

/// Call text: a name with 0..=4 arguments.
pub fn arb_call_text() -> impl Strategy<Value = String> {
    ("ms[a-zA-Z]{1,10}", prop::collection::vec(arb_arg(), 0..=4)).prop_map(|(name, args)| {
        if args.is_empty() {
            name
        } else {
            format!("{name}({})", args.join(", "))
        }
    })
}
