//! Mutation guard synthesis.
//!
//! For every operation that can change an instance, decide *where* each
//! constraint is enforced (before the change, or on the result of a
//! caller-supplied function) and describe the checks structurally. The same
//! description is rendered by emission backends and evaluated by the
//! reference realization in [`crate::runtime`].
pub mod eval;

use std::fmt;

use serde::Serialize;
use tracing::debug;

use crate::constraints::{ConstraintSet, Domain, ValueCheck};

pub use eval::{Operands, PostChecked, Receiver, Unbuilt};

// ------------------------------- Types ----------------------------------- //

/// Semantic operation categories a generated type may expose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Operation {
    Construct,
    Add,
    Remove,
    RemoveAt,
    AddAll,
    RemoveAll,
    RetainAll,
    Put,
    PutIfAbsent,
    Replace,
    PutAll,
    RemoveKey,
    Merge,
    Compute,
    ComputeIfAbsent,
    ComputeIfPresent,
    ReplaceAll,
    Clear,
}

impl Operation {
    pub const COLLECTION: [Operation; 7] = [
        Operation::Add,
        Operation::Remove,
        Operation::AddAll,
        Operation::RemoveAll,
        Operation::RetainAll,
        Operation::Clear,
        Operation::Construct,
    ];

    pub const MAP: [Operation; 12] = [
        Operation::Put,
        Operation::PutIfAbsent,
        Operation::Replace,
        Operation::PutAll,
        Operation::RemoveKey,
        Operation::Merge,
        Operation::Compute,
        Operation::ComputeIfAbsent,
        Operation::ComputeIfPresent,
        Operation::ReplaceAll,
        Operation::Clear,
        Operation::Construct,
    ];

    /// Operations meaningful for a domain, in a stable order.
    pub fn for_domain(domain: &Domain) -> Vec<Operation> {
        match domain {
            Domain::List => {
                let mut ops = Operation::COLLECTION.to_vec();
                ops.insert(2, Operation::RemoveAt);
                ops
            }
            Domain::Set => Operation::COLLECTION.to_vec(),
            Domain::Map => Operation::MAP.to_vec(),
            _ => vec![Operation::Construct],
        }
    }

    /// Map operations whose new value comes from a caller-supplied function.
    pub fn is_functional(self) -> bool {
        matches!(
            self,
            Operation::Merge
                | Operation::Compute
                | Operation::ComputeIfAbsent
                | Operation::ComputeIfPresent
                | Operation::ReplaceAll
        )
    }

    pub fn method_name(self) -> &'static str {
        match self {
            Operation::Construct => "new",
            Operation::Add => "add",
            Operation::Remove => "remove",
            Operation::RemoveAt => "remove_at",
            Operation::AddAll => "add_all",
            Operation::RemoveAll => "remove_all",
            Operation::RetainAll => "retain_all",
            Operation::Put => "put",
            Operation::PutIfAbsent => "put_if_absent",
            Operation::Replace => "replace",
            Operation::PutAll => "put_all",
            Operation::RemoveKey => "remove",
            Operation::Merge => "merge",
            Operation::Compute => "compute",
            Operation::ComputeIfAbsent => "compute_if_absent",
            Operation::ComputeIfPresent => "compute_if_present",
            Operation::ReplaceAll => "replace_all",
            Operation::Clear => "clear",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.method_name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum GuardStrategy {
    /// Validate before the state changes.
    PreCheck,
    /// Wrap the caller's function and validate what it produced before the
    /// container stores it.
    PostCheck,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Phase {
    Before,
    /// Inside the decorator around a caller-supplied function.
    OnResult,
    /// After the assignment, before the instance is handed out.
    After,
}

/// Presence of the operation's argument (element or key) in the receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Gate {
    Always,
    IfAbsent,
    IfPresent,
}

/// How the would-be size of the receiver is computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "size")]
pub enum SizeExpr {
    Current,
    /// Size of the argument collection; `distinct` collapses duplicates (keys for maps).
    Incoming { distinct: bool },
    CurrentPlusOne { gate: Gate },
    CurrentMinusOne { gate: Gate },
    CurrentPlusIncoming,
    /// `|current ∪ incoming|`, duplicates and already-present items counted once.
    CurrentPlusDistinctNew,
    /// Items of the receiver not found in the argument collection.
    AfterRemovingAll,
    /// Items of the receiver found in the argument collection, after turning
    /// the argument into a set when `materialize` is set.
    AfterRetaining { materialize: bool },
    /// Size after storing (or removing, for an absent result) a function result.
    AfterResult,
}

/// Which value a value check inspects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "subject", content = "name")]
pub enum Subject {
    Argument,
    Key,
    Value,
    EachIncoming,
    EachKey,
    EachValue,
    FunctionResult,
    Param(String),
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Subject::Argument => f.write_str("element"),
            Subject::Key => f.write_str("key"),
            Subject::Value => f.write_str("value"),
            Subject::EachIncoming => f.write_str("each element"),
            Subject::EachKey => f.write_str("each key"),
            Subject::EachValue => f.write_str("each value"),
            Subject::FunctionResult => f.write_str("function result"),
            Subject::Param(name) => f.write_str(name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", tag = "condition")]
pub enum Condition {
    /// The operation can never succeed.
    Always,
    MaxSize { size: SizeExpr, limit: u64 },
    MinSize { size: SizeExpr, limit: u64 },
    Value { subject: Subject, check: ValueCheck, only_if_new: bool },
    NotNull { subject: Subject },
    /// `lesser < greater`, or `<=` when `allow_equal`.
    Ordered { lesser: String, greater: String, allow_equal: bool },
}

/// What a violated check reports: a message template and the violated limit.
/// The offending value is appended when the failure is raised.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureTemplate {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Check {
    pub phase: Phase,
    pub condition: Condition,
    pub failure: FailureTemplate,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GuardPlan {
    pub operation: Operation,
    pub strategy: GuardStrategy,
    pub checks: Vec<Check>,
}

impl GuardPlan {
    pub fn is_unguarded(&self) -> bool {
        self.checks.is_empty()
    }

    pub fn always_fails(&self) -> bool {
        self.checks.iter().any(|c| c.condition == Condition::Always)
    }

    pub fn checks_in(&self, phase: Phase) -> impl Iterator<Item = &Check> {
        self.checks.iter().filter(move |c| c.phase == phase)
    }
}

// ------------------------------ Builders --------------------------------- //

impl Check {
    pub fn before(condition: Condition, message: impl Into<String>) -> Self {
        Self::new(Phase::Before, condition, message)
    }

    pub fn new(phase: Phase, condition: Condition, message: impl Into<String>) -> Self {
        let limit = match &condition {
            Condition::MaxSize { limit, .. } | Condition::MinSize { limit, .. } => Some(limit.to_string()),
            Condition::Value { check, .. } => Some(check.limit()),
            _ => None,
        };
        Self { phase, condition, failure: FailureTemplate { message: message.into(), limit } }
    }

    pub fn value(phase: Phase, subject: Subject, check: ValueCheck, only_if_new: bool) -> Self {
        let message = format!("{subject} {}", check.describe());
        Self::new(phase, Condition::Value { subject, check, only_if_new }, message)
    }
}

/// Value checks of `cs` applied to `subject`, cheapest first.
pub fn value_checks_for(phase: Phase, subject: Subject, cs: &ConstraintSet, only_if_new: bool) -> Vec<Check> {
    cs.value_checks()
        .into_iter()
        .map(|check| Check::value(phase, subject.clone(), check, only_if_new))
        .collect()
}

fn member_checks(phase: Phase, subject: Subject, cs: &ConstraintSet) -> Vec<Check> {
    cs.member_constraints()
        .map(|m| value_checks_for(phase, subject, m, false))
        .unwrap_or_default()
}

fn key_checks(phase: Phase, subject: Subject, cs: &ConstraintSet, only_if_new: bool) -> Vec<Check> {
    cs.key_constraints()
        .map(|k| value_checks_for(phase, subject, k, only_if_new))
        .unwrap_or_default()
}

fn max_check(phase: Phase, cs: &ConstraintSet, size: SizeExpr, what: &str) -> Option<Check> {
    cs.size.max.map(|limit| {
        Check::new(
            phase,
            Condition::MaxSize { size, limit },
            format!("{what} would push the size above the maximum of {limit}"),
        )
    })
}

fn min_check(phase: Phase, cs: &ConstraintSet, size: SizeExpr, what: &str) -> Option<Check> {
    (cs.size.min > 0).then(|| {
        let limit = cs.size.min;
        Check::new(
            phase,
            Condition::MinSize { size, limit },
            format!("{what} would push the size below the minimum of {limit}"),
        )
    })
}

// ------------------------------- Planner --------------------------------- //

/// Plan the guard for one operation of a shape with constraints `cs`.
///
/// Operations not listed by [`Operation::for_domain`] for `cs.domain` get an
/// empty plan.
pub fn plan_guard(op: Operation, cs: &ConstraintSet) -> GuardPlan {
    let plan = match &cs.domain {
        Domain::List | Domain::Set => plan_collection(op, cs),
        Domain::Map => plan_map(op, cs),
        _ => plan_scalar(op, cs),
    };
    debug!(shape = %cs.shape, op = %op, strategy = ?plan.strategy, checks = plan.checks.len(), "planned guard");
    plan
}

/// Guard plans for every mutating operation of a container (construction excluded).
pub fn mutator_plans(cs: &ConstraintSet) -> Vec<GuardPlan> {
    Operation::for_domain(&cs.domain)
        .into_iter()
        .filter(|op| *op != Operation::Construct)
        .map(|op| plan_guard(op, cs))
        .collect()
}

fn pre(op: Operation, checks: Vec<Check>) -> GuardPlan {
    GuardPlan { operation: op, strategy: GuardStrategy::PreCheck, checks }
}

fn post(op: Operation, checks: Vec<Check>) -> GuardPlan {
    GuardPlan { operation: op, strategy: GuardStrategy::PostCheck, checks }
}

fn clear_plan(cs: &ConstraintSet) -> GuardPlan {
    if cs.size.min > 0 {
        let msg = format!(
            "clearing would leave fewer than the minimum of {} required by the schema",
            cs.size.min
        );
        pre(Operation::Clear, vec![Check::before(Condition::Always, msg)])
    } else {
        pre(Operation::Clear, Vec::new())
    }
}

fn plan_collection(op: Operation, cs: &ConstraintSet) -> GuardPlan {
    use Phase::Before;
    let is_set = cs.domain == Domain::Set;
    let mut checks = Vec::new();
    match op {
        Operation::Construct => {
            let size = SizeExpr::Incoming { distinct: is_set };
            checks.extend(min_check(Before, cs, size, "constructing with these items"));
            checks.extend(max_check(Before, cs, size, "constructing with these items"));
            checks.extend(member_checks(Before, Subject::EachIncoming, cs));
        }
        Operation::Add => {
            let gate = if is_set { Gate::IfAbsent } else { Gate::Always };
            checks.extend(max_check(Before, cs, SizeExpr::CurrentPlusOne { gate }, "adding this item"));
            checks.extend(member_checks(Before, Subject::Argument, cs));
        }
        Operation::Remove => {
            let size = SizeExpr::CurrentMinusOne { gate: Gate::IfPresent };
            checks.extend(min_check(Before, cs, size, "removing this item"));
        }
        Operation::RemoveAt if !is_set => {
            let size = SizeExpr::CurrentMinusOne { gate: Gate::Always };
            checks.extend(min_check(Before, cs, size, "removing an item"));
        }
        Operation::AddAll => {
            let size = if is_set { SizeExpr::CurrentPlusDistinctNew } else { SizeExpr::CurrentPlusIncoming };
            checks.extend(max_check(Before, cs, size, "adding these items"));
            checks.extend(member_checks(Before, Subject::EachIncoming, cs));
        }
        Operation::RemoveAll => {
            checks.extend(min_check(Before, cs, SizeExpr::AfterRemovingAll, "removing these items"));
        }
        Operation::RetainAll => {
            let size = SizeExpr::AfterRetaining { materialize: true };
            checks.extend(min_check(Before, cs, size, "retaining only these items"));
        }
        Operation::Clear => return clear_plan(cs),
        _ => {}
    }
    pre(op, checks)
}

fn plan_map(op: Operation, cs: &ConstraintSet) -> GuardPlan {
    use Phase::{Before, OnResult};
    let mut checks = Vec::new();
    match op {
        Operation::Construct => {
            let size = SizeExpr::Incoming { distinct: true };
            checks.extend(min_check(Before, cs, size, "constructing with these entries"));
            checks.extend(max_check(Before, cs, size, "constructing with these entries"));
            checks.extend(key_checks(Before, Subject::EachKey, cs, false));
            checks.extend(member_checks(Before, Subject::EachValue, cs));
        }
        Operation::Put | Operation::PutIfAbsent => {
            let size = SizeExpr::CurrentPlusOne { gate: Gate::IfAbsent };
            checks.extend(max_check(Before, cs, size, "adding this key"));
            checks.extend(key_checks(Before, Subject::Key, cs, false));
            checks.extend(member_checks(Before, Subject::Value, cs));
        }
        Operation::Replace => {
            checks.extend(member_checks(Before, Subject::Value, cs));
        }
        Operation::PutAll => {
            checks.extend(max_check(Before, cs, SizeExpr::CurrentPlusDistinctNew, "adding these entries"));
            checks.extend(key_checks(Before, Subject::EachKey, cs, false));
            checks.extend(member_checks(Before, Subject::EachValue, cs));
        }
        Operation::RemoveKey => {
            let size = SizeExpr::CurrentMinusOne { gate: Gate::IfPresent };
            checks.extend(min_check(Before, cs, size, "removing this key"));
        }
        Operation::Merge | Operation::Compute | Operation::ComputeIfAbsent => {
            // keys are known up front; only a new key needs validating
            let key_phase = if op == Operation::Compute { OnResult } else { Before };
            checks.extend(key_checks(key_phase, Subject::Key, cs, true));
            checks.extend(member_checks(OnResult, Subject::FunctionResult, cs));
            checks.extend(max_check(OnResult, cs, SizeExpr::AfterResult, "storing this result"));
            if op != Operation::ComputeIfAbsent {
                checks.extend(min_check(OnResult, cs, SizeExpr::AfterResult, "removing this key"));
            }
            return post(op, checks);
        }
        Operation::ComputeIfPresent => {
            checks.extend(member_checks(OnResult, Subject::FunctionResult, cs));
            checks.extend(min_check(OnResult, cs, SizeExpr::AfterResult, "removing this key"));
            return post(op, checks);
        }
        Operation::ReplaceAll => {
            checks.extend(member_checks(OnResult, Subject::FunctionResult, cs));
            return post(op, checks);
        }
        Operation::Clear => return clear_plan(cs),
        _ => {}
    }
    pre(op, checks)
}

fn plan_scalar(op: Operation, cs: &ConstraintSet) -> GuardPlan {
    let checks = match op {
        Operation::Construct => value_checks_for(Phase::Before, Subject::Argument, cs, false),
        _ => Vec::new(),
    };
    pre(op, checks)
}
