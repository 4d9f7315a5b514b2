//! Evaluation of guard plans against live data.
//!
//! Every check of a phase runs before anything is changed, so a failing
//! operation leaves its receiver untouched.
use std::collections::{BTreeMap, HashSet};

use tracing::trace;

use super::{Check, Condition, Gate, GuardPlan, Phase, SizeExpr, Subject};
use crate::datum::Datum;
use crate::error::ValidationFailure;
use crate::shape::ShapeId;

/// Current contents of the instance an operation applies to.
pub trait Receiver {
    fn size(&self) -> u64;
    /// Membership of an element (collections) or key (maps).
    fn contains(&self, item: &Datum) -> bool;
    /// Elements (collections) or keys (maps), duplicates included.
    fn items(&self) -> Box<dyn Iterator<Item = &Datum> + '_>;
}

/// Receiver of a constructor: nothing exists yet.
pub struct Unbuilt;

impl Receiver for Unbuilt {
    fn size(&self) -> u64 {
        0
    }

    fn contains(&self, _: &Datum) -> bool {
        false
    }

    fn items(&self) -> Box<dyn Iterator<Item = &Datum> + '_> {
        Box::new(std::iter::empty())
    }
}

/// Arguments of one operation invocation.
#[derive(Debug, Default, Clone, Copy)]
pub struct Operands<'a> {
    /// The element or key the operation targets.
    pub argument: Option<&'a Datum>,
    pub value: Option<&'a Datum>,
    /// Incoming elements, or keys of incoming entries.
    pub incoming: &'a [Datum],
    /// Values of incoming entries, aligned with `incoming`.
    pub incoming_values: &'a [Datum],
    /// `Some(None)` when a caller function asked for removal.
    pub result: Option<Option<&'a Datum>>,
    pub params: Option<&'a BTreeMap<String, Datum>>,
}

impl<'a> Operands<'a> {
    pub fn argument(d: &'a Datum) -> Self {
        Self { argument: Some(d), ..Self::default() }
    }

    pub fn incoming(items: &'a [Datum]) -> Self {
        Self { incoming: items, ..Self::default() }
    }

    pub fn entries(keys: &'a [Datum], values: &'a [Datum]) -> Self {
        Self { incoming: keys, incoming_values: values, ..Self::default() }
    }

    pub fn params(params: &'a BTreeMap<String, Datum>) -> Self {
        Self { params: Some(params), ..Self::default() }
    }

    pub fn with_value(mut self, v: &'a Datum) -> Self {
        self.value = Some(v);
        self
    }

    pub fn with_result(mut self, r: Option<&'a Datum>) -> Self {
        self.result = Some(r);
        self
    }
}

impl Gate {
    pub fn holds(self, present: bool) -> bool {
        match self {
            Gate::Always => true,
            Gate::IfAbsent => !present,
            Gate::IfPresent => present,
        }
    }
}

impl SizeExpr {
    /// Size the receiver would have once the operation completes.
    pub fn evaluate(&self, r: &dyn Receiver, ops: &Operands<'_>) -> u64 {
        let present = || ops.argument.is_some_and(|a| r.contains(a));
        let n = r.size();
        match *self {
            SizeExpr::Current => n,
            SizeExpr::Incoming { distinct: false } => ops.incoming.len() as u64,
            SizeExpr::Incoming { distinct: true } => ops.incoming.iter().collect::<HashSet<_>>().len() as u64,
            SizeExpr::CurrentPlusOne { gate } if gate.holds(present()) => n.saturating_add(1),
            SizeExpr::CurrentMinusOne { gate } if gate.holds(present()) => n.saturating_sub(1),
            SizeExpr::CurrentPlusOne { .. } | SizeExpr::CurrentMinusOne { .. } => n,
            SizeExpr::CurrentPlusIncoming => n.saturating_add(ops.incoming.len() as u64),
            SizeExpr::CurrentPlusDistinctNew => {
                let fresh: HashSet<&Datum> = ops.incoming.iter().filter(|d| !r.contains(d)).collect();
                n.saturating_add(fresh.len() as u64)
            }
            SizeExpr::AfterRemovingAll => {
                let doomed: HashSet<&Datum> = ops.incoming.iter().collect();
                r.items().filter(|d| !doomed.contains(d)).count() as u64
            }
            SizeExpr::AfterRetaining { materialize: true } => {
                let kept: HashSet<&Datum> = ops.incoming.iter().collect();
                r.items().filter(|d| kept.contains(d)).count() as u64
            }
            SizeExpr::AfterRetaining { materialize: false } => {
                r.items().filter(|d| ops.incoming.contains(d)).count() as u64
            }
            SizeExpr::AfterResult => match (present(), ops.result) {
                (false, Some(Some(_))) => n.saturating_add(1),
                (true, Some(None)) => n.saturating_sub(1),
                _ => n,
            },
        }
    }
}

fn subjects<'a>(subject: &Subject, ops: &Operands<'a>) -> Vec<&'a Datum> {
    match subject {
        Subject::Argument | Subject::Key => ops.argument.into_iter().collect(),
        Subject::Value => ops.value.into_iter().collect(),
        Subject::EachIncoming | Subject::EachKey => ops.incoming.iter().collect(),
        Subject::EachValue => ops.incoming_values.iter().collect(),
        Subject::FunctionResult => ops.result.flatten().into_iter().collect(),
        Subject::Param(name) => ops
            .params
            .and_then(|p| p.get(name))
            .filter(|d| !d.is_null())
            .into_iter()
            .collect(),
    }
}

fn param<'a>(ops: &Operands<'a>, name: &str) -> Option<&'a Datum> {
    ops.params.and_then(|p| p.get(name)).filter(|d| !d.is_null())
}

fn fail(shape: &ShapeId, check: &Check, value: Option<String>) -> ValidationFailure {
    let message = match &value {
        Some(v) => format!("{}, got {v}", check.failure.message),
        None => check.failure.message.clone(),
    };
    let mut failure = ValidationFailure::new(shape.clone(), message);
    if let Some(v) = value {
        failure = failure.with_value(v);
    }
    if let Some(limit) = &check.failure.limit {
        failure = failure.with_limit(limit.clone());
    }
    failure
}

/// Evaluate one check.
pub fn run_check(
    check: &Check,
    shape: &ShapeId,
    r: &dyn Receiver,
    ops: &Operands<'_>,
) -> Result<(), ValidationFailure> {
    match &check.condition {
        Condition::Always => Err(fail(shape, check, None)),
        Condition::MaxSize { size, limit } => {
            let n = size.evaluate(r, ops);
            if n > *limit { Err(fail(shape, check, Some(n.to_string()))) } else { Ok(()) }
        }
        Condition::MinSize { size, limit } => {
            let n = size.evaluate(r, ops);
            if n < *limit { Err(fail(shape, check, Some(n.to_string()))) } else { Ok(()) }
        }
        Condition::Value { subject, check: vc, only_if_new } => {
            if *only_if_new {
                let existing = ops.argument.is_some_and(|a| r.contains(a));
                // an absent result never introduces the key
                if existing || ops.result == Some(None) {
                    return Ok(());
                }
            }
            match subjects(subject, ops).into_iter().find(|d| !vc.test(d)) {
                Some(bad) => Err(fail(shape, check, Some(bad.to_string()))),
                None => Ok(()),
            }
        }
        Condition::NotNull { subject } => {
            if subjects(subject, ops).is_empty() { Err(fail(shape, check, None)) } else { Ok(()) }
        }
        Condition::Ordered { lesser, greater, allow_equal } => {
            let (Some(lo), Some(hi)) = (param(ops, lesser), param(ops, greater)) else {
                return Ok(());
            };
            let ordered = match (lo, hi) {
                (Datum::Int(_), Datum::Float(_)) | (Datum::Float(_), Datum::Int(_)) => {
                    match (lo.as_f64(), hi.as_f64()) {
                        (Some(a), Some(b)) => if *allow_equal { a <= b } else { a < b },
                        _ => false,
                    }
                }
                // same-kind values compare exactly, longs included
                _ => if *allow_equal { lo <= hi } else { lo < hi },
            };
            if ordered { Ok(()) } else { Err(fail(shape, check, Some(format!("{lesser}={lo}, {greater}={hi}")))) }
        }
    }
}

/// Evaluate the checks of `phase` among `checks`, stopping at the first failure.
pub fn run_checks<'c>(
    checks: impl IntoIterator<Item = &'c Check>,
    phase: Phase,
    shape: &ShapeId,
    r: &dyn Receiver,
    ops: &Operands<'_>,
) -> Result<(), ValidationFailure> {
    for check in checks.into_iter().filter(|c| c.phase == phase) {
        run_check(check, shape, r, ops)?;
    }
    Ok(())
}

/// Evaluate every check of `plan` belonging to `phase`.
pub fn run_phase(
    plan: &GuardPlan,
    phase: Phase,
    shape: &ShapeId,
    r: &dyn Receiver,
    ops: &Operands<'_>,
) -> Result<(), ValidationFailure> {
    run_checks(&plan.checks, phase, shape, r, ops)?;
    trace!(shape = %shape, op = %plan.operation, ?phase, "guard passed");
    Ok(())
}

/// Decorator around a caller-supplied function: its result is validated
/// against the plan's `OnResult` checks before the container may store it.
/// `None` results stand for removal.
pub struct PostChecked<'p, F> {
    plan: &'p GuardPlan,
    shape: &'p ShapeId,
    f: F,
}

impl<'p, F> PostChecked<'p, F> {
    pub fn new(plan: &'p GuardPlan, shape: &'p ShapeId, f: F) -> Self {
        Self { plan, shape, f }
    }

    /// Call the wrapped function for `key` and validate what it produced.
    pub fn call<A>(&mut self, r: &dyn Receiver, key: &Datum, arg: A) -> Result<Option<Datum>, ValidationFailure>
    where
        F: FnMut(A) -> Option<Datum>,
    {
        let out = (self.f)(arg);
        let ops = Operands::argument(key).with_result(out.as_ref());
        run_phase(self.plan, Phase::OnResult, self.shape, r, &ops)?;
        Ok(out)
    }
}
