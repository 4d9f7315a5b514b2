//! Reference realization of container plans.
//!
//! These types execute a [`TypePlan`]'s guard descriptions over dynamic
//! [`Datum`] values, exactly as emitted code would. They exist so the
//! behavioural guarantees of a plan (atomic failures, exact bulk sizing,
//! post-checked functional writes) can be exercised without compiling
//! generated sources.
pub mod list;
pub mod map;
pub mod set;

use std::collections::BTreeMap;

use crate::constructors::ConstructorKind;
use crate::datum::Datum;
use crate::error::ValidationFailure;
use crate::guard::eval::{run_checks, run_phase};
use crate::guard::{GuardPlan, Operands, Operation, Phase, Receiver, Unbuilt};
use crate::plan::{ConstructorPlan, TypePlan, ValueSource};
use crate::shape::ShapeId;

pub use list::ConstrainedList;
pub use map::ConstrainedMap;
pub use set::ConstrainedSet;

/// Constructor arguments by parameter name.
pub type Args = BTreeMap<String, Datum>;

/// The mutator guards of one container plan.
#[derive(Debug, Clone)]
pub struct Guards {
    pub shape: ShapeId,
    plans: Vec<GuardPlan>,
}

impl Guards {
    pub fn from_plan(plan: &TypePlan) -> Self {
        Self { shape: plan.shape.clone(), plans: plan.mutators.clone() }
    }

    pub fn plan(&self, op: Operation) -> Option<&GuardPlan> {
        self.plans.iter().find(|p| p.operation == op)
    }

    /// Run the `Before` checks of `op`, if it is guarded at all.
    pub fn before(&self, op: Operation, r: &dyn Receiver, ops: &Operands<'_>) -> Result<(), ValidationFailure> {
        match self.plan(op) {
            Some(plan) => run_phase(plan, Phase::Before, &self.shape, r, ops),
            None => Ok(()),
        }
    }
}

/// Items (or keys and values) gathered from a container constructor's arguments.
#[derive(Debug, Default)]
pub(crate) struct Gathered {
    pub items: Vec<Datum>,
    pub values: Vec<Datum>,
}

fn missing(shape: &ShapeId, name: &str) -> ValidationFailure {
    ValidationFailure::new(shape.clone(), format!("missing argument `{name}`"))
}

fn arg<'a>(shape: &ShapeId, args: &'a Args, name: &str) -> Result<&'a Datum, ValidationFailure> {
    args.get(name).filter(|d| !d.is_null()).ok_or_else(|| missing(shape, name))
}

fn constructor<'p>(plan: &'p TypePlan, kind: ConstructorKind) -> Result<&'p ConstructorPlan, ValidationFailure> {
    plan.constructor(kind)
        .ok_or_else(|| ValidationFailure::new(plan.shape.clone(), format!("no {kind:?} constructor")))
}

/// Gather the incoming contents named by a constructor and run its `Before` guards.
pub(crate) fn gather<'p>(
    plan: &'p TypePlan,
    kind: ConstructorKind,
    args: &Args,
) -> Result<(Gathered, &'p ConstructorPlan), ValidationFailure> {
    let ctor = constructor(plan, kind)?;
    let shape = &plan.shape;
    let mut out = Gathered::default();
    for assignment in &ctor.assignments {
        match &assignment.source {
            ValueSource::Param { name } => match arg(shape, args, name)? {
                Datum::List(xs) => out.items.extend(xs.iter().cloned()),
                Datum::Set(xs) => out.items.extend(xs.iter().cloned()),
                Datum::Map(m) => {
                    for (k, v) in m {
                        out.items.push(k.clone());
                        out.values.push(v.clone());
                    }
                }
                other => {
                    return Err(ValidationFailure::new(shape.clone(), format!("`{name}` is not a collection"))
                        .with_value(other.to_string()));
                }
            },
            ValueSource::Collect { names } => {
                for name in names {
                    out.items.push(arg(shape, args, name)?.clone());
                }
            }
            ValueSource::CollectPairs { names } => {
                for pair in names.chunks(2) {
                    if let [k, v] = pair {
                        out.items.push(arg(shape, args, k)?.clone());
                        out.values.push(arg(shape, args, v)?.clone());
                    }
                }
            }
            ValueSource::Empty => {}
            ValueSource::Narrowed { name, .. } | ValueSource::ParamOrDefault { name, .. } => {
                return Err(ValidationFailure::new(shape.clone(), format!("`{name}` cannot initialize a container")));
            }
        }
    }
    let ops = Operands::entries(&out.items, &out.values);
    run_checks(&ctor.guards, Phase::Before, shape, &Unbuilt, &ops)?;
    Ok((out, ctor))
}

/// Run a constructor's `After` guards against the built container.
pub(crate) fn after(shape: &ShapeId, ctor: &ConstructorPlan, built: &dyn Receiver) -> Result<(), ValidationFailure> {
    run_checks(&ctor.guards, Phase::After, shape, built, &Operands::default())
}

/// Convenience for building constructor arguments in tests and callers.
pub fn args<I, K>(pairs: I) -> Args
where
    I: IntoIterator<Item = (K, Datum)>,
    K: Into<String>,
{
    pairs.into_iter().map(|(k, v)| (k.into(), v)).collect()
}
