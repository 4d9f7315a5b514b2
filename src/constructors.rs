//! Constructor variant planning: which constructors a type gets, and in which
//! order their guards run.
use std::cmp::Ordering;

use serde::Serialize;
use tracing::debug;

use crate::config::GenerationSettings;
use crate::constraints::{ConstraintSet, Domain};
use crate::context::MemberContext;
use crate::guard::{plan_guard, Check, Condition, Operation, Phase, SizeExpr};
use crate::plan::{Assignment, ConstructorPlan, Param, TypeRef, ValueSource};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ConstructorKind {
    /// Takes every member; used for deserialization.
    Canonical,
    /// Accepts wider primitives for narrow members, with a bounds check.
    WithWidenedPrimitives,
    /// Takes exactly `minSize` elements or entries.
    WithMinimalRequiredArgs,
    Empty,
    Single,
}

impl ConstructorKind {
    pub fn method_name(self) -> &'static str {
        match self {
            ConstructorKind::Canonical => "new",
            ConstructorKind::WithWidenedPrimitives => "from_widened",
            ConstructorKind::WithMinimalRequiredArgs => "of",
            ConstructorKind::Empty => "empty",
            ConstructorKind::Single => "single",
        }
    }
}

/// The field every container plan stores its contents in.
pub const CONTAINER_FIELD: &str = "values";

// ------------------------------ Variants --------------------------------- //

/// A member qualifies for widening when it is never absent and its type has a wider convenience type.
pub fn widens(member: &MemberContext) -> bool {
    !member.is_optional() && member.ty.widened().is_some()
}

/// Constructor kinds of a composite type.
pub fn plan(members: &[MemberContext], settings: &GenerationSettings) -> Vec<ConstructorKind> {
    let mut kinds = vec![ConstructorKind::Canonical];
    if settings.widen_primitives && members.iter().any(widens) {
        kinds.push(ConstructorKind::WithWidenedPrimitives);
    }
    kinds
}

/// Constructor kinds of a container.
pub fn plan_container(cs: &ConstraintSet, settings: &GenerationSettings) -> Vec<ConstructorKind> {
    let mut kinds = vec![ConstructorKind::Canonical];
    if settings.empty_constructors {
        if cs.can_be_empty() {
            kinds.push(ConstructorKind::Empty);
        }
        if cs.can_be_single() && cs.size.max.is_none_or(|max| max >= 1) {
            kinds.push(ConstructorKind::Single);
        }
    }
    let min = cs.min_size();
    if cs.size.min_declared && min > 1 && min < settings.fan_out_threshold {
        kinds.push(ConstructorKind::WithMinimalRequiredArgs);
    }
    debug!(shape = %cs.shape, ?kinds, "planned constructors");
    kinds
}

// ------------------------------ Ordering --------------------------------- //

/// A guard together with the weight of what it validates.
#[derive(Debug, Clone)]
pub struct WeightedCheck {
    pub weight: f64,
    pub check: Check,
}

impl WeightedCheck {
    pub fn new(weight: f64, check: Check) -> Self {
        Self { weight, check }
    }
}

fn check_cost(check: &Check) -> u32 {
    match &check.condition {
        Condition::NotNull { .. } => 0,
        Condition::Value { check, .. } => check.cost(),
        _ => 1,
    }
}

/// Order guards so cheap ones run first: null checks, then by member weight,
/// then by the cost of the individual check. Cross-field checks go last.
/// `After` checks keep their place at the end.
pub fn order_guards(mut guards: Vec<WeightedCheck>) -> Vec<Check> {
    let rank = |w: &WeightedCheck| match (&w.check.phase, &w.check.condition) {
        (Phase::After, _) => 3,
        (_, Condition::NotNull { .. }) => 0,
        (_, Condition::Ordered { .. }) => 2,
        _ => 1,
    };
    guards.sort_by(|a, b| {
        rank(a)
            .cmp(&rank(b))
            .then_with(|| a.weight.partial_cmp(&b.weight).unwrap_or(Ordering::Equal))
            .then_with(|| check_cost(&a.check).cmp(&check_cost(&b.check)))
    });
    guards.into_iter().map(|w| w.check).collect()
}

// ----------------------------- Containers -------------------------------- //

/// Type of a container's single field, given its element (or key/value) types.
pub fn container_type(domain: &Domain, element: TypeRef, key: Option<TypeRef>) -> TypeRef {
    match (domain, key) {
        (Domain::Map, Some(key)) => TypeRef::Map { key: Box::new(key), value: Box::new(element) },
        (Domain::Set, _) => TypeRef::Set { element: Box::new(element) },
        _ => TypeRef::List { element: Box::new(element) },
    }
}

/// Full constructor plans of a container.
pub fn container_constructors(
    cs: &ConstraintSet,
    element: &TypeRef,
    key: Option<&TypeRef>,
    settings: &GenerationSettings,
) -> Vec<ConstructorPlan> {
    let is_map = cs.domain == Domain::Map;
    let construct = plan_guard(Operation::Construct, cs).checks;
    let whole = container_type(&cs.domain, element.clone(), key.cloned());
    let param = |name: String, ty: TypeRef| Param { name, ty, narrows_to: None, optional: false };
    let entry_params = |n: u64| -> Vec<Param> {
        (0..n)
            .flat_map(|i| match key {
                Some(k) if is_map => vec![param(format!("k{i}"), k.clone()), param(format!("v{i}"), element.clone())],
                _ => vec![param(format!("e{i}"), element.clone())],
            })
            .collect()
    };
    let gather = |params: &[Param]| {
        let names = params.iter().map(|p| p.name.clone()).collect();
        if is_map { ValueSource::CollectPairs { names } } else { ValueSource::Collect { names } }
    };

    plan_container(cs, settings)
        .into_iter()
        .map(|kind| {
            let (params, guards, source) = match kind {
                ConstructorKind::Canonical | ConstructorKind::WithWidenedPrimitives => (
                    vec![param(CONTAINER_FIELD.to_string(), whole.clone())],
                    construct.clone(),
                    ValueSource::Param { name: CONTAINER_FIELD.to_string() },
                ),
                ConstructorKind::Empty => (Vec::new(), Vec::new(), ValueSource::Empty),
                ConstructorKind::Single => {
                    let params = if is_map {
                        entry_params(1)
                    } else {
                        vec![param("value".to_string(), element.clone())]
                    };
                    let source = gather(&params);
                    (params, construct.clone(), source)
                }
                ConstructorKind::WithMinimalRequiredArgs => {
                    let params = entry_params(cs.min_size());
                    let source = gather(&params);
                    (params, minimal_guards(cs, &construct), source)
                }
            };
            ConstructorPlan {
                kind,
                name: kind.method_name().to_string(),
                params,
                guards,
                assignments: vec![Assignment { field: CONTAINER_FIELD.to_string(), source }],
            }
        })
        .collect()
}

/// Minimal-argument constructors of maps check the size after assignment:
/// duplicate keys among the literal pairs shrink the map.
fn minimal_guards(cs: &ConstraintSet, construct: &[Check]) -> Vec<Check> {
    if cs.domain != Domain::Map {
        return construct.to_vec();
    }
    let mut guards: Vec<Check> = construct
        .iter()
        .filter(|c| !matches!(c.condition, Condition::MinSize { .. }))
        .cloned()
        .collect();
    guards.push(Check::new(
        Phase::After,
        Condition::MinSize { size: SizeExpr::Current, limit: cs.min_size() },
        format!("duplicate keys leave fewer than the minimum of {} entries", cs.min_size()),
    ));
    guards
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraints::resolve;
    use crate::guard::Subject;
    use crate::shape::{Member, Model, ShapeDescriptor, ShapeId, ShapeKind, Trait};

    fn list_cs(min: Option<u64>, max: Option<u64>) -> ConstraintSet {
        let shape = ShapeDescriptor::new(
            "ex#L",
            ShapeKind::List { member: Member::new("member", ShapeId::prelude("String")) },
        )
        .with_trait(Trait::Length { min, max });
        resolve(&shape, &Model::new()).unwrap()
    }

    fn map_cs(min: u64) -> ConstraintSet {
        let shape = ShapeDescriptor::new(
            "ex#M",
            ShapeKind::Map {
                key: Member::new("key", ShapeId::prelude("String")),
                value: Member::new("value", ShapeId::prelude("Integer")),
            },
        )
        .with_trait(Trait::Length { min: Some(min), max: None });
        resolve(&shape, &Model::new()).unwrap()
    }

    #[test]
    fn container_kinds_follow_bounds() {
        let settings = GenerationSettings::default();
        assert_eq!(
            plan_container(&list_cs(None, None), &settings),
            vec![ConstructorKind::Canonical, ConstructorKind::Empty, ConstructorKind::Single]
        );
        assert_eq!(
            plan_container(&list_cs(Some(1), Some(3)), &settings),
            vec![ConstructorKind::Canonical, ConstructorKind::Single]
        );
        assert_eq!(
            plan_container(&list_cs(Some(3), None), &settings),
            vec![ConstructorKind::Canonical, ConstructorKind::WithMinimalRequiredArgs]
        );
    }

    #[test]
    fn minimal_args_respect_fan_out_threshold() {
        let settings = GenerationSettings::default();
        assert!(!plan_container(&list_cs(Some(10), None), &settings).contains(&ConstructorKind::WithMinimalRequiredArgs));
        assert!(plan_container(&list_cs(Some(9), None), &settings).contains(&ConstructorKind::WithMinimalRequiredArgs));
        let tight = GenerationSettings { fan_out_threshold: 3, ..GenerationSettings::default() };
        assert!(!plan_container(&list_cs(Some(3), None), &tight).contains(&ConstructorKind::WithMinimalRequiredArgs));
    }

    #[test]
    fn map_minimal_constructor_checks_size_after_assignment() {
        let cs = map_cs(2);
        let plans = container_constructors(&cs, &TypeRef::Number { kind: crate::shape::NumberKind::Integer }, Some(&TypeRef::Text), &GenerationSettings::default());
        let minimal = plans.iter().find(|c| c.kind == ConstructorKind::WithMinimalRequiredArgs).unwrap();
        let names: Vec<_> = minimal.params.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["k0", "v0", "k1", "v1"]);
        assert!(matches!(
            minimal.guards.last().map(|c| (&c.phase, &c.condition)),
            Some((Phase::After, Condition::MinSize { size: SizeExpr::Current, limit: 2 }))
        ));
        assert!(matches!(minimal.assignments[0].source, ValueSource::CollectPairs { .. }));
    }

    #[test]
    fn guards_run_cheapest_first() {
        let value = |w: f64, subject: &str| {
            WeightedCheck::new(
                w,
                Check::value(Phase::Before, Subject::Param(subject.into()), crate::constraints::ValueCheck::MinValue { limit: 0.0 }, false),
            )
        };
        let not_null = WeightedCheck::new(50.0, Check::before(Condition::NotNull { subject: Subject::Param("s".into()) }, "s is required"));
        let ordered = WeightedCheck::new(
            0.0,
            Check::before(Condition::Ordered { lesser: "a".into(), greater: "b".into(), allow_equal: false }, "a < b"),
        );
        let ordered_checks = order_guards(vec![ordered, value(12.0, "s"), value(2.0, "i"), not_null]);
        let labels: Vec<_> = ordered_checks
            .iter()
            .map(|c| match &c.condition {
                Condition::NotNull { .. } => "null".to_string(),
                Condition::Value { subject, .. } => subject.to_string(),
                Condition::Ordered { .. } => "span".to_string(),
                _ => "other".to_string(),
            })
            .collect();
        assert_eq!(labels, vec!["null", "i", "s", "span"]);
    }
}
