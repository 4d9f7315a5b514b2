//! Generation entry points: one shape, or every declared shape in parallel.
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::config::GenerationSettings;
use crate::constraints::{ConstraintSet, ValueCheck};
use crate::constructors::{self, ConstructorKind, CONTAINER_FIELD};
use crate::context::GenerationContext;
use crate::contributors::{self, Registry};
use crate::error::{GenError, SchemaError};
use crate::guard::{self, value_checks_for, Check, Condition, Phase, Subject};
use crate::plan::{
    AccessorPlan, AccessorStyle, Assignment, ConstructorPlan, FieldPlan, HashTerm, MethodKind, MethodPlan, Param,
    PlanKind, TextEntry, TypePlan, TypeRef, ValueSource,
};
use crate::shape::{Model, ShapeDescriptor, ShapeId, ShapeKind};
use crate::weight::weight_of;

/// Field of scalar and enum wrappers.
pub const SCALAR_FIELD: &str = "value";

/// Outcome of generating one shape. Failures never affect other shapes.
#[derive(Debug)]
pub struct GeneratedShape {
    pub shape: ShapeId,
    pub result: Result<TypePlan, GenError>,
}

/// Generate the plan of one shape. All or nothing: an error discards every
/// partial decision for the shape.
pub fn generate_shape(
    model: &Model,
    shape: &ShapeDescriptor,
    settings: &GenerationSettings,
    registry: &Registry,
) -> Result<TypePlan, GenError> {
    let mut cx = GenerationContext::new(model, settings, registry, shape);
    let plan = match &shape.kind {
        ShapeKind::Structure { .. } | ShapeKind::Union { .. } => contributors::build_composite(&mut cx)?,
        ShapeKind::List { .. } | ShapeKind::Set { .. } | ShapeKind::Map { .. } => build_container(&mut cx)?,
        ShapeKind::Enum { .. } => build_scalar(&mut cx, PlanKind::Enum)?,
        ShapeKind::Boolean | ShapeKind::Number(_) | ShapeKind::String | ShapeKind::Timestamp => {
            build_scalar(&mut cx, PlanKind::Scalar)?
        }
    };
    debug!(shape = %shape.id, kind = ?plan.kind, "generated");
    Ok(plan)
}

/// Generate every declared shape of `model`, concurrently. Results keep declaration order.
pub fn generate_all(model: &Model, settings: &GenerationSettings, registry: &Registry) -> Vec<GeneratedShape> {
    let shapes: Vec<&ShapeDescriptor> = model.declared().collect();
    let out: Vec<GeneratedShape> = shapes
        .par_iter()
        .map(|shape| GeneratedShape {
            shape: shape.id.clone(),
            result: generate_shape(model, shape, settings, registry),
        })
        .collect();
    let failed = out.iter().filter(|g| g.result.is_err()).count();
    for g in &out {
        if let Err(e) = &g.result {
            warn!(shape = %g.shape, error = %e, "generation failed");
        }
    }
    info!(shapes = out.len(), failed, "generation finished");
    out
}

// ————————————————————————————————————————————————————————————————————————————
// CONTAINERS
// ————————————————————————————————————————————————————————————————————————————

fn size_doc(cs: &ConstraintSet) -> Option<String> {
    match (cs.size.min, cs.size.max) {
        (0, None) => None,
        (min, None) => Some(format!("Holds at least {min} items.")),
        (0, Some(max)) => Some(format!("Holds at most {max} items.")),
        (min, Some(max)) => Some(format!("Holds between {min} and {max} items.")),
    }
}

fn build_container(cx: &mut GenerationContext<'_>) -> Result<TypePlan, GenError> {
    let shape = cx.shape;
    let cs = cx.resolver().resolve(shape)?;
    let (element, key) = match &shape.kind {
        ShapeKind::Map { key, value } => (
            TypeRef::of(cx.model, &value.target),
            Some(TypeRef::of(cx.model, &key.target)),
        ),
        ShapeKind::List { member } | ShapeKind::Set { member } => (TypeRef::of(cx.model, &member.target), None),
        other => {
            return Err(SchemaError::Malformed {
                shape: shape.id.clone(),
                reason: format!("a {} is not a container", other.label()),
            }
            .into());
        }
    };
    let whole = constructors::container_type(&cs.domain, element.clone(), key.clone());
    cx.reference(&whole);

    let kind = match cs.domain {
        crate::constraints::Domain::Map => PlanKind::Map,
        crate::constraints::Domain::Set => PlanKind::Set,
        _ => PlanKind::List,
    };
    let mut plan = TypePlan::new(shape.id.clone(), kind, cs.clone());
    plan.doc.extend(shape.traits.documentation().map(str::to_string));
    plan.doc.extend(size_doc(&cs));
    if let Some(m) = cs.member_constraints() {
        let described: Vec<_> = m.value_checks().iter().map(ValueCheck::describe).collect();
        if !described.is_empty() {
            plan.doc.push(format!("Each item {}.", described.join(", ")));
        }
    }

    plan.fields.push(FieldPlan {
        name: CONTAINER_FIELD.to_string(),
        member: CONTAINER_FIELD.to_string(),
        json_name: CONTAINER_FIELD.to_string(),
        ty: whole.clone(),
        optional: false,
        default: cs.default.clone(),
        constraints: cs.clone(),
        weight: weight_of(cx.model, &shape.id),
    });
    plan.constructors = constructors::container_constructors(&cs, &element, key.as_ref(), cx.settings);
    for ctor in &plan.constructors {
        contributors::check_arguments_assigned(&shape.id, ctor)?;
    }
    plan.accessors.push(AccessorPlan {
        name: CONTAINER_FIELD.to_string(),
        field: CONTAINER_FIELD.to_string(),
        ty: whole,
        style: AccessorStyle::Direct { default: None },
    });
    plan.mutators = guard::mutator_plans(&cs);
    plan.equality.push(CONTAINER_FIELD.to_string());
    plan.hash.push(HashTerm { field: CONTAINER_FIELD.to_string(), prime: 31 });
    plan.text.entries.push(TextEntry { label: CONTAINER_FIELD.to_string(), field: CONTAINER_FIELD.to_string(), quoted: false });
    plan.methods.push(MethodPlan { name: "is_empty".to_string(), kind: MethodKind::IsEmpty, doc: None });
    plan.methods.push(MethodPlan { name: "to_json".to_string(), kind: MethodKind::ToJson, doc: None });
    contributors::check_equality_matches_hash(&plan)?;
    plan.references = cx.references();
    Ok(plan)
}

// ————————————————————————————————————————————————————————————————————————————
// SCALARS & ENUMS
// ————————————————————————————————————————————————————————————————————————————

fn scalar_type(kind: &ShapeKind) -> TypeRef {
    match kind {
        ShapeKind::Boolean => TypeRef::Boolean,
        ShapeKind::Number(kind) => TypeRef::Number { kind: *kind },
        ShapeKind::Timestamp => TypeRef::Timestamp,
        _ => TypeRef::Text,
    }
}

fn build_scalar(cx: &mut GenerationContext<'_>, kind: PlanKind) -> Result<TypePlan, GenError> {
    let shape = cx.shape;
    let cs = cx.resolver().resolve(shape)?;
    let ty = scalar_type(&shape.kind);
    let mut plan = TypePlan::new(shape.id.clone(), kind, cs.clone());
    plan.doc.extend(shape.traits.documentation().map(str::to_string));
    let described: Vec<_> = cs.value_checks().iter().map(ValueCheck::describe).collect();
    if !described.is_empty() {
        plan.doc.push(format!("Value {}.", described.join(", ")));
    }

    plan.fields.push(FieldPlan {
        name: SCALAR_FIELD.to_string(),
        member: SCALAR_FIELD.to_string(),
        json_name: SCALAR_FIELD.to_string(),
        ty: ty.clone(),
        optional: false,
        default: cs.default.clone(),
        constraints: cs.clone(),
        weight: weight_of(cx.model, &shape.id),
    });

    let subject = Subject::Param(SCALAR_FIELD.to_string());
    let not_null = Check::before(Condition::NotNull { subject: subject.clone() }, "a value is required");
    let mut canonical_guards = vec![not_null.clone()];
    canonical_guards.extend(value_checks_for(Phase::Before, subject.clone(), &cs, false));
    plan.constructors.push(ConstructorPlan {
        kind: ConstructorKind::Canonical,
        name: ConstructorKind::Canonical.method_name().to_string(),
        params: vec![Param { name: SCALAR_FIELD.to_string(), ty: ty.clone(), narrows_to: None, optional: false }],
        guards: canonical_guards,
        assignments: vec![Assignment {
            field: SCALAR_FIELD.to_string(),
            source: ValueSource::Param { name: SCALAR_FIELD.to_string() },
        }],
    });
    if let (true, Some(wide), Some(narrow)) = (cx.settings.widen_primitives, ty.widened(), ty.number_kind()) {
        let mut guards = vec![
            not_null,
            Check::value(Phase::Before, subject.clone(), ValueCheck::Representable { kind: narrow }, false),
        ];
        guards.extend(value_checks_for(Phase::Before, subject, &cs, false));
        plan.constructors.push(ConstructorPlan {
            kind: ConstructorKind::WithWidenedPrimitives,
            name: ConstructorKind::WithWidenedPrimitives.method_name().to_string(),
            params: vec![Param { name: SCALAR_FIELD.to_string(), ty: wide, narrows_to: Some(narrow), optional: false }],
            guards,
            assignments: vec![Assignment {
                field: SCALAR_FIELD.to_string(),
                source: ValueSource::Narrowed { name: SCALAR_FIELD.to_string(), kind: narrow, default: None },
            }],
        });
    }

    plan.accessors.push(AccessorPlan {
        name: SCALAR_FIELD.to_string(),
        field: SCALAR_FIELD.to_string(),
        ty: ty.clone(),
        style: AccessorStyle::Direct { default: None },
    });
    plan.equality.push(SCALAR_FIELD.to_string());
    plan.hash.push(HashTerm { field: SCALAR_FIELD.to_string(), prime: 31 });
    plan.text.entries.push(TextEntry {
        label: SCALAR_FIELD.to_string(),
        field: SCALAR_FIELD.to_string(),
        quoted: ty.is_quoted(),
    });
    plan.methods.push(MethodPlan { name: "to_json".to_string(), kind: MethodKind::ToJson, doc: None });
    contributors::check_equality_matches_hash(&plan)?;
    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guard::Operation;
    use crate::shape::{Member, NumberKind, Trait};

    fn model() -> Model {
        Model::new()
            .with(
                ShapeDescriptor::new(
                    "ex#Tags",
                    ShapeKind::List {
                        member: Member::new("member", ShapeId::prelude("String"))
                            .with_trait(Trait::Pattern("^[a-z]+$".into())),
                    },
                )
                .with_trait(Trait::Length { min: Some(1), max: Some(3) }),
            )
            .with(
                ShapeDescriptor::new("ex#Broken", ShapeKind::Number(NumberKind::Integer))
                    .with_trait(Trait::Range { min: Some(5.0), max: Some(1.0) }),
            )
            .with(
                ShapeDescriptor::new("ex#Percent", ShapeKind::Number(NumberKind::Short))
                    .with_trait(Trait::Range { min: Some(0.0), max: Some(100.0) }),
            )
    }

    #[test]
    fn failures_stay_with_their_shape() {
        let model = model();
        let out = generate_all(&model, &GenerationSettings::default(), Registry::standard());
        let ids: Vec<_> = out.iter().map(|g| g.shape.as_str()).collect();
        assert_eq!(ids, vec!["ex#Tags", "ex#Broken", "ex#Percent"]);
        assert!(out[0].result.is_ok());
        assert!(matches!(
            out[1].result,
            Err(GenError::Schema(SchemaError::MinExceedsMax { .. }))
        ));
        assert!(out[2].result.is_ok());
    }

    #[test]
    fn container_plan_has_guarded_mutators() {
        let model = model();
        let shape = model.get(&"ex#Tags".into()).unwrap();
        let plan = generate_shape(&model, shape, &GenerationSettings::default(), Registry::standard()).unwrap();
        assert_eq!(plan.kind, PlanKind::List);
        assert!(plan.mutator(Operation::Clear).unwrap().always_fails());
        assert!(!plan.mutator(Operation::Add).unwrap().is_unguarded());
        assert!(plan.method("is_empty").is_some());
        assert_eq!(plan.doc[0], "Holds between 1 and 3 items.");
    }

    #[test]
    fn scalar_plan_gets_widened_constructor() {
        let model = model();
        let shape = model.get(&"ex#Percent".into()).unwrap();
        let plan = generate_shape(&model, shape, &GenerationSettings::default(), Registry::standard()).unwrap();
        let widened = plan.constructor(ConstructorKind::WithWidenedPrimitives).unwrap();
        assert_eq!(widened.params[0].ty, TypeRef::Number { kind: NumberKind::Integer });
        let off = GenerationSettings { widen_primitives: false, ..GenerationSettings::default() };
        let plan = generate_shape(&model, shape, &off, Registry::standard()).unwrap();
        assert_eq!(plan.constructors.len(), 1);
    }
}
