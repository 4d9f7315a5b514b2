//! Contributor registry and the composite-type pipeline.
//!
//! Each pipeline stage asks the providers registered for it, in precedence
//! order. Single-answer stages (fields, arguments, accessors, equality, hash,
//! textual form, documentation) take the first provider that does not
//! [`Answer::Defer`]; multi-answer stages (constructor-level guards, other
//! methods) collect from every provider.
pub mod defaults;

use once_cell::sync::Lazy;
use tracing::{debug, trace};

use crate::config::GenerationSettings;
use crate::constraints::ConstraintSet;
use crate::constructors::{self, ConstructorKind, WeightedCheck};
use crate::context::{GenerationContext, MemberContext};
use crate::error::{ConsistencyError, GenError};
use crate::plan::{
    AccessorPlan, Assignment, ConstructorPlan, DefaultInstance, FieldPlan, HashTerm, MethodPlan, Param, PlanKind,
    TextEntry, TypePlan,
};
use crate::shape::{Model, ShapeDescriptor, ShapeId, ShapeKind};
use crate::span::{self, SpanRelation};

// ————————————————————————————————————————————————————————————————————————————
// PROVIDER INTERFACES
// ————————————————————————————————————————————————————————————————————————————

/// A provider's reply for one stage.
#[derive(Debug, Clone, PartialEq)]
pub enum Answer<T> {
    /// No opinion; ask the next provider.
    Defer,
    /// Decided: contribute nothing.
    Skip,
    Use(T),
}

/// Read-only view of the type being generated, shared by every stage.
pub struct TypeContext<'c> {
    pub shape: &'c ShapeDescriptor,
    pub model: &'c Model,
    pub settings: &'c GenerationSettings,
    pub constraints: &'c ConstraintSet,
    pub members: &'c [MemberContext],
    pub span: Option<&'c SpanRelation>,
}

impl TypeContext<'_> {
    pub fn member(&self, name: &str) -> Option<&MemberContext> {
        self.members.iter().find(|m| m.name() == name)
    }

    /// Declaration index of a member.
    pub fn position(&self, member: &MemberContext) -> usize {
        self.members.iter().position(|m| m.name() == member.name()).unwrap_or(0)
    }
}

pub trait DocRuleProvider: Send + Sync {
    fn doc(&self, cx: &TypeContext<'_>) -> Answer<Vec<String>>;
}

pub trait FieldRuleProvider: Send + Sync {
    fn field(&self, cx: &TypeContext<'_>, member: &MemberContext) -> Answer<FieldPlan>;
}

/// One member's share of a constructor.
#[derive(Debug, Clone)]
pub struct ArgumentRule {
    pub param: Param,
    pub guards: Vec<WeightedCheck>,
    pub assignment: Assignment,
}

pub trait ConstructorArgumentRuleProvider: Send + Sync {
    fn argument(&self, cx: &TypeContext<'_>, member: &MemberContext, kind: ConstructorKind) -> Answer<ArgumentRule>;

    /// Guards spanning several members. Collected from every provider.
    fn constructor_guards(&self, _cx: &TypeContext<'_>, _kind: ConstructorKind) -> Vec<WeightedCheck> {
        Vec::new()
    }
}

pub trait GetterRuleProvider: Send + Sync {
    fn getter(&self, cx: &TypeContext<'_>, member: &MemberContext, field: &FieldPlan) -> Answer<AccessorPlan>;
}

/// `Use(field)` puts the field into equality.
pub trait EqualityRuleProvider: Send + Sync {
    fn equality(&self, cx: &TypeContext<'_>, member: &MemberContext) -> Answer<String>;
}

pub trait HashRuleProvider: Send + Sync {
    fn hash(&self, cx: &TypeContext<'_>, member: &MemberContext) -> Answer<HashTerm>;
}

pub trait ToStringRuleProvider: Send + Sync {
    fn text(&self, cx: &TypeContext<'_>, member: &MemberContext) -> Answer<TextEntry>;
}

/// Auxiliary methods. Collected from every provider.
pub trait OtherRuleProvider: Send + Sync {
    fn methods(&self, cx: &TypeContext<'_>) -> Vec<MethodPlan>;
}

// ————————————————————————————————————————————————————————————————————————————
// REGISTRY
// ————————————————————————————————————————————————————————————————————————————

/// Precedence of the built-in providers. Lower precedence is asked first.
pub const DEFAULT_PRECEDENCE: i32 = 100;

pub struct Registered<P: ?Sized> {
    pub precedence: i32,
    seq: usize,
    pub provider: Box<P>,
}

/// Typed provider lists, each sorted by `(precedence, registration order)`.
#[derive(Default)]
pub struct Registry {
    docs: Vec<Registered<dyn DocRuleProvider>>,
    fields: Vec<Registered<dyn FieldRuleProvider>>,
    arguments: Vec<Registered<dyn ConstructorArgumentRuleProvider>>,
    getters: Vec<Registered<dyn GetterRuleProvider>>,
    equality: Vec<Registered<dyn EqualityRuleProvider>>,
    hash: Vec<Registered<dyn HashRuleProvider>>,
    text: Vec<Registered<dyn ToStringRuleProvider>>,
    other: Vec<Registered<dyn OtherRuleProvider>>,
    seq: usize,
}

static STANDARD: Lazy<Registry> = Lazy::new(Registry::with_defaults);

fn insert<P: ?Sized>(list: &mut Vec<Registered<P>>, seq: &mut usize, precedence: i32, provider: Box<P>) {
    list.push(Registered { precedence, seq: *seq, provider });
    *seq += 1;
    list.sort_by_key(|r| (r.precedence, r.seq));
}

fn decide<P: ?Sized, T>(list: &[Registered<P>], mut ask: impl FnMut(&P) -> Answer<T>) -> Answer<T> {
    for r in list {
        match ask(r.provider.as_ref()) {
            Answer::Defer => continue,
            decided => return decided,
        }
    }
    Answer::Defer
}

impl Registry {
    /// A registry without any provider.
    pub fn empty() -> Self {
        Self::default()
    }

    /// The built-in providers, as a fresh registry callers may extend.
    pub fn with_defaults() -> Self {
        let mut r = Self::empty();
        defaults::install(&mut r);
        r
    }

    /// Shared built-in registry, initialized on first use and never mutated.
    pub fn standard() -> &'static Registry {
        &STANDARD
    }

    pub fn doc(&mut self, precedence: i32, p: impl DocRuleProvider + 'static) -> &mut Self {
        insert(&mut self.docs, &mut self.seq, precedence, Box::new(p));
        self
    }

    pub fn field(&mut self, precedence: i32, p: impl FieldRuleProvider + 'static) -> &mut Self {
        insert(&mut self.fields, &mut self.seq, precedence, Box::new(p));
        self
    }

    pub fn argument(&mut self, precedence: i32, p: impl ConstructorArgumentRuleProvider + 'static) -> &mut Self {
        insert(&mut self.arguments, &mut self.seq, precedence, Box::new(p));
        self
    }

    pub fn getter(&mut self, precedence: i32, p: impl GetterRuleProvider + 'static) -> &mut Self {
        insert(&mut self.getters, &mut self.seq, precedence, Box::new(p));
        self
    }

    pub fn equality(&mut self, precedence: i32, p: impl EqualityRuleProvider + 'static) -> &mut Self {
        insert(&mut self.equality, &mut self.seq, precedence, Box::new(p));
        self
    }

    pub fn hash(&mut self, precedence: i32, p: impl HashRuleProvider + 'static) -> &mut Self {
        insert(&mut self.hash, &mut self.seq, precedence, Box::new(p));
        self
    }

    pub fn text(&mut self, precedence: i32, p: impl ToStringRuleProvider + 'static) -> &mut Self {
        insert(&mut self.text, &mut self.seq, precedence, Box::new(p));
        self
    }

    pub fn other(&mut self, precedence: i32, p: impl OtherRuleProvider + 'static) -> &mut Self {
        insert(&mut self.other, &mut self.seq, precedence, Box::new(p));
        self
    }

    pub fn len(&self) -> usize {
        self.docs.len()
            + self.fields.len()
            + self.arguments.len()
            + self.getters.len()
            + self.equality.len()
            + self.hash.len()
            + self.text.len()
            + self.other.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ————————————————————————————————————————————————————————————————————————————
// PIPELINE
// ————————————————————————————————————————————————————————————————————————————

/// Build the plan of a structure or union by running every stage in order.
/// Any error discards the partial plan.
pub fn build_composite(cx: &mut GenerationContext<'_>) -> Result<TypePlan, GenError> {
    let shape = cx.shape;
    let kind = match &shape.kind {
        ShapeKind::Union { .. } => PlanKind::Union,
        _ => PlanKind::Structure,
    };
    let constraints = cx.resolver().resolve(shape)?;
    let relation = span::validate(shape, cx.model)?;
    let mut members = Vec::new();
    for m in shape.members() {
        members.push(cx.member(m)?);
    }
    let registry = cx.registry;
    let tcx = TypeContext {
        shape,
        model: cx.model,
        settings: cx.settings,
        constraints: &constraints,
        members: &members,
        span: relation.as_ref(),
    };
    let mut plan = TypePlan::new(shape.id.clone(), kind, constraints.clone());
    let no_provider = |stage: &'static str, member: &MemberContext| ConsistencyError::NoProvider {
        shape: shape.id.clone(),
        stage,
        member: member.name().to_string(),
    };

    // ---- documentation ---- //
    if let Answer::Use(doc) = decide(&registry.docs, |p| p.doc(&tcx)) {
        plan.doc = doc;
    }

    // ---- fields ---- //
    for m in &members {
        match decide(&registry.fields, |p| p.field(&tcx, m)) {
            Answer::Use(field) => {
                if plan.field(&field.name).is_some() {
                    return Err(ConsistencyError::DuplicateField { shape: shape.id.clone(), field: field.name }.into());
                }
                trace!(shape = %shape.id, field = %field.name, "field");
                plan.fields.push(field);
            }
            Answer::Skip => {}
            Answer::Defer => return Err(no_provider("fields", m).into()),
        }
    }
    debug!(shape = %shape.id, fields = plan.fields.len(), "fields stage");

    // ---- constructors ---- //
    for kind in constructors::plan(&members, cx.settings) {
        plan.constructors.push(build_constructor(&tcx, registry, kind)?);
    }
    debug!(shape = %shape.id, constructors = plan.constructors.len(), "constructors stage");

    // ---- accessors ---- //
    for field in &plan.fields {
        let Some(m) = tcx.member(&field.member) else { continue };
        match decide(&registry.getters, |p| p.getter(&tcx, m, field)) {
            Answer::Use(accessor) => plan.accessors.push(accessor),
            Answer::Skip => {}
            Answer::Defer => return Err(no_provider("accessors", m).into()),
        }
    }

    // ---- hash ---- //
    for m in &members {
        if let Answer::Use(term) = decide(&registry.hash, |p| p.hash(&tcx, m)) {
            plan.hash.push(term);
        }
    }

    // ---- other methods ---- //
    for r in &registry.other {
        plan.methods.extend(r.provider.methods(&tcx));
    }

    // ---- equality ---- //
    for m in &members {
        if let Answer::Use(field) = decide(&registry.equality, |p| p.equality(&tcx, m)) {
            plan.equality.push(field);
        }
    }

    // ---- textual form ---- //
    let mut entries = Vec::new();
    for m in &members {
        if let Answer::Use(entry) = decide(&registry.text, |p| p.text(&tcx, m)) {
            entries.push(entry);
        }
    }
    entries.sort_by(|a, b| a.label.cmp(&b.label));
    plan.text.entries = entries;

    check_equality_matches_hash(&plan)?;

    // ---- default instance ---- //
    if cx.settings.default_instances && kind == PlanKind::Structure && !members.is_empty() {
        if members.iter().all(|m| fully_defaulted(cx.model, m, 0)) {
            plan.default_instance = Some(DefaultInstance {
                name: "DEFAULT".to_string(),
                values: members
                    .iter()
                    .filter_map(|m| m.default_value().map(|v| (m.field.clone(), v.clone())))
                    .collect(),
            });
        }
    }

    plan.references = cx.references();
    debug!(shape = %shape.id, "composite plan complete");
    Ok(plan)
}

fn build_constructor(
    tcx: &TypeContext<'_>,
    registry: &Registry,
    kind: ConstructorKind,
) -> Result<ConstructorPlan, GenError> {
    let mut params = Vec::new();
    let mut guards = Vec::new();
    let mut assignments = Vec::new();
    for m in tcx.members {
        match decide(&registry.arguments, |p| p.argument(tcx, m, kind)) {
            Answer::Use(rule) => {
                params.push(rule.param);
                guards.extend(rule.guards);
                assignments.push(rule.assignment);
            }
            Answer::Skip => {}
            Answer::Defer => {
                return Err(ConsistencyError::NoProvider {
                    shape: tcx.shape.id.clone(),
                    stage: "constructors",
                    member: m.name().to_string(),
                }
                .into());
            }
        }
    }
    for r in &registry.arguments {
        guards.extend(r.provider.constructor_guards(tcx, kind));
    }
    let ctor = ConstructorPlan {
        kind,
        name: kind.method_name().to_string(),
        params,
        guards: constructors::order_guards(guards),
        assignments,
    };
    check_arguments_assigned(&tcx.shape.id, &ctor)?;
    Ok(ctor)
}

/// Every parameter must flow into some assignment.
pub fn check_arguments_assigned(shape: &ShapeId, ctor: &ConstructorPlan) -> Result<(), ConsistencyError> {
    for param in &ctor.params {
        let used = ctor.assignments.iter().any(|a| a.source.params().contains(&param.name.as_str()));
        if !used {
            return Err(ConsistencyError::UnassignedArgument {
                shape: shape.clone(),
                constructor: ctor.name.clone(),
                argument: param.name.clone(),
            });
        }
    }
    Ok(())
}

/// Equality and hash must cover the same fields in the same order.
pub fn check_equality_matches_hash(plan: &TypePlan) -> Result<(), ConsistencyError> {
    let hashed: Vec<String> = plan.hash.iter().map(|t| t.field.clone()).collect();
    if hashed != plan.equality {
        return Err(ConsistencyError::EqualityHashMismatch {
            shape: plan.shape.clone(),
            equality: plan.equality.clone(),
            hash: hashed,
        });
    }
    Ok(())
}

const MAX_DEFAULT_DEPTH: usize = 16;

/// A member carries a default, and so does every member of a composite it targets.
fn fully_defaulted(model: &Model, m: &MemberContext, depth: usize) -> bool {
    m.member.has_default() && target_defaulted(model, &m.member.target, depth)
}

fn target_defaulted(model: &Model, id: &ShapeId, depth: usize) -> bool {
    if depth > MAX_DEFAULT_DEPTH {
        return false;
    }
    match model.get(id).map(|s| &s.kind) {
        Some(ShapeKind::Structure { members }) => members
            .iter()
            .all(|m| m.has_default() && target_defaulted(model, &m.target, depth + 1)),
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guard::{Condition, Subject};
    use crate::plan::AccessorStyle;
    use crate::shape::{Member, Trait};
    use serde_json::json;

    fn person() -> ShapeDescriptor {
        ShapeDescriptor::new(
            "ex#Person",
            ShapeKind::Structure {
                members: vec![
                    Member::new("name", ShapeId::prelude("String"))
                        .with_trait(Trait::Required)
                        .with_trait(Trait::Pattern("^[A-Z][a-z]+$".into())),
                    Member::new("age", ShapeId::prelude("Short")).with_trait(Trait::Default(json!(0))),
                    Member::new("nickName", ShapeId::prelude("String")),
                ],
            },
        )
    }

    fn build(shape: &ShapeDescriptor, model: &Model, registry: &Registry) -> Result<TypePlan, GenError> {
        let settings = GenerationSettings::default();
        let mut cx = GenerationContext::new(model, &settings, registry, shape);
        build_composite(&mut cx)
    }

    #[test]
    fn standard_pipeline_builds_every_stage() {
        let shape = person();
        let model = Model::new().with(shape.clone());
        let plan = build(&shape, &model, Registry::standard()).unwrap();
        let fields: Vec<_> = plan.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(fields, vec!["name", "age", "nick_name"]);
        assert_eq!(
            plan.constructors.iter().map(|c| c.kind).collect::<Vec<_>>(),
            vec![ConstructorKind::Canonical, ConstructorKind::WithWidenedPrimitives]
        );
        assert_eq!(plan.equality, vec!["name", "age", "nick_name"]);
        assert_eq!(plan.hash.len(), 3);
        assert_eq!(plan.accessor("nick_name").map(|a| &a.style), Some(&AccessorStyle::Optional));
        assert!(matches!(plan.accessor("age").map(|a| &a.style), Some(AccessorStyle::Direct { default: Some(_) })));
        assert!(plan.method("to_json").is_some());
        assert!(plan.default_instance.is_none());
        let labels: Vec<_> = plan.text.entries.iter().map(|e| e.label.as_str()).collect();
        assert_eq!(labels, vec!["age", "name", "nickName"]);
    }

    #[test]
    fn canonical_guards_put_null_checks_first() {
        let shape = person();
        let model = Model::new().with(shape.clone());
        let plan = build(&shape, &model, Registry::standard()).unwrap();
        let canonical = plan.canonical().unwrap();
        assert!(matches!(
            &canonical.guards[0].condition,
            Condition::NotNull { subject: Subject::Param(p) } if p == "name"
        ));
    }

    struct SkipHash;

    impl HashRuleProvider for SkipHash {
        fn hash(&self, _: &TypeContext<'_>, m: &MemberContext) -> Answer<HashTerm> {
            if m.name() == "age" { Answer::Skip } else { Answer::Defer }
        }
    }

    #[test]
    fn hash_without_equality_is_a_consistency_error() {
        let shape = person();
        let model = Model::new().with(shape.clone());
        let mut registry = Registry::with_defaults();
        registry.hash(DEFAULT_PRECEDENCE - 1, SkipHash);
        let err = build(&shape, &model, &registry).unwrap_err();
        assert!(matches!(err, GenError::Consistency(ConsistencyError::EqualityHashMismatch { .. })), "{err}");
        assert_eq!(err.shape().as_str(), "ex#Person");
    }

    struct DroppedAssignment;

    impl ConstructorArgumentRuleProvider for DroppedAssignment {
        fn argument(&self, _: &TypeContext<'_>, m: &MemberContext, _: ConstructorKind) -> Answer<ArgumentRule> {
            Answer::Use(ArgumentRule {
                param: Param { name: m.field.clone(), ty: m.ty.clone(), narrows_to: None, optional: true },
                guards: Vec::new(),
                assignment: Assignment {
                    field: m.field.clone(),
                    source: crate::plan::ValueSource::Param { name: "elsewhere".into() },
                },
            })
        }
    }

    #[test]
    fn unassigned_argument_is_a_consistency_error() {
        let shape = person();
        let model = Model::new().with(shape.clone());
        let mut registry = Registry::with_defaults();
        registry.argument(0, DroppedAssignment);
        let err = build(&shape, &model, &registry).unwrap_err();
        assert!(matches!(err, GenError::Consistency(ConsistencyError::UnassignedArgument { .. })), "{err}");
    }

    #[test]
    fn empty_registry_reports_missing_provider() {
        let shape = person();
        let model = Model::new().with(shape.clone());
        let err = build(&shape, &model, &Registry::empty()).unwrap_err();
        assert!(matches!(err, GenError::Consistency(ConsistencyError::NoProvider { stage: "fields", .. })));
    }

    #[test]
    fn precedence_orders_providers_not_registration() {
        struct Named(&'static str);
        impl DocRuleProvider for Named {
            fn doc(&self, _: &TypeContext<'_>) -> Answer<Vec<String>> {
                Answer::Use(vec![self.0.to_string()])
            }
        }
        let shape = person();
        let model = Model::new().with(shape.clone());
        let mut registry = Registry::with_defaults();
        registry.doc(50, Named("late but preferred")).doc(60, Named("ignored"));
        let plan = build(&shape, &model, &registry).unwrap();
        assert_eq!(plan.doc, vec!["late but preferred".to_string()]);
    }

    #[test]
    fn default_instance_needs_transitive_defaults() {
        let inner = ShapeDescriptor::new(
            "ex#Inner",
            ShapeKind::Structure {
                members: vec![Member::new("x", ShapeId::prelude("Integer")).with_trait(Trait::Default(json!(1)))],
            },
        );
        let outer = ShapeDescriptor::new(
            "ex#Outer",
            ShapeKind::Structure {
                members: vec![
                    Member::new("inner", "ex#Inner").with_trait(Trait::Default(json!({"x": 1}))),
                    Member::new("flag", ShapeId::prelude("Boolean")).with_trait(Trait::Default(json!(false))),
                ],
            },
        );
        let model = Model::new().with(inner.clone()).with(outer.clone());
        let plan = build(&outer, &model, Registry::standard()).unwrap();
        let default = plan.default_instance.expect("default instance");
        assert_eq!(default.values.len(), 2);
        assert_eq!(plan.references, vec![ShapeId::new("ex#Inner")]);

        let shallow = ShapeDescriptor::new(
            "ex#Inner",
            ShapeKind::Structure { members: vec![Member::new("x", ShapeId::prelude("Integer"))] },
        );
        let model = Model::new().with(shallow).with(outer.clone());
        assert!(build(&outer, &model, Registry::standard()).unwrap().default_instance.is_none());
    }

    #[test]
    fn span_contributes_guard_and_methods() {
        let shape = ShapeDescriptor::new(
            "ex#Window",
            ShapeKind::Structure {
                members: vec![
                    Member::new("start", ShapeId::prelude("Integer")).with_trait(Trait::Required),
                    Member::new("end", ShapeId::prelude("Integer")).with_trait(Trait::Required),
                ],
            },
        )
        .with_trait(Trait::Span { lesser: "start".into(), greater: "end".into(), empty_allowed: false });
        let model = Model::new().with(shape.clone());
        let plan = build(&shape, &model, Registry::standard()).unwrap();
        let canonical = plan.canonical().unwrap();
        assert!(matches!(canonical.guards.last().map(|c| &c.condition), Some(Condition::Ordered { .. })));
        assert!(plan.method("is_empty_span").is_some());
        assert!(plan.method("size").is_some());
    }
}
