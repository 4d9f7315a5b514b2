//! Emission: walk a [`TypePlan`] and drive a language backend.
//!
//! The walk is language neutral. It turns guard plans into [`Statement`]s
//! in the order they must execute and hands declarations to an
//! [`EmissionBackend`], which owns every syntactic decision.
pub mod rust;

use tracing::debug;

use crate::guard::{Check, Condition, FailureTemplate, Operation, Phase, SizeExpr, Subject};
use crate::plan::{
    AccessorStyle, ConstructorPlan, DefaultInstance, FieldPlan, HashTerm, MethodKind, PlanKind, TextualForm,
    TypePlan, TypeRef, ValueSource,
};
use crate::shape::ShapeId;

// ————————————————————————————————————————————————————————————————————————————
// STATEMENTS
// ————————————————————————————————————————————————————————————————————————————

/// What a failure reports as the offending value.
#[derive(Debug, Clone, PartialEq)]
pub enum Offending {
    Nothing,
    /// The would-be size.
    Size(SizeExpr),
    /// The value under test (for `Each*` subjects, the first failing item).
    Subject(Subject),
    /// Both sides of a cross-field relation.
    Pair { lesser: String, greater: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    /// Run `then` when the state matches `violated`.
    If { violated: Condition, then: Vec<Statement> },
    Fail { failure: FailureTemplate, offending: Offending },
    Assign { field: String, source: ValueSource },
    Return(Returned),
    /// Perform the operation itself. `on_result` validates the result of a
    /// caller-supplied function before anything is stored.
    Call { operation: Operation, on_result: Vec<Statement> },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Returned {
    /// The freshly assigned instance.
    Constructed,
    Field { field: String, style: AccessorStyle },
    Method(MethodKind),
    Equality(Vec<String>),
    Hash(Vec<HashTerm>),
    Text(TextualForm),
    Default(DefaultInstance),
}

// ————————————————————————————————————————————————————————————————————————————
// DECLARATIONS
// ————————————————————————————————————————————————————————————————————————————

pub struct ConstructorDecl<'p> {
    pub plan: &'p ConstructorPlan,
    pub body: Vec<Statement>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodRole {
    Accessor,
    Mutator(Operation),
    Auxiliary,
    Equality,
    Hash,
    Text,
    Default,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MethodDecl {
    pub name: String,
    pub role: MethodRole,
    pub doc: Option<String>,
    pub returns: Option<TypeRef>,
    pub body: Vec<Statement>,
}

/// Target-language syntax for one or more generated types.
pub trait EmissionBackend {
    fn begin_type(&mut self, _plan: &TypePlan) {}
    /// Another generated type the current one refers to.
    fn import(&mut self, id: &ShapeId);
    fn declare_field(&mut self, plan: &TypePlan, field: &FieldPlan);
    fn declare_constructor(&mut self, plan: &TypePlan, decl: &ConstructorDecl<'_>);
    fn declare_method(&mut self, plan: &TypePlan, decl: &MethodDecl);
    fn end_type(&mut self, _plan: &TypePlan) {}
}

/// Turns a failure template into the statement that raises it.
pub trait FailureReporter: Send + Sync {
    fn report(&self, shape: &ShapeId, failure: &FailureTemplate, value: Option<&str>) -> String;
}

/// Reports failures as `Err(ValidationFailure)` returns.
#[derive(Debug, Default, Clone, Copy)]
pub struct ResultReporter;

impl FailureReporter for ResultReporter {
    fn report(&self, shape: &ShapeId, failure: &FailureTemplate, value: Option<&str>) -> String {
        let mut out = match value {
            Some(v) => format!(
                "return Err(ValidationFailure::new({:?}, format!(\"{{}}, got {{:?}}\", {:?}, {v})).with_value(format!(\"{{:?}}\", {v}))",
                shape.as_str(),
                failure.message,
            ),
            None => format!("return Err(ValidationFailure::new({:?}, {:?})", shape.as_str(), failure.message),
        };
        if let Some(limit) = &failure.limit {
            out.push_str(&format!(".with_limit({limit:?})"));
        }
        out.push_str(");");
        out
    }
}

// ————————————————————————————————————————————————————————————————————————————
// WALK
// ————————————————————————————————————————————————————————————————————————————

fn offending(condition: &Condition) -> Offending {
    match condition {
        Condition::MaxSize { size, .. } | Condition::MinSize { size, .. } => Offending::Size(*size),
        Condition::Value { subject, .. } => Offending::Subject(subject.clone()),
        Condition::Ordered { lesser, greater, .. } => {
            Offending::Pair { lesser: lesser.clone(), greater: greater.clone() }
        }
        Condition::Always | Condition::NotNull { .. } => Offending::Nothing,
    }
}

/// One `If { .. Fail }` per check.
pub fn guard_statements<'c>(checks: impl IntoIterator<Item = &'c Check>) -> Vec<Statement> {
    checks
        .into_iter()
        .map(|c| Statement::If {
            violated: c.condition.clone(),
            then: vec![Statement::Fail { failure: c.failure.clone(), offending: offending(&c.condition) }],
        })
        .collect()
}

fn is_container(kind: PlanKind) -> bool {
    matches!(kind, PlanKind::List | PlanKind::Set | PlanKind::Map)
}

/// Constructor bodies. Containers gather their contents first so bulk checks
/// can inspect them; composites validate arguments before assigning, and
/// compare related fields once defaults are applied.
pub fn constructor_body(kind: PlanKind, ctor: &ConstructorPlan) -> Vec<Statement> {
    let before = || ctor.guards.iter().filter(|c| c.phase == Phase::Before);
    let is_ordered = |c: &&Check| matches!(c.condition, Condition::Ordered { .. });
    let assigns = ctor
        .assignments
        .iter()
        .map(|a| Statement::Assign { field: a.field.clone(), source: a.source.clone() });
    let mut body = Vec::new();
    if is_container(kind) {
        body.extend(assigns);
        body.extend(guard_statements(before()));
    } else {
        body.extend(guard_statements(before().filter(|c| !is_ordered(c))));
        body.extend(assigns);
        body.extend(guard_statements(before().filter(is_ordered)));
    }
    body.extend(guard_statements(ctor.guards.iter().filter(|c| c.phase == Phase::After)));
    body.push(Statement::Return(Returned::Constructed));
    body
}

/// Render every part of `plan` through `backend`.
pub fn render(plan: &TypePlan, backend: &mut dyn EmissionBackend) {
    backend.begin_type(plan);
    for id in &plan.references {
        backend.import(id);
    }
    for field in &plan.fields {
        backend.declare_field(plan, field);
    }
    for ctor in &plan.constructors {
        let decl = ConstructorDecl { plan: ctor, body: constructor_body(plan.kind, ctor) };
        backend.declare_constructor(plan, &decl);
    }
    for accessor in &plan.accessors {
        backend.declare_method(
            plan,
            &MethodDecl {
                name: accessor.name.clone(),
                role: MethodRole::Accessor,
                doc: None,
                returns: Some(accessor.ty.clone()),
                body: vec![Statement::Return(Returned::Field {
                    field: accessor.field.clone(),
                    style: accessor.style.clone(),
                })],
            },
        );
    }
    for guard in &plan.mutators {
        let mut body = guard_statements(guard.checks_in(Phase::Before));
        body.push(Statement::Call {
            operation: guard.operation,
            on_result: guard_statements(guard.checks_in(Phase::OnResult)),
        });
        let decl = MethodDecl {
            name: guard.operation.method_name().to_string(),
            role: MethodRole::Mutator(guard.operation),
            doc: guard.always_fails().then(|| "Always fails: the schema forbids this change.".to_string()),
            returns: None,
            body,
        };
        backend.declare_method(plan, &decl);
    }
    for method in &plan.methods {
        let decl = MethodDecl {
            name: method.name.clone(),
            role: MethodRole::Auxiliary,
            doc: method.doc.clone(),
            returns: None,
            body: vec![Statement::Return(Returned::Method(method.kind.clone()))],
        };
        backend.declare_method(plan, &decl);
    }
    let simple = |name: &str, role, returned| MethodDecl {
        name: name.to_string(),
        role,
        doc: None,
        returns: None,
        body: vec![Statement::Return(returned)],
    };
    backend.declare_method(plan, &simple("eq", MethodRole::Equality, Returned::Equality(plan.equality.clone())));
    backend.declare_method(plan, &simple("hash_code", MethodRole::Hash, Returned::Hash(plan.hash.clone())));
    backend.declare_method(plan, &simple("fmt", MethodRole::Text, Returned::Text(plan.text.clone())));
    if let Some(default) = &plan.default_instance {
        backend.declare_method(plan, &simple(&default.name, MethodRole::Default, Returned::Default(default.clone())));
    }
    backend.end_type(plan);
    debug!(shape = %plan.shape, "rendered");
}
