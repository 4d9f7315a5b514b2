//! TypePlan: everything decided about one generated type, as plain data.
//!
//! A plan is built by one generation pass and is immutable once handed to an
//! emission backend or to the reference realization in [`crate::instance`].
use serde::Serialize;
use serde_json::Value;

use crate::constraints::ConstraintSet;
use crate::constructors::ConstructorKind;
use crate::guard::{Check, GuardPlan};
use crate::shape::{Model, NumberKind, ShapeId, ShapeKind};

// ————————————————————————————————————————————————————————————————————————————
// TYPE REFERENCES
// ————————————————————————————————————————————————————————————————————————————

/// Type of a field or parameter as the target language sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum TypeRef {
    Boolean,
    Number { kind: NumberKind },
    Text,
    Timestamp,
    List { element: Box<TypeRef> },
    Set { element: Box<TypeRef> },
    Map { key: Box<TypeRef>, value: Box<TypeRef> },
    /// Another generated type.
    Named { id: ShapeId },
}

impl TypeRef {
    /// Prelude shapes map to primitives; everything the schema declares is named.
    pub fn of(model: &Model, id: &ShapeId) -> TypeRef {
        if !id.is_prelude() {
            return TypeRef::Named { id: id.clone() };
        }
        match model.get(id).map(|s| &s.kind) {
            Some(ShapeKind::Boolean) => TypeRef::Boolean,
            Some(ShapeKind::Number(kind)) => TypeRef::Number { kind: *kind },
            Some(ShapeKind::Timestamp) => TypeRef::Timestamp,
            _ => TypeRef::Text,
        }
    }

    pub fn number_kind(&self) -> Option<NumberKind> {
        match self {
            TypeRef::Number { kind } => Some(*kind),
            _ => None,
        }
    }

    /// The convenience type a constructor may accept instead of this one.
    pub fn widened(&self) -> Option<TypeRef> {
        self.number_kind().and_then(NumberKind::widened).map(|kind| TypeRef::Number { kind })
    }

    /// Whether the textual form quotes values of this type.
    pub fn is_quoted(&self) -> bool {
        matches!(self, TypeRef::Text | TypeRef::Timestamp)
    }
}

// ————————————————————————————————————————————————————————————————————————————
// PARTS
// ————————————————————————————————————————————————————————————————————————————

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum PlanKind {
    /// A constrained wrapper around one scalar value.
    Scalar,
    Enum,
    List,
    Set,
    Map,
    Union,
    Structure,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldPlan {
    pub name: String,
    /// Member the field stores.
    pub member: String,
    pub json_name: String,
    pub ty: TypeRef,
    /// Neither required nor defaulted: may be absent.
    pub optional: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    pub constraints: ConstraintSet,
    pub weight: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Param {
    pub name: String,
    pub ty: TypeRef,
    /// Narrow type the argument is converted to, for widened parameters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub narrows_to: Option<NumberKind>,
    pub optional: bool,
}

/// Where an assigned field value comes from.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", tag = "source")]
pub enum ValueSource {
    Param { name: String },
    /// Parameter converted to a narrower number kind (already range-checked),
    /// or the schema default when the argument is absent.
    Narrowed {
        name: String,
        kind: NumberKind,
        #[serde(skip_serializing_if = "Option::is_none")]
        default: Option<Value>,
    },
    /// Parameter, or the schema default when the argument is absent.
    ParamOrDefault { name: String, default: Value },
    /// Individual parameters gathered into one collection.
    Collect { names: Vec<String> },
    /// Parameters gathered pairwise (`k0, v0, k1, v1, ...`) into a map.
    CollectPairs { names: Vec<String> },
    Empty,
}

impl ValueSource {
    pub fn params(&self) -> Vec<&str> {
        match self {
            ValueSource::Param { name } | ValueSource::Narrowed { name, .. } | ValueSource::ParamOrDefault { name, .. } => {
                vec![name.as_str()]
            }
            ValueSource::Collect { names } | ValueSource::CollectPairs { names } => {
                names.iter().map(String::as_str).collect()
            }
            ValueSource::Empty => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Assignment {
    pub field: String,
    pub source: ValueSource,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConstructorPlan {
    pub kind: ConstructorKind,
    pub name: String,
    pub params: Vec<Param>,
    /// Ordered cheapest first; `After` checks run once the fields are assigned.
    pub guards: Vec<Check>,
    pub assignments: Vec<Assignment>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", tag = "style")]
pub enum AccessorStyle {
    /// Absent/present wrapper.
    Optional,
    /// Plain value; falls back to `default` when nothing is stored.
    Direct {
        #[serde(skip_serializing_if = "Option::is_none")]
        default: Option<Value>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessorPlan {
    pub name: String,
    pub field: String,
    pub ty: TypeRef,
    pub style: AccessorStyle,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HashTerm {
    pub field: String,
    pub prime: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TextEntry {
    pub label: String,
    pub field: String,
    pub quoted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TextualForm {
    pub type_name: String,
    pub entries: Vec<TextEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "method")]
pub enum MethodKind {
    /// `lesser == greater`.
    IsEmptySpan { lesser: String, greater: String },
    /// `greater - lesser` in `ty`.
    SpanSize { lesser: String, greater: String, ty: NumberKind },
    /// Serialized form as a JSON value.
    ToJson,
    /// Container emptiness.
    IsEmpty,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MethodPlan {
    pub name: String,
    pub kind: MethodKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doc: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DefaultInstance {
    pub name: String,
    pub values: Vec<(String, Value)>,
}

// ————————————————————————————————————————————————————————————————————————————
// TYPE PLAN
// ————————————————————————————————————————————————————————————————————————————

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TypePlan {
    pub shape: ShapeId,
    pub name: String,
    pub kind: PlanKind,
    pub doc: Vec<String>,
    pub constraints: ConstraintSet,
    pub fields: Vec<FieldPlan>,
    pub constructors: Vec<ConstructorPlan>,
    pub accessors: Vec<AccessorPlan>,
    /// Guarded mutators of containers.
    pub mutators: Vec<GuardPlan>,
    /// Fields compared by equality, in comparison order.
    pub equality: Vec<String>,
    pub hash: Vec<HashTerm>,
    pub text: TextualForm,
    pub methods: Vec<MethodPlan>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_instance: Option<DefaultInstance>,
    /// Other generated types this one refers to.
    pub references: Vec<ShapeId>,
}

impl TypePlan {
    pub fn new(shape: ShapeId, kind: PlanKind, constraints: ConstraintSet) -> Self {
        let name = shape.name().to_string();
        Self {
            text: TextualForm { type_name: name.clone(), entries: Vec::new() },
            shape,
            name,
            kind,
            doc: Vec::new(),
            constraints,
            fields: Vec::new(),
            constructors: Vec::new(),
            accessors: Vec::new(),
            mutators: Vec::new(),
            equality: Vec::new(),
            hash: Vec::new(),
            methods: Vec::new(),
            default_instance: None,
            references: Vec::new(),
        }
    }

    pub fn field(&self, name: &str) -> Option<&FieldPlan> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn constructor(&self, kind: ConstructorKind) -> Option<&ConstructorPlan> {
        self.constructors.iter().find(|c| c.kind == kind)
    }

    pub fn canonical(&self) -> Option<&ConstructorPlan> {
        self.constructor(ConstructorKind::Canonical)
    }

    pub fn accessor(&self, field: &str) -> Option<&AccessorPlan> {
        self.accessors.iter().find(|a| a.field == field)
    }

    pub fn mutator(&self, op: crate::guard::Operation) -> Option<&GuardPlan> {
        self.mutators.iter().find(|m| m.operation == op)
    }

    pub fn method(&self, name: &str) -> Option<&MethodPlan> {
        self.methods.iter().find(|m| m.name == name)
    }
}
