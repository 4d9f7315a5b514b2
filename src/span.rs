//! Cross-field "span" relations: one numeric member bounded by another.
use serde::Serialize;
use tracing::debug;

use crate::error::SchemaError;
use crate::guard::{Check, Condition};
use crate::plan::{MethodKind, MethodPlan};
use crate::shape::{Member, Model, NumberKind, ShapeDescriptor, ShapeKind, Trait, TraitKind};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpanRelation {
    pub lesser: String,
    pub greater: String,
    pub empty_allowed: bool,
    /// Number kind shared by both members.
    pub kind: NumberKind,
}

/// Validate the span relation declared on `shape`, if any.
///
/// Both members must exist, target the same numeric type, and never be
/// absent (required or defaulted); otherwise the relation could not be
/// enforced and the schema is rejected.
pub fn validate(shape: &ShapeDescriptor, model: &Model) -> Result<Option<SpanRelation>, SchemaError> {
    let Some(Trait::Span { lesser, greater, empty_allowed }) = shape.get_trait(TraitKind::Span) else {
        return Ok(None);
    };
    let invalid = |reason: String| SchemaError::InvalidSpan { shape: shape.id.clone(), reason };
    if !matches!(shape.kind, ShapeKind::Structure { .. }) {
        return Err(invalid(format!("only structures can declare a span, not a {}", shape.kind.label())));
    }
    if lesser == greater {
        return Err(invalid(format!("`{lesser}` cannot bound itself")));
    }
    let find = |name: &str| -> Result<&Member, SchemaError> {
        shape
            .find_member(name)
            .ok_or_else(|| invalid(format!("member `{name}` does not exist")))
    };
    let (lo, hi) = (find(lesser)?, find(greater)?);

    let kind_of = |m: &Member| -> Result<NumberKind, SchemaError> {
        match &model.expect(&m.target, &shape.id)?.kind {
            ShapeKind::Number(kind) => Ok(*kind),
            other => Err(invalid(format!("member `{}` is a {}, not a number", m.name, other.label()))),
        }
    };
    let (lo_kind, hi_kind) = (kind_of(lo)?, kind_of(hi)?);
    if lo.target != hi.target || lo_kind != hi_kind {
        return Err(invalid(format!(
            "`{}` ({}) and `{}` ({}) have different types",
            lo.name, lo.target, hi.name, hi.target
        )));
    }
    for m in [lo, hi] {
        if !m.is_required() && !m.has_default() {
            return Err(invalid(format!("member `{}` must be required or have a default", m.name)));
        }
    }
    let relation = SpanRelation {
        lesser: lesser.clone(),
        greater: greater.clone(),
        empty_allowed: *empty_allowed,
        kind: lo_kind,
    };
    debug!(shape = %shape.id, ?relation, "validated span");
    Ok(Some(relation))
}

impl SpanRelation {
    /// Constructor guard over the fields storing the two members.
    pub fn guard(&self, lesser_field: &str, greater_field: &str) -> Check {
        let op = if self.empty_allowed { "<=" } else { "<" };
        Check::before(
            Condition::Ordered {
                lesser: lesser_field.to_string(),
                greater: greater_field.to_string(),
                allow_equal: self.empty_allowed,
            },
            format!("`{}` must be {op} `{}`", self.lesser, self.greater),
        )
    }

    /// Derived accessors: emptiness and `greater - lesser`.
    pub fn methods(&self, lesser_field: &str, greater_field: &str) -> Vec<MethodPlan> {
        vec![
            MethodPlan {
                name: "is_empty_span".to_string(),
                kind: MethodKind::IsEmptySpan { lesser: lesser_field.to_string(), greater: greater_field.to_string() },
                doc: Some(format!("Whether `{}` equals `{}`.", self.lesser, self.greater)),
            },
            MethodPlan {
                name: "size".to_string(),
                kind: MethodKind::SpanSize {
                    lesser: lesser_field.to_string(),
                    greater: greater_field.to_string(),
                    ty: self.kind.difference_kind(),
                },
                doc: Some(format!("`{}` minus `{}`.", self.greater, self.lesser)),
            },
        ]
    }
}
