//! Constraint model: a shape's declared traits normalized into effective bounds.
//!
//! Resolution is pure; it reads the shape graph and never mutates it, so
//! independent shapes may be resolved concurrently.
pub mod pattern;
pub mod range;
pub mod size;

use serde::Serialize;
use serde_json::Value;
use tracing::trace;

use crate::datum::Datum;
use crate::error::SchemaError;
use crate::shape::{Member, Model, NumberKind, ShapeDescriptor, ShapeId, ShapeKind, Trait, TraitKind, Traits};

pub use pattern::Pattern;
pub use range::RangeBounds;
pub use size::SizeBounds;

// ------------------------------- Policy ---------------------------------- //

/// Containers nested deeper than this are treated as a malformed (recursive) schema.
const MAX_NESTING: usize = 32;

// ------------------------------- Types ----------------------------------- //

/// Value domain of a constraint set, i.e. which checks can apply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "domain")]
pub enum Domain {
    Boolean,
    Number { kind: NumberKind },
    Text,
    Timestamp,
    List,
    Set,
    Map,
    Enum { variants: Vec<String> },
    Union,
    Structure,
}

impl Domain {
    pub fn is_collection(&self) -> bool {
        matches!(self, Domain::List | Domain::Set)
    }

    pub fn is_container(&self) -> bool {
        matches!(self, Domain::List | Domain::Set | Domain::Map)
    }

    pub fn number_kind(&self) -> Option<NumberKind> {
        match self {
            Domain::Number { kind } => Some(*kind),
            _ => None,
        }
    }
}

/// Fully resolved constraints of one shape or member.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConstraintSet {
    pub shape: ShapeId,
    pub domain: Domain,
    pub size: SizeBounds,
    pub range: RangeBounds,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern: Option<Pattern>,
    /// Element constraints for lists and sets, value constraints for maps.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub member: Option<Box<ConstraintSet>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<Box<ConstraintSet>>,
    pub required: bool,
    pub allow_non_finite: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

/// A single scalar check, as applied to a member, element, key or value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", tag = "check")]
pub enum ValueCheck {
    Finite,
    Representable { kind: NumberKind },
    MinValue { limit: f64 },
    MaxValue { limit: f64 },
    MinLength { limit: u64 },
    MaxLength { limit: u64 },
    OneOf { variants: Vec<String> },
    Pattern { pattern: Pattern },
}

impl ValueCheck {
    /// Relative cost, used only for ordering.
    pub fn cost(&self) -> u32 {
        match self {
            ValueCheck::Finite => 1,
            ValueCheck::Representable { .. } => 1,
            ValueCheck::MinValue { .. } | ValueCheck::MaxValue { .. } => 2,
            ValueCheck::MinLength { .. } | ValueCheck::MaxLength { .. } => 3,
            ValueCheck::OneOf { variants } => 4 + variants.len() as u32 / 4,
            ValueCheck::Pattern { pattern } => pattern.cost(),
        }
    }

    pub fn test(&self, d: &Datum) -> bool {
        match self {
            ValueCheck::Finite => !matches!(d, Datum::Float(f) if !f.0.is_finite()),
            ValueCheck::Representable { kind } => match (d, kind.representable()) {
                (Datum::Int(i), Some((lo, hi))) => (lo as i128..=hi as i128).contains(&i128::from(*i)),
                // NaN and the infinities exist in every floating kind; finiteness is a separate check
                (Datum::Float(f), Some(_)) if !kind.is_integral() && !f.0.is_finite() => true,
                (Datum::Float(f), Some((lo, hi))) => {
                    f.0 >= lo && f.0 <= hi && (!kind.is_integral() || f.0.fract() == 0.0)
                }
                _ => true,
            },
            ValueCheck::MinValue { limit } => match d {
                Datum::Int(i) => i128::from(*i) >= limit.ceil() as i128,
                _ => d.as_f64().is_none_or(|v| v >= *limit),
            },
            ValueCheck::MaxValue { limit } => match d {
                Datum::Int(i) => i128::from(*i) <= limit.floor() as i128,
                _ => d.as_f64().is_none_or(|v| v <= *limit),
            },
            ValueCheck::MinLength { limit } => d.len().is_none_or(|n| n >= *limit),
            ValueCheck::MaxLength { limit } => d.len().is_none_or(|n| n <= *limit),
            ValueCheck::OneOf { variants } => d.as_str().is_none_or(|s| variants.iter().any(|v| v == s)),
            ValueCheck::Pattern { pattern } => d.as_str().is_none_or(|s| pattern.is_match(s)),
        }
    }

    /// Human readable description of what the check requires.
    pub fn describe(&self) -> String {
        match self {
            ValueCheck::Finite => "must be a finite number".to_string(),
            ValueCheck::Representable { kind } => format!("must fit in a {kind}"),
            ValueCheck::MinValue { limit } => format!("must be at least {limit}"),
            ValueCheck::MaxValue { limit } => format!("must be at most {limit}"),
            ValueCheck::MinLength { limit } => format!("must have a length of at least {limit}"),
            ValueCheck::MaxLength { limit } => format!("must have a length of at most {limit}"),
            ValueCheck::OneOf { variants } => format!("must be one of {}", variants.join(", ")),
            ValueCheck::Pattern { pattern } => format!("must match the pattern {pattern}"),
        }
    }

    pub fn limit(&self) -> String {
        match self {
            ValueCheck::Finite => "finite".to_string(),
            ValueCheck::Representable { kind } => kind.to_string(),
            ValueCheck::MinValue { limit } | ValueCheck::MaxValue { limit } => limit.to_string(),
            ValueCheck::MinLength { limit } | ValueCheck::MaxLength { limit } => limit.to_string(),
            ValueCheck::OneOf { variants } => variants.join("|"),
            ValueCheck::Pattern { pattern } => pattern.source().to_string(),
        }
    }
}

impl ConstraintSet {
    pub fn min_size(&self) -> u64 {
        self.size.min
    }

    /// `u64::MAX` stands in for an unbounded maximum.
    pub fn max_size(&self) -> u64 {
        self.size.max.unwrap_or(u64::MAX)
    }

    pub fn has_max_size(&self) -> bool {
        self.size.max.is_some()
    }

    pub fn min_value(&self) -> Option<f64> {
        self.range.min.map(|m| m.0)
    }

    pub fn max_value(&self) -> Option<f64> {
        self.range.max.map(|m| m.0)
    }

    pub fn member_constraints(&self) -> Option<&ConstraintSet> {
        self.member.as_deref()
    }

    pub fn key_constraints(&self) -> Option<&ConstraintSet> {
        self.key.as_deref()
    }

    pub fn can_be_empty(&self) -> bool {
        self.size.min == 0
    }

    pub fn can_be_single(&self) -> bool {
        self.size.min <= 1
    }

    pub fn needs_size_check(&self) -> bool {
        self.domain.is_container() && self.size.is_bounded()
    }

    pub fn has_member_checks(&self) -> bool {
        self.member.as_ref().is_some_and(|m| !m.value_checks().is_empty())
            || self.key.as_ref().is_some_and(|k| !k.value_checks().is_empty())
    }

    /// Scalar checks applying to a value of this set's domain, cheapest first.
    pub fn value_checks(&self) -> Vec<ValueCheck> {
        let mut out = Vec::new();
        match &self.domain {
            Domain::Number { kind } => {
                if kind.is_floating() && !self.allow_non_finite {
                    out.push(ValueCheck::Finite);
                }
                if let Some(m) = self.range.min {
                    out.push(ValueCheck::MinValue { limit: m.0 });
                }
                if let Some(m) = self.range.max {
                    out.push(ValueCheck::MaxValue { limit: m.0 });
                }
            }
            Domain::Text => {
                if self.size.min > 0 {
                    out.push(ValueCheck::MinLength { limit: self.size.min });
                }
                if let Some(max) = self.size.max {
                    out.push(ValueCheck::MaxLength { limit: max });
                }
                if let Some(p) = &self.pattern {
                    out.push(ValueCheck::Pattern { pattern: p.clone() });
                }
            }
            Domain::Enum { variants } => out.push(ValueCheck::OneOf { variants: variants.clone() }),
            _ => {}
        }
        out.sort_by_key(ValueCheck::cost);
        out
    }

    /// First check `d` fails, if any.
    pub fn first_failure(&self, d: &Datum) -> Option<ValueCheck> {
        self.value_checks().into_iter().find(|c| !c.test(d))
    }
}

// ------------------------------ Resolve ---------------------------------- //

/// Resolves constraint sets against one model.
pub struct Resolver<'m> {
    model: &'m Model,
    allow_non_finite: bool,
}

impl<'m> Resolver<'m> {
    pub fn new(model: &'m Model) -> Self {
        Self { model, allow_non_finite: false }
    }

    /// Accept NaN and infinities for every floating shape, not only opted-in ones.
    pub fn allow_non_finite(mut self, allow: bool) -> Self {
        self.allow_non_finite = allow;
        self
    }

    pub fn resolve(&self, shape: &ShapeDescriptor) -> Result<ConstraintSet, SchemaError> {
        self.resolve_with(&shape.id, shape, &shape.traits, 0)
    }

    /// Constraints of a member: its target's traits overridden by the member's own.
    pub fn resolve_member(&self, owner: &ShapeId, member: &Member) -> Result<ConstraintSet, SchemaError> {
        self.resolve_member_at(owner, member, 0)
    }

    fn resolve_member_at(&self, owner: &ShapeId, member: &Member, depth: usize) -> Result<ConstraintSet, SchemaError> {
        let id = owner.with_member(&member.name);
        let target = self.model.expect(&member.target, &id)?;
        let mut traits = target.traits.clone();
        for t in member.traits.iter() {
            traits.insert(t.clone());
        }
        self.resolve_with(&id, target, &traits, depth)
    }

    fn resolve_with(
        &self,
        id: &ShapeId,
        shape: &ShapeDescriptor,
        traits: &Traits,
        depth: usize,
    ) -> Result<ConstraintSet, SchemaError> {
        if depth > MAX_NESTING {
            return Err(SchemaError::Malformed {
                shape: id.clone(),
                reason: "container nesting too deep (recursive container?)".to_string(),
            });
        }
        let unique = traits.has(TraitKind::UniqueItems);
        let domain = match &shape.kind {
            ShapeKind::Boolean => Domain::Boolean,
            ShapeKind::Number(kind) => Domain::Number { kind: *kind },
            ShapeKind::String => Domain::Text,
            ShapeKind::Timestamp => Domain::Timestamp,
            ShapeKind::List { .. } if unique => Domain::Set,
            ShapeKind::List { .. } => Domain::List,
            ShapeKind::Set { .. } => Domain::Set,
            ShapeKind::Map { .. } => Domain::Map,
            ShapeKind::Enum { variants } => Domain::Enum { variants: variants.clone() },
            ShapeKind::Union { .. } => Domain::Union,
            ShapeKind::Structure { .. } => Domain::Structure,
        };
        check_applicability(id, &shape.kind, traits)?;

        let size = match traits.length() {
            Some((min, max)) => SizeBounds::resolve(id, min, max)?,
            None => SizeBounds::UNBOUNDED,
        };
        let range = match traits.range() {
            Some((min, max)) => RangeBounds::resolve(id, min, max)?,
            None => RangeBounds::default(),
        };
        let pattern = traits.pattern().map(|p| Pattern::compile(id, p)).transpose()?;

        let (member, key) = match &shape.kind {
            ShapeKind::List { member } | ShapeKind::Set { member } => {
                (Some(Box::new(self.resolve_member_at(&shape.id, member, depth + 1)?)), None)
            }
            ShapeKind::Map { key, value } => (
                Some(Box::new(self.resolve_member_at(&shape.id, value, depth + 1)?)),
                Some(Box::new(self.resolve_member_at(&shape.id, key, depth + 1)?)),
            ),
            _ => (None, None),
        };

        let cs = ConstraintSet {
            shape: id.clone(),
            domain,
            size,
            range,
            pattern,
            member,
            key,
            required: traits.has(TraitKind::Required),
            allow_non_finite: self.allow_non_finite || traits.has(TraitKind::NonFinite),
            default: traits.default_value().cloned(),
        };
        if let Some(default) = &cs.default {
            validate_default(&cs, default)?;
        }
        trace!(shape = %id, "resolved constraints");
        Ok(cs)
    }
}

/// Resolve the constraints of `shape` against `model` with default policy.
pub fn resolve(shape: &ShapeDescriptor, model: &Model) -> Result<ConstraintSet, SchemaError> {
    Resolver::new(model).resolve(shape)
}

fn check_applicability(id: &ShapeId, kind: &ShapeKind, traits: &Traits) -> Result<(), SchemaError> {
    let not_applicable = |trait_name: &'static str| SchemaError::TraitNotApplicable {
        shape: id.clone(),
        trait_name,
        kind: kind.label(),
    };
    for t in traits.iter() {
        match (t, kind) {
            (Trait::Length { .. }, ShapeKind::String | ShapeKind::List { .. } | ShapeKind::Set { .. } | ShapeKind::Map { .. }) => {}
            (Trait::Length { .. }, _) => return Err(not_applicable("length")),
            (Trait::Range { .. }, ShapeKind::Number(_)) => {}
            (Trait::Range { .. }, _) => return Err(not_applicable("range")),
            (Trait::Pattern(_), ShapeKind::String) => {}
            (Trait::Pattern(_), _) => return Err(not_applicable("pattern")),
            (Trait::UniqueItems, ShapeKind::List { .. } | ShapeKind::Set { .. }) => {}
            (Trait::UniqueItems, _) => return Err(not_applicable("uniqueItems")),
            (Trait::NonFinite, ShapeKind::Number(k)) if k.is_floating() => {}
            (Trait::NonFinite, _) => return Err(not_applicable("nonFinite")),
            (Trait::Span { .. }, ShapeKind::Structure { .. }) => {}
            (Trait::Span { .. }, _) => return Err(not_applicable("span")),
            _ => {}
        }
    }
    Ok(())
}

fn validate_default(cs: &ConstraintSet, default: &Value) -> Result<(), SchemaError> {
    let invalid = |reason: String| SchemaError::InvalidDefault {
        shape: cs.shape.clone(),
        value: default.to_string(),
        reason,
    };
    let type_ok = match &cs.domain {
        Domain::Boolean => default.is_boolean(),
        Domain::Number { kind } if kind.is_integral() => default.is_i64() || default.is_u64(),
        Domain::Number { .. } => default.is_number(),
        Domain::Text | Domain::Enum { .. } => default.is_string(),
        Domain::Timestamp => match default {
            Value::String(s) => chrono::DateTime::parse_from_rfc3339(s).is_ok(),
            Value::Number(_) => true,
            _ => false,
        },
        Domain::List | Domain::Set => default.is_array(),
        Domain::Map | Domain::Structure | Domain::Union => default.is_object(),
    };
    if !type_ok {
        return Err(invalid(format!("not a valid {:?} value", cs.domain)));
    }
    let datum = Datum::from_json(default);
    if let Some(failed) = cs.first_failure(&datum) {
        return Err(invalid(failed.describe()));
    }
    if cs.domain.is_container() {
        let n = datum.len().unwrap_or(0);
        if !cs.size.admits(n) {
            return Err(invalid(format!("size {n} outside [{}, {}]", cs.min_size(), cs.max_size())));
        }
    }
    if let Some(kind) = cs.domain.number_kind() {
        if !(ValueCheck::Representable { kind }).test(&datum) {
            return Err(invalid(format!("does not fit in a {kind}")));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tags_model() -> Model {
        Model::new().with(
            ShapeDescriptor::new(
                "ex#Tags",
                ShapeKind::List {
                    member: Member::new("member", ShapeId::prelude("String"))
                        .with_trait(Trait::Pattern("^[a-z]+$".into())),
                },
            )
            .with_trait(Trait::Length { min: Some(1), max: Some(3) }),
        )
    }

    #[test]
    fn list_with_member_pattern() {
        let model = tags_model();
        let cs = resolve(model.get(&"ex#Tags".into()).unwrap(), &model).unwrap();
        assert_eq!(cs.domain, Domain::List);
        assert_eq!(cs.min_size(), 1);
        assert_eq!(cs.max_size(), 3);
        assert!(!cs.can_be_empty());
        assert!(cs.can_be_single());
        assert!(cs.needs_size_check());
        assert!(cs.has_member_checks());
        let member = cs.member_constraints().unwrap();
        assert_eq!(member.shape.as_str(), "ex#Tags$member");
        assert_eq!(member.pattern.as_ref().map(Pattern::source), Some("^[a-z]+$"));
    }

    #[test]
    fn unbounded_defaults() {
        let model = Model::new().with(ShapeDescriptor::new(
            "ex#L",
            ShapeKind::List { member: Member::new("member", ShapeId::prelude("Integer")) },
        ));
        let cs = resolve(model.get(&"ex#L".into()).unwrap(), &model).unwrap();
        assert_eq!(cs.min_size(), 0);
        assert_eq!(cs.max_size(), u64::MAX);
        assert!(!cs.needs_size_check());
        assert!(!cs.has_member_checks());
    }

    #[test]
    fn min_over_max_is_schema_error() {
        let model = Model::new().with(
            ShapeDescriptor::new("ex#N", ShapeKind::Number(NumberKind::Integer))
                .with_trait(Trait::Range { min: Some(10.0), max: Some(1.0) }),
        );
        let err = resolve(model.get(&"ex#N".into()).unwrap(), &model).unwrap_err();
        assert!(matches!(err, SchemaError::MinExceedsMax { what: "value", .. }));
    }

    #[test]
    fn pattern_on_number_is_schema_error() {
        let model = Model::new().with(
            ShapeDescriptor::new("ex#N", ShapeKind::Number(NumberKind::Integer))
                .with_trait(Trait::Pattern("^1$".into())),
        );
        let err = resolve(model.get(&"ex#N".into()).unwrap(), &model).unwrap_err();
        assert!(matches!(err, SchemaError::TraitNotApplicable { trait_name: "pattern", .. }));
    }

    #[test]
    fn floats_reject_non_finite_unless_opted_in() {
        let plain = ShapeDescriptor::new("ex#F", ShapeKind::Number(NumberKind::Double));
        let opted = plain.clone().with_trait(Trait::NonFinite);
        let model = Model::new();
        let a = resolve(&plain, &model).unwrap();
        let b = resolve(&opted, &model).unwrap();
        assert_eq!(a.value_checks(), vec![ValueCheck::Finite]);
        assert!(b.value_checks().is_empty());
    }

    #[test]
    fn default_must_satisfy_constraints() {
        let model = Model::new();
        let bad = ShapeDescriptor::new("ex#N", ShapeKind::Number(NumberKind::Byte))
            .with_trait(Trait::Default(json!(300)));
        assert!(matches!(resolve(&bad, &model), Err(SchemaError::InvalidDefault { .. })));
        let ts = ShapeDescriptor::new("ex#T", ShapeKind::Timestamp)
            .with_trait(Trait::Default(json!("not a date")));
        assert!(resolve(&ts, &model).is_err());
        let ok = ShapeDescriptor::new("ex#T", ShapeKind::Timestamp)
            .with_trait(Trait::Default(json!("2024-01-02T03:04:05Z")));
        assert!(resolve(&ok, &model).is_ok());
    }

    #[test]
    fn unique_list_resolves_as_set() {
        let model = Model::new();
        let shape = ShapeDescriptor::new(
            "ex#U",
            ShapeKind::List { member: Member::new("member", ShapeId::prelude("String")) },
        )
        .with_trait(Trait::UniqueItems);
        assert_eq!(resolve(&shape, &model).unwrap().domain, Domain::Set);
    }

    #[test]
    fn checks_sorted_by_cost() {
        let model = Model::new();
        let shape = ShapeDescriptor::new("ex#S", ShapeKind::String)
            .with_trait(Trait::Pattern("^a+$".into()))
            .with_trait(Trait::Length { min: Some(1), max: Some(4) });
        let checks = resolve(&shape, &model).unwrap().value_checks();
        assert!(matches!(checks.last(), Some(ValueCheck::Pattern { .. })));
        assert!(checks.windows(2).all(|w| w[0].cost() <= w[1].cost()));
    }

    #[test]
    fn long_limits_compare_exactly() {
        let max = ValueCheck::MaxValue { limit: 9_007_199_254_740_992.0 };
        assert!(max.test(&Datum::Int(9_007_199_254_740_992)));
        assert!(!max.test(&Datum::Int(9_007_199_254_740_993)));
        let min = ValueCheck::MinValue { limit: 2.5 };
        assert!(!min.test(&Datum::Int(2)));
        assert!(min.test(&Datum::Int(3)));
    }

    #[test]
    fn non_finite_floats_fit_a_narrower_float() {
        let fits = ValueCheck::Representable { kind: NumberKind::Float };
        assert!(fits.test(&Datum::float(f64::NAN)));
        assert!(fits.test(&Datum::float(f64::NEG_INFINITY)));
        assert!(!fits.test(&Datum::float(1e300)));
        let byte = ValueCheck::Representable { kind: NumberKind::Byte };
        assert!(!byte.test(&Datum::float(f64::INFINITY)));
        assert!(!byte.test(&Datum::Int(128)));
    }
}
