//! Estimated validation cost of a shape, used to order checks so cheap ones
//! run first. Never affects which checks exist.
use crate::shape::{Member, Model, NumberKind, ShapeDescriptor, ShapeId, ShapeKind};

/// Fallback for shapes whose cost cannot be estimated (unknown targets, cycles).
pub const UNKNOWN_WEIGHT: f64 = 10.0;

const MAX_DEPTH: usize = 8;

/// Unspecified string length the string weight is scaled against.
const STRING_SCALE: f64 = 512.0;

/// Assumed element count of containers without a length trait.
const DEFAULT_CONTAINER_SPAN: f64 = 16.0;

pub fn weight_of(model: &Model, id: &ShapeId) -> f64 {
    weigh_id(model, id, 0)
}

/// Weight of a member: its target's weight, nudged up when the member adds checks.
pub fn member_weight(model: &Model, member: &Member) -> f64 {
    let base = weight_of(model, &member.target);
    let extra = member.traits.pattern().map(|_| 2.0).unwrap_or(0.0)
        + member.traits.length().map(|_| 0.5).unwrap_or(0.0)
        + member.traits.range().map(|_| 0.25).unwrap_or(0.0);
    base + extra
}

fn weigh_id(model: &Model, id: &ShapeId, depth: usize) -> f64 {
    match model.get(id) {
        Some(shape) if depth < MAX_DEPTH => weigh(model, shape, depth),
        _ => UNKNOWN_WEIGHT,
    }
}

fn weigh(model: &Model, shape: &ShapeDescriptor, depth: usize) -> f64 {
    match &shape.kind {
        ShapeKind::Boolean => 1.0,
        ShapeKind::Number(kind) => match kind {
            NumberKind::Byte | NumberKind::Short | NumberKind::Integer | NumberKind::Float => 2.0,
            NumberKind::Long | NumberKind::Double => 3.0,
            NumberKind::BigInteger | NumberKind::BigDecimal => 6.0,
        },
        ShapeKind::Enum { .. } => 2.0,
        ShapeKind::Timestamp => 9.0,
        ShapeKind::String => {
            let span = length_span(shape, 0.0);
            let base = if span == 0.0 { UNKNOWN_WEIGHT } else { UNKNOWN_WEIGHT * span / STRING_SCALE };
            base + if shape.traits.pattern().is_some() { 4.0 } else { 0.0 }
        }
        ShapeKind::List { member } | ShapeKind::Set { member } => {
            length_span(shape, DEFAULT_CONTAINER_SPAN) * weigh_id(model, &member.target, depth + 1)
        }
        ShapeKind::Map { key, value } => {
            length_span(shape, DEFAULT_CONTAINER_SPAN)
                * (weigh_id(model, &key.target, depth + 1) + weigh_id(model, &value.target, depth + 1))
        }
        ShapeKind::Union { members } => members
            .iter()
            .map(|m| weigh_id(model, &m.target, depth + 1))
            .fold(f64::MIN_POSITIVE, f64::max),
        ShapeKind::Structure { .. } => UNKNOWN_WEIGHT,
    }
}

/// `max - min` of the length trait, clamped to `[1, 32]`.
fn length_span(shape: &ShapeDescriptor, fallback: f64) -> f64 {
    match shape.traits.length() {
        Some((min, max)) => {
            let lo = min.unwrap_or(0);
            let hi = max.unwrap_or(u64::MAX);
            (hi.saturating_sub(lo)).clamp(1, 32) as f64
        }
        None => fallback,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shape::Trait;

    #[test]
    fn primitives_are_cheaper_than_strings_and_containers() {
        let model = Model::new().with(ShapeDescriptor::new(
            "ex#L",
            ShapeKind::List { member: Member::new("member", ShapeId::prelude("String")) },
        ));
        let b = weight_of(&model, &ShapeId::prelude("Boolean"));
        let i = weight_of(&model, &ShapeId::prelude("Integer"));
        let s = weight_of(&model, &ShapeId::prelude("String"));
        let l = weight_of(&model, &"ex#L".into());
        assert!(b < i && i < s && s < l, "{b} {i} {s} {l}");
    }

    #[test]
    fn patterned_member_weighs_more() {
        let model = Model::new();
        let plain = Member::new("a", ShapeId::prelude("String"));
        let patterned = plain.clone().with_trait(Trait::Pattern("^x$".into()));
        assert!(member_weight(&model, &patterned) > member_weight(&model, &plain));
    }

    #[test]
    fn unknown_target_uses_fallback() {
        assert_eq!(weight_of(&Model::new(), &"ex#Missing".into()), UNKNOWN_WEIGHT);
    }
}
