//! Shape graph: the in-memory form of a schema model.
//!
//! Shapes are immutable once the [`Model`] is built; every later phase only
//! borrows them.
use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::SchemaError;

// ————————————————————————————————————————————————————————————————————————————
// IDENTIFIERS
// ————————————————————————————————————————————————————————————————————————————

/// Stable identifier of a shape, `namespace#Name` (or `namespace#Name$member`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShapeId(String);

impl ShapeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn prelude(name: &str) -> Self {
        Self(format!("{PRELUDE_NAMESPACE}#{name}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn namespace(&self) -> &str {
        self.0.split_once('#').map(|(ns, _)| ns).unwrap_or("")
    }

    /// Simple name without namespace or member suffix.
    pub fn name(&self) -> &str {
        let tail = self.0.split_once('#').map(|(_, n)| n).unwrap_or(&self.0);
        tail.split_once('$').map(|(n, _)| n).unwrap_or(tail)
    }

    pub fn with_member(&self, member: &str) -> Self {
        Self(format!("{}${member}", self.0))
    }

    pub fn is_prelude(&self) -> bool {
        self.namespace() == PRELUDE_NAMESPACE
    }
}

impl fmt::Display for ShapeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ShapeId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

pub const PRELUDE_NAMESPACE: &str = "smithy.api";

// ————————————————————————————————————————————————————————————————————————————
// KINDS
// ————————————————————————————————————————————————————————————————————————————

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NumberKind {
    Byte,
    Short,
    Integer,
    Long,
    Float,
    Double,
    BigInteger,
    BigDecimal,
}

impl NumberKind {
    pub const ALL: [NumberKind; 8] = [
        NumberKind::Byte,
        NumberKind::Short,
        NumberKind::Integer,
        NumberKind::Long,
        NumberKind::Float,
        NumberKind::Double,
        NumberKind::BigInteger,
        NumberKind::BigDecimal,
    ];

    pub fn is_integral(self) -> bool {
        matches!(
            self,
            NumberKind::Byte | NumberKind::Short | NumberKind::Integer | NumberKind::Long | NumberKind::BigInteger
        )
    }

    pub fn is_floating(self) -> bool {
        matches!(self, NumberKind::Float | NumberKind::Double)
    }

    /// The convenience type a constructor may accept instead of this one.
    /// Only lossless-with-a-bounds-check widenings qualify.
    pub fn widened(self) -> Option<NumberKind> {
        match self {
            NumberKind::Byte | NumberKind::Short => Some(NumberKind::Integer),
            NumberKind::Float => Some(NumberKind::Double),
            _ => None,
        }
    }

    /// Inclusive bounds representable by the kind, `None` for arbitrary precision.
    pub fn representable(self) -> Option<(f64, f64)> {
        match self {
            NumberKind::Byte => Some((i8::MIN as f64, i8::MAX as f64)),
            NumberKind::Short => Some((i16::MIN as f64, i16::MAX as f64)),
            NumberKind::Integer => Some((i32::MIN as f64, i32::MAX as f64)),
            NumberKind::Long => Some((i64::MIN as f64, i64::MAX as f64)),
            NumberKind::Float => Some((f32::MIN as f64, f32::MAX as f64)),
            NumberKind::Double => Some((f64::MIN, f64::MAX)),
            NumberKind::BigInteger | NumberKind::BigDecimal => None,
        }
    }

    /// Narrowest kind able to hold `greater - lesser` for two values of this kind.
    pub fn difference_kind(self) -> NumberKind {
        match self {
            NumberKind::Byte | NumberKind::Short => NumberKind::Integer,
            NumberKind::Integer | NumberKind::Long => NumberKind::Long,
            other => other,
        }
    }

    pub fn prelude_name(self) -> &'static str {
        match self {
            NumberKind::Byte => "Byte",
            NumberKind::Short => "Short",
            NumberKind::Integer => "Integer",
            NumberKind::Long => "Long",
            NumberKind::Float => "Float",
            NumberKind::Double => "Double",
            NumberKind::BigInteger => "BigInteger",
            NumberKind::BigDecimal => "BigDecimal",
        }
    }

    pub fn parse(name: &str) -> Option<NumberKind> {
        match name {
            "byte" => Some(NumberKind::Byte),
            "short" => Some(NumberKind::Short),
            "integer" => Some(NumberKind::Integer),
            "long" => Some(NumberKind::Long),
            "float" => Some(NumberKind::Float),
            "double" => Some(NumberKind::Double),
            "bigInteger" => Some(NumberKind::BigInteger),
            "bigDecimal" => Some(NumberKind::BigDecimal),
            _ => None,
        }
    }
}

impl fmt::Display for NumberKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prelude_name())
    }
}

/// Closed set of shape kinds. Containers and composites carry their members.
#[derive(Debug, Clone, PartialEq)]
pub enum ShapeKind {
    Boolean,
    Number(NumberKind),
    String,
    Timestamp,
    List { member: Member },
    Set { member: Member },
    Map { key: Member, value: Member },
    Enum { variants: Vec<String> },
    Union { members: Vec<Member> },
    Structure { members: Vec<Member> },
}

impl ShapeKind {
    pub fn label(&self) -> &'static str {
        match self {
            ShapeKind::Boolean => "boolean",
            ShapeKind::Number(_) => "number",
            ShapeKind::String => "string",
            ShapeKind::Timestamp => "timestamp",
            ShapeKind::List { .. } => "list",
            ShapeKind::Set { .. } => "set",
            ShapeKind::Map { .. } => "map",
            ShapeKind::Enum { .. } => "enum",
            ShapeKind::Union { .. } => "union",
            ShapeKind::Structure { .. } => "structure",
        }
    }

    pub fn is_container(&self) -> bool {
        matches!(self, ShapeKind::List { .. } | ShapeKind::Set { .. } | ShapeKind::Map { .. })
    }
}

// ————————————————————————————————————————————————————————————————————————————
// TRAITS
// ————————————————————————————————————————————————————————————————————————————

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TraitKind {
    Length,
    Range,
    Pattern,
    UniqueItems,
    Required,
    Default,
    Documentation,
    JsonName,
    Span,
    NonFinite,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Trait {
    Length { min: Option<u64>, max: Option<u64> },
    Range { min: Option<f64>, max: Option<f64> },
    Pattern(String),
    UniqueItems,
    Required,
    Default(serde_json::Value),
    Documentation(String),
    JsonName(String),
    Span { lesser: String, greater: String, empty_allowed: bool },
    NonFinite,
}

impl Trait {
    pub fn kind(&self) -> TraitKind {
        match self {
            Trait::Length { .. } => TraitKind::Length,
            Trait::Range { .. } => TraitKind::Range,
            Trait::Pattern(_) => TraitKind::Pattern,
            Trait::UniqueItems => TraitKind::UniqueItems,
            Trait::Required => TraitKind::Required,
            Trait::Default(_) => TraitKind::Default,
            Trait::Documentation(_) => TraitKind::Documentation,
            Trait::JsonName(_) => TraitKind::JsonName,
            Trait::Span { .. } => TraitKind::Span,
            Trait::NonFinite => TraitKind::NonFinite,
        }
    }
}

/// Ordered trait list; at most one trait per kind (later declarations win).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Traits(Vec<Trait>);

impl Traits {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, t: Trait) -> Self {
        self.insert(t);
        self
    }

    pub fn insert(&mut self, t: Trait) {
        let kind = t.kind();
        self.0.retain(|x| x.kind() != kind);
        self.0.push(t);
    }

    pub fn get(&self, kind: TraitKind) -> Option<&Trait> {
        self.0.iter().find(|t| t.kind() == kind)
    }

    pub fn has(&self, kind: TraitKind) -> bool {
        self.get(kind).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Trait> {
        self.0.iter()
    }

    pub fn length(&self) -> Option<(Option<u64>, Option<u64>)> {
        match self.get(TraitKind::Length) {
            Some(Trait::Length { min, max }) => Some((*min, *max)),
            _ => None,
        }
    }

    pub fn range(&self) -> Option<(Option<f64>, Option<f64>)> {
        match self.get(TraitKind::Range) {
            Some(Trait::Range { min, max }) => Some((*min, *max)),
            _ => None,
        }
    }

    pub fn pattern(&self) -> Option<&str> {
        match self.get(TraitKind::Pattern) {
            Some(Trait::Pattern(p)) => Some(p),
            _ => None,
        }
    }

    pub fn default_value(&self) -> Option<&serde_json::Value> {
        match self.get(TraitKind::Default) {
            Some(Trait::Default(v)) => Some(v),
            _ => None,
        }
    }

    pub fn documentation(&self) -> Option<&str> {
        match self.get(TraitKind::Documentation) {
            Some(Trait::Documentation(d)) => Some(d),
            _ => None,
        }
    }

    pub fn json_name(&self) -> Option<&str> {
        match self.get(TraitKind::JsonName) {
            Some(Trait::JsonName(n)) => Some(n),
            _ => None,
        }
    }
}

// ————————————————————————————————————————————————————————————————————————————
// MEMBERS & SHAPES
// ————————————————————————————————————————————————————————————————————————————

/// A named reference from a container or composite to its target shape.
#[derive(Debug, Clone, PartialEq)]
pub struct Member {
    pub name: String,
    pub target: ShapeId,
    pub traits: Traits,
}

impl Member {
    pub fn new(name: impl Into<String>, target: impl Into<ShapeId>) -> Self {
        Self { name: name.into(), target: target.into(), traits: Traits::new() }
    }

    pub fn with_trait(mut self, t: Trait) -> Self {
        self.traits.insert(t);
        self
    }

    pub fn is_required(&self) -> bool {
        self.traits.has(TraitKind::Required)
    }

    pub fn has_default(&self) -> bool {
        self.traits.has(TraitKind::Default)
    }

    pub fn default_value(&self) -> Option<&serde_json::Value> {
        self.traits.default_value()
    }

    /// Name used in the serialized form.
    pub fn json_name(&self) -> &str {
        self.traits.json_name().unwrap_or(&self.name)
    }
}

impl From<ShapeId> for String {
    fn from(id: ShapeId) -> Self {
        id.0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ShapeDescriptor {
    pub id: ShapeId,
    pub kind: ShapeKind,
    pub traits: Traits,
}

impl ShapeDescriptor {
    pub fn new(id: impl Into<ShapeId>, kind: ShapeKind) -> Self {
        Self { id: id.into(), kind, traits: Traits::new() }
    }

    pub fn with_trait(mut self, t: Trait) -> Self {
        self.traits.insert(t);
        self
    }

    pub fn get_trait(&self, kind: TraitKind) -> Option<&Trait> {
        self.traits.get(kind)
    }

    /// Members of a composite, or the synthetic members of a container.
    pub fn members(&self) -> Vec<&Member> {
        match &self.kind {
            ShapeKind::List { member } | ShapeKind::Set { member } => vec![member],
            ShapeKind::Map { key, value } => vec![key, value],
            ShapeKind::Union { members } | ShapeKind::Structure { members } => members.iter().collect(),
            _ => Vec::new(),
        }
    }

    pub fn find_member(&self, name: &str) -> Option<&Member> {
        self.members().into_iter().find(|m| m.name == name)
    }
}

// ————————————————————————————————————————————————————————————————————————————
// MODEL
// ————————————————————————————————————————————————————————————————————————————

/// All shapes of one schema, in declaration order, prelude included.
#[derive(Debug, Clone)]
pub struct Model {
    shapes: IndexMap<ShapeId, ShapeDescriptor>,
}

impl Default for Model {
    fn default() -> Self {
        Self::new()
    }
}

impl Model {
    pub fn new() -> Self {
        let mut shapes = IndexMap::new();
        let mut prelude = |name: &str, kind: ShapeKind| {
            let id = ShapeId::prelude(name);
            shapes.insert(id.clone(), ShapeDescriptor::new(id, kind));
        };
        prelude("Boolean", ShapeKind::Boolean);
        prelude("String", ShapeKind::String);
        prelude("Timestamp", ShapeKind::Timestamp);
        for kind in NumberKind::ALL {
            prelude(kind.prelude_name(), ShapeKind::Number(kind));
        }
        Self { shapes }
    }

    pub fn insert(&mut self, shape: ShapeDescriptor) {
        self.shapes.insert(shape.id.clone(), shape);
    }

    pub fn with(mut self, shape: ShapeDescriptor) -> Self {
        self.insert(shape);
        self
    }

    pub fn get(&self, id: &ShapeId) -> Option<&ShapeDescriptor> {
        self.shapes.get(id)
    }

    /// Look a shape up, failing on behalf of `referrer` when absent.
    pub fn expect(&self, id: &ShapeId, referrer: &ShapeId) -> Result<&ShapeDescriptor, SchemaError> {
        self.shapes.get(id).ok_or_else(|| SchemaError::UnknownTarget {
            shape: referrer.clone(),
            target: id.clone(),
        })
    }

    pub fn shapes(&self) -> impl Iterator<Item = &ShapeDescriptor> {
        self.shapes.values()
    }

    /// Shapes declared by the schema itself (prelude excluded).
    pub fn declared(&self) -> impl Iterator<Item = &ShapeDescriptor> {
        self.shapes.values().filter(|s| !s.id.is_prelude())
    }

    pub fn len(&self) -> usize {
        self.shapes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shapes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shape_id_parts() {
        let id = ShapeId::new("com.example#Tags$member");
        assert_eq!(id.namespace(), "com.example");
        assert_eq!(id.name(), "Tags");
        assert!(!id.is_prelude());
        assert!(ShapeId::prelude("String").is_prelude());
    }

    #[test]
    fn later_trait_of_same_kind_wins() {
        let traits = Traits::new()
            .with(Trait::Pattern("a".into()))
            .with(Trait::Pattern("b".into()));
        assert_eq!(traits.pattern(), Some("b"));
        assert_eq!(traits.iter().count(), 1);
    }

    #[test]
    fn prelude_is_preloaded() {
        let model = Model::new();
        let int = model.get(&ShapeId::prelude("Integer")).expect("prelude integer");
        assert_eq!(int.kind, ShapeKind::Number(NumberKind::Integer));
        assert_eq!(model.declared().count(), 0);
    }

    #[test]
    fn widening_table() {
        assert_eq!(NumberKind::Byte.widened(), Some(NumberKind::Integer));
        assert_eq!(NumberKind::Short.widened(), Some(NumberKind::Integer));
        assert_eq!(NumberKind::Float.widened(), Some(NumberKind::Double));
        assert_eq!(NumberKind::Long.widened(), None);
        assert_eq!(NumberKind::Short.difference_kind(), NumberKind::Integer);
    }
}
