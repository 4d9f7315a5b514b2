//! Shape source: JSON model documents → [`Model`].
//!
//! Accepts the subset of the Smithy JSON AST the generator understands:
//!
//! ```json
//! { "shapes": {
//!     "ex#Tags": { "type": "list",
//!                  "member": { "target": "smithy.api#String" },
//!                  "traits": { "smithy.api#length": { "min": 1, "max": 3 } } } } }
//! ```
//!
//! Cross-field spans and the finite-number opt-out use the `shapesynth#span`
//! and `shapesynth#nonFinite` traits.
use std::path::Path;

use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::error::SchemaError;
use crate::path_de::{self, PathError};
use crate::shape::{Member, Model, NumberKind, ShapeDescriptor, ShapeId, ShapeKind, Trait};

pub const SPAN_TRAIT: &str = "shapesynth#span";
pub const NON_FINITE_TRAIT: &str = "shapesynth#nonFinite";

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("{path}: {source}")]
    Io { path: String, source: std::io::Error },
    #[error("malformed model document {0}")]
    Document(#[from] PathError),
    #[error(transparent)]
    Schema(#[from] SchemaError),
}

// ---- document ---- //

#[derive(Debug, Deserialize)]
struct Document {
    #[serde(default)]
    #[allow(dead_code)]
    smithy: Option<String>,
    shapes: IndexMap<String, ShapeNode>,
}

#[derive(Debug, Deserialize)]
struct ShapeNode {
    #[serde(rename = "type")]
    kind: String,
    member: Option<MemberNode>,
    key: Option<MemberNode>,
    value: Option<MemberNode>,
    #[serde(default)]
    members: IndexMap<String, MemberNode>,
    #[serde(default)]
    traits: IndexMap<String, Value>,
}

#[derive(Debug, Deserialize)]
struct MemberNode {
    #[serde(default)]
    target: Option<String>,
    #[serde(default)]
    traits: IndexMap<String, Value>,
}

#[derive(Debug, Deserialize)]
struct Bounds<T> {
    min: Option<T>,
    max: Option<T>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SpanNode {
    lesser: String,
    greater: String,
    #[serde(default)]
    empty_allowed: bool,
}

#[derive(Debug, Deserialize)]
struct LegacyEnumEntry {
    value: String,
}

// ---- loading ---- //

pub fn load_path(path: &Path) -> Result<Model, SourceError> {
    let src = std::fs::read_to_string(path)
        .map_err(|source| SourceError::Io { path: path.display().to_string(), source })?;
    let doc: Document = path_de::from_str_with_path(&src)?;
    build(doc)
}

pub fn load_model(value: &Value) -> Result<Model, SourceError> {
    let doc: Document = path_de::from_value_with_path(value.clone())?;
    build(doc)
}

fn build(doc: Document) -> Result<Model, SourceError> {
    let mut model = Model::new();
    for (id, node) in doc.shapes {
        let id = ShapeId::new(id);
        let shape = shape(&id, node)?;
        debug!(shape = %id, kind = shape.kind.label(), "loaded shape");
        model.insert(shape);
    }
    Ok(model)
}

fn shape(id: &ShapeId, node: ShapeNode) -> Result<ShapeDescriptor, SchemaError> {
    let required = |m: Option<MemberNode>, name: &str| {
        m.ok_or_else(|| SchemaError::Malformed { shape: id.clone(), reason: format!("missing `{name}` member") })
    };
    let kind = match node.kind.as_str() {
        "boolean" => ShapeKind::Boolean,
        "string" => match node.traits.get("smithy.api#enum") {
            Some(entries) => ShapeKind::Enum { variants: legacy_enum(id, entries)? },
            None => ShapeKind::String,
        },
        "timestamp" => ShapeKind::Timestamp,
        "list" => ShapeKind::List { member: member(id, "member", required(node.member, "member")?)? },
        "set" => ShapeKind::Set { member: member(id, "member", required(node.member, "member")?)? },
        "map" => ShapeKind::Map {
            key: member(id, "key", required(node.key, "key")?)?,
            value: member(id, "value", required(node.value, "value")?)?,
        },
        "enum" => ShapeKind::Enum { variants: enum_variants(&node.members) },
        "structure" | "union" => {
            let members = node
                .members
                .into_iter()
                .map(|(name, m)| member(id, &name, m))
                .collect::<Result<Vec<_>, _>>()?;
            if node.kind == "union" { ShapeKind::Union { members } } else { ShapeKind::Structure { members } }
        }
        other => match NumberKind::parse(other) {
            Some(kind) => ShapeKind::Number(kind),
            None => return Err(SchemaError::UnsupportedType { shape: id.clone(), type_name: other.to_string() }),
        },
    };
    let mut shape = ShapeDescriptor::new(id.clone(), kind);
    for t in traits(id, &node.traits)? {
        shape = shape.with_trait(t);
    }
    Ok(shape)
}

fn member(id: &ShapeId, name: &str, node: MemberNode) -> Result<Member, SchemaError> {
    let member_id = id.with_member(name);
    let target = node.target.ok_or_else(|| SchemaError::Malformed {
        shape: member_id.clone(),
        reason: "member has no `target`".into(),
    })?;
    let mut m = Member::new(name, ShapeId::new(target));
    for t in traits(&member_id, &node.traits)? {
        m = m.with_trait(t);
    }
    Ok(m)
}

fn enum_variants(members: &IndexMap<String, MemberNode>) -> Vec<String> {
    members
        .iter()
        .map(|(name, m)| match m.traits.get("smithy.api#enumValue") {
            Some(Value::String(v)) => v.clone(),
            _ => name.clone(),
        })
        .collect()
}

fn legacy_enum(id: &ShapeId, entries: &Value) -> Result<Vec<String>, SchemaError> {
    let entries: Vec<LegacyEnumEntry> = decode(id, "smithy.api#enum", entries)?;
    Ok(entries.into_iter().map(|e| e.value).collect())
}

fn decode<T: serde::de::DeserializeOwned>(id: &ShapeId, trait_id: &str, v: &Value) -> Result<T, SchemaError> {
    path_de::from_value_with_path(v.clone())
        .map_err(|e| SchemaError::Malformed { shape: id.clone(), reason: format!("trait `{trait_id}` {e}") })
}

fn traits(id: &ShapeId, raw: &IndexMap<String, Value>) -> Result<Vec<Trait>, SchemaError> {
    let mut out = Vec::new();
    for (trait_id, v) in raw {
        let t = match trait_id.as_str() {
            "smithy.api#length" => {
                let b: Bounds<u64> = decode(id, trait_id, v)?;
                Trait::Length { min: b.min, max: b.max }
            }
            "smithy.api#range" => {
                let b: Bounds<f64> = decode(id, trait_id, v)?;
                Trait::Range { min: b.min, max: b.max }
            }
            "smithy.api#pattern" => Trait::Pattern(decode(id, trait_id, v)?),
            "smithy.api#uniqueItems" => Trait::UniqueItems,
            "smithy.api#required" => Trait::Required,
            "smithy.api#default" => Trait::Default(v.clone()),
            "smithy.api#documentation" => Trait::Documentation(decode(id, trait_id, v)?),
            "smithy.api#jsonName" => Trait::JsonName(decode(id, trait_id, v)?),
            // consumed while reading the shape kind
            "smithy.api#enum" | "smithy.api#enumValue" => continue,
            SPAN_TRAIT => {
                let s: SpanNode = decode(id, trait_id, v)?;
                Trait::Span { lesser: s.lesser, greater: s.greater, empty_allowed: s.empty_allowed }
            }
            NON_FINITE_TRAIT => Trait::NonFinite,
            other => {
                warn!(shape = %id, r#trait = other, "ignoring unknown trait");
                continue;
            }
        };
        out.push(t);
    }
    Ok(out)
}
