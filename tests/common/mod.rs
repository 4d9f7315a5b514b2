#![allow(dead_code)]

use shape_synth::shape::{Member, Model, ShapeDescriptor, ShapeId, ShapeKind, Trait};
use shape_synth::{generate_shape, GenerationSettings, Registry, TypePlan};

pub fn plan_of(model: &Model, id: &str) -> TypePlan {
    let shape = model.get(&ShapeId::new(id)).expect("shape declared");
    generate_shape(model, shape, &GenerationSettings::default(), Registry::standard()).expect("plan generated")
}

pub fn string() -> ShapeId {
    ShapeId::prelude("String")
}

pub fn integer() -> ShapeId {
    ShapeId::prelude("Integer")
}

/// `Tags`: 1..=3 lowercase words.
pub fn tags() -> Model {
    Model::new().with(
        ShapeDescriptor::new(
            "ex#Tags",
            ShapeKind::List { member: Member::new("member", string()).with_trait(Trait::Pattern("^[a-z]+$".into())) },
        )
        .with_trait(Trait::Length { min: Some(1), max: Some(3) }),
    )
}

pub fn bounded_set(min: Option<u64>, max: Option<u64>) -> Model {
    Model::new().with(
        ShapeDescriptor::new("ex#Codes", ShapeKind::Set { member: Member::new("member", string()) })
            .with_trait(Trait::Length { min, max }),
    )
}

pub fn bounded_map(min: Option<u64>, max: Option<u64>) -> Model {
    Model::new().with(
        ShapeDescriptor::new(
            "ex#Scores",
            ShapeKind::Map {
                key: Member::new("key", string()),
                value: Member::new("value", integer()).with_trait(Trait::Range { min: Some(0.0), max: Some(10.0) }),
            },
        )
        .with_trait(Trait::Length { min, max }),
    )
}
