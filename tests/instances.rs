mod common;

use common::{integer, plan_of, string};
use serde_json::json;
use shape_synth::instance::Instance;
use shape_synth::runtime::args;
use shape_synth::shape::{Member, Model, ShapeDescriptor, ShapeId, ShapeKind, Trait};
use shape_synth::{Datum, TypePlan};

fn structure(id: &str, members: Vec<Member>) -> ShapeDescriptor {
    ShapeDescriptor::new(id, ShapeKind::Structure { members })
}

fn round_trip(plan: &TypePlan, instance: &Instance<'_>) {
    let encoded = instance.to_json();
    let decoded = Instance::from_json(plan, &encoded).unwrap();
    assert_eq!(&decoded, instance, "{encoded}");
    assert_eq!(decoded.hash_code(), instance.hash_code());
    assert_eq!(decoded.to_string(), instance.to_string());
}

#[test]
fn round_trip_all_required() {
    let model = Model::new().with(structure(
        "ex#Point",
        vec![
            Member::new("x", integer()).with_trait(Trait::Required),
            Member::new("label", string()).with_trait(Trait::Required).with_trait(Trait::JsonName("Label".into())),
        ],
    ));
    let plan = plan_of(&model, "ex#Point");
    let p = Instance::new(&plan, &args([("x", Datum::Int(-3)), ("label", Datum::text("origin"))])).unwrap();
    assert_eq!(p.to_json(), json!({"x": -3, "Label": "origin"}));
    round_trip(&plan, &p);
}

#[test]
fn round_trip_all_optional() {
    let model = Model::new().with(structure(
        "ex#Filter",
        vec![
            Member::new("prefix", string()),
            Member::new("limit", integer()),
            Member::new("ratio", ShapeId::prelude("Double")),
        ],
    ));
    let plan = plan_of(&model, "ex#Filter");
    let empty = Instance::new(&plan, &args(Vec::<(&str, Datum)>::new())).unwrap();
    assert_eq!(empty.to_json(), json!({}));
    round_trip(&plan, &empty);

    let some = Instance::new(&plan, &args([("limit", Datum::Int(5)), ("ratio", Datum::float(0.25))])).unwrap();
    assert_eq!(some.get("prefix"), None);
    round_trip(&plan, &some);
}

#[test]
fn round_trip_mixed_with_defaults() {
    let model = Model::new().with(structure(
        "ex#Job",
        vec![
            Member::new("name", string()).with_trait(Trait::Required),
            Member::new("retries", ShapeId::prelude("Short"))
                .with_trait(Trait::Default(json!(3)))
                .with_trait(Trait::Range { min: Some(0.0), max: Some(10.0) }),
            Member::new("owner", string()),
            Member::new("tags", ShapeId::new("ex#Tags")),
        ],
    ))
    .with(
        ShapeDescriptor::new("ex#Tags", ShapeKind::List { member: Member::new("member", string()) })
            .with_trait(Trait::Length { min: None, max: Some(2) }),
    );
    let plan = plan_of(&model, "ex#Job");
    let job = Instance::from_json(&plan, &json!({"name": "build", "tags": ["ci"]})).unwrap();
    assert_eq!(job.get("retries"), Some(Datum::Int(3)));
    assert_eq!(job.to_json()["retries"], json!(3));
    round_trip(&plan, &job);

    let err = Instance::from_json(&plan, &json!({"name": "build", "retries": 11})).unwrap_err();
    assert!(err.message.contains("at most 10"), "{err}");
}

fn window(empty_allowed: bool) -> Model {
    Model::new().with(
        structure(
            "ex#Window",
            vec![
                Member::new("start", integer()).with_trait(Trait::Required),
                Member::new("end", integer()).with_trait(Trait::Required),
            ],
        )
        .with_trait(Trait::Span { lesser: "start".into(), greater: "end".into(), empty_allowed }),
    )
}

#[test]
fn span_rejects_empty_unless_allowed() {
    let strict = window(false);
    let plan = plan_of(&strict, "ex#Window");
    let at = |s: i64, e: i64| args([("start", Datum::Int(s)), ("end", Datum::Int(e))]);
    let err = Instance::new(&plan, &at(5, 5)).unwrap_err();
    assert_eq!(err.value.as_deref(), Some("start=5, end=5"));
    let open = Instance::new(&plan, &at(5, 6)).unwrap();
    assert_eq!(open.call("is_empty_span"), Some(Datum::Bool(false)));

    let lenient = window(true);
    let plan = plan_of(&lenient, "ex#Window");
    let empty = Instance::new(&plan, &at(5, 5)).unwrap();
    assert_eq!(empty.call("is_empty_span"), Some(Datum::Bool(true)));
    assert!(Instance::new(&plan, &at(6, 5)).is_err());
}

#[test]
fn default_instance_exists_only_when_everything_defaults() {
    let model = Model::new()
        .with(structure(
            "ex#Limits",
            vec![
                Member::new("soft", integer()).with_trait(Trait::Default(json!(1))),
                Member::new("hard", integer()).with_trait(Trait::Default(json!(2))),
            ],
        ))
        .with(structure(
            "ex#Named",
            vec![
                Member::new("name", string()).with_trait(Trait::Required),
                Member::new("hard", integer()).with_trait(Trait::Default(json!(2))),
            ],
        ));
    let limits = plan_of(&model, "ex#Limits");
    let d = Instance::default_instance(&limits).unwrap().unwrap();
    assert_eq!(d.get("soft"), Some(Datum::Int(1)));
    assert_eq!(d, Instance::new(&limits, &args(Vec::<(&str, Datum)>::new())).unwrap());
    assert!(Instance::default_instance(&plan_of(&model, "ex#Named")).is_none());
}
