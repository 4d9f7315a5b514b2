use std::collections::BTreeMap;

use generated_check::{Name, Scores, Tags, Window};
use serde_json::json;

const BIG: i64 = 1 << 53;

fn name(s: &str) -> Name {
    Name::new(s.to_string()).unwrap()
}

fn window(start: i64, end: i64) -> Result<Window, generated_check::ValidationFailure> {
    Window::new(start, end, None, None, 0.5, None)
}

#[test]
fn named_scalar_member() {
    let w = Window::new(1, 2, Some(name("abc")), None, 0.5, None).unwrap();
    assert_eq!(w.owner().map(|o| o.value().as_str()), Some("abc"));
    assert!(Name::new("A".to_string()).is_err());
}

#[test]
fn signed_zeroes_are_equal_and_hash_alike() {
    let pos = Window::new(1, 2, None, Some(0.0), 0.0, None).unwrap();
    let neg = Window::new(1, 2, None, Some(-0.0), -0.0, None).unwrap();
    assert_eq!(pos, neg);
    assert_eq!(pos.hash_code(), neg.hash_code());
}

#[test]
fn compute_returning_nothing_leaves_a_new_key_alone() {
    let mut scores = Scores::new(BTreeMap::new()).unwrap();
    // "x" is too short to be stored, but nothing is stored
    assert_eq!(scores.compute("x".to_string(), |_, _| None).unwrap(), None);
    assert!(scores.values().is_empty());
    assert!(scores.compute("x".to_string(), |_, _| Some(3)).is_err());
    assert_eq!(scores.compute("xy".to_string(), |_, _| Some(3)).unwrap(), Some(3));
    assert!(scores.compute("xy".to_string(), |_, old| old.map(|v| v + 10)).is_err());
    assert_eq!(scores.values().get("xy"), Some(&3));
}

#[test]
fn clear_fails_when_a_minimum_size_is_declared() {
    let mut tags = Tags::new(vec!["a".to_string()]).unwrap();
    assert!(tags.clear().is_err());
    assert_eq!(tags.values().len(), 1);
}

#[test]
fn json_round_trip() {
    let doc = json!({ "start": 1, "end": 5, "owner": "abc", "level": 1.5, "tags": ["x"] });
    let w: Window = serde_json::from_value(doc.clone()).unwrap();
    assert_eq!(w.tags().map(|t| t.values().len()), Some(1));
    // absent optionals stay absent, wrappers are bare values
    assert_eq!(serde_json::to_value(&w).unwrap(), doc);
}

#[test]
fn decoding_checks_like_construction() {
    let bad_owner = json!({ "start": 1, "end": 5, "owner": "A", "level": 1.5 });
    assert!(serde_json::from_value::<Window>(bad_owner).is_err());
    let bad_span = json!({ "start": 5, "end": 5, "level": 1.5 });
    assert!(serde_json::from_value::<Window>(bad_span).is_err());
    assert!(serde_json::from_value::<Tags>(json!([])).is_err());
    assert!(serde_json::from_value::<Tags>(json!(["ok"])).is_ok());
}

#[test]
fn long_bounds_are_exact() {
    assert!(window(0, BIG).is_ok());
    assert!(window(0, BIG + 1).is_err());
}

#[test]
fn span_is_strict_beyond_double_precision() {
    assert!(window(BIG - 1, BIG).is_ok());
    assert!(window(BIG, BIG).is_err());
}

#[test]
fn widened_float_admits_non_finite_values() {
    let w = Window::from_widened(1, 2, None, None, f64::NAN, None).unwrap();
    assert!(w.level().is_nan());
    assert!(Window::from_widened(1, 2, None, None, f64::INFINITY, None).is_ok());
    assert!(Window::from_widened(1, 2, None, None, 1e300, None).is_err());
    // ratio carries no opt-out
    assert!(Window::new(1, 2, None, Some(f64::NAN), 0.5, None).is_err());
}
