mod common;

use std::collections::BTreeMap;

use common::{bounded_map, bounded_set, plan_of, tags};
use shape_synth::constructors::ConstructorKind;
use shape_synth::runtime::{args, ConstrainedList, ConstrainedMap, ConstrainedSet};
use shape_synth::Datum;

fn texts(xs: &[&str]) -> Vec<Datum> {
    xs.iter().map(|s| Datum::text(*s)).collect()
}

#[test]
fn tags_scenario() {
    let model = tags();
    let plan = plan_of(&model, "ex#Tags");
    let mut tags = ConstrainedList::new(&plan, texts(&["abc", "def", "ghi"])).unwrap();

    let err = tags.add(Datum::text("jkl")).unwrap_err();
    assert!(err.message.contains("maximum of 3"), "{err}");
    assert_eq!(err.limit.as_deref(), Some("3"));
    assert_eq!(tags.len(), 3);

    assert_eq!(tags.remove(&Datum::text("abc")), Ok(true));
    assert_eq!(tags.remove(&Datum::text("def")), Ok(true));
    let err = tags.remove(&Datum::text("ghi")).unwrap_err();
    assert!(err.message.contains("minimum of 1"), "{err}");
    assert_eq!(tags.items(), &texts(&["ghi"])[..]);

    let err = tags.add(Datum::text("ABC")).unwrap_err();
    assert!(err.message.contains("^[a-z]+$"), "{err}");
    assert_eq!(tags.len(), 1);
}

#[test]
fn list_operations_leave_receiver_untouched_on_failure() {
    let model = tags();
    let plan = plan_of(&model, "ex#Tags");
    let mut tags = ConstrainedList::new(&plan, texts(&["abc", "def"])).unwrap();
    let before = tags.clone();

    assert!(tags.add_all(texts(&["ghi", "jkl"])).is_err());
    assert!(tags.add_all(texts(&["ok", "NOPE"])).is_err());
    assert!(tags.remove_all(&texts(&["abc", "def"])).is_err());
    assert!(tags.retain_all(&texts(&["zzz"])).is_err());
    assert!(tags.clear().is_err());
    assert_eq!(tags, before);

    assert!(tags.remove_at(7).is_err());
    assert_eq!(tags.remove_at(0), Ok(Datum::text("abc")));
    assert!(tags.remove_at(0).is_err());
    assert_eq!(tags.items(), &texts(&["def"])[..]);
}

#[test]
fn construction_is_checked_like_mutation() {
    let model = tags();
    let plan = plan_of(&model, "ex#Tags");
    assert!(ConstrainedList::new(&plan, Vec::new()).is_err());
    assert!(ConstrainedList::new(&plan, texts(&["a", "b", "c", "d"])).is_err());
    assert!(ConstrainedList::new(&plan, texts(&["a", "B"])).is_err());
    let single = ConstrainedList::construct(&plan, ConstructorKind::Single, &args([("value", Datum::text("x"))])).unwrap();
    assert_eq!(single.len(), 1);
}

#[test]
fn set_operations_are_atomic() {
    let model = bounded_set(Some(1), Some(3));
    let plan = plan_of(&model, "ex#Codes");
    let mut codes = ConstrainedSet::new(&plan, texts(&["a", "b"])).unwrap();
    let before = codes.clone();

    assert!(codes.add_all(texts(&["c", "d"])).is_err());
    assert!(codes.remove_all(&texts(&["a", "b"])).is_err());
    assert!(codes.clear().is_err());
    assert_eq!(codes, before);

    // duplicates in the argument collapse before counting
    assert_eq!(codes.add_all(texts(&["c", "c", "a"])), Ok(true));
    assert_eq!(codes.len(), 3);
    assert_eq!(codes.add(Datum::text("b")), Ok(false));
}

#[test]
fn map_operations_are_atomic() {
    let model = bounded_map(Some(1), Some(2));
    let plan = plan_of(&model, "ex#Scores");
    let entries = BTreeMap::from([(Datum::text("a"), Datum::Int(1)), (Datum::text("b"), Datum::Int(2))]);
    let mut scores = ConstrainedMap::new(&plan, entries).unwrap();
    let before = scores.clone();

    assert!(scores.put(Datum::text("c"), Datum::Int(3)).is_err());
    assert!(scores.put(Datum::text("a"), Datum::Int(11)).is_err());
    assert!(scores.put_all(vec![(Datum::text("c"), Datum::Int(1))]).is_err());
    assert!(scores.merge(Datum::text("a"), Datum::Int(5), |old, new| Some(Datum::Int(old.as_f64().unwrap() as i64 * 100 + new.as_f64().unwrap() as i64))).is_err());
    assert!(scores.compute(Datum::text("z"), |_, _| Some(Datum::Int(1))).is_err());
    assert!(scores.replace_all(|_, v| Datum::Int(v.as_f64().unwrap() as i64 + 9)).is_err());
    assert!(scores.clear().is_err());
    assert_eq!(scores, before);

    // an existing key does not count toward the maximum
    assert_eq!(scores.put(Datum::text("a"), Datum::Int(7)), Ok(Some(Datum::Int(1))));
    assert_eq!(scores.remove(&Datum::text("a")), Ok(Some(Datum::Int(7))));
    assert!(scores.compute_if_present(Datum::text("b"), |_, _| None).is_err());
    assert_eq!(scores.len(), 1);
}

#[test]
fn minimal_map_constructor_detects_duplicate_keys() {
    let model = bounded_map(Some(2), None);
    let plan = plan_of(&model, "ex#Scores");
    let pairs = |k1: &str| {
        args([
            ("k0", Datum::text("a")),
            ("v0", Datum::Int(1)),
            ("k1", Datum::text(k1)),
            ("v1", Datum::Int(2)),
        ])
    };
    let err = ConstrainedMap::construct(&plan, ConstructorKind::WithMinimalRequiredArgs, &pairs("a")).unwrap_err();
    assert!(err.message.contains("duplicate keys"), "{err}");
    let ok = ConstrainedMap::construct(&plan, ConstructorKind::WithMinimalRequiredArgs, &pairs("b")).unwrap();
    assert_eq!(ok.len(), 2);
}
