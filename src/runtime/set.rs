use std::collections::BTreeSet;
use std::fmt;

use super::{after, gather, Args, Guards};
use crate::constructors::ConstructorKind;
use crate::datum::Datum;
use crate::error::ValidationFailure;
use crate::guard::{Operands, Operation, Receiver};
use crate::plan::TypePlan;

/// A set of unique items whose every mutation is guarded by its plan.
#[derive(Debug, Clone)]
pub struct ConstrainedSet {
    guards: Guards,
    items: BTreeSet<Datum>,
}

impl Receiver for ConstrainedSet {
    fn size(&self) -> u64 {
        self.items.len() as u64
    }

    fn contains(&self, item: &Datum) -> bool {
        self.items.contains(item)
    }

    fn items(&self) -> Box<dyn Iterator<Item = &Datum> + '_> {
        Box::new(self.items.iter())
    }
}

impl PartialEq for ConstrainedSet {
    fn eq(&self, other: &Self) -> bool {
        self.guards.shape == other.guards.shape && self.items == other.items
    }
}

impl ConstrainedSet {
    pub fn construct(plan: &TypePlan, kind: ConstructorKind, args: &Args) -> Result<Self, ValidationFailure> {
        let (gathered, ctor) = gather(plan, kind, args)?;
        let set = Self { guards: Guards::from_plan(plan), items: gathered.items.into_iter().collect() };
        after(&plan.shape, ctor, &set)?;
        Ok(set)
    }

    pub fn new(plan: &TypePlan, items: Vec<Datum>) -> Result<Self, ValidationFailure> {
        Self::construct(plan, ConstructorKind::Canonical, &super::args([("values", Datum::List(items))]))
    }

    pub fn items(&self) -> &BTreeSet<Datum> {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn to_datum(&self) -> Datum {
        Datum::Set(self.items.clone())
    }

    /// `false` when the item was already present.
    pub fn add(&mut self, item: Datum) -> Result<bool, ValidationFailure> {
        self.guards.before(Operation::Add, self, &Operands::argument(&item))?;
        Ok(self.items.insert(item))
    }

    pub fn remove(&mut self, item: &Datum) -> Result<bool, ValidationFailure> {
        self.guards.before(Operation::Remove, self, &Operands::argument(item))?;
        Ok(self.items.remove(item))
    }

    pub fn add_all(&mut self, incoming: Vec<Datum>) -> Result<bool, ValidationFailure> {
        self.guards.before(Operation::AddAll, self, &Operands::incoming(&incoming))?;
        let before = self.items.len();
        self.items.extend(incoming);
        Ok(self.items.len() != before)
    }

    pub fn remove_all(&mut self, doomed: &[Datum]) -> Result<bool, ValidationFailure> {
        self.guards.before(Operation::RemoveAll, self, &Operands::incoming(doomed))?;
        let before = self.items.len();
        for d in doomed {
            self.items.remove(d);
        }
        Ok(self.items.len() != before)
    }

    pub fn retain_all(&mut self, kept: &[Datum]) -> Result<bool, ValidationFailure> {
        self.guards.before(Operation::RetainAll, self, &Operands::incoming(kept))?;
        let kept: BTreeSet<&Datum> = kept.iter().collect();
        let before = self.items.len();
        self.items.retain(|x| kept.contains(x));
        Ok(self.items.len() != before)
    }

    pub fn clear(&mut self) -> Result<(), ValidationFailure> {
        self.guards.before(Operation::Clear, self, &Operands::default())?;
        self.items.clear();
        Ok(())
    }
}

impl fmt::Display for ConstrainedSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{{\"values\":{}}}", self.guards.shape.name(), self.to_datum())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GenerationSettings;
    use crate::contributors::Registry;
    use crate::generate::generate_shape;
    use crate::shape::{Member, Model, ShapeDescriptor, ShapeId, ShapeKind, Trait};

    fn plan(min: Option<u64>, max: Option<u64>) -> TypePlan {
        let shape = ShapeDescriptor::new(
            "ex#Codes",
            ShapeKind::Set { member: Member::new("member", ShapeId::prelude("String")) },
        )
        .with_trait(Trait::Length { min, max });
        let model = Model::new().with(shape.clone());
        generate_shape(&model, &shape, &GenerationSettings::default(), Registry::standard()).unwrap()
    }

    fn texts(xs: &[&str]) -> Vec<Datum> {
        xs.iter().map(|s| Datum::text(*s)).collect()
    }

    #[test]
    fn construction_counts_distinct_items() {
        let p = plan(None, Some(2));
        let s = ConstrainedSet::new(&p, texts(&["a", "a", "b"])).unwrap();
        assert_eq!(s.len(), 2);
        assert!(ConstrainedSet::new(&p, texts(&["a", "b", "c"])).is_err());
    }

    #[test]
    fn adding_present_item_at_maximum_is_allowed() {
        let p = plan(None, Some(2));
        let mut s = ConstrainedSet::new(&p, texts(&["a", "b"])).unwrap();
        assert_eq!(s.add(Datum::text("a")), Ok(false));
        assert!(s.add(Datum::text("c")).is_err());
    }

    #[test]
    fn bulk_add_counts_only_new_distinct_items() {
        let p = plan(None, Some(4));
        let mut s = ConstrainedSet::new(&p, texts(&["a", "b"])).unwrap();
        assert_eq!(s.add_all(texts(&["a", "b", "c", "c", "d"])), Ok(true));
        assert_eq!(s.len(), 4);
        assert!(s.add_all(texts(&["e"])).is_err());
        assert_eq!(s.len(), 4);
    }

    #[test]
    fn retain_all_with_multiset_argument() {
        let p = plan(Some(2), None);
        let mut s = ConstrainedSet::new(&p, texts(&["a", "b", "c"])).unwrap();
        assert!(s.retain_all(&texts(&["a", "a", "a"])).is_err());
        assert_eq!(s.len(), 3);
        assert_eq!(s.retain_all(&texts(&["a", "b", "b"])), Ok(true));
        assert_eq!(s.to_string(), r#"Codes{"values":["a","b"]}"#);
    }

    #[test]
    fn empty_retain_argument_clears_only_without_minimum() {
        let mut free = ConstrainedSet::new(&plan(None, None), texts(&["a"])).unwrap();
        assert_eq!(free.retain_all(&[]), Ok(true));
        assert!(free.is_empty());
        let mut bound = ConstrainedSet::new(&plan(Some(1), None), texts(&["a"])).unwrap();
        assert!(bound.retain_all(&[]).is_err());
    }
}
