use std::collections::BTreeSet;
use std::fmt;

use super::{after, gather, Args, Guards};
use crate::constructors::ConstructorKind;
use crate::datum::Datum;
use crate::error::ValidationFailure;
use crate::guard::{Operands, Operation, Receiver};
use crate::plan::TypePlan;

/// A list whose every mutation is guarded by its plan.
#[derive(Debug, Clone)]
pub struct ConstrainedList {
    guards: Guards,
    items: Vec<Datum>,
}

impl Receiver for ConstrainedList {
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

impl PartialEq for ConstrainedList {
    fn eq(&self, other: &Self) -> bool {
        self.guards.shape == other.guards.shape && self.items == other.items
    }
}

impl ConstrainedList {
    pub fn construct(plan: &TypePlan, kind: ConstructorKind, args: &Args) -> Result<Self, ValidationFailure> {
        let (gathered, ctor) = gather(plan, kind, args)?;
        let list = Self { guards: Guards::from_plan(plan), items: gathered.items };
        after(&plan.shape, ctor, &list)?;
        Ok(list)
    }

    /// Canonical construction from a complete item list.
    pub fn new(plan: &TypePlan, items: Vec<Datum>) -> Result<Self, ValidationFailure> {
        Self::construct(plan, ConstructorKind::Canonical, &super::args([("values", Datum::List(items))]))
    }

    pub fn items(&self) -> &[Datum] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn to_datum(&self) -> Datum {
        Datum::List(self.items.clone())
    }

    pub fn add(&mut self, item: Datum) -> Result<(), ValidationFailure> {
        self.guards.before(Operation::Add, self, &Operands::argument(&item))?;
        self.items.push(item);
        Ok(())
    }

    /// Remove the first occurrence of `item`; `false` when absent.
    pub fn remove(&mut self, item: &Datum) -> Result<bool, ValidationFailure> {
        self.guards.before(Operation::Remove, self, &Operands::argument(item))?;
        match self.items.iter().position(|x| x == item) {
            Some(i) => {
                self.items.remove(i);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn remove_at(&mut self, index: usize) -> Result<Datum, ValidationFailure> {
        if index >= self.items.len() {
            return Err(ValidationFailure::new(
                self.guards.shape.clone(),
                format!("index {index} out of bounds for length {}", self.items.len()),
            ));
        }
        self.guards.before(Operation::RemoveAt, self, &Operands::default())?;
        Ok(self.items.remove(index))
    }

    pub fn add_all(&mut self, incoming: Vec<Datum>) -> Result<(), ValidationFailure> {
        self.guards.before(Operation::AddAll, self, &Operands::incoming(&incoming))?;
        self.items.extend(incoming);
        Ok(())
    }

    /// Remove every occurrence of every item in `doomed`.
    pub fn remove_all(&mut self, doomed: &[Datum]) -> Result<bool, ValidationFailure> {
        self.guards.before(Operation::RemoveAll, self, &Operands::incoming(doomed))?;
        let doomed: BTreeSet<&Datum> = doomed.iter().collect();
        let before = self.items.len();
        self.items.retain(|x| !doomed.contains(x));
        Ok(self.items.len() != before)
    }

    /// Keep only items found in `kept`.
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

impl fmt::Display for ConstrainedList {
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
            "ex#Names",
            ShapeKind::List { member: Member::new("member", ShapeId::prelude("String")) },
        )
        .with_trait(Trait::Length { min, max });
        let model = Model::new().with(shape.clone());
        generate_shape(&model, &shape, &GenerationSettings::default(), Registry::standard()).unwrap()
    }

    fn texts(xs: &[&str]) -> Vec<Datum> {
        xs.iter().map(|s| Datum::text(*s)).collect()
    }

    #[test]
    fn remove_of_absent_item_passes_at_minimum() {
        let p = plan(Some(2), None);
        let mut l = ConstrainedList::new(&p, texts(&["a", "b"])).unwrap();
        assert_eq!(l.remove(&Datum::text("zzz")), Ok(false));
        assert!(l.remove(&Datum::text("a")).is_err());
        assert_eq!(l.len(), 2);
    }

    #[test]
    fn list_bulk_add_counts_duplicates() {
        let p = plan(None, Some(3));
        let mut l = ConstrainedList::new(&p, texts(&["a"])).unwrap();
        assert!(l.add_all(texts(&["b", "b", "b"])).is_err());
        assert_eq!(l.len(), 1);
        l.add_all(texts(&["b", "b"])).unwrap();
        assert_eq!(l.len(), 3);
    }

    #[test]
    fn remove_all_counts_every_occurrence() {
        let p = plan(Some(2), None);
        let mut l = ConstrainedList::new(&p, texts(&["a", "a", "b", "c"])).unwrap();
        assert!(l.remove_all(&texts(&["a", "b"])).is_err());
        assert_eq!(l.len(), 4);
        assert_eq!(l.remove_all(&texts(&["a"])), Ok(true));
        assert_eq!(l.items(), texts(&["b", "c"]).as_slice());
    }

    #[test]
    fn remove_at_is_bounds_checked_and_guarded() {
        let p = plan(Some(1), None);
        let mut l = ConstrainedList::new(&p, texts(&["a", "b"])).unwrap();
        assert!(l.remove_at(5).is_err());
        assert_eq!(l.remove_at(0), Ok(Datum::text("a")));
        assert!(l.remove_at(0).is_err());
        assert_eq!(l.len(), 1);
    }

    #[test]
    fn minimal_constructor_takes_individual_items() {
        let p = plan(Some(2), Some(5));
        let l = ConstrainedList::construct(
            &p,
            ConstructorKind::WithMinimalRequiredArgs,
            &super::super::args([("e0", Datum::text("x")), ("e1", Datum::text("x"))]),
        )
        .unwrap();
        assert_eq!(l.len(), 2);
        assert_eq!(l.to_string(), r#"Names{"values":["x","x"]}"#);
    }
}
