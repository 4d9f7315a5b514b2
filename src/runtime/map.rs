use std::collections::BTreeMap;
use std::fmt;

use super::{after, gather, Args, Guards};
use crate::constructors::ConstructorKind;
use crate::datum::Datum;
use crate::error::ValidationFailure;
use crate::guard::{GuardPlan, Operands, Operation, PostChecked, Receiver};
use crate::plan::TypePlan;

/// A map whose every mutation is guarded by its plan.
///
/// Functional writes (`merge`, the `compute` family, `replace_all`) run the
/// caller's function through [`PostChecked`], so a rejected result never
/// reaches the map.
#[derive(Debug, Clone)]
pub struct ConstrainedMap {
    guards: Guards,
    entries: BTreeMap<Datum, Datum>,
}

impl Receiver for ConstrainedMap {
    fn size(&self) -> u64 {
        self.entries.len() as u64
    }

    fn contains(&self, item: &Datum) -> bool {
        self.entries.contains_key(item)
    }

    fn items(&self) -> Box<dyn Iterator<Item = &Datum> + '_> {
        Box::new(self.entries.keys())
    }
}

impl PartialEq for ConstrainedMap {
    fn eq(&self, other: &Self) -> bool {
        self.guards.shape == other.guards.shape && self.entries == other.entries
    }
}

impl ConstrainedMap {
    pub fn construct(plan: &TypePlan, kind: ConstructorKind, args: &Args) -> Result<Self, ValidationFailure> {
        let (gathered, ctor) = gather(plan, kind, args)?;
        let entries = gathered.items.into_iter().zip(gathered.values).collect();
        let map = Self { guards: Guards::from_plan(plan), entries };
        after(&plan.shape, ctor, &map)?;
        Ok(map)
    }

    pub fn new(plan: &TypePlan, entries: BTreeMap<Datum, Datum>) -> Result<Self, ValidationFailure> {
        Self::construct(plan, ConstructorKind::Canonical, &super::args([("values", Datum::Map(entries))]))
    }

    pub fn entries(&self) -> &BTreeMap<Datum, Datum> {
        &self.entries
    }

    pub fn get(&self, key: &Datum) -> Option<&Datum> {
        self.entries.get(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn to_datum(&self) -> Datum {
        Datum::Map(self.entries.clone())
    }

    fn post_plan(&self, op: Operation) -> Result<&GuardPlan, ValidationFailure> {
        self.guards
            .plan(op)
            .ok_or_else(|| ValidationFailure::new(self.guards.shape.clone(), format!("{op} is not supported")))
    }

    /// Store a function's outcome: `None` removes the key.
    fn commit(&mut self, key: Datum, out: Option<Datum>) -> Option<Datum> {
        match out {
            Some(v) => {
                self.entries.insert(key, v.clone());
                Some(v)
            }
            None => {
                self.entries.remove(&key);
                None
            }
        }
    }

    pub fn put(&mut self, key: Datum, value: Datum) -> Result<Option<Datum>, ValidationFailure> {
        self.guards.before(Operation::Put, self, &Operands::argument(&key).with_value(&value))?;
        Ok(self.entries.insert(key, value))
    }

    /// Returns the existing value when the key is present; checks run either way.
    pub fn put_if_absent(&mut self, key: Datum, value: Datum) -> Result<Option<Datum>, ValidationFailure> {
        self.guards.before(Operation::PutIfAbsent, self, &Operands::argument(&key).with_value(&value))?;
        match self.entries.get(&key) {
            Some(existing) => Ok(Some(existing.clone())),
            None => {
                self.entries.insert(key, value);
                Ok(None)
            }
        }
    }

    /// Replace the value of a present key; absent keys are left alone.
    pub fn replace(&mut self, key: &Datum, value: Datum) -> Result<Option<Datum>, ValidationFailure> {
        self.guards.before(Operation::Replace, self, &Operands::argument(key).with_value(&value))?;
        Ok(self.entries.get_mut(key).map(|slot| std::mem::replace(slot, value)))
    }

    pub fn put_all(&mut self, incoming: Vec<(Datum, Datum)>) -> Result<(), ValidationFailure> {
        let (keys, values): (Vec<Datum>, Vec<Datum>) = incoming.into_iter().unzip();
        self.guards.before(Operation::PutAll, self, &Operands::entries(&keys, &values))?;
        self.entries.extend(keys.into_iter().zip(values));
        Ok(())
    }

    pub fn remove(&mut self, key: &Datum) -> Result<Option<Datum>, ValidationFailure> {
        self.guards.before(Operation::RemoveKey, self, &Operands::argument(key))?;
        Ok(self.entries.remove(key))
    }

    pub fn clear(&mut self) -> Result<(), ValidationFailure> {
        self.guards.before(Operation::Clear, self, &Operands::default())?;
        self.entries.clear();
        Ok(())
    }

    /// Absent keys take `value`; present ones take `f(old, value)`. A `None`
    /// result removes the key.
    pub fn merge<F>(&mut self, key: Datum, value: Datum, mut f: F) -> Result<Option<Datum>, ValidationFailure>
    where
        F: FnMut(&Datum, &Datum) -> Option<Datum>,
    {
        self.guards.before(Operation::Merge, self, &Operands::argument(&key))?;
        let existing = self.entries.get(&key).cloned();
        let plan = self.post_plan(Operation::Merge)?;
        let mut guarded = PostChecked::new(plan, &self.guards.shape, |(old, v): (Option<Datum>, Datum)| match old {
            Some(old) => f(&old, &v),
            None => Some(v),
        });
        let out = guarded.call(self, &key, (existing, value))?;
        Ok(self.commit(key, out))
    }

    pub fn compute<F>(&mut self, key: Datum, mut f: F) -> Result<Option<Datum>, ValidationFailure>
    where
        F: FnMut(&Datum, Option<&Datum>) -> Option<Datum>,
    {
        self.guards.before(Operation::Compute, self, &Operands::argument(&key))?;
        let existing = self.entries.get(&key).cloned();
        let plan = self.post_plan(Operation::Compute)?;
        let mut guarded = PostChecked::new(plan, &self.guards.shape, |(k, old): (&Datum, Option<Datum>)| {
            f(k, old.as_ref())
        });
        let out = guarded.call(self, &key, (&key, existing))?;
        Ok(self.commit(key, out))
    }

    /// Present keys return their value without calling `f`.
    pub fn compute_if_absent<F>(&mut self, key: Datum, mut f: F) -> Result<Option<Datum>, ValidationFailure>
    where
        F: FnMut(&Datum) -> Option<Datum>,
    {
        if let Some(existing) = self.entries.get(&key) {
            return Ok(Some(existing.clone()));
        }
        self.guards.before(Operation::ComputeIfAbsent, self, &Operands::argument(&key))?;
        let plan = self.post_plan(Operation::ComputeIfAbsent)?;
        let mut guarded = PostChecked::new(plan, &self.guards.shape, |k: &Datum| f(k));
        let out = guarded.call(self, &key, &key)?;
        Ok(match out {
            Some(v) => self.commit(key, Some(v)),
            None => None,
        })
    }

    /// Absent keys return `None` without calling `f`.
    pub fn compute_if_present<F>(&mut self, key: Datum, mut f: F) -> Result<Option<Datum>, ValidationFailure>
    where
        F: FnMut(&Datum, &Datum) -> Option<Datum>,
    {
        let Some(existing) = self.entries.get(&key).cloned() else {
            return Ok(None);
        };
        self.guards.before(Operation::ComputeIfPresent, self, &Operands::argument(&key))?;
        let plan = self.post_plan(Operation::ComputeIfPresent)?;
        let mut guarded = PostChecked::new(plan, &self.guards.shape, |(k, old): (&Datum, Datum)| f(k, &old));
        let out = guarded.call(self, &key, (&key, existing))?;
        Ok(self.commit(key, out))
    }

    /// Every new value is computed and validated before any is stored.
    pub fn replace_all<F>(&mut self, mut f: F) -> Result<(), ValidationFailure>
    where
        F: FnMut(&Datum, &Datum) -> Datum,
    {
        self.guards.before(Operation::ReplaceAll, self, &Operands::default())?;
        let plan = self.post_plan(Operation::ReplaceAll)?;
        let mut guarded = PostChecked::new(plan, &self.guards.shape, |(k, v): (&Datum, &Datum)| Some(f(k, v)));
        let mut staged = Vec::with_capacity(self.entries.len());
        for (k, v) in &self.entries {
            if let Some(out) = guarded.call(self, k, (k, v))? {
                staged.push((k.clone(), out));
            }
        }
        self.entries.extend(staged);
        Ok(())
    }
}

impl fmt::Display for ConstrainedMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{{\"values\":{}}}", self.guards.shape.name(), self.to_datum())
    }
}
