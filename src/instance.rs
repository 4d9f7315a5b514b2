//! Reference realization of composite and scalar plans.
//!
//! An [`Instance`] is what generated code would hold at run time: field
//! values assigned by one of the plan's constructors, compared and hashed
//! over the plan's equality and hash members, rendered in its textual form
//! and converted to and from JSON.
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{DefaultHasher, Hash, Hasher};

use chrono::DateTime;
use serde_json::Value;

use crate::constructors::ConstructorKind;
use crate::datum::Datum;
use crate::error::ValidationFailure;
use crate::guard::eval::run_checks;
use crate::guard::{Condition, Operands, Phase, Unbuilt};
use crate::plan::{AccessorStyle, MethodKind, PlanKind, TypePlan, TypeRef, ValueSource};
use crate::runtime::Args;
use crate::shape::NumberKind;

// ————————————————————————————————————————————————————————————————————————————
// TYPED CONVERSION
// ————————————————————————————————————————————————————————————————————————————

/// Convert a JSON value to the datum a field of type `ty` stores.
pub fn datum_for(ty: &TypeRef, v: &Value) -> Result<Datum, String> {
    match (ty, v) {
        (_, Value::Null) => Ok(Datum::Null),
        (TypeRef::Boolean, Value::Bool(b)) => Ok(Datum::Bool(*b)),
        (TypeRef::Number { kind }, Value::Number(n)) => {
            let x = n.as_f64().ok_or_else(|| format!("{n} is not a number"))?;
            number(*kind, x, n.as_i64())
        }
        (TypeRef::Number { kind }, Value::String(s)) if kind.is_floating() => match s.as_str() {
            "NaN" => Ok(Datum::float(f64::NAN)),
            "inf" | "Infinity" => Ok(Datum::float(f64::INFINITY)),
            "-inf" | "-Infinity" => Ok(Datum::float(f64::NEG_INFINITY)),
            _ => Err(format!("{s:?} is not a number")),
        },
        (TypeRef::Text, Value::String(s)) => Ok(Datum::Text(s.clone())),
        (TypeRef::Timestamp, Value::String(s)) => DateTime::parse_from_rfc3339(s)
            .map(|t| Datum::Timestamp(t.to_utc()))
            .map_err(|e| format!("{s:?} is not an RFC 3339 timestamp: {e}")),
        (TypeRef::Timestamp, Value::Number(n)) => n
            .as_i64()
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .map(Datum::Timestamp)
            .ok_or_else(|| format!("{n} is not an epoch timestamp")),
        (TypeRef::List { element }, Value::Array(xs)) => {
            xs.iter().map(|x| datum_for(element, x)).collect::<Result<_, _>>().map(Datum::List)
        }
        (TypeRef::Set { element }, Value::Array(xs)) => {
            xs.iter().map(|x| datum_for(element, x)).collect::<Result<_, _>>().map(Datum::Set)
        }
        (TypeRef::Map { key, value }, Value::Object(m)) => m
            .iter()
            .map(|(k, v)| Ok((map_key(key, k)?, datum_for(value, v)?)))
            .collect::<Result<_, String>>()
            .map(Datum::Map),
        (TypeRef::Named { .. }, other) => Ok(Datum::from_json(other)),
        (ty, other) => Err(format!("{other} does not fit {}", type_label(ty))),
    }
}

fn number(kind: NumberKind, x: f64, exact: Option<i64>) -> Result<Datum, String> {
    if kind.is_floating() {
        return Ok(match kind {
            NumberKind::Float => Datum::float(x as f32 as f64),
            _ => Datum::float(x),
        });
    }
    match exact {
        Some(i) => Ok(Datum::Int(i)),
        None if x.fract() == 0.0 && x.abs() < i64::MAX as f64 => Ok(Datum::Int(x as i64)),
        None => Err(format!("{x} is not an integer")),
    }
}

fn map_key(ty: &TypeRef, k: &str) -> Result<Datum, String> {
    match ty {
        TypeRef::Text | TypeRef::Named { .. } => Ok(Datum::text(k)),
        other => {
            let parsed: Value = serde_json::from_str(k).unwrap_or_else(|_| Value::String(k.to_string()));
            datum_for(other, &parsed)
        }
    }
}

fn type_label(ty: &TypeRef) -> &'static str {
    match ty {
        TypeRef::Boolean => "a boolean",
        TypeRef::Number { .. } => "a number",
        TypeRef::Text => "a string",
        TypeRef::Timestamp => "a timestamp",
        TypeRef::List { .. } | TypeRef::Set { .. } => "an array",
        TypeRef::Map { .. } => "an object",
        TypeRef::Named { .. } => "a value",
    }
}

/// Narrow a widened argument, already checked to be representable.
fn narrow(kind: NumberKind, d: &Datum) -> Result<Datum, String> {
    match d.as_f64() {
        Some(x) => number(kind, x, if let Datum::Int(i) = d { Some(*i) } else { None }),
        None => Err(format!("{d} is not a number")),
    }
}

// ————————————————————————————————————————————————————————————————————————————
// INSTANCE
// ————————————————————————————————————————————————————————————————————————————

/// A value of a generated composite or scalar type.
#[derive(Debug, Clone)]
pub struct Instance<'p> {
    plan: &'p TypePlan,
    /// Stored values by field; absent optional members have no entry.
    values: BTreeMap<String, Datum>,
}

impl<'p> Instance<'p> {
    pub fn construct(plan: &'p TypePlan, kind: ConstructorKind, args: &Args) -> Result<Self, ValidationFailure> {
        let shape = &plan.shape;
        let fail = |message: String| ValidationFailure::new(shape.clone(), message);
        let ctor = plan
            .constructor(kind)
            .ok_or_else(|| fail(format!("no {} constructor", kind.method_name())))?;
        let ops = Operands::params(args);
        run_checks(&ctor.guards, Phase::Before, shape, &Unbuilt, &ops)?;

        let given = |name: &str| args.get(name).filter(|d| !d.is_null());
        let mut values = BTreeMap::new();
        for a in &ctor.assignments {
            let ty = plan.field(&a.field).map(|f| &f.ty);
            let default = |v: &Value| match ty {
                Some(ty) => datum_for(ty, v).map_err(|e| fail(format!("default of `{}`: {e}", a.field))),
                None => Ok(Datum::from_json(v)),
            };
            let value = match &a.source {
                ValueSource::Param { name } => given(name).cloned(),
                ValueSource::ParamOrDefault { name, default: d } => match given(name) {
                    Some(v) => Some(v.clone()),
                    None => Some(default(d)?),
                },
                ValueSource::Narrowed { name, kind, default: d } => match (given(name), d) {
                    (Some(v), _) => Some(narrow(*kind, v).map_err(|e| fail(format!("`{name}`: {e}")))?),
                    (None, Some(d)) => Some(default(d)?),
                    (None, None) => None,
                },
                ValueSource::Collect { .. } | ValueSource::CollectPairs { .. } | ValueSource::Empty => {
                    return Err(fail(format!("`{}` is not a collection field", a.field)));
                }
            };
            if let Some(v) = value {
                values.insert(a.field.clone(), v);
            }
        }
        // cross-field relations hold over assigned values, defaults included
        let assigned = Operands::params(&values);
        let ordered = ctor.guards.iter().filter(|c| matches!(c.condition, Condition::Ordered { .. }));
        run_checks(ordered, Phase::Before, shape, &Unbuilt, &assigned)?;
        run_checks(&ctor.guards, Phase::After, shape, &Unbuilt, &assigned)?;
        Ok(Self { plan, values })
    }

    /// Canonical construction.
    pub fn new(plan: &'p TypePlan, args: &Args) -> Result<Self, ValidationFailure> {
        Self::construct(plan, ConstructorKind::Canonical, args)
    }

    /// The default-instance singleton, when the plan has one.
    pub fn default_instance(plan: &'p TypePlan) -> Option<Result<Self, ValidationFailure>> {
        let defaults = plan.default_instance.as_ref()?;
        let args = defaults
            .values
            .iter()
            .map(|(field, v)| {
                let ty = plan.field(field).map(|f| &f.ty).unwrap_or(&TypeRef::Text);
                datum_for(ty, v)
                    .map(|d| (field.clone(), d))
                    .map_err(|e| ValidationFailure::new(plan.shape.clone(), e))
            })
            .collect::<Result<Args, _>>();
        Some(args.and_then(|args| Self::new(plan, &args)))
    }

    pub fn plan(&self) -> &'p TypePlan {
        self.plan
    }

    /// Accessor of `field`: absent optional members yield `None`, direct
    /// accessors fall back to their default.
    pub fn get(&self, field: &str) -> Option<Datum> {
        if let Some(v) = self.values.get(field) {
            return Some(v.clone());
        }
        let accessor = self.plan.accessor(field)?;
        match &accessor.style {
            AccessorStyle::Optional | AccessorStyle::Direct { default: None } => None,
            AccessorStyle::Direct { default: Some(d) } => datum_for(&accessor.ty, d).ok(),
        }
    }

    fn stored(&self, field: &str) -> &Datum {
        self.values.get(field).unwrap_or(&Datum::Null)
    }

    /// Additive hash over the plan's hash terms.
    pub fn hash_code(&self) -> i64 {
        self.plan.hash.iter().fold(0i64, |h, term| {
            let mut hasher = DefaultHasher::new();
            self.stored(&term.field).hash(&mut hasher);
            h.wrapping_add((hasher.finish() as i64).wrapping_mul(term.prime as i64))
        })
    }

    pub fn to_json(&self) -> Value {
        let mut out = serde_json::Map::new();
        for field in &self.plan.fields {
            if let Some(v) = self.values.get(&field.name) {
                out.insert(field.json_name.clone(), v.to_json());
            }
        }
        match self.plan.kind {
            PlanKind::Scalar | PlanKind::Enum => out.into_iter().next().map(|(_, v)| v).unwrap_or(Value::Null),
            _ => Value::Object(out),
        }
    }

    /// Decode through the canonical constructor, so every guard applies.
    pub fn from_json(plan: &'p TypePlan, v: &Value) -> Result<Self, ValidationFailure> {
        let fail = |message: String| ValidationFailure::new(plan.shape.clone(), message);
        let mut args = Args::new();
        match (plan.kind, v) {
            (PlanKind::Scalar | PlanKind::Enum, v) => {
                if let Some(field) = plan.fields.first() {
                    args.insert(field.name.clone(), datum_for(&field.ty, v).map_err(fail)?);
                }
            }
            (_, Value::Object(m)) => {
                for field in &plan.fields {
                    if let Some(raw) = m.get(&field.json_name) {
                        let d = datum_for(&field.ty, raw).map_err(|e| fail(format!("`{}`: {e}", field.json_name)))?;
                        args.insert(field.name.clone(), d);
                    }
                }
            }
            (_, other) => return Err(fail(format!("expected an object, got {other}"))),
        }
        Self::new(plan, &args)
    }

    /// Evaluate an auxiliary method of the plan.
    pub fn call(&self, method: &str) -> Option<Datum> {
        match &self.plan.method(method)?.kind {
            MethodKind::IsEmptySpan { lesser, greater } => Some(Datum::Bool(self.stored(lesser) == self.stored(greater))),
            MethodKind::SpanSize { lesser, greater, ty } => {
                let (lo, hi) = (self.stored(lesser), self.stored(greater));
                match (lo, hi) {
                    (Datum::Int(a), Datum::Int(b)) if ty.is_integral() => Some(Datum::Int(b.wrapping_sub(*a))),
                    _ => Some(Datum::float(hi.as_f64()? - lo.as_f64()?)),
                }
            }
            MethodKind::ToJson => Some(Datum::from_json(&self.to_json())),
            MethodKind::IsEmpty => None,
        }
    }
}

impl PartialEq for Instance<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.plan.shape == other.plan.shape
            && self.plan.equality.iter().all(|f| self.stored(f) == other.stored(f))
    }
}

impl Eq for Instance<'_> {}

impl Hash for Instance<'_> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_i64(self.hash_code());
    }
}

impl fmt::Display for Instance<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{{", self.plan.text.type_name)?;
        for (i, entry) in self.plan.text.entries.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            let label = Value::String(entry.label.clone());
            match self.values.get(&entry.field) {
                Some(v) if entry.quoted => write!(f, "{label}:{}", v.to_json())?,
                Some(v) => write!(f, "{label}:{v}")?,
                None => write!(f, "{label}:null")?,
            }
        }
        f.write_str("}")
    }
}
