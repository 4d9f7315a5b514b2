//! Rust source backend.
//!
//! All types rendered by one backend land in one self-contained module:
//! a small prelude (the failure type, hashing and range helpers, compiled
//! patterns) followed by one struct and its impls per plan.
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;

use convert_case::{Case, Casing};
use serde_json::Value;

use super::{ConstructorDecl, EmissionBackend, FailureReporter, MethodDecl, MethodRole, ResultReporter, Returned, Statement};
use crate::constraints::ValueCheck;
use crate::guard::{Condition, Gate, Operation, SizeExpr, Subject};
use crate::plan::{AccessorStyle, FieldPlan, MethodKind, Param, PlanKind, TypePlan, TypeRef, ValueSource};
use crate::shape::{NumberKind, ShapeId};

const INDENT: &str = "    ";

const PRELUDE: &str = r#"use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::hash::{DefaultHasher, Hash, Hasher};

/// Raised when a value would violate its schema constraints.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationFailure {
    pub shape: &'static str,
    pub message: String,
    pub value: Option<String>,
    pub limit: Option<String>,
}

impl ValidationFailure {
    pub fn new(shape: &'static str, message: impl Into<String>) -> Self {
        Self { shape, message: message.into(), value: None, limit: None }
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn with_limit(mut self, limit: impl Into<String>) -> Self {
        self.limit = Some(limit.into());
        self
    }
}

impl fmt::Display for ValidationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.shape, self.message)
    }
}

impl std::error::Error for ValidationFailure {}

/// Hashing that agrees with the generated equality.
trait HashValue {
    fn hash_value<H: Hasher>(&self, state: &mut H);
}

macro_rules! hash_value_by_hash {
    ($($t:ty),*) => {$(
        impl HashValue for $t {
            fn hash_value<H: Hasher>(&self, state: &mut H) {
                Hash::hash(self, state);
            }
        }
    )*};
}

hash_value_by_hash!(bool, i8, i16, i32, i64, i128, String);

impl HashValue for f64 {
    fn hash_value<H: Hasher>(&self, state: &mut H) {
        // `0.0 == -0.0`
        let v = if *self == 0.0 { 0.0 } else { *self };
        state.write_u64(v.to_bits());
    }
}

impl HashValue for f32 {
    fn hash_value<H: Hasher>(&self, state: &mut H) {
        f64::from(*self).hash_value(state);
    }
}

impl<T: HashValue> HashValue for Option<T> {
    fn hash_value<H: Hasher>(&self, state: &mut H) {
        match self {
            Some(v) => {
                state.write_u8(1);
                v.hash_value(state);
            }
            None => state.write_u8(0),
        }
    }
}

impl<T: HashValue> HashValue for Vec<T> {
    fn hash_value<H: Hasher>(&self, state: &mut H) {
        state.write_usize(self.len());
        for v in self {
            v.hash_value(state);
        }
    }
}

impl<T: HashValue> HashValue for BTreeSet<T> {
    fn hash_value<H: Hasher>(&self, state: &mut H) {
        state.write_usize(self.len());
        for v in self {
            v.hash_value(state);
        }
    }
}

impl<K: HashValue, V: HashValue> HashValue for BTreeMap<K, V> {
    fn hash_value<H: Hasher>(&self, state: &mut H) {
        state.write_usize(self.len());
        for (k, v) in self {
            k.hash_value(state);
            v.hash_value(state);
        }
    }
}

fn hash_of<T: HashValue>(value: &T) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash_value(&mut hasher);
    hasher.finish()
}
"#;

const TIMESTAMP_HASH: &str = r#"
impl HashValue for chrono::DateTime<chrono::Utc> {
    fn hash_value<H: Hasher>(&self, state: &mut H) {
        Hash::hash(self, state);
    }
}
"#;

/// Range checks compare integers as integers: `i64` values beyond 2^53 stay exact.
const BOUNDED: &str = r#"
trait Bounded {
    fn at_least(&self, limit: f64) -> bool;
    fn at_most(&self, limit: f64) -> bool;
}

macro_rules! bounded_integer {
    ($($t:ty),*) => {$(
        impl Bounded for $t {
            fn at_least(&self, limit: f64) -> bool {
                i128::from(*self) >= limit.ceil() as i128
            }
            fn at_most(&self, limit: f64) -> bool {
                i128::from(*self) <= limit.floor() as i128
            }
        }
    )*};
}

bounded_integer!(i8, i16, i32, i64, i128);

impl Bounded for f64 {
    fn at_least(&self, limit: f64) -> bool {
        *self >= limit
    }
    fn at_most(&self, limit: f64) -> bool {
        *self <= limit
    }
}

impl Bounded for f32 {
    fn at_least(&self, limit: f64) -> bool {
        f64::from(*self) >= limit
    }
    fn at_most(&self, limit: f64) -> bool {
        f64::from(*self) <= limit
    }
}
"#;

pub fn rust_type(ty: &TypeRef) -> String {
    match ty {
        TypeRef::Boolean => "bool".to_string(),
        TypeRef::Number { kind } => number_type(*kind).to_string(),
        TypeRef::Text => "String".to_string(),
        TypeRef::Timestamp => "chrono::DateTime<chrono::Utc>".to_string(),
        TypeRef::List { element } => format!("Vec<{}>", rust_type(element)),
        TypeRef::Set { element } => format!("BTreeSet<{}>", rust_type(element)),
        TypeRef::Map { key, value } => format!("BTreeMap<{}, {}>", rust_type(key), rust_type(value)),
        TypeRef::Named { id } => id.name().to_string(),
    }
}

fn number_type(kind: NumberKind) -> &'static str {
    match kind {
        NumberKind::Byte => "i8",
        NumberKind::Short => "i16",
        NumberKind::Integer => "i32",
        NumberKind::Long => "i64",
        NumberKind::Float => "f32",
        NumberKind::Double | NumberKind::BigDecimal => "f64",
        NumberKind::BigInteger => "i128",
    }
}

/// Rust expression for a JSON default of type `ty`.
fn literal(ty: &TypeRef, v: &Value) -> String {
    match (ty, v) {
        (TypeRef::Boolean, Value::Bool(b)) => b.to_string(),
        (TypeRef::Number { kind }, Value::Number(n)) if kind.is_floating() => {
            format!("{:?}", n.as_f64().unwrap_or_default())
        }
        (TypeRef::Number { .. }, Value::Number(n)) => n.to_string(),
        (TypeRef::Text, Value::String(s)) => format!("{s:?}.to_string()"),
        (TypeRef::Timestamp, Value::String(s)) => format!("{s:?}.parse().unwrap_or_default()"),
        (TypeRef::List { element }, Value::Array(xs)) => {
            let items: Vec<_> = xs.iter().map(|x| literal(element, x)).collect();
            format!("vec![{}]", items.join(", "))
        }
        (TypeRef::Set { element }, Value::Array(xs)) => {
            let items: Vec<_> = xs.iter().map(|x| literal(element, x)).collect();
            format!("BTreeSet::from([{}])", items.join(", "))
        }
        (TypeRef::Map { key, value }, Value::Object(m)) => {
            let items: Vec<_> = m
                .iter()
                .map(|(k, v)| format!("({}, {})", literal(key, &Value::String(k.clone())), literal(value, v)))
                .collect();
            format!("BTreeMap::from([{}])", items.join(", "))
        }
        _ => "Default::default()".to_string(),
    }
}


fn mentions_timestamp(ty: &TypeRef) -> bool {
    match ty {
        TypeRef::Timestamp => true,
        TypeRef::List { element } | TypeRef::Set { element } => mentions_timestamp(element),
        TypeRef::Map { key, value } => mentions_timestamp(key) || mentions_timestamp(value),
        _ => false,
    }
}

/// Scalar and enum wrappers are checked through the value they hold.
fn unwrapped(place: String, ty: Option<&TypeRef>) -> String {
    match ty {
        Some(TypeRef::Named { .. }) => format!("(*{place}.value())"),
        _ => place,
    }
}

// ---- scopes ---- //

/// Names visible to the statements of one constructor or method.
#[derive(Clone, Copy)]
struct Scope<'a> {
    shape: &'a ShapeId,
    /// Expression of the container being changed or built.
    recv: &'static str,
    incoming: &'static str,
    /// Argument of single-item operations, and whether it is a reference.
    argument: &'static str,
    argument_is_ref: bool,
    is_map: bool,
    params: &'a [Param],
    fields: &'a [FieldPlan],
    /// Element type of lists and sets, value type of maps.
    item_ty: Option<&'a TypeRef>,
    key_ty: Option<&'a TypeRef>,
    /// A caller function's `result` is in scope.
    has_result: bool,
}

impl<'a> Scope<'a> {
    fn contains(&self) -> String {
        let arg = if self.argument_is_ref { self.argument.to_string() } else { format!("&{}", self.argument) };
        if self.is_map {
            format!("{}.contains_key({arg})", self.recv)
        } else {
            format!("{}.contains({arg})", self.recv)
        }
    }

    fn place(&self, name: &'static str) -> String {
        if self.argument_is_ref && name == self.argument { format!("(*{name})") } else { name.to_string() }
    }

    fn param(&self, name: &str) -> Option<&'a Param> {
        self.params.iter().find(|p| p.name == name)
    }

    fn optional_field(&self, name: &str) -> bool {
        self.fields.iter().any(|f| f.name == name && f.optional)
    }

    fn each(&self, subject: &Subject) -> String {
        match subject {
            Subject::EachKey => format!("{}.keys()", self.incoming),
            Subject::EachValue => format!("{}.values()", self.incoming),
            _ => format!("{}.iter()", self.incoming),
        }
    }

    fn subject_type(&self, subject: &Subject) -> Option<&'a TypeRef> {
        match subject {
            Subject::Param(name) => self.param(name).map(|p| &p.ty),
            Subject::Key | Subject::EachKey => self.key_ty,
            Subject::Argument | Subject::EachIncoming if self.is_map => self.key_ty,
            _ => self.item_ty,
        }
    }
}

fn size_expr(size: &SizeExpr, sc: &Scope<'_>) -> String {
    let n = format!("{}.len()", sc.recv);
    let inc = sc.incoming;
    let lookup = if sc.is_map { "contains_key" } else { "contains" };
    match size {
        SizeExpr::Current => n,
        SizeExpr::Incoming { distinct } if *distinct && !sc.is_map => {
            format!("{inc}.iter().collect::<BTreeSet<_>>().len()")
        }
        SizeExpr::Incoming { .. } => format!("{inc}.len()"),
        SizeExpr::CurrentPlusOne { gate: Gate::IfAbsent } => format!("{n} + usize::from(!{})", sc.contains()),
        SizeExpr::CurrentPlusOne { gate: Gate::IfPresent } => format!("{n} + usize::from({})", sc.contains()),
        SizeExpr::CurrentPlusOne { gate: Gate::Always } => format!("{n} + 1"),
        SizeExpr::CurrentMinusOne { gate: Gate::IfPresent } => format!("{n} - usize::from({})", sc.contains()),
        SizeExpr::CurrentMinusOne { gate: Gate::IfAbsent } => format!("{n} - usize::from(!{})", sc.contains()),
        SizeExpr::CurrentMinusOne { gate: Gate::Always } => format!("{n}.saturating_sub(1)"),
        SizeExpr::CurrentPlusIncoming => format!("{n} + {inc}.len()"),
        SizeExpr::CurrentPlusDistinctNew if sc.is_map => {
            format!("{n} + {inc}.keys().filter(|k| !{}.contains_key(*k)).count()", sc.recv)
        }
        SizeExpr::CurrentPlusDistinctNew => format!(
            "{n} + {inc}.iter().filter(|x| !{}.{lookup}(*x)).collect::<BTreeSet<_>>().len()",
            sc.recv
        ),
        SizeExpr::AfterRemovingAll => format!("{}.iter().filter(|x| !{inc}.contains(*x)).count()", sc.recv),
        SizeExpr::AfterRetaining { materialize: true } => format!(
            "{{ let kept: BTreeSet<_> = {inc}.iter().collect(); {}.iter().filter(|x| kept.contains(x)).count() }}",
            sc.recv
        ),
        SizeExpr::AfterRetaining { materialize: false } => {
            format!("{}.iter().filter(|x| {inc}.contains(*x)).count()", sc.recv)
        }
        SizeExpr::AfterResult => format!(
            "match ({}, &result) {{ (false, Some(_)) => {n} + 1, (true, None) => {n} - 1, _ => {n} }}",
            sc.contains()
        ),
    }
}

// ————————————————————————————————————————————————————————————————————————————
// BACKEND
// ————————————————————————————————————————————————————————————————————————————

pub struct RustBackend {
    reporter: Box<dyn FailureReporter>,
    /// Import paths keyed by the shape they name.
    imports: BTreeMap<String, String>,
    /// Shapes this backend has rendered.
    rendered: BTreeSet<String>,
    patterns: Vec<String>,
    uses_bounds: bool,
    uses_timestamps: bool,
    body: String,
    fields: Vec<String>,
    methods: Vec<String>,
    impls: Vec<String>,
}

impl Default for RustBackend {
    fn default() -> Self {
        Self::new(Box::new(ResultReporter))
    }
}

impl RustBackend {
    pub fn new(reporter: Box<dyn FailureReporter>) -> Self {
        Self {
            reporter,
            imports: BTreeMap::new(),
            rendered: BTreeSet::new(),
            patterns: Vec::new(),
            uses_bounds: false,
            uses_timestamps: false,
            body: String::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            impls: Vec::new(),
        }
    }

    /// The complete module text.
    pub fn finish(self) -> String {
        let mut out = String::from("// Generated by shape-synth. Do not edit.\n");
        out.push_str(PRELUDE);
        if self.uses_timestamps {
            out.push_str(TIMESTAMP_HASH);
        }
        if self.uses_bounds {
            out.push_str(BOUNDED);
        }
        // a rendered type is already in scope
        let imported: Vec<_> = self.imports.iter().filter(|(id, _)| !self.rendered.contains(*id)).collect();
        for (_, import) in &imported {
            let _ = writeln!(out, "use {import};");
        }
        // each module hashes through its own `HashValue`
        for (id, _) in &imported {
            let name = ShapeId::new(id.as_str());
            let _ = write!(
                out,
                "\nimpl HashValue for {} {{\n    fn hash_value<H: Hasher>(&self, state: &mut H) {{\n        state.write_u64(self.hash_code());\n    }}\n}}\n",
                name.name()
            );
        }
        if !self.patterns.is_empty() {
            out.push_str("\nuse once_cell::sync::Lazy;\nuse regex::Regex;\n");
            for (i, p) in self.patterns.iter().enumerate() {
                let _ = writeln!(
                    out,
                    "\nstatic PATTERN_{i}: Lazy<Regex> = Lazy::new(|| Regex::new(r#\"{p}\"#).expect(\"pattern checked at generation time\"));"
                );
            }
        }
        out.push_str(&self.body);
        out
    }

    fn pattern(&mut self, source: &str) -> String {
        let i = match self.patterns.iter().position(|p| p == source) {
            Some(i) => i,
            None => {
                self.patterns.push(source.to_string());
                self.patterns.len() - 1
            }
        };
        format!("PATTERN_{i}")
    }

    /// Expression that holds when `p`, of type `ty`, passes `check`.
    fn passes(&mut self, check: &ValueCheck, p: &str, ty: Option<&TypeRef>) -> String {
        let from = ty.and_then(TypeRef::number_kind);
        match check {
            ValueCheck::Finite => format!("{p}.is_finite()"),
            ValueCheck::Representable { kind } => match (kind.representable(), from) {
                (None, _) => "true".to_string(),
                (Some(_), Some(from)) if kind.is_integral() && from.is_integral() => {
                    format!("{}::try_from({p}).is_ok()", number_type(*kind))
                }
                (Some((lo, hi)), _) if kind.is_integral() => {
                    format!("f64::from({p}).fract() == 0.0 && ({lo:?}..={hi:?}).contains(&f64::from({p}))")
                }
                // NaN and the infinities exist in every floating kind
                (Some((lo, hi)), _) => format!("!{p}.is_finite() || ({lo:?}..={hi:?}).contains(&f64::from({p}))"),
            },
            ValueCheck::MinValue { limit } => {
                self.uses_bounds = true;
                format!("{p}.at_least({limit:?})")
            }
            ValueCheck::MaxValue { limit } => {
                self.uses_bounds = true;
                format!("{p}.at_most({limit:?})")
            }
            ValueCheck::MinLength { limit } => format!("{p}.chars().count() >= {limit}"),
            ValueCheck::MaxLength { limit } => format!("{p}.chars().count() <= {limit}"),
            ValueCheck::OneOf { variants } => format!("{variants:?}.contains(&{p}.as_str())"),
            ValueCheck::Pattern { pattern } => {
                let name = self.pattern(pattern.source());
                format!("{name}.is_match(&{p})")
            }
        }
    }

    fn fail(&self, sc: &Scope<'_>, stmts: &[Statement], value: Option<&str>, out: &mut String, depth: usize) {
        for s in stmts {
            if let Statement::Fail { failure, .. } = s {
                line(out, depth, &self.reporter.report(sc.shape, failure, value));
            }
        }
    }

    fn statements(&mut self, stmts: &[Statement], sc: &Scope<'_>, out: &mut String, depth: usize) {
        for s in stmts {
            self.statement(s, sc, out, depth);
        }
    }

    fn statement(&mut self, s: &Statement, sc: &Scope<'_>, out: &mut String, depth: usize) {
        match s {
            Statement::If { violated, then } => self.guard(violated, then, sc, out, depth),
            Statement::Fail { .. } => self.fail(sc, std::slice::from_ref(s), None, out, depth),
            Statement::Assign { field, source } => {
                let expr = assignment(source, sc);
                line(out, depth, &format!("let {field} = {expr};"));
            }
            Statement::Return(_) | Statement::Call { .. } => {}
        }
    }

    fn guard(&mut self, violated: &Condition, then: &[Statement], sc: &Scope<'_>, out: &mut String, depth: usize) {
        match violated {
            Condition::Always => self.fail(sc, then, None, out, depth),
            Condition::MaxSize { size, limit } | Condition::MinSize { size, limit } => {
                let op = if matches!(violated, Condition::MaxSize { .. }) { ">" } else { "<" };
                line(out, depth, &format!("let size = {};", size_expr(size, sc)));
                line(out, depth, &format!("if size {op} {limit} {{"));
                self.fail(sc, then, Some("size"), out, depth + 1);
                line(out, depth, "}");
            }
            Condition::NotNull { subject: Subject::Param(name) } => {
                if sc.param(name).is_some_and(|p| p.optional) {
                    line(out, depth, &format!("if {name}.is_none() {{"));
                    self.fail(sc, then, None, out, depth + 1);
                    line(out, depth, "}");
                }
            }
            Condition::NotNull { .. } => {}
            Condition::Ordered { lesser, greater, allow_equal } => {
                let op = if *allow_equal { ">" } else { ">=" };
                let pair = format!("({lesser}, {greater})");
                // an absent side leaves nothing to compare
                if sc.optional_field(lesser) || sc.optional_field(greater) {
                    let bind = |f: &str| if sc.optional_field(f) { format!("&{f}") } else { format!("&Some({f})") };
                    line(out, depth, &format!("if let (Some(l), Some(g)) = ({}, {}) {{", bind(lesser), bind(greater)));
                    line(out, depth + 1, &format!("if l {op} g {{"));
                    self.fail(sc, then, Some("(l, g)"), out, depth + 2);
                    line(out, depth + 1, "}");
                    line(out, depth, "}");
                    return;
                }
                line(out, depth, &format!("if {lesser} {op} {greater} {{"));
                self.fail(sc, then, Some(&pair), out, depth + 1);
                line(out, depth, "}");
            }
            Condition::Value { subject, check, only_if_new } => {
                let mut depth = depth;
                if *only_if_new {
                    // a key is only new if the caller's function stores something
                    let stored = if sc.has_result { " && result.is_some()" } else { "" };
                    line(out, depth, &format!("if !{}{stored} {{", sc.contains()));
                    depth += 1;
                }
                self.value_guard(subject, check, then, sc, out, depth);
                if *only_if_new {
                    line(out, depth - 1, "}");
                }
            }
        }
    }

    fn value_guard(
        &mut self,
        subject: &Subject,
        check: &ValueCheck,
        then: &[Statement],
        sc: &Scope<'_>,
        out: &mut String,
        depth: usize,
    ) {
        let ty = sc.subject_type(subject);
        let (open, place, shown) = match subject {
            Subject::EachIncoming | Subject::EachKey | Subject::EachValue => {
                let test = self.passes(check, &unwrapped("(**x)".to_string(), ty), ty);
                (format!("if let Some(bad) = {}.find(|x| !({test})) {{", sc.each(subject)), None, "bad".to_string())
            }
            Subject::FunctionResult => ("if let Some(r) = &result {".to_string(), Some("(*r)".to_string()), "r".to_string()),
            Subject::Param(name) if sc.param(name).is_some_and(|p| p.optional) => {
                (format!("if let Some(v) = &{name} {{"), Some("(*v)".to_string()), "v".to_string())
            }
            Subject::Param(name) => (String::new(), Some(name.clone()), format!("&{name}")),
            Subject::Argument => (String::new(), Some(sc.place(sc.argument)), sc.argument.to_string()),
            Subject::Key => (String::new(), Some(sc.place("key")), "key".to_string()),
            Subject::Value => (String::new(), Some("value".to_string()), "value".to_string()),
        };
        let nested = !open.is_empty();
        if nested {
            line(out, depth, &open);
        }
        let inner = if nested { depth + 1 } else { depth };
        match place {
            Some(p) => {
                let test = self.passes(check, &unwrapped(p, ty), ty);
                line(out, inner, &format!("if !({test}) {{"));
                self.fail(sc, then, Some(&shown), out, inner + 1);
                line(out, inner, "}");
            }
            None => self.fail(sc, then, Some(&shown), out, inner),
        }
        if nested {
            line(out, depth, "}");
        }
    }
}

fn line(out: &mut String, depth: usize, text: &str) {
    for _ in 0..depth {
        out.push_str(INDENT);
    }
    out.push_str(text);
    out.push('\n');
}

fn narrow_expr(v: &str, kind: NumberKind) -> String {
    format!("{v} as {}", number_type(kind))
}

fn assignment(source: &ValueSource, sc: &Scope<'_>) -> String {
    let optional = |name: &str| sc.param(name).is_some_and(|p| p.optional);
    let ty_of = |name: &str| sc.param(name).map(|p| p.ty.clone()).unwrap_or(TypeRef::Text);
    match source {
        ValueSource::Param { name } => name.clone(),
        ValueSource::ParamOrDefault { name, default } => {
            let lit = literal(&ty_of(name), default);
            if optional(name) { format!("{name}.unwrap_or_else(|| {lit})") } else { name.clone() }
        }
        ValueSource::Narrowed { name, kind, default } => match (optional(name), default) {
            (true, Some(d)) => {
                let lit = literal(&TypeRef::Number { kind: *kind }, d);
                format!("{name}.map(|v| {}).unwrap_or({lit})", narrow_expr("v", *kind))
            }
            (true, None) => format!("{name}.map(|v| {})", narrow_expr("v", *kind)),
            (false, _) => narrow_expr(name, *kind),
        },
        ValueSource::Collect { names } => format!("[{}].into_iter().collect()", names.join(", ")),
        ValueSource::CollectPairs { names } => {
            let pairs: Vec<_> = names.chunks(2).map(|c| format!("({})", c.join(", "))).collect();
            format!("BTreeMap::from([{}])", pairs.join(", "))
        }
        ValueSource::Empty => "Default::default()".to_string(),
    }
}

fn is_container(kind: PlanKind) -> bool {
    matches!(kind, PlanKind::List | PlanKind::Set | PlanKind::Map)
}

/// Wrappers serialize as the single value they hold.
fn is_wrapper(kind: PlanKind) -> bool {
    !matches!(kind, PlanKind::Structure | PlanKind::Union)
}

fn element_types(plan: &TypePlan) -> (String, String) {
    match plan.fields.first().map(|f| &f.ty) {
        Some(TypeRef::Map { key, value }) => (rust_type(key), rust_type(value)),
        Some(TypeRef::List { element } | TypeRef::Set { element }) => (rust_type(element), String::new()),
        _ => ("Value".to_string(), String::new()),
    }
}

/// Item and key types of a container plan.
fn item_types(plan: &TypePlan) -> (Option<&TypeRef>, Option<&TypeRef>) {
    if !is_container(plan.kind) {
        return (None, None);
    }
    match plan.fields.first().map(|f| &f.ty) {
        Some(TypeRef::Map { key, value }) => (Some(&**value), Some(&**key)),
        Some(TypeRef::List { element } | TypeRef::Set { element }) => (Some(&**element), None),
        _ => (None, None),
    }
}

fn doc_lines(out: &mut String, depth: usize, doc: &[String]) {
    for d in doc {
        for l in d.lines() {
            line(out, depth, &format!("/// {l}").trim_end().to_string());
        }
    }
}

fn param_type(p: &Param) -> String {
    let ty = rust_type(&p.ty);
    if p.optional { format!("Option<{ty}>") } else { ty }
}

impl RustBackend {
    fn constructor_scope<'a>(plan: &'a TypePlan, params: &'a [Param]) -> Scope<'a> {
        let (item_ty, key_ty) = item_types(plan);
        Scope {
            shape: &plan.shape,
            recv: "values",
            incoming: "values",
            argument: "item",
            argument_is_ref: false,
            is_map: plan.kind == PlanKind::Map,
            params,
            fields: &plan.fields,
            item_ty,
            key_ty,
            has_result: false,
        }
    }

    fn mutator_scope(plan: &TypePlan, op: Operation) -> Scope<'_> {
        let is_map = plan.kind == PlanKind::Map;
        let argument_is_ref = matches!(op, Operation::Remove | Operation::Replace | Operation::RemoveKey);
        let (item_ty, key_ty) = item_types(plan);
        Scope {
            shape: &plan.shape,
            recv: "self.values",
            incoming: if op == Operation::PutAll { "entries" } else { "items" },
            argument: if is_map { "key" } else { "item" },
            argument_is_ref,
            is_map,
            params: &[],
            fields: &plan.fields,
            item_ty,
            key_ty,
            has_result: false,
        }
    }

    /// Signature and operation body of one mutator.
    fn mutator(&mut self, plan: &TypePlan, op: Operation, decl: &MethodDecl) -> String {
        let (t, v) = element_types(plan);
        let is_set = plan.kind == PlanKind::Set;
        let sc = Self::mutator_scope(plan, op);
        let (signature, returns) = match op {
            Operation::Add => (format!("item: {t}"), if is_set { "bool" } else { "()" }.to_string()),
            Operation::Remove => (format!("item: &{t}"), "bool".to_string()),
            Operation::RemoveAt => ("index: usize".to_string(), t.clone()),
            Operation::AddAll => (format!("items: Vec<{t}>"), "()".to_string()),
            Operation::RemoveAll | Operation::RetainAll => (format!("items: &[{t}]"), "bool".to_string()),
            Operation::Put | Operation::PutIfAbsent => (format!("key: {t}, value: {v}"), format!("Option<{v}>")),
            Operation::Replace => (format!("key: &{t}, value: {v}"), format!("Option<{v}>")),
            Operation::PutAll => (format!("entries: BTreeMap<{t}, {v}>"), "()".to_string()),
            Operation::RemoveKey => (format!("key: &{t}"), format!("Option<{v}>")),
            Operation::Merge => (
                format!("key: {t}, value: {v}, f: impl FnOnce(&{v}, {v}) -> Option<{v}>"),
                format!("Option<{v}>"),
            ),
            Operation::Compute => {
                (format!("key: {t}, f: impl FnOnce(&{t}, Option<&{v}>) -> Option<{v}>"), format!("Option<{v}>"))
            }
            Operation::ComputeIfAbsent => (format!("key: {t}, f: impl FnOnce(&{t}) -> Option<{v}>"), format!("Option<{v}>")),
            Operation::ComputeIfPresent => {
                (format!("key: {t}, f: impl FnOnce(&{t}, &{v}) -> Option<{v}>"), format!("Option<{v}>"))
            }
            Operation::ReplaceAll => (format!("mut f: impl FnMut(&{t}, &{v}) -> {v}"), "()".to_string()),
            Operation::Clear | Operation::Construct => (String::new(), "()".to_string()),
        };
        let mut out = String::new();
        if let Some(doc) = &decl.doc {
            line(&mut out, 1, &format!("/// {doc}"));
        }
        let sep = if signature.is_empty() { "" } else { ", " };
        line(
            &mut out,
            1,
            &format!("pub fn {}(&mut self{sep}{signature}) -> Result<{returns}, ValidationFailure> {{", decl.name),
        );
        if op == Operation::RemoveAt {
            line(&mut out, 2, "if index >= self.values.len() {");
            line(
                &mut out,
                3,
                &format!("return Err(ValidationFailure::new({:?}, format!(\"index {{index}} out of bounds\")));", plan.shape.as_str()),
            );
            line(&mut out, 2, "}");
        }
        for s in &decl.body {
            match s {
                Statement::Call { operation, on_result } => self.call(plan, *operation, on_result, &sc, &mut out),
                other => self.statement(other, &sc, &mut out, 2),
            }
            // nothing after an unconditional failure is reachable
            if matches!(s, Statement::If { violated: Condition::Always, .. }) {
                break;
            }
        }
        line(&mut out, 1, "}");
        out
    }

    fn call(&mut self, plan: &TypePlan, op: Operation, on_result: &[Statement], sc: &Scope<'_>, out: &mut String) {
        let is_set = plan.kind == PlanKind::Set;
        let after = Scope { has_result: true, ..*sc };
        let checked = |this: &mut Self, out: &mut String, depth: usize| this.statements(on_result, &after, out, depth);
        let commit = [
            "match &result {",
            "    Some(v) => { self.values.insert(key, v.clone()); }",
            "    None => { self.values.remove(&key); }",
            "}",
            "Ok(result)",
        ];
        let lines: &[&str] = match op {
            Operation::Add if is_set => &["Ok(self.values.insert(item))"],
            Operation::Add => &["self.values.push(item);", "Ok(())"],
            Operation::Remove if is_set => &["Ok(self.values.remove(item))"],
            Operation::Remove => &[
                "match self.values.iter().position(|x| x == item) {",
                "    Some(i) => { self.values.remove(i); Ok(true) }",
                "    None => Ok(false),",
                "}",
            ],
            Operation::RemoveAt => &["Ok(self.values.remove(index))"],
            Operation::AddAll => &["self.values.extend(items);", "Ok(())"],
            Operation::PutAll => &["self.values.extend(entries);", "Ok(())"],
            Operation::RemoveAll => &[
                "let before = self.values.len();",
                "self.values.retain(|x| !items.contains(x));",
                "Ok(self.values.len() != before)",
            ],
            Operation::RetainAll => &[
                "let before = self.values.len();",
                "self.values.retain(|x| items.contains(x));",
                "Ok(self.values.len() != before)",
            ],
            Operation::Put => &["Ok(self.values.insert(key, value))"],
            Operation::PutIfAbsent => &[
                "if let Some(existing) = self.values.get(&key) {",
                "    return Ok(Some(existing.clone()));",
                "}",
                "self.values.insert(key, value);",
                "Ok(None)",
            ],
            Operation::Replace => &["Ok(self.values.get_mut(key).map(|slot| std::mem::replace(slot, value)))"],
            Operation::RemoveKey => &["Ok(self.values.remove(key))"],
            Operation::Clear => &["self.values.clear();", "Ok(())"],
            Operation::Merge => {
                line(out, 2, "let result = match self.values.get(&key) {");
                line(out, 3, "Some(old) => f(old, value),");
                line(out, 3, "None => Some(value),");
                line(out, 2, "};");
                checked(self, out, 2);
                &commit
            }
            Operation::Compute => {
                line(out, 2, "let result = f(&key, self.values.get(&key));");
                checked(self, out, 2);
                &commit
            }
            Operation::ComputeIfAbsent => {
                line(out, 2, "if let Some(existing) = self.values.get(&key) {");
                line(out, 3, "return Ok(Some(existing.clone()));");
                line(out, 2, "}");
                line(out, 2, "let result = f(&key);");
                checked(self, out, 2);
                &["if let Some(v) = &result {", "    self.values.insert(key, v.clone());", "}", "Ok(result)"]
            }
            Operation::ComputeIfPresent => {
                line(out, 2, "let Some(old) = self.values.get(&key) else {");
                line(out, 3, "return Ok(None);");
                line(out, 2, "};");
                line(out, 2, "let result = f(&key, old);");
                checked(self, out, 2);
                &commit
            }
            Operation::ReplaceAll => {
                line(out, 2, "let mut staged = Vec::with_capacity(self.values.len());");
                line(out, 2, "for (key, old) in &self.values {");
                line(out, 3, "let result = Some(f(key, old));");
                checked(self, out, 3);
                line(out, 3, "staged.extend(result.map(|v| (key.clone(), v)));");
                line(out, 2, "}");
                &["self.values.extend(staged);", "Ok(())"]
            }
            Operation::Construct => &[],
        };
        for l in lines {
            line(out, 2, l);
        }
    }

    fn constructor(&mut self, plan: &TypePlan, decl: &ConstructorDecl<'_>) -> String {
        let ctor = decl.plan;
        let sc = Self::constructor_scope(plan, &ctor.params);
        let params: Vec<_> = ctor.params.iter().map(|p| format!("{}: {}", p.name, param_type(p))).collect();
        let mut out = String::new();
        line(&mut out, 1, &format!("pub fn {}({}) -> Result<Self, ValidationFailure> {{", ctor.name, params.join(", ")));
        for s in &decl.body {
            match s {
                Statement::Assign { field, source } if is_container(plan.kind) => {
                    let expr = match source {
                        ValueSource::Collect { names } if plan.kind == PlanKind::Set => {
                            format!("BTreeSet::from([{}])", names.join(", "))
                        }
                        ValueSource::Collect { names } => format!("vec![{}]", names.join(", ")),
                        other => assignment(other, &sc),
                    };
                    line(&mut out, 2, &format!("let {field} = {expr};"));
                }
                Statement::Return(Returned::Constructed) => {
                    let fields: Vec<_> = plan.fields.iter().map(|f| f.name.as_str()).collect();
                    line(&mut out, 2, &format!("Ok(Self {{ {} }})", fields.join(", ")));
                }
                other => self.statement(other, &sc, &mut out, 2),
            }
        }
        line(&mut out, 1, "}");
        out
    }

    fn method(&mut self, plan: &TypePlan, decl: &MethodDecl) -> Option<String> {
        let mut out = String::new();
        if let Some(doc) = &decl.doc {
            line(&mut out, 1, &format!("/// {doc}"));
        }
        let Some(Statement::Return(returned)) = decl.body.first() else { return None };
        match returned {
            Returned::Field { field, style } => {
                let ty = rust_type(decl.returns.as_ref()?);
                match style {
                    AccessorStyle::Optional => {
                        line(&mut out, 1, &format!("pub fn {}(&self) -> Option<&{ty}> {{", decl.name));
                        line(&mut out, 2, &format!("self.{field}.as_ref()"));
                    }
                    AccessorStyle::Direct { .. } => {
                        line(&mut out, 1, &format!("pub fn {}(&self) -> &{ty} {{", decl.name));
                        line(&mut out, 2, &format!("&self.{field}"));
                    }
                }
            }
            Returned::Method(kind) => {
                let (ret, expr) = match kind {
                    MethodKind::IsEmptySpan { lesser, greater } => {
                        ("bool".to_string(), format!("self.{lesser} == self.{greater}"))
                    }
                    MethodKind::SpanSize { lesser, greater, ty } => {
                        let t = number_type(*ty);
                        (t.to_string(), format!("self.{greater} as {t} - self.{lesser} as {t}"))
                    }
                    MethodKind::ToJson => (
                        "serde_json::Value".to_string(),
                        "serde_json::to_value(self).unwrap_or(serde_json::Value::Null)".to_string(),
                    ),
                    MethodKind::IsEmpty => ("bool".to_string(), "self.values.is_empty()".to_string()),
                };
                line(&mut out, 1, &format!("pub fn {}(&self) -> {ret} {{", decl.name));
                line(&mut out, 2, &expr);
            }
            Returned::Hash(terms) => {
                line(&mut out, 1, "pub fn hash_code(&self) -> u64 {");
                line(&mut out, 2, "let mut h = 0u64;");
                for t in terms {
                    line(&mut out, 2, &format!("h = h.wrapping_add(hash_of(&self.{}).wrapping_mul({}));", t.field, t.prime));
                }
                line(&mut out, 2, "h");
                // lets other generated types hash a field of this type
                let mut imp = String::new();
                line(&mut imp, 0, &format!("impl HashValue for {} {{", plan.name));
                line(&mut imp, 1, "fn hash_value<H: Hasher>(&self, state: &mut H) {");
                line(&mut imp, 2, "state.write_u64(self.hash_code());");
                line(&mut imp, 1, "}");
                line(&mut imp, 0, "}");
                self.impls.push(imp);
            }
            Returned::Equality(fields) => {
                let mut imp = String::new();
                line(&mut imp, 0, &format!("impl PartialEq for {} {{", plan.name));
                line(&mut imp, 1, "fn eq(&self, other: &Self) -> bool {");
                let terms: Vec<_> = fields.iter().map(|f| format!("self.{f} == other.{f}")).collect();
                line(&mut imp, 2, &if terms.is_empty() { "true".to_string() } else { terms.join(" && ") });
                line(&mut imp, 1, "}");
                line(&mut imp, 0, "}");
                self.impls.push(imp);
                let mut hash = String::new();
                line(&mut hash, 0, &format!("impl Hash for {} {{", plan.name));
                line(&mut hash, 1, "fn hash<H: Hasher>(&self, state: &mut H) {");
                line(&mut hash, 2, "state.write_u64(self.hash_code());");
                line(&mut hash, 1, "}");
                line(&mut hash, 0, "}");
                self.impls.push(hash);
                return None;
            }
            Returned::Text(form) => {
                let mut imp = String::new();
                line(&mut imp, 0, &format!("impl fmt::Display for {} {{", plan.name));
                line(&mut imp, 1, "fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {");
                line(&mut imp, 2, &format!("f.write_str({:?})?;", format!("{}{{", form.type_name)));
                for (i, e) in form.entries.iter().enumerate() {
                    let label = format!("{}{:?}:", if i > 0 { "," } else { "" }, e.label);
                    let field = plan.field(&e.field);
                    let structured = field.is_some_and(|f| {
                        matches!(f.ty, TypeRef::List { .. } | TypeRef::Set { .. } | TypeRef::Map { .. })
                    });
                    let shown = if e.quoted || structured { "{:?}" } else { "{}" };
                    let optional = field.is_some_and(|f| f.optional);
                    line(&mut imp, 2, &format!("f.write_str({label:?})?;"));
                    if optional {
                        line(&mut imp, 2, &format!("match &self.{} {{", e.field));
                        line(&mut imp, 3, &format!("Some(v) => write!(f, \"{shown}\", v)?,"));
                        line(&mut imp, 3, "None => f.write_str(\"null\")?,");
                        line(&mut imp, 2, "}");
                    } else if is_container(plan.kind) {
                        line(&mut imp, 2, &format!("write!(f, \"{{:?}}\", self.{})?;", e.field));
                    } else {
                        line(&mut imp, 2, &format!("write!(f, \"{shown}\", self.{})?;", e.field));
                    }
                }
                line(&mut imp, 2, "f.write_str(\"}\")");
                line(&mut imp, 1, "}");
                line(&mut imp, 0, "}");
                self.impls.push(imp);
                return None;
            }
            Returned::Default(default) => {
                let mut imp = String::new();
                line(&mut imp, 0, &format!("/// The `{}` instance: every member at its default.", default.name));
                line(&mut imp, 0, &format!("impl Default for {} {{", plan.name));
                line(&mut imp, 1, "fn default() -> Self {");
                line(&mut imp, 2, "Self {");
                for (field, v) in &default.values {
                    let lit = plan.field(field).map(|f| literal(&f.ty, v)).unwrap_or_else(|| "Default::default()".into());
                    line(&mut imp, 3, &format!("{field}: {lit},"));
                }
                line(&mut imp, 2, "}");
                line(&mut imp, 1, "}");
                line(&mut imp, 0, "}");
                self.impls.push(imp);
                return None;
            }
            Returned::Constructed => return None,
        }
        line(&mut out, 1, "}");
        Some(out)
    }
}

// ---- serde ---- //

impl RustBackend {
    /// Deserialization goes through the canonical constructor, so a decoded
    /// value is checked like a constructed one.
    fn serde_impls(&mut self, plan: &TypePlan) {
        let Some(ctor) = plan.canonical() else { return };
        let name = &plan.name;
        let wrapped = plan.fields.first().filter(|_| is_wrapper(plan.kind));
        if let Some(field) = wrapped {
            let mut imp = String::new();
            line(&mut imp, 0, &format!("impl serde::Serialize for {name} {{"));
            line(&mut imp, 1, "fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {");
            line(&mut imp, 2, &format!("serde::Serialize::serialize(&self.{}, serializer)", field.name));
            line(&mut imp, 1, "}");
            line(&mut imp, 0, "}");
            self.impls.push(imp);
        }

        let mut imp = String::new();
        line(&mut imp, 0, &format!("impl<'de> serde::Deserialize<'de> for {name} {{"));
        line(&mut imp, 1, "fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {");
        match (wrapped, ctor.params.as_slice()) {
            (Some(_), [p]) => {
                line(&mut imp, 2, &format!("let {} = <{} as serde::Deserialize>::deserialize(deserializer)?;", p.name, param_type(p)));
                line(&mut imp, 2, &format!("Self::{}({}).map_err(serde::de::Error::custom)", ctor.name, p.name));
            }
            _ => {
                line(&mut imp, 2, "#[derive(serde::Deserialize)]");
                line(&mut imp, 2, "struct Fields {");
                for p in &ctor.params {
                    let json = plan.field(&p.name).map_or(p.name.as_str(), |f| f.json_name.as_str());
                    let mut attrs = Vec::new();
                    if json != p.name {
                        attrs.push(format!("rename = {json:?}"));
                    }
                    if p.optional {
                        attrs.push("default".to_string());
                    }
                    if !attrs.is_empty() {
                        line(&mut imp, 3, &format!("#[serde({})]", attrs.join(", ")));
                    }
                    line(&mut imp, 3, &format!("{}: {},", p.name, param_type(p)));
                }
                line(&mut imp, 2, "}");
                let args: Vec<_> = ctor.params.iter().map(|p| format!("fields.{}", p.name)).collect();
                let bind = if args.is_empty() { "let _fields" } else { "let fields" };
                line(&mut imp, 2, &format!("{bind} = <Fields as serde::Deserialize>::deserialize(deserializer)?;"));
                line(&mut imp, 2, &format!("Self::{}({}).map_err(serde::de::Error::custom)", ctor.name, args.join(", ")));
            }
        }
        line(&mut imp, 1, "}");
        line(&mut imp, 0, "}");
        self.impls.push(imp);
    }
}

impl EmissionBackend for RustBackend {
    fn begin_type(&mut self, _plan: &TypePlan) {
        self.fields.clear();
        self.methods.clear();
        self.impls.clear();
    }

    fn import(&mut self, id: &ShapeId) {
        // types of one namespace share the generated module
        if !id.is_prelude() {
            let module = id.namespace().replace('.', "_").to_case(Case::Snake);
            self.imports.insert(id.as_str().to_string(), format!("crate::{module}::{}", id.name()));
        }
    }

    fn declare_field(&mut self, plan: &TypePlan, field: &FieldPlan) {
        self.uses_timestamps |= mentions_timestamp(&field.ty);
        let ty = rust_type(&field.ty);
        let ty = if field.optional { format!("Option<{ty}>") } else { ty };
        let mut out = String::new();
        if !is_wrapper(plan.kind) {
            if field.json_name != field.name {
                line(&mut out, 1, &format!("#[serde(rename = {:?})]", field.json_name));
            }
            if field.optional {
                line(&mut out, 1, "#[serde(skip_serializing_if = \"Option::is_none\")]");
            }
        }
        line(&mut out, 1, &format!("{}: {ty},", field.name));
        self.fields.push(out);
    }

    fn declare_constructor(&mut self, plan: &TypePlan, decl: &ConstructorDecl<'_>) {
        let rendered = self.constructor(plan, decl);
        self.methods.push(rendered);
    }

    fn declare_method(&mut self, plan: &TypePlan, decl: &MethodDecl) {
        let rendered = match decl.role {
            MethodRole::Mutator(op) => Some(self.mutator(plan, op, decl)),
            _ => self.method(plan, decl),
        };
        self.methods.extend(rendered);
    }

    fn end_type(&mut self, plan: &TypePlan) {
        // the namespace of the first rendered type names the module
        let own = format!("crate::{}::", plan.shape.namespace().replace('.', "_").to_case(Case::Snake));
        self.imports.retain(|_, path| !path.starts_with(&own));
        self.rendered.insert(plan.shape.as_str().to_string());
        self.serde_impls(plan);

        let mut out = String::from("\n");
        doc_lines(&mut out, 0, &plan.doc);
        let derives = if is_wrapper(plan.kind) { "Debug, Clone" } else { "Debug, Clone, serde::Serialize" };
        line(&mut out, 0, &format!("#[derive({derives})]"));
        line(&mut out, 0, &format!("pub struct {} {{", plan.name));
        for f in &self.fields {
            out.push_str(f);
        }
        line(&mut out, 0, "}");
        out.push('\n');
        line(&mut out, 0, &format!("impl {} {{", plan.name));
        out.push_str(&self.methods.join("\n"));
        line(&mut out, 0, "}");
        for imp in &self.impls {
            out.push('\n');
            out.push_str(imp);
        }
        self.body.push_str(&out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GenerationSettings;
    use crate::contributors::Registry;
    use crate::emit::render;
    use crate::generate::generate_shape;
    use crate::shape::{Member, Model, ShapeDescriptor, ShapeKind, Trait};
    use serde_json::json;

    fn rendered(model: &Model, id: &str) -> String {
        let shape = model.get(&id.into()).unwrap();
        let plan = generate_shape(model, shape, &GenerationSettings::default(), Registry::standard()).unwrap();
        let mut backend = RustBackend::default();
        render(&plan, &mut backend);
        backend.finish()
    }

    fn tags() -> Model {
        Model::new().with(
            ShapeDescriptor::new(
                "ex#Tags",
                ShapeKind::List {
                    member: Member::new("member", ShapeId::prelude("String")).with_trait(Trait::Pattern("^[a-z]+$".into())),
                },
            )
            .with_trait(Trait::Length { min: Some(1), max: Some(3) }),
        )
    }

    #[test]
    fn container_mutators_are_guarded() {
        let src = rendered(&tags(), "ex#Tags");
        assert!(src.contains("pub struct Tags {"));
        assert!(src.contains("values: Vec<String>,"));
        assert!(src.contains("pub fn add(&mut self, item: String) -> Result<(), ValidationFailure> {"));
        assert!(src.contains("let size = self.values.len() + 1;"));
        assert!(src.contains("if size > 3 {"));
        assert!(src.contains("static PATTERN_0: Lazy<Regex>"));
        assert!(src.contains("PATTERN_0.is_match(&item)"));
        // clear can never succeed with a minimum of one
        let clear = src.split("pub fn clear").nth(1).unwrap();
        assert!(clear.trim_start().starts_with("(&mut self) -> Result<(), ValidationFailure> {\n        return Err("));
    }

    #[test]
    fn composite_renders_fields_accessors_and_traits() {
        let model = Model::new().with(ShapeDescriptor::new(
            "ex#Person",
            ShapeKind::Structure {
                members: vec![
                    Member::new("name", ShapeId::prelude("String")).with_trait(Trait::Required),
                    Member::new("nickName", ShapeId::prelude("String")),
                    Member::new("score", ShapeId::prelude("Integer")).with_trait(Trait::Default(json!(7))),
                ],
            },
        ));
        let src = rendered(&model, "ex#Person");
        assert!(src.contains("nick_name: Option<String>,"));
        assert!(src.contains("#[serde(rename = \"nickName\")]"));
        assert!(src.contains("pub fn nick_name(&self) -> Option<&String> {"));
        assert!(src.contains("let score = score.unwrap_or_else(|| 7);"));
        assert!(src.contains("Ok(Self { name, nick_name, score })"));
        assert!(src.contains("impl PartialEq for Person {"));
        assert!(src.contains("h = h.wrapping_add(hash_of(&self.name).wrapping_mul(31));"));
        assert!(src.contains("impl fmt::Display for Person {"));
    }

    #[test]
    fn functional_map_writes_check_the_result_before_storing() {
        let model = Model::new().with(ShapeDescriptor::new(
            "ex#Scores",
            ShapeKind::Map {
                key: Member::new("key", ShapeId::prelude("String")),
                value: Member::new("value", ShapeId::prelude("Integer")).with_trait(Trait::Range { min: None, max: Some(10.0) }),
            },
        ));
        let src = rendered(&model, "ex#Scores");
        let merge = src.split("pub fn merge").nth(1).unwrap();
        let check = merge.find("if let Some(r) = &result {").unwrap();
        let store = merge.find("self.values.insert(key, v.clone());").unwrap();
        assert!(check < store);
    }

    fn rendered_all(model: &Model, ids: &[&str]) -> String {
        let mut backend = RustBackend::default();
        for id in ids {
            let shape = model.get(&(*id).into()).unwrap();
            let plan = generate_shape(model, shape, &GenerationSettings::default(), Registry::standard()).unwrap();
            render(&plan, &mut backend);
        }
        backend.finish()
    }

    fn name() -> ShapeDescriptor {
        ShapeDescriptor::new("ex#Name", ShapeKind::String)
            .with_trait(Trait::Length { min: Some(2), max: Some(8) })
            .with_trait(Trait::Pattern("^[a-z]+$".into()))
    }

    #[test]
    fn named_scalar_members_are_checked_through_their_value() {
        let model = Model::new().with(name()).with(ShapeDescriptor::new(
            "ex#Team",
            ShapeKind::Structure {
                members: vec![
                    Member::new("lead", "ex#Name").with_trait(Trait::Required),
                    Member::new("deputy", "ex#Name"),
                ],
            },
        ));
        let src = rendered(&model, "ex#Team");
        assert!(src.contains("if !((*lead.value()).chars().count() >= 2) {"));
        assert!(src.contains("if let Some(v) = &deputy {"));
        assert!(src.contains("PATTERN_0.is_match(&(*(*v).value()))"));
        assert!(!src.contains("(*v).chars()"));
    }

    #[test]
    fn named_list_elements_are_checked_through_their_value() {
        let model = Model::new().with(name()).with(ShapeDescriptor::new(
            "ex#Names",
            ShapeKind::List { member: Member::new("member", "ex#Name") },
        ));
        let src = rendered(&model, "ex#Names");
        assert!(src.contains("items.iter().find(|x| !((*(**x).value()).chars().count() >= 2))"));
    }

    #[test]
    fn hashing_uses_canonical_values() {
        let model = Model::new().with(ShapeDescriptor::new(
            "ex#Point",
            ShapeKind::Structure {
                members: vec![Member::new("x", ShapeId::prelude("Double")).with_trait(Trait::Required)],
            },
        ));
        let src = rendered(&model, "ex#Point");
        assert!(!src.contains("{value:?}"));
        assert!(src.contains("let v = if *self == 0.0 { 0.0 } else { *self };"));
        assert!(src.contains("impl HashValue for Point {"));
        assert!(src.contains("h = h.wrapping_add(hash_of(&self.x).wrapping_mul(31));"));
    }

    #[test]
    fn compute_checks_a_new_key_only_when_something_is_stored() {
        let model = Model::new().with(ShapeDescriptor::new(
            "ex#Scores",
            ShapeKind::Map {
                key: Member::new("key", ShapeId::prelude("String")).with_trait(Trait::Length { min: Some(2), max: None }),
                value: Member::new("value", ShapeId::prelude("Integer")),
            },
        ));
        let src = rendered(&model, "ex#Scores");
        let compute = src.split("pub fn compute(").nth(1).unwrap();
        let compute = &compute[..compute.find("pub fn").unwrap_or(compute.len())];
        assert!(compute.contains("if !self.values.contains_key(&key) && result.is_some() {"));
        // merge always stores a value for a new key
        let merge = src.split("pub fn merge(").nth(1).unwrap();
        assert!(merge.contains("if !self.values.contains_key(&key) {"));
    }

    #[test]
    fn serde_goes_through_the_canonical_constructor() {
        let model = Model::new().with(tags().get(&"ex#Tags".into()).unwrap().clone()).with(ShapeDescriptor::new(
            "ex#Post",
            ShapeKind::Structure {
                members: vec![
                    Member::new("title", ShapeId::prelude("String")).with_trait(Trait::Required),
                    Member::new("tags", "ex#Tags").with_trait(Trait::JsonName("labels".into())),
                ],
            },
        ));
        let src = rendered_all(&model, &["ex#Tags", "ex#Post"]);
        assert!(src.contains("#[derive(Debug, Clone)]\npub struct Tags {"));
        assert!(src.contains("impl serde::Serialize for Tags {"));
        assert!(src.contains("serde::Serialize::serialize(&self.values, serializer)"));
        assert!(src.contains("let values = <Vec<String> as serde::Deserialize>::deserialize(deserializer)?;"));
        assert!(src.contains("#[derive(Debug, Clone, serde::Serialize)]\npub struct Post {"));
        assert!(src.contains("    #[serde(skip_serializing_if = \"Option::is_none\")]\n    tags: Option<Tags>,"));
        assert!(src.contains("            #[serde(rename = \"labels\", default)]\n            tags: Option<Tags>,"));
        assert!(src.contains("Self::new(fields.title, fields.tags).map_err(serde::de::Error::custom)"));
    }

    #[test]
    fn integer_bounds_are_compared_as_integers() {
        let model = Model::new().with(ShapeDescriptor::new(
            "ex#Slot",
            ShapeKind::Structure {
                members: vec![
                    Member::new("at", ShapeId::prelude("Long"))
                        .with_trait(Trait::Required)
                        .with_trait(Trait::Range { min: Some(0.0), max: Some(100.0) }),
                    Member::new("lane", ShapeId::prelude("Short")).with_trait(Trait::Required),
                ],
            },
        ));
        let src = rendered(&model, "ex#Slot");
        assert!(src.contains("if !(at.at_least(0.0)) {"));
        assert!(src.contains("if !(at.at_most(100.0)) {"));
        assert!(src.contains("i128::from(*self) >= limit.ceil() as i128"));
        assert!(src.contains("if !(i16::try_from(lane).is_ok()) {"));
        assert!(!src.contains("as f64"));
    }

    #[test]
    fn widened_floats_admit_non_finite_values() {
        let model = Model::new().with(ShapeDescriptor::new(
            "ex#Gauge",
            ShapeKind::Structure {
                members: vec![
                    Member::new("level", ShapeId::prelude("Float"))
                        .with_trait(Trait::Required)
                        .with_trait(Trait::NonFinite),
                ],
            },
        ));
        let src = rendered(&model, "ex#Gauge");
        assert!(src.contains("if !(!level.is_finite() || ("));
        assert!(!src.contains("level.is_finite()) {"));
    }

    #[test]
    fn always_failing_clear_stops_at_the_failure() {
        let src = rendered(&tags(), "ex#Tags");
        let clear = src.split("pub fn clear").nth(1).unwrap();
        let clear = &clear[..clear.find("\n    }\n").unwrap()];
        assert!(!clear.contains("self.values.clear();"));
        assert!(!clear.contains("Ok(())"));
    }

    #[test]
    fn rendered_types_are_not_imported() {
        let model = Model::new()
            .with(ShapeDescriptor::new("other#Label", ShapeKind::String))
            .with(ShapeDescriptor::new(
                "ex#Card",
                ShapeKind::Structure { members: vec![Member::new("label", "other#Label")] },
            ));
        let both = rendered_all(&model, &["other#Label", "ex#Card"]);
        assert!(!both.contains("use crate::other::Label;"));
        assert!(both.contains("pub struct Label {"));
        let alone = rendered(&model, "ex#Card");
        assert!(alone.contains("use crate::other::Label;"));
        assert!(alone.contains("impl HashValue for Label {"));
    }
}
