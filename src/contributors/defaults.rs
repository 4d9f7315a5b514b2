//! Built-in providers: JSON-style naming, optional accessors for members that
//! may be absent, structural equality, additive hashing, a JSON-like textual
//! form, span relations and a `to_json` conversion.
use crate::constructors::{ConstructorKind, WeightedCheck};
use crate::context::MemberContext;
use crate::guard::{value_checks_for, Check, Condition, Phase, Subject};
use crate::constraints::ValueCheck;
use crate::plan::{
    AccessorPlan, AccessorStyle, Assignment, FieldPlan, HashTerm, MethodKind, MethodPlan, Param, TextEntry,
    ValueSource,
};

use super::{
    Answer, ArgumentRule, ConstructorArgumentRuleProvider, DocRuleProvider, EqualityRuleProvider, FieldRuleProvider,
    GetterRuleProvider, HashRuleProvider, OtherRuleProvider, Registry, ToStringRuleProvider, TypeContext,
    DEFAULT_PRECEDENCE,
};

/// Register every built-in provider at [`DEFAULT_PRECEDENCE`].
pub fn install(r: &mut Registry) {
    r.doc(DEFAULT_PRECEDENCE, ConstraintSummaryDoc)
        .field(DEFAULT_PRECEDENCE, JsonFields)
        .argument(DEFAULT_PRECEDENCE, MemberArguments)
        .argument(DEFAULT_PRECEDENCE, SpanRules)
        .getter(DEFAULT_PRECEDENCE, OptionalAwareGetters)
        .equality(DEFAULT_PRECEDENCE, StructuralEquality)
        .hash(DEFAULT_PRECEDENCE, AdditiveHash)
        .text(DEFAULT_PRECEDENCE, JsonLikeText)
        .other(DEFAULT_PRECEDENCE, SpanRules)
        .other(DEFAULT_PRECEDENCE, ToJsonMethod);
}

// ---- documentation ---- //

pub struct ConstraintSummaryDoc;

impl DocRuleProvider for ConstraintSummaryDoc {
    fn doc(&self, cx: &TypeContext<'_>) -> Answer<Vec<String>> {
        let mut lines: Vec<String> = cx
            .shape
            .traits
            .documentation()
            .map(|d| d.lines().map(str::to_string).collect())
            .unwrap_or_default();
        if let Some(span) = cx.span {
            let op = if span.empty_allowed { "<=" } else { "<" };
            lines.push(format!("Invariant: `{}` {op} `{}`.", span.lesser, span.greater));
        }
        for m in cx.members {
            let checks = m.constraints.value_checks();
            if !checks.is_empty() {
                let described: Vec<_> = checks.iter().map(ValueCheck::describe).collect();
                lines.push(format!("`{}` {}.", m.name(), described.join(", ")));
            }
        }
        Answer::Use(lines)
    }
}

// ---- fields ---- //

pub struct JsonFields;

impl FieldRuleProvider for JsonFields {
    fn field(&self, _: &TypeContext<'_>, m: &MemberContext) -> Answer<FieldPlan> {
        Answer::Use(FieldPlan {
            name: m.field.clone(),
            member: m.name().to_string(),
            json_name: m.json_name().to_string(),
            ty: m.ty.clone(),
            optional: m.is_optional(),
            default: m.default_value().cloned(),
            constraints: m.constraints.clone(),
            weight: m.weight,
        })
    }
}

// ---- constructor arguments ---- //

pub struct MemberArguments;

impl ConstructorArgumentRuleProvider for MemberArguments {
    fn argument(&self, _: &TypeContext<'_>, m: &MemberContext, kind: ConstructorKind) -> Answer<ArgumentRule> {
        let name = m.field.clone();
        let subject = Subject::Param(name.clone());
        let mut guards = Vec::new();
        if m.member.is_required() && !m.member.has_default() {
            let check = Check::before(
                Condition::NotNull { subject: subject.clone() },
                format!("`{}` is required", m.name()),
            );
            guards.push(WeightedCheck::new(0.0, check));
        }
        let widened = match kind {
            ConstructorKind::WithWidenedPrimitives if crate::constructors::widens(m) => m.ty.widened(),
            _ => None,
        };
        let narrow = m.ty.number_kind();
        if let (Some(_), Some(kind)) = (&widened, narrow) {
            let check = Check::value(Phase::Before, subject.clone(), ValueCheck::Representable { kind }, false);
            guards.push(WeightedCheck::new(m.weight, check));
        }
        guards.extend(
            value_checks_for(Phase::Before, subject, &m.constraints, false)
                .into_iter()
                .map(|c| WeightedCheck::new(m.weight, c)),
        );

        let default = m.default_value().cloned();
        let source = match (&widened, narrow) {
            (Some(_), Some(kind)) => ValueSource::Narrowed { name: name.clone(), kind, default },
            _ => match default {
                Some(default) => ValueSource::ParamOrDefault { name: name.clone(), default },
                None => ValueSource::Param { name: name.clone() },
            },
        };
        Answer::Use(ArgumentRule {
            param: Param {
                name: name.clone(),
                ty: widened.clone().unwrap_or_else(|| m.ty.clone()),
                narrows_to: widened.and(narrow),
                optional: !m.member.is_required() || m.member.has_default(),
            },
            guards,
            assignment: Assignment { field: name, source },
        })
    }
}

// ---- span ---- //

pub struct SpanRules;

impl SpanRules {
    fn fields(cx: &TypeContext<'_>) -> Option<(String, String)> {
        let span = cx.span?;
        let lesser = cx.member(&span.lesser)?.field.clone();
        let greater = cx.member(&span.greater)?.field.clone();
        Some((lesser, greater))
    }
}

impl ConstructorArgumentRuleProvider for SpanRules {
    fn argument(&self, _: &TypeContext<'_>, _: &MemberContext, _: ConstructorKind) -> Answer<ArgumentRule> {
        Answer::Defer
    }

    fn constructor_guards(&self, cx: &TypeContext<'_>, _: ConstructorKind) -> Vec<WeightedCheck> {
        match (cx.span, Self::fields(cx)) {
            (Some(span), Some((lesser, greater))) => {
                vec![WeightedCheck::new(f64::MAX, span.guard(&lesser, &greater))]
            }
            _ => Vec::new(),
        }
    }
}

impl OtherRuleProvider for SpanRules {
    fn methods(&self, cx: &TypeContext<'_>) -> Vec<MethodPlan> {
        match (cx.span, Self::fields(cx)) {
            (Some(span), Some((lesser, greater))) => span.methods(&lesser, &greater),
            _ => Vec::new(),
        }
    }
}

// ---- accessors ---- //

pub struct OptionalAwareGetters;

impl GetterRuleProvider for OptionalAwareGetters {
    fn getter(&self, _: &TypeContext<'_>, m: &MemberContext, field: &FieldPlan) -> Answer<AccessorPlan> {
        let style = if m.is_optional() {
            AccessorStyle::Optional
        } else {
            AccessorStyle::Direct { default: field.default.clone() }
        };
        Answer::Use(AccessorPlan { name: field.name.clone(), field: field.name.clone(), ty: field.ty.clone(), style })
    }
}

// ---- equality & hash ---- //

pub struct StructuralEquality;

impl EqualityRuleProvider for StructuralEquality {
    fn equality(&self, _: &TypeContext<'_>, m: &MemberContext) -> Answer<String> {
        Answer::Use(m.field.clone())
    }
}

const PRIMES: [u64; 16] = [31, 37, 41, 43, 47, 53, 59, 61, 67, 71, 73, 79, 83, 89, 97, 101];

pub struct AdditiveHash;

impl HashRuleProvider for AdditiveHash {
    fn hash(&self, cx: &TypeContext<'_>, m: &MemberContext) -> Answer<HashTerm> {
        let prime = PRIMES[cx.position(m) % PRIMES.len()];
        Answer::Use(HashTerm { field: m.field.clone(), prime })
    }
}

// ---- textual form ---- //

pub struct JsonLikeText;

impl ToStringRuleProvider for JsonLikeText {
    fn text(&self, _: &TypeContext<'_>, m: &MemberContext) -> Answer<TextEntry> {
        Answer::Use(TextEntry { label: m.json_name().to_string(), field: m.field.clone(), quoted: m.ty.is_quoted() })
    }
}

// ---- other ---- //

pub struct ToJsonMethod;

impl OtherRuleProvider for ToJsonMethod {
    fn methods(&self, _: &TypeContext<'_>) -> Vec<MethodPlan> {
        vec![MethodPlan {
            name: "to_json".to_string(),
            kind: MethodKind::ToJson,
            doc: Some("Serialized form, as written by the canonical constructor's counterpart.".to_string()),
        }]
    }
}
