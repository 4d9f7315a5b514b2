//! Per-pass generation state.
//!
//! One `GenerationContext` exists per shape being generated. It owns the
//! bookkeeping that must not leak between types: referenced shapes and the
//! names already claimed inside the type.
use std::collections::{BTreeSet, HashSet};

use convert_case::{Case, Casing};

use crate::config::GenerationSettings;
use crate::constraints::{ConstraintSet, Resolver};
use crate::contributors::Registry;
use crate::error::SchemaError;
use crate::plan::TypeRef;
use crate::shape::{Member, Model, ShapeDescriptor, ShapeId};
use crate::weight::member_weight;

const RESERVED: &[&str] = &[
    "as", "async", "await", "break", "const", "continue", "crate", "dyn", "else", "enum", "extern", "false", "fn",
    "for", "if", "impl", "in", "let", "loop", "match", "mod", "move", "mut", "pub", "ref", "return", "self", "Self",
    "static", "struct", "super", "trait", "true", "type", "unsafe", "use", "where", "while", "yield",
];

pub struct GenerationContext<'a> {
    pub model: &'a Model,
    pub settings: &'a GenerationSettings,
    pub registry: &'a Registry,
    pub shape: &'a ShapeDescriptor,
    resolver: Resolver<'a>,
    references: BTreeSet<ShapeId>,
    claimed: HashSet<String>,
}

impl<'a> GenerationContext<'a> {
    pub fn new(
        model: &'a Model,
        settings: &'a GenerationSettings,
        registry: &'a Registry,
        shape: &'a ShapeDescriptor,
    ) -> Self {
        Self {
            model,
            settings,
            registry,
            shape,
            resolver: Resolver::new(model).allow_non_finite(settings.allow_non_finite),
            references: BTreeSet::new(),
            claimed: HashSet::new(),
        }
    }

    pub fn resolver(&self) -> &Resolver<'a> {
        &self.resolver
    }

    /// Record every generated type `ty` mentions.
    pub fn reference(&mut self, ty: &TypeRef) {
        match ty {
            TypeRef::Named { id } if id != &self.shape.id => {
                self.references.insert(id.clone());
            }
            TypeRef::List { element } | TypeRef::Set { element } => self.reference(element),
            TypeRef::Map { key, value } => {
                self.reference(key);
                self.reference(value);
            }
            _ => {}
        }
    }

    pub fn references(&self) -> Vec<ShapeId> {
        self.references.iter().cloned().collect()
    }

    /// Claim a snake_case identifier, suffixing it until it is unique within this type.
    pub fn claim_name(&mut self, base: &str) -> String {
        let mut name = base.to_case(Case::Snake);
        if name.is_empty() {
            name = "value".to_string();
        }
        if RESERVED.contains(&name.as_str()) {
            name.push('_');
        }
        let mut candidate = name.clone();
        let mut n = 2;
        while !self.claimed.insert(candidate.clone()) {
            candidate = format!("{name}_{n}");
            n += 1;
        }
        candidate
    }

    /// Resolve everything the pipeline needs to know about one member.
    pub fn member(&mut self, member: &Member) -> Result<MemberContext, SchemaError> {
        let constraints = self.resolver.resolve_member(&self.shape.id, member)?;
        let ty = TypeRef::of(self.model, &member.target);
        self.reference(&ty);
        Ok(MemberContext {
            owner: self.shape.id.clone(),
            field: self.claim_name(&member.name),
            weight: member_weight(self.model, member),
            member: member.clone(),
            constraints,
            ty,
        })
    }
}

/// A member of the type being generated, resolved once per pass.
#[derive(Debug, Clone)]
pub struct MemberContext {
    pub owner: ShapeId,
    pub member: Member,
    /// Field identifier claimed for the member.
    pub field: String,
    pub constraints: ConstraintSet,
    pub ty: TypeRef,
    pub weight: f64,
}

impl MemberContext {
    pub fn name(&self) -> &str {
        &self.member.name
    }

    pub fn json_name(&self) -> &str {
        self.member.json_name()
    }

    /// Neither required nor defaulted.
    pub fn is_optional(&self) -> bool {
        !self.member.is_required() && !self.member.has_default()
    }

    pub fn default_value(&self) -> Option<&serde_json::Value> {
        self.member.default_value()
    }
}
