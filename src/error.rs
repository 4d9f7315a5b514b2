//! Error taxonomy.
//!
//! `SchemaError` and `ConsistencyError` abort generation of one shape;
//! `ValidationFailure` is what a realized guard raises at run time.
use thiserror::Error;

use crate::shape::ShapeId;

/// The schema contradicts itself.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SchemaError {
    #[error("{shape}: minimum {what} {min} exceeds maximum {max}")]
    MinExceedsMax { shape: ShapeId, what: &'static str, min: String, max: String },

    #[error("{shape}: invalid pattern `{pattern}`: {reason}")]
    InvalidPattern { shape: ShapeId, pattern: String, reason: String },

    #[error("{shape}: trait `{trait_name}` cannot be applied to a {kind} shape")]
    TraitNotApplicable { shape: ShapeId, trait_name: &'static str, kind: &'static str },

    #[error("{shape}: references unknown shape {target}")]
    UnknownTarget { shape: ShapeId, target: ShapeId },

    #[error("{shape}: unsupported shape type `{type_name}`")]
    UnsupportedType { shape: ShapeId, type_name: String },

    #[error("{shape}: default value {value} is invalid: {reason}")]
    InvalidDefault { shape: ShapeId, value: String, reason: String },

    #[error("{shape}: span relation: {reason}")]
    InvalidSpan { shape: ShapeId, reason: String },

    #[error("{shape}: {reason}")]
    Malformed { shape: ShapeId, reason: String },
}

impl SchemaError {
    pub fn shape(&self) -> &ShapeId {
        match self {
            SchemaError::MinExceedsMax { shape, .. }
            | SchemaError::InvalidPattern { shape, .. }
            | SchemaError::TraitNotApplicable { shape, .. }
            | SchemaError::UnknownTarget { shape, .. }
            | SchemaError::UnsupportedType { shape, .. }
            | SchemaError::InvalidDefault { shape, .. }
            | SchemaError::InvalidSpan { shape, .. }
            | SchemaError::Malformed { shape, .. } => shape,
        }
    }
}

/// A pipeline invariant was broken by a contributor.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConsistencyError {
    #[error("{shape}: equality covers [{}] but hash covers [{}]", equality.join(", "), hash.join(", "))]
    EqualityHashMismatch { shape: ShapeId, equality: Vec<String>, hash: Vec<String> },

    #[error("{shape}: constructor {constructor} takes `{argument}` but never assigns it")]
    UnassignedArgument { shape: ShapeId, constructor: String, argument: String },

    #[error("{shape}: field `{field}` contributed twice")]
    DuplicateField { shape: ShapeId, field: String },

    #[error("{shape}: no provider answered stage {stage} for member `{member}`")]
    NoProvider { shape: ShapeId, stage: &'static str, member: String },
}

impl ConsistencyError {
    pub fn shape(&self) -> &ShapeId {
        match self {
            ConsistencyError::EqualityHashMismatch { shape, .. }
            | ConsistencyError::UnassignedArgument { shape, .. }
            | ConsistencyError::DuplicateField { shape, .. }
            | ConsistencyError::NoProvider { shape, .. } => shape,
        }
    }
}

/// Anything that aborts generation of one shape.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum GenError {
    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),
    #[error("consistency error: {0}")]
    Consistency(#[from] ConsistencyError),
}

impl GenError {
    pub fn shape(&self) -> &ShapeId {
        match self {
            GenError::Schema(e) => e.shape(),
            GenError::Consistency(e) => e.shape(),
        }
    }
}

/// Raised by realized guards when an instance would violate a constraint.
/// The receiver of the failed operation is left untouched.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("{shape}: {message}")]
pub struct ValidationFailure {
    pub shape: ShapeId,
    pub message: String,
    pub value: Option<String>,
    pub limit: Option<String>,
}

impl ValidationFailure {
    pub fn new(shape: ShapeId, message: impl Into<String>) -> Self {
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
