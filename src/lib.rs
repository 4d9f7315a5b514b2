//! Constraint-aware value-type synthesis: schema shapes in, guarded value
//! types out.
//!
//! The pipeline per shape is [`constraints`] → [`guard`] / [`constructors`] /
//! [`span`] → [`contributors`] → [`plan::TypePlan`]. A plan is rendered by an
//! [`emit::EmissionBackend`], or realized directly by [`runtime`] and
//! [`instance`].
pub mod cli;
pub mod config;
pub mod constraints;
pub mod constructors;
pub mod context;
pub mod contributors;
pub mod datum;
pub mod emit;
pub mod error;
pub mod generate;
pub mod guard;
pub mod instance;
pub mod jq_exec;
pub mod path_de;
pub mod plan;
pub mod runtime;
pub mod shape;
pub mod source;
pub mod span;
pub mod weight;

pub use config::GenerationSettings;
pub use contributors::Registry;
pub use datum::Datum;
pub use error::{ConsistencyError, GenError, SchemaError, ValidationFailure};
pub use generate::{generate_all, generate_shape, GeneratedShape};
pub use plan::TypePlan;
pub use shape::{Member, Model, NumberKind, ShapeDescriptor, ShapeId, ShapeKind, Trait, TraitKind};
