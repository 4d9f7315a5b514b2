use ordered_float::OrderedFloat;
use serde::Serialize;

use crate::error::SchemaError;
use crate::shape::ShapeId;

/// Numeric range bounds, inclusive on both ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RangeBounds {
    pub min: Option<OrderedFloat<f64>>,
    pub max: Option<OrderedFloat<f64>>,
}

impl RangeBounds {
    pub fn resolve(shape: &ShapeId, min: Option<f64>, max: Option<f64>) -> Result<Self, SchemaError> {
        for bound in [min, max].into_iter().flatten() {
            if !bound.is_finite() {
                return Err(SchemaError::Malformed {
                    shape: shape.clone(),
                    reason: format!("range bound {bound} is not finite"),
                });
            }
        }
        if let (Some(lo), Some(hi)) = (min, max) {
            if lo > hi {
                return Err(SchemaError::MinExceedsMax {
                    shape: shape.clone(),
                    what: "value",
                    min: lo.to_string(),
                    max: hi.to_string(),
                });
            }
        }
        Ok(Self { min: min.map(OrderedFloat), max: max.map(OrderedFloat) })
    }

    pub fn is_bounded(&self) -> bool {
        self.min.is_some() || self.max.is_some()
    }

    pub fn admits(&self, v: f64) -> bool {
        self.min.is_none_or(|m| v >= m.0) && self.max.is_none_or(|m| v <= m.0)
    }
}
