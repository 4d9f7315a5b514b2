use serde::Serialize;

use crate::error::SchemaError;
use crate::shape::ShapeId;

/// Size (containers) or length (strings) bounds. `max == None` is unbounded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SizeBounds {
    pub min: u64,
    pub max: Option<u64>,
    /// Whether a length trait declared a minimum at all.
    pub min_declared: bool,
}

impl SizeBounds {
    pub const UNBOUNDED: SizeBounds = SizeBounds { min: 0, max: None, min_declared: false };

    pub fn resolve(shape: &ShapeId, min: Option<u64>, max: Option<u64>) -> Result<Self, SchemaError> {
        if let (Some(lo), Some(hi)) = (min, max) {
            if lo > hi {
                return Err(SchemaError::MinExceedsMax {
                    shape: shape.clone(),
                    what: "size",
                    min: lo.to_string(),
                    max: hi.to_string(),
                });
            }
        }
        Ok(Self { min: min.unwrap_or(0), max, min_declared: min.is_some() })
    }

    pub fn is_bounded(&self) -> bool {
        self.min > 0 || self.max.is_some()
    }

    pub fn admits(&self, n: u64) -> bool {
        n >= self.min && self.max.is_none_or(|max| n <= max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_zero_and_unbounded() {
        let b = SizeBounds::resolve(&ShapeId::new("ex#L"), None, None).unwrap();
        assert_eq!(b, SizeBounds::UNBOUNDED);
        assert!(!b.is_bounded());
        assert!(b.admits(u64::MAX));
    }

    #[test]
    fn inverted_bounds_fail() {
        assert!(SizeBounds::resolve(&ShapeId::new("ex#L"), Some(4), Some(2)).is_err());
        let b = SizeBounds::resolve(&ShapeId::new("ex#L"), Some(2), Some(2)).unwrap();
        assert!(b.admits(2) && !b.admits(1) && !b.admits(3));
    }
}
