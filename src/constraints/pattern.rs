use std::fmt;

use regex::Regex;
use serde::{Serialize, Serializer};

use crate::error::SchemaError;
use crate::shape::ShapeId;

/// A compiled pattern trait. Matching has search semantics: the pattern must
/// be anchored explicitly to constrain the whole value.
#[derive(Clone)]
pub struct Pattern {
    source: String,
    regex: Regex,
}

impl Pattern {
    pub fn compile(shape: &ShapeId, source: &str) -> Result<Self, SchemaError> {
        let regex = Regex::new(source).map_err(|e| SchemaError::InvalidPattern {
            shape: shape.clone(),
            pattern: source.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self { source: source.to_string(), regex })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn is_match(&self, s: &str) -> bool {
        self.regex.is_match(s)
    }

    /// Rough cost: longer patterns with more alternations/classes cost more.
    pub fn cost(&self) -> u32 {
        let specials = self
            .source
            .bytes()
            .filter(|b| matches!(b, b'|' | b'[' | b'(' | b'*' | b'+' | b'{'))
            .count();
        8 + (self.source.len() / 8) as u32 + specials as u32
    }
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl fmt::Debug for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pattern({:?})", self.source)
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl Serialize for Pattern {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&self.source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_semantics() {
        let id = ShapeId::new("ex#S");
        let unanchored = Pattern::compile(&id, "[a-z]+").unwrap();
        assert!(unanchored.is_match("ABCd"));
        let anchored = Pattern::compile(&id, "^[a-z]+$").unwrap();
        assert!(!anchored.is_match("ABCd"));
        assert!(anchored.is_match("abcd"));
    }

    #[test]
    fn bad_pattern_is_schema_error() {
        let err = Pattern::compile(&ShapeId::new("ex#S"), "^[a-z").unwrap_err();
        assert!(matches!(err, SchemaError::InvalidPattern { .. }));
        assert_eq!(err.shape().as_str(), "ex#S");
    }
}
