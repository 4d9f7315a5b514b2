use serde::de::DeserializeOwned;
use thiserror::Error;

/// A deserialization error located by the JSON path it occurred at.
#[derive(Debug, Error)]
#[error("at JSON path {path} → {message}")]
pub struct PathError {
    pub path: String,
    pub message: String,
}

impl PathError {
    fn from_track<E: std::fmt::Display>(err: serde_path_to_error::Error<E>) -> Self {
        let path = err.path().to_string();
        Self { path, message: err.into_inner().to_string() }
    }
}

/// Deserialize with JSON-path context in error messages.
pub fn from_str_with_path<T: DeserializeOwned>(src: &str) -> Result<T, PathError> {
    let de = &mut serde_json::Deserializer::from_str(src);
    serde_path_to_error::deserialize::<_, T>(de).map_err(PathError::from_track)
}

pub fn from_value_with_path<T: DeserializeOwned>(value: serde_json::Value) -> Result<T, PathError> {
    serde_path_to_error::deserialize::<_, T>(value).map_err(PathError::from_track)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct Doc {
        #[allow(dead_code)]
        shapes: std::collections::BTreeMap<String, Inner>,
    }

    #[derive(Debug, Deserialize)]
    struct Inner {
        #[allow(dead_code)]
        r#type: String,
    }

    #[test]
    fn error_names_the_path() {
        let err = from_str_with_path::<Doc>(r#"{"shapes": {"ex#A": {"type": 3}}}"#).unwrap_err();
        assert_eq!(err.path, "shapes.ex#A.type");
    }

    #[test]
    fn value_input_is_tracked_too() {
        let v = serde_json::json!({"shapes": {"ex#A": {}}});
        let err = from_value_with_path::<Doc>(v).unwrap_err();
        assert!(err.path.starts_with("shapes"), "{err}");
    }
}
