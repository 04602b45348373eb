use thiserror::Error;

/// Top-level error type for the scout system.
///
/// Subsystem crates define their own error types and implement
/// `From<SubsystemError> for ScoutError` so that the `?` operator works
/// across crate boundaries in the composition root.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ScoutError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Pipeline error: {0}")]
    Pipeline(String),

    #[error("Job error: {0}")]
    Job(String),

    #[error("Chat error: {0}")]
    Chat(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<toml::de::Error> for ScoutError {
    fn from(err: toml::de::Error) -> Self {
        ScoutError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for ScoutError {
    fn from(err: toml::ser::Error) -> Self {
        ScoutError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for ScoutError {
    fn from(err: serde_json::Error) -> Self {
        ScoutError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for scout operations.
pub type Result<T> = std::result::Result<T, ScoutError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let cases: Vec<(ScoutError, &str)> = vec![
            (
                ScoutError::Config("bad key".to_string()),
                "Configuration error: bad key",
            ),
            (
                ScoutError::Cache("disk full".to_string()),
                "Cache error: disk full",
            ),
            (
                ScoutError::Pipeline("no tasks".to_string()),
                "Pipeline error: no tasks",
            ),
            (ScoutError::Job("lost".to_string()), "Job error: lost"),
            (ScoutError::Chat("empty".to_string()), "Chat error: empty"),
            (
                ScoutError::Serialization("invalid json".to_string()),
                "Serialization error: invalid json",
            ),
        ];

        for (error, expected) in cases {
            assert_eq!(error.to_string(), expected);
        }
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: ScoutError = io_err.into();
        assert!(matches!(err, ScoutError::Io(_)));
        assert!(err.to_string().starts_with("I/O error:"));
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_error_from_toml_de() {
        let err: std::result::Result<toml::Value, _> = toml::from_str("invalid = [[[");
        let scout_err: ScoutError = err.unwrap_err().into();
        assert!(matches!(scout_err, ScoutError::Config(_)));
    }

    #[test]
    fn test_error_from_serde_json() {
        let err: std::result::Result<serde_json::Value, _> = serde_json::from_str("{ nope }");
        let scout_err: ScoutError = err.unwrap_err().into();
        assert!(matches!(scout_err, ScoutError::Serialization(_)));
    }

    #[test]
    fn test_result_type_with_question_mark() {
        fn inner() -> Result<String> {
            let io_result: std::result::Result<i32, std::io::Error> = Ok(42);
            let value = io_result?;
            Ok(value.to_string())
        }

        assert_eq!(inner().unwrap(), "42");
    }
}
