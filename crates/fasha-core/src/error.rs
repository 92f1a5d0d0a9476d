use thiserror::Error;

/// Top-level error type for the Fasha system.
///
/// Infrastructure crates (catalog, storage) report through this type; the
/// dialogue crate wraps it in its own `ChatError` so the `?` operator works
/// across crate boundaries.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum FashaError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Catalog error: {0}")]
    Catalog(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("API error: {0}")]
    Api(String),
}

impl From<toml::de::Error> for FashaError {
    fn from(err: toml::de::Error) -> Self {
        FashaError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for FashaError {
    fn from(err: toml::ser::Error) -> Self {
        FashaError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for FashaError {
    fn from(err: serde_json::Error) -> Self {
        FashaError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for Fasha operations.
pub type Result<T> = std::result::Result<T, FashaError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_all_variants() {
        let cases: Vec<(FashaError, &str)> = vec![
            (
                FashaError::Config("bad key".to_string()),
                "Configuration error: bad key",
            ),
            (
                FashaError::Catalog("no products".to_string()),
                "Catalog error: no products",
            ),
            (
                FashaError::Embedding("empty text".to_string()),
                "Embedding error: empty text",
            ),
            (
                FashaError::Storage("database is locked".to_string()),
                "Storage error: database is locked",
            ),
            (
                FashaError::Serialization("invalid json".to_string()),
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
        let err: FashaError = io_err.into();
        match &err {
            FashaError::Io(e) => assert_eq!(e.kind(), std::io::ErrorKind::NotFound),
            _ => panic!("Expected Io variant"),
        }
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_toml_error_conversion() {
        let toml_err = toml::from_str::<toml::Value>("not = [valid").unwrap_err();
        let err: FashaError = toml_err.into();
        assert!(matches!(err, FashaError::Config(_)));
    }

    #[test]
    fn test_json_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("{broken").unwrap_err();
        let err: FashaError = json_err.into();
        assert!(matches!(err, FashaError::Serialization(_)));
    }
}
