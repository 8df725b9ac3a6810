use thiserror::Error;

/// Main error type for novelgraph
#[derive(Error, Debug)]
pub enum NovelGraphError {
    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// File system I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Extraction service call failed (network or API error)
    #[error("Extraction error: {0}")]
    Extraction(String),

    /// Extraction response could not be decoded by any parse layer
    #[error("Parse error: {0}")]
    Parse(String),

    /// Referenced novel does not exist
    #[error("Novel not found: {0}")]
    NovelNotFound(i64),

    /// Referenced character does not exist
    #[error("Character not found: {0}")]
    CharacterNotFound(i64),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl NovelGraphError {
    /// True for failures of the extraction call itself. The graph engine
    /// falls back to stored data on these instead of failing the request.
    pub fn is_extraction_failure(&self) -> bool {
        matches!(
            self,
            NovelGraphError::Extraction(_) | NovelGraphError::Parse(_)
        )
    }
}

/// Convenient Result type using NovelGraphError
pub type Result<T> = std::result::Result<T, NovelGraphError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = NovelGraphError::Config("bad value".to_string());
        assert!(err.to_string().contains("Configuration error"));
        assert!(err.to_string().contains("bad value"));
    }

    #[test]
    fn test_error_from_rusqlite() {
        let sqlite_err = rusqlite::Error::InvalidQuery;
        let err: NovelGraphError = sqlite_err.into();
        assert!(matches!(err, NovelGraphError::Database(_)));
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: NovelGraphError = io_err.into();
        assert!(matches!(err, NovelGraphError::Io(_)));
    }

    #[test]
    fn test_extraction_failure_classification() {
        assert!(NovelGraphError::Extraction("timeout".into()).is_extraction_failure());
        assert!(NovelGraphError::Parse("no json".into()).is_extraction_failure());
        assert!(!NovelGraphError::NovelNotFound(1).is_extraction_failure());
    }
}
