//! Domain error types.

/// A configuration error located by its JSON path, e.g. `quality.peRatio.lte`.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("invalid filter at {path}: {message}")]
pub struct FilterError {
    pub path: String,
    pub message: String,
}

impl FilterError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Format the error against the offending configuration document.
    pub fn display_with_context(&self, document: &str) -> String {
        format!("{document}\n^ at {path}\n{err}", path = self.path, err = self)
    }
}

/// Top-level error type for theoindex.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("database error: {reason}")]
    Database { reason: String },

    #[error("database query error: {reason}")]
    DatabaseQuery { reason: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error(transparent)]
    Filter(#[from] FilterError),

    #[error("unknown ranking strategy: {name}")]
    UnknownStrategy { name: String },

    #[error("invalid parameter {param} for strategy {strategy}: {reason}")]
    StrategyParam {
        strategy: String,
        param: String,
        reason: String,
    },

    #[error("invalid definition for index {code}: {reason}")]
    DefinitionInvalid { code: String, reason: String },

    #[error("index not found: {code}")]
    IndexNotFound { code: String },

    #[error("index already exists: {code}")]
    DuplicateIndex { code: String },

    #[error("index {code} has no point before {date}")]
    MissingBaseline { code: String, date: chrono::NaiveDate },

    #[error("market data unavailable for index {code} on {date}: {reason}")]
    ProviderUnavailable {
        code: String,
        date: chrono::NaiveDate,
        reason: String,
    },

    #[error("market data provider error: {reason}")]
    Provider { reason: String },

    #[error("csv error: {reason}")]
    Csv { reason: String },

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// Errors worth another attempt against the same provider.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            EngineError::Database { .. }
                | EngineError::DatabaseQuery { .. }
                | EngineError::Provider { .. }
        )
    }
}

impl From<&EngineError> for std::process::ExitCode {
    fn from(err: &EngineError) -> Self {
        let code: u8 = match err {
            EngineError::Io(_) => 1,
            EngineError::ConfigParse { .. }
            | EngineError::ConfigMissing { .. }
            | EngineError::ConfigInvalid { .. }
            | EngineError::Json(_)
            | EngineError::Csv { .. } => 2,
            EngineError::Database { .. } | EngineError::DatabaseQuery { .. } => 3,
            EngineError::Filter(_)
            | EngineError::UnknownStrategy { .. }
            | EngineError::StrategyParam { .. }
            | EngineError::DefinitionInvalid { .. } => 4,
            EngineError::MissingBaseline { .. }
            | EngineError::ProviderUnavailable { .. }
            | EngineError::Provider { .. } => 5,
            EngineError::IndexNotFound { .. } | EngineError::DuplicateIndex { .. } => 6,
        };
        std::process::ExitCode::from(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_error_names_path() {
        let err = FilterError::new("quality.peRatio.lte", "expected a number");
        assert_eq!(
            err.to_string(),
            "invalid filter at quality.peRatio.lte: expected a number"
        );
    }

    #[test]
    fn filter_error_converts_into_engine_error() {
        let err: EngineError = FilterError::new("quality", "expected an object").into();
        assert!(matches!(err, EngineError::Filter(_)));
    }

    #[test]
    fn transient_errors() {
        assert!(EngineError::Provider { reason: "timeout".into() }.is_transient());
        assert!(EngineError::DatabaseQuery { reason: "locked".into() }.is_transient());
        assert!(!EngineError::UnknownStrategy { name: "x".into() }.is_transient());
        assert!(!EngineError::IndexNotFound { code: "X".into() }.is_transient());
    }
}
