//! Domain error types.
//!
//! Routine missing-data conditions on the per-tick path are never errors; they
//! degrade to "no prediction" for the affected asset. Errors here cover
//! construction-time precondition violations and adapter I/O.

/// Top-level error type for confluence.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("invalid window for {asset}: {reason}")]
    InvalidWindow { asset: String, reason: String },

    #[error("no data for {asset}")]
    NoData { asset: String },

    #[error("data error: {reason}")]
    Data { reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl EngineError {
    pub(crate) fn invalid(section: &str, key: &str, reason: impl Into<String>) -> Self {
        EngineError::ConfigInvalid {
            section: section.to_string(),
            key: key.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<&EngineError> for std::process::ExitCode {
    fn from(err: &EngineError) -> Self {
        let code: u8 = match err {
            EngineError::Io(_) => 1,
            EngineError::ConfigParse { .. }
            | EngineError::ConfigInvalid { .. } => 2,
            EngineError::InvalidWindow { .. }
            | EngineError::NoData { .. }
            | EngineError::Data { .. } => 5,
        };
        std::process::ExitCode::from(code)
    }
}
