//! Domain error types.

/// A parse error with position information for rule parsing.
#[derive(Debug, Clone, thiserror::Error)]
#[error("parse error at position {position}: {message}")]
pub struct ParseError {
    pub message: String,
    pub position: usize,
}

impl ParseError {
    /// Format the error with a caret pointing at the error position in the input.
    pub fn display_with_context(&self, input: &str) -> String {
        let caret = " ".repeat(self.position) + "^";
        format!(
            "{input}\n{caret}\n{err}",
            input = input,
            caret = caret,
            err = self
        )
    }
}

/// Top-level error type for fxgrid.
#[derive(Debug, thiserror::Error)]
pub enum FxError {
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
    RuleParse(#[from] ParseError),

    #[error("invalid rule: {reason}")]
    RuleInvalid { reason: String },

    #[error("no {timeframe} bars for {pair} between {start} and {end}")]
    DataGap {
        pair: String,
        timeframe: String,
        start: String,
        end: String,
    },

    #[error("invalid parameter {name}: {reason}")]
    InvalidParameter { name: String, reason: String },

    #[error("backtest cancelled")]
    Cancelled,

    #[error("logging setup failed: {reason}")]
    Logging { reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl FxError {
    pub fn invalid_parameter(name: &str, reason: impl Into<String>) -> Self {
        FxError::InvalidParameter {
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<&FxError> for std::process::ExitCode {
    fn from(err: &FxError) -> Self {
        let code: u8 = match err {
            FxError::Io(_) | FxError::Logging { .. } => 1,
            FxError::ConfigParse { .. }
            | FxError::ConfigMissing { .. }
            | FxError::ConfigInvalid { .. } => 2,
            FxError::Database { .. } | FxError::DatabaseQuery { .. } => 3,
            FxError::RuleParse(_) | FxError::RuleInvalid { .. } => 4,
            FxError::DataGap { .. } => 5,
            FxError::InvalidParameter { .. } => 6,
            FxError::Cancelled => 130,
        };
        std::process::ExitCode::from(code)
    }
}
