//! Rule error types

use crate::ruleset::Phase;

/// Errors raised while loading or executing rules.
///
/// Everything except [`RuleError::Execution`] happens while the rule set is
/// loaded and prevents the engine from starting.
#[derive(Debug, thiserror::Error)]
pub enum RuleError {
    #[error("Parse error at line {line}, column {col}: {message}")]
    ParseError {
        line: usize,
        col: usize,
        message: String,
    },

    #[error("Unexpected token at line {line}: expected {expected}, found '{found}'")]
    UnexpectedToken {
        expected: String,
        found: String,
        line: usize,
    },

    #[error("Unexpected end of input: expected {0}")]
    UnexpectedEof(String),

    #[error("Unsupported rule language '{0}'")]
    UnsupportedLanguage(String),

    #[error("Unrecognized rule function '{0}': names must start with pre_, post_ or select_pool_")]
    UnrecognizedFunction(String),

    #[error("Duplicate rule function '{0}'")]
    DuplicateFunction(String),

    #[error("'{statement}' is not allowed in {phase} rule '{function}'")]
    PhaseMismatch {
        function: String,
        statement: String,
        phase: Phase,
    },

    #[error("Rule source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("Rule '{function}' failed: {message}")]
    Execution { function: String, message: String },
}

impl RuleError {
    pub fn execution(function: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Execution {
            function: function.into(),
            message: message.into(),
        }
    }

    /// True for errors that can only occur while a rule set is loaded.
    pub fn is_boot_fatal(&self) -> bool {
        !matches!(self, Self::Execution { .. })
    }
}

/// Result type alias for rule operations
pub type RuleResult<T> = Result<T, RuleError>;
