//! The typed error taxonomy shared by every Lattice crate.
//!
//! Unlike the teacher's FFI-facing `runtime::error` (thread-local state
//! exchanged across a C ABI boundary) this crate has no FFI boundary, so
//! errors are ordinary typed values threaded through `Result` and `?`.

use std::fmt;

/// A source location, attached to an error when the producing layer has one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SourceLoc {
    pub line: u32,
    pub col: u32,
}

impl fmt::Display for SourceLoc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.col)
    }
}

/// Every runtime error kind named in the specification (§7).
#[derive(Debug, thiserror::Error)]
pub enum LatticeError {
    #[error("lex error: {message}")]
    LexError { message: String },

    #[error("parse error: {message}")]
    ParseError { message: String },

    #[error("type error: {message}")]
    TypeError {
        message: String,
        loc: Option<SourceLoc>,
    },

    #[error("arity error: {message}")]
    ArityError {
        message: String,
        loc: Option<SourceLoc>,
    },

    #[error("index error: {message}")]
    IndexError {
        message: String,
        loc: Option<SourceLoc>,
    },

    #[error("key error: {message}")]
    KeyError {
        message: String,
        loc: Option<SourceLoc>,
    },

    #[error("phase violation: {message}")]
    PhaseViolation {
        message: String,
        loc: Option<SourceLoc>,
    },

    #[error("contract violation in `{function}`: {message}")]
    ContractViolation {
        function: String,
        message: String,
        loc: Option<SourceLoc>,
    },

    #[error("division by zero")]
    DivisionByZero { loc: Option<SourceLoc> },

    #[error("overflow: {message}")]
    Overflow { message: String },

    #[error("io error: {message}")]
    IoError { message: String },

    #[error("network error: {message}")]
    NetworkError { message: String },

    #[error("cancelled")]
    Cancelled,
}

impl LatticeError {
    /// The message carried by every variant, used when binding a `try/catch`
    /// variable (spec §7: "the message binds to the catch variable").
    pub fn message(&self) -> String {
        match self {
            LatticeError::LexError { message }
            | LatticeError::ParseError { message }
            | LatticeError::TypeError { message, .. }
            | LatticeError::ArityError { message, .. }
            | LatticeError::IndexError { message, .. }
            | LatticeError::KeyError { message, .. }
            | LatticeError::PhaseViolation { message, .. }
            | LatticeError::IoError { message }
            | LatticeError::NetworkError { message } => message.clone(),
            LatticeError::ContractViolation {
                function, message, ..
            } => format!("{function}: {message}"),
            LatticeError::DivisionByZero { .. } => "division by zero".to_string(),
            LatticeError::Overflow { message } => message.clone(),
            LatticeError::Cancelled => "cancelled".to_string(),
        }
    }

    pub fn phase_violation(message: impl Into<String>) -> Self {
        LatticeError::PhaseViolation {
            message: message.into(),
            loc: None,
        }
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        LatticeError::TypeError {
            message: message.into(),
            loc: None,
        }
    }

    pub fn arity_error(message: impl Into<String>) -> Self {
        LatticeError::ArityError {
            message: message.into(),
            loc: None,
        }
    }
}

pub type Result<T> = std::result::Result<T, LatticeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_extracts_phase_violation_text() {
        let err = LatticeError::phase_violation("cannot push to a crystal array");
        assert!(err.message().contains("phase") || err.message().contains("crystal"));
    }

    #[test]
    fn contract_violation_message_includes_function_name() {
        let err = LatticeError::ContractViolation {
            function: "add".to_string(),
            message: "a > 0 failed".to_string(),
            loc: None,
        };
        assert_eq!(err.message(), "add: a > 0 failed");
    }
}
