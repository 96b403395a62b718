//! Error and result types shared across the workspace.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, Error)]
pub enum Error {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("type error: {0}")]
    TypeError(String),

    #[error("syntax error at {line}:{col}: expected {expected}, found {found}")]
    SyntaxError {
        line: usize,
        col: usize,
        expected: String,
        found: String,
    },

    #[error("semantic error: {0}")]
    SemanticError(String),

    #[error("constraint violation ({kind}): {detail}")]
    ConstraintViolation { kind: String, detail: String },

    #[error("transaction error: {0}")]
    TransactionState(String),

    #[error("query canceled")]
    Canceled,

    #[error("io error: {0}")]
    Io(String),

    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),
}

impl Error {
    /// Shorthand for the common missing-node case.
    pub fn node_not_found(id: u64) -> Self {
        Error::NotFound(format!("node {id}"))
    }

    pub fn relationship_not_found(id: u64) -> Self {
        Error::NotFound(format!("relationship {id}"))
    }

    pub fn constraint(kind: impl Into<String>, detail: impl Into<String>) -> Self {
        Error::ConstraintViolation {
            kind: kind.into(),
            detail: detail.into(),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Io(format!("json: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::Error;

    #[test]
    fn syntax_error_carries_position() {
        let err = Error::SyntaxError {
            line: 3,
            col: 14,
            expected: "')'".to_string(),
            found: "EOF".to_string(),
        };
        assert_eq!(format!("{err}"), "syntax error at 3:14: expected ')', found EOF");
    }

    #[test]
    fn constraint_helper_formats_kind() {
        let err = Error::constraint("unique", "Person.email = 'a@x'");
        assert!(format!("{err}").contains("unique"));
    }
}
