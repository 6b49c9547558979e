//! Errors reported by field evaluation and the element xi finder.
use thiserror::Error;
use xifield_optimize::lu::LuError;

/// Broad classification of a [`FieldError`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FieldErrorKind {
    /// The call itself is invalid. Reported immediately, never retried.
    StructuralPrecondition,
    /// A field cannot be evaluated at the current location.
    EvaluationUndefined,
    /// An iterative or linear solve failed to produce a solution.
    NumericalNonconvergence,
    /// An object is in use by a search in progress.
    ResourceBusy,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FieldError {
    #[error("field `{field}` has {expected} components but {actual} values were given")]
    ValueCountMismatch {
        field: String,
        expected: usize,
        actual: usize,
    },

    #[error("cannot solve underdetermined system: dimension {dimension} exceeds {values} values")]
    Underdetermined { dimension: usize, values: usize },

    #[error("field `{0}` does not belong to this field module")]
    WrongModule(String),

    #[error("field `{0}` is not real-valued")]
    NotRealValued(String),

    #[error("field `{field}` is not a `{expected}` field")]
    WrongFieldType { field: String, expected: &'static str },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("field `{field}` is undefined at this location: {reason}")]
    Undefined { field: String, reason: String },

    #[error("field `{0}` depends on itself")]
    CyclicEvaluation(String),

    #[error("field `{0}` has no derivatives at this location")]
    MissingDerivatives(String),

    #[error("singular system: {0}")]
    Singular(#[from] LuError),

    #[error("no convergence within {0} iterations")]
    NotConverged(usize),

    #[error("{0} is in use by a search in progress")]
    ResourceBusy(&'static str),
}

impl FieldError {
    pub(crate) fn undefined(field: &str, reason: impl Into<String>) -> Self {
        Self::Undefined {
            field: field.to_string(),
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> FieldErrorKind {
        use FieldError::*;
        match self {
            ValueCountMismatch { .. }
            | Underdetermined { .. }
            | WrongModule(_)
            | NotRealValued(_)
            | WrongFieldType { .. }
            | InvalidArgument(_) => FieldErrorKind::StructuralPrecondition,
            Undefined { .. } | CyclicEvaluation(_) | MissingDerivatives(_) => FieldErrorKind::EvaluationUndefined,
            Singular(_) | NotConverged(_) => FieldErrorKind::NumericalNonconvergence,
            ResourceBusy(_) => FieldErrorKind::ResourceBusy,
        }
    }

    /// Whether the error only rules out the current location or candidate element.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self.kind(),
            FieldErrorKind::EvaluationUndefined | FieldErrorKind::NumericalNonconvergence
        )
    }
}
