use thiserror::Error;

use crate::cards::Card;

/// Raised by the evaluator when the card set cannot be ranked.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EvalError {
    #[error("Invalid hand input: {0}")]
    InvalidHandInput(InputProblem),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum InputProblem {
    #[error("expected {expected} cards, got {actual}")]
    CardCount { expected: &'static str, actual: usize },
    #[error("duplicate card {0}")]
    DuplicateCard(Card),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CardError {
    #[error("Malformed card token: {token:?}")]
    MalformedCard { token: String },
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum InferredError {
    #[error("Confidence must lie in [0.0, 1.0], got {0}")]
    InvalidConfidence(f64),
}
