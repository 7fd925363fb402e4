use thiserror::Error;

/// Caller contract violations detected before an analysis is run
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AnalysisError {
    #[error("invalid reaction grade '{0}' (expected one of Neg, w+, 1+, 2+, 3+, 4+)")]
    InvalidGrade(String),

    #[error("invalid autocontrol value '{0}' (expected Negative or Positive)")]
    InvalidAutoControl(String),

    #[error("unknown antigen '{0}'")]
    UnknownAntigen(String),

    #[error("panel must contain exactly {expected} cells, found {found}")]
    WrongCellCount { expected: usize, found: usize },

    #[error("reaction vector must contain exactly {expected} entries, found {found}")]
    WrongReactionCount { expected: usize, found: usize },

    #[error("cell id {0} is outside the panel range 1..=11")]
    CellOutOfRange(u8),

    #[error("cell {0} is listed more than once")]
    DuplicateCell(u8),

    #[error("no reaction recorded for cell {0}")]
    MissingReaction(u8),
}
