//! Error types shared across the crate.
//!
//! Parsing failures get their own enum so callers can report the exact
//! position; everything else funnels into [`PareError`].

use thiserror::Error;

/// A malformed Newick string. Parsing is all-or-nothing.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("empty tree string")]
    Empty,

    #[error("unbalanced parentheses at byte {0}")]
    Unbalanced(usize),

    #[error("duplicate node label '{0}'")]
    DuplicateLabel(String),

    #[error("invalid branch length '{value}' at byte {pos}")]
    InvalidLength { value: String, pos: usize },

    #[error("unterminated {what} starting at byte {pos}")]
    Unterminated { what: &'static str, pos: usize },

    #[error("unexpected '{ch}' at byte {pos}")]
    Unexpected { ch: char, pos: usize },
}

/// Main error type for paring runs.
#[derive(Error, Debug)]
pub enum PareError {
    #[error("Tree parsing error: {0}")]
    Parse(#[from] ParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Label not found in tree: {0}")]
    UnknownLabel(String),

    #[error("Empty tip set")]
    EmptyTipSet,
}

pub type Result<T> = std::result::Result<T, PareError>;
