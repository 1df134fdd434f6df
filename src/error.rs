use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// A 0-based position in the source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    /// 0-based line number
    pub line: usize,
    /// 0-based column (character offset within the line)
    pub column: usize,
    /// 0-based absolute byte offset from the start of input
    pub offset: usize,
}

/// A grammar failure: which alternative was expected, what was found
/// instead, and where.
#[derive(Debug, Clone, PartialEq)]
pub struct SyntaxError {
    pub expected: String,
    pub found: String,
    /// Start of the offending region
    pub begin: Position,
    /// End of the offending region (exclusive)
    pub end: Position,
}

impl SyntaxError {
    pub fn new(expected: impl Into<String>, found: impl Into<String>, begin: Position, end: Position) -> Self {
        SyntaxError {
            expected: expected.into(),
            found: found.into(),
            begin,
            end,
        }
    }

    pub fn message(&self) -> String {
        format!("Expected {}, found {}", self.expected, self.found)
    }
}

impl fmt::Display for SyntaxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.begin == self.end {
            write!(
                f,
                "{}:{}: {} (offset {})",
                self.begin.line,
                self.begin.column,
                self.message(),
                self.begin.offset
            )
        } else {
            write!(
                f,
                "{}:{}-{}:{}: {} (offset {})",
                self.begin.line,
                self.begin.column,
                self.end.line,
                self.end.column,
                self.message(),
                self.begin.offset
            )
        }
    }
}

impl std::error::Error for SyntaxError {}

/// Everything that can stop a file, a mod or a merge.
///
/// Apart from [`Error::TargetNotEmpty`], none of these abort a whole batch:
/// the driver logs them and moves on to the next file or mod.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum Error {
    /// The normalized text does not satisfy the grammar.
    #[error("malformed source '{file}': {error}")]
    MalformedSource { file: String, error: SyntaxError },

    /// A `.mod` descriptor lacks its name or path.
    #[error("malformed mod descriptor '{}': {reason}", file.display())]
    MalformedDescriptor { file: PathBuf, reason: String },

    /// A tree or merge step met a shape it cannot classify.
    #[error("structural violation in {context}: {reason}")]
    StructuralViolation { context: String, reason: String },

    /// The two sides of a conflict are not the same kind of entry.
    #[error("conflict on '{key}' mixes entry types: original is {original}, candidate is {candidate}")]
    ConflictTypeMismatch {
        key: String,
        original: String,
        candidate: String,
    },

    /// The target mod directory already holds files and cleaning was not requested.
    #[error("target '{}' exists and is not empty; rerun with --clean to empty it", .0.display())]
    TargetNotEmpty(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("directory walk error: {0}")]
    Walk(#[from] walkdir::Error),
}

impl Error {
    pub fn structural(context: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::StructuralViolation {
            context: context.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
