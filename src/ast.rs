//! Generic parse tree produced by the grammar.
//!
//! The grammar only knows about groups of terms; deciding whether a group
//! is a block, an assignment or a bare statement is the builder's job.

use crate::error::Position;
use crate::value::{Operator, Value};

/// One term inside a group.
#[derive(Debug, Clone, PartialEq)]
pub enum Term {
    /// The left-hand string of an assignment, query or block.
    Key(String),
    Operator(Operator),
    Value(Value),
    /// The body of a block. Empty for `key = {}`.
    Nested(Vec<Group>),
}

/// A parsed statement: its terms in source order plus an optional
/// `#ORIGIN = ...` annotation.
///
/// Shapes produced by the grammar:
/// - `[Value]` for a bare value inside a block
/// - `[Key, Operator, Value]` for assignments and queries
/// - `[Key, Operator(Assign), Nested]` for blocks
#[derive(Debug, Clone, PartialEq)]
pub struct Group {
    pub terms: Vec<Term>,
    pub origin: Option<String>,
    /// Where the group starts in the normalized text.
    pub begin: Position,
}

impl Group {
    pub fn arity(&self) -> usize {
        self.terms.len()
    }
}
