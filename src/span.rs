use serde::{Deserialize, Serialize};

/// A 1-based line/column position in the source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub struct Location {
    pub offset: usize,
    pub line: usize,
    pub column: usize,
}

impl Location {
    pub fn start() -> Self {
        Location {
            offset: 0,
            line: 1,
            column: 1,
        }
    }
}

/// A half-open range over the source text, carried on every AST and token
/// node so the parser, validator, and error formatter can all point back
/// at exactly the text they are complaining about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Span {
    pub start: Location,
    pub end: Location,
}

impl Span {
    pub fn new(start: Location, end: Location) -> Self {
        Span { start, end }
    }

    /// merge two spans, covering from the start of the first to the end of
    /// the second
    pub fn to(&self, other: Span) -> Span {
        Span {
            start: self.start,
            end: other.end,
        }
    }
}
