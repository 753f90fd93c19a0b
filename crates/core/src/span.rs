//! Source locations and spans.

use std::cmp::Ordering;
use std::fmt;

/// A single (line, column) position, both 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Location {
    pub line: u32,
    pub column: u32,
}

impl Location {
    pub fn new(line: u32, column: u32) -> Self {
        Location { line, column }
    }
}

impl PartialOrd for Location {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Location {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.line, self.column).cmp(&(other.line, other.column))
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.line, self.column)
    }
}

/// A begin/end pair of locations. Inclusive of both endpoints.
///
/// Spans are combinable by taking the min of the two begins and the max of
/// the two ends, and are totally ordered on `(begin, end)` so diagnostics
/// and generated-symbol names can be sorted deterministically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Span {
    pub begin: Location,
    pub end: Location,
}

impl Span {
    pub fn new(begin: Location, end: Location) -> Self {
        debug_assert!(begin <= end, "span begin must not be after its end");
        Span { begin, end }
    }

    pub fn point(loc: Location) -> Self {
        Span {
            begin: loc,
            end: loc,
        }
    }

    /// Combine two spans into the smallest span covering both.
    pub fn combine(a: Span, b: Span) -> Span {
        Span {
            begin: a.begin.min(b.begin),
            end: a.end.max(b.end),
        }
    }
}

impl PartialOrd for Span {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Span {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.begin, self.end).cmp(&(other.begin, other.end))
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.begin, self.end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn combine_takes_min_and_max() {
        let a = Span::new(Location::new(1, 1), Location::new(1, 5));
        let b = Span::new(Location::new(1, 3), Location::new(2, 1));
        let c = Span::combine(a, b);
        assert_eq!(c.begin, Location::new(1, 1));
        assert_eq!(c.end, Location::new(2, 1));
    }

    #[test]
    fn spans_order_by_begin_then_end() {
        let a = Span::new(Location::new(1, 1), Location::new(1, 2));
        let b = Span::new(Location::new(1, 1), Location::new(1, 3));
        assert!(a < b);
    }

    #[test]
    fn display_matches_lc_format() {
        let s = Span::new(Location::new(2, 4), Location::new(2, 9));
        assert_eq!(s.to_string(), "2.4-2.9");
    }
}
