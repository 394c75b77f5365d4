//! Search patterns over the projected percentage stream.
//!
//! A pattern is a whitespace-delimited list of tokens. `N` matches the
//! value exactly, `N+` matches values of at least `N`, `N-` at most `N`,
//! with `N` in 0..=99. A pattern of `k` tokens matches a run of `k`
//! consecutive percentages; every matching start index yields its own run.

use std::str::FromStr;

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PatternError {
    #[error("empty token in pattern")]
    EmptyToken,
    #[error("bad token `{0}`, expected a value in 0..=99 with an optional + or - suffix")]
    BadToken(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Bound {
    Exact,
    AtLeast,
    AtMost,
}

/// One element of a search pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token {
    value: i32,
    bound: Bound,
}

impl Token {
    /// Whether a percentage value satisfies this token.
    pub fn matches(&self, pc: i32) -> bool {
        match self.bound {
            Bound::Exact => pc == self.value,
            Bound::AtLeast => pc >= self.value,
            Bound::AtMost => pc <= self.value,
        }
    }
}

impl FromStr for Token {
    type Err = PatternError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(PatternError::EmptyToken);
        }

        let (digits, bound) = match s.as_bytes()[s.len() - 1] {
            b'+' => (&s[..s.len() - 1], Bound::AtLeast),
            b'-' => (&s[..s.len() - 1], Bound::AtMost),
            _ => (s, Bound::Exact),
        };

        let value: i32 = digits
            .parse()
            .map_err(|_| PatternError::BadToken(s.to_string()))?;
        if !(0..=99).contains(&value) {
            return Err(PatternError::BadToken(s.to_string()));
        }

        Ok(Token { value, bound })
    }
}

/// A parsed search pattern.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Pattern {
    tokens: Vec<Token>,
}

impl Pattern {
    /// Parses a whitespace-delimited pattern. The empty pattern is valid
    /// and matches nothing.
    pub fn parse(pattern: &str) -> Result<Self, PatternError> {
        let tokens = pattern
            .split_whitespace()
            .map(Token::from_str)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Pattern { tokens })
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// Every contiguous run of positions matching the pattern, ascending by
    /// start index. Each returned run holds exactly `len()` indices.
    ///
    /// A partial run that fails is abandoned, and the failing position is
    /// reconsidered as the start of a new run.
    pub fn find_runs(&self, pcs: &[i32]) -> Vec<Vec<usize>> {
        if self.tokens.is_empty() {
            return Vec::new();
        }

        let mut runs = Vec::new();
        let mut partial: Vec<usize> = Vec::new();

        for (i, &pc) in pcs.iter().enumerate() {
            if self.tokens[partial.len()].matches(pc) {
                partial.push(i);
                if partial.len() == self.tokens.len() {
                    runs.push(std::mem::take(&mut partial));
                }
            } else if !partial.is_empty() {
                partial.clear();
                // The failing position may open a new run.
                if self.tokens[0].matches(pc) {
                    partial.push(i);
                }
            }
        }

        runs
    }
}
