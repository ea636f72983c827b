//! Token grammar of the streaming codec
//!
//! ```text
//! <12-3>     node 12, parent 3, unresolved
//! <12=3>     node 12, parent 3, nested under its parent
//! <>         blanked slot
//! <12:4-9>   left/right of node 12
//! ```

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;

use crate::domain::error::DomainError;
use crate::domain::node::NodeId;

pub const MISSING_SIGN: char = '-';
pub const NESTED_SIGN: char = '=';
pub const BLANK_TOKEN: &str = "<>";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Sign {
    /// Parent not (yet) resolved in the string.
    Missing,
    /// Directly follows its parent's block.
    Nested,
}

impl Sign {
    pub fn as_char(self) -> char {
        match self {
            Sign::Missing => MISSING_SIGN,
            Sign::Nested => NESTED_SIGN,
        }
    }

    fn from_char(c: char) -> Option<Self> {
        match c {
            MISSING_SIGN => Some(Sign::Missing),
            NESTED_SIGN => Some(Sign::Nested),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Token {
    pub id: NodeId,
    pub sign: Sign,
    pub parent: NodeId,
}

impl Token {
    pub fn new(id: NodeId, parent: NodeId) -> Self {
        Self {
            id,
            sign: Sign::Missing,
            parent,
        }
    }

    pub fn nested(self) -> Self {
        Self {
            sign: Sign::Nested,
            ..self
        }
    }

    pub fn missing(self) -> Self {
        Self {
            sign: Sign::Missing,
            ..self
        }
    }

    pub fn with_parent(self, parent: NodeId) -> Self {
        Self { parent, ..self }
    }

    pub fn is_nested(&self) -> bool {
        self.sign == Sign::Nested
    }

    pub fn is_missing(&self) -> bool {
        self.sign == Sign::Missing
    }

    /// Parse the body between `<` and `>` of a string the codec wrote itself.
    pub(crate) fn parse_body(body: &str) -> Option<Self> {
        let pos = body.find([MISSING_SIGN, NESTED_SIGN])?;
        let sign = Sign::from_char(body[pos..].chars().next()?)?;
        let id = body[..pos].parse().ok()?;
        let parent = body[pos + 1..].parse().ok()?;
        Some(Self { id, sign, parent })
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}{}{}>", self.id, self.sign.as_char(), self.parent)
    }
}

fn token_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^<([0-9]+)([-=])([0-9]+)>$").expect("valid regex"))
}

impl FromStr for Token {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let caps = token_pattern()
            .captures(s)
            .ok_or_else(|| DomainError::InvalidToken(s.to_string()))?;
        let parse = |i: usize| -> Result<i64, DomainError> {
            caps[i]
                .parse()
                .map_err(|_| DomainError::InvalidToken(s.to_string()))
        };
        let sign = caps[2]
            .chars()
            .next()
            .and_then(Sign::from_char)
            .ok_or_else(|| DomainError::InvalidToken(s.to_string()))?;
        Ok(Token {
            id: parse(1)?,
            sign,
            parent: parse(3)?,
        })
    }
}

/// One positional slot of a token string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    Node(Token),
    Blank,
}

/// Iterate the slots of a codec string with their byte ranges.
pub(crate) fn slots(s: &str) -> impl Iterator<Item = (std::ops::Range<usize>, Slot)> + '_ {
    let mut offset = 0;
    std::iter::from_fn(move || loop {
        let rest = s.get(offset..)?;
        let start = offset + rest.find('<')?;
        let end = start + s[start..].find('>')? + 1;
        offset = end;
        let body = &s[start + 1..end - 1];
        if body.is_empty() {
            return Some((start..end, Slot::Blank));
        }
        if let Some(token) = Token::parse_body(body) {
            return Some((start..end, Slot::Node(token)));
        }
    })
}

/// Iterate only the node tokens of a codec string.
pub(crate) fn tokens(s: &str) -> impl Iterator<Item = Token> + '_ {
    slots(s).filter_map(|(_, slot)| match slot {
        Slot::Node(token) => Some(token),
        Slot::Blank => None,
    })
}

/// Left/right pair as carried in the parallel validation stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeftRight {
    pub id: NodeId,
    pub left: i64,
    pub right: i64,
}

impl fmt::Display for LeftRight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}:{}-{}>", self.id, self.left, self.right)
    }
}

impl LeftRight {
    pub(crate) fn parse_body(body: &str) -> Option<Self> {
        let (id, range) = body.split_once(':')?;
        let (left, right) = range.split_once('-')?;
        Some(Self {
            id: id.parse().ok()?,
            left: left.parse().ok()?,
            right: right.parse().ok()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("<12-3>", Token { id: 12, sign: Sign::Missing, parent: 3 })]
    #[case("<7=0>", Token { id: 7, sign: Sign::Nested, parent: 0 })]
    fn given_valid_token_when_parsed_then_fields_match(#[case] input: &str, #[case] expected: Token) {
        let token: Token = input.parse().unwrap();
        assert_eq!(token, expected);
        assert_eq!(token.to_string(), input);
    }

    #[rstest]
    #[case("<12+3>")]
    #[case("12-3")]
    #[case("<a-3>")]
    #[case("<>")]
    fn given_malformed_token_when_parsed_then_invalid_token(#[case] input: &str) {
        assert!(matches!(
            input.parse::<Token>(),
            Err(DomainError::InvalidToken(_))
        ));
    }

    #[test]
    fn given_string_with_blank_when_iterating_slots_then_blank_is_positional() {
        let collected: Vec<Slot> = slots("<1-0><><2=1>").map(|(_, s)| s).collect();
        assert_eq!(collected.len(), 3);
        assert_eq!(collected[1], Slot::Blank);
        assert_eq!(tokens("<1-0><><2=1>").count(), 2);
    }
}
