//! Entity type selection expressions
//!
//! The NGSI-LD `type` query parameter is a small boolean language:
//!
//! ```text
//! selection := term (("," | "|") term)*
//! term      := factor (";" factor)*
//! factor    := "(" selection ")" | type-name
//! ```
//!
//! `,` and `|` are disjunction, `;` is conjunction.

use std::fmt;

use crate::error::{FederationError, FederationResult};

/// Parsed type selection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeSelection {
    /// A single type name
    Type(String),
    /// Every branch must hold
    All(Vec<TypeSelection>),
    /// At least one branch must hold
    Any(Vec<TypeSelection>),
}

impl TypeSelection {
    /// Parse a type selection expression
    ///
    /// ```
    /// # use ngsild_core::TypeSelection;
    /// let sel = TypeSelection::parse("(Beehive;Sensor),Apiary").unwrap();
    /// assert!(sel.evaluate(&["Apiary"]));
    /// assert!(sel.evaluate(&["Beehive", "Sensor"]));
    /// assert!(!sel.evaluate(&["Beehive"]));
    /// ```
    pub fn parse(input: &str) -> FederationResult<Self> {
        let mut parser = Parser {
            input,
            chars: input.char_indices().peekable(),
            depth: 0,
        };
        let selection = parser.selection()?;
        parser.skip_whitespace();
        match parser.chars.next() {
            None => Ok(selection),
            Some((pos, c)) => Err(invalid(input, &format!("unexpected '{}' at {}", c, pos))),
        }
    }

    /// Whether an entity carrying `types` satisfies the selection
    pub fn evaluate(&self, types: &[&str]) -> bool {
        match self {
            TypeSelection::Type(name) => types.contains(&name.as_str()),
            TypeSelection::All(branches) => branches.iter().all(|b| b.evaluate(types)),
            TypeSelection::Any(branches) => branches.iter().any(|b| b.evaluate(types)),
        }
    }

    /// Whether `entity_type` is named anywhere in the selection.
    ///
    /// A source registered for one type may hold entities carrying further
    /// types, so registration matching only needs the type to be mentioned.
    pub fn mentions(&self, entity_type: &str) -> bool {
        match self {
            TypeSelection::Type(name) => name == entity_type,
            TypeSelection::All(branches) | TypeSelection::Any(branches) => {
                branches.iter().any(|b| b.mentions(entity_type))
            }
        }
    }

    /// Every type name in the selection, in order of appearance
    pub fn type_names(&self) -> Vec<&str> {
        match self {
            TypeSelection::Type(name) => vec![name.as_str()],
            TypeSelection::All(branches) | TypeSelection::Any(branches) => {
                branches.iter().flat_map(|b| b.type_names()).collect()
            }
        }
    }
}

impl fmt::Display for TypeSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (branches, sep) = match self {
            TypeSelection::Type(name) => return f.write_str(name),
            TypeSelection::All(branches) => (branches, ";"),
            TypeSelection::Any(branches) => (branches, "|"),
        };
        f.write_str("(")?;
        for (i, branch) in branches.iter().enumerate() {
            if i > 0 {
                f.write_str(sep)?;
            }
            write!(f, "{}", branch)?;
        }
        f.write_str(")")
    }
}

fn invalid(input: &str, reason: &str) -> FederationError {
    FederationError::InvalidRequest(format!("Invalid type selection '{}': {}", input, reason))
}

/// Deepest parenthesis nesting accepted in a type selection
const MAX_NESTING: usize = 32;

struct Parser<'a> {
    input: &'a str,
    chars: std::iter::Peekable<std::str::CharIndices<'a>>,
    depth: usize,
}

impl Parser<'_> {
    fn skip_whitespace(&mut self) {
        while matches!(self.chars.peek(), Some((_, c)) if c.is_whitespace()) {
            self.chars.next();
        }
    }

    fn selection(&mut self) -> FederationResult<TypeSelection> {
        let mut branches = vec![self.term()?];
        loop {
            self.skip_whitespace();
            match self.chars.peek() {
                Some((_, ',')) | Some((_, '|')) => {
                    self.chars.next();
                    branches.push(self.term()?);
                }
                _ => break,
            }
        }
        Ok(collapse(branches, TypeSelection::Any))
    }

    fn term(&mut self) -> FederationResult<TypeSelection> {
        let mut branches = vec![self.factor()?];
        loop {
            self.skip_whitespace();
            match self.chars.peek() {
                Some((_, ';')) => {
                    self.chars.next();
                    branches.push(self.factor()?);
                }
                _ => break,
            }
        }
        Ok(collapse(branches, TypeSelection::All))
    }

    fn factor(&mut self) -> FederationResult<TypeSelection> {
        self.skip_whitespace();
        match self.chars.peek().copied() {
            Some((_, '(')) => {
                self.chars.next();
                if self.depth >= MAX_NESTING {
                    return Err(invalid(self.input, "nesting too deep"));
                }
                self.depth += 1;
                let inner = self.selection()?;
                self.depth -= 1;
                self.skip_whitespace();
                match self.chars.next() {
                    Some((_, ')')) => Ok(inner),
                    _ => Err(invalid(self.input, "unbalanced parenthesis")),
                }
            }
            Some((start, _)) => {
                let mut end = start;
                while let Some((pos, c)) = self.chars.peek().copied() {
                    if matches!(c, ',' | '|' | ';' | '(' | ')') || c.is_whitespace() {
                        break;
                    }
                    end = pos + c.len_utf8();
                    self.chars.next();
                }
                if end == start {
                    return Err(invalid(self.input, &format!("expected a type name at {}", start)));
                }
                Ok(TypeSelection::Type(self.input[start..end].to_string()))
            }
            None => Err(invalid(self.input, "expected a type name")),
        }
    }
}

fn collapse(mut branches: Vec<TypeSelection>, wrap: fn(Vec<TypeSelection>) -> TypeSelection) -> TypeSelection {
    if branches.len() == 1 {
        branches.remove(0)
    } else {
        wrap(branches)
    }
}
