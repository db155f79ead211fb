// Path Expression Parser
// Parses `root.key[0].field` references used by step parameter mappings

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Syntax error in a path expression
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid path '{path}' at position {position}: {message}")]
pub struct PathSyntaxError {
    pub path: String,
    pub position: usize,
    pub message: String,
}

impl PathSyntaxError {
    fn new(path: &str, position: usize, message: impl Into<String>) -> Self {
        Self {
            path: path.to_string(),
            position,
            message: message.into(),
        }
    }
}

/// One access after the root identifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    /// Object member access: `.name`
    Key(String),
    /// Array element access: `[3]`
    Index(usize),
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSegment::Key(key) => write!(f, ".{}", key),
            PathSegment::Index(index) => write!(f, "[{}]", index),
        }
    }
}

/// Parsed path expression: a root namespace key followed by member/index segments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathExpr {
    root: String,
    segments: Vec<PathSegment>,
}

impl PathExpr {
    /// Parse a path expression
    ///
    /// Grammar: `ident ( '.' ident | '[' digits ']' )*` where identifiers are made of
    /// ASCII letters, digits, `_` and `-`.
    pub fn parse(input: &str) -> Result<Self, PathSyntaxError> {
        let bytes = input.as_bytes();
        let mut pos = 0;

        let root = read_identifier(input, &mut pos)?;
        let mut segments = Vec::new();

        while pos < bytes.len() {
            match bytes[pos] {
                b'.' => {
                    pos += 1;
                    let key = read_identifier(input, &mut pos)?;
                    segments.push(PathSegment::Key(key));
                }
                b'[' => {
                    let open = pos;
                    pos += 1;
                    let start = pos;
                    while pos < bytes.len() && bytes[pos].is_ascii_digit() {
                        pos += 1;
                    }
                    if start == pos {
                        return Err(PathSyntaxError::new(
                            input,
                            pos,
                            "expected a non-negative integer index",
                        ));
                    }
                    if pos >= bytes.len() || bytes[pos] != b']' {
                        return Err(PathSyntaxError::new(input, open, "unterminated index"));
                    }
                    let index = input[start..pos].parse::<usize>().map_err(|_| {
                        PathSyntaxError::new(input, start, "index does not fit in usize")
                    })?;
                    pos += 1;
                    segments.push(PathSegment::Index(index));
                }
                other => {
                    return Err(PathSyntaxError::new(
                        input,
                        pos,
                        format!("unexpected character '{}'", other as char),
                    ));
                }
            }
        }

        Ok(Self { root, segments })
    }

    /// Root namespace key (`initial` or a step id)
    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    /// First member key after the root, if the path starts with one
    pub fn first_key(&self) -> Option<&str> {
        match self.segments.first() {
            Some(PathSegment::Key(key)) => Some(key),
            _ => None,
        }
    }
}

impl FromStr for PathExpr {
    type Err = PathSyntaxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for PathExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.root)?;
        for segment in &self.segments {
            write!(f, "{}", segment)?;
        }
        Ok(())
    }
}

fn is_identifier_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'-'
}

fn read_identifier(input: &str, pos: &mut usize) -> Result<String, PathSyntaxError> {
    let bytes = input.as_bytes();
    let start = *pos;
    while *pos < bytes.len() && is_identifier_byte(bytes[*pos]) {
        *pos += 1;
    }
    if start == *pos {
        let message = if *pos >= bytes.len() {
            "expected identifier, found end of path".to_string()
        } else {
            format!("expected identifier, found '{}'", bytes[*pos] as char)
        };
        return Err(PathSyntaxError::new(input, start, message));
    }
    Ok(input[start..*pos].to_string())
}
