//! Hierarchical tree paths
//!
//! A [`TreePath`] addresses a node in the data tree as a sequence of
//! [`PathArgument`]s. Repeated elements (list entries) are addressed by key,
//! and listener registrations may use a wildcard in place of the key to match
//! every entry of a list.
//!
//! # Path Syntax
//!
//! | Syntax | Meaning | Example |
//! |--------|---------|---------|
//! | `/` | Root | `/` |
//! | `/name` | Plain child | `/interfaces` |
//! | `/name[key]` | Repeated element with key | `/interface[eth0]` |
//! | `/name[*]` | Any repeated element (registrations only) | `/interface[*]` |

use smallvec::SmallVec;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error parsing a path string
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PathParseError {
    /// Path does not start with `/`
    #[error("path must start with '/': {0:?}")]
    MissingLeadingSlash(String),
    /// Empty segment, e.g. `//` or a trailing slash
    #[error("empty segment at position {0}")]
    EmptySegment(usize),
    /// Unclosed key bracket
    #[error("unclosed bracket starting at position {0}")]
    UnclosedBracket(usize),
    /// Empty key, e.g. `item[]`
    #[error("empty key at position {0}")]
    EmptyKey(usize),
    /// Unexpected character in a segment name
    #[error("unexpected character '{0}' at position {1}")]
    UnexpectedChar(char, usize),
}

/// One step in a [`TreePath`]
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PathArgument {
    /// Plain child: `name`
    Node(String),
    /// Repeated element addressed by key: `name[key]`
    Entry {
        /// Element name
        name: String,
        /// Element key
        key: String,
    },
    /// Any repeated element with the given name: `name[*]`
    Wildcard(String),
}

impl PathArgument {
    /// Plain child argument
    pub fn node(name: impl Into<String>) -> Self {
        PathArgument::Node(name.into())
    }

    /// Keyed repeated-element argument
    pub fn entry(name: impl Into<String>, key: impl Into<String>) -> Self {
        PathArgument::Entry {
            name: name.into(),
            key: key.into(),
        }
    }

    /// Wildcard argument matching every entry named `name`
    pub fn wildcard(name: impl Into<String>) -> Self {
        PathArgument::Wildcard(name.into())
    }

    /// The element name, without key
    pub fn name(&self) -> &str {
        match self {
            PathArgument::Node(name) => name,
            PathArgument::Entry { name, .. } => name,
            PathArgument::Wildcard(name) => name,
        }
    }

    /// Whether this is a wildcard argument
    pub fn is_wildcard(&self) -> bool {
        matches!(self, PathArgument::Wildcard(_))
    }

    /// The wildcard that would match this argument, if it is a keyed entry
    pub fn to_wildcard(&self) -> Option<PathArgument> {
        match self {
            PathArgument::Entry { name, .. } => Some(PathArgument::Wildcard(name.clone())),
            _ => None,
        }
    }

    /// Check whether this argument, used as a pattern, matches `concrete`
    ///
    /// A wildcard matches any entry with the same name; every other argument
    /// only matches itself.
    pub fn matches(&self, concrete: &PathArgument) -> bool {
        match (self, concrete) {
            (PathArgument::Wildcard(pattern), PathArgument::Entry { name, .. }) => pattern == name,
            _ => self == concrete,
        }
    }
}

impl fmt::Display for PathArgument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathArgument::Node(name) => write!(f, "{}", name),
            PathArgument::Entry { name, key } => write!(f, "{}[{}]", name, key),
            PathArgument::Wildcard(name) => write!(f, "{}[*]", name),
        }
    }
}

/// A path into the data tree
///
/// # Examples
///
/// ```
/// use treestore_core::{PathArgument, TreePath};
///
/// let path: TreePath = "/interfaces/interface[eth0]/mtu".parse().unwrap();
/// assert_eq!(path.len(), 3);
/// assert_eq!(path.last(), Some(&PathArgument::node("mtu")));
///
/// let built = TreePath::root()
///     .node("interfaces")
///     .entry("interface", "eth0")
///     .node("mtu");
/// assert_eq!(path, built);
///
/// let pattern: TreePath = "/interfaces/interface[*]".parse().unwrap();
/// assert!(pattern.contains_wildcard());
/// assert!(pattern.matches(&path.parent().unwrap()));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct TreePath {
    args: SmallVec<[PathArgument; 4]>,
}

impl TreePath {
    /// The root path
    pub fn root() -> Self {
        TreePath {
            args: SmallVec::new(),
        }
    }

    /// Create a path from a sequence of arguments
    pub fn from_args<I: IntoIterator<Item = PathArgument>>(args: I) -> Self {
        TreePath {
            args: args.into_iter().collect(),
        }
    }

    /// The path arguments, root first
    pub fn args(&self) -> &[PathArgument] {
        &self.args
    }

    /// Number of arguments
    pub fn len(&self) -> usize {
        self.args.len()
    }

    /// Whether this is the root path
    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    /// Whether this is the root path
    pub fn is_root(&self) -> bool {
        self.args.is_empty()
    }

    /// Append an argument (builder pattern)
    pub fn child(mut self, arg: PathArgument) -> Self {
        self.args.push(arg);
        self
    }

    /// Append a plain child (builder pattern)
    pub fn node(self, name: impl Into<String>) -> Self {
        self.child(PathArgument::node(name))
    }

    /// Append a keyed entry (builder pattern)
    pub fn entry(self, name: impl Into<String>, key: impl Into<String>) -> Self {
        self.child(PathArgument::entry(name, key))
    }

    /// Append a wildcard (builder pattern)
    pub fn wildcard(self, name: impl Into<String>) -> Self {
        self.child(PathArgument::wildcard(name))
    }

    /// Push an argument (mutating)
    pub fn push(&mut self, arg: PathArgument) {
        self.args.push(arg);
    }

    /// Pop the last argument (mutating)
    pub fn pop(&mut self) -> Option<PathArgument> {
        self.args.pop()
    }

    /// A new path with `arg` appended
    pub fn join(&self, arg: &PathArgument) -> TreePath {
        let mut path = self.clone();
        path.args.push(arg.clone());
        path
    }

    /// Parent path (None for root)
    pub fn parent(&self) -> Option<TreePath> {
        if self.args.is_empty() {
            None
        } else {
            let mut parent = self.clone();
            parent.args.pop();
            Some(parent)
        }
    }

    /// Last argument (None for root)
    pub fn last(&self) -> Option<&PathArgument> {
        self.args.last()
    }

    /// Whether this path is a prefix of `other` (or equal to it)
    pub fn is_ancestor_of(&self, other: &TreePath) -> bool {
        self.args.len() <= other.args.len()
            && self.args.iter().zip(other.args.iter()).all(|(a, b)| a == b)
    }

    /// Whether any argument is a wildcard
    pub fn contains_wildcard(&self) -> bool {
        self.args.iter().any(PathArgument::is_wildcard)
    }

    /// Check whether this path, used as a pattern, matches the concrete path
    pub fn matches(&self, concrete: &TreePath) -> bool {
        self.args.len() == concrete.args.len()
            && self
                .args
                .iter()
                .zip(concrete.args.iter())
                .all(|(pattern, arg)| pattern.matches(arg))
    }
}

impl fmt::Display for TreePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.args.is_empty() {
            return write!(f, "/");
        }
        for arg in &self.args {
            write!(f, "/{}", arg)?;
        }
        Ok(())
    }
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '-' | '.' | ':')
}

fn parse_argument(segment: &str, offset: usize) -> Result<PathArgument, PathParseError> {
    if segment.is_empty() {
        return Err(PathParseError::EmptySegment(offset));
    }

    let (name, key) = match segment.find('[') {
        Some(open) => {
            let rest = &segment[open + 1..];
            let close = rest
                .find(']')
                .ok_or(PathParseError::UnclosedBracket(offset + open))?;
            if close + 1 != rest.len() {
                let pos = offset + open + 1 + close + 1;
                let c = rest[close + 1..].chars().next().unwrap_or(']');
                return Err(PathParseError::UnexpectedChar(c, pos));
            }
            let key = &rest[..close];
            if key.is_empty() {
                return Err(PathParseError::EmptyKey(offset + open + 1));
            }
            (&segment[..open], Some(key))
        }
        None => (segment, None),
    };

    if name.is_empty() {
        return Err(PathParseError::EmptySegment(offset));
    }
    if let Some((i, c)) = name.char_indices().find(|(_, c)| !is_name_char(*c)) {
        return Err(PathParseError::UnexpectedChar(c, offset + i));
    }

    Ok(match key {
        None => PathArgument::node(name),
        Some("*") => PathArgument::wildcard(name),
        Some(key) => PathArgument::entry(name, key),
    })
}

impl FromStr for TreePath {
    type Err = PathParseError;

    /// Parse a path from its string form
    ///
    /// Keys may contain any character except `/` and `]`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let body = s
            .strip_prefix('/')
            .ok_or_else(|| PathParseError::MissingLeadingSlash(s.to_string()))?;
        if body.is_empty() {
            return Ok(TreePath::root());
        }

        let mut args = SmallVec::new();
        let mut offset = 1;
        for segment in body.split('/') {
            args.push(parse_argument(segment, offset)?);
            offset += segment.len() + 1;
        }
        Ok(TreePath { args })
    }
}
