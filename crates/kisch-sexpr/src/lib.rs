//! Lossless S-expression parse tree for KiCad files.
//!
//! [`parse`] produces a [`Tree`] that remembers every byte of the input:
//! whitespace, comments and the exact spelling of each atom. Serializing a
//! tree that was not edited reproduces the input unchanged, and edits touch
//! only the bytes of the nodes they change. [`Sexpr`] is the owned value type
//! used to describe new content before it is inserted.

use std::fmt;

pub mod format;
mod lexer;
mod tree;

pub use format::{escape_string, format_float, format_sexpr, quote_string};
pub use tree::{parse, NodeId, NodeKind, Tree};

/// Byte range of a node in the source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Span {
    /// Start byte offset (inclusive)
    pub start: usize,
    /// End byte offset (exclusive)
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }
}

/// What the parser wanted when it gave up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expected {
    /// An atom or a list
    Value,
    /// The `)` closing an open list
    CloseParen,
    /// The `"` terminating a string
    ClosingQuote,
    /// A well-formed numeric literal
    Number,
    /// Nothing after the root expression
    EndOfInput,
}

impl fmt::Display for Expected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expected::Value => write!(f, "a value"),
            Expected::CloseParen => write!(f, "')'"),
            Expected::ClosingQuote => write!(f, "closing '\"'"),
            Expected::Number => write!(f, "a number"),
            Expected::EndOfInput => write!(f, "end of input"),
        }
    }
}

/// Malformed input, located by byte offset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxError {
    pub offset: usize,
    pub expected: Expected,
}

impl fmt::Display for SyntaxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Expected {} at byte {}", self.expected, self.offset)
    }
}

impl std::error::Error for SyntaxError {}

/// An owned S-expression value
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Sexpr {
    /// A symbol - unquoted identifier
    Symbol(String),
    /// A string - quoted text
    String(String),
    /// A number, kept as its literal text
    Number(String),
    /// A list of S-expressions
    List(Vec<Sexpr>),
}

impl Sexpr {
    /// Create a symbol (unquoted atom)
    pub fn symbol(s: impl Into<String>) -> Self {
        Sexpr::Symbol(s.into())
    }

    /// Create a string (quoted atom)
    pub fn string(s: impl Into<String>) -> Self {
        Sexpr::String(s.into())
    }

    /// Create a number from anything that prints as a decimal literal
    pub fn number(n: impl fmt::Display) -> Self {
        Sexpr::Number(n.to_string())
    }

    pub fn int(n: i64) -> Self {
        Sexpr::Number(n.to_string())
    }

    /// Create a number with KiCad's coordinate precision
    pub fn float(n: f64) -> Self {
        Sexpr::Number(format_float(n))
    }

    /// `yes` / `no` symbol
    pub fn yes_no(b: bool) -> Self {
        Sexpr::Symbol(if b { "yes" } else { "no" }.to_string())
    }

    /// Create a list from a vector of S-expressions
    pub fn list(items: Vec<Sexpr>) -> Self {
        Sexpr::List(items)
    }

    /// Create a key-value pair list
    pub fn kv(key: impl Into<String>, value: impl Into<Sexpr>) -> Self {
        kv(key, value)
    }

    pub fn is_list(&self) -> bool {
        matches!(self, Sexpr::List(_))
    }

    /// Get the atom value if this is an atom
    pub fn as_atom(&self) -> Option<&str> {
        match self {
            Sexpr::Symbol(s) | Sexpr::String(s) | Sexpr::Number(s) => Some(s),
            Sexpr::List(_) => None,
        }
    }

    /// Get the list items if this is a list
    pub fn as_list(&self) -> Option<&[Sexpr]> {
        match self {
            Sexpr::List(items) => Some(items),
            _ => None,
        }
    }

    /// Get mutable access to list items if this is a list
    pub fn as_list_mut(&mut self) -> Option<&mut Vec<Sexpr>> {
        match self {
            Sexpr::List(items) => Some(items),
            _ => None,
        }
    }

    /// Head symbol of a list
    pub fn head(&self) -> Option<&str> {
        match self.as_list()?.first()? {
            Sexpr::Symbol(s) => Some(s),
            _ => None,
        }
    }

    /// Single-line rendering, one space between tokens
    pub fn to_compact_string(&self) -> String {
        let mut out = String::new();
        format::write_compact(self, &mut out);
        out
    }
}

impl fmt::Display for Sexpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format_sexpr(self, "\t"))
    }
}

/// Create a key-value pair list
pub fn kv<K: Into<String>, V: Into<Sexpr>>(k: K, v: V) -> Sexpr {
    Sexpr::list(vec![Sexpr::symbol(k), v.into()])
}

/// A builder for constructing lists incrementally
#[derive(Debug, Default)]
pub struct ListBuilder {
    items: Vec<Sexpr>,
}

impl ListBuilder {
    /// Create a new builder with a node name
    pub fn node(name: impl Into<String>) -> Self {
        Self {
            items: vec![Sexpr::symbol(name)],
        }
    }

    pub fn push<V: Into<Sexpr>>(&mut self, v: V) -> &mut Self {
        self.items.push(v.into());
        self
    }

    pub fn push_if<V: Into<Sexpr>>(&mut self, cond: bool, v: V) -> &mut Self {
        if cond {
            self.items.push(v.into());
        }
        self
    }

    pub fn extend<I, V>(&mut self, iter: I) -> &mut Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Sexpr>,
    {
        self.items.extend(iter.into_iter().map(Into::into));
        self
    }

    pub fn build(self) -> Sexpr {
        Sexpr::list(self.items)
    }
}

impl From<&str> for Sexpr {
    fn from(s: &str) -> Self {
        Self::symbol(s)
    }
}

impl From<String> for Sexpr {
    fn from(s: String) -> Self {
        Self::symbol(s)
    }
}

impl From<i64> for Sexpr {
    fn from(n: i64) -> Self {
        Sexpr::int(n)
    }
}

impl From<u32> for Sexpr {
    fn from(n: u32) -> Self {
        Sexpr::int(i64::from(n))
    }
}

impl From<f64> for Sexpr {
    fn from(n: f64) -> Self {
        Sexpr::float(n)
    }
}

impl From<bool> for Sexpr {
    fn from(b: bool) -> Self {
        Sexpr::yes_no(b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn syntax_error_display() {
        let err = parse("(a (b)").unwrap_err();
        assert_eq!(err.to_string(), "Expected ')' at byte 6");
    }

    #[test]
    fn tree_to_sexpr() {
        let tree = parse(r#"(pin passive line (at 0 3.81 270) (number "1"))"#).unwrap();
        let value = tree.to_sexpr(tree.root());
        assert_eq!(value.head(), Some("pin"));
        let items = value.as_list().unwrap();
        assert_eq!(
            items[3],
            Sexpr::list(vec![
                Sexpr::symbol("at"),
                Sexpr::number(0),
                Sexpr::number("3.81"),
                Sexpr::number(270),
            ])
        );
        assert_eq!(items[4], kv("number", Sexpr::string("1")));
    }

    #[test]
    fn compact_ignores_layout() {
        let a = parse("(a\n\t(b 1)   (c \"x\"))").unwrap();
        let b = parse("(a (b 1) (c \"x\"))").unwrap();
        assert_eq!(a.compact_text(a.root()), b.compact_text(b.root()));
        assert_eq!(a.compact_text(a.root()), "(a (b 1) (c \"x\"))");
    }

    #[test]
    fn from_sexpr_prints_canonically() {
        let mut wire = ListBuilder::node("wire");
        wire.push(Sexpr::list(vec![
            Sexpr::symbol("pts"),
            Sexpr::list(vec!["xy".into(), Sexpr::float(1.0), Sexpr::float(2.5)]),
            Sexpr::list(vec!["xy".into(), Sexpr::float(3.0), Sexpr::float(2.5)]),
        ]))
        .push(kv("uuid", Sexpr::string("u1")));
        let tree = Tree::from_sexpr(&wire.build());
        assert_eq!(
            tree.to_string(),
            "(wire\n\t(pts\n\t\t(xy 1 2.5) (xy 3 2.5)\n\t)\n\t(uuid \"u1\")\n)\n"
        );
    }

    #[test]
    fn bool_converts_to_yes_no() {
        assert_eq!(kv("in_bom", true).to_compact_string(), "(in_bom yes)");
        assert_eq!(kv("dnp", false).to_compact_string(), "(dnp no)");
    }
}
