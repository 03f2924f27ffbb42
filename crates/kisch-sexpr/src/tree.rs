//! Arena-backed lossless parse tree.
//!
//! Nodes are addressed by [`NodeId`] handles that stay valid for the life of
//! the [`Tree`]; detaching a node never invalidates or reuses its handle.
//! Each node owns the trivia that precedes it, so serializing an untouched
//! tree reproduces the source byte for byte.

use std::fmt;
use std::io;

use crate::format;
use crate::lexer::{Lexer, Token, TokenKind};
use crate::{Expected, Sexpr, Span, SyntaxError};

/// Stable handle of a node inside a [`Tree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

/// The structural kind of a node.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    /// Unquoted symbolic atom (`passive`, `yes`, `kicad_sch`)
    Symbol(String),
    /// Quoted string, stored unescaped
    String(String),
    /// Numeric literal, stored exactly as written
    Number(String),
    /// Ordered list of children
    List(Vec<NodeId>),
}

#[derive(Debug, Clone)]
pub(crate) struct NodeData {
    pub(crate) kind: NodeKind,
    /// Whitespace and comments before the token.
    pub(crate) leading: String,
    /// Original token text for atoms. `None` once edited or when synthesized.
    pub(crate) raw: Option<String>,
    /// Trivia before the closing paren of a list.
    pub(crate) closing: String,
    pub(crate) parent: Option<NodeId>,
    pub(crate) span: Option<Span>,
    pub(crate) modified: bool,
    pub(crate) attached: bool,
}

impl NodeData {
    fn new(kind: NodeKind, leading: String, parent: Option<NodeId>) -> Self {
        Self {
            kind,
            leading,
            raw: None,
            closing: String::new(),
            parent,
            span: None,
            modified: false,
            attached: true,
        }
    }
}

/// A parsed (or constructed) S-expression document.
#[derive(Debug, Clone)]
pub struct Tree {
    pub(crate) nodes: Vec<NodeData>,
    pub(crate) root: NodeId,
    /// Trivia after the root node (usually the final newline).
    pub(crate) trailing: String,
    /// Indentation unit used when laying out new nodes.
    pub(crate) indent: String,
}

/// Parse text into a lossless [`Tree`].
pub fn parse(input: &str) -> Result<Tree, SyntaxError> {
    log::trace!("Parsing S-expression from {} bytes of input", input.len());
    let result = TreeParser::new(input).parse();
    match &result {
        Ok(tree) => log::trace!("Successfully parsed {} nodes", tree.nodes.len()),
        Err(e) => log::trace!("Failed to parse S-expression: {e}"),
    }
    result
}

struct TreeParser<'a> {
    lexer: Lexer<'a>,
    nodes: Vec<NodeData>,
}

impl<'a> TreeParser<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            lexer: Lexer::new(input),
            nodes: Vec::new(),
        }
    }

    fn parse(mut self) -> Result<Tree, SyntaxError> {
        let input = self.lexer.input();
        let first = self.lexer.next_token()?;
        if first.kind == TokenKind::Eof {
            return Err(SyntaxError {
                offset: input.len(),
                expected: Expected::Value,
            });
        }
        let root = self.parse_value(first, None)?;

        let tail = self.lexer.next_token()?;
        if tail.kind != TokenKind::Eof {
            return Err(SyntaxError {
                offset: tail.span.start,
                expected: Expected::EndOfInput,
            });
        }

        let mut tree = Tree {
            nodes: self.nodes,
            root,
            trailing: input[tail.leading].to_string(),
            indent: String::new(),
        };
        tree.indent = tree.detect_indent();
        Ok(tree)
    }

    fn push(&mut self, data: NodeData) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(data);
        id
    }

    fn parse_value(&mut self, tok: Token, parent: Option<NodeId>) -> Result<NodeId, SyntaxError> {
        let input = self.lexer.input();
        let leading = input[tok.leading.clone()].to_string();
        let raw = &input[tok.span.clone()];

        let kind = match tok.kind {
            TokenKind::LParen => return self.parse_list(tok, leading, parent),
            TokenKind::RParen | TokenKind::Eof => {
                return Err(SyntaxError {
                    offset: tok.span.start,
                    expected: Expected::Value,
                })
            }
            TokenKind::Symbol => NodeKind::Symbol(raw.to_string()),
            TokenKind::Number => NodeKind::Number(raw.to_string()),
            TokenKind::String(value) => NodeKind::String(value),
        };

        let mut data = NodeData::new(kind, leading, parent);
        data.raw = Some(raw.to_string());
        data.span = Some(Span::new(tok.span.start, tok.span.end));
        Ok(self.push(data))
    }

    fn parse_list(
        &mut self,
        open: Token,
        leading: String,
        parent: Option<NodeId>,
    ) -> Result<NodeId, SyntaxError> {
        let id = self.push(NodeData::new(NodeKind::List(Vec::new()), leading, parent));
        let mut children = Vec::new();

        loop {
            let tok = self.lexer.next_token()?;
            match tok.kind {
                TokenKind::RParen => {
                    let input = self.lexer.input();
                    let node = &mut self.nodes[id.index()];
                    node.closing = input[tok.leading].to_string();
                    node.span = Some(Span::new(open.span.start, tok.span.end));
                    node.kind = NodeKind::List(children);
                    return Ok(id);
                }
                TokenKind::Eof => {
                    return Err(SyntaxError {
                        offset: tok.span.start,
                        expected: Expected::CloseParen,
                    })
                }
                _ => {
                    children.push(self.parse_value(tok, Some(id))?);
                    if children.len() % 1000 == 0 {
                        log::trace!(
                            "Parsed {} items in list at position {}",
                            children.len(),
                            open.span.start
                        );
                    }
                }
            }
        }
    }
}

impl Tree {
    /// Build a new tree from a [`Sexpr`] value using canonical layout.
    pub fn from_sexpr(sexpr: &Sexpr) -> Self {
        let mut tree = Tree {
            nodes: Vec::new(),
            root: NodeId(0),
            trailing: "\n".to_string(),
            indent: "\t".to_string(),
        };
        tree.root = tree.build(sexpr, None, 0, String::new());
        tree
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn indent_unit(&self) -> &str {
        &self.indent
    }

    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.nodes[id.index()].kind
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.index()].parent
    }

    /// Source span of a parsed node; `None` for synthesized nodes.
    pub fn span(&self, id: NodeId) -> Option<Span> {
        self.nodes[id.index()].span
    }

    pub fn leading(&self, id: NodeId) -> &str {
        &self.nodes[id.index()].leading
    }

    /// Whether the node is still part of the document.
    pub fn is_attached(&self, id: NodeId) -> bool {
        let mut current = Some(id);
        while let Some(node) = current {
            if !self.nodes[node.index()].attached {
                return false;
            }
            current = self.parent(node);
        }
        true
    }

    /// Whether the node or anything below it was edited.
    pub fn is_modified(&self, id: NodeId) -> bool {
        self.nodes[id.index()].modified
    }

    pub fn is_list(&self, id: NodeId) -> bool {
        matches!(self.kind(id), NodeKind::List(_))
    }

    /// Children of a list; empty for atoms.
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        match self.kind(id) {
            NodeKind::List(items) => items,
            _ => &[],
        }
    }

    /// Text value of an atom (symbol, string or number).
    pub fn atom(&self, id: NodeId) -> Option<&str> {
        match self.kind(id) {
            NodeKind::Symbol(s) | NodeKind::String(s) | NodeKind::Number(s) => Some(s),
            NodeKind::List(_) => None,
        }
    }

    pub fn as_sym(&self, id: NodeId) -> Option<&str> {
        match self.kind(id) {
            NodeKind::Symbol(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_str(&self, id: NodeId) -> Option<&str> {
        match self.kind(id) {
            NodeKind::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_number(&self, id: NodeId) -> Option<&str> {
        match self.kind(id) {
            NodeKind::Number(s) => Some(s),
            _ => None,
        }
    }

    /// Head symbol of a list: `symbol` for `(symbol ...)`.
    pub fn head(&self, id: NodeId) -> Option<&str> {
        let first = *self.children(id).first()?;
        self.as_sym(first)
    }

    /// Atom value of the child at `index` (`0` is the head).
    pub fn atom_at(&self, id: NodeId, index: usize) -> Option<&str> {
        let child = *self.children(id).get(index)?;
        self.atom(child)
    }

    /// First direct child list `(name ...)`.
    pub fn child_list(&self, id: NodeId, name: &str) -> Option<NodeId> {
        self.children(id)
            .iter()
            .copied()
            .find(|&child| self.head(child) == Some(name))
    }

    /// All direct child lists `(name ...)`.
    pub fn child_lists(&self, id: NodeId, name: &str) -> Vec<NodeId> {
        self.children(id)
            .iter()
            .copied()
            .filter(|&child| self.head(child) == Some(name))
            .collect()
    }

    /// Follow nested child lists by head name, e.g. `["effects", "font", "size"]`.
    pub fn find_path(&self, id: NodeId, path: &[&str]) -> Option<NodeId> {
        path.iter()
            .try_fold(id, |node, name| self.child_list(node, name))
    }

    /// Whether a bare symbol flag (e.g. `hide`) is present among the children.
    pub fn has_flag(&self, id: NodeId, flag: &str) -> bool {
        self.children(id)
            .iter()
            .skip(1)
            .any(|&child| self.as_sym(child) == Some(flag))
    }

    /// Number of ancestors between `id` and the root.
    pub fn depth(&self, id: NodeId) -> usize {
        let mut depth = 0;
        let mut current = self.parent(id);
        while let Some(node) = current {
            depth += 1;
            current = self.parent(node);
        }
        depth
    }

    /// Position of `id` within its parent's children.
    pub fn index_in_parent(&self, id: NodeId) -> Option<usize> {
        let parent = self.parent(id)?;
        self.children(parent).iter().position(|&c| c == id)
    }

    /// Convert a subtree into an owned [`Sexpr`] value, dropping trivia.
    pub fn to_sexpr(&self, id: NodeId) -> Sexpr {
        match self.kind(id) {
            NodeKind::Symbol(s) => Sexpr::Symbol(s.clone()),
            NodeKind::String(s) => Sexpr::String(s.clone()),
            NodeKind::Number(s) => Sexpr::Number(s.clone()),
            NodeKind::List(items) => {
                Sexpr::List(items.iter().map(|&child| self.to_sexpr(child)).collect())
            }
        }
    }

    /// Exact text of a subtree, excluding its own leading trivia.
    pub fn text_of(&self, id: NodeId) -> String {
        let mut out = String::new();
        format::write_node(self, id, &mut out, false);
        out
    }

    /// Whitespace-insensitive token text of a subtree, used for content comparison.
    pub fn compact_text(&self, id: NodeId) -> String {
        self.to_sexpr(id).to_compact_string()
    }

    /// Write the full document.
    pub fn write_to<W: io::Write>(&self, mut writer: W) -> io::Result<()> {
        writer.write_all(self.to_string().as_bytes())
    }

    /// Copy a subtree into a standalone tree, keeping inner trivia.
    pub fn subtree(&self, id: NodeId) -> Tree {
        let mut tree = Tree {
            nodes: Vec::new(),
            root: NodeId(0),
            trailing: String::new(),
            indent: self.indent.clone(),
        };
        tree.root = tree.copy_from(self, id, None);
        tree.nodes[tree.root.index()].leading.clear();
        tree
    }

    // ---- editing ---------------------------------------------------------

    /// Replace an atom with a bare symbol.
    pub fn set_symbol(&mut self, id: NodeId, value: impl Into<String>) {
        self.set_atom(id, NodeKind::Symbol(value.into()));
    }

    /// Replace an atom with a quoted string.
    pub fn set_string(&mut self, id: NodeId, value: impl Into<String>) {
        self.set_atom(id, NodeKind::String(value.into()));
    }

    /// Replace an atom with a numeric literal.
    pub fn set_number(&mut self, id: NodeId, literal: impl Into<String>) {
        self.set_atom(id, NodeKind::Number(literal.into()));
    }

    /// Replace the value of an atom node. Setting an equal value is a no-op
    /// and keeps the original lexeme.
    pub fn set_atom(&mut self, id: NodeId, kind: NodeKind) {
        debug_assert!(!self.is_list(id), "set_atom called on a list");
        debug_assert!(!matches!(kind, NodeKind::List(_)), "set_atom with a list");
        if self.nodes[id.index()].kind == kind {
            return;
        }
        let node = &mut self.nodes[id.index()];
        node.kind = kind;
        node.raw = None;
        self.mark_modified(id);
    }

    /// Insert a new subtree built from `sexpr` at `index` within `parent`.
    pub fn insert_sexpr(&mut self, parent: NodeId, index: usize, sexpr: &Sexpr) -> NodeId {
        let index = index.min(self.children(parent).len());
        let leading = self.leading_for_insert(parent, index, sexpr.is_list(), sexpr.head());
        let depth = self.depth(parent) + 1;
        let id = self.build(sexpr, Some(parent), depth, leading);
        self.attach(parent, index, id);
        id
    }

    /// Append a new subtree at the end of `parent`.
    pub fn append_sexpr(&mut self, parent: NodeId, sexpr: &Sexpr) -> NodeId {
        let index = self.children(parent).len();
        self.insert_sexpr(parent, index, sexpr)
    }

    /// Replace a node with a freshly built subtree, keeping the old node's
    /// leading trivia. Returns the new node.
    pub fn replace_with_sexpr(&mut self, id: NodeId, sexpr: &Sexpr) -> NodeId {
        let Some(parent) = self.parent(id) else {
            let leading = self.nodes[id.index()].leading.clone();
            let new_root = self.build(sexpr, None, 0, leading);
            self.nodes[id.index()].attached = false;
            self.root = new_root;
            self.nodes[new_root.index()].modified = true;
            return new_root;
        };
        let index = self.index_in_parent(id).unwrap_or(0);
        let leading = self.nodes[id.index()].leading.clone();
        let depth = self.depth(parent) + 1;
        let new_id = self.build(sexpr, Some(parent), depth, leading);
        self.swap_child(parent, index, id, new_id);
        new_id
    }

    /// Copy a subtree from another tree (keeping its inner trivia) and
    /// insert it at `index` within `parent`.
    pub fn graft(&mut self, parent: NodeId, index: usize, from: &Tree, node: NodeId) -> NodeId {
        let index = index.min(self.children(parent).len());
        let head = from.head(node);
        let leading = self.leading_for_insert(parent, index, from.is_list(node), head);
        let id = self.copy_from(from, node, Some(parent));
        self.nodes[id.index()].leading = leading;
        self.attach(parent, index, id);
        id
    }

    /// Replace `id` with a copy of `node` from another tree, keeping the
    /// leading trivia of `id`.
    pub fn replace_with_graft(&mut self, id: NodeId, from: &Tree, node: NodeId) -> NodeId {
        let leading = self.nodes[id.index()].leading.clone();
        let Some(parent) = self.parent(id) else {
            let new_root = self.copy_from(from, node, None);
            self.nodes[new_root.index()].leading = leading;
            self.nodes[id.index()].attached = false;
            self.root = new_root;
            return new_root;
        };
        let index = self.index_in_parent(id).unwrap_or(0);
        let new_id = self.copy_from(from, node, Some(parent));
        self.nodes[new_id.index()].leading = leading;
        self.swap_child(parent, index, id, new_id);
        new_id
    }

    /// Detach a node from its parent. Its leading trivia goes with it.
    pub fn remove(&mut self, id: NodeId) -> bool {
        let Some(parent) = self.parent(id) else {
            return false;
        };
        let NodeKind::List(items) = &mut self.nodes[parent.index()].kind else {
            return false;
        };
        let Some(pos) = items.iter().position(|&c| c == id) else {
            return false;
        };
        items.remove(pos);
        self.nodes[id.index()].attached = false;
        self.mark_modified(parent);
        true
    }

    fn swap_child(&mut self, parent: NodeId, index: usize, old: NodeId, new: NodeId) {
        if let NodeKind::List(items) = &mut self.nodes[parent.index()].kind {
            items[index] = new;
        }
        self.nodes[old.index()].attached = false;
        self.nodes[new.index()].modified = true;
        self.mark_modified(parent);
    }

    fn attach(&mut self, parent: NodeId, index: usize, id: NodeId) {
        let child_is_list = self.is_list(id);
        if let NodeKind::List(items) = &mut self.nodes[parent.index()].kind {
            items.insert(index, id);
        }
        // A list that gains a child list can no longer close on the same line.
        if child_is_list && !self.nodes[parent.index()].closing.contains('\n') {
            let depth = self.depth(parent);
            self.nodes[parent.index()].closing = format!("\n{}", self.indent.repeat(depth));
        }
        self.nodes[id.index()].modified = true;
        self.mark_modified(parent);
    }

    fn mark_modified(&mut self, id: NodeId) {
        let mut current = Some(id);
        while let Some(node) = current {
            self.nodes[node.index()].modified = true;
            current = self.nodes[node.index()].parent;
        }
    }

    fn leading_for_insert(
        &self,
        parent: NodeId,
        index: usize,
        is_list: bool,
        head: Option<&str>,
    ) -> String {
        if index == 0 {
            return String::new();
        }
        if !is_list {
            return " ".to_string();
        }
        let siblings = self.children(parent);
        if head == Some("xy") && self.head(parent) == Some("pts") {
            let previous = siblings[index - 1];
            if self.head(previous) == Some("xy") {
                return " ".to_string();
            }
        }
        format::line_break(&self.indent, self.depth(parent) + 1)
    }

    fn build(
        &mut self,
        sexpr: &Sexpr,
        parent: Option<NodeId>,
        depth: usize,
        leading: String,
    ) -> NodeId {
        let kind = match sexpr {
            Sexpr::Symbol(s) => NodeKind::Symbol(s.clone()),
            Sexpr::String(s) => NodeKind::String(s.clone()),
            Sexpr::Number(s) => NodeKind::Number(s.clone()),
            Sexpr::List(_) => NodeKind::List(Vec::new()),
        };
        let id = NodeId(self.nodes.len() as u32);
        let mut data = NodeData::new(kind, leading, parent);
        data.modified = true;
        self.nodes.push(data);

        if let Sexpr::List(items) = sexpr {
            let layout = format::layout_children(items, &self.indent, depth);
            let mut children = Vec::with_capacity(items.len());
            for (item, child_leading) in items.iter().zip(layout.leading) {
                children.push(self.build(item, Some(id), depth + 1, child_leading));
            }
            let node = &mut self.nodes[id.index()];
            node.kind = NodeKind::List(children);
            node.closing = layout.closing;
        }
        id
    }

    fn copy_from(&mut self, from: &Tree, node: NodeId, parent: Option<NodeId>) -> NodeId {
        let source = &from.nodes[node.index()];
        let id = NodeId(self.nodes.len() as u32);
        let mut data = source.clone();
        data.parent = parent;
        data.attached = true;
        data.span = None;
        if let NodeKind::List(_) = data.kind {
            data.kind = NodeKind::List(Vec::new());
        }
        self.nodes.push(data);

        if let NodeKind::List(items) = &source.kind {
            let children: Vec<NodeId> = items
                .iter()
                .map(|&child| self.copy_from(from, child, Some(id)))
                .collect();
            self.nodes[id.index()].kind = NodeKind::List(children);
        }
        id
    }

    fn detect_indent(&self) -> String {
        for &child in self.children(self.root) {
            let leading = self.leading(child);
            if !self.is_list(child) {
                continue;
            }
            if let Some(pos) = leading.rfind('\n') {
                let unit = &leading[pos + 1..];
                if unit.starts_with('\t') {
                    return "\t".to_string();
                }
                if !unit.is_empty() && unit.chars().all(|c| c == ' ') {
                    return unit.to_string();
                }
            }
        }
        "\t".to_string()
    }
}

impl fmt::Display for Tree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = String::new();
        format::write_node(self, self.root, &mut out, true);
        out.push_str(&self.trailing);
        f.write_str(&out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "(kicad_sch\n\t(version 20231120)\n\t(generator \"eeschema\")\n\t(wire\n\t\t(pts\n\t\t\t(xy 100 96.19) (xy 120 96.19)\n\t\t)\n\t\t(uuid \"0f3c\")\n\t)\n)\n";

    #[test]
    fn roundtrip_is_byte_exact() {
        let inputs = [
            SAMPLE,
            "(a)",
            "  (a  b\t\"c d\" ; comment\n  (e 1.000000 -2))  \n\n",
            "(a\r\n  (b \"esc\\\"aped\\\\\")\r\n)\r\n",
            "(symbol \"résistance\" \"日本語\" \"🔥\")",
            "(uuid 5d7e3b1c-0000-4000-8000-000000000001)",
        ];
        for input in inputs {
            let tree = parse(input).unwrap();
            assert_eq!(tree.to_string(), input);
        }
    }

    #[test]
    fn numbers_keep_their_literal() {
        let tree = parse("(ratio 12.000000 0.50 -0)").unwrap();
        let root = tree.root();
        assert_eq!(tree.atom_at(root, 1), Some("12.000000"));
        assert_eq!(tree.atom_at(root, 2), Some("0.50"));
        assert_eq!(tree.as_number(tree.children(root)[3]), Some("-0"));
    }

    #[test]
    fn syntax_errors_report_offsets() {
        let err = parse("(a (b)").unwrap_err();
        assert_eq!(err.expected, Expected::CloseParen);
        assert_eq!(err.offset, 6);

        let err = parse("(a \"open").unwrap_err();
        assert_eq!(err.expected, Expected::ClosingQuote);
        assert_eq!(err.offset, 3);

        let err = parse("(a))").unwrap_err();
        assert_eq!(err.expected, Expected::EndOfInput);
        assert_eq!(err.offset, 3);

        let err = parse("(at 1.2.3 0)").unwrap_err();
        assert_eq!(err.expected, Expected::Number);
        assert_eq!(err.offset, 4);

        let err = parse("   ").unwrap_err();
        assert_eq!(err.expected, Expected::Value);
    }

    #[test]
    fn child_queries() {
        let tree = parse(SAMPLE).unwrap();
        let root = tree.root();
        assert_eq!(tree.head(root), Some("kicad_sch"));
        let wire = tree.child_list(root, "wire").unwrap();
        let pts = tree.child_list(wire, "pts").unwrap();
        assert_eq!(tree.child_lists(pts, "xy").len(), 2);
        let uuid = tree.find_path(root, &["wire", "uuid"]).unwrap();
        assert_eq!(tree.atom_at(uuid, 1), Some("0f3c"));
        assert_eq!(tree.depth(pts), 2);
    }

    #[test]
    fn editing_an_atom_touches_only_that_token() {
        let mut tree = parse(SAMPLE).unwrap();
        let root = tree.root();
        let version = tree.child_list(root, "version").unwrap();
        let value = tree.children(version)[1];
        tree.set_number(value, "20250114");
        assert_eq!(
            tree.to_string(),
            SAMPLE.replace("20231120", "20250114")
        );
        assert!(tree.is_modified(root));
        let wire = tree.child_list(root, "wire").unwrap();
        assert!(!tree.is_modified(wire));
    }

    #[test]
    fn set_string_requotes() {
        let mut tree = parse("(property \"Value\" \"10k\")").unwrap();
        let value = tree.children(tree.root())[2];
        tree.set_string(value, "4\"7k");
        assert_eq!(tree.to_string(), "(property \"Value\" \"4\\\"7k\")");
    }

    #[test]
    fn inserted_lists_use_canonical_layout() {
        let mut tree = parse(SAMPLE).unwrap();
        let root = tree.root();
        let junction = Sexpr::list(vec![
            Sexpr::symbol("junction"),
            Sexpr::list(vec![
                Sexpr::symbol("at"),
                Sexpr::number(100),
                Sexpr::float(96.19),
            ]),
            Sexpr::kv("uuid", Sexpr::string("abcd")),
        ]);
        tree.append_sexpr(root, &junction);
        let expected = SAMPLE.replace(
            "\t)\n)\n",
            "\t)\n\t(junction\n\t\t(at 100 96.19)\n\t\t(uuid \"abcd\")\n\t)\n)\n",
        );
        assert_eq!(tree.to_string(), expected);
    }

    #[test]
    fn xy_points_share_a_line() {
        let mut tree = parse(SAMPLE).unwrap();
        let pts = tree.find_path(tree.root(), &["wire", "pts"]).unwrap();
        tree.append_sexpr(
            pts,
            &Sexpr::list(vec![Sexpr::symbol("xy"), Sexpr::number(130), Sexpr::number(90)]),
        );
        assert!(tree
            .to_string()
            .contains("(xy 100 96.19) (xy 120 96.19) (xy 130 90)\n"));
    }

    #[test]
    fn inline_parent_breaks_when_it_gains_a_list() {
        let mut tree = parse("(root\n\t(property \"Reference\" \"R1\")\n)").unwrap();
        let prop = tree.child_list(tree.root(), "property").unwrap();
        tree.append_sexpr(
            prop,
            &Sexpr::list(vec![Sexpr::symbol("at"), Sexpr::number(1), Sexpr::number(2)]),
        );
        assert_eq!(
            tree.to_string(),
            "(root\n\t(property \"Reference\" \"R1\"\n\t\t(at 1 2)\n\t)\n)"
        );
    }

    #[test]
    fn removal_detaches_and_keeps_handles_valid() {
        let mut tree = parse(SAMPLE).unwrap();
        let root = tree.root();
        let wire = tree.child_list(root, "wire").unwrap();
        let pts = tree.child_list(wire, "pts").unwrap();
        assert!(tree.remove(wire));
        assert!(!tree.is_attached(wire));
        assert!(!tree.is_attached(pts));
        assert_eq!(tree.head(wire), Some("wire"));
        assert_eq!(
            tree.to_string(),
            "(kicad_sch\n\t(version 20231120)\n\t(generator \"eeschema\")\n)\n"
        );
        assert!(!tree.remove(wire));
    }

    #[test]
    fn graft_preserves_inner_text() {
        let lib = parse("(kicad_symbol_lib\n  (symbol \"R\"  (pin_numbers hide)\n    (property \"Value\" \"R\"))\n)").unwrap();
        let symbol = lib.child_list(lib.root(), "symbol").unwrap();
        let mut sch = parse("(kicad_sch\n\t(lib_symbols)\n)").unwrap();
        let lib_symbols = sch.child_list(sch.root(), "lib_symbols").unwrap();
        let grafted = sch.graft(lib_symbols, 1, &lib, symbol);
        assert_eq!(sch.text_of(grafted), lib.text_of(symbol));
        assert_eq!(
            sch.to_string(),
            "(kicad_sch\n\t(lib_symbols\n\t\t(symbol \"R\"  (pin_numbers hide)\n    (property \"Value\" \"R\"))\n\t)\n)"
        );
    }

    #[test]
    fn detects_space_indentation() {
        let tree = parse("(kicad_sch (version 20211123)\n  (uuid 1234-abcd)\n)").unwrap();
        assert_eq!(tree.indent_unit(), "  ");
    }

    #[test]
    fn replace_keeps_leading_trivia() {
        let mut tree = parse("(a\n\t(b 1)\n\t(c 2)\n)").unwrap();
        let b = tree.child_list(tree.root(), "b").unwrap();
        tree.replace_with_sexpr(b, &Sexpr::kv("b", Sexpr::number(3)));
        assert_eq!(tree.to_string(), "(a\n\t(b 3)\n\t(c 2)\n)");
    }

    #[test]
    fn subtree_snapshot() {
        let tree = parse(SAMPLE).unwrap();
        let wire = tree.child_list(tree.root(), "wire").unwrap();
        let snapshot = tree.subtree(wire);
        assert_eq!(snapshot.to_string(), tree.text_of(wire));
        assert_eq!(snapshot.head(snapshot.root()), Some("wire"));
    }
}
