//! Serialization and canonical layout.
//!
//! Parsed nodes print their original trivia and lexemes. Nodes created
//! through [`Tree::insert_sexpr`](crate::Tree::insert_sexpr) and friends get
//! KiCad's own layout: one child list per line, indented by the document's
//! indentation unit, atoms separated by a single space, and consecutive `xy`
//! points inside `pts` kept on one line.

use crate::tree::{NodeKind, Tree};
use crate::{NodeId, Sexpr};

pub(crate) fn write_node(tree: &Tree, id: NodeId, out: &mut String, include_leading: bool) {
    let node = &tree.nodes[id.index()];
    if include_leading {
        out.push_str(&node.leading);
    }
    match &node.kind {
        NodeKind::List(items) => {
            out.push('(');
            for &child in items {
                write_node(tree, child, out, true);
            }
            out.push_str(&node.closing);
            out.push(')');
        }
        kind => match &node.raw {
            Some(raw) => out.push_str(raw),
            None => write_atom(kind, out),
        },
    }
}

fn write_atom(kind: &NodeKind, out: &mut String) {
    match kind {
        NodeKind::Symbol(s) | NodeKind::Number(s) => out.push_str(s),
        NodeKind::String(s) => out.push_str(&quote_string(s)),
        NodeKind::List(_) => {}
    }
}

pub(crate) fn line_break(indent: &str, depth: usize) -> String {
    format!("\n{}", indent.repeat(depth))
}

pub(crate) struct Layout {
    pub(crate) leading: Vec<String>,
    pub(crate) closing: String,
}

/// Leading trivia for each child of a list sitting at `depth`, plus the
/// trivia before its closing paren.
pub(crate) fn layout_children(items: &[Sexpr], indent: &str, depth: usize) -> Layout {
    let in_pts = matches!(items.first(), Some(Sexpr::Symbol(s)) if s == "pts");
    let mut leading = Vec::with_capacity(items.len());
    let mut broke = false;

    for (i, item) in items.iter().enumerate() {
        let trivia = if i == 0 {
            String::new()
        } else if !item.is_list() {
            " ".to_string()
        } else if in_pts && item.head() == Some("xy") && items[i - 1].head() == Some("xy") {
            " ".to_string()
        } else {
            broke = true;
            line_break(indent, depth + 1)
        };
        leading.push(trivia);
    }

    let closing = if broke {
        line_break(indent, depth)
    } else {
        String::new()
    };
    Layout { leading, closing }
}

/// Pretty-print a [`Sexpr`] with canonical layout.
pub fn format_sexpr(sexpr: &Sexpr, indent: &str) -> String {
    let mut out = String::new();
    write_sexpr(sexpr, indent, 0, &mut out);
    out
}

fn write_sexpr(sexpr: &Sexpr, indent: &str, depth: usize, out: &mut String) {
    match sexpr {
        Sexpr::Symbol(s) | Sexpr::Number(s) => out.push_str(s),
        Sexpr::String(s) => out.push_str(&quote_string(s)),
        Sexpr::List(items) => {
            let layout = layout_children(items, indent, depth);
            out.push('(');
            for (item, leading) in items.iter().zip(&layout.leading) {
                out.push_str(leading);
                write_sexpr(item, indent, depth + 1, out);
            }
            out.push_str(&layout.closing);
            out.push(')');
        }
    }
}

/// Single-line rendering with one space between tokens.
pub(crate) fn write_compact(sexpr: &Sexpr, out: &mut String) {
    match sexpr {
        Sexpr::Symbol(s) | Sexpr::Number(s) => out.push_str(s),
        Sexpr::String(s) => out.push_str(&quote_string(s)),
        Sexpr::List(items) => {
            out.push('(');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(' ');
                }
                write_compact(item, out);
            }
            out.push(')');
        }
    }
}

pub fn quote_string(s: &str) -> String {
    format!("\"{}\"", escape_string(s))
}

pub fn escape_string(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '"' => result.push_str("\\\""),
            '\\' => result.push_str("\\\\"),
            '\n' => result.push_str("\\n"),
            '\r' => result.push_str("\\r"),
            '\t' => result.push_str("\\t"),
            _ => result.push(ch),
        }
    }
    result
}

/// Format a float the way KiCad writes coordinates: at most four decimals,
/// no trailing zeros, never `-0`.
pub fn format_float(value: f64) -> String {
    let text = format!("{value:.4}");
    let text = if text.contains('.') {
        text.trim_end_matches('0').trim_end_matches('.')
    } else {
        text.as_str()
    };
    match text {
        "-0" | "" => "0".to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ListBuilder;

    #[test]
    fn floats() {
        assert_eq!(format_float(1.27), "1.27");
        assert_eq!(format_float(100.0), "100");
        assert_eq!(format_float(-0.00001), "0");
        assert_eq!(format_float(96.19000000001), "96.19");
        assert_eq!(format_float(-3.81), "-3.81");
        assert_eq!(format_float(0.123456), "0.1235");
    }

    #[test]
    fn escapes() {
        assert_eq!(quote_string("a\"b\\c\nd"), "\"a\\\"b\\\\c\\nd\"");
    }

    #[test]
    fn canonical_property_layout() {
        let mut effects = ListBuilder::node("effects");
        effects.push(Sexpr::list(vec![
            Sexpr::symbol("font"),
            Sexpr::list(vec![
                Sexpr::symbol("size"),
                Sexpr::float(1.27),
                Sexpr::float(1.27),
            ]),
        ]));
        let mut prop = ListBuilder::node("property");
        prop.push(Sexpr::string("Reference"))
            .push(Sexpr::string("R1"))
            .push(Sexpr::list(vec![
                Sexpr::symbol("at"),
                Sexpr::float(100.0),
                Sexpr::float(96.19),
                Sexpr::int(0),
            ]))
            .push(effects.build());

        insta::assert_snapshot!(format_sexpr(&prop.build(), "\t"), @r#"
        (property "Reference" "R1"
        	(at 100 96.19 0)
        	(effects
        		(font
        			(size 1.27 1.27)
        		)
        	)
        )
        "#);
    }

    #[test]
    fn pts_layout() {
        let pts = Sexpr::list(vec![
            Sexpr::symbol("pts"),
            Sexpr::list(vec![Sexpr::symbol("xy"), Sexpr::int(0), Sexpr::int(0)]),
            Sexpr::list(vec![Sexpr::symbol("xy"), Sexpr::int(10), Sexpr::int(0)]),
        ]);
        assert_eq!(format_sexpr(&pts, "\t"), "(pts\n\t(xy 0 0) (xy 10 0)\n)");
    }
}
