//! Small read/write helpers over the parse tree shared by the typed views.

use crate::units::{Mm, Point, Rotation};
use kisch_sexpr::{kv, NodeId, NodeKind, Sexpr, Tree};
use uuid::Uuid;

/// Interpret uuid text. Legacy or hand-written identifiers that are not
/// RFC 4122 strings map to a stable name-based UUID of their text.
pub fn parse_uuid(text: &str) -> Uuid {
    Uuid::parse_str(text).unwrap_or_else(|_| Uuid::new_v5(&Uuid::NAMESPACE_OID, text.as_bytes()))
}

pub(crate) fn atom_kind(value: &Sexpr) -> Option<NodeKind> {
    match value {
        Sexpr::Symbol(s) => Some(NodeKind::Symbol(s.clone())),
        Sexpr::String(s) => Some(NodeKind::String(s.clone())),
        Sexpr::Number(s) => Some(NodeKind::Number(s.clone())),
        Sexpr::List(_) => None,
    }
}

/// `value` of the first `(name value ...)` child.
pub(crate) fn field<'t>(tree: &'t Tree, node: NodeId, name: &str) -> Option<&'t str> {
    tree.child_list(node, name).and_then(|f| tree.atom_at(f, 1))
}

pub(crate) fn yes_no_field(tree: &Tree, node: NodeId, name: &str, default: bool) -> bool {
    match field(tree, node, name) {
        Some("yes") => true,
        Some("no") => false,
        _ => default,
    }
}

pub(crate) fn entity_uuid(tree: &Tree, node: NodeId) -> Option<Uuid> {
    field(tree, node, "uuid").map(parse_uuid)
}

/// The `(at x y)` point of a node.
pub(crate) fn at_point(tree: &Tree, node: NodeId) -> Option<Point> {
    let at = tree.child_list(node, "at")?;
    Some(Point::new(
        Mm::parse(tree.atom_at(at, 1)?)?,
        Mm::parse(tree.atom_at(at, 2)?)?,
    ))
}

/// The angle of `(at x y angle)`, in degrees.
pub(crate) fn at_angle(tree: &Tree, node: NodeId) -> f64 {
    tree.child_list(node, "at")
        .and_then(|at| tree.atom_at(at, 3))
        .and_then(|a| a.parse().ok())
        .unwrap_or(0.0)
}

pub(crate) fn at_rotation(tree: &Tree, node: NodeId) -> Rotation {
    Rotation::from_degrees(at_angle(tree, node).round() as i64).unwrap_or_default()
}

/// `(property "<name>" ...)` child of a symbol, sheet or label.
pub(crate) fn find_property(tree: &Tree, node: NodeId, name: &str) -> Option<NodeId> {
    tree.child_lists(node, "property")
        .into_iter()
        .find(|&p| tree.atom_at(p, 1) == Some(name))
}

pub(crate) fn property<'t>(tree: &'t Tree, node: NodeId, name: &str) -> Option<&'t str> {
    find_property(tree, node, name).and_then(|p| tree.atom_at(p, 2))
}

/// Points of a `(pts (xy x y) ...)` child.
pub(crate) fn pts(tree: &Tree, node: NodeId) -> Vec<Point> {
    let Some(pts) = tree.child_list(node, "pts") else {
        return Vec::new();
    };
    tree.child_lists(pts, "xy")
        .into_iter()
        .filter_map(|xy| {
            Some(Point::new(
                Mm::parse(tree.atom_at(xy, 1)?)?,
                Mm::parse(tree.atom_at(xy, 2)?)?,
            ))
        })
        .collect()
}

/// Set the atom at `index` of `list`, appending it when the list is shorter.
pub(crate) fn set_atom_at(tree: &mut Tree, list: NodeId, index: usize, value: &Sexpr) {
    match tree.children(list).get(index).copied() {
        Some(child) if !tree.is_list(child) => {
            if let Some(kind) = atom_kind(value) {
                tree.set_atom(child, kind);
            }
        }
        Some(child) => {
            tree.replace_with_sexpr(child, value);
        }
        None => {
            tree.append_sexpr(list, value);
        }
    }
}

/// Index just past the last child whose head is listed in `after`, or past
/// the leading atoms when none is present.
pub(crate) fn position_after(tree: &Tree, parent: NodeId, after: &[&str]) -> usize {
    let children = tree.children(parent);
    children
        .iter()
        .rposition(|&c| tree.head(c).is_some_and(|h| after.contains(&h)))
        .map(|i| i + 1)
        .unwrap_or_else(|| {
            children
                .iter()
                .position(|&c| tree.is_list(c))
                .unwrap_or(children.len())
        })
}

/// Index of the first child whose head is listed in `before`, or the end.
pub(crate) fn position_before(tree: &Tree, parent: NodeId, before: &[&str]) -> usize {
    let children = tree.children(parent);
    children
        .iter()
        .position(|&c| tree.head(c).is_some_and(|h| before.contains(&h)))
        .unwrap_or(children.len())
}

/// Set the atoms of `(name ...)` under `parent`, creating the list after the
/// siblings named in `after` if it is missing.
pub(crate) fn upsert_field(
    tree: &mut Tree,
    parent: NodeId,
    name: &str,
    values: &[Sexpr],
    after: &[&str],
) -> NodeId {
    if let Some(existing) = tree.child_list(parent, name) {
        for (i, value) in values.iter().enumerate() {
            set_atom_at(tree, existing, i + 1, value);
        }
        return existing;
    }
    let index = position_after(tree, parent, after);
    let mut items = vec![Sexpr::symbol(name)];
    items.extend(values.iter().cloned());
    tree.insert_sexpr(parent, index, &Sexpr::list(items))
}

pub(crate) fn number(value: Mm) -> Sexpr {
    Sexpr::number(value)
}

pub(crate) fn at(point: Point, angle: Option<i64>) -> Sexpr {
    let mut items = vec![Sexpr::symbol("at"), number(point.x), number(point.y)];
    items.extend(angle.map(Sexpr::int));
    Sexpr::list(items)
}

pub(crate) fn xy(point: Point) -> Sexpr {
    Sexpr::list(vec![Sexpr::symbol("xy"), number(point.x), number(point.y)])
}

pub(crate) fn uuid_field(uuid: Uuid) -> Sexpr {
    kv("uuid", Sexpr::string(uuid.to_string()))
}

/// `(effects (font (size 1.27 1.27)) [(justify ...)] [(hide yes)])`
pub(crate) fn effects(justify: &[&str], hide: bool) -> Sexpr {
    let size = Sexpr::list(vec![
        Sexpr::symbol("size"),
        Sexpr::number("1.27"),
        Sexpr::number("1.27"),
    ]);
    let mut items = vec![
        Sexpr::symbol("effects"),
        Sexpr::list(vec![Sexpr::symbol("font"), size]),
    ];
    if !justify.is_empty() {
        let mut j = vec![Sexpr::symbol("justify")];
        j.extend(justify.iter().map(|&s| Sexpr::symbol(s)));
        items.push(Sexpr::list(j));
    }
    if hide {
        items.push(kv("hide", Sexpr::yes_no(true)));
    }
    Sexpr::list(items)
}

pub(crate) fn property_sexpr(
    name: &str,
    value: &str,
    position: Point,
    justify: &[&str],
    hide: bool,
) -> Sexpr {
    Sexpr::list(vec![
        Sexpr::symbol("property"),
        Sexpr::string(name),
        Sexpr::string(value),
        at(position, Some(0)),
        effects(justify, hide),
    ])
}
