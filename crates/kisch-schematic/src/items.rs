//! Wires, junctions, labels and hierarchical sheets.

use crate::edit::{self, at_angle, at_point, entity_uuid, field, property};
use crate::error::{SchematicError, ValidationError};
use crate::index::KeyKind;
use crate::schematic::Schematic;
use crate::units::{Mm, Point};
use kisch_sexpr::{kv, ListBuilder, NodeId, Sexpr, Tree};
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum WireKind {
    Wire,
    Bus,
}

impl WireKind {
    fn head(self) -> &'static str {
        match self {
            WireKind::Wire => "wire",
            WireKind::Bus => "bus",
        }
    }
}

/// A wire or bus segment chain.
#[derive(Debug, Clone, Copy)]
pub struct Wire<'a> {
    tree: &'a Tree,
    node: NodeId,
}

impl<'a> Wire<'a> {
    pub(crate) fn new(tree: &'a Tree, node: NodeId) -> Option<Self> {
        match tree.head(node)? {
            "wire" | "bus" => Some(Self { tree, node }),
            _ => None,
        }
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn kind(&self) -> WireKind {
        match self.tree.head(self.node) {
            Some("bus") => WireKind::Bus,
            _ => WireKind::Wire,
        }
    }

    pub fn uuid(&self) -> Option<Uuid> {
        entity_uuid(self.tree, self.node)
    }

    pub fn points(&self) -> Vec<Point> {
        edit::pts(self.tree, self.node)
    }

    /// First and last point.
    pub fn endpoints(&self) -> Option<(Point, Point)> {
        let points = self.points();
        Some((*points.first()?, *points.last()?))
    }

    /// Whether `point` lies on any segment of this wire.
    pub fn touches(&self, point: Point) -> bool {
        let points = self.points();
        match points.as_slice() {
            [single] => *single == point,
            _ => points.windows(2).any(|s| point.on_segment(s[0], s[1])),
        }
    }
}

/// Label flavours, named after their tree heads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum LabelKind {
    Local,
    Global,
    Hierarchical,
}

impl LabelKind {
    pub(crate) fn from_head(head: &str) -> Option<Self> {
        match head {
            "label" => Some(LabelKind::Local),
            "global_label" => Some(LabelKind::Global),
            "hierarchical_label" => Some(LabelKind::Hierarchical),
            _ => None,
        }
    }

    fn head(self) -> &'static str {
        match self {
            LabelKind::Local => "label",
            LabelKind::Global => "global_label",
            LabelKind::Hierarchical => "hierarchical_label",
        }
    }
}

/// Signal direction drawn on global and hierarchical labels and sheet pins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum LabelShape {
    #[default]
    Input,
    Output,
    Bidirectional,
    TriState,
    Passive,
}

impl LabelShape {
    pub fn as_str(self) -> &'static str {
        match self {
            LabelShape::Input => "input",
            LabelShape::Output => "output",
            LabelShape::Bidirectional => "bidirectional",
            LabelShape::TriState => "tri_state",
            LabelShape::Passive => "passive",
        }
    }

    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "input" => Some(LabelShape::Input),
            "output" => Some(LabelShape::Output),
            "bidirectional" => Some(LabelShape::Bidirectional),
            "tri_state" => Some(LabelShape::TriState),
            "passive" => Some(LabelShape::Passive),
            _ => None,
        }
    }
}

impl fmt::Display for LabelShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Electrical type of a sheet pin; the same set as label shapes.
pub type SheetPinType = LabelShape;

#[derive(Debug, Clone, Copy)]
pub struct Label<'a> {
    tree: &'a Tree,
    node: NodeId,
    kind: LabelKind,
}

impl<'a> Label<'a> {
    pub(crate) fn new(tree: &'a Tree, node: NodeId) -> Option<Self> {
        let kind = LabelKind::from_head(tree.head(node)?)?;
        Some(Self { tree, node, kind })
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn kind(&self) -> LabelKind {
        self.kind
    }

    pub fn text(&self) -> &'a str {
        self.tree.atom_at(self.node, 1).unwrap_or_default()
    }

    pub fn uuid(&self) -> Option<Uuid> {
        entity_uuid(self.tree, self.node)
    }

    pub fn position(&self) -> Point {
        at_point(self.tree, self.node).unwrap_or_default()
    }

    pub fn angle(&self) -> f64 {
        at_angle(self.tree, self.node)
    }

    /// `None` for local labels.
    pub fn shape(&self) -> Option<LabelShape> {
        field(self.tree, self.node, "shape").and_then(LabelShape::from_token)
    }
}

/// Side of a sheet a pin sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SheetEdge {
    Left,
    Right,
    Top,
    Bottom,
}

impl SheetEdge {
    /// Pin orientation KiCad uses on this edge.
    fn angle(self) -> i64 {
        match self {
            SheetEdge::Left => 180,
            SheetEdge::Right => 0,
            SheetEdge::Top => 90,
            SheetEdge::Bottom => 270,
        }
    }

    fn justify(self) -> &'static str {
        match self {
            SheetEdge::Left | SheetEdge::Top => "left",
            SheetEdge::Right | SheetEdge::Bottom => "right",
        }
    }
}

/// Parameters for [`Schematic::add_sheet`].
#[derive(Debug, Clone, PartialEq)]
pub struct SheetSpec {
    pub name: String,
    /// Child schematic, relative to this schematic's directory
    pub file: PathBuf,
    pub position: Point,
    /// Width and height
    pub size: (Mm, Mm),
}

impl SheetSpec {
    pub fn new(
        name: impl Into<String>,
        file: impl Into<PathBuf>,
        position: impl Into<Point>,
        size: (f64, f64),
    ) -> Self {
        Self {
            name: name.into(),
            file: file.into(),
            position: position.into(),
            size: (Mm::from_mm(size.0), Mm::from_mm(size.1)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SheetPin {
    pub name: String,
    pub pin_type: Option<SheetPinType>,
    pub position: Point,
    pub uuid: Option<String>,
}

/// A hierarchical sheet symbol.
#[derive(Debug, Clone, Copy)]
pub struct Sheet<'a> {
    tree: &'a Tree,
    node: NodeId,
}

impl<'a> Sheet<'a> {
    pub(crate) fn new(tree: &'a Tree, node: NodeId) -> Option<Self> {
        (tree.head(node)? == "sheet").then_some(Self { tree, node })
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn uuid(&self) -> Option<Uuid> {
        entity_uuid(self.tree, self.node)
    }

    pub fn name(&self) -> &'a str {
        property(self.tree, self.node, "Sheetname")
            .or_else(|| property(self.tree, self.node, "Sheet name"))
            .unwrap_or_default()
    }

    pub fn file(&self) -> &'a str {
        property(self.tree, self.node, "Sheetfile")
            .or_else(|| property(self.tree, self.node, "Sheet file"))
            .unwrap_or_default()
    }

    pub fn position(&self) -> Point {
        at_point(self.tree, self.node).unwrap_or_default()
    }

    pub fn size(&self) -> (Mm, Mm) {
        let size = self.tree.child_list(self.node, "size");
        let dim = |i| {
            size.and_then(|s| self.tree.atom_at(s, i))
                .and_then(Mm::parse)
                .unwrap_or_default()
        };
        (dim(1), dim(2))
    }

    pub fn pins(&self) -> Vec<SheetPin> {
        self.tree
            .child_lists(self.node, "pin")
            .into_iter()
            .filter_map(|pin| {
                Some(SheetPin {
                    name: self.tree.atom_at(pin, 1)?.to_string(),
                    pin_type: self.tree.atom_at(pin, 2).and_then(LabelShape::from_token),
                    position: at_point(self.tree, pin).unwrap_or_default(),
                    uuid: field(self.tree, pin, "uuid").map(str::to_string),
                })
            })
            .collect()
    }
}

/// Mutable view of a sheet, for adding pins.
#[derive(Debug)]
pub struct SheetMut<'a> {
    schematic: &'a mut Schematic,
    node: NodeId,
}

impl SheetMut<'_> {
    /// Add a pin on `edge`, `offset` from the sheet's top or left corner.
    pub fn add_pin(
        &mut self,
        name: &str,
        pin_type: SheetPinType,
        edge: SheetEdge,
        offset: Mm,
    ) -> Uuid {
        let tree = &mut self.schematic.tree;
        let sheet = Sheet {
            tree: &*tree,
            node: self.node,
        };
        let origin = sheet.position();
        let (width, height) = sheet.size();
        let position = match edge {
            SheetEdge::Left => origin.offset(Mm::ZERO, offset),
            SheetEdge::Right => origin.offset(width, offset),
            SheetEdge::Top => origin.offset(offset, Mm::ZERO),
            SheetEdge::Bottom => origin.offset(offset, height),
        };

        let uuid = Uuid::new_v4();
        let pin = Sexpr::list(vec![
            Sexpr::symbol("pin"),
            Sexpr::string(name),
            Sexpr::symbol(pin_type.as_str()),
            edit::at(position, Some(edge.angle())),
            edit::effects(&[edge.justify()], false),
            edit::uuid_field(uuid),
        ]);
        let index = edit::position_before(tree, self.node, &["instances"]);
        tree.insert_sexpr(self.node, index, &pin);
        log::debug!("Added sheet pin '{name}' at {position}");
        uuid
    }
}

fn label_sexpr(
    kind: LabelKind,
    text: &str,
    shape: LabelShape,
    at: Point,
    angle: i64,
    uuid: Uuid,
) -> Sexpr {
    let justify: &[&str] = match (kind, angle.rem_euclid(360)) {
        (LabelKind::Local, 180 | 270) => &["right", "bottom"],
        (LabelKind::Local, _) => &["left", "bottom"],
        (_, 180 | 270) => &["right"],
        _ => &["left"],
    };

    let mut b = ListBuilder::node(kind.head());
    b.push(Sexpr::string(text));
    if kind != LabelKind::Local {
        b.push(kv("shape", Sexpr::symbol(shape.as_str())));
    }
    b.push(edit::at(at, Some(angle)));
    b.push(kv("fields_autoplaced", Sexpr::yes_no(true)));
    b.push(edit::effects(justify, false));
    b.push(edit::uuid_field(uuid));
    if kind == LabelKind::Global {
        b.push(edit::property_sexpr(
            "Intersheetrefs",
            "${INTERSHEET_REFS}",
            at,
            &["left"],
            true,
        ));
    }
    b.build()
}

impl Schematic {
    pub fn add_wire(&mut self, points: &[Point]) -> Result<Uuid, SchematicError> {
        self.add_segments(WireKind::Wire, points)
    }

    pub fn add_bus(&mut self, points: &[Point]) -> Result<Uuid, SchematicError> {
        self.add_segments(WireKind::Bus, points)
    }

    fn add_segments(&mut self, kind: WireKind, points: &[Point]) -> Result<Uuid, SchematicError> {
        if points.len() < 2 {
            return Err(SchematicError::InvalidGeometry(format!(
                "a {} needs at least 2 points, got {}",
                kind.head(),
                points.len()
            )));
        }
        let uuid = Uuid::new_v4();
        let mut pts = ListBuilder::node("pts");
        pts.extend(points.iter().copied().map(edit::xy));

        let mut stroke = ListBuilder::node("stroke");
        stroke.push(kv("width", Sexpr::int(0)));
        stroke.push(kv("type", Sexpr::symbol("default")));

        let mut b = ListBuilder::node(kind.head());
        b.push(pts.build());
        b.push(stroke.build());
        b.push(edit::uuid_field(uuid));
        self.insert_entity(&b.build(), uuid)?;
        log::debug!("Added {} with {} points", kind.head(), points.len());
        Ok(uuid)
    }

    /// Wires and buses in document order.
    pub fn wires(&self) -> impl Iterator<Item = Wire<'_>> + '_ {
        self.entity_nodes()
            .into_iter()
            .filter_map(|node| Wire::new(&self.tree, node))
    }

    pub fn remove_wire(&mut self, uuid: &Uuid) -> bool {
        match self.index.node(uuid) {
            Some(node) if Wire::new(&self.tree, node).is_some() => self.remove_entity(uuid),
            _ => false,
        }
    }

    pub fn add_junction(&mut self, at: impl Into<Point>) -> Result<Uuid, SchematicError> {
        let uuid = Uuid::new_v4();
        let mut b = ListBuilder::node("junction");
        b.push(edit::at(at.into(), None));
        b.push(kv("diameter", Sexpr::int(0)));
        b.push(Sexpr::list(vec![
            Sexpr::symbol("color"),
            Sexpr::int(0),
            Sexpr::int(0),
            Sexpr::int(0),
            Sexpr::int(0),
        ]));
        b.push(edit::uuid_field(uuid));
        self.insert_entity(&b.build(), uuid)?;
        Ok(uuid)
    }

    pub fn add_no_connect(&mut self, at: impl Into<Point>) -> Result<Uuid, SchematicError> {
        let uuid = Uuid::new_v4();
        let mut b = ListBuilder::node("no_connect");
        b.push(edit::at(at.into(), None));
        b.push(edit::uuid_field(uuid));
        self.insert_entity(&b.build(), uuid)?;
        Ok(uuid)
    }

    pub fn junctions(&self) -> Vec<Point> {
        self.points_of("junction")
    }

    pub fn no_connects(&self) -> Vec<Point> {
        self.points_of("no_connect")
    }

    fn points_of(&self, head: &str) -> Vec<Point> {
        self.entity_nodes()
            .into_iter()
            .filter(|&node| self.tree.head(node) == Some(head))
            .filter_map(|node| at_point(&self.tree, node))
            .collect()
    }

    pub fn add_label(
        &mut self,
        text: &str,
        at: impl Into<Point>,
        angle: i64,
    ) -> Result<Uuid, SchematicError> {
        self.add_label_of(LabelKind::Local, text, LabelShape::default(), at.into(), angle)
    }

    pub fn add_global_label(
        &mut self,
        text: &str,
        shape: LabelShape,
        at: impl Into<Point>,
        angle: i64,
    ) -> Result<Uuid, SchematicError> {
        self.add_label_of(LabelKind::Global, text, shape, at.into(), angle)
    }

    pub fn add_hierarchical_label(
        &mut self,
        text: &str,
        shape: LabelShape,
        at: impl Into<Point>,
        angle: i64,
    ) -> Result<Uuid, SchematicError> {
        self.add_label_of(LabelKind::Hierarchical, text, shape, at.into(), angle)
    }

    fn add_label_of(
        &mut self,
        kind: LabelKind,
        text: &str,
        shape: LabelShape,
        at: Point,
        angle: i64,
    ) -> Result<Uuid, SchematicError> {
        let uuid = Uuid::new_v4();
        let sexpr = label_sexpr(kind, text, shape, at, angle, uuid);
        self.insert_entity(&sexpr, uuid)?;
        self.index.insert_label(uuid, text);
        log::debug!("Added {} '{text}' at {at}", kind.head());
        Ok(uuid)
    }

    /// Labels of every kind, in document order.
    pub fn labels(&self) -> impl Iterator<Item = Label<'_>> + '_ {
        self.entity_nodes()
            .into_iter()
            .filter_map(|node| Label::new(&self.tree, node))
    }

    /// Rename a label, moving it to the new net in the index.
    pub fn set_label_text(&mut self, uuid: &Uuid, text: &str) -> bool {
        let Some(node) = self.index.node(uuid) else {
            return false;
        };
        let Some(old) = Label::new(&self.tree, node).map(|l| l.text().to_string()) else {
            return false;
        };
        edit::set_atom_at(&mut self.tree, node, 1, &Sexpr::string(text));
        self.index.set_label_text(*uuid, &old, text);
        true
    }

    pub fn remove_label(&mut self, uuid: &Uuid) -> bool {
        match self.index.node(uuid) {
            Some(node) if Label::new(&self.tree, node).is_some() => self.remove_entity(uuid),
            _ => false,
        }
    }

    /// Place a hierarchical sheet. An absolute `file` is stored relative to
    /// this schematic's directory when that is known.
    pub fn add_sheet(&mut self, spec: SheetSpec) -> Result<Uuid, SchematicError> {
        let (width, height) = spec.size;
        if width <= Mm::ZERO || height <= Mm::ZERO {
            return Err(SchematicError::InvalidGeometry(format!(
                "sheet '{}' has size {width} x {height}",
                spec.name
            )));
        }

        let file = self.relative_sheet_path(&spec.file);
        let uuid = Uuid::new_v4();
        let page = self.sheets().count() + 2;
        let pos = spec.position;
        let name_at = pos.offset(Mm::ZERO, Mm::from_units(-7_116));
        let file_at = pos.offset(Mm::ZERO, height + Mm::from_units(5_846));

        let mut stroke = ListBuilder::node("stroke");
        stroke.push(kv("width", Sexpr::number("0.1524")));
        stroke.push(kv("type", Sexpr::symbol("solid")));

        let mut fill = ListBuilder::node("fill");
        fill.push(Sexpr::list(vec![
            Sexpr::symbol("color"),
            Sexpr::int(0),
            Sexpr::int(0),
            Sexpr::int(0),
            Sexpr::number("0.0000"),
        ]));

        let mut path = ListBuilder::node("path");
        path.push(Sexpr::string(self.root_path()));
        path.push(kv("page", Sexpr::string(page.to_string())));
        let mut project = ListBuilder::node("project");
        project.push(Sexpr::string(self.project()));
        project.push(path.build());

        let mut b = ListBuilder::node("sheet");
        b.push(edit::at(pos, None));
        b.push(Sexpr::list(vec![
            Sexpr::symbol("size"),
            edit::number(width),
            edit::number(height),
        ]));
        b.push(kv("fields_autoplaced", Sexpr::yes_no(true)));
        b.push(stroke.build());
        b.push(fill.build());
        b.push(edit::uuid_field(uuid));
        b.push(edit::property_sexpr(
            "Sheetname",
            &spec.name,
            name_at,
            &["left", "bottom"],
            false,
        ));
        b.push(edit::property_sexpr(
            "Sheetfile",
            &file,
            file_at,
            &["left", "top"],
            false,
        ));
        b.push(Sexpr::list(vec![Sexpr::symbol("instances"), project.build()]));

        self.insert_entity(&b.build(), uuid)?;
        log::debug!("Added sheet '{}' -> {file}", spec.name);
        Ok(uuid)
    }

    fn relative_sheet_path(&self, file: &Path) -> String {
        let base = self.path().and_then(Path::parent);
        let relative = match base {
            Some(base) if file.is_absolute() => {
                pathdiff::diff_paths(file, base).unwrap_or_else(|| file.to_path_buf())
            }
            _ => file.to_path_buf(),
        };
        relative.to_string_lossy().replace('\\', "/")
    }

    pub fn sheets(&self) -> impl Iterator<Item = Sheet<'_>> + '_ {
        self.entity_nodes()
            .into_iter()
            .filter_map(|node| Sheet::new(&self.tree, node))
    }

    pub fn sheet(&self, uuid: &Uuid) -> Option<Sheet<'_>> {
        Sheet::new(&self.tree, self.index.node(uuid)?)
    }

    pub fn sheet_mut(&mut self, uuid: &Uuid) -> Option<SheetMut<'_>> {
        let node = self.index.node(uuid)?;
        Sheet::new(&self.tree, node)?;
        Some(SheetMut {
            schematic: self,
            node,
        })
    }

    /// Load the child schematic of `sheet`. Its file name is resolved
    /// against `base_dir`, which defaults to this schematic's directory.
    pub fn load_sheet_child(
        &self,
        sheet: &Sheet<'_>,
        base_dir: Option<&Path>,
    ) -> Result<Schematic, SchematicError> {
        let base = base_dir
            .map(Path::to_path_buf)
            .or_else(|| self.path().and_then(Path::parent).map(Path::to_path_buf))
            .unwrap_or_default();
        let path = base.join(sheet.file());
        let mut child = Schematic::load(&path)?;
        if let Some(library) = &self.library {
            child.set_library(library.clone());
        }
        child.set_project(self.project());
        Ok(child)
    }

    /// Sheet pins with no hierarchical label of the same name in `child`.
    pub fn check_sheet_pins(&self, sheet: &Sheet<'_>, child: &Schematic) -> Vec<ValidationError> {
        let labels: Vec<&str> = child
            .labels()
            .filter(|l| l.kind() == LabelKind::Hierarchical)
            .map(|l| l.text())
            .collect();
        sheet
            .pins()
            .into_iter()
            .filter(|pin| !labels.contains(&pin.name.as_str()))
            .map(|pin| ValidationError::SheetPinWithoutLabel {
                sheet: sheet.name().to_string(),
                pin: pin.name,
            })
            .collect()
    }

    /// Labels on `net` as UUIDs.
    pub fn net_members(&self, net: &str) -> Vec<Uuid> {
        self.index.get(KeyKind::Net, net).into_vec()
    }
}
