//! Placed symbols.

use crate::edit::{self, at_point, at_rotation, field, find_property, parse_uuid, property};
use crate::error::SchematicError;
use crate::geometry;
use crate::index::KeyKind;
use crate::schematic::Schematic;
use crate::units::{Mirror, Mm, Point, Rotation};
use kisch_eda::{Pin, SymbolDefinition};
use kisch_sexpr::{kv, ListBuilder, NodeId, Sexpr, Tree};
use std::sync::Arc;
use uuid::Uuid;

/// Children of a placed symbol that precede its properties, in KiCad's order.
const HEADER_FIELDS: &[&str] = &[
    "lib_name",
    "lib_id",
    "at",
    "mirror",
    "unit",
    "convert",
    "body_style",
    "exclude_from_sim",
    "in_bom",
    "on_board",
    "dnp",
    "fields_autoplaced",
    "uuid",
];

/// Parameters for [`Schematic::add_component`].
#[derive(Debug, Clone, PartialEq)]
pub struct ComponentSpec {
    pub lib_id: String,
    pub reference: String,
    pub value: String,
    pub position: Point,
    pub rotation: Rotation,
    pub mirror: Mirror,
    pub unit: u32,
    pub footprint: Option<String>,
    /// Extra properties, added hidden after the standard ones
    pub properties: Vec<(String, String)>,
    deferred: bool,
}

impl ComponentSpec {
    pub fn new(
        lib_id: impl Into<String>,
        reference: impl Into<String>,
        value: impl Into<String>,
        position: impl Into<Point>,
    ) -> Self {
        Self {
            lib_id: lib_id.into(),
            reference: reference.into(),
            value: value.into(),
            position: position.into(),
            rotation: Rotation::R0,
            mirror: Mirror::None,
            unit: 1,
            footprint: None,
            properties: Vec::new(),
            deferred: false,
        }
    }

    pub fn rotation(mut self, rotation: Rotation) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn mirror(mut self, mirror: Mirror) -> Self {
        self.mirror = mirror;
        self
    }

    pub fn unit(mut self, unit: u32) -> Self {
        self.unit = unit;
        self
    }

    pub fn footprint(mut self, footprint: impl Into<String>) -> Self {
        self.footprint = Some(footprint.into());
        self
    }

    pub fn property(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.push((name.into(), value.into()));
        self
    }

    /// Allow adding a symbol the library cannot resolve yet. It must resolve
    /// by the time the schematic is saved.
    pub fn deferred(mut self) -> Self {
        self.deferred = true;
        self
    }

    pub fn is_deferred(&self) -> bool {
        self.deferred
    }
}

/// Fields the index registry keys a symbol on.
pub(crate) struct ComponentFields {
    pub(crate) reference: String,
    pub(crate) lib_id: String,
    pub(crate) unit: u32,
}

pub(crate) fn component_fields(tree: &Tree, node: NodeId) -> ComponentFields {
    ComponentFields {
        reference: property(tree, node, "Reference")
            .unwrap_or_default()
            .to_string(),
        lib_id: field(tree, node, "lib_id").unwrap_or_default().to_string(),
        unit: unit_of(tree, node),
    }
}

fn unit_of(tree: &Tree, node: NodeId) -> u32 {
    field(tree, node, "unit")
        .and_then(|u| u.parse().ok())
        .unwrap_or(1)
}

fn body_style_of(tree: &Tree, node: NodeId) -> u32 {
    field(tree, node, "body_style")
        .or_else(|| field(tree, node, "convert"))
        .and_then(|b| b.parse().ok())
        .unwrap_or(1)
}

/// `(pin "N" (uuid ...))` entries for the pins of one unit.
fn pin_entries(definition: &SymbolDefinition, unit: u32, body_style: u32) -> Vec<Sexpr> {
    let mut numbers: Vec<&str> = Vec::new();
    for pin in definition.pins_for(unit, body_style) {
        if !numbers.contains(&pin.number.as_str()) {
            numbers.push(&pin.number);
        }
    }
    numbers
        .into_iter()
        .map(|number| {
            Sexpr::list(vec![
                Sexpr::symbol("pin"),
                Sexpr::string(number),
                edit::uuid_field(Uuid::new_v4()),
            ])
        })
        .collect()
}

fn instances(project: &str, path: &str, reference: &str, unit: u32) -> Sexpr {
    let mut entry = ListBuilder::node("path");
    entry.push(Sexpr::string(path));
    entry.push(kv("reference", Sexpr::string(reference)));
    entry.push(kv("unit", Sexpr::int(i64::from(unit))));

    let mut project_list = ListBuilder::node("project");
    project_list.push(Sexpr::string(project));
    project_list.push(entry.build());

    Sexpr::list(vec![Sexpr::symbol("instances"), project_list.build()])
}

fn component_sexpr(
    spec: &ComponentSpec,
    uuid: Uuid,
    definition: Option<&SymbolDefinition>,
    project: &str,
    root_path: &str,
) -> Sexpr {
    let (x, y) = (spec.position.x, spec.position.y);
    let lib_property = |name: &str| definition.and_then(|d| d.property(name));
    let text_offset = Mm::from_units(25_400);
    let line = Mm::from_units(12_700);

    let mut b = ListBuilder::node("symbol");
    b.push(kv("lib_id", Sexpr::string(spec.lib_id.as_str())));
    b.push(edit::at(spec.position, Some(spec.rotation.degrees())));
    if let Some(token) = spec.mirror.as_token() {
        b.push(kv("mirror", Sexpr::symbol(token)));
    }
    b.push(kv("unit", Sexpr::int(i64::from(spec.unit))));
    b.push(kv("exclude_from_sim", Sexpr::yes_no(false)));
    b.push(kv("in_bom", Sexpr::yes_no(definition.map_or(true, |d| d.in_bom))));
    b.push(kv("on_board", Sexpr::yes_no(definition.map_or(true, |d| d.on_board))));
    b.push(kv("dnp", Sexpr::yes_no(false)));
    b.push(kv("fields_autoplaced", Sexpr::yes_no(true)));
    b.push(edit::uuid_field(uuid));

    b.push(edit::property_sexpr(
        "Reference",
        &spec.reference,
        Point::new(x + text_offset, y - line),
        &["left"],
        false,
    ));
    b.push(edit::property_sexpr(
        "Value",
        &spec.value,
        Point::new(x + text_offset, y + line),
        &["left"],
        false,
    ));
    let footprint = spec
        .footprint
        .as_deref()
        .or_else(|| lib_property("Footprint"))
        .unwrap_or_default();
    b.push(edit::property_sexpr("Footprint", footprint, spec.position, &[], true));
    b.push(edit::property_sexpr(
        "Datasheet",
        lib_property("Datasheet").unwrap_or("~"),
        spec.position,
        &[],
        true,
    ));
    b.push(edit::property_sexpr(
        "Description",
        lib_property("Description").unwrap_or_default(),
        spec.position,
        &[],
        true,
    ));
    for (name, value) in &spec.properties {
        b.push(edit::property_sexpr(name, value, spec.position, &[], true));
    }

    if let Some(definition) = definition {
        b.extend(pin_entries(definition, spec.unit, 1));
    }
    b.push(instances(project, root_path, &spec.reference, spec.unit));
    b.build()
}

impl Schematic {
    /// Place a symbol. Its library definition is embedded into `lib_symbols`
    /// and every pin of the placed unit gets a fresh UUID.
    pub fn add_component(&mut self, spec: ComponentSpec) -> Result<Uuid, SchematicError> {
        let definition = if spec.deferred {
            let definition = self.definition(&spec.lib_id);
            if definition.is_none() {
                log::debug!("Deferring resolution of {}", spec.lib_id);
            }
            definition
        } else {
            Some(self.require_definition(&spec.lib_id)?)
        };
        if let Some(definition) = &definition {
            self.embed(&spec.lib_id, definition);
        }

        let uuid = Uuid::new_v4();
        let root_path = self.root_path();
        let sexpr = component_sexpr(
            &spec,
            uuid,
            definition.as_deref(),
            self.project(),
            &root_path,
        );
        self.insert_entity(&sexpr, uuid)?;
        self.index
            .insert_component(uuid, &spec.reference, &spec.lib_id, spec.unit);
        log::debug!(
            "Added {} ({}) unit {} at {}",
            spec.reference,
            spec.lib_id,
            spec.unit,
            spec.position
        );
        Ok(uuid)
    }

    /// Remove a placed symbol by UUID, or by reference (the lowest unit).
    ///
    /// Wires and labels attached to its pins are left in place.
    pub fn remove_component(&mut self, reference_or_uuid: &str) -> bool {
        let by_uuid = Uuid::parse_str(reference_or_uuid)
            .ok()
            .filter(|uuid| self.get_by_uuid(uuid).is_some())
            .or_else(|| {
                let legacy = parse_uuid(reference_or_uuid);
                self.get_by_uuid(&legacy).map(|_| legacy)
            });
        let uuid = match by_uuid {
            Some(uuid) => uuid,
            None => match self.index.get(KeyKind::Reference, reference_or_uuid).first() {
                Some(uuid) => uuid,
                None => return false,
            },
        };
        self.remove_entity(&uuid)
    }
}

/// Read-only view of a placed symbol.
#[derive(Debug, Clone, Copy)]
pub struct Component<'a> {
    schematic: &'a Schematic,
    node: NodeId,
    uuid: Uuid,
}

impl<'a> Component<'a> {
    pub(crate) fn new(schematic: &'a Schematic, node: NodeId) -> Option<Self> {
        let uuid = edit::entity_uuid(&schematic.tree, node)?;
        Some(Self {
            schematic,
            node,
            uuid,
        })
    }

    fn tree(&self) -> &'a Tree {
        &self.schematic.tree
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn reference(&self) -> &'a str {
        self.property("Reference").unwrap_or_default()
    }

    pub fn lib_id(&self) -> &'a str {
        field(self.tree(), self.node, "lib_id").unwrap_or_default()
    }

    /// Name of the `lib_symbols` entry this symbol draws from.
    pub fn symbol_name(&self) -> &'a str {
        field(self.tree(), self.node, "lib_name").unwrap_or_else(|| self.lib_id())
    }

    pub fn value(&self) -> &'a str {
        self.property("Value").unwrap_or_default()
    }

    pub fn footprint(&self) -> Option<&'a str> {
        self.property("Footprint").filter(|f| !f.is_empty())
    }

    pub fn position(&self) -> Point {
        at_point(self.tree(), self.node).unwrap_or_default()
    }

    pub fn rotation(&self) -> Rotation {
        at_rotation(self.tree(), self.node)
    }

    pub fn mirror(&self) -> Mirror {
        field(self.tree(), self.node, "mirror")
            .map(Mirror::from_token)
            .unwrap_or_default()
    }

    pub fn unit(&self) -> u32 {
        unit_of(self.tree(), self.node)
    }

    pub fn body_style(&self) -> u32 {
        body_style_of(self.tree(), self.node)
    }

    pub fn in_bom(&self) -> bool {
        edit::yes_no_field(self.tree(), self.node, "in_bom", true)
    }

    pub fn on_board(&self) -> bool {
        edit::yes_no_field(self.tree(), self.node, "on_board", true)
    }

    pub fn dnp(&self) -> bool {
        edit::yes_no_field(self.tree(), self.node, "dnp", false)
    }

    pub fn exclude_from_sim(&self) -> bool {
        edit::yes_no_field(self.tree(), self.node, "exclude_from_sim", false)
    }

    pub fn property(&self, name: &str) -> Option<&'a str> {
        property(self.tree(), self.node, name)
    }

    /// Sheet path of the first `instances` entry, `/<root uuid>` for the root sheet.
    pub fn instance_path(&self) -> Option<&'a str> {
        let tree = self.tree();
        let path = tree.find_path(self.node, &["instances", "project", "path"])?;
        tree.atom_at(path, 1)
    }

    /// All properties in file order.
    pub fn properties(&self) -> Vec<(&'a str, &'a str)> {
        let tree = self.tree();
        tree.child_lists(self.node, "property")
            .into_iter()
            .filter_map(|p| Some((tree.atom_at(p, 1)?, tree.atom_at(p, 2)?)))
            .collect()
    }

    pub fn definition(&self) -> Option<Arc<SymbolDefinition>> {
        let schematic = self.schematic;
        schematic
            .embedded
            .get(self.symbol_name())
            .cloned()
            .or_else(|| schematic.definition(self.lib_id()))
    }

    /// Library pins of this symbol's unit and body style.
    pub fn pins(&self) -> Vec<Pin> {
        let Some(definition) = self.definition() else {
            return Vec::new();
        };
        definition
            .pins_for(self.unit(), self.body_style())
            .cloned()
            .collect()
    }

    /// `(pin "N" (uuid ...))` entries, in file order.
    pub fn pin_uuids(&self) -> Vec<(&'a str, Uuid)> {
        let tree = self.tree();
        tree.child_lists(self.node, "pin")
            .into_iter()
            .filter_map(|p| {
                let number = tree.atom_at(p, 1)?;
                let uuid = field(tree, p, "uuid").map(parse_uuid)?;
                Some((number, uuid))
            })
            .collect()
    }

    /// Absolute position of a pin of this unit.
    pub fn pin_position(&self, number: &str) -> Option<Point> {
        let definition = self.definition()?;
        let pin = definition.pin(self.unit(), self.body_style(), number)?;
        Some(geometry::place_pin(
            pin,
            self.position(),
            self.rotation(),
            self.mirror(),
        ))
    }

    /// Absolute positions of every pin of this unit.
    pub fn pin_positions(&self) -> Vec<(String, Point)> {
        let Some(definition) = self.definition() else {
            return Vec::new();
        };
        let (origin, rotation, mirror) = (self.position(), self.rotation(), self.mirror());
        definition
            .pins_for(self.unit(), self.body_style())
            .map(|pin| {
                (
                    pin.number.clone(),
                    geometry::place_pin(pin, origin, rotation, mirror),
                )
            })
            .collect()
    }
}

/// Mutable view of a placed symbol. Every setter edits the tree in place
/// and keeps the indices current.
#[derive(Debug)]
pub struct ComponentMut<'a> {
    schematic: &'a mut Schematic,
    node: NodeId,
    uuid: Uuid,
}

impl<'a> ComponentMut<'a> {
    pub(crate) fn new(schematic: &'a mut Schematic, node: NodeId, uuid: Uuid) -> Self {
        Self {
            schematic,
            node,
            uuid,
        }
    }

    /// Read-only view of the same symbol.
    pub fn view(&self) -> Component<'_> {
        Component {
            schematic: &*self.schematic,
            node: self.node,
            uuid: self.uuid,
        }
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    /// Insert or update a property. An existing property keeps its
    /// placement and effects; only the value changes.
    pub fn set_property(&mut self, name: &str, value: &str) -> &mut Self {
        let old = self.view().property(name).map(str::to_string);
        let tree = &mut self.schematic.tree;
        match find_property(tree, self.node, name) {
            Some(existing) => edit::set_atom_at(tree, existing, 2, &Sexpr::string(value)),
            None => {
                let position = at_point(tree, self.node).unwrap_or_default();
                let visible = matches!(name, "Reference" | "Value");
                let sexpr = edit::property_sexpr(name, value, position, &[], !visible);
                let mut after = HEADER_FIELDS.to_vec();
                after.push("property");
                let index = edit::position_after(tree, self.node, &after);
                tree.insert_sexpr(self.node, index, &sexpr);
            }
        }

        if name == "Reference" {
            let old = old.unwrap_or_default();
            self.schematic.index.set_reference(self.uuid, &old, value);
            self.set_instance_field("reference", Sexpr::string(value));
        }
        self
    }

    pub fn set_reference(&mut self, reference: &str) -> &mut Self {
        self.set_property("Reference", reference)
    }

    pub fn set_value(&mut self, value: &str) -> &mut Self {
        self.set_property("Value", value)
    }

    pub fn set_footprint(&mut self, footprint: &str) -> &mut Self {
        self.set_property("Footprint", footprint)
    }

    /// Move the symbol. Its property labels move with it.
    pub fn set_position(&mut self, position: impl Into<Point>) -> &mut Self {
        let position = position.into();
        let tree = &mut self.schematic.tree;
        let old = at_point(tree, self.node).unwrap_or_default();
        let (dx, dy) = (position.x - old.x, position.y - old.y);
        upsert_at(tree, self.node, position);

        for prop in tree.child_lists(self.node, "property") {
            if let Some(p) = at_point(tree, prop) {
                upsert_at(tree, prop, p.offset(dx, dy));
            }
        }
        self
    }

    pub fn set_rotation(&mut self, rotation: Rotation) -> &mut Self {
        let tree = &mut self.schematic.tree;
        let position = at_point(tree, self.node).unwrap_or_default();
        let at = edit::upsert_field(
            tree,
            self.node,
            "at",
            &[edit::number(position.x), edit::number(position.y)],
            &["lib_id", "lib_name"],
        );
        edit::set_atom_at(tree, at, 3, &Sexpr::int(rotation.degrees()));
        self
    }

    pub fn set_mirror(&mut self, mirror: Mirror) -> &mut Self {
        let tree = &mut self.schematic.tree;
        match mirror.as_token() {
            Some(token) => {
                edit::upsert_field(tree, self.node, "mirror", &[Sexpr::symbol(token)], &["at"]);
            }
            None => {
                if let Some(existing) = tree.child_list(self.node, "mirror") {
                    tree.remove(existing);
                }
            }
        }
        self
    }

    pub fn set_in_bom(&mut self, in_bom: bool) -> &mut Self {
        self.set_flag("in_bom", in_bom)
    }

    pub fn set_on_board(&mut self, on_board: bool) -> &mut Self {
        self.set_flag("on_board", on_board)
    }

    pub fn set_dnp(&mut self, dnp: bool) -> &mut Self {
        self.set_flag("dnp", dnp)
    }

    pub fn set_exclude_from_sim(&mut self, exclude: bool) -> &mut Self {
        self.set_flag("exclude_from_sim", exclude)
    }

    /// Point the symbol at another library symbol. The new definition is
    /// embedded and the pin list is rebuilt, keeping UUIDs of pin numbers
    /// the new symbol still has.
    pub fn set_lib_id(&mut self, lib_id: &str) -> Result<&mut Self, SchematicError> {
        let old = self.view().lib_id().to_string();
        if old == lib_id {
            return Ok(self);
        }
        let definition = self.schematic.require_definition(lib_id)?;
        self.schematic.embed(lib_id, &definition);

        let tree = &mut self.schematic.tree;
        if let Some(lib_name) = tree.child_list(self.node, "lib_name") {
            tree.remove(lib_name);
        }
        edit::upsert_field(tree, self.node, "lib_id", &[Sexpr::string(lib_id)], &[]);

        let kept: Vec<(String, Uuid)> = self
            .view()
            .pin_uuids()
            .into_iter()
            .map(|(n, u)| (n.to_string(), u))
            .collect();
        let tree = &mut self.schematic.tree;
        for pin in tree.child_lists(self.node, "pin") {
            tree.remove(pin);
        }
        let (unit, body_style) = (unit_of(tree, self.node), body_style_of(tree, self.node));
        for mut entry in pin_entries(&definition, unit, body_style) {
            let number = entry
                .as_list()
                .and_then(|items| items.get(1))
                .and_then(Sexpr::as_atom)
                .map(str::to_string);
            if let Some((_, uuid)) = kept.iter().find(|(n, _)| Some(n) == number.as_ref()) {
                if let Some(items) = entry.as_list_mut() {
                    items[2] = edit::uuid_field(*uuid);
                }
            }
            let index = edit::position_before(tree, self.node, &["instances"]);
            tree.insert_sexpr(self.node, index, &entry);
        }

        self.schematic.index.set_lib_id(self.uuid, &old, lib_id);
        log::debug!("Changed {} from {old} to {lib_id}", self.uuid);
        Ok(self)
    }

    /// Add `(pin ...)` entries for a definition resolved after placement.
    pub(crate) fn fill_missing_pins(&mut self, definition: &SymbolDefinition) {
        if !self.schematic.tree.child_lists(self.node, "pin").is_empty() {
            return;
        }
        let tree = &mut self.schematic.tree;
        let (unit, body_style) = (unit_of(tree, self.node), body_style_of(tree, self.node));
        for entry in pin_entries(definition, unit, body_style) {
            let index = edit::position_before(tree, self.node, &["instances"]);
            tree.insert_sexpr(self.node, index, &entry);
        }
    }

    fn set_flag(&mut self, name: &str, value: bool) -> &mut Self {
        let tree = &mut self.schematic.tree;
        let after: Vec<&str> = HEADER_FIELDS
            .iter()
            .copied()
            .take_while(|&h| h != name)
            .collect();
        edit::upsert_field(tree, self.node, name, &[Sexpr::yes_no(value)], &after);
        self
    }

    /// Set `(name ...)` in every `instances` path entry.
    fn set_instance_field(&mut self, name: &str, value: Sexpr) {
        let tree = &mut self.schematic.tree;
        let Some(instances) = tree.child_list(self.node, "instances") else {
            return;
        };
        for project in tree.child_lists(instances, "project") {
            for path in tree.child_lists(project, "path") {
                edit::upsert_field(tree, path, name, &[value.clone()], &[]);
            }
        }
    }
}

fn upsert_at(tree: &mut Tree, node: NodeId, position: Point) {
    edit::upsert_field(
        tree,
        node,
        "at",
        &[edit::number(position.x), edit::number(position.y)],
        &["lib_id", "lib_name"],
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use kisch_eda::{LibraryConfig, SymbolLibraryCache};
    use std::path::PathBuf;

    const DEVICE: &str = r#"(kicad_symbol_lib
	(version 20231120)
	(symbol "R"
		(property "Reference" "R" (at 2.032 0 90))
		(property "Value" "R" (at 0 0 90))
		(property "Footprint" "" (at -1.778 0 90))
		(property "Datasheet" "~" (at 0 0 0))
		(property "Description" "Resistor" (at 0 0 0))
		(symbol "R_1_1"
			(pin passive line (at 0 3.81 270) (length 1.27) (name "~") (number "1"))
			(pin passive line (at 0 -3.81 90) (length 1.27) (name "~") (number "2"))
		)
	)
)
"#;

    fn schematic() -> Schematic {
        let cache = SymbolLibraryCache::new(LibraryConfig::with_paths(Vec::<PathBuf>::new()));
        cache.register_library("Device", DEVICE).unwrap();
        Schematic::new().with_library(Arc::new(cache))
    }

    #[test]
    fn add_reads_back() {
        let mut sch = schematic();
        let uuid = sch
            .add_component(
                ComponentSpec::new("Device:R", "R1", "10k", (101.6, 101.6))
                    .rotation(Rotation::R90)
                    .footprint("Resistor_SMD:R_0603_1608Metric"),
            )
            .unwrap();
        let r1 = sch.get_by_reference("R1").unwrap();
        assert_eq!(r1.uuid(), uuid);
        assert_eq!(r1.value(), "10k");
        assert_eq!(r1.footprint(), Some("Resistor_SMD:R_0603_1608Metric"));
        assert_eq!(r1.property("Datasheet"), Some("~"));
        assert_eq!(r1.property("Description"), Some("Resistor"));
        assert_eq!(r1.rotation(), Rotation::R90);
        assert_eq!(r1.pin_uuids().len(), 2);
        assert_eq!(r1.pins().len(), 2);
        assert_eq!(r1.pin_position("1"), Some(Point::mm(105.41, 101.6)));
        assert!(r1.pin_position("3").is_none());
    }

    #[test]
    fn unresolved_symbols_fail_unless_deferred() {
        let mut sch = schematic();
        let err = sch
            .add_component(ComponentSpec::new("Device:Nope", "X1", "?", (0.0, 0.0)))
            .unwrap_err();
        assert!(matches!(err, SchematicError::UnresolvedSymbol { lib_id, .. } if lib_id == "Device:Nope"));
        assert!(sch.components().next().is_none());

        let uuid = sch
            .add_component(ComponentSpec::new("Device:Nope", "X1", "?", (0.0, 0.0)).deferred())
            .unwrap();
        assert!(sch.get_by_uuid(&uuid).unwrap().pin_uuids().is_empty());
    }

    #[test]
    fn add_without_library_names_the_cause() {
        let mut sch = Schematic::new();
        let err = sch
            .add_component(ComponentSpec::new("Device:R", "R1", "1k", (50.8, 50.8)))
            .unwrap_err();
        assert!(matches!(err, SchematicError::NoLibrary { ref lib_id } if lib_id == "Device:R"));
        assert_eq!(
            err.to_string(),
            "Cannot resolve symbol Device:R: no symbol library attached"
        );
        assert!(sch.components().next().is_none());
    }

    #[test]
    fn set_property_upserts() {
        let mut sch = schematic();
        let uuid = sch
            .add_component(ComponentSpec::new("Device:R", "R1", "10k", (50.8, 50.8)))
            .unwrap();
        let before = sch.to_string();

        let mut r1 = sch.component_mut(&uuid).unwrap();
        r1.set_value("4k7").set_property("MPN", "RC0603FR-074K7L");
        let r1 = sch.get_by_uuid(&uuid).unwrap();
        assert_eq!(r1.value(), "4k7");
        assert_eq!(r1.property("MPN"), Some("RC0603FR-074K7L"));
        let names: Vec<&str> = r1.properties().into_iter().map(|(n, _)| n).collect();
        assert_eq!(
            names,
            vec!["Reference", "Value", "Footprint", "Datasheet", "Description", "MPN"]
        );

        // The existing property keeps its layout; only the value atom changed.
        let after = sch.to_string();
        let value_line = |text: &str| {
            text.lines()
                .skip_while(|l| !l.contains("(property \"Value\""))
                .take(2)
                .collect::<Vec<_>>()
                .join("\n")
        };
        assert_eq!(value_line(&after), value_line(&before).replace("10k", "4k7"));
    }

    #[test]
    fn reference_change_updates_index_and_instances() {
        let mut sch = schematic();
        let uuid = sch
            .add_component(ComponentSpec::new("Device:R", "R1", "10k", (50.8, 50.8)))
            .unwrap();
        sch.component_mut(&uuid).unwrap().set_reference("R7");

        assert!(sch.get_by_reference("R1").is_none());
        assert_eq!(sch.get_by_reference("R7").map(|c| c.uuid()), Some(uuid));
        let tree = sch.tree();
        let node = sch.get_by_uuid(&uuid).unwrap().node();
        let path = tree
            .find_path(node, &["instances", "project", "path", "reference"])
            .unwrap();
        assert_eq!(tree.atom_at(path, 1), Some("R7"));
    }

    #[test]
    fn placement_setters_edit_in_place() {
        let mut sch = schematic();
        let uuid = sch
            .add_component(ComponentSpec::new("Device:R", "R1", "10k", (50.8, 50.8)))
            .unwrap();
        sch.component_mut(&uuid)
            .unwrap()
            .set_position((76.2, 50.8))
            .set_rotation(Rotation::R180)
            .set_mirror(Mirror::Y)
            .set_dnp(true)
            .set_in_bom(false);

        let r1 = sch.get_by_uuid(&uuid).unwrap();
        assert_eq!(r1.position(), Point::mm(76.2, 50.8));
        assert_eq!(r1.rotation(), Rotation::R180);
        assert_eq!(r1.mirror(), Mirror::Y);
        assert!(r1.dnp());
        assert!(!r1.in_bom());
        let reference_at = at_point(sch.tree(), find_property(sch.tree(), r1.node(), "Reference").unwrap());
        assert_eq!(reference_at, Some(Point::mm(78.74, 49.53)));

        sch.component_mut(&uuid).unwrap().set_mirror(Mirror::None);
        assert_eq!(sch.get_by_uuid(&uuid).unwrap().mirror(), Mirror::None);
        assert!(!sch.to_string().contains("(mirror"));
    }

    #[test]
    fn remove_by_reference_or_uuid() {
        let mut sch = schematic();
        let a = sch
            .add_component(ComponentSpec::new("Device:R", "R1", "1k", (50.8, 50.8)))
            .unwrap();
        let b = sch
            .add_component(ComponentSpec::new("Device:R", "R2", "2k", (76.2, 50.8)))
            .unwrap();
        assert!(sch.remove_component("R1"));
        assert!(sch.get_by_uuid(&a).is_none());
        assert!(sch.remove_component(&b.to_string()));
        assert!(!sch.remove_component("R2"));
        assert_eq!(sch.components().count(), 0);
        assert_eq!(sch.get_by_lib_id("Device:R").len(), 0);
    }

    #[test]
    fn symbols_are_embedded_once() {
        let mut sch = schematic();
        for (i, x) in [25.4, 50.8, 76.2].into_iter().enumerate() {
            sch.add_component(ComponentSpec::new("Device:R", format!("R{i}"), "1k", (x, 25.4)))
                .unwrap();
        }
        let tree = sch.tree();
        let lib_symbols = tree.child_list(tree.root(), "lib_symbols").unwrap();
        let embedded = tree.child_lists(lib_symbols, "symbol");
        assert_eq!(embedded.len(), 1);
        assert_eq!(tree.atom_at(embedded[0], 1), Some("Device:R"));
        assert_eq!(sch.get_by_lib_id("Device:R").len(), 3);
    }
}
