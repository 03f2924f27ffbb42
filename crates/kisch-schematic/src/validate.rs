use crate::component::Component;
use crate::edit::find_property;
use crate::error::ValidationError;
use crate::schematic::Schematic;
use crate::units::{Mm, Point};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Children every placed symbol must carry.
const REQUIRED_FIELDS: &[&str] = &[
    "lib_id", "at", "unit", "in_bom", "on_board", "dnp", "uuid", "instances",
];

const REQUIRED_PROPERTIES: &[&str] = &["Reference", "Value", "Footprint", "Datasheet"];

/// First file format version written by KiCad 8.
const KICAD8_VERSION: i64 = 20231120;

/// Required from the KiCad 8 file format on. Older files never carry them.
const KICAD8_FIELDS: &[&str] = &["exclude_from_sim", "fields_autoplaced"];
const KICAD8_PROPERTIES: &[&str] = &["Description"];

impl Schematic {
    /// Collect every structural problem, in document order.
    ///
    /// Sheet pins are only checked when the child schematic can be loaded
    /// from disk next to this one.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut problems = Vec::new();
        let components: Vec<Component<'_>> = self.components().collect();

        for component in &components {
            self.check_fields(component, &mut problems);
            self.check_grid(component, &mut problems);
            self.check_pins(component, &mut problems);
        }
        check_references(&components, &mut problems);
        self.check_definitions(&mut problems);
        self.check_wires(&components, &mut problems);
        self.check_sheets(&mut problems);

        log::debug!("Validation found {} problem(s)", problems.len());
        problems
    }

    fn check_fields(&self, component: &Component<'_>, problems: &mut Vec<ValidationError>) {
        let tree = self.tree();
        let uuid = component.uuid().to_string();
        let kicad8 = self.version().map_or(true, |v| v >= KICAD8_VERSION);
        let (fields, properties): (&[&str], &[&str]) = if kicad8 {
            (KICAD8_FIELDS, KICAD8_PROPERTIES)
        } else {
            (&[], &[])
        };
        let missing_fields = REQUIRED_FIELDS
            .iter()
            .chain(fields)
            .filter(|&&name| tree.child_list(component.node(), name).is_none());
        let missing_properties = REQUIRED_PROPERTIES
            .iter()
            .chain(properties)
            .filter(|&&name| find_property(tree, component.node(), name).is_none());
        for &name in missing_fields.chain(missing_properties) {
            problems.push(ValidationError::MissingField {
                uuid: uuid.clone(),
                field: name.to_string(),
            });
        }
    }

    fn check_grid(&self, component: &Component<'_>, problems: &mut Vec<ValidationError>) {
        let position = component.position();
        if !position.x.is_multiple_of(Mm::GRID) || !position.y.is_multiple_of(Mm::GRID) {
            problems.push(ValidationError::OffGrid {
                uuid: component.uuid().to_string(),
                position,
            });
        }
    }

    fn check_pins(&self, component: &Component<'_>, problems: &mut Vec<ValidationError>) {
        let Some(definition) = component.definition() else {
            return;
        };
        let (unit, body_style) = (component.unit(), component.body_style());
        let placed = component.pin_uuids();
        for &(number, _) in &placed {
            if definition.pin(unit, body_style, number).is_none() {
                problems.push(ValidationError::UnknownPin {
                    uuid: component.uuid().to_string(),
                    number: number.to_string(),
                });
            }
        }
        let expected: BTreeSet<&str> = definition
            .pins_for(unit, body_style)
            .map(|pin| pin.number.as_str())
            .collect();
        for number in expected {
            if !placed.iter().any(|&(n, _)| n == number) {
                problems.push(ValidationError::MissingPin {
                    uuid: component.uuid().to_string(),
                    number: number.to_string(),
                });
            }
        }
    }

    /// Pin numbers must be unique within each unit of an embedded symbol.
    fn check_definitions(&self, problems: &mut Vec<ValidationError>) {
        let mut names: Vec<&String> = self.embedded.keys().collect();
        names.sort();
        for name in names {
            let definition = &self.embedded[name];
            let mut seen: BTreeMap<(u32, u32, &str), usize> = BTreeMap::new();
            for pin in &definition.pins {
                *seen
                    .entry((pin.unit, pin.body_style, pin.number.as_str()))
                    .or_default() += 1;
            }
            for ((unit, _, number), count) in seen {
                if count > 1 {
                    problems.push(ValidationError::DuplicatePinNumber {
                        lib_id: name.clone(),
                        unit,
                        number: number.to_string(),
                    });
                }
            }
        }
    }

    fn check_wires(&self, components: &[Component<'_>], problems: &mut Vec<ValidationError>) {
        let mut anchors: Vec<Point> = components
            .iter()
            .flat_map(|c| c.pin_positions().into_iter().map(|(_, p)| p))
            .collect();
        anchors.extend(self.labels().map(|l| l.position()));
        anchors.extend(self.junctions());
        anchors.extend(self.no_connects());
        anchors.extend(self.sheets().flat_map(|s| s.pins()).map(|p| p.position));

        let wires: Vec<_> = self.wires().collect();
        for (i, wire) in wires.iter().enumerate() {
            let uuid = wire.uuid().map(|u| u.to_string()).unwrap_or_default();
            let points = wire.points();
            if points.len() < 2 {
                problems.push(ValidationError::DegenerateWire { uuid });
                continue;
            }
            for end in [points[0], points[points.len() - 1]] {
                let connected = anchors.contains(&end)
                    || wires
                        .iter()
                        .enumerate()
                        .any(|(j, other)| j != i && other.touches(end));
                if !connected {
                    problems.push(ValidationError::DanglingWire {
                        uuid: uuid.clone(),
                        point: end,
                    });
                }
            }
        }
    }

    fn check_sheets(&self, problems: &mut Vec<ValidationError>) {
        let Some(dir) = self.path().and_then(|p| p.parent()) else {
            return;
        };
        for sheet in self.sheets() {
            if !dir.join(sheet.file()).is_file() {
                continue;
            }
            match self.load_sheet_child(&sheet, Some(dir)) {
                Ok(child) => problems.extend(self.check_sheet_pins(&sheet, &child)),
                Err(e) => log::warn!("Cannot check pins of sheet '{}': {e}", sheet.name()),
            }
        }
    }
}

/// A reference may repeat only across distinct units of one lib_id placed
/// under the same instance path. Unannotated references (ending in `?`) are
/// ignored.
fn check_references(components: &[Component<'_>], problems: &mut Vec<ValidationError>) {
    let mut groups: Vec<(&str, Vec<&Component<'_>>)> = Vec::new();
    let mut positions: HashMap<&str, usize> = HashMap::new();
    for component in components {
        let reference = component.reference();
        if reference.is_empty() || reference.ends_with('?') {
            continue;
        }
        let slot = *positions.entry(reference).or_insert_with(|| {
            groups.push((reference, Vec::new()));
            groups.len() - 1
        });
        groups[slot].1.push(component);
    }

    for (reference, members) in groups {
        if members.len() < 2 {
            continue;
        }
        let lib_ids_differ = members.iter().any(|c| c.lib_id() != members[0].lib_id());
        let paths_differ = members
            .iter()
            .any(|c| c.instance_path() != members[0].instance_path());
        let mut units: Vec<u32> = members.iter().map(|c| c.unit()).collect();
        units.sort_unstable();
        let units_repeat = units.windows(2).any(|w| w[0] == w[1]);
        if lib_ids_differ || paths_differ || units_repeat {
            problems.push(ValidationError::ReferenceClash {
                reference: reference.to_string(),
                uuids: members.iter().map(|c| c.uuid().to_string()).collect(),
            });
        }
    }
}
