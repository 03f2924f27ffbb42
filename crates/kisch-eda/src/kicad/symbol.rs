use crate::{Pin, PinElectricalType};
use kisch_sexpr::{NodeId, Tree};
use std::collections::HashMap;

/// Fields decoded from one `(symbol "<name>" ...)` node of a library.
#[derive(Debug, Default, Clone)]
pub(crate) struct KicadSymbol {
    pub(crate) name: String,
    pub(crate) extends: Option<String>,
    pub(crate) properties: HashMap<String, String>,
    pub(crate) power: bool,
    pub(crate) in_bom: bool,
    pub(crate) on_board: bool,
    pub(crate) pins: Vec<Pin>,
    pub(crate) unit_count: u32,
}

pub(crate) fn parse_symbol(tree: &Tree, node: NodeId) -> Option<KicadSymbol> {
    let name = tree.atom_at(node, 1)?.to_string();

    let mut symbol = KicadSymbol {
        name,
        in_bom: true,
        on_board: true,
        unit_count: 1,
        ..Default::default()
    };

    for &item in tree.children(node).iter().skip(2) {
        let Some(head) = tree.head(item) else {
            continue;
        };
        match head {
            "extends" => symbol.extends = tree.atom_at(item, 1).map(str::to_string),
            "power" => symbol.power = true,
            "in_bom" => symbol.in_bom = yes_no(tree, item, true),
            "on_board" => symbol.on_board = yes_no(tree, item, true),
            "property" => {
                if let (Some(key), Some(value)) = (tree.atom_at(item, 1), tree.atom_at(item, 2)) {
                    symbol.properties.insert(key.to_string(), value.to_string());
                }
            }
            "pin" => {
                // Pins directly under the top-level symbol belong to every unit.
                if let Some(pin) = parse_pin(tree, item, 0, 0) {
                    symbol.pins.push(pin);
                }
            }
            "symbol" => parse_symbol_section(&mut symbol, tree, item),
            _ => {}
        }
    }

    Some(symbol)
}

/// Parse a nested `(symbol "<name>_<unit>_<style>" ...)` section.
fn parse_symbol_section(symbol: &mut KicadSymbol, tree: &Tree, section: NodeId) {
    let (unit, body_style) = tree
        .atom_at(section, 1)
        .and_then(unit_suffix)
        .unwrap_or((0, 0));
    symbol.unit_count = symbol.unit_count.max(unit);

    for &item in tree.children(section) {
        if tree.head(item) == Some("pin") {
            if let Some(pin) = parse_pin(tree, item, unit, body_style) {
                symbol.pins.push(pin);
            }
        }
    }
}

/// `R_1_1` → (1, 1). The name prefix may itself contain underscores.
pub(crate) fn unit_suffix(section_name: &str) -> Option<(u32, u32)> {
    let mut parts = section_name.rsplitn(3, '_');
    let body_style = parts.next()?.parse().ok()?;
    let unit = parts.next()?.parse().ok()?;
    parts.next()?;
    Some((unit, body_style))
}

// Format: (pin passive line (at X Y ANGLE) (length L) [hide] (name "~" ...) (number "1" ...))
fn parse_pin(tree: &Tree, pin: NodeId, unit: u32, body_style: u32) -> Option<Pin> {
    let electrical_type = match tree.atom_at(pin, 1)?.parse() {
        Ok(kind) => kind,
        Err(e) => {
            log::warn!("{e}; treating pin as unspecified");
            PinElectricalType::Unspecified
        }
    };
    let shape = tree.atom_at(pin, 2).unwrap_or("line").to_string();

    let at = tree.child_list(pin, "at")?;
    let coord = |index| {
        tree.atom_at(at, index)
            .and_then(|v| v.parse::<f64>().ok())
            .unwrap_or(0.0)
    };

    let number = tree
        .child_list(pin, "number")
        .and_then(|n| tree.atom_at(n, 1))?
        .to_string();
    let name = tree
        .child_list(pin, "name")
        .and_then(|n| tree.atom_at(n, 1))
        .unwrap_or_default()
        .to_string();
    let length = tree
        .child_list(pin, "length")
        .and_then(|l| tree.atom_at(l, 1))
        .and_then(|v| v.parse().ok())
        .unwrap_or(0.0);

    // KiCad 8 writes `(hide yes)`, older files a bare `hide` token.
    let hidden = tree.has_flag(pin, "hide")
        || tree
            .child_list(pin, "hide")
            .is_some_and(|h| yes_no(tree, h, true));

    Some(Pin {
        number,
        name,
        electrical_type,
        shape,
        x: coord(1),
        y: coord(2),
        angle: coord(3),
        length,
        unit,
        body_style,
        hidden,
    })
}

/// Value of a `(flag yes|no)` list; a bare `(flag)` means `default`.
pub(crate) fn yes_no(tree: &Tree, node: NodeId, default: bool) -> bool {
    match tree.atom_at(node, 1) {
        Some("yes") => true,
        Some("no") => false,
        _ => default,
    }
}
