pub mod cache;
pub mod config;
pub mod error;
pub mod kicad;

pub use cache::SymbolLibraryCache;
pub use config::LibraryConfig;
pub use error::LibraryError;
pub use kicad::symbol_library::KicadSymbolLibrary;

use kisch_sexpr::{NodeId, Tree};
use serde::Serialize;

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// A symbol as defined in a `.kicad_sym` library, with `extends` already
/// flattened. Shared read-only between documents.
#[derive(Debug, Clone, Serialize)]
pub struct SymbolDefinition {
    /// Full `<library>:<name>` identifier
    pub lib_id: String,
    pub name: String,
    /// Parent symbol this one was derived from, if any
    pub extends: Option<String>,
    pub properties: HashMap<String, String>,
    pub power: bool,
    pub in_bom: bool,
    pub on_board: bool,
    pub pins: Vec<Pin>,
    pub unit_count: u32,
    #[serde(skip)]
    pub(crate) raw: Tree,
}

impl SymbolDefinition {
    /// Decode a symbol that is already flattened, such as an entry of a
    /// schematic's `lib_symbols` whose name is the full lib_id.
    pub fn from_node(tree: &Tree, node: NodeId) -> Option<Self> {
        let mut symbol = kicad::symbol::parse_symbol(tree, node)?;
        let lib_id = symbol.name.clone();
        let (nickname, name) = match split_lib_id(&lib_id) {
            Ok((nickname, name)) => (nickname.to_string(), name.to_string()),
            Err(_) => (String::new(), lib_id.clone()),
        };
        symbol.name = name;
        let mut definition = Self::from_decoded(&nickname, symbol, tree.subtree(node));
        definition.lib_id = lib_id;
        Some(definition)
    }

    pub(crate) fn from_decoded(
        nickname: &str,
        symbol: kicad::symbol::KicadSymbol,
        raw: Tree,
    ) -> Self {
        SymbolDefinition {
            lib_id: format!("{nickname}:{}", symbol.name),
            name: symbol.name,
            extends: symbol.extends,
            properties: symbol.properties,
            power: symbol.power,
            in_bom: symbol.in_bom,
            on_board: symbol.on_board,
            pins: symbol.pins,
            unit_count: symbol.unit_count,
            raw,
        }
    }

    /// The symbol's subtree exactly as it appears in the library.
    ///
    /// Symbols that use `(extends ...)` are the exception: they are rebuilt
    /// from the merged parent and child, so their text is canonically
    /// formatted rather than the library bytes.
    pub fn raw(&self) -> &Tree {
        &self.raw
    }

    pub fn property(&self, name: &str) -> Option<&str> {
        self.properties.get(name).map(String::as_str)
    }

    pub fn is_multi_unit(&self) -> bool {
        self.unit_count > 1
    }

    /// Pins drawn for `unit` and `body_style`. Unit 0 and body style 0 pins
    /// are shared by every unit and style.
    pub fn pins_for(&self, unit: u32, body_style: u32) -> impl Iterator<Item = &Pin> {
        self.pins.iter().filter(move |pin| {
            (pin.unit == 0 || pin.unit == unit)
                && (pin.body_style == 0 || pin.body_style == body_style)
        })
    }

    pub fn pin(&self, unit: u32, body_style: u32, number: &str) -> Option<&Pin> {
        self.pins_for(unit, body_style).find(|pin| pin.number == number)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Pin {
    pub number: String,
    pub name: String,
    pub electrical_type: PinElectricalType,
    /// Graphic style (`line`, `inverted`, `clock`, ...)
    pub shape: String,
    /// Connection point in symbol space (y up), in mm
    pub x: f64,
    pub y: f64,
    /// Orientation in degrees
    pub angle: f64,
    pub length: f64,
    pub unit: u32,
    pub body_style: u32,
    pub hidden: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PinElectricalType {
    Input,
    Output,
    Bidirectional,
    TriState,
    Passive,
    Free,
    Unspecified,
    PowerIn,
    PowerOut,
    OpenCollector,
    OpenEmitter,
    NoConnect,
}

impl PinElectricalType {
    pub fn as_str(self) -> &'static str {
        match self {
            PinElectricalType::Input => "input",
            PinElectricalType::Output => "output",
            PinElectricalType::Bidirectional => "bidirectional",
            PinElectricalType::TriState => "tri_state",
            PinElectricalType::Passive => "passive",
            PinElectricalType::Free => "free",
            PinElectricalType::Unspecified => "unspecified",
            PinElectricalType::PowerIn => "power_in",
            PinElectricalType::PowerOut => "power_out",
            PinElectricalType::OpenCollector => "open_collector",
            PinElectricalType::OpenEmitter => "open_emitter",
            PinElectricalType::NoConnect => "no_connect",
        }
    }
}

impl FromStr for PinElectricalType {
    type Err = LibraryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let kind = match s {
            "input" => PinElectricalType::Input,
            "output" => PinElectricalType::Output,
            "bidirectional" => PinElectricalType::Bidirectional,
            "tri_state" => PinElectricalType::TriState,
            "passive" => PinElectricalType::Passive,
            "free" => PinElectricalType::Free,
            "unspecified" => PinElectricalType::Unspecified,
            "power_in" => PinElectricalType::PowerIn,
            "power_out" => PinElectricalType::PowerOut,
            "open_collector" => PinElectricalType::OpenCollector,
            "open_emitter" => PinElectricalType::OpenEmitter,
            "no_connect" => PinElectricalType::NoConnect,
            other => return Err(LibraryError::UnknownPinType(other.to_string())),
        };
        Ok(kind)
    }
}

impl fmt::Display for PinElectricalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Split `Device:R` into (`Device`, `R`).
pub fn split_lib_id(lib_id: &str) -> Result<(&str, &str), LibraryError> {
    match lib_id.split_once(':') {
        Some((library, name)) if !library.is_empty() && !name.is_empty() => Ok((library, name)),
        _ => Err(LibraryError::InvalidLibId(lib_id.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pin_types_roundtrip_through_text() {
        for text in ["passive", "power_in", "tri_state", "no_connect"] {
            let kind: PinElectricalType = text.parse().unwrap();
            assert_eq!(kind.to_string(), text);
        }
        assert!(matches!(
            "bogus".parse::<PinElectricalType>(),
            Err(LibraryError::UnknownPinType(_))
        ));
    }

    #[test]
    fn lib_ids() {
        assert_eq!(split_lib_id("Device:R").unwrap(), ("Device", "R"));
        assert_eq!(
            split_lib_id("power:+3V3").unwrap(),
            ("power", "+3V3")
        );
        assert!(split_lib_id("R").is_err());
        assert!(split_lib_id(":R").is_err());
    }

    #[test]
    fn decodes_embedded_symbol() {
        let tree = kisch_sexpr::parse(
            r#"(lib_symbols (symbol "Device:R" (property "Value" "R") (symbol "R_1_1" (pin passive line (at 0 3.81 270) (length 1.27) (name "~") (number "1")))))"#,
        )
        .unwrap();
        let node = tree.child_list(tree.root(), "symbol").unwrap();
        let def = SymbolDefinition::from_node(&tree, node).unwrap();
        assert_eq!(def.lib_id, "Device:R");
        assert_eq!(def.name, "R");
        assert_eq!(def.pin(1, 1, "1").map(|p| p.y), Some(3.81));
        assert!(def.raw().to_string().starts_with("(symbol \"Device:R\""));
    }
}
