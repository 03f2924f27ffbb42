use crate::units::Point;
use kisch_eda::LibraryError;
use kisch_sexpr::SyntaxError;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

/// Errors that can occur while loading, editing or saving a schematic
#[derive(Debug, thiserror::Error)]
pub enum SchematicError {
    #[error("Failed to parse schematic: {0}")]
    Syntax(#[from] SyntaxError),

    #[error("Cannot resolve symbol {lib_id}: {source}")]
    UnresolvedSymbol {
        lib_id: String,
        #[source]
        source: LibraryError,
    },

    #[error("Cannot resolve symbol {lib_id}: no symbol library attached")]
    NoLibrary { lib_id: String },

    #[error("Duplicate uuid {uuid}")]
    DuplicateUuid { uuid: String },

    #[error("Schematic failed validation with {} problem(s)", .0.len())]
    Validation(Vec<ValidationError>),

    #[error("Merge conflict on {} entities: {}", .uuids.len(), .uuids.join(", "))]
    MergeConflict { uuids: Vec<String> },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Not a KiCad schematic (root is '{0}')")]
    NotASchematic(String),

    #[error("Invalid geometry: {0}")]
    InvalidGeometry(String),
}

impl SchematicError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SchematicError::Io {
            path: path.into(),
            source,
        }
    }
}

/// A problem found by [`Schematic::validate`](crate::Schematic::validate).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValidationError {
    /// A component lacks a field KiCad requires
    MissingField { uuid: String, field: String },
    /// A component is not placed on the 1.27 mm connection grid
    OffGrid { uuid: String, position: Point },
    /// A wire end that touches no pin, wire, label, junction or sheet pin
    DanglingWire { uuid: String, point: Point },
    /// A placed pin that its symbol definition does not have
    UnknownPin { uuid: String, number: String },
    /// A pin of the placed unit with no `(pin "N" (uuid ...))` entry
    MissingPin { uuid: String, number: String },
    /// A wire with fewer than two points
    DegenerateWire { uuid: String },
    /// One reference shared by different symbols or repeated on one unit
    ReferenceClash { reference: String, uuids: Vec<String> },
    /// A pin number used twice within one unit of a symbol definition
    DuplicatePinNumber { lib_id: String, unit: u32, number: String },
    /// A sheet pin with no hierarchical label of the same name in the child
    SheetPinWithoutLabel { sheet: String, pin: String },
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::MissingField { uuid, field } => {
                write!(f, "Component {uuid} is missing '{field}'")
            }
            ValidationError::OffGrid { uuid, position } => {
                write!(f, "Component {uuid} at {position} is off grid")
            }
            ValidationError::DanglingWire { uuid, point } => {
                write!(f, "Wire {uuid} has an unconnected end at {point}")
            }
            ValidationError::UnknownPin { uuid, number } => {
                write!(f, "Component {uuid} has pin '{number}' not in its symbol")
            }
            ValidationError::MissingPin { uuid, number } => {
                write!(f, "Component {uuid} has no entry for pin '{number}'")
            }
            ValidationError::DegenerateWire { uuid } => {
                write!(f, "Wire {uuid} has fewer than two points")
            }
            ValidationError::ReferenceClash { reference, uuids } => {
                write!(f, "Reference {reference} is shared by {}", uuids.join(", "))
            }
            ValidationError::DuplicatePinNumber {
                lib_id,
                unit,
                number,
            } => write!(f, "Symbol {lib_id} unit {unit} repeats pin '{number}'"),
            ValidationError::SheetPinWithoutLabel { sheet, pin } => {
                write!(f, "Sheet {sheet} pin '{pin}' has no hierarchical label")
            }
        }
    }
}
