//! Format-preserving reading and editing of KiCad `.kicad_sch` schematics.
//!
//! A [`Schematic`] owns the parse tree of one sheet. Untouched text is written
//! back byte for byte, while inserted entities use KiCad's own layout. Typed
//! views ([`Component`], [`Wire`], [`Label`], [`Sheet`]) read from the tree,
//! and every edit keeps the [`IndexRegistry`] in step so lookups by UUID,
//! reference, lib_id or net stay cheap.
//!
//! ```no_run
//! use kisch_schematic::{ComponentSpec, Schematic};
//! use kisch_eda::SymbolLibraryCache;
//! use std::sync::Arc;
//!
//! # fn main() -> anyhow::Result<()> {
//! let library = Arc::new(SymbolLibraryCache::from_env());
//! let mut sch = Schematic::load("board.kicad_sch")?.with_library(library);
//! sch.add_component(ComponentSpec::new("Device:R", "R1", "10k", (101.6, 101.6)))?;
//! sch.save("board.kicad_sch")?;
//! # Ok(())
//! # }
//! ```

pub mod component;
mod edit;
pub mod error;
pub mod geometry;
pub mod index;
pub mod items;
pub mod matcher;
pub mod schematic;
pub mod units;
mod validate;

pub use component::{Component, ComponentMut, ComponentSpec};
pub use edit::parse_uuid;
pub use error::{SchematicError, ValidationError};
pub use index::{IndexRegistry, KeyKind, Lookup};
pub use items::{
    Label, LabelKind, LabelShape, Sheet, SheetEdge, SheetMut, SheetPin, SheetPinType, SheetSpec,
    Wire, WireKind,
};
pub use matcher::{MergeEntry, MergeOutcome, MergePolicy, MergeReport};
pub use schematic::{SaveOptions, Schematic, FORMAT_VERSION};
pub use units::{Mirror, Mm, Point, Rotation};

use std::path::Path;

/// Load a schematic from disk.
pub fn load(path: impl AsRef<Path>) -> Result<Schematic, SchematicError> {
    Schematic::load(path)
}
