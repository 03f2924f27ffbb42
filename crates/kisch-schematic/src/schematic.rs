use crate::component::{component_fields, Component, ComponentMut};
use crate::edit::{self, entity_uuid, field, parse_uuid};
use crate::error::SchematicError;
use crate::index::{IndexRegistry, KeyKind, Lookup};
use crate::items::{Label, LabelKind};
use crate::matcher;
use kisch_eda::{SymbolDefinition, SymbolLibraryCache};
use kisch_sexpr::{kv, ListBuilder, NodeId, Sexpr, Tree};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

/// File format version written by KiCad 8.
pub const FORMAT_VERSION: i64 = 20231120;
const GENERATOR: &str = "eeschema";
const GENERATOR_VERSION: &str = "8.0";
const DEFAULT_PROJECT: &str = "untitled";

/// Root children that new entities are inserted in front of.
pub(crate) const TRAILING_SECTIONS: &[&str] = &["sheet_instances", "symbol_instances"];

/// Options for [`Schematic::save_with`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SaveOptions {
    /// Run [`Schematic::validate`] first and refuse to write on any problem
    pub strict: bool,
}

/// A `.kicad_sch` document.
///
/// The parse tree is the source of truth. Typed views read from it and
/// write into it, and the index registry is kept in step with every edit.
#[derive(Debug)]
pub struct Schematic {
    pub(crate) tree: Tree,
    pub(crate) index: IndexRegistry,
    pub(crate) library: Option<Arc<SymbolLibraryCache>>,
    /// Definitions present in `lib_symbols`, by embedded name
    pub(crate) embedded: HashMap<String, Arc<SymbolDefinition>>,
    pub(crate) project: String,
    pub(crate) path: Option<PathBuf>,
    /// Fingerprint of every top-level entity as last read from or written to disk
    pub(crate) baseline: HashMap<Uuid, String>,
    /// Baseline entities removed in memory since then
    pub(crate) removed: HashSet<Uuid>,
}

impl Default for Schematic {
    fn default() -> Self {
        Self::new()
    }
}

impl Schematic {
    /// An empty KiCad 8 schematic.
    pub fn new() -> Self {
        let mut page = ListBuilder::node("path");
        page.push(Sexpr::string("/"));
        page.push(kv("page", Sexpr::string("1")));

        let mut root = ListBuilder::node("kicad_sch");
        root.push(kv("version", Sexpr::int(FORMAT_VERSION)));
        root.push(kv("generator", Sexpr::string(GENERATOR)));
        root.push(kv("generator_version", Sexpr::string(GENERATOR_VERSION)));
        root.push(edit::uuid_field(Uuid::new_v4()));
        root.push(kv("paper", Sexpr::string("A4")));
        root.push(Sexpr::list(vec![Sexpr::symbol("lib_symbols")]));
        root.push(Sexpr::list(vec![Sexpr::symbol("sheet_instances"), page.build()]));

        Schematic {
            tree: Tree::from_sexpr(&root.build()),
            index: IndexRegistry::new(),
            library: None,
            embedded: HashMap::new(),
            project: DEFAULT_PROJECT.to_string(),
            path: None,
            baseline: HashMap::new(),
            removed: HashSet::new(),
        }
    }

    /// Parse schematic text.
    pub fn parse(text: &str) -> Result<Self, SchematicError> {
        let tree = kisch_sexpr::parse(text)?;
        Self::from_tree(tree)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, SchematicError> {
        let path = path.as_ref();
        log::debug!("Loading schematic {}", path.display());
        let text = fs::read_to_string(path).map_err(|e| SchematicError::io(path, e))?;
        let mut schematic = Self::parse(&text)?;
        if schematic.project == DEFAULT_PROJECT {
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                schematic.project = stem.to_string();
            }
        }
        schematic.path = Some(path.to_path_buf());
        log::debug!(
            "Loaded {} entities from {}",
            schematic.index.len(),
            path.display()
        );
        Ok(schematic)
    }

    pub(crate) fn from_tree(tree: Tree) -> Result<Self, SchematicError> {
        match tree.head(tree.root()) {
            Some("kicad_sch") => {}
            other => return Err(SchematicError::NotASchematic(other.unwrap_or_default().to_string())),
        }
        check_unique_uuids(&tree)?;

        let project = first_project_name(&tree).unwrap_or_else(|| DEFAULT_PROJECT.to_string());
        let mut schematic = Schematic {
            tree,
            index: IndexRegistry::new(),
            library: None,
            embedded: HashMap::new(),
            project,
            path: None,
            baseline: HashMap::new(),
            removed: HashSet::new(),
        };
        schematic.rebuild()?;
        schematic.baseline = matcher::fingerprints(&schematic.tree);
        Ok(schematic)
    }

    /// Use `library` to resolve symbols that are not embedded yet.
    pub fn with_library(mut self, library: Arc<SymbolLibraryCache>) -> Self {
        self.library = Some(library);
        self
    }

    pub fn set_library(&mut self, library: Arc<SymbolLibraryCache>) {
        self.library = Some(library);
    }

    pub fn library(&self) -> Option<&Arc<SymbolLibraryCache>> {
        self.library.as_ref()
    }

    /// Project name written into new `instances` entries.
    pub fn project(&self) -> &str {
        &self.project
    }

    pub fn set_project(&mut self, project: impl Into<String>) {
        self.project = project.into();
    }

    /// The file this schematic was loaded from or last saved to.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    pub fn index(&self) -> &IndexRegistry {
        &self.index
    }

    pub fn version(&self) -> Option<i64> {
        field(&self.tree, self.tree.root(), "version").and_then(|v| v.parse().ok())
    }

    /// UUID of the root sheet, used in instance paths.
    pub fn root_uuid(&self) -> Option<Uuid> {
        entity_uuid(&self.tree, self.tree.root())
    }

    pub(crate) fn root_path(&self) -> String {
        match field(&self.tree, self.tree.root(), "uuid") {
            Some(uuid) => format!("/{uuid}"),
            None => "/".to_string(),
        }
    }

    // ---- saving ----------------------------------------------------------

    pub fn save(&mut self, path: impl AsRef<Path>) -> Result<(), SchematicError> {
        self.save_with(path, &SaveOptions::default())
    }

    /// Embed any missing symbol definitions and write the document.
    ///
    /// Fails with [`SchematicError::UnresolvedSymbol`] when a placed symbol
    /// has neither an embedded nor a resolvable library definition, or with
    /// [`SchematicError::NoLibrary`] when no library is attached to look in.
    pub fn save_with(
        &mut self,
        path: impl AsRef<Path>,
        options: &SaveOptions,
    ) -> Result<(), SchematicError> {
        let path = path.as_ref();
        self.embed_missing_symbols()?;
        if options.strict {
            let problems = self.validate();
            if !problems.is_empty() {
                log::debug!("Refusing strict save with {} problem(s)", problems.len());
                return Err(SchematicError::Validation(problems));
            }
        }

        let text = self.tree.to_string();
        fs::write(path, &text).map_err(|e| SchematicError::io(path, e))?;
        log::debug!("Saved schematic {} ({} bytes)", path.display(), text.len());

        self.baseline = matcher::fingerprints(&self.tree);
        self.removed.clear();
        self.path = Some(path.to_path_buf());
        Ok(())
    }

    // ---- symbol definitions ----------------------------------------------

    /// Definition for `lib_id`, from `lib_symbols` or the library cache.
    pub fn definition(&self, lib_id: &str) -> Option<Arc<SymbolDefinition>> {
        self.embedded
            .get(lib_id)
            .cloned()
            .or_else(|| self.library.as_ref()?.resolve(lib_id).ok())
    }

    pub(crate) fn require_definition(
        &self,
        lib_id: &str,
    ) -> Result<Arc<SymbolDefinition>, SchematicError> {
        if let Some(def) = self.embedded.get(lib_id) {
            return Ok(def.clone());
        }
        let Some(library) = &self.library else {
            return Err(SchematicError::NoLibrary {
                lib_id: lib_id.to_string(),
            });
        };
        library.resolve(lib_id).map_err(|source| SchematicError::UnresolvedSymbol {
            lib_id: lib_id.to_string(),
            source,
        })
    }

    /// Copy `definition` into `lib_symbols` under `name` unless an entry of
    /// that name exists. The library text is kept verbatim apart from the
    /// top-level name.
    pub(crate) fn embed(&mut self, name: &str, definition: &Arc<SymbolDefinition>) {
        let lib_symbols = self.lib_symbols_node();
        let present = self
            .tree
            .child_lists(lib_symbols, "symbol")
            .into_iter()
            .any(|s| self.tree.atom_at(s, 1) == Some(name));
        if !present {
            let raw = definition.raw();
            let index = self.tree.children(lib_symbols).len();
            let node = self.tree.graft(lib_symbols, index, raw, raw.root());
            if let Some(&name_atom) = self.tree.children(node).get(1) {
                self.tree.set_string(name_atom, name);
            }
            log::debug!("Embedded symbol {} as '{name}'", definition.lib_id);
        }
        self.embedded
            .entry(name.to_string())
            .or_insert_with(|| definition.clone());
    }

    fn lib_symbols_node(&mut self) -> NodeId {
        let root = self.tree.root();
        if let Some(node) = self.tree.child_list(root, "lib_symbols") {
            return node;
        }
        let index = edit::position_after(
            &self.tree,
            root,
            &["version", "generator", "generator_version", "uuid", "paper", "title_block"],
        );
        self.tree
            .insert_sexpr(root, index, &Sexpr::list(vec![Sexpr::symbol("lib_symbols")]))
    }

    fn embed_missing_symbols(&mut self) -> Result<(), SchematicError> {
        let mut missing: Vec<(String, String)> = Vec::new();
        for component in self.components() {
            let name = component.symbol_name().to_string();
            if !self.embedded.contains_key(&name) && !missing.iter().any(|(n, _)| *n == name) {
                missing.push((name, component.lib_id().to_string()));
            }
        }
        for (name, lib_id) in missing {
            let definition = self.require_definition(&lib_id)?;
            self.embed(&name, &definition);
            let uuids: Vec<Uuid> = self.index.get(KeyKind::LibId, &lib_id).into_vec();
            for uuid in uuids {
                if let Some(mut component) = self.component_mut(&uuid) {
                    component.fill_missing_pins(&definition);
                }
            }
        }
        Ok(())
    }

    // ---- index maintenance -----------------------------------------------

    /// Top-level entities (root children carrying a `uuid`), in document order.
    pub(crate) fn entity_nodes(&self) -> Vec<NodeId> {
        entity_nodes(&self.tree)
    }

    /// Rebuild the index and embedded definitions from the tree.
    pub(crate) fn rebuild(&mut self) -> Result<(), SchematicError> {
        self.index.clear();
        self.embedded.clear();

        let root = self.tree.root();
        if let Some(lib_symbols) = self.tree.child_list(root, "lib_symbols") {
            for symbol in self.tree.child_lists(lib_symbols, "symbol") {
                if let Some(def) = SymbolDefinition::from_node(&self.tree, symbol) {
                    self.embedded.insert(def.lib_id.clone(), Arc::new(def));
                }
            }
        }

        for node in entity_nodes(&self.tree) {
            let Some(uuid) = entity_uuid(&self.tree, node) else {
                continue;
            };
            if !self.index.insert_node(uuid, node) {
                return Err(SchematicError::DuplicateUuid {
                    uuid: uuid.to_string(),
                });
            }
            self.index_entity(uuid, node);
        }
        log::debug!(
            "Indexed {} entities and {} embedded symbols",
            self.index.len(),
            self.embedded.len()
        );
        Ok(())
    }

    fn index_entity(&mut self, uuid: Uuid, node: NodeId) {
        match self.tree.head(node) {
            Some("symbol") => {
                let fields = component_fields(&self.tree, node);
                self.index
                    .insert_component(uuid, &fields.reference, &fields.lib_id, fields.unit);
            }
            Some(head) if LabelKind::from_head(head).is_some() => {
                if let Some(text) = self.tree.atom_at(node, 1) {
                    self.index.insert_label(uuid, text);
                }
            }
            _ => {}
        }
    }

    /// Insert a new top-level entity before the trailing instance sections
    /// and register its UUID.
    pub(crate) fn insert_entity(
        &mut self,
        sexpr: &Sexpr,
        uuid: Uuid,
    ) -> Result<NodeId, SchematicError> {
        if self.index.contains(&uuid) {
            return Err(SchematicError::DuplicateUuid {
                uuid: uuid.to_string(),
            });
        }
        let root = self.tree.root();
        let index = edit::position_before(&self.tree, root, TRAILING_SECTIONS);
        let node = self.tree.insert_sexpr(root, index, sexpr);
        self.index.insert_node(uuid, node);
        Ok(node)
    }

    /// Detach a top-level entity and drop it from every index.
    pub(crate) fn remove_entity(&mut self, uuid: &Uuid) -> bool {
        let Some(node) = self.index.remove(uuid) else {
            return false;
        };
        self.tree.remove(node);
        if self.baseline.contains_key(uuid) {
            self.removed.insert(*uuid);
        }
        log::debug!("Removed entity {uuid}");
        true
    }

    // ---- queries ---------------------------------------------------------

    /// Placed symbols in document order.
    pub fn components(&self) -> impl Iterator<Item = Component<'_>> + '_ {
        entity_nodes(&self.tree)
            .into_iter()
            .filter(|&node| self.tree.head(node) == Some("symbol"))
            .filter_map(|node| Component::new(self, node))
    }

    pub fn get_by_uuid(&self, uuid: &Uuid) -> Option<Component<'_>> {
        let node = self.index.node(uuid)?;
        if self.tree.head(node) != Some("symbol") {
            return None;
        }
        Component::new(self, node)
    }

    /// The unit with the lowest unit number among those sharing `reference`.
    pub fn get_by_reference(&self, reference: &str) -> Option<Component<'_>> {
        let uuid = self.index.get(KeyKind::Reference, reference).first()?;
        self.get_by_uuid(&uuid)
    }

    /// Every unit sharing `reference`, ordered by unit then insertion.
    pub fn get_all_by_reference(&self, reference: &str) -> Lookup {
        self.index.get(KeyKind::Reference, reference)
    }

    pub fn get_by_lib_id(&self, lib_id: &str) -> Vec<Component<'_>> {
        self.index
            .get(KeyKind::LibId, lib_id)
            .iter()
            .filter_map(|uuid| self.get_by_uuid(&uuid))
            .collect()
    }

    pub fn filter<F>(&self, mut predicate: F) -> Vec<Component<'_>>
    where
        F: FnMut(&Component<'_>) -> bool,
    {
        self.components().filter(|c| predicate(c)).collect()
    }

    pub fn lookup(&self, kind: KeyKind, key: &str) -> Lookup {
        self.index.get(kind, key)
    }

    pub fn component_mut(&mut self, uuid: &Uuid) -> Option<ComponentMut<'_>> {
        let node = self.index.node(uuid)?;
        if self.tree.head(node) != Some("symbol") {
            return None;
        }
        Some(ComponentMut::new(self, node, *uuid))
    }

    pub fn component_mut_by_reference(&mut self, reference: &str) -> Option<ComponentMut<'_>> {
        let uuid = self.index.get(KeyKind::Reference, reference).first()?;
        self.component_mut(&uuid)
    }

    /// Distinct label texts, sorted.
    pub fn nets(&self) -> Vec<&str> {
        self.index.net_names()
    }

    pub fn get_labels_by_net(&self, net: &str) -> Vec<Label<'_>> {
        self.index
            .get(KeyKind::Net, net)
            .iter()
            .filter_map(|uuid| self.index.node(&uuid))
            .filter_map(|node| Label::new(&self.tree, node))
            .collect()
    }

    /// Absolute position of `pin_number` on the placed symbol `component`.
    pub fn resolve_pin_position(&self, component: &Uuid, pin_number: &str) -> Option<(f64, f64)> {
        self.get_by_uuid(component)?
            .pin_position(pin_number)
            .map(|p| p.to_mm())
    }
}

impl fmt::Display for Schematic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.tree, f)
    }
}

pub(crate) fn entity_nodes(tree: &Tree) -> Vec<NodeId> {
    tree.children(tree.root())
        .iter()
        .copied()
        .filter(|&node| tree.child_list(node, "uuid").is_some())
        .collect()
}

/// Every `(uuid ...)` outside `lib_symbols` must be distinct.
fn check_unique_uuids(tree: &Tree) -> Result<(), SchematicError> {
    let mut seen = HashSet::new();
    let mut stack = vec![tree.root()];
    while let Some(node) = stack.pop() {
        if tree.head(node) == Some("lib_symbols") {
            continue;
        }
        if tree.head(node) == Some("uuid") {
            if let Some(text) = tree.atom_at(node, 1) {
                if !seen.insert(parse_uuid(text)) {
                    return Err(SchematicError::DuplicateUuid {
                        uuid: text.to_string(),
                    });
                }
            }
            continue;
        }
        stack.extend(tree.children(node).iter().rev().filter(|&&c| tree.is_list(c)));
    }
    Ok(())
}

fn first_project_name(tree: &Tree) -> Option<String> {
    entity_nodes(tree).into_iter().find_map(|node| {
        let project = tree.find_path(node, &["instances", "project"])?;
        tree.atom_at(project, 1).map(str::to_string)
    })
}
