use crate::{LibraryError, SymbolDefinition};
use kisch_sexpr::{parse, NodeId, Sexpr, Tree};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::symbol::{parse_symbol, KicadSymbol};

/// A parsed `.kicad_sym` file. Every symbol is decoded and flattened once.
#[derive(Debug)]
pub struct KicadSymbolLibrary {
    nickname: String,
    source: Option<PathBuf>,
    order: Vec<String>,
    symbols: HashMap<String, Arc<SymbolDefinition>>,
}

impl KicadSymbolLibrary {
    /// Parse a library from text. `nickname` is the library half of every
    /// lib_id (`Device` in `Device:R`).
    pub fn from_string(nickname: &str, content: &str) -> Result<Self, LibraryError> {
        Self::from_string_with_source(nickname, content, None)
    }

    pub fn from_file(nickname: &str, path: &Path) -> Result<Self, LibraryError> {
        let content = fs::read_to_string(path).map_err(|e| LibraryError::io(path, e))?;
        Self::from_string_with_source(nickname, &content, Some(path.to_path_buf()))
    }

    fn from_string_with_source(
        nickname: &str,
        content: &str,
        source: Option<PathBuf>,
    ) -> Result<Self, LibraryError> {
        let display_path = source
            .clone()
            .unwrap_or_else(|| PathBuf::from(format!("{nickname}.kicad_sym")));
        let tree = parse(content).map_err(|source| LibraryError::Syntax {
            path: display_path.clone(),
            source,
        })?;
        if tree.head(tree.root()) != Some("kicad_symbol_lib") {
            return Err(LibraryError::NotALibrary(display_path));
        }

        let mut raw: Vec<(KicadSymbol, NodeId)> = Vec::new();
        for node in tree.child_lists(tree.root(), "symbol") {
            match parse_symbol(&tree, node) {
                Some(symbol) => raw.push((symbol, node)),
                None => log::warn!("Skipping unnamed symbol in {}", display_path.display()),
            }
        }

        let by_name: HashMap<&str, usize> = raw
            .iter()
            .enumerate()
            .map(|(idx, (symbol, _))| (symbol.name.as_str(), idx))
            .collect();

        let mut order = Vec::with_capacity(raw.len());
        let mut symbols = HashMap::with_capacity(raw.len());
        for (symbol, node) in &raw {
            let definition = match &symbol.extends {
                None => {
                    SymbolDefinition::from_decoded(nickname, symbol.clone(), tree.subtree(*node))
                }
                Some(_) => {
                    let mut visiting = HashSet::new();
                    let merged = flatten(&tree, &raw, &by_name, symbol, &mut visiting);
                    let merged_tree = Tree::from_sexpr(&merged);
                    let mut decoded = parse_symbol(&merged_tree, merged_tree.root())
                        .unwrap_or_else(|| symbol.clone());
                    decoded.extends = symbol.extends.clone();
                    SymbolDefinition::from_decoded(nickname, decoded, merged_tree)
                }
            };
            order.push(symbol.name.clone());
            symbols.insert(symbol.name.clone(), Arc::new(definition));
        }

        log::debug!(
            "Loaded {} symbols from library '{nickname}' ({})",
            symbols.len(),
            display_path.display()
        );

        Ok(KicadSymbolLibrary {
            nickname: nickname.to_string(),
            source,
            order,
            symbols,
        })
    }

    pub fn nickname(&self) -> &str {
        &self.nickname
    }

    /// The file the library was read from; `None` for in-memory libraries.
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    pub fn get_symbol(&self, name: &str) -> Option<Arc<SymbolDefinition>> {
        self.symbols.get(name).cloned()
    }

    /// Symbol names in file order.
    pub fn symbol_names(&self) -> Vec<&str> {
        self.order.iter().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// Resolve the `extends` chain of `symbol` into one merged expression.
fn flatten(
    tree: &Tree,
    raw: &[(KicadSymbol, NodeId)],
    by_name: &HashMap<&str, usize>,
    symbol: &KicadSymbol,
    visiting: &mut HashSet<String>,
) -> Sexpr {
    let idx = by_name.get(symbol.name.as_str()).copied();
    let own = match idx {
        Some(idx) => tree.to_sexpr(raw[idx].1),
        None => Sexpr::list(Vec::new()),
    };

    let Some(parent_name) = &symbol.extends else {
        return own;
    };
    if !visiting.insert(symbol.name.clone()) {
        log::warn!(
            "Circular extends dependency detected for symbol '{}'",
            symbol.name
        );
        return own;
    }
    let Some(&parent_idx) = by_name.get(parent_name.as_str()) else {
        log::warn!(
            "Symbol '{}' extends '{}' but parent not found",
            symbol.name,
            parent_name
        );
        return own;
    };

    let parent = flatten(tree, raw, by_name, &raw[parent_idx].0, visiting);
    merge_symbol_sexprs(&parent, &own)
}

/// Merge two symbol expressions, with the child overriding the parent.
///
/// Parent fields the child does not redefine come first, then the child's
/// own fields, then the unit sections: the child's if it draws any, else the
/// parent's renamed to the child's name.
fn merge_symbol_sexprs(parent_sexp: &Sexpr, child_sexp: &Sexpr) -> Sexpr {
    let (Some(parent_list), Some(child_list)) = (parent_sexp.as_list(), child_sexp.as_list())
    else {
        return child_sexp.clone();
    };

    let parent_name = parent_list.get(1).and_then(Sexpr::as_atom).unwrap_or_default();
    let child_name = child_list.get(1).and_then(Sexpr::as_atom).unwrap_or_default();

    let mut merged_items = vec![
        Sexpr::symbol("symbol"),
        child_list
            .get(1)
            .cloned()
            .unwrap_or_else(|| Sexpr::string(child_name)),
    ];

    let mut child_props: Vec<Sexpr> = Vec::new();
    let mut child_keys: HashSet<String> = HashSet::new();
    let mut child_sections: Vec<Sexpr> = Vec::new();
    let mut parent_sections: Vec<Sexpr> = Vec::new();

    for item in child_list.iter().skip(2) {
        let Some(head) = item.head() else {
            continue;
        };
        match head {
            "extends" => continue,
            "property" => {
                if let Some(key) = item.as_list().and_then(|l| l.get(1)).and_then(Sexpr::as_atom) {
                    child_keys.insert(format!("property:{key}"));
                }
                child_props.push(item.clone());
            }
            "symbol" => child_sections.push(item.clone()),
            other => {
                child_keys.insert(other.to_string());
                child_props.push(item.clone());
            }
        }
    }

    for item in parent_list.iter().skip(2) {
        let Some(head) = item.head() else {
            continue;
        };
        match head {
            "property" => {
                let key = item.as_list().and_then(|l| l.get(1)).and_then(Sexpr::as_atom);
                if key.is_some_and(|k| !child_keys.contains(&format!("property:{k}"))) {
                    merged_items.push(item.clone());
                }
            }
            "symbol" => parent_sections.push(rename_section(item, parent_name, child_name)),
            other => {
                if !child_keys.contains(other) {
                    merged_items.push(item.clone());
                }
            }
        }
    }

    merged_items.extend(child_props);
    if child_sections.is_empty() {
        merged_items.extend(parent_sections);
    } else {
        merged_items.extend(child_sections);
    }
    Sexpr::List(merged_items)
}

fn rename_section(section: &Sexpr, parent_name: &str, child_name: &str) -> Sexpr {
    let mut section = section.clone();
    if let Some(Sexpr::String(name) | Sexpr::Symbol(name)) =
        section.as_list_mut().and_then(|items| items.get_mut(1))
    {
        if let Some(suffix) = name.strip_prefix(parent_name) {
            *name = format!("{child_name}{suffix}");
        }
    }
    section
}
