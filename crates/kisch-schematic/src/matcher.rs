//! Reconcile the in-memory document with a copy edited elsewhere.
//!
//! Merging runs in three phases, each a plain function over the two trees:
//! [`match_entities`] pairs top-level entities, [`classify`] compares each
//! pair against the fingerprints taken when the document was last read or
//! written, and [`apply`] builds the merged tree on top of the disk copy.

use crate::edit::{self, entity_uuid, field, property};
use crate::error::SchematicError;
use crate::schematic::{entity_nodes, Schematic, TRAILING_SECTIONS};
use crate::units::{Mm, Point};
use kisch_sexpr::{NodeId, Sexpr, Tree};
use serde::Serialize;
use std::collections::{HashMap, HashSet, VecDeque};
use std::fs;
use std::path::Path;
use uuid::Uuid;

/// Components closer than this are considered to be at the same place.
const POSITION_TOLERANCE: Mm = Mm::from_units(100);

/// How to resolve entities changed on both sides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum MergePolicy {
    /// Fail with [`SchematicError::MergeConflict`]
    #[default]
    Report,
    PreferModel,
    PreferDisk,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum MergeOutcome {
    Unchanged,
    ModelChanged,
    DiskChanged,
    /// Changed on both sides
    BothChanged,
    /// Only on disk, kept
    DiskOnly,
    /// Only in memory, appended
    ModelOnly,
    /// Removed in memory and unchanged on disk, dropped
    ModelRemoved,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MergeEntry {
    pub uuid: Uuid,
    /// Head of the entity (`symbol`, `wire`, ...)
    pub kind: String,
    pub outcome: MergeOutcome,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MergeReport {
    pub entries: Vec<MergeEntry>,
    /// Entities changed on both sides, resolved by the policy
    pub conflicts: Vec<Uuid>,
}

impl MergeReport {
    pub fn count(&self, outcome: MergeOutcome) -> usize {
        self.entries.iter().filter(|e| e.outcome == outcome).count()
    }

    pub fn outcome(&self, uuid: &Uuid) -> Option<MergeOutcome> {
        self.entries
            .iter()
            .find(|e| e.uuid == *uuid)
            .map(|e| e.outcome)
    }

    pub fn has_conflicts(&self) -> bool {
        !self.conflicts.is_empty()
    }
}

/// Identity of a placed symbol independent of its UUID.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct CanonicalKey {
    lib_id: String,
    value: String,
    footprint: String,
    position: Point,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum MatchKey {
    Component(CanonicalKey),
    /// Token text without the uuid, for everything else
    Content(String),
}

#[derive(Debug, Clone)]
pub(crate) struct Entity {
    pub(crate) uuid: Uuid,
    pub(crate) node: NodeId,
    pub(crate) kind: String,
    pub(crate) fingerprint: String,
    pub(crate) key: MatchKey,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Pairing {
    Both { model: usize, disk: usize },
    ModelOnly(usize),
    DiskOnly(usize),
}

/// Compact token text of an entity with its own `(uuid ...)` removed.
pub(crate) fn fingerprint(tree: &Tree, node: NodeId) -> String {
    let mut sexpr = tree.to_sexpr(node);
    if let Some(items) = sexpr.as_list_mut() {
        items.retain(|item| item.head() != Some("uuid"));
    }
    sexpr.to_compact_string()
}

pub(crate) fn fingerprints(tree: &Tree) -> HashMap<Uuid, String> {
    entity_nodes(tree)
        .into_iter()
        .filter_map(|node| Some((entity_uuid(tree, node)?, fingerprint(tree, node))))
        .collect()
}

pub(crate) fn collect_entities(tree: &Tree) -> Vec<Entity> {
    entity_nodes(tree)
        .into_iter()
        .filter_map(|node| {
            let uuid = entity_uuid(tree, node)?;
            let kind = tree.head(node)?.to_string();
            let fingerprint = fingerprint(tree, node);
            let key = if kind == "symbol" {
                MatchKey::Component(CanonicalKey {
                    lib_id: field(tree, node, "lib_id").unwrap_or_default().to_string(),
                    value: property(tree, node, "Value").unwrap_or_default().to_string(),
                    footprint: property(tree, node, "Footprint")
                        .unwrap_or_default()
                        .to_string(),
                    position: edit::at_point(tree, node)
                        .unwrap_or_default()
                        .round_to(POSITION_TOLERANCE),
                })
            } else {
                MatchKey::Content(fingerprint.clone())
            };
            Some(Entity {
                uuid,
                node,
                kind,
                fingerprint,
                key,
            })
        })
        .collect()
}

/// Pair entities by UUID, then by [`MatchKey`] among the leftovers.
///
/// Pairs and disk-only entities come in disk order, followed by
/// model-only entities in model order.
pub(crate) fn match_entities(model: &[Entity], disk: &[Entity]) -> Vec<Pairing> {
    let disk_by_uuid: HashMap<Uuid, usize> =
        disk.iter().enumerate().map(|(i, e)| (e.uuid, i)).collect();
    let mut disk_match: Vec<Option<usize>> = vec![None; disk.len()];
    let mut model_matched = vec![false; model.len()];

    for (m, entity) in model.iter().enumerate() {
        if let Some(&d) = disk_by_uuid.get(&entity.uuid) {
            disk_match[d] = Some(m);
            model_matched[m] = true;
        }
    }

    let mut by_key: HashMap<&MatchKey, VecDeque<usize>> = HashMap::new();
    for (d, entity) in disk.iter().enumerate() {
        if disk_match[d].is_none() {
            by_key.entry(&entity.key).or_default().push_back(d);
        }
    }
    for (m, entity) in model.iter().enumerate() {
        if model_matched[m] {
            continue;
        }
        if let Some(d) = by_key.get_mut(&entity.key).and_then(VecDeque::pop_front) {
            log::debug!(
                "Matched {} {} to {} by content",
                entity.kind,
                entity.uuid,
                disk[d].uuid
            );
            disk_match[d] = Some(m);
            model_matched[m] = true;
        }
    }

    let mut pairings: Vec<Pairing> = disk_match
        .iter()
        .enumerate()
        .map(|(d, m)| match m {
            Some(m) => Pairing::Both { model: *m, disk: d },
            None => Pairing::DiskOnly(d),
        })
        .collect();
    pairings.extend(
        model_matched
            .iter()
            .enumerate()
            .filter(|(_, matched)| !**matched)
            .map(|(m, _)| Pairing::ModelOnly(m)),
    );
    pairings
}

/// Decide what happened to each pair since the baseline.
pub(crate) fn classify(
    pairings: &[Pairing],
    model: &[Entity],
    disk: &[Entity],
    baseline: &HashMap<Uuid, String>,
    removed: &HashSet<Uuid>,
) -> Vec<(Pairing, MergeOutcome)> {
    pairings
        .iter()
        .map(|&pairing| {
            let outcome = match pairing {
                Pairing::Both { model: m, disk: d } => {
                    let (model, disk) = (&model[m], &disk[d]);
                    let base = baseline
                        .get(&model.uuid)
                        .or_else(|| baseline.get(&disk.uuid));
                    if model.fingerprint == disk.fingerprint {
                        MergeOutcome::Unchanged
                    } else {
                        match base {
                            None => MergeOutcome::BothChanged,
                            Some(base) => {
                                match (*base != model.fingerprint, *base != disk.fingerprint) {
                                    (false, false) => MergeOutcome::Unchanged,
                                    (true, false) => MergeOutcome::ModelChanged,
                                    (false, true) => MergeOutcome::DiskChanged,
                                    (true, true) => MergeOutcome::BothChanged,
                                }
                            }
                        }
                    }
                }
                Pairing::DiskOnly(d) => {
                    let disk = &disk[d];
                    if !removed.contains(&disk.uuid) {
                        MergeOutcome::DiskOnly
                    } else if baseline.get(&disk.uuid) == Some(&disk.fingerprint) {
                        MergeOutcome::ModelRemoved
                    } else {
                        MergeOutcome::BothChanged
                    }
                }
                Pairing::ModelOnly(m) => {
                    let model = &model[m];
                    match baseline.get(&model.uuid) {
                        // Removed on disk since the baseline.
                        Some(base) if *base == model.fingerprint => MergeOutcome::DiskChanged,
                        Some(_) => MergeOutcome::BothChanged,
                        None => MergeOutcome::ModelOnly,
                    }
                }
            };
            (pairing, outcome)
        })
        .collect()
}

/// Build the merged tree on top of `disk_tree`.
pub(crate) fn apply(
    policy: MergePolicy,
    model_tree: &Tree,
    mut disk_tree: Tree,
    classified: &[(Pairing, MergeOutcome)],
    model: &[Entity],
    disk: &[Entity],
) -> Result<Tree, SchematicError> {
    let conflicts: Vec<Uuid> = classified
        .iter()
        .filter(|(_, outcome)| *outcome == MergeOutcome::BothChanged)
        .map(|(pairing, _)| pairing_uuid(*pairing, model, disk))
        .collect();
    if policy == MergePolicy::Report && !conflicts.is_empty() {
        return Err(SchematicError::MergeConflict {
            uuids: conflicts.iter().map(Uuid::to_string).collect(),
        });
    }

    let take_model = |outcome: MergeOutcome| {
        outcome == MergeOutcome::ModelChanged
            || (outcome == MergeOutcome::BothChanged && policy == MergePolicy::PreferModel)
    };

    for &(pairing, outcome) in classified {
        match pairing {
            Pairing::Both { model: m, disk: d } if take_model(outcome) => {
                disk_tree.replace_with_graft(disk[d].node, model_tree, model[m].node);
            }
            Pairing::DiskOnly(d)
                if outcome == MergeOutcome::ModelRemoved
                    || (outcome == MergeOutcome::BothChanged
                        && policy == MergePolicy::PreferModel) =>
            {
                disk_tree.remove(disk[d].node);
            }
            Pairing::ModelOnly(m)
                if outcome == MergeOutcome::ModelOnly || take_model(outcome) =>
            {
                let root = disk_tree.root();
                let index = edit::position_before(&disk_tree, root, TRAILING_SECTIONS);
                disk_tree.graft(root, index, model_tree, model[m].node);
            }
            _ => {}
        }
    }

    union_lib_symbols(model_tree, &mut disk_tree);
    Ok(disk_tree)
}

/// Copy `lib_symbols` entries the disk copy lacks.
fn union_lib_symbols(model_tree: &Tree, disk_tree: &mut Tree) {
    let Some(model_lib) = model_tree.child_list(model_tree.root(), "lib_symbols") else {
        return;
    };
    let root = disk_tree.root();
    let disk_lib = match disk_tree.child_list(root, "lib_symbols") {
        Some(node) => node,
        None => {
            let index = edit::position_after(
                disk_tree,
                root,
                &["version", "generator", "generator_version", "uuid", "paper", "title_block"],
            );
            disk_tree.insert_sexpr(root, index, &Sexpr::list(vec![Sexpr::symbol("lib_symbols")]))
        }
    };
    let present: HashSet<String> = disk_tree
        .child_lists(disk_lib, "symbol")
        .into_iter()
        .filter_map(|s| disk_tree.atom_at(s, 1).map(str::to_string))
        .collect();
    for symbol in model_tree.child_lists(model_lib, "symbol") {
        let Some(name) = model_tree.atom_at(symbol, 1) else {
            continue;
        };
        if !present.contains(name) {
            let index = disk_tree.children(disk_lib).len();
            disk_tree.graft(disk_lib, index, model_tree, symbol);
        }
    }
}

fn pairing_uuid(pairing: Pairing, model: &[Entity], disk: &[Entity]) -> Uuid {
    match pairing {
        Pairing::Both { model: m, .. } | Pairing::ModelOnly(m) => model[m].uuid,
        Pairing::DiskOnly(d) => disk[d].uuid,
    }
}

fn report(classified: &[(Pairing, MergeOutcome)], model: &[Entity], disk: &[Entity]) -> MergeReport {
    let mut report = MergeReport::default();
    for &(pairing, outcome) in classified {
        let uuid = pairing_uuid(pairing, model, disk);
        let kind = match pairing {
            Pairing::Both { model: m, .. } | Pairing::ModelOnly(m) => model[m].kind.clone(),
            Pairing::DiskOnly(d) => disk[d].kind.clone(),
        };
        if outcome == MergeOutcome::BothChanged {
            report.conflicts.push(uuid);
        }
        report.entries.push(MergeEntry {
            uuid,
            kind,
            outcome,
        });
    }
    report
}

impl Schematic {
    /// Merge this document with `disk_text`, the same file as edited by
    /// another program since it was loaded or saved.
    ///
    /// On success the document holds the merged result and the disk copy
    /// becomes the new baseline. With [`MergePolicy::Report`] a conflict
    /// leaves the document untouched.
    pub fn merge_from_disk(
        &mut self,
        disk_text: &str,
        policy: MergePolicy,
    ) -> Result<MergeReport, SchematicError> {
        let disk_tree = kisch_sexpr::parse(disk_text)?;
        match disk_tree.head(disk_tree.root()) {
            Some("kicad_sch") => {}
            other => return Err(SchematicError::NotASchematic(other.unwrap_or_default().to_string())),
        }

        let model = collect_entities(&self.tree);
        let disk = collect_entities(&disk_tree);
        let pairings = match_entities(&model, &disk);
        let classified = classify(&pairings, &model, &disk, &self.baseline, &self.removed);
        let report = report(&classified, &model, &disk);
        let disk_baseline: HashMap<Uuid, String> = disk
            .iter()
            .map(|e| (e.uuid, e.fingerprint.clone()))
            .collect();

        let merged = apply(policy, &self.tree, disk_tree, &classified, &model, &disk)?;
        let mut next = Schematic::from_tree(merged)?;
        next.library = self.library.take();
        next.project = std::mem::take(&mut self.project);
        next.path = self.path.take();
        next.baseline = disk_baseline;
        next.removed = std::mem::take(&mut self.removed);
        *self = next;

        log::debug!(
            "Merged {} entities: {} conflict(s), {} from memory, {} from disk",
            report.entries.len(),
            report.conflicts.len(),
            report.count(MergeOutcome::ModelChanged) + report.count(MergeOutcome::ModelOnly),
            report.count(MergeOutcome::DiskChanged) + report.count(MergeOutcome::DiskOnly)
        );
        Ok(report)
    }

    /// [`merge_from_disk`](Self::merge_from_disk) with the contents of `path`.
    pub fn merge_from_path(
        &mut self,
        path: impl AsRef<Path>,
        policy: MergePolicy,
    ) -> Result<MergeReport, SchematicError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| SchematicError::io(path, e))?;
        self.merge_from_disk(&text, policy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kisch_sexpr::parse;

    const BASE: &str = r#"(kicad_sch
	(uuid "00000000-0000-0000-0000-0000000000aa")
	(symbol
		(lib_id "Device:R")
		(at 50.8 50.8 0)
		(uuid "00000000-0000-0000-0000-000000000001")
		(property "Reference" "R1" (at 0 0 0))
		(property "Value" "10k" (at 0 0 0))
	)
	(junction (at 25.4 25.4) (uuid "00000000-0000-0000-0000-000000000002"))
)
"#;

    fn uuid(n: u8) -> Uuid {
        Uuid::parse_str(&format!("00000000-0000-0000-0000-0000000000{n:02x}")).unwrap()
    }

    fn entities(text: &str) -> (Tree, Vec<Entity>) {
        let tree = parse(text).unwrap();
        let entities = collect_entities(&tree);
        (tree, entities)
    }

    #[test]
    fn fingerprint_ignores_uuid_and_layout() {
        let a = parse(r#"(junction (at 1 2) (uuid "x"))"#).unwrap();
        let b = parse("(junction\n\t(at 1 2)\n\t(uuid \"y\")\n)").unwrap();
        assert_eq!(fingerprint(&a, a.root()), fingerprint(&b, b.root()));
        assert_eq!(fingerprint(&a, a.root()), "(junction (at 1 2))");
    }

    #[test]
    fn matches_by_uuid_then_key() {
        let (_, model) = entities(BASE);
        // Same symbol under a new uuid and nudged by less than the tolerance,
        // same junction under a new uuid, and a new wire.
        let disk_text = BASE
            .replace("0000000001\")", "00000000f1\")")
            .replace("(at 50.8 50.8 0)", "(at 50.804 50.8 0)")
            .replace("0000000002\")", "00000000f2\")")
            .replace(
                "\n)\n",
                "\n\t(wire (pts (xy 0 0) (xy 2.54 0)) (uuid \"00000000-0000-0000-0000-0000000000f3\"))\n)\n",
            );
        let (_, disk) = entities(&disk_text);
        let pairings = match_entities(&model, &disk);
        assert_eq!(
            pairings,
            vec![
                Pairing::Both { model: 0, disk: 0 },
                Pairing::Both { model: 1, disk: 1 },
                Pairing::DiskOnly(2),
            ]
        );
    }

    #[test]
    fn unmatched_model_entities_come_last() {
        let (_, model) = entities(BASE);
        let (_, disk) = entities(r#"(kicad_sch (uuid "00000000-0000-0000-0000-0000000000aa"))"#);
        assert_eq!(
            match_entities(&model, &disk),
            vec![Pairing::ModelOnly(0), Pairing::ModelOnly(1)]
        );
    }

    #[test]
    fn classification_against_baseline() {
        let (base_tree, _) = entities(BASE);
        let baseline = fingerprints(&base_tree);
        let (_, model) = entities(&BASE.replace("\"10k\"", "\"22k\""));
        let (_, disk) = entities(&BASE.replace("(at 25.4 25.4)", "(at 27.94 25.4)"));
        let pairings = match_entities(&model, &disk);
        let classified = classify(&pairings, &model, &disk, &baseline, &HashSet::new());
        assert_eq!(
            classified.iter().map(|(_, o)| *o).collect::<Vec<_>>(),
            vec![MergeOutcome::ModelChanged, MergeOutcome::DiskChanged]
        );

        let (_, disk) = entities(&BASE.replace("\"10k\"", "\"47k\""));
        let classified = classify(&pairings, &model, &disk, &baseline, &HashSet::new());
        assert_eq!(classified[0].1, MergeOutcome::BothChanged);
    }

    #[test]
    fn removals_on_either_side() {
        let (base_tree, base) = entities(BASE);
        let baseline = fingerprints(&base_tree);

        // Junction removed in memory, untouched on disk.
        let model: Vec<Entity> = base[..1].to_vec();
        let removed: HashSet<Uuid> = [uuid(2)].into_iter().collect();
        let pairings = match_entities(&model, &base);
        let classified = classify(&pairings, &model, &base, &baseline, &removed);
        assert_eq!(classified[1].1, MergeOutcome::ModelRemoved);

        // Junction removed on disk, untouched in memory.
        let pairings = match_entities(&base, &model);
        let classified = classify(&pairings, &base, &model, &baseline, &HashSet::new());
        assert_eq!(classified[1], (Pairing::ModelOnly(1), MergeOutcome::DiskChanged));
    }

    #[test]
    fn apply_reports_or_resolves_conflicts() {
        let (base_tree, _) = entities(BASE);
        let baseline = fingerprints(&base_tree);
        let model_text = BASE.replace("\"10k\"", "\"22k\"");
        let disk_text = BASE.replace("\"10k\"", "\"47k\"");
        let (model_tree, model) = entities(&model_text);
        let (disk_tree, disk) = entities(&disk_text);
        let pairings = match_entities(&model, &disk);
        let classified = classify(&pairings, &model, &disk, &baseline, &HashSet::new());

        let err = apply(
            MergePolicy::Report,
            &model_tree,
            disk_tree.clone(),
            &classified,
            &model,
            &disk,
        )
        .unwrap_err();
        assert!(matches!(err, SchematicError::MergeConflict { uuids } if uuids == vec![uuid(1).to_string()]));

        let merged = apply(
            MergePolicy::PreferModel,
            &model_tree,
            disk_tree.clone(),
            &classified,
            &model,
            &disk,
        )
        .unwrap();
        assert_eq!(merged.to_string(), model_text);

        let merged = apply(
            MergePolicy::PreferDisk,
            &model_tree,
            disk_tree,
            &classified,
            &model,
            &disk,
        )
        .unwrap();
        assert_eq!(merged.to_string(), disk_text);
    }

    #[test]
    fn merge_report_counts() {
        let mut sch = Schematic::parse(BASE).unwrap();
        let disk_text = BASE.replace(
            "\n)\n",
            "\n\t(no_connect (at 12.7 12.7) (uuid \"00000000-0000-0000-0000-0000000000f3\"))\n)\n",
        );
        let report = sch.merge_from_disk(&disk_text, MergePolicy::Report).unwrap();
        assert_eq!(report.count(MergeOutcome::Unchanged), 2);
        assert_eq!(report.outcome(&uuid(0xf3)), Some(MergeOutcome::DiskOnly));
        assert!(!report.has_conflicts());
        assert_eq!(sch.to_string(), disk_text);
        assert_eq!(sch.no_connects(), vec![Point::mm(12.7, 12.7)]);
    }

    #[test]
    fn merge_keeps_project_path_and_library() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("board.kicad_sch");
        std::fs::write(&path, BASE).unwrap();

        let library = std::sync::Arc::new(kisch_eda::SymbolLibraryCache::new(
            kisch_eda::LibraryConfig::with_paths(Vec::<std::path::PathBuf>::new()),
        ));
        let mut sch = Schematic::load(&path).unwrap().with_library(library);
        sch.set_project("board");
        sch.merge_from_path(&path, MergePolicy::Report).unwrap();

        assert_eq!(sch.project(), "board");
        assert_eq!(sch.path(), Some(path.as_path()));
        assert!(sch.library().is_some());
    }
}
