//! Secondary indices over the entities of a schematic.
//!
//! Every index stores UUIDs, never tree positions, so a structural edit can
//! only invalidate the single `uuid -> node` entry it touches.

use kisch_sexpr::NodeId;
use std::collections::HashMap;
use uuid::Uuid;

/// Which non-unique key to look up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyKind {
    Reference,
    LibId,
    /// Label text
    Net,
}

/// Result of a lookup on a non-unique key.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Lookup {
    #[default]
    Empty,
    One(Uuid),
    Many(Vec<Uuid>),
}

impl Lookup {
    fn from_vec(mut uuids: Vec<Uuid>) -> Self {
        match uuids.len() {
            0 => Lookup::Empty,
            1 => Lookup::One(uuids.remove(0)),
            _ => Lookup::Many(uuids),
        }
    }

    pub fn first(&self) -> Option<Uuid> {
        match self {
            Lookup::Empty => None,
            Lookup::One(uuid) => Some(*uuid),
            Lookup::Many(uuids) => uuids.first().copied(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Lookup::Empty => 0,
            Lookup::One(_) => 1,
            Lookup::Many(uuids) => uuids.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Lookup::Empty)
    }

    pub fn iter(&self) -> impl Iterator<Item = Uuid> + '_ {
        let slice: &[Uuid] = match self {
            Lookup::Empty => &[],
            Lookup::One(uuid) => std::slice::from_ref(uuid),
            Lookup::Many(uuids) => uuids,
        };
        slice.iter().copied()
    }

    pub fn into_vec(self) -> Vec<Uuid> {
        match self {
            Lookup::Empty => Vec::new(),
            Lookup::One(uuid) => vec![uuid],
            Lookup::Many(uuids) => uuids,
        }
    }
}

#[derive(Debug, Clone)]
struct UnitEntry {
    unit: u32,
    seq: u64,
    uuid: Uuid,
}

/// Keys an entity is currently filed under.
#[derive(Debug, Clone, Default)]
struct EntityKeys {
    reference: Option<String>,
    lib_id: Option<String>,
    net: Option<String>,
}

/// UUID, reference, lib_id and net indices for one schematic.
#[derive(Debug, Clone, Default)]
pub struct IndexRegistry {
    nodes: HashMap<Uuid, NodeId>,
    references: HashMap<String, Vec<UnitEntry>>,
    lib_ids: HashMap<String, Vec<Uuid>>,
    nets: HashMap<String, Vec<Uuid>>,
    keys: HashMap<Uuid, EntityKeys>,
    next_seq: u64,
}

impl IndexRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn node(&self, uuid: &Uuid) -> Option<NodeId> {
        self.nodes.get(uuid).copied()
    }

    pub fn contains(&self, uuid: &Uuid) -> bool {
        self.nodes.contains_key(uuid)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Every indexed UUID with its node, in no particular order.
    pub fn entries(&self) -> impl Iterator<Item = (Uuid, NodeId)> + '_ {
        self.nodes.iter().map(|(uuid, node)| (*uuid, *node))
    }

    pub fn get(&self, kind: KeyKind, key: &str) -> Lookup {
        let uuids = match kind {
            KeyKind::Reference => self
                .references
                .get(key)
                .map(|entries| entries.iter().map(|e| e.uuid).collect()),
            KeyKind::LibId => self.lib_ids.get(key).cloned(),
            KeyKind::Net => self.nets.get(key).cloned(),
        };
        Lookup::from_vec(uuids.unwrap_or_default())
    }

    /// Distinct label texts, sorted.
    pub fn net_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.nets.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Register an entity node. Returns `false` if the UUID was already taken.
    pub fn insert_node(&mut self, uuid: Uuid, node: NodeId) -> bool {
        if self.nodes.contains_key(&uuid) {
            return false;
        }
        self.nodes.insert(uuid, node);
        true
    }

    /// Point an existing UUID at a replacement node.
    pub fn rebind_node(&mut self, uuid: Uuid, node: NodeId) {
        self.nodes.insert(uuid, node);
    }

    pub fn insert_component(&mut self, uuid: Uuid, reference: &str, lib_id: &str, unit: u32) {
        let seq = self.next_seq;
        self.next_seq += 1;
        let entries = self.references.entry(reference.to_string()).or_default();
        let pos = entries
            .iter()
            .position(|e| (e.unit, e.seq) > (unit, seq))
            .unwrap_or(entries.len());
        entries.insert(pos, UnitEntry { unit, seq, uuid });
        self.lib_ids
            .entry(lib_id.to_string())
            .or_default()
            .push(uuid);
        let keys = self.keys.entry(uuid).or_default();
        keys.reference = Some(reference.to_string());
        keys.lib_id = Some(lib_id.to_string());
    }

    pub fn insert_label(&mut self, uuid: Uuid, text: &str) {
        self.nets.entry(text.to_string()).or_default().push(uuid);
        self.keys.entry(uuid).or_default().net = Some(text.to_string());
    }

    /// Drop a UUID from every index it is filed under.
    pub fn remove(&mut self, uuid: &Uuid) -> Option<NodeId> {
        let node = self.nodes.remove(uuid);
        let Some(keys) = self.keys.remove(uuid) else {
            return node;
        };
        if let Some(reference) = keys.reference {
            if let Some(entries) = self.references.get_mut(&reference) {
                entries.retain(|e| e.uuid != *uuid);
                if entries.is_empty() {
                    self.references.remove(&reference);
                }
            }
        }
        if let Some(lib_id) = keys.lib_id {
            Self::drop_key(&mut self.lib_ids, *uuid, &lib_id);
        }
        if let Some(net) = keys.net {
            Self::drop_key(&mut self.nets, *uuid, &net);
        }
        node
    }

    /// Move a component to a new reference, keeping its unit ordering.
    pub fn set_reference(&mut self, uuid: Uuid, old: &str, new: &str) {
        let Some(entry) = self.references.get_mut(old).and_then(|entries| {
            let pos = entries.iter().position(|e| e.uuid == uuid)?;
            Some(entries.remove(pos))
        }) else {
            return;
        };
        if self.references.get(old).is_some_and(Vec::is_empty) {
            self.references.remove(old);
        }
        let entries = self.references.entry(new.to_string()).or_default();
        let pos = entries
            .iter()
            .position(|e| (e.unit, e.seq) > (entry.unit, entry.seq))
            .unwrap_or(entries.len());
        entries.insert(pos, entry);
        self.keys.entry(uuid).or_default().reference = Some(new.to_string());
    }

    pub fn set_lib_id(&mut self, uuid: Uuid, old: &str, new: &str) {
        Self::move_key(&mut self.lib_ids, uuid, old, new);
        self.keys.entry(uuid).or_default().lib_id = Some(new.to_string());
    }

    pub fn set_label_text(&mut self, uuid: Uuid, old: &str, new: &str) {
        Self::move_key(&mut self.nets, uuid, old, new);
        self.keys.entry(uuid).or_default().net = Some(new.to_string());
    }

    fn move_key(map: &mut HashMap<String, Vec<Uuid>>, uuid: Uuid, old: &str, new: &str) {
        Self::drop_key(map, uuid, old);
        map.entry(new.to_string()).or_default().push(uuid);
    }

    fn drop_key(map: &mut HashMap<String, Vec<Uuid>>, uuid: Uuid, key: &str) {
        if let Some(uuids) = map.get_mut(key) {
            uuids.retain(|u| *u != uuid);
            if uuids.is_empty() {
                map.remove(key);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(n: usize) -> Vec<Uuid> {
        (0..n).map(|_| Uuid::new_v4()).collect()
    }

    #[test]
    fn references_are_ordered_by_unit() {
        let u = ids(3);
        let mut index = IndexRegistry::new();
        index.insert_component(u[0], "U1", "Amp:LM358", 2);
        index.insert_component(u[1], "U1", "Amp:LM358", 1);
        index.insert_component(u[2], "U1", "Amp:LM358", 3);

        let all = index.get(KeyKind::Reference, "U1");
        assert_eq!(all, Lookup::Many(vec![u[1], u[0], u[2]]));
        assert_eq!(all.first(), Some(u[1]));
        assert_eq!(index.get(KeyKind::LibId, "Amp:LM358").len(), 3);
    }

    #[test]
    fn removal_keeps_other_units() {
        let u = ids(2);
        let mut index = IndexRegistry::new();
        let mut tree = kisch_sexpr::parse("(a (b) (c))").unwrap();
        let b = tree.children(tree.root())[1];
        let c = tree.children(tree.root())[2];
        assert!(index.insert_node(u[0], b));
        assert!(index.insert_node(u[1], c));
        assert!(!index.insert_node(u[1], b));
        index.insert_component(u[0], "U1", "Amp:LM358", 1);
        index.insert_component(u[1], "U1", "Amp:LM358", 2);

        assert_eq!(index.remove(&u[0]), Some(b));
        tree.remove(b);
        assert_eq!(index.get(KeyKind::Reference, "U1"), Lookup::One(u[1]));
        assert_eq!(index.node(&u[1]), Some(c));
        assert!(index.get(KeyKind::Reference, "U2").is_empty());
    }

    #[test]
    fn renaming_moves_keys() {
        let u = ids(2);
        let mut index = IndexRegistry::new();
        index.insert_component(u[0], "R1", "Device:R", 1);
        index.insert_component(u[1], "R2", "Device:R", 1);
        index.set_reference(u[1], "R2", "R1");
        assert_eq!(index.get(KeyKind::Reference, "R1").into_vec(), vec![u[0], u[1]]);
        assert!(index.get(KeyKind::Reference, "R2").is_empty());

        index.insert_label(u[0], "SDA");
        index.set_label_text(u[0], "SDA", "SCL");
        assert_eq!(index.net_names(), vec!["SCL"]);
    }

    #[test]
    fn removal_follows_renamed_keys() {
        let u = ids(4);
        let mut index = IndexRegistry::new();
        index.insert_component(u[0], "R1", "Device:R", 1);
        index.insert_component(u[1], "R2", "Device:R", 1);
        index.insert_label(u[2], "SDA");
        index.insert_label(u[3], "SDA");
        index.set_reference(u[1], "R2", "R3");
        index.set_lib_id(u[1], "Device:R", "Device:R_Small");
        index.set_label_text(u[3], "SDA", "SCL");

        index.remove(&u[1]);
        index.remove(&u[3]);
        assert!(index.get(KeyKind::Reference, "R3").is_empty());
        assert!(index.get(KeyKind::LibId, "Device:R_Small").is_empty());
        assert_eq!(index.get(KeyKind::Reference, "R1"), Lookup::One(u[0]));
        assert_eq!(index.get(KeyKind::LibId, "Device:R"), Lookup::One(u[0]));
        assert_eq!(index.get(KeyKind::Net, "SDA"), Lookup::One(u[2]));
        assert_eq!(index.net_names(), vec!["SDA"]);

        index.remove(&u[2]);
        assert!(index.net_names().is_empty());
    }
}
