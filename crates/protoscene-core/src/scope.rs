// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! DEF-name scopes.
//!
//! Every PROTO instance gets its own child scope, so DEF names inside
//! different instances never collide and everything an instance created can
//! be found (and released) through its scope.
use std::collections::BTreeMap;

use protoscene_values::NodeId;

/// Handle to a scope in a [`World`](crate::World).
///
/// Scopes are recycled once released; the generation keeps a stale handle
/// from reaching the scope that took its slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeId {
    index: u32,
    generation: u32,
}

impl ScopeId {
    /// The world's root scope.
    pub const ROOT: Self = Self {
        index: 0,
        generation: 0,
    };

    /// Slot index of this scope.
    pub const fn index(self) -> u32 {
        self.index
    }
}

#[derive(Debug, Clone)]
struct Scope {
    id: String,
    parent: Option<ScopeId>,
    names: BTreeMap<String, NodeId>,
    members: Vec<NodeId>,
}

impl Scope {
    fn new(id: &str, parent: Option<ScopeId>) -> Self {
        Self {
            id: id.to_owned(),
            parent,
            names: BTreeMap::new(),
            members: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct ScopeTable {
    slots: Vec<Option<Scope>>,
    generations: Vec<u32>,
    free: Vec<u32>,
}

impl ScopeTable {
    pub(crate) fn new() -> Self {
        Self {
            slots: vec![Some(Scope::new("", None))],
            generations: vec![0],
            free: Vec::new(),
        }
    }

    pub(crate) fn create(&mut self, parent: ScopeId, id: &str) -> ScopeId {
        let scope = Scope::new(id, Some(parent));
        if let Some(index) = self.free.pop() {
            self.slots[index as usize] = Some(scope);
            return ScopeId {
                index,
                generation: self.generations[index as usize],
            };
        }
        let index = u32::try_from(self.slots.len()).unwrap_or(u32::MAX);
        self.slots.push(Some(scope));
        self.generations.push(0);
        ScopeId {
            index,
            generation: 0,
        }
    }

    fn live_index(&self, scope: ScopeId) -> Option<usize> {
        let index = scope.index as usize;
        (index < self.slots.len() && self.generations[index] == scope.generation)
            .then_some(index)
    }

    fn get(&self, scope: ScopeId) -> Option<&Scope> {
        self.live_index(scope).and_then(|i| self.slots[i].as_ref())
    }

    fn get_mut(&mut self, scope: ScopeId) -> Option<&mut Scope> {
        self.live_index(scope).and_then(|i| self.slots[i].as_mut())
    }

    /// Records `node` as created in `scope`; a DEF name rebinds any earlier
    /// node of the same name.
    pub(crate) fn register(&mut self, scope: ScopeId, node: NodeId, name: Option<&str>) {
        if let Some(entry) = self.get_mut(scope) {
            entry.members.push(node);
            if let Some(name) = name {
                entry.names.insert(name.to_owned(), node);
            }
        }
    }

    pub(crate) fn forget(&mut self, scope: ScopeId, node: NodeId) {
        if let Some(entry) = self.get_mut(scope) {
            entry.members.retain(|&m| m != node);
            entry.names.retain(|_, &mut m| m != node);
        }
    }

    pub(crate) fn find(&self, scope: ScopeId, name: &str) -> Option<NodeId> {
        self.get(scope)?.names.get(name).copied()
    }

    /// Frees `scope` and hands back the nodes still recorded in it. The root
    /// scope is never freed.
    pub(crate) fn remove(&mut self, scope: ScopeId) -> Vec<NodeId> {
        if scope == ScopeId::ROOT {
            return Vec::new();
        }
        let Some(index) = self.live_index(scope) else {
            return Vec::new();
        };
        let Some(entry) = self.slots[index].take() else {
            return Vec::new();
        };
        self.generations[index] = self.generations[index].wrapping_add(1);
        self.free.push(scope.index);
        entry.members
    }

    pub(crate) fn members(&self, scope: ScopeId) -> &[NodeId] {
        self.get(scope)
            .map_or(&[][..], |entry| entry.members.as_slice())
    }

    pub(crate) fn id(&self, scope: ScopeId) -> Option<&str> {
        self.get(scope).map(|entry| entry.id.as_str())
    }

    pub(crate) fn parent(&self, scope: ScopeId) -> Option<ScopeId> {
        self.get(scope)?.parent
    }

    /// Number of live scopes, the root included.
    pub(crate) fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn child_scopes_keep_names_apart() {
        let mut table = ScopeTable::new();
        let a = table.create(ScopeId::ROOT, "Spinner");
        let b = table.create(ScopeId::ROOT, "Spinner");
        let n1 = NodeId::from_parts(1, 0);
        let n2 = NodeId::from_parts(2, 0);
        table.register(a, n1, Some("T"));
        table.register(b, n2, Some("T"));

        assert_eq!(table.find(a, "T"), Some(n1));
        assert_eq!(table.find(b, "T"), Some(n2));
        assert_eq!(table.find(ScopeId::ROOT, "T"), None);
        assert_eq!(table.parent(a), Some(ScopeId::ROOT));
        assert_eq!(table.id(b), Some("Spinner"));

        assert_eq!(table.remove(a), vec![n1]);
        assert!(table.members(a).is_empty());
        assert_eq!(table.find(a, "T"), None);
        assert_eq!(table.id(a), None);
    }

    #[test]
    fn removed_scopes_recycle_with_a_new_generation() {
        let mut table = ScopeTable::new();
        let a = table.create(ScopeId::ROOT, "A");
        table.register(a, NodeId::from_parts(1, 0), Some("N"));
        table.remove(a);
        assert_eq!(table.len(), 1);

        let b = table.create(ScopeId::ROOT, "B");
        assert_eq!(b.index(), a.index());
        assert_ne!(a, b);
        assert_eq!(table.find(a, "N"), None);
        assert!(table.remove(a).is_empty());
        assert_eq!(table.id(b), Some("B"));

        assert!(table.remove(ScopeId::ROOT).is_empty());
        assert_eq!(table.id(ScopeId::ROOT), Some(""));
    }
}
