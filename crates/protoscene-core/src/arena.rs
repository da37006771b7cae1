// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Generational slot arena shared by template bodies and the live world.
use protoscene_values::NodeId;

/// Slot arena addressed by [`NodeId`].
///
/// Slot 0 is the nil sentinel. Removing a node bumps the slot generation so
/// stale ids stop resolving. Slots can also be *reserved*: the id is handed
/// out before the value exists, which lets a cloner point self-references at a
/// node it is still building.
#[derive(Debug, Clone)]
pub struct NodeArena<T> {
    slots: Vec<Option<T>>,
    generations: Vec<u32>,
    free: Vec<u32>,
}

impl<T> Default for NodeArena<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> NodeArena<T> {
    /// Empty arena with only the nil slot.
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: vec![None],
            generations: vec![0],
            free: Vec::new(),
        }
    }

    fn next_slot(&mut self) -> NodeId {
        if let Some(index) = self.free.pop() {
            return NodeId::from_parts(index, self.generations[index as usize]);
        }
        let index = u32::try_from(self.slots.len()).unwrap_or(u32::MAX);
        self.slots.push(None);
        self.generations.push(0);
        NodeId::from_parts(index, 0)
    }

    fn live_index(&self, id: NodeId) -> Option<usize> {
        let index = id.index() as usize;
        (!id.is_nil()
            && index < self.slots.len()
            && self.generations[index] == id.generation())
        .then_some(index)
    }

    /// Stores `value` in a fresh or recycled slot.
    pub fn insert(&mut self, value: T) -> NodeId {
        let id = self.next_slot();
        self.slots[id.index() as usize] = Some(value);
        id
    }

    /// Hands out an id whose value will be supplied later with [`fill`](Self::fill).
    pub fn reserve(&mut self) -> NodeId {
        self.next_slot()
    }

    /// Supplies the value of a reserved slot. Gives `value` back when `id` is
    /// stale or already filled.
    pub fn fill(&mut self, id: NodeId, value: T) -> Result<(), T> {
        match self.live_index(id) {
            Some(index) if self.slots[index].is_none() => {
                self.slots[index] = Some(value);
                Ok(())
            }
            _ => Err(value),
        }
    }

    /// Returns a reserved but never filled slot to the free list.
    pub fn unreserve(&mut self, id: NodeId) {
        if let Some(index) = self.live_index(id) {
            if self.slots[index].is_none() {
                self.generations[index] = self.generations[index].wrapping_add(1);
                self.free.push(id.index());
            }
        }
    }

    /// Borrows a live value.
    pub fn get(&self, id: NodeId) -> Option<&T> {
        self.live_index(id).and_then(|i| self.slots[i].as_ref())
    }

    /// Mutably borrows a live value.
    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut T> {
        self.live_index(id).and_then(|i| self.slots[i].as_mut())
    }

    /// Removes a live value, invalidating `id`.
    pub fn remove(&mut self, id: NodeId) -> Option<T> {
        let index = self.live_index(id)?;
        let removed = self.slots[index].take()?;
        self.generations[index] = self.generations[index].wrapping_add(1);
        self.free.push(id.index());
        Some(removed)
    }

    /// `true` when `id` names a live, filled slot.
    pub fn contains(&self, id: NodeId) -> bool {
        self.get(id).is_some()
    }

    /// Live values with their ids, in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &T)> {
        self.slots
            .iter()
            .zip(&self.generations)
            .enumerate()
            .skip(1)
            .filter_map(|(index, (slot, &generation))| {
                let index = u32::try_from(index).ok()?;
                slot.as_ref()
                    .map(|value| (NodeId::from_parts(index, generation), value))
            })
    }

    /// Live values, mutably, in slot order.
    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.slots.iter_mut().skip(1).filter_map(Option::as_mut)
    }

    /// Number of live values.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    /// `true` when no slot holds a value.
    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }
}
