// Copyright 2024 Saptak Santra
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Sparse entity index: id -> (archetype, row) with generational
//! liveness.
//!
//! Destroyed indices are recycled through a free list with a bumped
//! generation, so stale handles fail the liveness check instead of
//! aliasing the new occupant. An id can also be allocated without a
//! record: such "reserved" ids (deferred spawns, freshly drawn ids) are
//! not alive until a record is installed.

use crate::archetype::ArchetypeId;
use crate::entity::{EntityId, WILDCARD_INDEX};

/// Where a live entity is stored.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EntityRecord {
    pub archetype: ArchetypeId,
    /// Global row inside the archetype; chunk and slot derive from it.
    pub row: u32,
}

struct Slot {
    generation: u16,
    record: Option<EntityRecord>,
}

/// Sparse-set index over all entity ids a world ever issued.
#[derive(Default)]
pub struct EntityIndex {
    slots: Vec<Slot>,
    free: Vec<u32>,
    alive: usize,
    recycled: usize,
}

impl EntityIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Draw a fresh id. The slot has no record yet and is not alive
    /// until [`set_record`](Self::set_record) installs one; deferred
    /// spawns stay in this reserved state until the merge.
    pub fn alloc(&mut self) -> EntityId {
        if let Some(index) = self.free.pop() {
            self.recycled += 1;
            return EntityId::new(index, self.slots[index as usize].generation);
        }
        let index = self.slots.len() as u32;
        assert!(index < WILDCARD_INDEX, "entity index space exhausted");
        self.slots.push(Slot {
            generation: 0,
            record: None,
        });
        EntityId::new(index, 0)
    }

    /// Claim a caller-chosen id. Fails if the index is already live.
    /// The slot's generation is overwritten with the id's so the handle
    /// round-trips.
    pub fn alloc_at(&mut self, id: EntityId) -> Result<EntityId, EntityId> {
        let index = id.index();
        assert!(index < WILDCARD_INDEX, "reserved index");
        while self.slots.len() <= index as usize {
            let filler = self.slots.len() as u32;
            self.slots.push(Slot {
                generation: 0,
                record: None,
            });
            if filler != index {
                self.free.push(filler);
            }
        }
        let slot = &mut self.slots[index as usize];
        if slot.record.is_some() {
            return Err(EntityId::new(index, slot.generation));
        }
        // Explicit allocation may hit a recycled index
        self.free.retain(|&f| f != index);
        slot.generation = id.generation();
        Ok(id)
    }

    /// Install or update the record for a live (or reserved) id.
    pub fn set_record(&mut self, id: EntityId, record: EntityRecord) {
        let slot = &mut self.slots[id.index() as usize];
        debug_assert_eq!(slot.generation, id.generation(), "stale handle");
        if slot.record.is_none() {
            self.alive += 1;
        }
        slot.record = Some(record);
    }

    /// Patch only the row (swap-remove moved the entity within its
    /// archetype).
    pub fn set_row(&mut self, id: EntityId, row: u32) {
        if let Some(slot) = self.slots.get_mut(id.index() as usize) {
            if let Some(record) = slot.record.as_mut() {
                record.row = row;
            }
        }
    }

    /// The record of a live id, or `None` when the handle is stale or
    /// the id was never materialized.
    pub fn record(&self, id: EntityId) -> Option<EntityRecord> {
        let slot = self.slots.get(id.index() as usize)?;
        if slot.generation != id.generation() {
            return None;
        }
        slot.record
    }

    pub fn is_alive(&self, id: EntityId) -> bool {
        self.record(id).is_some()
    }

    /// Release the id: drop the record, bump the generation, and queue
    /// the index for recycling.
    pub fn free(&mut self, id: EntityId) {
        let slot = &mut self.slots[id.index() as usize];
        debug_assert_eq!(slot.generation, id.generation(), "stale handle");
        debug_assert!(slot.record.is_some());
        slot.record = None;
        slot.generation = slot.generation.wrapping_add(1);
        self.alive -= 1;
        self.free.push(id.index());
    }

    /// Full current handle for a bare slot index (pair halves store only
    /// the index).
    pub fn current(&self, index: u32) -> Option<EntityId> {
        let slot = self.slots.get(index as usize)?;
        slot.record?;
        Some(EntityId::new(index, slot.generation))
    }

    /// All live ids with their records, in index order.
    pub fn iter_alive(&self) -> impl Iterator<Item = (EntityId, EntityRecord)> + '_ {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.record
                .map(|record| (EntityId::new(index as u32, slot.generation), record))
        })
    }

    /// Live entity count.
    pub fn len(&self) -> usize {
        self.alive
    }

    pub fn is_empty(&self) -> bool {
        self.alive == 0
    }

    /// How many allocations reused a freed index.
    pub fn recycled_count(&self) -> usize {
        self.recycled
    }

    /// Bytes used by the sparse slot array (diagnostics).
    pub fn memory_bytes(&self) -> usize {
        self.slots.capacity() * std::mem::size_of::<Slot>()
            + self.free.capacity() * std::mem::size_of::<u32>()
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.free.clear();
        self.alive = 0;
        self.recycled = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> EntityRecord {
        EntityRecord {
            archetype: ArchetypeId::EMPTY,
            row: 0,
        }
    }

    #[test]
    fn test_reserved_until_record() {
        let mut index = EntityIndex::new();
        let id = index.alloc();
        assert!(!index.is_alive(id));
        index.set_record(id, record());
        assert!(index.is_alive(id));
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_recycle_bumps_generation() {
        let mut index = EntityIndex::new();
        let a = index.alloc();
        index.set_record(a, record());
        index.free(a);

        let b = index.alloc();
        index.set_record(b, record());

        assert_eq!(a.index(), b.index());
        assert_ne!(a, b);
        assert!(!index.is_alive(a));
        assert!(index.is_alive(b));
        assert_eq!(index.recycled_count(), 1);
    }

    #[test]
    fn test_alloc_at_conflicts_with_live() {
        let mut index = EntityIndex::new();
        let id = EntityId::new(10, 0);
        assert!(index.alloc_at(id).is_ok());
        index.set_record(id, record());
        assert!(index.alloc_at(id).is_err());

        // The gap below 10 is allocatable
        let fresh = index.alloc();
        assert!(fresh.index() < 10);
    }

    #[test]
    fn test_current_resolves_generation() {
        let mut index = EntityIndex::new();
        let a = index.alloc();
        index.set_record(a, record());
        index.free(a);
        let b = index.alloc();
        index.set_record(b, record());

        assert_eq!(index.current(b.index()), Some(b));
        assert_ne!(index.current(a.index()), Some(a));
    }
}
