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

//! Archetype storage: one node of the archetype graph.
//!
//! An archetype is the canonical home of every entity with one exact
//! component set. Rows are stored across fixed-capacity chunks with a
//! dense-prefix layout: every chunk is full except the last, so row `r`
//! lives in chunk `r >> CHUNK_SHIFT` at slot `r & (CHUNK_CAPACITY - 1)`.
//!
//! Graph edges memoize single-component transitions: `edges_add[c]` is
//! the archetype whose signature is this one plus `c`, and symmetrically
//! for `edges_remove`. Archetypes are owned by the world's arena and
//! referenced by stable [`ArchetypeId`] indices, never pointers.

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::chunk::{Chunk, CHUNK_CAPACITY};
use crate::component::{ColumnSpec, ComponentInfo};
use crate::entity::EntityId;
use crate::type_index::signature_hash;

const CHUNK_SHIFT: u32 = CHUNK_CAPACITY.trailing_zeros();
const CHUNK_MASK: usize = CHUNK_CAPACITY - 1;

/// Stable index of an archetype in the world's arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ArchetypeId(u32);

impl ArchetypeId {
    /// The root archetype (empty signature).
    pub const EMPTY: ArchetypeId = ArchetypeId(0);

    pub const fn new(index: usize) -> Self {
        Self(index as u32)
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Sorted component set identifying an archetype.
pub type Signature = SmallVec<[ComponentInfo; 8]>;

/// Structure-of-arrays storage for one exact component set.
pub struct Archetype {
    id: ArchetypeId,
    signature: Signature,
    hash: u64,
    /// Component id -> column index; tags own no column and are absent.
    lookup: FxHashMap<EntityId, usize>,
    specs: Vec<ColumnSpec>,
    chunks: Vec<Chunk>,
    count: usize,
    edges_add: FxHashMap<EntityId, ArchetypeId>,
    edges_remove: FxHashMap<EntityId, ArchetypeId>,
}

impl Archetype {
    /// Build an archetype for `signature` (sorted by component id).
    /// `specs` carries one column layout per sized signature entry, in
    /// signature order.
    pub fn new(id: ArchetypeId, signature: Signature, specs: Vec<ColumnSpec>) -> Self {
        debug_assert!(signature.windows(2).all(|w| w[0].id < w[1].id));
        debug_assert_eq!(
            signature.iter().filter(|c| !c.is_tag()).count(),
            specs.len()
        );

        let mut lookup = FxHashMap::default();
        let mut column = 0;
        for info in &signature {
            if !info.is_tag() {
                lookup.insert(info.id, column);
                column += 1;
            }
        }
        let hash = signature_hash(&signature);

        Self {
            id,
            signature,
            hash,
            lookup,
            specs,
            chunks: Vec::new(),
            count: 0,
            edges_add: FxHashMap::default(),
            edges_remove: FxHashMap::default(),
        }
    }

    pub fn id(&self) -> ArchetypeId {
        self.id
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// Rolling hash of the signature; xor with a component hash yields
    /// the neighbor signature's hash.
    pub fn signature_hash(&self) -> u64 {
        self.hash
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    /// Exact (numeric) membership test.
    pub fn contains(&self, id: EntityId) -> bool {
        self.signature
            .binary_search_by(|probe| probe.id.cmp(&id))
            .is_ok()
    }

    /// Wildcard-aware membership test for pair patterns.
    pub fn contains_match(&self, pattern: EntityId) -> bool {
        if pattern.is_pair()
            && (pattern.pair_first() == crate::entity::WILDCARD_INDEX
                || pattern.pair_second() == crate::entity::WILDCARD_INDEX)
        {
            return self.signature.iter().any(|c| c.id.matches(pattern));
        }
        self.contains(pattern)
    }

    /// Column index for a sized component id; tags and absent ids yield
    /// `None`.
    pub fn column_index(&self, id: EntityId) -> Option<usize> {
        self.lookup.get(&id).copied()
    }

    /// Signature-order targets of pairs whose first half is `kind`.
    pub fn pair_targets(&self, kind: u32) -> impl Iterator<Item = u32> + '_ {
        self.signature
            .iter()
            .filter(move |c| c.id.is_pair() && c.id.pair_first() == kind)
            .map(|c| c.id.pair_second())
    }

    pub fn edge_add(&self, component: EntityId) -> Option<ArchetypeId> {
        self.edges_add.get(&component).copied()
    }

    pub fn edge_remove(&self, component: EntityId) -> Option<ArchetypeId> {
        self.edges_remove.get(&component).copied()
    }

    pub(crate) fn set_edge_add(&mut self, component: EntityId, target: ArchetypeId) {
        self.edges_add.insert(component, target);
    }

    pub(crate) fn set_edge_remove(&mut self, component: EntityId, target: ArchetypeId) {
        self.edges_remove.insert(component, target);
    }

    fn split_row(row: usize) -> (usize, usize) {
        (row >> CHUNK_SHIFT, row & CHUNK_MASK)
    }

    pub fn entity_at(&self, row: usize) -> EntityId {
        debug_assert!(row < self.count);
        let (ci, slot) = Self::split_row(row);
        self.chunks[ci].entity_at(slot)
    }

    /// Raw read pointer to a component slot.
    pub(crate) fn component_ptr(&self, row: usize, column: usize) -> *const u8 {
        let (ci, slot) = Self::split_row(row);
        self.chunks[ci].column(column).ptr(slot)
    }

    /// Typed access through the chunk that owns `row`.
    pub fn get<T>(&self, row: usize, column: usize) -> Option<&T> {
        if row >= self.count {
            return None;
        }
        let (ci, slot) = Self::split_row(row);
        self.chunks[ci].get::<T>(column, slot)
    }

    pub fn get_mut<T>(&mut self, row: usize, column: usize) -> Option<&mut T> {
        if row >= self.count {
            return None;
        }
        let (ci, slot) = Self::split_row(row);
        self.chunks[ci].get_mut::<T>(column, slot)
    }

    /// Append a row for `entity`, growing a chunk when the last one is
    /// full. Component values are written by the caller afterwards.
    pub fn push(&mut self, entity: EntityId) -> usize {
        if self.chunks.last().map_or(true, Chunk::is_full) {
            self.chunks.push(Chunk::new(&self.specs));
        }
        let chunk = self.chunks.last_mut().expect("chunk just ensured");
        chunk.push(entity);
        self.count += 1;
        self.count - 1
    }

    /// Remove the row by backfilling from the archetype's last row.
    ///
    /// Inside the last chunk this is a plain swap-with-last; across
    /// chunks the last chunk's tail row is moved into the hole so every
    /// chunk but the last stays full. When `drop_values` is set the
    /// removed row's components are dropped first (destroy path);
    /// migration passes `false` because the values were already moved or
    /// dropped by the copy step.
    ///
    /// Returns the entity that now occupies `row`, if any, so the caller
    /// can patch its record.
    pub fn swap_remove(&mut self, row: usize, drop_values: bool) -> Option<EntityId> {
        debug_assert!(row < self.count);
        let (ci, slot) = Self::split_row(row);
        let (lci, lslot) = Self::split_row(self.count - 1);

        if drop_values {
            self.chunks[ci].drop_slot_values(slot);
        }

        let moved = if ci == lci {
            self.chunks[ci].swap_remove_forget(slot)
        } else {
            // Backfill from the last chunk's tail to keep the prefix dense
            let (head, tail) = self.chunks.split_at_mut(lci);
            let dst = &mut head[ci];
            let src = &mut tail[0];
            let entity = src.entity_at(lslot);
            for column in 0..src.column_count() {
                let size = src.column(column).item_size();
                // SAFETY: distinct chunks, both slots in bounds, columns
                // share the same layout within one archetype
                unsafe {
                    std::ptr::copy_nonoverlapping(
                        src.column(column).ptr(lslot),
                        dst.column_mut(column).ptr_mut(slot),
                        size,
                    );
                }
            }
            dst.set_entity(slot, entity);
            src.pop_forget();
            Some(entity)
        };

        self.count -= 1;
        if self.chunks.last().is_some_and(Chunk::is_empty) {
            self.chunks.pop();
        }
        moved
    }

    /// Bytes-level write into a component slot, dropping the previous
    /// value when `drop_old` is set (the slot already held one).
    ///
    /// # Safety
    /// `bytes` must point at a valid instance of the column's component
    /// type, and ownership of that instance transfers to the column.
    pub(crate) unsafe fn write_component(
        &mut self,
        row: usize,
        column: usize,
        bytes: *const u8,
        drop_old: bool,
    ) {
        let (ci, slot) = Self::split_row(row);
        let col = self.chunks[ci].column_mut(column);
        if drop_old {
            col.drop_in_place(slot);
        }
        std::ptr::copy_nonoverlapping(bytes, col.ptr_mut(slot), col.item_size());
    }

    /// Approximate bytes held by this archetype's chunks (diagnostics).
    pub fn memory_bytes(&self) -> usize {
        let per_chunk: usize = self.specs.iter().map(|s| s.size * CHUNK_CAPACITY).sum::<usize>()
            + CHUNK_CAPACITY * std::mem::size_of::<EntityId>();
        self.chunks.len() * per_chunk
    }

    /// Drop the value stored for one column of `row` (unset path).
    pub(crate) fn drop_component(&mut self, row: usize, column: usize) {
        let (ci, slot) = Self::split_row(row);
        // SAFETY: the value is live and will not be read again
        unsafe { self.chunks[ci].column_mut(column).drop_in_place(slot) };
    }
}

/// Move one row's component data from `src` to `dst` during migration.
///
/// Components present in both signatures are byte-copied (ownership
/// moves with the bytes); sized components only the source has are
/// dropped in place. The caller then calls `src.swap_remove(from_row,
/// false)` to release the hole without double-dropping.
pub(crate) fn transfer_row(
    src: &mut Archetype,
    from_row: usize,
    dst: &mut Archetype,
    to_row: usize,
) {
    let mut di = 0;
    let dst_sig_len = dst.signature.len();
    // Two-pointer merge over the sorted signatures
    for si in 0..src.signature.len() {
        let s = src.signature[si];
        while di < dst_sig_len && dst.signature[di].id < s.id {
            di += 1;
        }
        if s.is_tag() {
            continue;
        }
        let src_col = src.lookup[&s.id];
        if di < dst_sig_len && dst.signature[di].id == s.id {
            let dst_col = dst.lookup[&s.id];
            let ptr = src.component_ptr(from_row, src_col);
            // SAFETY: the slot holds an initialized value whose ownership
            // moves to dst; src releases it with a drop-free swap_remove
            unsafe { dst.write_component(to_row, dst_col, ptr, false) };
        } else {
            src.drop_component(from_row, src_col);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smallvec::smallvec;

    fn sized(idx: u32, size: usize) -> ComponentInfo {
        ComponentInfo {
            id: EntityId::new(idx, 0),
            size,
        }
    }

    fn specs_for(sig: &Signature) -> Vec<ColumnSpec> {
        sig.iter()
            .filter(|c| !c.is_tag())
            .map(|c| ColumnSpec {
                size: c.size,
                drop_fn: None,
            })
            .collect()
    }

    #[test]
    fn test_lookup_skips_tags() {
        let sig: Signature = smallvec![sized(1, 8), sized(2, 0), sized(3, 4)];
        let specs = specs_for(&sig);
        let arch = Archetype::new(ArchetypeId::new(1), sig, specs);

        assert_eq!(arch.column_index(EntityId::new(1, 0)), Some(0));
        assert_eq!(arch.column_index(EntityId::new(2, 0)), None); // tag
        assert_eq!(arch.column_index(EntityId::new(3, 0)), Some(1));
        assert!(arch.contains(EntityId::new(2, 0)));
    }

    #[test]
    fn test_rows_span_chunks() {
        let sig: Signature = smallvec![sized(1, 8)];
        let specs = specs_for(&sig);
        let mut arch = Archetype::new(ArchetypeId::new(1), sig, specs);

        let total = CHUNK_CAPACITY + 3;
        for i in 0..total {
            let row = arch.push(EntityId::new(i as u32, 0));
            assert_eq!(row, i);
            unsafe {
                arch.write_component(row, 0, (i as u64).to_ne_bytes().as_ptr(), false);
            }
        }
        assert_eq!(arch.chunks().len(), 2);
        assert_eq!(arch.len(), total);
        assert_eq!(
            arch.get::<u64>(CHUNK_CAPACITY, 0),
            Some(&(CHUNK_CAPACITY as u64))
        );
    }

    #[test]
    fn test_cross_chunk_swap_remove_backfills_from_tail() {
        let sig: Signature = smallvec![sized(1, 8)];
        let specs = specs_for(&sig);
        let mut arch = Archetype::new(ArchetypeId::new(1), sig, specs);

        let total = CHUNK_CAPACITY + 2;
        for i in 0..total {
            let row = arch.push(EntityId::new(i as u32, 0));
            unsafe {
                arch.write_component(row, 0, (i as u64).to_ne_bytes().as_ptr(), false);
            }
        }

        // Remove a row in the (full) first chunk: the global tail moves in
        let moved = arch.swap_remove(5, false);
        assert_eq!(moved, Some(EntityId::new((total - 1) as u32, 0)));
        assert_eq!(arch.len(), total - 1);
        assert_eq!(arch.entity_at(5), EntityId::new((total - 1) as u32, 0));
        assert_eq!(arch.get::<u64>(5, 0), Some(&((total - 1) as u64)));
        // Every chunk but the last is still full
        assert_eq!(arch.chunks()[0].len(), CHUNK_CAPACITY);
    }

    #[test]
    fn test_empty_tail_chunk_is_released() {
        let sig: Signature = smallvec![sized(1, 8)];
        let specs = specs_for(&sig);
        let mut arch = Archetype::new(ArchetypeId::new(1), sig, specs);

        for i in 0..=CHUNK_CAPACITY {
            let row = arch.push(EntityId::new(i as u32, 0));
            unsafe {
                arch.write_component(row, 0, 0u64.to_ne_bytes().as_ptr(), false);
            }
        }
        assert_eq!(arch.chunks().len(), 2);
        arch.swap_remove(CHUNK_CAPACITY, false);
        assert_eq!(arch.chunks().len(), 1);
    }

    #[test]
    fn test_transfer_preserves_shared_components() {
        let src_sig: Signature = smallvec![sized(1, 8), sized(2, 4)];
        let dst_sig: Signature = smallvec![sized(1, 8)];
        let src_specs = specs_for(&src_sig);
        let dst_specs = specs_for(&dst_sig);
        let mut src = Archetype::new(ArchetypeId::new(1), src_sig, src_specs);
        let mut dst = Archetype::new(ArchetypeId::new(2), dst_sig, dst_specs);

        let e = EntityId::new(9, 0);
        let row = src.push(e);
        unsafe {
            src.write_component(row, 0, 77u64.to_ne_bytes().as_ptr(), false);
            src.write_component(row, 1, 5u32.to_ne_bytes().as_ptr(), false);
        }

        let to_row = dst.push(e);
        transfer_row(&mut src, row, &mut dst, to_row);
        src.swap_remove(row, false);

        assert_eq!(dst.get::<u64>(to_row, 0), Some(&77));
        assert_eq!(src.len(), 0);
    }
}
