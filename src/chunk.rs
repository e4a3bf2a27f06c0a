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

//! Fixed-capacity column chunks.
//!
//! A chunk holds up to [`CHUNK_CAPACITY`] entity slots and one dense
//! type-erased array per sized component. Slots past the live count hold
//! garbage and are never read. Tags own no column.

use crate::component::ColumnSpec;
use crate::entity::EntityId;

/// Entities per chunk. Must be a power of two so archetype rows can be
/// split with a shift and a mask.
pub const CHUNK_CAPACITY: usize = 4096;

const _: () = assert!(CHUNK_CAPACITY.is_power_of_two());

/// Type-erased component array of exactly [`CHUNK_CAPACITY`] slots,
/// allocated once when the chunk is built.
pub struct Column {
    data: Vec<u8>,
    size: usize,
    drop_fn: Option<unsafe fn(*mut u8)>,
}

impl Column {
    fn new(spec: &ColumnSpec) -> Self {
        debug_assert!(spec.size > 0, "tags have no column");
        let bytes = CHUNK_CAPACITY * spec.size;
        let mut data = Vec::with_capacity(bytes);
        // SAFETY: u8 has no validity invariant; slots are written through
        // ptr_mut before they are ever read, and the chunk's live count
        // bounds every read.
        unsafe { data.set_len(bytes) };
        Self {
            data,
            size: spec.size,
            drop_fn: spec.drop_fn,
        }
    }

    /// Payload size of one slot.
    pub fn item_size(&self) -> usize {
        self.size
    }

    pub(crate) fn ptr(&self, slot: usize) -> *const u8 {
        debug_assert!(slot < CHUNK_CAPACITY);
        // SAFETY: slot is within the fixed allocation
        unsafe { self.data.as_ptr().add(slot * self.size) }
    }

    pub(crate) fn ptr_mut(&mut self, slot: usize) -> *mut u8 {
        debug_assert!(slot < CHUNK_CAPACITY);
        // SAFETY: slot is within the fixed allocation
        unsafe { self.data.as_mut_ptr().add(slot * self.size) }
    }

    /// Move the bytes of `src_slot` into `dst_slot`. The previous value
    /// at `dst_slot` must already be dropped or moved out.
    pub(crate) fn move_slot(&mut self, src_slot: usize, dst_slot: usize) {
        if src_slot == dst_slot {
            return;
        }
        let src = self.ptr(src_slot);
        let dst = self.ptr_mut(dst_slot);
        // SAFETY: distinct slots inside one allocation, both in bounds
        unsafe { std::ptr::copy_nonoverlapping(src, dst, self.size) };
    }

    /// Run the component destructor for `slot`.
    ///
    /// # Safety
    /// The slot must hold an initialized value that is not referenced and
    /// will not be read again before being rewritten.
    pub(crate) unsafe fn drop_in_place(&mut self, slot: usize) {
        if let Some(drop_fn) = self.drop_fn {
            drop_fn(self.ptr_mut(slot));
        }
    }
}

/// One block of SoA storage inside an archetype.
pub struct Chunk {
    entities: Vec<EntityId>,
    columns: Vec<Column>,
}

impl Chunk {
    pub fn new(specs: &[ColumnSpec]) -> Self {
        Self {
            entities: Vec::with_capacity(CHUNK_CAPACITY),
            columns: specs.iter().map(Column::new).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.entities.len() == CHUNK_CAPACITY
    }

    pub fn entities(&self) -> &[EntityId] {
        &self.entities
    }

    pub fn entity_at(&self, slot: usize) -> EntityId {
        self.entities[slot]
    }

    pub(crate) fn set_entity(&mut self, slot: usize, entity: EntityId) {
        self.entities[slot] = entity;
    }

    /// Append an entity slot. The caller guarantees the chunk is not full;
    /// component values are written through the columns afterwards.
    pub fn push(&mut self, entity: EntityId) -> usize {
        debug_assert!(!self.is_full());
        self.entities.push(entity);
        self.entities.len() - 1
    }

    pub fn column(&self, index: usize) -> &Column {
        &self.columns[index]
    }

    pub fn column_mut(&mut self, index: usize) -> &mut Column {
        &mut self.columns[index]
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Typed read of one slot. `column` is the archetype's column index
    /// for the component; chunks do not own that mapping.
    pub fn get<T>(&self, column: usize, slot: usize) -> Option<&T> {
        let col = self.columns.get(column)?;
        if slot >= self.entities.len() || col.size != std::mem::size_of::<T>() {
            return None;
        }
        // SAFETY: slot is live (bounded by the entity count), the size
        // matches, and the value was written as a T through ptr_mut
        Some(unsafe { &*(col.ptr(slot) as *const T) })
    }

    /// Typed mutable read of one slot.
    pub fn get_mut<T>(&mut self, column: usize, slot: usize) -> Option<&mut T> {
        let len = self.entities.len();
        let col = self.columns.get_mut(column)?;
        if slot >= len || col.size != std::mem::size_of::<T>() {
            return None;
        }
        // SAFETY: as in `get`, plus exclusive access through &mut self
        Some(unsafe { &mut *(col.ptr_mut(slot) as *mut T) })
    }

    /// Swap the last slot into `slot` for the entity array and every
    /// column, shrinking the chunk by one. The removed slot's values are
    /// NOT dropped; the caller has already dropped or moved them.
    ///
    /// Returns the entity that moved into `slot`, if any, so the entity
    /// index can be patched.
    pub fn swap_remove_forget(&mut self, slot: usize) -> Option<EntityId> {
        let last = self.entities.len() - 1;
        self.entities.swap_remove(slot);
        if slot < last {
            for col in &mut self.columns {
                col.move_slot(last, slot);
            }
            Some(self.entities[slot])
        } else {
            None
        }
    }

    /// Drop every component value stored at `slot` (destroy path).
    pub(crate) fn drop_slot_values(&mut self, slot: usize) {
        debug_assert!(slot < self.entities.len());
        for col in &mut self.columns {
            // SAFETY: slot is live, values were initialized on write
            unsafe { col.drop_in_place(slot) };
        }
    }

    /// Remove the last slot without dropping its values (the bytes were
    /// moved elsewhere first).
    pub(crate) fn pop_forget(&mut self) -> EntityId {
        self.entities.pop().expect("pop on empty chunk")
    }
}

impl Drop for Chunk {
    fn drop(&mut self) {
        let live = self.entities.len();
        for col in &mut self.columns {
            if col.drop_fn.is_some() {
                for slot in 0..live {
                    // SAFETY: slots below the live count are initialized
                    unsafe { col.drop_in_place(slot) };
                }
            }
        }
    }
}
