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

//! Structural mutation: spawn, destroy, set, unset, and the entity
//! migrations they cause.
//!
//! Adding or removing a component moves the entity along a memoized
//! graph edge to the neighbor archetype; the first transition computes
//! the neighbor through the rolling signature hash and installs the
//! edge in both directions. Values of components common to both
//! signatures survive the move.

use smallvec::SmallVec;

#[cfg(feature = "profiling")]
use tracing::info_span;

use crate::archetype::{transfer_row, Archetype, ArchetypeId, Signature};
use crate::command::Command;
use crate::entity::{EntityId, WILDCARD, WILDCARD_INDEX};
use crate::entity_index::EntityRecord;
use crate::error::{EcsError, Result};
use crate::type_index::component_hash;
use crate::world::World;

/// Disjoint mutable access to two arena slots.
fn two_mut(archetypes: &mut [Archetype], a: usize, b: usize) -> (&mut Archetype, &mut Archetype) {
    debug_assert_ne!(a, b);
    if a < b {
        let (head, tail) = archetypes.split_at_mut(b);
        (&mut head[a], &mut tail[0])
    } else {
        let (head, tail) = archetypes.split_at_mut(a);
        (&mut tail[0], &mut head[b])
    }
}

impl World {
    /// Allocate a fresh entity in the root archetype. While deferred the
    /// id is reserved immediately but only becomes alive at merge.
    pub fn spawn(&mut self) -> EntityId {
        #[cfg(feature = "profiling")]
        let span = info_span!("world.spawn", archetype_count = self.archetypes.len());
        #[cfg(feature = "profiling")]
        let _span_guard = span.enter();

        let entity = self.entities.alloc();
        if self.defer_depth > 0 {
            self.commands.push(Command::Spawn { entity });
        } else {
            self.place_in_root(entity);
        }
        entity
    }

    /// Spawn at a caller-chosen id. Fails when the index is already
    /// live; the conflict is reported immediately even in deferred mode.
    pub fn spawn_with(&mut self, id: EntityId) -> Result<EntityId> {
        let entity = self
            .entities
            .alloc_at(id)
            .map_err(EcsError::AlreadyAlive)?;
        if self.defer_depth > 0 {
            self.commands.push(Command::Spawn { entity });
        } else {
            self.place_in_root(entity);
        }
        Ok(entity)
    }

    /// Destroy an entity and everything related to it through `ChildOf`.
    pub fn destroy(&mut self, entity: EntityId) -> Result<()> {
        if self.defer_depth > 0 {
            self.commands.push(Command::Destroy { entity });
            return Ok(());
        }
        self.destroy_now(entity)
    }

    pub(crate) fn place_in_root(&mut self, entity: EntityId) {
        let row = self.archetypes[ArchetypeId::EMPTY.index()].push(entity);
        self.entities.set_record(
            entity,
            EntityRecord {
                archetype: ArchetypeId::EMPTY,
                row: row as u32,
            },
        );
    }

    /// Merge path for a reserved id.
    pub(crate) fn materialize(&mut self, entity: EntityId) -> Result<()> {
        if self.entities.is_alive(entity) {
            return Err(EcsError::AlreadyAlive(entity));
        }
        self.place_in_root(entity);
        Ok(())
    }

    /// Direct destroy: cascade first, then release the row and the id.
    pub(crate) fn destroy_now(&mut self, entity: EntityId) -> Result<()> {
        let record = self
            .entities
            .record(entity)
            .ok_or(EcsError::DeadEntity(entity))?;
        if self.archetypes[record.archetype.index()].contains(self.do_not_delete_id()) {
            return Err(EcsError::ProtectedEntity(entity));
        }

        #[cfg(feature = "profiling")]
        let span = info_span!("world.destroy");
        #[cfg(feature = "profiling")]
        let _span_guard = span.enter();

        self.cascade(entity)?;

        // The cascade may have destroyed this entity (ChildOf cycle) or
        // moved its row; re-resolve before touching storage.
        let Some(record) = self.entities.record(entity) else {
            return Ok(());
        };

        let moved = self.archetypes[record.archetype.index()].swap_remove(record.row as usize, true);
        if let Some(moved) = moved {
            self.entities.set_row(moved, record.row);
        }
        self.entities.free(entity);
        self.fire_on_destroy(entity);
        Ok(())
    }

    /// Delete `ChildOf` dependents transitively and unset every other
    /// pair that mentions `entity` on either side. Matches are queued
    /// first so the scan never observes its own edits.
    fn cascade(&mut self, entity: EntityId) -> Result<()> {
        // Indices past the 28-bit pair range can never appear in a pair
        if entity.index() >= WILDCARD_INDEX {
            return Ok(());
        }
        let child_of = self.child_of_id().index();

        // (*, entity): holders of pairs targeting this entity
        for (holder, pairs) in self.pair_holders(EntityId::pair(WILDCARD, entity)) {
            if holder == entity {
                // Self-referential pair; the row is going away anyway
                continue;
            }
            for pair in pairs {
                if pair.pair_first() == child_of {
                    self.destroy_dependent(holder)?;
                } else if self.entities.is_alive(holder) {
                    self.unset_now(holder, pair)?;
                }
            }
        }

        // (entity, *): pairs using this entity as the relationship kind
        for (holder, pairs) in self.pair_holders(EntityId::pair(entity, WILDCARD)) {
            if holder == entity || !self.entities.is_alive(holder) {
                continue;
            }
            for pair in pairs {
                self.unset_now(holder, pair)?;
            }
        }
        Ok(())
    }

    fn destroy_dependent(&mut self, entity: EntityId) -> Result<()> {
        // Already gone: an earlier branch of the cascade got here first
        if !self.entities.is_alive(entity) {
            return Ok(());
        }
        self.destroy_now(entity)
    }

    /// Snapshot of `(holder, matching pair ids)` for a wildcard pattern.
    fn pair_holders(&self, pattern: EntityId) -> Vec<(EntityId, SmallVec<[EntityId; 2]>)> {
        let mut holders = Vec::new();
        for archetype in &self.archetypes {
            if archetype.is_empty() || !archetype.contains_match(pattern) {
                continue;
            }
            let pairs: SmallVec<[EntityId; 2]> = archetype
                .signature()
                .iter()
                .filter(|c| c.id.matches(pattern))
                .map(|c| c.id)
                .collect();
            for chunk in archetype.chunks() {
                for &holder in chunk.entities() {
                    holders.push((holder, pairs.clone()));
                }
            }
        }
        holders
    }

    /// Core of every set: ensure the component column exists (migrating
    /// if needed) and move the value in. `bytes`/`len` describe an owned
    /// instance whose ownership transfers on success; on error nothing
    /// is consumed.
    pub(crate) fn set_ptr(
        &mut self,
        entity: EntityId,
        component: EntityId,
        bytes: *const u8,
        len: usize,
    ) -> Result<()> {
        let info = self.registry.component_info(component);
        if info.size != len {
            if !component.is_pair() && info.size == 0 && len > 0 {
                return Err(EcsError::UnregisteredComponent(component));
            }
            return Err(EcsError::SizeMismatch {
                component,
                expected: info.size,
                got: len,
            });
        }

        let record = self
            .entities
            .record(entity)
            .ok_or(EcsError::DeadEntity(entity))?;

        if component.is_pair() && self.config().strict_pairs {
            self.check_pair_halves(component)?;
        }

        let already = self.archetypes[record.archetype.index()].contains(component);
        let record = if already {
            record
        } else {
            let target = self.archetype_with(record.archetype, component);
            self.migrate(entity, record, target)
        };

        if info.size > 0 {
            let archetype = &mut self.archetypes[record.archetype.index()];
            let column = archetype
                .column_index(component)
                .expect("sized component has a column");
            // SAFETY: size was validated against the registry; ownership
            // of the value moves into the column, and `already` tells us
            // whether a previous value must be dropped first
            unsafe {
                archetype.write_component(record.row as usize, column, bytes, already);
            }
        }

        self.fire_on_set(entity, component);
        Ok(())
    }

    /// Direct unset. Removing a component the entity does not have is a
    /// no-op, not an error.
    pub(crate) fn unset_now(&mut self, entity: EntityId, component: EntityId) -> Result<()> {
        let record = self
            .entities
            .record(entity)
            .ok_or(EcsError::DeadEntity(entity))?;
        if !self.archetypes[record.archetype.index()].contains(component) {
            return Ok(());
        }
        let target = self.archetype_without(record.archetype, component);
        self.migrate(entity, record, target);
        self.fire_on_unset(entity, component);
        Ok(())
    }

    /// Presence test; `component` may be a wildcard pair pattern.
    pub fn has_id(&self, entity: EntityId, component: EntityId) -> bool {
        self.entities
            .record(entity)
            .is_some_and(|record| self.archetypes[record.archetype.index()].contains_match(component))
    }

    /// Raw bytes of a component's storage slot. Tags yield an empty
    /// slice.
    pub fn component_bytes(&self, entity: EntityId, component: EntityId) -> Result<&[u8]> {
        let record = self
            .entities
            .record(entity)
            .ok_or(EcsError::DeadEntity(entity))?;
        let archetype = &self.archetypes[record.archetype.index()];
        if !archetype.contains(component) {
            return Err(EcsError::MissingComponent { entity, component });
        }
        match archetype.column_index(component) {
            None => Ok(&[]),
            Some(column) => {
                let size = self.registry.component_info(component).size;
                let ptr = archetype.component_ptr(record.row as usize, column);
                // SAFETY: the slot is live and holds `size` initialized
                // bytes; the borrow is tied to &self
                Ok(unsafe { std::slice::from_raw_parts(ptr, size) })
            }
        }
    }

    fn check_pair_halves(&self, pair: EntityId) -> Result<()> {
        for half in [pair.pair_first(), pair.pair_second()] {
            if half == WILDCARD_INDEX {
                return Err(EcsError::UnregisteredComponent(pair));
            }
            if self.entities.current(half).is_none() {
                return Err(EcsError::DeadEntity(EntityId::new(half, 0)));
            }
        }
        Ok(())
    }

    /// Neighbor reached by adding `component`, memoized on the edge.
    fn archetype_with(&mut self, from: ArchetypeId, component: EntityId) -> ArchetypeId {
        if let Some(target) = self.archetypes[from.index()].edge_add(component) {
            return target;
        }

        let info = self.registry.component_info(component);
        let neighbor_hash =
            self.archetypes[from.index()].signature_hash() ^ component_hash(component);

        let archetypes = &self.archetypes;
        let from_arch = &archetypes[from.index()];
        let found = self.type_index.find_with(neighbor_hash, |candidate| {
            let cand = &archetypes[candidate.index()];
            cand.signature().len() == from_arch.signature().len() + 1
                && cand.contains(component)
                && from_arch.signature().iter().all(|c| cand.contains(c.id))
        });

        let target = match found {
            Some(target) => target,
            None => {
                let mut signature: Signature = from_arch.signature().clone();
                let at = signature
                    .binary_search_by(|probe| probe.id.cmp(&component))
                    .unwrap_err();
                signature.insert(at, info);
                self.create_archetype(signature)
            }
        };

        self.archetypes[from.index()].set_edge_add(component, target);
        self.archetypes[target.index()].set_edge_remove(component, from);
        target
    }

    /// Neighbor reached by removing `component`, memoized on the edge.
    fn archetype_without(&mut self, from: ArchetypeId, component: EntityId) -> ArchetypeId {
        if let Some(target) = self.archetypes[from.index()].edge_remove(component) {
            return target;
        }

        let neighbor_hash =
            self.archetypes[from.index()].signature_hash() ^ component_hash(component);

        let archetypes = &self.archetypes;
        let from_arch = &archetypes[from.index()];
        let found = self.type_index.find_with(neighbor_hash, |candidate| {
            let cand = &archetypes[candidate.index()];
            cand.signature().len() + 1 == from_arch.signature().len()
                && cand.signature().iter().all(|c| from_arch.contains(c.id))
                && !cand.contains(component)
        });

        let target = match found {
            Some(target) => target,
            None => {
                let mut signature: Signature = from_arch.signature().clone();
                signature.retain(|c| c.id != component);
                self.create_archetype(signature)
            }
        };

        self.archetypes[from.index()].set_edge_remove(component, target);
        self.archetypes[target.index()].set_edge_add(component, from);
        target
    }

    /// Register a brand-new archetype and wire it into the graph: every
    /// existing archetype whose signature differs by exactly one
    /// component gets a bidirectional edge.
    pub(crate) fn create_archetype(&mut self, signature: Signature) -> ArchetypeId {
        let id = ArchetypeId::new(self.archetypes.len());
        let specs = signature
            .iter()
            .filter(|c| !c.is_tag())
            .map(|c| self.registry.column_spec(*c))
            .collect();
        let mut archetype = Archetype::new(id, signature, specs);
        let hash = archetype.signature_hash();

        for i in 0..archetype.signature().len() {
            let delta = archetype.signature()[i].id;
            let sub_hash = hash ^ component_hash(delta);
            let archetypes = &self.archetypes;
            let new_sig = archetype.signature();
            let sub = self.type_index.find_with(sub_hash, |candidate| {
                let cand = &archetypes[candidate.index()];
                cand.signature().len() + 1 == new_sig.len()
                    && !cand.contains(delta)
                    && cand
                        .signature()
                        .iter()
                        .all(|c| new_sig.binary_search_by(|probe| probe.id.cmp(&c.id)).is_ok())
            });
            if let Some(sub) = sub {
                self.archetypes[sub.index()].set_edge_add(delta, id);
                archetype.set_edge_remove(delta, sub);
            }
        }

        self.type_index.insert(hash, id);
        self.archetypes.push(archetype);
        id
    }

    /// Move an entity between archetypes, carrying the values of shared
    /// components and patching the entity that backfills the hole.
    fn migrate(&mut self, entity: EntityId, record: EntityRecord, target: ArchetypeId) -> EntityRecord {
        if record.archetype == target {
            return record;
        }
        let (src, dst) = two_mut(
            &mut self.archetypes,
            record.archetype.index(),
            target.index(),
        );
        let to_row = dst.push(entity);
        transfer_row(src, record.row as usize, dst, to_row);
        if let Some(moved) = src.swap_remove(record.row as usize, false) {
            self.entities.set_row(moved, record.row);
        }
        let new_record = EntityRecord {
            archetype: target,
            row: to_row as u32,
        };
        self.entities.set_record(entity, new_record);
        new_record
    }
}
