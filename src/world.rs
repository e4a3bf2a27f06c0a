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

//! World: central entity and archetype storage.
//!
//! The world owns the entity index, the archetype arena, the type
//! registry and signature index, the query cache, and the deferred
//! command queue. All typed convenience methods bottom out in the
//! structural mutation paths.

use parking_lot::Mutex;

use crate::archetype::{Archetype, ArchetypeId, Signature};
use crate::command::{Command, CommandBuffer, CommandPayload};
use crate::component::{ChildOf, Component, DoNotDelete, Name, TypeRegistry};
use crate::entity::EntityId;
use crate::entity_index::EntityIndex;
use crate::error::{EcsError, Result};
use crate::hooks::EcsHooks;
use crate::query::{QueryBuilder, QueryCache, QueryCacheStats};

/// Knobs fixed at world construction.
#[derive(Clone, Copy, Debug)]
pub struct WorldConfig {
    /// When set, a pair with a dead half is rejected at set time.
    /// Lenient mode permits dangling halves (load-order patterns).
    pub strict_pairs: bool,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self { strict_pairs: true }
    }
}

/// Diagnostic sink for ops skipped during a deferred merge.
pub type MergeSink = Box<dyn Fn(&EcsError) + Send + Sync>;

/// Central ECS world.
pub struct World {
    config: WorldConfig,
    pub(crate) entities: EntityIndex,
    pub(crate) archetypes: Vec<Archetype>,
    pub(crate) type_index: crate::type_index::TypeIndex,
    pub(crate) registry: TypeRegistry,
    pub(crate) query_cache: Mutex<QueryCache>,
    pub(crate) commands: CommandBuffer,
    pub(crate) defer_depth: u32,
    pub(crate) hooks: Option<Box<dyn EcsHooks>>,
    pub(crate) merge_sink: Option<MergeSink>,
    child_of: EntityId,
    do_not_delete: EntityId,
    name_component: EntityId,
}

impl World {
    pub fn new() -> Self {
        Self::with_config(WorldConfig::default())
    }

    pub fn with_config(config: WorldConfig) -> Self {
        let mut world = Self {
            config,
            entities: EntityIndex::new(),
            archetypes: Vec::with_capacity(32),
            type_index: crate::type_index::TypeIndex::new(),
            registry: TypeRegistry::new(),
            query_cache: Mutex::new(QueryCache::default()),
            commands: CommandBuffer::new(),
            defer_depth: 0,
            hooks: None,
            merge_sink: None,
            child_of: crate::entity::WILDCARD,
            do_not_delete: crate::entity::WILDCARD,
            name_component: crate::entity::WILDCARD,
        };
        world.create_archetype(Signature::new());
        world.register_builtins();
        world
    }

    fn register_builtins(&mut self) {
        self.child_of = self.register::<ChildOf>();
        self.do_not_delete = self.register::<DoNotDelete>();
        self.name_component = self.register::<Name>();
        // Builtin component entities must outlive everything else
        for id in [self.child_of, self.name_component] {
            self.set_id(id, self.do_not_delete, &[])
                .expect("builtin registration");
        }
        self.set_id(self.do_not_delete, self.do_not_delete, &[])
            .expect("builtin registration");
    }

    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    /// Component entity backing the builtin `ChildOf` relationship.
    pub fn child_of_id(&self) -> EntityId {
        self.child_of
    }

    /// Component entity backing the builtin `DoNotDelete` tag.
    pub fn do_not_delete_id(&self) -> EntityId {
        self.do_not_delete
    }

    /// Component entity backing the builtin `Name` component.
    pub fn name_id(&self) -> EntityId {
        self.name_component
    }

    /// Component entity for `T`, registering the type on first use.
    /// Registration is immediate even in deferred mode: it only places
    /// the component entity itself.
    pub fn register<T: Component>(&mut self) -> EntityId {
        if let Some(id) = self.registry.component_id::<T>() {
            return id;
        }
        let entity = self.entities.alloc();
        self.place_in_root(entity);
        self.registry.register_with::<T>(|| entity)
    }

    /// Component entity for `T` without registering.
    pub fn component_id<T: Component>(&self) -> Option<EntityId> {
        self.registry.component_id::<T>()
    }

    pub fn is_alive(&self, entity: EntityId) -> bool {
        self.entities.is_alive(entity)
    }

    // ---- typed set / get / unset -------------------------------------

    /// Set (adding if absent) component `T` on `entity`.
    pub fn set<T: Component>(&mut self, entity: EntityId, value: T) -> Result<()> {
        let component = self.register::<T>();
        self.set_value(entity, component, value)
    }

    /// Set the data pair `(K, V)` on `entity` with `V`'s payload.
    pub fn set_pair<K: Component, V: Component>(
        &mut self,
        entity: EntityId,
        value: V,
    ) -> Result<()> {
        let kind = self.register::<K>();
        let target = self.register::<V>();
        self.set_value(entity, EntityId::pair(kind, target), value)
    }

    /// Add the tag pair `(K, target)` on `entity`.
    pub fn add_pair<K: Component>(&mut self, entity: EntityId, target: EntityId) -> Result<()> {
        let kind = self.register::<K>();
        self.add_pair_id(entity, kind, target)
    }

    /// Dynamic tag pair `(kind, target)`.
    pub fn add_pair_id(
        &mut self,
        entity: EntityId,
        kind: EntityId,
        target: EntityId,
    ) -> Result<()> {
        self.set_id(entity, EntityId::pair(kind, target), &[])
    }

    /// Byte-level set for a dynamic component id. Bytes are copied
    /// verbatim, so this path is for plain-data components and tags;
    /// typed values go through [`set`](World::set).
    pub fn set_id(&mut self, entity: EntityId, component: EntityId, bytes: &[u8]) -> Result<()> {
        if self.defer_depth > 0 {
            self.commands.push(Command::Set {
                entity,
                component,
                payload: CommandPayload::from_bytes(bytes),
            });
            return Ok(());
        }
        self.set_ptr(entity, component, bytes.as_ptr(), bytes.len())
    }

    pub(crate) fn set_value<T: Component>(
        &mut self,
        entity: EntityId,
        component: EntityId,
        value: T,
    ) -> Result<()> {
        if self.defer_depth > 0 {
            self.commands.push(Command::Set {
                entity,
                component,
                payload: CommandPayload::from_value(value),
            });
            return Ok(());
        }
        let value = std::mem::ManuallyDrop::new(value);
        let ptr = (&*value) as *const T as *const u8;
        match self.set_ptr(entity, component, ptr, std::mem::size_of::<T>()) {
            Ok(()) => Ok(()),
            Err(err) => {
                // Ownership did not transfer; reclaim the value
                drop(std::mem::ManuallyDrop::into_inner(value));
                Err(err)
            }
        }
    }

    /// Remove component `T`. Removing an absent component is a no-op.
    pub fn unset<T: Component>(&mut self, entity: EntityId) -> Result<()> {
        match self.component_id::<T>() {
            Some(component) => self.unset_id(entity, component),
            // Never registered: no entity can have it
            None => {
                if self.entities.is_alive(entity) || self.defer_depth > 0 {
                    Ok(())
                } else {
                    Err(EcsError::DeadEntity(entity))
                }
            }
        }
    }

    pub fn unset_id(&mut self, entity: EntityId, component: EntityId) -> Result<()> {
        if self.defer_depth > 0 {
            self.commands.push(Command::Unset { entity, component });
            return Ok(());
        }
        self.unset_now(entity, component)
    }

    /// Remove the tag pair `(K, target)`.
    pub fn remove_pair<K: Component>(&mut self, entity: EntityId, target: EntityId) -> Result<()> {
        match self.component_id::<K>() {
            Some(kind) => self.unset_id(entity, EntityId::pair(kind, target)),
            None => Ok(()),
        }
    }

    pub fn has<T: Component>(&self, entity: EntityId) -> bool {
        self.component_id::<T>()
            .is_some_and(|component| self.has_id(entity, component))
    }

    /// Whether `entity` carries the pair `(K, target)`.
    pub fn has_pair<K: Component>(&self, entity: EntityId, target: EntityId) -> bool {
        self.component_id::<K>()
            .is_some_and(|kind| self.has_id(entity, EntityId::pair(kind, target)))
    }

    pub fn get<T: Component>(&self, entity: EntityId) -> Option<&T> {
        let component = self.component_id::<T>()?;
        let record = self.entities.record(entity)?;
        let archetype = &self.archetypes[record.archetype.index()];
        let column = archetype.column_index(component)?;
        archetype.get::<T>(record.row as usize, column)
    }

    pub fn get_mut<T: Component>(&mut self, entity: EntityId) -> Option<&mut T> {
        let component = self.component_id::<T>()?;
        let record = self.entities.record(entity)?;
        let archetype = &mut self.archetypes[record.archetype.index()];
        let column = archetype.column_index(component)?;
        archetype.get_mut::<T>(record.row as usize, column)
    }

    /// Payload of the data pair `(K, V)`.
    pub fn get_pair<K: Component, V: Component>(&self, entity: EntityId) -> Option<&V> {
        let kind = self.component_id::<K>()?;
        let target = self.component_id::<V>()?;
        let pair = EntityId::pair(kind, target);
        let record = self.entities.record(entity)?;
        let archetype = &self.archetypes[record.archetype.index()];
        let column = archetype.column_index(pair)?;
        archetype.get::<V>(record.row as usize, column)
    }

    // ---- relationships -----------------------------------------------

    /// `n`-th target (in signature order) of pairs with relationship
    /// kind `K` on `entity`.
    pub fn target<K: Component>(&self, entity: EntityId, n: usize) -> Option<EntityId> {
        let kind = self.component_id::<K>()?;
        self.target_id(entity, kind, n)
    }

    pub fn target_id(&self, entity: EntityId, kind: EntityId, n: usize) -> Option<EntityId> {
        let record = self.entities.record(entity)?;
        let archetype = &self.archetypes[record.archetype.index()];
        let index = archetype.pair_targets(kind.index()).nth(n)?;
        self.entities.current(index)
    }

    /// Parent through the builtin `ChildOf` relationship.
    pub fn parent(&self, entity: EntityId) -> Option<EntityId> {
        self.target_id(entity, self.child_of, 0)
    }

    // ---- names -------------------------------------------------------

    /// Spawn an entity carrying the builtin [`Name`] component.
    pub fn spawn_with_name(&mut self, name: &str) -> EntityId {
        let entity = self.spawn();
        let component = self.name_component;
        self.set_value(entity, component, Name(name.to_string()))
            .expect("fresh entity accepts a name");
        entity
    }

    pub fn name(&self, entity: EntityId) -> Option<&str> {
        let record = self.entities.record(entity)?;
        let archetype = &self.archetypes[record.archetype.index()];
        let column = archetype.column_index(self.name_component)?;
        archetype
            .get::<Name>(record.row as usize, column)
            .map(Name::as_str)
    }

    /// Linear lookup of a named entity.
    pub fn lookup(&self, name: &str) -> Option<EntityId> {
        for archetype in &self.archetypes {
            let Some(column) = archetype.column_index(self.name_component) else {
                continue;
            };
            for row in 0..archetype.len() {
                if archetype
                    .get::<Name>(row, column)
                    .is_some_and(|n| n.as_str() == name)
                {
                    return Some(archetype.entity_at(row));
                }
            }
        }
        None
    }

    // ---- queries and iteration ---------------------------------------

    /// Start building a query.
    pub fn query(&mut self) -> QueryBuilder<'_> {
        QueryBuilder::new(self)
    }

    /// Visit every live entity in index order.
    pub fn each(&self, mut f: impl FnMut(EntityId)) {
        for (entity, _) in self.entities.iter_alive() {
            f(entity);
        }
    }

    /// Accessor view for one entity.
    pub fn entity(&self, id: EntityId) -> EntityView<'_> {
        EntityView { world: self, id }
    }

    // ---- hooks and diagnostics ---------------------------------------

    /// Install structural-change hooks. Hooks observe only; structural
    /// reactions go through the deferred queue.
    pub fn set_hooks(&mut self, hooks: Box<dyn EcsHooks>) {
        self.hooks = Some(hooks);
    }

    /// Install the per-op diagnostic sink for deferred merge skips.
    pub fn set_merge_sink(&mut self, sink: MergeSink) {
        self.merge_sink = Some(sink);
    }

    pub(crate) fn fire_on_set(&mut self, entity: EntityId, component: EntityId) {
        if let Some(mut hooks) = self.hooks.take() {
            hooks.on_set(entity, component);
            self.hooks = Some(hooks);
        }
    }

    pub(crate) fn fire_on_unset(&mut self, entity: EntityId, component: EntityId) {
        if let Some(mut hooks) = self.hooks.take() {
            hooks.on_unset(entity, component);
            self.hooks = Some(hooks);
        }
    }

    pub(crate) fn fire_on_destroy(&mut self, entity: EntityId) {
        if let Some(mut hooks) = self.hooks.take() {
            hooks.on_destroy(entity);
            self.hooks = Some(hooks);
        }
    }

    // ---- counters and maintenance ------------------------------------

    /// Live entity count (component entities included).
    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    pub fn archetype_count(&self) -> usize {
        self.archetypes.len()
    }

    pub fn recycled_entity_count(&self) -> usize {
        self.entities.recycled_count()
    }

    pub fn archetype(&self, id: ArchetypeId) -> Option<&Archetype> {
        self.archetypes.get(id.index())
    }

    /// Current (archetype, row) of a live entity.
    pub fn location(&self, entity: EntityId) -> Option<crate::entity_index::EntityRecord> {
        self.entities.record(entity)
    }

    /// Archetype currently housing `entity`.
    pub fn archetype_of(&self, entity: EntityId) -> Option<&Archetype> {
        let record = self.entities.record(entity)?;
        self.archetypes.get(record.archetype.index())
    }

    pub fn query_cache_stats(&self) -> QueryCacheStats {
        let cache = self.query_cache.lock();
        QueryCacheStats {
            num_cached_queries: cache.entries.len(),
            total_cached_archetypes: cache
                .entries
                .values()
                .map(|entry| entry.cached_archetypes())
                .sum(),
            total_archetypes: self.archetypes.len(),
        }
    }

    pub fn clear_query_cache(&self) {
        self.query_cache.lock().entries.clear();
    }

    /// Get memory usage statistics
    pub fn memory_stats(&self) -> MemoryStats {
        let archetype_memory: usize = self.archetypes.iter().map(Archetype::memory_bytes).sum();
        let entity_index_memory = self.entities.memory_bytes();
        MemoryStats {
            entity_index_memory,
            archetype_memory,
            total_memory: archetype_memory + entity_index_memory,
        }
    }

    /// Drop every entity and archetype, keeping config, hooks and sink.
    /// Builtin components are re-registered, so previously obtained
    /// component ids are invalid after this.
    pub fn clear(&mut self) {
        self.entities.clear();
        self.archetypes.clear();
        self.type_index.clear();
        self.registry = TypeRegistry::new();
        self.query_cache.lock().entries.clear();
        self.commands.clear();
        self.defer_depth = 0;
        self.create_archetype(Signature::new());
        self.register_builtins();
    }
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

/// Memory statistics for the world
#[derive(Debug, Clone)]
pub struct MemoryStats {
    pub entity_index_memory: usize,
    pub archetype_memory: usize,
    pub total_memory: usize,
}

/// Read-only accessor sugar for one entity.
#[derive(Clone, Copy)]
pub struct EntityView<'w> {
    world: &'w World,
    id: EntityId,
}

impl<'w> EntityView<'w> {
    pub fn id(&self) -> EntityId {
        self.id
    }

    pub fn is_alive(&self) -> bool {
        self.world.is_alive(self.id)
    }

    pub fn has<T: Component>(&self) -> bool {
        self.world.has::<T>(self.id)
    }

    pub fn has_id(&self, component: EntityId) -> bool {
        self.world.has_id(self.id, component)
    }

    pub fn get<T: Component>(&self) -> Option<&'w T> {
        self.world.get::<T>(self.id)
    }

    pub fn target<K: Component>(&self, n: usize) -> Option<EntityId> {
        self.world.target::<K>(self.id, n)
    }

    pub fn parent(&self) -> Option<EntityId> {
        self.world.parent(self.id)
    }

    pub fn name(&self) -> Option<&'w str> {
        self.world.name(self.id)
    }
}
