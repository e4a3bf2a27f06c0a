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

//! Component metadata and the per-world type registry.
//!
//! Components are entities: registering a Rust type allocates a component
//! entity once per world and records its payload size and drop function.
//! Zero-sized types register as tags (presence only, no column storage).

use std::any::TypeId;

use ahash::AHashMap;

use crate::entity::EntityId;

/// Marker trait for component types.
///
/// Components must be `'static` (no borrowed data).
pub trait Component: 'static + Send + Sync {}

/// Automatically implement Component for all valid types
impl<T: 'static + Send + Sync> Component for T {}

/// A component key plus its per-entity payload size.
///
/// `size == 0` denotes a tag. For a pair `(A, B)` the size is inherited
/// from B when B's index resolves to a sized registered component,
/// otherwise the pair is a tag. A's size is never consulted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ComponentInfo {
    pub id: EntityId,
    pub size: usize,
}

impl ComponentInfo {
    pub fn is_tag(&self) -> bool {
        self.size == 0
    }
}

/// Per-type storage description published at registration.
#[derive(Clone, Copy)]
pub struct TypeMeta {
    pub size: usize,
    pub drop_fn: Option<unsafe fn(*mut u8)>,
    pub type_name: &'static str,
}

/// Everything a column needs to lay out and clean up one component.
#[derive(Clone, Copy)]
pub struct ColumnSpec {
    pub size: usize,
    pub drop_fn: Option<unsafe fn(*mut u8)>,
}

/// Per-world mapping from Rust types to component entities.
///
/// Numbering is per world: two worlds registering the same types in a
/// different order get different component ids, and no process-global
/// state is involved.
#[derive(Default)]
pub struct TypeRegistry {
    by_type: AHashMap<TypeId, EntityId>,
    metas: AHashMap<u32, TypeMeta>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Component entity for `T`, allocating one through `alloc` on first
    /// registration. The singleton slot makes repeated registration a
    /// cheap lookup.
    pub fn register_with<T: Component>(&mut self, alloc: impl FnOnce() -> EntityId) -> EntityId {
        let type_id = TypeId::of::<T>();
        if let Some(&id) = self.by_type.get(&type_id) {
            return id;
        }
        let id = alloc();
        self.by_type.insert(type_id, id);
        self.metas.insert(
            id.index(),
            TypeMeta {
                size: std::mem::size_of::<T>(),
                drop_fn: drop_fn_of::<T>(),
                type_name: std::any::type_name::<T>(),
            },
        );
        id
    }

    /// Component entity for `T` if it was registered.
    pub fn component_id<T: Component>(&self) -> Option<EntityId> {
        self.by_type.get(&TypeId::of::<T>()).copied()
    }

    /// Metadata for the component entity at `index`.
    pub fn meta(&self, index: u32) -> Option<&TypeMeta> {
        self.metas.get(&index)
    }

    /// Resolve any component key (plain or pair) to its payload info.
    pub fn component_info(&self, id: EntityId) -> ComponentInfo {
        let size = if id.is_pair() {
            // Pair payload comes from the second half when that half is a
            // sized component; otherwise the pair is a tag.
            self.meta(id.pair_second()).map_or(0, |m| m.size)
        } else {
            self.meta(id.index()).map_or(0, |m| m.size)
        };
        ComponentInfo { id, size }
    }

    /// Column layout for a signature entry. Tags carry no spec.
    pub fn column_spec(&self, info: ComponentInfo) -> ColumnSpec {
        let meta = if info.id.is_pair() {
            self.meta(info.id.pair_second())
        } else {
            self.meta(info.id.index())
        };
        ColumnSpec {
            size: info.size,
            drop_fn: meta.and_then(|m| {
                if m.size == info.size {
                    m.drop_fn
                } else {
                    None
                }
            }),
        }
    }

    /// Number of registered Rust types.
    pub fn len(&self) -> usize {
        self.by_type.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_type.is_empty()
    }
}

fn drop_fn_of<T>() -> Option<unsafe fn(*mut u8)> {
    if std::mem::needs_drop::<T>() {
        // SAFETY: only ever invoked by column cleanup with a pointer to an
        // initialized T written through the same column.
        Some(|ptr| unsafe { std::ptr::drop_in_place(ptr as *mut T) })
    } else {
        None
    }
}

/// Builtin relationship kind: `(ChildOf, parent)` pairs form the entity
/// hierarchy and drive cascading destroy.
pub struct ChildOf;

/// Builtin protection tag: destroying an entity carrying it is an error.
pub struct DoNotDelete;

/// Builtin debug name component.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Name(pub String);

impl Name {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registration_is_singleton() {
        struct Position;

        let mut registry = TypeRegistry::new();
        let mut next = 1u32;
        let mut alloc = || {
            let id = EntityId::new(next, 0);
            next += 1;
            id
        };

        let a = registry.register_with::<Position>(&mut alloc);
        let b = registry.register_with::<Position>(&mut alloc);
        assert_eq!(a, b);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_tag_rule() {
        struct Marker;
        struct Payload(#[allow(dead_code)] u64);

        let mut registry = TypeRegistry::new();
        let tag = registry.register_with::<Marker>(|| EntityId::new(1, 0));
        let sized = registry.register_with::<Payload>(|| EntityId::new(2, 0));

        assert!(registry.component_info(tag).is_tag());
        assert_eq!(registry.component_info(sized).size, 8);
    }

    #[test]
    fn test_pair_payload_from_second_half() {
        struct Kind;
        struct Data(#[allow(dead_code)] u32);

        let mut registry = TypeRegistry::new();
        let kind = registry.register_with::<Kind>(|| EntityId::new(1, 0));
        let data = registry.register_with::<Data>(|| EntityId::new(2, 0));
        let plain_target = EntityId::new(77, 0);

        // (kind, data-component) inherits the component's size
        let sized_pair = registry.component_info(EntityId::pair(kind, data));
        assert_eq!(sized_pair.size, 4);

        // (kind, plain entity) is a tag even though kind is registered
        let tag_pair = registry.component_info(EntityId::pair(kind, plain_target));
        assert!(tag_pair.is_tag());

        // (data, kind): first half's size is never used
        let reversed = registry.component_info(EntityId::pair(data, kind));
        assert!(reversed.is_tag());
    }
}
