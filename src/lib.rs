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

//! Relic ECS - relational archetype Entity Component System
//!
//! Entities are grouped by their exact component set into column-chunked
//! archetypes; structural changes move entities along memoized graph
//! edges. Relationship pairs pack two entity ids into one component key
//! and support wildcard query terms; structural mutations issued while
//! the world is deferred are queued and merged in submission order.

pub mod archetype;
pub mod chunk;
pub mod command;
pub mod component;
pub mod debug;
pub mod entity;
pub mod entity_index;
pub mod error;
pub mod hooks;
pub mod query;
pub mod structural;
pub mod type_index;
pub mod world;

pub mod prelude;

// Re-exports for convenience
pub use archetype::{Archetype, ArchetypeId};
pub use chunk::{Chunk, CHUNK_CAPACITY};
pub use command::CommandBuffer;
pub use component::{ChildOf, Component, ComponentInfo, DoNotDelete, Name};
pub use debug::WorldInspector;
pub use entity::{EntityId, WILDCARD};
pub use entity_index::{EntityIndex, EntityRecord};
pub use error::{EcsError, Result};
pub use hooks::EcsHooks;
pub use query::{Query, QueryBuilder, QueryCacheStats, Term, TermOp};
pub use world::{EntityView, MemoryStats, World, WorldConfig};
