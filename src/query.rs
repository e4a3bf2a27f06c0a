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

//! Query matching over the archetype graph.
//!
//! A query is a list of terms (With / Without / Optional / Or) over
//! component ids, including relationship pairs with wildcards. Matching
//! walks an archetype's sorted signature against the sorted term list;
//! results are cached per query hash and revalidated incrementally,
//! which is sound because archetypes are never deleted.
//!
//! Iteration order is archetype order, then chunk order, then row order,
//! and is stable across runs as long as no structural change intervenes.

use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

use ahash::AHashMap;
use rustc_hash::FxHasher;
use smallvec::SmallVec;

use crate::archetype::{Archetype, ArchetypeId};
use crate::component::Component;
use crate::entity::{signature_cmp, EntityId, WILDCARD_INDEX};
use crate::world::World;

/// Operator of one query term.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TermOp {
    /// Signature must contain the id (wildcard-aware for pairs).
    With,
    /// Signature must not contain the id.
    Without,
    /// No constraint; presence is surfaced at iteration time.
    Optional,
    /// Part of a disjunctive group with adjacent `Or` terms.
    Or,
}

/// One clause of a query.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Term {
    pub id: EntityId,
    pub op: TermOp,
}

/// Outcome of matching one archetype.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum TermMatch {
    /// All terms satisfied.
    Matched,
    /// A required term is absent.
    Missing,
    /// A forbidden component is present.
    Rejected,
}

type OrGroup = SmallVec<[EntityId; 4]>;

/// Match a sorted term list (plus Or groups) against one archetype.
pub(crate) fn match_archetype(
    terms: &[Term],
    or_groups: &[OrGroup],
    archetype: &Archetype,
) -> TermMatch {
    let signature = archetype.signature();
    let mut si = 0;

    for term in terms {
        // Wildcard-first pairs are not ordered against concrete pairs and
        // fall back to a signature scan.
        let present = if term.id.is_pair() && term.id.pair_first() == WILDCARD_INDEX {
            signature.iter().any(|c| c.id.matches(term.id))
        } else {
            while si < signature.len()
                && signature_cmp(signature[si].id, term.id) == std::cmp::Ordering::Less
            {
                si += 1;
            }
            si < signature.len()
                && signature_cmp(signature[si].id, term.id) == std::cmp::Ordering::Equal
        };

        match term.op {
            TermOp::With => {
                if !present {
                    return TermMatch::Missing;
                }
            }
            TermOp::Without => {
                if present {
                    return TermMatch::Rejected;
                }
            }
            TermOp::Optional => {}
            TermOp::Or => unreachable!("or terms are normalized into groups"),
        }
    }

    for group in or_groups {
        if !group.iter().any(|&id| archetype.contains_match(id)) {
            return TermMatch::Missing;
        }
    }

    TermMatch::Matched
}

/// Builder for [`Query`]; obtained from [`World::query`].
pub struct QueryBuilder<'w> {
    world: &'w mut World,
    terms: SmallVec<[Term; 8]>,
}

impl<'w> QueryBuilder<'w> {
    pub(crate) fn new(world: &'w mut World) -> Self {
        Self {
            world,
            terms: SmallVec::new(),
        }
    }

    pub fn with_id(mut self, id: EntityId) -> Self {
        self.terms.push(Term {
            id,
            op: TermOp::With,
        });
        self
    }

    pub fn without_id(mut self, id: EntityId) -> Self {
        self.terms.push(Term {
            id,
            op: TermOp::Without,
        });
        self
    }

    pub fn optional_id(mut self, id: EntityId) -> Self {
        self.terms.push(Term {
            id,
            op: TermOp::Optional,
        });
        self
    }

    /// Add a term to the current Or group. Adjacent `or_with` terms form
    /// one group; the archetype passes if any member is present.
    pub fn or_with_id(mut self, id: EntityId) -> Self {
        self.terms.push(Term { id, op: TermOp::Or });
        self
    }

    pub fn with<T: Component>(mut self) -> Self {
        let id = self.world.register::<T>();
        self.with_id(id)
    }

    pub fn without<T: Component>(mut self) -> Self {
        let id = self.world.register::<T>();
        self.without_id(id)
    }

    pub fn optional<T: Component>(mut self) -> Self {
        let id = self.world.register::<T>();
        self.optional_id(id)
    }

    pub fn or_with<T: Component>(mut self) -> Self {
        let id = self.world.register::<T>();
        self.or_with_id(id)
    }

    /// Term for the pair `(kind, target)`; either side may be
    /// [`WILDCARD`](crate::entity::WILDCARD).
    pub fn with_pair(self, kind: EntityId, target: EntityId) -> Self {
        self.with_id(EntityId::pair(kind, target))
    }

    /// Pair term with a typed relationship kind.
    pub fn with_related<K: Component>(mut self, target: EntityId) -> Self {
        let kind = self.world.register::<K>();
        self.with_id(EntityId::pair(kind, target))
    }

    /// Normalize terms and register the query shape with the cache.
    pub fn build(self) -> Query {
        let mut terms: SmallVec<[Term; 8]> = SmallVec::new();
        let mut or_groups: SmallVec<[OrGroup; 2]> = SmallVec::new();
        let mut current_group: OrGroup = SmallVec::new();

        for term in &self.terms {
            if term.op == TermOp::Or {
                current_group.push(term.id);
            } else {
                if !current_group.is_empty() {
                    or_groups.push(std::mem::take(&mut current_group));
                }
                terms.push(*term);
            }
        }
        if !current_group.is_empty() {
            or_groups.push(current_group);
        }

        terms.sort_by(|a, b| a.id.cmp(&b.id).then_with(|| term_rank(a.op).cmp(&term_rank(b.op))));

        let mut hasher = FxHasher::default();
        for term in &terms {
            term.id.to_raw().hash(&mut hasher);
            term_rank(term.op).hash(&mut hasher);
        }
        for group in &or_groups {
            0xffu8.hash(&mut hasher);
            for id in group {
                id.to_raw().hash(&mut hasher);
            }
        }

        Query {
            hash: hasher.finish(),
            terms,
            or_groups,
        }
    }
}

fn term_rank(op: TermOp) -> u8 {
    match op {
        TermOp::With => 0,
        TermOp::Without => 1,
        TermOp::Optional => 2,
        TermOp::Or => 3,
    }
}

/// A compiled query shape, detached from the world.
#[derive(Clone, Debug)]
pub struct Query {
    hash: u64,
    terms: SmallVec<[Term; 8]>,
    or_groups: SmallVec<[OrGroup; 2]>,
}

impl Query {
    pub fn hash(&self) -> u64 {
        self.hash
    }

    pub fn terms(&self) -> &[Term] {
        &self.terms
    }

    /// Archetypes currently matching this query, consulting and updating
    /// the world's query cache. New archetypes since the last run are
    /// matched from the cached frontier only.
    pub fn matched(&self, world: &World) -> Vec<ArchetypeId> {
        let mut cache = world.query_cache.lock();
        let archetypes = &world.archetypes;

        match cache.entries.get_mut(&self.hash) {
            Some(entry) if entry.terms == self.terms && entry.or_groups == self.or_groups => {
                entry.revalidate(archetypes);
                entry.matches.clone()
            }
            Some(_) => {
                // Hash collision with a different shape: match uncached
                full_match(&self.terms, &self.or_groups, archetypes)
            }
            None => {
                let entry = CachedQuery::new(self.terms.clone(), self.or_groups.clone(), archetypes);
                let matches = entry.matches.clone();
                cache.entries.insert(self.hash, entry);
                matches
            }
        }
    }

    /// Number of matching live entities.
    pub fn count(&self, world: &World) -> usize {
        self.matched(world)
            .iter()
            .map(|&id| world.archetypes[id.index()].len())
            .sum()
    }

    /// Read-only iteration in archetype, chunk, row order.
    pub fn iter<'w>(&self, world: &'w World) -> QueryIter<'w> {
        QueryIter {
            world,
            matched: self.matched(world),
            arch_cursor: 0,
            row: 0,
        }
    }

    /// Mutable per-row visitation. Only component values may be written
    /// through the row view; structural changes go through the deferred
    /// command queue.
    pub fn each_mut(&self, world: &mut World, mut f: impl FnMut(RowMut<'_>)) {
        let matched = self.matched(world);
        let world_ptr: *mut World = world;
        for id in matched {
            // SAFETY: matched archetypes are distinct arena slots; the
            // row view mutates component columns only, never the arena,
            // and `world` stays exclusively borrowed for the whole call.
            let archetype =
                unsafe { (*world_ptr).archetypes.as_mut_ptr().add(id.index()) };
            let len = unsafe { (*archetype).len() };
            for row in 0..len {
                f(RowMut {
                    world: world_ptr as *const World,
                    archetype,
                    row,
                    _marker: PhantomData,
                });
            }
        }
    }
}

fn full_match(terms: &[Term], or_groups: &[OrGroup], archetypes: &[Archetype]) -> Vec<ArchetypeId> {
    archetypes
        .iter()
        .filter(|arch| match_archetype(terms, or_groups, arch) == TermMatch::Matched)
        .map(Archetype::id)
        .collect()
}

/// Cached result for one query shape.
pub(crate) struct CachedQuery {
    terms: SmallVec<[Term; 8]>,
    or_groups: SmallVec<[OrGroup; 2]>,
    matches: Vec<ArchetypeId>,
    /// Archetype-arena epoch at the last (re)validation.
    seen_archetypes: usize,
}

impl CachedQuery {
    fn new(
        terms: SmallVec<[Term; 8]>,
        or_groups: SmallVec<[OrGroup; 2]>,
        archetypes: &[Archetype],
    ) -> Self {
        let matches = full_match(&terms, &or_groups, archetypes);
        Self {
            terms,
            or_groups,
            matches,
            seen_archetypes: archetypes.len(),
        }
    }

    /// Extend the match set with archetypes created since the last run.
    /// Archetypes are never deleted, so the frontier only moves forward.
    fn revalidate(&mut self, archetypes: &[Archetype]) {
        if archetypes.len() <= self.seen_archetypes {
            return;
        }
        for arch in &archetypes[self.seen_archetypes..] {
            if match_archetype(&self.terms, &self.or_groups, arch) == TermMatch::Matched {
                self.matches.push(arch.id());
            }
        }
        self.seen_archetypes = archetypes.len();
    }

    pub(crate) fn cached_archetypes(&self) -> usize {
        self.matches.len()
    }
}

/// World-level cache of query shapes.
#[derive(Default)]
pub(crate) struct QueryCache {
    pub(crate) entries: AHashMap<u64, CachedQuery>,
}

/// Counters exposed for diagnostics and tests.
#[derive(Debug, Clone, Copy)]
pub struct QueryCacheStats {
    pub num_cached_queries: usize,
    pub total_cached_archetypes: usize,
    pub total_archetypes: usize,
}

/// Read-only view of one matched row.
#[derive(Clone, Copy)]
pub struct RowRef<'w> {
    world: &'w World,
    archetype: &'w Archetype,
    row: usize,
}

impl<'w> RowRef<'w> {
    pub fn entity(&self) -> EntityId {
        self.archetype.entity_at(self.row)
    }

    pub fn has_id(&self, id: EntityId) -> bool {
        self.archetype.contains_match(id)
    }

    pub fn has<T: Component>(&self) -> bool {
        self.world
            .component_id::<T>()
            .is_some_and(|id| self.archetype.contains(id))
    }

    /// Component value, `None` when absent (Optional terms surface
    /// presence here).
    pub fn get<T: Component>(&self) -> Option<&'w T> {
        let id = self.world.component_id::<T>()?;
        let column = self.archetype.column_index(id)?;
        self.archetype.get::<T>(self.row, column)
    }

    /// `n`-th target of pairs with relationship `kind`, in signature
    /// order.
    pub fn target_id(&self, kind: EntityId, n: usize) -> Option<EntityId> {
        let index = self.archetype.pair_targets(kind.index()).nth(n)?;
        self.world.entities.current(index)
    }
}

/// Mutable view of one matched row.
pub struct RowMut<'w> {
    world: *const World,
    archetype: *mut Archetype,
    row: usize,
    _marker: PhantomData<&'w mut World>,
}

impl<'w> RowMut<'w> {
    pub fn entity(&self) -> EntityId {
        // SAFETY: archetype pointer is valid for the iteration
        unsafe { (*self.archetype).entity_at(self.row) }
    }

    pub fn has_id(&self, id: EntityId) -> bool {
        unsafe { (*self.archetype).contains_match(id) }
    }

    pub fn has<T: Component>(&self) -> bool {
        // SAFETY: registry reads do not alias the column being mutated
        unsafe { (*self.world).component_id::<T>() }
            .is_some_and(|id| unsafe { (*self.archetype).contains(id) })
    }

    pub fn get<T: Component>(&self) -> Option<&T> {
        let id = unsafe { (*self.world).component_id::<T>() }?;
        let archetype = unsafe { &*self.archetype };
        let column = archetype.column_index(id)?;
        archetype.get::<T>(self.row, column)
    }

    pub fn get_mut<T: Component>(&mut self) -> Option<&mut T> {
        let id = unsafe { (*self.world).component_id::<T>() }?;
        // SAFETY: exclusive access to the archetype for this row during
        // the visit; the borrow is tied to &mut self
        let archetype = unsafe { &mut *self.archetype };
        let column = archetype.column_index(id)?;
        archetype.get_mut::<T>(self.row, column)
    }

    pub fn target_id(&self, kind: EntityId, n: usize) -> Option<EntityId> {
        let archetype = unsafe { &*self.archetype };
        let index = archetype.pair_targets(kind.index()).nth(n)?;
        unsafe { (*self.world).entities.current(index) }
    }
}

/// Iterator over matched rows: archetype order, then chunk order, then
/// row order.
pub struct QueryIter<'w> {
    world: &'w World,
    matched: Vec<ArchetypeId>,
    arch_cursor: usize,
    row: usize,
}

impl<'w> Iterator for QueryIter<'w> {
    type Item = RowRef<'w>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let &arch_id = self.matched.get(self.arch_cursor)?;
            let archetype = &self.world.archetypes[arch_id.index()];
            if self.row >= archetype.len() {
                self.arch_cursor += 1;
                self.row = 0;
                continue;
            }
            let row = self.row;
            self.row += 1;
            return Some(RowRef {
                world: self.world,
                archetype,
                row,
            });
        }
    }
}
