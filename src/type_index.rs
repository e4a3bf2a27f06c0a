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

//! Signature canonicalization by rolling hash.
//!
//! The hash of a signature is the xor of its per-component hashes, so a
//! one-component delta is `hash(S) ^ component_hash(c)` and migration can
//! look up the neighbor archetype without materializing the new
//! signature. Hash collisions are resolved by an explicit signature
//! compare on the caller's side.

use ahash::AHashMap;
use smallvec::SmallVec;

use crate::archetype::ArchetypeId;
use crate::component::ComponentInfo;
use crate::entity::EntityId;

/// Mix one component id into a 64-bit hash (splitmix64 finalizer).
pub fn component_hash(id: EntityId) -> u64 {
    let mut x = id.to_raw().wrapping_add(0x9e37_79b9_7f4a_7c15);
    x = (x ^ (x >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    x ^ (x >> 31)
}

/// Order-independent rolling hash of a whole signature. The empty
/// signature (root archetype) hashes to zero.
pub fn signature_hash(signature: &[ComponentInfo]) -> u64 {
    signature
        .iter()
        .fold(0, |acc, info| acc ^ component_hash(info.id))
}

/// Hash -> archetype map keeping exactly one archetype per signature.
#[derive(Default)]
pub struct TypeIndex {
    buckets: AHashMap<u64, SmallVec<[ArchetypeId; 1]>>,
}

impl TypeIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a newly created archetype under its signature hash.
    pub fn insert(&mut self, hash: u64, id: ArchetypeId) {
        self.buckets.entry(hash).or_default().push(id);
    }

    /// Find the archetype with this hash whose signature satisfies
    /// `is_match` (the collision check).
    pub fn find_with(
        &self,
        hash: u64,
        mut is_match: impl FnMut(ArchetypeId) -> bool,
    ) -> Option<ArchetypeId> {
        self.buckets
            .get(&hash)?
            .iter()
            .copied()
            .find(|&id| is_match(id))
    }

    pub fn len(&self) -> usize {
        self.buckets.values().map(|b| b.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    pub fn clear(&mut self) {
        self.buckets.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(idx: u32) -> ComponentInfo {
        ComponentInfo {
            id: EntityId::new(idx, 0),
            size: 4,
        }
    }

    #[test]
    fn test_rolling_property() {
        let base = [info(1), info(2)];
        let extended = [info(1), info(2), info(3)];

        let rolled = signature_hash(&base) ^ component_hash(info(3).id);
        assert_eq!(rolled, signature_hash(&extended));

        // Removing rolls back to the base hash
        assert_eq!(
            signature_hash(&extended) ^ component_hash(info(3).id),
            signature_hash(&base)
        );
    }

    #[test]
    fn test_hash_is_order_independent() {
        let a = [info(1), info(2), info(3)];
        let b = [info(3), info(1), info(2)];
        assert_eq!(signature_hash(&a), signature_hash(&b));
    }

    #[test]
    fn test_collision_bucket_uses_match_check() {
        let mut index = TypeIndex::new();
        let hash = 0xdead_beef;
        index.insert(hash, ArchetypeId::new(1));
        index.insert(hash, ArchetypeId::new(2));

        let found = index.find_with(hash, |id| id == ArchetypeId::new(2));
        assert_eq!(found, Some(ArchetypeId::new(2)));
        assert_eq!(index.find_with(hash, |_| false), None);
        assert_eq!(index.find_with(0x1234, |_| true), None);
    }
}
