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

//! Entity identifier codec.
//!
//! An [`EntityId`] is a 64-bit handle in one of two shapes:
//!
//! - plain: `[unused:16 | generation:16 | index:32]`
//! - pair:  bit 63 set, `[pair:1 | pad:7 | first:28 | second:28]`
//!
//! A pair packs two entity indices into one component key; by convention
//! `first` is the relationship kind (e.g. `ChildOf`) and `second` the
//! target. Generations are stripped inside pairs. [`WILDCARD`] is a
//! reserved index that matches either half of a pair during query
//! matching and is never handed out by the entity index.

use std::cmp::Ordering;
use std::fmt;

const PAIR_BIT: u64 = 1 << 63;
const PAIR_HALF_BITS: u32 = 28;
const PAIR_HALF_MASK: u64 = (1 << PAIR_HALF_BITS) - 1;
const INDEX_MASK: u64 = 0xFFFF_FFFF;
const GENERATION_SHIFT: u32 = 32;
const GENERATION_MASK: u64 = 0xFFFF;

/// Reserved index matching any pair half.
pub const WILDCARD_INDEX: u32 = PAIR_HALF_MASK as u32;

/// The `*` entity: matches either half of a pair in query terms.
pub const WILDCARD: EntityId = EntityId(WILDCARD_INDEX as u64);

/// 64-bit entity handle with generation, or a relationship pair key.
///
/// Equality and ordering are purely numeric; the query matcher uses
/// [`signature_cmp`] where wildcard pairs need to compare equal.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntityId(u64);

impl EntityId {
    /// Build a plain id from slot index and generation.
    pub fn new(index: u32, generation: u16) -> Self {
        Self(((generation as u64) << GENERATION_SHIFT) | index as u64)
    }

    /// Reinterpret a raw 64-bit value as an id.
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw 64-bit value.
    pub fn to_raw(self) -> u64 {
        self.0
    }

    /// Pack two ids into a pair key. Generations are dropped; only the
    /// low 28 bits of each index survive.
    pub fn pair(first: EntityId, second: EntityId) -> Self {
        debug_assert!(
            first.index() as u64 <= PAIR_HALF_MASK && second.index() as u64 <= PAIR_HALF_MASK,
            "pair halves must fit in 28 bits"
        );
        Self(
            PAIR_BIT
                | ((first.index() as u64 & PAIR_HALF_MASK) << PAIR_HALF_BITS)
                | (second.index() as u64 & PAIR_HALF_MASK),
        )
    }

    /// Whether the pair flag is set.
    pub fn is_pair(self) -> bool {
        self.0 & PAIR_BIT != 0
    }

    /// Relationship-kind index of a pair.
    pub fn pair_first(self) -> u32 {
        debug_assert!(self.is_pair());
        ((self.0 >> PAIR_HALF_BITS) & PAIR_HALF_MASK) as u32
    }

    /// Target index of a pair.
    pub fn pair_second(self) -> u32 {
        debug_assert!(self.is_pair());
        (self.0 & PAIR_HALF_MASK) as u32
    }

    /// Slot index of a plain id. For pairs this returns the packed halves
    /// and is not meaningful as a slot.
    pub fn index(self) -> u32 {
        (self.0 & INDEX_MASK) as u32
    }

    /// Generation counter of a plain id. Always zero for pairs.
    pub fn generation(self) -> u16 {
        if self.is_pair() {
            0
        } else {
            ((self.0 >> GENERATION_SHIFT) & GENERATION_MASK) as u16
        }
    }

    /// Same index, different generation.
    pub fn with_generation(self, generation: u16) -> Self {
        debug_assert!(!self.is_pair());
        Self::new(self.index(), generation)
    }

    /// Whether this is the reserved wildcard id.
    pub fn is_wildcard(self) -> bool {
        !self.is_pair() && self.index() == WILDCARD_INDEX
    }

    /// Wildcard-aware containment test: does this concrete signature
    /// entry satisfy `pattern`? Plain ids match by numeric equality;
    /// a pair pattern may carry [`WILDCARD`] in either half.
    pub fn matches(self, pattern: EntityId) -> bool {
        if self == pattern {
            return true;
        }
        if !self.is_pair() || !pattern.is_pair() {
            return false;
        }
        let first_ok =
            pattern.pair_first() == WILDCARD_INDEX || pattern.pair_first() == self.pair_first();
        let second_ok =
            pattern.pair_second() == WILDCARD_INDEX || pattern.pair_second() == self.pair_second();
        first_ok && second_ok
    }
}

/// Comparator used by the query matcher when merging a sorted term list
/// against a sorted signature.
///
/// Ordering is numeric with one exception: two pair ids whose first
/// halves are equal compare equal when either second half is the
/// wildcard. Everywhere else (signature sort, edge maps) ordering is the
/// plain numeric `Ord`.
pub fn signature_cmp(a: EntityId, b: EntityId) -> Ordering {
    if a.is_pair() && b.is_pair() && a.pair_first() == b.pair_first() {
        let (sa, sb) = (a.pair_second(), b.pair_second());
        if sa == sb || sa == WILDCARD_INDEX || sb == WILDCARD_INDEX {
            return Ordering::Equal;
        }
    }
    a.0.cmp(&b.0)
}

impl fmt::Debug for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_pair() {
            write!(f, "Pair({}, {})", self.pair_first(), self.pair_second())
        } else {
            write!(f, "EntityId({}v{})", self.index(), self.generation())
        }
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_pair() {
            write!(f, "({},{})", self.pair_first(), self.pair_second())
        } else {
            write!(f, "{}v{}", self.index(), self.generation())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_roundtrip() {
        let id = EntityId::new(42, 7);
        assert_eq!(id.index(), 42);
        assert_eq!(id.generation(), 7);
        assert!(!id.is_pair());

        let bumped = id.with_generation(8);
        assert_eq!(bumped.index(), 42);
        assert_eq!(bumped.generation(), 8);
        assert_ne!(id, bumped);
    }

    #[test]
    fn test_pair_roundtrip() {
        let kind = EntityId::new(3, 2);
        let target = EntityId::new(900, 5);
        let pair = EntityId::pair(kind, target);

        assert!(pair.is_pair());
        assert_eq!(pair.pair_first(), 3);
        assert_eq!(pair.pair_second(), 900);
        // Generations do not survive packing
        assert_eq!(pair.generation(), 0);
    }

    #[test]
    fn test_wildcard_matching() {
        let kind = EntityId::new(3, 0);
        let target = EntityId::new(900, 0);
        let concrete = EntityId::pair(kind, target);

        assert!(concrete.matches(EntityId::pair(kind, WILDCARD)));
        assert!(concrete.matches(EntityId::pair(WILDCARD, target)));
        assert!(concrete.matches(EntityId::pair(WILDCARD, WILDCARD)));
        assert!(concrete.matches(concrete));
        assert!(!concrete.matches(EntityId::pair(kind, EntityId::new(901, 0))));
        assert!(!concrete.matches(kind));
    }

    #[test]
    fn test_signature_cmp_wildcard_exception() {
        let kind = EntityId::new(3, 0);
        let a = EntityId::pair(kind, EntityId::new(10, 0));
        let b = EntityId::pair(kind, WILDCARD);
        assert_eq!(signature_cmp(a, b), Ordering::Equal);
        assert_eq!(signature_cmp(b, a), Ordering::Equal);

        let c = EntityId::pair(kind, EntityId::new(11, 0));
        assert_ne!(signature_cmp(a, c), Ordering::Equal);

        // Plain ids stay strictly numeric
        assert_eq!(
            signature_cmp(EntityId::new(1, 0), EntityId::new(2, 0)),
            Ordering::Less
        );
    }

    #[test]
    fn test_pairs_with_same_kind_sort_contiguously() {
        let kind = EntityId::new(5, 0);
        let other = EntityId::new(6, 0);
        let mut ids = vec![
            EntityId::pair(other, EntityId::new(1, 0)),
            EntityId::pair(kind, EntityId::new(9, 0)),
            EntityId::pair(kind, EntityId::new(2, 0)),
        ];
        ids.sort();
        assert_eq!(ids[0].pair_first(), 5);
        assert_eq!(ids[1].pair_first(), 5);
        assert_eq!(ids[2].pair_first(), 6);
    }
}
