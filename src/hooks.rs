//! Optional event hooks invoked on structural changes.
//!
//! Hooks run after the change is committed. They must not mutate the
//! world directly; anything structural goes through the deferred command
//! queue on the next merge.

use crate::entity::EntityId;

/// Callbacks the world invokes after structural changes.
///
/// All methods default to no-ops so implementors override only what
/// they observe.
pub trait EcsHooks: Send + Sync {
    /// A component (or pair) was set or added on `entity`.
    fn on_set(&mut self, entity: EntityId, component: EntityId) {
        let _ = (entity, component);
    }

    /// A component (or pair) was removed from `entity`.
    fn on_unset(&mut self, entity: EntityId, component: EntityId) {
        let _ = (entity, component);
    }

    /// `entity` was destroyed (after its row was released).
    fn on_destroy(&mut self, entity: EntityId) {
        let _ = entity;
    }
}
