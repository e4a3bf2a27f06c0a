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

//! Deferred structural commands.
//!
//! While the world is in deferred mode (`defer_depth > 0`) every
//! structural op on the facade is recorded here instead of applied.
//! When the outermost `end_deferred` brings the depth back to zero the
//! queue is drained in submission order through the direct mutation
//! path. An op that is no longer applicable (its entity died earlier in
//! the same batch) is skipped and reported; the merge always completes.

use parking_lot::Mutex;

#[cfg(feature = "profiling")]
use tracing::info_span;

use crate::entity::EntityId;
use crate::error::{EcsError, Result};
use crate::world::World;

/// Owned, type-erased component value carried by a deferred set.
///
/// The payload owns the value: if the command is dropped without being
/// applied (merge skip, cleared buffer) the destructor runs here.
pub(crate) struct CommandPayload {
    bytes: Vec<u8>,
    drop_fn: Option<unsafe fn(*mut u8)>,
}

impl CommandPayload {
    /// Take ownership of `value`, storing its bytes.
    pub(crate) fn from_value<T>(value: T) -> Self {
        let size = std::mem::size_of::<T>();
        let mut bytes = Vec::with_capacity(size);
        // SAFETY: copying `size` initialized bytes out of a live value;
        // the original is forgotten so ownership moves into `bytes`
        unsafe {
            bytes.set_len(size);
            std::ptr::copy_nonoverlapping(
                &value as *const T as *const u8,
                bytes.as_mut_ptr(),
                size,
            );
        }
        std::mem::forget(value);
        Self {
            bytes,
            drop_fn: if std::mem::needs_drop::<T>() {
                Some(|ptr| unsafe { std::ptr::drop_in_place(ptr as *mut T) })
            } else {
                None
            },
        }
    }

    /// Plain-data payload copied from raw bytes (no destructor).
    pub(crate) fn from_bytes(bytes: &[u8]) -> Self {
        Self {
            bytes: bytes.to_vec(),
            drop_fn: None,
        }
    }

    /// Empty payload for tag components.
    pub(crate) fn empty() -> Self {
        Self {
            bytes: Vec::new(),
            drop_fn: None,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.bytes.len()
    }

    pub(crate) fn as_ptr(&self) -> *const u8 {
        self.bytes.as_ptr()
    }

    /// Mark the value as moved into a column; the destructor is now the
    /// column's responsibility.
    pub(crate) fn mark_applied(&mut self) {
        self.drop_fn = None;
    }
}

impl Drop for CommandPayload {
    fn drop(&mut self) {
        if let Some(drop_fn) = self.drop_fn {
            // SAFETY: the payload still owns an initialized value
            unsafe { drop_fn(self.bytes.as_mut_ptr()) };
        }
    }
}

/// One recorded structural op.
pub(crate) enum Command {
    /// Materialize a reserved id in the root archetype.
    Spawn { entity: EntityId },
    Destroy {
        entity: EntityId,
    },
    Set {
        entity: EntityId,
        component: EntityId,
        payload: CommandPayload,
    },
    Unset {
        entity: EntityId,
        component: EntityId,
    },
}

/// Append-only command queue. Producers may push concurrently; the
/// drain happens in the single owner when the outermost deferred scope
/// exits, preserving submission order.
#[derive(Default)]
pub struct CommandBuffer {
    queue: Mutex<Vec<Command>>,
}

impl CommandBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&self, command: Command) {
        self.queue.lock().push(command);
    }

    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }

    /// Drop all recorded commands without applying them. Payload
    /// destructors run here.
    pub fn clear(&self) {
        self.queue.lock().clear();
    }

    pub(crate) fn drain(&self) -> Vec<Command> {
        std::mem::take(&mut *self.queue.lock())
    }
}

impl World {
    /// Enter deferred mode. Nested calls stack; structural ops queue
    /// until the matching outermost [`end_deferred`](World::end_deferred).
    pub fn begin_deferred(&mut self) {
        self.defer_depth += 1;
    }

    /// Leave one level of deferred mode. Dropping from depth 1 to 0
    /// merges the queue and returns the number of applied ops.
    pub fn end_deferred(&mut self) -> usize {
        assert!(self.defer_depth > 0, "end_deferred without begin_deferred");
        self.defer_depth -= 1;
        if self.defer_depth == 0 {
            self.merge()
        } else {
            0
        }
    }

    /// Whether structural ops currently queue instead of applying.
    pub fn is_deferred(&self) -> bool {
        self.defer_depth > 0
    }

    /// Queued op count (diagnostics).
    pub fn pending_commands(&self) -> usize {
        self.commands.len()
    }

    /// Drain and apply the queue in submission order. Ops that fail are
    /// skipped and reported through the merge sink; the merge itself
    /// always completes. Returns the number of ops applied.
    ///
    /// Normally run by the outermost [`end_deferred`](World::end_deferred);
    /// calling it directly applies whatever is queued right now.
    pub fn merge(&mut self) -> usize {
        let commands = self.commands.drain();
        if commands.is_empty() {
            return 0;
        }

        #[cfg(feature = "profiling")]
        let span = info_span!("world.merge", queued = commands.len());
        #[cfg(feature = "profiling")]
        let _span_guard = span.enter();

        let mut applied = 0;
        for (index, command) in commands.into_iter().enumerate() {
            let result = self.apply(command);
            match result {
                Ok(()) => applied += 1,
                Err(cause) => self.report_merge_skip(EcsError::DeferredSkipped {
                    index,
                    cause: Box::new(cause),
                }),
            }
        }
        applied
    }

    fn apply(&mut self, command: Command) -> Result<()> {
        match command {
            Command::Spawn { entity } => self.materialize(entity),
            Command::Destroy { entity } => self.destroy_now(entity),
            Command::Set {
                entity,
                component,
                mut payload,
            } => {
                self.set_ptr(entity, component, payload.as_ptr(), payload.len())?;
                payload.mark_applied();
                Ok(())
            }
            Command::Unset { entity, component } => self.unset_now(entity, component),
        }
    }

    fn report_merge_skip(&self, error: EcsError) {
        #[cfg(feature = "profiling")]
        tracing::warn!(%error, "deferred op skipped");
        if let Some(sink) = &self.merge_sink {
            sink(&error);
        }
    }
}
