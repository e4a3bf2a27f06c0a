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

//! Error types

use std::fmt;

use crate::entity::EntityId;

/// ECS error type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EcsError {
    /// Operation referenced a dead or never-alive entity
    DeadEntity(EntityId),

    /// Explicit spawn at an id that is already live
    AlreadyAlive(EntityId),

    /// Set with a payload whose size does not match the component
    SizeMismatch {
        component: EntityId,
        expected: usize,
        got: usize,
    },

    /// Get of a component the entity does not have
    MissingComponent {
        entity: EntityId,
        component: EntityId,
    },

    /// Destroy attempted on a protected entity
    ProtectedEntity(EntityId),

    /// Sized payload supplied for a component id with no registration
    UnregisteredComponent(EntityId),

    /// A deferred op could not be applied at merge time and was skipped
    DeferredSkipped { index: usize, cause: Box<EcsError> },
}

impl fmt::Display for EcsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EcsError::DeadEntity(e) => write!(f, "Entity {e} is not alive"),
            EcsError::AlreadyAlive(e) => write!(f, "Entity {e} is already alive"),
            EcsError::SizeMismatch {
                component,
                expected,
                got,
            } => write!(
                f,
                "Component {component} payload size mismatch: expected {expected}, got {got}"
            ),
            EcsError::MissingComponent { entity, component } => {
                write!(f, "Entity {entity} has no component {component}")
            }
            EcsError::ProtectedEntity(e) => {
                write!(f, "Entity {e} is protected and cannot be destroyed")
            }
            EcsError::UnregisteredComponent(c) => {
                write!(f, "Component {c} was used before registration")
            }
            EcsError::DeferredSkipped { index, cause } => {
                write!(f, "Deferred op #{index} skipped: {cause}")
            }
        }
    }
}

impl std::error::Error for EcsError {}

/// Result type alias
pub type Result<T> = std::result::Result<T, EcsError>;
