//! Convenient re-exports of commonly used types.
//!
//! The prelude can be imported with:
//! ```
//! use relic_ecs::prelude::*;
//! ```

pub use crate::component::{ChildOf, Component, DoNotDelete, Name};
pub use crate::entity::{EntityId, WILDCARD};
pub use crate::error::{EcsError, Result};
pub use crate::query::{Query, QueryBuilder, TermOp};
pub use crate::world::{EntityView, World, WorldConfig};
