//! World inspection and consistency checking.

use crate::archetype::ArchetypeId;
use crate::entity::EntityId;
use crate::world::World;

/// World inspector for debugging
pub struct WorldInspector;

impl WorldInspector {
    /// Human-readable label for a component key: the registered type
    /// name for plain components, `(first, second)` for pairs.
    pub fn component_label(world: &World, id: EntityId) -> String {
        if id.is_pair() {
            let first = world
                .registry
                .meta(id.pair_first())
                .map(|m| short_name(m.type_name))
                .unwrap_or_else(|| id.pair_first().to_string());
            let second = world
                .registry
                .meta(id.pair_second())
                .map(|m| short_name(m.type_name))
                .unwrap_or_else(|| id.pair_second().to_string());
            format!("({first}, {second})")
        } else {
            world
                .registry
                .meta(id.index())
                .map(|m| short_name(m.type_name))
                .unwrap_or_else(|| format!("{id}"))
        }
    }

    /// Get archetype summary
    pub fn archetype_summary(world: &World) -> Vec<ArchetypeInfo> {
        world
            .archetypes
            .iter()
            .map(|archetype| ArchetypeInfo {
                id: archetype.id(),
                signature: archetype
                    .signature()
                    .iter()
                    .map(|c| Self::component_label(world, c.id))
                    .collect(),
                entity_count: archetype.len(),
                chunk_count: archetype.chunks().len(),
            })
            .collect()
    }

    /// Print world summary to console
    pub fn print_summary(world: &World) {
        println!("=== World Summary ===");
        println!("Entities: {}", world.entity_count());
        println!("Archetypes: {}", world.archetype_count());

        println!("\n=== Archetypes ===");
        for info in Self::archetype_summary(world) {
            println!(
                "Archetype {:?} [{}]: {} entities in {} chunks",
                info.id,
                info.signature.join(", "),
                info.entity_count,
                info.chunk_count
            );
        }
    }

    /// Print entity details
    pub fn print_entity(world: &World, entity: EntityId) {
        if let Some(record) = world.location(entity) {
            println!("=== Entity {entity} ===");
            println!("Archetype: {:?}", record.archetype);
            println!("Row: {}", record.row);
            if let Some(archetype) = world.archetype(record.archetype) {
                for info in archetype.signature() {
                    println!("  {}", Self::component_label(world, info.id));
                }
            }
        } else {
            println!("Entity {entity} not found");
        }
    }

    /// Check the storage invariants; returns the first violation found.
    ///
    /// - every live record points back at its own entity slot
    /// - archetype counts equal the sum of their chunk counts
    /// - add/remove edges are symmetric one-component deltas
    /// - no two archetypes share a signature
    pub fn validate(world: &World) -> Result<(), String> {
        for (entity, record) in world.entities.iter_alive() {
            let archetype = world
                .archetype(record.archetype)
                .ok_or_else(|| format!("{entity}: record names a missing archetype"))?;
            if record.row as usize >= archetype.len() {
                return Err(format!("{entity}: row {} out of bounds", record.row));
            }
            let stored = archetype.entity_at(record.row as usize);
            if stored != entity {
                return Err(format!(
                    "{entity}: row {} is occupied by {stored}",
                    record.row
                ));
            }
        }

        for archetype in &world.archetypes {
            let chunk_sum: usize = archetype.chunks().iter().map(|c| c.len()).sum();
            if archetype.len() != chunk_sum {
                return Err(format!(
                    "archetype {:?}: count {} != chunk sum {chunk_sum}",
                    archetype.id(),
                    archetype.len()
                ));
            }

            for info in archetype.signature() {
                if let Some(target) = archetype.edge_add(info.id) {
                    if target == archetype.id() {
                        return Err(format!(
                            "archetype {:?}: add edge for a component it already has",
                            archetype.id()
                        ));
                    }
                }
                if let Some(target) = archetype.edge_remove(info.id) {
                    let neighbor = world
                        .archetype(target)
                        .ok_or_else(|| format!("dangling remove edge to {target:?}"))?;
                    if neighbor.signature().len() + 1 != archetype.signature().len()
                        || neighbor.contains(info.id)
                    {
                        return Err(format!(
                            "archetype {:?}: remove edge for {} is not a one-component delta",
                            archetype.id(),
                            Self::component_label(world, info.id)
                        ));
                    }
                    if neighbor.edge_add(info.id) != Some(archetype.id()) {
                        return Err(format!(
                            "archetype {:?}: remove edge for {} lacks the mirror add edge",
                            archetype.id(),
                            Self::component_label(world, info.id)
                        ));
                    }
                }
            }
        }

        let mut seen: Vec<(u64, ArchetypeId)> = Vec::new();
        for archetype in &world.archetypes {
            let hash = archetype.signature_hash();
            for &(other_hash, other_id) in &seen {
                if other_hash == hash {
                    let other = &world.archetypes[other_id.index()];
                    if other.signature() == archetype.signature() {
                        return Err(format!(
                            "archetypes {other_id:?} and {:?} share a signature",
                            archetype.id()
                        ));
                    }
                }
            }
            seen.push((hash, archetype.id()));
        }

        Ok(())
    }
}

fn short_name(type_name: &str) -> String {
    type_name
        .rsplit("::")
        .next()
        .unwrap_or(type_name)
        .to_string()
}

/// Archetype information for debugging
#[derive(Clone, Debug)]
pub struct ArchetypeInfo {
    pub id: ArchetypeId,
    pub signature: Vec<String>,
    pub entity_count: usize,
    pub chunk_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy)]
    struct Position {
        #[allow(dead_code)]
        x: f32,
    }

    #[test]
    fn test_validate_fresh_world() {
        let world = World::new();
        assert_eq!(WorldInspector::validate(&world), Ok(()));
    }

    #[test]
    fn test_validate_after_churn() {
        let mut world = World::new();
        let mut entities = Vec::new();
        for i in 0..64 {
            let e = world.spawn();
            world.set(e, Position { x: i as f32 }).unwrap();
            entities.push(e);
        }
        for e in entities.iter().step_by(2) {
            world.destroy(*e).unwrap();
        }
        for e in entities.iter().skip(1).step_by(2) {
            world.unset::<Position>(*e).unwrap();
        }
        assert_eq!(WorldInspector::validate(&world), Ok(()));
    }

    #[test]
    fn test_component_labels() {
        let mut world = World::new();
        let position = world.register::<Position>();
        assert_eq!(
            WorldInspector::component_label(&world, position),
            "Position"
        );

        let parent = world.spawn();
        let child_of = world.child_of_id();
        let label =
            WorldInspector::component_label(&world, EntityId::pair(child_of, parent));
        assert!(label.starts_with("(ChildOf, "));
    }

    #[test]
    fn test_archetype_summary_counts() {
        let mut world = World::new();
        let e = world.spawn();
        world.set(e, Position { x: 0.0 }).unwrap();

        let summary = WorldInspector::archetype_summary(&world);
        let total: usize = summary.iter().map(|info| info.entity_count).sum();
        assert_eq!(total, world.entity_count());
        assert!(summary
            .iter()
            .any(|info| info.signature.contains(&"Position".to_string())));
    }
}
