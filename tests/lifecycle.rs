use relic_ecs::prelude::*;
use relic_ecs::WorldInspector;

#[derive(Debug, Clone, Copy, PartialEq)]
struct Position {
    x: f32,
    y: f32,
    z: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Velocity {
    x: f32,
    y: f32,
}

#[test]
fn test_basic_lifecycle() -> Result<()> {
    let mut world = World::new();

    let e = world.spawn();
    world.set(
        e,
        Position {
            x: 1.0,
            y: 2.0,
            z: 3.0,
        },
    )?;
    world.set(e, Velocity { x: 4.0, y: 5.0 })?;

    assert!(world.has::<Position>(e));
    assert!(world.has::<Velocity>(e));

    let position = world.component_id::<Position>().unwrap();
    let velocity = world.component_id::<Velocity>().unwrap();
    let signature: Vec<EntityId> = world
        .archetype_of(e)
        .unwrap()
        .signature()
        .iter()
        .map(|c| c.id)
        .collect();
    assert_eq!(signature.len(), 2);
    assert!(signature.contains(&position));
    assert!(signature.contains(&velocity));

    world.unset::<Velocity>(e)?;
    let signature: Vec<EntityId> = world
        .archetype_of(e)
        .unwrap()
        .signature()
        .iter()
        .map(|c| c.id)
        .collect();
    assert_eq!(signature, vec![position]);
    assert_eq!(
        world.get::<Position>(e),
        Some(&Position {
            x: 1.0,
            y: 2.0,
            z: 3.0
        })
    );
    Ok(())
}

#[test]
fn test_swap_remove_integrity() -> Result<()> {
    let mut world = World::new();

    let spawn_at = |world: &mut World, x: f32| {
        let e = world.spawn();
        world
            .set(e, Position { x, y: 0.0, z: 0.0 })
            .unwrap();
        e
    };

    let _e1 = spawn_at(&mut world, 1.0);
    let e2 = spawn_at(&mut world, 2.0);
    let e3 = spawn_at(&mut world, 3.0);

    let e2_row = world.location(e2).unwrap().row;
    world.destroy(e2)?;

    // e3 was swapped into e2's old row
    assert_eq!(world.location(e3).unwrap().row, e2_row);

    let query = world.query().with::<Position>().build();
    let mut xs: Vec<f32> = query
        .iter(&world)
        .map(|row| row.get::<Position>().unwrap().x)
        .collect();
    xs.sort_by(f32::total_cmp);
    assert_eq!(xs, vec![1.0, 3.0]);
    Ok(())
}

#[test]
fn test_recycled_ids_are_distinguishable() {
    let mut world = World::new();

    let e = world.spawn();
    world.destroy(e).unwrap();
    let e2 = world.spawn();

    assert_ne!(e, e2);
    assert!(!world.is_alive(e));
    assert!(world.is_alive(e2));
    assert_eq!(e.index(), e2.index());
    assert_ne!(e.generation(), e2.generation());
}

#[test]
fn test_set_unset_roundtrip_keeps_other_components() -> Result<()> {
    let mut world = World::new();

    let e = world.spawn();
    world.set(
        e,
        Position {
            x: 1.0,
            y: 2.0,
            z: 3.0,
        },
    )?;
    world.set(e, Velocity { x: 4.0, y: 5.0 })?;

    world.unset::<Velocity>(e)?;
    assert!(!world.has::<Velocity>(e));
    assert_eq!(world.get::<Position>(e).unwrap().z, 3.0);

    // Repeated unset is a no-op, not an error
    world.unset::<Velocity>(e)?;
    world.unset::<Velocity>(e)?;
    assert!(world.is_alive(e));
    Ok(())
}

#[test]
fn test_entity_row_mapping_stays_consistent() -> Result<()> {
    let mut world = World::new();

    let mut entities = Vec::new();
    for i in 0..100 {
        let e = world.spawn();
        world.set(
            e,
            Position {
                x: i as f32,
                y: 0.0,
                z: 0.0,
            },
        )?;
        entities.push(e);
    }

    // Destroy every third entity, then verify every survivor's record
    // still points at its own row.
    for e in entities.iter().step_by(3) {
        world.destroy(*e)?;
    }
    for (i, &e) in entities.iter().enumerate() {
        if i % 3 == 0 {
            assert!(!world.is_alive(e));
            continue;
        }
        let record = world.location(e).unwrap();
        let archetype = world.archetype_of(e).unwrap();
        assert_eq!(archetype.entity_at(record.row as usize), e);
        assert_eq!(world.get::<Position>(e).unwrap().x, i as f32);
    }

    // Archetype count bookkeeping: live rows equal chunk sums
    let archetype = world.archetype_of(entities[1]).unwrap();
    let chunk_sum: usize = archetype.chunks().iter().map(|c| c.len()).sum();
    assert_eq!(archetype.len(), chunk_sum);

    assert_eq!(WorldInspector::validate(&world), Ok(()));
    Ok(())
}

#[test]
fn test_spawn_with_explicit_id() -> Result<()> {
    let mut world = World::new();

    let chosen = EntityId::new(500, 0);
    let e = world.spawn_with(chosen)?;
    assert_eq!(e, chosen);
    assert!(world.is_alive(e));

    // Same index again conflicts
    assert!(matches!(
        world.spawn_with(chosen),
        Err(EcsError::AlreadyAlive(_))
    ));
    Ok(())
}
