use relic_ecs::prelude::*;
use relic_ecs::WorldConfig;

#[derive(Debug, Clone, Copy, PartialEq)]
struct Likes;

#[derive(Debug, Clone, Copy, PartialEq)]
struct Owes;

#[derive(Debug, Clone, Copy, PartialEq)]
struct Amount(u32);

#[test]
fn test_child_of_target_and_wildcard_query() -> Result<()> {
    let mut world = World::new();

    let parent = world.spawn();
    let child = world.spawn();
    world.add_pair::<ChildOf>(child, parent)?;

    assert_eq!(world.target::<ChildOf>(child, 0), Some(parent));
    assert_eq!(world.parent(child), Some(parent));
    assert_eq!(world.parent(parent), None);

    // Term (ChildOf, *) matches the child
    let child_of = world.child_of_id();
    let query = world.query().with_pair(child_of, WILDCARD).build();
    let matched: Vec<EntityId> = query.iter(&world).map(|row| row.entity()).collect();
    assert_eq!(matched, vec![child]);
    Ok(())
}

#[test]
fn test_cascading_destroy() -> Result<()> {
    let mut world = World::new();

    let parent = world.spawn();
    let child = world.spawn();
    let grandchild = world.spawn();
    world.add_pair::<ChildOf>(child, parent)?;
    world.add_pair::<ChildOf>(grandchild, child)?;

    world.destroy(parent)?;

    assert!(!world.is_alive(parent));
    assert!(!world.is_alive(child));
    assert!(!world.is_alive(grandchild));
    Ok(())
}

#[test]
fn test_non_childof_pairs_are_cleaned_not_cascaded() -> Result<()> {
    let mut world = World::new();

    let target = world.spawn();
    let holder = world.spawn();
    world.add_pair::<Likes>(holder, target)?;
    assert!(world.has_pair::<Likes>(holder, target));

    world.destroy(target)?;

    // The holder survives; only its dangling pair is removed
    assert!(world.is_alive(holder));
    assert!(!world.has_pair::<Likes>(holder, target));
    Ok(())
}

#[test]
fn test_data_pair_payload_comes_from_second_half() -> Result<()> {
    let mut world = World::new();

    let e = world.spawn();
    world.set_pair::<Owes, Amount>(e, Amount(250))?;

    assert_eq!(world.get_pair::<Owes, Amount>(e), Some(&Amount(250)));

    // A pair targeting a plain entity is a tag, even with Owes registered
    let creditor = world.spawn();
    world.add_pair::<Owes>(e, creditor)?;
    let owes = world.component_id::<Owes>().unwrap();
    let tag_pair = EntityId::pair(owes, creditor);
    assert!(world.has_id(e, tag_pair));
    assert_eq!(world.component_bytes(e, tag_pair)?, &[] as &[u8]);
    Ok(())
}

#[test]
fn test_multiple_targets_in_signature_order() -> Result<()> {
    let mut world = World::new();

    let e = world.spawn();
    let a = world.spawn();
    let b = world.spawn();
    let c = world.spawn();
    world.add_pair::<Likes>(e, a)?;
    world.add_pair::<Likes>(e, b)?;
    world.add_pair::<Likes>(e, c)?;

    // Pair ids sort by target index, so targets come back in spawn order
    assert_eq!(world.target::<Likes>(e, 0), Some(a));
    assert_eq!(world.target::<Likes>(e, 1), Some(b));
    assert_eq!(world.target::<Likes>(e, 2), Some(c));
    assert_eq!(world.target::<Likes>(e, 3), None);
    Ok(())
}

#[test]
fn test_wildcard_first_matches_any_kind() -> Result<()> {
    let mut world = World::new();

    let target = world.spawn();
    let liker = world.spawn();
    let ower = world.spawn();
    world.add_pair::<Likes>(liker, target)?;
    world.add_pair::<Owes>(ower, target)?;

    let query = world.query().with_pair(WILDCARD, target).build();
    let mut matched: Vec<EntityId> = query.iter(&world).map(|row| row.entity()).collect();
    matched.sort();
    let mut expected = vec![liker, ower];
    expected.sort();
    assert_eq!(matched, expected);
    Ok(())
}

#[test]
fn test_strict_pairs_reject_dead_halves() {
    let mut world = World::new();

    let holder = world.spawn();
    let target = world.spawn();
    world.destroy(target).unwrap();

    assert!(matches!(
        world.add_pair::<Likes>(holder, target),
        Err(EcsError::DeadEntity(_))
    ));
}

#[test]
fn test_lenient_pairs_permit_dead_halves() {
    let mut world = World::with_config(WorldConfig {
        strict_pairs: false,
    });

    let holder = world.spawn();
    let target = world.spawn();
    world.destroy(target).unwrap();

    world.add_pair::<Likes>(holder, target).unwrap();
    let likes = world.component_id::<Likes>().unwrap();
    assert!(world.has_id(holder, EntityId::pair(likes, target)));
}

#[test]
fn test_protected_parent_blocks_destroy() -> Result<()> {
    let mut world = World::new();

    let parent = world.spawn();
    world.set(parent, DoNotDelete)?;

    assert_eq!(
        world.destroy(parent),
        Err(EcsError::ProtectedEntity(parent))
    );
    assert!(world.is_alive(parent));
    Ok(())
}
