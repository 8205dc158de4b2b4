#![cfg(all(feature = "memory-store", feature = "memory-cache"))]

use futures::executor::block_on;
use resource_authz::{
    AuthorizationPredicate, Engine, EngineBuilder, Error, MemoryCache, MemoryStore, ResourceId,
};

type TestEngine = Engine<MemoryStore, MemoryCache>;

fn setup() -> (MemoryStore, TestEngine) {
    let store = MemoryStore::new();
    let engine = block_on(
        EngineBuilder::new(store.clone())
            .cache(MemoryCache::new())
            .build(),
    )
    .unwrap();
    (store, engine)
}

fn sorted(mut ids: Vec<ResourceId>) -> Vec<ResourceId> {
    ids.sort_unstable();
    ids
}

fn scope_of(engine: &TestEngine, resource: ResourceId) -> Vec<ResourceId> {
    sorted(block_on(engine.authorization_scope(resource)).unwrap().into_vec())
}

fn allowed(engine: &TestEngine, authorized: ResourceId, target: ResourceId, action: &str) -> bool {
    block_on(engine.has_permission(authorized, target, &[action])).unwrap()
}

fn link(engine: &TestEngine, parent: ResourceId, child: ResourceId) {
    block_on(engine.add_permission_inheritance(parent, child)).unwrap();
}

fn unlink(engine: &TestEngine, parent: ResourceId, child: ResourceId) {
    block_on(engine.remove_permission_inheritance(parent, child)).unwrap();
}

fn targets_with_permission(
    store: &MemoryStore,
    engine: &TestEngine,
    authorized: ResourceId,
    actions: &[&str],
) -> Vec<ResourceId> {
    let predicate =
        block_on(engine.authorization_predicate(authorized, "tr.resource_id", actions)).unwrap();
    store.select_resources(&predicate)
}

#[test]
fn permission_manipulation_over_diamond_graph() {
    let (store, engine) = setup();
    let [a1, a2, a3, a4, a5, a6, a7, a8] = store.add_resources();
    let [t1, t2, t3, t4, t5, t6, t7, t8] = store.add_resources();
    let action = "action1";

    for (authorized, target) in [
        (a1, t1),
        (a2, t2),
        (a3, t3),
        (a4, t4),
        (a5, t5),
        (a6, t6),
        (a7, t7),
        (a8, t8),
    ] {
        block_on(engine.add_permission(authorized, target, action)).unwrap();
    }
    for (parent, child) in [
        (a1, a3),
        (a1, a4),
        (a2, a4),
        (a2, a5),
        (a3, a6),
        (a4, a6),
        (a4, a7),
        (a5, a7),
        (a6, a8),
        (a7, a8),
    ] {
        link(&engine, parent, child);
    }

    assert_eq!(scope_of(&engine, a6), vec![a1, a2, a3, a4, a6]);

    assert!(!allowed(&engine, a1, t1, "x"));
    assert!(allowed(&engine, a1, t1, action));
    assert!(allowed(&engine, a8, t1, action));
    assert!(!allowed(&engine, a1, t8, action));
    assert!(allowed(&engine, a8, t4, action));

    unlink(&engine, a4, a7);
    assert!(allowed(&engine, a8, t4, action));

    unlink(&engine, a4, a6);
    assert!(!allowed(&engine, a8, t4, action));
    assert!(allowed(&engine, a8, t2, action));
    assert_eq!(scope_of(&engine, a6), vec![a1, a3, a6]);

    unlink(&engine, a2, a5);
    assert!(!allowed(&engine, a8, t2, action));

    assert!(allowed(&engine, a8, t1, action));
    block_on(engine.remove_permission(a1, t1, action)).unwrap();
    assert!(!allowed(&engine, a8, t1, action));

    block_on(engine.clear_cache());
    assert!(!allowed(&engine, a8, t1, action));
    assert!(allowed(&engine, a8, t8, action));
}

#[test]
fn grant_survives_until_every_path_is_cut() {
    let (store, engine) = setup();
    let [a1, a2, a3, a4, a5, a6, a7, a8] = store.add_resources();
    let t1 = store.add_resource();
    for (parent, child) in [
        (a1, a3),
        (a3, a6),
        (a1, a4),
        (a4, a6),
        (a2, a4),
        (a2, a5),
        (a5, a7),
        (a4, a7),
        (a6, a8),
        (a7, a8),
    ] {
        link(&engine, parent, child);
    }
    block_on(engine.add_permission(a1, t1, "action1")).unwrap();

    assert!(allowed(&engine, a8, t1, "action1"));

    unlink(&engine, a4, a6);
    assert!(allowed(&engine, a8, t1, "action1"));

    unlink(&engine, a3, a6);
    // a1 -> a4 -> a7 -> a8 still carries the grant.
    assert!(allowed(&engine, a8, t1, "action1"));
    assert!(!allowed(&engine, a6, t1, "action1"));

    unlink(&engine, a4, a7);
    assert!(!allowed(&engine, a8, t1, "action1"));
}

#[test]
fn incremental_edges_extend_scope() {
    let (store, engine) = setup();
    let [a1, a2, a3, a4] = store.add_resources();

    assert_eq!(scope_of(&engine, a1), vec![a1]);

    link(&engine, a3, a4);
    assert_eq!(scope_of(&engine, a4), vec![a3, a4]);

    link(&engine, a1, a3);
    assert_eq!(scope_of(&engine, a4), vec![a1, a3, a4]);
    assert_eq!(scope_of(&engine, a3), vec![a1, a3]);

    link(&engine, a2, a4);
    assert_eq!(scope_of(&engine, a4), vec![a1, a2, a3, a4]);

    unlink(&engine, a3, a4);
    assert_eq!(scope_of(&engine, a4), vec![a2, a4]);
}

#[test]
fn cyclic_inheritance_resolves_each_member_once() {
    let (store, engine) = setup();
    let [a1, a2, a3] = store.add_resources();
    link(&engine, a1, a2);
    link(&engine, a2, a1);
    link(&engine, a1, a3);
    link(&engine, a2, a3);

    assert_eq!(scope_of(&engine, a3), vec![a1, a2, a3]);
    assert_eq!(scope_of(&engine, a1), vec![a1, a2]);
    assert_eq!(scope_of(&engine, a2), vec![a1, a2]);
}

#[test]
fn removal_is_served_from_cache_as_false() {
    let (store, engine) = setup();
    let [a, t] = store.add_resources();

    block_on(engine.add_permission(a, t, "read")).unwrap();
    block_on(engine.remove_permission(a, t, "read")).unwrap();
    let reads = store.read_count();

    assert!(!allowed(&engine, a, t, "read"));
    // Only the scope of `a` needed loading; the permission came from cache.
    assert_eq!(store.read_count() - reads, 2);
}

#[test]
fn invalid_authorized_resource_leaves_no_trace() {
    let (store, engine) = setup();
    let t = store.add_resource();
    let invalid = ResourceId::new(-1);

    let result = block_on(engine.add_permission(invalid, t, "read"));

    assert!(matches!(result, Err(Error::ResourceNotFound(_))));
    assert_eq!(store.permission_count(), 0);
    assert_eq!(engine.cache().permission_entries(), 0);
}

#[test]
fn query_extension_filters_like_has_permission() {
    let (store, engine) = setup();
    let [a1, a2, a3] = store.add_resources();
    let [t1, t2, t3] = store.add_resources();

    block_on(engine.add_permission(a1, t1, "action1")).unwrap();
    block_on(engine.add_permission(a1, t1, "action2")).unwrap();
    block_on(engine.add_permission(a2, t2, "action1")).unwrap();
    block_on(engine.add_permission(a3, t3, "action3")).unwrap();
    link(&engine, a1, a2);
    link(&engine, a1, a3);

    assert_eq!(
        targets_with_permission(&store, &engine, a1, &["action1"]),
        vec![t1]
    );
    assert_eq!(
        targets_with_permission(&store, &engine, a2, &["action1"]),
        vec![t1, t2]
    );
    assert_eq!(
        targets_with_permission(&store, &engine, a2, &["action2"]),
        vec![t1]
    );
    assert!(targets_with_permission(&store, &engine, a2, &["action4"]).is_empty());
    assert_eq!(
        targets_with_permission(&store, &engine, a3, &["action3", "action2"]),
        vec![t1, t3]
    );
}

#[test]
fn predicate_matches_per_row_checks() {
    let (store, engine) = setup();
    let principals: [ResourceId; 5] = store.add_resources();
    let targets: [ResourceId; 6] = store.add_resources();
    let [p0, p1, p2, p3, p4] = principals;
    link(&engine, p0, p1);
    link(&engine, p1, p2);
    link(&engine, p2, p0);
    link(&engine, p3, p4);

    for (index, target) in targets.iter().enumerate() {
        let holder = principals[index % principals.len()];
        let action = if index % 2 == 0 { "read" } else { "write" };
        block_on(engine.add_permission(holder, *target, action)).unwrap();
    }

    for principal in principals {
        for actions in [&["read"][..], &["write"][..], &["write", "read"][..]] {
            let filtered: Vec<ResourceId> =
                targets_with_permission(&store, &engine, principal, actions)
                    .into_iter()
                    .filter(|id| targets.contains(id))
                    .collect();
            let checked: Vec<ResourceId> = targets
                .iter()
                .copied()
                .filter(|target| {
                    block_on(engine.has_permission(principal, *target, actions)).unwrap()
                })
                .collect();
            assert_eq!(filtered, checked, "principal {principal}, actions {actions:?}");
        }
    }
}

#[test]
fn system_resource_is_allowed_everything() {
    let (store, engine) = setup();
    let system = engine.system_resource_id();
    let invalid = ResourceId::new(-1);

    assert!(allowed(&engine, system, invalid, "anything"));

    let a1 = store.add_resource();
    link(&engine, system, a1);

    assert!(allowed(&engine, a1, invalid, "anything"));
    assert!(
        block_on(engine.authorization_predicate(system, "tr.resource_id", &["x"]))
            .unwrap()
            .is_always()
    );
    assert_eq!(targets_with_permission(&store, &engine, a1, &["x"]), vec![system, a1]);
    assert_eq!(targets_with_permission(&store, &engine, system, &["x"]), vec![system, a1]);
}

#[test]
fn system_resource_id_is_stable_across_engines() {
    let store = MemoryStore::new();
    let first = block_on(EngineBuilder::new(store.clone()).build()).unwrap();
    let second = block_on(EngineBuilder::new(store.clone()).build()).unwrap();

    assert_eq!(first.system_resource_id(), second.system_resource_id());
}

#[test]
fn injected_system_resource_skips_bootstrap() {
    let store = MemoryStore::new();
    let system = store.add_resource();
    let engine = block_on(
        EngineBuilder::new(store.clone())
            .system_resource_id(system)
            .build(),
    )
    .unwrap();

    assert_eq!(engine.system_resource_id(), system);
    assert_eq!(store.resource_count(), 1);
}

#[test]
fn predicate_rejects_invalid_actions() {
    let (_store, engine) = setup();
    let none: [&str; 0] = [];

    let result = block_on(engine.authorization_predicate(ResourceId::new(1), "t.id", &none));
    assert!(matches!(result, Err(Error::MissingActions)));

    let result = block_on(engine.authorization_predicate(ResourceId::new(1), "t.id", &[""]));
    assert!(matches!(result, Err(Error::InvalidAction(_))));
}

#[test]
fn predicate_sql_embeds_resolved_scope() {
    let (store, engine) = setup();
    let [parent, child] = store.add_resources();
    link(&engine, parent, child);

    let predicate =
        block_on(engine.authorization_predicate(child, "book.resource_id", &["read"])).unwrap();
    let AuthorizationPredicate::PermissionExists { authorized, .. } = &predicate else {
        panic!("expected a permission sub-query");
    };
    assert_eq!(authorized, &vec![child, parent]);

    let fragment = predicate.to_sql(1);
    assert!(fragment.sql.starts_with("EXISTS (SELECT 1 FROM permission"));
    assert!(fragment.sql.contains("= book.resource_id"));
    assert_eq!(fragment.params.len(), 3);
}
