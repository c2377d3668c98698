//! Policy materialization: role grants become relation tuples and stay
//! in lockstep with the policy rows.

mod common;

use common::spawn_app;
use frontier_core::models::{Object, Principal, Relation, RelationFilter, Role, Subject};
use frontier_core::store::Clock;

#[tokio::test]
async fn test_policy_create_materializes_one_tuple_per_permission() {
    let app = spawn_app();
    let role = app
        .state
        .roles
        .create("editor", "project", vec!["view".into(), "edit".into()])
        .await
        .unwrap();

    let policy = app
        .state
        .policies
        .create(
            role.id,
            Principal::user("bob"),
            Object::new("project", "proj1"),
        )
        .await
        .unwrap();

    let tuples = app
        .state
        .stores
        .relations
        .list(&RelationFilter::object("project", "proj1"))
        .await
        .unwrap();
    assert_eq!(tuples.len(), 2);
    for permission in ["view", "edit"] {
        let matching: Vec<&Relation> = tuples
            .iter()
            .filter(|t| t.relation == permission && t.subject == Subject::new("user", "bob"))
            .collect();
        assert_eq!(matching.len(), 1, "exactly one {permission} tuple");
    }

    assert!(app
        .state
        .engine
        .check(
            &Subject::new("user", "bob"),
            "view",
            &Object::new("project", "proj1")
        )
        .await
        .unwrap());

    // deleting the policy removes both tuples
    app.state.policies.delete(policy.id).await.unwrap();
    let tuples = app
        .state
        .stores
        .relations
        .list(&RelationFilter::object("project", "proj1"))
        .await
        .unwrap();
    assert!(tuples.is_empty());
    assert!(!app
        .state
        .engine
        .check(
            &Subject::new("user", "bob"),
            "view",
            &Object::new("project", "proj1")
        )
        .await
        .unwrap());
}

#[tokio::test]
async fn test_policy_delete_is_idempotent() {
    let app = spawn_app();
    let role = app
        .state
        .roles
        .create("viewer", "project", vec!["view".into()])
        .await
        .unwrap();
    let policy = app
        .state
        .policies
        .create(
            role.id,
            Principal::user("bob"),
            Object::new("project", "proj1"),
        )
        .await
        .unwrap();

    app.state.policies.delete(policy.id).await.unwrap();
    app.state.policies.delete(policy.id).await.unwrap();
}

#[tokio::test]
async fn test_failed_tuple_insert_rolls_the_policy_back() {
    let app = spawn_app();
    // a role carrying an undeclared permission, planted behind the
    // role service's validation
    let role = app
        .state
        .stores
        .roles
        .insert(Role::new(
            "broken".into(),
            "project".into(),
            vec!["view".into(), "launch_rockets".into()],
            app.state.clock.now(),
        ))
        .await
        .unwrap();

    let err = app
        .state
        .policies
        .create(
            role.id,
            Principal::user("bob"),
            Object::new("project", "proj1"),
        )
        .await
        .unwrap_err();
    assert_eq!(err.code(), "invalid_argument");

    // neither the policy nor the first tuple survive
    let policies = app
        .state
        .policies
        .list(&Default::default())
        .await
        .unwrap();
    assert!(policies.is_empty());
    let tuples = app
        .state
        .stores
        .relations
        .list(&RelationFilter::object("project", "proj1"))
        .await
        .unwrap();
    assert!(tuples.is_empty());
}

#[tokio::test]
async fn test_role_validation() {
    let app = spawn_app();
    let err = app
        .state
        .roles
        .create("x", "project", vec!["launch_rockets".into()])
        .await
        .unwrap_err();
    assert_eq!(err.code(), "invalid_argument");

    let err = app
        .state
        .roles
        .create("x", "warehouse", vec!["view".into()])
        .await
        .unwrap_err();
    assert_eq!(err.code(), "invalid_argument");

    let err = app
        .state
        .roles
        .create("x", "project", vec![])
        .await
        .unwrap_err();
    assert_eq!(err.code(), "invalid_argument");

    // duplicate name within a namespace
    app.state
        .roles
        .create("viewer", "project", vec!["view".into()])
        .await
        .unwrap();
    let err = app
        .state
        .roles
        .create("viewer", "project", vec!["view".into()])
        .await
        .unwrap_err();
    assert_eq!(err.code(), "already_exists");
}

#[tokio::test]
async fn test_policy_requires_matching_namespace() {
    let app = spawn_app();
    let role = app
        .state
        .roles
        .create("viewer", "project", vec!["view".into()])
        .await
        .unwrap();

    let err = app
        .state
        .policies
        .create(role.id, Principal::user("bob"), Object::new("org", "o1"))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "invalid_argument");
}
