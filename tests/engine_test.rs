//! Permission engine behavior: direct grants, subject sets, arrows,
//! set algebra, lookups and batch checks.

mod common;

use common::{spawn_app, spawn_app_with_schema};
use frontier_core::engine::CheckRequest;
use frontier_core::models::{Object, Relation, Subject};
use frontier_core::schema::{
    NamespaceDef, NamespaceKind, PermissionDef, RelationDef, SchemaDocument, SubjectKind,
};

fn obj(namespace: &str, id: &str) -> Object {
    Object::new(namespace, id)
}

fn user(id: &str) -> Subject {
    Subject::new("user", id)
}

async fn insert(app: &common::TestApp, object: Object, relation: &str, subject: Subject) {
    app.state
        .stores
        .relations
        .insert(Relation::new(object, relation, subject))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_direct_member_grants_membership() {
    let app = spawn_app();
    insert(&app, obj("org", "o1"), "member", user("alice")).await;

    let engine = &app.state.engine;
    assert!(engine
        .check(&user("alice"), "membership", &obj("org", "o1"))
        .await
        .unwrap());
    assert!(!engine
        .check(&user("bob"), "membership", &obj("org", "o1"))
        .await
        .unwrap());
    assert!(!engine
        .check(&user("alice"), "membership", &obj("org", "o2"))
        .await
        .unwrap());
}

#[tokio::test]
async fn test_subject_set_membership_is_transitive() {
    let app = spawn_app();
    // alice is in group g1; g1's members are org members
    insert(&app, obj("group", "g1"), "member", user("alice")).await;
    insert(
        &app,
        obj("org", "o1"),
        "member",
        Subject::subject_set("group", "g1", "member"),
    )
    .await;

    assert!(app
        .state
        .engine
        .check(&user("alice"), "membership", &obj("org", "o1"))
        .await
        .unwrap());
    assert!(!app
        .state
        .engine
        .check(&user("bob"), "membership", &obj("org", "o1"))
        .await
        .unwrap());
}

#[tokio::test]
async fn test_arrow_permission_follows_parent_org() {
    let app = spawn_app();
    // alice administers o1; proj1 belongs to o1
    insert(&app, obj("org", "o1"), "admin", user("alice")).await;
    insert(
        &app,
        obj("project", "proj1"),
        "org",
        Subject::new("org", "o1"),
    )
    .await;

    let engine = &app.state.engine;
    assert!(engine
        .check(&user("alice"), "admin", &obj("project", "proj1"))
        .await
        .unwrap());

    // removing the parent link flips the verdict
    app.state
        .stores
        .relations
        .delete(
            &frontier_core::models::RelationFilter::object("project", "proj1")
                .with_relation("org"),
        )
        .await
        .unwrap();
    assert!(!engine
        .check(&user("alice"), "admin", &obj("project", "proj1"))
        .await
        .unwrap());
}

#[tokio::test]
async fn test_unknown_permission_is_schema_error() {
    let app = spawn_app();
    let err = app
        .state
        .engine
        .check(&user("alice"), "launch", &obj("org", "o1"))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "schema");

    let err = app
        .state
        .engine
        .check(&user("alice"), "membership", &obj("warehouse", "w1"))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "schema");
}

#[tokio::test]
async fn test_difference_excludes_banned() {
    let doc = SchemaDocument {
        namespaces: vec![
            NamespaceDef {
                name: "user".into(),
                kind: NamespaceKind::Principal,
                relations: vec![],
                permissions: vec![],
            },
            NamespaceDef {
                name: "doc".into(),
                kind: NamespaceKind::Resource,
                relations: vec![
                    RelationDef {
                        name: "reader".into(),
                        subject_kinds: vec![SubjectKind {
                            namespace: "user".into(),
                            sub_relation: None,
                        }],
                    },
                    RelationDef {
                        name: "banned".into(),
                        subject_kinds: vec![SubjectKind {
                            namespace: "user".into(),
                            sub_relation: None,
                        }],
                    },
                ],
                permissions: vec![PermissionDef {
                    name: "view".into(),
                    expression: "reader - banned".into(),
                }],
            },
        ],
    };
    let app = spawn_app_with_schema(doc);

    insert(&app, obj("doc", "d1"), "reader", user("alice")).await;
    insert(&app, obj("doc", "d1"), "reader", user("mallory")).await;
    insert(&app, obj("doc", "d1"), "banned", user("mallory")).await;

    let engine = &app.state.engine;
    assert!(engine
        .check(&user("alice"), "view", &obj("doc", "d1"))
        .await
        .unwrap());
    assert!(!engine
        .check(&user("mallory"), "view", &obj("doc", "d1"))
        .await
        .unwrap());
}

#[tokio::test]
async fn test_check_agrees_with_both_lookups() {
    let app = spawn_app();
    insert(&app, obj("org", "o1"), "member", user("alice")).await;
    insert(&app, obj("org", "o1"), "owner", user("carol")).await;
    insert(&app, obj("org", "o2"), "member", user("alice")).await;

    let engine = &app.state.engine;

    let resources = engine
        .lookup_resources(&user("alice"), "membership", "org")
        .await
        .unwrap();
    assert_eq!(resources, vec!["o1".to_string(), "o2".to_string()]);

    let subjects = engine
        .lookup_subjects("user", &obj("org", "o1"), "membership")
        .await
        .unwrap();
    assert_eq!(subjects, vec!["alice".to_string(), "carol".to_string()]);

    // check ≡ membership in both lookups
    for org in ["o1", "o2"] {
        for who in ["alice", "carol"] {
            let checked = engine
                .check(&user(who), "membership", &obj("org", org))
                .await
                .unwrap();
            let via_resources = engine
                .lookup_resources(&user(who), "membership", "org")
                .await
                .unwrap()
                .contains(&org.to_string());
            let via_subjects = engine
                .lookup_subjects("user", &obj("org", org), "membership")
                .await
                .unwrap()
                .contains(&who.to_string());
            assert_eq!(checked, via_resources);
            assert_eq!(checked, via_subjects);
        }
    }
}

#[tokio::test]
async fn test_batch_check_preserves_order() {
    let app = spawn_app();
    insert(&app, obj("org", "o1"), "member", user("alice")).await;

    let requests = vec![
        CheckRequest {
            subject: user("alice"),
            permission: "membership".into(),
            object: obj("org", "o1"),
        },
        CheckRequest {
            subject: user("bob"),
            permission: "membership".into(),
            object: obj("org", "o1"),
        },
        // repeated pair fuses through the memo but keeps its slot
        CheckRequest {
            subject: user("alice"),
            permission: "membership".into(),
            object: obj("org", "o1"),
        },
    ];
    let results = app.state.engine.batch_check(requests.clone()).await.unwrap();

    assert_eq!(results.len(), 3);
    assert_eq!(results[0].request, requests[0]);
    assert!(results[0].allowed);
    assert!(!results[1].allowed);
    assert!(results[2].allowed);
}

#[tokio::test]
async fn test_monotone_cycle_terminates() {
    let doc = SchemaDocument {
        namespaces: vec![
            NamespaceDef {
                name: "user".into(),
                kind: NamespaceKind::Principal,
                relations: vec![],
                permissions: vec![],
            },
            NamespaceDef {
                name: "doc".into(),
                kind: NamespaceKind::Resource,
                relations: vec![RelationDef {
                    name: "owner".into(),
                    subject_kinds: vec![SubjectKind {
                        namespace: "user".into(),
                        sub_relation: None,
                    }],
                }],
                permissions: vec![
                    PermissionDef {
                        name: "view".into(),
                        expression: "owner | edit".into(),
                    },
                    PermissionDef {
                        name: "edit".into(),
                        expression: "owner | view".into(),
                    },
                ],
            },
        ],
    };
    let app = spawn_app_with_schema(doc);
    insert(&app, obj("doc", "d1"), "owner", user("alice")).await;

    let engine = &app.state.engine;
    assert!(engine
        .check(&user("alice"), "view", &obj("doc", "d1"))
        .await
        .unwrap());
    assert!(!engine
        .check(&user("bob"), "view", &obj("doc", "d1"))
        .await
        .unwrap());
}
