//! Domain verification: TXT challenge, pending TTL, reaper.

mod common;

use chrono::Duration;
use common::spawn_app;
use frontier_core::models::DomainState;

#[tokio::test]
async fn test_create_issues_pending_challenge() {
    let app = spawn_app();
    let domain = app
        .state
        .domains
        .create("o1", "Example.COM")
        .await
        .unwrap();

    assert_eq!(domain.state, DomainState::Pending);
    assert_eq!(domain.name, "example.com");
    assert_eq!(domain.challenge_name(), "_frontier-challenge.example.com");
    assert!(!domain.token.is_empty());
}

#[tokio::test]
async fn test_verify_advances_when_token_is_published() {
    let app = spawn_app();
    let domain = app.state.domains.create("o1", "example.com").await.unwrap();

    // without the record the domain stays pending
    let still_pending = app.state.domains.verify(domain.id).await.unwrap();
    assert_eq!(still_pending.state, DomainState::Pending);

    app.resolver.set(
        &domain.challenge_name(),
        vec!["unrelated".into(), domain.token.clone()],
    );
    let verified = app.state.domains.verify(domain.id).await.unwrap();
    assert_eq!(verified.state, DomainState::Verified);

    // verifying again is a no-op
    let again = app.state.domains.verify(domain.id).await.unwrap();
    assert_eq!(again.state, DomainState::Verified);

    let listed = app.state.domains.list_by_org("o1").await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].state, DomainState::Verified);
}

#[tokio::test]
async fn test_wrong_token_does_not_verify() {
    let app = spawn_app();
    let domain = app.state.domains.create("o1", "example.com").await.unwrap();
    app.resolver
        .set(&domain.challenge_name(), vec!["not-the-token".into()]);

    let result = app.state.domains.verify(domain.id).await.unwrap();
    assert_eq!(result.state, DomainState::Pending);
}

#[tokio::test]
async fn test_expired_pending_request_cannot_verify_and_is_reaped() {
    let app = spawn_app();
    let domain = app.state.domains.create("o1", "example.com").await.unwrap();
    app.resolver
        .set(&domain.challenge_name(), vec![domain.token.clone()]);

    app.clock.advance(Duration::days(8));
    let err = app.state.domains.verify(domain.id).await.unwrap_err();
    assert_eq!(err.code(), "failed_precondition");

    let stats = app.state.reaper(&app.config).sweep().await.unwrap();
    assert_eq!(stats.domains, 1);
    assert!(app
        .state
        .stores
        .domains
        .get(domain.id)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_invalid_names_are_rejected() {
    let app = spawn_app();
    for bad in ["", "nodot", "user@example.com", "exa mple.com"] {
        let err = app.state.domains.create("o1", bad).await.unwrap_err();
        assert_eq!(err.code(), "invalid_argument", "{bad:?}");
    }
}
