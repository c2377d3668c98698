//! Session lifecycle: validation window, disabled users, reaper.

mod common;

use chrono::Duration;
use common::spawn_app;
use frontier_core::models::{Principal, Session};
use frontier_core::store::Clock;
use uuid::Uuid;

async fn onboarded_principal(app: &common::TestApp, email: &str) -> Principal {
    let start = app
        .state
        .authn
        .start(frontier_core::models::AuthMethod::MailOtp, email)
        .await
        .unwrap();
    let code = common::extract_otp(&app.mailer.last().unwrap().body);
    app.state
        .authn
        .finish(frontier_core::models::AuthMethod::MailOtp, start.flow_id, &code)
        .await
        .unwrap()
}

#[tokio::test]
async fn test_session_expires_at_ttl() {
    let app = spawn_app();
    let principal = onboarded_principal(&app, "alice@example.com").await;

    let session = app.state.sessions.create(&principal).await.unwrap();
    app.state.sessions.validate(session.id).await.unwrap();

    app.clock
        .advance(Duration::seconds(app.config.session.ttl_secs));
    let err = app.state.sessions.validate(session.id).await.unwrap_err();
    assert_eq!(err.code(), "unauthenticated");
}

#[tokio::test]
async fn test_missing_session_is_invalid() {
    let app = spawn_app();
    let err = app
        .state
        .sessions
        .validate(Uuid::new_v4())
        .await
        .unwrap_err();
    assert_eq!(err.code(), "unauthenticated");
}

#[tokio::test]
async fn test_disabled_user_invalidates_sessions() {
    let app = spawn_app();
    let principal = onboarded_principal(&app, "alice@example.com").await;
    let session = app.state.sessions.create(&principal).await.unwrap();

    let user_id = Uuid::parse_str(&principal.id).unwrap();
    app.state.users.disable(user_id).await.unwrap();

    let err = app.state.sessions.validate(session.id).await.unwrap_err();
    assert_eq!(err.code(), "unauthenticated");
}

#[tokio::test]
async fn test_delete_is_idempotent() {
    let app = spawn_app();
    let principal = onboarded_principal(&app, "alice@example.com").await;
    let session = app.state.sessions.create(&principal).await.unwrap();

    app.state.sessions.delete(session.id).await.unwrap();
    app.state.sessions.delete(session.id).await.unwrap();

    let err = app.state.sessions.validate(session.id).await.unwrap_err();
    assert_eq!(err.code(), "unauthenticated");
}

#[tokio::test]
async fn test_reaper_removes_expired_rows() {
    let app = spawn_app();
    let principal = onboarded_principal(&app, "alice@example.com").await;
    let user_id = Uuid::parse_str(&principal.id).unwrap();

    // a session that expired one second ago
    let expired = Session::new(user_id, Duration::seconds(-1), app.state.clock.now());
    let expired_id = expired.id;
    app.state.stores.sessions.insert(expired).await.unwrap();

    let live = app.state.sessions.create(&principal).await.unwrap();

    let reaper = app.state.reaper(&app.config);
    let stats = reaper.sweep().await.unwrap();
    assert_eq!(stats.sessions, 1);

    // the expired row is gone, the live one stays
    assert!(app
        .state
        .stores
        .sessions
        .get(expired_id)
        .await
        .unwrap()
        .is_none());
    let err = app.state.sessions.validate(expired_id).await.unwrap_err();
    assert_eq!(err.code(), "unauthenticated");
    app.state.sessions.validate(live.id).await.unwrap();
}

#[tokio::test]
async fn test_sessions_are_only_for_users() {
    let app = spawn_app();
    let err = app
        .state
        .sessions
        .create(&Principal::service_user(Uuid::new_v4().to_string()))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "invalid_argument");
}
