use std::sync::atomic::Ordering;

use cermont_auth::domain::types::{
    AuditAction, ClientInfo, EVENT_SESSION_FAMILY_REVOKED, EVENT_TOKEN_REFRESHED,
};
use cermont_auth::error::AuthServiceError;
use cermont_auth::usecase::login::{LoginInput, LoginOutcome};
use cermont_auth::usecase::refresh::RefreshInput;
use cermont_auth::usecase::session::{SessionTokens, hash_refresh_token};

use crate::helpers::*;

async fn logged_in(h: &Harness, email: &str) -> SessionTokens {
    let outcome = h
        .login()
        .execute(LoginInput {
            email: email.to_owned(),
            password: TEST_PASSWORD.to_owned(),
            remember_me: false,
            two_factor_code: None,
            client: ClientInfo::default(),
        })
        .await
        .unwrap();
    // Drop the login's own side effects so assertions only see refresh ones.
    h.spawner.run_all().await;
    h.audit.entries.lock().unwrap().clear();
    match outcome {
        LoginOutcome::Authenticated(session) => session.tokens,
        other => panic!("expected Authenticated, got {other:?}"),
    }
}

fn refresh_input(token: &str) -> RefreshInput {
    RefreshInput {
        refresh_token: token.to_owned(),
        client: ClientInfo::default(),
    }
}

#[tokio::test]
async fn should_rotate_within_the_same_family() {
    let user = technician("rotate@cermont.test").await;
    let h = Harness::with_users(vec![user.clone()]);
    let first = logged_in(&h, "rotate@cermont.test").await;

    let second = h
        .refresh()
        .execute(refresh_input(&first.refresh_token))
        .await
        .unwrap();

    assert_ne!(second.refresh_token, first.refresh_token);
    assert_eq!(second.family, first.family);
    assert_eq!(signer().verify(&second.access_token).unwrap().user_id, user.id);

    let family = h.sessions.in_family(first.family);
    assert_eq!(family.len(), 2);
    let old = family
        .iter()
        .find(|s| s.token_hash == hash_refresh_token(&first.refresh_token))
        .unwrap();
    assert!(old.revoked, "presented session is revoked");
    assert!(old.revoked_at.is_some());
    let new = family
        .iter()
        .find(|s| s.token_hash == hash_refresh_token(&second.refresh_token))
        .unwrap();
    assert!(!new.revoked);

    h.spawner.run_all().await;
    assert_eq!(h.audit.actions(), vec![AuditAction::Refresh]);
    assert_eq!(h.events.kinds(), vec![EVENT_TOKEN_REFRESHED]);
}

#[tokio::test]
async fn should_revoke_family_when_rotated_token_is_replayed() {
    let user = technician("replay@cermont.test").await;
    let h = Harness::with_users(vec![user.clone()]);
    let first = logged_in(&h, "replay@cermont.test").await;
    let second = h
        .refresh()
        .execute(refresh_input(&first.refresh_token))
        .await
        .unwrap();
    h.spawner.run_all().await;
    h.audit.entries.lock().unwrap().clear();

    let replay = h
        .refresh()
        .execute(refresh_input(&first.refresh_token))
        .await;

    assert!(
        matches!(replay, Err(AuthServiceError::Unauthorized)),
        "expected Unauthorized, got {replay:?}"
    );
    assert!(
        h.sessions.in_family(first.family).iter().all(|s| s.revoked),
        "every session in the family is revoked"
    );

    // The legitimate holder is now logged out too.
    let follow_up = h
        .refresh()
        .execute(refresh_input(&second.refresh_token))
        .await;
    assert!(matches!(follow_up, Err(AuthServiceError::Unauthorized)));

    h.spawner.run_all().await;
    assert!(h.audit.actions().contains(&AuditAction::SecurityIncident));
    assert!(
        h.events
            .kinds()
            .contains(&EVENT_SESSION_FAMILY_REVOKED.to_owned())
    );
}

#[tokio::test]
async fn should_leave_other_families_alone_on_replay() {
    let user = technician("two-devices@cermont.test").await;
    let h = Harness::with_users(vec![user]);
    let phone = logged_in(&h, "two-devices@cermont.test").await;
    let laptop = logged_in(&h, "two-devices@cermont.test").await;

    h.refresh()
        .execute(refresh_input(&phone.refresh_token))
        .await
        .unwrap();
    let _ = h
        .refresh()
        .execute(refresh_input(&phone.refresh_token))
        .await;

    let laptop_sessions = h.sessions.in_family(laptop.family);
    assert!(laptop_sessions.iter().all(|s| !s.revoked));
    let rotated = h
        .refresh()
        .execute(refresh_input(&laptop.refresh_token))
        .await;
    assert!(rotated.is_ok(), "expected rotation, got {rotated:?}");
}

#[tokio::test]
async fn should_reject_expired_token_without_revoking_siblings() {
    let user = technician("expired@cermont.test").await;
    let h = Harness::with_users(vec![user]);
    let first = logged_in(&h, "expired@cermont.test").await;
    let second = h
        .refresh()
        .execute(refresh_input(&first.refresh_token))
        .await
        .unwrap();
    let third = h
        .refresh()
        .execute(refresh_input(&second.refresh_token))
        .await
        .unwrap();
    h.spawner.run_all().await;

    // Expire the live tail, then present it.
    h.sessions.expire(&hash_refresh_token(&third.refresh_token));
    let result = h
        .refresh()
        .execute(refresh_input(&third.refresh_token))
        .await;

    assert!(
        matches!(result, Err(AuthServiceError::Unauthorized)),
        "expected Unauthorized, got {result:?}"
    );
    let tail = h
        .sessions
        .all()
        .into_iter()
        .find(|s| s.token_hash == hash_refresh_token(&third.refresh_token))
        .unwrap();
    assert!(!tail.revoked, "expiry is not a theft signal");
    assert_eq!(h.spawner.pending(), 0, "no incident is recorded");
}

#[tokio::test]
async fn should_reject_unknown_and_empty_tokens() {
    let h = Harness::default();

    for token in ["", "never-issued"] {
        let result = h.refresh().execute(refresh_input(token)).await;
        assert!(
            matches!(result, Err(AuthServiceError::Unauthorized)),
            "expected Unauthorized for {token:?}, got {result:?}"
        );
    }
    assert!(h.sessions.all().is_empty());
}

#[tokio::test]
async fn should_reject_refresh_for_deactivated_user() {
    let user = technician("deactivated@cermont.test").await;
    let h = Harness::with_users(vec![user.clone()]);
    let first = logged_in(&h, "deactivated@cermont.test").await;
    h.users.update(user.id, |u| u.active = false);

    let result = h
        .refresh()
        .execute(refresh_input(&first.refresh_token))
        .await;

    assert!(
        matches!(result, Err(AuthServiceError::Unauthorized)),
        "expected Unauthorized, got {result:?}"
    );
    assert_eq!(
        h.sessions.in_family(first.family).len(),
        1,
        "no successor was issued"
    );
}

#[tokio::test]
async fn should_treat_lost_rotation_race_as_reuse() {
    let user = technician("race@cermont.test").await;
    let h = Harness::with_users(vec![user]);
    let first = logged_in(&h, "race@cermont.test").await;
    h.sessions.lose_next_revoke.store(true, Ordering::SeqCst);

    let result = h
        .refresh()
        .execute(refresh_input(&first.refresh_token))
        .await;

    assert!(
        matches!(result, Err(AuthServiceError::Unauthorized)),
        "expected Unauthorized, got {result:?}"
    );
    assert_eq!(h.sessions.in_family(first.family).len(), 1);
    assert!(h.sessions.live().is_empty());

    h.spawner.run_all().await;
    assert!(h.audit.actions().contains(&AuditAction::SecurityIncident));
}
