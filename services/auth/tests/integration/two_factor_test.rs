use cermont_auth::domain::types::EVENT_ONE_TIME_CODE_ISSUED;
use cermont_auth::error::AuthServiceError;

use crate::helpers::*;

fn wrong_code(code: &str) -> &'static str {
    if code == "111111" { "222222" } else { "111111" }
}

#[tokio::test]
async fn should_send_six_digit_code_with_five_minute_lifetime() {
    let user = admin_with_two_factor("otp@cermont.test").await;
    let h = Harness::with_users(vec![user.clone()]);

    let sent = h.one_time_codes().send("otp@cermont.test").await.unwrap();

    assert_eq!(sent.expires_in_secs, 300);
    let codes = h.codes.all();
    assert_eq!(codes.len(), 1);
    assert_eq!(codes[0].attempts, 0);
    assert_eq!(codes[0].code.len(), 6);
    assert!(codes[0].code.chars().all(|c| c.is_ascii_digit()));

    // Delivery is deferred to the event publisher.
    assert!(h.events.kinds().is_empty());
    h.spawner.run_all().await;
    let event = h.events.last().expect("event published");
    assert_eq!(event.kind, EVENT_ONE_TIME_CODE_ISSUED);
    assert_eq!(event.payload["code"], codes[0].code);
    assert_eq!(event.user_id, Some(user.id));
}

#[tokio::test]
async fn should_invalidate_previous_code_on_resend() {
    let user = admin_with_two_factor("resend@cermont.test").await;
    let h = Harness::with_users(vec![user.clone()]);
    let codes = h.one_time_codes();

    codes.send("resend@cermont.test").await.unwrap();
    let first = h.codes.pending_code(user.id).unwrap();
    codes.send("resend@cermont.test").await.unwrap();
    let second = h.codes.pending_code(user.id).unwrap();

    assert_eq!(h.codes.all().len(), 1, "only one pending code per user");
    if first != second {
        let check = codes.verify("resend@cermont.test", &first).await.unwrap();
        assert!(!check.valid, "superseded code no longer verifies");
    }
    let check = codes.verify("resend@cermont.test", &second).await.unwrap();
    assert!(check.valid);
}

#[tokio::test]
async fn should_consume_code_on_success() {
    let user = admin_with_two_factor("consume@cermont.test").await;
    let h = Harness::with_users(vec![user.clone()]);
    let codes = h.one_time_codes();
    codes.send("consume@cermont.test").await.unwrap();
    let code = h.codes.pending_code(user.id).unwrap();

    let first = codes.verify("consume@cermont.test", &code).await.unwrap();
    let second = codes.verify("consume@cermont.test", &code).await.unwrap();

    assert!(first.valid);
    assert_eq!(first.user_id, Some(user.id));
    assert!(!second.valid, "a code is single use");
}

#[tokio::test]
async fn should_discard_code_after_five_wrong_guesses() {
    let user = admin_with_two_factor("guess@cermont.test").await;
    let h = Harness::with_users(vec![user.clone()]);
    let codes = h.one_time_codes();
    codes.send("guess@cermont.test").await.unwrap();
    let code = h.codes.pending_code(user.id).unwrap();
    let wrong = wrong_code(&code);

    for attempt in 1..=4 {
        let check = codes.verify("guess@cermont.test", wrong).await.unwrap();
        assert!(!check.valid);
        assert_eq!(h.codes.all()[0].attempts, attempt);
    }
    codes.verify("guess@cermont.test", wrong).await.unwrap();
    assert!(h.codes.all().is_empty(), "fifth miss discards the code");

    let check = codes.verify("guess@cermont.test", &code).await.unwrap();
    assert!(!check.valid, "the right code is useless once discarded");
}

#[tokio::test]
async fn should_reject_expired_code() {
    let user = admin_with_two_factor("late@cermont.test").await;
    let h = Harness::with_users(vec![user.clone()]);
    let codes = h.one_time_codes();
    codes.send("late@cermont.test").await.unwrap();
    let code = h.codes.pending_code(user.id).unwrap();
    h.codes.expire_all();

    let check = codes.verify("late@cermont.test", &code).await.unwrap();

    assert!(!check.valid);
    assert_eq!(check.user_id, None);
    assert!(h.codes.all().is_empty(), "expired code is removed");
}

#[tokio::test]
async fn should_reject_verify_without_pending_code() {
    let user = admin_with_two_factor("none@cermont.test").await;
    let h = Harness::with_users(vec![user]);

    let known = h
        .one_time_codes()
        .verify("none@cermont.test", "123456")
        .await
        .unwrap();
    let unknown = h
        .one_time_codes()
        .verify("nobody@cermont.test", "123456")
        .await
        .unwrap();

    assert!(!known.valid);
    assert!(!unknown.valid);
}

#[tokio::test]
async fn should_refuse_send_for_unknown_user() {
    let h = Harness::default();

    let result = h.one_time_codes().send("nobody@cermont.test").await;

    assert!(
        matches!(result, Err(AuthServiceError::UserNotFound)),
        "expected UserNotFound, got {result:?}"
    );
}

#[tokio::test]
async fn should_refuse_send_when_two_factor_disabled() {
    let user = technician("no-2fa@cermont.test").await;
    let h = Harness::with_users(vec![user]);

    let result = h.one_time_codes().send("no-2fa@cermont.test").await;

    assert!(
        matches!(result, Err(AuthServiceError::TwoFactorNotEnabled)),
        "expected TwoFactorNotEnabled, got {result:?}"
    );
    assert!(h.codes.all().is_empty());
}

#[tokio::test]
async fn should_lock_account_when_reissued_codes_keep_failing() {
    let user = admin_with_two_factor("reissue@cermont.test").await;
    let h = Harness::with_users(vec![user.clone()]);
    let codes = h.one_time_codes();

    // A fresh code per guess still draws on one account-wide budget.
    for _ in 0..5 {
        codes.send("reissue@cermont.test").await.unwrap();
        let code = h.codes.pending_code(user.id).unwrap();
        let check = codes
            .verify("reissue@cermont.test", wrong_code(&code))
            .await
            .unwrap();
        assert!(!check.valid);
    }

    assert!(h.users.get(user.id).locked_until.is_some());
    let resend = codes.send("reissue@cermont.test").await;
    assert!(
        matches!(resend, Err(AuthServiceError::AccountLocked { .. })),
        "expected AccountLocked, got {resend:?}"
    );
}

#[tokio::test]
async fn should_ignore_guesses_while_account_is_locked() {
    let user = admin_with_two_factor("frozen@cermont.test").await;
    let h = Harness::with_users(vec![user.clone()]);
    let codes = h.one_time_codes();
    codes.send("frozen@cermont.test").await.unwrap();
    let code = h.codes.pending_code(user.id).unwrap();
    h.users.update(user.id, |u| {
        u.locked_until = Some(chrono::Utc::now() + chrono::Duration::minutes(10));
    });

    let check = codes.verify("frozen@cermont.test", &code).await.unwrap();

    assert!(!check.valid, "a locked account cannot verify");
    assert_eq!(h.codes.all()[0].attempts, 0, "no attempt is consumed");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn should_keep_a_single_pending_code_under_concurrent_sends() {
    let user = admin_with_two_factor("burst@cermont.test").await;
    let h = Harness::with_users(vec![user.clone()]);
    let codes = h.one_time_codes();

    let results =
        futures::future::join_all((0..8).map(|_| codes.send("burst@cermont.test"))).await;

    assert!(results.iter().all(Result::is_ok));
    assert_eq!(h.codes.all().len(), 1, "only one pending code per user");
}
