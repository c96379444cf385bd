use chrono::{Duration, Utc};
use tg_filestore::access_manager::{
    parse_verify_payload, AccessManager, AccessManagerError, TOKEN_LENGTH, VERIFY_PREFIX,
};
use tg_filestore::handlers::command_handler::needs_verification;

use super::{
    test_utils::{TestAssertions, TestScenario},
    TestDatabase,
};

#[tokio::test]
async fn test_issue_and_redeem_token() {
    let db = TestDatabase::create_fresh().await.expect("Failed to create test database");
    let access = AccessManager::new(db.pool.clone());
    let user_id = 1001;
    let now = Utc::now();

    let token = access
        .issue_verification_token(user_id)
        .await
        .expect("Failed to issue token");
    assert_eq!(token.len(), TOKEN_LENGTH);
    // the issued token survives the trip through a start payload
    let payload = format!("{}{}", VERIFY_PREFIX, token);
    assert_eq!(parse_verify_payload(&payload), Some(token.as_str()));

    assert!(!access.has_access(user_id, now).await.expect("Failed to check access"));
    TestAssertions::assert_token_redeemed(&db, &token, false)
        .await
        .expect("Token state assertion failed");

    let expires_at = access
        .redeem_verification_token(user_id, &token, 12, now)
        .await
        .expect("Failed to redeem token");
    assert_eq!(expires_at, now + Duration::hours(12));

    assert!(access.has_access(user_id, now).await.expect("Failed to check access"));
    TestAssertions::assert_token_redeemed(&db, &token, true)
        .await
        .expect("Token state assertion failed");
    TestAssertions::assert_access_expiry(&db, user_id, Some(expires_at))
        .await
        .expect("Access expiry assertion failed");

    db.cleanup().await.expect("Failed to cleanup test database");
}

#[tokio::test]
async fn test_token_cannot_be_redeemed_twice() {
    let db = TestDatabase::create_fresh().await.expect("Failed to create test database");
    let access = AccessManager::new(db.pool.clone());
    let now = Utc::now();

    let token = access
        .issue_verification_token(1002)
        .await
        .expect("Failed to issue token");
    access
        .redeem_verification_token(1002, &token, 12, now)
        .await
        .expect("Failed to redeem token");

    let second = access
        .redeem_verification_token(1002, &token, 12, now + Duration::minutes(5))
        .await;
    assert!(matches!(second, Err(AccessManagerError::TokenAlreadyUsed)));

    // the first grant is kept as it was
    TestAssertions::assert_access_expiry(&db, 1002, Some(now + Duration::hours(12)))
        .await
        .expect("Access expiry assertion failed");

    db.cleanup().await.expect("Failed to cleanup test database");
}

#[tokio::test]
async fn test_token_bound_to_its_owner() {
    let db = TestDatabase::create_fresh().await.expect("Failed to create test database");
    let access = AccessManager::new(db.pool.clone());
    let now = Utc::now();

    let token = access
        .issue_verification_token(1003)
        .await
        .expect("Failed to issue token");

    let stolen = access.redeem_verification_token(2003, &token, 12, now).await;
    assert!(matches!(
        stolen,
        Err(AccessManagerError::TokenOwnerMismatch(2003))
    ));
    assert!(!access.has_access(2003, now).await.expect("Failed to check access"));

    // the rightful owner can still use it
    access
        .redeem_verification_token(1003, &token, 12, now)
        .await
        .expect("Owner failed to redeem token");

    db.cleanup().await.expect("Failed to cleanup test database");
}

#[tokio::test]
async fn test_unknown_and_expired_tokens() {
    let db = TestDatabase::create_fresh().await.expect("Failed to create test database");
    let access = AccessManager::new(db.pool.clone());
    let now = Utc::now();

    let unknown = access
        .redeem_verification_token(1004, "AAAAAAAAAAAAAAAA", 12, now)
        .await;
    assert!(matches!(unknown, Err(AccessManagerError::TokenNotFound)));

    let token = access
        .issue_verification_token(1004)
        .await
        .expect("Failed to issue token");
    let late = access
        .redeem_verification_token(1004, &token, 12, now + Duration::hours(25))
        .await;
    assert!(matches!(late, Err(AccessManagerError::TokenExpired)));
    TestAssertions::assert_token_redeemed(&db, &token, false)
        .await
        .expect("Token state assertion failed");

    db.cleanup().await.expect("Failed to cleanup test database");
}

#[tokio::test]
async fn test_open_token_is_reused() {
    let db = TestDatabase::create_fresh().await.expect("Failed to create test database");
    let access = AccessManager::new(db.pool.clone());
    let now = Utc::now();

    // repeated gated starts hand out the same link
    let first = access
        .issue_verification_token(1006)
        .await
        .expect("Failed to issue token");
    let again = access
        .issue_verification_token(1006)
        .await
        .expect("Failed to issue token");
    assert_eq!(first, again);
    TestAssertions::assert_token_count(&db, 1)
        .await
        .expect("Token count assertion failed");

    // tokens are never shared between users
    let other = access
        .issue_verification_token(1007)
        .await
        .expect("Failed to issue token");
    assert_ne!(first, other);

    // a redeemed token is not handed out again
    access
        .redeem_verification_token(1006, &first, 12, now)
        .await
        .expect("Failed to redeem token");
    let after_redeem = access
        .issue_verification_token(1006)
        .await
        .expect("Failed to issue token");
    assert_ne!(first, after_redeem);

    // nor is one close to the end of its lifetime
    let client = db.pool.get().await.expect("Failed to get client");
    client
        .execute(
            "UPDATE verification_tokens SET created_at = NOW() - INTERVAL '13 hours' WHERE token = $1",
            &[&after_redeem],
        )
        .await
        .expect("Failed to age token");
    let fresh = access
        .issue_verification_token(1006)
        .await
        .expect("Failed to issue token");
    assert_ne!(after_redeem, fresh);
    TestAssertions::assert_token_count(&db, 4)
        .await
        .expect("Token count assertion failed");

    db.cleanup().await.expect("Failed to cleanup test database");
}

#[tokio::test]
async fn test_access_expires_and_renews() {
    let db = TestDatabase::create_fresh().await.expect("Failed to create test database");
    let access = AccessManager::new(db.pool.clone());
    let now = Utc::now();

    let expires_at = TestScenario::grant_access(&access, 1005, 2, now)
        .await
        .expect("Failed to grant access");

    assert!(access
        .has_access(1005, now + Duration::hours(1))
        .await
        .expect("Failed to check access"));
    // the expiry instant itself is already outside the grant
    assert!(!access
        .has_access(1005, expires_at)
        .await
        .expect("Failed to check access"));

    // verifying again replaces the old expiry
    let later = now + Duration::hours(3);
    let renewed = TestScenario::grant_access(&access, 1005, 2, later)
        .await
        .expect("Failed to renew access");
    assert_eq!(renewed, later + Duration::hours(2));
    TestAssertions::assert_access_expiry(&db, 1005, Some(renewed))
        .await
        .expect("Access expiry assertion failed");

    db.cleanup().await.expect("Failed to cleanup test database");
}

#[tokio::test]
async fn test_active_users_and_revocation() {
    let db = TestDatabase::create_fresh().await.expect("Failed to create test database");
    let access = AccessManager::new(db.pool.clone());
    let now = Utc::now();

    TestScenario::grant_access(&access, 2001, 24, now)
        .await
        .expect("Failed to grant access");
    TestScenario::grant_access(&access, 2002, 6, now)
        .await
        .expect("Failed to grant access");
    // already lapsed by the time we look
    TestScenario::grant_access(&access, 2003, 1, now - Duration::hours(2))
        .await
        .expect("Failed to grant access");

    assert_eq!(access.active_count(now).await.expect("Failed to count"), 2);
    let active = access.active_users(now).await.expect("Failed to list users");
    let ids: Vec<i64> = active.iter().map(|grant| grant.telegram_user_id).collect();
    // soonest expiry first
    assert_eq!(ids, vec![2002, 2001]);

    assert!(access.revoke_user(2002).await.expect("Failed to revoke"));
    assert!(!access.revoke_user(2002).await.expect("Failed to revoke"));
    assert!(!access.has_access(2002, now).await.expect("Failed to check access"));
    assert_eq!(access.active_count(now).await.expect("Failed to count"), 1);

    // revoke_all also drops the lapsed row
    assert_eq!(access.revoke_all().await.expect("Failed to revoke all"), 2);
    assert_eq!(access.active_count(now).await.expect("Failed to count"), 0);

    db.cleanup().await.expect("Failed to cleanup test database");
}

#[tokio::test]
async fn test_prune_expired() {
    let db = TestDatabase::create_fresh().await.expect("Failed to create test database");
    let access = AccessManager::new(db.pool.clone());
    let now = Utc::now();

    // redeemed token plus live grant
    TestScenario::grant_access(&access, 3001, 24, now)
        .await
        .expect("Failed to grant access");
    // redeemed token plus lapsed grant
    TestScenario::grant_access(&access, 3002, 1, now - Duration::hours(3))
        .await
        .expect("Failed to grant access");
    // fresh unredeemed token
    access
        .issue_verification_token(3003)
        .await
        .expect("Failed to issue token");

    let pruned = access.prune_expired(now).await.expect("Failed to prune");
    // one lapsed grant and two redeemed tokens
    assert_eq!(pruned, 3);

    assert!(access.has_access(3001, now).await.expect("Failed to check access"));
    TestAssertions::assert_access_expiry(&db, 3002, None)
        .await
        .expect("Access expiry assertion failed");
    TestAssertions::assert_token_count(&db, 1)
        .await
        .expect("Token count assertion failed");

    db.cleanup().await.expect("Failed to cleanup test database");
}

#[tokio::test]
async fn test_needs_verification_gate() {
    let db = TestDatabase::create_fresh().await.expect("Failed to create test database");
    let access = AccessManager::new(db.pool.clone());
    let service = TestScenario::load_settings(&db)
        .await
        .expect("Failed to load settings");
    let now = Utc::now();

    // gate off: nobody verifies
    let settings = service.snapshot().await;
    assert!(!needs_verification(&access, &settings, false, 4001, now)
        .await
        .expect("Failed to evaluate gate"));

    let settings = service
        .toggle_access_token()
        .await
        .expect("Failed to enable access token");
    assert!(needs_verification(&access, &settings, false, 4001, now)
        .await
        .expect("Failed to evaluate gate"));
    // admins always pass
    assert!(!needs_verification(&access, &settings, true, 4001, now)
        .await
        .expect("Failed to evaluate gate"));

    TestScenario::grant_access(&access, 4001, settings.access_token.validity_hours, now)
        .await
        .expect("Failed to grant access");
    assert!(!needs_verification(&access, &settings, false, 4001, now)
        .await
        .expect("Failed to evaluate gate"));

    let after_expiry = now + Duration::hours(settings.access_token.validity_hours as i64 + 1);
    assert!(needs_verification(&access, &settings, false, 4001, after_expiry)
        .await
        .expect("Failed to evaluate gate"));

    db.cleanup().await.expect("Failed to cleanup test database");
}
