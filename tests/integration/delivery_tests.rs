use chrono::{Duration, Utc};
use tg_filestore::access_manager::{AccessManager, VERIFY_PREFIX};
use tg_filestore::link_codec::{decode, encode_single};
use tg_filestore::localization::Lang;

use super::{
    mock_bot::{MockTelegramBot, StartOutcome},
    test_utils::{TestScenario, TEST_CHANNEL_ID},
    TestDatabase,
};

const USER_ID: i64 = 5001;

#[tokio::test]
async fn test_single_link_delivers_stored_post() {
    let db = TestDatabase::create_fresh().await.expect("Failed to create test database");
    let access = AccessManager::new(db.pool.clone());
    let service = TestScenario::load_settings(&db)
        .await
        .expect("Failed to load settings");
    let bot = MockTelegramBot::new(TEST_CHANNEL_ID, 50);
    let settings = service.snapshot().await;

    bot.store_post("unrelated");
    let payload = bot.simulate_upload("holiday.mp4");

    let outcome = bot
        .simulate_start(&access, &settings, false, USER_ID, &payload, Utc::now())
        .await
        .expect("Failed to simulate start");
    assert_eq!(outcome, StartOutcome::Delivered(vec!["holiday.mp4".to_string()]));
    assert!(bot.chat_received_message_containing(USER_ID, "holiday.mp4"));
    assert!(!bot.chat_received_message_containing(USER_ID, "unrelated"));

    db.cleanup().await.expect("Failed to cleanup test database");
}

#[tokio::test]
async fn test_range_link_delivers_in_order_and_skips_missing() {
    let db = TestDatabase::create_fresh().await.expect("Failed to create test database");
    let access = AccessManager::new(db.pool.clone());
    let service = TestScenario::load_settings(&db)
        .await
        .expect("Failed to load settings");
    let bot = MockTelegramBot::new(TEST_CHANNEL_ID, 50);
    let settings = service.snapshot().await;

    let first = bot.store_post("part 1");
    bot.store_post("part 2");
    let last = bot.store_post("part 3");
    bot.delete_post(2);

    let payload = bot.codec.encode_range(first, last).expect("Failed to encode range");
    let outcome = bot
        .simulate_start(&access, &settings, false, USER_ID, &payload, Utc::now())
        .await
        .expect("Failed to simulate start");
    assert_eq!(
        outcome,
        StartOutcome::Delivered(vec!["part 1".to_string(), "part 3".to_string()])
    );

    db.cleanup().await.expect("Failed to cleanup test database");
}

#[tokio::test]
async fn test_link_to_deleted_posts_reports_nothing_delivered() {
    let db = TestDatabase::create_fresh().await.expect("Failed to create test database");
    let access = AccessManager::new(db.pool.clone());
    let service = TestScenario::load_settings(&db)
        .await
        .expect("Failed to load settings");
    let bot = MockTelegramBot::new(TEST_CHANNEL_ID, 50);
    let settings = service.snapshot().await;

    let payload = bot.simulate_upload("gone soon");
    bot.delete_post(1);

    let outcome = bot
        .simulate_start(&access, &settings, false, USER_ID, &payload, Utc::now())
        .await
        .expect("Failed to simulate start");
    assert_eq!(outcome, StartOutcome::Delivered(Vec::new()));
    assert!(bot.chat_received_message_containing(USER_ID, Lang::En.error_nothing_delivered()));

    db.cleanup().await.expect("Failed to cleanup test database");
}

#[tokio::test]
async fn test_oversized_range_is_refused() {
    let db = TestDatabase::create_fresh().await.expect("Failed to create test database");
    let access = AccessManager::new(db.pool.clone());
    let service = TestScenario::load_settings(&db)
        .await
        .expect("Failed to load settings");
    let bot = MockTelegramBot::new(TEST_CHANNEL_ID, 10);
    let settings = service.snapshot().await;

    let payload = bot.codec.encode_range(1, 11).expect("Failed to encode range");
    let outcome = bot
        .simulate_start(&access, &settings, false, USER_ID, &payload, Utc::now())
        .await
        .expect("Failed to simulate start");
    assert_eq!(outcome, StartOutcome::Rejected);
    assert!(bot.chat_received_message_containing(USER_ID, "At most 10"));

    // exactly at the limit is fine
    let payload = bot.codec.encode_range(1, 10).expect("Failed to encode range");
    let outcome = bot
        .simulate_start(&access, &settings, false, USER_ID, &payload, Utc::now())
        .await
        .expect("Failed to simulate start");
    assert_eq!(outcome, StartOutcome::Delivered(Vec::new()));

    db.cleanup().await.expect("Failed to cleanup test database");
}

#[tokio::test]
async fn test_invalid_and_foreign_links() {
    let db = TestDatabase::create_fresh().await.expect("Failed to create test database");
    let access = AccessManager::new(db.pool.clone());
    let service = TestScenario::load_settings(&db)
        .await
        .expect("Failed to load settings");
    let bot = MockTelegramBot::new(TEST_CHANNEL_ID, 50);
    let settings = service.snapshot().await;
    let now = Utc::now();

    for payload in ["not-base64-!!", "aGVsbG8", "Z2V0LQ"] {
        let outcome = bot
            .simulate_start(&access, &settings, false, USER_ID, payload, now)
            .await
            .expect("Failed to simulate start");
        assert_eq!(outcome, StartOutcome::Rejected, "payload {} should be rejected", payload);
    }

    // a link minted for another channel does not divide evenly here
    let foreign = encode_single(7, -1009999999999).expect("Failed to encode");
    assert!(decode(&foreign, TEST_CHANNEL_ID).is_err());
    let outcome = bot
        .simulate_start(&access, &settings, false, USER_ID, &foreign, now)
        .await
        .expect("Failed to simulate start");
    assert_eq!(outcome, StartOutcome::Rejected);
    assert!(bot.chat_received_message_containing(USER_ID, Lang::En.error_invalid_link()));

    db.cleanup().await.expect("Failed to cleanup test database");
}

#[tokio::test]
async fn test_bare_start_welcomes() {
    let db = TestDatabase::create_fresh().await.expect("Failed to create test database");
    let access = AccessManager::new(db.pool.clone());
    let service = TestScenario::load_settings(&db)
        .await
        .expect("Failed to load settings");
    let bot = MockTelegramBot::new(TEST_CHANNEL_ID, 50);
    let settings = service.snapshot().await;

    let outcome = bot
        .simulate_start(&access, &settings, false, USER_ID, "  ", Utc::now())
        .await
        .expect("Failed to simulate start");
    assert_eq!(outcome, StartOutcome::Welcomed);

    db.cleanup().await.expect("Failed to cleanup test database");
}

#[tokio::test]
async fn test_access_gate_full_flow() {
    let db = TestDatabase::create_fresh().await.expect("Failed to create test database");
    let access = AccessManager::new(db.pool.clone());
    let service = TestScenario::load_settings(&db)
        .await
        .expect("Failed to load settings");
    let bot = MockTelegramBot::new(TEST_CHANNEL_ID, 50);
    let now = Utc::now();

    let settings = service
        .toggle_access_token()
        .await
        .expect("Failed to enable access token");
    let payload = bot.simulate_upload("members only");

    // first attempt is stopped at the gate
    let outcome = bot
        .simulate_start(&access, &settings, false, USER_ID, &payload, now)
        .await
        .expect("Failed to simulate start");
    assert_eq!(outcome, StartOutcome::VerificationRequired);
    assert!(bot.chat_received_message_containing(USER_ID, "Access token required"));

    // admins are never gated
    let outcome = bot
        .simulate_start(&access, &settings, true, 9999, &payload, now)
        .await
        .expect("Failed to simulate start");
    assert_eq!(outcome, StartOutcome::Delivered(vec!["members only".to_string()]));

    // the user follows the shortened link back with a fresh token
    let token = access
        .issue_verification_token(USER_ID)
        .await
        .expect("Failed to issue token");
    let verify_payload = format!("{}{}", VERIFY_PREFIX, token);
    let outcome = bot
        .simulate_start(&access, &settings, false, USER_ID, &verify_payload, now)
        .await
        .expect("Failed to simulate start");
    assert_eq!(
        outcome,
        StartOutcome::Verified(now + Duration::hours(settings.access_token.validity_hours as i64))
    );

    // a replayed verification link is refused
    let outcome = bot
        .simulate_start(&access, &settings, false, USER_ID, &verify_payload, now)
        .await
        .expect("Failed to simulate start");
    assert_eq!(outcome, StartOutcome::Rejected);

    let outcome = bot
        .simulate_start(&access, &settings, false, USER_ID, &payload, now + Duration::minutes(1))
        .await
        .expect("Failed to simulate start");
    assert_eq!(outcome, StartOutcome::Delivered(vec!["members only".to_string()]));

    db.cleanup().await.expect("Failed to cleanup test database");
}
