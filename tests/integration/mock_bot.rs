use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use tg_filestore::access_manager::{AccessManager, AccessManagerError};
use tg_filestore::handlers::command_handler::{
    classify_start_payload, needs_verification, StartRequest,
};
use tg_filestore::link_codec::LinkCodec;
use tg_filestore::localization::Lang;
use tg_filestore::settings_service::BotSettings;

/// represents a sent message for verification in tests
#[derive(Debug, Clone)]
pub struct SentMessage {
    pub chat_id: i64,
    pub text: String,
}

/// what a simulated `/start` ended with
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
    Welcomed,
    /// copied message texts in delivery order
    Delivered(Vec<String>),
    VerificationRequired,
    Verified(DateTime<Utc>),
    Rejected,
}

/// mock telegram bot that simulates bot behavior without real API calls
#[derive(Debug, Clone)]
pub struct MockTelegramBot {
    /// stores all sent messages for verification
    pub sent_messages: Arc<Mutex<Vec<SentMessage>>>,
    /// posts in the simulated storage channel by message id
    pub channel_posts: Arc<Mutex<BTreeMap<i64, String>>>,
    pub codec: LinkCodec,
    pub max_batch_size: u64,
}

impl MockTelegramBot {
    pub fn new(channel_id: i64, max_batch_size: u64) -> Self {
        Self {
            sent_messages: Arc::new(Mutex::new(Vec::new())),
            channel_posts: Arc::new(Mutex::new(BTreeMap::new())),
            codec: LinkCodec::new(channel_id).expect("test channel id is non-zero"),
            max_batch_size,
        }
    }

    /// simulates sending a message (stores it for verification)
    pub fn send_message(&self, chat_id: i64, text: impl Into<String>) {
        self.sent_messages.lock().unwrap().push(SentMessage {
            chat_id,
            text: text.into(),
        });
    }

    /// gets messages sent to a specific chat
    pub fn get_messages_for_chat(&self, chat_id: i64) -> Vec<SentMessage> {
        self.sent_messages
            .lock()
            .unwrap()
            .iter()
            .filter(|msg| msg.chat_id == chat_id)
            .cloned()
            .collect()
    }

    /// clears all sent messages (useful between tests)
    pub fn clear_messages(&self) {
        self.sent_messages.lock().unwrap().clear();
    }

    /// checks if any message to chat contains specific text
    pub fn chat_received_message_containing(&self, chat_id: i64, text: &str) -> bool {
        self.get_messages_for_chat(chat_id)
            .iter()
            .any(|msg| msg.text.contains(text))
    }

    /// stores a post in the channel under the next message id and returns that id
    pub fn store_post(&self, text: &str) -> i64 {
        let mut posts = self.channel_posts.lock().unwrap();
        let next_id = posts.keys().next_back().copied().unwrap_or(0) + 1;
        posts.insert(next_id, text.to_string());
        next_id
    }

    pub fn delete_post(&self, message_id: i64) {
        self.channel_posts.lock().unwrap().remove(&message_id);
    }

    /// simulates an admin upload, returning the start payload of its link
    pub fn simulate_upload(&self, text: &str) -> String {
        let message_id = self.store_post(text);
        self.codec
            .encode_single(message_id)
            .expect("stored ids are positive")
    }

    /// simulates a user opening `/start <payload>` the way the command handler does
    pub async fn simulate_start(
        &self,
        access: &AccessManager,
        settings: &BotSettings,
        is_admin: bool,
        telegram_user_id: i64,
        payload: &str,
        now: DateTime<Utc>,
    ) -> Result<StartOutcome, AccessManagerError> {
        let lang = Lang::En;
        let request = classify_start_payload(payload, &self.codec, self.max_batch_size);

        let link = match request {
            StartRequest::Welcome => {
                self.send_message(telegram_user_id, "Welcome");
                return Ok(StartOutcome::Welcomed);
            }
            StartRequest::Verify(token) => {
                return match access
                    .redeem_verification_token(
                        telegram_user_id,
                        token,
                        settings.access_token.validity_hours,
                        now,
                    )
                    .await
                {
                    Ok(expires_at) => {
                        self.send_message(
                            telegram_user_id,
                            lang.access_granted(
                                &expires_at.to_rfc3339(),
                                settings.access_token.validity_hours,
                            ),
                        );
                        Ok(StartOutcome::Verified(expires_at))
                    }
                    Err(AccessManagerError::DatabaseError(e)) => {
                        Err(AccessManagerError::DatabaseError(e))
                    }
                    Err(_) => {
                        self.send_message(telegram_user_id, lang.error_verification_failed());
                        Ok(StartOutcome::Rejected)
                    }
                };
            }
            StartRequest::InvalidLink => {
                self.send_message(telegram_user_id, lang.error_invalid_link());
                return Ok(StartOutcome::Rejected);
            }
            StartRequest::TooLarge(_) => {
                self.send_message(
                    telegram_user_id,
                    lang.error_batch_too_large(self.max_batch_size),
                );
                return Ok(StartOutcome::Rejected);
            }
            StartRequest::Open(link) => link,
        };

        if needs_verification(access, settings, is_admin, telegram_user_id, now).await? {
            access.issue_verification_token(telegram_user_id).await?;
            self.send_message(
                telegram_user_id,
                lang.access_required(settings.access_token.validity_hours),
            );
            return Ok(StartOutcome::VerificationRequired);
        }

        // missing posts are skipped like failed copies
        let delivered: Vec<String> = {
            let posts = self.channel_posts.lock().unwrap();
            link.message_ids()
                .filter_map(|id| posts.get(&id).cloned())
                .collect()
        };
        if delivered.is_empty() {
            self.send_message(telegram_user_id, lang.error_nothing_delivered());
        } else {
            for text in &delivered {
                self.send_message(telegram_user_id, text.clone());
            }
        }
        Ok(StartOutcome::Delivered(delivered))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::TEST_CHANNEL_ID;

    #[test]
    fn test_mock_bot_basic_functionality() {
        let bot = MockTelegramBot::new(TEST_CHANNEL_ID, 50);

        bot.send_message(123, "Hello");
        bot.send_message(456, "World");

        assert_eq!(bot.get_messages_for_chat(123).len(), 1);
        assert_eq!(bot.get_messages_for_chat(456).len(), 1);
        assert!(bot.chat_received_message_containing(123, "Hello"));
        assert!(!bot.chat_received_message_containing(123, "World"));

        bot.clear_messages();
        assert!(bot.get_messages_for_chat(123).is_empty());
    }

    #[test]
    fn test_store_post_assigns_increasing_ids() {
        let bot = MockTelegramBot::new(TEST_CHANNEL_ID, 50);

        assert_eq!(bot.store_post("first"), 1);
        assert_eq!(bot.store_post("second"), 2);
        bot.delete_post(2);
        assert_eq!(bot.store_post("third"), 2);
    }
}
