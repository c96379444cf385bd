use chrono::Utc;
use log::{error, info, warn};
use teloxide::prelude::*;
use teloxide::types::{
    CallbackQuery, ChatId, InlineKeyboardButton, InlineKeyboardMarkup, MaybeInaccessibleMessage,
    MessageId, ParseMode,
};

use crate::bot::BotContext;
use crate::pending_input::{InputKind, PendingInput};
use crate::settings_store::{
    AccessTokenSettings, SettingsError, ShortenerSettings, MAX_VALIDITY_HOURS, MIN_VALIDITY_HOURS,
};
use crate::shortener::ShortenerTestOutcome;
use crate::utils::MessageFormatter;

/// access grants listed in the users view
const MAX_LISTED_USERS: usize = 20;
const MIN_API_KEY_LENGTH: usize = 10;

/// `<url> <api>`; scheme and slashes are stripped from the url
pub fn parse_shortener_input(text: &str) -> Result<(String, String), &'static str> {
    let mut parts = text.split_whitespace();
    let (Some(url), Some(api), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err("❌ Send the shortener URL and API key separated by one space.");
    };

    let domain: String = url
        .trim_start_matches("https://")
        .trim_start_matches("http://")
        .chars()
        .filter(|c| *c != '/')
        .collect();
    if domain.is_empty() || !domain.contains('.') {
        return Err("❌ Invalid URL format. Example: <code>example.com</code>");
    }
    if api.chars().count() <= MIN_API_KEY_LENGTH {
        return Err("❌ API key looks too short.");
    }
    Ok((domain, api.to_string()))
}

pub fn parse_tutorial_link(text: &str) -> Result<String, &'static str> {
    let link = text.trim();
    if !(link.starts_with("https://") || link.starts_with("http://")) {
        return Err("❌ The link must start with http:// or https://");
    }
    url::Url::parse(link).map_err(|_| "❌ That is not a valid link.")?;
    Ok(link.to_string())
}

pub fn parse_validity_hours(text: &str) -> Result<i32, String> {
    let out_of_range = || {
        format!(
            "❌ Send a whole number of hours between {} and {}.",
            MIN_VALIDITY_HOURS, MAX_VALIDITY_HOURS
        )
    };
    let hours: i32 = text.trim().parse().map_err(|_| out_of_range())?;
    if !(MIN_VALIDITY_HOURS..=MAX_VALIDITY_HOURS).contains(&hours) {
        return Err(out_of_range());
    }
    Ok(hours)
}

fn on_off(enabled: bool) -> &'static str {
    if enabled {
        "✅ Enabled"
    } else {
        "❌ Disabled"
    }
}

pub fn shortener_panel_text(settings: &ShortenerSettings, api_online: bool) -> String {
    format!(
        "🔗 <b>Shortener settings</b>\n\n\
        Status: {}\n\
        Shortener: <code>{}</code>\n\
        API key: <code>{}</code>\n\
        API status: {}\n\
        Tutorial: {}",
        on_off(settings.enabled),
        MessageFormatter::escape_html(&settings.domain),
        MessageFormatter::escape_html(&MessageFormatter::mask_secret(&settings.api_key)),
        if api_online { "🟢 Online" } else { "🔴 Offline" },
        MessageFormatter::escape_html(&settings.tutorial_link),
    )
}

pub fn shortener_panel_keyboard(settings: &ShortenerSettings) -> InlineKeyboardMarkup {
    let toggle = if settings.enabled {
        "🔴 Turn off"
    } else {
        "🟢 Turn on"
    };
    InlineKeyboardMarkup::new(vec![
        vec![InlineKeyboardButton::callback(toggle, "shortener_toggle")],
        vec![
            InlineKeyboardButton::callback("➕ Add shortener", "shortener_add"),
            InlineKeyboardButton::callback("📖 Set tutorial", "shortener_tutorial"),
        ],
        vec![InlineKeyboardButton::callback("🧪 Test shortener", "shortener_test")],
        vec![InlineKeyboardButton::callback("✖️ Close", "close")],
    ])
}

pub fn access_panel_text(settings: &AccessTokenSettings, active_users: i64) -> String {
    format!(
        "🔐 <b>Access token settings</b>\n\n\
        Status: {}\n\
        Validity: <b>{} hours</b>\n\
        Active users: <b>{}</b>",
        on_off(settings.enabled),
        settings.validity_hours,
        active_users
    )
}

pub fn access_panel_keyboard(settings: &AccessTokenSettings) -> InlineKeyboardMarkup {
    let toggle = if settings.enabled {
        "🔴 Turn off"
    } else {
        "🟢 Turn on"
    };
    InlineKeyboardMarkup::new(vec![
        vec![InlineKeyboardButton::callback(toggle, "token_toggle")],
        vec![
            InlineKeyboardButton::callback("⏱ Validity", "token_validity"),
            InlineKeyboardButton::callback("👥 Users", "token_users"),
        ],
        vec![
            InlineKeyboardButton::callback("📊 Stats", "token_stats"),
            InlineKeyboardButton::callback("🗑 Revoke all", "token_revoke_all"),
        ],
        vec![InlineKeyboardButton::callback("✖️ Close", "close")],
    ])
}

fn back_keyboard(target: &str) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![InlineKeyboardButton::callback("⬅️ Back", target)]])
}

fn prompt_text(kind: InputKind) -> String {
    let body = match kind {
        InputKind::ShortenerCredentials => {
            "Send the shortener URL and API key separated by a space:\n\n\
            <code>example.com 0123456789abcdef0123</code>"
                .to_string()
        }
        InputKind::TutorialLink => {
            "Send the tutorial link (must start with http:// or https://)".to_string()
        }
        InputKind::TokenValidity => format!(
            "Send the access token validity in hours ({}-{})",
            MIN_VALIDITY_HOURS, MAX_VALIDITY_HOURS
        ),
    };
    format!("{}\n\n⏰ Timeout: 60 sec", body)
}

pub struct CallbackHandler;

impl CallbackHandler {
    fn get_chat_id(message: &MaybeInaccessibleMessage) -> ChatId {
        match message {
            MaybeInaccessibleMessage::Regular(msg) => msg.chat.id,
            MaybeInaccessibleMessage::Inaccessible(msg) => msg.chat.id,
        }
    }

    fn get_message_id(message: &MaybeInaccessibleMessage) -> MessageId {
        match message {
            MaybeInaccessibleMessage::Regular(msg) => msg.id,
            MaybeInaccessibleMessage::Inaccessible(msg) => msg.message_id,
        }
    }

    pub async fn handle_callback_query(
        ctx: BotContext,
        query: CallbackQuery,
    ) -> ResponseResult<()> {
        let (Some(data), Some(message)) = (&query.data, &query.message) else {
            ctx.bot.answer_callback_query(&query.id).await?;
            return Ok(());
        };

        let telegram_user_id = query.from.id.0 as i64;
        if !ctx.config.is_admin(telegram_user_id) {
            info!("Rejected panel callback '{}' from {}", data, telegram_user_id);
            ctx.bot
                .answer_callback_query(&query.id)
                .text("❌ Only admins can use this.")
                .show_alert(true)
                .await?;
            return Ok(());
        }

        let chat_id = Self::get_chat_id(message);
        let message_id = Self::get_message_id(message);

        match data.as_str() {
            "shortener" => {
                // going back abandons any open prompt
                ctx.pending.take(telegram_user_id).await;
                Self::edit_shortener_panel(&ctx, chat_id, message_id).await?;
            }
            "shortener_toggle" => {
                match ctx.settings.toggle_shortener().await {
                    Ok(settings) => info!(
                        "Admin {} turned the shortener {}",
                        telegram_user_id,
                        if settings.shortener.enabled { "on" } else { "off" }
                    ),
                    Err(e) => return Self::report_settings_error(&ctx, &query, e).await,
                }
                Self::edit_shortener_panel(&ctx, chat_id, message_id).await?;
            }
            "shortener_add" => {
                Self::begin_prompt(
                    &ctx,
                    telegram_user_id,
                    InputKind::ShortenerCredentials,
                    chat_id,
                    message_id,
                )
                .await?;
            }
            "shortener_tutorial" => {
                Self::begin_prompt(
                    &ctx,
                    telegram_user_id,
                    InputKind::TutorialLink,
                    chat_id,
                    message_id,
                )
                .await?;
            }
            "shortener_test" => {
                ctx.bot
                    .answer_callback_query(&query.id)
                    .text("🧪 Testing shortener...")
                    .await?;
                Self::handle_test_shortener(&ctx, chat_id, message_id).await?;
                return Ok(());
            }
            "access_token" => {
                ctx.pending.take(telegram_user_id).await;
                Self::edit_access_token_panel(&ctx, chat_id, message_id).await?;
            }
            "token_toggle" => {
                match ctx.settings.toggle_access_token().await {
                    Ok(settings) => info!(
                        "Admin {} turned the access token {}",
                        telegram_user_id,
                        if settings.access_token.enabled { "on" } else { "off" }
                    ),
                    Err(e) => return Self::report_settings_error(&ctx, &query, e).await,
                }
                Self::edit_access_token_panel(&ctx, chat_id, message_id).await?;
            }
            "token_validity" => {
                Self::begin_prompt(
                    &ctx,
                    telegram_user_id,
                    InputKind::TokenValidity,
                    chat_id,
                    message_id,
                )
                .await?;
            }
            "token_users" => {
                Self::handle_token_users(&ctx, chat_id, message_id).await?;
            }
            "token_stats" => {
                Self::handle_token_stats(&ctx, chat_id, message_id).await?;
            }
            "token_revoke_all" => {
                ctx.bot
                    .edit_message_text(
                        chat_id,
                        message_id,
                        "⚠️ Revoke the access token of <b>every</b> user?",
                    )
                    .parse_mode(ParseMode::Html)
                    .reply_markup(InlineKeyboardMarkup::new(vec![vec![
                        InlineKeyboardButton::callback("✅ Yes, revoke", "token_revoke_confirm"),
                        InlineKeyboardButton::callback("⬅️ Back", "access_token"),
                    ]]))
                    .await?;
            }
            "token_revoke_confirm" => {
                let text = match ctx.access.revoke_all().await {
                    Ok(count) => format!("✅ Revoked {} access token(s).", count),
                    Err(e) => {
                        error!("Failed to revoke all access tokens: {}", e);
                        "❌ Failed to revoke access tokens.".to_string()
                    }
                };
                ctx.bot
                    .edit_message_text(chat_id, message_id, text)
                    .reply_markup(back_keyboard("access_token"))
                    .await?;
            }
            "close" => {
                if let Err(e) = ctx.bot.delete_message(chat_id, message_id).await {
                    warn!("Failed to close panel: {}", e);
                }
            }
            other => {
                warn!("Unknown callback data: {}", other);
            }
        }

        ctx.bot.answer_callback_query(&query.id).await?;
        Ok(())
    }

    async fn report_settings_error(
        ctx: &BotContext,
        query: &CallbackQuery,
        e: SettingsError,
    ) -> ResponseResult<()> {
        error!("Failed to update settings: {}", e);
        ctx.bot
            .answer_callback_query(&query.id)
            .text("❌ Failed to save settings.")
            .show_alert(true)
            .await?;
        Ok(())
    }

    async fn render_shortener_panel(ctx: &BotContext) -> (String, InlineKeyboardMarkup) {
        let settings = ctx.settings.snapshot().await;
        let online = ctx.shortener.check_status(&settings.shortener).await;
        (
            shortener_panel_text(&settings.shortener, online),
            shortener_panel_keyboard(&settings.shortener),
        )
    }

    async fn render_access_token_panel(ctx: &BotContext) -> (String, InlineKeyboardMarkup) {
        let settings = ctx.settings.snapshot().await;
        let active = ctx
            .access
            .active_count(Utc::now())
            .await
            .unwrap_or_else(|e| {
                error!("Failed to count active users: {}", e);
                0
            });
        (
            access_panel_text(&settings.access_token, active),
            access_panel_keyboard(&settings.access_token),
        )
    }

    pub async fn send_shortener_panel(ctx: &BotContext, chat_id: ChatId) -> ResponseResult<()> {
        let (text, keyboard) = Self::render_shortener_panel(ctx).await;
        ctx.bot
            .send_message(chat_id, text)
            .parse_mode(ParseMode::Html)
            .reply_markup(keyboard)
            .await?;
        Ok(())
    }

    pub async fn send_access_token_panel(ctx: &BotContext, chat_id: ChatId) -> ResponseResult<()> {
        let (text, keyboard) = Self::render_access_token_panel(ctx).await;
        ctx.bot
            .send_message(chat_id, text)
            .parse_mode(ParseMode::Html)
            .reply_markup(keyboard)
            .await?;
        Ok(())
    }

    async fn edit_shortener_panel(
        ctx: &BotContext,
        chat_id: ChatId,
        message_id: MessageId,
    ) -> ResponseResult<()> {
        let (text, keyboard) = Self::render_shortener_panel(ctx).await;
        Self::edit_panel(ctx, chat_id, message_id, text, keyboard).await;
        Ok(())
    }

    async fn edit_access_token_panel(
        ctx: &BotContext,
        chat_id: ChatId,
        message_id: MessageId,
    ) -> ResponseResult<()> {
        let (text, keyboard) = Self::render_access_token_panel(ctx).await;
        Self::edit_panel(ctx, chat_id, message_id, text, keyboard).await;
        Ok(())
    }

    // "message is not modified" is expected when nothing changed
    async fn edit_panel(
        ctx: &BotContext,
        chat_id: ChatId,
        message_id: MessageId,
        text: String,
        keyboard: InlineKeyboardMarkup,
    ) {
        if let Err(e) = ctx
            .bot
            .edit_message_text(chat_id, message_id, text)
            .parse_mode(ParseMode::Html)
            .reply_markup(keyboard)
            .await
        {
            warn!("Failed to edit panel: {}", e);
        }
    }

    async fn handle_test_shortener(
        ctx: &BotContext,
        chat_id: ChatId,
        message_id: MessageId,
    ) -> ResponseResult<()> {
        let settings = ctx.settings.snapshot().await;
        let text = match ctx.shortener.test(&settings.shortener).await {
            ShortenerTestOutcome::Success { short_link } => format!(
                "✅ <b>Shortener works</b>\n\nShortener: <code>{}</code>\nResult: {}",
                MessageFormatter::escape_html(&settings.shortener.domain),
                MessageFormatter::escape_html(&short_link)
            ),
            ShortenerTestOutcome::Failed { status, message } => format!(
                "❌ <b>Shortener test failed</b>\n\nStatus: {}\nError: {}",
                status.map_or_else(|| "no response".to_string(), |s| s.to_string()),
                MessageFormatter::escape_html(&message)
            ),
        };
        ctx.bot
            .edit_message_text(chat_id, message_id, text)
            .parse_mode(ParseMode::Html)
            .reply_markup(back_keyboard("shortener"))
            .await?;
        Ok(())
    }

    async fn handle_token_users(
        ctx: &BotContext,
        chat_id: ChatId,
        message_id: MessageId,
    ) -> ResponseResult<()> {
        let now = Utc::now();
        let text = match ctx.access.active_users(now).await {
            Ok(grants) if grants.is_empty() => {
                "👥 No users with an active access token.".to_string()
            }
            Ok(grants) => {
                let mut lines = vec![format!("👥 <b>Active users ({})</b>\n", grants.len())];
                lines.extend(grants.iter().take(MAX_LISTED_USERS).map(|grant| {
                    format!(
                        "• <code>{}</code> until {} ({} left)",
                        grant.telegram_user_id,
                        MessageFormatter::format_expiry(grant.expires_at),
                        MessageFormatter::format_remaining(grant.expires_at, now)
                    )
                }));
                if grants.len() > MAX_LISTED_USERS {
                    lines.push(format!("...and {} more", grants.len() - MAX_LISTED_USERS));
                }
                lines.join("\n")
            }
            Err(e) => {
                error!("Failed to list active users: {}", e);
                "❌ Failed to load users.".to_string()
            }
        };
        ctx.bot
            .edit_message_text(chat_id, message_id, text)
            .parse_mode(ParseMode::Html)
            .reply_markup(back_keyboard("access_token"))
            .await?;
        Ok(())
    }

    async fn handle_token_stats(
        ctx: &BotContext,
        chat_id: ChatId,
        message_id: MessageId,
    ) -> ResponseResult<()> {
        let settings = ctx.settings.snapshot().await;
        let text = match ctx.access.active_count(Utc::now()).await {
            Ok(active) => format!(
                "📊 <b>Access token stats</b>\n\n\
                Status: {}\n\
                Validity: {} hours\n\
                Active users: {}",
                on_off(settings.access_token.enabled),
                settings.access_token.validity_hours,
                active
            ),
            Err(e) => {
                error!("Failed to load access stats: {}", e);
                "❌ Failed to load stats.".to_string()
            }
        };
        ctx.bot
            .edit_message_text(chat_id, message_id, text)
            .parse_mode(ParseMode::Html)
            .reply_markup(back_keyboard("access_token"))
            .await?;
        Ok(())
    }

    /// asks the admin for a value and arms the timeout that cancels the prompt
    async fn begin_prompt(
        ctx: &BotContext,
        telegram_user_id: i64,
        kind: InputKind,
        chat_id: ChatId,
        message_id: MessageId,
    ) -> ResponseResult<()> {
        ctx.bot
            .edit_message_text(chat_id, message_id, prompt_text(kind))
            .parse_mode(ParseMode::Html)
            .reply_markup(back_keyboard(kind.back_target()))
            .await?;

        let pending = ctx
            .pending
            .begin(telegram_user_id, kind, chat_id.0, message_id.0)
            .await;

        let ctx = ctx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(ctx.pending.timeout()).await;
            if let Some(expired) = ctx.pending.expire(telegram_user_id, pending.generation).await {
                info!("Input prompt for admin {} timed out", telegram_user_id);
                if let Err(e) = ctx
                    .bot
                    .edit_message_text(
                        ChatId(expired.chat_id),
                        MessageId(expired.prompt_message_id),
                        "⏰ Timeout! Try again.",
                    )
                    .reply_markup(back_keyboard(expired.kind.back_target()))
                    .await
                {
                    warn!("Failed to mark prompt as timed out: {}", e);
                }
            }
        });
        Ok(())
    }

    /// applies the admin's answer to an earlier prompt
    pub async fn handle_pending_input(
        ctx: BotContext,
        msg: Message,
        pending: PendingInput,
    ) -> ResponseResult<()> {
        let back = back_keyboard(pending.kind.back_target());
        let Some(text) = msg.text() else {
            ctx.bot
                .send_message(msg.chat.id, "❌ Please send the value as text.")
                .reply_markup(back)
                .await?;
            return Ok(());
        };

        let outcome: Result<String, String> = match pending.kind {
            InputKind::ShortenerCredentials => match parse_shortener_input(text) {
                Ok((domain, api_key)) => ctx
                    .settings
                    .set_shortener_credentials(&domain, &api_key)
                    .await
                    .map(|_| {
                        format!(
                            "✅ Shortener set to <code>{}</code>",
                            MessageFormatter::escape_html(&domain)
                        )
                    })
                    .map_err(|e| {
                        error!("Failed to save shortener: {}", e);
                        "❌ Failed to save shortener.".to_string()
                    }),
                Err(reason) => Err(reason.to_string()),
            },
            InputKind::TutorialLink => match parse_tutorial_link(text) {
                Ok(link) => ctx
                    .settings
                    .set_tutorial_link(&link)
                    .await
                    .map(|_| "✅ Tutorial link updated.".to_string())
                    .map_err(|e| {
                        error!("Failed to save tutorial link: {}", e);
                        "❌ Failed to save tutorial link.".to_string()
                    }),
                Err(reason) => Err(reason.to_string()),
            },
            InputKind::TokenValidity => match parse_validity_hours(text) {
                Ok(hours) => ctx
                    .settings
                    .set_token_validity(hours)
                    .await
                    .map(|_| format!("✅ Access token validity set to <b>{} hours</b>.", hours))
                    .map_err(|e| {
                        error!("Failed to save token validity: {}", e);
                        "❌ Failed to save validity.".to_string()
                    }),
                Err(reason) => Err(reason),
            },
        };

        let reply = match outcome {
            Ok(reply) => {
                info!("Admin input for {:?} applied", pending.kind);
                reply
            }
            Err(reply) => reply,
        };

        ctx.bot
            .send_message(msg.chat.id, reply)
            .parse_mode(ParseMode::Html)
            .reply_markup(back)
            .await?;
        Ok(())
    }
}
