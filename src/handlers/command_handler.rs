use chrono::{DateTime, Utc};
use log::{error, info, warn};
use std::time::Duration;
use teloxide::prelude::*;
use teloxide::types::{
    ChatId, InlineKeyboardButton, InlineKeyboardMarkup, MessageId, ParseMode, User,
};
use url::Url;

use crate::access_manager::{
    parse_verify_payload, AccessManager, AccessManagerError, VERIFY_PREFIX,
};
use crate::bot::{BotContext, Command};
use crate::handlers::CallbackHandler;
use crate::link_codec::{deep_link, DecodedLink, LinkCodec};
use crate::localization::Lang;
use crate::rate_limiters::with_flood_retry;
use crate::settings_service::BotSettings;
use crate::utils::MessageFormatter;

/// fills `{first}`, `{last}`, `{username}`, `{mention}` and `{id}` in the welcome template
pub fn render_start_message(template: &str, user: &User) -> String {
    let first = MessageFormatter::escape_html(&user.first_name);
    let last = user
        .last_name
        .as_deref()
        .map(MessageFormatter::escape_html)
        .unwrap_or_default();
    let username = user
        .username
        .as_deref()
        .map(|name| format!("@{}", name))
        .unwrap_or_default();
    let mention = format!("<a href=\"tg://user?id={}\">{}</a>", user.id.0, first);

    template
        .replace("{first}", &first)
        .replace("{last}", &last)
        .replace("{username}", &username)
        .replace("{mention}", &mention)
        .replace("{id}", &user.id.0.to_string())
}

/// what a `/start` payload asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartRequest<'a> {
    Welcome,
    Verify(&'a str),
    Open(DecodedLink),
    InvalidLink,
    /// range covering more messages than allowed
    TooLarge(u64),
}

pub fn classify_start_payload<'a>(
    payload: &'a str,
    codec: &LinkCodec,
    max_batch_size: u64,
) -> StartRequest<'a> {
    let payload = payload.trim();
    if payload.is_empty() {
        return StartRequest::Welcome;
    }
    if let Some(token) = parse_verify_payload(payload) {
        return StartRequest::Verify(token);
    }
    match codec.decode(payload) {
        Ok(link) if link.len() > max_batch_size => StartRequest::TooLarge(link.len()),
        Ok(link) => StartRequest::Open(link),
        Err(_) => StartRequest::InvalidLink,
    }
}

/// non-admins must verify while the access token is on and they hold no live grant
pub async fn needs_verification(
    access: &AccessManager,
    settings: &BotSettings,
    is_admin: bool,
    telegram_user_id: i64,
    now: DateTime<Utc>,
) -> Result<bool, AccessManagerError> {
    if is_admin || !settings.access_token.enabled {
        return Ok(false);
    }
    Ok(!access.has_access(telegram_user_id, now).await?)
}

pub struct CommandHandler;

impl CommandHandler {
    pub async fn handle_command(ctx: BotContext, msg: Message, cmd: Command) -> ResponseResult<()> {
        let Some(user) = msg.from.clone() else {
            return Ok(());
        };
        let telegram_user_id = user.id.0 as i64;

        match cmd {
            Command::Start(payload) => {
                Self::handle_start_command(ctx, msg, user, payload.trim()).await?;
            }
            Command::Shortener | Command::Token | Command::RevokeAccess(_)
                if !ctx.config.is_admin(telegram_user_id) =>
            {
                info!("Ignoring admin command from non-admin {}", telegram_user_id);
                ctx.bot
                    .send_message(msg.chat.id, ctx.config.reply_text.clone())
                    .await?;
            }
            Command::Shortener => {
                CallbackHandler::send_shortener_panel(&ctx, msg.chat.id).await?;
            }
            Command::Token => {
                CallbackHandler::send_access_token_panel(&ctx, msg.chat.id).await?;
            }
            Command::RevokeAccess(args) => {
                Self::handle_revoke_access_command(ctx, msg, args.trim()).await?;
            }
        }
        Ok(())
    }

    async fn handle_start_command(
        ctx: BotContext,
        msg: Message,
        user: User,
        payload: &str,
    ) -> ResponseResult<()> {
        let lang = Lang::from_code(user.language_code.as_deref());

        let link = match classify_start_payload(payload, &ctx.codec, ctx.config.max_batch_size) {
            StartRequest::Welcome => {
                ctx.bot
                    .send_message(
                        msg.chat.id,
                        render_start_message(&ctx.config.start_message, &user),
                    )
                    .parse_mode(ParseMode::Html)
                    .await?;
                return Ok(());
            }
            StartRequest::Verify(token) => {
                return Self::redeem_verification(&ctx, &msg, &user, token, lang).await;
            }
            StartRequest::InvalidLink => {
                info!("Rejected start payload '{}' from user {}", payload, user.id.0);
                ctx.bot
                    .send_message(msg.chat.id, lang.error_invalid_link())
                    .await?;
                return Ok(());
            }
            StartRequest::TooLarge(count) => {
                info!(
                    "Refusing batch of {} messages for user {} (max {})",
                    count, user.id.0, ctx.config.max_batch_size
                );
                ctx.bot
                    .send_message(
                        msg.chat.id,
                        lang.error_batch_too_large(ctx.config.max_batch_size),
                    )
                    .await?;
                return Ok(());
            }
            StartRequest::Open(link) => link,
        };

        let settings = ctx.settings.snapshot().await;
        let telegram_user_id = user.id.0 as i64;
        match needs_verification(
            &ctx.access,
            &settings,
            ctx.config.is_admin(telegram_user_id),
            telegram_user_id,
            Utc::now(),
        )
        .await
        {
            Ok(false) => {}
            Ok(true) => {
                return Self::send_access_required(&ctx, &msg, telegram_user_id, &settings, lang)
                    .await;
            }
            Err(e) => {
                error!("Failed to check access for user {}: {}", telegram_user_id, e);
                ctx.bot
                    .send_message(msg.chat.id, lang.error_processing_request())
                    .await?;
                return Ok(());
            }
        }

        Self::deliver(&ctx, msg.chat.id, link, lang).await
    }

    async fn redeem_verification(
        ctx: &BotContext,
        msg: &Message,
        user: &User,
        token: &str,
        lang: Lang,
    ) -> ResponseResult<()> {
        let settings = ctx.settings.snapshot().await;
        let validity_hours = settings.access_token.validity_hours;

        match ctx
            .access
            .redeem_verification_token(user.id.0 as i64, token, validity_hours, Utc::now())
            .await
        {
            Ok(expires_at) => {
                ctx.bot
                    .send_message(
                        msg.chat.id,
                        lang.access_granted(
                            &MessageFormatter::format_expiry(expires_at),
                            validity_hours,
                        ),
                    )
                    .parse_mode(ParseMode::Html)
                    .await?;
            }
            Err(AccessManagerError::DatabaseError(e)) => {
                error!("Failed to redeem token for user {}: {}", user.id.0, e);
                ctx.bot
                    .send_message(msg.chat.id, lang.error_processing_request())
                    .await?;
            }
            Err(e) => {
                info!("Verification failed for user {}: {}", user.id.0, e);
                ctx.bot
                    .send_message(msg.chat.id, lang.error_verification_failed())
                    .await?;
            }
        }
        Ok(())
    }

    /// issues a verification token and sends its (shortened) link with the tutorial
    async fn send_access_required(
        ctx: &BotContext,
        msg: &Message,
        telegram_user_id: i64,
        settings: &BotSettings,
        lang: Lang,
    ) -> ResponseResult<()> {
        let token = match ctx.access.issue_verification_token(telegram_user_id).await {
            Ok(token) => token,
            Err(e) => {
                error!("Failed to issue token for user {}: {}", telegram_user_id, e);
                ctx.bot
                    .send_message(msg.chat.id, lang.error_processing_request())
                    .await?;
                return Ok(());
            }
        };

        let verify_link = deep_link(&ctx.bot_username, &format!("{}{}", VERIFY_PREFIX, token));
        let short_link = ctx
            .shortener
            .shorten(&verify_link, &settings.shortener, false)
            .await;

        let mut rows = Vec::new();
        match Url::parse(&short_link).or_else(|_| Url::parse(&verify_link)) {
            Ok(url) => rows.push(vec![InlineKeyboardButton::url(lang.button_verify(), url)]),
            Err(e) => error!("Verification link is not a valid url: {}", e),
        }
        match Url::parse(&settings.shortener.tutorial_link) {
            Ok(url) => rows.push(vec![InlineKeyboardButton::url(lang.button_tutorial(), url)]),
            Err(e) => warn!(
                "Tutorial link '{}' is not a valid url: {}",
                settings.shortener.tutorial_link, e
            ),
        }

        ctx.bot
            .send_message(
                msg.chat.id,
                lang.access_required(settings.access_token.validity_hours),
            )
            .parse_mode(ParseMode::Html)
            .reply_markup(InlineKeyboardMarkup::new(rows))
            .await?;
        Ok(())
    }

    /// copies every addressed message from the storage channel; missing ones are skipped
    async fn deliver(
        ctx: &BotContext,
        chat_id: ChatId,
        link: DecodedLink,
        lang: Lang,
    ) -> ResponseResult<()> {
        let waiting = ctx.bot.send_message(chat_id, lang.please_wait()).await?;

        let mut delivered = Vec::new();
        for id in link.message_ids() {
            let Ok(message_id) = i32::try_from(id) else {
                warn!("Message id {} is outside Telegram's range", id);
                continue;
            };
            match with_flood_retry(|| {
                ctx.bot
                    .copy_message(chat_id, ctx.db_channel(), MessageId(message_id))
                    .protect_content(ctx.config.protect_content)
            })
            .await
            {
                Ok(copied) => delivered.push(copied),
                Err(e) => warn!("Skipping message {}: {}", message_id, e),
            }
        }

        if let Err(e) = ctx.bot.delete_message(chat_id, waiting.id).await {
            warn!("Failed to delete waiting message: {}", e);
        }

        info!(
            "Delivered {}/{} messages to chat {}",
            delivered.len(),
            link.len(),
            chat_id.0
        );
        if delivered.is_empty() {
            ctx.bot
                .send_message(chat_id, lang.error_nothing_delivered())
                .await?;
            return Ok(());
        }

        if let Some(delay) = ctx.config.auto_delete {
            let notice = ctx
                .bot
                .send_message(chat_id, lang.auto_delete_notice(delay.as_secs().div_ceil(60)))
                .parse_mode(ParseMode::Html)
                .await?;
            Self::schedule_auto_delete(ctx.clone(), chat_id, delivered, notice.id, delay, lang);
        }
        Ok(())
    }

    fn schedule_auto_delete(
        ctx: BotContext,
        chat_id: ChatId,
        messages: Vec<MessageId>,
        notice: MessageId,
        delay: Duration,
        lang: Lang,
    ) {
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            for message_id in messages {
                if let Err(e) = ctx.bot.delete_message(chat_id, message_id).await {
                    warn!("Auto-delete of message {} failed: {}", message_id.0, e);
                }
            }
            if let Err(e) = ctx
                .bot
                .edit_message_text(chat_id, notice, lang.auto_deleted())
                .await
            {
                warn!("Failed to update auto-delete notice: {}", e);
            }
        });
    }

    async fn handle_revoke_access_command(
        ctx: BotContext,
        msg: Message,
        args: &str,
    ) -> ResponseResult<()> {
        let Ok(target) = args.parse::<i64>() else {
            ctx.bot
                .send_message(
                    msg.chat.id,
                    "Usage: <code>/revoke_access user_id</code>",
                )
                .parse_mode(ParseMode::Html)
                .await?;
            return Ok(());
        };

        let reply = match ctx.access.revoke_user(target).await {
            Ok(true) => format!("✅ Access revoked for <code>{}</code>.", target),
            Ok(false) => format!("ℹ️ User <code>{}</code> had no access token.", target),
            Err(e) => {
                error!("Failed to revoke access for {}: {}", target, e);
                "❌ Failed to revoke access. Check the logs.".to_string()
            }
        };
        ctx.bot
            .send_message(msg.chat.id, reply)
            .parse_mode(ParseMode::Html)
            .await?;
        Ok(())
    }
}
