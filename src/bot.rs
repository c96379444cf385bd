use log::{error, info, warn};
use std::sync::Arc;
use teloxide::prelude::*;
use teloxide::types::{CallbackQuery, ChatId};
use teloxide::utils::command::BotCommands;

use crate::access_manager::AccessManager;
use crate::config::BotConfig;
use crate::handlers::{CallbackHandler, ChannelPostHandler, CommandHandler};
use crate::link_codec::LinkCodec;
use crate::pending_input::{PendingInputs, INPUT_TIMEOUT};
use crate::screenshots::FrameExtractor;
use crate::settings_service::SettingsService;
use crate::settings_store::{SettingsStore, ShortenerSettings};
use crate::shortener::Shortener;
use deadpool_postgres::Pool;

#[derive(BotCommands, Clone, Debug, PartialEq, Eq)]
#[command(rename_rule = "lowercase", description = "Supported commands:")]
pub enum Command {
    #[command(description = "start the bot or open a file link")]
    Start(String),
    #[command(description = "shortener settings (admins)", alias = "shortner")]
    Shortener,
    #[command(description = "access token settings (admins)")]
    Token,
    #[command(
        rename = "revoke_access",
        description = "revoke a user's access token (admins)"
    )]
    RevokeAccess(String),
}

pub struct TelegramBot {
    ctx: BotContext,
}

#[derive(Clone)]
pub struct BotContext {
    pub bot: Arc<Bot>,
    pub config: Arc<BotConfig>,
    pub codec: LinkCodec,
    pub settings: Arc<SettingsService>,
    pub access: Arc<AccessManager>,
    pub shortener: Arc<Shortener>,
    pub extractor: FrameExtractor,
    pub pending: PendingInputs,
    pub bot_username: Arc<str>,
}

impl BotContext {
    pub fn db_channel(&self) -> ChatId {
        ChatId(self.config.db_channel)
    }
}

impl TelegramBot {
    pub async fn new(
        config: BotConfig,
        pool: Pool,
    ) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let bot = Arc::new(Bot::new(&config.bot_token));
        let codec = LinkCodec::new(config.db_channel)?;

        let settings = SettingsService::load(
            SettingsStore::new(pool.clone()),
            ShortenerSettings::from_config(&config),
        )
        .await?;
        let shortener = Shortener::new(config.short_cache_capacity, config.short_cache_ttl)?;
        let extractor =
            FrameExtractor::locate(config.ffmpeg_path.as_deref(), config.ffprobe_path.as_deref());

        let me = bot.get_me().await?;
        let bot_username = me
            .user
            .username
            .clone()
            .ok_or("bot account has no username, deep links need one")?;
        info!("Running as @{}", bot_username);

        Self::check_db_channel(&bot, config.db_channel).await?;

        Ok(Self {
            ctx: BotContext {
                bot,
                config: Arc::new(config),
                codec,
                settings: Arc::new(settings),
                access: Arc::new(AccessManager::new(pool)),
                shortener: Arc::new(shortener),
                extractor,
                pending: PendingInputs::new(INPUT_TIMEOUT),
                bot_username: bot_username.into(),
            },
        })
    }

    /// the bot must be able to post into the storage channel
    async fn check_db_channel(
        bot: &Bot,
        db_channel: i64,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let probe = bot
            .send_message(ChatId(db_channel), "Test Message")
            .await
            .map_err(|e| {
                error!(
                    "Make sure the bot is admin in DB channel {} ({})",
                    db_channel, e
                );
                e
            })?;
        if let Err(e) = bot.delete_message(ChatId(db_channel), probe.id).await {
            warn!("Failed to delete probe message in DB channel: {}", e);
        }
        Ok(())
    }

    pub async fn run(&self) {
        info!("Starting Telegram bot...");

        if self.ctx.extractor.is_available().await {
            info!("ffmpeg found, video uploads get screenshot previews");
        } else {
            warn!("ffmpeg not available, videos will be stored without screenshots");
        }

        if let Err(e) = self
            .ctx
            .bot
            .set_my_commands(Command::bot_commands())
            .await
        {
            warn!("Failed to register bot commands: {}", e);
        }

        let ctx = self.ctx.clone();

        let handler = dptree::entry()
            .branch(Update::filter_callback_query().endpoint({
                let ctx = ctx.clone();
                move |query: CallbackQuery| {
                    let ctx = ctx.clone();
                    async move { CallbackHandler::handle_callback_query(ctx, query).await }
                }
            }))
            .branch(Update::filter_channel_post().endpoint({
                let ctx = ctx.clone();
                move |msg: Message| {
                    let ctx = ctx.clone();
                    async move { ChannelPostHandler::handle_channel_post(ctx, msg).await }
                }
            }))
            .branch(
                Update::filter_message()
                    .branch(dptree::entry().filter_command::<Command>().endpoint({
                        let ctx = ctx.clone();
                        move |msg: Message, cmd: Command| {
                            let ctx = ctx.clone();
                            async move { CommandHandler::handle_command(ctx, msg, cmd).await }
                        }
                    }))
                    .branch(dptree::endpoint({
                        let ctx = ctx.clone();
                        move |msg: Message| {
                            let ctx = ctx.clone();
                            async move { Self::handle_message(ctx, msg).await }
                        }
                    })),
            );

        Dispatcher::builder(self.ctx.bot.clone(), handler)
            .error_handler(
                teloxide::error_handlers::LoggingErrorHandler::with_custom_text(
                    "An error from the update listener",
                ),
            )
            .enable_ctrlc_handler()
            .build()
            .dispatch()
            .await;
    }

    async fn handle_message(ctx: BotContext, msg: Message) -> ResponseResult<()> {
        if !msg.chat.is_private() {
            return Ok(());
        }
        let Some(user) = msg.from.as_ref() else {
            return Ok(());
        };
        let telegram_user_id = user.id.0 as i64;

        if !ctx.config.is_admin(telegram_user_id) {
            ctx.bot
                .send_message(msg.chat.id, ctx.config.reply_text.clone())
                .await?;
            return Ok(());
        }

        if let Some(pending) = ctx.pending.take(telegram_user_id).await {
            return CallbackHandler::handle_pending_input(ctx, msg, pending).await;
        }

        // unknown commands from admins are not uploads
        if msg.text().is_some_and(|text| text.starts_with('/')) {
            info!("Ignoring unknown command from admin {}", telegram_user_id);
            return Ok(());
        }

        ChannelPostHandler::handle_admin_upload(ctx, msg).await
    }
}
