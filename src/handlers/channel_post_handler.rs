use log::{error, info, warn};
use std::path::PathBuf;
use teloxide::net::Download;
use teloxide::prelude::*;
use teloxide::RequestError;
use teloxide::types::{
    InlineKeyboardButton, InlineKeyboardMarkup, InputFile, InputMedia, InputMediaPhoto, MessageId,
    ParseMode,
};
use tokio::io::AsyncWriteExt;

use crate::bot::BotContext;
use crate::config::ALBUM_SIZE;
use crate::link_codec::{deep_link, share_url};
use crate::localization::Lang;
use crate::rate_limiters::with_flood_retry;
use crate::utils::MessageFormatter;

/// a video stored in the channel behind its screenshots, ready to preview
struct StoredPreview {
    link: String,
    screenshots: Vec<PathBuf>,
    stored_video: MessageId,
    // keeps the screenshot files alive until the preview is sent
    _work_dir: tempfile::TempDir,
}

pub struct ChannelPostHandler;

impl ChannelPostHandler {
    pub fn share_keyboard(link: &str) -> InlineKeyboardMarkup {
        InlineKeyboardMarkup::new(vec![vec![InlineKeyboardButton::url(
            "🔁 Share URL",
            share_url(link),
        )]])
    }

    fn link_message(link: &str) -> String {
        format!(
            "<b>Here is your link</b>\n\n{}",
            MessageFormatter::escape_html(link)
        )
    }

    /// file id of a video upload, including videos sent as documents
    fn video_file_id(msg: &Message) -> Option<String> {
        if let Some(video) = msg.video() {
            return Some(video.file.id.clone());
        }
        msg.document()
            .filter(|doc| {
                doc.mime_type
                    .as_ref()
                    .is_some_and(|mime| mime.type_().as_str() == "video")
            })
            .map(|doc| doc.file.id.clone())
    }

    /// posts made directly in the storage channel get a share button
    pub async fn handle_channel_post(ctx: BotContext, msg: Message) -> ResponseResult<()> {
        if msg.chat.id != ctx.db_channel() || ctx.config.disable_button {
            return Ok(());
        }

        let payload = match ctx.codec.encode_single(msg.id.0 as i64) {
            Ok(payload) => payload,
            Err(e) => {
                error!("Failed to encode link for channel post {}: {}", msg.id.0, e);
                return Ok(());
            }
        };
        let link = deep_link(&ctx.bot_username, &payload);

        if let Err(e) = ctx
            .bot
            .edit_message_reply_markup(msg.chat.id, msg.id)
            .reply_markup(Self::share_keyboard(&link))
            .await
        {
            warn!("Failed to attach share button to post {}: {}", msg.id.0, e);
        }
        Ok(())
    }

    /// stores an admin's private message in the storage channel and replies with its link
    pub async fn handle_admin_upload(ctx: BotContext, msg: Message) -> ResponseResult<()> {
        let lang = Lang::from_code(
            msg.from
                .as_ref()
                .and_then(|user| user.language_code.as_deref()),
        );
        let waiting = ctx
            .bot
            .send_message(msg.chat.id, lang.please_wait())
            .await?;

        if let Some(file_id) = Self::video_file_id(&msg) {
            match Self::store_video_with_screenshots(&ctx, &msg, file_id).await {
                Ok(stored) => {
                    Self::attach_share_button(&ctx, stored.stored_video, &stored.link).await;
                    return Self::send_preview(&ctx, &msg, waiting.id, &stored).await;
                }
                Err(e) => {
                    warn!(
                        "Screenshot preview failed for message {}, storing plain copy: {}",
                        msg.id.0, e
                    );
                }
            }
        }

        Self::store_plain(&ctx, &msg, waiting.id).await
    }

    async fn store_plain(ctx: &BotContext, msg: &Message, waiting: MessageId) -> ResponseResult<()> {
        let stored = match with_flood_retry(|| {
            ctx.bot
                .copy_message(ctx.db_channel(), msg.chat.id, msg.id)
        })
        .await
        {
            Ok(stored) => stored,
            Err(e) => {
                error!("Failed to copy message {} to DB channel: {}", msg.id.0, e);
                ctx.bot
                    .edit_message_text(msg.chat.id, waiting, "Something went Wrong..!")
                    .await?;
                return Ok(());
            }
        };

        let link = match ctx.codec.encode_single(stored.0 as i64) {
            Ok(payload) => deep_link(&ctx.bot_username, &payload),
            Err(e) => {
                error!("Failed to encode link for stored message {}: {}", stored.0, e);
                ctx.bot
                    .edit_message_text(msg.chat.id, waiting, "Something went Wrong..!")
                    .await?;
                return Ok(());
            }
        };
        info!("Stored message {} as {}", stored.0, link);

        Self::reply_with_link(ctx, msg.chat.id, waiting, &link).await?;
        Self::attach_share_button(ctx, stored, &link).await;
        Ok(())
    }

    async fn reply_with_link(
        ctx: &BotContext,
        chat_id: ChatId,
        waiting: MessageId,
        link: &str,
    ) -> ResponseResult<()> {
        let (text, keyboard) = Self::link_reply(link);
        ctx.bot
            .edit_message_text(chat_id, waiting, text)
            .parse_mode(ParseMode::Html)
            .reply_markup(keyboard)
            .await?;
        Ok(())
    }

    /// text and share button that replace the waiting message
    fn link_reply(link: &str) -> (String, InlineKeyboardMarkup) {
        (Self::link_message(link), Self::share_keyboard(link))
    }

    async fn attach_share_button(ctx: &BotContext, stored: MessageId, link: &str) {
        if ctx.config.disable_button {
            return;
        }
        if let Err(e) = ctx
            .bot
            .edit_message_reply_markup(ctx.db_channel(), stored)
            .reply_markup(Self::share_keyboard(link))
            .await
        {
            warn!("Failed to attach share button to stored message {}: {}", stored.0, e);
        }
    }

    /// sends the album and link to the admin; the link is already stored, so a
    /// failed preview only degrades to a plain link reply
    async fn send_preview(
        ctx: &BotContext,
        msg: &Message,
        waiting: MessageId,
        stored: &StoredPreview,
    ) -> ResponseResult<()> {
        let link = &stored.link;
        let album = Self::photo_group(&stored.screenshots, Some(link.as_str()));
        let sent = async {
            ctx.bot.send_media_group(msg.chat.id, album).await?;
            ctx.bot
                .send_message(msg.chat.id, Self::link_message(link))
                .parse_mode(ParseMode::Html)
                .reply_markup(Self::share_keyboard(link))
                .await?;
            Ok::<_, RequestError>(())
        }
        .await;

        match sent {
            Ok(()) => {
                if let Err(e) = ctx.bot.delete_message(msg.chat.id, waiting).await {
                    warn!("Failed to delete waiting message: {}", e);
                }
                Ok(())
            }
            Err(e) => {
                warn!("Failed to send preview for {}, replying with link only: {}", link, e);
                Self::reply_with_link(ctx, msg.chat.id, waiting, link).await
            }
        }
    }

    /// checks the frame count against telegram's album bounds before uploading
    fn check_album_size(
        screenshots: &[PathBuf],
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let count = screenshots.len();
        if ALBUM_SIZE.contains(&count) {
            Ok(())
        } else {
            Err(format!(
                "{} screenshot(s) extracted, an album needs {} to {}",
                count,
                ALBUM_SIZE.start(),
                ALBUM_SIZE.end()
            )
            .into())
        }
    }

    /// screenshots go to the storage channel first, then the video, so one range link covers both
    async fn store_video_with_screenshots(
        ctx: &BotContext,
        msg: &Message,
        file_id: String,
    ) -> Result<StoredPreview, Box<dyn std::error::Error + Send + Sync>> {
        if !ctx.extractor.is_available().await {
            return Err("ffmpeg is not available".into());
        }

        let file = ctx.bot.get_file(file_id).await?;
        // removed together with everything inside when dropped
        let work_dir = tempfile::tempdir()?;
        let video_path = work_dir.path().join(Self::video_file_name(&file.path));
        {
            let mut destination = tokio::fs::File::create(&video_path).await?;
            ctx.bot.download_file(&file.path, &mut destination).await?;
            destination.flush().await?;
        }
        info!("Downloaded video to {}", video_path.display());

        let screenshots = ctx
            .extractor
            .extract_screenshots(&video_path, ctx.config.screenshot_count, work_dir.path())
            .await;
        Self::check_album_size(&screenshots)?;

        let media = Self::photo_group(&screenshots, None);
        let posted = with_flood_retry(|| {
            ctx.bot
                .send_media_group(ctx.db_channel(), media.clone())
        })
        .await?;
        let first_id = posted
            .first()
            .map(|message| message.id.0 as i64)
            .ok_or("media group returned no messages")?;

        let stored_video = with_flood_retry(|| {
            ctx.bot
                .copy_message(ctx.db_channel(), msg.chat.id, msg.id)
        })
        .await?;

        let payload = ctx.codec.encode_range(first_id, stored_video.0 as i64)?;
        let link = deep_link(&ctx.bot_username, &payload);
        info!(
            "Stored {} screenshots and video {} as {}",
            posted.len(),
            stored_video.0,
            link
        );

        Ok(StoredPreview {
            link,
            screenshots,
            stored_video,
            _work_dir: work_dir,
        })
    }

    fn video_file_name(remote_path: &str) -> String {
        let extension = std::path::Path::new(remote_path)
            .extension()
            .and_then(|ext| ext.to_str())
            .filter(|ext| ext.chars().all(|c| c.is_ascii_alphanumeric()))
            .unwrap_or("mp4");
        format!("video.{}", extension)
    }

    /// album of screenshots; the caption goes on the first photo only
    fn photo_group(screenshots: &[PathBuf], caption: Option<&str>) -> Vec<InputMedia> {
        screenshots
            .iter()
            .enumerate()
            .map(|(i, path)| {
                let photo = InputMediaPhoto::new(InputFile::file(path.clone()));
                let photo = match caption {
                    Some(caption) if i == 0 => photo.caption(caption),
                    _ => photo,
                };
                InputMedia::Photo(photo)
            })
            .collect()
    }
}
