use crate::{
    config::Settings,
    dispatcher::Dispatcher,
    error::{AppError, RetrievalError},
    fetcher::{build_http_client, FileFetcher},
    operator::{truncate_chars, Operator, RequestUser},
    pinterest::PinterestScraper,
    platform::{classify, supported_links_text, MediaKind, Platform},
    spotify::SpotDl,
    tasks::{request_basename, OutputGuard},
    yt_dlp::YtDlpClient,
};
use std::{path::Path, sync::Arc};
use teloxide::{
    dispatching::{HandlerExt, UpdateHandler},
    prelude::*,
    types::{InputFile, MessageId, ParseMode},
    utils::{command::BotCommands, html::escape},
    ApiError, RequestError,
};
use tracing::{error, info, instrument, warn, Instrument};

const USER_ERROR_CHARS: usize = 600;

#[derive(Clone)]
pub struct AppServices {
    settings: Arc<Settings>,
    dispatcher: Arc<Dispatcher>,
    operator: Operator,
}

impl AppServices {
    pub fn new(settings: Arc<Settings>, operator: Operator) -> Result<Self, AppError> {
        let fetcher = FileFetcher::new(build_http_client(settings.fetch_timeout)?);
        let dispatcher = Dispatcher::new(
            settings.download_dir.clone(),
            Arc::new(YtDlpClient::new(settings.yt_dlp.clone())),
            Arc::new(PinterestScraper::new(fetcher, settings.page_timeout)),
            Arc::new(SpotDl::new(
                settings.spotdl_bin.clone(),
                settings.download_dir.clone(),
                settings.spotdl_timeout,
            )),
        );
        Ok(Self {
            settings,
            dispatcher: Arc::new(dispatcher),
            operator,
        })
    }
}

#[derive(BotCommands, Clone, Debug)]
#[command(rename_rule = "snake_case", description = "Commands:")]
pub enum Command {
    #[command(description = "how to use the bot")]
    Start,
    #[command(description = "list supported links")]
    SupportedLinks,
}

pub fn build_handler() -> UpdateHandler<AppError> {
    Update::filter_message()
        .branch(
            dptree::entry()
                .filter_command::<Command>()
                .endpoint(handle_command),
        )
        .branch(dptree::filter_map(extract_text).endpoint(handle_link))
}

fn extract_text(msg: Message) -> Option<(Message, String)> {
    let text = link_text(msg.text())?;
    Some((msg, text))
}

fn link_text(text: Option<&str>) -> Option<String> {
    let text = text?.trim();
    (!text.is_empty()).then(|| text.to_string())
}

async fn handle_command(bot: Bot, msg: Message, cmd: Command) -> Result<(), AppError> {
    let text = match cmd {
        Command::Start => "Send me a link to a video, picture or track.\n\
             Supported links: /supported_links\n\n\
             <b>No data about you is stored.</b>"
            .to_string(),
        Command::SupportedLinks => supported_links_text(),
    };
    bot.send_message(msg.chat.id, text)
        .parse_mode(ParseMode::Html)
        .await?;
    Ok(())
}

async fn handle_link(
    bot: Bot,
    services: AppServices,
    msg_and_url: (Message, String),
) -> Result<(), AppError> {
    let (msg, url) = msg_and_url;
    tokio::spawn(
        async move {
            process_link(bot, services, msg, url).await;
        }
        .in_current_span(),
    );
    Ok(())
}

#[derive(Clone, Copy)]
enum Stage {
    Waiting,
    Active,
    Done,
}

impl Stage {
    fn marker(self) -> &'static str {
        match self {
            Stage::Waiting => "❌",
            Stage::Active => "🟨",
            Stage::Done => "✅",
        }
    }
}

fn status_text(platform: Option<Platform>, download: Stage, send: Stage) -> String {
    let platform = platform.map_or_else(|| Stage::Active.marker().to_string(), |p| p.to_string());
    format!(
        "<b>Platform: {platform}</b>\n\nDownloading {}\nSending {}",
        download.marker(),
        send.marker()
    )
}

#[instrument(skip_all, fields(chat_id = msg.chat.id.0, url = %url))]
async fn process_link(bot: Bot, services: AppServices, msg: Message, url: String) {
    let chat_id = msg.chat.id;
    let user = RequestUser::from_message(&msg);
    let status = match bot
        .send_message(chat_id, status_text(None, Stage::Waiting, Stage::Waiting))
        .parse_mode(ParseMode::Html)
        .await
    {
        Ok(status) => status,
        Err(err) => {
            error!(event = "status_message_failed", error = %err);
            return;
        }
    };

    let platform = classify(&url);
    let mut output: Option<OutputGuard> = None;
    let result = retrieve_and_deliver(
        &bot,
        &services,
        &user,
        &msg,
        &status,
        platform,
        &url,
        &mut output,
    )
    .await;

    match result {
        Ok(()) => {
            for id in [msg.id, status.id] {
                if let Err(err) = bot.delete_message(chat_id, id).await {
                    warn!(event = "delete_message_failed", message_id = id.0, error = %err);
                }
            }
        }
        Err(err) => {
            error!(event = "link_failed", platform = %platform, error = %err);
            let text = format!(
                "⚠️ Error: {}",
                escape(&truncate_chars(&user_message(&err), USER_ERROR_CHARS))
            );
            report_user_error(&bot, chat_id, status.id, text).await;
            services
                .operator
                .report_failure(&user, platform, &url, &err.to_string())
                .await;
        }
    }

    if let Some(guard) = output.take() {
        let path = guard.path().to_path_buf();
        if let Err(err) = guard.remove().await {
            error!(event = "output_remove_failed", path = %path.display(), error = %err);
            services
                .operator
                .report_cleanup_failure(&user, &path, &err.to_string())
                .await;
        }
    }
}

/// The fallible part of a request. The retrieved file is parked in `output`
/// so the caller removes it whatever happens here.
#[allow(clippy::too_many_arguments)]
async fn retrieve_and_deliver(
    bot: &Bot,
    services: &AppServices,
    user: &RequestUser,
    msg: &Message,
    status: &Message,
    platform: Platform,
    url: &str,
    output: &mut Option<OutputGuard>,
) -> Result<(), AppError> {
    let chat_id = msg.chat.id;
    if platform == Platform::Unsupported {
        return Err(RetrievalError::UnsupportedPlatform.into());
    }
    edit_status(bot, status, status_text(Some(platform), Stage::Active, Stage::Waiting)).await;

    let basename = request_basename(user.id);
    let path = tokio::time::timeout(
        services.settings.request_deadline,
        services.dispatcher.retrieve(platform, url, &basename),
    )
    .await
    .map_err(|_| RetrievalError::Timeout)??;
    let path = output.insert(OutputGuard::new(path)).path().to_path_buf();

    let kind = MediaKind::from_path(&path).ok_or_else(|| {
        RetrievalError::EmptyOrMissingOutput(format!("unexpected file type: {}", path.display()))
    })?;
    edit_status(bot, status, status_text(Some(platform), Stage::Done, Stage::Active)).await;

    send_media(bot, chat_id, kind, &path, None).await?;
    edit_status(bot, status, status_text(Some(platform), Stage::Done, Stage::Done)).await;
    info!(event = "link_delivered", platform = %platform, path = %path.display());

    services
        .operator
        .report_success(user, platform, url, &path, kind)
        .await;
    Ok(())
}

/// Picks the upload call from the media kind.
pub async fn send_media(
    bot: &Bot,
    chat_id: ChatId,
    kind: MediaKind,
    path: &Path,
    caption: Option<String>,
) -> Result<Message, RequestError> {
    let file = InputFile::file(path.to_path_buf());
    match kind {
        MediaKind::Video => {
            let mut req = bot.send_video(chat_id, file);
            if let Some(caption) = caption {
                req = req.caption(caption).parse_mode(ParseMode::Html);
            }
            req.await
        }
        MediaKind::Photo => {
            let mut req = bot.send_photo(chat_id, file);
            if let Some(caption) = caption {
                req = req.caption(caption).parse_mode(ParseMode::Html);
            }
            req.await
        }
        MediaKind::Audio => {
            let mut req = bot.send_audio(chat_id, file);
            if let Some(caption) = caption {
                req = req.caption(caption).parse_mode(ParseMode::Html);
            }
            req.await
        }
    }
}

fn user_message(err: &AppError) -> String {
    match err {
        AppError::Retrieval(RetrievalError::UnsupportedPlatform) => {
            "This link is not supported. Supported links: /supported_links".to_string()
        }
        AppError::Retrieval(err) => err.to_string(),
        AppError::Teloxide(_) => "Could not send the file. Please try again later.".to_string(),
        _ => "Something went wrong. Please try again later.".to_string(),
    }
}

async fn edit_status(bot: &Bot, status: &Message, text: String) {
    if let Err(err) = bot
        .edit_message_text(status.chat.id, status.id, text)
        .parse_mode(ParseMode::Html)
        .await
    {
        if !is_message_not_modified(&err) {
            warn!(event = "status_edit_failed", error = %err);
        }
    }
}

fn is_message_not_modified(err: &RequestError) -> bool {
    matches!(err, RequestError::Api(ApiError::MessageNotModified))
}

async fn report_user_error(bot: &Bot, chat_id: ChatId, message_id: MessageId, text: String) {
    if bot
        .edit_message_text(chat_id, message_id, text.clone())
        .parse_mode(ParseMode::Html)
        .await
        .is_err()
    {
        if let Err(err) = bot
            .send_message(chat_id, text)
            .parse_mode(ParseMode::Html)
            .await
        {
            warn!(event = "user_error_report_failed", error = %err);
        }
    }
}
