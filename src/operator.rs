use crate::{
    handlers::send_media,
    platform::{MediaKind, Platform},
};
use std::path::Path;
use teloxide::{prelude::*, types::ParseMode, utils::html::escape};
use tracing::{error, info, warn};

const REPORT_URL_CHARS: usize = 200;
const CAPTION_URL_CHARS: usize = 100;

/// Who sent the link.
#[derive(Clone, Debug)]
pub struct RequestUser {
    pub id: u64,
    pub full_name: String,
    pub username: Option<String>,
}

impl RequestUser {
    pub fn from_message(msg: &Message) -> Self {
        match &msg.from {
            Some(user) => Self {
                id: user.id.0,
                full_name: user.full_name(),
                username: user.username.clone(),
            },
            None => Self {
                id: 0,
                full_name: "Unknown".to_string(),
                username: None,
            },
        }
    }

    fn describe(&self) -> String {
        format!(
            "{} (@{}, ID: {})",
            escape(&self.full_name),
            escape(self.username.as_deref().unwrap_or("N/A")),
            self.id
        )
    }
}

/// Mirrors activity to the admin chat, when one is configured. Every send is
/// best-effort: failures are logged and never reach the user's flow.
#[derive(Clone)]
pub struct Operator {
    bot: Bot,
    admin: Option<ChatId>,
}

impl Operator {
    pub fn new(bot: Bot, admin: Option<ChatId>) -> Self {
        Self { bot, admin }
    }

    /// The admin chat, unless the admin is the one asking.
    fn target_for(&self, user: &RequestUser) -> Option<ChatId> {
        self.admin
            .filter(|admin| i64::try_from(user.id).map_or(true, |id| admin.0 != id))
    }

    pub async fn announce_startup(&self) {
        let Some(admin) = self.admin else {
            return;
        };
        if self.send_text(admin, "✅ Bot started and ready.".to_string()).await {
            info!(event = "startup_announced", admin = admin.0);
        }
    }

    pub async fn report_success(
        &self,
        user: &RequestUser,
        platform: Platform,
        url: &str,
        path: &Path,
        kind: MediaKind,
    ) {
        let Some(admin) = self.target_for(user) else {
            return;
        };
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let report = format!(
            "✅ <b>Delivered</b>\nUser: {}\nPlatform: {platform}\nLink: {}\nFile: {}",
            user.describe(),
            escape(&truncate_chars(url, REPORT_URL_CHARS)),
            escape(&file_name),
        );
        self.send_text(admin, report).await;

        let caption = format!(
            "Copy for {}\nLink: {}",
            user.describe(),
            escape(&truncate_chars(url, CAPTION_URL_CHARS)),
        );
        if let Err(err) = send_media(&self.bot, admin, kind, path, Some(caption)).await {
            error!(event = "operator_copy_failed", admin = admin.0, error = %err);
            self.send_text(
                admin,
                format!(
                    "⚠️ The file for {} was delivered, but the copy to you failed.\nReason: {}",
                    user.describe(),
                    escape(&err.to_string())
                ),
            )
            .await;
        }
    }

    pub async fn report_failure(
        &self,
        user: &RequestUser,
        platform: Platform,
        url: &str,
        error: &str,
    ) {
        let Some(admin) = self.target_for(user) else {
            return;
        };
        let report = format!(
            "❌ <b>Request failed</b>\nUser: {}\nPlatform: {platform}\nLink: {}\nError: {}",
            user.describe(),
            escape(&truncate_chars(url, REPORT_URL_CHARS)),
            escape(error),
        );
        self.send_text(admin, report).await;
    }

    pub async fn report_cleanup_failure(&self, user: &RequestUser, path: &Path, error: &str) {
        let Some(admin) = self.target_for(user) else {
            return;
        };
        let report = format!(
            "‼️ <b>Could not delete a downloaded file</b>\nPath: <code>{}</code>\nError: <code>{}</code>\nRequested by: {}",
            escape(&path.display().to_string()),
            escape(error),
            user.describe(),
        );
        self.send_text(admin, report).await;
    }

    async fn send_text(&self, chat_id: ChatId, text: String) -> bool {
        match self
            .bot
            .send_message(chat_id, text)
            .parse_mode(ParseMode::Html)
            .await
        {
            Ok(_) => true,
            Err(err) => {
                warn!(event = "operator_send_failed", chat_id = chat_id.0, error = %err);
                false
            }
        }
    }
}

pub fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
