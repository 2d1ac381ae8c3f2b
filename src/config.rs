use crate::error::AppError;
use std::{env, path::PathBuf, str::FromStr, time::Duration};
use teloxide::types::ChatId;
use tracing::{error, warn};

pub const DEFAULT_MAX_YOUTUBE_DURATION_SECS: u64 = 6000;

/// Process-wide settings, resolved once at startup and shared by `Arc`.
#[derive(Clone, Debug)]
pub struct Settings {
    pub admin_id: Option<ChatId>,
    pub download_dir: PathBuf,
    pub yt_dlp: YtDlpSettings,
    pub spotdl_bin: PathBuf,
    pub spotdl_timeout: Duration,
    pub page_timeout: Duration,
    pub fetch_timeout: Duration,
    pub request_deadline: Duration,
}

#[derive(Clone, Debug)]
pub struct YtDlpSettings {
    pub bin: PathBuf,
    pub max_youtube_duration_secs: u64,
    pub probe_timeout: Duration,
    pub download_timeout: Duration,
    pub player_client: Option<String>,
    pub force_ipv4: bool,
}

impl Default for YtDlpSettings {
    fn default() -> Self {
        Self {
            bin: PathBuf::from("yt-dlp"),
            max_youtube_duration_secs: DEFAULT_MAX_YOUTUBE_DURATION_SECS,
            probe_timeout: Duration::from_secs(60),
            download_timeout: Duration::from_secs(600),
            player_client: None,
            force_ipv4: false,
        }
    }
}

impl Settings {
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let yt_dlp = YtDlpSettings {
            bin: lookup("YTDLP_BIN")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("yt-dlp")),
            max_youtube_duration_secs: parse_or(
                &lookup,
                "YOUTUBE_MAX_DURATION_SECS",
                DEFAULT_MAX_YOUTUBE_DURATION_SECS,
            )?,
            probe_timeout: secs_or(&lookup, "YTDLP_PROBE_TIMEOUT_SECS", 60)?,
            download_timeout: secs_or(&lookup, "YTDLP_TIMEOUT_SECS", 600)?,
            player_client: lookup("YTDLP_PLAYER_CLIENT").filter(|v| !v.trim().is_empty()),
            force_ipv4: matches!(
                lookup("YTDLP_FORCE_IPV4").as_deref(),
                Some("1") | Some("true") | Some("TRUE")
            ),
        };

        Ok(Self {
            admin_id: parse_admin_id(lookup("ADMIN_ID")),
            download_dir: lookup("DOWNLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("downloads")),
            yt_dlp,
            spotdl_bin: lookup("SPOTDL_BIN")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("spotdl")),
            spotdl_timeout: secs_or(&lookup, "SPOTDL_TIMEOUT_SECS", 120)?,
            page_timeout: secs_or(&lookup, "PAGE_TIMEOUT_SECS", 10)?,
            fetch_timeout: secs_or(&lookup, "FETCH_TIMEOUT_SECS", 20)?,
            request_deadline: secs_or(&lookup, "REQUEST_DEADLINE_SECS", 900)?,
        })
    }
}

fn parse_admin_id(raw: Option<String>) -> Option<ChatId> {
    let Some(raw) = raw else {
        warn!(
            event = "admin_id_missing",
            "ADMIN_ID is not set, operator reports are disabled"
        );
        return None;
    };
    match raw.trim().parse::<i64>() {
        Ok(id) => Some(ChatId(id)),
        Err(err) => {
            error!(event = "admin_id_invalid", value = %raw, error = %err, "ADMIN_ID must be an integer chat id, operator reports are disabled");
            None
        }
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, AppError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| AppError::Config(format!("{key}={raw:?}: {e}"))),
    }
}

fn secs_or<F>(lookup: &F, key: &str, default: u64) -> Result<Duration, AppError>
where
    F: Fn(&str) -> Option<String>,
{
    let secs = parse_or(lookup, key, default)?;
    if secs == 0 {
        return Err(AppError::Config(format!("{key} must be greater than zero")));
    }
    Ok(Duration::from_secs(secs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings(vars: &[(&str, &str)]) -> Result<Settings, AppError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let settings = settings(&[]).unwrap();
        assert_eq!(settings.admin_id, None);
        assert_eq!(settings.download_dir, PathBuf::from("downloads"));
        assert_eq!(settings.yt_dlp.max_youtube_duration_secs, 6000);
        assert_eq!(settings.spotdl_timeout, Duration::from_secs(120));
        assert_eq!(settings.page_timeout, Duration::from_secs(10));
        assert_eq!(settings.fetch_timeout, Duration::from_secs(20));
        assert!(!settings.yt_dlp.force_ipv4);
        assert!(settings.yt_dlp.player_client.is_none());
    }

    #[test]
    fn admin_id_is_optional_and_tolerant() {
        assert_eq!(
            settings(&[("ADMIN_ID", "12345")]).unwrap().admin_id,
            Some(ChatId(12345))
        );
        assert_eq!(settings(&[("ADMIN_ID", "not-a-number")]).unwrap().admin_id, None);
    }

    #[test]
    fn overrides_are_parsed() {
        let settings = settings(&[
            ("YOUTUBE_MAX_DURATION_SECS", "60"),
            ("SPOTDL_TIMEOUT_SECS", "5"),
            ("YTDLP_FORCE_IPV4", "true"),
            ("YTDLP_PLAYER_CLIENT", "android"),
            ("SPOTDL_BIN", "/opt/spotdl"),
        ])
        .unwrap();
        assert_eq!(settings.yt_dlp.max_youtube_duration_secs, 60);
        assert_eq!(settings.spotdl_timeout, Duration::from_secs(5));
        assert!(settings.yt_dlp.force_ipv4);
        assert_eq!(settings.yt_dlp.player_client.as_deref(), Some("android"));
        assert_eq!(settings.spotdl_bin, PathBuf::from("/opt/spotdl"));
    }

    #[test]
    fn bad_numbers_are_rejected() {
        assert!(matches!(
            settings(&[("FETCH_TIMEOUT_SECS", "soon")]),
            Err(AppError::Config(_))
        ));
        assert!(matches!(
            settings(&[("SPOTDL_TIMEOUT_SECS", "0")]),
            Err(AppError::Config(_))
        ));
    }
}
