use crate::{
    config::YtDlpSettings,
    dispatcher::{ensure_non_empty, RetrievalJob, Strategy},
    error::RetrievalError,
    fetcher::BROWSER_USER_AGENT,
    platform::Platform,
    process::{run_tool, tool_detail},
};
use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;
use tracing::{debug, error, info, instrument};

pub const FORMAT_SELECTION: &str = "bestvideo[ext=mp4]+bestaudio[ext=m4a]/best[ext=mp4]/best";
const RETRIES: u32 = 3;
const TIKTOK_EXTRACTOR_ARGS: &str = "tiktok:webpage_download=true";

#[derive(Debug, Deserialize)]
pub struct YtDlpInfo {
    pub title: Option<String>,
    pub duration: Option<f64>,
}

#[async_trait]
pub trait MediaProvider: Send + Sync {
    async fn fetch_info(&self, url: &str) -> Result<YtDlpInfo, RetrievalError>;
}

/// Video strategy backed by the `yt-dlp` executable.
pub struct YtDlpClient {
    settings: YtDlpSettings,
}

impl YtDlpClient {
    pub fn new(settings: YtDlpSettings) -> Self {
        Self { settings }
    }

    fn base_command(&self) -> Command {
        let mut cmd = Command::new(&self.settings.bin);
        cmd.arg("--no-playlist")
            .arg("--add-header")
            .arg(format!("User-Agent:{BROWSER_USER_AGENT}"));

        if let Some(player_client) = &self.settings.player_client {
            cmd.arg("--extractor-args")
                .arg(format!("youtube:player_client={player_client}"));
        }
        if self.settings.force_ipv4 {
            debug!(event = "yt_dlp_force_ipv4");
            cmd.arg("--force-ipv4");
        }
        cmd
    }

    /// Refuses YouTube items longer than the configured ceiling before any
    /// download starts.
    async fn check_duration(&self, url: &str) -> Result<(), RetrievalError> {
        let limit = self.settings.max_youtube_duration_secs;
        let info = self.fetch_info(url).await?;
        let duration = info.duration.ok_or_else(|| {
            RetrievalError::MetadataUnavailable("duration not reported".to_string())
        })?;
        info!(event = "yt_dlp_duration", duration, limit, title = ?info.title);
        if duration > limit as f64 {
            return Err(RetrievalError::ContentTooLong(limit));
        }
        Ok(())
    }

    #[instrument(skip(self, job), fields(url = %job.url, output = %job.output.display()))]
    async fn download(&self, job: &RetrievalJob) -> Result<(), RetrievalError> {
        let mut cmd = self.base_command();
        cmd.arg("-f")
            .arg(FORMAT_SELECTION)
            .arg("--merge-output-format")
            .arg("mp4")
            .arg("-o")
            .arg(&job.output)
            .arg("--retries")
            .arg(RETRIES.to_string())
            .arg("--quiet")
            .arg("--no-warnings");
        if job.platform == Platform::TikTok {
            cmd.arg("--extractor-args").arg(TIKTOK_EXTRACTOR_ARGS);
        }
        cmd.arg(&job.url);

        info!(event = "yt_dlp_download_start");
        let output = run_tool(cmd, "yt-dlp", self.settings.download_timeout)
            .await?
            .map_err(|e| RetrievalError::ExtractionFailed(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            error!(
                event = "yt_dlp_download_failed",
                status = %output.status,
                stderr = %stderr.trim()
            );
            return Err(RetrievalError::ExtractionFailed(tool_detail(
                &output.stderr,
                &output.stdout,
            )));
        }

        ensure_non_empty(&job.output).await?;
        info!(event = "yt_dlp_download_success");
        Ok(())
    }
}

#[async_trait]
impl MediaProvider for YtDlpClient {
    #[instrument(skip(self))]
    async fn fetch_info(&self, url: &str) -> Result<YtDlpInfo, RetrievalError> {
        info!(event = "fetch_info_start");
        let mut cmd = self.base_command();
        cmd.arg("-J").arg(url);
        let output = run_tool(cmd, "yt-dlp", self.settings.probe_timeout)
            .await?
            .map_err(|e| RetrievalError::MetadataUnavailable(e.to_string()))?;

        if !output.status.success() {
            let detail = tool_detail(&output.stderr, &output.stdout);
            error!(event = "fetch_info_failed", status = %output.status, stderr = %detail);
            return Err(RetrievalError::MetadataUnavailable(detail));
        }

        serde_json::from_slice(&output.stdout)
            .map_err(|e| RetrievalError::MetadataUnavailable(format!("unreadable metadata: {e}")))
    }
}

#[async_trait]
impl Strategy for YtDlpClient {
    async fn retrieve(&self, job: &RetrievalJob) -> Result<(), RetrievalError> {
        if job.platform == Platform::YouTube {
            self.check_duration(&job.url).await?;
        }
        self.download(job).await
    }
}
