use crate::{
    dispatcher::{ensure_non_empty, RetrievalJob, Strategy},
    error::RetrievalError,
    platform::MediaKind,
    process::{run_tool, tool_detail},
    tasks::ScratchDir,
};
use async_trait::async_trait;
use std::{
    path::{Path, PathBuf},
    time::Duration,
};
use tokio::process::Command;
use tracing::{error, info, instrument, warn};

const AUDIO_EXTENSION: &str = MediaKind::Audio.extension();

/// Audio strategy backed by `spotdl`. Each call works in its own scratch
/// directory, which is gone by the time the call returns.
pub struct SpotDl {
    bin: PathBuf,
    scratch_root: PathBuf,
    timeout: Duration,
}

impl SpotDl {
    pub fn new(bin: PathBuf, scratch_root: PathBuf, timeout: Duration) -> Self {
        Self {
            bin,
            scratch_root,
            timeout,
        }
    }

    #[instrument(skip(self, job), fields(url = %job.url, output = %job.output.display()))]
    async fn download(&self, job: &RetrievalJob) -> Result<(), RetrievalError> {
        let scratch = ScratchDir::create(&self.scratch_root, &format!("spotify-{}", job.basename))
            .await
            .map_err(|e| RetrievalError::Filesystem(format!("scratch directory: {e}")))?;

        let result = self.download_into(&scratch, job).await;
        let path = scratch.path().to_path_buf();
        if let Err(err) = scratch.remove().await {
            error!(event = "scratch_dir_remove_failed", path = %path.display(), error = %err);
        }
        result
    }

    async fn download_into(
        &self,
        scratch: &ScratchDir,
        job: &RetrievalJob,
    ) -> Result<(), RetrievalError> {
        let mut cmd = Command::new(&self.bin);
        cmd.arg("download")
            .arg(&job.url)
            .arg("--output")
            .arg(scratch.path());

        info!(event = "spotdl_start", scratch = %scratch.path().display());
        let output = run_tool(cmd, "spotdl", self.timeout)
            .await?
            .map_err(|err| {
                error!(event = "spotdl_spawn_failed", error = %err);
                RetrievalError::ExternalToolFailed(err.to_string())
            })?;

        if !output.status.success() {
            let detail = tool_detail(&output.stderr, &output.stdout);
            error!(event = "spotdl_failed", status = %output.status, output = %detail);
            return Err(RetrievalError::ExternalToolFailed(format!(
                "{}: {detail}",
                output.status
            )));
        }

        let track = single_audio_file(scratch.path()).await?;
        relocate(&track, &job.output).await?;
        ensure_non_empty(&job.output).await?;
        info!(event = "spotdl_success");
        Ok(())
    }
}

#[async_trait]
impl Strategy for SpotDl {
    async fn retrieve(&self, job: &RetrievalJob) -> Result<(), RetrievalError> {
        self.download(job).await
    }
}

/// Exactly one `.mp3` or an error; more than one is ambiguous rather than
/// silently picking whichever the directory listing returns first.
async fn single_audio_file(dir: &Path) -> Result<PathBuf, RetrievalError> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .map_err(|e| RetrievalError::Filesystem(e.to_string()))?;
    let mut found = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| RetrievalError::Filesystem(e.to_string()))?
    {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) == Some(AUDIO_EXTENSION) {
            found.push(path);
        }
    }

    match found.len() {
        0 => Err(RetrievalError::EmptyOrMissingOutput(format!(
            "no .{AUDIO_EXTENSION} in {}",
            dir.display()
        ))),
        1 => Ok(found.remove(0)),
        n => {
            warn!(event = "spotdl_ambiguous_output", files = ?found);
            Err(RetrievalError::AmbiguousOutput(n))
        }
    }
}

/// Rename when possible, copy and delete across filesystems.
async fn relocate(from: &Path, to: &Path) -> Result<(), RetrievalError> {
    if tokio::fs::rename(from, to).await.is_ok() {
        return Ok(());
    }
    tokio::fs::copy(from, to)
        .await
        .map_err(|e| RetrievalError::Filesystem(format!("move {}: {e}", from.display())))?;
    if let Err(err) = tokio::fs::remove_file(from).await {
        warn!(event = "relocate_source_remove_failed", path = %from.display(), error = %err);
    }
    Ok(())
}
