use crate::{
    error::RetrievalError,
    platform::Platform,
    tasks::{validate_basename, OutputGuard},
};
use async_trait::async_trait;
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};
use tracing::{error, info, instrument, warn};

/// Everything a strategy needs to produce one file.
#[derive(Clone, Debug)]
pub struct RetrievalJob {
    pub platform: Platform,
    pub url: String,
    pub basename: String,
    pub output: PathBuf,
}

/// One way of turning a URL into a file at `job.output`.
#[async_trait]
pub trait Strategy: Send + Sync {
    async fn retrieve(&self, job: &RetrievalJob) -> Result<(), RetrievalError>;
}

/// Routes a classified URL to its strategy and checks what comes back.
/// Holds no per-request state, so one instance serves every chat at once.
#[derive(Clone)]
pub struct Dispatcher {
    output_dir: PathBuf,
    video: Arc<dyn Strategy>,
    image: Arc<dyn Strategy>,
    audio: Arc<dyn Strategy>,
}

impl Dispatcher {
    pub fn new(
        output_dir: PathBuf,
        video: Arc<dyn Strategy>,
        image: Arc<dyn Strategy>,
        audio: Arc<dyn Strategy>,
    ) -> Self {
        Self {
            output_dir,
            video,
            image,
            audio,
        }
    }

    fn strategy_for(&self, platform: Platform) -> Option<&Arc<dyn Strategy>> {
        match platform {
            Platform::YouTube | Platform::Instagram | Platform::TikTok | Platform::X => {
                Some(&self.video)
            }
            Platform::Pinterest => Some(&self.image),
            Platform::Spotify => Some(&self.audio),
            Platform::Unsupported => None,
        }
    }

    /// Returns a path that exists, is non-empty and carries the platform's
    /// extension. On any error nothing is left at the output path.
    #[instrument(skip(self), fields(platform = %platform))]
    pub async fn retrieve(
        &self,
        platform: Platform,
        url: &str,
        basename: &str,
    ) -> Result<PathBuf, RetrievalError> {
        let (Some(strategy), Some(kind)) = (self.strategy_for(platform), platform.media_kind())
        else {
            return Err(RetrievalError::UnsupportedPlatform);
        };
        validate_basename(basename)?;

        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .map_err(|e| RetrievalError::Filesystem(e.to_string()))?;

        let job = RetrievalJob {
            platform,
            url: url.to_string(),
            basename: basename.to_string(),
            output: self
                .output_dir
                .join(format!("{basename}.{}", kind.extension())),
        };
        let guard = OutputGuard::new(job.output.clone());
        info!(event = "retrieve_start", url = %url, output = %job.output.display());

        let result = match strategy.retrieve(&job).await {
            Ok(()) => ensure_non_empty(&job.output).await.map_err(|err| {
                error!(event = "retrieve_output_invalid", error = %err);
                err
            }),
            Err(err) => {
                warn!(event = "retrieve_failed", kind = err.kind(), error = %err);
                Err(err)
            }
        };

        match result {
            Ok(()) => {
                info!(event = "retrieve_success", output = %job.output.display());
                Ok(guard.disarm())
            }
            Err(err) => {
                if let Err(remove_err) = guard.remove().await {
                    error!(
                        event = "partial_output_remove_failed",
                        path = %job.output.display(),
                        error = %remove_err
                    );
                }
                Err(err)
            }
        }
    }
}

pub async fn ensure_non_empty(path: &Path) -> Result<(), RetrievalError> {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_file() && meta.len() > 0 => Ok(()),
        Ok(_) => Err(RetrievalError::EmptyOrMissingOutput(format!(
            "{} is empty",
            path.display()
        ))),
        Err(_) => Err(RetrievalError::EmptyOrMissingOutput(format!(
            "{} was not created",
            path.display()
        ))),
    }
}
