use crate::{
    dispatcher::ensure_non_empty,
    error::{AppError, RetrievalError},
    tasks::OutputGuard,
};
use futures_util::StreamExt;
use reqwest::{
    header::{HeaderMap, HeaderValue, USER_AGENT},
    Client,
};
use std::{path::Path, time::Duration};
use tokio::{fs::File, io::AsyncWriteExt};
use tracing::{debug, info, instrument, trace, warn};

pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

/// Client carrying the browser User-Agent every upstream request is sent with.
/// `timeout` bounds each request from connect to the last body byte.
pub fn build_http_client(timeout: Duration) -> Result<Client, AppError> {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_USER_AGENT));
    let client = Client::builder()
        .default_headers(headers)
        .connect_timeout(Duration::from_secs(10).min(timeout))
        .timeout(timeout)
        .build()?;
    Ok(client)
}

/// Streams a raw HTTP resource to disk.
#[derive(Clone)]
pub struct FileFetcher {
    client: Client,
}

impl FileFetcher {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    #[instrument(skip(self, output), fields(output = %output.display()))]
    pub async fn fetch(&self, url: &str, output: &Path) -> Result<(), RetrievalError> {
        info!(event = "fetch_start", url = %url);
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            warn!(event = "fetch_http_error", status = status.as_u16());
            return Err(RetrievalError::UpstreamHttpError(status.as_u16()));
        }

        let guard = OutputGuard::new(output.to_path_buf());
        let mut file = File::create(output)
            .await
            .map_err(|e| RetrievalError::Filesystem(e.to_string()))?;
        let mut stream = response.bytes_stream();
        let mut written: u64 = 0;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk)
                .await
                .map_err(|e| RetrievalError::Filesystem(e.to_string()))?;
            written += chunk.len() as u64;
            trace!(event = "fetch_chunk", bytes = chunk.len(), written);
        }
        file.flush()
            .await
            .map_err(|e| RetrievalError::Filesystem(e.to_string()))?;
        drop(file);

        ensure_non_empty(output).await?;
        debug!(event = "fetch_complete", bytes = written);
        guard.disarm();
        Ok(())
    }
}
