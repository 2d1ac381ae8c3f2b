use crate::{
    dispatcher::{RetrievalJob, Strategy},
    error::RetrievalError,
    fetcher::FileFetcher,
};
use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Response;
use scraper::{Html, Selector};
use std::time::Duration;
use tracing::{info, instrument, warn};

const OG_IMAGE_SELECTOR: &str = r#"meta[property="og:image"]"#;
const CLOSEUP_IMAGE_SELECTOR: &str = r#"img[data-test-id="pin-closeup-image"]"#;
const MAX_PAGE_BYTES: usize = 2 * 1024 * 1024;

/// Pin page -> preview image URL -> file.
pub struct PinterestScraper {
    fetcher: FileFetcher,
    page_timeout: Duration,
}

impl PinterestScraper {
    pub fn new(fetcher: FileFetcher, page_timeout: Duration) -> Self {
        Self {
            fetcher,
            page_timeout,
        }
    }

    #[instrument(skip(self))]
    async fn resolve_image_url(&self, url: &str) -> Result<String, RetrievalError> {
        let response = self
            .fetcher
            .client()
            .get(url)
            .timeout(self.page_timeout)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            warn!(event = "pinterest_page_http_error", status = status.as_u16());
            return Err(RetrievalError::UpstreamHttpError(status.as_u16()));
        }
        let page_url = response.url().clone();
        let body = read_page(response).await?;

        let raw = extract_image_url(&body).ok_or(RetrievalError::ImageUrlNotFound)?;
        // og:image is absolute in practice; resolve anyway so a relative src still works.
        let resolved = page_url
            .join(&raw)
            .map(|u| u.to_string())
            .unwrap_or(raw);
        info!(event = "pinterest_image_resolved", image_url = %resolved);
        Ok(resolved)
    }
}

#[async_trait]
impl Strategy for PinterestScraper {
    async fn retrieve(&self, job: &RetrievalJob) -> Result<(), RetrievalError> {
        let image_url = self.resolve_image_url(&job.url).await?;
        self.fetcher.fetch(&image_url, &job.output).await
    }
}

/// The page body, refused once it grows past [`MAX_PAGE_BYTES`].
async fn read_page(response: Response) -> Result<String, RetrievalError> {
    if response
        .content_length()
        .is_some_and(|len| len > MAX_PAGE_BYTES as u64)
    {
        warn!(event = "pinterest_page_too_large", content_length = ?response.content_length());
        return Err(RetrievalError::PageTooLarge(MAX_PAGE_BYTES));
    }

    let mut body = Vec::new();
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if body.len() + chunk.len() > MAX_PAGE_BYTES {
            warn!(event = "pinterest_page_too_large", read = body.len() + chunk.len());
            return Err(RetrievalError::PageTooLarge(MAX_PAGE_BYTES));
        }
        body.extend_from_slice(&chunk);
    }
    Ok(String::from_utf8_lossy(&body).into_owned())
}

/// Preview meta tag first, then the closeup `<img>`.
pub fn extract_image_url(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let attr_of = |selector: &str, attr: &str| -> Option<String> {
        let selector = Selector::parse(selector).ok()?;
        document
            .select(&selector)
            .filter_map(|el| el.value().attr(attr))
            .map(str::trim)
            .find(|value| !value.is_empty())
            .map(str::to_string)
    };
    attr_of(OG_IMAGE_SELECTOR, "content").or_else(|| attr_of(CLOSEUP_IMAGE_SELECTOR, "src"))
}
