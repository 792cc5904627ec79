use crate::ImageSource;
use crate::error::{ErrorKind, Result};
use async_trait::async_trait;
use exn::ResultExt;
use reqwest::{Client, Url};
use tracing::instrument;

pub const DEFAULT_USER_AGENT: &str = concat!("shelf/", env!("CARGO_PKG_VERSION"));

/// [`ImageSource`] backed by a shared [`reqwest::Client`].
///
/// The client keeps its connection pool between fetches, so one `HttpSource`
/// should be built per process and shared behind a
/// [`SourceHandle`](crate::SourceHandle).
#[derive(Clone)]
pub struct HttpSource {
    client: Client,
}
impl HttpSource {
    pub fn new(user_agent: impl AsRef<str>) -> Result<Self> {
        let client = Client::builder().user_agent(user_agent.as_ref()).build().or_raise(|| ErrorKind::Client)?;
        Ok(Self { client })
    }

    /// Use an already configured client (proxies, custom TLS roots).
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    fn parse(url: &str) -> Result<Url> {
        let parsed = Url::parse(url).or_raise(|| ErrorKind::InvalidUrl(url.to_string()))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            exn::bail!(ErrorKind::InvalidUrl(url.to_string()));
        }
        Ok(parsed)
    }
}

#[async_trait]
impl ImageSource for HttpSource {
    #[instrument(level = "debug", skip(self))]
    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let url = Self::parse(url)?;
        let response = self.client.get(url).send().await.map_err(|e| ErrorKind::Request(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            exn::bail!(ErrorKind::Status(status.as_u16()));
        }
        let body = response.bytes().await.map_err(|e| ErrorKind::Request(e.to_string()))?;
        if body.is_empty() {
            exn::bail!(ErrorKind::EmptyBody);
        }
        tracing::debug!(bytes = body.len(), "Fetched image");
        Ok(body.to_vec())
    }
}
