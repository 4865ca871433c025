use std::path::Path;
use std::time::Duration;

use futures_util::StreamExt as _;
use reqwest::Response;
use secrecy::ExposeSecret;
use secrecy::SecretString;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tokio::io::AsyncWriteExt as _;

use crate::error::Error;
use crate::error::Result;

/// Per-request timeout applied to every HTTP call.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// HTTP client for GitHub API reads and raw file downloads.
pub struct HttpClient {
    client: reqwest::Client,
    token: Option<SecretString>,
    timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct GitHubError {
    message: String,
}

impl HttpClient {
    pub fn new(token: Option<SecretString>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent("stackup")
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Network {
                url: String::new(),
                reason: e.to_string(),
            })?;
        Ok(Self {
            client,
            token,
            timeout,
        })
    }

    /// GET an API endpoint and decode its JSON body.
    ///
    /// `query` pairs are percent-encoded onto the URL.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, &str)],
    ) -> Result<T> {
        let mut request = self
            .client
            .get(url)
            .query(query)
            .header("Accept", "application/vnd.github+json");
        if let Some(token) = &self.token {
            request = request.bearer_auth(token.expose_secret());
        }
        let response = self.check(url, request.send().await).await?;
        let body = response.text().await.map_err(|e| self.network(url, e))?;
        serde_json::from_str(&body).map_err(|source| Error::Decode {
            url: url.to_string(),
            source,
        })
    }

    /// Stream the body of `url` into `dest`, creating its parent directory.
    ///
    /// No credentials are sent; raw content hosts serve public files.
    pub async fn download(&self, url: &str, dest: &Path) -> Result<()> {
        let response = self.check(url, self.client.get(url).send().await).await?;
        if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::File::create(dest).await?;
        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| self.network(url, e))?;
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        Ok(())
    }

    async fn check(
        &self,
        url: &str,
        sent: reqwest::Result<Response>,
    ) -> Result<Response> {
        let response = sent.map_err(|e| self.network(url, e))?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let reason = match serde_json::from_str::<GitHubError>(&body) {
            Ok(error) => format!("{}: {}", status, error.message),
            Err(_) => status.to_string(),
        };
        Err(Error::Network {
            url: url.to_string(),
            reason,
        })
    }

    fn network(&self, url: &str, e: reqwest::Error) -> Error {
        let reason = if e.is_timeout() {
            format!("timed out after {:?}", self.timeout)
        } else {
            e.to_string()
        };
        Error::Network {
            url: url.to_string(),
            reason,
        }
    }
}
