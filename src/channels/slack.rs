use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::SlackConfig;
use crate::media::fetch::FileDownloader;
use crate::media::host::HostAllowlist;
use crate::media::retrieve::FileInfoLookup;

/// Maximum number of redirects followed for one request.
const MAX_REDIRECTS: usize = 3;

/// Browser-session token prefixes; Slack refuses file downloads for these.
const BROWSER_TOKEN_PREFIXES: &[&str] = &["xoxc-", "xoxd-"];

// ============================================================================
// Wire types
// ============================================================================

/// A Slack message as returned by `conversations.history` / `conversations.replies`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SlackMessage {
    #[serde(default)]
    pub ts: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub files: Vec<SlackFile>,
    #[serde(default)]
    pub attachments: Vec<SlackAttachment>,
}

/// A file shared in a message.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SlackFile {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub mimetype: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub url_private: String,
    #[serde(default)]
    pub url_private_download: String,
}

impl SlackFile {
    /// Authenticated URL to fetch the file from: `url_private`, falling back
    /// to `url_private_download`.
    pub fn download_url(&self) -> Option<&str> {
        [self.url_private.as_str(), self.url_private_download.as_str()]
            .into_iter()
            .find(|url| !url.trim().is_empty())
    }
}

/// A legacy attachment (link unfurl / preview).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SlackAttachment {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumb_url: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum MessageDump {
    History { messages: Vec<SlackMessage> },
    Many(Vec<SlackMessage>),
    One(SlackMessage),
}

/// Parse a message dump: a single message, an array of messages, or a raw
/// `conversations.history` response body.
pub fn parse_messages(json: &str) -> Result<Vec<SlackMessage>> {
    let dump: MessageDump = serde_json::from_str(json).context("invalid Slack message JSON")?;
    Ok(match dump {
        MessageDump::History { messages } | MessageDump::Many(messages) => messages,
        MessageDump::One(message) => vec![message],
    })
}

#[derive(Deserialize)]
struct FileInfoResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    file: Option<SlackFile>,
}

// ============================================================================
// Client
// ============================================================================

/// Authenticated Slack transport used to download message files.
///
/// Redirects are followed only towards allowed hosts, and a body is read no
/// further than the configured download limit.
pub struct SlackClient {
    http: reqwest::Client,
    token: String,
    api_base: String,
    max_download_bytes: Option<u64>,
}

impl SlackClient {
    pub fn new(token: impl Into<String>, api_base: &str, allowlist: HostAllowlist) -> Result<Self> {
        let http = reqwest::Client::builder()
            .redirect(redirect_policy(allowlist))
            .connect_timeout(Duration::from_secs(10))
            .user_agent(concat!("imagegate/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            http,
            token: token.into(),
            api_base: api_base.trim_end_matches('/').to_string(),
            max_download_bytes: None,
        })
    }

    /// Build a client from configuration. Fails if no token is configured.
    pub fn from_config(config: &SlackConfig, allowlist: HostAllowlist) -> Result<Self> {
        let token = config
            .token
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| anyhow::anyhow!("Slack token not configured (set SLACK_BOT_TOKEN)"))?;
        info!(api_base = %config.api_base, "Slack client configured");
        Self::new(token, &config.api_base, allowlist)
    }

    /// Stop reading a response once it has produced more than `limit` bytes.
    pub fn with_download_limit(mut self, limit: u64) -> Self {
        self.max_download_bytes = Some(limit);
        self
    }

    /// Browser-session tokens cannot download `url_private` files.
    pub fn can_download_files(&self) -> bool {
        !BROWSER_TOKEN_PREFIXES
            .iter()
            .any(|prefix| self.token.starts_with(prefix))
    }

    /// Look up file metadata via `files.info`.
    pub async fn get_file_info(&self, file_id: &str) -> Result<SlackFile> {
        let url = format!("{}/files.info", self.api_base);
        let response: FileInfoResponse = self
            .http
            .get(&url)
            .bearer_auth(&self.token)
            .query(&[("file", file_id)])
            .send()
            .await
            .with_context(|| format!("files.info request for {file_id}"))?
            .error_for_status()?
            .json()
            .await
            .context("invalid files.info response")?;

        if !response.ok {
            bail!(
                "Slack API error: {}",
                response.error.as_deref().unwrap_or("unknown_error")
            );
        }
        response
            .file
            .ok_or_else(|| anyhow::anyhow!("files.info response missing file"))
    }
}

#[async_trait]
impl FileDownloader for SlackClient {
    async fn download(&self, url: &str, sink: &mut Vec<u8>) -> Result<()> {
        let response = self
            .http
            .get(url)
            .bearer_auth(&self.token)
            .send()
            .await
            .context("request failed")?
            .error_for_status()?;

        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            let chunk = chunk.context("failed reading response body")?;
            sink.extend_from_slice(&chunk);
            if let Some(limit) = self.max_download_bytes {
                if sink.len() as u64 > limit {
                    debug!(url, limit, "download exceeded limit, truncating read");
                    break;
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl FileInfoLookup for SlackClient {
    fn can_download_files(&self) -> bool {
        SlackClient::can_download_files(self)
    }

    async fn file_info(&self, file_id: &str) -> Result<SlackFile> {
        self.get_file_info(file_id).await
    }
}

fn redirect_policy(allowlist: HostAllowlist) -> reqwest::redirect::Policy {
    reqwest::redirect::Policy::custom(move |attempt| {
        if attempt.previous().len() >= MAX_REDIRECTS {
            return attempt.error(format!("more than {MAX_REDIRECTS} redirects"));
        }
        if allowlist.allows_url(attempt.url()) {
            attempt.follow()
        } else {
            let host = attempt.url().host_str().unwrap_or_default().to_string();
            attempt.error(format!("redirect to disallowed host '{host}'"))
        }
    })
}
