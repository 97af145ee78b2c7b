//! SSRF guard for image URLs.
//!
//! A URL is fetched only when its hostname is exactly one of the allowed
//! hosts or a true subdomain of one (`cdn.slack-edge.com` under
//! `slack-edge.com`). Substring tricks such as `evil.com/files.slack.com/x`
//! or `files.slack.com.evil.com` never match, and neither do IP literals,
//! `localhost` or cloud metadata addresses.

use std::collections::BTreeSet;
use url::Url;

/// Hosts Slack serves message files and previews from.
pub const DEFAULT_ALLOWED_HOSTS: &[&str] = &[
    "files.slack.com",
    "slack-edge.com",
    "avatars.slack-edge.com",
];

/// Immutable set of hosts image URLs may point at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostAllowlist {
    hosts: BTreeSet<String>,
}

impl HostAllowlist {
    pub fn new<I, S>(hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let hosts = hosts
            .into_iter()
            .map(|h| h.as_ref().trim().trim_end_matches('.').to_ascii_lowercase())
            .filter(|h| !h.is_empty())
            .collect();
        Self { hosts }
    }

    /// Check a raw URL string. Unparseable URLs are rejected.
    pub fn allows(&self, raw_url: &str) -> bool {
        match Url::parse(raw_url) {
            Ok(url) => self.allows_url(&url),
            Err(_) => false,
        }
    }

    /// Check an already parsed URL. Only the hostname is considered.
    pub fn allows_url(&self, url: &Url) -> bool {
        match url.host_str() {
            Some(host) => self.allows_host(host),
            None => false,
        }
    }

    /// Exact match, or a proper dot-suffix of an allowed entry.
    pub fn allows_host(&self, host: &str) -> bool {
        let host = host.to_ascii_lowercase();
        if host.is_empty() {
            return false;
        }
        if self.hosts.contains(&host) {
            return true;
        }
        self.hosts.iter().any(|allowed| {
            host.len() > allowed.len() + 1
                && host.ends_with(allowed.as_str())
                && host.as_bytes()[host.len() - allowed.len() - 1] == b'.'
        })
    }
}

impl Default for HostAllowlist {
    fn default() -> Self {
        Self::new(DEFAULT_ALLOWED_HOSTS)
    }
}
