//! HTTP revision source.
//!
//! Reads the deployed revision of each environment from its external variables
//! endpoint and downloads decoded build manifests from a build service.
//!
//! # Revision endpoint
//!
//! `remote.revision_url` with `{domain}` replaced by the environment domain
//! (e.g. `https://www.habbo.com.br/gamedata/external_variables/1`). The body is
//! either external-variables text with a `flash.client.url=` line, where the
//! revision is the last path segment of that URL, or a bare revision string.
//!
//! # Build endpoint
//!
//! `remote.build_url` with `{revision}` replaced. The body is a JSON [`Build`]
//! manifest.
//!
//! # Retries
//!
//! Network errors, HTTP 429 and 5xx are retried with exponential backoff
//! (1s, 2s, 4s, ... capped at 32s); any other non-success status fails at once.

use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::RemoteConfig;
use crate::error::{MonitorError, MonitorResult};
use crate::models::{Build, Environment, Revision};
use crate::traits::RevisionSource;

const CLIENT_URL_KEY: &str = "flash.client.url=";

pub struct HttpRevisionSource {
    client: reqwest::Client,
    config: RemoteConfig,
}

impl HttpRevisionSource {
    pub fn new(config: RemoteConfig) -> MonitorResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| MonitorError::Fetch(format!("cannot build HTTP client: {}", e)))?;
        Ok(Self { client, config })
    }

    /// GET `url` with retry/backoff and return the response body.
    async fn get_with_retry(&self, url: &str) -> MonitorResult<Vec<u8>> {
        let mut last_err = None;

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s, 4s, 8s, ...
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            match self.client.get(url).send().await {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let body = response.bytes().await.map_err(|e| {
                            MonitorError::Fetch(format!("reading {} failed: {}", url, e))
                        })?;
                        return Ok(body.to_vec());
                    }

                    // Rate limited or server error, retry
                    if status.as_u16() == 429 || status.is_server_error() {
                        warn!(url, %status, attempt, "retryable HTTP status");
                        last_err = Some(MonitorError::Fetch(format!("GET {}: {}", url, status)));
                        continue;
                    }

                    return Err(MonitorError::Fetch(format!("GET {}: {}", url, status)));
                }
                Err(e) => {
                    warn!(url, error = %e, attempt, "request failed");
                    last_err = Some(MonitorError::Fetch(format!("GET {}: {}", url, e)));
                    continue;
                }
            }
        }

        Err(last_err
            .unwrap_or_else(|| MonitorError::Fetch(format!("GET {} failed after retries", url))))
    }
}

#[async_trait]
impl RevisionSource for HttpRevisionSource {
    fn name(&self) -> &str {
        "http"
    }

    async fn fetch_latest_revision(&self, environment: Environment) -> MonitorResult<Revision> {
        let url = revision_url(&self.config.revision_url, environment);
        debug!(environment = %environment, url = %url, "fetching latest revision");

        let body = self.get_with_retry(&url).await?;
        let text = String::from_utf8_lossy(&body);
        parse_revision(&text)
    }

    async fn fetch_build(&self, revision: &Revision) -> MonitorResult<Build> {
        let url = build_url(&self.config.build_url, revision);
        debug!(revision = %revision, url = %url, "fetching build manifest");

        let body = self.get_with_retry(&url).await?;
        let build: Build = serde_json::from_slice(&body).map_err(|e| {
            MonitorError::Extraction(format!("malformed build manifest for {}: {}", revision, e))
        })?;

        if let Some(reported) = &build.revision {
            if reported != revision {
                return Err(MonitorError::Extraction(format!(
                    "build service returned {} when asked for {}",
                    reported, revision
                )));
            }
        }
        Ok(build)
    }
}

pub fn revision_url(template: &str, environment: Environment) -> String {
    template.replace("{domain}", environment.domain())
}

pub fn build_url(template: &str, revision: &Revision) -> String {
    template.replace("{revision}", revision.as_str())
}

/// Pull the revision out of an external-variables body or a bare revision.
pub fn parse_revision(body: &str) -> MonitorResult<Revision> {
    let client_url = body
        .lines()
        .map(str::trim)
        .find_map(|line| line.strip_prefix(CLIENT_URL_KEY));

    let candidate = match client_url {
        Some(url) => url
            .split(['/', '?', '#'])
            .filter(|segment| !segment.is_empty())
            .last()
            .map(str::to_string)
            .ok_or_else(|| MonitorError::Fetch(format!("empty client url: '{}'", url)))?,
        None => {
            let trimmed = body.trim();
            if trimmed.lines().count() != 1 {
                return Err(MonitorError::Fetch(
                    "response has no flash.client.url and is not a bare revision".to_string(),
                ));
            }
            trimmed.to_string()
        }
    };

    Revision::new(candidate)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_revision_from_external_variables() {
        let body = "connection.info.host=game-us.habbo.com\n\
                    flash.client.url=//images.habbo.com/gordon/PRODUCTION-201904011212-888653470/\n\
                    client.starting=Please wait";
        let rev = parse_revision(body).unwrap();
        assert_eq!(rev.as_str(), "PRODUCTION-201904011212-888653470");
    }

    #[test]
    fn parses_bare_revision() {
        let rev = parse_revision("  PRODUCTION-201904011212-888653470\n").unwrap();
        assert_eq!(rev.as_str(), "PRODUCTION-201904011212-888653470");
    }

    #[test]
    fn rejects_unrecognised_body() {
        assert!(parse_revision("").is_err());
        assert!(parse_revision("a=1\nb=2").is_err());
        assert!(parse_revision("<html>oops</html>").is_err());
    }

    #[test]
    fn substitutes_url_templates() {
        assert_eq!(
            revision_url(
                "https://www.habbo{domain}/gamedata/external_variables/1",
                Environment::ComBr
            ),
            "https://www.habbo.com.br/gamedata/external_variables/1"
        );
        assert_eq!(
            build_url("https://b.example.net/{revision}.json", &Revision::new("r1").unwrap()),
            "https://b.example.net/r1.json"
        );
    }
}
